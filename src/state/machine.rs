// src/state/machine.rs
//
// Per-object violation lifecycle.
//
//   Clear ──violating──▶ Active ──open succeeded──▶ Reported
//     ▲                    │                          │
//     └────not violating───┘                          │
//     └─────────────not violating (retractable)───────┘
//
// `Active` means "violating but not yet announced". An object only stays
// there across frames when the open attempt fails, in which case it is
// retried on the next violating frame.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ViolationState {
    #[default]
    Clear,
    Active,
    Reported,
}

/// What the caller has to do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Nothing,
    /// Try to announce. On success the caller moves the state to `Reported`.
    Open,
    /// Still violating after the announcement; the rule may send an update.
    Refresh,
    /// Retract a previous announcement.
    Close,
}

impl ViolationState {
    pub fn next(self, violating: bool, retractable: bool) -> (ViolationState, Action) {
        use ViolationState::*;
        match (self, violating) {
            (Clear, true) | (Active, true) => (Active, Action::Open),
            (Reported, true) => (Reported, Action::Refresh),
            (Clear, false) | (Active, false) => (Clear, Action::Nothing),
            (Reported, false) if retractable => (Clear, Action::Close),
            (Reported, false) => (Reported, Action::Nothing),
        }
    }

    pub fn is_reported(self) -> bool {
        self == ViolationState::Reported
    }
}
