// src/lookout.rs
//
// Shared, mutable lookout lists (plates and person references). Pipelines
// read a snapshot once per frame; every effective change is pushed to all
// clients as `server:app-data`.

use crate::events::{AppData, ServerEvent};
use crate::pipeline::notifier::{EventReceiver, Notifier};
use std::sync::{Arc, RwLock};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookoutList {
    Vehicles,
    Persons,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
}

#[derive(Clone)]
pub struct LookoutStore {
    data: Arc<RwLock<AppData>>,
    notifier: Notifier,
}

impl LookoutStore {
    pub fn new(notifier: Notifier) -> Self {
        Self::with_data(notifier, AppData::default())
    }

    pub fn with_data(notifier: Notifier, seed: AppData) -> Self {
        let mut data = AppData::default();
        for v in &seed.lookout_vehicles {
            insert_unique(&mut data.lookout_vehicles, v);
        }
        for p in &seed.lookout_persons {
            insert_unique(&mut data.lookout_persons, p);
        }
        Self {
            data: Arc::new(RwLock::new(data)),
            notifier,
        }
    }

    pub fn snapshot(&self) -> AppData {
        self.data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Adds a normalised entry. Existing entries are not duplicated, but the
    /// current state is broadcast either way.
    pub fn add(&self, list: LookoutList, value: &str) -> AppData {
        let snapshot = {
            let mut data = self.data.write().unwrap_or_else(|p| p.into_inner());
            insert_unique(entries(&mut data, list), value);
            data.clone()
        };
        info!("👀 Lookout {:?} += {}", list, normalize(value));
        self.notifier.broadcast(ServerEvent::AppData(snapshot.clone()));
        snapshot
    }

    pub fn remove(&self, list: LookoutList, value: &str) -> RemoveOutcome {
        let key = normalize(value);
        let snapshot = {
            let mut data = self.data.write().unwrap_or_else(|p| p.into_inner());
            let items = entries(&mut data, list);
            let before = items.len();
            items.retain(|v| v != &key);
            if items.len() == before {
                return RemoveOutcome::NotFound;
            }
            data.clone()
        };
        info!("👀 Lookout {:?} -= {}", list, key);
        self.notifier.broadcast(ServerEvent::AppData(snapshot));
        RemoveOutcome::Removed
    }

    pub fn add_vehicle(&self, plate: &str) -> AppData {
        self.add(LookoutList::Vehicles, plate)
    }

    pub fn remove_vehicle(&self, plate: &str) -> RemoveOutcome {
        self.remove(LookoutList::Vehicles, plate)
    }

    pub fn add_person(&self, reference: &str) -> AppData {
        self.add(LookoutList::Persons, reference)
    }

    pub fn remove_person(&self, reference: &str) -> RemoveOutcome {
        self.remove(LookoutList::Persons, reference)
    }

    /// Register a client; it receives the current app data first.
    pub fn connect(&self) -> EventReceiver {
        self.notifier
            .subscribe_with(ServerEvent::AppData(self.snapshot()))
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}

pub fn normalize(value: &str) -> String {
    value.trim().to_uppercase()
}

fn entries(data: &mut AppData, list: LookoutList) -> &mut Vec<String> {
    match list {
        LookoutList::Vehicles => &mut data.lookout_vehicles,
        LookoutList::Persons => &mut data.lookout_persons,
    }
}

fn insert_unique(items: &mut Vec<String>, value: &str) {
    let key = normalize(value);
    if !key.is_empty() && !items.contains(&key) {
        items.push(key);
    }
}
