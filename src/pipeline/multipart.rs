// src/pipeline/multipart.rs
//
// MJPEG-over-HTTP framing (`multipart/x-mixed-replace`).

pub const BOUNDARY: &str = "frame";
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
const PART_TRAILER: &[u8] = b"\r\n";

/// Wrap one JPEG as a multipart part.
pub fn multipart_part(jpeg: &[u8]) -> Vec<u8> {
    let mut part = Vec::with_capacity(PART_HEADER.len() + jpeg.len() + PART_TRAILER.len());
    part.extend_from_slice(PART_HEADER);
    part.extend_from_slice(jpeg);
    part.extend_from_slice(PART_TRAILER);
    part
}

/// Payload of a part produced by [`multipart_part`].
pub fn part_payload(part: &[u8]) -> Option<&[u8]> {
    part.strip_prefix(PART_HEADER)?.strip_suffix(PART_TRAILER)
}
