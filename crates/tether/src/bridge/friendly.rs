//! Maps raw executor errors to messages fit for the decision engine.
//!
//! Rules are checked in order and the first match wins.

const CONTAINER_ERROR: &str = "Parent node does not support children";

pub const CONTAINER_MESSAGE: &str = "The target parent cannot contain child nodes. \
     Choose a frame, group or component as the parent instead.";
pub const STALE_REFERENCE_MESSAGE: &str = "The referenced node no longer exists. \
     Refresh the selection and use a current node id.";
pub const PERMISSION_MESSAGE: &str = "The executor was denied access to that operation. \
     The document or node may be locked or read-only.";
pub const GENERIC_PREFIX: &str = "Command failed:";

/// Friendly text for a raw executor error.
pub fn friendly_message(raw: &str) -> String {
    let lower = raw.to_lowercase();
    if raw.contains(CONTAINER_ERROR) {
        CONTAINER_MESSAGE.to_string()
    } else if lower.contains("node not found") {
        STALE_REFERENCE_MESSAGE.to_string()
    } else if lower.contains("permission") || lower.contains("access") {
        PERMISSION_MESSAGE.to_string()
    } else {
        format!("{GENERIC_PREFIX} {raw}")
    }
}
