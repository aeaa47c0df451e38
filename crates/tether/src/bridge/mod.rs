//! The executor bridge: wire protocol, request correlation, and friendly
//! error messages.

pub mod correlator;
pub mod friendly;
pub mod protocol;

pub use correlator::{CorrelatorConfig, ReplyDisposition, RequestCorrelator};
pub use friendly::friendly_message;
pub use protocol::{OutboundMessage, Reply};
