//! Port traits: the boundaries between domain logic and I/O.

pub mod config_port;
pub mod price_port;
pub mod report_port;
pub mod signal_port;
