//! Persistent state for hpa-tuner: the SlateDB-backed key-value store,
//! its watch log, leader election and the typed resource registry.

pub mod client;
pub mod leader;
pub mod registry;
pub mod watch;
