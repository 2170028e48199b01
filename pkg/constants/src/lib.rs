//! Centralized constants for the hpa-tuner project.
//!
//! All project-wide constant values live here.
//! Change a value in one place and it applies everywhere.

pub mod events;
pub mod network;
pub mod paths;
pub mod registry;
pub mod state;
pub mod tuning;
