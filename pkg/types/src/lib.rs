//! Shared resource types for hpa-tuner.

pub mod config;
pub mod event;
pub mod hpa;
pub mod lease;
pub mod manifest;
pub mod object;
pub mod tuner;
pub mod validate;
