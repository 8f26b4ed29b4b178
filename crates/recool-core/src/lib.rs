//! recool-core: the device model shared across recool components.
//!
//! This crate provides:
//! - `Device`, the per-IP record built up incrementally by scans
//! - `ServiceInfo`, what was found listening on a single TCP port
//! - `HostScan`, one host's slice of a parsed scanner result
//! - a human-readable device summary via `Display`

mod render;
pub mod types;

pub use types::{Device, HostScan, ServiceInfo};
