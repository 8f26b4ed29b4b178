//! recool-discover: resumable network discovery driven by nmap.
//!
//! Sweeps a subnet for live hosts, then runs a full service scan against
//! each one, saving progress after every step so an interrupted run can
//! pick up where it left off.

pub mod config;
pub mod error;
pub mod export;
pub mod interrupt;
pub mod nmap_xml;
pub mod orchestrator;
pub mod progress;
pub mod scanner;
