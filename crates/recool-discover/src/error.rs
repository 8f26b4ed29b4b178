//! Error types for the recool-discover crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("Nmap not found at path: {path}")]
    NmapNotFound { path: String },

    #[error("Failed to parse nmap XML output: {0}")]
    XmlParse(String),

    #[error("Invalid subnet {ip}/{prefix}: {reason}")]
    InvalidSubnet {
        ip: std::net::IpAddr,
        prefix: u8,
        reason: String,
    },

    #[error("Store error: {0}")]
    Store(#[from] recool_store::StoreError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The user chose to exit from the interrupt prompt.
    #[error("Exit requested by user")]
    ExitRequested,
}

pub type Result<T> = std::result::Result<T, DiscoverError>;
