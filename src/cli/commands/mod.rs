//! CLI command implementations

pub mod advance;
pub mod cert;
pub mod compliance;
pub mod init;
pub mod stage;
pub mod workflow;
