//! NetApp ONTAP MetroCluster tooling
//!
//! Talks to an ONTAP cluster over its management API: detects whether the
//! cluster speaks REST, records request diagnostics, waits on asynchronous
//! jobs and drives a MetroCluster pairing to its desired state.

pub mod cli;
pub mod client;
pub mod config;
pub mod diagnostics;
pub mod dialect;
pub mod error;
pub mod jobs;
pub mod modules;
pub mod telemetry;

pub use error::{Error, Result};
