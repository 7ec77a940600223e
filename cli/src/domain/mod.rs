//! Domain layer - pure business logic
//!
//! This module contains business logic with no external I/O.
//! Types and functions here can be unit tested without mocking.

pub mod chart;
pub mod image;
pub mod replication;
pub mod values;
pub mod workload;

// Re-export commonly used types
pub use chart::{ChartMetadata, ChartTask, ChartValues, HelmCoordinates};
pub use replication::{
    ReplicationOutcome, ReplicationReport, ReplicationResult, ReplicationTask, TransferStep,
};
pub use workload::{VersionManifest, WorkloadSpec};
