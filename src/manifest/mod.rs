// src/manifest/mod.rs

//! Job manifest parsing.
//!
//! The manifest is consumed as plain data: jobs, sources, and the named
//! execution targets they route to. Nothing here knows about DAGs; the
//! graph builder consumes these records.

pub mod job;
pub mod loader;
pub mod profiles;
pub mod source;

pub use job::{DependencySpec, JobKind, JobRecord, MaintenanceKind, TestSize, Window};
pub use loader::{load_manifest, load_profiles, Manifest, RawManifest};
pub use profiles::Profiles;
pub use source::SourceRecord;
