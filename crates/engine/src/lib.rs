//! `clashgroup-engine`: clash grouping engine.
//!
//! Pure engine crate: receives ingested clash records, returns group
//! assignments and derived groups. No file IO.

pub mod error;
pub mod group;
pub mod model;
pub mod summary;

pub use error::{ClashError, ErrorClass, RecordError, RecordErrorKind};
pub use group::{group, group_with};
pub use model::{
    ClashObject, ClashRecord, DistanceMetric, FieldMap, Group, GroupAssignment, Grouping,
    GroupingOptions, Ingested, OutputFormat, Point3,
};
pub use summary::{build_groups, compute_summary, RunSummary};
