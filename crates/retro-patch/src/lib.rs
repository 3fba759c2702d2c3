//! Fuzzy unified-diff application over in-memory source buffers.
//!
//! Hunks are located by searching outward from their recorded position,
//! tolerating up to `max_fuzz` mismatched context lines. Each target buffer is
//! patched on a scratch copy and only committed when every hunk applied.

mod bundle;
mod diff;
mod error;
mod report;
mod working_set;

pub use bundle::{group_by_base_name, load_bundle, PatchFile};
pub use diff::{parse_patch, strip_components, Hunk, HunkLine, PatchSpec, DEV_NULL};
pub use error::PatchError;
pub use report::{HunkReport, PatchLog, PatchReport, PatchStatus};
pub use working_set::{ApplyOptions, WorkingSet};
