//! Built-in chain stages.

mod cleanup;
mod patch;
mod remap;
mod tool;

pub use cleanup::CleanupStage;
pub use patch::{PatchStage, PATCH_LOG_FILE};
pub use remap::RemapStage;
pub use tool::ToolStage;
