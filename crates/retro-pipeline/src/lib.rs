//! The jar-in, jar-out decompile chain.
//!
//! A [`JarChain`] runs [`Stage`]s in order and skips the whole chain when the
//! combined digest of their inputs matches the one stored beside the final
//! output. [`Pipeline::from_config`] wires the standard stages from a
//! [`retro_config::PipelineConfig`].

mod chain;
mod error;
mod mappings;
mod pipeline;
mod stage;
pub mod stages;

pub use chain::{ChainAction, ChainReport, JarChain, StageRun, DEFAULT_DEBOUNCE, DIGEST_SUFFIX};
pub use error::PipelineError;
pub use mappings::generate_mappings;
pub use pipeline::{Pipeline, PipelineReport, TOOL_STAGES};
pub use stage::{Stage, StageContext};
