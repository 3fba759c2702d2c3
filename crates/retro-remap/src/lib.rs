//! Line-oriented rewriting of decompiled sources from intermediate to human
//! names, with javadoc and missing-generic injection on declaration lines.

mod error;
mod javadoc;
mod remapper;
mod tables;

pub use error::RemapError;
pub use javadoc::{build_javadoc, wrap_text, JAVADOC_WIDTH};
pub use remapper::{JavadocMode, RemapOptions, RemapSummary, RemappedFile, Remapper};
pub use tables::{
    GenericEntry, GenericSlot, GenericTable, LinePatch, LinePatches, RemapInputs, RemapTables,
};
