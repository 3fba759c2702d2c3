//! Mapping tables between the notch, intermediate and human namespaces.
//!
//! The base `notch -> intermediate` table plus the human-name CSV tables are
//! enough to derive every other direction; see [`generate`].

mod error;
mod exc;
mod generate;
mod names;
mod set;
mod table;

pub use error::MappingError;
pub use exc::{remap_exc_line, ExcTables};
pub use generate::{generate, generate_files, GeneratedMappings, MappingInputs, MappingOutputs};
pub use names::{parse_records, CsvRecord, NameEntry, NameTable};
pub use set::{MappingSet, Namespace, Symbol, SymbolKind};
pub use table::{MappingTable, MethodRef};
