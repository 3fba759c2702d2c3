use crate::error::MappingError;
use crate::exc::ExcTables;
use crate::names::NameTable;
use crate::table::{with_short_name, MappingTable, MethodRef};
use std::path::{Path, PathBuf};

/// The five tables derived from one base table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GeneratedMappings {
    pub notch_to_intermediate: MappingTable,
    pub notch_to_human: MappingTable,
    pub intermediate_to_human: MappingTable,
    pub human_to_intermediate: MappingTable,
    pub human_to_notch: MappingTable,
}

/// Derive all tables from the base `notch -> intermediate` table.
///
/// Packages and classes keep their intermediate names in the human namespace.
/// Fields and methods have the segment after the last `/` looked up in the
/// CSV tables; owners and descriptors are never touched, and names missing
/// from a table stay as they are.
pub fn generate(base: &MappingTable, fields: &NameTable, methods: &NameTable) -> GeneratedMappings {
    let mut out = GeneratedMappings::default();

    for (notch, inter) in &base.packages {
        let entry = (notch.clone(), inter.clone());
        out.notch_to_intermediate.packages.push(entry.clone());
        out.notch_to_human.packages.push(entry);
        out.human_to_notch.packages.push((inter.clone(), notch.clone()));
    }

    for (notch, inter) in &base.classes {
        let entry = (notch.clone(), inter.clone());
        out.notch_to_intermediate.classes.push(entry.clone());
        out.notch_to_human.classes.push(entry);

        let same = (inter.clone(), inter.clone());
        out.intermediate_to_human.classes.push(same.clone());
        out.human_to_intermediate.classes.push(same);
        out.human_to_notch.classes.push((inter.clone(), notch.clone()));
    }

    for (notch, inter) in &base.fields {
        let human = match fields.name(crate::table::short_name(inter)) {
            Some(name) => with_short_name(inter, name),
            None => inter.clone(),
        };

        out.notch_to_intermediate.fields.push((notch.clone(), inter.clone()));
        out.notch_to_human.fields.push((notch.clone(), human.clone()));
        out.intermediate_to_human.fields.push((inter.clone(), human.clone()));
        out.human_to_intermediate.fields.push((human.clone(), inter.clone()));
        out.human_to_notch.fields.push((human, notch.clone()));
    }

    for (notch, inter) in &base.methods {
        let human = match methods.name(inter.short_name()) {
            Some(name) => MethodRef::new(with_short_name(&inter.name, name), inter.desc.clone()),
            None => inter.clone(),
        };

        out.notch_to_intermediate.methods.push((notch.clone(), inter.clone()));
        out.notch_to_human.methods.push((notch.clone(), human.clone()));
        out.intermediate_to_human.methods.push((inter.clone(), human.clone()));
        out.human_to_intermediate.methods.push((human.clone(), inter.clone()));
        out.human_to_notch.methods.push((human, notch.clone()));
    }

    out
}

/// Files read by [`generate_files`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappingInputs {
    pub srg: PathBuf,
    pub fields_csv: PathBuf,
    pub methods_csv: PathBuf,
    pub exc: Option<PathBuf>,
    pub extra_exc: Vec<PathBuf>,
}

/// Files written by [`generate_files`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappingOutputs {
    pub notch_to_intermediate: PathBuf,
    pub notch_to_human: PathBuf,
    pub intermediate_to_human: PathBuf,
    pub human_to_intermediate: PathBuf,
    pub human_to_notch: PathBuf,
    pub intermediate_exc: PathBuf,
    pub human_exc: PathBuf,
}

impl MappingOutputs {
    /// Conventional file names below `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            notch_to_intermediate: dir.join("notch-srg.srg"),
            notch_to_human: dir.join("notch-mcp.srg"),
            intermediate_to_human: dir.join("srg-mcp.srg"),
            human_to_intermediate: dir.join("mcp-srg.srg"),
            human_to_notch: dir.join("mcp-notch.srg"),
            intermediate_exc: dir.join("srg.exc"),
            human_exc: dir.join("mcp.exc"),
        }
    }
}

/// Read the inputs, derive every table and write them out.
///
/// Callers sharing the mapping directory with other processes should hold the
/// exclusive cache lock around this call.
pub fn generate_files(
    inputs: &MappingInputs,
    outputs: &MappingOutputs,
) -> Result<GeneratedMappings, MappingError> {
    let base = MappingTable::load(&inputs.srg)?;
    let fields = NameTable::load(&inputs.fields_csv)?;
    let methods = NameTable::load(&inputs.methods_csv)?;

    let generated = generate(&base, &fields, &methods);
    generated.notch_to_intermediate.write_to(&outputs.notch_to_intermediate)?;
    generated.notch_to_human.write_to(&outputs.notch_to_human)?;
    generated.intermediate_to_human.write_to(&outputs.intermediate_to_human)?;
    generated.human_to_intermediate.write_to(&outputs.human_to_intermediate)?;
    generated.human_to_notch.write_to(&outputs.human_to_notch)?;

    let exc_files: Vec<PathBuf> = inputs
        .exc
        .iter()
        .chain(inputs.extra_exc.iter())
        .cloned()
        .collect();
    let exc = ExcTables::merge(&exc_files, &methods)?;
    retro_cache::atomic_write(&outputs.intermediate_exc, exc.intermediate.as_bytes())?;
    retro_cache::atomic_write(&outputs.human_exc, exc.human.as_bytes())?;

    tracing::info!(
        target = "retro.mappings",
        srg = %inputs.srg.display(),
        classes = base.classes.len(),
        fields = base.fields.len(),
        methods = base.methods.len(),
        exc_files = exc_files.len(),
        "generated mapping tables"
    );
    Ok(generated)
}
