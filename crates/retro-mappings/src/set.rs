use crate::names::NameTable;
use crate::table::{short_name, with_short_name, MappingTable};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolKind {
    Package,
    Class,
    Field,
    Method,
    Parameter,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    Notch,
    Intermediate,
    Human,
}

/// One mapped symbol.
///
/// Fields are named `owner/name`; methods `owner/name desc`, because notch
/// method names are overloaded by descriptor. Parameters have no notch name and
/// use their intermediate name as `obf`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub obf: String,
    pub intermediate: Option<String>,
    pub human: Option<String>,
    pub doc: Option<String>,
    /// Declaring class for fields and methods, in intermediate names.
    pub owner: Option<String>,
}

impl Symbol {
    pub fn name_in(&self, ns: Namespace) -> Option<&str> {
        match ns {
            Namespace::Notch if self.kind == SymbolKind::Parameter => None,
            Namespace::Notch => Some(&self.obf),
            Namespace::Intermediate => self.intermediate.as_deref(),
            Namespace::Human => self.human.as_deref(),
        }
    }
}

/// Every symbol of one project configuration, indexed per namespace.
#[derive(Clone, Debug, Default)]
pub struct MappingSet {
    symbols: Vec<Symbol>,
    index: HashMap<(SymbolKind, Namespace, String), usize>,
}

impl MappingSet {
    /// Build from the base table plus the human-name CSV tables.
    pub fn build(
        base: &MappingTable,
        fields: &NameTable,
        methods: &NameTable,
        params: &NameTable,
    ) -> Self {
        let mut set = Self::default();

        for (notch, inter) in &base.packages {
            set.push(Symbol {
                kind: SymbolKind::Package,
                obf: notch.clone(),
                intermediate: Some(inter.clone()),
                human: Some(inter.clone()),
                doc: None,
                owner: None,
            });
        }
        for (notch, inter) in &base.classes {
            set.push(Symbol {
                kind: SymbolKind::Class,
                obf: notch.clone(),
                intermediate: Some(inter.clone()),
                human: Some(inter.clone()),
                doc: None,
                owner: None,
            });
        }
        for (notch, inter) in &base.fields {
            let entry = fields.get(short_name(inter));
            set.push(Symbol {
                kind: SymbolKind::Field,
                obf: notch.clone(),
                intermediate: Some(inter.clone()),
                human: Some(match entry {
                    Some(e) => with_short_name(inter, &e.name),
                    None => inter.clone(),
                }),
                doc: entry.and_then(|e| e.doc.clone()),
                owner: owner_of(inter),
            });
        }
        for (notch, inter) in &base.methods {
            let entry = methods.get(inter.short_name());
            let human_name = match entry {
                Some(e) => with_short_name(&inter.name, &e.name),
                None => inter.name.clone(),
            };
            set.push(Symbol {
                kind: SymbolKind::Method,
                obf: notch.to_string(),
                intermediate: Some(inter.to_string()),
                human: Some(format!("{human_name} {}", inter.desc)),
                doc: entry.and_then(|e| e.doc.clone()),
                owner: owner_of(&inter.name),
            });
        }
        for (inter, entry) in params.iter() {
            set.push(Symbol {
                kind: SymbolKind::Parameter,
                obf: inter.to_owned(),
                intermediate: Some(inter.to_owned()),
                human: Some(entry.name.clone()),
                doc: entry.doc.clone(),
                owner: None,
            });
        }

        tracing::debug!(
            target = "retro.mappings",
            symbols = set.symbols.len(),
            "built mapping set"
        );
        set
    }

    fn push(&mut self, symbol: Symbol) {
        let idx = self.symbols.len();
        for ns in [Namespace::Notch, Namespace::Intermediate, Namespace::Human] {
            if let Some(name) = symbol.name_in(ns) {
                // First declaration wins for names that collide within a namespace.
                self.index
                    .entry((symbol.kind, ns, name.to_owned()))
                    .or_insert(idx);
            }
        }
        self.symbols.push(symbol);
    }

    pub fn lookup(&self, kind: SymbolKind, ns: Namespace, name: &str) -> Option<&Symbol> {
        self.index
            .get(&(kind, ns, name.to_owned()))
            .map(|&idx| &self.symbols[idx])
    }

    /// Translate `name` from one namespace to another.
    ///
    /// Unknown names, and symbols without a name in `to`, map to themselves.
    pub fn map<'a>(&'a self, kind: SymbolKind, from: Namespace, to: Namespace, name: &'a str) -> &'a str {
        self.lookup(kind, from, name)
            .and_then(|symbol| symbol.name_in(to))
            .unwrap_or(name)
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

fn owner_of(name: &str) -> Option<String> {
    name.rfind('/').map(|idx| name[..idx].to_owned())
}
