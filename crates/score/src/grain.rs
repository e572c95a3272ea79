use crate::error::{ParseError, Result};
use crate::index::Index;
use crate::mview::{MaterializedView, MaterializedViewBuilder};
use crate::names::Identifier;
use crate::reference::{GrainElement, GrainElementRef};
use crate::sequence::SequenceDef;
use crate::table::{Table, TableBuilder};
use crate::version::VersionString;
use crate::view::{ParameterizedView, View, ViewBuilder};
use indexmap::IndexMap;

/// A finalized grain: a named schema with versioning metadata and its
/// elements, frozen after `ScoreBuilder::build`.
#[derive(Debug, Clone)]
pub struct Grain {
    pub(crate) name: Identifier,
    pub(crate) version: VersionString,
    pub(crate) length: u32,
    pub(crate) checksum: u32,
    pub(crate) autoupdate: bool,
    pub(crate) dependency_order: u32,
    pub(crate) tables: IndexMap<String, Table>,
    pub(crate) indices: IndexMap<String, Index>,
    pub(crate) views: IndexMap<String, View>,
    pub(crate) parameterized_views: IndexMap<String, ParameterizedView>,
    pub(crate) materialized_views: IndexMap<String, MaterializedView>,
    pub(crate) sequences: IndexMap<String, SequenceDef>,
}

impl Grain {
    pub fn name(&self) -> &Identifier {
        &self.name
    }

    pub fn version(&self) -> &VersionString {
        &self.version
    }

    /// Byte length of the CelestaSQL source this grain was parsed from.
    pub fn length(&self) -> u32 {
        self.length
    }

    /// CRC-32 of the CelestaSQL source.
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Uppercase 8-hex-digit rendering of the checksum, the form stored in
    /// the system catalog.
    pub fn checksum_hex(&self) -> String {
        format!("{:08X}", self.checksum)
    }

    pub fn autoupdate(&self) -> bool {
        self.autoupdate
    }

    /// Length of the longest outgoing inter-grain reference path. Grains
    /// upgrade in ascending order of this value.
    pub fn dependency_order(&self) -> u32 {
        self.dependency_order
    }

    pub fn is_system(&self) -> bool {
        self.name == crate::score::SYSTEM_GRAIN_NAME
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> &IndexMap<String, Table> {
        &self.tables
    }

    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indices.get(name)
    }

    pub fn indices(&self) -> &IndexMap<String, Index> {
        &self.indices
    }

    pub fn views(&self) -> &IndexMap<String, View> {
        &self.views
    }

    pub fn parameterized_views(&self) -> &IndexMap<String, ParameterizedView> {
        &self.parameterized_views
    }

    pub fn materialized_views(&self) -> &IndexMap<String, MaterializedView> {
        &self.materialized_views
    }

    pub fn sequences(&self) -> &IndexMap<String, SequenceDef> {
        &self.sequences
    }

    /// Materialized views aggregating the given table.
    pub fn materialized_views_of(&self, table: &str) -> Vec<&MaterializedView> {
        self.materialized_views
            .values()
            .filter(|mv| mv.ref_table() == table)
            .collect()
    }

    /// Every outgoing reference that leaves this grain.
    pub(crate) fn external_references(&self) -> Vec<GrainElementRef> {
        let mut out = Vec::new();
        for table in self.tables.values() {
            out.extend(table.references());
        }
        for view in self.views.values() {
            out.extend(view.references());
        }
        for view in self.parameterized_views.values() {
            out.extend(view.references());
        }
        out.retain(|reference| reference.grain_name != self.name);
        out
    }
}

/// Grain under construction: versioning metadata plus element builders.
/// Tables, views and materialized views share one element namespace;
/// indices and sequences each have their own.
#[derive(Debug)]
pub struct GrainBuilder {
    pub(crate) name: Identifier,
    pub(crate) version: Option<VersionString>,
    pub(crate) length: u32,
    pub(crate) checksum: u32,
    pub(crate) autoupdate: bool,
    pub(crate) tables: IndexMap<String, TableBuilder>,
    pub(crate) indices: IndexMap<String, Index>,
    pub(crate) views: IndexMap<String, ViewBuilder>,
    pub(crate) materialized_views: IndexMap<String, MaterializedViewBuilder>,
    pub(crate) sequences: IndexMap<String, SequenceDef>,
}

impl GrainBuilder {
    pub fn new(name: &str) -> Result<Self> {
        Ok(Self {
            name: Identifier::new(name)?,
            version: None,
            length: 0,
            checksum: 0,
            autoupdate: true,
            tables: IndexMap::new(),
            indices: IndexMap::new(),
            views: IndexMap::new(),
            materialized_views: IndexMap::new(),
            sequences: IndexMap::new(),
        })
    }

    pub fn name(&self) -> &Identifier {
        &self.name
    }

    pub fn set_version(&mut self, version: &str) -> Result<()> {
        self.version = Some(VersionString::parse(version)?);
        Ok(())
    }

    /// Record length and CRC-32 of the CelestaSQL source text.
    pub fn set_source(&mut self, source: &str) {
        self.length = source.len() as u32;
        self.checksum = crc32fast::hash(source.as_bytes());
    }

    pub fn set_autoupdate(&mut self, autoupdate: bool) {
        self.autoupdate = autoupdate;
    }

    pub fn add_table(&mut self, table: TableBuilder) -> Result<()> {
        self.check_owned(table.grain_name(), table.name())?;
        self.check_element_namespace(table.name())?;
        self.tables.insert(table.name().to_string(), table);
        Ok(())
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut TableBuilder> {
        self.tables.get_mut(name)
    }

    pub fn add_index(&mut self, index: Index) -> Result<()> {
        self.check_owned(index.grain_name(), index.name())?;
        let name = index.name.to_string();
        if self.indices.contains_key(&name) {
            return Err(ParseError::DuplicateElement {
                grain: self.name.to_string(),
                element: name,
            });
        }
        self.indices.insert(name, index);
        Ok(())
    }

    pub fn add_view(&mut self, view: ViewBuilder) -> Result<()> {
        self.check_owned(view.grain_name(), view.name())?;
        self.check_element_namespace(view.name())?;
        self.views.insert(view.name().to_string(), view);
        Ok(())
    }

    pub fn add_materialized_view(&mut self, view: MaterializedViewBuilder) -> Result<()> {
        self.check_owned(view.grain_name(), view.name())?;
        self.check_element_namespace(view.name())?;
        self.materialized_views.insert(view.name().to_string(), view);
        Ok(())
    }

    pub fn add_sequence(&mut self, sequence: SequenceDef) -> Result<()> {
        self.check_owned(sequence.grain_name(), sequence.name())?;
        sequence.validate()?;
        let name = sequence.name().to_string();
        if self.sequences.contains_key(&name) {
            return Err(ParseError::DuplicateElement {
                grain: self.name.to_string(),
                element: name,
            });
        }
        self.sequences.insert(name, sequence);
        Ok(())
    }

    fn check_owned(&self, grain_name: &Identifier, element: &Identifier) -> Result<()> {
        if grain_name != &self.name {
            return Err(ParseError::IllegalState {
                detail: format!(
                    "element {} belongs to grain {}, not {}",
                    element, grain_name, self.name
                ),
            });
        }
        Ok(())
    }

    fn check_element_namespace(&self, name: &Identifier) -> Result<()> {
        if self.tables.contains_key(name.as_str())
            || self.views.contains_key(name.as_str())
            || self.materialized_views.contains_key(name.as_str())
        {
            return Err(ParseError::DuplicateElement {
                grain: self.name.to_string(),
                element: name.to_string(),
            });
        }
        Ok(())
    }
}
