use crate::error::{ParseError, Result};
use crate::fk::{ForeignKey, PendingFk};
use crate::grain::{Grain, GrainBuilder};
use crate::index::Index;
use crate::mview::{MaterializedView, MaterializedViewBuilder};
use crate::reference::{GrainElement, TableElement};
use crate::sequence::SequenceDef;
use crate::table::{Table, TableBuilder};
use crate::version::VersionString;
use crate::view::{ParameterizedView, View, ViewBuilder};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Name of the grain holding the upgrade catalog.
pub const SYSTEM_GRAIN_NAME: &str = "celesta";

/// The finalized collection of grains known to one instance. Immutable:
/// lookups only.
#[derive(Debug, Clone)]
pub struct Score {
    grains: IndexMap<String, Grain>,
}

impl Score {
    pub fn grain(&self, name: &str) -> Option<&Grain> {
        self.grains.get(name)
    }

    pub fn grains(&self) -> impl Iterator<Item = &Grain> {
        self.grains.values()
    }

    pub fn system_grain(&self) -> Option<&Grain> {
        self.grains.get(SYSTEM_GRAIN_NAME)
    }

    /// Grains in upgrade order: ascending dependency order, declaration
    /// order as tiebreak.
    pub fn grains_by_dependency_order(&self) -> Vec<&Grain> {
        let mut grains: Vec<&Grain> = self.grains.values().collect();
        grains.sort_by_key(|grain| grain.dependency_order());
        grains
    }
}

/// Collects grain builders and finalizes them all at once: primary keys
/// must be closed, foreign keys resolve against referenced tables, view
/// expressions resolve and type-check, and inter-grain references must form
/// a DAG. `build` consumes the builder and yields the immutable [`Score`].
#[derive(Debug, Default)]
pub struct ScoreBuilder {
    grains: IndexMap<String, GrainBuilder>,
}

impl ScoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_grain(&mut self, grain: GrainBuilder) -> Result<()> {
        let name = grain.name().to_string();
        if self.grains.contains_key(&name) {
            return Err(ParseError::DuplicateElement {
                grain: name.clone(),
                element: name,
            });
        }
        self.grains.insert(name, grain);
        Ok(())
    }

    pub fn grain_mut(&mut self, name: &str) -> Option<&mut GrainBuilder> {
        self.grains.get_mut(name)
    }

    pub fn build(self) -> Result<Score> {
        struct Meta {
            version: VersionString,
            length: u32,
            checksum: u32,
            autoupdate: bool,
        }

        let mut metas: IndexMap<String, Meta> = IndexMap::new();
        let mut tables: IndexMap<String, IndexMap<String, Table>> = IndexMap::new();
        let mut pending_fks: Vec<(String, String, PendingFk)> = Vec::new();
        let mut view_builders: Vec<(String, ViewBuilder)> = Vec::new();
        let mut mv_builders: Vec<(String, MaterializedViewBuilder)> = Vec::new();
        let mut indices: IndexMap<String, IndexMap<String, Index>> = IndexMap::new();
        let mut sequences: IndexMap<String, IndexMap<String, SequenceDef>> = IndexMap::new();

        for (grain_name, grain) in self.grains {
            let version = grain.version.ok_or_else(|| ParseError::IllegalState {
                detail: format!("grain {} declares no version", grain_name),
            })?;
            metas.insert(
                grain_name.clone(),
                Meta {
                    version,
                    length: grain.length,
                    checksum: grain.checksum,
                    autoupdate: grain.autoupdate,
                },
            );

            let mut frozen = IndexMap::new();
            for (table_name, table) in grain.tables {
                let (table, fks) = table.freeze()?;
                pending_fks.extend(fks.into_iter().map(|fk| (grain_name.clone(), table_name.clone(), fk)));
                frozen.insert(table_name, table);
            }
            tables.insert(grain_name.clone(), frozen);

            view_builders.extend(
                grain
                    .views
                    .into_iter()
                    .map(|(_, vb)| (grain_name.clone(), vb)),
            );
            mv_builders.extend(
                grain
                    .materialized_views
                    .into_iter()
                    .map(|(_, mb)| (grain_name.clone(), mb)),
            );
            indices.insert(grain_name.clone(), grain.indices);
            sequences.insert(grain_name.clone(), grain.sequences);
        }

        // Foreign keys resolve in two passes: compute against the frozen
        // tables, then attach, so the table map is never borrowed both ways.
        let mut resolved_fks: Vec<(String, String, ForeignKey)> = Vec::new();
        for (grain_name, table_name, fk) in pending_fks {
            let referenced_grain_tables = tables
                .get(fk.referenced_grain.as_str())
                .ok_or_else(|| ParseError::UnknownGrain {
                    grain: fk.referenced_grain.to_string(),
                })?;
            let referenced = referenced_grain_tables
                .get(fk.referenced_table.as_str())
                .ok_or_else(|| ParseError::UnknownElement {
                    grain: fk.referenced_grain.to_string(),
                    element: fk.referenced_table.to_string(),
                })?;

            let pk = referenced.pk_column_names();
            // An omitted referenced column list defaults to the primary key.
            let referenced_columns = if fk.referenced_columns.is_empty() {
                pk.to_vec()
            } else {
                fk.referenced_columns
            };
            if referenced_columns != pk || fk.columns.len() != pk.len() {
                return Err(ParseError::FkReferencedColumnsNotPk {
                    table: table_name,
                    referenced_table: fk.referenced_table.to_string(),
                });
            }

            let local_table = &tables[&grain_name][&table_name];
            for (local, remote) in fk.columns.iter().zip(pk) {
                let local_kind = local_table.column(local).expect("validated on add").kind();
                let remote_kind = referenced.column(remote).expect("pk column").kind();
                if std::mem::discriminant(local_kind) != std::mem::discriminant(remote_kind) {
                    return Err(ParseError::TypeMismatch {
                        detail: format!(
                            "foreign key {}: column {} does not match the type of {}.{}",
                            fk.name, local, fk.referenced_table, remote
                        ),
                    });
                }
            }

            resolved_fks.push((
                grain_name,
                table_name,
                ForeignKey {
                    name: fk.name,
                    columns: fk.columns,
                    referenced_grain: fk.referenced_grain,
                    referenced_table: fk.referenced_table,
                    referenced_columns,
                    on_update: fk.on_update,
                    on_delete: fk.on_delete,
                },
            ));
        }
        for (grain_name, table_name, fk) in resolved_fks {
            let table = tables
                .get_mut(&grain_name)
                .and_then(|g| g.get_mut(&table_name))
                .expect("frozen above");
            TableBuilder::attach_fk(table, fk);
        }

        // Indices must point at same-grain tables and existing columns.
        for (grain_name, grain_indices) in &indices {
            for index in grain_indices.values() {
                let table = tables[grain_name]
                    .get(index.table_name().as_str())
                    .ok_or_else(|| ParseError::UnknownElement {
                        grain: grain_name.clone(),
                        element: index.table_name().to_string(),
                    })?;
                for column in index.columns() {
                    if table.column(column).is_none() {
                        return Err(ParseError::UnknownColumn {
                            table: index.table_name().to_string(),
                            column: column.clone(),
                        });
                    }
                }
            }
        }

        let mut views: IndexMap<String, IndexMap<String, View>> =
            metas.keys().map(|g| (g.clone(), IndexMap::new())).collect();
        let mut parameterized_views: IndexMap<String, IndexMap<String, ParameterizedView>> =
            metas.keys().map(|g| (g.clone(), IndexMap::new())).collect();
        {
            let lookup = |grain: &str, table: &str| tables.get(grain).and_then(|g| g.get(table));
            for (grain_name, view) in view_builders {
                let name = view.name().to_string();
                match view.resolve(&lookup)? {
                    (Some(view), None) => {
                        views.get_mut(&grain_name).expect("seeded").insert(name, view);
                    }
                    (None, Some(view)) => {
                        parameterized_views
                            .get_mut(&grain_name)
                            .expect("seeded")
                            .insert(name, view);
                    }
                    _ => unreachable!("resolve yields exactly one view kind"),
                }
            }
        }

        let mut materialized_views: IndexMap<String, IndexMap<String, MaterializedView>> =
            metas.keys().map(|g| (g.clone(), IndexMap::new())).collect();
        for (grain_name, builder) in mv_builders {
            let source = tables[&grain_name]
                .get(builder.ref_table().as_str())
                .ok_or_else(|| ParseError::UnknownElement {
                    grain: grain_name.clone(),
                    element: builder.ref_table().to_string(),
                })?;
            let view = builder.resolve(source)?;
            materialized_views
                .get_mut(&grain_name)
                .expect("seeded")
                .insert(view.name().to_string(), view);
        }

        let mut grains: IndexMap<String, Grain> = IndexMap::new();
        for (grain_name, meta) in metas {
            grains.insert(
                grain_name.clone(),
                Grain {
                    name: crate::Identifier::new(&grain_name).expect("validated on add"),
                    version: meta.version,
                    length: meta.length,
                    checksum: meta.checksum,
                    autoupdate: meta.autoupdate,
                    dependency_order: 0,
                    tables: tables.shift_remove(&grain_name).unwrap_or_default(),
                    indices: indices.shift_remove(&grain_name).unwrap_or_default(),
                    views: views.shift_remove(&grain_name).unwrap_or_default(),
                    parameterized_views: parameterized_views
                        .shift_remove(&grain_name)
                        .unwrap_or_default(),
                    materialized_views: materialized_views
                        .shift_remove(&grain_name)
                        .unwrap_or_default(),
                    sequences: sequences.shift_remove(&grain_name).unwrap_or_default(),
                },
            );
        }

        let orders = dependency_orders(&grains)?;
        for (grain_name, order) in orders {
            grains
                .get_mut(&grain_name)
                .expect("computed from this map")
                .dependency_order = order;
        }

        Ok(Score { grains })
    }
}

/// Longest outgoing inter-grain reference path per grain, rejecting cycles.
fn dependency_orders(grains: &IndexMap<String, Grain>) -> Result<HashMap<String, u32>> {
    // Edges: grain -> set of grains it references.
    let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
    for (grain_name, grain) in grains {
        let mut out: Vec<&str> = grain
            .external_references()
            .into_iter()
            .map(|reference| {
                grains
                    .get_full(reference.grain_name.as_str())
                    .map(|(_, key, _)| key.as_str())
                    .ok_or(ParseError::UnknownGrain {
                        grain: reference.grain_name.to_string(),
                    })
            })
            .collect::<Result<_>>()?;
        out.sort();
        out.dedup();
        edges.insert(grain_name, out);
    }

    fn visit<'a>(
        grain: &'a str,
        edges: &HashMap<&'a str, Vec<&'a str>>,
        memo: &mut HashMap<&'a str, u32>,
        on_stack: &mut Vec<&'a str>,
    ) -> Result<u32> {
        if let Some(&order) = memo.get(grain) {
            return Ok(order);
        }
        if on_stack.contains(&grain) {
            return Err(ParseError::CyclicGrainDependency {
                grain: grain.to_string(),
            });
        }
        on_stack.push(grain);
        let mut order = 0;
        for &next in &edges[grain] {
            order = order.max(1 + visit(next, edges, memo, on_stack)?);
        }
        on_stack.pop();
        memo.insert(grain, order);
        Ok(order)
    }

    let mut memo = HashMap::new();
    for grain_name in grains.keys() {
        visit(grain_name, &edges, &mut memo, &mut Vec::new())?;
    }
    Ok(memo
        .into_iter()
        .map(|(grain, order)| (grain.to_string(), order))
        .collect())
}
