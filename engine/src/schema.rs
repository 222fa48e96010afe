//! Schema registry: which tables are transferred and in what order.
//!
//! Tables are declared in one of four write passes. A table in
//! [`Pass::Deferring`] holds one or more nullable columns that reference a
//! [`Pass::Referenced`] table which is itself written later. Those columns
//! are written as null and patched in once the referenced rows exist.

use crate::{error::Result, Error, Record, RecordId, TableName};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Write pass of a table during import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pass {
    /// No dependency on any other registered table
    Independent,
    /// Referencing side of a circular edge, written with the edge nulled
    Deferring,
    /// Referenced side of a circular edge
    Referenced,
    /// Join and child tables
    Dependent,
}

impl Pass {
    pub const ALL: [Pass; 4] = [
        Pass::Independent,
        Pass::Deferring,
        Pass::Referenced,
        Pass::Dependent,
    ];

    /// One-based pass number.
    pub fn number(self) -> u8 {
        match self {
            Pass::Independent => 1,
            Pass::Deferring => 2,
            Pass::Referenced => 3,
            Pass::Dependent => 4,
        }
    }
}

impl std::fmt::Display for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pass {}", self.number())
    }
}

/// A nullable column that must be written after the table it references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeferredField {
    /// Column on the deferring table
    pub field: String,
    /// Table whose identifiers the column holds
    pub references: TableName,
}

/// A queued update restoring one deferred column after pass 3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    pub table: TableName,
    pub record_id: RecordId,
    pub field: String,
    pub value: Value,
}

/// Rows of a deferring table split into their pass-2 form and the patch queue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Deferred {
    pub rows: Vec<Record>,
    pub patches: Vec<Patch>,
}

/// Declaration of one transferable table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSpec {
    pub name: TableName,
    pub pass: Pass,
    /// Deferred columns, only on [`Pass::Deferring`] tables
    pub deferred: Vec<DeferredField>,
    /// Large binary columns nulled by a plain export
    pub binary_fields: Vec<String>,
}

impl TableSpec {
    fn new(name: impl Into<TableName>, pass: Pass) -> Self {
        Self {
            name: name.into(),
            pass,
            deferred: Vec::new(),
            binary_fields: Vec::new(),
        }
    }

    /// A table with no dependency on other registered tables.
    pub fn independent(name: impl Into<TableName>) -> Self {
        Self::new(name, Pass::Independent)
    }

    /// The referencing side of a circular edge. Add its columns with [`TableSpec::defer`].
    pub fn deferring(name: impl Into<TableName>) -> Self {
        Self::new(name, Pass::Deferring)
    }

    /// The referenced side of a circular edge.
    pub fn referenced(name: impl Into<TableName>) -> Self {
        Self::new(name, Pass::Referenced)
    }

    /// A join or child table.
    pub fn dependent(name: impl Into<TableName>) -> Self {
        Self::new(name, Pass::Dependent)
    }

    /// Declare a deferred column referencing `references`.
    pub fn defer(mut self, field: impl Into<String>, references: impl Into<TableName>) -> Self {
        self.deferred.push(DeferredField {
            field: field.into(),
            references: references.into(),
        });
        self
    }

    /// Declare columns holding large binary payloads.
    pub fn with_binary_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.binary_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Split rows into their pass-2 form and the patches restoring them.
    ///
    /// Every deferred column present on a row is forced to null; absent
    /// columns stay absent. Each row whose original value was non-null yields
    /// one [`Patch`]. Rows keep their order.
    pub fn split_deferred(&self, rows: &[Record]) -> Result<Deferred> {
        let mut deferred = Deferred {
            rows: Vec::with_capacity(rows.len()),
            patches: Vec::new(),
        };

        for (index, row) in rows.iter().enumerate() {
            let mut nulled = row.clone();
            for edge in &self.deferred {
                let value = row.get_or_null(&edge.field);
                if !value.is_null() {
                    let record_id = row.id().ok_or_else(|| {
                        Error::MalformedBody(format!(
                            "row {} of table {} has {} set but no id",
                            index, self.name, edge.field
                        ))
                    })?;
                    deferred.patches.push(Patch {
                        table: self.name.clone(),
                        record_id,
                        field: edge.field.clone(),
                        value: value.clone(),
                    });
                }
                nulled.null_if_present(&edge.field);
            }
            deferred.rows.push(nulled);
        }

        Ok(deferred)
    }

    /// Null out every binary column of a row.
    pub fn strip_binary(&self, row: &mut Record) {
        for field in &self.binary_fields {
            row.null_out(field);
        }
    }
}

/// The ordered set of transferable tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    tables: Vec<TableSpec>,
}

impl Registry {
    /// Start declaring a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// The inventory application's business tables.
    ///
    /// Users, roles and permissions are deployment-specific and not part of it.
    pub fn inventory() -> Self {
        let images = ["image_data", "image_mime"];
        Self {
            tables: vec![
                TableSpec::independent("unit"),
                TableSpec::independent("allergen"),
                TableSpec::deferring("ingredient")
                    .defer("produced_by_recipe_id", "recipe")
                    .with_binary_fields(images),
                TableSpec::referenced("recipe").with_binary_fields(images),
                TableSpec::dependent("recipe_component"),
                TableSpec::dependent("recipe_step"),
                TableSpec::dependent("supplier"),
                TableSpec::dependent("supplier_offer"),
                TableSpec::dependent("supplier_offer_price"),
                TableSpec::dependent("ingredient_supplier_offer"),
                TableSpec::dependent("ingredient_stock"),
            ],
        }
    }

    /// All tables in registry (write) order.
    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    /// All table names in registry order.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }

    pub fn table(&self, name: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Tables written in the given pass, in registry order.
    pub fn tables_in(&self, pass: Pass) -> impl Iterator<Item = &TableSpec> {
        self.tables.iter().filter(move |t| t.pass == pass)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Builder validating a [`Registry`] declaration.
#[derive(Debug, Clone, Default)]
pub struct RegistryBuilder {
    tables: Vec<TableSpec>,
}

impl RegistryBuilder {
    /// Append a table. Tables must be declared in pass order.
    pub fn table(mut self, table: TableSpec) -> Self {
        self.tables.push(table);
        self
    }

    pub fn build(self) -> Result<Registry> {
        let mut seen = HashSet::new();
        let mut last_pass = Pass::Independent;

        for table in &self.tables {
            if table.name.is_empty() {
                return Err(Error::InvalidRegistry("empty table name".into()));
            }
            if !seen.insert(table.name.as_str()) {
                return Err(Error::InvalidRegistry(format!(
                    "table {} declared twice",
                    table.name
                )));
            }
            if table.pass < last_pass {
                return Err(Error::InvalidRegistry(format!(
                    "table {} ({}) declared after a {} table",
                    table.name, table.pass, last_pass
                )));
            }
            last_pass = table.pass;

            match (table.pass, table.deferred.is_empty()) {
                (Pass::Deferring, true) => {
                    return Err(Error::InvalidRegistry(format!(
                        "table {} is deferring but has no deferred field",
                        table.name
                    )))
                }
                (Pass::Deferring, false) | (_, true) => {}
                (_, false) => {
                    return Err(Error::InvalidRegistry(format!(
                        "table {} has deferred fields but is in {}",
                        table.name, table.pass
                    )))
                }
            }
        }

        for table in &self.tables {
            for edge in &table.deferred {
                if edge.field == crate::record::ID_FIELD {
                    return Err(Error::InvalidRegistry(format!(
                        "table {} cannot defer its id column",
                        table.name
                    )));
                }
                let target = self
                    .tables
                    .iter()
                    .find(|t| t.name == edge.references)
                    .ok_or_else(|| {
                        Error::InvalidRegistry(format!(
                            "{}.{} references unregistered table {}",
                            table.name, edge.field, edge.references
                        ))
                    })?;
                if target.pass != Pass::Referenced {
                    return Err(Error::InvalidRegistry(format!(
                        "{}.{} references {} which is in {}, expected {}",
                        table.name,
                        edge.field,
                        target.name,
                        target.pass,
                        Pass::Referenced
                    )));
                }
            }
        }

        Ok(Registry {
            tables: self.tables,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kitchen() -> RegistryBuilder {
        Registry::builder()
            .table(TableSpec::independent("unit"))
            .table(TableSpec::deferring("ingredient").defer("produced_by_recipe_id", "recipe"))
            .table(TableSpec::referenced("recipe"))
            .table(TableSpec::dependent("recipe_component"))
    }

    #[test]
    fn inventory_registry_is_consistent() {
        let inventory = Registry::inventory();
        let mut builder = Registry::builder();
        for table in inventory.tables() {
            builder = builder.table(table.clone());
        }
        assert_eq!(builder.build().unwrap(), inventory);
        assert_eq!(inventory.len(), 11);
    }

    #[test]
    fn inventory_passes() {
        let registry = Registry::inventory();
        let names = |pass| {
            registry
                .tables_in(pass)
                .map(|t| t.name.clone())
                .collect::<Vec<_>>()
        };

        assert_eq!(names(Pass::Independent), vec!["unit", "allergen"]);
        assert_eq!(names(Pass::Deferring), vec!["ingredient"]);
        assert_eq!(names(Pass::Referenced), vec!["recipe"]);
        assert_eq!(names(Pass::Dependent).len(), 7);
        assert_eq!(names(Pass::Dependent)[0], "recipe_component");

        let ingredient = registry.table("ingredient").unwrap();
        assert_eq!(ingredient.deferred[0].field, "produced_by_recipe_id");
        assert_eq!(ingredient.binary_fields, vec!["image_data", "image_mime"]);
        assert!(registry.table("recipe_step").unwrap().binary_fields.is_empty());
    }

    #[test]
    fn reject_duplicate_table() {
        let result = kitchen().table(TableSpec::dependent("unit")).build();
        assert!(matches!(result, Err(Error::InvalidRegistry(m)) if m.contains("twice")));
    }

    #[test]
    fn reject_out_of_order_pass() {
        let result = kitchen().table(TableSpec::independent("allergen")).build();
        assert!(matches!(result, Err(Error::InvalidRegistry(_))));
    }

    #[test]
    fn reject_dangling_edge() {
        let result = Registry::builder()
            .table(TableSpec::deferring("ingredient").defer("produced_by_recipe_id", "recipe"))
            .build();
        assert!(matches!(result, Err(Error::InvalidRegistry(m)) if m.contains("unregistered")));
    }

    #[test]
    fn reject_edge_to_non_referenced_table() {
        let result = Registry::builder()
            .table(TableSpec::independent("unit"))
            .table(TableSpec::deferring("ingredient").defer("default_unit_id", "unit"))
            .build();
        assert!(matches!(result, Err(Error::InvalidRegistry(_))));
    }

    #[test]
    fn reject_deferring_without_fields() {
        let result = Registry::builder()
            .table(TableSpec::deferring("ingredient"))
            .build();
        assert!(matches!(result, Err(Error::InvalidRegistry(_))));

        let result = Registry::builder()
            .table(TableSpec::referenced("recipe"))
            .table(TableSpec::dependent("step").defer("recipe_id", "recipe"))
            .build();
        assert!(matches!(result, Err(Error::InvalidRegistry(_))));
    }

    #[test]
    fn split_deferred_nulls_and_queues() {
        let registry = kitchen().build().unwrap();
        let ingredient = registry.table("ingredient").unwrap();

        let rows = vec![
            Record::new()
                .with("id", "I1")
                .with("produced_by_recipe_id", "R1")
                .with("name", "Stock"),
            Record::new().with("id", "I2").with("produced_by_recipe_id", Value::Null),
            Record::new().with("id", "I3"),
        ];

        let deferred = ingredient.split_deferred(&rows).unwrap();

        assert_eq!(deferred.rows.len(), 3);
        for row in &deferred.rows[..2] {
            assert_eq!(row.get("produced_by_recipe_id"), Some(&Value::Null));
        }
        assert_eq!(deferred.rows[2], rows[2]);
        assert_eq!(deferred.rows[0].get("name"), Some(&json!("Stock")));
        assert_eq!(
            deferred.patches,
            vec![Patch {
                table: "ingredient".into(),
                record_id: RecordId::from("I1"),
                field: "produced_by_recipe_id".into(),
                value: json!("R1"),
            }]
        );
    }

    #[test]
    fn split_deferred_requires_id_for_patch() {
        let registry = kitchen().build().unwrap();
        let ingredient = registry.table("ingredient").unwrap();
        let rows = vec![Record::new().with("produced_by_recipe_id", "R1")];

        let result = ingredient.split_deferred(&rows);
        assert!(matches!(result, Err(Error::MalformedBody(_))));
    }

    #[test]
    fn multiple_deferred_fields() {
        let registry = Registry::builder()
            .table(
                TableSpec::deferring("ingredient")
                    .defer("produced_by_recipe_id", "recipe")
                    .defer("preferred_recipe_id", "recipe"),
            )
            .table(TableSpec::referenced("recipe"))
            .build()
            .unwrap();

        let rows = vec![Record::new()
            .with("id", 1)
            .with("produced_by_recipe_id", 10)
            .with("preferred_recipe_id", 11)];
        let deferred = registry
            .table("ingredient")
            .unwrap()
            .split_deferred(&rows)
            .unwrap();

        assert_eq!(deferred.patches.len(), 2);
        assert_eq!(deferred.patches[1].field, "preferred_recipe_id");
        assert_eq!(deferred.patches[1].value, json!(11));
    }

    #[test]
    fn strip_binary_fields() {
        let table = TableSpec::referenced("recipe").with_binary_fields(["image_data", "image_mime"]);
        let mut row = Record::new()
            .with("id", "R1")
            .with("image_data", "iVBORw0KGgo=")
            .with("image_mime", "image/png");
        table.strip_binary(&mut row);

        assert_eq!(row.get("image_data"), Some(&Value::Null));
        assert_eq!(row.get("image_mime"), Some(&Value::Null));
        assert_eq!(row.get("id"), Some(&json!("R1")));
    }

    #[test]
    fn pass_display() {
        assert_eq!(Pass::Independent.to_string(), "pass 1");
        assert_eq!(Pass::Dependent.to_string(), "pass 4");
    }
}
