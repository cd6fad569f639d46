//! Schema catalog extraction.
//!
//! The schemas endpoint has shipped several document shapes over time. Each
//! shape is handled by one extraction strategy; strategies are tried in
//! order and the first one that finds any table wins.

use std::collections::BTreeMap;
use std::io::{self, Write};

use serde_json::{Map, Value};

use crate::error::{CliError, Result};
use crate::format::render_schema_grid;

/// Description width when every table is shown at once.
pub const ALL_TABLES_DESCRIPTION_WIDTH: usize = 40;
/// Description width when a single table is shown.
pub const SINGLE_TABLE_DESCRIPTION_WIDTH: usize = 50;

const UNKNOWN_TYPE: &str = "UNKNOWN";
const NON_TABLE_KEYS: &[&str] = &["version", "metadata", "info"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: String,
    pub description: String,
}

/// Table name to its columns, sorted by table name.
pub type Catalog = BTreeMap<String, Vec<ColumnDef>>;

type TableStrategy = fn(&Map<String, Value>) -> Catalog;
type ColumnStrategy = fn(&Map<String, Value>) -> Vec<ColumnDef>;

const TABLE_STRATEGIES: &[TableStrategy] = &[
    tables_array,
    tables_map,
    nested_schemas,
    top_level_tables,
];

const COLUMN_STRATEGIES: &[ColumnStrategy] = &[
    column_info,
    columns_array,
    columns_map,
    fields_array,
];

/// Extract every table and its columns from a schema document.
pub fn extract_catalog(doc: &Value) -> Catalog {
    let Some(root) = doc.as_object() else {
        return Catalog::new();
    };

    TABLE_STRATEGIES
        .iter()
        .map(|strategy| strategy(root))
        .find(|catalog| !catalog.is_empty())
        .unwrap_or_default()
}

/// Sorted table names found in a schema document.
pub fn table_names(doc: &Value) -> Vec<String> {
    extract_catalog(doc).into_keys().collect()
}

/// Case-insensitive lookup; returns the table's canonical name and columns.
pub fn find_table<'a>(catalog: &'a Catalog, name: &str) -> Result<(&'a str, &'a [ColumnDef])> {
    if let Some((key, cols)) = catalog.get_key_value(name) {
        return Ok((key.as_str(), cols.as_slice()));
    }

    catalog
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(key, cols)| (key.as_str(), cols.as_slice()))
        .ok_or_else(|| CliError::TableNotFound(name.to_string()))
}

/// Render the schema for one table, or all tables when `table` is `None`.
///
/// When the document matches none of the known shapes and no table was
/// asked for, the raw document is printed instead.
pub fn write_schema<W: Write>(doc: &Value, table: Option<&str>, out: &mut W) -> Result<()> {
    let catalog = extract_catalog(doc);

    match table {
        Some(name) => {
            let (canonical, columns) = find_table(&catalog, name)?;
            writeln!(out, "Schema for table: {}", canonical)?;
            render_schema_grid(columns, SINGLE_TABLE_DESCRIPTION_WIDTH, out)?;
        }
        None if catalog.is_empty() => {
            writeln!(out, "No table schemas found in expected format.")?;
            writeln!(out, "Raw schema structure:")?;
            let pretty = serde_json::to_string_pretty(doc).map_err(io::Error::other)?;
            writeln!(out, "{}", pretty)?;
        }
        None => {
            writeln!(out, "Table Schemas:")?;
            writeln!(out)?;
            for (name, columns) in &catalog {
                writeln!(out, "Table: {}", name)?;
                render_schema_grid(columns, ALL_TABLES_DESCRIPTION_WIDTH, out)?;
                writeln!(out)?;
            }
        }
    }

    Ok(())
}

fn tables_array(root: &Map<String, Value>) -> Catalog {
    let Some(list) = root.get("tables").and_then(Value::as_array) else {
        return Catalog::new();
    };

    list.iter()
        .filter_map(Value::as_object)
        .filter_map(|table| {
            let name = table.get("name").and_then(Value::as_str)?;
            Some((name.to_string(), extract_columns(table)))
        })
        .collect()
}

fn tables_map(root: &Map<String, Value>) -> Catalog {
    root.get("tables")
        .and_then(Value::as_object)
        .map(tables_from_map)
        .unwrap_or_default()
}

fn nested_schemas(root: &Map<String, Value>) -> Catalog {
    let mut catalog = Catalog::new();

    for key in ["schemas", "databases"] {
        let Some(groups) = root.get(key).and_then(Value::as_object) else {
            continue;
        };
        for group in groups.values().filter_map(Value::as_object) {
            if let Some(tables) = group.get("tables").and_then(Value::as_object) {
                catalog.extend(tables_from_map(tables));
            }
        }
    }

    catalog
}

fn top_level_tables(root: &Map<String, Value>) -> Catalog {
    root.iter()
        .filter(|(key, _)| !NON_TABLE_KEYS.contains(&key.as_str()))
        .filter_map(|(key, value)| {
            let table = value.as_object()?;
            if !table.contains_key("columns") {
                return None;
            }
            let columns = extract_columns(table);
            (!columns.is_empty()).then(|| (key.clone(), columns))
        })
        .collect()
}

fn tables_from_map(tables: &Map<String, Value>) -> Catalog {
    tables
        .iter()
        .filter_map(|(name, data)| {
            let table = data.as_object()?;
            Some((name.clone(), extract_columns(table)))
        })
        .collect()
}

fn extract_columns(table: &Map<String, Value>) -> Vec<ColumnDef> {
    COLUMN_STRATEGIES
        .iter()
        .map(|strategy| strategy(table))
        .find(|columns| !columns.is_empty())
        .unwrap_or_default()
}

fn first_str<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    // First key present wins, even when its value is not a string.
    keys.iter()
        .find_map(|key| obj.get(*key))
        .and_then(Value::as_str)
}

fn column(name: &str, column_type: Option<&str>, description: &str) -> ColumnDef {
    let column_type = match column_type {
        Some(t) if !t.is_empty() => t,
        _ => UNKNOWN_TYPE,
    };
    ColumnDef {
        name: name.to_string(),
        column_type: column_type.to_string(),
        description: description.to_string(),
    }
}

fn column_info(table: &Map<String, Value>) -> Vec<ColumnDef> {
    let Some(list) = table.get("columnInfo").and_then(Value::as_array) else {
        return Vec::new();
    };

    list.iter()
        .filter_map(Value::as_object)
        .filter_map(|info| {
            let name = info.get("name").and_then(Value::as_str).filter(|n| !n.is_empty())?;
            let column_type = first_str(info, &["databaseType", "type"]);
            let description = info.get("description").and_then(Value::as_str).unwrap_or("");
            Some(column(name, column_type, description))
        })
        .collect()
}

fn columns_array(table: &Map<String, Value>) -> Vec<ColumnDef> {
    let Some(list) = table.get("columns").and_then(Value::as_array) else {
        return Vec::new();
    };

    list.iter()
        .filter_map(Value::as_object)
        .filter_map(|col| {
            let name = first_str(col, &["name", "column_name"]).filter(|n| !n.is_empty())?;
            let column_type = first_str(col, &["type", "data_type", "column_type"]);
            Some(column(name, column_type, ""))
        })
        .collect()
}

fn columns_map(table: &Map<String, Value>) -> Vec<ColumnDef> {
    let Some(map) = table.get("columns").and_then(Value::as_object) else {
        return Vec::new();
    };

    map.iter()
        .map(|(name, data)| {
            let column_type = match data {
                Value::Object(info) => first_str(info, &["type", "data_type"]),
                Value::String(t) => Some(t.as_str()),
                _ => None,
            };
            column(name, column_type, "")
        })
        .collect()
}

fn fields_array(table: &Map<String, Value>) -> Vec<ColumnDef> {
    let Some(list) = table.get("fields").and_then(Value::as_array) else {
        return Vec::new();
    };

    list.iter()
        .filter_map(Value::as_object)
        .filter_map(|field| {
            let name = field.get("name").and_then(Value::as_str).filter(|n| !n.is_empty())?;
            Some(column(name, field.get("type").and_then(Value::as_str), ""))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tables_array_with_column_info() {
        let doc = json!({
            "tables": [
                {
                    "name": "SIM_SESSION_EVENTS",
                    "columnInfo": [
                        {"name": "imsi", "type": "string", "databaseType": "VARCHAR", "description": "IMSI"},
                        {"name": "ts", "type": "number"}
                    ]
                },
                {"name": "HARVEST_DATA", "columns": [{"column_name": "payload", "data_type": "VARIANT"}]}
            ]
        });

        let catalog = extract_catalog(&doc);
        assert_eq!(
            catalog.keys().collect::<Vec<_>>(),
            vec!["HARVEST_DATA", "SIM_SESSION_EVENTS"]
        );

        let sims = &catalog["SIM_SESSION_EVENTS"];
        assert_eq!(sims[0].column_type, "VARCHAR");
        assert_eq!(sims[0].description, "IMSI");
        assert_eq!(sims[1].column_type, "number");

        let harvest = &catalog["HARVEST_DATA"];
        assert_eq!(harvest[0].name, "payload");
        assert_eq!(harvest[0].column_type, "VARIANT");
    }

    #[test]
    fn test_tables_map_with_columns_map() {
        let doc = json!({
            "tables": {
                "orders": {"columns": {"id": {"type": "BIGINT"}, "note": "TEXT", "odd": 5}}
            }
        });
        let catalog = extract_catalog(&doc);
        let orders = &catalog["orders"];
        let find = |n: &str| orders.iter().find(|c| c.name == n).unwrap().column_type.clone();
        assert_eq!(find("id"), "BIGINT");
        assert_eq!(find("note"), "TEXT");
        assert_eq!(find("odd"), "UNKNOWN");
    }

    #[test]
    fn test_nested_schemas() {
        let doc = json!({
            "schemas": {
                "public": {"tables": {"b": {"fields": [{"name": "x"}]}}}
            },
            "databases": {
                "main": {"tables": {"a": {"columns": [{"name": "y", "type": "INT"}]}}}
            }
        });
        let catalog = extract_catalog(&doc);
        assert_eq!(catalog.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(catalog["b"][0].column_type, "UNKNOWN");
    }

    #[test]
    fn test_top_level_tables_skip_metadata_keys() {
        let doc = json!({
            "version": {"columns": [{"name": "v"}]},
            "events": {"columns": [{"name": "id", "type": "INT"}]},
            "empty": {"columns": []}
        });
        assert_eq!(table_names(&doc), vec!["events"]);
    }

    #[test]
    fn test_find_table_case_insensitive() {
        let doc = json!({"tables": [{"name": "Sims", "columns": [{"name": "imsi"}]}]});
        let catalog = extract_catalog(&doc);
        let (name, cols) = find_table(&catalog, "SIMS").unwrap();
        assert_eq!(name, "Sims");
        assert_eq!(cols.len(), 1);

        let err = find_table(&catalog, "nope").unwrap_err();
        assert_eq!(err.to_string(), "table 'nope' not found");
    }

    #[test]
    fn test_write_schema_unknown_shape_prints_raw() {
        let doc = json!({"something": [1, 2]});
        let mut buf = Vec::new();
        write_schema(&doc, None, &mut buf).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.starts_with("No table schemas found in expected format."));
        assert!(out.contains("\"something\""));
    }

    #[test]
    fn test_write_schema_single_table() {
        let doc = json!({"tables": [{"name": "Sims", "columns": [{"name": "imsi", "type": "VARCHAR"}]}]});
        let mut buf = Vec::new();
        write_schema(&doc, Some("sims"), &mut buf).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.starts_with("Schema for table: Sims\n"));
        assert!(out.ends_with("(1 columns)\n"));
    }

    #[test]
    fn test_non_object_document() {
        assert!(extract_catalog(&json!([1, 2, 3])).is_empty());
    }
}
