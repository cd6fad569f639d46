//! Output formatting for anql
//!
//! Supports three result formats:
//! - Table: box-drawing grid with numeric columns right-aligned (default)
//! - CSV: RFC 4180 style, quoted only when needed
//! - JSON: pretty-printed array of row objects
//!
//! Also renders the table listing and schema grids used by `.tables` and
//! `.schema`.

use std::io::{self, Write};

use colored::*;
use serde_json::{Map, Number, Value};
use tabled::{
    builder::Builder,
    settings::{object::Columns, Alignment, Style},
};

use crate::config::OutputFormat;
use crate::decoder::ResultTable;
use crate::schema::ColumnDef;

/// A column is numeric when more than this share of its non-null values are numbers.
pub const NUMERIC_THRESHOLD: f64 = 0.8;

/// Largest integer a double represents exactly (2^53).
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

const EMPTY_RESULT: &str = "No results found.";

/// Format and print output based on the configured format
pub struct Formatter {
    format: OutputFormat,
    colored: bool,
}

impl Formatter {
    pub fn new(format: OutputFormat, colored: bool) -> Self {
        Self { format, colored }
    }

    /// Render a decoded result in the configured format
    pub fn write_result<W: Write>(&self, table: &ResultTable, out: &mut W) -> io::Result<()> {
        match self.format {
            OutputFormat::Table => render_table(table, out),
            OutputFormat::Csv => render_csv(table, out),
            OutputFormat::Json => render_json(table, out),
        }
    }

    /// Print an error message
    pub fn print_error(&self, message: &str) {
        if self.colored {
            eprintln!("{}", message.red());
        } else {
            eprintln!("{}", message);
        }
    }
}

/// Whether `column` holds mostly numbers across the rows that carry a non-null value for it.
pub fn is_numeric_column(table: &ResultTable, column: &str) -> bool {
    let mut total = 0usize;
    let mut numeric = 0usize;

    for row in &table.rows {
        match row.get(column) {
            None | Some(Value::Null) => {}
            Some(value) => {
                total += 1;
                if value.is_number() {
                    numeric += 1;
                }
            }
        }
    }

    total > 0 && (numeric as f64 / total as f64) > NUMERIC_THRESHOLD
}

/// Text used for a single value in table and CSV output.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n),
        other => other.to_string(),
    }
}

fn format_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 => format!("{:.0}", f),
        Some(f) => format!("{:.2}", f),
        None => n.to_string(),
    }
}

/// Quote a CSV field when it contains a comma, quote, CR or LF.
pub fn escape_csv_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub fn render_table<W: Write>(table: &ResultTable, out: &mut W) -> io::Result<()> {
    if table.is_empty() {
        return writeln!(out, "{}", EMPTY_RESULT);
    }

    let mut builder = Builder::default();
    builder.push_record(table.columns.iter().cloned());
    for row in &table.rows {
        builder.push_record(
            table
                .columns
                .iter()
                .map(|col| row.get(col).map(format_value).unwrap_or_default()),
        );
    }

    let mut grid = builder.build();
    grid.with(Style::sharp());
    for (idx, col) in table.columns.iter().enumerate() {
        if is_numeric_column(table, col) {
            grid.modify(Columns::single(idx), Alignment::right());
        }
    }

    writeln!(out, "{}", grid)?;
    writeln!(out)?;
    writeln!(out, "({} rows)", table.row_count())
}

pub fn render_csv<W: Write>(table: &ResultTable, out: &mut W) -> io::Result<()> {
    if table.is_empty() {
        return writeln!(out, "{}", EMPTY_RESULT);
    }

    let header: Vec<String> = table.columns.iter().map(|c| escape_csv_field(c)).collect();
    writeln!(out, "{}", header.join(","))?;

    for row in &table.rows {
        let fields: Vec<String> = table
            .columns
            .iter()
            .map(|col| {
                let text = row.get(col).map(format_value).unwrap_or_default();
                escape_csv_field(&text)
            })
            .collect();
        writeln!(out, "{}", fields.join(","))?;
    }

    Ok(())
}

pub fn render_json<W: Write>(table: &ResultTable, out: &mut W) -> io::Result<()> {
    if table.is_empty() {
        return writeln!(out, "[]");
    }

    let rows: Vec<Value> = table
        .rows
        .iter()
        .map(|row| {
            let mut ordered = Map::new();
            for col in &table.columns {
                if let Some(value) = row.get(col) {
                    ordered.insert(col.clone(), collapse_whole_float(value));
                }
            }
            for (key, value) in row {
                if !ordered.contains_key(key) {
                    ordered.insert(key.clone(), collapse_whole_float(value));
                }
            }
            Value::Object(ordered)
        })
        .collect();

    let text = serde_json::to_string_pretty(&rows).map_err(io::Error::other)?;
    writeln!(out, "{}", text)
}

fn collapse_whole_float(value: &Value) -> Value {
    if let Value::Number(n) = value {
        if !n.is_i64() && !n.is_u64() {
            if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f.abs() < MAX_EXACT_FLOAT_INT {
                    return Value::from(f as i64);
                }
            }
        }
    }
    value.clone()
}

/// Single-column box listing table names.
pub fn render_table_list<W: Write>(names: &[String], out: &mut W) -> io::Result<()> {
    if names.is_empty() {
        return writeln!(out, "No tables found.");
    }

    let width = names
        .iter()
        .map(|n| n.chars().count())
        .max()
        .unwrap_or(0)
        .max(42);

    writeln!(out, "Tables:")?;
    writeln!(out, "┌{}┐", "─".repeat(width + 2))?;
    for name in names {
        writeln!(out, "│ {:<width$} │", name, width = width)?;
    }
    writeln!(out, "└{}┘", "─".repeat(width + 2))?;
    writeln!(out)?;
    writeln!(out, "({} tables)", names.len())
}

/// Column/Type grid for one table, with a Description column when any column has one.
pub fn render_schema_grid<W: Write>(
    columns: &[ColumnDef],
    description_width: usize,
    out: &mut W,
) -> io::Result<()> {
    let with_descriptions = columns.iter().any(|c| !c.description.is_empty());

    let mut builder = Builder::default();
    if with_descriptions {
        builder.push_record(["Column", "Type", "Description"]);
    } else {
        builder.push_record(["Column", "Type"]);
    }

    for col in columns {
        let mut record = vec![col.name.clone(), col.column_type.clone()];
        if with_descriptions {
            let desc = if col.description.is_empty() {
                "-".to_string()
            } else {
                truncate(&col.description, description_width)
            };
            record.push(desc);
        }
        builder.push_record(record);
    }

    let mut grid = builder.build();
    grid.with(Style::sharp());
    writeln!(out, "{}", grid)?;
    writeln!(out, "({} columns)", columns.len())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(columns: &[&str], rows: Vec<Value>) -> ResultTable {
        ResultTable {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .into_iter()
                .map(|v| match v {
                    Value::Object(map) => map,
                    _ => panic!("test rows must be objects"),
                })
                .collect(),
        }
    }

    fn render(format: OutputFormat, t: &ResultTable) -> String {
        let mut buf = Vec::new();
        Formatter::new(format, false).write_result(t, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&Value::Null), "NULL");
        assert_eq!(format_value(&json!("abc")), "abc");
        assert_eq!(format_value(&json!(42)), "42");
        assert_eq!(format_value(&json!(42.0)), "42");
        assert_eq!(format_value(&json!(3.14159)), "3.14");
        assert_eq!(format_value(&json!(true)), "true");
        assert_eq!(format_value(&json!([1, 2])), "[1,2]");
        assert_eq!(format_value(&json!({"k": "v"})), "{\"k\":\"v\"}");
    }

    #[test]
    fn test_numeric_threshold() {
        // 4 of 5 numbers is exactly 80%, which is not enough
        let t = table(
            &["v"],
            vec![
                json!({"v": 1}),
                json!({"v": 2}),
                json!({"v": 3}),
                json!({"v": 4}),
                json!({"v": "x"}),
            ],
        );
        assert!(!is_numeric_column(&t, "v"));

        // nulls and absent keys do not count
        let t = table(
            &["v"],
            vec![json!({"v": 1}), json!({"v": null}), json!({}), json!({"v": 2.5})],
        );
        assert!(is_numeric_column(&t, "v"));

        let t = table(&["v"], vec![json!({"v": null})]);
        assert!(!is_numeric_column(&t, "v"));
    }

    #[test]
    fn test_table_alignment_and_summary() {
        let t = table(
            &["name", "count"],
            vec![json!({"name": "alpha", "count": 5}), json!({"name": "b", "count": 12345})],
        );
        let out = render(OutputFormat::Table, &t);

        assert!(out.contains("┌"));
        assert!(out.contains("│ name  │ count │"));
        assert!(out.contains("│ alpha │     5 │"));
        assert!(out.contains("│ b     │ 12345 │"));
        assert!(out.ends_with("\n(2 rows)\n"));
    }

    #[test]
    fn test_table_absent_and_null_cells() {
        let t = table(&["a", "b"], vec![json!({"a": "x", "b": null}), json!({"a": "y"})]);
        let out = render(OutputFormat::Table, &t);
        assert!(out.contains("│ x │ NULL │"));
        assert!(out.contains("│ y │      │"));
    }

    #[test]
    fn test_csv_quoting() {
        let t = table(
            &["id", "note"],
            vec![
                json!({"id": 1, "note": "plain"}),
                json!({"id": 2, "note": "a,b"}),
                json!({"id": 3, "note": "say \"hi\""}),
                json!({"id": 4, "note": "two\nlines"}),
            ],
        );
        let out = render(OutputFormat::Csv, &t);
        let lines: Vec<&str> = out.split_terminator('\n').collect();
        assert_eq!(lines[0], "id,note");
        assert_eq!(lines[1], "1,plain");
        assert_eq!(lines[2], "2,\"a,b\"");
        assert_eq!(lines[3], "3,\"say \"\"hi\"\"\"");
        assert_eq!(lines[4], "4,\"two");
        assert_eq!(lines[5], "lines\"");
    }

    #[test]
    fn test_json_output_preserves_values() {
        let t = table(
            &["b", "a"],
            vec![json!({"a": 1.0, "b": "x"}), json!({"a": 2.5, "b": null})],
        );
        let out = render(OutputFormat::Json, &t);
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, json!([{"b": "x", "a": 1}, {"b": null, "a": 2.5}]));
        // column order is kept in the text
        let first = out.find("\"b\"").unwrap();
        let second = out.find("\"a\"").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_empty_results() {
        let t = table(&["a"], vec![]);
        assert_eq!(render(OutputFormat::Json, &t), "[]\n");
        assert_eq!(render(OutputFormat::Table, &t), "No results found.\n");
        assert_eq!(render(OutputFormat::Csv, &t), "No results found.\n");
    }

    #[test]
    fn test_table_list() {
        let mut buf = Vec::new();
        render_table_list(&["Harvest".to_string(), "Sims".to_string()], &mut buf).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.starts_with("Tables:\n┌"));
        assert!(out.contains(&format!("│ {:<42} │", "Harvest")));
        assert!(out.ends_with("(2 tables)\n"));
    }

    #[test]
    fn test_schema_grid_descriptions() {
        let columns = vec![
            ColumnDef {
                name: "imsi".to_string(),
                column_type: "VARCHAR".to_string(),
                description: "x".repeat(60),
            },
            ColumnDef {
                name: "ts".to_string(),
                column_type: "BIGINT".to_string(),
                description: String::new(),
            },
        ];
        let mut buf = Vec::new();
        render_schema_grid(&columns, 40, &mut buf).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.contains("Description"));
        assert!(out.contains(&format!("{}...", "x".repeat(37))));
        assert!(!out.contains(&"x".repeat(38)));
        assert!(out.contains("│ -"));
        assert!(out.ends_with("(2 columns)\n"));
    }

    #[test]
    fn test_schema_grid_without_descriptions() {
        let columns = vec![ColumnDef {
            name: "imsi".to_string(),
            column_type: "VARCHAR".to_string(),
            description: String::new(),
        }];
        let mut buf = Vec::new();
        render_schema_grid(&columns, 50, &mut buf).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(!out.contains("Description"));
        assert!(out.contains("│ imsi   │ VARCHAR │"));
    }

    #[test]
    fn test_formatter_empty_result_per_format() {
        let empty = ResultTable::default();
        let render = |format| {
            let mut buf = Vec::new();
            Formatter::new(format, false).write_result(&empty, &mut buf).unwrap();
            String::from_utf8(buf).unwrap()
        };
        assert_eq!(render(OutputFormat::Json), "[]\n");
        assert_eq!(render(OutputFormat::Csv), "No results found.\n");
        assert_eq!(render(OutputFormat::Table), "No results found.\n");
    }
}
