//! Newline-delimited JSON result decoding.
//!
//! The service exports each result row as one JSON object per line. Lines
//! that are not JSON objects do not abort the decode: they are kept aside
//! verbatim so the caller can print them, and the remaining rows still form
//! a table.

use std::collections::HashSet;
use std::io::BufRead;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// One result row: column name to value, in the order keys appeared.
pub type Row = Map<String, Value>;

/// Server-declared column description from the status response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    #[serde(default, rename = "type")]
    pub column_type: String,
    #[serde(default)]
    pub database_type: String,
}

/// Decoded query result, ready to hand to a renderer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Decoder output: the table plus any lines that could not be decoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    pub table: ResultTable,
    pub passthrough: Vec<String>,
}

/// Decode an NDJSON stream.
///
/// With non-empty `columns`, column order is exactly the metadata order.
/// Otherwise columns are listed in the order their keys are first seen.
pub fn decode<R: BufRead>(reader: R, columns: &[ColumnInfo]) -> Result<Decoded> {
    let mut decoded = Decoded::default();
    let infer_columns = columns.is_empty();
    let mut seen: HashSet<String> = HashSet::new();

    if !infer_columns {
        decoded.table.columns = columns.iter().map(|c| c.name.clone()).collect();
    }

    for line in reader.split(b'\n') {
        let mut line = line?;
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        // invalid UTF-8 fails here too and is passed through
        let row = match serde_json::from_slice::<Value>(&line) {
            Ok(Value::Object(row)) => row,
            _ => {
                decoded
                    .passthrough
                    .push(String::from_utf8_lossy(&line).into_owned());
                continue;
            }
        };

        if infer_columns {
            for key in row.keys() {
                if seen.insert(key.clone()) {
                    decoded.table.columns.push(key.clone());
                }
            }
        }

        decoded.table.rows.push(row);
    }

    Ok(decoded)
}
