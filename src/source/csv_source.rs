//! CSV row source
//!
//! The first record is the header row. Cell values are typed dynamically:
//! empty cells become null, `true`/`false` become booleans and numeric text
//! becomes a number. Everything else stays a string.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Number, Value};
use tokio::sync::mpsc;
use tracing::debug;

use super::{CHANNEL_CAPACITY, DEFAULT_BATCH_ROWS, ParseMode, RowEvent, RowSource};
use crate::models::Row;

/// Largest integer that survives a round trip through `f64`
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

#[derive(Debug, Clone)]
enum CsvInput {
    Path(PathBuf),
    Bytes(Arc<[u8]>),
}

/// Streams rows from CSV text on a blocking worker
#[derive(Debug, Clone)]
pub struct CsvRowSource {
    name: String,
    input: CsvInput,
    delimiter: u8,
    batch_rows: usize,
}

impl CsvRowSource {
    /// Read from a file; the source is named after the file stem
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("data")
            .to_string();
        Self {
            name,
            input: CsvInput::Path(path.to_path_buf()),
            delimiter: b',',
            batch_rows: DEFAULT_BATCH_ROWS,
        }
    }

    /// Read from CSV text already in memory
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        Self {
            name: name.into(),
            input: CsvInput::Bytes(Arc::from(bytes)),
            delimiter: b',',
            batch_rows: DEFAULT_BATCH_ROWS,
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_batch_rows(mut self, batch_rows: usize) -> Self {
        self.batch_rows = batch_rows.max(1);
        self
    }
}

impl RowSource for CsvRowSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn stream(&self, mode: ParseMode) -> mpsc::Receiver<RowEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let input = self.input.clone();
        let delimiter = self.delimiter;
        let batch_rows = self.batch_rows;

        tokio::task::spawn_blocking(move || {
            let reader: Box<dyn Read + Send> = match &input {
                CsvInput::Path(path) => match File::open(path) {
                    Ok(file) => Box::new(file),
                    Err(e) => {
                        let _ = tx.blocking_send(RowEvent::Error(format!(
                            "Failed to open {}: {e}",
                            path.display()
                        )));
                        return;
                    }
                },
                CsvInput::Bytes(bytes) => Box::new(std::io::Cursor::new(Arc::clone(bytes))),
            };
            parse_csv(reader, delimiter, mode, batch_rows, &tx);
        });
        rx
    }
}

/// Parse CSV from `reader`, sending batches to `tx`
fn parse_csv<R: Read>(
    reader: R,
    delimiter: u8,
    mode: ParseMode,
    batch_rows: usize,
    tx: &mpsc::Sender<RowEvent>,
) {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(reader);

    let headers = match rdr.headers() {
        Ok(h) => unique_headers(h.iter()),
        Err(e) => {
            let _ = tx.blocking_send(RowEvent::Error(e.to_string()));
            return;
        }
    };

    let limit = mode.limit();
    let mut batch: Vec<Row> = Vec::with_capacity(batch_rows);
    let mut count = 0usize;

    for record in rdr.records() {
        if limit.is_some_and(|cap| count >= cap) {
            break;
        }
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                let _ = tx.blocking_send(RowEvent::Error(e.to_string()));
                return;
            }
        };

        // Short records leave trailing fields absent, extra cells are dropped
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .map(|(h, cell)| (h.clone(), typed_value(cell)))
            .collect();
        batch.push(row);
        count += 1;

        if batch.len() >= batch_rows {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_rows));
            if tx.blocking_send(RowEvent::Data(full)).is_err() {
                // Receiver dropped
                return;
            }
        }
    }

    if !batch.is_empty() && tx.blocking_send(RowEvent::Data(batch)).is_err() {
        return;
    }
    debug!(rows = count, preview = limit.is_some(), "CSV parse complete");
    let _ = tx.blocking_send(RowEvent::Complete);
}

/// Rename repeated header names to `name_1`, `name_2`, ...
fn unique_headers<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        let mut candidate = name.to_string();
        let mut n = 1;
        while out.contains(&candidate) {
            candidate = format!("{name}_{n}");
            n += 1;
        }
        out.push(candidate);
    }
    out
}

/// Type a raw CSV cell
pub fn typed_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    match raw {
        "true" | "TRUE" | "True" => return Value::Bool(true),
        "false" | "FALSE" | "False" => return Value::Bool(false),
        _ => {}
    }

    let trimmed = raw.trim();
    if looks_numeric(trimmed)
        && let Ok(f) = trimmed.parse::<f64>()
        && f.is_finite()
    {
        if f.fract() == 0.0 {
            // Out-of-range integers would lose digits
            if f.abs() > MAX_SAFE_INTEGER {
                return Value::String(raw.to_string());
            }
            return Value::from(f as i64);
        }
        if let Some(n) = Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

fn looks_numeric(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() || c == '-' || c == '.' => {}
        _ => return false,
    }
    s.chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::collect_rows;
    use serde_json::json;

    const CSV: &str = "Product,Price,InStock,Note\nA,10,true,\nB,2.5,FALSE,x|y\nA,99,true,007\n";

    #[test]
    fn test_typed_value() {
        assert_eq!(typed_value(""), Value::Null);
        assert_eq!(typed_value("true"), json!(true));
        assert_eq!(typed_value("False"), json!(false));
        assert_eq!(typed_value("42"), json!(42));
        assert_eq!(typed_value("-1.5"), json!(-1.5));
        assert_eq!(typed_value("1e3"), json!(1000));
        assert_eq!(typed_value("+5"), json!("+5"));
        assert_eq!(typed_value("1-2"), json!("1-2"));
        assert_eq!(typed_value("inf"), json!("inf"));
        assert_eq!(typed_value("12345678901234567890"), json!("12345678901234567890"));
        assert_eq!(typed_value("abc"), json!("abc"));
    }

    #[tokio::test]
    async fn test_full_parse_types_cells() {
        let source = CsvRowSource::from_bytes("products", CSV);
        let rows = collect_rows(&source, ParseMode::Full).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["Price"], json!(10));
        assert_eq!(rows[0]["InStock"], json!(true));
        assert_eq!(rows[0]["Note"], Value::Null);
        assert_eq!(rows[1]["Price"], json!(2.5));
        assert_eq!(rows[1]["Note"], json!("x|y"));
        assert_eq!(rows[2]["Note"], json!(7));
    }

    #[tokio::test]
    async fn test_preview_stops_at_cap() {
        let mut text = String::from("n\n");
        for i in 0..50 {
            text.push_str(&format!("{i}\n"));
        }
        let source = CsvRowSource::from_bytes("numbers", text).with_batch_rows(4);
        let rows = collect_rows(&source, ParseMode::Preview(10)).await.unwrap();
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[9]["n"], json!(9));
    }

    #[tokio::test]
    async fn test_duplicate_headers_renamed() {
        let source = CsvRowSource::from_bytes("dup", "a,a,b\n1,2,3\n");
        let rows = collect_rows(&source, ParseMode::Full).await.unwrap();
        let keys: Vec<_> = rows[0].keys().cloned().collect();
        assert_eq!(keys, vec!["a", "a_1", "b"]);
    }

    #[tokio::test]
    async fn test_from_path_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.csv");
        std::fs::write(&path, CSV).unwrap();

        let source = CsvRowSource::from_path(&path);
        assert_eq!(source.name(), "orders");
        assert_eq!(collect_rows(&source, ParseMode::Full).await.unwrap().len(), 3);

        let missing = CsvRowSource::from_path(dir.path().join("nope.csv"));
        assert!(collect_rows(&missing, ParseMode::Full).await.is_err());
    }
}
