use crate::error::SearchError;
use crate::event::{display_value, lookup_path, Record};
use crate::flatten::flatten_record;
use crate::pipeline::executor::Output;
use indexmap::IndexSet;
use serde_json::Value;
use std::io::Write;

const MAX_CELL_WIDTH: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[value(name = "table", help = "Aligned columns for reading in a terminal")]
    Table,
    #[value(name = "json", help = "A single pretty-printed JSON document")]
    Json,
    #[default]
    #[value(name = "jsonl", help = "JSON Lines format (one JSON object per line)")]
    Jsonl,
    #[value(name = "csv", help = "Comma-separated values, nested fields flattened")]
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "jsonl" => Ok(OutputFormat::Jsonl),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Writes query output in one of the supported formats
pub struct OutputFormatter {
    format: OutputFormat,
    keys: Option<Vec<String>>,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat, keys: Option<Vec<String>>) -> Self {
        OutputFormatter { format, keys }
    }

    /// Restrict a record to `keys`, in that order, when keys were given. Keys may be dotted paths.
    fn filter_keys(&self, record: &Record) -> Record {
        match &self.keys {
            Some(keys) => keys
                .iter()
                .map(|key| (key.clone(), lookup_path(record, key).cloned().unwrap_or(Value::Null)))
                .collect(),
            None => record.clone(),
        }
    }

    pub fn write_output<W: Write>(&self, out: &mut W, output: &Output) -> Result<(), SearchError> {
        match output {
            Output::Records(records) => {
                let records: Vec<Record> = records.iter().map(|r| self.filter_keys(r)).collect();
                match self.format {
                    OutputFormat::Table => self.write_table(out, &records),
                    OutputFormat::Json => write_json(out, &Value::Array(records.into_iter().map(Value::Object).collect())),
                    OutputFormat::Jsonl => self.write_jsonl(out, &records),
                    OutputFormat::Csv => self.write_csv(out, &records),
                }
            }
            Output::Value(value) => self.write_value(out, value),
        }
    }

    fn write_value<W: Write>(&self, out: &mut W, value: &Value) -> Result<(), SearchError> {
        match (self.format, value) {
            (OutputFormat::Json, _) => write_json(out, value),
            (OutputFormat::Table, Value::Object(obj)) if obj.get("visualization") == Some(&Value::from("table")) => {
                self.write_descriptor(out, obj)
            }
            (OutputFormat::Table, Value::Object(_)) => write_json(out, value),
            (_, Value::Array(items)) if items.iter().all(Value::is_object) => {
                let records: Vec<Record> = items
                    .iter()
                    .filter_map(|v| v.as_object().map(|r| self.filter_keys(r)))
                    .collect();
                match self.format {
                    OutputFormat::Table => self.write_table(out, &records),
                    OutputFormat::Csv => self.write_csv(out, &records),
                    _ => self.write_jsonl(out, &records),
                }
            }
            (OutputFormat::Csv, Value::Object(obj)) => self.write_csv(out, &[self.filter_keys(obj)]),
            (OutputFormat::Table | OutputFormat::Csv, scalar) => {
                writeln!(out, "{}", display_value(scalar))?;
                Ok(())
            }
            (OutputFormat::Jsonl, other) => {
                writeln!(out, "{}", other)?;
                Ok(())
            }
        }
    }

    fn write_jsonl<W: Write>(&self, out: &mut W, records: &[Record]) -> Result<(), SearchError> {
        for record in records {
            writeln!(out, "{}", Value::Object(record.clone()))?;
        }
        Ok(())
    }

    fn write_csv<W: Write>(&self, out: &mut W, records: &[Record]) -> Result<(), SearchError> {
        let flat: Vec<Record> = records.iter().map(flatten_record).collect();
        let columns = match &self.keys {
            Some(keys) => keys.iter().cloned().collect::<IndexSet<String>>(),
            None => flat.iter().flat_map(|r| r.keys().cloned()).collect(),
        };

        let mut writer = csv::Writer::from_writer(out);
        writer.write_record(&columns).map_err(std::io::Error::from)?;
        for record in &flat {
            let row = columns.iter().map(|column| match record.get(column) {
                None | Some(Value::Null) => String::new(),
                Some(value) => display_value(value),
            });
            writer.write_record(row).map_err(std::io::Error::from)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn write_table<W: Write>(&self, out: &mut W, records: &[Record]) -> Result<(), SearchError> {
        let columns: IndexSet<String> = match &self.keys {
            Some(keys) => keys.iter().cloned().collect(),
            None => records.iter().flat_map(|r| r.keys().cloned()).collect(),
        };
        let rows: Vec<Vec<String>> = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|column| match record.get(column) {
                        None | Some(Value::Null) => String::new(),
                        Some(value) => display_value(value),
                    })
                    .collect()
            })
            .collect();
        let header: Vec<String> = columns.into_iter().collect();
        write_aligned(out, &header, &rows)
    }

    /// Render a `table` visualization descriptor's columns and encoded cells
    fn write_descriptor<W: Write>(&self, out: &mut W, descriptor: &Record) -> Result<(), SearchError> {
        let header: Vec<String> = descriptor
            .get("columns")
            .and_then(Value::as_array)
            .map(|columns| {
                columns
                    .iter()
                    .map(|c| c.get("title").map(display_value).unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default();
        let rows: Vec<Vec<String>> = descriptor
            .get("data")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .map(|row| {
                        row.as_array()
                            .map(|cells| cells.iter().map(display_value).collect())
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .unwrap_or_default();
        write_aligned(out, &header, &rows)
    }
}

fn write_json<W: Write>(out: &mut W, value: &Value) -> Result<(), SearchError> {
    serde_json::to_writer_pretty(&mut *out, value).map_err(std::io::Error::from)?;
    writeln!(out)?;
    Ok(())
}

fn truncate(cell: &str) -> String {
    let single_line = cell.replace('\n', " ");
    if single_line.chars().count() <= MAX_CELL_WIDTH {
        return single_line;
    }
    let mut cut: String = single_line.chars().take(MAX_CELL_WIDTH - 1).collect();
    cut.push('…');
    cut
}

fn write_aligned<W: Write>(out: &mut W, header: &[String], rows: &[Vec<String>]) -> Result<(), SearchError> {
    if header.is_empty() {
        return Ok(());
    }
    let rows: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(|c| truncate(c)).collect())
        .collect();
    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    writeln!(out, "{}", line(header))?;
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    writeln!(out, "{}", line(&rule))?;
    for row in &rows {
        writeln!(out, "{}", line(row))?;
    }
    Ok(())
}
