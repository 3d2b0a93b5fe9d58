//! CSV rendering and reading of worksheet rows.

use crate::error::{CompileError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// A worksheet row type with a fixed column layout. Field order of the
/// serialized struct must follow `COLUMNS`.
pub trait Tabular: Serialize {
    const COLUMNS: &'static [&'static str];
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| CompileError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| CompileError::InvalidInput(format!("non UTF-8 CSV: {e}")))
}

/// Renders rows with a header line; empty tables still get their header.
pub fn to_csv<T: Tabular>(rows: &[T]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(vec![]);
    writer.write_record(T::COLUMNS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    finish(writer)
}

/// Renders free-form records, used by sheets whose columns vary per run.
pub fn write_records(headers: &[String], rows: &[Vec<String>], crlf: bool) -> Result<String> {
    let terminator = if crlf {
        csv::Terminator::CRLF
    } else {
        csv::Terminator::Any(b'\n')
    };
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(terminator)
        .from_writer(vec![]);
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row)?;
    }
    finish(writer)
}

pub fn from_csv<T: DeserializeOwned>(text: &str) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());
    let mut rows = vec![];
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

/// Cells of one serialized row, in column order.
pub fn to_record<T: Serialize>(row: &T) -> Result<Vec<String>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(vec![]);
    writer.serialize(row)?;
    let line = finish(writer)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(line.as_bytes());
    match reader.records().next() {
        Some(record) => Ok(record?.iter().map(str::to_string).collect()),
        None => Ok(vec![]),
    }
}

/// An untyped sheet, for worksheets whose columns are only known at run
/// time (trial results, hand-made assembly sheets).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn from_csv(text: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());
        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = vec![];
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, rows })
    }

    pub fn to_csv(&self) -> Result<String> {
        write_records(&self.headers, &self.rows, false)
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn require(&self, name: &str) -> Result<usize> {
        self.column(name)
            .ok_or_else(|| CompileError::InvalidInput(format!("worksheet has no column '{name}'")))
    }

    /// Cell of `row`; blank and missing cells are `None`.
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(|c| c.trim())
            .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("nan"))
    }
}

/// Formats a float the way the worksheets print them: integral values keep
/// one decimal.
pub fn float_cell(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// Boolean cells written by spreadsheet tools come as `True`, `TRUE`, `1`...
pub mod flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "True" } else { "False" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        let text = String::deserialize(deserializer)?;
        match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "y" | "t" => Ok(true),
            "false" | "0" | "no" | "n" | "f" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!("not a boolean: {other}"))),
        }
    }
}

/// Optional cells: empty, whitespace-only and `nan` read as `None`, anything
/// else goes through `FromStr`.
pub mod blank {
    use serde::{Deserialize, Deserializer};
    use std::fmt::Display;
    use std::str::FromStr;

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr,
        T::Err: Display,
    {
        let text = Option::<String>::deserialize(deserializer)?;
        match text.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(t) if t.eq_ignore_ascii_case("nan") => Ok(None),
            Some(t) => t.parse().map(Some).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Row {
        #[serde(rename = "NAME")]
        name: String,
        #[serde(rename = "OK", with = "flag")]
        ok: bool,
        #[serde(rename = "NOTE")]
        note: Option<String>,
    }

    impl Tabular for Row {
        const COLUMNS: &'static [&'static str] = &["NAME", "OK", "NOTE"];
    }

    #[test]
    fn test_empty_table_keeps_header() {
        let text = to_csv::<Row>(&[]).unwrap();
        assert_eq!(text, "NAME,OK,NOTE\n");
    }

    #[test]
    fn test_rows_and_reading_back() {
        let rows = vec![
            Row {
                name: "a".to_string(),
                ok: true,
                note: None,
            },
            Row {
                name: "b,c".to_string(),
                ok: false,
                note: Some("x".to_string()),
            },
        ];
        let text = to_csv(&rows).unwrap();
        assert_eq!(text, "NAME,OK,NOTE\na,True,\n\"b,c\",False,x\n");
        let back: Vec<Row> = from_csv(&text).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn test_write_records_crlf() {
        let text = write_records(
            &["a".to_string(), "b".to_string()],
            &[vec!["1".to_string(), String::new()]],
            true,
        )
        .unwrap();
        assert_eq!(text, "a,b\r\n1,\r\n");
    }

    #[test]
    fn test_to_record() {
        let row = Row {
            name: "b,c".to_string(),
            ok: true,
            note: None,
        };
        assert_eq!(to_record(&row).unwrap(), vec!["b,c", "True", ""]);
    }

    #[test]
    fn test_blank_cells_read_as_none() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Volume {
            #[serde(rename = "V", deserialize_with = "blank::deserialize")]
            volume: Option<u32>,
        }
        let rows: Vec<Volume> = from_csv("V\n5\n\" \"\nnan\n").unwrap();
        assert_eq!(
            rows.iter().map(|r| r.volume).collect::<Vec<_>>(),
            vec![Some(5), None, None]
        );
        assert!(from_csv::<Volume>("V\nfive\n").is_err());
    }

    #[test]
    fn test_sheet_cells() {
        let sheet = Sheet::from_csv("A,B\n1,\n2,nan\n3,x\n").unwrap();
        let b = sheet.require("B").unwrap();
        assert_eq!(sheet.cell(0, b), None);
        assert_eq!(sheet.cell(1, b), None);
        assert_eq!(sheet.cell(2, b), Some("x"));
        assert!(sheet.require("C").is_err());
        assert_eq!(sheet.to_csv().unwrap(), "A,B\n1,\n2,nan\n3,x\n");
    }

    #[test]
    fn test_float_cell() {
        assert_eq!(float_cell(65.0), "65.0");
        assert_eq!(float_cell(0.25), "0.25");
    }
}
