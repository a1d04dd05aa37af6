//! Comma-separated tables with a header row.
//!
//! Every table this crate exchanges (result rows, counterbalancing sheets,
//! fitted parameters, predictors) holds identifiers and numbers only, so
//! fields are never quoted and the writer refuses any that would need it. Empty fields are meaningful: they mark missing
//! responses on slow trials.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use crate::errors::{Error, ParseError, Result};

#[derive(Debug, Clone)]
struct Row {
    line: usize,
    fields: Vec<String>,
}

/// Parsed table; rows keep their 1-based source line for error messages.
#[derive(Debug, Clone)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn from_path(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Self::from_reader(reader)
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut columns: Option<Vec<String>> = None;
        let mut rows = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line_num = idx + 1;
            let trimmed = line.trim_start_matches('\u{feff}').trim_end_matches('\r');
            if trimmed.trim().is_empty() {
                continue;
            }
            let fields: Vec<String> = trimmed.split(',').map(|f| f.trim().to_string()).collect();
            match &columns {
                None => columns = Some(fields),
                Some(header) => {
                    if fields.len() != header.len() {
                        return Err(Error::parse(
                            line_num,
                            ParseError::FieldCount {
                                expected: header.len(),
                                found: fields.len(),
                            },
                        ));
                    }
                    rows.push(Row {
                        line: line_num,
                        fields,
                    });
                }
            }
        }

        let columns = columns.ok_or(Error::parse(0, ParseError::Empty))?;
        Ok(Self { columns, rows })
    }

    pub fn parse(text: &str) -> Result<Self> {
        Self::from_reader(text.as_bytes())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = RowRef<'_>> {
        self.rows.iter().map(move |row| RowRef { table: self, row })
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Borrowed view of one row with typed field access by column name.
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    table: &'a Table,
    row: &'a Row,
}

impl<'a> RowRef<'a> {
    pub fn line(&self) -> usize {
        self.row.line
    }

    pub fn get(&self, column: &str) -> Result<&'a str> {
        let idx = self.table.column_index(column).ok_or_else(|| {
            Error::parse(self.row.line, ParseError::MissingColumn(column.to_string()))
        })?;
        Ok(self.row.fields[idx].as_str())
    }

    pub fn parse<T: FromStr>(&self, column: &str) -> Result<T> {
        let raw = self.get(column)?;
        raw.parse()
            .map_err(|_| Error::invalid_value(self.row.line, column, raw))
    }

    /// Empty field → `None`.
    pub fn parse_opt<T: FromStr>(&self, column: &str) -> Result<Option<T>> {
        let raw = self.get(column)?;
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse()
            .map(Some)
            .map_err(|_| Error::invalid_value(self.row.line, column, raw))
    }

    /// Integer-valued field that may have been written as a float (`1.0`).
    pub fn parse_code(&self, column: &str) -> Result<Option<u8>> {
        match self.parse_opt::<f64>(column)? {
            None => Ok(None),
            Some(v) if v.fract() == 0.0 && (0.0..=255.0).contains(&v) => Ok(Some(v as u8)),
            Some(_) => Err(Error::invalid_value(
                self.row.line,
                column,
                self.get(column)?,
            )),
        }
    }
}

/// Buffered writer emitting a header then one line per row.
pub struct TableWriter<W: Write> {
    writer: BufWriter<W>,
    width: usize,
}

impl TableWriter<File> {
    pub fn create(path: &Path, columns: &[&str]) -> Result<Self> {
        Self::new(File::create(path)?, columns)
    }
}

impl<W: Write> TableWriter<W> {
    pub fn new(inner: W, columns: &[&str]) -> Result<Self> {
        let mut writer = BufWriter::new(inner);
        writeln!(writer, "{}", columns.join(","))?;
        Ok(Self {
            writer,
            width: columns.len(),
        })
    }

    /// Fields are written unquoted, so any field holding a separator, quote
    /// or line break is rejected before anything reaches the writer.
    ///
    /// # Panics
    /// Panics if the row width differs from the header width.
    pub fn write_row<S: AsRef<str>>(&mut self, fields: &[S]) -> Result<()> {
        assert_eq!(
            fields.len(),
            self.width,
            "row has {} fields, header has {}",
            fields.len(),
            self.width
        );
        let line: Vec<&str> = fields.iter().map(AsRef::as_ref).collect();
        if let Some(bad) = line.iter().find(|f| f.contains([',', '"', '\n', '\r'])) {
            return Err(Error::UnwritableField(bad.to_string()));
        }
        writeln!(self.writer, "{}", line.join(","))?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))
    }
}

/// Formats an optional value, empty when absent.
pub fn opt_field<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_empty_fields() {
        let table = Table::parse("trial,choice1,reward\n0,1,1\n1,,0\n").unwrap();
        assert_eq!(table.len(), 2);
        let rows: Vec<_> = table.rows().collect();
        assert_eq!(rows[0].parse::<u32>("trial").unwrap(), 0);
        assert_eq!(rows[1].parse_opt::<u8>("choice1").unwrap(), None);
        assert_eq!(rows[1].line(), 3);
    }

    #[test]
    fn test_missing_column_reports_line() {
        let table = Table::parse("a,b\n1,2\n").unwrap();
        let row = table.rows().next().unwrap();
        let err = row.get("c").unwrap_err();
        assert!(err.to_string().contains("line 2"));
        assert!(err.to_string().contains("missing column 'c'"));
    }

    #[test]
    fn test_field_count_mismatch_fails() {
        assert!(Table::parse("a,b\n1,2,3\n").is_err());
    }

    #[test]
    fn test_empty_input_fails() {
        assert!(Table::parse("\n\n").is_err());
    }

    #[test]
    fn test_parse_code_accepts_float_notation() {
        let table = Table::parse("choice1\n2.0\n1.5\n").unwrap();
        let rows: Vec<_> = table.rows().collect();
        assert_eq!(rows[0].parse_code("choice1").unwrap(), Some(2));
        assert!(rows[1].parse_code("choice1").is_err());
    }

    #[test]
    fn test_writer_rejects_separators_in_fields() {
        let mut writer = TableWriter::new(Vec::new(), &["participant", "x"]).unwrap();
        for bad in ["a,b", "a\nb", "\"a\""] {
            let err = writer.write_row(&[bad, "1"]).unwrap_err();
            assert!(matches!(err, Error::UnwritableField(_)), "{err}");
        }
        writer.write_row(&["a b", "1"]).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(text, "participant,x\na b,1\n");
    }

    #[test]
    fn test_writer_then_reader() {
        let mut writer = TableWriter::new(Vec::new(), &["x", "y"]).unwrap();
        writer.write_row(&["1", ""]).unwrap();
        writer.write_row(&["2".to_string(), opt_field(Some(0.5))]).unwrap();
        let bytes = writer.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "x,y\n1,\n2,0.5\n");

        let table = Table::parse(&text).unwrap();
        let rows: Vec<_> = table.rows().collect();
        assert_eq!(rows[1].parse_opt::<f64>("y").unwrap(), Some(0.5));
    }
}
