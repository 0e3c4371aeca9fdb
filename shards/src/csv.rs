//! Raw shard reading: gzip CSV files with a header row.

use std::{
    fs::File,
    io::{self, BufRead, BufReader, Read},
    path::Path,
    str::FromStr,
};

use ::csv::{ByteRecord, Error as CsvError, Reader, ReaderBuilder, StringRecord};
use flate2::read::GzDecoder;
use log::debug;

use crate::{
    Result, ShardErr,
    schema::{ColumnType, Schema},
    table::{Column, Table},
};

const READER_BUF_CAP: usize = 128 * 1024;
const MISSING: [&str; 5] = ["", "NA", "NaN", "nan", "null"];

/// Opens a shard for reading, decompressing it when its extension is `gz`.
pub fn open_reader(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).map_err(|e| ShardErr::io(path, e))?;
    let gz = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"));

    if gz {
        let dec = GzDecoder::new(file);
        return Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, dec)));
    }

    Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, file)))
}

/// Parses a raw shard into a `Table`, coercing every column according to `schema`.
///
/// Fields follow RFC 4180 quoting, so a quoted field may hold commas. Integer columns
/// with at least one missing field are widened to `f32` with `NaN` in the missing rows.
///
/// # Arguments
/// * `path` - The shard's path.
/// * `schema` - The fixed column-to-type mapping.
///
/// # Returns
/// The parsed table or an error if the file is missing or malformed.
pub fn read_table(path: &Path, schema: &Schema) -> Result<Table> {
    let mut reader = csv_reader(open_reader(path)?);

    let names: Vec<String> = reader
        .headers()
        .map_err(|e| csv_err(path, e))?
        .iter()
        .map(|n| n.trim().to_string())
        .collect();

    if names.is_empty() {
        return Err(ShardErr::EmptyFile { path: path.into() });
    }

    let mut builders: Vec<Builder> = names
        .iter()
        .map(|n| Builder::new(schema.column_type(n)))
        .collect();

    let mut record = StringRecord::new();
    while reader
        .read_record(&mut record)
        .map_err(|e| csv_err(path, e))?
    {
        let line = record.position().map_or(0, |p| p.line() as usize);

        if record.len() != names.len() {
            return Err(ShardErr::RaggedRow {
                path: path.into(),
                line,
                got: record.len(),
                expected: names.len(),
            });
        }

        for (field, (builder, name)) in record.iter().zip(builders.iter_mut().zip(&names)) {
            builder.push(field).map_err(|_| ShardErr::Parse {
                path: path.into(),
                line,
                column: name.clone(),
                value: field.to_string(),
            })?;
        }
    }

    let table = Table::new(names.into_iter().zip(builders.into_iter().map(Builder::finish)))?;
    debug!("parsed {} rows from {}", table.len(), path.display());
    Ok(table)
}

/// Counts the data rows of a raw shard without coercing them.
pub fn count_rows(path: &Path) -> Result<usize> {
    let mut reader = csv_reader(open_reader(path)?);
    let mut record = ByteRecord::new();
    let mut rows = 0;

    while reader
        .read_byte_record(&mut record)
        .map_err(|e| csv_err(path, e))?
    {
        rows += 1;
    }

    Ok(rows)
}

/// Row length is checked by `read_table` so the error carries the shard's path.
fn csv_reader<R: Read>(inner: R) -> Reader<R> {
    ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(inner)
}

fn csv_err(path: &Path, e: CsvError) -> ShardErr {
    ShardErr::io(path, io::Error::from(e))
}

fn is_missing(field: &str) -> bool {
    MISSING.contains(&field.trim())
}

/// Accumulates the values of one column while reading.
enum Builder {
    F32(Vec<f32>),
    U16(Ints<u16>),
    U8(Ints<u8>),
    Text(Vec<String>),
    Inferred(Vec<String>),
}

impl Builder {
    fn new(ty: ColumnType) -> Self {
        match ty {
            ColumnType::F32 => Builder::F32(Vec::new()),
            ColumnType::U16 => Builder::U16(Ints::default()),
            ColumnType::U8 => Builder::U8(Ints::default()),
            ColumnType::Text => Builder::Text(Vec::new()),
            ColumnType::Inferred => Builder::Inferred(Vec::new()),
        }
    }

    /// Pushes a raw field, failing if it cannot be coerced to the column's type.
    fn push(&mut self, field: &str) -> std::result::Result<(), ()> {
        match self {
            Builder::F32(v) if is_missing(field) => v.push(f32::NAN),
            Builder::F32(v) => v.push(field.trim().parse().map_err(|_| ())?),
            Builder::U16(v) => v.push(field)?,
            Builder::U8(v) => v.push(field)?,
            Builder::Text(v) | Builder::Inferred(v) => v.push(field.to_string()),
        }

        Ok(())
    }

    fn finish(self) -> Column {
        match self {
            Builder::F32(v) => Column::F32(v),
            Builder::U16(v) => v.finish(Column::U16),
            Builder::U8(v) => v.finish(Column::U8),
            Builder::Text(v) => Column::Text(v),
            Builder::Inferred(v) => infer(v),
        }
    }
}

/// An integer column being read, with the rows whose field was missing.
struct Ints<T> {
    values: Vec<T>,
    missing: Vec<usize>,
}

impl<T> Default for Ints<T> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            missing: Vec::new(),
        }
    }
}

impl<T: FromStr + Default + Into<f32>> Ints<T> {
    fn push(&mut self, field: &str) -> std::result::Result<(), ()> {
        if is_missing(field) {
            self.missing.push(self.values.len());
            self.values.push(T::default());
            return Ok(());
        }

        self.values.push(field.trim().parse().map_err(|_| ())?);
        Ok(())
    }

    /// Keeps the compact type when nothing is missing, otherwise widens to `f32` so the
    /// missing rows can hold `NaN` until they are filled.
    fn finish(self, compact: fn(Vec<T>) -> Column) -> Column {
        if self.missing.is_empty() {
            return compact(self.values);
        }

        let mut wide: Vec<f32> = self.values.into_iter().map(Into::into).collect();
        for row in self.missing {
            wide[row] = f32::NAN;
        }

        Column::F32(wide)
    }
}

/// Resolves an untyped column: numeric when every present value parses as a number.
fn infer(raw: Vec<String>) -> Column {
    let parsed: Option<Vec<f64>> = raw
        .iter()
        .map(|f| match is_missing(f) {
            true => Some(f64::NAN),
            false => f.trim().parse().ok(),
        })
        .collect();

    match parsed {
        Some(values) => Column::F64(values),
        None => Column::Text(raw),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::{Compression, write::GzEncoder};
    use tempfile::TempDir;

    use super::*;

    fn write_gz(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        enc.write_all(body.as_bytes()).unwrap();
        enc.finish().unwrap();
        path
    }

    #[test]
    fn columns_are_coerced_by_schema() {
        let dir = TempDir::new().unwrap();
        let path = write_gz(
            &dir,
            "s.csv.gz",
            "app,hour,click_time,extra,note\n3,14,2017-11-07 09:30:38,1.5,x\n,2,2017-11-07 10:00:00,,y\n",
        );

        let t = read_table(&path, &Schema::click_log()).unwrap();
        assert_eq!(t.len(), 2);

        let Some(Column::F32(app)) = t.column("app") else {
            panic!("app must be f32");
        };
        assert_eq!(app[0], 3.0);
        assert!(app[1].is_nan());

        assert_eq!(t.column("hour"), Some(&Column::U16(vec![14, 2])));
        assert_eq!(
            t.column("click_time"),
            Some(&Column::Text(vec![
                "2017-11-07 09:30:38".into(),
                "2017-11-07 10:00:00".into()
            ]))
        );

        let Some(Column::F64(extra)) = t.column("extra") else {
            panic!("extra must be inferred as f64");
        };
        assert_eq!(extra[0], 1.5);
        assert!(extra[1].is_nan());

        assert_eq!(
            t.column("note"),
            Some(&Column::Text(vec!["x".into(), "y".into()]))
        );
    }

    #[test]
    fn missing_integer_fields_widen_the_column() {
        let dir = TempDir::new().unwrap();
        let path = write_gz(
            &dir,
            "s.csv.gz",
            "is_attributed,timediff,avg_ip,app,hour\n1,0.5,,3,7\n0,1.5,12,4,NA\n",
        );

        let t = read_table(&path, &Schema::click_log()).unwrap();

        let Some(Column::F32(avg_ip)) = t.column("avg_ip") else {
            panic!("avg_ip must be widened to f32");
        };
        assert!(avg_ip[0].is_nan());
        assert_eq!(avg_ip[1], 12.0);

        let Some(Column::F32(hour)) = t.column("hour") else {
            panic!("hour must be widened to f32");
        };
        assert_eq!(hour[0], 7.0);
        assert!(hour[1].is_nan());
    }

    #[test]
    fn non_numeric_integer_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write_gz(&dir, "s.csv.gz", "app,hour\n1,3\n1,noon\n");

        match read_table(&path, &Schema::click_log()) {
            Err(ShardErr::Parse {
                line,
                column,
                value,
                ..
            }) => {
                assert_eq!(line, 3);
                assert_eq!(column, "hour");
                assert_eq!(value, "noon");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn quoted_fields_may_hold_commas() {
        let dir = TempDir::new().unwrap();
        let path = write_gz(
            &dir,
            "s.csv.gz",
            "is_attributed,timediff,note\n1,0.5,\"a,b\"\n0,1.0,\"say \"\"hi\"\"\"\n",
        );

        let t = read_table(&path, &Schema::click_log()).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(
            t.column("note"),
            Some(&Column::Text(vec!["a,b".into(), "say \"hi\"".into()]))
        );
        assert_eq!(count_rows(&path).unwrap(), 2);
    }

    #[test]
    fn ragged_row_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_gz(&dir, "s.csv.gz", "app,os\n1,2\n3\n");

        assert!(matches!(
            read_table(&path, &Schema::click_log()),
            Err(ShardErr::RaggedRow {
                line: 3,
                got: 1,
                expected: 2,
                ..
            })
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let res = read_table(&dir.path().join("nope.csv.gz"), &Schema::click_log());
        assert!(matches!(res, Err(ShardErr::Io { .. })));
    }

    #[test]
    fn header_only_shard_has_zero_rows() {
        let dir = TempDir::new().unwrap();
        let path = write_gz(&dir, "s.csv.gz", "app,os\n");

        let t = read_table(&path, &Schema::click_log()).unwrap();
        assert!(t.is_empty());
        assert_eq!(count_rows(&path).unwrap(), 0);
    }

    #[test]
    fn count_rows_skips_header_and_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = write_gz(&dir, "s.csv.gz", "app\n1\n2\n\n3\n");
        assert_eq!(count_rows(&path).unwrap(), 3);
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        let dir = TempDir::new().unwrap();
        let path = write_gz(&dir, "s.csv.gz", "app,hour\r\n1,2\r\n3,4\r\n");

        let t = read_table(&path, &Schema::click_log()).unwrap();
        assert_eq!(t.column("hour"), Some(&Column::U16(vec![2, 4])));
    }
}
