//! On-disk format of cached tables.
//!
//! An artifact is a single gzip stream holding:
//! - the magic `SHRDTBL1`,
//! - a little endian `u32` with the length of the JSON header,
//! - the JSON header (row count, source stamp, column names and kinds),
//! - the column payloads in header order. Numeric columns are stored as their raw native
//!   bytes, text columns as a little endian `u32` length followed by the UTF-8 bytes per row.
//!
//! Decoding always reads the stream to its end, so the gzip CRC is verified and trailing
//! garbage is rejected.

use std::{
    fs, io,
    io::{Read, Write},
    path::Path,
    time::UNIX_EPOCH,
};

use bytemuck::Pod;
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use serde::{Deserialize, Serialize};

use crate::{
    Result, ShardErr,
    table::{Column, ColumnKind, Table},
};

const MAGIC: &[u8; 8] = b"SHRDTBL1";
const VERSION: u32 = 1;
const MAX_HEADER_LEN: usize = 1 << 20;
const MAX_TEXT_LEN: usize = 1 << 24;
const TEXT_PREALLOC: usize = 1 << 16;

/// Size and modification time of the raw shard a cache artifact was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStamp {
    pub len: u64,
    pub modified_secs: u64,
    pub modified_nanos: u32,
}

impl SourceStamp {
    /// Reads the stamp of the file at `path`.
    pub fn of(path: &Path) -> io::Result<Self> {
        let meta = fs::metadata(path)?;
        let modified = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        Ok(Self {
            len: meta.len(),
            modified_secs: modified.as_secs(),
            modified_nanos: modified.subsec_nanos(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    version: u32,
    little_endian: bool,
    rows: usize,
    source: Option<SourceStamp>,
    columns: Vec<ColumnHeader>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ColumnHeader {
    name: String,
    kind: ColumnKind,
}

/// What is known about an artifact without decoding its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactInfo {
    pub rows: usize,
    pub source: Option<SourceStamp>,
}

/// Encodes `table` into `writer`.
///
/// # Arguments
/// * `writer` - Where the artifact is written to.
/// * `table` - The table to encode.
/// * `source` - The stamp of the raw shard the table was parsed from.
pub fn encode<W: Write>(writer: W, table: &Table, source: Option<SourceStamp>) -> io::Result<()> {
    let header = Header {
        version: VERSION,
        little_endian: cfg!(target_endian = "little"),
        rows: table.len(),
        source,
        columns: table
            .columns()
            .map(|(name, col)| ColumnHeader {
                name: name.to_string(),
                kind: col.kind(),
            })
            .collect(),
    };
    let header = serde_json::to_vec(&header).map_err(io::Error::other)?;
    let header_len = u32::try_from(header.len()).map_err(io::Error::other)?;

    let mut enc = GzEncoder::new(writer, Compression::fast());
    enc.write_all(MAGIC)?;
    enc.write_all(&header_len.to_le_bytes())?;
    enc.write_all(&header)?;

    for (_, column) in table.columns() {
        match column {
            Column::F32(v) => enc.write_all(bytemuck::cast_slice(v))?,
            Column::U16(v) => enc.write_all(bytemuck::cast_slice(v))?,
            Column::U8(v) => enc.write_all(v)?,
            Column::F64(v) => enc.write_all(bytemuck::cast_slice(v))?,
            Column::Text(v) => {
                for s in v {
                    let len = u32::try_from(s.len()).map_err(io::Error::other)?;
                    enc.write_all(&len.to_le_bytes())?;
                    enc.write_all(s.as_bytes())?;
                }
            }
        }
    }

    enc.finish()?.flush()
}

/// Decodes a full artifact.
///
/// # Arguments
/// * `reader` - The artifact's bytes.
/// * `path` - The artifact's path, only used for error reporting.
///
/// # Returns
/// The table and the info stored alongside it, or `ShardErr::CorruptCache`.
pub fn decode<R: Read>(reader: R, path: &Path) -> Result<(Table, ArtifactInfo)> {
    let mut dec = GzDecoder::new(reader);
    let header = read_header(&mut dec, path)?;
    let rows = header.rows;
    let corrupt = |e: io::Error| ShardErr::corrupt(path, e);

    let mut columns = Vec::with_capacity(header.columns.len());
    for ColumnHeader { name, kind } in header.columns {
        let column = match kind {
            ColumnKind::F32 => Column::F32(read_pod(&mut dec, rows, path)?),
            ColumnKind::U16 => Column::U16(read_pod(&mut dec, rows, path)?),
            ColumnKind::U8 => Column::U8(read_pod(&mut dec, rows, path)?),
            ColumnKind::F64 => Column::F64(read_pod(&mut dec, rows, path)?),
            ColumnKind::Text => Column::Text(read_text(&mut dec, rows, path)?),
        };
        columns.push((name, column));
    }

    let mut rest = Vec::new();
    dec.read_to_end(&mut rest).map_err(corrupt)?;
    if !rest.is_empty() {
        return Err(ShardErr::corrupt(
            path,
            format!("{} trailing bytes", rest.len()),
        ));
    }

    let table = Table::new(columns).map_err(|e| ShardErr::corrupt(path, e))?;
    let info = ArtifactInfo {
        rows,
        source: header.source,
    };

    Ok((table, info))
}

/// Decodes only the header of an artifact.
pub fn peek<R: Read>(reader: R, path: &Path) -> Result<ArtifactInfo> {
    let header = read_header(&mut GzDecoder::new(reader), path)?;

    Ok(ArtifactInfo {
        rows: header.rows,
        source: header.source,
    })
}

fn read_header<R: Read>(dec: &mut R, path: &Path) -> Result<Header> {
    let corrupt = |e: io::Error| ShardErr::corrupt(path, e);

    let mut magic = [0u8; 8];
    dec.read_exact(&mut magic).map_err(corrupt)?;
    if &magic != MAGIC {
        return Err(ShardErr::corrupt(path, "bad magic"));
    }

    let mut len = [0u8; 4];
    dec.read_exact(&mut len).map_err(corrupt)?;
    let len = u32::from_le_bytes(len) as usize;
    if len > MAX_HEADER_LEN {
        return Err(ShardErr::corrupt(path, format!("header of {len} bytes")));
    }

    let mut raw = vec![0u8; len];
    dec.read_exact(&mut raw).map_err(corrupt)?;
    let header: Header = serde_json::from_slice(&raw).map_err(|e| ShardErr::corrupt(path, e))?;

    if header.version != VERSION {
        return Err(ShardErr::corrupt(
            path,
            format!("version {} (expected {VERSION})", header.version),
        ));
    }
    if header.little_endian != cfg!(target_endian = "little") {
        return Err(ShardErr::corrupt(path, "written on a host of other endianness"));
    }

    Ok(header)
}

/// Reads `rows` values of a numeric column. The row count comes from the artifact itself,
/// so the buffer only grows with the bytes actually present in the stream.
fn read_pod<T: Pod, R: Read>(dec: &mut R, rows: usize, path: &Path) -> Result<Vec<T>> {
    let Some(len) = rows.checked_mul(size_of::<T>()) else {
        return Err(ShardErr::corrupt(path, format!("{rows} rows overflow a column")));
    };

    let mut raw = Vec::new();
    dec.by_ref()
        .take(len as u64)
        .read_to_end(&mut raw)
        .map_err(|e| ShardErr::corrupt(path, e))?;
    if raw.len() != len {
        return Err(ShardErr::corrupt(
            path,
            format!("column of {} bytes, expected {len}", raw.len()),
        ));
    }

    let mut values = vec![T::zeroed(); rows];
    bytemuck::cast_slice_mut::<T, u8>(&mut values).copy_from_slice(&raw);
    Ok(values)
}

fn read_text<R: Read>(dec: &mut R, rows: usize, path: &Path) -> Result<Vec<String>> {
    let corrupt = |e: io::Error| ShardErr::corrupt(path, e);
    let mut out = Vec::with_capacity(rows.min(TEXT_PREALLOC));

    for _ in 0..rows {
        let mut len = [0u8; 4];
        dec.read_exact(&mut len).map_err(corrupt)?;
        let len = u32::from_le_bytes(len) as usize;
        if len > MAX_TEXT_LEN {
            return Err(ShardErr::corrupt(path, format!("text field of {len} bytes")));
        }

        let mut buf = vec![0u8; len];
        dec.read_exact(&mut buf).map_err(corrupt)?;
        out.push(String::from_utf8(buf).map_err(|e| ShardErr::corrupt(path, e))?);
    }

    Ok(out)
}
