//! Snapshot file parser using nom
//!
//! File format:
//! ```text
//! DOTS001\n
//! [version: u32]
//! [entry_count: u32]
//! ...one JSON record per line (\n-terminated)...
//! ```

use nom::{
    bytes::complete::{tag, take_until},
    character::complete::char,
    multi::many0,
    number::complete::le_u32,
    sequence::{terminated, tuple},
    IResult,
};

use crate::error::{Error, Result};

/// Magic header for snapshot files
pub const SNAPSHOT_MAGIC: &[u8] = b"DOTS001\n";

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Total header length: magic + version + entry count
pub const HEADER_LEN: usize = SNAPSHOT_MAGIC.len() + 8;

/// Snapshot file header
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotHeader {
    /// File format version
    pub version: u32,
    /// Number of records following the header
    pub entry_count: u32,
}

fn header(input: &[u8]) -> IResult<&[u8], SnapshotHeader> {
    let (input, _) = tag(SNAPSHOT_MAGIC)(input)?;
    let (input, (version, entry_count)) = tuple((le_u32, le_u32))(input)?;
    Ok((input, SnapshotHeader { version, entry_count }))
}

/// Parse the snapshot header, returning it and the remaining bytes
///
/// Format:
/// ```text
/// DOTS001\n
/// [4 bytes: version u32 little-endian]
/// [4 bytes: entry_count u32 little-endian]
/// ```
pub fn parse_header(input: &[u8]) -> Result<(SnapshotHeader, &[u8])> {
    if input.len() < HEADER_LEN {
        return Err(Error::Parse("Input too short for header".to_string()));
    }

    let (rest, header) =
        header(input).map_err(|_| Error::Parse("Invalid snapshot magic header".to_string()))?;
    Ok((header, rest))
}

/// Create a snapshot file header
pub fn create_header(version: u32, entry_count: u32) -> Vec<u8> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(SNAPSHOT_MAGIC);
    header.extend_from_slice(&version.to_le_bytes());
    header.extend_from_slice(&entry_count.to_le_bytes());
    header
}

/// Parse a single record line
///
/// Returns the line content without the trailing newline
pub fn parse_line(input: &[u8]) -> IResult<&[u8], &[u8]> {
    terminated(take_until("\n"), char('\n'))(input)
}

/// Split the body of a snapshot into record lines
pub fn parse_records(input: &[u8]) -> Result<Vec<&[u8]>> {
    let (rest, lines) = many0(parse_line)(input)?;
    if !rest.is_empty() {
        return Err(Error::Parse(format!(
            "Truncated record: {} trailing bytes",
            rest.len()
        )));
    }
    Ok(lines)
}
