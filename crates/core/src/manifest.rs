//! Package-manifest decoder.
//!
//! Builds ship an `rbxPkgManifest.txt` enumerating their packages. Format
//! v0 is a `v0` header line followed by four-line records: name, hash,
//! packed size, unpacked size.

use crate::error::{Error, Result};

/// One package entry from a manifest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestEntry {
    pub name: String,
    pub hash: String,
    pub packed_size: i64,
    pub unpacked_size: i64,
}

/// Decode a v0 package manifest.
pub fn decode(input: &str) -> Result<Vec<ManifestEntry>> {
    let mut lines = input.lines().enumerate();

    let version = match lines.next() {
        Some((_, line)) => line.trim_end_matches('\r'),
        None => return Ok(Vec::new()),
    };
    if version != "v0" {
        return Err(Error::ManifestVersion(version.to_string()));
    }

    let mut entries = Vec::new();
    while let Some((_, name)) = lines.next() {
        let name = name.trim_end_matches('\r');
        let hash = expect_line(&mut lines, "hash")?;
        let packed_size = parse_size(&mut lines, "packed size")?;
        let unpacked_size = parse_size(&mut lines, "unpacked size")?;
        entries.push(ManifestEntry {
            name: name.to_string(),
            hash,
            packed_size,
            unpacked_size,
        });
    }
    Ok(entries)
}

fn expect_line<'a>(
    lines: &mut impl Iterator<Item = (usize, &'a str)>,
    what: &str,
) -> Result<String> {
    match lines.next() {
        Some((_, line)) => Ok(line.trim_end_matches('\r').to_string()),
        None => Err(Error::ManifestParse {
            line: 0,
            message: format!("expected {what}"),
        }),
    }
}

fn parse_size<'a>(
    lines: &mut impl Iterator<Item = (usize, &'a str)>,
    what: &str,
) -> Result<i64> {
    match lines.next() {
        Some((index, line)) => line.trim_end_matches('\r').parse().map_err(|_| Error::ManifestParse {
            line: index + 1,
            message: format!("parse {what}: {line:?}"),
        }),
        None => Err(Error::ManifestParse {
            line: 0,
            message: format!("expected {what}"),
        }),
    }
}
