//! Catalog row types.

use arkive_core::{BuildRecord, FileFlags};

/// A build as stored in the catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Build {
    /// Version hash, e.g. `version-0123456789abcdef`.
    pub hash: String,
    /// Build type tag, e.g. `WindowsPlayer`.
    pub build_type: String,
    /// Announcement time as Unix seconds.
    pub time: i64,
    /// Human version string.
    pub version: String,
}

impl From<BuildRecord> for Build {
    fn from(record: BuildRecord) -> Self {
        Self {
            hash: record.hash,
            build_type: record.build_type,
            time: record.time,
            version: record.version,
        }
    }
}

/// One row of the candidate selection: a file to probe, joined with the
/// server that advertises its build.
#[derive(Clone, Debug)]
pub struct Candidate {
    /// files.rowid of the candidate.
    pub id: i64,
    /// Current lifecycle flags.
    pub flags: FileFlags,
    /// Base URL of the advertising server.
    pub server: String,
    /// Build version hash.
    pub build: String,
    /// File basename.
    pub file: String,
}

/// HTTP response metadata recorded for a file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderRecord {
    pub status: u16,
    pub content_length: Option<i64>,
    /// `Last-Modified`, as Unix seconds.
    pub last_modified: Option<i64>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

/// Content facts recorded for a file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentMetadata {
    /// Content size in bytes.
    pub size: i64,
    /// Lowercase hex MD5 of the content.
    pub md5: String,
}
