//! Deploy-history lexer.
//!
//! Deployment servers publish a line-oriented text log of their releases.
//! Each interesting line has the shape:
//!
//! ```text
//! New WindowsPlayer version-5c9f3b2d9f354a5f at 4/19/2019 1:14:29 PM, file version: 0, 384, 0, 296507
//! ```
//!
//! The lexer is deliberately tolerant: lines that do not match are skipped,
//! since the vendor has changed the surrounding chatter over the years.
//! Timestamps carry no zone and are taken as UTC.

use time::PrimitiveDateTime;
use time::macros::format_description;

/// One build announcement from a deploy history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildRecord {
    /// Version hash, e.g. `version-0123456789abcdef`.
    pub hash: String,
    /// Build type tag, e.g. `WindowsPlayer`.
    pub build_type: String,
    /// Announcement time as Unix seconds.
    pub time: i64,
    /// Dotted file version, e.g. `0.384.0.296507`. Empty when absent.
    pub version: String,
}

const STAMP_FORMAT: &[time::format_description::BorrowedFormatItem<'static>] = format_description!(
    "[month padding:none]/[day padding:none]/[year] \
     [hour repr:12 padding:none]:[minute]:[second] [period]"
);

/// Scan a deploy-history blob for build records.
pub fn lex(input: &str) -> Vec<BuildRecord> {
    input.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<BuildRecord> {
    let rest = line.trim().strip_prefix("New ")?;
    let (head, tail) = rest.split_once(" at ")?;

    let (build_type, hash) = head.split_once(' ')?;
    if build_type.is_empty() || !hash.starts_with("version-") {
        return None;
    }

    let (stamp, version_part) = match tail.split_once(", file version: ") {
        Some((stamp, versions)) => (stamp, Some(versions)),
        None => (tail.trim_end_matches(" ..."), None),
    };
    let time = PrimitiveDateTime::parse(stamp.trim(), STAMP_FORMAT)
        .ok()?
        .assume_utc()
        .unix_timestamp();

    let version = version_part.map(join_file_version).unwrap_or_default();

    Some(BuildRecord {
        hash: hash.to_string(),
        build_type: build_type.to_string(),
        time,
        version,
    })
}

/// Collapse `0, 384, 0, 296507` (possibly with trailing chatter) into
/// `0.384.0.296507`.
fn join_file_version(raw: &str) -> String {
    raw.split(',')
        .map(str::trim)
        .take_while(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
        .collect::<Vec<_>>()
        .join(".")
}
