//! File lifecycle flags.
//!
//! Every file row carries a small bitfield describing how far the pipeline
//! has taken it. The numeric values are stable because they are persisted as
//! integers in the catalog; progress labels are derived, never stored.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Per-file state bitfield.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FileFlags(i64);

impl FileFlags {
    /// File has not been probed yet.
    pub const UNCHECKED: FileFlags = FileFlags(0);
    /// The last probe reported the file absent (403).
    pub const NOT_FOUND: FileFlags = FileFlags(1);
    /// The file was observed to exist at least once. Never cleared.
    pub const EXISTS: FileFlags = FileFlags(2);
    /// A header row has been recorded for the file.
    pub const HAS_HEADERS: FileFlags = FileFlags(4);
    /// A metadata row (size + MD5) has been recorded for the file.
    pub const HAS_METADATA: FileFlags = FileFlags(8);
    /// The content bytes are present in the object store.
    pub const HAS_CONTENT: FileFlags = FileFlags(16);

    /// Reconstruct flags from their stored integer representation.
    pub const fn from_bits(bits: i64) -> Self {
        FileFlags(bits)
    }

    /// The stored integer representation.
    pub const fn bits(self) -> i64 {
        self.0
    }

    /// Whether every flag in `other` is set.
    pub const fn contains(self, other: FileFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any flag in `other` is set.
    pub const fn intersects(self, other: FileFlags) -> bool {
        self.0 & other.0 != 0
    }

    /// A copy with the given flags set.
    #[must_use]
    pub const fn with(self, other: FileFlags) -> Self {
        FileFlags(self.0 | other.0)
    }

    /// A copy with the given flags cleared.
    #[must_use]
    pub const fn without(self, other: FileFlags) -> Self {
        FileFlags(self.0 & !other.0)
    }

    /// Progress label for display. Purely presentational; the bitfield is
    /// the source of truth.
    pub fn label(self) -> &'static str {
        const PARTIAL: FileFlags = FileFlags(FileFlags::EXISTS.0 | FileFlags::HAS_HEADERS.0);
        const NO_CONTENT: FileFlags = FileFlags(PARTIAL.0 | FileFlags::HAS_METADATA.0);
        const COMPLETE: FileFlags = FileFlags(NO_CONTENT.0 | FileFlags::HAS_CONTENT.0);
        if self.contains(COMPLETE) {
            "Complete"
        } else if self.contains(NO_CONTENT) {
            "NoContent"
        } else if self.contains(PARTIAL) {
            "Partial"
        } else if self.contains(FileFlags::NOT_FOUND) {
            if self.contains(FileFlags::HAS_HEADERS) {
                "Failed"
            } else if self.contains(FileFlags::EXISTS) {
                "Missing"
            } else {
                "NotFound"
            }
        } else {
            "Unchecked"
        }
    }
}

impl BitOr for FileFlags {
    type Output = FileFlags;

    fn bitor(self, rhs: FileFlags) -> FileFlags {
        FileFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for FileFlags {
    fn bitor_assign(&mut self, rhs: FileFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for FileFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileFlags({} = {})", self.0, self.label())
    }
}

impl fmt::Display for FileFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
