//! # revstore
//!
//! Revision-controlled document store with a sharded on-disk layout.
//!
//! Callers register opaque files and receive a stable [`DocId`]. Every
//! revision of a document lives in its own directory holding exactly one
//! payload file whose base name is preserved from ingestion.
//!
//! ## Directory Layout
//!
//! ```text
//! <root>/
//! ├── 001/                 # id 1
//! │   └── 000/report.pdf   # revision 0
//! ├── k001/
//! │   └── 234/             # id 1234
//! │       ├── 000/a.txt
//! │       └── 001/a.txt
//! └── M002/
//!     └── k345/
//!         └── 678/         # id 2_345_678
//!             └── 000/b.bin
//! ```
//!
//! The `M` segment appears only for ids above 999_999, the `k` segment only
//! for ids above 999, which keeps every directory under ~1000 entries.

mod error;
mod fsops;
pub mod resolver;
mod store;

use std::fmt;
use std::str::FromStr;

pub use error::{ErrorKind, ErrorReporter, Result, StoreError};
pub use resolver::{repository_path, RepositoryPathResolver};
pub use revstore_config::RevisionPolicy;
pub use store::{DocumentStore, StoreStats};

/// Positive document identifier, `1..=999_999_999`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocId(u64);

impl DocId {
    /// Largest id representable with three-digit `M`, `k` and ones segments.
    pub const MAX: u64 = 999_999_999;

    pub fn new(id: u64) -> Result<Self> {
        match id {
            0 => Err(StoreError::invalid("document id must be a positive integer")),
            id if id > Self::MAX => Err(StoreError::invalid(format!(
                "document id {} exceeds the maximum of {}",
                id,
                Self::MAX
            ))),
            id => Ok(DocId(id)),
        }
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq<u64> for DocId {
    fn eq(&self, other: &u64) -> bool {
        self.0 == *other
    }
}

impl TryFrom<i64> for DocId {
    type Error = StoreError;

    fn try_from(id: i64) -> Result<Self> {
        if id <= 0 {
            return Err(StoreError::invalid(format!(
                "document id must be a positive integer, got {}",
                id
            )));
        }
        DocId::new(id as u64)
    }
}

impl FromStr for DocId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(StoreError::invalid("missing document id"));
        }
        let id: i64 = s
            .parse()
            .map_err(|_| StoreError::invalid(format!("malformed document id '{}'", s)))?;
        DocId::try_from(id)
    }
}

/// Revision number, `0..=999`, rendered zero-padded to three digits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(u16);

impl Revision {
    pub const FIRST: Revision = Revision(0);
    pub const MAX: u32 = 999;

    pub fn new(rev: u32) -> Result<Self> {
        if rev > Self::MAX {
            return Err(StoreError::invalid(format!(
                "revision {} exceeds the maximum of {}",
                rev,
                Self::MAX
            )));
        }
        Ok(Revision(rev as u16))
    }

    #[inline]
    pub fn get(self) -> u32 {
        self.0 as u32
    }

    /// The following revision, failing once the three-digit range is exhausted.
    pub fn next(self) -> Result<Self> {
        Revision::new(self.get() + 1)
    }

    /// Directory name for this revision.
    pub fn segment(self) -> String {
        format!("{:03}", self.0)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

impl PartialEq<u32> for Revision {
    fn eq(&self, other: &u32) -> bool {
        self.get() == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_id_bounds() {
        assert_eq!(DocId::new(0).unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(DocId::new(1).unwrap().get(), 1);
        assert_eq!(DocId::new(DocId::MAX).unwrap().get(), DocId::MAX);
        assert!(DocId::new(DocId::MAX + 1).is_err());
    }

    #[test]
    fn test_doc_id_parse() {
        assert_eq!("42".parse::<DocId>().unwrap().get(), 42);
        assert_eq!(" 7 ".parse::<DocId>().unwrap().get(), 7);
        for bad in ["", "0", "-3", "abc", "1.5"] {
            let err = bad.parse::<DocId>().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "input {:?}", bad);
        }
    }

    #[test]
    fn test_revision_bounds_and_format() {
        assert_eq!(Revision::FIRST.to_string(), "000");
        assert_eq!(Revision::new(42).unwrap().segment(), "042");
        assert!(Revision::new(1000).is_err());
        assert!(Revision::new(999).unwrap().next().is_err());
        assert_eq!(Revision::new(1).unwrap().next().unwrap().get(), 2);
    }
}
