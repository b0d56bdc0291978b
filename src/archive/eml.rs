//! eml container support
//!
//! An eml file is a single-message archive. Export tooling conventionally
//! names these files after the message's original container identifier
//! (`<identifier>.eml`); when the file name stem parses as a decimal
//! integer it is carried through as the message identifier, so re-ingesting
//! an exported PST keeps its message identities queryable.

use crate::archive::types::MailMessage;
use crate::archive::{parse_raw_message, ArchiveFormat, MailArchive};
use crate::error::{ArchiveError, ArchiveResult};
use std::path::{Path, PathBuf};

/// An open eml archive (exactly one message)
#[derive(Debug)]
pub struct EmlArchive {
    path: PathBuf,
    raw: Vec<u8>,
    identifier: Option<i64>,
    consumed: bool,
}

impl EmlArchive {
    /// Open an eml file
    pub fn open(path: &Path) -> ArchiveResult<Self> {
        let raw = std::fs::read(path).map_err(|e| ArchiveError::OpenFailed {
            path: path.to_path_buf(),
            format: "eml",
            reason: e.to_string(),
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            raw,
            identifier: identifier_from_path(path),
            consumed: false,
        })
    }

    /// The identifier recovered from the file name, if any
    pub fn identifier(&self) -> Option<i64> {
        self.identifier
    }
}

impl MailArchive for EmlArchive {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Eml
    }

    fn messages<'a>(&'a mut self) -> Box<dyn Iterator<Item = ArchiveResult<MailMessage>> + 'a> {
        Box::new(EmlMessages { archive: self })
    }
}

struct EmlMessages<'a> {
    archive: &'a mut EmlArchive,
}

impl Iterator for EmlMessages<'_> {
    type Item = ArchiveResult<MailMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.archive.consumed {
            return None;
        }
        self.archive.consumed = true;

        match parse_raw_message(&self.archive.raw, self.archive.identifier) {
            Some(message) => Some(Ok(message)),
            None => Some(Err(ArchiveError::MessageParse {
                path: self.archive.path.clone(),
                ordinal: 1,
                reason: "unparseable message".into(),
            })),
        }
    }
}

/// Parse a `<identifier>.eml` style file name stem
fn identifier_from_path(path: &Path) -> Option<i64> {
    path.file_stem()?.to_str()?.parse().ok()
}
