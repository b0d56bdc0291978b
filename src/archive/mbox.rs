//! mbox container support
//!
//! An mbox file is a sequence of messages, each introduced by a "From "
//! envelope line. Messages are framed by streaming over the file one line at
//! a time, so memory use is bounded by the largest single message rather
//! than the container size. Envelope lines are consumed by the framing and
//! never reach the message parser.

use crate::archive::types::MailMessage;
use crate::archive::{parse_raw_message, ArchiveFormat, MailArchive};
use crate::error::{ArchiveError, ArchiveResult};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// An open mbox container
#[derive(Debug)]
pub struct MboxArchive {
    path: PathBuf,
    reader: BufReader<File>,
    ordinal: usize,
}

impl MboxArchive {
    /// Open an mbox file, validating the leading "From " separator
    ///
    /// The validation doubles as the format check: a file that does not
    /// begin with an envelope line cannot be opened as mbox, which fails the
    /// file's job up front rather than yielding garbage messages.
    pub fn open(path: &Path) -> ArchiveResult<Self> {
        let file = File::open(path).map_err(|e| ArchiveError::OpenFailed {
            path: path.to_path_buf(),
            format: "mbox",
            reason: e.to_string(),
        })?;

        let mut reader = BufReader::new(file);
        let mut envelope = Vec::new();
        reader
            .read_until(b'\n', &mut envelope)
            .map_err(|e| ArchiveError::OpenFailed {
                path: path.to_path_buf(),
                format: "mbox",
                reason: e.to_string(),
            })?;

        if !envelope.starts_with(b"From ") {
            return Err(ArchiveError::OpenFailed {
                path: path.to_path_buf(),
                format: "mbox",
                reason: "missing leading 'From ' separator line".into(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            ordinal: 0,
        })
    }

    /// Read the raw bytes of the next message, consuming the following
    /// envelope line if one is found
    ///
    /// Returns Ok(None) at end of file.
    fn read_next_raw(&mut self) -> ArchiveResult<Option<Vec<u8>>> {
        let mut raw = Vec::new();
        let mut line = Vec::new();

        loop {
            line.clear();
            let n = self
                .reader
                .read_until(b'\n', &mut line)
                .map_err(|e| ArchiveError::Io {
                    path: self.path.clone(),
                    source: e,
                })?;

            if n == 0 {
                return Ok(if raw.is_empty() { None } else { Some(raw) });
            }

            if line.starts_with(b"From ") {
                if raw.is_empty() {
                    // Back-to-back separators; nothing to frame yet
                    continue;
                }
                return Ok(Some(raw));
            }

            raw.extend_from_slice(&line);
        }
    }
}

impl MailArchive for MboxArchive {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Mbox
    }

    fn messages<'a>(&'a mut self) -> Box<dyn Iterator<Item = ArchiveResult<MailMessage>> + 'a> {
        Box::new(MboxMessages { archive: self })
    }
}

struct MboxMessages<'a> {
    archive: &'a mut MboxArchive,
}

impl Iterator for MboxMessages<'_> {
    type Item = ArchiveResult<MailMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        let raw = match self.archive.read_next_raw() {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => return Some(Err(e)),
        };

        self.archive.ordinal += 1;

        // mbox messages carry no container-assigned identifier
        match parse_raw_message(&raw, None) {
            Some(message) => Some(Ok(message)),
            None => Some(Err(ArchiveError::MessageParse {
                path: self.archive.path.clone(),
                ordinal: self.archive.ordinal,
                reason: "unparseable message".into(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn sample_mbox(subjects: &[&str]) -> String {
        let mut out = String::new();
        for (i, subject) in subjects.iter().enumerate() {
            out.push_str("From sender@example.com Thu Jan  1 00:00:00 2004\n");
            out.push_str(&format!(
                "From: sender{i}@example.com\nTo: rcpt@example.com\nSubject: {subject}\n\nbody {i}\n\n"
            ));
        }
        out
    }

    #[test]
    fn test_open_rejects_non_mbox() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bogus.mbox");
        fs::write(&path, "this is not a mailbox\n").unwrap();

        let err = MboxArchive::open(&path).unwrap_err();
        assert!(matches!(err, ArchiveError::OpenFailed { .. }));
    }

    #[test]
    fn test_open_rejects_missing_file() {
        let err = MboxArchive::open(Path::new("/no/such/file.mbox")).unwrap_err();
        assert!(matches!(err, ArchiveError::OpenFailed { .. }));
    }

    #[test]
    fn test_iterates_messages_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("three.mbox");
        fs::write(&path, sample_mbox(&["one", "two", "three"])).unwrap();

        let mut archive = MboxArchive::open(&path).unwrap();
        let messages: Vec<_> = archive
            .messages()
            .collect::<ArchiveResult<Vec<_>>>()
            .unwrap();

        assert_eq!(messages.len(), 3);
        assert!(messages[0].headers.contains("Subject: one"));
        assert!(messages[2].headers.contains("Subject: three"));
        assert_eq!(messages[0].body.trim(), "body 0");
        assert!(messages.iter().all(|m| m.identifier.is_none()));
    }

    #[test]
    fn test_single_message_mbox() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("one.mbox");
        fs::write(&path, sample_mbox(&["only"])).unwrap();

        let mut archive = MboxArchive::open(&path).unwrap();
        let messages: Vec<_> = archive.messages().collect();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_ok());
    }

    #[test]
    fn test_body_from_line_starts_new_message() {
        // Unescaped "From " at line start is a separator, matching the
        // common mboxo reading
        let dir = tempdir().unwrap();
        let path = dir.path().join("split.mbox");
        let content = "From a Thu Jan  1 00:00:00 2004\n\
                       Subject: first\n\n\
                       text\n\
                       From b Thu Jan  1 00:00:00 2004\n\
                       Subject: second\n\nmore\n";
        fs::write(&path, content).unwrap();

        let mut archive = MboxArchive::open(&path).unwrap();
        let count = archive.messages().count();
        assert_eq!(count, 2);
    }
}
