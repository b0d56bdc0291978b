//! Mail container access
//!
//! This module is the boundary between the pipeline and the message parsing
//! library. It provides:
//! - Source enumeration: expanding a path into an ordered list of container
//!   files tagged with their detected format
//! - The [`MailArchive`] trait: a lazy, finite, single-pass message sequence
//!   over one open container, never shared across workers
//! - Format implementations: mbox (multi-message) and eml (single-message)
//!
//! Message parsing itself is delegated to the `mail-parser` crate; everything
//! downstream only sees [`MailMessage`] values.

pub mod eml;
pub mod mbox;
pub mod types;

pub use eml::EmlArchive;
pub use mbox::MboxArchive;
pub use types::{AttachmentMeta, MailMessage};

use crate::error::{ArchiveResult, Result, ScanError};
use mail_parser::{MessageParser, MimeHeaders, PartType};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Container formats the scanner understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// "From "-delimited multi-message mailbox
    Mbox,

    /// Single RFC 5322 message file
    Eml,
}

impl ArchiveFormat {
    /// Short lowercase name for logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            ArchiveFormat::Mbox => "mbox",
            ArchiveFormat::Eml => "eml",
        }
    }

    /// Detect a format from a file extension
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "mbox" => Some(ArchiveFormat::Mbox),
            "eml" => Some(ArchiveFormat::Eml),
            _ => None,
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One enumerated container file
#[derive(Debug, Clone)]
pub struct ContainerFile {
    /// Path to the container
    pub path: PathBuf,

    /// Detected format
    pub format: ArchiveFormat,
}

/// An open mail container yielding messages in container order
///
/// Handles are finite, single-pass, and owned by exactly one worker. A
/// message-scoped error item means that message is malformed and should be
/// skipped; any other error fails the file's job.
pub trait MailArchive: Send {
    /// The container's format
    fn format(&self) -> ArchiveFormat;

    /// Lazy message sequence in the format's defined order
    fn messages<'a>(&'a mut self) -> Box<dyn Iterator<Item = ArchiveResult<MailMessage>> + 'a>;
}

/// Open a container file as its detected format
pub fn open_archive(path: &Path, format: ArchiveFormat) -> ArchiveResult<Box<dyn MailArchive>> {
    match format {
        ArchiveFormat::Mbox => Ok(Box::new(MboxArchive::open(path)?)),
        ArchiveFormat::Eml => Ok(Box::new(EmlArchive::open(path)?)),
    }
}

/// Expand a source path into an ordered list of container files
///
/// Directories are walked recursively in file-name order; files without a
/// recognized container extension are skipped silently. A single explicit
/// file argument is additionally content-sniffed so an extensionless mailbox
/// still ingests. Unreadable paths abort enumeration: a bad root argument is
/// a usage error, not a per-job failure.
pub fn find_container_files(root: &Path) -> Result<Vec<ContainerFile>> {
    let mut files = Vec::new();

    if root.is_file() {
        match detect_file(root)? {
            Some(format) => files.push(ContainerFile {
                path: root.to_path_buf(),
                format,
            }),
            None => debug!(path = %root.display(), "Not a recognized mail container"),
        }
        return Ok(files);
    }

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let msg = e.to_string();
            match e.into_io_error() {
                Some(io) => ScanError::Io(io),
                None => ScanError::Io(std::io::Error::other(msg)),
            }
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        if let Some(format) = ArchiveFormat::from_extension(entry.path()) {
            files.push(ContainerFile {
                path: entry.into_path(),
                format,
            });
        }
    }

    Ok(files)
}

/// Detect the format of one explicitly named file: extension first, then a
/// look at the first line
fn detect_file(path: &Path) -> Result<Option<ArchiveFormat>> {
    if let Some(format) = ArchiveFormat::from_extension(path) {
        return Ok(Some(format));
    }

    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut first_line = String::new();
    // Non-UTF8 first lines read as an error here; that is fine, the file is
    // not a recognized container either way
    if reader.read_line(&mut first_line).is_err() {
        return Ok(None);
    }

    if first_line.starts_with("From ") {
        return Ok(Some(ArchiveFormat::Mbox));
    }

    // RFC 5322 header line: field name, then a colon
    if looks_like_header_line(&first_line) {
        return Ok(Some(ArchiveFormat::Eml));
    }

    Ok(None)
}

fn looks_like_header_line(line: &str) -> bool {
    match line.split_once(':') {
        Some((name, _)) => {
            !name.is_empty()
                && name
                    .bytes()
                    .all(|b| (0x21..=0x7e).contains(&b) && b != b':')
        }
        None => false,
    }
}

/// Parse one raw RFC 5322 message into a [`MailMessage`]
///
/// Returns None when the bytes cannot be parsed as a message at all; callers
/// turn that into a message-scoped error.
pub(crate) fn parse_raw_message(raw: &[u8], identifier: Option<i64>) -> Option<MailMessage> {
    if raw.iter().all(|b| b.is_ascii_whitespace()) {
        return None;
    }

    let message = MessageParser::default().parse(raw)?;

    let body = message
        .body_text(0)
        .map(|text| text.into_owned())
        .or_else(|| message.body_html(0).map(|html| html.into_owned()))
        .unwrap_or_default();

    let mut attachments = Vec::new();
    for part in message.parts.iter() {
        if !is_attachment(part) {
            continue;
        }

        let size = match &part.body {
            PartType::Binary(data) | PartType::InlineBinary(data) => data.len() as u64,
            PartType::Text(text) => text.len() as u64,
            PartType::Html(html) => html.len() as u64,
            _ => continue,
        };

        let content_type = part.content_type().map(|ct| match ct.subtype() {
            Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
            None => ct.ctype().to_string(),
        });

        let name = part
            .attachment_name()
            .or_else(|| part.content_type().and_then(|ct| ct.attribute("name")))
            .map(|s| s.to_string());

        attachments.push(AttachmentMeta {
            name,
            size,
            content_type,
        });
    }

    Some(MailMessage {
        identifier,
        headers: String::from_utf8_lossy(header_block(raw)).into_owned(),
        body,
        attachments,
    })
}

/// Check whether a message part is an attachment rather than a body part
fn is_attachment(part: &mail_parser::MessagePart) -> bool {
    if let Some(disposition) = part.content_disposition() {
        if disposition.ctype() == "attachment" {
            return true;
        }
    }

    if part.attachment_name().is_some() {
        return true;
    }

    // Non-text, non-structural parts count even without a declared name
    if let Some(content_type) = part.content_type() {
        let ctype = content_type.ctype();
        if ctype != "text" && ctype != "multipart" && ctype != "message" {
            return content_type.subtype().is_some();
        }
    }

    false
}

/// The raw header block: everything up to the first blank line
fn header_block(raw: &[u8]) -> &[u8] {
    let mut offset = 0;
    while offset < raw.len() {
        let line_end = match raw[offset..].iter().position(|&b| b == b'\n') {
            Some(pos) => offset + pos + 1,
            None => raw.len(),
        };
        let line = &raw[offset..line_end];
        if line == b"\n" || line == b"\r\n" {
            return &raw[..offset];
        }
        offset = line_end;
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const SAMPLE: &str = "From: alice@example.com\r\n\
                          To: bob@example.com\r\n\
                          Subject: lunch\r\n\
                          \r\n\
                          Meet at noon?\r\n";

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ArchiveFormat::from_extension(Path::new("a.mbox")),
            Some(ArchiveFormat::Mbox)
        );
        assert_eq!(
            ArchiveFormat::from_extension(Path::new("42.EML")),
            Some(ArchiveFormat::Eml)
        );
        assert_eq!(ArchiveFormat::from_extension(Path::new("a.pst")), None);
        assert_eq!(ArchiveFormat::from_extension(Path::new("notes")), None);
    }

    #[test]
    fn test_enumeration_is_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.mbox"), "From a\n").unwrap();
        fs::write(dir.path().join("a.eml"), SAMPLE).unwrap();
        fs::write(dir.path().join("skip.txt"), "not mail").unwrap();

        let files = find_container_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].format, ArchiveFormat::Eml);
        assert_eq!(files[1].format, ArchiveFormat::Mbox);
        assert!(files[0].path.ends_with("a.eml"));
    }

    #[test]
    fn test_enumeration_missing_root_fails() {
        assert!(find_container_files(Path::new("/no/such/path")).is_err());
    }

    #[test]
    fn test_single_file_sniffing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mailbox");
        fs::write(&path, format!("From alice@example.com Thu Jan  1 00:00:00 2004\n{SAMPLE}")).unwrap();

        let files = find_container_files(&path).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].format, ArchiveFormat::Mbox);
    }

    #[test]
    fn test_single_non_container_file_is_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("readme");
        fs::write(&path, "just some notes\n").unwrap();

        let files = find_container_files(&path).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_parse_raw_message() {
        let msg = parse_raw_message(SAMPLE.as_bytes(), Some(9)).unwrap();
        assert_eq!(msg.identifier, Some(9));
        assert_eq!(msg.body.trim(), "Meet at noon?");
        assert!(msg.headers.contains("Subject: lunch"));
        assert!(msg.attachments.is_empty());
    }

    #[test]
    fn test_parse_blank_input_fails() {
        assert!(parse_raw_message(b"", None).is_none());
        assert!(parse_raw_message(b"  \n \r\n", None).is_none());
    }

    #[test]
    fn test_parse_message_with_attachment() {
        let raw = "From: a@example.com\r\n\
                   Subject: files\r\n\
                   MIME-Version: 1.0\r\n\
                   Content-Type: multipart/mixed; boundary=\"xyz\"\r\n\
                   \r\n\
                   --xyz\r\n\
                   Content-Type: text/plain\r\n\
                   \r\n\
                   See attached.\r\n\
                   --xyz\r\n\
                   Content-Type: application/pdf; name=\"q3.pdf\"\r\n\
                   Content-Disposition: attachment; filename=\"q3.pdf\"\r\n\
                   Content-Transfer-Encoding: base64\r\n\
                   \r\n\
                   JVBERi0xLjQK\r\n\
                   --xyz--\r\n";

        let msg = parse_raw_message(raw.as_bytes(), None).unwrap();
        assert_eq!(msg.attachments.len(), 1);
        let att = &msg.attachments[0];
        assert_eq!(att.name.as_deref(), Some("q3.pdf"));
        assert_eq!(att.content_type.as_deref(), Some("application/pdf"));
        assert!(att.size > 0);
    }

    #[test]
    fn test_header_block() {
        let raw = b"A: 1\r\nB: 2\r\n\r\nbody";
        assert_eq!(header_block(raw), b"A: 1\r\nB: 2\r\n");

        let headers_only = b"A: 1\r\n";
        assert_eq!(header_block(headers_only), headers_only);
    }
}
