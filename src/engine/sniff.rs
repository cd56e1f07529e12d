//! Format detection from magic bytes

use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::error::Result;

/// Bytes read from the head of a file for detection
const SNIFF_LEN: usize = 8192;

/// Container families the engine can handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Pdf,
    Png,
    Jpeg,
    Zip,
    Text,
}

impl FileFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            FileFormat::Pdf => "application/pdf",
            FileFormat::Png => "image/png",
            FileFormat::Jpeg => "image/jpeg",
            FileFormat::Zip => "application/zip",
            FileFormat::Text => "text/plain",
        }
    }

    /// Detect a format from leading bytes and the file extension
    pub fn from_magic_bytes(head: &[u8], extension: Option<&str>) -> Option<Self> {
        if head.starts_with(b"%PDF-") {
            return Some(FileFormat::Pdf);
        }
        if head.starts_with(b"\x89PNG\r\n\x1a\n") {
            return Some(FileFormat::Png);
        }
        if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(FileFormat::Jpeg);
        }
        if head.starts_with(b"PK\x03\x04") || head.starts_with(b"PK\x05\x06") {
            return Some(FileFormat::Zip);
        }
        // Plain text has no signature, so the extension has to vouch for it
        let is_txt = extension.is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
        if is_txt && looks_like_text(head) {
            return Some(FileFormat::Text);
        }
        None
    }
}

/// Outcome of sniffing a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub format: Option<FileFormat>,
    /// MIME label reported to clients, known or not
    pub label: String,
}

pub fn detect(path: &Path) -> Result<Detection> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)?;

    let extension = path.extension().and_then(|e| e.to_str());
    let format = FileFormat::from_magic_bytes(&head, extension);
    let label = match format {
        Some(format) => format.mime_type().to_string(),
        None => mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string(),
    };

    Ok(Detection { format, label })
}

fn looks_like_text(head: &[u8]) -> bool {
    if head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        // The sniff window may cut a multi-byte character in half
        Err(e) => e.error_len().is_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_magic_bytes() {
        assert_eq!(FileFormat::from_magic_bytes(b"%PDF-1.7\n", None), Some(FileFormat::Pdf));
        assert_eq!(
            FileFormat::from_magic_bytes(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR", None),
            Some(FileFormat::Png)
        );
        assert_eq!(
            FileFormat::from_magic_bytes(&[0xFF, 0xD8, 0xFF, 0xE0], None),
            Some(FileFormat::Jpeg)
        );
        assert_eq!(FileFormat::from_magic_bytes(b"PK\x03\x04", None), Some(FileFormat::Zip));
        assert_eq!(FileFormat::from_magic_bytes(b"hello", Some("txt")), Some(FileFormat::Text));
        assert_eq!(FileFormat::from_magic_bytes(b"hello", Some("md")), None);
        assert_eq!(FileFormat::from_magic_bytes(b"\0\x01\x02", Some("txt")), None);
    }

    #[test]
    fn test_detect_unknown_uses_extension_label() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("garbage.pdf");
        std::fs::write(&path, b"definitely not a pdf").unwrap();

        let detection = detect(&path).unwrap();
        assert_eq!(detection.format, None);
        assert_eq!(detection.label, "application/pdf");

        let path = temp_dir.path().join("noise");
        std::fs::write(&path, [0x13u8, 0x37, 0x00, 0xFF]).unwrap();
        let detection = detect(&path).unwrap();
        assert_eq!(detection.label, "application/octet-stream");
    }
}
