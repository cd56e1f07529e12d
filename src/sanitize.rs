//! Client-controlled text handling
//!
//! Filenames arrive straight from the multipart body. They are used to name
//! artifacts on disk, echoed back in `Content-Disposition`, and written to
//! the logs, so every one of those paths goes through this module first.

/// Fallback name when the client sends nothing usable
pub const FALLBACK_FILENAME: &str = "upload";

/// Longest filename kept, leaving room for the UUID prefix under NAME_MAX
const MAX_FILENAME_BYTES: usize = 200;

/// Strip control, format and private-use characters before logging.
///
/// Covers the Unicode `C*` categories: controls, format characters (bidi
/// overrides, zero-width characters, the BOM and tag characters), private
/// use in every plane, and noncharacters.
pub fn printable(s: &str) -> String {
    s.chars().filter(|c| !is_hidden(*c)).collect()
}

fn is_hidden(c: char) -> bool {
    if c.is_control() {
        return true;
    }
    matches!(
        c as u32,
        0x00AD
            | 0x0600..=0x0605
            | 0x061C
            | 0x06DD
            | 0x070F
            | 0x0890..=0x0891
            | 0x08E2
            | 0x180E
            | 0x200B..=0x200F
            | 0x202A..=0x202E
            | 0x2060..=0x2064
            | 0x2066..=0x206F
            | 0xFEFF
            | 0xFFF9..=0xFFFB
            | 0xE000..=0xF8FF
            | 0xFDD0..=0xFDEF
            | 0x110BD
            | 0x110CD
            | 0x13430..=0x1343F
            | 0x1BCA0..=0x1BCA3
            | 0x1D173..=0x1D17A
            | 0xE0001
            | 0xE0020..=0xE007F
            | 0xF0000..=0x10FFFF
    ) || (c as u32) & 0xFFFE == 0xFFFE
}

/// Reduce a client filename to a single safe path component.
///
/// Directory parts (either separator) are dropped, hidden characters are
/// removed, and `.`/`..`/empty names become [`FALLBACK_FILENAME`]. Overlong
/// names keep their tail so the extension survives.
pub fn sanitize_filename(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned = printable(last);
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return FALLBACK_FILENAME.to_string();
    }

    if cleaned.len() <= MAX_FILENAME_BYTES {
        return cleaned.to_string();
    }

    let mut start = cleaned.len() - MAX_FILENAME_BYTES;
    while !cleaned.is_char_boundary(start) {
        start += 1;
    }
    cleaned[start..].to_string()
}
