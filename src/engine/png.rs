//! PNG text and timestamp chunks
//!
//! Chunks are copied verbatim (CRCs included), so cleaning never re-encodes
//! image data.

use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;

use super::error::{EngineError, Result};
use super::types::{CleaningConfig, MetaValue, Metadata};
use super::{output_path_for, MetadataParser};

const SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

/// Cap on inflated text chunk size; compressed chunks can be bombs
const MAX_INFLATED_TEXT: u64 = 1024 * 1024;

/// Ancillary chunks needed to render the image faithfully
const RENDERING_CHUNKS: &[&[u8; 4]] = &[
    b"tRNS", b"gAMA", b"cHRM", b"sRGB", b"sBIT", b"bKGD", b"pHYs", b"acTL", b"fcTL", b"fdAT",
];

struct Chunk<'a> {
    kind: [u8; 4],
    data: &'a [u8],
    /// Length, type, data and CRC exactly as stored
    raw: &'a [u8],
}

impl Chunk<'_> {
    fn is_critical(&self) -> bool {
        self.kind[0].is_ascii_uppercase()
    }
}

fn chunks(bytes: &[u8]) -> Result<Vec<Chunk<'_>>> {
    let body = bytes
        .strip_prefix(SIGNATURE.as_slice())
        .ok_or_else(|| EngineError::ParseError("missing PNG signature".into()))?;

    let mut chunks = Vec::new();
    let mut offset = 0;
    while offset < body.len() {
        let header = body
            .get(offset..offset + 8)
            .ok_or_else(|| EngineError::ParseError("truncated chunk header".into()))?;
        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let kind = [header[4], header[5], header[6], header[7]];

        let end = offset
            .checked_add(12)
            .and_then(|n| n.checked_add(length))
            .filter(|end| *end <= body.len())
            .ok_or_else(|| {
                EngineError::ParseError(format!(
                    "chunk {} overruns file",
                    String::from_utf8_lossy(&kind)
                ))
            })?;

        chunks.push(Chunk {
            kind,
            data: &body[offset + 8..offset + 8 + length],
            raw: &body[offset..end],
        });
        offset = end;

        if &kind == b"IEND" {
            break;
        }
    }

    if chunks.first().map(|c| &c.kind) != Some(b"IHDR") {
        return Err(EngineError::ParseError("first chunk is not IHDR".into()));
    }
    Ok(chunks)
}

fn inflate(data: &[u8]) -> Result<String> {
    let mut text = Vec::new();
    ZlibDecoder::new(data)
        .take(MAX_INFLATED_TEXT)
        .read_to_end(&mut text)
        .map_err(|e| EngineError::ParseError(format!("bad compressed text: {}", e)))?;
    Ok(String::from_utf8_lossy(&text).into_owned())
}

fn split_keyword(data: &[u8]) -> Result<(String, &[u8])> {
    let nul = data
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| EngineError::ParseError("text chunk without keyword".into()))?;
    let keyword = data[..nul].iter().map(|&b| b as char).collect();
    Ok((keyword, &data[nul + 1..]))
}

fn text_entry(chunk: &Chunk<'_>) -> Result<Option<(String, String)>> {
    match &chunk.kind {
        b"tEXt" => {
            let (keyword, text) = split_keyword(chunk.data)?;
            Ok(Some((keyword, text.iter().map(|&b| b as char).collect())))
        }
        b"zTXt" => {
            let (keyword, rest) = split_keyword(chunk.data)?;
            // First byte is the compression method (always zlib)
            let compressed = rest.get(1..).unwrap_or_default();
            Ok(Some((keyword, inflate(compressed)?)))
        }
        b"iTXt" => {
            let (keyword, rest) = split_keyword(chunk.data)?;
            let compressed = rest.first().copied().unwrap_or(0) == 1;
            // Skip compression flag, method, then language tag and translated keyword
            let rest = rest.get(2..).unwrap_or_default();
            let mut parts = rest.splitn(3, |&b| b == 0);
            let (_language, _translated) = (parts.next(), parts.next());
            let text = parts.next().unwrap_or_default();
            let text = if compressed {
                inflate(text)?
            } else {
                String::from_utf8_lossy(text).into_owned()
            };
            Ok(Some((keyword, text)))
        }
        b"tIME" if chunk.data.len() == 7 => {
            let d = chunk.data;
            let year = u16::from_be_bytes([d[0], d[1]]);
            Ok(Some((
                "last-modified".to_string(),
                format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                    year, d[2], d[3], d[4], d[5], d[6]
                ),
            )))
        }
        b"eXIf" => Ok(Some((
            "exif".to_string(),
            format!("{} bytes", chunk.data.len()),
        ))),
        _ => Ok(None),
    }
}

pub struct PngParser {
    bytes: Vec<u8>,
    output: PathBuf,
    config: CleaningConfig,
}

impl PngParser {
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        chunks(&bytes)?;
        Ok(Self {
            bytes,
            output: output_path_for(path),
            config: CleaningConfig::default(),
        })
    }

    fn keeps(&self, chunk: &Chunk<'_>) -> bool {
        if chunk.is_critical() {
            return true;
        }
        if RENDERING_CHUNKS.contains(&&chunk.kind) {
            return true;
        }
        // ICC profiles carry a free-form name; only the deep pass drops them
        &chunk.kind == b"iCCP" && self.config.lightweight
    }
}

impl MetadataParser for PngParser {
    fn mime_type(&self) -> &'static str {
        "image/png"
    }

    fn configure(&mut self, config: &CleaningConfig) {
        self.config = *config;
    }

    fn get_meta(&self) -> Result<Metadata> {
        let mut meta = Metadata::new();
        for chunk in chunks(&self.bytes)? {
            if let Some((key, value)) = text_entry(&chunk)? {
                meta.insert(key, MetaValue::Text(value));
            }
        }
        Ok(meta)
    }

    fn remove_all(&mut self) -> Result<bool> {
        let mut cleaned = Vec::with_capacity(self.bytes.len());
        cleaned.extend_from_slice(SIGNATURE);
        for chunk in chunks(&self.bytes)? {
            if self.keeps(&chunk) {
                cleaned.extend_from_slice(chunk.raw);
            }
        }
        std::fs::write(&self.output, cleaned)?;
        Ok(true)
    }

    fn output_path(&self) -> &Path {
        &self.output
    }
}
