//! JPEG application and comment segments

use std::path::{Path, PathBuf};

use super::error::{EngineError, Result};
use super::types::{CleaningConfig, MetaValue, Metadata};
use super::{output_path_for, MetadataParser};

const SOI: u8 = 0xD8;
const SOS: u8 = 0xDA;
const EOI: u8 = 0xD9;
const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;
const APP2: u8 = 0xE2;
const APP13: u8 = 0xED;
const APP15: u8 = 0xEF;
const COM: u8 = 0xFE;

const EXIF_HEADER: &[u8] = b"Exif\0\0";
const XMP_HEADER: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const ICC_HEADER: &[u8] = b"ICC_PROFILE\0";
const PHOTOSHOP_HEADER: &[u8] = b"Photoshop 3.0\0";

enum Segment<'a> {
    /// Marker with a length-prefixed payload
    Marked { marker: u8, payload: &'a [u8], raw: &'a [u8] },
    /// Start of scan through end of file, copied as-is
    ScanData { raw: &'a [u8] },
}

fn segments(bytes: &[u8]) -> Result<Vec<Segment<'_>>> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != SOI {
        return Err(EngineError::ParseError("missing JPEG start-of-image".into()));
    }

    let mut segments = Vec::new();
    let mut offset = 2;
    loop {
        // Markers may be preceded by any number of fill bytes
        let start = offset;
        while bytes.get(offset) == Some(&0xFF) && bytes.get(offset + 1) == Some(&0xFF) {
            offset += 1;
        }
        if bytes.get(offset) != Some(&0xFF) {
            return Err(EngineError::ParseError(format!(
                "expected marker at offset {}",
                offset
            )));
        }
        let marker = *bytes
            .get(offset + 1)
            .ok_or_else(|| EngineError::ParseError("truncated marker".into()))?;

        if marker == SOS || marker == EOI {
            segments.push(Segment::ScanData { raw: &bytes[start..] });
            return Ok(segments);
        }

        let length_bytes = bytes
            .get(offset + 2..offset + 4)
            .ok_or_else(|| EngineError::ParseError("truncated segment length".into()))?;
        let length = u16::from_be_bytes([length_bytes[0], length_bytes[1]]) as usize;
        if length < 2 {
            return Err(EngineError::ParseError("invalid segment length".into()));
        }
        let end = offset + 2 + length;
        if end > bytes.len() {
            return Err(EngineError::ParseError(format!(
                "segment {:02X} overruns file",
                marker
            )));
        }

        segments.push(Segment::Marked {
            marker,
            payload: &bytes[offset + 4..end],
            raw: &bytes[start..end],
        });
        offset = end;
    }
}

fn describe(marker: u8, payload: &[u8]) -> Option<(String, MetaValue)> {
    let sized = |name: &str| -> Option<(String, MetaValue)> {
        Some((name.to_string(), format!("{} bytes", payload.len()).into()))
    };
    match marker {
        COM => Some((
            "comment".to_string(),
            String::from_utf8_lossy(payload).into_owned().into(),
        )),
        APP1 if payload.starts_with(EXIF_HEADER) => sized("exif"),
        APP1 if payload.starts_with(XMP_HEADER) => Some((
            "xmp".to_string(),
            String::from_utf8_lossy(&payload[XMP_HEADER.len()..])
                .trim()
                .to_string()
                .into(),
        )),
        APP2 if payload.starts_with(ICC_HEADER) => sized("icc-profile"),
        APP13 if payload.starts_with(PHOTOSHOP_HEADER) => sized("photoshop"),
        m @ APP1..=APP15 => sized(&format!("app{}", m - APP0)),
        _ => None,
    }
}

pub struct JpegParser {
    bytes: Vec<u8>,
    output: PathBuf,
    config: CleaningConfig,
}

impl JpegParser {
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        segments(&bytes)?;
        Ok(Self {
            bytes,
            output: output_path_for(path),
            config: CleaningConfig::default(),
        })
    }

    fn keeps(&self, marker: u8, payload: &[u8]) -> bool {
        match marker {
            COM => false,
            APP2 if payload.starts_with(ICC_HEADER) => self.config.lightweight,
            APP1..=APP15 => false,
            _ => true,
        }
    }
}

impl MetadataParser for JpegParser {
    fn mime_type(&self) -> &'static str {
        "image/jpeg"
    }

    fn configure(&mut self, config: &CleaningConfig) {
        self.config = *config;
    }

    fn get_meta(&self) -> Result<Metadata> {
        let mut meta = Metadata::new();
        for segment in segments(&self.bytes)? {
            if let Segment::Marked { marker, payload, .. } = segment {
                if let Some((key, value)) = describe(marker, payload) {
                    meta.insert(key, value);
                }
            }
        }
        Ok(meta)
    }

    fn remove_all(&mut self) -> Result<bool> {
        let mut cleaned = Vec::with_capacity(self.bytes.len());
        cleaned.extend_from_slice(&[0xFF, SOI]);
        for segment in segments(&self.bytes)? {
            match segment {
                Segment::Marked { marker, payload, raw } => {
                    if self.keeps(marker, payload) {
                        cleaned.extend_from_slice(raw);
                    }
                }
                Segment::ScanData { raw } => cleaned.extend_from_slice(raw),
            }
        }
        std::fs::write(&self.output, cleaned)?;
        Ok(true)
    }

    fn output_path(&self) -> &Path {
        &self.output
    }
}
