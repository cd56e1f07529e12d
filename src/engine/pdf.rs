//! PDF metadata via lopdf
//!
//! Reports the trailer `/Info` dictionary and whether the catalog carries an
//! XMP stream. Cleaning drops `/Info`, the trailer `/ID` and the catalog
//! `/Metadata`; the full pass also scrubs `/Metadata` and `/PieceInfo` from
//! every object and deletes standalone XMP streams.

use std::path::{Path, PathBuf};

use lopdf::{Dictionary, Document, Object, ObjectId};

use super::error::{EngineError, Result};
use super::types::{CleaningConfig, MetaValue, Metadata};
use super::{output_path_for, MetadataParser};

pub struct PdfParser {
    document: Document,
    output: PathBuf,
    config: CleaningConfig,
}

impl PdfParser {
    pub fn open(path: &Path) -> Result<Self> {
        let document = Document::load(path)?;
        Ok(Self {
            document,
            output: output_path_for(path),
            config: CleaningConfig::default(),
        })
    }

    fn info_dictionary(&self) -> Option<&Dictionary> {
        match self.document.trailer.get(b"Info").ok()? {
            Object::Reference(id) => self.document.get_object(*id).ok()?.as_dict().ok(),
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    fn catalog_id(&self) -> Option<ObjectId> {
        self.document.trailer.get(b"Root").ok()?.as_reference().ok()
    }

    fn value_of(&self, object: &Object) -> Option<MetaValue> {
        match object {
            Object::String(bytes, _) => Some(MetaValue::Text(decode_text_string(bytes))),
            Object::Integer(value) => Some(MetaValue::Int(*value)),
            Object::Real(value) => Some(MetaValue::Text(value.to_string())),
            Object::Boolean(value) => Some(MetaValue::Text(value.to_string())),
            Object::Name(name) => Some(MetaValue::Text(String::from_utf8_lossy(name).into_owned())),
            Object::Reference(id) => {
                let target = self.document.get_object(*id).ok()?;
                // One hop only; Info values never legitimately chain references
                match target {
                    Object::Reference(_) => None,
                    other => self.value_of(other),
                }
            }
            _ => None,
        }
    }

    fn strip_catalog_metadata(&mut self) {
        let Some(catalog_id) = self.catalog_id() else {
            return;
        };

        let removed = match self
            .document
            .get_object_mut(catalog_id)
            .and_then(Object::as_dict_mut)
        {
            Ok(catalog) => catalog.remove(b"Metadata"),
            Err(_) => None,
        };

        if let Some(Object::Reference(id)) = removed {
            self.document.objects.remove(&id);
        }
    }

    fn strip_everywhere(&mut self) {
        let mut xmp_streams = Vec::new();

        for (id, object) in self.document.objects.iter_mut() {
            let dict = match object {
                Object::Dictionary(dict) => dict,
                Object::Stream(stream) => {
                    if is_metadata_stream(&stream.dict) {
                        xmp_streams.push(*id);
                        continue;
                    }
                    &mut stream.dict
                }
                _ => continue,
            };
            dict.remove(b"Metadata");
            dict.remove(b"PieceInfo");
        }

        for id in xmp_streams {
            self.document.objects.remove(&id);
        }
    }
}

impl MetadataParser for PdfParser {
    fn mime_type(&self) -> &'static str {
        "application/pdf"
    }

    fn configure(&mut self, config: &CleaningConfig) {
        self.config = *config;
    }

    fn get_meta(&self) -> Result<Metadata> {
        let mut meta = Metadata::new();

        if let Some(info) = self.info_dictionary() {
            for (key, value) in info.iter() {
                if let Some(value) = self.value_of(value) {
                    meta.insert(kebab_case(key), value);
                }
            }
        }

        let xmp = self
            .catalog_id()
            .and_then(|id| self.document.get_object(id).ok())
            .and_then(|catalog| catalog.as_dict().ok())
            .and_then(|catalog| catalog.get(b"Metadata").ok())
            .and_then(|object| match object {
                Object::Reference(id) => self.document.get_object(*id).ok(),
                other => Some(other),
            });
        if let Some(Object::Stream(stream)) = xmp {
            meta.insert(
                "xmp-metadata".to_string(),
                format!("{} bytes", stream.content.len()).into(),
            );
        }

        Ok(meta)
    }

    fn remove_all(&mut self) -> Result<bool> {
        if let Some(Object::Reference(id)) = self.document.trailer.remove(b"Info") {
            self.document.objects.remove(&id);
        }
        self.document.trailer.remove(b"ID");
        self.strip_catalog_metadata();

        if !self.config.lightweight {
            self.strip_everywhere();
        }

        self.document
            .save(&self.output)
            .map_err(|e| EngineError::CleanError(format!("failed to write PDF: {}", e)))?;
        Ok(true)
    }

    fn output_path(&self) -> &Path {
        &self.output
    }
}

fn is_metadata_stream(dict: &Dictionary) -> bool {
    matches!(dict.get(b"Type"), Ok(Object::Name(name)) if name == b"Metadata")
}

/// Decode a PDF text string: UTF-16BE with BOM, else UTF-8, else Latin-1
fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// `CreationDate` -> `creation-date`
fn kebab_case(key: &[u8]) -> String {
    let key = String::from_utf8_lossy(key);
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_lower = false;
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }
    out
}
