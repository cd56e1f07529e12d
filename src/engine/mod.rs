//! Metadata engine
//!
//! One parser per container family behind the [`MetadataParser`] trait,
//! picked by [`resolve_parser`] from the file's magic bytes.
//!
//! ```text
//!   resolve_parser(path)
//!          │  sniff magic bytes
//!          ▼
//!   ┌──────┬──────┬──────┬──────┬──────┐
//!   │ PDF  │ PNG  │ JPEG │ ZIP  │ Text │
//!   └──────┴──────┴──────┴──┬───┴──────┘
//!                           │ members
//!                           ▼
//!                   resolve_parser (nested)
//! ```
//!
//! Parsers are synchronous and CPU-bound. They run inside worker processes,
//! never on the async request path.

mod archive;
pub mod deps;
mod error;
mod jpeg;
mod pdf;
mod png;
mod sniff;
mod text;
mod types;

use std::path::{Path, PathBuf};

pub use deps::{check_dependencies, DependencyReport, DependencyStatus};
pub use error::{EngineError, Result};
pub use sniff::{Detection, FileFormat};
pub use types::{CleaningConfig, Limits, MetaValue, Metadata, UnknownMemberPolicy};

/// Format-specific metadata capability
pub trait MetadataParser: Send {
    /// MIME type of the handled format
    fn mime_type(&self) -> &'static str;

    /// Apply per-request options; call before `get_meta` or `remove_all`
    fn configure(&mut self, config: &CleaningConfig);

    /// Extract embedded metadata
    fn get_meta(&self) -> Result<Metadata>;

    /// Write a metadata-free copy to [`MetadataParser::output_path`].
    ///
    /// Returns `Ok(false)` when the parser declines without an error.
    fn remove_all(&mut self) -> Result<bool>;

    /// Where `remove_all` writes its result
    fn output_path(&self) -> &Path;
}

/// Resolve a parser for `path`.
///
/// Returns `None` with the detected MIME label when the format is not
/// supported. Errors mean the content claims a supported format but cannot
/// be parsed.
pub fn resolve_parser(path: &Path) -> Result<(Option<Box<dyn MetadataParser>>, String)> {
    resolve_at_depth(path, 0)
}

pub(crate) fn resolve_at_depth(
    path: &Path,
    depth: usize,
) -> Result<(Option<Box<dyn MetadataParser>>, String)> {
    let Detection { format, label } = sniff::detect(path)?;

    let parser: Box<dyn MetadataParser> = match format {
        Some(FileFormat::Pdf) => Box::new(pdf::PdfParser::open(path)?),
        Some(FileFormat::Png) => Box::new(png::PngParser::open(path)?),
        Some(FileFormat::Jpeg) => Box::new(jpeg::JpegParser::open(path)?),
        Some(FileFormat::Zip) => Box::new(archive::ArchiveParser::open(path, depth)?),
        Some(FileFormat::Text) => Box::new(text::TextParser::open(path)?),
        None => return Ok((None, label)),
    };

    Ok((Some(parser), label))
}

/// Sibling path for cleaned output: `report.pdf` -> `report.cleaned.pdf`
pub fn output_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}.cleaned.{}", stem, ext.to_string_lossy()),
        None => format!("{}.cleaned", stem),
    };
    path.with_file_name(name)
}
