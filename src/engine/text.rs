//! Plain text: nothing embedded, cleaning is a copy

use std::path::{Path, PathBuf};

use super::error::Result;
use super::types::{CleaningConfig, Metadata};
use super::{output_path_for, MetadataParser};

pub struct TextParser {
    input: PathBuf,
    output: PathBuf,
}

impl TextParser {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            input: path.to_path_buf(),
            output: output_path_for(path),
        })
    }
}

impl MetadataParser for TextParser {
    fn mime_type(&self) -> &'static str {
        "text/plain"
    }

    fn configure(&mut self, _config: &CleaningConfig) {}

    fn get_meta(&self) -> Result<Metadata> {
        Ok(Metadata::new())
    }

    fn remove_all(&mut self) -> Result<bool> {
        std::fs::copy(&self.input, &self.output)?;
        Ok(true)
    }

    fn output_path(&self) -> &Path {
        &self.output
    }
}
