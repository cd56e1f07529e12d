//! ZIP archives
//!
//! Members of a supported format are inspected and cleaned with their own
//! parser. Everything else is an unknown member and falls under the
//! configured [`UnknownMemberPolicy`]. The rewritten archive has sorted
//! members, fixed timestamps, normalized permissions and no comments.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use super::error::{EngineError, Result};
use super::types::{CleaningConfig, Limits, MetaValue, Metadata, UnknownMemberPolicy};
use super::{output_path_for, resolve_at_depth, MetadataParser};

pub struct ArchiveParser {
    input: PathBuf,
    output: PathBuf,
    config: CleaningConfig,
    /// How many archives enclose this one
    depth: usize,
}

/// A member's bytes staged on disk so a nested parser can open it
struct StagedMember {
    _scratch: TempDir,
    path: PathBuf,
}

impl ArchiveParser {
    pub fn open(path: &Path, depth: usize) -> Result<Self> {
        // Validate the central directory up front
        ZipArchive::new(File::open(path)?)?;
        Ok(Self {
            input: path.to_path_buf(),
            output: output_path_for(path),
            config: CleaningConfig::default(),
            depth,
        })
    }

    fn archive(&self) -> Result<ZipArchive<File>> {
        let archive = ZipArchive::new(File::open(&self.input)?)?;
        let limits = self.limits();
        if archive.len() > limits.max_members {
            return Err(EngineError::LimitExceeded(format!(
                "{} members (max {})",
                archive.len(),
                limits.max_members
            )));
        }
        Ok(archive)
    }

    fn limits(&self) -> Limits {
        self.config.limits()
    }

    /// Member indices ordered by name so output is deterministic
    fn sorted_members(archive: &mut ZipArchive<File>) -> Result<Vec<(usize, String)>> {
        let mut members = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let file = archive.by_index(index)?;
            members.push((index, file.name().to_string()));
        }
        members.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(members)
    }

    fn read_member(reader: impl Read, name: &str, limits: &Limits, budget: &mut u64) -> Result<Vec<u8>> {
        let cap = limits.max_member_size.min(*budget);
        let mut data = Vec::new();
        reader.take(cap + 1).read_to_end(&mut data)?;
        if data.len() as u64 > cap {
            return Err(EngineError::LimitExceeded(format!(
                "member {} expands beyond {} bytes",
                name, cap
            )));
        }
        *budget -= data.len() as u64;
        Ok(data)
    }

    fn stage(name: &str, data: &[u8]) -> Result<StagedMember> {
        let scratch = tempfile::tempdir()?;
        // Keep the extension: plain text is only recognized by it
        let file_name = match Path::new(name).extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("member.{}", ext),
            None => "member".to_string(),
        };
        let path = scratch.path().join(file_name);
        std::fs::write(&path, data)?;
        Ok(StagedMember {
            _scratch: scratch,
            path,
        })
    }

    fn nested_parser(&self, staged: &StagedMember) -> Result<Option<Box<dyn MetadataParser>>> {
        let depth = self.depth + 1;
        if depth > self.limits().max_depth {
            return Err(EngineError::LimitExceeded(format!(
                "archives nested deeper than {}",
                self.limits().max_depth
            )));
        }
        let (parser, _label) = resolve_at_depth(&staged.path, depth)?;
        Ok(parser.map(|mut parser| {
            parser.configure(&self.config);
            parser
        }))
    }
}

impl MetadataParser for ArchiveParser {
    fn mime_type(&self) -> &'static str {
        "application/zip"
    }

    fn configure(&mut self, config: &CleaningConfig) {
        self.config = *config;
    }

    fn get_meta(&self) -> Result<Metadata> {
        let mut archive = self.archive()?;
        let limits = self.limits();
        let mut budget = limits.max_total_size;
        let mut meta = Metadata::new();

        if !archive.comment().is_empty() {
            meta.insert(
                "comment".to_string(),
                String::from_utf8_lossy(archive.comment()).into_owned().into(),
            );
        }

        for (index, name) in Self::sorted_members(&mut archive)? {
            let mut member_meta = Metadata::new();
            let data = {
                let file = archive.by_index(index)?;
                if file.is_dir() {
                    continue;
                }
                if !file.comment().is_empty() {
                    member_meta.insert("comment".to_string(), file.comment().into());
                }
                Self::read_member(file, &name, &limits, &mut budget)?
            };

            let staged = Self::stage(&name, &data)?;
            if let Some(parser) = self.nested_parser(&staged)? {
                member_meta.extend(parser.get_meta()?);
            }

            if !member_meta.is_empty() {
                meta.insert(name, MetaValue::Nested(member_meta));
            }
        }

        Ok(meta)
    }

    fn remove_all(&mut self) -> Result<bool> {
        let mut archive = self.archive()?;
        let limits = self.limits();
        let mut budget = limits.max_total_size;

        let file_options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(0o644);
        let dir_options = file_options.clone().unix_permissions(0o755);

        let mut writer = ZipWriter::new(File::create(&self.output)?);

        for (index, name) in Self::sorted_members(&mut archive)? {
            let data = {
                let file = archive.by_index(index)?;
                if file.is_dir() {
                    writer.add_directory(name.as_str(), dir_options.clone())?;
                    continue;
                }
                Self::read_member(file, &name, &limits, &mut budget)?
            };

            let staged = Self::stage(&name, &data)?;
            let cleaned = match self.nested_parser(&staged)? {
                Some(mut parser) => {
                    if !parser.remove_all()? {
                        return Err(EngineError::CleanError(format!(
                            "unable to clean member {}",
                            name
                        )));
                    }
                    std::fs::read(parser.output_path())?
                }
                None => match self.config.unknown_member_policy {
                    UnknownMemberPolicy::Abort => {
                        return Err(EngineError::UnknownMember(name));
                    }
                    UnknownMemberPolicy::Keep => {
                        tracing::warn!(
                            member = %crate::sanitize::printable(&name),
                            "Keeping unknown member; it may leak metadata"
                        );
                        data
                    }
                    UnknownMemberPolicy::Omit => {
                        tracing::debug!(
                            member = %crate::sanitize::printable(&name),
                            "Omitting unknown member"
                        );
                        continue;
                    }
                },
            };

            writer.start_file(name.as_str(), file_options.clone())?;
            writer.write_all(&cleaned)?;
        }

        writer.finish()?;
        Ok(true)
    }

    fn output_path(&self) -> &Path {
        &self.output
    }
}
