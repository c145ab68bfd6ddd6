//! Export reader for Metabase serialization exports.
//!
//! Accepts either the `.tar.gz` / `.tgz` / `.tar` archive written by the
//! export command or a directory it was extracted into, and yields one
//! [`ArchiveMember`] per entry:
//!
//! ```text
//! archive / directory ──► raw entries (sequential, archive order)
//!                              │
//!                              ▼
//!                      YAML parse (parallel, order kept)
//!                              │
//!                              ▼
//!                      Vec<ArchiveMember>
//! ```
//!
//! Only files with a YAML extension are parsed; everything else comes through
//! as `MemberDocument::NotParsed` so the caller still sees it.

pub mod yaml;

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use metabase_serdes_model::{ArchiveMember, MemberDocument, MemberKind};

pub use yaml::parse_yaml_document;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to walk `{path}`: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("`{0}` is neither a directory nor a .tar/.tar.gz/.tgz archive")]
    UnsupportedInput(PathBuf),
}

/// Reader options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    /// File extensions parsed as YAML (without the dot, case-insensitive).
    pub yaml_extensions: Vec<String>,
    /// Parse documents on the rayon pool.
    pub parallel: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            yaml_extensions: vec!["yaml".to_string(), "yml".to_string()],
            parallel: true,
        }
    }
}

impl ReadOptions {
    fn is_yaml(&self, path: &str) -> bool {
        let name = path.rsplit('/').next().unwrap_or(path);
        match name.rfind('.') {
            Some(dot) => {
                let ext = &name[dot + 1..];
                self.yaml_extensions
                    .iter()
                    .any(|e| e.eq_ignore_ascii_case(ext))
            }
            None => false,
        }
    }
}

/// An entry before parsing.
#[derive(Debug)]
struct RawMember {
    path: String,
    kind: MemberKind,
    bytes: Option<Vec<u8>>,
}

/// Read an export from a directory or archive path.
pub fn read_export(path: &Path, options: &ReadOptions) -> Result<Vec<ArchiveMember>, IngestError> {
    let raw = if path.is_dir() {
        read_directory_raw(path, options)?
    } else if is_tarball(path) {
        read_tarball_raw(path, options)?
    } else {
        return Err(IngestError::UnsupportedInput(path.to_path_buf()));
    };

    tracing::info!(
        path = %path.display(),
        members = raw.len(),
        "read serialization export"
    );

    Ok(parse_members(raw, options))
}

fn is_tarball(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    path.is_file() && (name.ends_with(".tar.gz") || name.ends_with(".tgz") || name.ends_with(".tar"))
}

fn is_gzip(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    name.ends_with(".gz") || name.ends_with(".tgz")
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> IngestError + '_ {
    move |source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn read_directory_raw(root: &Path, options: &ReadOptions) -> Result<Vec<RawMember>, IngestError> {
    let mut out = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| IngestError::Walk {
            path: root.to_path_buf(),
            source,
        })?;

        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        let file_type = entry.file_type();
        let (kind, bytes) = if file_type.is_dir() {
            (MemberKind::Directory, None)
        } else if file_type.is_file() {
            let bytes = if options.is_yaml(&relative) {
                Some(std::fs::read(entry.path()).map_err(io_error(entry.path()))?)
            } else {
                None
            };
            (MemberKind::File, bytes)
        } else {
            (MemberKind::Other, None)
        };

        out.push(RawMember {
            path: relative,
            kind,
            bytes,
        });
    }

    Ok(out)
}

fn read_tarball_raw(path: &Path, options: &ReadOptions) -> Result<Vec<RawMember>, IngestError> {
    let file = File::open(path).map_err(io_error(path))?;
    let reader: Box<dyn Read> = if is_gzip(path) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    let mut archive = tar::Archive::new(reader);
    let mut out = Vec::new();

    for entry in archive.entries().map_err(io_error(path))? {
        let mut entry = entry.map_err(io_error(path))?;
        let member_path = entry
            .path()
            .map_err(io_error(path))?
            .to_string_lossy()
            .trim_end_matches('/')
            .to_string();

        let entry_type = entry.header().entry_type();
        let (kind, bytes) = if entry_type.is_dir() {
            (MemberKind::Directory, None)
        } else if entry_type.is_file() {
            let bytes = if options.is_yaml(&member_path) {
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf).map_err(io_error(path))?;
                Some(buf)
            } else {
                None
            };
            (MemberKind::File, bytes)
        } else {
            (MemberKind::Other, None)
        };

        out.push(RawMember {
            path: member_path,
            kind,
            bytes,
        });
    }

    Ok(out)
}

fn parse_member(raw: RawMember) -> ArchiveMember {
    let document = match raw.bytes {
        Some(bytes) => parse_yaml_document(&bytes),
        None => MemberDocument::NotParsed,
    };
    tracing::debug!(path = %raw.path, kind = ?raw.kind, "found archive member");
    ArchiveMember {
        path: raw.path,
        kind: raw.kind,
        document,
    }
}

fn parse_members(raw: Vec<RawMember>, options: &ReadOptions) -> Vec<ArchiveMember> {
    if options.parallel {
        raw.into_par_iter().map(parse_member).collect()
    } else {
        raw.into_iter().map(parse_member).collect()
    }
}
