//! Archive members as handed over by an export reader.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    File,
    Directory,
    Other,
}

/// The parsed content of one member.
///
/// A parse failure is kept apart from an empty document: the first is a
/// `ParseFailure` diagnostic, the second is simply nothing to index.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberDocument {
    Parsed(Value),
    Empty,
    ParseError(String),
    /// Directories and files the reader did not try to parse.
    NotParsed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveMember {
    /// Path inside the export, `/`-separated.
    pub path: String,
    pub kind: MemberKind,
    pub document: MemberDocument,
}

impl ArchiveMember {
    pub fn file(path: impl Into<String>, document: MemberDocument) -> Self {
        Self {
            path: path.into(),
            kind: MemberKind::File,
            document,
        }
    }

    pub fn parsed(path: impl Into<String>, document: Value) -> Self {
        Self::file(path, MemberDocument::Parsed(document))
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: MemberKind::Directory,
            document: MemberDocument::NotParsed,
        }
    }

    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        name.rfind('.').map(|dot| &name[dot + 1..])
    }
}
