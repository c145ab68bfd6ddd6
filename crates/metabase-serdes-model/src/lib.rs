//! Shared vocabulary for Metabase serialization exports.
//!
//! A serialization export is a directory tree of one YAML document per
//! exported object. Every crate in the workspace speaks in the types defined
//! here:
//!
//! - [`EntityKind`]: the closed set of exported models (plus `Unknown`)
//! - [`EntityId`]: a plain id or an ancestor path
//! - [`ArchiveMember`]: one entry of the export as handed over by the reader
//! - [`Diagnostic`]: every recoverable problem found while indexing or planning

pub mod diagnostics;
pub mod digest;
pub mod id;
pub mod kind;
pub mod member;

pub use diagnostics::{Diagnostic, DiagnosticSummary, Severity};
pub use id::EntityId;
pub use kind::EntityKind;
pub use member::{ArchiveMember, MemberDocument, MemberKind};

/// Key of the metadata chain inside every exported document.
pub const SERDES_META_KEY: &str = "serdes/meta";
