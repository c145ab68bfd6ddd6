//! Change requests as declared by the user.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use metabase_serdes_graph::metadata::{chain_identity, read_chain};
use metabase_serdes_model::{EntityId, EntityKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Create,
    /// Rename or in-place edit.
    #[serde(alias = "rename")]
    Update,
    Replace,
    Archive,
    Move,
    Delete,
}

impl ChangeOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeOperation::Create => "create",
            ChangeOperation::Update => "update",
            ChangeOperation::Replace => "replace",
            ChangeOperation::Archive => "archive",
            ChangeOperation::Move => "move",
            ChangeOperation::Delete => "delete",
        }
    }

    /// Delete and archive take an entity out of use.
    pub fn is_destructive(self) -> bool {
        matches!(self, ChangeOperation::Delete | ChangeOperation::Archive)
    }

    pub fn needs_target(self) -> bool {
        !matches!(self, ChangeOperation::Create)
    }

    pub fn class(self) -> PrecedenceClass {
        match self {
            ChangeOperation::Delete => PrecedenceClass::Delete,
            ChangeOperation::Archive => PrecedenceClass::Archive,
            ChangeOperation::Update => PrecedenceClass::Update,
            ChangeOperation::Move => PrecedenceClass::Move,
            ChangeOperation::Replace => PrecedenceClass::Replace,
            ChangeOperation::Create => PrecedenceClass::CreateAndLink,
        }
    }
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse ordering bucket, applied before the topological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecedenceClass {
    Delete,
    Archive,
    Update,
    Move,
    Replace,
    CreateAndLink,
}

impl fmt::Display for PrecedenceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PrecedenceClass::Delete => "delete",
            PrecedenceClass::Archive => "archive",
            PrecedenceClass::Update => "update",
            PrecedenceClass::Move => "move",
            PrecedenceClass::Replace => "replace",
            PrecedenceClass::CreateAndLink => "create-and-link",
        })
    }
}

/// One intended mutation of the exported state.
///
/// ```yaml
/// - operation: move
///   target: Hv5Kj1wA8yBqZ0aP3cD7e
///   payload:
///     collection_id: Qz9Xw2vB7nM4kL1jH6gF5
///   depends_on: []
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub operation: ChangeOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<EntityId>,
    /// Kind the payload describes; inferred when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EntityKind>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<EntityId>,
}

impl ChangeRequest {
    pub fn new(operation: ChangeOperation, target: Option<EntityId>) -> Self {
        Self {
            operation,
            target,
            kind: None,
            payload: Value::Null,
            depends_on: Vec::new(),
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_kind(mut self, kind: EntityKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn depending_on(mut self, id: EntityId) -> Self {
        self.depends_on.push(id);
        self
    }

    /// Kind declared by the payload's own `serdes/meta` chain.
    pub fn payload_kind(&self) -> Option<EntityKind> {
        read_chain(&self.payload)
            .last()
            .and_then(|level| level.model.as_deref())
            .map(EntityKind::from_model)
    }

    /// Identity of the entity a create request brings into existence.
    pub fn created_id(&self) -> Option<EntityId> {
        if self.operation != ChangeOperation::Create {
            return None;
        }
        chain_identity(&read_chain(&self.payload)).or_else(|| {
            self.payload
                .get("entity_id")
                .and_then(Value::as_str)
                .map(EntityId::id)
        })
    }
}

/// Lifecycle of a request inside one planning run: `Unvalidated ->
/// Validated -> Ordered`, or `Rejected` before it is ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeState {
    Unvalidated,
    Validated,
    Ordered,
    Rejected,
}
