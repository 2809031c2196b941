//! Core domain models for workflow definitions.
//!
//! These types are the source of truth for what a definition document looks
//! like in memory.  They round-trip through the JSONB `definition` column of
//! the `workflow_definitions` table.  Enum-valued fields stay raw strings so a
//! document with a bad value still parses and the validator can name the
//! offending trigger or action; each has a typed accessor.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Treat an explicit JSON `null` like a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn normalize_enum_text(value: &str) -> String {
    value.trim().to_ascii_uppercase().replace('-', "_")
}

// ---------------------------------------------------------------------------
// Trigger operations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerOperation {
    Create,
    Update,
    Delete,
}

impl TriggerOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "CREATE" => Some(Self::Create),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Action types
// ---------------------------------------------------------------------------

/// The closed set of action kinds a definition may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    #[serde(rename = "REQUEST_APPROVAL")]
    Approval,
    #[serde(rename = "REQUEST_REVIEW")]
    Review,
    #[serde(rename = "WEBHOOK")]
    Webhook,
    #[serde(rename = "UPDATE_FIELD")]
    FieldUpdate,
    #[serde(rename = "NOTIFY")]
    Notification,
}

impl ActionType {
    /// Canonical stored name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approval     => "REQUEST_APPROVAL",
            Self::Review       => "REQUEST_REVIEW",
            Self::Webhook      => "WEBHOOK",
            Self::FieldUpdate  => "UPDATE_FIELD",
            Self::Notification => "NOTIFY",
        }
    }

    /// Accepts the canonical names and the short aliases
    /// (`approval`, `review`, `webhook`, `field_update`, `notification`).
    pub fn parse(value: &str) -> Option<Self> {
        match normalize_enum_text(value).as_str() {
            "REQUEST_APPROVAL" | "APPROVAL" => Some(Self::Approval),
            "REQUEST_REVIEW" | "REVIEW"     => Some(Self::Review),
            "WEBHOOK"                       => Some(Self::Webhook),
            "UPDATE_FIELD" | "FIELD_UPDATE" => Some(Self::FieldUpdate),
            "NOTIFY" | "NOTIFICATION"       => Some(Self::Notification),
            _ => None,
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Approval submission mode / timing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalSubmissionMode {
    AutoSubmit,
    /// Recognized but not yet supported.
    ManualSubmit,
}

impl ApprovalSubmissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoSubmit   => "AUTO_SUBMIT",
            Self::ManualSubmit => "MANUAL_SUBMIT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match normalize_enum_text(value).as_str() {
            "AUTO_SUBMIT"   => Some(Self::AutoSubmit),
            "MANUAL_SUBMIT" => Some(Self::ManualSubmit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalTiming {
    /// Approvals gate the change before it is committed.
    PreCommit,
    /// The change commits first; approvals run afterwards as reviews.
    PostCommit,
}

impl ApprovalTiming {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreCommit  => "PRE_COMMIT",
            Self::PostCommit => "POST_COMMIT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match normalize_enum_text(value).as_str() {
            "PRE_COMMIT"  => Some(Self::PreCommit),
            "POST_COMMIT" => Some(Self::PostCommit),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Target types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetType {
    User,
    Group,
    Role,
    Resolver,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User     => "USER",
            Self::Group    => "GROUP",
            Self::Role     => "ROLE",
            Self::Resolver => "RESOLVER",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "USER"     => Some(Self::User),
            "GROUP"    => Some(Self::Group),
            "ROLE"     => Some(Self::Role),
            "RESOLVER" => Some(Self::Resolver),
            _ => None,
        }
    }
}

impl std::fmt::Display for TargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who may act on an approval or review.
///
/// `id` is used by user, group and role targets; `resolver_key` by resolver
/// targets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub target_type: String,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(
        default,
        alias = "resolverKey",
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub resolver_key: String,
}

impl TargetConfig {
    fn with_type(target_type: TargetType, id: String, resolver_key: String) -> Self {
        Self {
            target_type: target_type.as_str().to_string(),
            id,
            resolver_key,
        }
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self::with_type(TargetType::User, id.into(), String::new())
    }

    pub fn group(id: impl Into<String>) -> Self {
        Self::with_type(TargetType::Group, id.into(), String::new())
    }

    pub fn role(id: impl Into<String>) -> Self {
        Self::with_type(TargetType::Role, id.into(), String::new())
    }

    pub fn resolver(key: impl Into<String>) -> Self {
        Self::with_type(TargetType::Resolver, String::new(), key.into())
    }

    /// Parsed `type`; `None` for anything outside the closed set.
    pub fn kind(&self) -> Option<TargetType> {
        TargetType::parse(&self.target_type)
    }
}

// ---------------------------------------------------------------------------
// Definition document
// ---------------------------------------------------------------------------

/// When a definition runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkflowTrigger {
    #[serde(deserialize_with = "null_as_default")]
    pub operation: String,
    #[serde(deserialize_with = "null_as_default")]
    pub object_type: String,
    #[serde(deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<String>,
    /// Optional boolean guard compiled in the base scope.
    #[serde(deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub expression: String,
    #[serde(deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl WorkflowTrigger {
    pub fn operation(&self) -> Option<TriggerOperation> {
        TriggerOperation::parse(&self.operation)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowCondition {
    #[serde(deserialize_with = "null_as_default")]
    pub expression: String,
    #[serde(deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// One step of a definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowAction {
    #[serde(deserialize_with = "null_as_default")]
    pub key: String,
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub action_type: String,
    /// Type-specific payload, validated per action type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Optional guard compiled in the action scope.
    #[serde(deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub when: String,
    #[serde(deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl WorkflowAction {
    pub fn kind(&self) -> Option<ActionType> {
        ActionType::parse(&self.action_type)
    }

    pub fn is_approval(&self) -> bool {
        self.kind() == Some(ActionType::Approval)
    }

    /// Params with an explicit `null` treated as absent.
    pub fn params(&self) -> Option<&Value> {
        self.params.as_ref().filter(|value| !value.is_null())
    }
}

/// A declarative automation rule bound to one object type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkflowDefinitionDocument {
    #[serde(deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub schema_type: String,
    #[serde(deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub approval_submission_mode: String,
    #[serde(deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub approval_timing: String,
    #[serde(deserialize_with = "null_as_default")]
    pub triggers: Vec<WorkflowTrigger>,
    #[serde(deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<WorkflowCondition>,
    #[serde(deserialize_with = "null_as_default")]
    pub actions: Vec<WorkflowAction>,
    #[serde(deserialize_with = "null_as_default", skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl WorkflowDefinitionDocument {
    pub fn approval_timing(&self) -> Option<ApprovalTiming> {
        ApprovalTiming::parse(&self.approval_timing)
    }

    pub fn approval_submission_mode(&self) -> Option<ApprovalSubmissionMode> {
        ApprovalSubmissionMode::parse(&self.approval_submission_mode)
    }

    pub fn approval_actions(&self) -> impl Iterator<Item = &WorkflowAction> {
        self.actions.iter().filter(|action| action.is_approval())
    }
}
