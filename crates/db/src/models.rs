//! Row structs that map 1-to-1 onto database tables, plus the status enums
//! stored in their text columns.
//!
//! These are *persistence* models; they carry no domain behaviour beyond
//! parsing their own status columns.  Definition documents live in the
//! `engine` crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// workflow_definitions
// ---------------------------------------------------------------------------

/// A persisted workflow definition row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowDefinitionRow {
    pub id: String,
    /// Organization that owns the definition.
    pub owner_id: String,
    pub name: String,
    /// Object type the definition binds to, e.g. `Control`.
    pub schema_type: String,
    pub active: bool,
    pub draft: bool,
    /// Full JSON definition document (triggers, conditions, actions, …)
    pub definition: serde_json::Value,
    /// Flat approval field list kept for definitions written before
    /// approval actions carried their own `fields`.
    pub approval_fields: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// workflow_instances
// ---------------------------------------------------------------------------

/// Lifecycle states of a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowInstanceState {
    Running,
    /// Waiting on assignment decisions.
    Paused,
    Completed,
    Failed,
}

impl WorkflowInstanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for WorkflowInstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkflowInstanceState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RUNNING"   => Ok(Self::Running),
            "PAUSED"    => Ok(Self::Paused),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED"    => Ok(Self::Failed),
            other       => Err(format!("unknown workflow instance state: {other}")),
        }
    }
}

/// A persisted workflow instance row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowInstanceRow {
    pub id: String,
    pub owner_id: String,
    pub workflow_definition_id: String,
    pub state: String,
    pub object_type: String,
    pub object_id: String,
    pub current_action_index: i32,
    pub created_at: DateTime<Utc>,
}

impl WorkflowInstanceRow {
    /// Parsed `state` column; `None` when the column holds an unknown value.
    pub fn state(&self) -> Option<WorkflowInstanceState> {
        self.state.parse().ok()
    }
}

// ---------------------------------------------------------------------------
// workflow_assignments
// ---------------------------------------------------------------------------

/// Status of a single approval/review assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    Pending,
    Approved,
    Rejected,
    ChangesRequested,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending          => "PENDING",
            Self::Approved         => "APPROVED",
            Self::Rejected         => "REJECTED",
            Self::ChangesRequested => "CHANGES_REQUESTED",
        }
    }

    /// Approved and rejected assignments never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    /// The status a decision moves this assignment to, or `None` when the
    /// transition is illegal.  Only pending assignments can be decided.
    pub fn decide(self, decision: Decision) -> Option<AssignmentStatus> {
        match (self, decision) {
            (Self::Pending, Decision::Approve) => Some(Self::Approved),
            (Self::Pending, Decision::Reject)  => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// An actor's verdict on a pending assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Approve,
    Reject,
}

impl std::fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AssignmentStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING"           => Ok(Self::Pending),
            "APPROVED"          => Ok(Self::Approved),
            "REJECTED"          => Ok(Self::Rejected),
            "CHANGES_REQUESTED" => Ok(Self::ChangesRequested),
            other               => Err(format!("unknown assignment status: {other}")),
        }
    }
}

/// A persisted workflow assignment row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowAssignmentRow {
    pub id: String,
    pub owner_id: String,
    pub workflow_instance_id: String,
    /// `approval_<action key>_<n>` / `review_<action key>_<n>`.
    pub assignment_key: String,
    pub status: String,
    pub required: bool,
    pub required_count: i32,
    pub label: Option<String>,
    pub decided_by_user_id: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WorkflowAssignmentRow {
    pub fn status(&self) -> Option<AssignmentStatus> {
        self.status.parse().ok()
    }
}

// ---------------------------------------------------------------------------
// workflow_assignment_targets
// ---------------------------------------------------------------------------

/// Who a recorded assignment target row points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentTargetKind {
    User,
    Group,
}

impl AssignmentTargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User  => "USER",
            Self::Group => "GROUP",
        }
    }
}

impl std::str::FromStr for AssignmentTargetKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USER"  => Ok(Self::User),
            "GROUP" => Ok(Self::Group),
            other   => Err(format!("unknown assignment target kind: {other}")),
        }
    }
}

/// A user or group allowed to act on an assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AssignmentTargetRow {
    pub id: String,
    pub assignment_id: String,
    pub target_type: String,
    pub target_user_id: Option<String>,
    pub target_group_id: Option<String>,
    /// Resolver that produced this row, when the target came from one.
    pub resolver_key: Option<String>,
}

impl AssignmentTargetRow {
    pub fn kind(&self) -> Option<AssignmentTargetKind> {
        self.target_type.parse().ok()
    }

    /// Build a direct user target row for `assignment_id`.
    pub fn user(
        assignment_id: impl Into<String>,
        user_id: impl Into<String>,
        resolver_key: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            assignment_id: assignment_id.into(),
            target_type: AssignmentTargetKind::User.as_str().to_string(),
            target_user_id: Some(user_id.into()),
            target_group_id: None,
            resolver_key,
        }
    }

    /// Build a group target row for `assignment_id`.
    pub fn group(assignment_id: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            assignment_id: assignment_id.into(),
            target_type: AssignmentTargetKind::Group.as_str().to_string(),
            target_user_id: None,
            target_group_id: Some(group_id.into()),
            resolver_key: None,
        }
    }
}

// ---------------------------------------------------------------------------
// memberships
// ---------------------------------------------------------------------------

/// Organization role held by a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Owner,
    Admin,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner  => "OWNER",
            Self::Admin  => "ADMIN",
            Self::Member => "MEMBER",
        }
    }

    /// Case-insensitive lookup; `None` for anything that is not a role.
    pub fn parse(value: &str) -> Option<Self> {
        value.parse().ok()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OWNER"  => Ok(Self::Owner),
            "ADMIN"  => Ok(Self::Admin),
            "MEMBER" => Ok(Self::Member),
            other    => Err(format!("unknown role: {other}")),
        }
    }
}

/// A persisted organization membership row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrgMembershipRow {
    pub organization_id: String,
    pub user_id: String,
    pub role: String,
}

/// A persisted group membership row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GroupMembershipRow {
    pub group_id: String,
    pub user_id: String,
}
