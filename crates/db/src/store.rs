//! Store traits — the collaborator contracts the engine depends on.
//!
//! [`crate::PgStore`] implements them over Postgres and
//! [`crate::InMemoryStore`] implements them for tests.

use async_trait::async_trait;

use crate::{
    DbError,
    models::{
        AssignmentStatus, AssignmentTargetRow, Role, WorkflowAssignmentRow,
        WorkflowDefinitionRow, WorkflowInstanceRow,
    },
};

/// Query for active, non-draft definitions of one schema type.
///
/// Schema types compare ASCII case-insensitively: `control` and `Control`
/// name the same object type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefinitionFilter {
    pub schema_type: String,
    /// Restrict to one owning organization when set.
    pub owner_id: Option<String>,
    /// Leave this definition out of the result (the one being edited).
    pub exclude_id: Option<String>,
}

impl DefinitionFilter {
    pub fn new(schema_type: impl Into<String>) -> Self {
        Self {
            schema_type: schema_type.into(),
            ..Self::default()
        }
    }

    pub fn owned_by(mut self, owner_id: impl Into<String>) -> Self {
        let owner_id = owner_id.into();
        self.owner_id = (!owner_id.is_empty()).then_some(owner_id);
        self
    }

    pub fn excluding(mut self, definition_id: impl Into<String>) -> Self {
        let definition_id = definition_id.into();
        self.exclude_id = (!definition_id.is_empty()).then_some(definition_id);
        self
    }

    /// Whether `row` satisfies the filter (active, non-draft, same schema
    /// type, same owner, not excluded).
    pub fn matches(&self, row: &WorkflowDefinitionRow) -> bool {
        row.active
            && !row.draft
            && row.schema_type.eq_ignore_ascii_case(&self.schema_type)
            && self.owner_id.as_ref().map_or(true, |owner| &row.owner_id == owner)
            && self.exclude_id.as_ref().map_or(true, |id| &row.id != id)
    }
}

#[async_trait]
pub trait DefinitionStore: Send + Sync {
    /// Active, non-draft definitions matching `filter`.
    async fn list_active_definitions(
        &self,
        filter: &DefinitionFilter,
    ) -> Result<Vec<WorkflowDefinitionRow>, DbError>;

    async fn get_definition(&self, id: &str) -> Result<WorkflowDefinitionRow, DbError>;

    /// Mark a definition active and non-draft and claim `domain_keys` for
    /// its owner and schema type, replacing any keys it held before.
    ///
    /// Fails with [`DbError::UniqueViolation`] and changes nothing when
    /// another definition of the same owner already holds one of the keys.
    async fn activate_definition(
        &self,
        id: &str,
        domain_keys: &[String],
    ) -> Result<WorkflowDefinitionRow, DbError>;

    /// Deactivate a definition and release its domain keys.
    async fn deactivate_definition(&self, id: &str) -> Result<(), DbError>;
}

#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Current members of a group.
    async fn group_member_ids(&self, group_id: &str) -> Result<Vec<String>, DbError>;

    /// Members of `organization_id` currently holding `role`.
    async fn role_member_ids(
        &self,
        organization_id: &str,
        role: Role,
    ) -> Result<Vec<String>, DbError>;

    /// Groups a user currently belongs to.
    async fn user_group_ids(&self, user_id: &str) -> Result<Vec<String>, DbError>;
}

#[async_trait]
pub trait AssignmentStore: Send + Sync {
    async fn get_assignment(&self, id: &str) -> Result<WorkflowAssignmentRow, DbError>;

    async fn assignment_targets(
        &self,
        assignment_id: &str,
    ) -> Result<Vec<AssignmentTargetRow>, DbError>;

    async fn get_instance(&self, id: &str) -> Result<WorkflowInstanceRow, DbError>;

    /// Atomically move an assignment from `from` to `to`, recording the actor.
    ///
    /// Must only succeed while the assignment still has status `from` and its
    /// instance is still paused; otherwise returns
    /// [`DbError::StaleTransition`].
    async fn transition_assignment(
        &self,
        id: &str,
        from: AssignmentStatus,
        to: AssignmentStatus,
        actor_user_id: &str,
    ) -> Result<WorkflowAssignmentRow, DbError>;
}
