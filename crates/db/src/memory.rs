//! `InMemoryStore` — a test double implementing every store trait.
//!
//! Useful in unit and integration tests where a Postgres instance is either
//! unavailable or irrelevant.  Mirrors the conditional-update semantics of
//! the Postgres repository so decision races behave the same way.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    DbError,
    models::{
        AssignmentStatus, AssignmentTargetRow, Role, WorkflowAssignmentRow,
        WorkflowDefinitionRow, WorkflowInstanceRow, WorkflowInstanceState,
    },
    repository::definitions::DOMAIN_KEY_CONSTRAINT,
    store::{AssignmentStore, DefinitionFilter, DefinitionStore, MembershipStore},
};

/// One claimed approval domain, keyed like the Postgres domain table.
#[derive(Debug, Clone)]
struct DomainClaim {
    definition_id: String,
    owner_id: String,
    schema_type: String,
    domain_key: String,
}

#[derive(Default)]
struct State {
    definitions: Vec<WorkflowDefinitionRow>,
    domains: Vec<DomainClaim>,
    instances: HashMap<String, WorkflowInstanceRow>,
    assignments: HashMap<String, WorkflowAssignmentRow>,
    targets: Vec<AssignmentTargetRow>,
    group_members: Vec<(String, String)>,
    org_members: Vec<(String, String, Role)>,
    fail_group_lookups: bool,
    definition_queries: usize,
}

/// In-process store holding every table in memory.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_definition(&self, row: WorkflowDefinitionRow) {
        let mut state = self.state();
        state.definitions.retain(|existing| existing.id != row.id);
        state.definitions.push(row);
    }

    pub fn insert_instance(&self, row: WorkflowInstanceRow) {
        self.state().instances.insert(row.id.clone(), row);
    }

    pub fn set_instance_state(&self, id: &str, instance_state: WorkflowInstanceState) {
        if let Some(row) = self.state().instances.get_mut(id) {
            row.state = instance_state.as_str().to_string();
        }
    }

    pub fn insert_assignment(&self, row: WorkflowAssignmentRow, targets: Vec<AssignmentTargetRow>) {
        let mut state = self.state();
        state.targets.retain(|t| t.assignment_id != row.id);
        state.targets.extend(targets);
        state.assignments.insert(row.id.clone(), row);
    }

    pub fn add_group_member(&self, group_id: &str, user_id: &str) {
        self.state()
            .group_members
            .push((group_id.to_string(), user_id.to_string()));
    }

    pub fn add_org_member(&self, organization_id: &str, user_id: &str, role: Role) {
        self.state()
            .org_members
            .push((organization_id.to_string(), user_id.to_string(), role));
    }

    /// Make every group lookup fail with [`DbError::Unavailable`].
    pub fn fail_group_lookups(&self, fail: bool) {
        self.state().fail_group_lookups = fail;
    }

    /// Number of `list_active_definitions` calls served so far.
    pub fn definition_queries(&self) -> usize {
        self.state().definition_queries
    }

    /// Domain keys currently claimed by `definition_id`, sorted.
    pub fn claimed_domain_keys(&self, definition_id: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .state()
            .domains
            .iter()
            .filter(|claim| claim.definition_id == definition_id)
            .map(|claim| claim.domain_key.clone())
            .collect();
        keys.sort();
        keys
    }
}

fn dedup_preserving_order(ids: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

#[async_trait]
impl DefinitionStore for InMemoryStore {
    async fn list_active_definitions(
        &self,
        filter: &DefinitionFilter,
    ) -> Result<Vec<WorkflowDefinitionRow>, DbError> {
        let mut state = self.state();
        state.definition_queries += 1;
        Ok(state
            .definitions
            .iter()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect())
    }

    async fn get_definition(&self, id: &str) -> Result<WorkflowDefinitionRow, DbError> {
        self.state()
            .definitions
            .iter()
            .find(|row| row.id == id)
            .cloned()
            .ok_or_else(|| DbError::not_found("workflow definition", id))
    }

    async fn activate_definition(
        &self,
        id: &str,
        domain_keys: &[String],
    ) -> Result<WorkflowDefinitionRow, DbError> {
        let mut state = self.state();
        let (owner_id, schema_type) = state
            .definitions
            .iter()
            .find(|row| row.id == id)
            .map(|row| (row.owner_id.clone(), row.schema_type.to_ascii_lowercase()))
            .ok_or_else(|| DbError::not_found("workflow definition", id))?;

        let taken = state.domains.iter().any(|claim| {
            claim.definition_id != id
                && claim.owner_id == owner_id
                && claim.schema_type == schema_type
                && domain_keys.contains(&claim.domain_key)
        });
        if taken {
            return Err(DbError::UniqueViolation(DOMAIN_KEY_CONSTRAINT.to_string()));
        }

        state.domains.retain(|claim| claim.definition_id != id);
        state.domains.extend(domain_keys.iter().map(|key| DomainClaim {
            definition_id: id.to_string(),
            owner_id: owner_id.clone(),
            schema_type: schema_type.clone(),
            domain_key: key.clone(),
        }));

        let row = state
            .definitions
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| DbError::not_found("workflow definition", id))?;
        row.active = true;
        row.draft = false;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn deactivate_definition(&self, id: &str) -> Result<(), DbError> {
        let mut state = self.state();
        let row = state
            .definitions
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| DbError::not_found("workflow definition", id))?;
        row.active = false;
        row.updated_at = Utc::now();
        state.domains.retain(|claim| claim.definition_id != id);
        Ok(())
    }
}

#[async_trait]
impl MembershipStore for InMemoryStore {
    async fn group_member_ids(&self, group_id: &str) -> Result<Vec<String>, DbError> {
        let state = self.state();
        if state.fail_group_lookups {
            return Err(DbError::Unavailable("group membership lookups disabled".into()));
        }
        Ok(dedup_preserving_order(
            state
                .group_members
                .iter()
                .filter(|(group, _)| group == group_id)
                .map(|(_, user)| user.clone()),
        ))
    }

    async fn role_member_ids(
        &self,
        organization_id: &str,
        role: Role,
    ) -> Result<Vec<String>, DbError> {
        Ok(dedup_preserving_order(
            self.state()
                .org_members
                .iter()
                .filter(|(org, _, r)| org == organization_id && *r == role)
                .map(|(_, user, _)| user.clone()),
        ))
    }

    async fn user_group_ids(&self, user_id: &str) -> Result<Vec<String>, DbError> {
        let state = self.state();
        if state.fail_group_lookups {
            return Err(DbError::Unavailable("group membership lookups disabled".into()));
        }
        Ok(dedup_preserving_order(
            state
                .group_members
                .iter()
                .filter(|(_, user)| user == user_id)
                .map(|(group, _)| group.clone()),
        ))
    }
}

#[async_trait]
impl AssignmentStore for InMemoryStore {
    async fn get_assignment(&self, id: &str) -> Result<WorkflowAssignmentRow, DbError> {
        self.state()
            .assignments
            .get(id)
            .cloned()
            .ok_or_else(|| DbError::not_found("workflow assignment", id))
    }

    async fn assignment_targets(
        &self,
        assignment_id: &str,
    ) -> Result<Vec<AssignmentTargetRow>, DbError> {
        Ok(self
            .state()
            .targets
            .iter()
            .filter(|t| t.assignment_id == assignment_id)
            .cloned()
            .collect())
    }

    async fn get_instance(&self, id: &str) -> Result<WorkflowInstanceRow, DbError> {
        self.state()
            .instances
            .get(id)
            .cloned()
            .ok_or_else(|| DbError::not_found("workflow instance", id))
    }

    async fn transition_assignment(
        &self,
        id: &str,
        from: AssignmentStatus,
        to: AssignmentStatus,
        actor_user_id: &str,
    ) -> Result<WorkflowAssignmentRow, DbError> {
        let mut state = self.state();
        let stale = || DbError::StaleTransition {
            entity: "workflow assignment",
            id: id.to_string(),
            expected: from.to_string(),
        };

        let instance_paused = {
            let assignment = state
                .assignments
                .get(id)
                .ok_or_else(|| DbError::not_found("workflow assignment", id))?;
            state
                .instances
                .get(&assignment.workflow_instance_id)
                .and_then(WorkflowInstanceRow::state)
                == Some(WorkflowInstanceState::Paused)
        };

        let assignment = state
            .assignments
            .get_mut(id)
            .ok_or_else(|| DbError::not_found("workflow assignment", id))?;

        if assignment.status() != Some(from) || !instance_paused {
            return Err(stale());
        }

        assignment.status = to.as_str().to_string();
        assignment.decided_by_user_id = Some(actor_user_id.to_string());
        assignment.decided_at = Some(Utc::now());
        Ok(assignment.clone())
    }
}
