//! Assignment decisions: authorize an actor against a pending assignment
//! and move it to APPROVED or REJECTED.
//!
//! Every authorization failure surfaces as
//! [`DecisionError::PermissionDenied`]; the specific reason is only logged.
//! The write itself is a conditional status update, so of two concurrent
//! decisions on the same assignment only the first succeeds.

use std::sync::Arc;

use db::{
    models::{
        AssignmentStatus, AssignmentTargetKind, Decision, WorkflowAssignmentRow, WorkflowInstanceRow,
        WorkflowInstanceState,
    },
    AssignmentStore, MembershipStore,
};
use resolvers::RequestContext;
use tracing::{debug, info, instrument, warn};

use crate::DecisionError;

/// An assignment the actor may decide on, with its paused instance.
#[derive(Debug, Clone)]
pub struct ValidatedDecision {
    pub assignment: WorkflowAssignmentRow,
    pub instance: WorkflowInstanceRow,
    pub actor_user_id: String,
}

#[derive(Clone)]
pub struct DecisionValidator {
    assignments: Arc<dyn AssignmentStore>,
    members: Arc<dyn MembershipStore>,
}

fn denied(assignment_id: &str, reason: &str) -> DecisionError {
    debug!(assignment_id, reason, "assignment decision denied");
    DecisionError::PermissionDenied
}

impl DecisionValidator {
    pub fn new(assignments: Arc<dyn AssignmentStore>, members: Arc<dyn MembershipStore>) -> Self {
        Self { assignments, members }
    }

    /// Check that the caller may decide on `assignment_id` right now.
    #[instrument(skip(self, ctx))]
    pub async fn validate(
        &self,
        ctx: &RequestContext,
        assignment_id: &str,
    ) -> Result<ValidatedDecision, DecisionError> {
        let assignment = self.assignments.get_assignment(assignment_id).await?;

        let actor = ctx
            .user_id()
            .ok_or_else(|| denied(assignment_id, "no acting user"))?;

        if !self.is_target(&assignment, actor).await? {
            return Err(denied(assignment_id, "actor is not a target"));
        }

        let instance = self.assignments.get_instance(&assignment.workflow_instance_id).await?;
        if instance.state() != Some(WorkflowInstanceState::Paused) {
            return Err(denied(assignment_id, "instance is not paused"));
        }

        if assignment.status() != Some(AssignmentStatus::Pending) {
            return Err(denied(assignment_id, "assignment is not pending"));
        }

        Ok(ValidatedDecision {
            assignment,
            instance,
            actor_user_id: actor.to_string(),
        })
    }

    /// Apply `decision` to a validated assignment.
    ///
    /// Fails with `PermissionDenied` if the assignment was decided, or its
    /// instance resumed, after validation.
    #[instrument(skip(self, validated), fields(assignment_id = %validated.assignment.id))]
    pub async fn apply(
        &self,
        validated: &ValidatedDecision,
        decision: Decision,
    ) -> Result<WorkflowAssignmentRow, DecisionError> {
        let from = validated.assignment.status().ok_or(DecisionError::PermissionDenied)?;
        let to = from.decide(decision).ok_or(DecisionError::PermissionDenied)?;

        let updated = self
            .assignments
            .transition_assignment(&validated.assignment.id, from, to, &validated.actor_user_id)
            .await?;

        info!(
            status = %to,
            actor = %validated.actor_user_id,
            "assignment decided"
        );
        Ok(updated)
    }

    /// Validate and apply in one call.
    pub async fn decide(
        &self,
        ctx: &RequestContext,
        assignment_id: &str,
        decision: Decision,
    ) -> Result<WorkflowAssignmentRow, DecisionError> {
        let validated = self.validate(ctx, assignment_id).await?;
        self.apply(&validated, decision).await
    }

    /// Direct user targets are checked first; group targets only when there
    /// is no direct hit.  A failed group lookup counts as no membership.
    async fn is_target(&self, assignment: &WorkflowAssignmentRow, actor: &str) -> Result<bool, DecisionError> {
        let targets = self.assignments.assignment_targets(&assignment.id).await?;

        let direct = targets.iter().any(|target| {
            target.kind() == Some(AssignmentTargetKind::User)
                && target.target_user_id.as_deref() == Some(actor)
        });
        if direct {
            return Ok(true);
        }

        let target_groups: Vec<&str> = targets
            .iter()
            .filter(|target| target.kind() == Some(AssignmentTargetKind::Group))
            .filter_map(|target| target.target_group_id.as_deref())
            .collect();
        if target_groups.is_empty() {
            return Ok(false);
        }

        let actor_groups = match self.members.user_group_ids(actor).await {
            Ok(groups) => groups,
            Err(err) => {
                warn!(error = %err, actor, "group membership lookup failed");
                Vec::new()
            }
        };
        Ok(actor_groups
            .iter()
            .any(|group| target_groups.contains(&group.as_str())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use db::{models::AssignmentTargetRow, InMemoryStore};

    fn assignment(id: &str, status: AssignmentStatus) -> WorkflowAssignmentRow {
        WorkflowAssignmentRow {
            id: id.into(),
            owner_id: "org-1".into(),
            workflow_instance_id: "inst-1".into(),
            assignment_key: "approval_approve_1".into(),
            status: status.as_str().into(),
            required: true,
            required_count: 1,
            label: None,
            decided_by_user_id: None,
            decided_at: None,
            created_at: Utc::now(),
        }
    }

    fn instance(state: WorkflowInstanceState) -> WorkflowInstanceRow {
        WorkflowInstanceRow {
            id: "inst-1".into(),
            owner_id: "org-1".into(),
            workflow_definition_id: "def-1".into(),
            state: state.as_str().into(),
            object_type: "Control".into(),
            object_id: "ctl-1".into(),
            current_action_index: 0,
            created_at: Utc::now(),
        }
    }

    fn setup(targets: Vec<AssignmentTargetRow>) -> (Arc<InMemoryStore>, DecisionValidator) {
        let store = Arc::new(InMemoryStore::new());
        store.insert_instance(instance(WorkflowInstanceState::Paused));
        store.insert_assignment(assignment("asg-1", AssignmentStatus::Pending), targets);
        let validator = DecisionValidator::new(store.clone(), store.clone());
        (store, validator)
    }

    fn as_user(user: &str) -> RequestContext {
        RequestContext::new(user, "org-1")
    }

    #[tokio::test]
    async fn direct_target_is_authorized() {
        let (_, validator) = setup(vec![AssignmentTargetRow::user("asg-1", "u1", None)]);

        let validated = validator.validate(&as_user("u1"), "asg-1").await.unwrap();
        assert_eq!(validated.actor_user_id, "u1");
        assert_eq!(validated.instance.id, "inst-1");

        assert!(matches!(
            validator.validate(&as_user("u2"), "asg-1").await,
            Err(DecisionError::PermissionDenied)
        ));
    }

    #[tokio::test]
    async fn missing_assignment_is_not_found() {
        let (_, validator) = setup(Vec::new());
        assert!(matches!(
            validator.validate(&as_user("u1"), "nope").await,
            Err(DecisionError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn anonymous_caller_is_denied() {
        let (_, validator) = setup(vec![AssignmentTargetRow::user("asg-1", "u1", None)]);
        assert!(matches!(
            validator.validate(&RequestContext::anonymous(), "asg-1").await,
            Err(DecisionError::PermissionDenied)
        ));
    }

    #[tokio::test]
    async fn group_membership_authorizes() {
        let (store, validator) = setup(vec![AssignmentTargetRow::group("asg-1", "g1")]);
        store.add_group_member("g1", "member");
        store.add_group_member("g2", "outsider");

        assert!(validator.validate(&as_user("member"), "asg-1").await.is_ok());
        assert!(matches!(
            validator.validate(&as_user("outsider"), "asg-1").await,
            Err(DecisionError::PermissionDenied)
        ));
    }

    #[tokio::test]
    async fn group_lookup_failure_does_not_block_direct_targets() {
        let (store, validator) = setup(vec![
            AssignmentTargetRow::user("asg-1", "u1", None),
            AssignmentTargetRow::group("asg-1", "g1"),
        ]);
        store.add_group_member("g1", "member");
        store.fail_group_lookups(true);

        assert!(validator.validate(&as_user("u1"), "asg-1").await.is_ok());
        assert!(matches!(
            validator.validate(&as_user("member"), "asg-1").await,
            Err(DecisionError::PermissionDenied)
        ));
    }

    #[tokio::test]
    async fn running_instance_is_denied() {
        let (store, validator) = setup(vec![AssignmentTargetRow::user("asg-1", "u1", None)]);
        store.set_instance_state("inst-1", WorkflowInstanceState::Running);

        assert!(matches!(
            validator.validate(&as_user("u1"), "asg-1").await,
            Err(DecisionError::PermissionDenied)
        ));
    }

    #[tokio::test]
    async fn decided_assignment_is_denied() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_instance(instance(WorkflowInstanceState::Paused));
        store.insert_assignment(
            assignment("asg-1", AssignmentStatus::Approved),
            vec![AssignmentTargetRow::user("asg-1", "u1", None)],
        );
        let validator = DecisionValidator::new(store.clone(), store);

        assert!(matches!(
            validator.validate(&as_user("u1"), "asg-1").await,
            Err(DecisionError::PermissionDenied)
        ));
    }

    #[tokio::test]
    async fn decide_moves_pending_once() {
        let (store, validator) = setup(vec![AssignmentTargetRow::user("asg-1", "u1", None)]);

        let first = validator.validate(&as_user("u1"), "asg-1").await.unwrap();
        let second = validator.validate(&as_user("u1"), "asg-1").await.unwrap();

        let updated = validator.apply(&first, Decision::Reject).await.unwrap();
        assert_eq!(updated.status(), Some(AssignmentStatus::Rejected));
        assert_eq!(updated.decided_by_user_id.as_deref(), Some("u1"));

        // The second decision lost the race.
        assert!(matches!(
            validator.apply(&second, Decision::Approve).await,
            Err(DecisionError::PermissionDenied)
        ));

        let stored = store.get_assignment("asg-1").await.unwrap();
        assert_eq!(stored.status(), Some(AssignmentStatus::Rejected));
    }

    #[tokio::test]
    async fn decide_validates_then_applies() {
        let (_, validator) = setup(vec![AssignmentTargetRow::user("asg-1", "u1", None)]);

        let approved = validator
            .decide(&as_user("u1"), "asg-1", Decision::Approve)
            .await
            .unwrap();
        assert_eq!(approved.status(), Some(AssignmentStatus::Approved));

        assert!(matches!(
            validator.decide(&as_user("u1"), "asg-1", Decision::Reject).await,
            Err(DecisionError::PermissionDenied)
        ));
    }
}
