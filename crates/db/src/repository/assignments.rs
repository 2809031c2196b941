//! Workflow instance, assignment and assignment-target operations.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    DbError,
    models::{
        AssignmentStatus, AssignmentTargetRow, WorkflowAssignmentRow, WorkflowInstanceRow,
        WorkflowInstanceState,
    },
};

const INSTANCE_COLUMNS: &str = "id, owner_id, workflow_definition_id, state, object_type, \
                                object_id, current_action_index, created_at";

const ASSIGNMENT_COLUMNS: &str = "id, owner_id, workflow_instance_id, assignment_key, status, \
                                  required, required_count, label, decided_by_user_id, \
                                  decided_at, created_at";

// ---------------------------------------------------------------------------
// workflow_instances
// ---------------------------------------------------------------------------

/// Create a workflow instance for one triggering object.
pub async fn create_instance(
    pool: &PgPool,
    owner_id: &str,
    workflow_definition_id: &str,
    state: WorkflowInstanceState,
    object_type: &str,
    object_id: &str,
) -> Result<WorkflowInstanceRow, DbError> {
    let sql = format!(
        "INSERT INTO workflow_instances \
             (id, owner_id, workflow_definition_id, state, object_type, object_id, current_action_index, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, 0, $7) \
         RETURNING {INSTANCE_COLUMNS}"
    );

    let row = sqlx::query_as::<_, WorkflowInstanceRow>(&sql)
        .bind(Uuid::new_v4().to_string())
        .bind(owner_id)
        .bind(workflow_definition_id)
        .bind(state.as_str())
        .bind(object_type)
        .bind(object_id)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
        .map_err(DbError::from_write)?;

    Ok(row)
}

pub async fn get_instance(pool: &PgPool, id: &str) -> Result<WorkflowInstanceRow, DbError> {
    let sql = format!("SELECT {INSTANCE_COLUMNS} FROM workflow_instances WHERE id = $1");

    sqlx::query_as::<_, WorkflowInstanceRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DbError::not_found("workflow instance", id))
}

// ---------------------------------------------------------------------------
// workflow_assignments
// ---------------------------------------------------------------------------

/// Insert a pending assignment together with its target rows.
pub async fn create_assignment(
    pool: &PgPool,
    assignment: &WorkflowAssignmentRow,
    targets: &[AssignmentTargetRow],
) -> Result<WorkflowAssignmentRow, DbError> {
    let mut tx = pool.begin().await?;

    let sql = format!(
        "INSERT INTO workflow_assignments \
             (id, owner_id, workflow_instance_id, assignment_key, status, required, required_count, label, created_at) \
         VALUES ($1, $2, $3, $4, 'PENDING', $5, $6, $7, $8) \
         RETURNING {ASSIGNMENT_COLUMNS}"
    );
    let row = sqlx::query_as::<_, WorkflowAssignmentRow>(&sql)
        .bind(&assignment.id)
        .bind(&assignment.owner_id)
        .bind(&assignment.workflow_instance_id)
        .bind(&assignment.assignment_key)
        .bind(assignment.required)
        .bind(assignment.required_count)
        .bind(assignment.label.as_deref())
        .bind(assignment.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(DbError::from_write)?;

    for target in targets {
        sqlx::query(
            "INSERT INTO workflow_assignment_targets \
                 (id, assignment_id, target_type, target_user_id, target_group_id, resolver_key) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&target.id)
        .bind(&row.id)
        .bind(&target.target_type)
        .bind(target.target_user_id.as_deref())
        .bind(target.target_group_id.as_deref())
        .bind(target.resolver_key.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(DbError::from_write)?;
    }

    tx.commit().await?;

    Ok(row)
}

pub async fn get_assignment(pool: &PgPool, id: &str) -> Result<WorkflowAssignmentRow, DbError> {
    let sql = format!("SELECT {ASSIGNMENT_COLUMNS} FROM workflow_assignments WHERE id = $1");

    sqlx::query_as::<_, WorkflowAssignmentRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DbError::not_found("workflow assignment", id))
}

pub async fn list_assignment_targets(
    pool: &PgPool,
    assignment_id: &str,
) -> Result<Vec<AssignmentTargetRow>, DbError> {
    let rows = sqlx::query_as::<_, AssignmentTargetRow>(
        "SELECT id, assignment_id, target_type, target_user_id, target_group_id, resolver_key \
         FROM workflow_assignment_targets WHERE assignment_id = $1",
    )
    .bind(assignment_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Conditionally move an assignment from `from` to `to`.
///
/// The single `UPDATE … WHERE status = $from AND instance is PAUSED` is the
/// optimistic guard: of two simultaneous decisions only one matches a row.
pub async fn transition_assignment_status(
    pool: &PgPool,
    id: &str,
    from: AssignmentStatus,
    to: AssignmentStatus,
    actor_user_id: &str,
) -> Result<WorkflowAssignmentRow, DbError> {
    let sql = format!(
        "UPDATE workflow_assignments a \
         SET status = $1, decided_by_user_id = $2, decided_at = $3 \
         FROM workflow_instances i \
         WHERE a.id = $4 AND a.status = $5 \
           AND i.id = a.workflow_instance_id AND i.state = $6 \
         RETURNING {}",
        ASSIGNMENT_COLUMNS
            .split(", ")
            .map(|column| format!("a.{}", column.trim()))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let row = sqlx::query_as::<_, WorkflowAssignmentRow>(&sql)
        .bind(to.as_str())
        .bind(actor_user_id)
        .bind(Utc::now())
        .bind(id)
        .bind(from.as_str())
        .bind(WorkflowInstanceState::Paused.as_str())
        .fetch_optional(pool)
        .await?;

    row.ok_or_else(|| DbError::StaleTransition {
        entity: "workflow assignment",
        id: id.to_string(),
        expected: from.to_string(),
    })
}
