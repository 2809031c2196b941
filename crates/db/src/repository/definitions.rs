//! Workflow definition operations.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::WorkflowDefinitionRow, store::DefinitionFilter};

/// Unique constraint guarding `(owner_id, schema_type, domain_key)`.
pub const DOMAIN_KEY_CONSTRAINT: &str = "workflow_definition_domains_owner_key";

const DEFINITION_COLUMNS: &str = "id, owner_id, name, schema_type, active, draft, definition, \
                                  approval_fields, created_at, updated_at";

/// Insert a new draft workflow definition.
///
/// `definition` must be the JSON form of the engine's definition document.
pub async fn create_definition(
    pool: &PgPool,
    owner_id: &str,
    name: &str,
    schema_type: &str,
    definition: serde_json::Value,
) -> Result<WorkflowDefinitionRow, DbError> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    let sql = format!(
        "INSERT INTO workflow_definitions \
             (id, owner_id, name, schema_type, active, draft, definition, approval_fields, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, FALSE, TRUE, $5, '{{}}', $6, $6) \
         RETURNING {DEFINITION_COLUMNS}"
    );

    let row = sqlx::query_as::<_, WorkflowDefinitionRow>(&sql)
        .bind(id)
        .bind(owner_id)
        .bind(name)
        .bind(schema_type)
        .bind(definition)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(DbError::from_write)?;

    Ok(row)
}

/// Fetch a single definition by its primary key.
pub async fn get_definition(pool: &PgPool, id: &str) -> Result<WorkflowDefinitionRow, DbError> {
    let sql = format!("SELECT {DEFINITION_COLUMNS} FROM workflow_definitions WHERE id = $1");

    sqlx::query_as::<_, WorkflowDefinitionRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DbError::not_found("workflow definition", id))
}

/// Return active, non-draft definitions matching `filter`, oldest first.
pub async fn list_active_definitions(
    pool: &PgPool,
    filter: &DefinitionFilter,
) -> Result<Vec<WorkflowDefinitionRow>, DbError> {
    let sql = format!(
        "SELECT {DEFINITION_COLUMNS} FROM workflow_definitions \
         WHERE lower(schema_type) = lower($1) AND active AND NOT draft \
           AND ($2::TEXT IS NULL OR owner_id = $2) \
           AND ($3::TEXT IS NULL OR id <> $3) \
         ORDER BY created_at ASC"
    );

    let rows = sqlx::query_as::<_, WorkflowDefinitionRow>(&sql)
        .bind(&filter.schema_type)
        .bind(filter.owner_id.as_deref())
        .bind(filter.exclude_id.as_deref())
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Replace a definition's document.  Active definitions stay active; callers
/// re-run validation and the conflict check and then [`activate_definition`]
/// again so the domain rows follow the new document.
pub async fn update_definition(
    pool: &PgPool,
    id: &str,
    definition: serde_json::Value,
) -> Result<WorkflowDefinitionRow, DbError> {
    let sql = format!(
        "UPDATE workflow_definitions SET definition = $1, updated_at = $2 \
         WHERE id = $3 RETURNING {DEFINITION_COLUMNS}"
    );

    sqlx::query_as::<_, WorkflowDefinitionRow>(&sql)
        .bind(definition)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(DbError::from_write)?
        .ok_or_else(|| DbError::not_found("workflow definition", id))
}

/// Mark a definition active and non-draft and record its approval domain
/// keys, all in one transaction.
///
/// The `(owner_id, schema_type, domain_key)` unique constraint makes a
/// concurrent activation of an overlapping domain fail with
/// [`DbError::UniqueViolation`] instead of committing.  Domain rows store the
/// schema type lowercased so differently cased rows share one key space.
pub async fn activate_definition(
    pool: &PgPool,
    id: &str,
    domain_keys: &[String],
) -> Result<WorkflowDefinitionRow, DbError> {
    let mut tx = pool.begin().await?;

    let sql = format!(
        "UPDATE workflow_definitions SET active = TRUE, draft = FALSE, updated_at = $1 \
         WHERE id = $2 RETURNING {DEFINITION_COLUMNS}"
    );
    let row = sqlx::query_as::<_, WorkflowDefinitionRow>(&sql)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::not_found("workflow definition", id))?;

    sqlx::query("DELETE FROM workflow_definition_domains WHERE definition_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    for key in domain_keys {
        sqlx::query(
            "INSERT INTO workflow_definition_domains (definition_id, owner_id, schema_type, domain_key) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(&row.owner_id)
        .bind(row.schema_type.to_ascii_lowercase())
        .bind(key)
        .execute(&mut *tx)
        .await
        .map_err(DbError::from_write)?;
    }

    tx.commit().await?;

    Ok(row)
}

/// Deactivate a definition and release its approval domains.
pub async fn deactivate_definition(pool: &PgPool, id: &str) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        "UPDATE workflow_definitions SET active = FALSE, updated_at = $1 WHERE id = $2",
    )
    .bind(Utc::now())
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(DbError::not_found("workflow definition", id));
    }

    sqlx::query("DELETE FROM workflow_definition_domains WHERE definition_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}
