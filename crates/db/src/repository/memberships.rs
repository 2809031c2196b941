//! Group and organization membership lookups.

use sqlx::PgPool;

use crate::{DbError, models::Role};

/// Distinct user IDs that are members of `group_id`.
pub async fn group_member_ids(pool: &PgPool, group_id: &str) -> Result<Vec<String>, DbError> {
    let ids = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT user_id FROM group_memberships WHERE group_id = $1 ORDER BY user_id",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

/// Distinct user IDs holding `role` in `organization_id`.
pub async fn role_member_ids(
    pool: &PgPool,
    organization_id: &str,
    role: Role,
) -> Result<Vec<String>, DbError> {
    let ids = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT user_id FROM org_memberships \
         WHERE organization_id = $1 AND role = $2 ORDER BY user_id",
    )
    .bind(organization_id)
    .bind(role.as_str())
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

/// Group IDs `user_id` belongs to.
pub async fn user_group_ids(pool: &PgPool, user_id: &str) -> Result<Vec<String>, DbError> {
    let ids = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT group_id FROM group_memberships WHERE user_id = $1 ORDER BY group_id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

/// Add a user to a group.  Adding an existing member is a no-op.
pub async fn add_group_member(pool: &PgPool, group_id: &str, user_id: &str) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO group_memberships (group_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(group_id)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Insert or update a user's role in an organization.
pub async fn upsert_org_member(
    pool: &PgPool,
    organization_id: &str,
    user_id: &str,
    role: Role,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO org_memberships (organization_id, user_id, role) VALUES ($1, $2, $3) \
         ON CONFLICT (organization_id, user_id) DO UPDATE SET role = EXCLUDED.role",
    )
    .bind(organization_id)
    .bind(user_id)
    .bind(role.as_str())
    .execute(pool)
    .await?;
    Ok(())
}
