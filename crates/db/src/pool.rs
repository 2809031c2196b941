//! Postgres connection pool and the [`PgStore`] adapter.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::{
    DbError,
    models::{
        AssignmentStatus, AssignmentTargetRow, Role, WorkflowAssignmentRow,
        WorkflowDefinitionRow, WorkflowInstanceRow,
    },
    repository::{assignments, definitions, memberships},
    store::{AssignmentStore, DefinitionFilter, DefinitionStore, MembershipStore},
};

/// Type alias for the shared Postgres pool used across the whole application.
pub type DbPool = PgPool;

/// Create a new connection pool from the given `database_url`.
///
/// `max_connections` controls the pool ceiling.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, DbError> {
    info!("Connecting to database (max_connections={})", max_connections);
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run embedded SQLx migrations located in `./migrations` (relative to the
/// workspace root at build time).
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    info!("Running database migrations");
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

/// Store traits backed by the repository functions.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl DefinitionStore for PgStore {
    async fn list_active_definitions(
        &self,
        filter: &DefinitionFilter,
    ) -> Result<Vec<WorkflowDefinitionRow>, DbError> {
        definitions::list_active_definitions(&self.pool, filter).await
    }

    async fn get_definition(&self, id: &str) -> Result<WorkflowDefinitionRow, DbError> {
        definitions::get_definition(&self.pool, id).await
    }

    async fn activate_definition(
        &self,
        id: &str,
        domain_keys: &[String],
    ) -> Result<WorkflowDefinitionRow, DbError> {
        definitions::activate_definition(&self.pool, id, domain_keys).await
    }

    async fn deactivate_definition(&self, id: &str) -> Result<(), DbError> {
        definitions::deactivate_definition(&self.pool, id).await
    }
}

#[async_trait]
impl MembershipStore for PgStore {
    async fn group_member_ids(&self, group_id: &str) -> Result<Vec<String>, DbError> {
        memberships::group_member_ids(&self.pool, group_id).await
    }

    async fn role_member_ids(
        &self,
        organization_id: &str,
        role: Role,
    ) -> Result<Vec<String>, DbError> {
        memberships::role_member_ids(&self.pool, organization_id, role).await
    }

    async fn user_group_ids(&self, user_id: &str) -> Result<Vec<String>, DbError> {
        memberships::user_group_ids(&self.pool, user_id).await
    }
}

#[async_trait]
impl AssignmentStore for PgStore {
    async fn get_assignment(&self, id: &str) -> Result<WorkflowAssignmentRow, DbError> {
        assignments::get_assignment(&self.pool, id).await
    }

    async fn assignment_targets(
        &self,
        assignment_id: &str,
    ) -> Result<Vec<AssignmentTargetRow>, DbError> {
        assignments::list_assignment_targets(&self.pool, assignment_id).await
    }

    async fn get_instance(&self, id: &str) -> Result<WorkflowInstanceRow, DbError> {
        assignments::get_instance(&self.pool, id).await
    }

    async fn transition_assignment(
        &self,
        id: &str,
        from: AssignmentStatus,
        to: AssignmentStatus,
        actor_user_id: &str,
    ) -> Result<WorkflowAssignmentRow, DbError> {
        assignments::transition_assignment_status(&self.pool, id, from, to, actor_user_id).await
    }
}
