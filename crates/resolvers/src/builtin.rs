//! Built-in resolvers registered in [`crate::ResolverRegistry::builtin`].

use async_trait::async_trait;
use db::{models::Role, MembershipStore};
use tracing::debug;

use crate::{RequestContext, Resolver, ResolverError, WorkflowObject};

pub const OBJECT_CREATOR: &str = "object_creator";
pub const OBJECT_UPDATER: &str = "object_updater";
pub const ORGANIZATION_ADMINS: &str = "organization_admins";

/// Resolves to the user that created the triggering object.
pub struct ObjectCreator;

/// Resolves to the user that last updated the triggering object.
pub struct ObjectUpdater;

/// Resolves to every OWNER and ADMIN of the caller's organization.
pub struct OrganizationAdmins;

fn object_user_field(object: &WorkflowObject, field: &str) -> Result<Vec<String>, ResolverError> {
    if object.node.is_none() {
        return Err(ResolverError::BadRequest(format!(
            "{} '{}' was not loaded; cannot read {field}",
            object.object_type, object.id
        )));
    }
    Ok(object
        .string_field(field)
        .map(|user| vec![user.to_string()])
        .unwrap_or_default())
}

#[async_trait]
impl Resolver for ObjectCreator {
    async fn resolve(
        &self,
        _ctx: &RequestContext,
        _members: &dyn MembershipStore,
        object: &WorkflowObject,
    ) -> Result<Vec<String>, ResolverError> {
        object_user_field(object, "created_by")
    }
}

#[async_trait]
impl Resolver for ObjectUpdater {
    async fn resolve(
        &self,
        _ctx: &RequestContext,
        _members: &dyn MembershipStore,
        object: &WorkflowObject,
    ) -> Result<Vec<String>, ResolverError> {
        object_user_field(object, "updated_by")
    }
}

#[async_trait]
impl Resolver for OrganizationAdmins {
    async fn resolve(
        &self,
        ctx: &RequestContext,
        members: &dyn MembershipStore,
        _object: &WorkflowObject,
    ) -> Result<Vec<String>, ResolverError> {
        let org_id = ctx
            .organization_id()
            .ok_or_else(|| ResolverError::BadRequest("organization is missing from context".into()))?;

        let mut user_ids = members.role_member_ids(org_id, Role::Owner).await?;
        for user_id in members.role_member_ids(org_id, Role::Admin).await? {
            if !user_ids.contains(&user_id) {
                user_ids.push(user_id);
            }
        }

        debug!(org_id, count = user_ids.len(), "resolved organization admins");
        Ok(user_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WorkflowObjectType;
    use db::InMemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn object_creator_reads_created_by() {
        let store = InMemoryStore::new();
        let object = WorkflowObject::new(WorkflowObjectType::Risk, "risk1")
            .with_node(json!({ "created_by": "u1", "updated_by": "u2" }));

        let ctx = RequestContext::new("u5", "org1");
        assert_eq!(ObjectCreator.resolve(&ctx, &store, &object).await.unwrap(), vec!["u1"]);
        assert_eq!(ObjectUpdater.resolve(&ctx, &store, &object).await.unwrap(), vec!["u2"]);
    }

    #[tokio::test]
    async fn object_resolvers_need_a_loaded_node() {
        let store = InMemoryStore::new();
        let object = WorkflowObject::new(WorkflowObjectType::Risk, "risk1");
        let result = ObjectCreator
            .resolve(&RequestContext::new("u5", "org1"), &store, &object)
            .await;
        assert!(matches!(result, Err(ResolverError::BadRequest(_))));
    }

    #[tokio::test]
    async fn organization_admins_merges_owners_and_admins() {
        let store = InMemoryStore::new();
        store.add_org_member("org1", "owner1", Role::Owner);
        store.add_org_member("org1", "admin1", Role::Admin);
        store.add_org_member("org1", "member1", Role::Member);
        store.add_org_member("org2", "admin2", Role::Admin);
        let object = WorkflowObject::new(WorkflowObjectType::Control, "ctrl1");

        let ids = OrganizationAdmins
            .resolve(&RequestContext::new("u5", "org1"), &store, &object)
            .await
            .unwrap();
        assert_eq!(ids, vec!["owner1", "admin1"]);

        let missing_org = OrganizationAdmins
            .resolve(&RequestContext::anonymous(), &store, &object)
            .await;
        assert!(matches!(missing_org, Err(ResolverError::BadRequest(_))));
    }
}
