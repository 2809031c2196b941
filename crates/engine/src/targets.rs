//! Target resolution: turn a configured approval/review target into the
//! concrete user IDs allowed to act on an assignment.

use std::sync::Arc;

use db::{
    models::{AssignmentTargetRow, Role},
    MembershipStore,
};
use resolvers::{RequestContext, ResolverRegistry, WorkflowObject};
use tracing::{debug, instrument};

use crate::{
    models::{TargetConfig, TargetType},
    TargetError,
};

/// Users a single target expands to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Deduplicated, in lookup order.
    pub user_ids: Vec<String>,
    /// Set for resolver targets.
    pub resolver_key: Option<String>,
    /// Set for group targets.
    pub group_id: Option<String>,
}

/// Resolves [`TargetConfig`]s against memberships and the resolver registry.
#[derive(Clone)]
pub struct TargetResolver {
    members: Arc<dyn MembershipStore>,
    registry: Arc<ResolverRegistry>,
}

impl TargetResolver {
    pub fn new(members: Arc<dyn MembershipStore>) -> Self {
        Self {
            members,
            registry: ResolverRegistry::builtin(),
        }
    }

    pub fn with_registry(mut self, registry: Arc<ResolverRegistry>) -> Self {
        self.registry = registry;
        self
    }

    #[instrument(skip(self, ctx, object), fields(target_type = %target.target_type))]
    pub async fn resolve(
        &self,
        ctx: &RequestContext,
        target: &TargetConfig,
        object: Option<&WorkflowObject>,
    ) -> Result<ResolvedTarget, TargetError> {
        match target.kind() {
            Some(TargetType::User) => {
                let id = required_id(target, "user")?;
                Ok(ResolvedTarget {
                    user_ids: vec![id.to_string()],
                    ..ResolvedTarget::default()
                })
            }
            Some(TargetType::Group) => {
                let id = required_id(target, "group")?;
                let user_ids = self.members.group_member_ids(id).await?;
                Ok(ResolvedTarget {
                    user_ids: dedup(user_ids),
                    group_id: Some(id.to_string()),
                    ..ResolvedTarget::default()
                })
            }
            Some(TargetType::Role) => {
                let id = required_id(target, "role")?;
                if object.is_none() {
                    return Err(TargetError::MissingObject);
                }
                let role = Role::parse(id).ok_or_else(|| TargetError::InvalidRole(id.to_string()))?;
                let organization_id = ctx.organization_id().ok_or(TargetError::MissingOrganization)?;

                let user_ids = self.members.role_member_ids(organization_id, role).await?;
                Ok(ResolvedTarget {
                    user_ids: dedup(user_ids),
                    ..ResolvedTarget::default()
                })
            }
            Some(TargetType::Resolver) => {
                let key = target.resolver_key.trim();
                if key.is_empty() {
                    return Err(TargetError::MissingResolverKey);
                }
                let resolver = self
                    .registry
                    .get(key)
                    .ok_or_else(|| TargetError::UnknownResolver(key.to_string()))?;
                let object = object.ok_or(TargetError::MissingObject)?;

                let user_ids = resolver
                    .resolve(ctx, self.members.as_ref(), object)
                    .await
                    .map_err(|source| TargetError::Resolver {
                        key: key.to_string(),
                        source,
                    })?;
                let user_ids = dedup(user_ids.into_iter().filter(|id| !id.trim().is_empty()));
                debug!(resolver = key, users = user_ids.len(), "resolver target expanded");

                Ok(ResolvedTarget {
                    user_ids,
                    resolver_key: Some(key.to_string()),
                    ..ResolvedTarget::default()
                })
            }
            None => Err(TargetError::InvalidType(target.target_type.clone())),
        }
    }

    /// Union of every target's users, deduplicated in target order.
    pub async fn resolve_all(
        &self,
        ctx: &RequestContext,
        targets: &[TargetConfig],
        object: Option<&WorkflowObject>,
    ) -> Result<Vec<String>, TargetError> {
        let mut user_ids = Vec::new();
        for target in targets {
            user_ids.extend(self.resolve(ctx, target, object).await?.user_ids);
        }
        Ok(dedup(user_ids))
    }

    /// Target rows to record for a new assignment: one USER row per resolved
    /// user (the first resolver to produce a user is kept) and one GROUP row
    /// per group target.
    pub async fn materialize(
        &self,
        ctx: &RequestContext,
        assignment_id: &str,
        targets: &[TargetConfig],
        object: Option<&WorkflowObject>,
    ) -> Result<Vec<AssignmentTargetRow>, TargetError> {
        let mut user_rows: Vec<AssignmentTargetRow> = Vec::new();
        let mut group_rows: Vec<AssignmentTargetRow> = Vec::new();

        for target in targets {
            let resolved = self.resolve(ctx, target, object).await?;
            for user_id in resolved.user_ids {
                let seen = user_rows
                    .iter()
                    .any(|row| row.target_user_id.as_deref() == Some(user_id.as_str()));
                if !seen {
                    user_rows.push(AssignmentTargetRow::user(
                        assignment_id,
                        user_id,
                        resolved.resolver_key.clone(),
                    ));
                }
            }
            if let Some(group_id) = resolved.group_id {
                let seen = group_rows
                    .iter()
                    .any(|row| row.target_group_id.as_deref() == Some(group_id.as_str()));
                if !seen {
                    group_rows.push(AssignmentTargetRow::group(assignment_id, group_id));
                }
            }
        }

        user_rows.extend(group_rows);
        Ok(user_rows)
    }
}

fn required_id<'a>(target: &'a TargetConfig, kind: &'static str) -> Result<&'a str, TargetError> {
    let id = target.id.trim();
    if id.is_empty() {
        return Err(TargetError::MissingId(kind));
    }
    Ok(id)
}

fn dedup(ids: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}
