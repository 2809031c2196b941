//! Per-action-type parameter shapes and their validation.
//!
//! Every action type has its own params struct and validation function.
//! Legacy `assignees` lists are folded into [`TargetConfig`] entries at parse
//! time so the rest of the engine only ever sees `targets`.

use std::collections::BTreeSet;

use db::models::Role;
use resolvers::ResolverRegistry;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::{
    expression::{validate_expression, ExpressionScope},
    models::{null_as_default, TargetConfig, TargetType},
    ExpressionConfig, ParamsError,
};

// ---------------------------------------------------------------------------
// Shapes
// ---------------------------------------------------------------------------

/// Pre-`targets` assignee lists, grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Assignees {
    #[serde(deserialize_with = "null_as_default")]
    pub users: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub groups: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub roles: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub resolvers: Vec<String>,
}

impl Assignees {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
            && self.groups.is_empty()
            && self.roles.is_empty()
            && self.resolvers.is_empty()
    }

    /// Equivalent target list: users, then groups, roles, resolvers.
    pub fn to_targets(&self) -> Vec<TargetConfig> {
        self.users
            .iter()
            .map(TargetConfig::user)
            .chain(self.groups.iter().map(TargetConfig::group))
            .chain(self.roles.iter().map(TargetConfig::role))
            .chain(self.resolvers.iter().map(TargetConfig::resolver))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalActionParams {
    #[serde(deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetConfig>,
    #[serde(deserialize_with = "null_as_default", skip_serializing_if = "Assignees::is_empty")]
    pub assignees: Assignees,
    /// Untyped: bool, number, or a string holding either.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Value>,
    #[serde(alias = "requiredCount", deserialize_with = "null_as_default")]
    pub required_count: i64,
    #[serde(deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<String>,
    #[serde(deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub label: String,
}

impl ApprovalActionParams {
    /// Explicit `targets` when present, otherwise the legacy assignees.
    pub fn resolved_targets(&self) -> Vec<TargetConfig> {
        if self.targets.is_empty() {
            self.assignees.to_targets()
        } else {
            self.targets.clone()
        }
    }

    pub fn quorum(&self) -> ApprovalQuorum {
        ApprovalQuorum::resolve(self.required.as_ref(), self.required_count)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewActionParams {
    #[serde(deserialize_with = "null_as_default")]
    pub targets: Vec<TargetConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Value>,
    #[serde(alias = "requiredCount", deserialize_with = "null_as_default")]
    pub required_count: i64,
    /// Free-form text shown to reviewers.
    #[serde(deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub label: String,
}

impl ReviewActionParams {
    pub fn quorum(&self) -> ApprovalQuorum {
        ApprovalQuorum::resolve(self.required.as_ref(), self.required_count)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookActionParams {
    #[serde(deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub method: String,
    #[serde(deserialize_with = "null_as_default", skip_serializing_if = "Map::is_empty")]
    pub headers: Map<String, Value>,
    #[serde(deserialize_with = "null_as_default", skip_serializing_if = "String::is_empty")]
    pub payload_expr: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldUpdateActionParams {
    #[serde(deserialize_with = "null_as_default")]
    pub updates: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Quorum
// ---------------------------------------------------------------------------

/// How many approvals an assignment needs once its assignees are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalQuorum {
    /// A single approval.
    Any,
    /// Every resolved assignee.
    All,
    Count(usize),
}

impl ApprovalQuorum {
    /// A non-zero `required_count` wins; otherwise a numeric `required` is
    /// the count, `true` means everyone and anything else means one.
    pub fn resolve(required: Option<&Value>, required_count: i64) -> Self {
        if let Ok(count) = usize::try_from(required_count) {
            if count > 0 {
                return Self::Count(count);
            }
        }

        match required {
            Some(Value::Bool(true)) => Self::All,
            Some(Value::Number(n)) => match n.as_u64() {
                Some(count) if count > 0 => Self::Count(count as usize),
                _ => Self::Any,
            },
            Some(Value::String(s)) => {
                let s = s.trim();
                if s.eq_ignore_ascii_case("true") {
                    Self::All
                } else {
                    match s.parse::<usize>() {
                        Ok(count) if count > 0 => Self::Count(count),
                        _ => Self::Any,
                    }
                }
            }
            _ => Self::Any,
        }
    }

    /// Approvals needed given `assignees` resolved users, never below one.
    pub fn threshold(&self, assignees: usize) -> usize {
        match self {
            Self::Any => 1,
            Self::All => assignees.max(1),
            Self::Count(count) => (*count).max(1),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn parse_params<T: for<'de> Deserialize<'de>>(raw: &Value) -> Result<T, ParamsError> {
    Ok(T::deserialize(raw)?)
}

/// Validate approval params and return them parsed.
///
/// `eligible_fields` empty means any field may be targeted.
pub fn validate_approval_params(
    raw: Option<&Value>,
    eligible_fields: &BTreeSet<String>,
    registry: &ResolverRegistry,
) -> Result<ApprovalActionParams, ParamsError> {
    let raw = raw.ok_or(ParamsError::ApprovalParamsRequired)?;
    let params: ApprovalActionParams = parse_params(raw)?;

    validate_approval_fields(&params.fields, &params.edges, eligible_fields)?;

    let targets = params.resolved_targets();
    if targets.is_empty() {
        return Err(ParamsError::ApprovalTargetsRequired);
    }

    validate_required_count(params.required_count)?;
    validate_required(params.required.as_ref())?;
    validate_targets(&targets, registry)?;

    Ok(params)
}

fn validate_approval_fields(
    fields: &[String],
    edges: &[String],
    eligible_fields: &BTreeSet<String>,
) -> Result<(), ParamsError> {
    if fields.is_empty() && edges.is_empty() {
        return Err(ParamsError::FieldRequired);
    }
    if !edges.is_empty() {
        return Err(ParamsError::EdgesNotSupported);
    }
    if eligible_fields.is_empty() {
        return Ok(());
    }

    for field in fields.iter().map(|f| f.trim()).filter(|f| !f.is_empty()) {
        if !eligible_fields.contains(field) {
            return Err(ParamsError::FieldNotEligible(field.to_string()));
        }
    }
    Ok(())
}

pub fn validate_review_params(
    raw: Option<&Value>,
    registry: &ResolverRegistry,
) -> Result<ReviewActionParams, ParamsError> {
    let raw = raw.ok_or(ParamsError::ReviewParamsRequired)?;
    let params: ReviewActionParams = parse_params(raw)?;

    if params.targets.is_empty() {
        return Err(ParamsError::ReviewTargetsRequired);
    }

    validate_required_count(params.required_count)?;
    validate_required(params.required.as_ref())?;
    validate_targets(&params.targets, registry)?;

    Ok(params)
}

pub fn validate_webhook_params(
    raw: Option<&Value>,
    expressions: &ExpressionConfig,
) -> Result<WebhookActionParams, ParamsError> {
    let raw = raw.ok_or(ParamsError::WebhookParamsRequired)?;
    if raw.get("payload").is_some() {
        return Err(ParamsError::WebhookPayloadUnsupported);
    }

    let params: WebhookActionParams = parse_params(raw)?;

    let url = params.url.trim();
    if url.is_empty() {
        return Err(ParamsError::WebhookUrlRequired);
    }
    match Url::parse(url) {
        Ok(parsed) if !parsed.scheme().is_empty() && parsed.host_str().is_some_and(|h| !h.is_empty()) => {}
        _ => return Err(ParamsError::WebhookUrlInvalid(url.to_string())),
    }

    validate_expression(expressions, ExpressionScope::Action, &params.payload_expr)?;

    Ok(params)
}

pub fn validate_field_update_params(raw: Option<&Value>) -> Result<FieldUpdateActionParams, ParamsError> {
    let raw = raw.ok_or(ParamsError::FieldUpdateParamsRequired)?;
    let params: FieldUpdateActionParams = parse_params(raw)?;

    if params.updates.is_empty() {
        return Err(ParamsError::UpdatesRequired);
    }
    Ok(params)
}

pub fn validate_required_count(count: i64) -> Result<(), ParamsError> {
    if count < 0 {
        return Err(ParamsError::RequiredCountNegative(count));
    }
    Ok(())
}

/// `required` may be absent, a bool, a non-negative number, or a string that
/// is blank, `true`/`false`, or a non-negative integer.
pub fn validate_required(required: Option<&Value>) -> Result<(), ParamsError> {
    match required {
        None | Some(Value::Null) | Some(Value::Bool(_)) => Ok(()),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) if v >= 0.0 => Ok(()),
            _ => Err(ParamsError::RequiredInvalid(n.to_string())),
        },
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty()
                || trimmed.eq_ignore_ascii_case("true")
                || trimmed.eq_ignore_ascii_case("false")
            {
                return Ok(());
            }
            match trimmed.parse::<i64>() {
                Ok(n) if n >= 0 => Ok(()),
                _ => Err(ParamsError::RequiredInvalid(format!("{s:?}"))),
            }
        }
        Some(other) => Err(ParamsError::RequiredInvalid(other.to_string())),
    }
}

pub fn validate_targets(targets: &[TargetConfig], registry: &ResolverRegistry) -> Result<(), ParamsError> {
    targets
        .iter()
        .try_for_each(|target| validate_target(target, registry))
}

pub fn validate_target(target: &TargetConfig, registry: &ResolverRegistry) -> Result<(), ParamsError> {
    match target.kind() {
        Some(kind @ (TargetType::User | TargetType::Group)) => {
            if target.id.trim().is_empty() {
                return Err(ParamsError::TargetMissingId(kind.to_string()));
            }
        }
        Some(TargetType::Role) => {
            if target.id.trim().is_empty() {
                return Err(ParamsError::TargetMissingId(TargetType::Role.to_string()));
            }
            if Role::parse(&target.id).is_none() {
                return Err(ParamsError::TargetInvalidRole(target.id.clone()));
            }
        }
        Some(TargetType::Resolver) => {
            let key = target.resolver_key.trim();
            if key.is_empty() {
                return Err(ParamsError::TargetMissingResolverKey);
            }
            if !registry.contains(key) {
                return Err(ParamsError::TargetUnknownResolver(key.to_string()));
            }
        }
        None => return Err(ParamsError::TargetInvalidType(target.target_type.clone())),
    }
    Ok(())
}
