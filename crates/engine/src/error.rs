//! Engine-level error types.
//!
//! Each component has its own enum so callers can match on the exact kind;
//! [`EngineError`] wraps all of them for callers that run the whole
//! validate → check → activate pipeline.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// The "invalid expression" kind: anything that stops an expression from
/// compiling against its scope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    #[error("invalid expression: compilation failed: {message}")]
    Compile { message: String },

    #[error("invalid expression: undeclared reference to '{name}' in {scope} scope")]
    UndeclaredVariable { name: String, scope: &'static str },

    #[error("invalid expression: unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("invalid expression: {size} code points exceeds the limit of {limit}")]
    TooLarge { size: usize, limit: usize },
}

// ---------------------------------------------------------------------------
// Action params
// ---------------------------------------------------------------------------

/// Per-action parameter failures.
#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("approval action params are required")]
    ApprovalParamsRequired,

    #[error("review action params are required")]
    ReviewParamsRequired,

    #[error("webhook action params are required")]
    WebhookParamsRequired,

    #[error("field update action params are required")]
    FieldUpdateParamsRequired,

    #[error("malformed params: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("approval action requires at least one field or edge")]
    FieldRequired,

    #[error("approval edges are not supported")]
    EdgesNotSupported,

    #[error("field '{0}' is not eligible for workflow approval")]
    FieldNotEligible(String),

    #[error("approval action requires at least one target")]
    ApprovalTargetsRequired,

    #[error("review action requires at least one target")]
    ReviewTargetsRequired,

    #[error("required_count must not be negative (got {0})")]
    RequiredCountNegative(i64),

    #[error("required must be a boolean or a non-negative count (got {0})")]
    RequiredInvalid(String),

    #[error("{0} target requires an id")]
    TargetMissingId(String),

    #[error("invalid role '{0}'")]
    TargetInvalidRole(String),

    #[error("resolver target requires a resolver key")]
    TargetMissingResolverKey,

    #[error("unknown resolver '{0}'")]
    TargetUnknownResolver(String),

    #[error("invalid target type '{0}'")]
    TargetInvalidType(String),

    #[error("webhook 'payload' is no longer supported, use 'payload_expr'")]
    WebhookPayloadUnsupported,

    #[error("webhook url is required")]
    WebhookUrlRequired,

    #[error("webhook url '{0}' must be absolute with a scheme and host")]
    WebhookUrlInvalid(String),

    #[error("field update action requires at least one update")]
    UpdatesRequired,

    #[error(transparent)]
    Expression(#[from] ExpressionError),
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// Structural validation failures for a definition document.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("definition required")]
    DefinitionRequired,

    #[error("schema type mismatch: definition schemaType '{document}' does not match input schemaType '{input}'")]
    SchemaTypeMismatch { document: String, input: String },

    #[error("definition requires at least one trigger")]
    NoTriggers,

    #[error("trigger {index} is missing an operation")]
    TriggerMissingOperation { index: usize },

    #[error("trigger {index} has unsupported operation '{operation}'")]
    TriggerUnsupportedOperation { index: usize, operation: String },

    #[error("trigger {index} is missing an object type")]
    TriggerMissingObjectType { index: usize },

    #[error("trigger {index} has objectType '{object_type}', expected '{expected}'")]
    TriggerObjectTypeMismatch {
        index: usize,
        object_type: String,
        expected: String,
    },

    #[error("trigger {index} has an empty field name")]
    TriggerEmptyFieldName { index: usize },

    #[error("trigger {index} has an empty edge name")]
    TriggerEmptyEdgeName { index: usize },

    #[error("trigger {index}: {source}")]
    TriggerExpression {
        index: usize,
        #[source]
        source: ExpressionError,
    },

    #[error("condition {index}: {source}")]
    ConditionExpression {
        index: usize,
        #[source]
        source: ExpressionError,
    },

    #[error("definition requires at least one action")]
    NoActions,

    #[error("action {index} is missing a key")]
    ActionMissingKey { index: usize },

    #[error("duplicate action key '{0}'")]
    DuplicateActionKey(String),

    #[error("action {index} is missing a type")]
    ActionMissingType { index: usize },

    #[error("unsupported action type: action {index} has type {action_type}")]
    UnsupportedActionType { index: usize, action_type: String },

    #[error("invalid action params: action {index} ({key}): {source}")]
    InvalidActionParams {
        index: usize,
        key: String,
        #[source]
        source: ParamsError,
    },

    #[error("action {index} ({key}) when: {source}")]
    ActionWhenExpression {
        index: usize,
        key: String,
        #[source]
        source: ExpressionError,
    },

    #[error("duplicate approval field set '{field_set}': actions '{first}' and '{second}' both target the same fields")]
    DuplicateApprovalFieldSet {
        field_set: String,
        first: String,
        second: String,
    },

    #[error("invalid approval submission mode '{0}'")]
    SubmissionModeInvalid(String),

    #[error("manual submit mode is not yet supported")]
    ManualSubmitNotSupported,

    #[error("invalid approval timing '{0}'")]
    ApprovalTimingInvalid(String),
}

impl DefinitionError {
    /// The expression failure behind this error, if there is one.
    pub fn expression_error(&self) -> Option<&ExpressionError> {
        match self {
            Self::TriggerExpression { source, .. }
            | Self::ConditionExpression { source, .. }
            | Self::ActionWhenExpression { source, .. } => Some(source),
            Self::InvalidActionParams {
                source: ParamsError::Expression(source),
                ..
            } => Some(source),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Domains and conflicts
// ---------------------------------------------------------------------------

/// Failure extracting approval domains from a document.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("approval action '{key}' has invalid params: {source}")]
    InvalidApprovalParams {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConflictError {
    #[error("invalid workflow schema type '{0}'")]
    InvalidSchemaType(String),

    #[error("conflicting approval domain: domain '{domain_key}' already used by workflow definition '{definition_id}'")]
    ConflictingDomain {
        domain_key: String,
        definition_id: String,
    },

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("stored workflow definition '{definition_id}' is malformed: {message}")]
    MalformedDefinition {
        definition_id: String,
        message: String,
    },

    #[error("failed to query workflow definitions: {0}")]
    Query(#[source] db::DbError),

    /// Another definition claimed an overlapping domain between the conflict
    /// check and this definition's activation.
    #[error("approval domain of workflow definition '{definition_id}' was claimed by another definition during activation")]
    DomainClaimed { definition_id: String },

    #[error("failed to activate workflow definition '{definition_id}': {source}")]
    Activation {
        definition_id: String,
        #[source]
        source: db::DbError,
    },
}

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("{0} target requires an id")]
    MissingId(&'static str),

    #[error("invalid role '{0}'")]
    InvalidRole(String),

    #[error("resolver target requires a resolver key")]
    MissingResolverKey,

    #[error("unknown resolver '{0}'")]
    UnknownResolver(String),

    #[error("invalid target type '{0}'")]
    InvalidType(String),

    #[error("workflow object reference is required")]
    MissingObject,

    #[error("organization is missing from context")]
    MissingOrganization,

    #[error("resolver '{key}' failed: {source}")]
    Resolver {
        key: String,
        #[source]
        source: resolvers::ResolverError,
    },

    #[error("membership lookup failed: {0}")]
    Store(#[from] db::DbError),
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// Every authorization failure collapses to this one variant.
    #[error("permission denied")]
    PermissionDenied,

    #[error("store failure: {0}")]
    Store(#[source] db::DbError),
}

impl From<db::DbError> for DecisionError {
    fn from(err: db::DbError) -> Self {
        match err {
            db::DbError::NotFound { entity, id } => Self::NotFound { entity, id },
            db::DbError::StaleTransition { .. } => Self::PermissionDenied,
            other => Self::Store(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Umbrella
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error(transparent)]
    Decision(#[from] DecisionError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),
}
