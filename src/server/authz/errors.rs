use thiserror::Error;

/// Errors raised while authoring or compiling authorization policies. Except
/// for [`AuthzError::Engine`] they are configuration errors: the server must
/// refuse to start (or refuse the administrative write) rather than run with
/// a partial ruleset.
#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("invalid resource uri '{0}'")]
    InvalidUri(String),

    #[error("unknown resource kind '{0}'")]
    UnknownKind(String),

    #[error("unknown authorization action '{0}'")]
    UnknownAction(String),

    #[error("unknown policy type '{0}'")]
    UnknownPolicyType(String),

    #[error("policy tuple must have 3 components, found {0}")]
    TupleArity(usize),

    #[error("policy {component} cannot be empty")]
    EmptyComponent { component: &'static str },

    #[error("invalid uri pattern '{0}', '*' is only allowed alone or as a trailing '/*'")]
    UriPattern(String),

    #[error("invalid action pattern '{pattern}': {source}")]
    ActionPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid rule expression '{rule}': {reason}")]
    RuleExpression { rule: String, reason: String },

    #[error("invalid role membership '{member}' -> '{role}': {reason}")]
    Grouping {
        member: String,
        role: String,
        reason: &'static str,
    },

    #[error("casbin: {0}")]
    Engine(String),
}

pub type AuthzResult<T> = Result<T, AuthzError>;
