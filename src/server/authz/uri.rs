//! Canonical names for every subject and object the authorization engine
//! reasons about.
//!
//! A [`ResourceUri`] renders as `gamedeals://<kind>/<path>`. The path is an
//! instance id, a `*` wildcard, or empty for the whole collection. Policy
//! tuples only ever store the rendered string, so the string form is the
//! identity: two URIs are equal iff their canonical strings are equal.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::action::AuthorizationAction;
use super::errors::AuthzError;

pub const SCHEME: &str = "gamedeals";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    User,
    Game,
    Deal,
    AuthorizationPolicy,
    Role,
    /// Subject used for requests without a valid identity. Never has a path.
    UntrustedUser,
    ApiMetadata,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::User => "user",
            ResourceKind::Game => "game",
            ResourceKind::Deal => "deal",
            ResourceKind::AuthorizationPolicy => "authorization-policy",
            ResourceKind::Role => "role",
            ResourceKind::UntrustedUser => "untrusted-user",
            ResourceKind::ApiMetadata => "api-metadata",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ResourceKind::User),
            "game" => Ok(ResourceKind::Game),
            "deal" => Ok(ResourceKind::Deal),
            "authorization-policy" => Ok(ResourceKind::AuthorizationPolicy),
            "role" => Ok(ResourceKind::Role),
            "untrusted-user" => Ok(ResourceKind::UntrustedUser),
            "api-metadata" => Ok(ResourceKind::ApiMetadata),
            _ => Err(AuthzError::UnknownKind(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceUri {
    kind: ResourceKind,
    path: String,
}

impl ResourceUri {
    /// Leading and trailing slashes of `path` are dropped, so `"/*"` and `"*"`
    /// name the same thing.
    pub fn new(kind: ResourceKind, path: impl AsRef<str>) -> Self {
        let path = match kind {
            ResourceKind::UntrustedUser => String::new(),
            _ => path.as_ref().trim_matches('/').to_string(),
        };
        Self { kind, path }
    }

    /// The collection URI, e.g. `gamedeals://deal/`.
    pub fn collection(kind: ResourceKind) -> Self {
        Self::new(kind, "")
    }

    /// Every instance of a kind, e.g. `gamedeals://deal/*`.
    pub fn wildcard(kind: ResourceKind) -> Self {
        Self::new(kind, "*")
    }

    pub fn instance(kind: ResourceKind, id: u64) -> Self {
        Self::new(kind, id.to_string())
    }

    pub fn untrusted_user() -> Self {
        Self::collection(ResourceKind::UntrustedUser)
    }

    pub fn role(name: &str) -> Self {
        Self::new(ResourceKind::Role, name)
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}://{}/{}", self.kind, self.path)
    }
}

impl FromStr for ResourceUri {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(SCHEME)
            .and_then(|rest| rest.strip_prefix("://"))
            .ok_or_else(|| AuthzError::InvalidUri(s.to_string()))?;

        let (kind, path) = rest.split_once('/').unwrap_or((rest, ""));
        let kind: ResourceKind = kind.parse()?;
        if kind == ResourceKind::UntrustedUser && !path.is_empty() {
            return Err(AuthzError::InvalidUri(s.to_string()));
        }

        Ok(Self::new(kind, path))
    }
}

impl TryFrom<String> for ResourceUri {
    type Error = AuthzError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceUri> for String {
    fn from(uri: ResourceUri) -> Self {
        uri.to_string()
    }
}

/// A [`ResourceUri`] annotated with the action being attempted, rendered as a
/// URI fragment (`gamedeals://deal/#create`). Only used for log lines; it
/// never takes part in equality or matching.
#[derive(Debug, Clone)]
pub struct AuthorizationUri {
    pub uri: ResourceUri,
    pub action: Option<AuthorizationAction>,
}

impl AuthorizationUri {
    pub fn new(uri: ResourceUri, action: Option<AuthorizationAction>) -> Self {
        Self { uri, action }
    }
}

impl fmt::Display for AuthorizationUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.action {
            Some(action) => write!(f, "{}#{}", self.uri, action.name()),
            None => write!(f, "{}", self.uri),
        }
    }
}
