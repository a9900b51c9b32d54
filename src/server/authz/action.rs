use std::fmt;
use std::str::FromStr;

use super::errors::AuthzError;
use super::uri::ResourceKind;

/// Declares the action enum of one resource kind. Action names are scoped by
/// their kind when rendered (`deal#create`), so the same short name never
/// collides across kinds.
macro_rules! kind_actions {
    ($kind:ident => $name:ident { $($variant:ident => $value:literal,)+ }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $value,)+
                }
            }

            fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($value => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl From<$name> for AuthorizationAction {
            fn from(action: $name) -> Self {
                AuthorizationAction::$kind(action)
            }
        }
    };
}

kind_actions!(User => UserAction {
    Create => "create",
    RetrieveNonSecure => "retrieve_non_secure",
    RetrieveSecure => "retrieve_secure",
    UpdateNonSecure => "update_non_secure",
    UpdateSecure => "update_secure",
    Delete => "delete",
    Authenticate => "authenticate",
});

kind_actions!(Game => GameAction {
    Create => "create",
    Retrieve => "retrieve",
    Update => "update",
    Delete => "delete",
});

kind_actions!(Deal => DealAction {
    Create => "create",
    Retrieve => "retrieve",
    Update => "update",
    Delete => "delete",
});

kind_actions!(Policy => PolicyAction {
    Create => "create",
    Retrieve => "retrieve",
});

kind_actions!(Role => RoleAction {
    Assume => "assume",
});

kind_actions!(Metadata => MetadataAction {
    Retrieve => "retrieve",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthorizationAction {
    User(UserAction),
    Game(GameAction),
    Deal(DealAction),
    Policy(PolicyAction),
    Role(RoleAction),
    Metadata(MetadataAction),
}

impl AuthorizationAction {
    /// The resource kind this action may be performed on.
    pub fn kind(self) -> ResourceKind {
        match self {
            AuthorizationAction::User(_) => ResourceKind::User,
            AuthorizationAction::Game(_) => ResourceKind::Game,
            AuthorizationAction::Deal(_) => ResourceKind::Deal,
            AuthorizationAction::Policy(_) => ResourceKind::AuthorizationPolicy,
            AuthorizationAction::Role(_) => ResourceKind::Role,
            AuthorizationAction::Metadata(_) => ResourceKind::ApiMetadata,
        }
    }

    /// Short name without the kind prefix.
    pub fn name(self) -> &'static str {
        match self {
            AuthorizationAction::User(a) => a.name(),
            AuthorizationAction::Game(a) => a.name(),
            AuthorizationAction::Deal(a) => a.name(),
            AuthorizationAction::Policy(a) => a.name(),
            AuthorizationAction::Role(a) => a.name(),
            AuthorizationAction::Metadata(a) => a.name(),
        }
    }
}

impl fmt::Display for AuthorizationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind(), self.name())
    }
}

impl FromStr for AuthorizationAction {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || AuthzError::UnknownAction(s.to_string());
        let (kind, name) = s.split_once('#').ok_or_else(unknown)?;
        let kind: ResourceKind = kind.parse().map_err(|_| unknown())?;

        let action = match kind {
            ResourceKind::User => UserAction::from_name(name).map(Self::from),
            ResourceKind::Game => GameAction::from_name(name).map(Self::from),
            ResourceKind::Deal => DealAction::from_name(name).map(Self::from),
            ResourceKind::AuthorizationPolicy => PolicyAction::from_name(name).map(Self::from),
            ResourceKind::Role => RoleAction::from_name(name).map(Self::from),
            ResourceKind::ApiMetadata => MetadataAction::from_name(name).map(Self::from),
            ResourceKind::UntrustedUser => None,
        };
        action.ok_or_else(unknown)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn all_actions() -> Vec<AuthorizationAction> {
        let mut actions: Vec<AuthorizationAction> = Vec::new();
        actions.extend(UserAction::ALL.iter().map(|a| AuthorizationAction::from(*a)));
        actions.extend(GameAction::ALL.iter().map(|a| AuthorizationAction::from(*a)));
        actions.extend(DealAction::ALL.iter().map(|a| AuthorizationAction::from(*a)));
        actions.extend(PolicyAction::ALL.iter().map(|a| AuthorizationAction::from(*a)));
        actions.extend(RoleAction::ALL.iter().map(|a| AuthorizationAction::from(*a)));
        actions.extend(MetadataAction::ALL.iter().map(|a| AuthorizationAction::from(*a)));
        actions
    }

    #[test]
    fn test_display() {
        assert_eq!(
            AuthorizationAction::from(UserAction::RetrieveNonSecure).to_string(),
            "user#retrieve_non_secure"
        );
        assert_eq!(
            AuthorizationAction::from(DealAction::Create).to_string(),
            "deal#create"
        );
        assert_eq!(
            AuthorizationAction::from(PolicyAction::Create).to_string(),
            "authorization-policy#create"
        );
        assert_eq!(
            AuthorizationAction::from(RoleAction::Assume).to_string(),
            "role#assume"
        );
    }

    #[test]
    fn test_names_unique_across_kinds() {
        let actions = all_actions();
        let rendered: HashSet<String> = actions.iter().map(|a| a.to_string()).collect();
        assert_eq!(rendered.len(), actions.len());

        // Same short name, different kinds.
        assert_ne!(
            AuthorizationAction::from(GameAction::Create),
            AuthorizationAction::from(DealAction::Create)
        );
    }

    #[test]
    fn test_parse() {
        for action in all_actions() {
            let parsed: AuthorizationAction = action.to_string().parse().unwrap();
            assert_eq!(parsed, action);
        }

        let cases = [
            "deal",
            "deal#",
            "deal#authenticate",
            "untrusted-user#create",
            "dragon#create",
            "#create",
        ];
        for case in cases {
            assert!(case.parse::<AuthorizationAction>().is_err(), "{case}");
        }
    }

    #[test]
    fn test_kind() {
        assert_eq!(
            AuthorizationAction::from(UserAction::Authenticate).kind(),
            ResourceKind::User
        );
        assert_eq!(
            AuthorizationAction::from(PolicyAction::Retrieve).kind(),
            ResourceKind::AuthorizationPolicy
        );
        assert_eq!(
            AuthorizationAction::from(MetadataAction::Retrieve).kind(),
            ResourceKind::ApiMetadata
        );
    }
}
