use std::collections::HashMap;

use casbin::function_map::OperatorFunction;
use casbin::{CoreApi, DefaultModel, MemoryAdapter, MgmtApi, RbacApi};
use log::debug;
use rhai::Dynamic;

use super::action::{AuthorizationAction, RoleAction};
use super::errors::{AuthzError, AuthzResult};
use super::matcher::{self, is_uri_subject, subject_rule_match, RuleExpr, SubjectAttributes};
use super::policy::{PolicyRulesets, PolicyTuple, PolicyType};
use super::uri::{ResourceKind, ResourceUri};

/// Subjects match directly, through a role, by URI pattern or by rule
/// expression. Objects use `keyMatch` patterns, actions anchored regexes.
const MODEL: &str = r#"
[request_definition]
r = sub, obj, act, attrs

[policy_definition]
p = sub, obj, act

[role_definition]
g = _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = (g(r.sub, p.sub) || keyMatch(r.sub, p.sub) || subjectRule(r.attrs, p.sub)) && keyMatch(r.obj, p.obj) && regexMatch(r.act, p.act)
"#;

/// Rows in the shape the casbin model consumes.
#[derive(Debug, Default)]
pub struct CompiledPolicies {
    permissions: Vec<Vec<String>>,
    groupings: Vec<Vec<String>>,
}

/// The loaded ruleset. Built once from [`PolicyRulesets`] and immutable
/// afterwards; a policy change means building a new one.
pub struct Enforcer {
    inner: casbin::Enforcer,
    /// Every role each grouping member holds, following role-of-role rows.
    roles: HashMap<String, Vec<String>>,
    rules: usize,
    groupings: usize,
}

fn engine_error(err: casbin::Error) -> AuthzError {
    AuthzError::Engine(err.to_string())
}

impl Enforcer {
    /// Checks every tuple and translates it for the model. Nothing here
    /// touches casbin, so it is cheap enough to run before storing policies.
    pub fn compile(rulesets: &PolicyRulesets) -> AuthzResult<CompiledPolicies> {
        let mut compiled = CompiledPolicies::default();
        for (policy_type, tuples) in rulesets.iter() {
            for tuple in tuples.iter() {
                match policy_type {
                    PolicyType::Permission => compiled.permissions.push(Self::compile_rule(tuple)?),
                    PolicyType::Grouping => compiled.groupings.push(Self::compile_grouping(tuple)?),
                }
            }
        }
        Ok(compiled)
    }

    fn compile_rule(tuple: &PolicyTuple) -> AuthzResult<Vec<String>> {
        if is_uri_subject(tuple.subject()) {
            matcher::check_uri_pattern(tuple.subject())?;
        } else {
            RuleExpr::parse(tuple.subject())?;
        }
        matcher::check_uri_pattern(tuple.object())?;
        let action = matcher::action_regex(tuple.action())?;
        Ok(vec![
            tuple.subject().to_string(),
            tuple.object().to_string(),
            action,
        ])
    }

    fn compile_grouping(tuple: &PolicyTuple) -> AuthzResult<Vec<String>> {
        let error = |reason| AuthzError::Grouping {
            member: tuple.subject().to_string(),
            role: tuple.object().to_string(),
            reason,
        };

        let assume = AuthorizationAction::from(RoleAction::Assume).to_string();
        if tuple.action() != assume {
            return Err(error("action must be role#assume"));
        }

        let member: ResourceUri = tuple
            .subject()
            .parse()
            .map_err(|_| error("member must be a resource uri"))?;
        if member.path() == "*" {
            return Err(error("member cannot be a wildcard"));
        }

        let role: ResourceUri = tuple
            .object()
            .parse()
            .map_err(|_| error("role must be a resource uri"))?;
        if role.kind() != ResourceKind::Role {
            return Err(error("role must be a gamedeals://role/<name> uri"));
        }
        if role.path().is_empty() || role.path().contains('*') {
            return Err(error("role must name a single role"));
        }

        Ok(vec![member.to_string(), role.to_string()])
    }

    pub async fn new(rulesets: &PolicyRulesets) -> AuthzResult<Self> {
        let compiled = Self::compile(rulesets)?;

        let model = DefaultModel::from_str(MODEL).await.map_err(engine_error)?;
        let mut inner = casbin::Enforcer::new(model, MemoryAdapter::default())
            .await
            .map_err(engine_error)?;
        inner.add_function(
            "subjectRule",
            OperatorFunction::Arg2(|attrs: Dynamic, rule: Dynamic| {
                Dynamic::from(subject_rule_match(&attrs.to_string(), &rule.to_string()))
            }),
        );

        for rule in compiled.permissions.iter() {
            inner.add_policy(rule.clone()).await.map_err(engine_error)?;
        }
        for grouping in compiled.groupings.iter() {
            inner
                .add_grouping_policy(grouping.clone())
                .await
                .map_err(engine_error)?;
        }
        inner.build_role_links().map_err(engine_error)?;

        let mut roles = HashMap::new();
        for grouping in compiled.groupings.iter() {
            let member = &grouping[0];
            if !roles.contains_key(member) {
                let held = inner.get_implicit_roles_for_user(member, None);
                roles.insert(member.clone(), held);
            }
        }

        Ok(Self {
            inner,
            roles,
            rules: compiled.permissions.len(),
            groupings: compiled.groupings.len(),
        })
    }

    pub fn rules_len(&self) -> usize {
        self.rules
    }

    pub fn groupings_len(&self) -> usize {
        self.groupings
    }

    /// All roles `subject` holds, following role-of-role memberships.
    pub fn roles_of(&self, subject: &str) -> &[String] {
        self.roles.get(subject).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn enforce(&self, subject: &str, object: &str, action: &str) -> AuthzResult<bool> {
        let attrs = SubjectAttributes::encode(subject, self.roles_of(subject));
        let allowed = self
            .inner
            .enforce((subject, object, action, attrs.as_str()))
            .map_err(engine_error)?;
        if allowed {
            debug!("Allow {subject} {action} on {object}");
        }
        Ok(allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple(s: &str, o: &str, a: &str) -> PolicyTuple {
        PolicyTuple::new(s, o, a).unwrap()
    }

    async fn build(p: Vec<PolicyTuple>, g: Vec<PolicyTuple>) -> Enforcer {
        let mut rulesets = PolicyRulesets::new();
        rulesets.insert(PolicyType::Permission, p);
        rulesets.insert(PolicyType::Grouping, g);
        Enforcer::new(&rulesets).await.unwrap()
    }

    fn allowed(enforcer: &Enforcer, s: &str, o: &str, a: &str) -> bool {
        enforcer.enforce(s, o, a).unwrap()
    }

    #[tokio::test]
    async fn test_empty_denies() {
        let enforcer = Enforcer::new(&PolicyRulesets::new()).await.unwrap();
        assert_eq!(enforcer.rules_len(), 0);
        assert!(!allowed(&enforcer, "gamedeals://user/1", "gamedeals://deal/", "deal#create"));
        assert!(!allowed(
            &enforcer,
            "gamedeals://untrusted-user/",
            "gamedeals://user/",
            "user#create"
        ));
    }

    #[tokio::test]
    async fn test_exact() {
        let enforcer = build(
            vec![tuple(
                "gamedeals://untrusted-user/",
                "gamedeals://user/",
                "user#create",
            )],
            vec![],
        )
        .await;
        let untrusted = "gamedeals://untrusted-user/";
        assert!(allowed(&enforcer, untrusted, "gamedeals://user/", "user#create"));
        assert!(!allowed(&enforcer, untrusted, "gamedeals://user/", "user#delete"));
        assert!(!allowed(&enforcer, untrusted, "gamedeals://user/", "user#create_more"));
        assert!(!allowed(&enforcer, "gamedeals://user/1", "gamedeals://user/", "user#create"));
        assert!(!allowed(&enforcer, untrusted, "gamedeals://user/1", "user#create"));
    }

    #[tokio::test]
    async fn test_wildcard_object() {
        let enforcer = build(
            vec![tuple("gamedeals://user/*", "gamedeals://deal/*", "deal#retrieve")],
            vec![],
        )
        .await;
        assert!(allowed(&enforcer, "gamedeals://user/4", "gamedeals://deal/", "deal#retrieve"));
        assert!(allowed(&enforcer, "gamedeals://user/4", "gamedeals://deal/9", "deal#retrieve"));
        assert!(!allowed(
            &enforcer,
            "gamedeals://untrusted-user/",
            "gamedeals://deal/9",
            "deal#retrieve"
        ));
        assert!(!allowed(&enforcer, "gamedeals://user/4", "gamedeals://game/9", "deal#retrieve"));
    }

    #[tokio::test]
    async fn test_role_indirection() {
        let enforcer = build(
            vec![tuple("gamedeals://role/admin", "gamedeals://deal/*", "deal#create")],
            vec![tuple("gamedeals://user/1", "gamedeals://role/admin", "role#assume")],
        )
        .await;
        assert!(allowed(&enforcer, "gamedeals://user/1", "gamedeals://deal/", "deal#create"));
        assert!(!allowed(&enforcer, "gamedeals://user/2", "gamedeals://deal/", "deal#create"));
    }

    #[tokio::test]
    async fn test_transitive_roles() {
        let enforcer = build(
            vec![tuple("gamedeals://role/editor", "gamedeals://game/*", "^game#.*")],
            vec![
                tuple("gamedeals://user/1", "gamedeals://role/admin", "role#assume"),
                tuple("gamedeals://role/admin", "gamedeals://role/editor", "role#assume"),
                tuple("gamedeals://user/1", "gamedeals://role/member", "role#assume"),
            ],
        )
        .await;
        let roles = enforcer.roles_of("gamedeals://user/1");
        assert_eq!(roles.len(), 3);
        assert!(roles.iter().any(|r| r == "gamedeals://role/editor"));
        assert!(roles.iter().any(|r| r == "gamedeals://role/member"));
        assert!(enforcer.roles_of("gamedeals://user/2").is_empty());

        assert!(allowed(&enforcer, "gamedeals://user/1", "gamedeals://game/3", "game#delete"));
        assert!(!allowed(&enforcer, "gamedeals://user/2", "gamedeals://game/3", "game#delete"));
    }

    #[tokio::test]
    async fn test_abac_rule() {
        let enforcer = build(
            vec![
                tuple("authenticated && !role:banned", "gamedeals://deal/", "deal#create"),
                tuple("any", "gamedeals://api-metadata/", "api-metadata#retrieve"),
            ],
            vec![tuple("gamedeals://user/6", "gamedeals://role/banned", "role#assume")],
        )
        .await;
        assert!(allowed(&enforcer, "gamedeals://user/5", "gamedeals://deal/", "deal#create"));
        assert!(!allowed(&enforcer, "gamedeals://user/6", "gamedeals://deal/", "deal#create"));
        assert!(!allowed(
            &enforcer,
            "gamedeals://untrusted-user/",
            "gamedeals://deal/",
            "deal#create"
        ));
        assert!(allowed(
            &enforcer,
            "gamedeals://untrusted-user/",
            "gamedeals://api-metadata/",
            "api-metadata#retrieve"
        ));
    }

    #[tokio::test]
    async fn test_deterministic() {
        let enforcer = build(
            vec![tuple("role:admin", "*", "^.*$")],
            vec![tuple("gamedeals://user/1", "gamedeals://role/admin", "role#assume")],
        )
        .await;
        for _ in 0..3 {
            assert!(allowed(&enforcer, "gamedeals://user/1", "gamedeals://user/99", "user#delete"));
            assert!(!allowed(&enforcer, "gamedeals://user/2", "gamedeals://user/99", "user#delete"));
        }
    }

    #[test]
    fn test_compile_errors() {
        let bad_p = [
            tuple("authenticated &&", "gamedeals://deal/", "deal#create"),
            tuple("any", "gamedeals://deal/", "^deal#(create"),
            tuple("any", "gamedeals://de*", "deal#create"),
            tuple("gamedeals://user/*/x", "gamedeals://deal/", "deal#create"),
        ];
        for t in bad_p {
            let mut rulesets = PolicyRulesets::new();
            rulesets.insert(PolicyType::Permission, vec![t.clone()]);
            assert!(Enforcer::compile(&rulesets).is_err(), "{t}");
        }

        let bad_g = [
            tuple("gamedeals://user/1", "gamedeals://role/admin", "deal#create"),
            tuple("gamedeals://user/1", "gamedeals://role/*", "role#assume"),
            tuple("gamedeals://user/1", "gamedeals://role/", "role#assume"),
            tuple("gamedeals://user/*", "gamedeals://role/admin", "role#assume"),
            tuple("role:admin", "gamedeals://role/admin", "role#assume"),
            // Only roles can be assumed.
            tuple("gamedeals://user/2", "gamedeals://user/1", "role#assume"),
        ];
        for t in bad_g {
            let mut rulesets = PolicyRulesets::new();
            rulesets.insert(PolicyType::Grouping, vec![t.clone()]);
            assert!(Enforcer::compile(&rulesets).is_err(), "{t}");
        }
    }
}
