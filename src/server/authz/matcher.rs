//! Pattern grammar used by stored policy tuples.
//!
//! * URI patterns: `*` (anything), `prefix/*` (the collection `prefix/` and
//!   every path below it) or an exact string. Matched with casbin `keyMatch`.
//! * Action patterns: a string starting with `^` is a regular expression,
//!   anything else must be equal. Both are handed to casbin `regexMatch` as
//!   an anchored expression.
//! * Rule expressions select subjects by attribute:
//!
//! ```text
//! rule    := or
//! or      := and ( "||" and )*
//! and     := unary ( "&&" unary )*
//! unary   := "!" unary | "(" rule ")" | atom
//! atom    := "any" | "authenticated" | "untrusted"
//!          | "role:" NAME | "subject:" URI-PATTERN
//! ```
//!
//! Rules are evaluated by the `subjectRule` function of the casbin model,
//! which receives the subject attributes encoded by
//! [`SubjectAttributes::encode`].

use casbin::function_map::key_match;
use regex::Regex;

use super::errors::{AuthzError, AuthzResult};
use super::uri::{ResourceKind, ResourceUri, SCHEME};

/// `*` may only appear alone or as the trailing `/*` of a collection.
pub fn check_uri_pattern(pattern: &str) -> AuthzResult<()> {
    let Some(star) = pattern.find('*') else {
        return Ok(());
    };
    if pattern == "*" || (star + 1 == pattern.len() && pattern[..star].ends_with('/')) {
        return Ok(());
    }
    Err(AuthzError::UriPattern(pattern.to_string()))
}

/// True if a permission subject names URIs rather than a rule expression.
pub fn is_uri_subject(subject: &str) -> bool {
    subject == "*" || subject.starts_with(SCHEME)
}

/// The anchored regular expression casbin matches the requested action with.
pub fn action_regex(pattern: &str) -> AuthzResult<String> {
    if !pattern.starts_with('^') {
        return Ok(format!("^{}$", regex::escape(pattern)));
    }
    Regex::new(pattern).map_err(|source| AuthzError::ActionPattern {
        pattern: pattern.to_string(),
        source,
    })?;
    Ok(pattern.to_string())
}

/// What a rule expression can observe about the subject.
#[derive(Debug)]
pub struct SubjectAttributes<'a> {
    pub uri: &'a str,
    pub roles: Vec<&'a str>,
}

impl<'a> SubjectAttributes<'a> {
    /// One line per value, subject first. URIs never contain newlines.
    pub fn encode(uri: &str, roles: &[String]) -> String {
        let mut attrs = String::from(uri);
        for role in roles {
            attrs.push('\n');
            attrs.push_str(role);
        }
        attrs
    }

    pub fn decode(attrs: &'a str) -> Self {
        let mut lines = attrs.split('\n');
        let uri = lines.next().unwrap_or_default();
        Self {
            uri,
            roles: lines.collect(),
        }
    }

    fn is_kind(&self, kind: ResourceKind) -> bool {
        let collection = ResourceUri::collection(kind).to_string();
        self.uri.starts_with(&collection)
    }
}

/// Body of the `subjectRule(r.attrs, p.sub)` model function. URI subjects
/// are left to `g()` and `keyMatch`; rules that fail to parse never match.
pub fn subject_rule_match(attrs: &str, rule: &str) -> bool {
    if is_uri_subject(rule) {
        return false;
    }
    match RuleExpr::parse(rule) {
        Ok(expr) => expr.eval(&SubjectAttributes::decode(attrs)),
        Err(_) => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleExpr {
    Any,
    Authenticated,
    Untrusted,
    /// Holds the full role URI.
    Role(String),
    /// Holds a URI pattern.
    Subject(String),
    Not(Box<RuleExpr>),
    And(Vec<RuleExpr>),
    Or(Vec<RuleExpr>),
}

impl RuleExpr {
    pub fn parse(rule: &str) -> AuthzResult<Self> {
        let tokens = tokenize(rule)?;
        let mut parser = Parser {
            rule,
            tokens,
            pos: 0,
        };
        let expr = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(parser.error(format!("unexpected token {token:?}")));
        }
        Ok(expr)
    }

    pub fn eval(&self, subject: &SubjectAttributes) -> bool {
        match self {
            RuleExpr::Any => true,
            RuleExpr::Authenticated => subject.is_kind(ResourceKind::User),
            RuleExpr::Untrusted => subject.is_kind(ResourceKind::UntrustedUser),
            RuleExpr::Role(role) => subject.roles.contains(&role.as_str()),
            RuleExpr::Subject(pattern) => key_match(subject.uri, pattern),
            RuleExpr::Not(expr) => !expr.eval(subject),
            RuleExpr::And(exprs) => exprs.iter().all(|e| e.eval(subject)),
            RuleExpr::Or(exprs) => exprs.iter().any(|e| e.eval(subject)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    Not,
    And,
    Or,
    Word(String),
}

fn tokenize(rule: &str) -> AuthzResult<Vec<Token>> {
    let error = |reason: &str| AuthzError::RuleExpression {
        rule: rule.to_string(),
        reason: reason.to_string(),
    };

    let mut tokens = Vec::new();
    let mut chars = rule.chars().peekable();
    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '!' => {
                chars.next();
                tokens.push(Token::Not);
            }
            '&' | '|' => {
                chars.next();
                if chars.next() != Some(ch) {
                    return Err(error(&format!("expect '{ch}{ch}'")));
                }
                tokens.push(if ch == '&' { Token::And } else { Token::Or });
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || "()!&|".contains(c) {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }

    if tokens.is_empty() {
        return Err(error("empty expression"));
    }
    Ok(tokens)
}

struct Parser<'a> {
    rule: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn error(&self, reason: String) -> AuthzError {
        AuthzError::RuleExpression {
            rule: self.rule.to_string(),
            reason,
        }
    }

    fn parse_or(&mut self) -> AuthzResult<RuleExpr> {
        let mut exprs = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            exprs.push(self.parse_and()?);
        }
        Ok(if exprs.len() == 1 {
            exprs.remove(0)
        } else {
            RuleExpr::Or(exprs)
        })
    }

    fn parse_and(&mut self) -> AuthzResult<RuleExpr> {
        let mut exprs = vec![self.parse_unary()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            exprs.push(self.parse_unary()?);
        }
        Ok(if exprs.len() == 1 {
            exprs.remove(0)
        } else {
            RuleExpr::And(exprs)
        })
    }

    fn parse_unary(&mut self) -> AuthzResult<RuleExpr> {
        match self.next() {
            Some(Token::Not) => Ok(RuleExpr::Not(Box::new(self.parse_unary()?))),
            Some(Token::LParen) => {
                let expr = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err(self.error(String::from("missing ')'"))),
                }
            }
            Some(Token::Word(word)) => self.parse_atom(&word),
            Some(token) => Err(self.error(format!("unexpected token {token:?}"))),
            None => Err(self.error(String::from("unexpected end of expression"))),
        }
    }

    fn parse_atom(&self, word: &str) -> AuthzResult<RuleExpr> {
        match word {
            "any" => return Ok(RuleExpr::Any),
            "authenticated" => return Ok(RuleExpr::Authenticated),
            "untrusted" => return Ok(RuleExpr::Untrusted),
            _ => {}
        }

        if let Some(name) = word.strip_prefix("role:") {
            if name.is_empty() {
                return Err(self.error(String::from("empty role name")));
            }
            return Ok(RuleExpr::Role(ResourceUri::role(name).to_string()));
        }
        if let Some(pattern) = word.strip_prefix("subject:") {
            if pattern.is_empty() {
                return Err(self.error(String::from("empty subject pattern")));
            }
            check_uri_pattern(pattern)?;
            return Ok(RuleExpr::Subject(pattern.to_string()));
        }

        Err(self.error(format!("unknown atom '{word}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_pattern() {
        let cases = [
            ("gamedeals://deal/*", "gamedeals://deal/12", true),
            ("gamedeals://deal/*", "gamedeals://deal/", true),
            ("gamedeals://deal/*", "gamedeals://deal/12/comments", true),
            ("gamedeals://deal/*", "gamedeals://dealer/12", false),
            ("gamedeals://deal/*", "gamedeals://game/12", false),
            ("gamedeals://deal/12", "gamedeals://deal/12", true),
            ("gamedeals://deal/12", "gamedeals://deal/123", false),
            ("gamedeals://deal/", "gamedeals://deal/12", false),
            ("*", "gamedeals://untrusted-user/", true),
        ];
        for (pattern, value, expect) in cases {
            check_uri_pattern(pattern).unwrap();
            assert_eq!(key_match(value, pattern), expect, "{pattern} ~ {value}");
        }

        for bad in ["gamedeals://de*", "gamedeals://*/1", "**", "gamedeals://deal/*/x"] {
            assert!(check_uri_pattern(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_action_regex() {
        let matches = |pattern: &str, action: &str| {
            Regex::new(&action_regex(pattern).unwrap())
                .unwrap()
                .is_match(action)
        };
        assert!(matches("deal#create", "deal#create"));
        assert!(!matches("deal#create", "deal#delete"));
        assert!(!matches("user#retrieve", "user#retrieve_secure"));

        assert!(matches("^deal#(create|update)$", "deal#create"));
        assert!(matches("^deal#(create|update)$", "deal#update"));
        assert!(!matches("^deal#(create|update)$", "deal#delete"));

        assert!(matches("^user#retrieve_.*", "user#retrieve_secure"));
        assert!(!matches("^user#retrieve_.*", "game#retrieve"));

        assert!(action_regex("^deal#(create").is_err());
    }

    #[test]
    fn test_rule_parse() {
        assert_eq!(RuleExpr::parse("any").unwrap(), RuleExpr::Any);
        assert_eq!(
            RuleExpr::parse("authenticated && !role:banned").unwrap(),
            RuleExpr::And(vec![
                RuleExpr::Authenticated,
                RuleExpr::Not(Box::new(RuleExpr::Role(String::from(
                    "gamedeals://role/banned"
                )))),
            ])
        );
        // `&&` binds tighter than `||`.
        assert_eq!(
            RuleExpr::parse("untrusted || authenticated && role:admin").unwrap(),
            RuleExpr::Or(vec![
                RuleExpr::Untrusted,
                RuleExpr::And(vec![
                    RuleExpr::Authenticated,
                    RuleExpr::Role(String::from("gamedeals://role/admin")),
                ]),
            ])
        );
        assert_eq!(
            RuleExpr::parse("(subject:gamedeals://user/*)").unwrap(),
            RuleExpr::Subject(String::from("gamedeals://user/*"))
        );
    }

    #[test]
    fn test_rule_parse_error() {
        let cases = [
            "",
            "   ",
            "anything",
            "any &",
            "any & authenticated",
            "any ||",
            "(any",
            "any)",
            "!",
            "role:",
            "subject:",
            "subject:gamedeals://us*",
            "any authenticated",
        ];
        for case in cases {
            assert!(RuleExpr::parse(case).is_err(), "{case:?}");
        }
    }

    #[test]
    fn test_rule_eval() {
        let admin_roles = [String::from("gamedeals://role/admin")];
        let user = SubjectAttributes::encode("gamedeals://user/7", &[]);
        let admin = SubjectAttributes::encode("gamedeals://user/1", &admin_roles);
        let untrusted = SubjectAttributes::encode("gamedeals://untrusted-user/", &[]);

        let cases = [
            ("any", [true, true, true]),
            ("authenticated", [true, true, false]),
            ("untrusted", [false, false, true]),
            ("role:admin", [false, true, false]),
            ("authenticated && !role:admin", [true, false, false]),
            ("untrusted || role:admin", [false, true, true]),
            ("subject:gamedeals://user/7", [true, false, false]),
            ("!(subject:gamedeals://user/* || untrusted)", [false, false, false]),
        ];
        for (rule, expect) in cases {
            assert_eq!(
                [
                    subject_rule_match(&user, rule),
                    subject_rule_match(&admin, rule),
                    subject_rule_match(&untrusted, rule),
                ],
                expect,
                "{rule}"
            );
        }

        // URI subjects are not rules.
        assert!(!subject_rule_match(&admin, "gamedeals://user/1"));
        assert!(!subject_rule_match(&admin, "*"));
    }
}
