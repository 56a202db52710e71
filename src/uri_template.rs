//! URI Template (RFC 6570) expansion for link `href`s.
//!
//! Supports all level-3 operators plus the `*` explode and `:n` prefix
//! modifiers. Variables missing from `?`/`&` expressions are dropped; missing
//! variables anywhere else are an error, since the link cannot be dispatched
//! without them.

use serde_json::Value;

use crate::error::NavigationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Simple,
    Reserved,
    Fragment,
    Label,
    Path,
    PathParam,
    Query,
    QueryContinuation,
}

impl Operator {
    fn parse(c: char) -> Option<Self> {
        match c {
            '+' => Some(Operator::Reserved),
            '#' => Some(Operator::Fragment),
            '.' => Some(Operator::Label),
            '/' => Some(Operator::Path),
            ';' => Some(Operator::PathParam),
            '?' => Some(Operator::Query),
            '&' => Some(Operator::QueryContinuation),
            _ => None,
        }
    }

    fn first(self) -> &'static str {
        match self {
            Operator::Simple | Operator::Reserved => "",
            Operator::Fragment => "#",
            Operator::Label => ".",
            Operator::Path => "/",
            Operator::PathParam => ";",
            Operator::Query => "?",
            Operator::QueryContinuation => "&",
        }
    }

    fn separator(self) -> &'static str {
        match self {
            Operator::Simple | Operator::Reserved | Operator::Fragment => ",",
            Operator::Label => ".",
            Operator::Path => "/",
            Operator::PathParam => ";",
            Operator::Query | Operator::QueryContinuation => "&",
        }
    }

    fn named(self) -> bool {
        matches!(
            self,
            Operator::PathParam | Operator::Query | Operator::QueryContinuation
        )
    }

    fn if_empty(self) -> &'static str {
        match self {
            Operator::Query | Operator::QueryContinuation => "=",
            _ => "",
        }
    }

    fn allow_reserved(self) -> bool {
        matches!(self, Operator::Reserved | Operator::Fragment)
    }

    fn optional(self) -> bool {
        matches!(self, Operator::Query | Operator::QueryContinuation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct VarSpec {
    name: String,
    explode: bool,
    prefix: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Expression {
        operator: Operator,
        variables: Vec<VarSpec>,
    },
}

/// A parsed URI template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    template: String,
    parts: Vec<Part>,
}

impl UriTemplate {
    /// Parse a template.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::InvalidTemplate` for unbalanced braces, empty
    /// expressions or bad prefix lengths.
    pub fn parse(template: &str) -> Result<Self, NavigationError> {
        let invalid = |message: &str| NavigationError::InvalidTemplate {
            template: template.to_string(),
            message: message.to_string(),
        };

        let mut parts = Vec::new();
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            if open > 0 {
                parts.push(Part::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| invalid("unclosed '{'"))?;
            parts.push(parse_expression(&after[..close]).map_err(|m| invalid(m))?);
            rest = &after[close + 1..];
        }
        if rest.contains('}') {
            return Err(invalid("unmatched '}'"));
        }
        if !rest.is_empty() {
            parts.push(Part::Literal(rest.to_string()));
        }

        Ok(Self {
            template: template.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Variable names in order of appearance, without duplicates.
    pub fn variables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for part in &self.parts {
            if let Part::Expression { variables, .. } = part {
                for var in variables {
                    if !names.contains(&var.name.as_str()) {
                        names.push(&var.name);
                    }
                }
            }
        }
        names
    }

    /// Expand the template, looking variables up through `lookup`.
    ///
    /// A `None` or `null` result counts as undefined.
    pub fn expand<F>(&self, lookup: F) -> Result<String, NavigationError>
    where
        F: Fn(&str) -> Option<Value>,
    {
        let mut out = String::with_capacity(self.template.len());
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Expression {
                    operator,
                    variables,
                } => {
                    let mut first = true;
                    for var in variables {
                        let value = match lookup(&var.name) {
                            Some(Value::Null) | None => {
                                if operator.optional() {
                                    continue;
                                }
                                return Err(NavigationError::UnresolvedLinkParameter {
                                    href: self.template.clone(),
                                    parameter: var.name.clone(),
                                });
                            }
                            Some(value) => value,
                        };
                        let Some(expanded) = expand_var(*operator, var, &value) else {
                            continue;
                        };
                        out.push_str(if first {
                            operator.first()
                        } else {
                            operator.separator()
                        });
                        out.push_str(&expanded);
                        first = false;
                    }
                }
            }
        }
        Ok(out)
    }
}

fn parse_expression(body: &str) -> Result<Part, &'static str> {
    let mut chars = body.chars();
    let (operator, list) = match chars.next().and_then(Operator::parse) {
        Some(op) => (op, chars.as_str()),
        None => (Operator::Simple, body),
    };
    if list.is_empty() {
        return Err("empty expression");
    }

    let variables = list
        .split(',')
        .map(|spec| {
            let spec = spec.trim();
            if let Some(name) = spec.strip_suffix('*') {
                return Ok(VarSpec {
                    name: name.to_string(),
                    explode: true,
                    prefix: None,
                });
            }
            match spec.split_once(':') {
                Some((name, len)) => {
                    let prefix = len.parse().map_err(|_| "invalid prefix length")?;
                    Ok(VarSpec {
                        name: name.to_string(),
                        explode: false,
                        prefix: Some(prefix),
                    })
                }
                None => Ok(VarSpec {
                    name: spec.to_string(),
                    explode: false,
                    prefix: None,
                }),
            }
        })
        .collect::<Result<Vec<_>, &'static str>>()?;

    if variables.iter().any(|v| v.name.is_empty()) {
        return Err("empty variable name");
    }
    Ok(Part::Expression {
        operator,
        variables,
    })
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn named_pair(op: Operator, name: &str, text: &str) -> String {
    if text.is_empty() {
        format!("{}{}", name, op.if_empty())
    } else {
        format!("{}={}", name, text)
    }
}

fn expand_var(op: Operator, var: &VarSpec, value: &Value) -> Option<String> {
    let encode = |s: &str| percent_encode(s, op.allow_reserved());

    if let Some(text) = scalar_text(value) {
        let text = match var.prefix {
            Some(n) => text.chars().take(n).collect(),
            None => text,
        };
        let encoded = encode(&text);
        return Some(if op.named() {
            named_pair(op, &var.name, &encoded)
        } else {
            encoded
        });
    }

    let pairs: Vec<(Option<String>, String)> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(scalar_text)
            .map(|t| (None, encode(&t)))
            .collect(),
        Value::Object(map) => map
            .iter()
            .filter_map(|(k, v)| scalar_text(v).map(|t| (Some(encode(k)), encode(&t))))
            .collect(),
        _ => return None,
    };
    if pairs.is_empty() {
        return None;
    }

    if var.explode {
        let items: Vec<String> = pairs
            .into_iter()
            .map(|(key, text)| match key {
                Some(key) => format!("{}={}", key, text),
                None if op.named() => named_pair(op, &var.name, &text),
                None => text,
            })
            .collect();
        Some(items.join(op.separator()))
    } else {
        let joined = pairs
            .into_iter()
            .flat_map(|(key, text)| key.into_iter().chain(std::iter::once(text)))
            .collect::<Vec<_>>()
            .join(",");
        Some(if op.named() {
            named_pair(op, &var.name, &joined)
        } else {
            joined
        })
    }
}

fn percent_encode(s: &str, allow_reserved: bool) -> String {
    const RESERVED: &str = ":/?#[]@!$&'()*+,;=";
    if !allow_reserved {
        return urlencoding::encode(s).into_owned();
    }
    let mut out = String::with_capacity(s.len());
    for run in s.split_inclusive(|c: char| RESERVED.contains(c)) {
        match run.char_indices().last() {
            Some((i, c)) if RESERVED.contains(c) => {
                out.push_str(&urlencoding::encode(&run[..i]));
                out.push(c);
            }
            _ => out.push_str(&urlencoding::encode(run)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(name: &str) -> Option<Value> {
        match name {
            "id" => Some(json!(42)),
            "name" => Some(json!("Ada Lovelace")),
            "path" => Some(json!("a/b")),
            "page" => Some(json!(2)),
            "tags" => Some(json!(["x", "y"])),
            "empty" => Some(json!("")),
            _ => None,
        }
    }

    fn expand(template: &str) -> String {
        UriTemplate::parse(template).unwrap().expand(vars).unwrap()
    }

    #[test]
    fn simple_expansion_encodes() {
        assert_eq!(expand("/users/{id}"), "/users/42");
        assert_eq!(expand("/users/{name}"), "/users/Ada%20Lovelace");
        assert_eq!(expand("/files/{path}"), "/files/a%2Fb");
    }

    #[test]
    fn reserved_and_fragment_keep_slashes() {
        assert_eq!(expand("/files/{+path}"), "/files/a/b");
        assert_eq!(expand("/doc{#path}"), "/doc#a/b");
    }

    #[test]
    fn reserved_expansion_still_encodes_the_rest() {
        assert_eq!(percent_encode("a b/c?d=é", true), "a%20b/c?d=%C3%A9");
        assert_eq!(percent_encode("a b/c?d=é", false), "a%20b%2Fc%3Fd%3D%C3%A9");
        assert_eq!(percent_encode("~keep-this_.", false), "~keep-this_.");
    }

    #[test]
    fn query_expansion_skips_missing() {
        assert_eq!(expand("/users{?page,limit}"), "/users?page=2");
        assert_eq!(expand("/users{?limit}"), "/users");
        assert_eq!(expand("/users?x=1{&page}"), "/users?x=1&page=2");
        assert_eq!(expand("/users{?empty}"), "/users?empty=");
    }

    #[test]
    fn path_label_and_params() {
        assert_eq!(expand("/root{/id,page}"), "/root/42/2");
        assert_eq!(expand("host{.id}"), "host.42");
        assert_eq!(expand("/m{;id}"), "/m;id=42");
    }

    #[test]
    fn lists_and_explode() {
        assert_eq!(expand("/t/{tags}"), "/t/x,y");
        assert_eq!(expand("/t{?tags*}"), "/t?tags=x&tags=y");
        assert_eq!(expand("/t{/tags*}"), "/t/x/y");
    }

    #[test]
    fn prefix_modifier() {
        assert_eq!(expand("/n/{name:3}"), "/n/Ada");
    }

    #[test]
    fn missing_required_variable_errors() {
        let err = UriTemplate::parse("/users/{userId}")
            .unwrap()
            .expand(vars)
            .unwrap_err();
        assert!(matches!(
            err,
            NavigationError::UnresolvedLinkParameter { parameter, .. } if parameter == "userId"
        ));
    }

    #[test]
    fn variables_listed_in_order() {
        let t = UriTemplate::parse("/a/{id}/{name}{?page,id}").unwrap();
        assert_eq!(t.variables(), vec!["id", "name", "page"]);
    }

    #[test]
    fn malformed_templates() {
        assert!(UriTemplate::parse("/a/{id").is_err());
        assert!(UriTemplate::parse("/a/id}").is_err());
        assert!(UriTemplate::parse("/a/{}").is_err());
        assert!(UriTemplate::parse("/a/{x:abc}").is_err());
    }
}
