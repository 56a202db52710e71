//! Schema navigation: property roots, identity detection and hyperlinks.
//!
//! Schemas describing API payloads usually wrap the entity in an envelope
//! (`{ "data": { "items": [ <entity> ] } }`). A [`SchemaNavigator`] is built
//! with a `property_prefix`, a data pointer to where the entity's fields live,
//! and resolves the sub-schema(s) describing those fields.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use hyperschema_nav::{NavigatorOptions, SchemaNavigator};
//! use serde_json::json;
//!
//! let schema = json!({
//!     "id": "users.json",
//!     "entity": "User",
//!     "type": "object",
//!     "properties": {
//!         "items": {
//!             "type": "array",
//!             "items": {
//!                 "type": "object",
//!                 "properties": {
//!                     "userId": { "type": "string" },
//!                     "email": { "type": "string" }
//!                 }
//!             }
//!         }
//!     },
//!     "links": [{ "rel": "self", "href": "/users/{userId}" }]
//! });
//!
//! let options = NavigatorOptions::new().property_prefix("/items/*");
//! let nav = SchemaNavigator::new(Arc::new(schema), &options).unwrap();
//!
//! assert_eq!(nav.identity_property(), "userId");
//! assert_eq!(nav.get_first_link(&["read", "self"]).unwrap().href, "/users/{userId}");
//! ```

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::{Map, Value};

use crate::cache::schema_id;
use crate::error::{NavigationError, PointerError};
use crate::pointer::{
    escape_segment, format_pointer, parse_index, parse_pointer, pointer_get_ref, try_pointer_get,
    DefaultGenerator, MissingPath, DASH, STAR,
};
use crate::types::{ColumnDescriptor, LinkSelector, SchemaHyperlinkDescriptor};
use crate::uri_template::UriTemplate;

/// Nested `$ref`/`allOf` resolution stops after this many hops.
const MAX_REF_DEPTH: usize = 32;

/// Field names that always identify an entity.
const IDENTITY_NAMES: &[&str] = &["id", "uid", "guid"];

/// Field names used as a last resort for identity.
const NAME_LIKE: &[&str] = &["name", "identity", "internalname"];

/// Score for a field that cannot identify an entity.
pub const NO_IDENTITY: u8 = 4;

/// Resolves non-local `$ref` values (`other.json`, `other.json#/definitions/x`).
pub trait RefResolver {
    fn resolve_ref(&self, reference: &str) -> Option<Value>;
}

/// Options for building a navigator.
#[derive(Debug, Clone, Default)]
pub struct NavigatorOptions {
    /// Data pointer to where entity properties begin. Empty means the root.
    pub property_prefix: String,
}

impl NavigatorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn property_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.property_prefix = prefix.into();
        self
    }
}

/// One sub-schema that defines entity properties.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDefinitionRoot {
    /// Schema pointer the definition was reached through.
    pub pointer: String,
    /// The definition with `$ref` and `allOf` resolved.
    pub schema: Value,
}

/// A read-only, pointer-addressable view over one schema.
#[derive(Debug)]
pub struct SchemaNavigator {
    schema: Arc<Value>,
    property_prefix: String,
    roots: Vec<PropertyDefinitionRoot>,
    root: Value,
    property_root: Map<String, Value>,
    required: Vec<String>,
    entity: Option<String>,
    identity_properties: Vec<(String, u8)>,
    links: Vec<SchemaHyperlinkDescriptor>,
    embedded: OnceLock<HashMap<String, Value>>,
}

impl SchemaNavigator {
    /// Build a navigator that resolves only local `$ref`s.
    ///
    /// # Errors
    ///
    /// Fails if no property root matches the prefix, a `$ref` cannot be
    /// resolved, or no property can serve as identity.
    pub fn new(schema: Arc<Value>, options: &NavigatorOptions) -> Result<Self, NavigationError> {
        Self::build(schema, options, None)
    }

    /// Build a navigator that resolves external `$ref`s through `resolver`.
    pub fn with_resolver(
        schema: Arc<Value>,
        options: &NavigatorOptions,
        resolver: &dyn RefResolver,
    ) -> Result<Self, NavigationError> {
        Self::build(schema, options, Some(resolver))
    }

    fn build(
        schema: Arc<Value>,
        options: &NavigatorOptions,
        resolver: Option<&dyn RefResolver>,
    ) -> Result<Self, NavigationError> {
        let property_prefix = options.property_prefix.trim_end_matches('/').to_string();
        let refs = Refs {
            document: &schema,
            resolver,
        };

        let roots = find_property_roots(&refs, &property_prefix)?;
        let mut root = Value::Object(Map::new());
        for definition in &roots {
            merge_schemas(&mut root, &definition.schema);
        }

        let mut property_root = Map::new();
        if let Some(props) = root.get("properties").and_then(Value::as_object) {
            for (name, prop) in props {
                property_root.insert(name.clone(), refs.normalize(prop, 0)?);
            }
        }

        let mut required: Vec<String> = Vec::new();
        for name in root
            .get("required")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
        {
            if !required.iter().any(|r| r == name) {
                required.push(name.to_string());
            }
        }

        let entity = entity_name(&schema, &root);
        let identity_properties = rank_identity(property_root.keys(), entity.as_deref());
        if identity_properties.is_empty() {
            return Err(NavigationError::NoIdentity {
                entity: entity.unwrap_or_default(),
            });
        }

        let links = parse_links(&schema);

        tracing::debug!(
            prefix = %property_prefix,
            roots = roots.len(),
            identity = %identity_properties[0].0,
            "built schema navigator"
        );

        Ok(Self {
            schema,
            property_prefix,
            roots,
            root,
            property_root,
            required,
            entity,
            identity_properties,
            links,
            embedded: OnceLock::new(),
        })
    }

    /// The wrapped schema document.
    pub fn schema(&self) -> &Arc<Value> {
        &self.schema
    }

    /// The schema's `id` (or `$id`).
    pub fn id(&self) -> Option<&str> {
        schema_id(&self.schema)
    }

    pub fn property_prefix(&self) -> &str {
        &self.property_prefix
    }

    /// Every sub-schema the prefix resolved to.
    pub fn property_definition_roots(&self) -> &[PropertyDefinitionRoot] {
        &self.roots
    }

    /// All property definition roots merged into one schema.
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Field name to (resolved) field schema.
    pub fn property_root(&self) -> &Map<String, Value> {
        &self.property_root
    }

    pub fn property_names(&self) -> Vec<&str> {
        self.property_root.keys().map(String::as_str).collect()
    }

    pub fn property_schema(&self, name: &str) -> Option<&Value> {
        self.property_root.get(name)
    }

    /// Required fields, merged across definition roots.
    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Data pointer to `name` within an instance document.
    pub fn property_pointer(&self, name: &str) -> String {
        format!("{}/{}", self.property_prefix, escape_segment(name))
    }

    /// Entity name from `entity`, `title`, or the schema id.
    pub fn entity(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    /// Score how likely `name` is to identify this entity (0 best, 4 never).
    ///
    /// This is a naming heuristic and will misjudge unusual schemas.
    pub fn is_identity_property(&self, name: &str) -> u8 {
        identity_score(name, self.entity.as_deref())
    }

    /// The best identity field. Ties go to the field listed first.
    pub fn identity_property(&self) -> &str {
        &self.identity_properties[0].0
    }

    /// Every plausible identity field, best first.
    pub fn identity_properties(&self) -> Vec<&str> {
        self.identity_properties
            .iter()
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn links(&self) -> &[SchemaHyperlinkDescriptor] {
        &self.links
    }

    pub fn get_link<'s>(&self, selector: impl Into<LinkSelector<'s>>) -> Option<&SchemaHyperlinkDescriptor> {
        match selector.into() {
            LinkSelector::Rel(rel) => self.links.iter().find(|l| l.rel == rel),
            LinkSelector::Index(i) => self.links.get(i),
        }
    }

    /// The first link whose relation appears in `rels`, trying `rels` in order.
    pub fn get_first_link(&self, rels: &[&str]) -> Option<&SchemaHyperlinkDescriptor> {
        rels.iter().find_map(|rel| self.get_link(*rel))
    }

    /// Map each href template variable to the data pointer that supplies it.
    pub fn get_link_uri_template_pointers(
        &self,
        link: &SchemaHyperlinkDescriptor,
    ) -> Result<Vec<(String, String)>, NavigationError> {
        let template = UriTemplate::parse(&link.href)?;
        Ok(template
            .variables()
            .into_iter()
            .map(|name| (name.to_string(), self.property_pointer(name)))
            .collect())
    }

    /// Expand `link.href` with values read from `data`.
    ///
    /// # Errors
    ///
    /// Fails if a path parameter has no value in `data`.
    pub fn resolve_link_href(
        &self,
        link: &SchemaHyperlinkDescriptor,
        data: &Value,
    ) -> Result<String, NavigationError> {
        let pointers: HashMap<String, String> =
            self.get_link_uri_template_pointers(link)?.into_iter().collect();
        UriTemplate::parse(&link.href)?.expand(|name| {
            pointers
                .get(name)
                .and_then(|pointer| try_pointer_get(data, pointer))
        })
    }

    /// Look up an embedded schema by `#` pointer, anchor, or `id`.
    ///
    /// Returns `None` when nothing matches; callers fall back to fetching.
    pub fn get_embedded_schema(&self, id: &str) -> Option<&Value> {
        if id == "#" {
            return Some(&self.schema);
        }
        if let Some(pointer) = id.strip_prefix('#').filter(|p| p.starts_with('/')) {
            return pointer_get_ref(&self.schema, pointer).ok();
        }
        if let Some((base, fragment)) = id.split_once('#') {
            if !base.is_empty() && Some(base) == self.id() {
                return self.get_embedded_schema(&format!("#{}", fragment));
            }
        }
        self.embedded
            .get_or_init(|| build_embedded_index(&self.schema))
            .get(id)
    }

    /// Columns for each entity property.
    ///
    /// Scalar-typed properties are sortable; everything is filterable.
    pub fn columns(&self) -> Vec<ColumnDescriptor> {
        self.property_root
            .iter()
            .map(|(name, prop)| {
                let mut column = ColumnDescriptor::new(name.clone(), format_pointer(&[name]))
                    .sortable(is_scalar_schema(prop));
                if let Some(title) = prop.get("title").and_then(Value::as_str) {
                    column = column.title(title);
                }
                column
            })
            .collect()
    }

    /// A default generator that fills missing fields from schema `default`s.
    pub fn defaults(&self) -> SchemaDefaults<'_> {
        SchemaDefaults { navigator: self }
    }
}

/// Supplies `default` values declared on entity properties.
#[derive(Debug, Clone, Copy)]
pub struct SchemaDefaults<'a> {
    navigator: &'a SchemaNavigator,
}

impl DefaultGenerator for SchemaDefaults<'_> {
    fn generate(&self, missing: &MissingPath<'_>, _root: &Value) -> Result<Value, PointerError> {
        let name = parse_pointer(&missing.partial)
            .ok()
            .and_then(|p| p.parts.last().cloned());
        name.and_then(|n| self.navigator.property_schema(&n))
            .and_then(|prop| prop.get("default"))
            .cloned()
            .ok_or_else(|| PointerError::NotFound {
                pointer: missing.pointer.to_string(),
                segment: missing.segment,
            })
    }
}

/// Score `name` as an identity candidate for `entity`.
///
/// | Score | Rule |
/// |---|---|
/// | 0 | `id`/`uid`/`guid`, or entity name + one of those (`userId` for `User`) |
/// | 1 | part of a compound entity name + suffix (`orderId` for `OrderLine`) |
/// | 2 | contains `id`, `uid` or `guid` |
/// | 3 | `name`, `identity` or `internalname` |
/// | 4 | none of the above |
///
/// Matching ignores case, `_` and `-`.
pub fn identity_score(name: &str, entity: Option<&str>) -> u8 {
    let field = normalize_name(name);

    if IDENTITY_NAMES.contains(&field.as_str()) {
        return 0;
    }

    if let Some(entity) = entity {
        let whole = normalize_name(entity);
        if IDENTITY_NAMES
            .iter()
            .any(|suffix| field == format!("{}{}", whole, suffix))
        {
            return 0;
        }

        let words = word_parts(entity);
        for len in (1..words.len()).rev() {
            for window in words.windows(len) {
                let stem = window.concat();
                if IDENTITY_NAMES
                    .iter()
                    .any(|suffix| field == format!("{}{}", stem, suffix))
                {
                    return 1;
                }
            }
        }
    }

    if IDENTITY_NAMES.iter().any(|id| field.contains(id)) {
        return 2;
    }

    if NAME_LIKE.contains(&field.as_str()) {
        return 3;
    }

    NO_IDENTITY
}

/// Shallow union-merge: nested objects are shallow-assigned, arrays concatenated,
/// anything else overwritten.
pub fn merge_schemas(target: &mut Value, source: &Value) {
    let (Value::Object(target), Value::Object(source)) = (target, source) else {
        return;
    };
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(Value::Object(t)), Value::Object(s)) => {
                for (k, v) in s {
                    t.insert(k.clone(), v.clone());
                }
            }
            (Some(Value::Array(t)), Value::Array(s)) => t.extend(s.iter().cloned()),
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

// --- Internal implementation ---

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Split `OrderLineItem` / `order_line_item` into lowercase words.
fn word_parts(entity: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for c in entity.chars() {
        if c == '_' || c == '-' || c == ' ' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn rank_identity<'a>(
    names: impl Iterator<Item = &'a String>,
    entity: Option<&str>,
) -> Vec<(String, u8)> {
    let mut ranked: Vec<(String, u8)> = names
        .map(|name| (name.clone(), identity_score(name, entity)))
        .filter(|(_, score)| *score < NO_IDENTITY)
        .collect();
    // stable: equal scores keep declaration order
    ranked.sort_by_key(|(_, score)| *score);
    ranked
}

fn entity_name(schema: &Value, root: &Value) -> Option<String> {
    let named = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);
    named(schema, "entity")
        .or_else(|| named(root, "entity"))
        .or_else(|| named(schema, "title"))
        .or_else(|| {
            let id = schema_id(schema)?;
            let path = id.split('#').next().unwrap_or(id);
            let last = path.rsplit('/').next().unwrap_or(path);
            let stem = last.split('.').next().unwrap_or(last);
            (!stem.is_empty()).then(|| stem.to_string())
        })
}

fn parse_links(schema: &Value) -> Vec<SchemaHyperlinkDescriptor> {
    schema
        .get("links")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|link| match serde_json::from_value(link.clone()) {
            Ok(link) => Some(link),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed schema link");
                None
            }
        })
        .collect()
}

fn is_scalar_schema(schema: &Value) -> bool {
    match schema.get("type") {
        Some(Value::String(t)) => matches!(t.as_str(), "string" | "number" | "integer" | "boolean"),
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).all(|t| {
            matches!(t, "string" | "number" | "integer" | "boolean" | "null")
        }),
        Some(_) => false,
        None => schema.get("properties").is_none() && schema.get("items").is_none(),
    }
}

fn build_embedded_index(schema: &Value) -> HashMap<String, Value> {
    fn walk(node: &Value, index: &mut HashMap<String, Value>) {
        match node {
            Value::Object(map) => {
                if let Some(id) = schema_id(node) {
                    index
                        .entry(id.to_string())
                        .or_insert_with(|| node.clone());
                }
                for child in map.values() {
                    walk(child, index);
                }
            }
            Value::Array(items) => {
                for child in items {
                    walk(child, index);
                }
            }
            _ => {}
        }
    }

    let mut index = HashMap::new();
    for key in ["definitions", "$defs"] {
        if let Some(defs) = schema.get(key) {
            walk(defs, &mut index);
        }
    }
    index
}

/// `$ref` resolution context during construction.
struct Refs<'a> {
    document: &'a Value,
    resolver: Option<&'a dyn RefResolver>,
}

impl Refs<'_> {
    fn lookup(&self, reference: &str) -> Result<Value, NavigationError> {
        let unresolved = || NavigationError::UnresolvedRef {
            reference: reference.to_string(),
        };

        let local = match reference.split_once('#') {
            None => None,
            Some(("", fragment)) => Some(fragment),
            Some((base, fragment)) if Some(base) == schema_id(self.document) => Some(fragment),
            Some(_) => None,
        };

        match local {
            Some("") => Ok(self.document.clone()),
            Some(fragment) if fragment.starts_with('/') => pointer_get_ref(self.document, fragment)
                .cloned()
                .map_err(|_| unresolved()),
            Some(anchor) => build_embedded_index(self.document)
                .remove(&format!("#{}", anchor))
                .ok_or_else(unresolved),
            None => self
                .resolver
                .and_then(|r| r.resolve_ref(reference))
                .ok_or_else(unresolved),
        }
    }

    /// Follow `$ref` chains and fold `allOf` branches into the node.
    fn normalize(&self, node: &Value, depth: usize) -> Result<Value, NavigationError> {
        if depth > MAX_REF_DEPTH {
            return Err(NavigationError::UnresolvedRef {
                reference: node
                    .get("$ref")
                    .and_then(Value::as_str)
                    .unwrap_or("allOf")
                    .to_string(),
            });
        }

        let mut node = match node.get("$ref").and_then(Value::as_str) {
            Some(reference) => {
                let target = self.lookup(reference)?;
                let mut resolved = self.normalize(&target, depth + 1)?;
                // sibling keywords next to $ref refine the target
                if let Value::Object(siblings) = node {
                    for (k, v) in siblings {
                        if k != "$ref" {
                            if let Value::Object(out) = &mut resolved {
                                out.insert(k.clone(), v.clone());
                            }
                        }
                    }
                }
                resolved
            }
            None => node.clone(),
        };

        if let Some(Value::Array(branches)) = node.as_object_mut().and_then(|m| m.shift_remove("allOf")) {
            for branch in &branches {
                let branch = self.normalize(branch, depth + 1)?;
                merge_schemas(&mut node, &branch);
            }
        }
        Ok(node)
    }
}

/// Walk the data-side `prefix` through the schema, collecting every
/// sub-schema that could describe the addressed data.
fn find_property_roots(
    refs: &Refs<'_>,
    prefix: &str,
) -> Result<Vec<PropertyDefinitionRoot>, NavigationError> {
    let parsed = parse_pointer(prefix)?;
    if parsed.is_relative() || parsed.key_modifier {
        return Err(NavigationError::NoPropertyRoot {
            prefix: prefix.to_string(),
        });
    }

    let mut frontier = vec![PropertyDefinitionRoot {
        pointer: String::new(),
        schema: refs.normalize(refs.document, 0)?,
    }];

    for part in &parsed.parts {
        let mut next = Vec::new();
        for node in &frontier {
            for (path, child) in schema_children(&node.schema, part)? {
                next.push(PropertyDefinitionRoot {
                    pointer: format!("{}{}", node.pointer, path),
                    schema: refs.normalize(child, 0)?,
                });
            }
        }
        if next.is_empty() {
            return Err(NavigationError::NoPropertyRoot {
                prefix: prefix.to_string(),
            });
        }
        frontier = next;
    }

    Ok(frontier)
}

/// Sub-schemas that describe the value at data segment `part` of `schema`.
fn schema_children<'s>(
    schema: &'s Value,
    part: &str,
) -> Result<Vec<(String, &'s Value)>, NavigationError> {
    let mut children = Vec::new();
    let wildcard = part == STAR;
    let index_like = wildcard || part == DASH || parse_index(part).is_some();

    if let Some(child) = schema.get("properties").and_then(|p| p.get(part)) {
        children.push((format!("/properties/{}", escape_segment(part)), child));
    }

    if index_like {
        match schema.get("items") {
            Some(items @ Value::Object(_)) => children.push(("/items".to_string(), items)),
            Some(Value::Array(tuple)) => {
                let selected: Vec<usize> = match parse_index(part) {
                    Some(i) if i < tuple.len() => vec![i],
                    Some(_) => Vec::new(),
                    None => (0..tuple.len()).collect(),
                };
                for i in selected {
                    children.push((format!("/items/{}", i), &tuple[i]));
                }
            }
            _ => {}
        }
    }

    if let Some(patterns) = schema.get("patternProperties").and_then(Value::as_object) {
        for (pattern, child) in patterns {
            let regex = Regex::new(pattern).map_err(|e| NavigationError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            if wildcard || regex.is_match(part) {
                children.push((
                    format!("/patternProperties/{}", escape_segment(pattern)),
                    child,
                ));
            }
        }
    }

    if children.is_empty() {
        if let Some(additional @ Value::Object(_)) = schema.get("additionalProperties") {
            children.push(("/additionalProperties".to_string(), additional));
        }
    }

    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nav(schema: Value, prefix: &str) -> SchemaNavigator {
        SchemaNavigator::new(
            Arc::new(schema),
            &NavigatorOptions::new().property_prefix(prefix),
        )
        .unwrap()
    }

    // === Identity scoring ===

    #[test]
    fn identity_score_table() {
        assert_eq!(identity_score("id", Some("User")), 0);
        assert_eq!(identity_score("GUID", None), 0);
        assert_eq!(identity_score("userId", Some("User")), 0);
        assert_eq!(identity_score("user_id", Some("User")), 0);
        assert_eq!(identity_score("orderId", Some("OrderLine")), 1);
        assert_eq!(identity_score("lineUid", Some("OrderLine")), 1);
        assert_eq!(identity_score("accountId", Some("User")), 2);
        assert_eq!(identity_score("name", Some("User")), 3);
        assert_eq!(identity_score("internal_name", None), 3);
        assert_eq!(identity_score("age", Some("User")), 4);
    }

    #[test]
    fn word_parts_split_on_case_and_separators() {
        assert_eq!(word_parts("OrderLineItem"), vec!["order", "line", "item"]);
        assert_eq!(word_parts("order_line"), vec!["order", "line"]);
        assert_eq!(word_parts("User"), vec!["user"]);
    }

    #[test]
    fn identity_first_encountered_wins() {
        let n = nav(
            json!({
                "entity": "User",
                "type": "object",
                "properties": {
                    "id": { "type": "string" },
                    "userId": { "type": "string" },
                    "name": { "type": "string" },
                    "age": { "type": "integer" }
                }
            }),
            "",
        );
        assert_eq!(n.identity_property(), "id");
        assert_eq!(n.identity_properties(), vec!["id", "userId", "name"]);

        let n = nav(
            json!({
                "entity": "User",
                "properties": {
                    "userId": { "type": "string" },
                    "id": { "type": "string" }
                }
            }),
            "",
        );
        assert_eq!(n.identity_property(), "userId");
    }

    #[test]
    fn no_identity_fails_construction() {
        let result = SchemaNavigator::new(
            Arc::new(json!({ "title": "Thing", "properties": { "color": {} } })),
            &NavigatorOptions::new(),
        );
        assert!(matches!(
            result,
            Err(NavigationError::NoIdentity { entity }) if entity == "Thing"
        ));
    }

    // === Property roots ===

    #[test]
    fn prefix_walks_envelope() {
        let n = nav(
            json!({
                "type": "object",
                "properties": {
                    "data": {
                        "type": "array",
                        "items": { "properties": { "id": {}, "label": {} } }
                    }
                }
            }),
            "/data/*",
        );
        assert_eq!(n.property_definition_roots()[0].pointer, "/properties/data/items");
        assert_eq!(n.property_names(), vec!["id", "label"]);
        assert_eq!(n.property_pointer("id"), "/data/*/id");
    }

    #[test]
    fn prefix_without_match_fails() {
        let result = SchemaNavigator::new(
            Arc::new(json!({ "properties": { "id": {} } })),
            &NavigatorOptions::new().property_prefix("/missing"),
        );
        assert!(matches!(result, Err(NavigationError::NoPropertyRoot { .. })));
    }

    #[test]
    fn pattern_properties_merge_matches() {
        let n = nav(
            json!({
                "type": "object",
                "patternProperties": {
                    "^user-": {
                        "properties": { "id": {}, "email": {} },
                        "required": ["id"]
                    },
                    "-admin$": {
                        "properties": { "role": {} },
                        "required": ["role", "id"]
                    },
                    "^group-": { "properties": { "members": {} } }
                }
            }),
            "/user-admin",
        );
        assert_eq!(n.property_definition_roots().len(), 2);
        assert_eq!(n.property_names(), vec!["id", "email", "role"]);
        assert_eq!(n.required(), &["id".to_string(), "role".to_string()]);
    }

    #[test]
    fn refs_and_all_of_resolve() {
        let n = nav(
            json!({
                "definitions": {
                    "base": { "properties": { "id": { "type": "integer" } } },
                    "user": {
                        "allOf": [
                            { "$ref": "#/definitions/base" },
                            { "properties": { "name": { "type": "string" } } }
                        ]
                    }
                },
                "properties": { "user": { "$ref": "#/definitions/user" } }
            }),
            "/user",
        );
        assert_eq!(n.property_names(), vec!["id", "name"]);
        assert_eq!(n.property_schema("id").unwrap()["type"], "integer");
    }

    #[test]
    fn unresolved_ref_fails() {
        let result = SchemaNavigator::new(
            Arc::new(json!({ "properties": { "x": { "$ref": "other.json" } } })),
            &NavigatorOptions::new().property_prefix("/x"),
        );
        assert!(matches!(result, Err(NavigationError::UnresolvedRef { .. })));
    }

    #[test]
    fn external_ref_through_resolver() {
        struct Fixed;
        impl RefResolver for Fixed {
            fn resolve_ref(&self, reference: &str) -> Option<Value> {
                (reference == "other.json#/definitions/item")
                    .then(|| json!({ "properties": { "sku": {}, "itemId": {} } }))
            }
        }

        let n = SchemaNavigator::with_resolver(
            Arc::new(json!({
                "entity": "Item",
                "properties": { "x": { "$ref": "other.json#/definitions/item" } }
            })),
            &NavigatorOptions::new().property_prefix("/x"),
            &Fixed,
        )
        .unwrap();
        assert_eq!(n.identity_property(), "itemId");
    }

    #[test]
    fn cyclic_ref_is_an_error() {
        let result = SchemaNavigator::new(
            Arc::new(json!({
                "definitions": { "a": { "$ref": "#/definitions/b" }, "b": { "$ref": "#/definitions/a" } },
                "properties": { "x": { "$ref": "#/definitions/a" } }
            })),
            &NavigatorOptions::new().property_prefix("/x"),
        );
        assert!(matches!(result, Err(NavigationError::UnresolvedRef { .. })));
    }

    #[test]
    fn merge_schemas_unions() {
        let mut target = json!({ "properties": { "a": 1 }, "required": ["a"], "type": "object" });
        merge_schemas(
            &mut target,
            &json!({ "properties": { "b": 2 }, "required": ["b"], "type": "array" }),
        );
        assert_eq!(
            target,
            json!({ "properties": { "a": 1, "b": 2 }, "required": ["a", "b"], "type": "array" })
        );
    }

    // === Entity, links and embedded schemas ===

    #[test]
    fn entity_falls_back_to_id() {
        let n = nav(
            json!({ "id": "https://x.dev/schemas/invoice.json", "properties": { "invoiceId": {} } }),
            "",
        );
        assert_eq!(n.entity(), Some("invoice"));
        assert_eq!(n.is_identity_property("invoiceId"), 0);
    }

    #[test]
    fn link_lookup() {
        let n = nav(
            json!({
                "properties": { "id": {} },
                "links": [
                    { "rel": "list", "href": "/users" },
                    { "rel": "self", "href": "/users/{id}" },
                    { "href": "/broken" }
                ]
            }),
            "",
        );
        assert_eq!(n.links().len(), 2);
        assert_eq!(n.get_link("self").unwrap().href, "/users/{id}");
        assert_eq!(n.get_link(0usize).unwrap().rel, "list");
        assert!(n.get_link("nope").is_none());
        assert_eq!(
            n.get_first_link(&["read", "self", "item"]).unwrap().rel,
            "self"
        );
        assert!(n.get_first_link(&["read", "view"]).is_none());
    }

    #[test]
    fn link_template_pointers_and_expansion() {
        let n = nav(
            json!({
                "properties": {
                    "data": { "properties": { "id": {}, "org": {} } }
                },
                "links": [{ "rel": "self", "href": "/orgs/{org}/users/{id}" }]
            }),
            "/data",
        );
        let link = n.get_link("self").unwrap().clone();
        assert_eq!(
            n.get_link_uri_template_pointers(&link).unwrap(),
            vec![
                ("org".to_string(), "/data/org".to_string()),
                ("id".to_string(), "/data/id".to_string())
            ]
        );
        let href = n
            .resolve_link_href(&link, &json!({ "data": { "id": 5, "org": "acme" } }))
            .unwrap();
        assert_eq!(href, "/orgs/acme/users/5");

        let err = n
            .resolve_link_href(&link, &json!({ "data": { "id": 5 } }))
            .unwrap_err();
        assert!(matches!(err, NavigationError::UnresolvedLinkParameter { .. }));
    }

    #[test]
    fn embedded_schema_lookup() {
        let n = nav(
            json!({
                "id": "root.json",
                "properties": { "id": {} },
                "definitions": {
                    "address": { "id": "#address", "properties": { "city": {} } },
                    "nested": {
                        "definitions": { "geo": { "id": "geo.json", "type": "object" } }
                    }
                }
            }),
            "",
        );
        assert_eq!(
            n.get_embedded_schema("#/definitions/address").unwrap()["id"],
            "#address"
        );
        assert!(n.get_embedded_schema("#address").is_some());
        assert_eq!(n.get_embedded_schema("geo.json").unwrap()["type"], "object");
        assert!(n.get_embedded_schema("root.json#/definitions/nested").is_some());
        assert!(n.get_embedded_schema("elsewhere.json").is_none());
        assert!(n.get_embedded_schema("#/definitions/missing").is_none());
    }

    #[test]
    fn columns_from_properties() {
        let n = nav(
            json!({
                "properties": {
                    "id": { "type": "integer", "title": "ID" },
                    "tags": { "type": "array" }
                }
            }),
            "",
        );
        let columns = n.columns();
        assert_eq!(columns[0].id, "id");
        assert_eq!(columns[0].path, "/id");
        assert_eq!(columns[0].title.as_deref(), Some("ID"));
        assert!(columns[0].sortable);
        assert!(!columns[1].sortable);
        assert!(columns[1].filterable);
    }

    #[test]
    fn schema_defaults_fill_missing_fields() {
        let n = nav(
            json!({ "properties": { "id": {}, "status": { "default": "active" } } }),
            "",
        );
        let value =
            crate::pointer::pointer_get_with(&json!({ "id": 1 }), "/status", None, &n.defaults())
                .unwrap();
        assert_eq!(value, json!("active"));
        assert!(
            crate::pointer::pointer_get_with(&json!({}), "/nothing", None, &n.defaults()).is_err()
        );
    }
}
