//! Core types shared by the navigator and cursors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default page size for cursors.
pub const DEFAULT_PAGE_LIMIT: usize = 40;

/// Default cap on results returned by a star-expanding pointer read.
pub const DEFAULT_GET_ALL_LIMIT: usize = 40;

/// Upper bound on items a streaming cursor will buffer or estimate.
pub const DEFAULT_MAX_BUFFERED_ITEMS: usize = 2000;

/// Relations tried, in order, when looking for a link that reads one entity.
pub const READ_LINK_RELS: &[&str] = &["read", "self", "item", "view", "get", "current"];

/// Relations tried, in order, when looking for a link that lists a collection.
pub const LIST_LINK_RELS: &[&str] = &["list", "collection", "instances", "index", "search"];

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One followable action declared in a schema's `links` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaHyperlinkDescriptor {
    pub rel: String,
    /// URI template; `{param}` placeholders resolve against instance data.
    pub href: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default = "default_enc_type")]
    pub enc_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_schema: Option<Value>,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_enc_type() -> String {
    "application/json".to_string()
}

impl SchemaHyperlinkDescriptor {
    pub fn new(rel: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            rel: rel.into(),
            href: href.into(),
            method: default_method(),
            enc_type: default_enc_type(),
            schema: None,
            target_schema: None,
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into().to_uppercase();
        self
    }
}

/// How to pick a link from a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSelector<'a> {
    Rel(&'a str),
    Index(usize),
}

impl<'a> From<&'a str> for LinkSelector<'a> {
    fn from(rel: &'a str) -> Self {
        LinkSelector::Rel(rel)
    }
}

impl From<usize> for LinkSelector<'_> {
    fn from(index: usize) -> Self {
        LinkSelector::Index(index)
    }
}

/// Loading state of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadingState {
    #[default]
    Uninitialized,
    Loading,
    Ready,
    Empty,
    Error,
}

/// Comparison applied by a [`CollectionFilterDescriptor`].
///
/// Unrecognised operator names survive deserialization as [`FilterOperator::Other`]
/// so that the filter policy, not the parser, decides what happens to them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    ContainsKey,
    LessThan,
    LessThanOrEquals,
    GreaterThan,
    GreaterThanOrEquals,
    In,
    NotIn,
    Other(String),
}

impl FilterOperator {
    pub fn as_str(&self) -> &str {
        match self {
            FilterOperator::Equals => "equals",
            FilterOperator::NotEquals => "notEquals",
            FilterOperator::Contains => "contains",
            FilterOperator::NotContains => "notContains",
            FilterOperator::ContainsKey => "containsKey",
            FilterOperator::LessThan => "lessThan",
            FilterOperator::LessThanOrEquals => "lessThanOrEquals",
            FilterOperator::GreaterThan => "greaterThan",
            FilterOperator::GreaterThanOrEquals => "greaterThanOrEquals",
            FilterOperator::In => "in",
            FilterOperator::NotIn => "notIn",
            FilterOperator::Other(name) => name,
        }
    }

    /// Parse an operator name. Accepts camelCase names and the usual symbols.
    pub fn parse(s: &str) -> Self {
        match s {
            "equals" | "eq" | "==" => FilterOperator::Equals,
            "notEquals" | "ne" | "!=" => FilterOperator::NotEquals,
            "contains" => FilterOperator::Contains,
            "notContains" => FilterOperator::NotContains,
            "containsKey" => FilterOperator::ContainsKey,
            "lessThan" | "lt" | "<" => FilterOperator::LessThan,
            "lessThanOrEquals" | "lte" | "<=" => FilterOperator::LessThanOrEquals,
            "greaterThan" | "gt" | ">" => FilterOperator::GreaterThan,
            "greaterThanOrEquals" | "gte" | ">=" => FilterOperator::GreaterThanOrEquals,
            "in" => FilterOperator::In,
            "notIn" => FilterOperator::NotIn,
            other => FilterOperator::Other(other.to_string()),
        }
    }
}

impl From<String> for FilterOperator {
    fn from(s: String) -> Self {
        FilterOperator::parse(&s)
    }
}

impl From<FilterOperator> for String {
    fn from(op: FilterOperator) -> Self {
        op.as_str().to_string()
    }
}

/// A declarative predicate against a pointer-addressed field.
///
/// `path == "*"` matches when any of the item's own fields satisfies the
/// operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionFilterDescriptor {
    pub path: String,
    pub operator: FilterOperator,
    pub value: Value,
}

impl CollectionFilterDescriptor {
    pub fn new(path: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            operator,
            value: value.into(),
        }
    }
}

/// Sort direction for one sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Some(SortDirection::Asc),
            "desc" | "descending" => Some(SortDirection::Desc),
            _ => None,
        }
    }
}

/// One key of a multi-key sort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSortDescriptor {
    pub path: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl CollectionSortDescriptor {
    pub fn new(path: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            path: path.into(),
            direction,
        }
    }
}

/// A displayable column over cursor items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub id: String,
    /// Pointer to the column's value within an item.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub sortable: bool,
    #[serde(default)]
    pub filterable: bool,
}

impl ColumnDescriptor {
    pub fn new(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            title: None,
            sortable: true,
            filterable: true,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn sortable(mut self, sortable: bool) -> Self {
        self.sortable = sortable;
        self
    }

    pub fn filterable(mut self, filterable: bool) -> Self {
        self.filterable = filterable;
        self
    }
}

/// Optional interfaces a cursor implements.
///
/// Declared up front so wrappers can decide at construction time whether to
/// push work down to a parent or do it themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorCapabilities {
    pub filterable: bool,
    pub sortable: bool,
    pub searchable: bool,
    pub maskable: bool,
    pub columnized: bool,
}

impl CursorCapabilities {
    /// No optional interfaces.
    pub fn none() -> Self {
        Self::default()
    }

    /// Every optional interface.
    pub fn all() -> Self {
        Self {
            filterable: true,
            sortable: true,
            searchable: true,
            maskable: true,
            columnized: true,
        }
    }
}

/// What to do with a filter whose operator is not recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownOperatorPolicy {
    /// Log a warning and treat the item as not matching.
    #[default]
    NonMatch,
    /// Fail the filter with `CursorError::UnknownOperator`.
    Reject,
}
