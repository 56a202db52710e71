//! Hyperschema navigation
//!
//! Tools for working with JSON data described by JSON Hyperschema documents:
//!
//! - a JSON Pointer engine with `*` wildcards, relative pointers and masks
//! - a schema navigator that finds property definitions, identity
//!   properties, links and column metadata
//! - paginated cursors over in-memory lists, remote endpoints, and
//!   re-paged (streaming) parent cursors
//! - schema caches, fetchers and validation
//!
//! # Example
//!
//! ```
//! use hyperschema_nav::{pointer_get, NavigatorOptions, SchemaNavigator};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let schema = json!({
//!     "id": "user",
//!     "type": "object",
//!     "properties": {
//!         "userId": { "type": "string" },
//!         "name": { "type": "string" }
//!     },
//!     "links": [{ "rel": "self", "href": "/users/{userId}" }]
//! });
//!
//! let nav = SchemaNavigator::new(Arc::new(schema), &NavigatorOptions::new()).unwrap();
//! assert_eq!(nav.identity_property(), "userId");
//!
//! let data = json!({ "userId": "u1", "name": "Ada" });
//! let link = nav.get_first_link(&["self"]).unwrap();
//! assert_eq!(nav.resolve_link_href(link, &data).unwrap(), "/users/u1");
//! assert_eq!(pointer_get(&data, "/name").unwrap(), json!("Ada"));
//! ```
//!
//! # Pointer forms
//!
//! | Form | Example | Meaning |
//! |------|---------|---------|
//! | absolute | `/a/0/b` | RFC 6901 |
//! | star | `/a/*/b` | first match on read, every match on expand |
//! | relative | `1/b`, `0#` | up N levels from a root pointer |
//!
//! # Features
//!
//! `remote` (default) enables HTTP loading through `reqwest`.

mod cache;
mod collection;
mod cursor;
mod error;
mod loader;
mod navigator;
mod pointer;
mod types;
mod uri_template;
mod validator;

pub use cache::{
    schema_id, DirectoryStorage, FileSchemaFetcher, MemorySchemaCache, MemoryStorage,
    PersistentSchemaCache, SchemaCache, SchemaFetcher, SchemaRegistry, SchemaStorage,
    DEFAULT_KEY_PREFIX,
};
pub use collection::{
    evaluate_filter, filter_collection_by, filter_collection_with, search_collection,
    sort_collection_by, sort_collection_with, ItemMatcher,
};
pub use cursor::{
    ColumnizedCursor, Cursor, CursorOptions, EndpointCursor, FilterableCursor, MaskableCursor,
    PageEvent, PageFetcher, PageMapItem, PageObserver, PageRequest, PageResponse,
    SearchableCursor, SortableCursor, StreamingCursor, ValueCursor,
};
pub use error::{
    CacheError, CursorError, LoadError, NavigationError, PointerError, SchemaError, ValidateError,
};
pub use loader::{is_url, load_document, load_document_auto, load_document_str};
pub use navigator::{
    identity_score, merge_schemas, NavigatorOptions, PropertyDefinitionRoot, RefResolver,
    SchemaDefaults, SchemaNavigator, NO_IDENTITY,
};
pub use pointer::{
    compile_pointer_get, escape_segment, format_pointer, is_json_pointer,
    is_relative_json_pointer, is_star_pointer, parse_pointer, parse_pointer_root_adjusted,
    pointer_copy, pointer_exclusion_mask, pointer_expand, pointer_get, pointer_get_all,
    pointer_get_ref, pointer_get_with, pointer_inclusion_mask, pointer_remove,
    pointer_remove_with, pointer_set, pointer_set_with, try_pointer_get, AdjustedPointer,
    CompiledPointer, CompiledPointerCache, DefaultGenerator, MissingPath, NotFoundDefault,
    ParsedPointer, DASH, STAR,
};
pub use types::{
    json_type_name, CollectionFilterDescriptor, CollectionSortDescriptor, ColumnDescriptor,
    CursorCapabilities, FilterOperator, LinkSelector, LoadingState, SchemaHyperlinkDescriptor,
    SortDirection, UnknownOperatorPolicy, DEFAULT_GET_ALL_LIMIT, DEFAULT_MAX_BUFFERED_ITEMS,
    DEFAULT_PAGE_LIMIT, LIST_LINK_RELS, READ_LINK_RELS,
};
pub use uri_template::UriTemplate;
pub use validator::{validate, JsonSchemaValidator, SchemaValidator, ValidationOutcome};

#[cfg(feature = "remote")]
pub use cache::HttpSchemaFetcher;
#[cfg(feature = "remote")]
pub use loader::{fetch_json, http_client, load_document_url, HTTP_TIMEOUT};
