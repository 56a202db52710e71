//! Cursor over a remote collection link.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    mask_items, pages_for, ColumnizedCursor, Cursor, CursorOptions, CursorState,
    FilterableCursor, MaskableCursor, PageObserver, SearchableCursor, SortableCursor,
};
use crate::error::CursorError;
use crate::types::{
    CollectionFilterDescriptor, CollectionSortDescriptor, ColumnDescriptor, CursorCapabilities,
    LoadingState, SchemaHyperlinkDescriptor,
};
use crate::uri_template::UriTemplate;

/// One page request handed to a [`PageFetcher`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRequest {
    pub method: String,
    /// The link `href` with every template variable expanded.
    pub href: String,
    pub page: usize,
    pub limit: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<CollectionFilterDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sorters: Vec<CollectionSortDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

/// Items returned for one page, plus the collection size when the source knows it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageResponse {
    pub items: Vec<Value>,
    #[serde(default)]
    pub count: Option<usize>,
}

/// Transport behind an [`EndpointCursor`].
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResponse, CursorError>;
}

/// Pages fetched through a hyperlink.
///
/// The link `href` may use `{page}`, `{limit}` and `{offset}`; everything else
/// resolves from the context object given at construction. Filters, sort keys
/// and the search term travel in the [`PageRequest`]; the fetcher decides how
/// to encode them. Capabilities are whatever the caller says the remote
/// endpoint supports.
pub struct EndpointCursor {
    fetcher: Arc<dyn PageFetcher>,
    link: SchemaHyperlinkDescriptor,
    template: UriTemplate,
    context: Map<String, Value>,
    capabilities: CursorCapabilities,
    max_buffered_items: usize,
    state: CursorState,
    filters: Vec<CollectionFilterDescriptor>,
    sorters: Vec<CollectionSortDescriptor>,
    search: Option<String>,
    mask: Vec<String>,
    columns: Vec<ColumnDescriptor>,
}

impl std::fmt::Debug for EndpointCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointCursor")
            .field("link", &self.link)
            .field("capabilities", &self.capabilities)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl EndpointCursor {
    /// # Errors
    ///
    /// `InvalidLimit` for a zero page size, or a navigation error if the link
    /// `href` is not a valid URI template.
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        link: SchemaHyperlinkDescriptor,
        context: Value,
        capabilities: CursorCapabilities,
        options: &CursorOptions,
    ) -> Result<Self, CursorError> {
        options.validate()?;
        let template = UriTemplate::parse(&link.href)?;
        let context = match context {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Ok(Self {
            fetcher,
            link,
            template,
            context,
            capabilities,
            max_buffered_items: options.max_buffered_items,
            state: CursorState::new(options.limit),
            filters: Vec::new(),
            sorters: Vec::new(),
            search: None,
            mask: Vec::new(),
            columns: Vec::new(),
        })
    }

    pub fn with_columns(mut self, columns: Vec<ColumnDescriptor>) -> Self {
        self.columns = columns;
        self
    }

    pub fn link(&self) -> &SchemaHyperlinkDescriptor {
        &self.link
    }

    /// The request that would load `page`.
    ///
    /// # Errors
    ///
    /// Fails when the `href` needs a value the context does not provide.
    pub fn request(&self, page: usize) -> Result<PageRequest, CursorError> {
        let limit = self.state.limit;
        let href = self.template.expand(|name| match name {
            "page" => Some(Value::from(page)),
            "limit" => Some(Value::from(limit)),
            "offset" => Some(Value::from((page - 1) * limit)),
            other => self.context.get(other).cloned(),
        })?;

        Ok(PageRequest {
            method: self.link.method.clone(),
            href,
            page,
            limit,
            filters: self.filters.clone(),
            sorters: self.sorters.clone(),
            search: self.search.clone(),
        })
    }

    async fn fetch(&self, page: usize) -> Result<PageResponse, CursorError> {
        let request = self.request(page)?;
        tracing::debug!(method = %request.method, href = %request.href, page, "fetching page");
        self.fetcher.fetch_page(&request).await
    }

    fn touch(&mut self) {
        self.state.dirty = true;
    }

    /// Update count and page totals from a response.
    fn record_totals(&mut self, page: usize, response: &PageResponse) {
        let limit = self.state.limit;
        match response.count {
            Some(count) => {
                self.state.count = count;
                self.state.total_pages = pages_for(count, limit);
                self.state.exact_total = true;
            }
            None => {
                // Unknown size: a full page suggests there is at least one more.
                self.state.count = (page - 1) * limit + response.items.len();
                self.state.total_pages = if response.items.len() >= limit {
                    page + 1
                } else if response.items.is_empty() {
                    page - 1
                } else {
                    page
                };
                self.state.exact_total = false;
            }
        }
    }
}

#[async_trait]
impl Cursor for EndpointCursor {
    fn current(&self) -> usize {
        self.state.current
    }

    fn limit(&self) -> usize {
        self.state.limit
    }

    fn count(&self) -> usize {
        self.state.count
    }

    fn total_pages(&self) -> usize {
        self.state.total_pages
    }

    fn items(&self) -> &[Value] {
        &self.state.items
    }

    fn loading_state(&self) -> LoadingState {
        self.state.loading_state
    }

    fn capabilities(&self) -> CursorCapabilities {
        self.capabilities
    }

    fn set_limit(&mut self, limit: usize) -> Result<(), CursorError> {
        self.state.set_limit(limit)
    }

    fn subscribe(&mut self, observer: PageObserver) {
        self.state.subscribe(observer);
    }

    async fn select(&mut self, page: usize, force: bool) -> Result<Vec<Value>, CursorError> {
        if !self.state.begin(page, force)? {
            return Ok(self.state.items.clone());
        }
        let response = match self.fetch(page).await {
            Ok(response) => response,
            Err(e) => return Err(self.state.fail(e)),
        };
        self.record_totals(page, &response);
        match mask_items(response.items, &self.mask) {
            Ok(items) => Ok(self.state.commit(page, items)),
            Err(e) => Err(self.state.fail(e)),
        }
    }

    /// Capped at `max_buffered_items` whatever `limit` asks for.
    async fn all(&mut self, limit: Option<usize>) -> Result<Vec<Value>, CursorError> {
        if let Some(requested) = limit.filter(|l| *l > self.max_buffered_items) {
            tracing::warn!(
                requested,
                max = self.max_buffered_items,
                "limit exceeds the item buffer, clamping"
            );
        }
        let cap = limit
            .unwrap_or(self.max_buffered_items)
            .min(self.max_buffered_items);
        let page_size = self.state.limit;
        let mut collected = Vec::new();
        let mut page = 1;
        while collected.len() < cap {
            let response = self.fetch(page).await?;
            let received = response.items.len();
            collected.extend(response.items);
            let known_last = response
                .count
                .is_some_and(|count| page >= pages_for(count, page_size));
            if received < page_size || known_last {
                break;
            }
            page += 1;
        }
        if collected.len() > cap {
            collected.truncate(cap);
        }
        mask_items(collected, &self.mask)
    }

    fn as_filterable(&mut self) -> Option<&mut dyn FilterableCursor> {
        if self.capabilities.filterable {
            Some(self)
        } else {
            None
        }
    }

    fn as_sortable(&mut self) -> Option<&mut dyn SortableCursor> {
        if self.capabilities.sortable {
            Some(self)
        } else {
            None
        }
    }

    fn as_searchable(&mut self) -> Option<&mut dyn SearchableCursor> {
        if self.capabilities.searchable {
            Some(self)
        } else {
            None
        }
    }

    fn as_maskable(&mut self) -> Option<&mut dyn MaskableCursor> {
        if self.capabilities.maskable {
            Some(self)
        } else {
            None
        }
    }

    fn as_columnized(&mut self) -> Option<&mut dyn ColumnizedCursor> {
        if self.capabilities.columnized {
            Some(self)
        } else {
            None
        }
    }
}

impl FilterableCursor for EndpointCursor {
    fn filters(&self) -> &[CollectionFilterDescriptor] {
        &self.filters
    }

    fn filter_by(&mut self, filters: Vec<CollectionFilterDescriptor>) {
        self.filters = filters;
        self.touch();
    }
}

impl SortableCursor for EndpointCursor {
    fn sorters(&self) -> &[CollectionSortDescriptor] {
        &self.sorters
    }

    fn sort_by(&mut self, sorters: Vec<CollectionSortDescriptor>) {
        self.sorters = sorters;
        self.touch();
    }
}

impl SearchableCursor for EndpointCursor {
    fn search_term(&self) -> Option<&str> {
        self.search.as_deref()
    }

    fn search(&mut self, term: Option<String>) {
        self.search = term;
        self.touch();
    }
}

impl MaskableCursor for EndpointCursor {
    fn mask(&self) -> &[String] {
        &self.mask
    }

    fn set_mask(&mut self, pointers: Vec<String>) {
        self.mask = pointers;
        self.touch();
    }
}

impl ColumnizedCursor for EndpointCursor {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    fn set_columns(&mut self, columns: Vec<ColumnDescriptor>) {
        self.columns = columns;
    }
}
