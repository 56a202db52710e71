//! Cursor that re-pages another cursor.
//!
//! [`StreamingCursor`] presents pages of its own `limit` over a parent cursor
//! whose page size it does not control, filtering locally whatever the parent
//! cannot filter itself. Each client page is recorded in a page map as the
//! exact raw slice of parent pages that produced it:
//!
//! ```text
//! parent (limit 3):  [0 1 2] [3 4 5] [6 7 8] [9 10 11] [12 13 14]
//! client (limit 7):  page 1 = p1[0..] .. p3[..1]
//!                    page 2 = p3[1..] .. p5[..2]
//!                    page 3 = p5[2..3]
//! ```
//!
//! Entry `i + 1` starts where entry `i` ends, so the map is always extended
//! in order, one awaited parent fetch at a time. Changing the page size,
//! filters, sort keys or search term discards the whole map.
//!
//! Sorting cannot be streamed. When the parent cannot sort, matching items
//! are buffered (at most `max_buffered_items`), sorted, and paged in memory.

use async_trait::async_trait;
use serde_json::Value;

use super::{
    mask_items, pages_for, ColumnizedCursor, Cursor, CursorOptions, CursorState,
    FilterableCursor, MaskableCursor, PageObserver, SearchableCursor, SortableCursor,
};
use crate::collection::{sort_collection_with, ItemMatcher};
use crate::error::CursorError;
use crate::pointer::CompiledPointerCache;
use crate::types::{
    CollectionFilterDescriptor, CollectionSortDescriptor, ColumnDescriptor, CursorCapabilities,
    LoadingState, UnknownOperatorPolicy,
};

/// The parent slice behind one client page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMapItem {
    pub from_page: usize,
    pub from_index: usize,
    pub to_page: usize,
    /// Exclusive.
    pub to_index: usize,
    /// Items in the slice that passed local filtering.
    pub matched: usize,
}

pub struct StreamingCursor {
    parent: Box<dyn Cursor>,
    parent_caps: CursorCapabilities,
    state: CursorState,
    max_buffered_items: usize,
    policy: UnknownOperatorPolicy,
    filters: Vec<CollectionFilterDescriptor>,
    sorters: Vec<CollectionSortDescriptor>,
    search: Option<String>,
    mask: Vec<String>,
    columns: Vec<ColumnDescriptor>,
    page_map: Vec<PageMapItem>,
    exhausted: bool,
    buffer: Option<Vec<Value>>,
    /// Settings not yet handed to the parent.
    pending_pushdown: bool,
    refresh_parent: bool,
    pointers: CompiledPointerCache,
}

impl std::fmt::Debug for StreamingCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingCursor")
            .field("parent_caps", &self.parent_caps)
            .field("state", &self.state)
            .field("page_map", &self.page_map)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

impl StreamingCursor {
    /// # Errors
    ///
    /// `InvalidLimit` if `options.limit` is zero.
    pub fn new(parent: Box<dyn Cursor>, options: &CursorOptions) -> Result<Self, CursorError> {
        options.validate()?;
        let parent_caps = parent.capabilities();
        Ok(Self {
            parent,
            parent_caps,
            state: CursorState::new(options.limit),
            max_buffered_items: options.max_buffered_items.max(1),
            policy: options.unknown_operators,
            filters: Vec::new(),
            sorters: Vec::new(),
            search: None,
            mask: Vec::new(),
            columns: Vec::new(),
            page_map: Vec::new(),
            exhausted: false,
            buffer: None,
            pending_pushdown: false,
            refresh_parent: false,
            pointers: CompiledPointerCache::new(),
        })
    }

    pub fn with_columns(mut self, columns: Vec<ColumnDescriptor>) -> Self {
        self.columns = columns;
        self
    }

    pub fn parent(&self) -> &dyn Cursor {
        self.parent.as_ref()
    }

    /// Client pages mapped so far.
    pub fn page_map(&self) -> &[PageMapItem] {
        &self.page_map
    }

    /// Whether the parent has been read to its end.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn reset_map(&mut self) {
        self.page_map.clear();
        self.exhausted = false;
        self.buffer = None;
    }

    fn invalidate(&mut self) {
        self.reset_map();
        self.pending_pushdown = true;
        self.state.dirty = true;
    }

    fn sorts_locally(&self) -> bool {
        !self.sorters.is_empty() && !self.parent_caps.sortable
    }

    /// Push settings the parent supports down to it, and build a matcher for
    /// the rest.
    fn prepare(&mut self) -> Result<ItemMatcher, CursorError> {
        if std::mem::take(&mut self.pending_pushdown) {
            if self.parent_caps.filterable {
                if let Some(parent) = self.parent.as_filterable() {
                    parent.filter_by(self.filters.clone());
                }
            }
            if self.parent_caps.sortable {
                if let Some(parent) = self.parent.as_sortable() {
                    parent.sort_by(self.sorters.clone());
                }
            }
            if self.parent_caps.searchable {
                if let Some(parent) = self.parent.as_searchable() {
                    parent.search(self.search.clone());
                }
            }
        }

        let local_filters: &[CollectionFilterDescriptor] = if self.parent_caps.filterable {
            &[]
        } else {
            &self.filters
        };
        let local_search = if self.parent_caps.searchable {
            None
        } else {
            self.search.as_deref()
        };
        ItemMatcher::with_pointers(local_filters, local_search, self.policy, &mut self.pointers)
    }

    async fn parent_page(&mut self, page: usize) -> Result<Vec<Value>, CursorError> {
        let force = std::mem::take(&mut self.refresh_parent);
        self.parent.select(page, force).await
    }

    fn parent_is_last(&self, page: usize, received: usize) -> bool {
        received == 0 || page >= self.parent.total_pages()
    }

    /// Map client pages up to `target`, strictly in order. Returns the items
    /// of `target` when this call is the one that mapped it.
    async fn extend_to(
        &mut self,
        target: usize,
        matcher: &ItemMatcher,
    ) -> Result<Option<Vec<Value>>, CursorError> {
        let limit = self.state.limit;
        let mut last_items = None;

        while self.page_map.len() < target && !self.exhausted {
            let (from_page, from_index) = self
                .page_map
                .last()
                .map_or((1, 0), |e| (e.to_page, e.to_index));
            let (mut page, mut index) = (from_page, from_index);
            let mut matched = Vec::new();

            loop {
                let items = self.parent_page(page).await?;
                while index < items.len() && matched.len() < limit {
                    if matcher.matches(&items[index])? {
                        matched.push(items[index].clone());
                    }
                    index += 1;
                }
                if matched.len() == limit {
                    break;
                }
                if self.parent_is_last(page, items.len()) {
                    self.exhausted = true;
                    break;
                }
                page += 1;
                index = 0;
            }

            if matched.is_empty() {
                break;
            }

            let entry = PageMapItem {
                from_page,
                from_index,
                to_page: page,
                to_index: index,
                matched: matched.len(),
            };
            tracing::debug!(
                client_page = self.page_map.len() + 1,
                ?entry,
                "extended page map"
            );
            self.page_map.push(entry);
            last_items = Some(matched);
        }

        Ok(if self.page_map.len() == target {
            last_items
        } else {
            None
        })
    }

    /// Re-read the parent slice behind `entry`.
    async fn replay(
        &mut self,
        entry: PageMapItem,
        matcher: &ItemMatcher,
    ) -> Result<Vec<Value>, CursorError> {
        let mut out = Vec::with_capacity(entry.matched);
        for page in entry.from_page..=entry.to_page {
            let items = self.parent_page(page).await?;
            let start = if page == entry.from_page {
                entry.from_index
            } else {
                0
            };
            let end = if page == entry.to_page {
                entry.to_index.min(items.len())
            } else {
                items.len()
            };
            for item in items.get(start..end).unwrap_or(&[]) {
                if matcher.matches(item)? {
                    out.push(item.clone());
                }
            }
        }
        Ok(out)
    }

    /// Read every matching item (up to the buffer bound) for local sorting.
    async fn fill_buffer(&mut self, matcher: &ItemMatcher) -> Result<(), CursorError> {
        if self.buffer.is_some() {
            return Ok(());
        }
        let mut buffer = Vec::new();
        let mut page = 1;
        loop {
            let items = self.parent_page(page).await?;
            let received = items.len();
            for item in items {
                if matcher.matches(&item)? {
                    buffer.push(item);
                }
            }
            if self.parent_is_last(page, received) {
                break;
            }
            if buffer.len() >= self.max_buffered_items {
                tracing::warn!(
                    max = self.max_buffered_items,
                    "sort buffer full, later items are not included"
                );
                break;
            }
            page += 1;
        }
        buffer.truncate(self.max_buffered_items);
        sort_collection_with(&mut buffer, &self.sorters, &mut self.pointers);
        self.buffer = Some(buffer);
        self.exhausted = true;
        Ok(())
    }

    fn update_estimates(&mut self) {
        let limit = self.state.limit;
        let mapped = self.page_map.len();
        let matched: usize = self.page_map.iter().map(|e| e.matched).sum();

        if self.exhausted {
            self.state.count = matched;
            self.state.total_pages = mapped;
            self.state.exact_total = true;
            return;
        }

        let parent_limit = self.parent.limit();
        let consumed = self
            .page_map
            .last()
            .map_or(0, |e| (e.to_page - 1) * parent_limit + e.to_index);
        let remaining = self.parent.count().saturating_sub(consumed);
        let cap_pages = (self.max_buffered_items / limit).max(mapped);

        self.state.total_pages = (mapped + pages_for(remaining, limit)).min(cap_pages);
        self.state.count = (matched + remaining).min(self.max_buffered_items.max(matched));
        self.state.exact_total = false;
    }

    async fn load(&mut self, page: usize) -> Result<Vec<Value>, CursorError> {
        let matcher = self.prepare()?;
        let limit = self.state.limit;

        let items = if self.sorts_locally() {
            self.fill_buffer(&matcher).await?;
            let buffer = self.buffer.as_deref().unwrap_or_default();
            self.state.count = buffer.len();
            self.state.total_pages = pages_for(buffer.len(), limit);
            self.state.exact_total = true;
            self.state.check_range(page)?;
            buffer
                .iter()
                .skip((page - 1) * limit)
                .take(limit)
                .cloned()
                .collect()
        } else {
            // a page promised by the previous estimate must load, even if
            // local filtering leaves nothing for it
            let promised = !self.state.dirty
                && !self.state.exact_total
                && page <= self.state.total_pages;
            let fresh = self.extend_to(page, &matcher).await?;
            self.update_estimates();
            if page <= self.page_map.len() {
                match fresh {
                    Some(items) => items,
                    None => {
                        let entry = self.page_map[page - 1];
                        self.replay(entry, &matcher).await?
                    }
                }
            } else if self.page_map.is_empty() {
                Vec::new()
            } else if promised {
                tracing::debug!(
                    page,
                    total_pages = self.page_map.len(),
                    "estimated page had no matching items"
                );
                Vec::new()
            } else {
                return Err(CursorError::PageOutOfRange {
                    page,
                    total_pages: self.page_map.len(),
                });
            }
        };

        mask_items(items, &self.mask)
    }
}

#[async_trait]
impl Cursor for StreamingCursor {
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
        CursorCapabilities::all()
    }

    fn set_limit(&mut self, limit: usize) -> Result<(), CursorError> {
        let previous = self.state.limit;
        self.state.set_limit(limit)?;
        if limit != previous {
            self.invalidate();
        }
        Ok(())
    }

    fn subscribe(&mut self, observer: PageObserver) {
        self.state.subscribe(observer);
    }

    async fn select(&mut self, page: usize, force: bool) -> Result<Vec<Value>, CursorError> {
        if !self.state.begin(page, force)? {
            return Ok(self.state.items.clone());
        }
        if force {
            self.reset_map();
            self.refresh_parent = true;
        }
        match self.load(page).await {
            Ok(items) => Ok(self.state.commit(page, items)),
            Err(e) => Err(self.state.fail(e)),
        }
    }

    /// Capped at `max_buffered_items` whatever `limit` asks for.
    async fn all(&mut self, limit: Option<usize>) -> Result<Vec<Value>, CursorError> {
        let cap = limit
            .unwrap_or(self.max_buffered_items)
            .min(self.max_buffered_items);
        let matcher = self.prepare()?;

        let mut collected = if self.sorts_locally() {
            self.fill_buffer(&matcher).await?;
            self.buffer.clone().unwrap_or_default()
        } else {
            let mut collected = Vec::new();
            let mut page = 1;
            loop {
                let items = self.parent_page(page).await?;
                let received = items.len();
                for item in items {
                    if matcher.matches(&item)? {
                        collected.push(item);
                    }
                }
                if collected.len() >= cap || self.parent_is_last(page, received) {
                    break;
                }
                page += 1;
            }
            collected
        };

        if collected.len() > cap {
            if cap == self.max_buffered_items {
                tracing::warn!(max = cap, "all() truncated to the buffer bound");
            }
            collected.truncate(cap);
        }
        mask_items(collected, &self.mask)
    }

    fn as_filterable(&mut self) -> Option<&mut dyn FilterableCursor> {
        Some(self)
    }

    fn as_sortable(&mut self) -> Option<&mut dyn SortableCursor> {
        Some(self)
    }

    fn as_searchable(&mut self) -> Option<&mut dyn SearchableCursor> {
        Some(self)
    }

    fn as_maskable(&mut self) -> Option<&mut dyn MaskableCursor> {
        Some(self)
    }

    fn as_columnized(&mut self) -> Option<&mut dyn ColumnizedCursor> {
        Some(self)
    }
}

impl FilterableCursor for StreamingCursor {
    fn filters(&self) -> &[CollectionFilterDescriptor] {
        &self.filters
    }

    fn filter_by(&mut self, filters: Vec<CollectionFilterDescriptor>) {
        self.filters = filters;
        self.invalidate();
    }
}

impl SortableCursor for StreamingCursor {
    fn sorters(&self) -> &[CollectionSortDescriptor] {
        &self.sorters
    }

    fn sort_by(&mut self, sorters: Vec<CollectionSortDescriptor>) {
        self.sorters = sorters;
        self.invalidate();
    }
}

impl SearchableCursor for StreamingCursor {
    fn search_term(&self) -> Option<&str> {
        self.search.as_deref()
    }

    fn search(&mut self, term: Option<String>) {
        self.search = term;
        self.invalidate();
    }
}

impl MaskableCursor for StreamingCursor {
    fn mask(&self) -> &[String] {
        &self.mask
    }

    fn set_mask(&mut self, pointers: Vec<String>) {
        self.mask = pointers;
        self.state.dirty = true;
    }
}

impl ColumnizedCursor for StreamingCursor {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    fn set_columns(&mut self, columns: Vec<ColumnDescriptor>) {
        self.columns = columns;
    }
}
