//! Paginated cursors over JSON collections.
//!
//! A [`Cursor`] is one page window over a collection. Cursors start
//! `Uninitialized`, move to `Loading` on every `select`, and settle in
//! `Ready`, `Empty` or `Error`. A failed load keeps the previous page.
//!
//! Optional behaviour (filtering, sorting, search, masks, columns) lives in
//! capability traits. A cursor declares which ones it supports through
//! [`Cursor::capabilities`] and hands them out through the `as_*` accessors.
//! Changing a capability setting marks the cursor dirty; the next `select`
//! reloads even when the page number is unchanged.
//!
//! # Example
//!
//! ```
//! use hyperschema_nav::{Cursor, CursorOptions, ValueCursor};
//! use serde_json::json;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let items = (1..=5).map(|i| json!({ "id": i })).collect();
//! let mut cursor = ValueCursor::new(items, &CursorOptions::new().limit(2)).unwrap();
//!
//! let page = cursor.select(2, false).await.unwrap();
//! assert_eq!(page, vec![json!({ "id": 3 }), json!({ "id": 4 })]);
//! assert_eq!(cursor.total_pages(), 3);
//! assert!(cursor.has_next());
//! # });
//! ```

mod endpoint;
mod streaming;
mod value;

pub use endpoint::{EndpointCursor, PageFetcher, PageRequest, PageResponse};
pub use streaming::{PageMapItem, StreamingCursor};
pub use value::ValueCursor;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CursorError;
use crate::types::{
    CollectionFilterDescriptor, CollectionSortDescriptor, ColumnDescriptor, CursorCapabilities,
    FilterOperator, LoadingState, SortDirection, UnknownOperatorPolicy, DEFAULT_MAX_BUFFERED_ITEMS,
    DEFAULT_PAGE_LIMIT,
};

/// Notification sent to observers around each page load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PageEvent<'a> {
    Before { page: usize },
    After { page: usize, items: &'a [Value] },
}

/// Callback subscribed to a cursor's page loads.
pub type PageObserver = Box<dyn Fn(&PageEvent<'_>) + Send + Sync>;

/// Cursor construction options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorOptions {
    pub limit: usize,
    /// Upper bound on items a cursor will hold in memory at once.
    pub max_buffered_items: usize,
    pub unknown_operators: UnknownOperatorPolicy,
}

impl Default for CursorOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            max_buffered_items: DEFAULT_MAX_BUFFERED_ITEMS,
            unknown_operators: UnknownOperatorPolicy::default(),
        }
    }
}

impl CursorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn max_buffered_items(mut self, max: usize) -> Self {
        self.max_buffered_items = max;
        self
    }

    pub fn unknown_operators(mut self, policy: UnknownOperatorPolicy) -> Self {
        self.unknown_operators = policy;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), CursorError> {
        if self.limit == 0 {
            return Err(CursorError::InvalidLimit);
        }
        Ok(())
    }
}

/// One page window over a collection.
#[async_trait]
pub trait Cursor: Send {
    /// Current page, 1-based.
    fn current(&self) -> usize;
    fn limit(&self) -> usize;
    /// Total items. May be an estimate.
    fn count(&self) -> usize;
    /// Total pages. May be an estimate.
    fn total_pages(&self) -> usize;
    fn items(&self) -> &[Value];
    fn loading_state(&self) -> LoadingState;
    fn capabilities(&self) -> CursorCapabilities;

    /// Change the page size. Takes effect on the next `select`.
    fn set_limit(&mut self, limit: usize) -> Result<(), CursorError>;

    fn subscribe(&mut self, observer: PageObserver);

    /// Load `page`. A no-op on the current page unless `force` is set or a
    /// capability setting changed since the last load.
    ///
    /// # Errors
    ///
    /// `InvalidPage` for page 0, `PageOutOfRange` past a known last page, or
    /// whatever the underlying source fails with.
    async fn select(&mut self, page: usize, force: bool) -> Result<Vec<Value>, CursorError>;

    /// Every item in the collection, up to `limit`, without moving the cursor.
    async fn all(&mut self, limit: Option<usize>) -> Result<Vec<Value>, CursorError>;

    fn has_previous(&self) -> bool {
        self.current() > 1
    }

    fn has_next(&self) -> bool {
        self.current() < self.total_pages()
    }

    async fn next(&mut self) -> Result<Vec<Value>, CursorError> {
        let page = self.current() + 1;
        self.select(page, false).await
    }

    async fn previous(&mut self) -> Result<Vec<Value>, CursorError> {
        let page = self.current().saturating_sub(1);
        self.select(page, false).await
    }

    async fn refresh(&mut self) -> Result<Vec<Value>, CursorError> {
        let page = self.current();
        self.select(page, true).await
    }

    fn as_filterable(&mut self) -> Option<&mut dyn FilterableCursor> {
        None
    }

    fn as_sortable(&mut self) -> Option<&mut dyn SortableCursor> {
        None
    }

    fn as_searchable(&mut self) -> Option<&mut dyn SearchableCursor> {
        None
    }

    fn as_maskable(&mut self) -> Option<&mut dyn MaskableCursor> {
        None
    }

    fn as_columnized(&mut self) -> Option<&mut dyn ColumnizedCursor> {
        None
    }
}

pub trait FilterableCursor {
    fn filters(&self) -> &[CollectionFilterDescriptor];
    /// Replace all filters.
    fn filter_by(&mut self, filters: Vec<CollectionFilterDescriptor>);

    fn clear_filters(&mut self) {
        self.filter_by(Vec::new());
    }
}

pub trait SortableCursor {
    fn sorters(&self) -> &[CollectionSortDescriptor];
    /// Replace all sort keys.
    fn sort_by(&mut self, sorters: Vec<CollectionSortDescriptor>);
}

pub trait SearchableCursor {
    fn search_term(&self) -> Option<&str>;
    fn search(&mut self, term: Option<String>);
}

/// Restricts emitted items to an inclusion mask.
pub trait MaskableCursor {
    fn mask(&self) -> &[String];
    fn set_mask(&mut self, pointers: Vec<String>);
}

/// Column-addressed filtering and sorting.
pub trait ColumnizedCursor: FilterableCursor + SortableCursor {
    fn columns(&self) -> &[ColumnDescriptor];
    fn set_columns(&mut self, columns: Vec<ColumnDescriptor>);

    /// # Errors
    ///
    /// `ColumnNotFound` if no column has this id.
    fn column(&self, id: &str) -> Result<&ColumnDescriptor, CursorError> {
        self.columns()
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| CursorError::ColumnNotFound { id: id.to_string() })
    }

    /// Sort by a single column, replacing other sort keys.
    fn sort_by_column(&mut self, id: &str, direction: SortDirection) -> Result<(), CursorError> {
        let column = self.column(id)?;
        if !column.sortable {
            return Err(CursorError::ColumnNotSortable { id: id.to_string() });
        }
        let sorter = CollectionSortDescriptor::new(column.path.clone(), direction);
        self.sort_by(vec![sorter]);
        Ok(())
    }

    /// Filter on a column, replacing any earlier filter on the same column.
    fn filter_by_column(
        &mut self,
        id: &str,
        operator: FilterOperator,
        value: Value,
    ) -> Result<(), CursorError> {
        let column = self.column(id)?;
        if !column.filterable {
            return Err(CursorError::ColumnNotFilterable { id: id.to_string() });
        }
        let path = column.path.clone();
        let mut filters: Vec<_> = self
            .filters()
            .iter()
            .filter(|f| f.path != path)
            .cloned()
            .collect();
        filters.push(CollectionFilterDescriptor::new(path, operator, value));
        self.filter_by(filters);
        Ok(())
    }
}

/// Page window bookkeeping shared by every cursor implementation.
pub(crate) struct CursorState {
    pub current: usize,
    pub limit: usize,
    pub count: usize,
    pub total_pages: usize,
    /// Whether `total_pages` is known rather than estimated.
    pub exact_total: bool,
    pub items: Vec<Value>,
    pub loading_state: LoadingState,
    pub dirty: bool,
    observers: Vec<PageObserver>,
}

impl std::fmt::Debug for CursorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorState")
            .field("current", &self.current)
            .field("limit", &self.limit)
            .field("count", &self.count)
            .field("total_pages", &self.total_pages)
            .field("loading_state", &self.loading_state)
            .field("dirty", &self.dirty)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl CursorState {
    pub fn new(limit: usize) -> Self {
        Self {
            current: 1,
            limit,
            count: 0,
            total_pages: 0,
            exact_total: false,
            items: Vec::new(),
            loading_state: LoadingState::Uninitialized,
            dirty: false,
            observers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, observer: PageObserver) {
        self.observers.push(observer);
    }

    pub fn set_limit(&mut self, limit: usize) -> Result<(), CursorError> {
        if limit == 0 {
            return Err(CursorError::InvalidLimit);
        }
        if limit != self.limit {
            self.limit = limit;
            self.dirty = true;
        }
        Ok(())
    }

    fn settled(&self) -> bool {
        matches!(self.loading_state, LoadingState::Ready | LoadingState::Empty)
    }

    /// Validate `page` and enter `Loading`. Returns `false` when the current
    /// page can be served as is.
    pub fn begin(&mut self, page: usize, force: bool) -> Result<bool, CursorError> {
        if page == 0 {
            return Err(CursorError::InvalidPage { page });
        }
        if page == self.current && self.settled() && !force && !self.dirty {
            return Ok(false);
        }
        if self.settled() && !self.dirty && self.exact_total && self.total_pages > 0 {
            self.check_range(page)?;
        }

        self.notify(&PageEvent::Before { page });
        self.loading_state = LoadingState::Loading;
        Ok(true)
    }

    pub fn check_range(&self, page: usize) -> Result<(), CursorError> {
        if self.total_pages > 0 && page > self.total_pages {
            return Err(CursorError::PageOutOfRange {
                page,
                total_pages: self.total_pages,
            });
        }
        Ok(())
    }

    /// Commit a loaded page.
    pub fn commit(&mut self, page: usize, items: Vec<Value>) -> Vec<Value> {
        if items.len() > self.limit {
            tracing::warn!(
                page,
                received = items.len(),
                limit = self.limit,
                "page holds more items than the page size"
            );
        }
        self.current = page;
        self.loading_state = if items.is_empty() {
            LoadingState::Empty
        } else {
            LoadingState::Ready
        };
        self.items = items;
        self.dirty = false;
        self.notify(&PageEvent::After {
            page,
            items: &self.items,
        });
        self.items.clone()
    }

    /// Record a failed load. `current` and `items` keep their last good values.
    pub fn fail(&mut self, error: CursorError) -> CursorError {
        tracing::debug!(error = %error, "page load failed");
        self.loading_state = LoadingState::Error;
        error
    }

    fn notify(&self, event: &PageEvent<'_>) {
        for observer in &self.observers {
            observer(event);
        }
    }
}

pub(crate) fn pages_for(count: usize, limit: usize) -> usize {
    count.div_ceil(limit)
}

/// Apply an inclusion mask to each item. An empty mask keeps items whole.
pub(crate) fn mask_items(items: Vec<Value>, mask: &[String]) -> Result<Vec<Value>, CursorError> {
    if mask.is_empty() {
        return Ok(items);
    }
    items
        .iter()
        .map(|item| Ok(crate::pointer::pointer_inclusion_mask(item, mask)?))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn options_builder() {
        let options = CursorOptions::new().limit(7).max_buffered_items(70);
        assert_eq!(options.limit, 7);
        assert_eq!(options.max_buffered_items, 70);
        assert!(CursorOptions::new().limit(0).validate().is_err());
        assert_eq!(CursorOptions::default().limit, DEFAULT_PAGE_LIMIT);
    }

    #[test]
    fn state_begin_rejects_page_zero() {
        let mut state = CursorState::new(10);
        assert!(matches!(
            state.begin(0, false),
            Err(CursorError::InvalidPage { page: 0 })
        ));
        assert_eq!(state.loading_state, LoadingState::Uninitialized);
    }

    #[test]
    fn state_skips_reload_of_current_page() {
        let mut state = CursorState::new(10);
        assert!(state.begin(1, false).unwrap());
        state.commit(1, vec![json!(1)]);
        assert!(!state.begin(1, false).unwrap());
        assert!(state.begin(1, true).unwrap());
        state.commit(1, vec![json!(1)]);

        state.set_limit(5).unwrap();
        assert!(state.begin(1, false).unwrap());
    }

    #[test]
    fn state_failure_keeps_last_page() {
        let mut state = CursorState::new(10);
        state.begin(1, false).unwrap();
        state.commit(1, vec![json!("a")]);
        state.begin(2, false).unwrap();
        let _ = state.fail(CursorError::Fetch {
            message: "down".into(),
        });
        assert_eq!(state.loading_state, LoadingState::Error);
        assert_eq!(state.current, 1);
        assert_eq!(state.items, vec![json!("a")]);
    }

    #[test]
    fn state_notifies_before_then_after() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let mut state = CursorState::new(10);
        state.subscribe(Box::new(move |event| {
            let entry = match event {
                PageEvent::Before { page } => format!("before {page}"),
                PageEvent::After { page, items } => format!("after {page} {}", items.len()),
            };
            log.lock().unwrap().push(entry);
        }));
        state.begin(3, false).unwrap();
        state.commit(3, vec![json!(1), json!(2)]);
        assert_eq!(*seen.lock().unwrap(), vec!["before 3", "after 3 2"]);
    }

    #[test]
    fn mask_items_applies_inclusion_mask() {
        let items = vec![json!({ "id": 1, "secret": "x" }), json!({ "id": 2 })];
        let masked = mask_items(items.clone(), &["/id".to_string()]).unwrap();
        assert_eq!(masked, vec![json!({ "id": 1 }), json!({ "id": 2 })]);
        assert_eq!(mask_items(items.clone(), &[]).unwrap(), items);
    }

    #[test]
    fn pages_round_up() {
        assert_eq!(pages_for(0, 40), 0);
        assert_eq!(pages_for(40, 40), 1);
        assert_eq!(pages_for(41, 40), 2);
    }
}
