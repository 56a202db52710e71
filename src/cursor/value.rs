//! Cursor over an in-memory item list.

use async_trait::async_trait;
use serde_json::Value;

use super::{
    mask_items, pages_for, ColumnizedCursor, Cursor, CursorOptions, CursorState,
    FilterableCursor, MaskableCursor, PageObserver, SearchableCursor, SortableCursor,
};
use crate::collection::{sort_collection_with, ItemMatcher};
use crate::pointer::CompiledPointerCache;
use crate::error::CursorError;
use crate::types::{
    CollectionFilterDescriptor, CollectionSortDescriptor, ColumnDescriptor, CursorCapabilities,
    LoadingState, UnknownOperatorPolicy,
};

/// Pages over a `Vec<Value>`.
///
/// Every load re-runs filter, search and sort over the full source, then
/// slices out the requested page.
#[derive(Debug)]
pub struct ValueCursor {
    source: Vec<Value>,
    state: CursorState,
    filters: Vec<CollectionFilterDescriptor>,
    sorters: Vec<CollectionSortDescriptor>,
    search: Option<String>,
    mask: Vec<String>,
    columns: Vec<ColumnDescriptor>,
    policy: UnknownOperatorPolicy,
    /// Filter and sort paths, compiled once across loads.
    pointers: CompiledPointerCache,
}

impl ValueCursor {
    /// # Errors
    ///
    /// `InvalidLimit` if `options.limit` is zero.
    pub fn new(source: Vec<Value>, options: &CursorOptions) -> Result<Self, CursorError> {
        options.validate()?;
        Ok(Self {
            source,
            state: CursorState::new(options.limit),
            filters: Vec::new(),
            sorters: Vec::new(),
            search: None,
            mask: Vec::new(),
            columns: Vec::new(),
            policy: options.unknown_operators,
            pointers: CompiledPointerCache::new(),
        })
    }

    pub fn with_columns(mut self, columns: Vec<ColumnDescriptor>) -> Self {
        self.columns = columns;
        self
    }

    /// The unfiltered source items.
    pub fn source(&self) -> &[Value] {
        &self.source
    }

    /// Source items after filter, search and sort.
    fn view(&mut self) -> Result<Vec<Value>, CursorError> {
        let matcher = ItemMatcher::with_pointers(
            &self.filters,
            self.search.as_deref(),
            self.policy,
            &mut self.pointers,
        )?;
        let mut view = Vec::new();
        for item in &self.source {
            if matcher.matches(item)? {
                view.push(item.clone());
            }
        }
        sort_collection_with(&mut view, &self.sorters, &mut self.pointers);
        Ok(view)
    }

    fn load(&mut self, page: usize) -> Result<Vec<Value>, CursorError> {
        let view = self.view()?;
        let limit = self.state.limit;
        self.state.count = view.len();
        self.state.total_pages = pages_for(view.len(), limit);
        self.state.exact_total = true;
        self.state.check_range(page)?;

        let items = view.into_iter().skip((page - 1) * limit).take(limit).collect();
        mask_items(items, &self.mask)
    }

    fn touch(&mut self) {
        self.state.dirty = true;
    }
}

#[async_trait]
impl Cursor for ValueCursor {
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
        self.state.set_limit(limit)
    }

    fn subscribe(&mut self, observer: PageObserver) {
        self.state.subscribe(observer);
    }

    async fn select(&mut self, page: usize, force: bool) -> Result<Vec<Value>, CursorError> {
        if !self.state.begin(page, force)? {
            return Ok(self.state.items.clone());
        }
        match self.load(page) {
            Ok(items) => Ok(self.state.commit(page, items)),
            Err(e) => Err(self.state.fail(e)),
        }
    }

    async fn all(&mut self, limit: Option<usize>) -> Result<Vec<Value>, CursorError> {
        let mut view = self.view()?;
        if let Some(limit) = limit {
            view.truncate(limit);
        }
        mask_items(view, &self.mask)
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

impl FilterableCursor for ValueCursor {
    fn filters(&self) -> &[CollectionFilterDescriptor] {
        &self.filters
    }

    fn filter_by(&mut self, filters: Vec<CollectionFilterDescriptor>) {
        self.filters = filters;
        self.touch();
    }
}

impl SortableCursor for ValueCursor {
    fn sorters(&self) -> &[CollectionSortDescriptor] {
        &self.sorters
    }

    fn sort_by(&mut self, sorters: Vec<CollectionSortDescriptor>) {
        self.sorters = sorters;
        self.touch();
    }
}

impl SearchableCursor for ValueCursor {
    fn search_term(&self) -> Option<&str> {
        self.search.as_deref()
    }

    fn search(&mut self, term: Option<String>) {
        self.search = term;
        self.touch();
    }
}

impl MaskableCursor for ValueCursor {
    fn mask(&self) -> &[String] {
        &self.mask
    }

    fn set_mask(&mut self, pointers: Vec<String>) {
        self.mask = pointers;
        self.touch();
    }
}

impl ColumnizedCursor for ValueCursor {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    fn set_columns(&mut self, columns: Vec<ColumnDescriptor>) {
        self.columns = columns;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FilterOperator, SortDirection};
    use serde_json::json;

    fn numbered(n: usize) -> Vec<Value> {
        (0..n).map(|i| json!({ "id": i, "even": i % 2 == 0 })).collect()
    }

    fn cursor(n: usize, limit: usize) -> ValueCursor {
        ValueCursor::new(numbered(n), &CursorOptions::new().limit(limit)).unwrap()
    }

    fn ids(items: &[Value]) -> Vec<u64> {
        items.iter().filter_map(|i| i["id"].as_u64()).collect()
    }

    #[tokio::test]
    async fn paths_compile_once_across_loads() {
        let mut c = cursor(12, 3);
        c.filter_by(vec![CollectionFilterDescriptor::new(
            "/even",
            FilterOperator::Equals,
            true,
        )]);
        c.sort_by(vec![CollectionSortDescriptor::new("id", SortDirection::Desc)]);
        for page in 1..=2 {
            c.select(page, false).await.unwrap();
        }
        assert_eq!(ids(c.items()), vec![4, 2, 0]);
        assert_eq!(c.pointers.len(), 2);
    }

    #[tokio::test]
    async fn empty_source_is_empty_for_any_page() {
        let mut c = cursor(0, 10);
        assert!(c.select(1, false).await.unwrap().is_empty());
        assert_eq!(c.loading_state(), LoadingState::Empty);
        assert!(c.select(4, false).await.unwrap().is_empty());
        assert_eq!(c.loading_state(), LoadingState::Empty);
        assert!(!c.has_next());
    }

    #[tokio::test]
    async fn exactly_limit_items_is_one_page() {
        let mut c = cursor(10, 10);
        assert_eq!(c.select(1, false).await.unwrap().len(), 10);
        assert_eq!(c.total_pages(), 1);
        assert_eq!(c.loading_state(), LoadingState::Ready);
        assert!(!c.has_next());
        assert!(!c.has_previous());
    }

    #[tokio::test]
    async fn navigation_and_range() {
        let mut c = cursor(25, 10);
        c.select(1, false).await.unwrap();
        assert_eq!(ids(&c.next().await.unwrap()), (10..20).collect::<Vec<_>>());
        assert_eq!(ids(&c.next().await.unwrap()), (20..25).collect::<Vec<_>>());
        assert!(!c.has_next());

        let err = c.next().await.unwrap_err();
        assert!(matches!(err, CursorError::PageOutOfRange { page: 4, total_pages: 3 }));
        assert_eq!(c.current(), 3);

        c.previous().await.unwrap();
        assert_eq!(c.current(), 2);
        assert!(matches!(
            c.select(0, false).await,
            Err(CursorError::InvalidPage { page: 0 })
        ));
    }

    #[tokio::test]
    async fn filter_search_sort_rerun_from_source() {
        let mut c = cursor(10, 3);
        c.filter_by(vec![CollectionFilterDescriptor::new(
            "/even",
            FilterOperator::Equals,
            true,
        )]);
        c.sort_by(vec![CollectionSortDescriptor::new("id", SortDirection::Desc)]);
        assert_eq!(ids(&c.select(1, false).await.unwrap()), vec![8, 6, 4]);
        assert_eq!(c.count(), 5);

        c.clear_filters();
        assert_eq!(ids(&c.select(1, false).await.unwrap()), vec![9, 8, 7]);

        c.search(Some("7".into()));
        assert_eq!(ids(&c.refresh().await.unwrap()), vec![7]);
    }

    #[tokio::test]
    async fn mask_and_all() {
        let mut c = cursor(5, 2);
        c.set_mask(vec!["/id".into()]);
        assert_eq!(c.select(1, false).await.unwrap()[0], json!({ "id": 0 }));
        assert_eq!(c.all(None).await.unwrap().len(), 5);
        assert_eq!(c.all(Some(2)).await.unwrap(), vec![json!({ "id": 0 }), json!({ "id": 1 })]);
        assert_eq!(c.current(), 1);
    }

    #[tokio::test]
    async fn columns_gate_sort_and_filter() {
        let mut c = cursor(6, 10).with_columns(vec![
            ColumnDescriptor::new("id", "/id"),
            ColumnDescriptor::new("even", "/even").sortable(false),
        ]);
        let columns = c.as_columnized().unwrap();
        columns.sort_by_column("id", SortDirection::Desc).unwrap();
        assert!(matches!(
            columns.sort_by_column("even", SortDirection::Asc),
            Err(CursorError::ColumnNotSortable { .. })
        ));
        assert!(matches!(
            columns.filter_by_column("nope", FilterOperator::Equals, json!(1)),
            Err(CursorError::ColumnNotFound { .. })
        ));
        columns
            .filter_by_column("even", FilterOperator::Equals, json!(false))
            .unwrap();
        columns
            .filter_by_column("even", FilterOperator::Equals, json!(true))
            .unwrap();
        assert_eq!(columns.filters().len(), 1);
        assert_eq!(ids(&c.select(1, false).await.unwrap()), vec![4, 2, 0]);
    }

    #[tokio::test]
    async fn unknown_operator_rejected_fails_load() {
        let mut c = ValueCursor::new(
            numbered(3),
            &CursorOptions::new().unknown_operators(UnknownOperatorPolicy::Reject),
        )
        .unwrap();
        c.select(1, false).await.unwrap();
        c.filter_by(vec![CollectionFilterDescriptor::new(
            "/id",
            FilterOperator::parse("near"),
            1,
        )]);
        assert!(c.refresh().await.is_err());
        assert_eq!(c.loading_state(), LoadingState::Error);
        assert_eq!(c.items().len(), 3);
    }
}
