//! Cursor composition through the public API.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hyperschema_nav::{
    filter_collection_by, search_collection, sort_collection_by, CollectionFilterDescriptor,
    Cursor, CursorCapabilities, CursorError, CursorOptions, EndpointCursor, FilterOperator,
    FilterableCursor, LoadingState, NavigatorOptions, PageEvent, PageFetcher, PageRequest,
    PageResponse, SchemaHyperlinkDescriptor, SchemaNavigator, SortDirection, StreamingCursor,
    ValueCursor,
};
use serde_json::{json, Value};

fn items(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| json!({ "id": i, "kind": if i % 3 == 0 { "fizz" } else { "plain" } }))
        .collect()
}

fn ids(items: &[Value]) -> Vec<u64> {
    items.iter().filter_map(|i| i["id"].as_u64()).collect()
}

/// Serves `items` like a remote list endpoint, honouring filters, search and
/// sort from the request. Records every request.
struct ListEndpoint {
    items: Vec<Value>,
    report_count: bool,
    requests: Mutex<Vec<PageRequest>>,
}

impl ListEndpoint {
    fn new(items: Vec<Value>, report_count: bool) -> Arc<Self> {
        Arc::new(Self {
            items,
            report_count,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn hrefs(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.href.clone())
            .collect()
    }
}

#[async_trait]
impl PageFetcher for ListEndpoint {
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResponse, CursorError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut view = filter_collection_by(&self.items, &request.filters);
        if let Some(term) = &request.search {
            view = search_collection(&view, term);
        }
        sort_collection_by(&mut view, &request.sorters);
        let count = view.len();
        let page = view
            .into_iter()
            .skip((request.page - 1) * request.limit)
            .take(request.limit)
            .collect();
        Ok(PageResponse {
            items: page,
            count: self.report_count.then_some(count),
        })
    }
}

fn list_link() -> SchemaHyperlinkDescriptor {
    SchemaHyperlinkDescriptor::new("list", "/things{?page,limit}")
}

fn endpoint(
    fetcher: Arc<ListEndpoint>,
    caps: CursorCapabilities,
    limit: usize,
) -> EndpointCursor {
    EndpointCursor::new(
        fetcher,
        list_link(),
        json!({}),
        caps,
        &CursorOptions::new().limit(limit),
    )
    .unwrap()
}

mod streaming_over_endpoint {
    use super::*;

    #[tokio::test]
    async fn fifteen_items_in_pages_of_seven() {
        let remote = ListEndpoint::new(items(15), false);
        let parent = endpoint(Arc::clone(&remote), CursorCapabilities::none(), 3);
        let mut cursor =
            StreamingCursor::new(Box::new(parent), &CursorOptions::new().limit(7)).unwrap();

        assert_eq!(ids(&cursor.select(1, false).await.unwrap()), (0..7).collect::<Vec<_>>());
        assert_eq!(ids(&cursor.next().await.unwrap()), (7..14).collect::<Vec<_>>());
        assert_eq!(ids(&cursor.next().await.unwrap()), vec![14]);
        assert!(cursor.is_exhausted());
        assert_eq!(cursor.total_pages(), 3);
        assert_eq!(cursor.count(), 15);
        assert!(!cursor.has_next());

        // the parent never reported a count, so the last page is found by
        // reading past it
        assert_eq!(remote.hrefs().last().unwrap(), "/things?page=6&limit=3");
    }

    #[tokio::test]
    async fn concatenation_matches_filtered_parent_pages() {
        for (parent_limit, limit) in [(3, 7), (4, 2), (5, 5), (1, 3)] {
            let remote = ListEndpoint::new(items(20), true);
            let parent = endpoint(remote, CursorCapabilities::none(), parent_limit);
            let mut cursor =
                StreamingCursor::new(Box::new(parent), &CursorOptions::new().limit(limit))
                    .unwrap();
            cursor.filter_by(vec![CollectionFilterDescriptor::new(
                "/kind",
                FilterOperator::Equals,
                "plain",
            )]);

            let mut seen = ids(&cursor.select(1, false).await.unwrap());
            while cursor.has_next() {
                seen.extend(ids(&cursor.next().await.unwrap()));
            }

            let expected: Vec<u64> = (0..20).filter(|i| i % 3 != 0).collect();
            assert_eq!(seen, expected, "parent {parent_limit}, limit {limit}");
        }
    }

    #[tokio::test]
    async fn advertised_pages_always_load() {
        let remote = ListEndpoint::new(items(10), true);
        let parent = endpoint(remote, CursorCapabilities::none(), 5);
        let mut cursor =
            StreamingCursor::new(Box::new(parent), &CursorOptions::new().limit(3)).unwrap();
        cursor.filter_by(vec![CollectionFilterDescriptor::new(
            "/id",
            FilterOperator::LessThan,
            3,
        )]);

        assert_eq!(ids(&cursor.select(1, false).await.unwrap()), vec![0, 1, 2]);
        assert!(cursor.has_next());

        let mut pages = 1;
        while cursor.has_next() {
            let page = cursor.next().await.unwrap();
            assert!(page.is_empty());
            pages += 1;
        }
        assert_eq!(pages, 2);
        assert_eq!(cursor.loading_state(), LoadingState::Empty);
        assert_eq!(cursor.total_pages(), 1);
        assert_eq!(cursor.count(), 3);
    }

    #[tokio::test]
    async fn filters_travel_to_capable_endpoint() {
        let remote = ListEndpoint::new(items(10), true);
        let caps = CursorCapabilities {
            filterable: true,
            ..CursorCapabilities::none()
        };
        let parent = endpoint(Arc::clone(&remote), caps, 5);
        let mut cursor =
            StreamingCursor::new(Box::new(parent), &CursorOptions::new().limit(2)).unwrap();
        cursor.filter_by(vec![CollectionFilterDescriptor::new(
            "/kind",
            FilterOperator::Equals,
            "fizz",
        )]);

        assert_eq!(ids(&cursor.select(1, false).await.unwrap()), vec![0, 3]);
        let requests = remote.requests.lock().unwrap();
        assert!(requests.iter().all(|r| r.filters.len() == 1));
    }
}

mod endpoint_cursor {
    use super::*;

    #[tokio::test]
    async fn capabilities_gate_accessors() {
        let remote = ListEndpoint::new(items(3), true);
        let mut cursor = endpoint(remote, CursorCapabilities::none(), 2);
        assert!(cursor.as_filterable().is_none());
        assert!(cursor.as_sortable().is_none());
        assert!(cursor.as_columnized().is_none());
    }

    #[tokio::test]
    async fn counted_endpoint_rejects_pages_past_the_end() {
        let remote = ListEndpoint::new(items(5), true);
        let mut cursor = endpoint(remote, CursorCapabilities::all(), 2);
        cursor.select(1, false).await.unwrap();
        assert_eq!(cursor.total_pages(), 3);
        assert!(matches!(
            cursor.select(4, false).await,
            Err(CursorError::PageOutOfRange { page: 4, total_pages: 3 })
        ));
        assert_eq!(cursor.current(), 1);
    }

    #[tokio::test]
    async fn sort_and_search_are_sent_with_request() {
        let remote = ListEndpoint::new(items(9), true);
        let mut cursor = endpoint(Arc::clone(&remote), CursorCapabilities::all(), 10);
        cursor
            .as_sortable()
            .unwrap()
            .sort_by(vec![hyperschema_nav::CollectionSortDescriptor::new(
                "/id",
                SortDirection::Desc,
            )]);
        cursor.as_searchable().unwrap().search(Some("fizz".into()));

        assert_eq!(ids(&cursor.select(1, false).await.unwrap()), vec![6, 3, 0]);
        let requests = remote.requests.lock().unwrap();
        assert_eq!(requests[0].search.as_deref(), Some("fizz"));
        assert_eq!(requests[0].sorters.len(), 1);
    }
}

mod observers {
    use super::*;

    #[tokio::test]
    async fn before_and_after_each_load() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut cursor = ValueCursor::new(items(5), &CursorOptions::new().limit(2)).unwrap();
        let sink = Arc::clone(&log);
        cursor.subscribe(Box::new(move |event: &PageEvent<'_>| {
            let line = match event {
                PageEvent::Before { page } => format!("before {page}"),
                PageEvent::After { page, items } => format!("after {page} ({})", items.len()),
            };
            sink.lock().unwrap().push(line);
        }));

        cursor.select(1, false).await.unwrap();
        cursor.select(1, false).await.unwrap();
        cursor.select(3, false).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["before 1", "after 1 (2)", "before 3", "after 3 (1)"]
        );
    }
}

mod value_cursor_boundaries {
    use super::*;

    #[tokio::test]
    async fn empty_source_any_page() {
        let mut cursor = ValueCursor::new(Vec::new(), &CursorOptions::new()).unwrap();
        for page in [1, 2, 10] {
            assert!(cursor.select(page, false).await.unwrap().is_empty());
            assert_eq!(cursor.loading_state(), LoadingState::Empty);
        }
    }

    #[tokio::test]
    async fn exactly_limit_items() {
        let mut cursor = ValueCursor::new(items(40), &CursorOptions::new()).unwrap();
        assert_eq!(cursor.select(1, false).await.unwrap().len(), 40);
        assert!(!cursor.has_next());
        assert_eq!(cursor.loading_state(), LoadingState::Ready);
    }

    #[test]
    fn zero_limit_rejected() {
        assert!(matches!(
            ValueCursor::new(items(1), &CursorOptions::new().limit(0)),
            Err(CursorError::InvalidLimit)
        ));
    }
}

mod navigator_columns {
    use super::*;

    #[tokio::test]
    async fn schema_columns_drive_cursor_sorting() {
        let schema = json!({
            "title": "Thing",
            "properties": {
                "id": { "type": "integer" },
                "kind": { "type": "string", "title": "Kind" },
                "parts": { "type": "array" }
            }
        });
        let nav = SchemaNavigator::new(Arc::new(schema), &NavigatorOptions::new()).unwrap();
        let mut cursor = ValueCursor::new(items(7), &CursorOptions::new().limit(3))
            .unwrap()
            .with_columns(nav.columns());

        let columns = cursor.as_columnized().unwrap();
        columns.sort_by_column("id", SortDirection::Desc).unwrap();
        columns
            .filter_by_column("kind", FilterOperator::Equals, json!("plain"))
            .unwrap();
        assert!(matches!(
            columns.sort_by_column("parts", SortDirection::Asc),
            Err(CursorError::ColumnNotSortable { .. })
        ));

        assert_eq!(ids(&cursor.select(1, false).await.unwrap()), vec![5, 4, 2]);
        assert_eq!(cursor.count(), 4);
    }
}
