//! Paginated fetching of one window

use super::types::{FetchedRecord, NextPage, PaginationState};
use crate::catalog::StreamDefinition;
use crate::error::{Error, Result};
use crate::gateway::{Filter, Gateway, QueryRequest};
use crate::partition::SyncWindow;
use crate::types::{JsonValue, RawEntityRecord};
use futures::future::BoxFuture;
use futures::Stream;
use std::collections::VecDeque;
use tracing::{debug, warn};

// ============================================================================
// Offset Pagination
// ============================================================================

/// Offset pagination driven by the result size the gateway reports
///
/// The offset advances by the number of records actually received, so a
/// server that silently returns short pages is paged correctly. An empty
/// page ends pagination even if the reported total says otherwise.
#[derive(Debug, Clone, Copy)]
pub struct OffsetPaginator {
    page_size: u32,
}

impl OffsetPaginator {
    /// Create a paginator
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size.max(1),
        }
    }

    /// Records requested per page
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Account for a received page and decide whether to continue
    pub fn process_page(
        &self,
        received: usize,
        total_count: u64,
        state: &mut PaginationState,
    ) -> NextPage {
        state.pages += 1;
        state.add_fetched(received as u64);
        state.total_count = Some(total_count);

        if received == 0 || state.total_fetched >= total_count {
            state.mark_done();
            return NextPage::Done;
        }

        state.offset = state.offset.saturating_add(received as u32);
        NextPage::Continue {
            offset: state.offset,
        }
    }
}

// ============================================================================
// Query Pager
// ============================================================================

/// Pages through the full result of one query
pub struct QueryPager<'a> {
    gateway: &'a dyn Gateway,
    request: QueryRequest,
    paginator: OffsetPaginator,
    state: PaginationState,
}

impl<'a> QueryPager<'a> {
    /// Create a pager; the request's page size drives pagination
    pub fn new(gateway: &'a dyn Gateway, request: QueryRequest) -> Self {
        let paginator = OffsetPaginator::new(request.page_size);
        let state = PaginationState {
            offset: request.offset,
            ..PaginationState::default()
        };
        Self {
            gateway,
            request,
            paginator,
            state,
        }
    }

    /// Fetch the next page, `None` once the result is exhausted
    pub async fn next_page(&mut self) -> Result<Option<Vec<RawEntityRecord>>> {
        if self.state.done {
            return Ok(None);
        }

        let request = self.request.clone().at_offset(self.state.offset);
        let page = self.gateway.query(&request).await?;
        debug!(
            object = %request.object,
            offset = request.offset,
            received = page.records.len(),
            total = page.total_count,
            "Fetched page"
        );

        self.paginator
            .process_page(page.records.len(), page.total_count, &mut self.state);
        Ok(Some(page.records))
    }

    /// Pagination progress
    pub fn state(&self) -> &PaginationState {
        &self.state
    }
}

// ============================================================================
// Window Fetcher
// ============================================================================

/// Drains one window of a stream, fetching child records for each parent
/// record as soon as it is received and yielding them right after it
pub struct WindowFetcher<'a> {
    gateway: &'a dyn Gateway,
    stream: &'a StreamDefinition,
    entity_id: Option<String>,
    page_size: u32,
    with_children: bool,
    pager: QueryPager<'a>,
    pending: VecDeque<FetchedRecord>,
}

impl<'a> WindowFetcher<'a> {
    /// Create a fetcher for `window` of `stream` within an entity
    pub fn new(
        gateway: &'a dyn Gateway,
        stream: &'a StreamDefinition,
        window: &SyncWindow,
        entity_id: Option<&str>,
        page_size: u32,
    ) -> Self {
        let entity_id = entity_id.map(ToString::to_string);
        let request = window_request(stream, window, entity_id.clone(), page_size);
        Self {
            gateway,
            stream,
            entity_id,
            page_size,
            with_children: stream.has_children(),
            pager: QueryPager::new(gateway, request),
            pending: VecDeque::new(),
        }
    }

    /// Skip child queries
    #[must_use]
    pub fn without_children(mut self) -> Self {
        self.with_children = false;
        self
    }

    /// Next record of the window, `None` when drained
    pub async fn next(&mut self) -> Result<Option<FetchedRecord>> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Ok(Some(record));
            }

            let Some(records) = self.pager.next_page().await? else {
                return Ok(None);
            };

            for record in records {
                let children = if self.with_children {
                    fetch_children(
                        self.gateway,
                        self.stream,
                        &record,
                        self.entity_id.as_deref(),
                        self.page_size,
                    )
                    .await?
                } else {
                    Vec::new()
                };
                self.pending
                    .push_back(FetchedRecord::new(&self.stream.name, record));
                self.pending.extend(children);
            }
        }
    }

    /// Drain the window into a vector
    pub async fn collect(mut self) -> Result<Vec<FetchedRecord>> {
        let mut out = Vec::new();
        while let Some(record) = self.next().await? {
            out.push(record);
        }
        Ok(out)
    }

    /// Lazy stream over the window's records
    pub fn into_stream(self) -> impl Stream<Item = Result<FetchedRecord>> + 'a {
        futures::stream::try_unfold(self, |mut fetcher| async move {
            let next = fetcher.next().await?;
            Ok::<_, Error>(next.map(|record| (record, fetcher)))
        })
    }
}

/// First-page request for a window: fixed filter plus the cursor range for
/// incremental streams, ordered by primary key
pub fn window_request(
    stream: &StreamDefinition,
    window: &SyncWindow,
    entity_id: Option<String>,
    page_size: u32,
) -> QueryRequest {
    let cursor_filter = stream
        .cursor_field()
        .filter(|_| stream.is_incremental())
        .map(|field| window.filter(field));
    let filter = Filter::all(stream.filter.clone().into_iter().chain(cursor_filter));

    QueryRequest::new(&stream.object, page_size)
        .with_filter(filter)
        .with_order_by(&stream.primary_key)
        .with_entity(entity_id)
}

/// Fetch every child record of one parent record, depth-first
fn fetch_children<'a>(
    gateway: &'a dyn Gateway,
    parent: &'a StreamDefinition,
    record: &'a RawEntityRecord,
    entity_id: Option<&'a str>,
    page_size: u32,
) -> BoxFuture<'a, Result<Vec<FetchedRecord>>> {
    Box::pin(async move {
        let mut out = Vec::new();
        if !parent.has_children() {
            return Ok(out);
        }

        let Some(parent_key) = record.get(&parent.primary_key).and_then(scalar_text) else {
            warn!(
                stream = %parent.name,
                "Record without {}, skipping child fetch",
                parent.primary_key
            );
            return Ok(out);
        };

        for child in &parent.children {
            let Some(link) = child.parent_key_field.as_deref() else {
                continue;
            };
            let filter = Filter::all(
                child
                    .filter
                    .clone()
                    .into_iter()
                    .chain([Filter::equal(link, parent_key.clone())]),
            );
            let request = QueryRequest::new(&child.object, page_size)
                .with_filter(filter)
                .with_order_by(&child.primary_key)
                .with_entity(entity_id.map(ToString::to_string));

            let mut pager = QueryPager::new(gateway, request);
            while let Some(records) = pager.next_page().await? {
                for mut child_record in records {
                    inherit_cursor(parent, child, record, &mut child_record);
                    let nested =
                        fetch_children(gateway, child, &child_record, entity_id, page_size).await?;
                    out.push(FetchedRecord::new(&child.name, child_record));
                    out.extend(nested);
                }
            }
        }
        Ok(out)
    })
}

/// Children without their own cursor value take the parent's
fn inherit_cursor(
    parent: &StreamDefinition,
    child: &StreamDefinition,
    parent_record: &RawEntityRecord,
    child_record: &mut RawEntityRecord,
) {
    let (Some(parent_field), Some(child_field)) = (parent.cursor_field(), child.cursor_field())
    else {
        return;
    };
    let missing = child_record
        .get(child_field)
        .and_then(scalar_text)
        .is_none();
    if missing {
        if let Some(value) = parent_record.get(parent_field) {
            child_record.insert(child_field.to_string(), value.clone());
        }
    }
}

/// Non-empty text of a scalar value
fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
