//! Automated transparent paging of a query.
//!
//! A paginated query yields its result one page at a time; the pager
//! derives each follow-up request from the cursor of the previous page,
//! so a caller sees a single forward-only sequence.

use std::collections::HashMap;

use futures::Stream;
use serde_json::Value;
use tracing::trace;

use crate::client::session::Session;
use crate::errors::ExecutionError;
use crate::response::Page;
use crate::statement::query::Query;

/// Continuation query resuming a set from a cursor.
const PAGINATE_TEMPLATE: &str = "Set.paginate(${after})";

/// Forward-only iterator over the pages of a paginated query.
///
/// Call [`has_next`](QueryPager::has_next) before each
/// [`next_page`](QueryPager::next_page). A pager is a single-consumer
/// object; it holds no synchronization of its own.
pub struct QueryPager<'a> {
    session: &'a Session,
    query: Option<Query>,
}

impl<'a> QueryPager<'a> {
    pub(crate) fn new(session: &'a Session, query: Query) -> Self {
        QueryPager {
            session,
            query: Some(query),
        }
    }

    /// Whether another page can be fetched.
    pub fn has_next(&self) -> bool {
        self.query.is_some()
    }

    /// Fetches the next page of results.
    ///
    /// On failure the pending query is kept, so a transient error can be
    /// retried by calling `next_page` again.
    pub async fn next_page(&mut self) -> Result<Page, ExecutionError> {
        let query = self.query.take().ok_or(ExecutionError::PagerExhausted)?;

        let success = match self.session.query(&query).await {
            Ok(success) => success,
            Err(err) => {
                self.query = Some(query);
                return Err(err);
            }
        };

        let page = Page::from_value(success.data);
        self.query = match page.after.as_deref() {
            Some(cursor) => Some(Self::continuation(&query, cursor)?),
            None => None,
        };
        trace!(
            items = page.data.len(),
            has_next = self.query.is_some(),
            "fetched page"
        );
        Ok(page)
    }

    /// Builds the cursor-continuation query, carrying over the per-query
    /// options of the original.
    fn continuation(query: &Query, cursor: &str) -> Result<Query, ExecutionError> {
        let args = HashMap::from([("after".to_owned(), Value::String(cursor.to_owned()))]);
        let mut next = Query::from_template(PAGINATE_TEMPLATE, &args)
            .map_err(ExecutionError::BadQuery)?;
        next.config = query.config.clone();
        Ok(next)
    }

    /// Adapts the pager into a [`Stream`] of pages, ending after the
    /// last page or on the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Page, ExecutionError>> + 'a {
        futures::stream::try_unfold(self, |mut pager| async move {
            if !pager.has_next() {
                return Ok(None);
            }
            let page = pager.next_page().await?;
            Ok(Some((page, pager)))
        })
    }
}
