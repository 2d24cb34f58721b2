//! Cursor-driven iteration over list endpoints.
//!
//! # Design
//! A `Pager` is a small state machine: it starts with `has_next() == true`
//! and an optional seed cursor. Each `fetch` sends the current cursor as the
//! `cursor` query parameter, decodes one page, and either stores the next
//! cursor from the `Link` header or marks itself exhausted. Any error also
//! exhausts the pager; it never retries. `fetch` takes `&mut self`, so one
//! pager cannot be driven from two places at once.
//!
//! `count` issues a HEAD request and caches the `X-Records` total.

use tracing::debug;

use crate::client::Client;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::http::HttpMethod;
use crate::request::Query;
use crate::transport::Transport;
use crate::xml::FromXml;

pub const CURSOR_PARAM: &str = "cursor";

pub struct Pager<'c, T> {
    client: &'c Client<T>,
    path: String,
    query: Query,
    cursor: Option<String>,
    has_next: bool,
    pages: u32,
    count: Option<u64>,
}

impl<'c, T: Transport> Pager<'c, T> {
    pub fn new(client: &'c Client<T>, path: &str, mut query: Query) -> Self {
        let cursor = query.remove(CURSOR_PARAM).filter(|cursor| !cursor.is_empty());
        Self {
            client,
            path: path.to_string(),
            query,
            cursor,
            has_next: true,
            pages: 0,
            count: None,
        }
    }

    /// Resume from a cursor obtained elsewhere, e.g. stored by another process.
    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        let cursor = cursor.into();
        self.cursor = (!cursor.is_empty()).then_some(cursor);
        self
    }

    pub fn has_next(&self) -> bool {
        self.has_next
    }

    /// Cursor the next `fetch` will send; `None` on the first page.
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages
    }

    /// Fetch the next page.
    ///
    /// Returns `Error::NoMoreResults` without touching the network once the
    /// last page has been read or a previous fetch failed.
    pub fn fetch<D: FromXml>(&mut self, ctx: &Context) -> Result<Vec<D>> {
        if !self.has_next {
            return Err(Error::NoMoreResults);
        }

        let mut query = self.query.clone();
        if let Some(cursor) = &self.cursor {
            query.set(CURSOR_PARAM, cursor.clone());
        }
        let page = self
            .client
            .execute(ctx, HttpMethod::Get, &self.path, &query, None)
            .and_then(|response| {
                let items = response.decode_list()?;
                Ok((response, items))
            });

        let (response, items) = match page {
            Ok(page) => page,
            Err(err) => {
                self.has_next = false;
                return Err(err);
            }
        };
        self.pages += 1;
        if self.count.is_none() {
            self.count = response.record_count();
        }
        match response.next_cursor() {
            Some(next) => self.cursor = Some(next.to_string()),
            None => self.has_next = false,
        }
        debug!(path = %self.path, page = self.pages, items = items.len(), has_next = self.has_next, "fetched page");
        Ok(items)
    }

    /// Total number of records, from a HEAD request on the first call.
    pub fn count(&mut self, ctx: &Context) -> Result<u64> {
        if let Some(count) = self.count {
            return Ok(count);
        }
        let response = self
            .client
            .execute(ctx, HttpMethod::Head, &self.path, &self.query, None)?;
        let count = response
            .record_count()
            .ok_or_else(|| Error::Decode("response has no X-Records header".to_string()))?;
        self.count = Some(count);
        Ok(count)
    }
}
