//! Cursor extraction from `Link` headers and list query options.
//!
//! # Design
//! The API never puts cursors in the body. A list response carries a header
//! such as
//!
//! ```text
//! Link: <https://acme.recurly.com/v2/accounts?cursor=1304958672>; rel="next",
//!       <https://acme.recurly.com/v2/accounts>; rel="start"
//! ```
//!
//! and the client passes the `cursor` query parameter back on the next
//! request. Entries that are malformed or lack a cursor are skipped: a
//! missing cursor cannot be told apart from "this is the last page".

use chrono::{DateTime, Utc};
use tracing::debug;
use url::Url;

use crate::null::NullValue;
use crate::request::Query;

/// Next and previous page cursors found in a `Link` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursors {
    pub next: Option<String>,
    pub prev: Option<String>,
}

/// Parse a `Link` header value into page cursors.
pub fn parse_link_header(header: &str) -> Cursors {
    let mut cursors = Cursors::default();
    for entry in split_entries(header) {
        let Some((target, relations)) = parse_entry(entry) else {
            debug!(entry, "skipping malformed Link entry");
            continue;
        };
        let Some(cursor) = cursor_param(target) else {
            debug!(entry, "skipping Link entry without cursor");
            continue;
        };
        for relation in relations {
            match relation {
                "next" => cursors.next = Some(cursor.clone()),
                "prev" => cursors.prev = Some(cursor.clone()),
                _ => {}
            }
        }
    }
    cursors
}

/// Split on commas that are not inside `<...>`.
fn split_entries(header: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut depth = 0_usize;
    let mut start = 0;
    for (index, ch) in header.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                entries.push(&header[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    entries.push(&header[start..]);
    entries
        .into_iter()
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect()
}

/// Split `<url>; rel="a b"; title="x"` into the URL and its relation types.
fn parse_entry(entry: &str) -> Option<(&str, Vec<&str>)> {
    let rest = entry.strip_prefix('<')?;
    let (target, params) = rest.split_once('>')?;
    let params = params.trim_start().strip_prefix(';')?;

    let mut relations = Vec::new();
    for param in params.split(';') {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case("rel") {
            relations.extend(value.trim().trim_matches('"').split_whitespace());
        }
    }
    if relations.is_empty() {
        return None;
    }
    Some((target.trim(), relations))
}

fn cursor_param(target: &str) -> Option<String> {
    // Relative targets are resolved against a placeholder so only the query matters.
    let url = Url::parse(target)
        .or_else(|_| Url::parse("http://link.invalid/").and_then(|base| base.join(target)))
        .ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "cursor")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Sort field for list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sort {
    CreatedAt,
    UpdatedAt,
}

impl Sort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sort::CreatedAt => "created_at",
            Sort::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    pub fn as_str(&self) -> &'static str {
        match self {
            Order::Asc => "asc",
            Order::Desc => "desc",
        }
    }
}

/// Optional filters shared by list endpoints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListOptions {
    pub per_page: Option<u32>,
    pub sort: Option<Sort>,
    pub order: Option<Order>,
    pub state: Option<String>,
    /// Sent as the `type` parameter.
    pub kind: Option<String>,
    pub begin_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Start from a cursor obtained elsewhere instead of the first page.
    pub cursor: Option<String>,
}

impl ListOptions {
    pub fn per_page(per_page: u32) -> Self {
        Self {
            per_page: Some(per_page),
            ..Self::default()
        }
    }

    /// Query parameters, excluding the cursor which the pager owns.
    pub fn to_query(&self) -> Query {
        let mut query = Query::new();
        let mut set = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                query.set(key, value);
            }
        };
        set("per_page", self.per_page.map(|n| n.to_string()));
        set("sort", self.sort.map(|s| s.as_str().to_string()));
        set("order", self.order.map(|o| o.as_str().to_string()));
        set("state", self.state.clone());
        set("type", self.kind.clone());
        set("begin_time", self.begin_time.map(|t| t.to_literal()));
        set("end_time", self.end_time.map(|t| t.to_literal()));
        query
    }
}
