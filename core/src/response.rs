//! Response classification.
//!
//! # Design
//! `classify` is a pure function from `HttpResponse` to either a `Response`
//! or an `Error`. Header metadata (rate limit, cursors, record count) is
//! read before the status is inspected, so it is available on every path:
//!
//! | status         | outcome                                               |
//! |----------------|-------------------------------------------------------|
//! | 200-299        | `Ok(Response)`, body decoded later by the caller      |
//! | 429            | `Error::RateLimited`, body ignored                    |
//! | 400-499        | `Error::TransactionFailed` or `Error::Validation`     |
//! | 500-599        | `Error::Server`, body ignored                          |
//! | anything else  | `Ok(Response)`, no decoding forced                     |
//!
//! For 4xx bodies the root tag decides: `<error>` is one validation error,
//! `<errors>` is a list unless it also embeds `<transaction_error>`, and any
//! other tag (or no body) is a validation failure with zero errors.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result, TransactionFailure, ValidationError};
use crate::http::HttpResponse;
use crate::pagination::{parse_link_header, Cursors};
use crate::resources::transactions::{Transaction, TransactionError};
use crate::xml::{Element, FromXml};

pub const HEADER_RATE_LIMIT: &str = "X-RateLimit-Limit";
pub const HEADER_RATE_REMAINING: &str = "X-RateLimit-Remaining";
pub const HEADER_RATE_RESET: &str = "X-RateLimit-Reset";
pub const HEADER_LINK: &str = "Link";
pub const HEADER_RECORDS: &str = "X-Records";

/// Rate-limit state reported by the server. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RateLimit {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimit {
    /// Missing or malformed headers read as zero / unknown.
    pub fn from_headers(response: &HttpResponse) -> Self {
        let number = |name: &str| response.header(name).and_then(|v| v.trim().parse::<u32>().ok());
        Self {
            limit: number(HEADER_RATE_LIMIT).unwrap_or_default(),
            remaining: number(HEADER_RATE_REMAINING).unwrap_or_default(),
            reset_at: response
                .header(HEADER_RATE_RESET)
                .and_then(|v| v.trim().parse::<i64>().ok())
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        }
    }
}

/// A classified non-error response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    rate_limit: RateLimit,
    cursors: Cursors,
    records: Option<u64>,
}

impl Response {
    fn from_raw(raw: HttpResponse) -> Self {
        let rate_limit = RateLimit::from_headers(&raw);
        // Relations may be split across several Link fields.
        let links: Vec<&str> = raw.header_values(HEADER_LINK).collect();
        let cursors = if links.is_empty() {
            Cursors::default()
        } else {
            parse_link_header(&links.join(","))
        };
        let records = raw.header(HEADER_RECORDS).and_then(|v| v.trim().parse().ok());
        Self {
            status: raw.status,
            headers: raw.headers,
            body: raw.body,
            rate_limit,
            cursors,
            records,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn rate_limit(&self) -> &RateLimit {
        &self.rate_limit
    }

    pub fn next_cursor(&self) -> Option<&str> {
        self.cursors.next.as_deref()
    }

    pub fn prev_cursor(&self) -> Option<&str> {
        self.cursors.prev.as_deref()
    }

    /// Total matching records from `X-Records`, when the server sent it.
    pub fn record_count(&self) -> Option<u64> {
        self.records
    }

    /// Raw body bytes, for binary payloads such as PDFs.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Decode the body; an empty body is a decode error.
    pub fn decode<T: FromXml>(&self) -> Result<T> {
        self.decode_optional()?
            .ok_or_else(|| Error::Decode(format!("HTTP {} response has an empty body", self.status)))
    }

    /// Decode the body, treating an empty body as `None`.
    pub fn decode_optional<T: FromXml>(&self) -> Result<Option<T>> {
        Element::parse(&self.body)?.map(|root| T::from_xml(&root)).transpose()
    }

    /// Decode every child of the root element; an empty body is an empty list.
    pub fn decode_list<T: FromXml>(&self) -> Result<Vec<T>> {
        match Element::parse(&self.body)? {
            Some(root) => root.items(),
            None => Ok(Vec::new()),
        }
    }
}

/// Map a completed HTTP exchange onto a response or a classified error.
pub fn classify(raw: HttpResponse) -> Result<Response> {
    let response = Response::from_raw(raw);
    let status = response.status;
    let rate_limit = response.rate_limit;
    debug!(status, remaining = rate_limit.remaining, "classifying response");

    match status {
        200..=299 => Ok(response),
        429 => {
            warn!(limit = rate_limit.limit, reset_at = ?rate_limit.reset_at, "rate limit exceeded");
            Err(Error::RateLimited(rate_limit))
        }
        400..=499 => Err(client_error(&response)?),
        500..=599 => {
            warn!(status, "server error");
            Err(Error::Server { status, rate_limit })
        }
        _ => Ok(response),
    }
}

/// Interpret a 4xx body. Decode failures are returned as `Err`, the
/// classified API error as `Ok`.
fn client_error(response: &Response) -> Result<Error> {
    let status = response.status;
    let rate_limit = response.rate_limit;
    let validation = |errors| Error::Validation {
        status,
        errors,
        rate_limit,
    };

    let Some(root) = Element::parse(&response.body)? else {
        return Ok(validation(Vec::new()));
    };
    match root.name.as_str() {
        "error" => Ok(validation(vec![ValidationError::from_xml(&root)?])),
        "errors" => {
            let errors = root
                .children_named("error")
                .map(ValidationError::from_xml)
                .collect::<Result<Vec<_>>>()?;
            match root.child("transaction_error") {
                Some(detail) => Ok(Error::TransactionFailed(Box::new(TransactionFailure {
                    status,
                    rate_limit,
                    transaction: root.child("transaction").map(Transaction::from_xml).transpose()?,
                    error: TransactionError::from_xml(detail)?,
                    errors,
                }))),
                None => Ok(validation(errors)),
            }
        }
        _ => Ok(validation(Vec::new())),
    }
}

impl FromXml for ValidationError {
    /// Accepts both `<error field="..." symbol="...">text</error>` and the
    /// single-error layout with `<symbol>` and `<description>` children.
    fn from_xml(element: &Element) -> Result<Self> {
        let pick = |name: &str| {
            element
                .attr(name)
                .map(str::to_string)
                .unwrap_or_else(|| element.child_text(name))
        };
        let description = match element.child("description") {
            Some(description) => description.text.clone(),
            None => element.text.clone(),
        };
        Ok(ValidationError {
            field: pick("field"),
            symbol: pick("symbol"),
            description,
        })
    }
}
