//! Synchronous client core for the Recurly v2 XML API.
//!
//! # Overview
//! Builds authenticated `HttpRequest` values, executes them through a
//! pluggable `Transport`, and classifies each `HttpResponse` into either a
//! decoded `Response` or one variant of a closed `Error` taxonomy. List
//! endpoints are walked with a cursor-driven `Pager`.
//!
//! # Design
//! - `Nullable<T>` distinguishes "omit this field" from "send the zero
//!   value", which the remote API relies on for partial updates.
//! - `RequestBuilder` holds an immutable `ClientConfig`; there is no
//!   process-wide key or subdomain.
//! - `classify` is a pure function of the response, so it is tested
//!   directly against recorded vectors.
//! - Resource modules are thin functions over `Client`; they declare which
//!   fields to encode, the `xml` module decides how.

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod null;
pub mod pager;
pub mod pagination;
pub mod request;
pub mod resources;
pub mod response;
pub mod transport;
pub mod xml;

pub use client::Client;
pub use config::ClientConfig;
pub use context::{CancellationToken, Context};
pub use error::{Error, Result, TransactionFailure, ValidationError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use null::{NullBool, NullFloat, NullInt, NullTime, NullValue, Nullable};
pub use pager::Pager;
pub use pagination::{Cursors, ListOptions, Order, Sort};
pub use request::{Query, RequestBuilder};
pub use response::{classify, RateLimit, Response};
pub use transport::{Transport, UreqTransport};
pub use xml::{Element, FromXml, ToXml, XmlWriter};
