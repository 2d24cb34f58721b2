//! The client: request building, transport and classification in one call.
//!
//! # Design
//! `Client` owns an immutable `RequestBuilder` and a `Transport`. It adds no
//! state of its own, so one client can serve concurrent callers as long as
//! the transport can. Each call has exactly one suspension point, the
//! transport round-trip. The context goes into the transport so a canceled
//! token ends a call in flight, and it is checked again on both sides.

use tracing::debug;

use crate::config::ClientConfig;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::http::{HttpMethod, HttpRequest};
use crate::pager::Pager;
use crate::pagination::ListOptions;
use crate::request::{Query, RequestBuilder};
use crate::response::{classify, Response};
use crate::transport::{Transport, UreqTransport};
use crate::xml::{FromXml, ToXml};

pub struct Client<T = UreqTransport> {
    builder: RequestBuilder,
    transport: T,
}

impl Client<UreqTransport> {
    /// Client backed by a `ureq` agent honouring the configured timeout.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Self::with_transport(config, UreqTransport::new(config.timeout()))
    }
}

impl<T: Transport> Client<T> {
    pub fn with_transport(config: &ClientConfig, transport: T) -> Result<Self> {
        Ok(Self {
            builder: RequestBuilder::new(config)?,
            transport,
        })
    }

    pub fn builder(&self) -> &RequestBuilder {
        &self.builder
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Execute a prepared request and classify the response.
    ///
    /// A token canceled before or during the round-trip yields
    /// `Error::Canceled`, even when the transport also failed.
    pub fn send(&self, ctx: &Context, request: &HttpRequest) -> Result<Response> {
        ctx.check()?;
        debug!(method = %request.method, url = %request.url, "sending request");

        let result = self.transport.execute(request, ctx);
        if ctx.is_canceled() {
            return Err(Error::Canceled);
        }
        let raw = match result {
            Ok(raw) => raw,
            Err(_) if ctx.is_expired() => return Err(Error::DeadlineExceeded),
            Err(err) => return Err(err),
        };
        classify(raw)
    }

    /// Build, send and classify in one step.
    pub fn execute(
        &self,
        ctx: &Context,
        method: HttpMethod,
        path: &str,
        query: &Query,
        body: Option<&dyn ToXml>,
    ) -> Result<Response> {
        let request = self.builder.build(method, path, query, body)?;
        self.send(ctx, &request)
    }

    /// GET a single resource and decode it.
    pub fn get<D: FromXml>(&self, ctx: &Context, path: &str) -> Result<D> {
        self.execute(ctx, HttpMethod::Get, path, &Query::new(), None)?
            .decode()
    }

    /// GET a single resource; `Ok(None)` when the server answers 404.
    pub fn find<D: FromXml>(&self, ctx: &Context, path: &str) -> Result<Option<D>> {
        match self.get(ctx, path) {
            Ok(found) => Ok(Some(found)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// POST a body and decode the created resource.
    pub fn post<D: FromXml>(&self, ctx: &Context, path: &str, body: &dyn ToXml) -> Result<D> {
        self.execute(ctx, HttpMethod::Post, path, &Query::new(), Some(body))?
            .decode()
    }

    /// PUT an optional body and decode the updated resource.
    pub fn put<D: FromXml>(&self, ctx: &Context, path: &str, body: Option<&dyn ToXml>) -> Result<D> {
        self.execute(ctx, HttpMethod::Put, path, &Query::new(), body)?
            .decode()
    }

    /// DELETE a resource; the response body is ignored.
    pub fn delete(&self, ctx: &Context, path: &str) -> Result<()> {
        self.execute(ctx, HttpMethod::Delete, path, &Query::new(), None)
            .map(|_| ())
    }

    /// Start walking a list endpoint. Nothing is fetched until `Pager::fetch`.
    pub fn pager(&self, path: &str, options: &ListOptions) -> Pager<'_, T> {
        let pager = Pager::new(self, path, options.to_query());
        match &options.cursor {
            Some(cursor) => pager.with_cursor(cursor.clone()),
            None => pager,
        }
    }
}
