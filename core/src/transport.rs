//! The network seam.
//!
//! # Design
//! `Transport` executes one `HttpRequest` and returns the raw
//! `HttpResponse`; it never interprets status codes. 4xx and 5xx responses
//! come back as data so `classify` sees every status. `UreqTransport` is the
//! default implementation; tests substitute scripted transports.
//!
//! `UreqTransport` runs the blocking round-trip on a worker thread and waits
//! on a channel, waking every `CANCEL_POLL_INTERVAL` to look at the context.
//! A canceled token abandons the worker and returns at once; the worker is
//! left to finish or time out on its own.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// How often a waiting call checks its context for cancellation.
pub const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Executes HTTP requests. Implementations must be safe to share between
/// concurrent calls.
pub trait Transport: Send + Sync {
    /// Perform the round-trip. The context's deadline bounds this exchange
    /// and a canceled token should end it as soon as possible.
    fn execute(&self, request: &HttpRequest, ctx: &Context) -> Result<HttpResponse>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, request: &HttpRequest, ctx: &Context) -> Result<HttpResponse> {
        (**self).execute(request, ctx)
    }
}

/// Blocking transport backed by a pooled `ureq::Agent`.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
    timeout: Option<Duration>,
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(None)
    }
}

impl UreqTransport {
    /// `timeout` caps every round-trip, whatever deadline the caller passes.
    pub fn new(timeout: Option<Duration>) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build()
            .new_agent();
        Self { agent, timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// The tighter of the configured cap and the time left on the context.
pub(crate) fn effective_timeout(configured: Option<Duration>, remaining: Option<Duration>) -> Option<Duration> {
    match (configured, remaining) {
        (Some(configured), Some(remaining)) => Some(configured.min(remaining)),
        (configured, remaining) => configured.or(remaining),
    }
}

fn prepare<B>(
    mut builder: ureq::RequestBuilder<B>,
    request: &HttpRequest,
    timeout: Option<Duration>,
) -> ureq::RequestBuilder<B> {
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if timeout.is_some() {
        builder = builder.config().timeout_global(timeout).build();
    }
    builder
}

fn round_trip(agent: &ureq::Agent, request: &HttpRequest, timeout: Option<Duration>) -> Result<HttpResponse> {
    let url = request.url.as_str();
    let result = match (request.method, request.body.as_deref()) {
        (HttpMethod::Get, _) => prepare(agent.get(url), request, timeout).call(),
        (HttpMethod::Head, _) => prepare(agent.head(url), request, timeout).call(),
        (HttpMethod::Delete, _) => prepare(agent.delete(url), request, timeout).call(),
        (HttpMethod::Post, Some(body)) => prepare(agent.post(url), request, timeout).send(body.as_bytes()),
        (HttpMethod::Post, None) => prepare(agent.post(url), request, timeout).send_empty(),
        (HttpMethod::Put, Some(body)) => prepare(agent.put(url), request, timeout).send(body.as_bytes()),
        (HttpMethod::Put, None) => prepare(agent.put(url), request, timeout).send_empty(),
    };
    let mut response = result.map_err(|e| Error::Transport(e.to_string()))?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    let body = if request.method == HttpMethod::Head {
        Vec::new()
    } else {
        response
            .body_mut()
            .read_to_vec()
            .map_err(|e| Error::Transport(e.to_string()))?
    };
    debug!(status, bytes = body.len(), "received response");

    Ok(HttpResponse { status, headers, body })
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest, ctx: &Context) -> Result<HttpResponse> {
        let timeout = effective_timeout(self.timeout, ctx.remaining());
        let agent = self.agent.clone();
        let owned = request.clone();
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("recurly-http".to_string())
            .spawn(move || {
                // The receiver is gone when the call was abandoned.
                let _ = tx.send(round_trip(&agent, &owned, timeout));
            })
            .map_err(|e| Error::Transport(format!("failed to start request worker: {e}")))?;

        loop {
            match rx.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(result) => return result,
                Err(RecvTimeoutError::Timeout) if ctx.is_canceled() => {
                    debug!(url = %request.url, "abandoning canceled request");
                    return Err(Error::Canceled);
                }
                Err(RecvTimeoutError::Timeout) if ctx.is_expired() => {
                    debug!(url = %request.url, "abandoning request past its deadline");
                    return Err(Error::DeadlineExceeded);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Transport("request worker exited without a response".to_string()));
                }
            }
        }
    }
}
