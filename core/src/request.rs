//! Authenticated request construction.
//!
//! # Design
//! `RequestBuilder` is created once per client from a `ClientConfig`. It
//! pre-encodes the Basic credential, so every request it builds carries the
//! same `Authorization` header. Paths are relative and always rooted under
//! the `v2/` prefix; each `/`-separated segment is percent-encoded on the way
//! in. Query entries with empty values are dropped, which is how optional
//! list parameters are expressed throughout the resource modules.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::http::{HttpMethod, HttpRequest};
use crate::xml::{self, ToXml};

pub const API_VERSION_PREFIX: &str = "v2/";
pub const XML_MEDIA_TYPE: &str = "application/xml";
pub const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";
pub const USER_AGENT: &str = concat!("recurly-core/", env!("CARGO_PKG_VERSION"));

/// Ordered query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `set`.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Insert or replace a parameter.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.pairs.iter_mut().find(|(existing, _)| existing == key) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.pairs.iter().position(|(existing, _)| existing == key)?;
        Some(self.pairs.remove(index).1)
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Query {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut query = Query::new();
        for (key, value) in iter {
            let key: String = key.into();
            query.set(&key, value);
        }
        query
    }
}

/// `{collection}/{id}` for a single resource. The identifier must be one
/// non-empty path segment, otherwise the request would address the
/// collection or some other resource.
pub fn resource_path(collection: &str, id: &str) -> Result<String> {
    if id.trim().is_empty() || id.contains('/') {
        return Err(Error::InvalidIdentifier(id.to_string()));
    }
    Ok(format!("{collection}/{id}"))
}

/// Builds `HttpRequest` values for one configured site.
#[derive(Clone)]
pub struct RequestBuilder {
    api_root: Url,
    authorization: String,
}

impl std::fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("api_root", &self.api_root.as_str())
            .finish_non_exhaustive()
    }
}

impl RequestBuilder {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let api_root = config
            .base_url()?
            .join(API_VERSION_PREFIX)
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self {
            api_root,
            authorization: format!("Basic {}", STANDARD.encode(config.api_key())),
        })
    }

    /// Absolute `.../v2/` URL every request path is resolved against.
    pub fn api_root(&self) -> &Url {
        &self.api_root
    }

    /// Value of the `Authorization` header sent with every request.
    pub fn authorization(&self) -> &str {
        &self.authorization
    }

    /// Resolve a relative path and query against the API root.
    pub fn url(&self, path: &str, query: &Query) -> Result<Url> {
        let mut url = self.api_root.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| Error::Config(format!("{} cannot hold a path", self.api_root)))?;
            segments
                .pop_if_empty()
                .extend(path.split('/').filter(|segment| !segment.is_empty()));
        }
        let mut pairs = query.iter().filter(|(_, value)| !value.is_empty()).peekable();
        if pairs.peek().is_some() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Ok(url)
    }

    /// Build a request; a body is serialized before anything is sent.
    pub fn build(
        &self,
        method: HttpMethod,
        path: &str,
        query: &Query,
        body: Option<&dyn ToXml>,
    ) -> Result<HttpRequest> {
        let url = self.url(path, query)?;
        let mut headers = vec![
            ("Authorization".to_string(), self.authorization.clone()),
            ("Accept".to_string(), XML_MEDIA_TYPE.to_string()),
            ("User-Agent".to_string(), USER_AGENT.to_string()),
        ];
        let body = match body {
            Some(value) => {
                headers.push(("Content-Type".to_string(), XML_CONTENT_TYPE.to_string()));
                Some(xml::to_document(value)?)
            }
            None => None,
        };
        Ok(HttpRequest {
            method,
            url: url.into(),
            headers,
            body,
        })
    }
}
