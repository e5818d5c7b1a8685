//! Requests, responses and the network seam.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use tracing::debug;
use url::Url;

use crate::error::{FetchError, RuntimeError};

/// Default timeout for HTTP requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url }
    }

    /// Parses `url` into a GET request.
    pub fn get(url: &str) -> Result<Self, RuntimeError> {
        let url = Url::parse(url).map_err(|e| RuntimeError::invalid_url(url, e))?;
        Ok(Self::new(Method::GET, url))
    }

    /// The key this request is cached under.
    pub fn cache_key(&self) -> &str {
        self.url.as_str()
    }
}

/// A complete response. The body is always fully read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Only 200 responses are ever stored.
    pub fn is_cacheable(&self) -> bool {
        self.status == StatusCode::OK
    }
}

/// Performs network requests for the runtime cache.
///
/// Implementations must resolve only once the whole body has been received;
/// dropping the returned future abandons the request.
pub trait Fetch: Send + Sync + 'static {
    fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response, FetchError>> + Send;
}

impl<T: Fetch> Fetch for Arc<T> {
    fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response, FetchError>> + Send {
        (**self).fetch(request)
    }
}

/// [`Fetch`] over a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher with [`DEFAULT_TIMEOUT`].
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        debug!("{} {} -> {} ({} bytes)", request.method, request.url, status, body.len());

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
