//! HTTP transport for feeds.
//!
//! Requests pass through a fixed handler chain, innermost first:
//! 1. `TransportHandler` sends the request with reqwest
//! 2. `AuthenticationHandler` answers 401 challenges with feed credentials
//! 3. `ProxyAuthenticationHandler` answers 407 challenges (proxy configured only)
//! 4. `DiagnosticsHandler` records one event pair per request

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue, PROXY_AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::capability::{HttpSourceCapability, cancellable};
use crate::diagnostics::SourceDiagnostics;
use crate::error::ResourceError;
use crate::registry::{ProviderDescriptor, ResourceProvider, SourceRepository};
use crate::source::{Credentials, PackageSource};

const USER_AGENT: &str = concat!("feedscope/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(100);

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

impl HttpRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// One layer of the HTTP pipeline.
#[async_trait]
pub trait HttpHandler: Send + Sync {
    async fn send(
        &self,
        request: HttpRequest,
        token: &CancellationToken,
    ) -> Result<HttpResponse, ResourceError>;
}

/// Innermost handler: performs the network call.
#[derive(Debug, Clone)]
pub struct TransportHandler {
    client: reqwest::Client,
}

impl TransportHandler {
    /// Build a client for `source`, routed through its proxy if any.
    ///
    /// Proxy credentials are sent up front: a 407 on an https `CONNECT`
    /// surfaces as a connect error, never as a response.
    pub fn new(source: &PackageSource) -> Result<Self, ResourceError> {
        let origin = source.display_address();
        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT);
        if let Some(settings) = source.proxy() {
            let mut proxy = reqwest::Proxy::all(settings.url.as_str())
                .map_err(|e| ResourceError::http(settings.url.as_str(), e))?;
            if let Some(credentials) = &settings.credentials {
                proxy = proxy.basic_auth(&credentials.username, &credentials.password);
            }
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| ResourceError::http(&origin, e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpHandler for TransportHandler {
    async fn send(
        &self,
        request: HttpRequest,
        token: &CancellationToken,
    ) -> Result<HttpResponse, ResourceError> {
        let url = request.url.to_string();
        cancellable(token, async {
            let response = self
                .client
                .request(request.method, request.url)
                .headers(request.headers)
                .send()
                .await
                .map_err(|e| ResourceError::http(&url, e))?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|e| ResourceError::http(&url, e))?;
            Ok(HttpResponse {
                status,
                headers,
                body: body.to_vec(),
            })
        })
        .await
    }
}

fn basic_auth(credentials: &Credentials) -> Result<HeaderValue, ResourceError> {
    let encoded = STANDARD.encode(format!(
        "{}:{}",
        credentials.username, credentials.password
    ));
    let mut value = HeaderValue::from_str(&format!("Basic {encoded}"))
        .map_err(|e| ResourceError::invalid_payload("credentials", e))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Retry a challenged request once with a basic credentials header.
async fn retry_on_challenge(
    inner: &dyn HttpHandler,
    request: HttpRequest,
    token: &CancellationToken,
    challenge: StatusCode,
    header: HeaderName,
    credentials: Option<&Credentials>,
) -> Result<HttpResponse, ResourceError> {
    let retry = credentials
        .filter(|_| !request.headers.contains_key(&header))
        .map(|c| (request.clone(), c));

    let response = inner.send(request, token).await?;
    match retry {
        Some((mut request, credentials)) if response.status == challenge => {
            tracing::debug!(url = %request.url, status = %challenge, "Retrying with credentials");
            request.headers.insert(header, basic_auth(credentials)?);
            inner.send(request, token).await
        }
        _ => Ok(response),
    }
}

/// Answers `401 Unauthorized` with the feed's credentials.
pub struct AuthenticationHandler {
    inner: Arc<dyn HttpHandler>,
    credentials: Option<Credentials>,
}

impl AuthenticationHandler {
    pub fn new(inner: Arc<dyn HttpHandler>, credentials: Option<Credentials>) -> Self {
        Self { inner, credentials }
    }
}

#[async_trait]
impl HttpHandler for AuthenticationHandler {
    async fn send(
        &self,
        request: HttpRequest,
        token: &CancellationToken,
    ) -> Result<HttpResponse, ResourceError> {
        retry_on_challenge(
            self.inner.as_ref(),
            request,
            token,
            StatusCode::UNAUTHORIZED,
            AUTHORIZATION,
            self.credentials.as_ref(),
        )
        .await
    }
}

/// Answers `407 Proxy Authentication Required` with the proxy's credentials.
pub struct ProxyAuthenticationHandler {
    inner: Arc<dyn HttpHandler>,
    credentials: Option<Credentials>,
}

impl ProxyAuthenticationHandler {
    pub fn new(inner: Arc<dyn HttpHandler>, credentials: Option<Credentials>) -> Self {
        Self { inner, credentials }
    }
}

#[async_trait]
impl HttpHandler for ProxyAuthenticationHandler {
    async fn send(
        &self,
        request: HttpRequest,
        token: &CancellationToken,
    ) -> Result<HttpResponse, ResourceError> {
        retry_on_challenge(
            self.inner.as_ref(),
            request,
            token,
            StatusCode::PROXY_AUTHENTICATION_REQUIRED,
            PROXY_AUTHORIZATION,
            self.credentials.as_ref(),
        )
        .await
    }
}

/// Outermost handler: traces each request in the source's diagnostics.
pub struct DiagnosticsHandler {
    inner: Arc<dyn HttpHandler>,
    diagnostics: Arc<SourceDiagnostics>,
}

impl DiagnosticsHandler {
    pub fn new(inner: Arc<dyn HttpHandler>, diagnostics: Arc<SourceDiagnostics>) -> Self {
        Self { inner, diagnostics }
    }
}

#[async_trait]
impl HttpHandler for DiagnosticsHandler {
    async fn send(
        &self,
        request: HttpRequest,
        token: &CancellationToken,
    ) -> Result<HttpResponse, ResourceError> {
        let operation = format!("{} {}", request.method, request.url);
        self.diagnostics
            .trace_async("HttpSource", &operation, self.inner.send(request, token))
            .await
    }
}

/// Wrap `transport` in the handler chain for `source`.
pub fn build_handler_chain(
    source: &PackageSource,
    transport: Arc<dyn HttpHandler>,
    diagnostics: Option<Arc<SourceDiagnostics>>,
) -> Arc<dyn HttpHandler> {
    let mut handler: Arc<dyn HttpHandler> = Arc::new(AuthenticationHandler::new(
        transport,
        source.credentials().cloned(),
    ));
    if let Some(proxy) = source.proxy() {
        handler = Arc::new(ProxyAuthenticationHandler::new(
            handler,
            proxy.credentials.clone(),
        ));
    }
    if let Some(diagnostics) = diagnostics {
        handler = Arc::new(DiagnosticsHandler::new(handler, diagnostics));
    }
    handler
}

/// HTTP access to one feed.
pub struct HttpSource {
    base_url: Url,
    handler: Arc<dyn HttpHandler>,
}

impl HttpSource {
    pub fn new(base_url: Url, handler: Arc<dyn HttpHandler>) -> Self {
        Self { base_url, handler }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn send(
        &self,
        request: HttpRequest,
        token: &CancellationToken,
    ) -> Result<HttpResponse, ResourceError> {
        self.handler.send(request, token).await
    }

    /// GET `url`. `404` is `None`, any other non-success status an error.
    pub async fn get_bytes(
        &self,
        url: &Url,
        token: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, ResourceError> {
        let response = self.send(HttpRequest::get(url.clone()), token).await?;
        if response.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status.is_success() {
            return Err(ResourceError::Status {
                url: url.to_string(),
                status: response.status.as_u16(),
            });
        }
        Ok(Some(response.body))
    }

    /// GET and deserialize a JSON document. `404` is `None`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        token: &CancellationToken,
    ) -> Result<Option<T>, ResourceError> {
        let Some(body) = self.get_bytes(url, token).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| ResourceError::invalid_payload(url.as_str(), e))
    }
}

impl std::fmt::Debug for HttpSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSource")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

/// Builds the [`HttpSource`] of HTTP feeds.
pub struct HttpSourceProvider {
    descriptor: ProviderDescriptor,
    transport: Option<Arc<dyn HttpHandler>>,
}

impl HttpSourceProvider {
    pub fn new() -> Self {
        Self {
            descriptor: ProviderDescriptor::new::<HttpSourceCapability>("HttpSource").last(),
            transport: None,
        }
    }

    /// Replace the network transport, keeping the rest of the chain.
    pub fn with_transport(transport: Arc<dyn HttpHandler>) -> Self {
        Self {
            transport: Some(transport),
            ..Self::new()
        }
    }
}

impl Default for HttpSourceProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceProvider<HttpSourceCapability> for HttpSourceProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn try_create(
        &self,
        repository: &SourceRepository,
        _token: &CancellationToken,
    ) -> Result<Option<Arc<HttpSource>>, ResourceError> {
        let source = repository.source();
        let Some(url) = source.url() else {
            return Ok(None);
        };
        let transport: Arc<dyn HttpHandler> = match &self.transport {
            Some(transport) => Arc::clone(transport),
            None => Arc::new(TransportHandler::new(source)?),
        };
        let handler = build_handler_chain(source, transport, repository.diagnostics());
        Ok(Some(Arc::new(HttpSource::new(url.clone(), handler))))
    }
}
