//! A completion provider for the AI gateway function.
//!
//! The gateway takes a chat message list and either answers with one JSON
//! object or streams OpenAI-style chunks as `data: {json}` lines ending
//! with `data: [DONE]`.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use mime::Mime;
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};
use serde::de::DeserializeOwned;
use tracing::Instrument;
use zyquence_model::{
    CompletionProvider, CompletionProviderError, CompletionRequest, ErrorKind,
};

pub use config::{GatewayConfig, GatewayConfigBuilder};
use io::{Chunks, Sse, SseLimits};
pub use response::GatewayStream;

/// How much of a rejection body is kept in the error message.
const BODY_EXCERPT_LEN: usize = 200;

/// Error type for [`GatewayProvider`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl CompletionProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Completion provider backed by the AI gateway.
#[derive(Clone, Debug)]
pub struct GatewayProvider {
    client: Client,
    config: Arc<GatewayConfig>,
}

impl GatewayProvider {
    /// Creates a new `GatewayProvider` with the given configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|err| {
                Error::new(
                    format!("failed to create HTTP client: {err}"),
                    ErrorKind::Rejected,
                )
            })?;
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    /// Sends a non-streaming request and decodes the whole body as `T`.
    ///
    /// Used by features that want one structured answer instead of a
    /// growing message. A body that does not match `T` fails with
    /// [`ErrorKind::SchemaMismatch`].
    pub fn complete_json<T: DeserializeOwned + Send + 'static>(
        &self,
        req: &CompletionRequest,
    ) -> impl Future<Output = Result<T, Error>> + Send + 'static {
        let builder = self.build_request(req, false);
        async move {
            let resp = send_checked(builder).await?;
            let body = resp.bytes().await.map_err(|err| {
                Error::new(
                    format!("failed to read the response: {err}"),
                    ErrorKind::Interrupted,
                )
            })?;
            serde_json::from_slice(&body).map_err(|err| {
                Error::new(
                    format!("unexpected response shape: {err}"),
                    ErrorKind::SchemaMismatch,
                )
            })
        }
        .instrument(trace_span!("gateway json req"))
    }

    fn build_request(
        &self,
        req: &CompletionRequest,
        stream: bool,
    ) -> RequestBuilder {
        let body = proto::create_request(req, &self.config, stream);
        let token = req.bearer_token.as_deref().unwrap_or(&self.config.token);
        let accept = if stream {
            "text/event-stream"
        } else {
            "application/json"
        };
        self.client
            .post(&self.config.endpoint)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, accept)
            .json(&body)
    }
}

impl CompletionProvider for GatewayProvider {
    type Error = Error;
    type Stream = GatewayStream;

    fn send_request(
        &self,
        req: &CompletionRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static
    {
        let builder = self.build_request(req, true);
        let limits = SseLimits {
            idle_timeout: self.config.idle_timeout,
            max_buffered_bytes: self.config.max_buffered_bytes,
        };

        async move {
            let resp = send_checked(builder).await?;
            if resp.content_length() == Some(0) {
                return Err(Error::new(
                    "response has no body",
                    ErrorKind::Rejected,
                ));
            }

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_event_stream = content_type
                .and_then(|v| v.parse().ok())
                .map(|m: Mime| m.subtype().as_str() == "event-stream")
                .unwrap_or(false);
            if !is_event_stream {
                warn!("unexpected content type: {content_type:?}");
            }

            // Here we got a successful response.
            let chunks = Chunks::from_response(resp);
            let sse = Sse::new(chunks, limits);
            Ok(GatewayStream::from_sse(sse))
        }
        .instrument(trace_span!("gateway stream req"))
    }
}

/// Sends the request and turns every non-2xx status into an error.
async fn send_checked(builder: RequestBuilder) -> Result<Response, Error> {
    let resp = builder.send().await.map_err(|err| {
        Error::new(format!("request failed: {err}"), ErrorKind::Rejected)
    })?;
    let status = resp.status();
    if status.is_success() {
        debug!("got response: {status}");
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(BODY_EXCERPT_LEN).collect();
    error!("gateway rejected the request: {status}");
    Err(Error::new(
        format!("gateway returned {status}: {}", excerpt.trim()),
        classify_status(status),
    ))
}

#[inline]
fn classify_status(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimited,
        StatusCode::PAYMENT_REQUIRED => ErrorKind::QuotaExhausted,
        _ => ErrorKind::Rejected,
    }
}
