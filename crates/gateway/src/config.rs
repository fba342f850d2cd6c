use std::fmt::Debug;
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "http://localhost:54321/functions/v1/chat";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_MAX_BUFFERED_BYTES: usize = 1024 * 1024;

/// Builder for [`GatewayConfig`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct GatewayConfigBuilder {
    token: String,
    endpoint: Option<String>,
    model: Option<String>,
    connect_timeout: Option<Duration>,
    idle_timeout: Option<Duration>,
    max_buffered_bytes: Option<usize>,
}

impl GatewayConfigBuilder {
    /// Creates a builder with the given bearer token.
    ///
    /// Requests that carry their own token override this one.
    #[inline]
    pub fn with_token<S: Into<String>>(token: S) -> Self {
        Self {
            token: token.into(),
            endpoint: None,
            model: None,
            connect_timeout: None,
            idle_timeout: None,
            max_buffered_bytes: None,
        }
    }

    /// Sets the full URL of the completion function.
    #[inline]
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the model name. It is omitted from requests when unset, which
    /// lets the gateway pick its own default.
    #[inline]
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets how long to wait for a connection.
    #[inline]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets how long a stream may stay silent before it is abandoned.
    #[inline]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Caps the amount of unterminated or unparsable data a stream may
    /// hold while waiting for the rest of a line.
    #[inline]
    pub fn with_max_buffered_bytes(mut self, max: usize) -> Self {
        self.max_buffered_bytes = Some(max);
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> GatewayConfig {
        GatewayConfig {
            token: self.token,
            endpoint: self
                .endpoint
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            model: self.model,
            connect_timeout: self
                .connect_timeout
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            idle_timeout: self.idle_timeout.unwrap_or(DEFAULT_IDLE_TIMEOUT),
            max_buffered_bytes: self
                .max_buffered_bytes
                .unwrap_or(DEFAULT_MAX_BUFFERED_BYTES),
        }
    }
}

impl Debug for GatewayConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfigBuilder")
            .field("token", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("connect_timeout", &self.connect_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_buffered_bytes", &self.max_buffered_bytes)
            .finish()
    }
}

/// Configuration for the completion gateway.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct GatewayConfig {
    pub(crate) token: String,
    pub(crate) endpoint: String,
    pub(crate) model: Option<String>,
    pub(crate) connect_timeout: Duration,
    pub(crate) idle_timeout: Duration,
    pub(crate) max_buffered_bytes: usize,
}

impl GatewayConfig {
    /// Returns the endpoint requests are posted to.
    #[inline]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("token", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("connect_timeout", &self.connect_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_buffered_bytes", &self.max_buffered_bytes)
            .finish()
    }
}
