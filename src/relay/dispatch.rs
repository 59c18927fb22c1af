//! Bounded dispatch in front of the relay client

use axum::body::Bytes;
use tokio::sync::Semaphore;

use super::{
    CircuitBreaker, DispatchConfig, Operation, ProxyResponse, RelayClient, UpstreamConfig,
};
use crate::{Error, Result};

/// Validates, throttles and forwards relay calls
///
/// Outbound calls share a fixed pool of permits; each operation has its own
/// circuit breaker that trips on consecutive no-response failures.
pub struct Dispatcher {
    client: RelayClient,
    permits: Semaphore,
    transcribe_breaker: CircuitBreaker,
    synthesize_breaker: CircuitBreaker,
}

impl Dispatcher {
    /// Wrap an existing client
    #[must_use]
    pub fn new(client: RelayClient, config: DispatchConfig) -> Self {
        let breaker = |operation| {
            CircuitBreaker::new(
                operation,
                config.breaker_failure_threshold,
                config.breaker_open_duration,
            )
        };

        Self {
            client,
            permits: Semaphore::new(config.max_concurrent_requests.max(1)),
            transcribe_breaker: breaker(Operation::Transcribe),
            synthesize_breaker: breaker(Operation::Synthesize),
        }
    }

    /// Build a client and dispatcher from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the relay client cannot be created
    pub fn from_config(upstream: UpstreamConfig, dispatch: DispatchConfig) -> Result<Self> {
        Ok(Self::new(RelayClient::new(upstream)?, dispatch))
    }

    /// Relay an inbound request; every failure becomes an error response
    ///
    /// `endpoint` is the raw operation token from the caller. Unknown or
    /// missing tokens are rejected before any network activity.
    pub async fn relay(&self, endpoint: Option<&str>, body: Bytes) -> ProxyResponse {
        match self.try_relay(endpoint, body).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(endpoint = ?endpoint, error = %e, "relay failed");
                ProxyResponse::from_error(&e)
            }
        }
    }

    async fn try_relay(&self, endpoint: Option<&str>, body: Bytes) -> Result<ProxyResponse> {
        let operation: Operation = endpoint
            .ok_or_else(|| Error::BadRequest("missing endpoint".to_string()))?
            .parse()?;
        self.dispatch(operation, body).await
    }

    /// Forward a request for a known operation
    ///
    /// # Errors
    ///
    /// Returns `CircuitOpen` when the operation's breaker rejects the call,
    /// otherwise whatever the relay client reports
    pub async fn dispatch(&self, operation: Operation, body: Bytes) -> Result<ProxyResponse> {
        let breaker = self.breaker(operation);
        if !breaker.try_acquire() {
            tracing::warn!(%operation, "circuit open, rejecting call");
            return Err(Error::CircuitOpen(operation));
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::Config("dispatcher permits closed".to_string()))?;

        let result = self.client.forward(operation, body).await;

        match &result {
            Err(Error::NoResponse { .. }) => breaker.record_failure(),
            _ => breaker.record_success(),
        }

        result
    }

    /// Circuit breaker for an operation
    #[must_use]
    pub const fn breaker(&self, operation: Operation) -> &CircuitBreaker {
        match operation {
            Operation::Transcribe => &self.transcribe_breaker,
            Operation::Synthesize => &self.synthesize_breaker,
        }
    }

    /// Permits currently free for outbound calls
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Underlying relay client
    #[must_use]
    pub const fn client(&self) -> &RelayClient {
        &self.client
    }
}
