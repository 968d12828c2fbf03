//! Pairing of a client endpoint and a broker endpoint
//!
//! The channel runs both pipes, one worker each. Any pipe terminating
//! cancels the shared token, so one side dying takes the pairing down;
//! there is no value in a half-open session.

use crate::error::{ProxyError, Result};
use crate::proxy::endpoint::Endpoint;
use crate::proxy::errors::Errors;
use crate::proxy::pipe::Nozzle;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Channel configuration: the two endpoints of a pairing
#[derive(Default, Clone)]
pub struct ChannelConfig {
    pub client_endpoint: Option<Arc<Endpoint>>,
    pub broker_endpoint: Option<Arc<Endpoint>>,
}

impl ChannelConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_client_endpoint(mut self, endpoint: Arc<Endpoint>) -> Self {
        self.client_endpoint = Some(endpoint);
        self
    }

    #[must_use]
    pub fn with_broker_endpoint(mut self, endpoint: Arc<Endpoint>) -> Self {
        self.broker_endpoint = Some(endpoint);
        self
    }
}

/// Client and broker endpoints under one cancel scope
pub struct Channel {
    config: ChannelConfig,
}

impl Channel {
    #[must_use]
    pub fn new(config: ChannelConfig) -> Self {
        Self { config }
    }

    /// Takes the client pipe's output for consuming.
    ///
    /// # Errors
    ///
    /// Fails when the client endpoint is unset or the nozzle already taken.
    pub fn client_nozzle(&self) -> Result<Nozzle> {
        self.config
            .client_endpoint
            .as_ref()
            .ok_or(ProxyError::ClientEndpointNotSet)?
            .take_nozzle()
    }

    /// Takes the broker pipe's output for consuming.
    ///
    /// # Errors
    ///
    /// Fails when the broker endpoint is unset or the nozzle already taken.
    pub fn broker_nozzle(&self) -> Result<Nozzle> {
        self.config
            .broker_endpoint
            .as_ref()
            .ok_or(ProxyError::BrokerEndpointNotSet)?
            .take_nozzle()
    }

    /// Runs both pipes to termination.
    ///
    /// Each worker records its pipe's terminal status and cancels the
    /// shared token; the call returns only after both workers finished.
    ///
    /// # Errors
    ///
    /// Pre-flight only: `ClientEndpointNotSet` / `BrokerEndpointNotSet`
    /// when an endpoint is missing, `PipeNotSet` when a pipe was already
    /// taken. Pipe terminations are reported through the returned
    /// [`Errors`], never as `Err`.
    pub async fn run(&self, cancel: CancellationToken) -> Result<Errors> {
        let client = self
            .config
            .client_endpoint
            .as_ref()
            .ok_or(ProxyError::ClientEndpointNotSet)?;
        let broker = self
            .config
            .broker_endpoint
            .as_ref()
            .ok_or(ProxyError::BrokerEndpointNotSet)?;

        let client_pipe = client.take_pipe()?;
        let broker_pipe = broker.take_pipe()?;

        let errs = Errors::new();

        let client_worker = tokio::spawn({
            let errs = errs.clone();
            let cancel = cancel.clone();
            async move {
                let status = client_pipe.run(cancel.clone()).await;
                errs.add(ProxyError::Pipe(status));
                cancel.cancel();
            }
        });

        let broker_worker = tokio::spawn({
            let errs = errs.clone();
            let cancel = cancel.clone();
            async move {
                let status = broker_pipe.run(cancel.clone()).await;
                errs.add(ProxyError::Pipe(status));
                cancel.cancel();
            }
        });

        let _ = client_worker.await;
        let _ = broker_worker.await;

        Ok(errs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::endpoint::EndpointConfig;
    use crate::transport::Connection;

    fn duplex_endpoint() -> Arc<Endpoint> {
        let (near, far) = tokio::io::duplex(64);
        // Closing the far side immediately gives the pipe a quick EOF.
        drop(far);
        Arc::new(
            Endpoint::new(EndpointConfig::new().with_conn(Connection::duplex(near))).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_missing_client_endpoint() {
        let channel = Channel::new(ChannelConfig::new());
        let err = channel.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ProxyError::ClientEndpointNotSet));
    }

    #[tokio::test]
    async fn test_missing_broker_endpoint() {
        let channel = Channel::new(
            ChannelConfig::new().with_client_endpoint(duplex_endpoint()),
        );
        let err = channel.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ProxyError::BrokerEndpointNotSet));
    }

    #[tokio::test]
    async fn test_both_pipe_terminations_recorded() {
        let channel = Channel::new(
            ChannelConfig::new()
                .with_client_endpoint(duplex_endpoint())
                .with_broker_endpoint(duplex_endpoint()),
        );

        // Nozzles are drained so the pipes can publish their Ready markers.
        let mut client_nozzle = channel.client_nozzle().unwrap();
        let mut broker_nozzle = channel.broker_nozzle().unwrap();
        tokio::spawn(async move { while client_nozzle.recv().await.is_some() {} });
        tokio::spawn(async move { while broker_nozzle.recv().await.is_some() {} });

        let errs = channel.run(CancellationToken::new()).await.unwrap();
        assert_eq!(errs.len(), 2);
        assert!(errs.to_string().contains("pipe error"));
    }
}
