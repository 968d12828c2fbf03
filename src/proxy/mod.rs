//! Bidirectional packet plane
//!
//! A [`Proxy`] couples two [`Endpoint`]s through their pipes and
//! processors: each side's consumer loop drains that side's nozzle, runs
//! every packet through the side's processor, and performs the dictated
//! writes (`Forward` to the peer, `Loopback` to the sender). Any terminal
//! event cancels the pairing; every terminal error lands in one [`Errors`]
//! aggregate.

pub mod channel;
pub mod endpoint;
pub mod errors;
pub mod packet;
pub mod pipe;
pub mod processor;

pub use channel::{Channel, ChannelConfig};
pub use endpoint::{Endpoint, EndpointConfig};
pub use errors::Errors;
pub use packet::{Packet, PacketBody, Packets, Route};
pub use pipe::{Nozzle, Pipe, PipeStatus, TimeoutConfig};
pub use processor::{ForwardProcessor, Processor};

use crate::error::{ProxyError, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Which side of the pairing a consumer loop serves
#[derive(Debug, Clone, Copy)]
enum Side {
    Client,
    Broker,
}

impl Side {
    fn disconnect_error(self) -> ProxyError {
        match self {
            Side::Client => ProxyError::ClientDisconnect,
            Side::Broker => ProxyError::BrokerDisconnect,
        }
    }
}

/// Top-level bidirectional coordinator for one client-broker pairing
pub struct Proxy {
    config: ChannelConfig,
}

impl Proxy {
    #[must_use]
    pub fn new(config: ChannelConfig) -> Self {
        Self { config }
    }

    /// Runs the pairing until terminal.
    ///
    /// Spawns the two consumer loops, drives both pipes through the
    /// channel, and returns only after every task has terminated. The
    /// returned aggregate is never `Err`-like by type: inspect its
    /// rendering or emptiness.
    pub async fn run(&self, cancel: CancellationToken) -> Errors {
        let channel = Channel::new(self.config.clone());
        let errs = Errors::new();
        let mut consumers = Vec::new();

        if let (Some(client), Some(broker)) = (
            self.config.client_endpoint.clone(),
            self.config.broker_endpoint.clone(),
        ) {
            match channel.client_nozzle() {
                Ok(nozzle) => consumers.push(tokio::spawn(consumer_loop(
                    nozzle,
                    client.clone(),
                    broker.clone(),
                    cancel.clone(),
                    errs.clone(),
                    Side::Client,
                ))),
                Err(err) => errs.add(err),
            }
            match channel.broker_nozzle() {
                Ok(nozzle) => consumers.push(tokio::spawn(consumer_loop(
                    nozzle,
                    broker,
                    client,
                    cancel.clone(),
                    errs.clone(),
                    Side::Broker,
                ))),
                Err(err) => errs.add(err),
            }
        }

        match channel.run(cancel.clone()).await {
            Ok(pipe_errs) => errs.absorb(pipe_errs),
            Err(err) => {
                errs.add(err);
                cancel.cancel();
            }
        }

        for consumer in consumers {
            let _ = consumer.await;
        }

        // Teardown closes both connections on every exit path.
        if let Some(client) = &self.config.client_endpoint {
            client.close().await;
        }
        if let Some(broker) = &self.config.broker_endpoint {
            broker.close().await;
        }

        errs
    }
}

/// Drains one nozzle, dispatching each packet until terminal.
async fn consumer_loop(
    mut nozzle: Nozzle,
    this_side: Arc<Endpoint>,
    peer: Arc<Endpoint>,
    cancel: CancellationToken,
    errs: Errors,
    side: Side,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            received = nozzle.recv() => match received {
                None => {
                    errs.add(side.disconnect_error());
                    break;
                }
                Some(packet) => {
                    if let Err(err) = process_packet(&cancel, packet, &this_side, &peer).await {
                        debug!(side = ?side, error = %err, "consumer loop terminating");
                        errs.add(err);
                        break;
                    }
                }
            }
        }
    }
    cancel.cancel();
}

/// Runs one inbound packet through its processor and performs the writes.
///
/// The inbound packet must be `Process`-routed (pipes publish nothing
/// else). Emitted packets are written in order: `Forward` to `peer`,
/// `Loopback` to `loopback`. A processor re-emitting `Process` is a
/// contract violation. Write failures are terminal for the calling loop.
///
/// # Errors
///
/// `InvalidPacketRoute`, `ProcessorNotSet`, `EndpointControlPacketNotSet`,
/// processor errors verbatim, and `Endpoint::send` failures.
pub async fn process_packet(
    cancel: &CancellationToken,
    packet: Packet,
    loopback: &Endpoint,
    peer: &Endpoint,
) -> Result<()> {
    if packet.route() != Route::Process {
        return Err(ProxyError::InvalidPacketRoute(packet.route()));
    }

    let processor = loopback.processor().ok_or(ProxyError::ProcessorNotSet)?;
    let emitted = processor.process(cancel, packet).await?;

    for outbound in emitted {
        match outbound.route() {
            Route::Process => return Err(ProxyError::InvalidPacketRoute(Route::Process)),
            Route::Forward => {
                let control = outbound
                    .control_packet()
                    .ok_or(ProxyError::EndpointControlPacketNotSet)?;
                peer.send(control).await?;
            }
            Route::Loopback => {
                let control = outbound
                    .control_packet()
                    .ok_or(ProxyError::EndpointControlPacketNotSet)?;
                loopback.send(control).await?;
            }
        }
    }

    Ok(())
}
