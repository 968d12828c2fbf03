//! End-to-end pairing tests: a proxy between two in-memory connections,
//! with the test driving the outer ends as the client and the broker.

use async_trait::async_trait;
use bytes::BytesMut;
use mqtt_intercept::packet::{ConnectPacket, ControlPacket, PublishPacket};
use mqtt_intercept::proxy::{
    ChannelConfig, Endpoint, EndpointConfig, Errors, ForwardProcessor, Packet, PacketBody,
    Packets, Processor, Proxy, Route, TimeoutConfig,
};
use mqtt_intercept::transport::Connection;
use mqtt_intercept::{ProxyError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

fn make_endpoint(
    processor: Arc<dyn Processor>,
    timeouts: TimeoutConfig,
) -> (Arc<Endpoint>, DuplexStream) {
    let (near, far) = tokio::io::duplex(4096);
    let endpoint = Endpoint::new(
        EndpointConfig::new()
            .with_conn(Connection::duplex(near))
            .with_timeouts(timeouts)
            .with_processor(processor),
    )
    .unwrap();
    (Arc::new(endpoint), far)
}

fn forwarding_pair(
    timeouts: TimeoutConfig,
) -> (Proxy, DuplexStream, DuplexStream) {
    let (client_endpoint, client_far) =
        make_endpoint(Arc::new(ForwardProcessor::client()), timeouts);
    let (broker_endpoint, broker_far) =
        make_endpoint(Arc::new(ForwardProcessor::broker()), timeouts);

    let proxy = Proxy::new(
        ChannelConfig::new()
            .with_client_endpoint(client_endpoint)
            .with_broker_endpoint(broker_endpoint),
    );
    (proxy, client_far, broker_far)
}

/// Deadlines short enough that a pipe blocked in an idle read reaches its
/// cancellation-aware publish step quickly during teardown.
fn short_timeouts() -> TimeoutConfig {
    TimeoutConfig::new(Duration::from_secs(1), Duration::from_secs(1))
}

fn encoded(packet: &ControlPacket) -> Vec<u8> {
    let mut buf = BytesMut::new();
    packet.encode(&mut buf).unwrap();
    buf.to_vec()
}

fn run_to_completion(proxy: Proxy, cancel: CancellationToken) -> tokio::task::JoinHandle<Errors> {
    tokio::spawn(async move { proxy.run(cancel).await })
}

#[tokio::test]
async fn test_connect_passes_through_byte_equal() {
    let (proxy, mut client, mut broker) = forwarding_pair(short_timeouts());
    let handle = run_to_completion(proxy, CancellationToken::new());

    let connect = ControlPacket::Connect(ConnectPacket::new("c1").with_username("test"));
    let frame = encoded(&connect);
    client.write_all(&frame).await.unwrap();

    let mut received = vec![0u8; frame.len()];
    timeout(Duration::from_secs(2), broker.read_exact(&mut received))
        .await
        .expect("broker side must receive the CONNECT")
        .unwrap();
    assert_eq!(received, frame);

    drop(client);
    let errs = timeout(Duration::from_secs(5), handle)
        .await
        .expect("proxy must terminate after client close")
        .unwrap();
    assert!(!errs.is_empty());
}

#[tokio::test]
async fn test_packets_forwarded_in_order_both_directions() {
    let (proxy, mut client, mut broker) = forwarding_pair(short_timeouts());
    let handle = run_to_completion(proxy, CancellationToken::new());

    // Client to broker.
    for i in 0..5u8 {
        let publish =
            ControlPacket::Publish(PublishPacket::new("up", vec![i]));
        client.write_all(&encoded(&publish)).await.unwrap();
    }
    for i in 0..5u8 {
        let received = timeout(Duration::from_secs(2), ControlPacket::read(&mut broker))
            .await
            .expect("forwarded publish")
            .unwrap();
        match received {
            ControlPacket::Publish(p) => assert_eq!(p.payload.as_ref(), &[i]),
            other => panic!("expected PUBLISH, got {other:?}"),
        }
    }

    // Broker to client.
    for i in 0..5u8 {
        let publish =
            ControlPacket::Publish(PublishPacket::new("down", vec![i]));
        broker.write_all(&encoded(&publish)).await.unwrap();
    }
    for i in 0..5u8 {
        let received = timeout(Duration::from_secs(2), ControlPacket::read(&mut client))
            .await
            .expect("forwarded publish")
            .unwrap();
        match received {
            ControlPacket::Publish(p) => assert_eq!(p.payload.as_ref(), &[i]),
            other => panic!("expected PUBLISH, got {other:?}"),
        }
    }

    drop(client);
    let _ = timeout(Duration::from_secs(5), handle).await.unwrap();
}

/// Echoes every packet back at the sender.
struct LoopbackProcessor;

#[async_trait]
impl Processor for LoopbackProcessor {
    async fn process(&self, _cancel: &CancellationToken, packet: Packet) -> Result<Packets> {
        let (body, _status, _route) = packet.into_parts();
        let mut packets = Packets::new();
        if let PacketBody::Control(control) = body {
            packets.push(Packet::loopback(control));
        }
        Ok(packets)
    }
}

#[tokio::test]
async fn test_loopback_echoes_sender_and_peer_sees_nothing() {
    let timeouts = short_timeouts();
    let (client_endpoint, mut client) = make_endpoint(Arc::new(LoopbackProcessor), timeouts);
    let (broker_endpoint, mut broker) =
        make_endpoint(Arc::new(ForwardProcessor::broker()), timeouts);

    let proxy = Proxy::new(
        ChannelConfig::new()
            .with_client_endpoint(client_endpoint)
            .with_broker_endpoint(broker_endpoint),
    );
    let handle = run_to_completion(proxy, CancellationToken::new());

    let ping = ControlPacket::PingReq;
    client.write_all(&encoded(&ping)).await.unwrap();

    let echoed = timeout(Duration::from_secs(2), ControlPacket::read(&mut client))
        .await
        .expect("sender must see the echo")
        .unwrap();
    assert_eq!(echoed, ping);

    // The broker side must stay silent.
    let mut buf = [0u8; 1];
    let nothing = timeout(Duration::from_millis(200), broker.read_exact(&mut buf)).await;
    assert!(nothing.is_err());

    drop(client);
    let _ = timeout(Duration::from_secs(5), handle).await.unwrap();
}

/// Violates the route contract by re-emitting `Process`.
struct InvalidRouteProcessor;

#[async_trait]
impl Processor for InvalidRouteProcessor {
    async fn process(&self, _cancel: &CancellationToken, packet: Packet) -> Result<Packets> {
        let (body, _status, _route) = packet.into_parts();
        let mut packets = Packets::new();
        if let PacketBody::Control(control) = body {
            packets.push(Packet::new(control, Route::Process));
        }
        Ok(packets)
    }
}

#[tokio::test]
async fn test_invalid_route_terminates_pairing() {
    let timeouts = short_timeouts();
    let (client_endpoint, mut client) =
        make_endpoint(Arc::new(InvalidRouteProcessor), timeouts);
    let (broker_endpoint, _broker) =
        make_endpoint(Arc::new(ForwardProcessor::broker()), timeouts);

    let proxy = Proxy::new(
        ChannelConfig::new()
            .with_client_endpoint(client_endpoint)
            .with_broker_endpoint(broker_endpoint),
    );
    let handle = run_to_completion(proxy, CancellationToken::new());

    client
        .write_all(&encoded(&ControlPacket::PingReq))
        .await
        .unwrap();

    let errs = timeout(Duration::from_secs(5), handle)
        .await
        .expect("route violation must tear the pairing down")
        .unwrap();
    assert!(errs.any(|err| matches!(err, ProxyError::InvalidPacketRoute(Route::Process))));
}

#[tokio::test]
async fn test_external_cancellation_terminates_promptly() {
    // Both sides produce packets continuously, so every task keeps passing
    // through its cancellation-aware suspension points.
    let (proxy, client, broker) = forwarding_pair(TimeoutConfig::default());
    let cancel = CancellationToken::new();
    let handle = run_to_completion(proxy, cancel.clone());

    let feed = |mut stream: DuplexStream| {
        tokio::spawn(async move {
            let frame = encoded(&ControlPacket::PingReq);
            loop {
                if stream.write_all(&frame).await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
    };
    let client_feeder = feed(client);
    let broker_feeder = feed(broker);

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    // Well within 2x the default read timeout.
    let errs = timeout(Duration::from_secs(2), handle)
        .await
        .expect("cancellation must terminate the pairing promptly")
        .unwrap();
    assert!(!errs.is_empty());
    assert!(errs.any(|err| matches!(
        err,
        ProxyError::Pipe(mqtt_intercept::PipeStatus::Canceled)
    )));

    let _ = timeout(Duration::from_secs(2), client_feeder).await;
    let _ = timeout(Duration::from_secs(2), broker_feeder).await;
}

#[tokio::test]
async fn test_processor_error_lands_in_aggregate() {
    struct FailingProcessor;

    #[async_trait]
    impl Processor for FailingProcessor {
        async fn process(&self, _cancel: &CancellationToken, packet: Packet) -> Result<Packets> {
            if packet.is_ready() {
                return Ok(Packets::new());
            }
            Err(ProxyError::Connection("interceptor rejected packet".to_string()))
        }
    }

    let timeouts = short_timeouts();
    let (client_endpoint, mut client) = make_endpoint(Arc::new(FailingProcessor), timeouts);
    let (broker_endpoint, _broker) =
        make_endpoint(Arc::new(ForwardProcessor::broker()), timeouts);

    let proxy = Proxy::new(
        ChannelConfig::new()
            .with_client_endpoint(client_endpoint)
            .with_broker_endpoint(broker_endpoint),
    );
    let handle = run_to_completion(proxy, CancellationToken::new());

    client
        .write_all(&encoded(&ControlPacket::PingReq))
        .await
        .unwrap();

    let errs = timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    assert!(errs.any(|err| matches!(err, ProxyError::Connection(_))));
}
