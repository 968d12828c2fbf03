//! Broker egress dialer
//!
//! Opens the upstream side of a pairing from a broker URL. Certificate
//! verification is disabled on purpose: the proxy is an interception tool
//! and terminates whatever the broker presents.

use crate::error::{ProxyError, Result};
use crate::transport::websocket::WsStream;
use crate::transport::Connection;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{connect_async_tls_with_config, Connector};
use tracing::debug;
use url::Url;

/// Deadline for the full dial, TLS and WebSocket handshakes included
pub const BROKER_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Certificate verifier that accepts all certificates
///
/// Broker egress never verifies; see the crate docs for the warning.
#[derive(Debug)]
struct NoVerification;

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA1,
            SignatureScheme::ECDSA_SHA1_Legacy,
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
            SignatureScheme::ED448,
        ]
    }
}

fn insecure_tls_config() -> ClientConfig {
    ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoVerification))
        .with_no_client_auth()
}

/// Dials the broker named by `broker_url`.
///
/// The inbound request's query string, when present, replaces the broker
/// URL's query verbatim. Request headers are not forwarded.
///
/// Schemes: `tcp`/`mqtt` (plain, default port 1883), `ssl`/`tls`/`mqtts`
/// (TLS, default port 8883), `ws`/`wss` (WebSocket, subprotocol `mqtt`).
///
/// # Errors
///
/// Returns an error on an unparseable URL, an unsupported scheme, or a dial
/// or handshake failure; every path is bounded by [`BROKER_DIAL_TIMEOUT`].
pub async fn connect_broker(broker_url: &str, query: Option<&str>) -> Result<Connection> {
    let mut url = Url::parse(broker_url)
        .map_err(|err| ProxyError::InvalidUrl(format!("{broker_url}: {err}")))?;
    if query.is_some() {
        url.set_query(query);
    }

    debug!(url = %url, "connecting to broker");

    match url.scheme() {
        "tcp" | "mqtt" => {
            let stream = dial_tcp(&url, 1883).await?;
            Ok(Connection::tcp(stream))
        }
        "ssl" | "tls" | "mqtts" => {
            let host = url_host(&url)?;
            let stream = dial_tcp(&url, 8883).await?;

            let connector = TlsConnector::from(Arc::new(insecure_tls_config()));
            let domain = ServerName::try_from(host.clone())
                .map_err(|_| ProxyError::InvalidUrl(format!("invalid hostname: {host}")))?;
            let tls = timeout(BROKER_DIAL_TIMEOUT, connector.connect(domain, stream))
                .await
                .map_err(|_| ProxyError::ConnectTimeout)?
                .map_err(|err| ProxyError::Connection(format!("TLS handshake failed: {err}")))?;

            Ok(Connection::tls(tls))
        }
        "ws" | "wss" => {
            let mut request = url
                .as_str()
                .into_client_request()
                .map_err(|err| ProxyError::InvalidUrl(format!("{url}: {err}")))?;
            request.headers_mut().insert(
                "Sec-WebSocket-Protocol",
                "mqtt".parse().expect("static header value"),
            );

            let connector = Connector::Rustls(Arc::new(insecure_tls_config()));
            let (ws, _response) = timeout(
                BROKER_DIAL_TIMEOUT,
                connect_async_tls_with_config(request, None, false, Some(connector)),
            )
            .await
            .map_err(|_| ProxyError::ConnectTimeout)?
            .map_err(|err| ProxyError::Connection(format!("WebSocket dial failed: {err}")))?;

            Ok(Connection::websocket(WsStream::new(ws)))
        }
        scheme => Err(ProxyError::InvalidUrl(format!(
            "unsupported broker scheme: {scheme}"
        ))),
    }
}

async fn dial_tcp(url: &Url, default_port: u16) -> Result<TcpStream> {
    let host = url_host(url)?;
    let port = url.port().unwrap_or(default_port);

    let stream = timeout(BROKER_DIAL_TIMEOUT, TcpStream::connect((host.as_str(), port)))
        .await
        .map_err(|_| ProxyError::ConnectTimeout)??;
    stream.set_nodelay(true)?;
    Ok(stream)
}

fn url_host(url: &Url) -> Result<String> {
    url.host_str()
        .map(str::to_string)
        .ok_or_else(|| ProxyError::InvalidUrl(format!("missing host: {url}")))
}
