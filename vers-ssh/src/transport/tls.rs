//! TLS dialer for the Vers edge.
//!
//! The edge routes on SNI and terminates TLS per VM hostname. The served
//! certificate is **not** verified: authentication of the peer is left to the
//! SSH layer, whose host key is also accepted unconditionally. Possession of
//! the VM's private key is the only credential in play.

use std::net::SocketAddr;
use std::sync::Arc;

use log::debug;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result, TransportError};

/// Open a TLS stream to `hostname:port` with SNI set to `hostname`.
///
/// With `resolve` set, TCP goes to that address and the hostname is only
/// used for SNI. Both the TCP connect and the TLS handshake are raced
/// against `cancel`.
pub async fn dial(
    hostname: &str,
    port: u16,
    resolve: Option<SocketAddr>,
    cancel: &CancellationToken,
) -> Result<TlsStream<TcpStream>> {
    let server_name = ServerName::try_from(hostname.to_string())
        .map_err(|_| TransportError::InvalidServerName(hostname.to_string()))?;
    let connector = TlsConnector::from(Arc::new(client_config()?));

    let dial = async {
        let tcp = match resolve {
            Some(addr) => TcpStream::connect(addr).await,
            None => TcpStream::connect((hostname, port)).await,
        };
        let tcp = tcp.map_err(|source| TransportError::TlsDial {
            host: hostname.to_string(),
            port,
            source,
        })?;
        tcp.set_nodelay(true).ok();

        connector
            .connect(server_name, tcp)
            .await
            .map_err(|source| TransportError::TlsDial {
                host: hostname.to_string(),
                port,
                source,
            })
    };

    let stream = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        stream = dial => stream?,
    };

    debug!("TLS established to {}:{}", hostname, port);
    Ok(stream)
}

/// Client config: TLS 1.2 or newer, any certificate accepted.
fn client_config() -> std::result::Result<ClientConfig, TransportError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
        .with_no_client_auth();

    Ok(config)
}

/// Certificate verifier that accepts any chain for any name.
///
/// Handshake signatures are still checked so the TLS session itself is sound.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
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
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
