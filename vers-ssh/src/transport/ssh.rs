//! SSH session layer over the TLS stream, using russh.

use std::path::Path;
use std::sync::Arc;

use log::debug;
use russh::Channel;
use russh::client::{self, Handle, Msg};
use russh::keys::{HashAlg, PrivateKey, PrivateKeyWithHashAlg, PublicKey, decode_secret_key};
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;

use super::config::{HANDSHAKE_TIMEOUT, KeepalivePolicy, VM_USER, VmConfig};
use super::keepalive::{self, SshLink};
use super::tls;
use crate::error::{Result, TransportError};

/// Read and decode an unencrypted OpenSSH or PEM private key.
///
/// The file is re-read on every call; parsed keys are never cached.
pub async fn load_key(path: &Path) -> Result<PrivateKey> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| TransportError::ReadKey {
            path: path.to_path_buf(),
            source,
        })?;
    let text = SecretString::from(text);

    let key = decode_secret_key(text.expose_secret(), None)
        .map_err(|e| TransportError::ParseKey(e.to_string()))?;

    debug!(
        "loaded {} key {}",
        key.algorithm(),
        key.public_key().fingerprint(HashAlg::Sha256)
    );
    Ok(key)
}

/// Dial `{host}.{domain}`, complete the SSH handshake and start keep-alive.
///
/// Key problems fail before any network traffic. The TLS dial follows
/// `cancel`; the handshake is bounded only by [`HANDSHAKE_TIMEOUT`].
pub async fn connect(
    host: &str,
    key_path: &Path,
    config: &VmConfig,
    cancel: &CancellationToken,
) -> Result<Connection> {
    let hostname = config.hostname(host);
    let key = load_key(key_path).await?;

    let stream = tls::dial(&hostname, config.port, config.resolve, cancel).await?;

    let ssh_config = Arc::new(client::Config {
        inactivity_timeout: None,
        keepalive_interval: None,
        ..Default::default()
    });

    // The stream is moved into the handshake; on failure it is dropped,
    // which closes the TLS connection.
    let handshake = async {
        let mut handle = client::connect_stream(ssh_config, stream, VmHandler)
            .await
            .map_err(TransportError::Handshake)?;
        authenticate(&mut handle, VM_USER, key).await?;
        Ok::<_, TransportError>(handle)
    };

    let handle = tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake)
        .await
        .map_err(|_| TransportError::HandshakeTimeout(HANDSHAKE_TIMEOUT))??;

    debug!("SSH session established to {} as {}", hostname, VM_USER);
    Ok(Connection::new(
        VmLink { handle },
        config.keepalive,
        cancel,
    ))
}

/// Public-key authentication with the single loaded key.
async fn authenticate(
    handle: &mut Handle<VmHandler>,
    username: &str,
    key: PrivateKey,
) -> std::result::Result<(), TransportError> {
    // Get the best RSA hash algorithm supported by the server
    let hash_alg = handle
        .best_supported_rsa_hash()
        .await
        .map_err(TransportError::Handshake)?
        .flatten();

    let success = handle
        .authenticate_publickey(username, PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg))
        .await
        .map_err(TransportError::Handshake)?
        .success();

    if !success {
        return Err(TransportError::AuthenticationFailed {
            user: username.to_string(),
        });
    }
    Ok(())
}

/// A live russh connection to one VM.
pub struct VmLink {
    handle: Handle<VmHandler>,
}

impl VmLink {
    /// The underlying russh handle.
    pub fn handle(&self) -> &Handle<VmHandler> {
        &self.handle
    }

    /// Open a new session channel.
    pub async fn open_channel(&self) -> Result<Channel<Msg>> {
        Ok(self
            .handle
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?)
    }
}

impl SshLink for VmLink {
    async fn keepalive(&self) -> std::result::Result<(), TransportError> {
        // `keepalive@openssh.com` with want-reply; resolves once the peer answers.
        self.handle.send_ping().await.map_err(TransportError::Ssh)?;
        // A session that dies mid-probe drops the reply instead of failing it.
        if self.handle.is_closed() {
            return Err(TransportError::Disconnected);
        }
        Ok(())
    }

    async fn disconnect(&self) -> std::result::Result<(), TransportError> {
        if self.handle.is_closed() {
            return Ok(());
        }
        self.handle
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(TransportError::Ssh)
    }
}

/// An established connection plus its keep-alive monitor.
///
/// Owned by exactly one operation. Dropping it stops the monitor; call
/// [`close`](Self::close) to also disconnect.
pub struct Connection<L: SshLink = VmLink> {
    link: Arc<L>,
    keepalive: CancellationToken,
}

impl<L: SshLink> Connection<L> {
    /// Wrap `link` and spawn its keep-alive monitor under a child of `cancel`.
    pub fn new(link: L, policy: KeepalivePolicy, cancel: &CancellationToken) -> Self {
        let link = Arc::new(link);
        let token = cancel.child_token();
        keepalive::spawn(link.clone(), policy, token.clone());
        Self {
            link,
            keepalive: token,
        }
    }

    /// The underlying link.
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Stop the monitor and disconnect. Failures are logged, not returned.
    pub async fn close(&self) {
        self.keepalive.cancel();
        if let Err(e) = self.link.disconnect().await {
            debug!("disconnect failed: {}", e);
        }
    }
}

impl Connection<VmLink> {
    /// Open a new session channel on this connection.
    pub async fn open_channel(&self) -> Result<Channel<Msg>> {
        self.link.open_channel().await
    }
}

impl<L: SshLink> Drop for Connection<L> {
    fn drop(&mut self) {
        self.keepalive.cancel();
    }
}

/// russh client handler for VM connections.
pub struct VmHandler;

impl client::Handler for VmHandler {
    type Error = russh::Error;

    /// Host keys are not verified; see the `transport::tls` module docs.
    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        debug!(
            "accepting host key {}",
            server_public_key.fingerprint(HashAlg::Sha256)
        );
        Ok(true)
    }
}
