//! VM client: one fresh connection per operation.
//!
//! A [`Client`] only names its target. Every operation dials, handshakes,
//! runs, and closes its own connection, on success, error and cancellation
//! alike. Nothing is pooled or shared between calls.

mod builder;
mod session;
mod target;

pub use builder::ClientBuilder;
pub use session::Session;
pub use target::Target;

use std::future::Future;
use std::path::{Path, PathBuf};

use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::channel::{LocalTerminal, NoResize, PtyConfig, RemoteChannel, ResizeWatcher, pump};
use crate::error::{Error, Result};
use crate::sftp;
use crate::transport::{self, Connection, VmConfig};

/// Handle on one VM, identified by its id and private key.
///
/// # Example
///
/// ```rust,no_run
/// use tokio_util::sync::CancellationToken;
/// use vers_ssh::Client;
///
/// # async fn example() -> Result<(), vers_ssh::Error> {
/// let client = Client::new("abc123", "/home/me/.vers/keys/abc123");
/// let cancel = CancellationToken::new();
///
/// let mut stdout = tokio::io::stdout();
/// let mut stderr = tokio::io::stderr();
/// client.execute(&cancel, "uname -a", &mut stdout, &mut stderr).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    host: String,
    key_path: PathBuf,
    config: VmConfig,
}

impl Client {
    /// Create a client for VM `host` with the platform defaults.
    pub fn new(host: impl Into<String>, key_path: impl Into<PathBuf>) -> Self {
        ClientBuilder::new(host, key_path).build()
    }

    /// Start building a client with non-default settings.
    pub fn builder(host: impl Into<String>, key_path: impl Into<PathBuf>) -> ClientBuilder {
        ClientBuilder::new(host, key_path)
    }

    /// The VM id.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Path of the private key.
    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Connection settings.
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// The synthesized TLS/SSH hostname, e.g. `abc123.vm.vers.sh`.
    pub fn hostname(&self) -> String {
        self.config.hostname(&self.host)
    }

    /// Dial and authenticate a new connection.
    ///
    /// The caller owns the result and must [`close`](Connection::close) it.
    pub async fn connect(&self, cancel: &CancellationToken) -> Result<Connection> {
        transport::connect(&self.host, &self.key_path, &self.config, cancel).await
    }

    /// Run `command` to completion, streaming its output.
    ///
    /// The command string is passed to the remote shell as-is; quoting is the
    /// caller's job. A non-zero exit surfaces as an error carrying the code
    /// (see [`Error::exit_code`]). On cancellation this returns
    /// [`Error::Cancelled`] promptly; the remote process may keep running.
    pub async fn execute<O, E>(
        &self,
        cancel: &CancellationToken,
        command: &str,
        stdout: &mut O,
        stderr: &mut E,
    ) -> Result<()>
    where
        O: AsyncWrite + Unpin + Send,
        E: AsyncWrite + Unpin + Send,
    {
        debug!("execute on {}", self.host);
        let conn = self.connect(cancel).await?;
        let result = async {
            let mut channel = until_cancelled(cancel, conn.open_channel()).await?;
            run_command(&mut channel, command, stdout, stderr, cancel).await
        }
        .await;
        conn.close().await;
        result
    }

    /// Run a login shell on a remote PTY, wired to the given streams.
    ///
    /// The PTY is sized from the process's terminal (80x24 if the process
    /// stdin is not a terminal) and follows its resizes, whatever stream is
    /// passed as `stdin`. To probe another stream, call
    /// [`interactive_with`](Self::interactive_with) with
    /// [`LocalTerminal::probe`]. Putting the local terminal in raw mode is
    /// left to the caller; see [`RawModeGuard`](crate::channel::RawModeGuard).
    pub async fn interactive<I, O, E>(
        &self,
        cancel: &CancellationToken,
        stdin: I,
        stdout: &mut O,
        stderr: &mut E,
    ) -> Result<()>
    where
        I: AsyncRead + Unpin + Send,
        O: AsyncWrite + Unpin + Send,
        E: AsyncWrite + Unpin + Send,
    {
        let mut terminal = LocalTerminal::stdin();
        self.interactive_with(cancel, &mut terminal, stdin, stdout, stderr)
            .await
    }

    /// Like [`interactive`](Self::interactive), with an explicit size source.
    pub async fn interactive_with<W, I, O, E>(
        &self,
        cancel: &CancellationToken,
        watcher: &mut W,
        stdin: I,
        stdout: &mut O,
        stderr: &mut E,
    ) -> Result<()>
    where
        W: ResizeWatcher,
        I: AsyncRead + Unpin + Send,
        O: AsyncWrite + Unpin + Send,
        E: AsyncWrite + Unpin + Send,
    {
        debug!("interactive shell on {}", self.host);
        let conn = self.connect(cancel).await?;
        let result = async {
            let mut channel = until_cancelled(cancel, conn.open_channel()).await?;

            let size = watcher.size().unwrap_or_default();
            let pty = PtyConfig::new(self.config.term.clone(), size);
            until_cancelled(cancel, pty.open_shell(&channel)).await?;

            let outcome = pump(&mut channel, Some(stdin), stdout, stderr, watcher, cancel).await?;
            outcome.into_result().map_err(Error::from)
        }
        .await;
        conn.close().await;
        result
    }

    /// Open a connection and a session channel for a command started later.
    ///
    /// If opening the channel fails the connection is closed before returning.
    pub async fn start_session(&self, cancel: &CancellationToken) -> Result<Session> {
        let conn = self.connect(cancel).await?;
        match until_cancelled(cancel, conn.open_channel()).await {
            Ok(channel) => Ok(Session::new(conn, channel, cancel)),
            Err(e) => {
                conn.close().await;
                Err(e)
            }
        }
    }

    /// Copy `local` to `remote` over SFTP.
    ///
    /// Directories require `recursive`. Existing remote files are truncated.
    /// A failure part-way leaves what was already copied in place.
    pub async fn upload(
        &self,
        cancel: &CancellationToken,
        local: impl AsRef<Path>,
        remote: &str,
        recursive: bool,
    ) -> Result<()> {
        let local = local.as_ref();
        debug!("upload {} -> {}:{}", local.display(), self.host, remote);
        let conn = self.connect(cancel).await?;
        let result = async {
            let fs = until_cancelled(cancel, sftp::open(&conn)).await?;
            let copied =
                until_cancelled(cancel, sftp::upload(&fs, local, remote, recursive)).await;
            sftp::close(fs).await;
            copied
        }
        .await;
        conn.close().await;
        result
    }

    /// Copy `remote` to `local` over SFTP.
    ///
    /// Directories require `recursive`. Existing local files are truncated.
    /// A failure part-way leaves what was already copied in place.
    pub async fn download(
        &self,
        cancel: &CancellationToken,
        remote: &str,
        local: impl AsRef<Path>,
        recursive: bool,
    ) -> Result<()> {
        let local = local.as_ref();
        debug!("download {}:{} -> {}", self.host, remote, local.display());
        let conn = self.connect(cancel).await?;
        let result = async {
            let fs = until_cancelled(cancel, sftp::open(&conn)).await?;
            let copied =
                until_cancelled(cancel, sftp::download(&fs, remote, local, recursive)).await;
            sftp::close(fs).await;
            copied
        }
        .await;
        conn.close().await;
        result
    }
}

impl From<Target> for Client {
    fn from(target: Target) -> Self {
        Client::new(target.host, target.key_path)
    }
}

/// Exec `command` on `channel` with an empty stdin and pump it to completion.
pub(crate) async fn run_command<C, O, E>(
    channel: &mut C,
    command: &str,
    stdout: &mut O,
    stderr: &mut E,
    cancel: &CancellationToken,
) -> Result<()>
where
    C: RemoteChannel,
    O: AsyncWrite + Unpin + Send,
    E: AsyncWrite + Unpin + Send,
{
    until_cancelled(cancel, channel.exec(command)).await?;
    let outcome = pump(
        channel,
        Some(tokio::io::empty()),
        stdout,
        stderr,
        &mut NoResize,
        cancel,
    )
    .await?;
    outcome.into_result()?;
    Ok(())
}

/// Await `fut` unless `cancel` fires first.
async fn until_cancelled<T, E, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    E: Into<Error>,
    F: Future<Output = std::result::Result<T, E>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result.map_err(Into::into),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::RemoteEvent;
    use crate::channel::pump::tests::ScriptedChannel;
    use std::time::{Duration, Instant};

    #[test]
    fn test_hostname_synthesis() {
        let client = Client::new("abc123", "/tmp/key");
        assert_eq!(client.hostname(), "abc123.vm.vers.sh");
        assert_eq!(client.host(), "abc123");
        assert_eq!(client.key_path(), Path::new("/tmp/key"));
    }

    #[test]
    fn test_client_from_target() {
        let client = Client::from(Target::new("vm-9", "/keys/vm-9"));
        assert_eq!(client.hostname(), "vm-9.vm.vers.sh");
    }

    #[tokio::test]
    async fn test_execute_missing_key_fails_before_dialing() {
        let client = Client::new("abc123", "/nonexistent/vers/key");
        let err = client
            .execute(
                &CancellationToken::new(),
                "true",
                &mut tokio::io::sink(),
                &mut tokio::io::sink(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("read SSH key:"));
    }

    #[tokio::test]
    async fn test_run_command_exit_codes() {
        for code in [0u32, 1, 2, 127] {
            let mut channel = ScriptedChannel::new([
                RemoteEvent::Stdout(b"out".to_vec()),
                RemoteEvent::ExitStatus(code),
            ]);
            let commands = channel.commands.clone();
            let mut out = Vec::new();
            let result = run_command(
                &mut channel,
                "exit $CODE",
                &mut out,
                &mut tokio::io::sink(),
                &CancellationToken::new(),
            )
            .await;

            assert_eq!(out, b"out");
            assert_eq!(commands.lock().unwrap().as_slice(), ["exit $CODE".to_string()]);
            match code {
                0 => assert!(result.is_ok()),
                n => assert_eq!(result.unwrap_err().exit_code(), Some(n)),
            }
        }
    }

    #[tokio::test]
    async fn test_run_command_closes_stdin() {
        let mut channel = ScriptedChannel::hanging();
        let eof = channel.eof.clone();
        let cancel = CancellationToken::new();
        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                run_command(
                    &mut channel,
                    "cat",
                    &mut tokio::io::sink(),
                    &mut tokio::io::sink(),
                    &cancel,
                )
                .await
            })
        };

        while !*eof.lock().unwrap() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        assert!(task.await.unwrap().unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_run_command_cancellation_is_prompt() {
        // Stands in for `sleep 300` on a VM.
        let mut channel = ScriptedChannel::hanging();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = run_command(
            &mut channel,
            "sleep 300",
            &mut tokio::io::sink(),
            &mut tokio::io::sink(),
            &cancel,
        )
        .await
        .unwrap_err();

        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_until_cancelled_prefers_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = until_cancelled(&cancel, async { Ok::<_, Error>(1) }).await;
        assert!(result.unwrap_err().is_cancelled());
    }
}
