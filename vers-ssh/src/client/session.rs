//! Streaming session with raw stdin/stdout/stderr pipes.
//!
//! A [`Session`] is a connection plus one session channel whose command is
//! started without blocking. The caller pumps bytes through in-memory pipes
//! (for example to forward output as log events) and later waits for the
//! exit outcome.

use log::debug;
use russh::Channel;
use russh::client::Msg;
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::channel::{ExitOutcome, NoResize, RemoteChannel, pump};
use crate::error::{Error, Result, SessionError};
use crate::transport::{Connection, SshLink, VmLink};

/// Capacity of each pipe. Unread output applies backpressure to the remote.
const PIPE_CAPACITY: usize = 64 * 1024;

/// The pump's ends of the three pipes.
struct PumpEnds {
    stdin: DuplexStream,
    stdout: DuplexStream,
    stderr: DuplexStream,
}

/// A started-or-startable remote command with raw byte pipes.
///
/// # Example
///
/// ```rust,no_run
/// use tokio::io::AsyncReadExt;
/// use tokio_util::sync::CancellationToken;
/// use vers_ssh::Client;
///
/// # async fn example() -> Result<(), vers_ssh::Error> {
/// let client = Client::new("abc123", "/home/me/.vers/keys/abc123");
/// let cancel = CancellationToken::new();
///
/// let mut session = client.start_session(&cancel).await?;
/// let mut stdout = session.take_stdout().expect("stdout not taken yet");
/// session.start("journalctl -f -n 50").await?;
///
/// let mut buf = vec![0u8; 4096];
/// while let Ok(n) = stdout.read(&mut buf).await {
///     if n == 0 {
///         break;
///     }
///     print!("{}", String::from_utf8_lossy(&buf[..n]));
/// }
/// session.wait().await?;
/// session.close().await;
/// # Ok(())
/// # }
/// ```
pub struct Session<C: RemoteChannel = Channel<Msg>, L: SshLink = VmLink> {
    conn: Connection<L>,
    cancel: CancellationToken,
    channel: Option<C>,
    stdin: Option<DuplexStream>,
    stdout: Option<DuplexStream>,
    stderr: Option<DuplexStream>,
    ends: Option<PumpEnds>,
    task: Option<JoinHandle<Result<ExitOutcome>>>,
    closed: tokio::sync::Mutex<bool>,
}

impl<C: RemoteChannel, L: SshLink> Session<C, L> {
    /// Wrap an open channel on `conn`. The session follows a child of `cancel`.
    pub(crate) fn new(conn: Connection<L>, channel: C, cancel: &CancellationToken) -> Self {
        let (stdin, pump_stdin) = tokio::io::duplex(PIPE_CAPACITY);
        let (stdout, pump_stdout) = tokio::io::duplex(PIPE_CAPACITY);
        let (stderr, pump_stderr) = tokio::io::duplex(PIPE_CAPACITY);

        Self {
            conn,
            cancel: cancel.child_token(),
            channel: Some(channel),
            stdin: Some(stdin),
            stdout: Some(stdout),
            stderr: Some(stderr),
            ends: Some(PumpEnds {
                stdin: pump_stdin,
                stdout: pump_stdout,
                stderr: pump_stderr,
            }),
            task: None,
            closed: tokio::sync::Mutex::new(false),
        }
    }

    /// Writer feeding the remote stdin. Dropping it sends EOF.
    ///
    /// Must be taken before [`start`](Self::start); a session started without
    /// it runs with an empty stdin.
    pub fn take_stdin(&mut self) -> Option<DuplexStream> {
        self.stdin.take()
    }

    /// Reader for the remote stdout. Reaches EOF when the command finishes.
    ///
    /// Must be taken before [`start`](Self::start); otherwise the output is
    /// discarded.
    pub fn take_stdout(&mut self) -> Option<DuplexStream> {
        self.stdout.take()
    }

    /// Reader for the remote stderr. Discarded unless taken before `start`.
    pub fn take_stderr(&mut self) -> Option<DuplexStream> {
        self.stderr.take()
    }

    /// Execute `command` and return without waiting for it.
    ///
    /// If the exec request fails the session is left unstarted.
    pub async fn start(&mut self, command: &str) -> Result<()> {
        if *self.closed.get_mut() {
            return Err(SessionError::Closed.into());
        }
        let (Some(mut channel), Some(ends)) = (self.channel.take(), self.ends.take()) else {
            return Err(SessionError::AlreadyStarted.into());
        };

        let started = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            started = channel.exec(command) => started.map_err(Error::from),
        };
        if let Err(e) = started {
            self.channel = Some(channel);
            self.ends = Some(ends);
            return Err(e);
        }
        debug!("session: started command");

        // Nobody will write to stdin; let the remote see EOF.
        self.stdin = None;
        // Output nobody took is drained.
        for unread in [self.stdout.take(), self.stderr.take()].into_iter().flatten() {
            tokio::spawn(discard(unread));
        }

        let cancel = self.cancel.clone();
        self.task = Some(tokio::spawn(async move {
            let PumpEnds {
                stdin,
                mut stdout,
                mut stderr,
            } = ends;
            let outcome = pump(
                &mut channel,
                Some(stdin),
                &mut stdout,
                &mut stderr,
                &mut NoResize,
                &cancel,
            )
            .await;
            if let Err(e) = channel.close().await {
                debug!("session: channel close failed: {}", e);
            }
            outcome
        }));
        Ok(())
    }

    /// Wait for the started command to finish.
    ///
    /// Exit status 0 is `Ok`; anything else is an [`ExecError`](crate::error::ExecError).
    pub async fn wait(&mut self) -> Result<()> {
        let task = self.task.take().ok_or(SessionError::NotStarted)?;

        let pumped = task
            .await
            .map_err(|e| SessionError::TaskFailed(e.to_string()))?;
        let outcome = match pumped {
            Ok(outcome) => outcome,
            Err(Error::Cancelled) if *self.closed.get_mut() => {
                return Err(SessionError::Closed.into());
            }
            Err(e) => return Err(e),
        };
        outcome.into_result()?;
        Ok(())
    }

    /// Stop the command's pump and close the connection.
    ///
    /// Safe to call without [`wait`](Self::wait), repeatedly and concurrently;
    /// only the first call does anything. The remote process is not
    /// guaranteed to be killed.
    pub async fn close(&self) {
        let mut closed = self.closed.lock().await;
        if *closed {
            return;
        }
        *closed = true;

        self.cancel.cancel();
        self.conn.close().await;
        debug!("session: closed");
    }
}

async fn discard(mut reader: DuplexStream) {
    if let Err(e) = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await {
        debug!("session: discarding output failed: {}", e);
    }
}

impl<C: RemoteChannel, L: SshLink> Drop for Session<C, L> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::RemoteEvent;
    use crate::channel::pump::tests::ScriptedChannel;
    use crate::transport::KeepalivePolicy;
    use crate::transport::keepalive::tests::FakeLink;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn session(channel: ScriptedChannel) -> Session<ScriptedChannel, FakeLink> {
        let cancel = CancellationToken::new();
        let conn = Connection::new(FakeLink::default(), KeepalivePolicy::default(), &cancel);
        Session::new(conn, channel, &cancel)
    }

    #[tokio::test]
    async fn test_start_wait_streams_output() {
        let channel = ScriptedChannel::new([
            RemoteEvent::Stdout(b"building...\n".to_vec()),
            RemoteEvent::Stderr(b"warning: unused\n".to_vec()),
            RemoteEvent::ExitStatus(0),
        ]);
        let commands = channel.commands.clone();
        let mut session = session(channel);
        let mut stdout = session.take_stdout().unwrap();
        let mut stderr = session.take_stderr().unwrap();

        session.start("make").await.unwrap();
        session.wait().await.unwrap();

        let mut out = Vec::new();
        stdout.read_to_end(&mut out).await.unwrap();
        let mut err = Vec::new();
        stderr.read_to_end(&mut err).await.unwrap();
        assert_eq!(out, b"building...\n");
        assert_eq!(err, b"warning: unused\n");
        assert_eq!(commands.lock().unwrap().as_slice(), ["make".to_string()]);

        session.close().await;
    }

    #[tokio::test]
    async fn test_wait_surfaces_exit_code() {
        let mut session = session(ScriptedChannel::new([RemoteEvent::ExitStatus(2)]));
        session.start("false").await.unwrap();
        let err = session.wait().await.unwrap_err();
        assert_eq!(err.exit_code(), Some(2));
        session.close().await;
    }

    #[tokio::test]
    async fn test_stdin_pipe_reaches_remote() {
        let channel = ScriptedChannel::hanging();
        let sent = channel.sent.clone();
        let eof = channel.eof.clone();
        let mut session = session(channel);

        let mut stdin = session.take_stdin().unwrap();
        session.start("cat").await.unwrap();
        stdin.write_all(b"line one\n").await.unwrap();
        drop(stdin);

        while !*eof.lock().unwrap() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(sent.lock().unwrap().as_slice(), b"line one\n");

        session.close().await;
        assert!(matches!(
            session.wait().await,
            Err(Error::Session(SessionError::Closed))
        ));
    }

    #[tokio::test]
    async fn test_untaken_stdin_is_closed_on_start() {
        let channel = ScriptedChannel::hanging();
        let eof = channel.eof.clone();
        let mut session = session(channel);

        session.start("cat").await.unwrap();
        assert!(session.take_stdin().is_none());
        while !*eof.lock().unwrap() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        session.close().await;
    }

    #[tokio::test]
    async fn test_untaken_stderr_does_not_stall_stdout() {
        let channel = ScriptedChannel::new([
            RemoteEvent::Stderr(vec![b'w'; 100 * 1024]),
            RemoteEvent::Stdout(b"done\n".to_vec()),
            RemoteEvent::ExitStatus(0),
        ]);
        let mut session = session(channel);
        let mut stdout = session.take_stdout().unwrap();
        session.start("make").await.unwrap();

        let mut out = Vec::new();
        tokio::time::timeout(Duration::from_secs(3), stdout.read_to_end(&mut out))
            .await
            .expect("stdout reached EOF")
            .unwrap();
        assert_eq!(out, b"done\n");
        tokio::time::timeout(Duration::from_secs(1), session.wait())
            .await
            .expect("command finished")
            .unwrap();
        assert!(session.take_stderr().is_none());
        session.close().await;
    }

    #[tokio::test]
    async fn test_failed_exec_leaves_session_unstarted() {
        let mut channel = ScriptedChannel::new([RemoteEvent::ExitStatus(0)]);
        channel.exec_failures = 1;
        let commands = channel.commands.clone();
        let mut session = session(channel);

        assert!(matches!(
            session.start("true").await,
            Err(Error::Transport(_))
        ));
        assert!(matches!(
            session.wait().await,
            Err(Error::Session(SessionError::NotStarted))
        ));

        session.start("true").await.unwrap();
        session.wait().await.unwrap();
        assert_eq!(commands.lock().unwrap().as_slice(), ["true".to_string()]);
        session.close().await;
    }

    #[tokio::test]
    async fn test_misuse_errors() {
        let mut session = session(ScriptedChannel::new([RemoteEvent::ExitStatus(0)]));
        assert!(matches!(
            session.wait().await,
            Err(Error::Session(SessionError::NotStarted))
        ));

        session.start("true").await.unwrap();
        assert!(matches!(
            session.start("true").await,
            Err(Error::Session(SessionError::AlreadyStarted))
        ));
        session.wait().await.unwrap();
        assert!(matches!(
            session.wait().await,
            Err(Error::Session(SessionError::NotStarted))
        ));
        session.close().await;
    }

    #[tokio::test]
    async fn test_concurrent_close_is_idempotent() {
        let session = session(ScriptedChannel::hanging());

        tokio::join!(session.close(), session.close());
        session.close().await;

        assert_eq!(session.conn.link().disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_interrupts_running_command() {
        let channel = ScriptedChannel::hanging();
        let closed = channel.closed.clone();
        let mut session = session(channel);

        session.start("sleep 300").await.unwrap();
        session.close().await;

        assert!(matches!(
            session.wait().await,
            Err(Error::Session(SessionError::Closed))
        ));
        assert!(*closed.lock().unwrap());
        assert_eq!(session.conn.link().disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_start_after_close_fails() {
        let mut session = session(ScriptedChannel::hanging());
        session.close().await;
        assert!(matches!(
            session.start("true").await,
            Err(Error::Session(SessionError::Closed))
        ));
    }
}
