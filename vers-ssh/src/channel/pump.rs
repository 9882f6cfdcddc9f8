//! Moves bytes between an SSH channel and local streams.
//!
//! One loop serves all three ways of running a command: `execute` (no stdin,
//! no resizes), `interactive` (stdin plus resizes) and the streaming session
//! (stdin and outputs are in-memory pipes). The loop owns the channel for the
//! command's lifetime, so reads, writes and window changes never contend.

use std::future::Future;

use log::{debug, trace};
use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use super::pty::TerminalSize;
use super::resize::ResizeWatcher;
use crate::error::{Error, ExecError, Result, TransportError};

const STDIN_CHUNK: usize = 32 * 1024;

/// SSH extended data type for stderr.
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// Something the remote side reported on a session channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    /// Bytes on stdout.
    Stdout(Vec<u8>),

    /// Bytes on stderr.
    Stderr(Vec<u8>),

    /// The command exited.
    ExitStatus(u32),

    /// The command was killed by a signal.
    ExitSignal { signal: String, message: String },
}

/// How the remote command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exit status.
    Status(u32),

    /// Terminating signal.
    Signal { signal: String, message: String },

    /// The channel closed without either.
    Missing,
}

impl ExitOutcome {
    /// `Ok` for status 0, the matching [`ExecError`] otherwise.
    pub fn into_result(self) -> std::result::Result<(), ExecError> {
        match self {
            ExitOutcome::Status(0) => Ok(()),
            ExitOutcome::Status(code) => Err(ExecError::ExitStatus { code }),
            ExitOutcome::Signal { signal, message } => {
                Err(ExecError::ExitSignal { signal, message })
            }
            ExitOutcome::Missing => Err(ExecError::MissingExitStatus),
        }
    }
}

/// Session channel operations used by [`pump`] and the streaming session.
pub trait RemoteChannel: Send + 'static {
    /// Request execution of `command`.
    fn exec(&mut self, command: &str)
    -> impl Future<Output = std::result::Result<(), TransportError>> + Send;

    /// Next event, or `None` once the channel is closed.
    fn next_event(&mut self) -> impl Future<Output = Option<RemoteEvent>> + Send;

    /// Forward bytes to the remote stdin.
    fn send_stdin(&mut self, data: &[u8])
    -> impl Future<Output = std::result::Result<(), TransportError>> + Send;

    /// Signal end of stdin.
    fn send_eof(&mut self) -> impl Future<Output = std::result::Result<(), TransportError>> + Send;

    /// Send a `window-change` request.
    fn resize(
        &mut self,
        size: TerminalSize,
    ) -> impl Future<Output = std::result::Result<(), TransportError>> + Send;

    /// Close the channel.
    fn close(&mut self) -> impl Future<Output = std::result::Result<(), TransportError>> + Send;
}

impl RemoteChannel for Channel<Msg> {
    async fn exec(&mut self, command: &str) -> std::result::Result<(), TransportError> {
        Channel::exec(self, true, command)
            .await
            .map_err(TransportError::Ssh)
    }

    async fn next_event(&mut self) -> Option<RemoteEvent> {
        loop {
            match self.wait().await? {
                ChannelMsg::Data { data } => return Some(RemoteEvent::Stdout(data.to_vec())),
                ChannelMsg::ExtendedData { data, ext } if ext == SSH_EXTENDED_DATA_STDERR => {
                    return Some(RemoteEvent::Stderr(data.to_vec()));
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    return Some(RemoteEvent::ExitStatus(exit_status));
                }
                ChannelMsg::ExitSignal {
                    signal_name,
                    error_message,
                    ..
                } => {
                    return Some(RemoteEvent::ExitSignal {
                        signal: format!("{signal_name:?}"),
                        message: error_message,
                    });
                }
                other => trace!("channel: ignoring {:?}", other),
            }
        }
    }

    async fn send_stdin(&mut self, data: &[u8]) -> std::result::Result<(), TransportError> {
        self.data(data).await.map_err(TransportError::Ssh)
    }

    async fn send_eof(&mut self) -> std::result::Result<(), TransportError> {
        self.eof().await.map_err(TransportError::Ssh)
    }

    async fn resize(&mut self, size: TerminalSize) -> std::result::Result<(), TransportError> {
        self.window_change(size.cols, size.rows, 0, 0)
            .await
            .map_err(TransportError::Ssh)
    }

    async fn close(&mut self) -> std::result::Result<(), TransportError> {
        Channel::close(self).await.map_err(TransportError::Ssh)
    }
}

/// Run the channel to completion.
///
/// Output is copied to `stdout`/`stderr` as it arrives; `stdin` (if any) is
/// forwarded until EOF, which is then passed on; resizes from `resize` become
/// `window-change` requests. Returns once the channel closes, or with
/// [`Error::Cancelled`] as soon as `cancel` fires.
pub async fn pump<C, I, O, E, W>(
    channel: &mut C,
    stdin: Option<I>,
    stdout: &mut O,
    stderr: &mut E,
    resize: &mut W,
    cancel: &CancellationToken,
) -> Result<ExitOutcome>
where
    C: RemoteChannel,
    I: AsyncRead + Unpin + Send,
    O: AsyncWrite + Unpin + Send,
    E: AsyncWrite + Unpin + Send,
    W: ResizeWatcher,
{
    let mut stdin = stdin;
    let mut buf = vec![0u8; STDIN_CHUNK];
    let mut watching = true;
    let mut outcome = ExitOutcome::Missing;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => return Err(Error::Cancelled),

            event = channel.next_event() => match event {
                Some(RemoteEvent::Stdout(data)) => {
                    trace!("pump: {} bytes stdout", data.len());
                    write_out(stdout, &data, cancel).await?;
                }
                Some(RemoteEvent::Stderr(data)) => {
                    trace!("pump: {} bytes stderr", data.len());
                    write_out(stderr, &data, cancel).await?;
                }
                Some(RemoteEvent::ExitStatus(code)) => {
                    debug!("remote exit status {}", code);
                    outcome = ExitOutcome::Status(code);
                }
                Some(RemoteEvent::ExitSignal { signal, message }) => {
                    debug!("remote killed by signal {}", signal);
                    outcome = ExitOutcome::Signal { signal, message };
                }
                // Data may follow the exit status, so only a closed channel ends the loop.
                None => break,
            },

            read = read_stdin(&mut stdin, &mut buf), if stdin.is_some() => match read {
                Ok(0) => {
                    stdin = None;
                    if let Err(e) = channel.send_eof().await {
                        debug!("pump: eof not delivered: {}", e);
                    }
                }
                Ok(n) => {
                    if let Err(e) = channel.send_stdin(&buf[..n]).await {
                        // The remote end is gone; its close will end the loop.
                        debug!("pump: stdin not delivered: {}", e);
                        stdin = None;
                    }
                }
                Err(e) => return Err(ExecError::Io(e).into()),
            },

            size = resize.changed(), if watching => match size {
                Some(size) => {
                    debug!("pump: window change {}x{}", size.cols, size.rows);
                    if let Err(e) = channel.resize(size).await {
                        debug!("pump: window change failed: {}", e);
                    }
                }
                None => watching = false,
            },
        }
    }

    stdout.flush().await.map_err(ExecError::Io)?;
    stderr.flush().await.map_err(ExecError::Io)?;
    Ok(outcome)
}

async fn read_stdin<I: AsyncRead + Unpin>(
    stdin: &mut Option<I>,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    match stdin {
        Some(reader) => reader.read(buf).await,
        None => std::future::pending().await,
    }
}

async fn write_out<O: AsyncWrite + Unpin>(
    out: &mut O,
    data: &[u8],
    cancel: &CancellationToken,
) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        written = async {
            out.write_all(data).await?;
            out.flush().await
        } => written.map_err(|e| ExecError::Io(e).into()),
    }
}
