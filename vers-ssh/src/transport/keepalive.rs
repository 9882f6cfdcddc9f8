//! Keep-alive monitor for established connections.
//!
//! Every `interval` the monitor sends a `keepalive@openssh.com` global request
//! with want-reply set and waits up to one interval for the reply. A reply
//! resets the miss counter; an error or a silent peer counts as a miss. Once
//! `max_misses` consecutive probes miss the link is disconnected and the
//! monitor exits. Nothing is reported to callers: operations still running on
//! the link observe the resulting I/O error instead.

use std::future::Future;
use std::sync::Arc;

use log::{debug, trace, warn};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::config::KeepalivePolicy;
use crate::error::TransportError;

/// The part of an SSH connection the monitor and its owner need.
pub trait SshLink: Send + Sync + 'static {
    /// Send one keep-alive probe and wait for the peer's reply.
    fn keepalive(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Tear the connection down.
    fn disconnect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Spawn a monitor for `link`.
///
/// The task exits when `cancel` fires (leaving the link open) or after the
/// miss threshold is reached (closing it).
pub fn spawn<L: SshLink>(
    link: Arc<L>,
    policy: KeepalivePolicy,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(monitor(link, policy, cancel))
}

async fn monitor<L: SshLink>(link: Arc<L>, policy: KeepalivePolicy, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval_at(
        tokio::time::Instant::now() + policy.interval,
        policy.interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut missed = 0u32;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                trace!("keepalive: cancelled");
                return;
            }
            _ = ticker.tick() => {}
        }

        let probe = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            probe = tokio::time::timeout(policy.interval, link.keepalive()) => {
                probe.unwrap_or(Err(TransportError::KeepaliveTimeout(policy.interval)))
            }
        };

        match probe {
            Ok(()) => missed = 0,
            Err(e) => {
                missed += 1;
                warn!(
                    "keepalive: probe failed ({}/{}): {}",
                    missed, policy.max_misses, e
                );
                if missed >= policy.max_misses {
                    debug!("keepalive: peer unresponsive, closing connection");
                    if let Err(e) = link.disconnect().await {
                        debug!("keepalive: disconnect failed: {}", e);
                    }
                    return;
                }
            }
        }
    }
}
