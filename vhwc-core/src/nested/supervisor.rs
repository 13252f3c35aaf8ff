//! Single-viewer connection supervision.
//!
//! The supervisor owns the listening socket and runs the accept loop on a
//! dedicated task. Exactly one remote viewer is served at a time: while a
//! peer is installed the loop does not accept, so a second viewer waits in
//! the listen backlog until the first is torn down.
//!
//! ```text
//!  Listening ──► Accepting ──► Connected
//!                    ▲              │
//!                    └── peer lost ─┘
//!  (any) ──► Closed
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::HwcError;

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

// ── ConnectionPhase ──────────────────────────────────────────────

/// Where the supervisor is in its accept/serve cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    /// Bound, accept loop not started yet.
    #[default]
    Listening,

    /// Waiting in `accept()` for a viewer.
    Accepting,

    /// Serving one viewer.
    Connected {
        peer: SocketAddr,
        /// When the viewer was accepted.
        since: Instant,
    },

    /// Listener and peer closed. Terminal.
    Closed,
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Listening => write!(f, "Listening"),
            Self::Accepting => write!(f, "Accepting"),
            Self::Connected { peer, .. } => write!(f, "Connected({peer})"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

impl ConnectionPhase {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        match self {
            Self::Connected { peer, .. } => Some(*peer),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Accepting`.
    ///
    /// Valid from: `Listening`, `Connected` (peer lost).
    pub fn begin_accept(&mut self) -> Result<(), HwcError> {
        match self {
            Self::Listening | Self::Connected { .. } => {
                *self = Self::Accepting;
                Ok(())
            }
            _ => Err(HwcError::ProtocolViolation(
                "cannot accept: not in Listening or Connected state",
            )),
        }
    }

    /// Transition to `Connected`.
    ///
    /// Valid from: `Accepting`.
    pub fn connect(&mut self, peer: SocketAddr) -> Result<(), HwcError> {
        match self {
            Self::Accepting => {
                *self = Self::Connected {
                    peer,
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(HwcError::ProtocolViolation(
                "cannot connect: not in Accepting state",
            )),
        }
    }

    /// Force the terminal state regardless of current state.
    pub fn close(&mut self) {
        *self = Self::Closed;
    }
}

// ── PeerLink ─────────────────────────────────────────────────────

/// The connected viewer. Its presence in the slot is the readiness flag.
#[derive(Debug)]
pub(crate) struct Peer {
    pub(crate) stream: TcpStream,
    pub(crate) addr: SocketAddr,
}

/// Shared view of the peer slot, held by the frame path.
///
/// Holding the slot lock for a whole send keeps the supervisor from
/// swapping or closing the stream underneath it.
#[derive(Debug, Clone)]
pub struct PeerLink {
    pub(crate) slot: Arc<Mutex<Option<Peer>>>,
    rearm: Arc<Notify>,
}

impl PeerLink {
    fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            rearm: Arc::new(Notify::new()),
        }
    }

    /// Address of the current viewer, if any.
    pub async fn peer_addr(&self) -> Option<SocketAddr> {
        self.slot.lock().await.as_ref().map(|peer| peer.addr)
    }

    /// Drop the viewer after a failed send and wake the accept loop.
    pub(crate) fn report_lost(&self, slot: &mut Option<Peer>) {
        if let Some(peer) = slot.take() {
            info!(addr = %peer.addr, "remote viewer lost");
            self.rearm.notify_one();
        }
    }
}

// ── ConnectionSupervisor ─────────────────────────────────────────

/// Owns the listening endpoint and the accept task.
pub struct ConnectionSupervisor {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    link: PeerLink,
    phase: Arc<watch::Sender<ConnectionPhase>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ConnectionSupervisor {
    /// Bind the listening endpoint. The accept loop starts with
    /// [`start`](Self::start).
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, HwcError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (phase, _) = watch::channel(ConnectionPhase::Listening);

        Ok(Self {
            listener: Some(listener),
            local_addr,
            link: PeerLink::new(),
            phase: Arc::new(phase),
            cancel: CancellationToken::new(),
            task: None,
        })
    }

    /// Spawn the accept loop. Calling it again is a no-op.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        info!(addr = %self.local_addr, "waiting for remote viewer");
        self.task = Some(tokio::spawn(accept_loop(
            listener,
            self.link.clone(),
            Arc::clone(&self.phase),
            self.cancel.clone(),
        )));
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn link(&self) -> PeerLink {
        self.link.clone()
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase.borrow().clone()
    }

    /// Watch phase changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionPhase> {
        self.phase.subscribe()
    }

    /// Unblock the pending accept, close the viewer and the listener, and
    /// wait for the accept task to finish.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("accept task ended abnormally: {e}");
            }
        }
        self.listener = None;
        self.link.slot.lock().await.take();
        self.phase.send_modify(ConnectionPhase::close);
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Accept loop ──────────────────────────────────────────────────

async fn accept_loop(
    listener: TcpListener,
    link: PeerLink,
    phase: Arc<watch::Sender<ConnectionPhase>>,
    cancel: CancellationToken,
) {
    loop {
        phase.send_modify(|p| {
            if let Err(e) = p.begin_accept() {
                debug!("{e}");
            }
        });

        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            result = listener.accept() => result,
        };
        let (stream, addr) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                warn!("accept error: {e}");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%addr, "set_nodelay failed: {e}");
        }

        *link.slot.lock().await = Some(Peer { stream, addr });
        phase.send_modify(|p| {
            if let Err(e) = p.connect(addr) {
                debug!("{e}");
            }
        });
        info!(%addr, "remote viewer connected");

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = link.rearm.notified() => {}
        }
    }

    link.slot.lock().await.take();
    phase.send_modify(ConnectionPhase::close);
    debug!("accept loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[test]
    fn happy_path_lifecycle() {
        let mut phase = ConnectionPhase::default();
        assert_eq!(phase, ConnectionPhase::Listening);

        phase.begin_accept().unwrap();
        assert_eq!(phase, ConnectionPhase::Accepting);

        phase.connect(addr()).unwrap();
        assert!(phase.is_connected());
        assert_eq!(phase.peer(), Some(addr()));

        phase.begin_accept().unwrap();
        assert_eq!(phase, ConnectionPhase::Accepting);

        phase.close();
        assert_eq!(phase, ConnectionPhase::Closed);
    }

    #[test]
    fn connect_requires_accepting() {
        let mut phase = ConnectionPhase::Listening;
        assert!(phase.connect(addr()).is_err());
    }

    #[test]
    fn closed_is_terminal() {
        let mut phase = ConnectionPhase::Closed;
        assert!(phase.begin_accept().is_err());
        assert!(phase.connect(addr()).is_err());
    }

    #[test]
    fn display_format() {
        assert_eq!(ConnectionPhase::Listening.to_string(), "Listening");
        assert_eq!(ConnectionPhase::Accepting.to_string(), "Accepting");
        assert_eq!(ConnectionPhase::Closed.to_string(), "Closed");
        assert_eq!(
            ConnectionPhase::Connected {
                peer: addr(),
                since: Instant::now(),
            }
            .to_string(),
            "Connected(127.0.0.1:4000)"
        );
    }

    #[tokio::test]
    async fn accepts_a_viewer_and_closes_on_shutdown() {
        let mut supervisor = ConnectionSupervisor::bind("127.0.0.1:0").await.unwrap();
        let mut phases = supervisor.subscribe();
        supervisor.start();

        let client = TcpStream::connect(supervisor.local_addr()).await.unwrap();
        let connected = phases.wait_for(|p| p.is_connected()).await.unwrap().clone();
        assert_eq!(connected.peer(), Some(client.local_addr().unwrap()));
        assert_eq!(
            supervisor.link().peer_addr().await,
            Some(client.local_addr().unwrap())
        );

        supervisor.shutdown().await;
        assert_eq!(supervisor.phase(), ConnectionPhase::Closed);
        assert!(supervisor.link().peer_addr().await.is_none());
    }

    #[tokio::test]
    async fn shutdown_unblocks_pending_accept() {
        let mut supervisor = ConnectionSupervisor::bind("127.0.0.1:0").await.unwrap();
        let mut phases = supervisor.subscribe();
        supervisor.start();
        phases
            .wait_for(|p| *p == ConnectionPhase::Accepting)
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), supervisor.shutdown())
            .await
            .expect("shutdown hung on accept");
        assert_eq!(supervisor.phase(), ConnectionPhase::Closed);
    }
}
