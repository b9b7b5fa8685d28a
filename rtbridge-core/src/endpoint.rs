//! Per-entity UDP endpoint bridging one simulated entity to hardware.
//!
//! UDP is connectionless, so an endpoint owns two sockets: a send socket
//! connected to the fixed remote address and a receive socket bound to a
//! local address. Once connected, a receive task on the scheduler's reactor
//! reads datagrams into the endpoint's single reusable buffer and posts one
//! [`Completion`] per datagram.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tokio::sync::{mpsc, oneshot};

use crate::scheduler::reactor::ReactorHandle;
use crate::scheduler::{EndpointId, EntityId, RealTimeScheduler};

/// Upper bound on a blocking send unless the owner sets another one.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(50);

/// Errors surfaced by endpoint setup and writes. Never retried internally.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("Failed to bind receive socket to {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Failed to connect to {remote}: {source}")]
    Connect {
        remote: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Endpoint {endpoint} is not connected")]
    NotConnected { endpoint: EndpointId },

    #[error("Failed to send datagram to {remote}: {source}")]
    Send {
        remote: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Socket setup failed: {0}")]
    Setup(#[from] io::Error),
}

/// Raw result of one asynchronous receive.
#[derive(Debug)]
pub(crate) enum ReceiveOutcome {
    Received {
        data: Bytes,
        byte_count: usize,
        received_at: Instant,
    },
    Failed(io::Error),
    Cancelled,
}

/// Receive completion posted to the scheduler.
#[derive(Debug)]
pub(crate) struct Completion {
    pub(crate) endpoint: EndpointId,
    pub(crate) outcome: ReceiveOutcome,
}

/// What the scheduler does with a completion.
#[derive(Debug)]
pub(crate) enum ReceiveVerdict {
    Deliver { data: Bytes, received_at: Instant },
    DropTruncated { byte_count: usize },
    IgnoreCancelled,
    Fatal(io::Error),
}

impl ReceiveOutcome {
    /// A datagram filling the whole buffer may have been cut by the kernel.
    pub(crate) fn classify(self, capacity: usize) -> ReceiveVerdict {
        match self {
            ReceiveOutcome::Received { byte_count, .. } if byte_count >= capacity => {
                ReceiveVerdict::DropTruncated { byte_count }
            }
            ReceiveOutcome::Received {
                data, received_at, ..
            } => ReceiveVerdict::Deliver { data, received_at },
            ReceiveOutcome::Failed(error) if error.kind() == io::ErrorKind::Interrupted => {
                ReceiveVerdict::IgnoreCancelled
            }
            ReceiveOutcome::Failed(error) => ReceiveVerdict::Fatal(error),
            ReceiveOutcome::Cancelled => ReceiveVerdict::IgnoreCancelled,
        }
    }
}

/// Send/receive socket pair owned by one entity.
///
/// Created through [`RealTimeScheduler::create_endpoint`] and released with
/// [`Endpoint::teardown`]. Dropping an endpoint without teardown, connected or
/// not, releases it at the scheduler's next wait; datagrams it already queued
/// become stale.
pub struct Endpoint {
    id: EndpointId,
    owner: EntityId,
    send_socket: UdpSocket,
    receive_socket: Option<UdpSocket>,
    local_addr: SocketAddr,
    remote: Option<SocketAddr>,
    receive_capacity: usize,
    write_timeout: Duration,
    reactor: ReactorHandle,
    cancel: Option<oneshot::Sender<()>>,
    released: bool,
}

impl Endpoint {
    pub(crate) fn create(
        id: EndpointId,
        owner: EntityId,
        local: Option<SocketAddr>,
        receive_capacity: usize,
        reactor: ReactorHandle,
    ) -> Result<Self, EndpointError> {
        let address = local.unwrap_or_else(|| SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)));
        let receive_socket =
            UdpSocket::bind(address).map_err(|source| EndpointError::Bind { address, source })?;
        let local_addr = receive_socket.local_addr()?;
        let send_socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;

        tracing::debug!("Created {} for {} on {}", id, owner, local_addr);

        Ok(Self {
            id,
            owner,
            send_socket,
            receive_socket: Some(receive_socket),
            local_addr,
            remote: None,
            receive_capacity,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            reactor,
            cancel: None,
            released: false,
        })
    }

    pub fn id(&self) -> EndpointId {
        self.id
    }

    pub fn owner(&self) -> EntityId {
        self.owner
    }

    /// Address the receive socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// Bounds how long `write` may block. Applied on the next `connect`.
    pub fn set_write_timeout(&mut self, timeout: Duration) {
        self.write_timeout = timeout;
    }

    /// Fixes the destination of the send socket and arms the receive side.
    ///
    /// Connecting again only retargets the send socket; the receive task is
    /// armed once.
    ///
    /// # Errors
    ///
    /// - `EndpointError::Connect` - Remote address rejected by the socket
    /// - `EndpointError::Setup` - Receive socket could not join the reactor
    pub fn connect(&mut self, remote: SocketAddr) -> Result<(), EndpointError> {
        self.send_socket
            .connect(remote)
            .map_err(|source| EndpointError::Connect { remote, source })?;
        self.send_socket.set_write_timeout(Some(self.write_timeout))?;
        self.remote = Some(remote);

        if let Some(socket) = self.receive_socket.take() {
            self.arm_receive(socket)?;
        }

        tracing::info!("{} connected to {}", self.id, remote);
        Ok(())
    }

    /// Sends header and payload ranges as one datagram to the remote address.
    ///
    /// # Errors
    ///
    /// - `EndpointError::NotConnected` - `connect` has not succeeded yet
    /// - `EndpointError::Send` - Socket error, including write timeout
    pub fn write(&self, buffers: &[&[u8]]) -> Result<usize, EndpointError> {
        let remote = self
            .remote
            .ok_or(EndpointError::NotConnected { endpoint: self.id })?;

        let result = match buffers {
            [single] => self.send_socket.send(single),
            _ => {
                let total = buffers.iter().map(|buffer| buffer.len()).sum();
                let mut datagram = BytesMut::with_capacity(total);
                for buffer in buffers {
                    datagram.extend_from_slice(buffer);
                }
                self.send_socket.send(&datagram)
            }
        };

        result.map_err(|source| EndpointError::Send { remote, source })
    }

    /// Cancels the pending receive, invalidates queued datagrams of this
    /// endpoint and releases both sockets.
    pub fn teardown<E>(mut self, scheduler: &mut RealTimeScheduler<E>) {
        self.cancel_receive();
        scheduler.release_endpoint(self.id);
        self.released = true;
        tracing::debug!("Tore down {} of {}", self.id, self.owner);
    }

    fn arm_receive(&mut self, socket: UdpSocket) -> Result<(), EndpointError> {
        socket.set_nonblocking(true)?;
        let socket = {
            let _guard = self.reactor.runtime.enter();
            tokio::net::UdpSocket::from_std(socket)?
        };

        let (cancel_sender, cancel_receiver) = oneshot::channel();
        self.cancel = Some(cancel_sender);

        self.reactor.runtime.spawn(receive_loop(
            self.id,
            socket,
            self.receive_capacity,
            self.reactor.completions.clone(),
            cancel_receiver,
        ));
        Ok(())
    }

    fn cancel_receive(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.cancel_receive();
        if self.released {
            return;
        }

        // Posted directly: an endpoint that never connected has no receive
        // task to report the cancellation
        tracing::debug!("{} dropped without teardown", self.id);
        let _ = self.reactor.completions.send(Completion {
            endpoint: self.id,
            outcome: ReceiveOutcome::Cancelled,
        });
    }
}

/// Receives datagrams until cancelled, re-arming after every delivery.
async fn receive_loop(
    endpoint: EndpointId,
    socket: tokio::net::UdpSocket,
    capacity: usize,
    completions: mpsc::UnboundedSender<Completion>,
    mut cancel: oneshot::Receiver<()>,
) {
    let mut buffer = vec![0u8; capacity];

    loop {
        let result = tokio::select! {
            _ = &mut cancel => None,
            result = socket.recv_from(&mut buffer) => Some(result),
        };

        let outcome = match result {
            None => ReceiveOutcome::Cancelled,
            Some(Ok((byte_count, peer))) => {
                tracing::trace!("{} received {} bytes from {}", endpoint, byte_count, peer);
                ReceiveOutcome::Received {
                    data: Bytes::copy_from_slice(&buffer[..byte_count.min(capacity)]),
                    byte_count,
                    received_at: Instant::now(),
                }
            }
            Some(Err(error)) => ReceiveOutcome::Failed(error),
        };

        let rearm = match &outcome {
            ReceiveOutcome::Received { .. } => true,
            ReceiveOutcome::Failed(error) => error.kind() == io::ErrorKind::Interrupted,
            ReceiveOutcome::Cancelled => false,
        };
        if completions.send(Completion { endpoint, outcome }).is_err() || !rearm {
            break;
        }
    }
}
