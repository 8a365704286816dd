use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)] use mockall::automock;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::sync::{Mutex, Notify};
use tokio::{select, time};
use tracing::{debug, error, info};
use crate::config::RudpConfig;
use crate::message_id::MessageId;
use crate::rudp::Rudp;
use crate::state::{RudpError, StreamState, StreamStatus};

const SOCKET_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Where a driver puts outgoing packets
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PacketSink: Send + Sync + 'static {
    async fn send_packet(&self, packet: &[u8]) -> anyhow::Result<()>;
}

/// NB: the socket must be connected to the peer
#[async_trait]
impl PacketSink for UdpSocket {
    async fn send_packet(&self, packet: &[u8]) -> anyhow::Result<()> {
        self.send(packet).await?;
        Ok(())
    }
}

/// Runs a [Rudp] session with the Tokio runtime: calls are serialized through a mutex, a timer
///  task advances protocol time, and outgoing packets go to a [PacketSink].
pub struct RudpDriver<S: PacketSink> {
    rudp: Mutex<Rudp>,
    status: Arc<StreamStatus>,
    max_packet_size: usize,
    sink: Arc<S>,
    /// signalled whenever a received datagram was processed or the stream was terminated
    changed: Notify,
}

impl<S: PacketSink> RudpDriver<S> {
    pub fn new(config: RudpConfig, sink: Arc<S>) -> anyhow::Result<Arc<RudpDriver<S>>> {
        let max_packet_size = config.max_packet_size;
        let rudp = Rudp::new(config)?;

        Ok(Arc::new(RudpDriver {
            status: rudp.status(),
            rudp: Mutex::new(rudp),
            max_packet_size,
            sink,
            changed: Notify::new(),
        }))
    }

    pub fn state(&self) -> StreamState {
        self.status.load()
    }

    pub async fn send(&self, message: &[u8]) -> Result<MessageId, RudpError> {
        self.rudp.lock().await
            .send(message)
    }

    /// The next message if it is available
    pub async fn try_recv(&self) -> Result<Option<Bytes>, RudpError> {
        self.rudp.lock().await
            .recv_message()
    }

    /// Wait for the next message. This returns an error when the stream terminates.
    pub async fn recv(&self) -> Result<Bytes, RudpError> {
        loop {
            // registered before checking to avoid missing a notification in between
            let changed = self.changed.notified();

            if let Some(message) = self.try_recv().await? {
                return Ok(message);
            }
            changed.await;
        }
    }

    pub async fn on_datagram(&self, buf: &[u8]) {
        self.rudp.lock().await
            .input(buf);
        self.changed.notify_waiters();
    }

    /// Advance protocol time and send whatever packets are due
    pub async fn on_tick(&self, ticks: u64) {
        let packets = self.rudp.lock().await
            .update(ticks);
        self.send_packets(packets).await;

        if !self.status.is_active() {
            self.changed.notify_waiters();
        }
    }

    /// Send everything pending followed by EOF, and terminate the stream
    pub async fn close(&self) {
        let packets = self.rudp.lock().await
            .close();
        self.send_packets(packets).await;
        self.changed.notify_waiters();
    }

    /// Tell the peer to stop, and terminate the stream
    pub async fn abort(&self) {
        let packets = self.rudp.lock().await
            .abort();
        self.send_packets(packets).await;
        self.changed.notify_waiters();
    }

    async fn send_packets(&self, packets: Vec<Bytes>) {
        for packet in packets {
            if let Err(e) = self.sink.send_packet(&packet).await {
                error!("error sending packet: {}", e);
            }
        }
    }

    /// Advance protocol time by one tick per interval until the stream terminates
    pub async fn run_timer(self: Arc<Self>, tick_interval: Duration) {
        let mut ticks = time::interval(tick_interval);
        loop {
            ticks.tick().await;
            self.on_tick(1).await;

            if !self.status.is_active() {
                debug!("stream terminated ({:?}) - stopping timer", self.status.load());
                return;
            }
        }
    }
}

impl RudpDriver<UdpSocket> {
    /// Bind a UDP socket and connect it to the peer. The caller is responsible for spawning
    ///  [RudpDriver::run_timer] and [RudpDriver::recv_loop].
    pub async fn connect(config: RudpConfig, local_addr: impl ToSocketAddrs, peer_addr: impl ToSocketAddrs) -> anyhow::Result<Arc<RudpDriver<UdpSocket>>> {
        let socket = UdpSocket::bind(local_addr).await?;
        socket.connect(peer_addr).await?;
        info!("rudp stream {:?} -> {:?}", socket.local_addr()?, socket.peer_addr()?);

        RudpDriver::new(config, Arc::new(socket))
    }

    pub fn local_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        Ok(self.sink.local_addr()?)
    }

    /// Feed datagrams from the socket into the session until the stream terminates
    pub async fn recv_loop(self: Arc<Self>) {
        // datagrams longer than the packet size are truncated, which makes them malformed
        let mut buf = vec![0u8; self.max_packet_size + 1];
        loop {
            // a stream that times out has a silent peer, so termination must interrupt the receive
            let changed = self.changed.notified();
            if !self.status.is_active() {
                debug!("stream terminated ({:?}) - stopping receive loop", self.status.load());
                return;
            }

            let received = select! {
                received = self.sink.recv(&mut buf) => received,
                _ = changed => continue,
            };

            match received {
                Ok(num_read) => self.on_datagram(&buf[..num_read]).await,
                Err(e) => {
                    error!("socket error: {}", e);
                    time::sleep(SOCKET_ERROR_BACKOFF).await;
                }
            }
        }
    }
}
