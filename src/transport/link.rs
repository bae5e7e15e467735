//! The live network link: TCP stream + UDP socket, one receive loop each.
//!
//! The UDP socket has no connection, so the remote address is learned either
//! from the port-exchange frame on the TCP channel or from the sender of the
//! first inbound datagram. The explicit exchange is authoritative and may
//! overwrite an inferred address; inference never overwrites anything.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs, UdpSocket};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use crate::dispatcher::Dispatcher;
use crate::protocol::{self, Message};
use crate::transport::{ChannelState, FrameSink, Role};

/// Datagrams larger than this are transport noise and dropped unparsed.
const MAX_DATAGRAM_LEN: usize = 1000;
/// Shortest frame the protocol can produce ("PING").
const MIN_DATAGRAM_LEN: usize = 4;
/// PING datagrams the peer fires after connecting, so the host's socket
/// learns the peer's reachable address even if the port exchange is slow.
const PING_BURST: usize = 3;
const PING_BURST_SPACING: Duration = Duration::from_millis(50);

/// Remote unreliable-channel address and how it was learned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RemoteUdp {
    Unknown,
    /// Adopted from the sender of the first inbound datagram.
    Inferred(SocketAddr),
    /// Learned from the port-exchange frame; authoritative.
    Exchanged(SocketAddr),
}

impl RemoteUdp {
    fn addr(&self) -> Option<SocketAddr> {
        match self {
            RemoteUdp::Unknown => None,
            RemoteUdp::Inferred(addr) | RemoteUdp::Exchanged(addr) => Some(*addr),
        }
    }
}

/// State shared between the caller-facing handle and the receive loops.
/// Loops write, the send path reads; everything goes through atomics or a
/// mutex.
struct Shared {
    connected: AtomicBool,
    closed: AtomicBool,
    remote_udp: Mutex<RemoteUdp>,
    udp: UdpSocket,
}

impl Shared {
    fn record_exchanged(&self, remote_ip: IpAddr, port: u16) {
        let mut remote = self.remote_udp.lock().unwrap();
        *remote = RemoteUdp::Exchanged(SocketAddr::new(remote_ip, port));
        log::info!("remote UDP endpoint set to {}:{} via port exchange", remote_ip, port);
    }

    fn adopt_sender(&self, from: SocketAddr) {
        let mut remote = self.remote_udp.lock().unwrap();
        if *remote == RemoteUdp::Unknown {
            *remote = RemoteUdp::Inferred(from);
            log::info!("remote UDP endpoint inferred from inbound datagram: {from}");
        }
    }
}

/// One reliable + one unreliable channel to the opponent.
pub struct Connection {
    role: Role,
    shared: Arc<Shared>,
    writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    local_udp_port: u16,
}

/// Bound but not yet accepted host endpoints. Splitting bind from accept
/// lets callers learn the ports before the opponent connects.
pub struct HostEndpoint {
    listener: TcpListener,
    udp: UdpSocket,
}

impl HostEndpoint {
    /// Bind the host's reliable and unreliable endpoints. Port 0 binds an
    /// ephemeral port, reported by [`HostEndpoint::tcp_port`] /
    /// [`HostEndpoint::udp_port`].
    pub async fn bind(tcp_port: u16, udp_port: u16) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", tcp_port)).await?;
        let udp = UdpSocket::bind(("0.0.0.0", udp_port)).await?;
        log::info!(
            "listening on tcp:{}, udp:{}",
            listener.local_addr()?.port(),
            udp.local_addr()?.port()
        );
        Ok(Self { listener, udp })
    }

    pub fn tcp_port(&self) -> anyhow::Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    pub fn udp_port(&self) -> anyhow::Result<u16> {
        Ok(self.udp.local_addr()?.port())
    }

    /// Accept exactly one opponent. Further inbound connections are refused
    /// by dropping the listener.
    pub async fn accept(self, dispatcher: Dispatcher) -> anyhow::Result<Connection> {
        let (stream, peer) = self.listener.accept().await?;
        drop(self.listener);
        log::info!("opponent connected from {peer}");

        let conn =
            Connection::wire_up(Role::Host, stream, self.udp, dispatcher, RemoteUdp::Unknown)?;

        // Tell the peer where our unreliable channel lives.
        if !conn
            .send_reliable(&Message::PortExchange {
                from_host: true,
                port: conn.local_udp_port,
            })
            .await
        {
            anyhow::bail!("failed to send port exchange");
        }
        Ok(conn)
    }
}

impl Connection {
    /// Host a match on the given ports and wait for the opponent.
    pub async fn host(
        tcp_port: u16,
        udp_port: u16,
        dispatcher: Dispatcher,
    ) -> anyhow::Result<Self> {
        HostEndpoint::bind(tcp_port, udp_port)
            .await?
            .accept(dispatcher)
            .await
    }

    /// Join a hosted match. `udp_port` is the host's advertised UDP port;
    /// our own UDP socket binds an ephemeral port which the port-exchange
    /// frame reports back.
    pub async fn connect<A: ToSocketAddrs>(
        addr: A,
        udp_port: u16,
        dispatcher: Dispatcher,
    ) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let udp = UdpSocket::bind(("0.0.0.0", 0)).await?;
        let host_ip = stream.peer_addr()?.ip();
        let remote = RemoteUdp::Exchanged(SocketAddr::new(host_ip, udp_port));

        let conn = Self::wire_up(Role::Peer, stream, udp, dispatcher, remote)?;
        log::info!(
            "connected to host; local udp port {}",
            conn.local_udp_port
        );

        if !conn
            .send_reliable(&Message::PortExchange {
                from_host: false,
                port: conn.local_udp_port,
            })
            .await
        {
            anyhow::bail!("failed to send port exchange");
        }
        conn.spawn_ping_burst();
        Ok(conn)
    }

    fn wire_up(
        role: Role,
        stream: TcpStream,
        udp: UdpSocket,
        dispatcher: Dispatcher,
        remote: RemoteUdp,
    ) -> anyhow::Result<Self> {
        let local_udp_port = udp.local_addr()?.port();
        let remote_ip = stream.peer_addr()?.ip();
        let (reader, writer) = stream.into_split();

        let shared = Arc::new(Shared {
            connected: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            remote_udp: Mutex::new(remote),
            udp,
        });

        let tcp_task = tokio::spawn(tcp_recv_loop(
            reader,
            Arc::clone(&shared),
            dispatcher.clone(),
            remote_ip,
        ));
        let udp_task = tokio::spawn(udp_recv_loop(Arc::clone(&shared), dispatcher));

        Ok(Self {
            role,
            shared,
            writer: Arc::new(tokio::sync::Mutex::new(writer)),
            tasks: Mutex::new(vec![tcp_task, udp_task]),
            local_udp_port,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn local_udp_port(&self) -> u16 {
        self.local_udp_port
    }

    pub fn reliable_state(&self) -> ChannelState {
        if self.shared.closed.load(Ordering::SeqCst) {
            ChannelState::Closed
        } else if self.shared.connected.load(Ordering::SeqCst) {
            ChannelState::Connected
        } else {
            ChannelState::Closed
        }
    }

    /// The unreliable channel counts as connected once the remote address
    /// is known, from either discovery path.
    pub fn unreliable_state(&self) -> ChannelState {
        if self.shared.closed.load(Ordering::SeqCst) {
            ChannelState::Closed
        } else if self.remote_udp_known() {
            ChannelState::Connected
        } else {
            ChannelState::Connecting
        }
    }

    /// Whether the unreliable channel knows where to send.
    pub fn remote_udp_known(&self) -> bool {
        self.shared.remote_udp.lock().unwrap().addr().is_some()
    }

    /// Best-effort send on the reliable channel; one frame per line.
    pub async fn send_reliable(&self, msg: &Message) -> bool {
        if !self.shared.connected.load(Ordering::SeqCst) {
            return false;
        }
        let mut frame = msg.encode();
        frame.push('\n');
        let mut writer = self.writer.lock().await;
        match writer.write_all(frame.as_bytes()).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("reliable send failed: {e}");
                self.shared.connected.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    /// Best-effort send on the unreliable channel; one frame per datagram.
    /// Fails while the remote UDP address is still unknown.
    pub async fn send_unreliable(&self, msg: &Message) -> bool {
        if self.shared.closed.load(Ordering::SeqCst) {
            return false;
        }
        let Some(target) = self.shared.remote_udp.lock().unwrap().addr() else {
            log::debug!("unreliable send skipped, remote address unknown");
            return false;
        };
        match self.shared.udp.send_to(msg.encode().as_bytes(), target).await {
            Ok(_) => true,
            Err(e) => {
                log::warn!("unreliable send failed: {e}");
                false
            }
        }
    }

    fn spawn_ping_burst(&self) {
        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            for _ in 0..PING_BURST {
                let Some(target) = shared.remote_udp.lock().unwrap().addr() else {
                    return;
                };
                let _ = shared.udp.send_to(Message::Ping.encode().as_bytes(), target).await;
                sleep(PING_BURST_SPACING).await;
            }
        });
        self.tasks.lock().unwrap().push(task);
    }

    /// Stop both receive loops and close both sockets. Idempotent, and safe
    /// to call while a receive is in flight.
    pub async fn shutdown(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.connected.store(false, Ordering::SeqCst);
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
        drop(writer);
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        log::info!("network link shut down");
    }
}

#[async_trait::async_trait]
impl FrameSink for Connection {
    async fn send_command(&self, msg: &Message) -> bool {
        self.send_reliable(msg).await
    }

    async fn send_signal(&self, msg: &Message) -> bool {
        self.send_unreliable(msg).await
    }
}

/// Reliable receive loop: one frame per line. Port-exchange frames are
/// consumed here; everything else goes to the dispatcher.
async fn tcp_recv_loop(
    reader: OwnedReadHalf,
    shared: Arc<Shared>,
    dispatcher: Dispatcher,
    remote_ip: IpAddr,
) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.starts_with(protocol::UDP_PORT_PREFIX)
                    || line.starts_with(protocol::CLIENT_UDP_PORT_PREFIX)
                {
                    match protocol::parse(&line) {
                        Ok(Message::PortExchange { port, .. }) => {
                            shared.record_exchanged(remote_ip, port);
                        }
                        _ => log::warn!("malformed port exchange dropped: {line:?}"),
                    }
                    continue;
                }
                dispatcher.dispatch_command_frame(&line);
            }
            Ok(None) => {
                log::info!("reliable channel closed by remote");
                break;
            }
            Err(e) => {
                if !shared.closed.load(Ordering::SeqCst) {
                    log::warn!("reliable receive failed: {e}");
                }
                break;
            }
        }
        if shared.closed.load(Ordering::SeqCst) {
            break;
        }
    }
    shared.connected.store(false, Ordering::SeqCst);
    if !shared.closed.load(Ordering::SeqCst) {
        dispatcher.notify_closed();
    }
}

/// Unreliable receive loop: one frame per datagram, with hygiene guards
/// applied before parsing.
async fn udp_recv_loop(shared: Arc<Shared>, dispatcher: Dispatcher) {
    let mut buf = [0u8; 1024];
    loop {
        if shared.closed.load(Ordering::SeqCst) {
            break;
        }
        let (len, from) = match shared.udp.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                if !shared.closed.load(Ordering::SeqCst) {
                    log::warn!("unreliable receive failed: {e}");
                }
                break;
            }
        };
        if len < MIN_DATAGRAM_LEN || len > MAX_DATAGRAM_LEN {
            log::debug!("datagram of {len} bytes dropped");
            continue;
        }
        let Ok(text) = core::str::from_utf8(&buf[..len]) else {
            log::debug!("non-utf8 datagram dropped");
            continue;
        };
        if text.contains('\u{0000}') || text.contains('\u{FFFD}') {
            log::debug!("datagram with control/replacement characters dropped");
            continue;
        }
        shared.adopt_sender(from);
        dispatcher.dispatch_signal_frame(text);
    }
}
