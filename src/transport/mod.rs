//! Channel ownership: one reliable TCP connection plus one unreliable UDP
//! socket per match.

use crate::protocol::Message;

/// Which side of the match this process is. Immutable for the lifetime of
/// a match: the host binds the canonical ports, the peer connects to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Peer,
}

/// Lifecycle of a single channel, from the first state a live
/// [`Connection`] can observe. The unreliable channel stays `Connecting`
/// until the remote address is learned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Connected,
    Closed,
}

/// Outbound seam between the match coordinator and the network. Both sends
/// are best-effort: `false` means the frame was not sent (channel not
/// connected, remote address unknown, or socket error) and there is no
/// retry.
#[async_trait::async_trait]
pub trait FrameSink: Send + Sync {
    /// Send on the reliable, ordered channel.
    async fn send_command(&self, msg: &Message) -> bool;
    /// Send on the unreliable, best-effort channel.
    async fn send_signal(&self, msg: &Message) -> bool;
}

pub mod in_memory;
pub mod link;

pub use in_memory::InMemorySink;
pub use link::{Connection, HostEndpoint};
