//! Networked two-player battleship.
//!
//! The interesting part is the synchronization layer: a reliable TCP command
//! channel and a best-effort UDP signal channel, bootstrapped by a port
//! exchange, feeding a dispatcher that routes typed events into the match
//! coordinator. The board itself is ordinary grid bookkeeping.

mod board;
mod common;
mod config;
pub mod coordinator;
pub mod dispatcher;
mod logging;
pub mod protocol;
mod ship;
pub mod transport;

pub use board::{Board, Cell};
pub use common::{AttackOutcome, BoardError, Position};
pub use config::{BOARD_SIZE, DEFAULT_TCP_PORT, DEFAULT_UDP_PORT, FLEET, FLEET_SIZE};
pub use coordinator::{
    GameEvent, GameOverReason, LedgerEntry, MatchCoordinator, MatchPhase, RejectReason,
    ShipLedger,
};
pub use dispatcher::{CommandEvent, Dispatcher, SignalEvent};
pub use logging::init_logging;
pub use protocol::{MatchResult, Message, Outcome, ProtocolError, TurnOrder};
pub use ship::{Orientation, Ship, ShipClass};
pub use transport::{ChannelState, Connection, FrameSink, HostEndpoint, InMemorySink, Role};
