//! Stateless routing from inbound frames to typed event streams.
//!
//! The transport hands raw frame text to [`Dispatcher::dispatch_command_frame`]
//! (reliable channel) or [`Dispatcher::dispatch_signal_frame`] (unreliable
//! channel). Valid frames become [`CommandEvent`]s or [`SignalEvent`]s on
//! their respective mpsc streams; invalid frames and frames arriving on the
//! wrong channel are logged and dropped, never delivered.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::common::Position;
use crate::protocol::{self, MatchResult, Message, Outcome, TurnOrder};

/// Reliable-channel event consumed by the match coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandEvent {
    Ready,
    /// GAME_START received; `go_first` is the order assigned to us.
    GameStart { go_first: bool },
    Attack(Position),
    AttackResult { outcome: Outcome, position: Position },
    TurnEnd,
    /// GAME_OVER received; `remote_won` is the sender's declared result.
    GameOver { remote_won: bool },
    Disconnect,
    Surrender,
    /// The reliable channel dropped without an orderly DISCONNECT.
    ChannelClosed,
}

/// Unreliable-channel event consumed by the match coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    Hover(Option<Position>),
    Ping,
    Pong,
}

/// Routes decoded frames to the command and signal streams. Owns no game
/// state; cheap to clone into the transport's receive loops.
#[derive(Clone)]
pub struct Dispatcher {
    commands: UnboundedSender<CommandEvent>,
    signals: UnboundedSender<SignalEvent>,
}

impl Dispatcher {
    /// Create a dispatcher plus the receivers for both event streams.
    pub fn new() -> (
        Self,
        UnboundedReceiver<CommandEvent>,
        UnboundedReceiver<SignalEvent>,
    ) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        (
            Self {
                commands: commands_tx,
                signals: signals_tx,
            },
            commands_rx,
            signals_rx,
        )
    }

    /// Decode and route one reliable-channel frame.
    pub fn dispatch_command_frame(&self, frame: &str) {
        let msg = match protocol::parse(frame) {
            Ok(msg) => msg,
            Err(e) => {
                log::warn!("invalid command frame dropped ({e}): {frame:?}");
                return;
            }
        };
        let event = match msg {
            Message::Ready => CommandEvent::Ready,
            Message::GameStart(order) => CommandEvent::GameStart {
                go_first: order == TurnOrder::First,
            },
            Message::Attack(position) => CommandEvent::Attack(position),
            Message::AttackResult(outcome, position) => {
                CommandEvent::AttackResult { outcome, position }
            }
            Message::TurnEnd => CommandEvent::TurnEnd,
            Message::GameOver(result) => CommandEvent::GameOver {
                remote_won: result == MatchResult::Winner,
            },
            Message::Disconnect => CommandEvent::Disconnect,
            Message::Surrender => CommandEvent::Surrender,
            Message::Hover(_) | Message::Ping | Message::Pong => {
                log::warn!("signal frame on the reliable channel dropped: {frame:?}");
                return;
            }
            Message::PortExchange { .. } => {
                // The transport consumes these during setup.
                log::warn!("port exchange frame reached the dispatcher: {frame:?}");
                return;
            }
        };
        self.emit_command(event);
    }

    /// Decode and route one unreliable-channel frame.
    pub fn dispatch_signal_frame(&self, frame: &str) {
        let msg = match protocol::parse(frame) {
            Ok(msg) => msg,
            Err(e) => {
                log::warn!("invalid signal frame dropped ({e}): {frame:?}");
                return;
            }
        };
        let event = match msg {
            Message::Hover(position) => SignalEvent::Hover(position),
            Message::Ping => SignalEvent::Ping,
            Message::Pong => SignalEvent::Pong,
            _ => {
                log::warn!("command frame on the unreliable channel dropped: {frame:?}");
                return;
            }
        };
        if self.signals.send(event).is_err() {
            log::debug!("signal stream closed, event dropped");
        }
    }

    /// Inject the channel-loss event when a receive loop exits.
    pub fn notify_closed(&self) {
        self.emit_command(CommandEvent::ChannelClosed);
    }

    fn emit_command(&self, event: CommandEvent) {
        if self.commands.send(event).is_err() {
            log::debug!("command stream closed, event dropped");
        }
    }
}
