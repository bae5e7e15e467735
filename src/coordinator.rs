//! The stateful core of a networked match: ready/start gating, turn
//! arbitration, attack round-tripping, opponent-fleet inference and
//! forfeit handling.
//!
//! The coordinator consumes [`CommandEvent`]s and [`SignalEvent`]s produced
//! by the dispatcher, sends frames through a [`FrameSink`], resolves inbound
//! attacks against the locally-owned board, and notifies the presentation
//! layer through a typed [`GameEvent`] stream.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::board::Board;
use crate::common::{AttackOutcome, Position};
use crate::config::FLEET;
use crate::dispatcher::{CommandEvent, SignalEvent};
use crate::protocol::{MatchResult, Message, Outcome, TurnOrder};
use crate::transport::{FrameSink, Role};

/// Phase of a networked match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// Waiting for both READY signals.
    AwaitingReady,
    /// Both sides ready; the peer is waiting for GAME_START.
    AwaitingStart,
    InProgress { our_turn: bool },
    Over { we_won: bool },
}

/// Why a local attack was refused. No frame is sent and no state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NotStarted,
    NotOurTurn,
    /// A previous attack has not been answered yet.
    AttackPending,
    AlreadyAttacked,
    MatchOver,
    SendFailed,
}

/// How the match concluded, from the local perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOverReason {
    /// Every ship on the local board is sunk.
    FleetLost,
    /// The opponent ledger reached five sunk entries.
    FleetSwept,
    /// The opponent declared the result with GAME_OVER.
    RemoteDeclared,
    OpponentSurrendered,
    OpponentDisconnected,
    LocalSurrender,
    /// The reliable channel dropped without an orderly DISCONNECT.
    ConnectionLost,
}

/// Typed notification for the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    OpponentReady,
    Started { our_turn: bool },
    /// The opponent attacked us; `outcome` is what our board reported.
    AttackIncoming { position: Position, outcome: AttackOutcome },
    /// Our attack was answered.
    AttackResolved { position: Position, outcome: Outcome },
    AttackRejected { position: Position, reason: RejectReason },
    TurnChanged { our_turn: bool },
    GameOver { we_won: bool, reason: GameOverReason },
    OpponentHover(Option<Position>),
    PingReceived,
}

/// One placeholder record in the opponent ship ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerEntry {
    name: &'static str,
    length: usize,
    sunk: bool,
}

impl LedgerEntry {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn is_sunk(&self) -> bool {
        self.sunk
    }
}

/// Placeholder model of the opponent's fleet, driven only by received SUNK
/// outcomes. The entries never correspond to the opponent's real ships:
/// sizes are assumed and "first not-yet-sunk" bookkeeping is arbitrary. It
/// feeds the ships-remaining readout and the win-by-count check, nothing
/// else.
#[derive(Debug, Clone)]
pub struct ShipLedger {
    entries: Vec<LedgerEntry>,
}

impl ShipLedger {
    pub fn new() -> Self {
        Self {
            entries: FLEET
                .iter()
                .map(|class| LedgerEntry {
                    name: class.name(),
                    length: class.length(),
                    sunk: false,
                })
                .collect(),
        }
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Mark the first not-yet-sunk entry as sunk and return its name.
    /// Returns `None` once every entry is sunk; the count never exceeds the
    /// fleet size.
    pub fn mark_next_sunk(&mut self) -> Option<&'static str> {
        let entry = self.entries.iter_mut().find(|e| !e.sunk)?;
        entry.sunk = true;
        Some(entry.name)
    }

    pub fn sunk_count(&self) -> usize {
        self.entries.iter().filter(|e| e.sunk).count()
    }

    pub fn remaining(&self) -> usize {
        self.entries.len() - self.sunk_count()
    }

    pub fn all_sunk(&self) -> bool {
        self.entries.iter().all(|e| e.sunk)
    }
}

impl Default for ShipLedger {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MatchCoordinator {
    role: Role,
    sink: Arc<dyn FrameSink>,
    /// The locally-owned board that resolves inbound attacks.
    board: Board,
    /// Ship-less board recording what we know of the opponent's grid.
    opponent_view: Board,
    ledger: ShipLedger,
    phase: MatchPhase,
    local_ready: bool,
    remote_ready: bool,
    start_fired: bool,
    pending_attack: Option<Position>,
    opponent_hover: Option<Position>,
    events: UnboundedSender<GameEvent>,
}

impl MatchCoordinator {
    /// `board` must already carry the local fleet.
    pub fn new(
        role: Role,
        board: Board,
        sink: Arc<dyn FrameSink>,
        events: UnboundedSender<GameEvent>,
    ) -> Self {
        let opponent_view = Board::new(board.size());
        Self {
            role,
            sink,
            board,
            opponent_view,
            ledger: ShipLedger::new(),
            phase: MatchPhase::AwaitingReady,
            local_ready: false,
            remote_ready: false,
            start_fired: false,
            pending_attack: None,
            opponent_hover: None,
            events,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn opponent_view(&self) -> &Board {
        &self.opponent_view
    }

    pub fn ledger(&self) -> &ShipLedger {
        &self.ledger
    }

    pub fn opponent_hover(&self) -> Option<Position> {
        self.opponent_hover
    }

    pub fn pending_attack(&self) -> Option<Position> {
        self.pending_attack
    }

    /// Announce that the local fleet is placed. Sends READY and, once both
    /// sides are ready, fires the start transition.
    pub async fn mark_ready(&mut self) -> bool {
        if self.local_ready {
            return true;
        }
        if !matches!(self.phase, MatchPhase::AwaitingReady) {
            return false;
        }
        if !self.sink.send_command(&Message::Ready).await {
            log::warn!("failed to send READY");
            return false;
        }
        self.local_ready = true;
        self.try_start().await;
        true
    }

    /// Attack the opponent at `position`. The turn does not flip until the
    /// matching ATTACK_RESULT arrives.
    pub async fn send_attack(&mut self, position: Position) -> bool {
        let reason = match self.phase {
            MatchPhase::AwaitingReady | MatchPhase::AwaitingStart => {
                Some(RejectReason::NotStarted)
            }
            MatchPhase::Over { .. } => Some(RejectReason::MatchOver),
            MatchPhase::InProgress { our_turn: false } => Some(RejectReason::NotOurTurn),
            MatchPhase::InProgress { our_turn: true } => {
                if self.pending_attack.is_some() {
                    Some(RejectReason::AttackPending)
                } else if self.opponent_view.was_attacked(position) {
                    Some(RejectReason::AlreadyAttacked)
                } else {
                    None
                }
            }
        };
        if let Some(reason) = reason {
            self.emit(GameEvent::AttackRejected { position, reason });
            return false;
        }
        if !self.sink.send_command(&Message::Attack(position)).await {
            self.emit(GameEvent::AttackRejected {
                position,
                reason: RejectReason::SendFailed,
            });
            return false;
        }
        self.pending_attack = Some(position);
        true
    }

    /// Broadcast the pointer position; `None` clears it on the remote side.
    pub async fn send_hover(&self, position: Option<Position>) -> bool {
        self.sink.send_signal(&Message::Hover(position)).await
    }

    /// Forfeit the match.
    pub async fn surrender(&mut self) -> bool {
        if !matches!(self.phase, MatchPhase::InProgress { .. }) {
            return false;
        }
        let sent = self.sink.send_command(&Message::Surrender).await;
        self.finish(false, GameOverReason::LocalSurrender);
        sent
    }

    /// Orderly teardown notice; the caller shuts the link down afterwards.
    pub async fn send_disconnect(&self) -> bool {
        self.sink.send_command(&Message::Disconnect).await
    }

    /// Reset for a rematch over the same connection: fresh board, fresh
    /// ledger, both ready flags cleared.
    pub fn reset(&mut self, board: Board) {
        self.opponent_view = Board::new(board.size());
        self.board = board;
        self.ledger = ShipLedger::new();
        self.phase = MatchPhase::AwaitingReady;
        self.local_ready = false;
        self.remote_ready = false;
        self.start_fired = false;
        self.pending_attack = None;
        self.opponent_hover = None;
    }

    /// Consume one reliable-channel event.
    pub async fn handle_command(&mut self, event: CommandEvent) {
        match event {
            CommandEvent::Ready => {
                self.remote_ready = true;
                self.emit(GameEvent::OpponentReady);
                self.try_start().await;
            }
            CommandEvent::GameStart { go_first } => {
                if self.role == Role::Peer && self.phase == MatchPhase::AwaitingStart {
                    self.begin(go_first);
                } else {
                    log::warn!("unexpected GAME_START in {:?} ignored", self.phase);
                }
            }
            CommandEvent::Attack(position) => self.handle_attack(position).await,
            CommandEvent::AttackResult { outcome, position } => {
                self.handle_attack_result(outcome, position).await;
            }
            CommandEvent::TurnEnd => {
                if matches!(self.phase, MatchPhase::InProgress { .. }) {
                    self.phase = MatchPhase::InProgress { our_turn: false };
                    self.emit(GameEvent::TurnChanged { our_turn: false });
                }
            }
            CommandEvent::GameOver { remote_won } => {
                if !matches!(self.phase, MatchPhase::Over { .. }) {
                    self.finish(!remote_won, GameOverReason::RemoteDeclared);
                }
            }
            CommandEvent::Disconnect => {
                if !matches!(self.phase, MatchPhase::Over { .. }) {
                    self.finish(true, GameOverReason::OpponentDisconnected);
                }
            }
            CommandEvent::Surrender => {
                if !matches!(self.phase, MatchPhase::Over { .. }) {
                    self.finish(true, GameOverReason::OpponentSurrendered);
                }
            }
            CommandEvent::ChannelClosed => {
                if !matches!(self.phase, MatchPhase::Over { .. }) {
                    self.finish(true, GameOverReason::ConnectionLost);
                }
            }
        }
    }

    /// Consume one unreliable-channel event.
    pub async fn handle_signal(&mut self, event: SignalEvent) {
        match event {
            SignalEvent::Hover(position) => {
                // Latest delivered wins, including the clearing sentinel.
                self.opponent_hover = position;
                self.emit(GameEvent::OpponentHover(position));
            }
            SignalEvent::Ping => {
                let _ = self.sink.send_signal(&Message::Pong).await;
                self.emit(GameEvent::PingReceived);
            }
            SignalEvent::Pong => {
                log::debug!("pong received");
            }
        }
    }

    async fn try_start(&mut self) {
        if !(self.local_ready && self.remote_ready) || self.start_fired {
            return;
        }
        self.start_fired = true;
        self.phase = MatchPhase::AwaitingStart;
        if self.role == Role::Host {
            // The host decides turn order and always moves first.
            if !self
                .sink
                .send_command(&Message::GameStart(TurnOrder::Second))
                .await
            {
                log::warn!("failed to send GAME_START");
            }
            self.begin(true);
        }
    }

    fn begin(&mut self, our_turn: bool) {
        self.phase = MatchPhase::InProgress { our_turn };
        self.emit(GameEvent::Started { our_turn });
    }

    async fn handle_attack(&mut self, position: Position) {
        match self.phase {
            MatchPhase::InProgress { our_turn: false } => {}
            MatchPhase::Over { .. } => return,
            _ => {
                log::warn!("ATTACK in {:?} ignored", self.phase);
                return;
            }
        }
        let outcome = self.board.process_attack(position);
        if outcome == AttackOutcome::Invalid {
            // No result is sent and the turn does not flip.
            log::warn!("invalid remote attack at {position} rejected");
            return;
        }
        self.emit(GameEvent::AttackIncoming { position, outcome });

        let wire_outcome = match outcome {
            AttackOutcome::Hit => Outcome::Hit,
            AttackOutcome::Miss => Outcome::Miss,
            AttackOutcome::Sunk => Outcome::Sunk,
            AttackOutcome::Invalid => unreachable!(),
        };
        if !self
            .sink
            .send_command(&Message::AttackResult(wire_outcome, position))
            .await
        {
            log::warn!("failed to send ATTACK_RESULT");
        }

        if self.board.all_ships_sunk() {
            let _ = self.sink.send_command(&Message::GameOver(MatchResult::Loser)).await;
            self.finish(false, GameOverReason::FleetLost);
        } else {
            self.phase = MatchPhase::InProgress { our_turn: true };
            self.emit(GameEvent::TurnChanged { our_turn: true });
        }
    }

    async fn handle_attack_result(&mut self, outcome: Outcome, position: Position) {
        if matches!(self.phase, MatchPhase::Over { .. }) {
            return;
        }
        if self.phase != (MatchPhase::InProgress { our_turn: true })
            || self.pending_attack != Some(position)
        {
            log::warn!("unmatched ATTACK_RESULT for {position} ignored");
            return;
        }
        self.pending_attack = None;

        let local_outcome = match outcome {
            Outcome::Hit => AttackOutcome::Hit,
            Outcome::Miss => AttackOutcome::Miss,
            Outcome::Sunk => AttackOutcome::Sunk,
        };
        self.opponent_view.mark_external_outcome(position, local_outcome);
        if outcome == Outcome::Sunk {
            if let Some(name) = self.ledger.mark_next_sunk() {
                log::info!("opponent ship down, recorded as {name}");
            }
        }
        self.emit(GameEvent::AttackResolved { position, outcome });

        if self.ledger.all_sunk() {
            let _ = self
                .sink
                .send_command(&Message::GameOver(MatchResult::Winner))
                .await;
            self.finish(true, GameOverReason::FleetSwept);
        } else {
            // Turn flips after every answered attack, sunk included.
            self.phase = MatchPhase::InProgress { our_turn: false };
            self.emit(GameEvent::TurnChanged { our_turn: false });
        }
    }

    fn finish(&mut self, we_won: bool, reason: GameOverReason) {
        self.phase = MatchPhase::Over { we_won };
        self.emit(GameEvent::GameOver { we_won, reason });
    }

    fn emit(&self, event: GameEvent) {
        if self.events.send(event).is_err() {
            log::debug!("event stream closed, {event:?} dropped");
        }
    }
}
