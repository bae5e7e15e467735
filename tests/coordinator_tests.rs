use std::sync::Arc;

use broadside::{
    Board, CommandEvent, GameEvent, GameOverReason, InMemorySink, MatchCoordinator, MatchPhase,
    Orientation, Outcome, Position, RejectReason, Role, ShipClass, ShipLedger, SignalEvent,
    BOARD_SIZE, FLEET, FLEET_SIZE,
};
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// Deterministic fleet: one ship per even row, starting at column 0.
fn placed_board() -> Board {
    let mut board = Board::new(BOARD_SIZE);
    for (i, class) in FLEET.iter().enumerate() {
        board
            .place_ship(*class, Position::new((2 * i) as u8, 0), Orientation::Horizontal)
            .unwrap();
    }
    board
}

fn single_ship_board() -> Board {
    let mut board = Board::new(BOARD_SIZE);
    board
        .place_ship(
            ShipClass::new("Destroyer", 2),
            Position::new(0, 0),
            Orientation::Horizontal,
        )
        .unwrap();
    board
}

struct Rig {
    coord: MatchCoordinator,
    sink: InMemorySink,
    events: UnboundedReceiver<GameEvent>,
}

fn rig(role: Role) -> Rig {
    rig_with_board(role, placed_board())
}

fn rig_with_board(role: Role, board: Board) -> Rig {
    let sink = InMemorySink::new();
    let (events_tx, events) = mpsc::unbounded_channel();
    let coord = MatchCoordinator::new(role, board, Arc::new(sink.clone()), events_tx);
    Rig {
        coord,
        sink,
        events,
    }
}

fn drain(events: &mut UnboundedReceiver<GameEvent>) -> Vec<GameEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Drive a host rig into InProgress with the local turn.
async fn started_host() -> Rig {
    let mut rig = rig(Role::Host);
    assert!(rig.coord.mark_ready().await);
    rig.coord.handle_command(CommandEvent::Ready).await;
    assert_eq!(rig.coord.phase(), MatchPhase::InProgress { our_turn: true });
    rig.sink.take_commands();
    drain(&mut rig.events);
    rig
}

/// Drive a peer rig into InProgress with the remote turn.
async fn started_peer_with_board(board: Board) -> Rig {
    let mut rig = rig_with_board(Role::Peer, board);
    assert!(rig.coord.mark_ready().await);
    rig.coord.handle_command(CommandEvent::Ready).await;
    assert_eq!(rig.coord.phase(), MatchPhase::AwaitingStart);
    rig.coord
        .handle_command(CommandEvent::GameStart { go_first: false })
        .await;
    assert_eq!(rig.coord.phase(), MatchPhase::InProgress { our_turn: false });
    rig.sink.take_commands();
    drain(&mut rig.events);
    rig
}

#[tokio::test]
async fn test_host_starts_when_ready_signals_arrive_local_first() {
    let mut rig = rig(Role::Host);

    assert!(rig.coord.mark_ready().await);
    assert_eq!(rig.coord.phase(), MatchPhase::AwaitingReady);
    assert_eq!(rig.sink.take_commands(), vec!["READY_TO_START"]);

    rig.coord.handle_command(CommandEvent::Ready).await;
    assert_eq!(rig.coord.phase(), MatchPhase::InProgress { our_turn: true });
    // The host decides: it moves first and assigns the peer SECOND.
    assert_eq!(rig.sink.take_commands(), vec!["GAME_START:SECOND"]);

    let events = drain(&mut rig.events);
    assert!(events.contains(&GameEvent::OpponentReady));
    assert!(events.contains(&GameEvent::Started { our_turn: true }));
}

#[tokio::test]
async fn test_host_starts_when_ready_signals_arrive_remote_first() {
    let mut rig = rig(Role::Host);

    rig.coord.handle_command(CommandEvent::Ready).await;
    assert_eq!(rig.coord.phase(), MatchPhase::AwaitingReady);

    assert!(rig.coord.mark_ready().await);
    assert_eq!(rig.coord.phase(), MatchPhase::InProgress { our_turn: true });
}

#[tokio::test]
async fn test_peer_waits_for_game_start() {
    let mut rig = rig(Role::Peer);

    assert!(rig.coord.mark_ready().await);
    rig.coord.handle_command(CommandEvent::Ready).await;
    assert_eq!(rig.coord.phase(), MatchPhase::AwaitingStart);
    // The peer never decides turn order.
    assert_eq!(rig.sink.take_commands(), vec!["READY_TO_START"]);

    rig.coord
        .handle_command(CommandEvent::GameStart { go_first: false })
        .await;
    assert_eq!(rig.coord.phase(), MatchPhase::InProgress { our_turn: false });
    assert!(drain(&mut rig.events).contains(&GameEvent::Started { our_turn: false }));
}

#[tokio::test]
async fn test_start_transition_fires_exactly_once() {
    let mut rig = started_host().await;

    rig.coord.handle_command(CommandEvent::Ready).await;
    rig.coord.handle_command(CommandEvent::Ready).await;
    let frames = rig.sink.take_commands();
    assert!(
        !frames.iter().any(|f| f.starts_with("GAME_START")),
        "start must not fire again: {frames:?}"
    );
    assert_eq!(rig.coord.phase(), MatchPhase::InProgress { our_turn: true });
}

#[tokio::test]
async fn test_ready_send_failure_leaves_state_unchanged() {
    let mut rig = rig(Role::Host);
    rig.sink.set_connected(false);
    assert!(!rig.coord.mark_ready().await);
    rig.sink.set_connected(true);
    assert!(rig.coord.mark_ready().await);
    assert_eq!(rig.sink.take_commands(), vec!["READY_TO_START"]);
}

#[tokio::test]
async fn test_turn_owner_strictly_alternates() {
    let mut rig = started_host().await;

    for i in 0..4u8 {
        // Our attack is answered: turn flips to the opponent.
        assert!(rig.coord.send_attack(Position::new(9, i)).await);
        assert_eq!(rig.coord.phase(), MatchPhase::InProgress { our_turn: true });
        rig.coord
            .handle_command(CommandEvent::AttackResult {
                outcome: Outcome::Miss,
                position: Position::new(9, i),
            })
            .await;
        assert_eq!(rig.coord.phase(), MatchPhase::InProgress { our_turn: false });

        // The opponent's attack is answered: turn flips back to us.
        rig.coord
            .handle_command(CommandEvent::Attack(Position::new(9, i)))
            .await;
        assert_eq!(rig.coord.phase(), MatchPhase::InProgress { our_turn: true });
    }
}

#[tokio::test]
async fn test_turn_does_not_flip_while_attack_is_pending() {
    let mut rig = started_host().await;

    assert!(rig.coord.send_attack(Position::new(9, 0)).await);
    assert_eq!(rig.coord.phase(), MatchPhase::InProgress { our_turn: true });
    assert_eq!(rig.coord.pending_attack(), Some(Position::new(9, 0)));

    // A second attack while the first is unanswered is refused.
    assert!(!rig.coord.send_attack(Position::new(9, 1)).await);
    let events = drain(&mut rig.events);
    assert!(events.contains(&GameEvent::AttackRejected {
        position: Position::new(9, 1),
        reason: RejectReason::AttackPending
    }));
}

#[tokio::test]
async fn test_duplicate_attack_rejected_without_side_effects() {
    let mut rig = started_host().await;

    assert!(rig.coord.send_attack(Position::new(9, 9)).await);
    rig.coord
        .handle_command(CommandEvent::AttackResult {
            outcome: Outcome::Miss,
            position: Position::new(9, 9),
        })
        .await;
    rig.coord
        .handle_command(CommandEvent::Attack(Position::new(0, 9)))
        .await;
    assert_eq!(rig.coord.phase(), MatchPhase::InProgress { our_turn: true });
    rig.sink.take_commands();
    drain(&mut rig.events);

    // Same coordinate again: refused, no frame, turn unchanged.
    assert!(!rig.coord.send_attack(Position::new(9, 9)).await);
    assert!(rig.sink.take_commands().is_empty());
    assert_eq!(rig.coord.phase(), MatchPhase::InProgress { our_turn: true });
    let events = drain(&mut rig.events);
    assert!(events.contains(&GameEvent::AttackRejected {
        position: Position::new(9, 9),
        reason: RejectReason::AlreadyAttacked
    }));
}

#[tokio::test]
async fn test_attack_rejected_before_start_and_out_of_turn() {
    let mut rig = rig(Role::Host);
    assert!(!rig.coord.send_attack(Position::new(0, 0)).await);
    assert!(drain(&mut rig.events).contains(&GameEvent::AttackRejected {
        position: Position::new(0, 0),
        reason: RejectReason::NotStarted
    }));

    let mut rig = started_peer_with_board(placed_board()).await;
    assert!(!rig.coord.send_attack(Position::new(0, 0)).await);
    assert!(drain(&mut rig.events).contains(&GameEvent::AttackRejected {
        position: Position::new(0, 0),
        reason: RejectReason::NotOurTurn
    }));
}

#[tokio::test]
async fn test_hit_result_does_not_touch_the_ledger() {
    let mut rig = started_host().await;

    assert!(rig.coord.send_attack(Position::new(3, 4)).await);
    rig.coord
        .handle_command(CommandEvent::AttackResult {
            outcome: Outcome::Hit,
            position: Position::new(3, 4),
        })
        .await;

    assert_eq!(rig.coord.ledger().sunk_count(), 0);
    assert_eq!(rig.coord.phase(), MatchPhase::InProgress { our_turn: false });
    let events = drain(&mut rig.events);
    assert!(events.contains(&GameEvent::AttackResolved {
        position: Position::new(3, 4),
        outcome: Outcome::Hit
    }));
}

#[tokio::test]
async fn test_five_sunk_results_win_the_match() {
    let mut rig = started_host().await;

    for i in 0..FLEET_SIZE as u8 {
        assert!(rig.coord.send_attack(Position::new(9, i)).await);
        rig.coord
            .handle_command(CommandEvent::AttackResult {
                outcome: Outcome::Sunk,
                position: Position::new(9, i),
            })
            .await;
        assert_eq!(rig.coord.ledger().sunk_count(), i as usize + 1);

        if i < FLEET_SIZE as u8 - 1 {
            // Hand the turn back so we can attack again.
            rig.coord
                .handle_command(CommandEvent::Attack(Position::new(8, i)))
                .await;
        }
    }

    assert_eq!(rig.coord.phase(), MatchPhase::Over { we_won: true });
    let frames = rig.sink.take_commands();
    assert!(frames.contains(&"GAME_OVER:WINNER".to_string()), "{frames:?}");
    assert!(drain(&mut rig.events).contains(&GameEvent::GameOver {
        we_won: true,
        reason: GameOverReason::FleetSwept
    }));

    // Terminal: further results are ignored and the ledger stays capped.
    rig.coord
        .handle_command(CommandEvent::AttackResult {
            outcome: Outcome::Sunk,
            position: Position::new(7, 7),
        })
        .await;
    assert_eq!(rig.coord.ledger().sunk_count(), FLEET_SIZE);
}

#[test]
fn test_ledger_is_monotonic_and_capped() {
    let mut ledger = ShipLedger::new();
    let mut last = 0;
    for _ in 0..FLEET_SIZE + 2 {
        ledger.mark_next_sunk();
        assert!(ledger.sunk_count() >= last);
        last = ledger.sunk_count();
    }
    assert_eq!(ledger.sunk_count(), FLEET_SIZE);
    assert_eq!(ledger.remaining(), 0);
    assert!(ledger.all_sunk());
}

#[tokio::test]
async fn test_inbound_attack_is_resolved_and_answered() {
    let mut rig = started_peer_with_board(placed_board()).await;

    rig.coord
        .handle_command(CommandEvent::Attack(Position::new(0, 0)))
        .await;
    assert_eq!(rig.sink.take_commands(), vec!["ATTACK_RESULT:HIT:0,0"]);
    assert_eq!(rig.coord.phase(), MatchPhase::InProgress { our_turn: true });

    let events = drain(&mut rig.events);
    assert!(events.contains(&GameEvent::AttackIncoming {
        position: Position::new(0, 0),
        outcome: broadside::AttackOutcome::Hit
    }));
    assert!(events.contains(&GameEvent::TurnChanged { our_turn: true }));
}

#[tokio::test]
async fn test_repeated_inbound_attack_gets_no_answer() {
    let mut rig = started_peer_with_board(placed_board()).await;

    rig.coord
        .handle_command(CommandEvent::Attack(Position::new(0, 0)))
        .await;
    rig.sink.take_commands();

    // Round-trip our own attack to hand the turn back to the opponent.
    assert!(rig.coord.send_attack(Position::new(9, 9)).await);
    rig.coord
        .handle_command(CommandEvent::AttackResult {
            outcome: Outcome::Miss,
            position: Position::new(9, 9),
        })
        .await;
    rig.sink.take_commands();

    // The same coordinate again: no result frame, no turn flip.
    rig.coord
        .handle_command(CommandEvent::Attack(Position::new(0, 0)))
        .await;
    assert!(rig.sink.take_commands().is_empty());
    assert_eq!(rig.coord.phase(), MatchPhase::InProgress { our_turn: false });
}

#[tokio::test]
async fn test_losing_side_reports_its_own_defeat() {
    let mut rig = started_peer_with_board(single_ship_board()).await;

    rig.coord
        .handle_command(CommandEvent::Attack(Position::new(0, 0)))
        .await;
    rig.sink.take_commands();
    // Round-trip to return the turn to the opponent.
    assert!(rig.coord.send_attack(Position::new(9, 9)).await);
    rig.coord
        .handle_command(CommandEvent::AttackResult {
            outcome: Outcome::Miss,
            position: Position::new(9, 9),
        })
        .await;

    rig.coord
        .handle_command(CommandEvent::Attack(Position::new(0, 1)))
        .await;

    assert_eq!(rig.coord.phase(), MatchPhase::Over { we_won: false });
    let frames = rig.sink.take_commands();
    assert!(frames.contains(&"ATTACK_RESULT:SUNK:0,1".to_string()), "{frames:?}");
    assert!(frames.contains(&"GAME_OVER:LOSER".to_string()), "{frames:?}");
    assert!(drain(&mut rig.events).contains(&GameEvent::GameOver {
        we_won: false,
        reason: GameOverReason::FleetLost
    }));
}

#[tokio::test]
async fn test_received_game_over_mirrors_the_senders_result() {
    let mut rig = started_host().await;
    rig.coord
        .handle_command(CommandEvent::GameOver { remote_won: true })
        .await;
    assert_eq!(rig.coord.phase(), MatchPhase::Over { we_won: false });
    assert!(drain(&mut rig.events).contains(&GameEvent::GameOver {
        we_won: false,
        reason: GameOverReason::RemoteDeclared
    }));
}

#[tokio::test]
async fn test_surrender_and_forfeit_paths() {
    // Local surrender loses.
    let mut rig = started_host().await;
    assert!(rig.coord.surrender().await);
    assert_eq!(rig.coord.phase(), MatchPhase::Over { we_won: false });
    assert_eq!(rig.sink.take_commands(), vec!["SURRENDER"]);

    // Opponent surrender wins.
    let mut rig = started_host().await;
    rig.coord.handle_command(CommandEvent::Surrender).await;
    assert_eq!(rig.coord.phase(), MatchPhase::Over { we_won: true });
    assert!(drain(&mut rig.events).contains(&GameEvent::GameOver {
        we_won: true,
        reason: GameOverReason::OpponentSurrendered
    }));

    // Opponent disconnect wins.
    let mut rig = started_host().await;
    rig.coord.handle_command(CommandEvent::Disconnect).await;
    assert_eq!(rig.coord.phase(), MatchPhase::Over { we_won: true });

    // Abrupt channel loss counts as a forfeit too.
    let mut rig = started_host().await;
    rig.coord.handle_command(CommandEvent::ChannelClosed).await;
    assert_eq!(rig.coord.phase(), MatchPhase::Over { we_won: true });
    assert!(drain(&mut rig.events).contains(&GameEvent::GameOver {
        we_won: true,
        reason: GameOverReason::ConnectionLost
    }));
}

#[tokio::test]
async fn test_surrender_requires_a_running_match() {
    let mut rig = rig(Role::Host);
    assert!(!rig.coord.surrender().await);
    assert_eq!(rig.coord.phase(), MatchPhase::AwaitingReady);
}

#[tokio::test]
async fn test_attacks_after_the_match_is_over_are_ignored() {
    let mut rig = started_host().await;
    rig.coord.handle_command(CommandEvent::Surrender).await;
    rig.sink.take_commands();
    drain(&mut rig.events);

    rig.coord
        .handle_command(CommandEvent::Attack(Position::new(0, 0)))
        .await;
    rig.coord
        .handle_command(CommandEvent::AttackResult {
            outcome: Outcome::Hit,
            position: Position::new(1, 1),
        })
        .await;
    assert!(rig.sink.take_commands().is_empty());
    assert!(drain(&mut rig.events).is_empty());
    assert_eq!(rig.coord.phase(), MatchPhase::Over { we_won: true });
}

#[tokio::test]
async fn test_unmatched_attack_result_is_ignored() {
    let mut rig = started_host().await;

    assert!(rig.coord.send_attack(Position::new(9, 0)).await);
    rig.coord
        .handle_command(CommandEvent::AttackResult {
            outcome: Outcome::Hit,
            position: Position::new(5, 5),
        })
        .await;

    // Wrong coordinate: nothing recorded, attack still pending.
    assert_eq!(rig.coord.pending_attack(), Some(Position::new(9, 0)));
    assert_eq!(rig.coord.phase(), MatchPhase::InProgress { our_turn: true });
    assert_eq!(rig.coord.ledger().sunk_count(), 0);
}

#[tokio::test]
async fn test_turn_end_yields_the_turn() {
    let mut rig = started_host().await;
    rig.coord.handle_command(CommandEvent::TurnEnd).await;
    assert_eq!(rig.coord.phase(), MatchPhase::InProgress { our_turn: false });
}

#[tokio::test]
async fn test_hover_last_delivered_wins() {
    let mut rig = started_host().await;
    let a = Position::new(1, 1);
    let b = Position::new(2, 2);

    rig.coord.handle_signal(SignalEvent::Hover(Some(a))).await;
    rig.coord.handle_signal(SignalEvent::Hover(Some(b))).await;
    assert_eq!(rig.coord.opponent_hover(), Some(b));

    // The sentinel clears the stored position.
    rig.coord.handle_signal(SignalEvent::Hover(None)).await;
    assert_eq!(rig.coord.opponent_hover(), None);

    // Datagram reordering: B was sent after A but delivered first; the
    // stored value is whatever arrived last, not what was sent last.
    rig.coord.handle_signal(SignalEvent::Hover(Some(b))).await;
    rig.coord.handle_signal(SignalEvent::Hover(Some(a))).await;
    assert_eq!(rig.coord.opponent_hover(), Some(a));

    let events = drain(&mut rig.events);
    assert!(events.contains(&GameEvent::OpponentHover(Some(a))));
    assert!(events.contains(&GameEvent::OpponentHover(None)));
}

#[tokio::test]
async fn test_ping_elicits_pong_and_pong_is_inert() {
    let mut rig = started_host().await;

    rig.coord.handle_signal(SignalEvent::Ping).await;
    assert_eq!(rig.sink.take_signals(), vec!["PONG"]);
    assert!(drain(&mut rig.events).contains(&GameEvent::PingReceived));

    rig.coord.handle_signal(SignalEvent::Pong).await;
    assert!(rig.sink.take_signals().is_empty());
    assert!(drain(&mut rig.events).is_empty());
}

#[tokio::test]
async fn test_reset_clears_ready_flags_and_ledger() {
    let mut rig = started_host().await;

    assert!(rig.coord.send_attack(Position::new(9, 0)).await);
    rig.coord
        .handle_command(CommandEvent::AttackResult {
            outcome: Outcome::Sunk,
            position: Position::new(9, 0),
        })
        .await;
    rig.coord.handle_command(CommandEvent::Surrender).await;
    assert_eq!(rig.coord.phase(), MatchPhase::Over { we_won: true });

    rig.coord.reset(placed_board());
    assert_eq!(rig.coord.phase(), MatchPhase::AwaitingReady);
    assert_eq!(rig.coord.ledger().sunk_count(), 0);
    assert_eq!(rig.coord.pending_attack(), None);
    assert!(!rig.coord.opponent_view().was_attacked(Position::new(9, 0)));

    // The handshake gates a second time.
    rig.sink.take_commands();
    assert!(rig.coord.mark_ready().await);
    assert_eq!(rig.coord.phase(), MatchPhase::AwaitingReady);
    rig.coord.handle_command(CommandEvent::Ready).await;
    assert_eq!(rig.coord.phase(), MatchPhase::InProgress { our_turn: true });
}

#[tokio::test]
async fn test_hover_send_uses_the_signal_channel() {
    let rig = started_host().await;
    assert!(rig.coord.send_hover(Some(Position::new(4, 2))).await);
    assert!(rig.coord.send_hover(None).await);
    assert_eq!(rig.sink.take_signals(), vec!["HOVER:4,2", "HOVER:null"]);
    assert!(rig.sink.take_commands().is_empty());
}
