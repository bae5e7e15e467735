use std::sync::Arc;

use clap::{Parser, Subcommand};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use broadside::{
    init_logging, Board, Cell, CommandEvent, Connection, Dispatcher, GameEvent, GameOverReason,
    MatchCoordinator, MatchPhase, Position, RejectReason, Role, SignalEvent, BOARD_SIZE,
    DEFAULT_TCP_PORT, DEFAULT_UDP_PORT,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Host a match and wait for an opponent to connect.
    Host {
        #[arg(long, default_value_t = DEFAULT_TCP_PORT)]
        tcp_port: u16,
        #[arg(long, default_value_t = DEFAULT_UDP_PORT)]
        udp_port: u16,
        #[arg(long, help = "Fix RNG seed for reproducible fleet placement")]
        seed: Option<u64>,
    },
    /// Join a hosted match.
    Join {
        #[arg(long, default_value = "127.0.0.1")]
        connect: String,
        #[arg(long, default_value_t = DEFAULT_TCP_PORT)]
        tcp_port: u16,
        #[arg(long, default_value_t = DEFAULT_UDP_PORT)]
        udp_port: u16,
        #[arg(long, help = "Fix RNG seed for reproducible fleet placement")]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Host {
            tcp_port,
            udp_port,
            seed,
        } => {
            println!("Hosting on tcp:{tcp_port} udp:{udp_port}. Waiting for an opponent...");
            let (dispatcher, commands, signals) = Dispatcher::new();
            let conn = Connection::host(tcp_port, udp_port, dispatcher).await?;
            println!("Opponent connected!");
            play(Role::Host, conn, commands, signals, seed).await
        }
        Commands::Join {
            connect,
            tcp_port,
            udp_port,
            seed,
        } => {
            println!("Connecting to {connect}:{tcp_port}...");
            let (dispatcher, commands, signals) = Dispatcher::new();
            let conn =
                Connection::connect((connect.as_str(), tcp_port), udp_port, dispatcher).await?;
            println!("Connected!");
            play(Role::Peer, conn, commands, signals, seed).await
        }
    }
}

async fn play(
    role: Role,
    conn: Connection,
    mut commands: mpsc::UnboundedReceiver<CommandEvent>,
    mut signals: mpsc::UnboundedReceiver<SignalEvent>,
    seed: Option<u64>,
) -> anyhow::Result<()> {
    let mut rng = match seed {
        Some(s) => {
            println!("Using fixed seed: {s}");
            SmallRng::seed_from_u64(s)
        }
        None => {
            let mut seed_rng = rand::rng();
            SmallRng::from_rng(&mut seed_rng)
        }
    };

    let mut board = Board::new(BOARD_SIZE);
    board.place_fleet_randomly(&mut rng)?;

    let conn = Arc::new(conn);
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let mut coord = MatchCoordinator::new(role, board, conn.clone(), events_tx);

    print_boards(&coord);
    coord.mark_ready().await;
    println!("Fleet placed. Waiting for the opponent...");
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            Some(cmd) = commands.recv() => coord.handle_command(cmd).await,
            Some(sig) = signals.recv() => coord.handle_signal(sig).await,
            Ok(Some(line)) = lines.next_line() => handle_input(&mut coord, line.trim()).await,
            Some(event) = events.recv() => report(event),
            else => break,
        }

        if let MatchPhase::Over { we_won } = coord.phase() {
            while let Ok(event) = events.try_recv() {
                report(event);
            }
            print_boards(&coord);
            if we_won {
                println!("\nVICTORY! You have won the match.");
            } else {
                println!("\nDEFEAT. Better luck next time.");
            }
            break;
        }
    }

    coord.send_disconnect().await;
    conn.shutdown().await;
    Ok(())
}

async fn handle_input(coord: &mut MatchCoordinator, line: &str) {
    let mut words = line.split_whitespace();
    match words.next() {
        Some("attack") | Some("a") => match parse_coords(words.next(), words.next()) {
            Some(pos) => {
                if coord.send_attack(pos).await {
                    println!("Attacking {pos}...");
                }
            }
            None => println!("Usage: attack <row> <col>"),
        },
        Some("hover") | Some("h") => match parse_coords(words.next(), words.next()) {
            Some(pos) => {
                coord.send_hover(Some(pos)).await;
            }
            None => {
                coord.send_hover(None).await;
            }
        },
        Some("board") | Some("b") => print_boards(coord),
        Some("ships") => print_ships(coord),
        Some("surrender") => {
            if coord.surrender().await {
                println!("You surrendered.");
            } else {
                println!("Nothing to surrender yet.");
            }
        }
        Some("help") => print_help(),
        Some(other) => println!("Unknown command '{other}'. Type 'help'."),
        None => {}
    }
}

fn parse_coords(row: Option<&str>, col: Option<&str>) -> Option<Position> {
    let row = row?.parse::<u8>().ok()?;
    let col = col?.parse::<u8>().ok()?;
    Some(Position::new(row, col))
}

fn report(event: GameEvent) {
    match event {
        GameEvent::OpponentReady => println!("Opponent is ready."),
        GameEvent::Started { our_turn } => {
            if our_turn {
                println!("Game started! You go first.");
            } else {
                println!("Game started! Opponent goes first.");
            }
        }
        GameEvent::AttackIncoming { position, outcome } => {
            println!("Opponent attacked {position} - {}", outcome_text(outcome));
        }
        GameEvent::AttackResolved { position, outcome } => {
            let text = match outcome {
                broadside::Outcome::Hit => "Hit!",
                broadside::Outcome::Miss => "Miss!",
                broadside::Outcome::Sunk => "Ship sunk!",
            };
            println!("Your attack on {position} - {text}");
        }
        GameEvent::AttackRejected { position, reason } => {
            let text = match reason {
                RejectReason::NotStarted => "the game has not started yet",
                RejectReason::NotOurTurn => "wait for your turn",
                RejectReason::AttackPending => "your previous attack is still unanswered",
                RejectReason::AlreadyAttacked => "you already attacked this position",
                RejectReason::MatchOver => "the match is over",
                RejectReason::SendFailed => "the attack could not be sent",
            };
            println!("Attack on {position} rejected: {text}.");
        }
        GameEvent::TurnChanged { our_turn } => {
            if our_turn {
                println!("Your turn.");
            } else {
                println!("Opponent's turn.");
            }
        }
        GameEvent::GameOver { reason, .. } => {
            let text = match reason {
                GameOverReason::FleetLost => "All your ships were sunk.",
                GameOverReason::FleetSwept => "You sank all opponent ships!",
                GameOverReason::RemoteDeclared => "The opponent declared the result.",
                GameOverReason::OpponentSurrendered => "Opponent surrendered.",
                GameOverReason::OpponentDisconnected => "Opponent disconnected.",
                GameOverReason::LocalSurrender => "You surrendered.",
                GameOverReason::ConnectionLost => "Connection lost.",
            };
            println!("{text}");
        }
        GameEvent::OpponentHover(Some(position)) => {
            println!("Opponent is aiming at {position}.");
        }
        GameEvent::OpponentHover(None) => {}
        GameEvent::PingReceived => {}
    }
}

fn outcome_text(outcome: broadside::AttackOutcome) -> &'static str {
    match outcome {
        broadside::AttackOutcome::Hit => "Hit!",
        broadside::AttackOutcome::Miss => "Miss!",
        broadside::AttackOutcome::Sunk => "Ship sunk!",
        broadside::AttackOutcome::Invalid => "Invalid.",
    }
}

fn cell_char(cell: Cell, reveal_ships: bool) -> char {
    match cell {
        Cell::Water => '~',
        Cell::Ship => {
            if reveal_ships {
                'S'
            } else {
                '~'
            }
        }
        Cell::Hit => 'X',
        Cell::Miss => 'O',
        Cell::Sunk => '#',
    }
}

fn print_boards(coord: &MatchCoordinator) {
    let own = coord.board();
    let enemy = coord.opponent_view();
    let size = own.size();

    println!("\n    Your fleet{:pad$}Enemy waters", "", pad = 2 * size - 8);
    print!("   ");
    for c in 0..size {
        print!("{c} ");
    }
    print!("     ");
    for c in 0..size {
        print!("{c} ");
    }
    println!();
    for r in 0..size {
        print!("{r:2} ");
        for c in 0..size {
            let cell = own.cell(Position::new(r as u8, c as u8)).unwrap_or(Cell::Water);
            print!("{} ", cell_char(cell, true));
        }
        print!("  {r:2} ");
        for c in 0..size {
            let cell = enemy
                .cell(Position::new(r as u8, c as u8))
                .unwrap_or(Cell::Water);
            print!("{} ", cell_char(cell, false));
        }
        println!();
    }
    println!(
        "Ships afloat - you: {}/{}, opponent: {}/{}",
        own.ships_afloat(),
        own.ships().len(),
        coord.ledger().remaining(),
        coord.ledger().entries().len()
    );
}

fn print_ships(coord: &MatchCoordinator) {
    println!("Your fleet:");
    for ship in coord.board().ships() {
        let state = if ship.is_sunk() {
            "sunk"
        } else {
            "afloat"
        };
        println!(
            "  {:<12} size {} - {} ({} hits)",
            ship.name(),
            ship.length(),
            state,
            ship.hit_count()
        );
    }
    println!("Opponent fleet (estimated):");
    for entry in coord.ledger().entries() {
        let state = if entry.is_sunk() { "sunk" } else { "afloat" };
        println!("  {:<12} size {} - {}", entry.name(), entry.length(), state);
    }
}

fn print_help() {
    println!("Commands:");
    println!("  attack <row> <col>   fire at the enemy board");
    println!("  hover [<row> <col>]  share your aim; no arguments clears it");
    println!("  board                show both boards");
    println!("  ships                show fleet status");
    println!("  surrender            forfeit the match");
    println!("  help                 show this message");
}
