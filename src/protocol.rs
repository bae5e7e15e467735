//! Text wire protocol: stateless frame encoding, parsing and validation.
//!
//! Frames have the shape `COMMAND[:ARG1[:ARG2]]`. Coordinates are encoded
//! `row,col`; the literal `null` stands for a cleared hover. Parsing never
//! panics; malformed input yields a [`ProtocolError`] and the frame is
//! dropped by the caller.

use crate::common::Position;

pub const SEPARATOR: char = ':';
pub const COORD_SEPARATOR: char = ',';
pub const NULL_VALUE: &str = "null";

const READY_TO_START: &str = "READY_TO_START";
const GAME_START: &str = "GAME_START";
const ATTACK: &str = "ATTACK";
const ATTACK_RESULT: &str = "ATTACK_RESULT";
const TURN_END: &str = "TURN_END";
const GAME_OVER: &str = "GAME_OVER";
const DISCONNECT: &str = "DISCONNECT";
const SURRENDER: &str = "SURRENDER";
const HOVER: &str = "HOVER";
const PING: &str = "PING";
const PONG: &str = "PONG";
const FIRST_PLAYER: &str = "FIRST";
const SECOND_PLAYER: &str = "SECOND";
const WINNER: &str = "WINNER";
const LOSER: &str = "LOSER";
const HIT: &str = "HIT";
const MISS: &str = "MISS";
const SUNK: &str = "SUNK";

/// Reliable-channel frames that carry the sender's UDP port. They are
/// consumed by the transport during setup and never reach the dispatcher.
pub const UDP_PORT_PREFIX: &str = "UDP_PORT:";
pub const CLIENT_UDP_PORT_PREFIX: &str = "CLIENT_UDP_PORT:";

/// Turn order assigned to the frame's receiver by GAME_START.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOrder {
    First,
    Second,
}

/// Attack outcome as carried by ATTACK_RESULT. Unlike
/// [`crate::common::AttackOutcome`] there is no `Invalid`: rule violations
/// are rejected locally and never answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Hit,
    Miss,
    Sunk,
}

/// Match result declared by GAME_OVER, from the sender's own perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    Winner,
    Loser,
}

/// One complete protocol frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// Sender has placed its fleet and is ready to start.
    Ready,
    /// Sender assigns the receiver its turn order.
    GameStart(TurnOrder),
    /// Sender attacks the receiver's board.
    Attack(Position),
    /// Outcome of an attack previously received.
    AttackResult(Outcome, Position),
    /// Explicit end-of-turn signal; turns also end implicitly on
    /// `AttackResult`.
    TurnEnd,
    /// Sender declares the match result from its own perspective.
    GameOver(MatchResult),
    /// Orderly teardown notice.
    Disconnect,
    /// Sender forfeits.
    Surrender,
    /// Best-effort pointer position; `None` clears it. Unreliable channel
    /// only.
    Hover(Option<Position>),
    /// Liveness probe, unreliable channel only.
    Ping,
    /// Liveness response, unreliable channel only.
    Pong,
    /// Sender's UDP port, exchanged over the reliable channel during setup.
    /// `from_host` distinguishes the host's frame from the peer's.
    PortExchange { from_host: bool, port: u16 },
}

/// Why a frame failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    Empty,
    UnknownCommand,
    WrongArity,
    BadCoordinate,
    BadArgument,
}

impl core::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ProtocolError::Empty => write!(f, "empty frame"),
            ProtocolError::UnknownCommand => write!(f, "unknown command"),
            ProtocolError::WrongArity => write!(f, "wrong argument count"),
            ProtocolError::BadCoordinate => write!(f, "malformed coordinate"),
            ProtocolError::BadArgument => write!(f, "argument outside its domain"),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl Message {
    /// Encode the frame as wire text. Inverse of [`parse`]:
    /// `parse(&msg.encode()) == Ok(msg)` for every message.
    pub fn encode(&self) -> String {
        match self {
            Message::Ready => READY_TO_START.to_string(),
            Message::GameStart(order) => {
                let arg = match order {
                    TurnOrder::First => FIRST_PLAYER,
                    TurnOrder::Second => SECOND_PLAYER,
                };
                format!("{GAME_START}{SEPARATOR}{arg}")
            }
            Message::Attack(pos) => {
                format!("{ATTACK}{SEPARATOR}{}", encode_coordinate(*pos))
            }
            Message::AttackResult(outcome, pos) => {
                let arg = match outcome {
                    Outcome::Hit => HIT,
                    Outcome::Miss => MISS,
                    Outcome::Sunk => SUNK,
                };
                format!(
                    "{ATTACK_RESULT}{SEPARATOR}{arg}{SEPARATOR}{}",
                    encode_coordinate(*pos)
                )
            }
            Message::TurnEnd => TURN_END.to_string(),
            Message::GameOver(result) => {
                let arg = match result {
                    MatchResult::Winner => WINNER,
                    MatchResult::Loser => LOSER,
                };
                format!("{GAME_OVER}{SEPARATOR}{arg}")
            }
            Message::Disconnect => DISCONNECT.to_string(),
            Message::Surrender => SURRENDER.to_string(),
            Message::Hover(Some(pos)) => {
                format!("{HOVER}{SEPARATOR}{}", encode_coordinate(*pos))
            }
            Message::Hover(None) => format!("{HOVER}{SEPARATOR}{NULL_VALUE}"),
            Message::Ping => PING.to_string(),
            Message::Pong => PONG.to_string(),
            Message::PortExchange { from_host, port } => {
                let prefix = if *from_host {
                    UDP_PORT_PREFIX
                } else {
                    CLIENT_UDP_PORT_PREFIX
                };
                format!("{prefix}{port}")
            }
        }
    }
}

fn encode_coordinate(pos: Position) -> String {
    format!("{}{COORD_SEPARATOR}{}", pos.row, pos.col)
}

fn parse_coordinate(text: &str) -> Result<Position, ProtocolError> {
    let mut fields = text.split(COORD_SEPARATOR);
    let row = fields.next().ok_or(ProtocolError::BadCoordinate)?;
    let col = fields.next().ok_or(ProtocolError::BadCoordinate)?;
    if fields.next().is_some() {
        return Err(ProtocolError::BadCoordinate);
    }
    let row = row
        .trim()
        .parse::<u8>()
        .map_err(|_| ProtocolError::BadCoordinate)?;
    let col = col
        .trim()
        .parse::<u8>()
        .map_err(|_| ProtocolError::BadCoordinate)?;
    Ok(Position::new(row, col))
}

/// Parse one frame of wire text.
pub fn parse(frame: &str) -> Result<Message, ProtocolError> {
    if frame.trim().is_empty() {
        return Err(ProtocolError::Empty);
    }
    if let Some(port) = frame.strip_prefix(UDP_PORT_PREFIX) {
        let port = port.parse::<u16>().map_err(|_| ProtocolError::BadArgument)?;
        return Ok(Message::PortExchange {
            from_host: true,
            port,
        });
    }
    if let Some(port) = frame.strip_prefix(CLIENT_UDP_PORT_PREFIX) {
        let port = port.parse::<u16>().map_err(|_| ProtocolError::BadArgument)?;
        return Ok(Message::PortExchange {
            from_host: false,
            port,
        });
    }

    let parts: Vec<&str> = frame.split(SEPARATOR).collect();
    let (command, args) = (parts[0], &parts[1..]);
    match command {
        READY_TO_START | TURN_END | DISCONNECT | SURRENDER | PING | PONG => {
            if !args.is_empty() {
                return Err(ProtocolError::WrongArity);
            }
            Ok(match command {
                READY_TO_START => Message::Ready,
                TURN_END => Message::TurnEnd,
                DISCONNECT => Message::Disconnect,
                SURRENDER => Message::Surrender,
                PING => Message::Ping,
                _ => Message::Pong,
            })
        }
        GAME_START => match args {
            [order] => match *order {
                FIRST_PLAYER => Ok(Message::GameStart(TurnOrder::First)),
                SECOND_PLAYER => Ok(Message::GameStart(TurnOrder::Second)),
                _ => Err(ProtocolError::BadArgument),
            },
            _ => Err(ProtocolError::WrongArity),
        },
        GAME_OVER => match args {
            [result] => match *result {
                WINNER => Ok(Message::GameOver(MatchResult::Winner)),
                LOSER => Ok(Message::GameOver(MatchResult::Loser)),
                _ => Err(ProtocolError::BadArgument),
            },
            _ => Err(ProtocolError::WrongArity),
        },
        ATTACK => match args {
            [coord] => Ok(Message::Attack(parse_coordinate(coord)?)),
            _ => Err(ProtocolError::WrongArity),
        },
        ATTACK_RESULT => match args {
            [outcome, coord] => {
                let outcome = match *outcome {
                    HIT => Outcome::Hit,
                    MISS => Outcome::Miss,
                    SUNK => Outcome::Sunk,
                    _ => return Err(ProtocolError::BadArgument),
                };
                Ok(Message::AttackResult(outcome, parse_coordinate(coord)?))
            }
            _ => Err(ProtocolError::WrongArity),
        },
        HOVER => match args {
            [arg] if *arg == NULL_VALUE => Ok(Message::Hover(None)),
            [coord] => Ok(Message::Hover(Some(parse_coordinate(coord)?))),
            _ => Err(ProtocolError::WrongArity),
        },
        _ => Err(ProtocolError::UnknownCommand),
    }
}

/// Syntactic validation only; parse with [`parse`] afterwards.
pub fn is_valid(frame: &str) -> bool {
    parse(frame).is_ok()
}
