use crate::ship::ShipClass;

pub const BOARD_SIZE: usize = 10;
pub const FLEET_SIZE: usize = 5;

/// Standard fleet, largest first. Both boards and the opponent ledger are
/// built from this list.
pub const FLEET: [ShipClass; FLEET_SIZE] = [
    ShipClass::new("Carrier", 5),
    ShipClass::new("Battleship", 4),
    ShipClass::new("Cruiser", 3),
    ShipClass::new("Submarine", 3),
    ShipClass::new("Destroyer", 2),
];

/// Canonical port the host binds for the reliable (TCP) channel.
pub const DEFAULT_TCP_PORT: u16 = 5000;
/// Canonical port the host binds for the unreliable (UDP) channel. The
/// peer's own UDP port is ephemeral and carried by the port exchange.
pub const DEFAULT_UDP_PORT: u16 = 5001;
