//! The locally-owned game board.
//!
//! The network layer only ever calls [`Board::process_attack`],
//! [`Board::all_ships_sunk`] and [`Board::mark_external_outcome`]; everything
//! else serves placement and display.

use rand::rngs::SmallRng;
use rand::Rng;

use crate::common::{AttackOutcome, BoardError, Position};
use crate::config::FLEET;
use crate::ship::{Orientation, Ship, ShipClass};

/// Attempts per ship before random placement gives up.
const MAX_PLACEMENT_ATTEMPTS: usize = 200;

/// Display state of one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Water,
    Ship,
    Hit,
    Miss,
    Sunk,
}

pub struct Board {
    size: usize,
    grid: Vec<Vec<Cell>>,
    ships: Vec<Ship>,
    attacked: Vec<Position>,
}

impl Board {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            grid: vec![vec![Cell::Water; size]; size],
            ships: Vec::new(),
            attacked: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn cell(&self, pos: Position) -> Option<Cell> {
        if pos.in_bounds(self.size) {
            Some(self.grid[pos.row as usize][pos.col as usize])
        } else {
            None
        }
    }

    pub fn ships(&self) -> &[Ship] {
        &self.ships
    }

    pub fn ships_afloat(&self) -> usize {
        self.ships.iter().filter(|s| !s.is_sunk()).count()
    }

    pub fn attacked(&self) -> &[Position] {
        &self.attacked
    }

    pub fn was_attacked(&self, pos: Position) -> bool {
        self.attacked.contains(&pos)
    }

    /// Place one ship. Fails if it leaves the grid or overlaps another ship.
    pub fn place_ship(
        &mut self,
        class: ShipClass,
        start: Position,
        orientation: Orientation,
    ) -> Result<(), BoardError> {
        let cells = Ship::footprint(start, orientation, class.length(), self.size)
            .ok_or(BoardError::OutOfBounds)?;
        if cells
            .iter()
            .any(|p| self.grid[p.row as usize][p.col as usize] != Cell::Water)
        {
            return Err(BoardError::ShipOverlaps);
        }
        for p in &cells {
            self.grid[p.row as usize][p.col as usize] = Cell::Ship;
        }
        self.ships.push(Ship::placed(class, cells));
        Ok(())
    }

    /// Place the whole standard fleet at random positions.
    pub fn place_fleet_randomly(&mut self, rng: &mut SmallRng) -> Result<(), BoardError> {
        for class in FLEET {
            let mut placed = false;
            for _ in 0..MAX_PLACEMENT_ATTEMPTS {
                let orientation = if rng.random_bool(0.5) {
                    Orientation::Vertical
                } else {
                    Orientation::Horizontal
                };
                let start = Position::new(
                    rng.random_range(0..self.size) as u8,
                    rng.random_range(0..self.size) as u8,
                );
                if self.place_ship(class, start, orientation).is_ok() {
                    placed = true;
                    break;
                }
            }
            if !placed {
                return Err(BoardError::UnableToPlace);
            }
        }
        Ok(())
    }

    /// Resolve an inbound attack. Out-of-bounds and repeated coordinates
    /// yield `Invalid` and leave the board untouched.
    pub fn process_attack(&mut self, pos: Position) -> AttackOutcome {
        if !pos.in_bounds(self.size) || self.was_attacked(pos) {
            return AttackOutcome::Invalid;
        }
        self.attacked.push(pos);

        for ship in &mut self.ships {
            if ship.contains(pos) {
                ship.register_hit(pos);
                if ship.is_sunk() {
                    for p in ship.cells().to_vec() {
                        self.grid[p.row as usize][p.col as usize] = Cell::Sunk;
                    }
                    return AttackOutcome::Sunk;
                }
                self.grid[pos.row as usize][pos.col as usize] = Cell::Hit;
                return AttackOutcome::Hit;
            }
        }

        self.grid[pos.row as usize][pos.col as usize] = Cell::Miss;
        AttackOutcome::Miss
    }

    pub fn all_ships_sunk(&self) -> bool {
        !self.ships.is_empty() && self.ships.iter().all(Ship::is_sunk)
    }

    /// Record an outcome this board cannot resolve itself, used for the
    /// opponent-view board where no real ships exist. `Invalid` is a no-op.
    pub fn mark_external_outcome(&mut self, pos: Position, outcome: AttackOutcome) {
        if !pos.in_bounds(self.size) {
            return;
        }
        let cell = match outcome {
            AttackOutcome::Hit => Cell::Hit,
            AttackOutcome::Miss => Cell::Miss,
            AttackOutcome::Sunk => Cell::Sunk,
            AttackOutcome::Invalid => return,
        };
        if !self.was_attacked(pos) {
            self.attacked.push(pos);
        }
        self.grid[pos.row as usize][pos.col as usize] = cell;
    }
}
