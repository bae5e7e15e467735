//! Ship definitions and per-ship hit bookkeeping.

use crate::common::Position;

/// Static description of one ship class in the standard fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShipClass {
    name: &'static str,
    length: usize,
}

impl ShipClass {
    pub const fn new(name: &'static str, length: usize) -> Self {
        Self { name, length }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn length(&self) -> usize {
        self.length
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// A ship placed on a board, tracking which of its cells have been hit.
#[derive(Debug, Clone)]
pub struct Ship {
    class: ShipClass,
    cells: Vec<Position>,
    hits: Vec<Position>,
}

impl Ship {
    /// Compute the cells a ship of `length` would occupy from `start`, or
    /// `None` if it would not fit on a `board_size` grid.
    pub fn footprint(
        start: Position,
        orientation: Orientation,
        length: usize,
        board_size: usize,
    ) -> Option<Vec<Position>> {
        if !start.in_bounds(board_size) {
            return None;
        }
        let fits = match orientation {
            Orientation::Vertical => start.row as usize + length <= board_size,
            Orientation::Horizontal => start.col as usize + length <= board_size,
        };
        if !fits {
            return None;
        }
        let cells = (0..length)
            .map(|i| match orientation {
                Orientation::Vertical => Position::new(start.row + i as u8, start.col),
                Orientation::Horizontal => Position::new(start.row, start.col + i as u8),
            })
            .collect();
        Some(cells)
    }

    /// A placed ship occupying exactly `cells`.
    pub fn placed(class: ShipClass, cells: Vec<Position>) -> Self {
        Self {
            class,
            cells,
            hits: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.class.name()
    }

    pub fn length(&self) -> usize {
        self.class.length()
    }

    pub fn cells(&self) -> &[Position] {
        &self.cells
    }

    pub fn contains(&self, pos: Position) -> bool {
        self.cells.contains(&pos)
    }

    /// Record a hit at `pos`. Returns true if the cell belongs to this ship
    /// and had not been hit before.
    pub fn register_hit(&mut self, pos: Position) -> bool {
        if self.contains(pos) && !self.hits.contains(&pos) {
            self.hits.push(pos);
            true
        } else {
            false
        }
    }

    pub fn hit_count(&self) -> usize {
        self.hits.len()
    }

    pub fn is_sunk(&self) -> bool {
        self.hits.len() == self.class.length()
    }
}
