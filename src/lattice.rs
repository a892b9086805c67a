//! Neighbour topology shared by every stencil computation.
//!
//! A [`Lattice`] is a read-only provider of cell neighbourhoods. The kernel in
//! [`crate::kernel`] only ever talks to this trait, so a model can run on the
//! boundary-clipped [`HexGrid`](crate::hexgrid::HexGrid) or on a hand-built toy
//! lattice in a test.

use std::fmt;

/// The six neighbour directions of a hex, in the order used for storage.
///
/// The axial offsets are given in `(ri, gi)` steps: `ri` runs east, `gi` runs
/// north-east.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    E,
    NE,
    NW,
    W,
    SW,
    SE,
}

impl Direction {
    /// All directions, in storage order
    pub const ALL: [Direction; 6] = [
        Direction::E,
        Direction::NE,
        Direction::NW,
        Direction::W,
        Direction::SW,
        Direction::SE,
    ];

    /// Storage slot for this direction (0..6)
    pub fn index(self) -> usize {
        match self {
            Direction::E => 0,
            Direction::NE => 1,
            Direction::NW => 2,
            Direction::W => 3,
            Direction::SW => 4,
            Direction::SE => 5,
        }
    }

    /// Axial `(ri, gi)` step to the neighbour in this direction
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::E => (1, 0),
            Direction::NE => (0, 1),
            Direction::NW => (-1, 1),
            Direction::W => (-1, 0),
            Direction::SW => (0, -1),
            Direction::SE => (1, -1),
        }
    }

    /// The direction pointing back at us from the neighbour
    pub fn opposite(self) -> Direction {
        match self {
            Direction::E => Direction::W,
            Direction::NE => Direction::SW,
            Direction::NW => Direction::SE,
            Direction::W => Direction::E,
            Direction::SW => Direction::NE,
            Direction::SE => Direction::NW,
        }
    }

    /// Lower-case label used for dataset names (`/x_ne` etc.)
    pub fn label(self) -> &'static str {
        match self {
            Direction::E => "e",
            Direction::NE => "ne",
            Direction::NW => "nw",
            Direction::W => "w",
            Direction::SW => "sw",
            Direction::SE => "se",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label().to_ascii_uppercase())
    }
}

/// Read-only neighbour topology over `num_cells()` cells.
///
/// Implementations must return neighbour indices `< num_cells()`. A `None`
/// neighbour marks the lattice edge.
pub trait Lattice: Send + Sync {
    /// Number of cells; every field over this lattice has this length
    fn num_cells(&self) -> usize;

    /// Index of the neighbour of `cell` in direction `dir`, if there is one
    fn neighbour(&self, cell: usize, dir: Direction) -> Option<usize>;

    /// Centre-to-centre distance between neighbouring cells (`d`)
    fn spacing(&self) -> f64;

    /// Vertical distance between rows of cells (`v`)
    fn row_spacing(&self) -> f64 {
        self.spacing() * 3.0_f64.sqrt() / 2.0
    }

    /// Distance from `cell` to the domain boundary, if known
    fn dist_to_boundary(&self, _cell: usize) -> Option<f64> {
        None
    }

    /// Whether `cell` has a neighbour in direction `dir`
    fn has_neighbour(&self, cell: usize, dir: Direction) -> bool {
        self.neighbour(cell, dir).is_some()
    }
}
