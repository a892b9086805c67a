//! Hexagonal lattice construction
//!
//! A [`HexGrid`] starts life as a large hexagon of hexes, built ring by ring
//! around a central hex. A boundary is then applied, which discards every hex
//! outside it and re-indexes the survivors contiguously. The result is the
//! immutable lattice that a reaction-diffusion model runs on.
//!
//! Hexes are addressed by axial indices `(ri, gi)`: `ri` steps east by `d`,
//! `gi` steps north-east (`d/2` across, `v` up).

use std::collections::HashMap;

use rayon::prelude::*;
use thiserror::Error;
use tracing::debug;

use crate::lattice::{Direction, Lattice};

/// sqrt(3)/2, the ratio of row spacing to hex-to-hex distance
pub const SQRT_OF_3_OVER_2_F: f32 = 0.866_025_4;

/// Largest number of rings built around the centre hex (about 12.6M hexes)
pub const MAX_RING: u32 = 2048;

/// Value of [`Hex::dist_to_boundary`] before distances have been computed
const DIST_UNSET: f32 = -1.0;

/// Errors raised while building a lattice
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LatticeError {
    /// The hex-to-hex distance was zero, negative or not finite
    #[error("hex-to-hex distance must be positive, got {0}")]
    InvalidSpacing(f32),

    /// The initial span was zero, negative or not finite
    #[error("grid span must be positive, got {0}")]
    InvalidSpan(f32),

    /// `x_span / d` asks for more rings than [`MAX_RING`]
    #[error("grid span {x_span} at spacing {d} needs more than {max_ring} rings")]
    TooManyRings { d: f32, x_span: f32, max_ring: u32 },

    /// An ellipse semi-axis was zero, negative or not finite
    #[error("ellipse semi-axes must be positive, got a={a}, b={b}")]
    InvalidEllipse { a: f32, b: f32 },

    /// The boundary reaches beyond the initial hexagon of hexes
    #[error("boundary ellipse {a} x {b} does not fit inside the grid (inner radius {inner_radius})")]
    BoundaryOutsideGrid { a: f32, b: f32, inner_radius: f32 },

    /// No hex centre lies inside the boundary
    #[error("no hexes lie inside the boundary")]
    EmptyDomain,
}

/// One cell of the lattice
#[derive(Debug, Clone, PartialEq)]
pub struct Hex {
    /// Vector index; position of this hex in every field
    pub vi: usize,
    /// Axial index along the east direction
    pub ri: i32,
    /// Axial index along the north-east direction
    pub gi: i32,
    pub x: f32,
    pub y: f32,
    /// True if any of the six neighbours is missing
    pub boundary: bool,
    /// Distance to the nearest boundary hex; negative until computed
    pub dist_to_boundary: f32,
}

impl Hex {
    fn new(vi: usize, d: f32, v: f32, ri: i32, gi: i32) -> Self {
        Self {
            vi,
            ri,
            gi,
            x: d * ri as f32 + (d / 2.0) * gi as f32,
            y: v * gi as f32,
            boundary: false,
            dist_to_boundary: DIST_UNSET,
        }
    }

    /// Euclidean distance between the centres of two hexes
    pub fn distance_from(&self, other: &Hex) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// A hexagonal lattice with six-direction neighbour links
#[derive(Debug, Clone)]
pub struct HexGrid {
    d: f32,
    v: f32,
    x_span: f32,
    max_ring: u32,
    hexen: Vec<Hex>,
    neighbours: Vec<[Option<usize>; 6]>,
}

impl HexGrid {
    /// Build a hexagon of hexes with spacing `d`, wide enough to cover `x_span`.
    pub fn new(d: f32, x_span: f32) -> Result<Self, LatticeError> {
        if !(d.is_finite() && d > 0.0) {
            return Err(LatticeError::InvalidSpacing(d));
        }
        if !(x_span.is_finite() && x_span > 0.0) {
            return Err(LatticeError::InvalidSpan(x_span));
        }

        let v = d * SQRT_OF_3_OVER_2_F;
        let rings = ((x_span / 2.0) / d).ceil();
        if !(rings <= MAX_RING as f32) {
            return Err(LatticeError::TooManyRings {
                d,
                x_span,
                max_ring: MAX_RING,
            });
        }
        let max_ring = rings as u32;
        debug!("Creating hexagonal hex grid with max_ring {max_ring}");

        // Walk the six sides of each ring, starting at its north-west corner
        const SIDES: [(i32, i32); 6] = [(1, 0), (1, -1), (0, -1), (-1, 0), (-1, 1), (0, 1)];

        let capacity = 1 + 3 * max_ring as usize * (max_ring as usize + 1);
        let mut hexen = Vec::with_capacity(capacity);
        hexen.push(Hex::new(0, d, v, 0, 0));
        for ring in 1..=max_ring as i32 {
            let (mut ri, mut gi) = (-ring, ring);
            for (dr, dg) in SIDES {
                for _ in 0..ring {
                    hexen.push(Hex::new(hexen.len(), d, v, ri, gi));
                    ri += dr;
                    gi += dg;
                }
            }
        }

        let mut grid = Self {
            d,
            v,
            x_span,
            max_ring,
            hexen,
            neighbours: Vec::new(),
        };
        grid.link_neighbours();
        debug!("Initial hexagonal HexGrid has {} hexes", grid.num());
        Ok(grid)
    }

    /// Build a grid, clip it to an ellipse centred on the origin and compute
    /// distances to the boundary.
    pub fn with_elliptical_boundary(
        d: f32,
        x_span: f32,
        a: f32,
        b: f32,
    ) -> Result<Self, LatticeError> {
        let mut grid = Self::new(d, x_span)?;
        grid.set_elliptical_boundary(a, b)?;
        grid.compute_distance_to_boundary();
        Ok(grid)
    }

    /// Discard every hex whose centre lies outside the ellipse with semi-axes
    /// `a` (along x) and `b` (along y).
    pub fn set_elliptical_boundary(&mut self, a: f32, b: f32) -> Result<(), LatticeError> {
        if !(a.is_finite() && a > 0.0 && b.is_finite() && b > 0.0) {
            return Err(LatticeError::InvalidEllipse { a, b });
        }
        let inner_radius = self.max_ring as f32 * self.v;
        if a > inner_radius || b > inner_radius {
            return Err(LatticeError::BoundaryOutsideGrid { a, b, inner_radius });
        }

        let kept: Vec<Hex> = self
            .hexen
            .iter()
            .filter(|h| {
                let (ex, ey) = (h.x / a, h.y / b);
                ex * ex + ey * ey <= 1.0
            })
            .cloned()
            .collect();
        if kept.is_empty() {
            return Err(LatticeError::EmptyDomain);
        }

        self.hexen = kept;
        for (vi, h) in self.hexen.iter_mut().enumerate() {
            h.vi = vi;
            h.dist_to_boundary = DIST_UNSET;
        }
        self.link_neighbours();
        debug!(
            "After setting boundary, HexGrid has {} hexes ({} on the boundary)",
            self.num(),
            self.boundary_count()
        );
        Ok(())
    }

    /// Set each hex's distance to the nearest boundary hex. Boundary hexes get 0.
    pub fn compute_distance_to_boundary(&mut self) {
        let boundary: Vec<(f32, f32)> = self
            .hexen
            .iter()
            .filter(|h| h.boundary)
            .map(|h| (h.x, h.y))
            .collect();

        self.hexen.par_iter_mut().for_each(|h| {
            h.dist_to_boundary = if h.boundary {
                0.0
            } else {
                boundary
                    .iter()
                    .map(|&(bx, by)| (h.x - bx).hypot(h.y - by))
                    .fold(f32::INFINITY, f32::min)
            };
        });
    }

    /// Rebuild neighbour links from axial indices and refresh boundary flags
    fn link_neighbours(&mut self) {
        let index: HashMap<(i32, i32), usize> = self
            .hexen
            .iter()
            .map(|h| ((h.ri, h.gi), h.vi))
            .collect();

        self.neighbours = self
            .hexen
            .iter()
            .map(|h| {
                Direction::ALL.map(|dir| {
                    let (dr, dg) = dir.offset();
                    index.get(&(h.ri + dr, h.gi + dg)).copied()
                })
            })
            .collect();

        for (h, nbs) in self.hexen.iter_mut().zip(&self.neighbours) {
            h.boundary = nbs.iter().any(Option::is_none);
        }
    }

    /// Number of hexes
    pub fn num(&self) -> usize {
        self.hexen.len()
    }

    /// Hex-to-hex distance
    pub fn d(&self) -> f32 {
        self.d
    }

    /// Row-to-row distance, `d * sqrt(3)/2`
    pub fn v(&self) -> f32 {
        self.v
    }

    pub fn x_span(&self) -> f32 {
        self.x_span
    }

    /// Area of a single hex
    pub fn hex_area(&self) -> f32 {
        self.d * self.d * SQRT_OF_3_OVER_2_F
    }

    /// Extent of the hex centres along x
    pub fn width(&self) -> f32 {
        let (min, max) = self
            .hexen
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), h| {
                (lo.min(h.x), hi.max(h.x))
            });
        if min.is_finite() { max - min } else { 0.0 }
    }

    pub fn hexen(&self) -> &[Hex] {
        &self.hexen
    }

    pub fn boundary_count(&self) -> usize {
        self.hexen.iter().filter(|h| h.boundary).count()
    }

    /// x coordinates of every hex, in vector-index order
    pub fn d_x(&self) -> Vec<f32> {
        self.hexen.iter().map(|h| h.x).collect()
    }

    /// y coordinates of every hex, in vector-index order
    pub fn d_y(&self) -> Vec<f32> {
        self.hexen.iter().map(|h| h.y).collect()
    }

    /// Positions of each hex's neighbour in `dir`. Hexes without that
    /// neighbour report their own position.
    pub fn neighbour_positions(&self, dir: Direction) -> (Vec<f32>, Vec<f32>) {
        self.hexen
            .iter()
            .map(|h| match self.neighbours[h.vi][dir.index()] {
                Some(n) => (self.hexen[n].x, self.hexen[n].y),
                None => (h.x, h.y),
            })
            .unzip()
    }
}

impl Lattice for HexGrid {
    fn num_cells(&self) -> usize {
        self.hexen.len()
    }

    fn neighbour(&self, cell: usize, dir: Direction) -> Option<usize> {
        self.neighbours[cell][dir.index()]
    }

    fn spacing(&self) -> f64 {
        f64::from(self.d)
    }

    fn row_spacing(&self) -> f64 {
        f64::from(self.v)
    }

    fn dist_to_boundary(&self, cell: usize) -> Option<f64> {
        let dist = self.hexen[cell].dist_to_boundary;
        (dist >= 0.0).then_some(f64::from(dist))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_count(n: usize) -> usize {
        1 + 3 * n * (n + 1)
    }

    #[test]
    fn builds_rings_around_centre() {
        let grid = HexGrid::new(1.0, 2.0).unwrap();
        assert_eq!(grid.num(), ring_count(1));

        let grid = HexGrid::new(1.0, 6.0).unwrap();
        assert_eq!(grid.num(), ring_count(3));
    }

    #[test]
    fn centre_hex_has_all_neighbours() {
        let grid = HexGrid::new(1.0, 4.0).unwrap();
        let centre = &grid.hexen()[0];
        assert_eq!((centre.ri, centre.gi), (0, 0));
        assert!(!centre.boundary);
        for dir in Direction::ALL {
            assert!(grid.has_neighbour(0, dir), "missing {dir}");
        }
    }

    #[test]
    fn first_ring_sits_one_spacing_away() {
        let grid = HexGrid::new(0.5, 1.0).unwrap();
        let centre = &grid.hexen()[0];
        for dir in Direction::ALL {
            let n = grid.neighbour(0, dir).unwrap();
            let dist = centre.distance_from(&grid.hexen()[n]);
            assert!((dist - 0.5).abs() < 1e-6, "{dir} at {dist}");
        }
    }

    #[test]
    fn neighbour_links_are_symmetric() {
        let grid = HexGrid::new(1.0, 8.0).unwrap();
        for hi in 0..grid.num() {
            for dir in Direction::ALL {
                if let Some(n) = grid.neighbour(hi, dir) {
                    assert_eq!(grid.neighbour(n, dir.opposite()), Some(hi));
                }
            }
        }
    }

    #[test]
    fn outer_ring_is_boundary() {
        let grid = HexGrid::new(1.0, 4.0).unwrap();
        let boundary = grid.hexen().iter().filter(|h| h.boundary).count();
        assert_eq!(boundary, 12); // ring 2 has 12 hexes
    }

    #[test]
    fn elliptical_boundary_keeps_only_inside_hexes() {
        let grid = HexGrid::with_elliptical_boundary(0.1, 4.0, 0.8, 0.6).unwrap();
        assert!(grid.num() > 0);
        for h in grid.hexen() {
            let (ex, ey) = (h.x / 0.8, h.y / 0.6);
            assert!(ex * ex + ey * ey <= 1.0);
        }
        // Vector indices are contiguous after clipping
        for (i, h) in grid.hexen().iter().enumerate() {
            assert_eq!(h.vi, i);
        }
        assert!(grid.boundary_count() > 0);
        assert!(grid.boundary_count() < grid.num());
    }

    #[test]
    fn distance_to_boundary_is_zero_on_boundary_and_positive_inside() {
        let grid = HexGrid::with_elliptical_boundary(0.1, 4.0, 0.8, 0.6).unwrap();
        for h in grid.hexen() {
            if h.boundary {
                assert_eq!(h.dist_to_boundary, 0.0);
            } else {
                assert!(h.dist_to_boundary > 0.0);
            }
            assert_eq!(
                grid.dist_to_boundary(h.vi),
                Some(f64::from(h.dist_to_boundary))
            );
        }
    }

    #[test]
    fn distances_unknown_before_computation() {
        let grid = HexGrid::new(1.0, 2.0).unwrap();
        assert_eq!(grid.dist_to_boundary(0), None);
    }

    #[test]
    fn ellipse_larger_than_grid_is_rejected() {
        let mut grid = HexGrid::new(0.1, 1.0).unwrap();
        let err = grid.set_elliptical_boundary(2.0, 0.5).unwrap_err();
        assert!(matches!(err, LatticeError::BoundaryOutsideGrid { .. }));
    }

    #[test]
    fn invalid_geometry_is_rejected() {
        assert_eq!(
            HexGrid::new(0.0, 1.0).unwrap_err(),
            LatticeError::InvalidSpacing(0.0)
        );
        assert_eq!(
            HexGrid::new(0.1, -1.0).unwrap_err(),
            LatticeError::InvalidSpan(-1.0)
        );
        assert!(matches!(
            HexGrid::new(1e-6, 4.0),
            Err(LatticeError::TooManyRings { max_ring: MAX_RING, .. })
        ));
        assert!(matches!(
            HexGrid::new(f32::MIN_POSITIVE, f32::MAX),
            Err(LatticeError::TooManyRings { .. })
        ));

        let mut grid = HexGrid::new(0.1, 1.0).unwrap();
        assert!(matches!(
            grid.set_elliptical_boundary(0.0, 0.2),
            Err(LatticeError::InvalidEllipse { .. })
        ));
    }

    #[test]
    fn missing_neighbour_positions_fall_back_to_own_position() {
        let grid = HexGrid::new(1.0, 2.0).unwrap();
        let (x_e, y_e) = grid.neighbour_positions(Direction::E);
        let x = grid.d_x();
        let y = grid.d_y();
        for hi in 0..grid.num() {
            match grid.neighbour(hi, Direction::E) {
                Some(n) => assert_eq!((x_e[hi], y_e[hi]), (x[n], y[n])),
                None => assert_eq!((x_e[hi], y_e[hi]), (x[hi], y[hi])),
            }
        }
    }

    #[test]
    fn geometry_accessors() {
        let grid = HexGrid::new(2.0, 4.0).unwrap();
        assert_eq!(grid.d(), 2.0);
        assert!((grid.v() - 2.0 * SQRT_OF_3_OVER_2_F).abs() < 1e-6);
        assert!((grid.hex_area() - 4.0 * SQRT_OF_3_OVER_2_F).abs() < 1e-5);
        // One ring: centres span from -d to +d
        assert!((grid.width() - 4.0).abs() < 1e-6);
    }
}
