//! hexrd - reaction-diffusion simulation on hexagonal lattices.
//!
//! A [`hexgrid::HexGrid`] clipped to an elliptical boundary provides the
//! [`lattice::Lattice`] topology; [`kernel`] holds the stencil and RK4
//! integration; [`model`] defines the reaction-diffusion systems; [`runner`]
//! drives a simulation from a parameters file and writes [`io::DataFile`]
//! snapshots.

pub mod cli;
pub mod config;
pub mod hexgrid;
pub mod io;
pub mod kernel;
pub mod lattice;
pub mod model;
pub mod runner;
