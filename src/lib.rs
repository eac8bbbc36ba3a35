//! # phlex_kinetics
//!
//! Gas-phase chemistry core for stiff ODE integrators. A reaction mechanism (from a packed wire
//! buffer or a JSON configuration) becomes an ODE system over the solved species: the time
//! derivative `f(t, y)` and its sparse Jacobian, evaluated reaction by reaction through a
//! uniform dispatch protocol.
//!
//! ## Modules
//! - [`state`]: state-variable classification, solved-index map, environment
//! - [`rxns`]: reaction kinds, dispatch, mechanism arena and its wire codec
//! - [`aero_reps`]: aerosol representations (particle radius, number, phase mass)
//! - [`jacobian`]: sparsity mask, CSC template, sparse Jacobian
//! - [`model_data`]: the per-solver aggregate implementing the ODE callbacks
//! - [`integrator`]: integrator boundary and a reference backward-Euler stepper
//! - [`solver`]: initialization and run boundary
//! - [`config`]: JSON box-model configuration
//! - [`cli`]: box-model runner used by the `phlex_box` binary
pub mod aero_reps;
pub mod cli;
pub mod config;
pub mod error;
pub mod integrator;
pub mod jacobian;
pub mod model_data;
pub mod rxns;
pub mod solver;
pub mod state;

pub use error::{PhlexError, PhlexResult};
