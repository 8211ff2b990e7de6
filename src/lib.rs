//! `sfh-stochastic` library crate.
//!
//! The binary (`sfh`) is a thin wrapper around this library so that:
//!
//! - the numerical code is testable without spawning processes
//! - a host fitting code can call the draw cache and reconstructor directly
//! - the precompute and post-fit analysis stages stay independent

pub mod analysis;
pub mod app;
pub mod cli;
pub mod domain;
pub mod draws;
pub mod error;
pub mod io;
pub mod math;
pub mod report;
pub mod sfh;
