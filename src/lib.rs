#![cfg_attr(
    feature = "cargo-clippy",
    warn(
        clippy::pedantic,
        missing_debug_implementations,
        trivial_casts,
        trivial_numeric_casts,
        unreachable_pub,
        variant_size_differences,
        rust_2018_idioms
    )
)]
#![cfg_attr(feature = "cargo-clippy", allow(clippy::module_name_repetitions))]

//! `rqg` — a random query generator and executor for PostgreSQL-compatible
//! databases.
//!
//! The crate is organized bottom-up, matching the layering of the engine:
//! entropy and hashing at the base, the grammar and data generators above
//! that, the worker pool and runner layer above that, and the production
//! orchestrator and comparator tying everything together for the `rqg`
//! binary.

pub mod comparator;
pub mod config;
pub mod datagen;
pub mod entropy;
pub mod error;
pub mod filter;
pub mod grammar;
pub mod hash;
pub mod orchestrator;
pub mod pool;
pub mod quote;
pub mod runner;
pub mod uniqueness;
pub mod value;
pub mod watchdog;

#[cfg(feature = "cli")]
pub mod cli;

pub use error::{Error, Result};
