//! dupefiles - indexed duplicate file finder
//!
//! Tracked files live in a persistent SQLite catalog. A scan groups them by
//! size, hashes only what has no usable stored hash, and confirms every
//! candidate group by binary comparison before recording it.

pub mod app;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod index;
pub mod logging;
pub mod progress;
pub mod scanner;

pub use app::run_app;
