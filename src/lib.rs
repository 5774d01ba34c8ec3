//! Core backend for WAVE, a media-sharing service for small private groups.
//!
//! Storage is a flat-file JSON tree per group; there is no database. The
//! interesting machinery lives in the notification engine (fan-out, queueing,
//! digest rendering, push and rate-limited SMS delivery), the post-grouping
//! algorithm, and the bounded media-processing pipeline. HTTP routing and
//! authentication are the embedding process's concern; [`state::AppState`]
//! is the composition root it builds on.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod utils;

pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;
