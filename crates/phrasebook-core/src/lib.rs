//! # phrasebook-core
//!
//! Core types, traits, and abstractions for the phrasebook service.
//!
//! This crate provides the foundational data structures and trait definitions
//! that other phrasebook crates depend on.

pub mod activity;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use activity::{ActivityDay, ActivityHeatmap, MonthLabel, WeeklyDay};
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
