//! # phrasebook-api
//!
//! Workflow services and job handlers behind the phrasebook HTTP server.

pub mod handlers;
pub mod services;

pub use handlers::CategorizationHandler;
pub use services::{
    EnrichOutcome, FallbackReason, PhraseService, SettingsService, SettingsView, StatsService,
};
