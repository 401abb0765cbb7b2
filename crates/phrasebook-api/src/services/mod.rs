//! Service layer for business logic.

pub mod phrases;
pub mod settings;
pub mod stats;

pub use phrases::{EnrichOutcome, FallbackReason, PhraseService};
pub use settings::{SettingsService, SettingsView};
pub use stats::StatsService;
