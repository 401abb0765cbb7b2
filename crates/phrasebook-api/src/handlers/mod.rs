//! Background job handlers for phrasebook-api.

pub mod jobs;

pub use jobs::CategorizationHandler;
