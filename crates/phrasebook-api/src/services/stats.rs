//! Read-side aggregations for the dashboard.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rand::Rng;
use tracing::debug;

use phrasebook_core::activity::{self, day_start_utc, heatmap_window, weekly_series_start};
use phrasebook_core::{defaults, ActivityHeatmap, Phrase, PhraseRepository, Result, WeeklyDay};

#[derive(Clone)]
pub struct StatsService {
    phrases: Arc<dyn PhraseRepository>,
}

impl StatsService {
    pub fn new(phrases: Arc<dyn PhraseRepository>) -> Self {
        Self { phrases }
    }

    /// Count per category label, the processing sentinel included.
    pub async fn category_histogram(&self) -> Result<BTreeMap<String, i64>> {
        self.phrases.category_counts().await
    }

    /// Phrases created in the trailing 7x24h window.
    pub async fn weekly_count(&self) -> Result<i64> {
        self.weekly_count_at(Utc::now()).await
    }

    /// Phrases created at or after `now - 168h`.
    pub async fn weekly_count_at(&self, now: DateTime<Utc>) -> Result<i64> {
        let cutoff = now - Duration::hours(defaults::WEEKLY_WINDOW_HOURS);
        self.phrases.count_created_since(cutoff).await
    }

    /// A uniformly chosen settled phrase, or `None` if there is none.
    ///
    /// A pick deleted after the id snapshot is dropped and another drawn.
    pub async fn random_phrase(&self) -> Result<Option<Phrase>> {
        let mut ids = self.phrases.settled_ids().await?;

        while !ids.is_empty() {
            let index = rand::thread_rng().gen_range(0..ids.len());
            debug!(
                subsystem = "api",
                component = "stats",
                op = "random_phrase",
                candidates = ids.len(),
                index,
                "Picked random phrase"
            );
            let id = ids.swap_remove(index);
            if let Some(phrase) = self.phrases.get(id).await? {
                return Ok(Some(phrase));
            }
        }
        Ok(None)
    }

    pub async fn activity_heatmap(&self) -> Result<ActivityHeatmap> {
        self.activity_heatmap_at(Utc::now().date_naive()).await
    }

    pub async fn activity_heatmap_at(&self, today: NaiveDate) -> Result<ActivityHeatmap> {
        let (start, _) = heatmap_window(today);
        let counts = self.phrases.daily_counts(day_start_utc(start)).await?;
        Ok(activity::activity_heatmap(&counts, today))
    }

    pub async fn weekly_series(&self) -> Result<Vec<WeeklyDay>> {
        self.weekly_series_at(Utc::now().date_naive()).await
    }

    pub async fn weekly_series_at(&self, today: NaiveDate) -> Result<Vec<WeeklyDay>> {
        let counts = self
            .phrases
            .daily_counts(day_start_utc(weekly_series_start(today)))
            .await?;
        Ok(activity::weekly_series(&counts, today))
    }
}
