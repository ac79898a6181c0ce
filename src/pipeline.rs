//! Per-keyword control flow: collect, extract, rank, fetch images, emit rows.

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, warn};

use crate::assets::{AssetManager, FetchOutcome};
use crate::browser::{BrowserSession, PageProvider};
use crate::config::Config;
use crate::models::{Candidate, Keyword, OutputRow, ProductDetail, Site};
use crate::normalize::normalize;
use crate::parsers::SelectorHits;
use crate::ranking::rank;
use crate::scrapers::{CandidateCollector, DetailExtractor};
use crate::storage::RowSink;

#[derive(Debug, Clone, Default, Serialize)]
pub struct KeywordReport {
    pub keyword: String,
    pub candidates: usize,
    pub details: usize,
    pub finalists: usize,
    pub images_downloaded: usize,
    pub images_cached: usize,
    pub rows_written: usize,
    pub timed_out: bool,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub keywords: Vec<KeywordReport>,
    /// Keywords not attempted because the run deadline passed.
    pub skipped_keywords: Vec<String>,
    pub deadline_hit: bool,
    /// `chain#strategy` → hits.
    pub selector_hits: BTreeMap<String, u64>,
}

impl RunReport {
    pub fn total_rows(&self) -> usize {
        self.keywords.iter().map(|k| k.rows_written).sum()
    }
}

pub struct Pipeline {
    config: Arc<Config>,
    hits: Arc<SelectorHits>,
    collector: CandidateCollector,
    extractor: DetailExtractor,
    assets: AssetManager,
}

impl Pipeline {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let site = Site::new(&config.base_url)?;
        let hits = Arc::new(SelectorHits::new());

        Ok(Self {
            collector: CandidateCollector::new(config.clone(), site.clone(), hits.clone()),
            extractor: DetailExtractor::new(config.clone(), site, hits.clone()),
            assets: AssetManager::new(&config)?,
            hits,
            config,
        })
    }

    /// Processes keywords one after another. Per-keyword failures become
    /// empty results; only the run deadline stops the loop early.
    pub async fn run(
        &self,
        provider: &dyn PageProvider,
        keywords: &[Keyword],
        sink: &dyn RowSink,
    ) -> RunReport {
        let started_at = Utc::now();
        let deadline = self.config.run_timeout().map(|limit| Instant::now() + limit);
        let mut reports = Vec::new();
        let mut skipped = Vec::new();
        let mut deadline_hit = false;

        for (i, keyword) in keywords.iter().enumerate() {
            if deadline_hit || deadline.map_or(false, |d| Instant::now() >= d) {
                deadline_hit = true;
                skipped.push(keyword.to_string());
                continue;
            }

            info!(keyword = %keyword, "[{}/{}] Processing keyword", i + 1, keywords.len());
            let report = self.process_keyword(provider, keyword, deadline, sink).await;
            deadline_hit = report.timed_out;
            reports.push(report);
        }

        if !skipped.is_empty() {
            warn!(skipped = skipped.len(), "Run deadline reached, remaining keywords skipped");
        }
        self.hits.log_summary();

        RunReport {
            started_at,
            finished_at: Utc::now(),
            keywords: reports,
            skipped_keywords: skipped,
            deadline_hit,
            selector_hits: self
                .hits
                .snapshot()
                .into_iter()
                .map(|((chain, strategy), hits)| (format!("{chain}#{strategy}"), hits))
                .collect(),
        }
    }

    async fn process_keyword(
        &self,
        provider: &dyn PageProvider,
        keyword: &Keyword,
        deadline: Option<Instant>,
        sink: &dyn RowSink,
    ) -> KeywordReport {
        let mut report = KeywordReport {
            keyword: keyword.to_string(),
            ..KeywordReport::default()
        };

        let collecting = self
            .collector
            .collect(keyword, provider, self.config.max_candidates_to_collect);
        let outcome = match deadline {
            Some(d) => match timeout_at(d, collecting).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(keyword = %keyword, "Run deadline reached while collecting");
                    report.timed_out = true;
                    return report;
                }
            },
            None => collecting.await,
        };
        report.candidates = outcome.candidates.len();
        report.warning = outcome.warning.clone();
        if outcome.is_empty() {
            return report;
        }

        let (details, timed_out) = self.extract_all(provider, &outcome.candidates, deadline).await;
        report.details = details.len();
        report.timed_out = timed_out;

        let finalists = rank(keyword, &details, self.config.max_products_per_keyword);
        report.finalists = finalists.len();
        info!(
            keyword = %keyword,
            details = details.len(),
            finalists = finalists.len(),
            "Ranking complete"
        );

        let slug = keyword.slug();
        let outcomes: Vec<Option<FetchOutcome>> = stream::iter(finalists.iter())
            .map(|scored| {
                let slug = slug.as_str();
                async move {
                    let url = scored.detail.image_url.as_deref()?;
                    let name = scored.detail.name.as_deref().unwrap_or_default();
                    Some(self.assets.fetch_image(url, slug, name).await)
                }
            })
            .buffered(self.config.image_concurrency())
            .collect()
            .await;

        let rows: Vec<OutputRow> = finalists
            .iter()
            .zip(outcomes.iter())
            .map(|(scored, fetched)| {
                match fetched {
                    Some(FetchOutcome::Downloaded(_)) => report.images_downloaded += 1,
                    Some(FetchOutcome::Cached(_)) => report.images_cached += 1,
                    _ => {}
                }
                normalize(keyword, scored, fetched.as_ref().and_then(FetchOutcome::asset))
            })
            .collect();

        match sink.write_rows(&rows).await {
            Ok(written) => report.rows_written = written,
            Err(e) => error!(keyword = %keyword, error = %e, "Failed to write rows"),
        }
        info!(keyword = %keyword, rows = report.rows_written, "Keyword complete");
        report
    }

    /// Extracts details with bounded concurrency, in discovery order. When the
    /// deadline passes, in-flight extractions are dropped (closing their pages)
    /// and whatever finished is returned.
    async fn extract_all(
        &self,
        provider: &dyn PageProvider,
        candidates: &[Candidate],
        deadline: Option<Instant>,
    ) -> (Vec<ProductDetail>, bool) {
        let mut extractions = stream::iter(candidates.iter())
            .map(|candidate| self.extractor.extract(candidate, provider))
            .buffered(self.config.detail_concurrency());

        let mut details = Vec::with_capacity(candidates.len());
        loop {
            let next = match deadline {
                Some(d) => match timeout_at(d, extractions.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(
                            completed = details.len(),
                            pending = candidates.len() - details.len(),
                            "Run deadline reached during detail extraction"
                        );
                        return (details, true);
                    }
                },
                None => extractions.next().await,
            };
            match next {
                Some(detail) => details.push(detail),
                None => return (details, false),
            }
        }
    }
}

/// Launches the browser, runs every keyword and closes the browser again.
/// A browser that cannot be launched is the only fatal error.
pub async fn execute(
    config: Arc<Config>,
    keywords: &[Keyword],
    sink: &dyn RowSink,
) -> Result<RunReport> {
    let pipeline = Pipeline::new(config.clone())?;
    let session = BrowserSession::acquire(&config).await?;

    let report = pipeline.run(&session, keywords, sink).await;
    session.release().await;

    Ok(report)
}
