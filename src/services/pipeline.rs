//! Run orchestration: search, detail fetch, extraction, persistence.
//!
//! Items are processed one at a time in discovery order. Each identifier
//! walks the `ItemState` machine and its final state is written to the
//! checkpoint before the next identifier starts.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio::sync::watch;

use crate::error::{ClientError, PipelineError};
use crate::models::{
    ExtractedFact, FailureKind, FailureReason, ItemState, OutputRow, ProductCandidate,
    ProductDetail, RunConfiguration,
};
use crate::services::checkpoint::{CheckpointStore, ItemRecord, RunRecord};
use crate::services::output::OutputWriter;
use crate::services::publish::{DestinationRef, StorageSink};
use crate::services::vision::FactExtractor;
use crate::sources::ProductSource;
use crate::utils::{RetryResult, with_retry};

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub keywords_searched: usize,
    pub keywords_cached: usize,
    pub search_calls: u32,
    pub detail_calls: u32,
    pub vision_calls: u32,
    /// Images whose vision result came from the checkpoint
    pub vision_cached: usize,
    pub persisted: usize,
    pub failed: usize,
    pub deferred: usize,
    pub skipped: usize,
    pub rows_written: usize,
    /// Identifiers found in the output file but missing from the checkpoint
    pub recovered: usize,
}

/// Final state of one identifier touched by the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemSummary {
    pub product_id: String,
    pub keyword: String,
    pub state: ItemState,
}

/// What happened to the output file after processing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishOutcome {
    /// No sink configured
    Disabled,
    /// Nothing new to publish
    Skipped,
    Published { destination: DestinationRef },
    Failed { error: String },
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: i64,
    pub stats: RunStats,
    pub items: Vec<ItemSummary>,
    /// Keywords whose search failed, with the error
    pub keyword_errors: Vec<(String, String)>,
    pub publish: PublishOutcome,
    /// The run stopped early on a stop signal
    pub stopped: bool,
}

impl RunReport {
    /// Items that started processing in this run.
    pub fn started(&self) -> usize {
        self.items.len()
    }
}

/// Drives candidates through the stages against injected clients.
pub struct Pipeline {
    config: RunConfiguration,
    source: Arc<dyn ProductSource>,
    extractor: Arc<dyn FactExtractor>,
    sink: Option<Arc<dyn StorageSink>>,
    checkpoint: Arc<CheckpointStore>,
    stop: Option<watch::Receiver<bool>>,
    show_progress: bool,
}

impl Pipeline {
    pub fn new(
        config: RunConfiguration,
        source: Arc<dyn ProductSource>,
        extractor: Arc<dyn FactExtractor>,
        checkpoint: Arc<CheckpointStore>,
    ) -> Self {
        Self {
            config,
            source,
            extractor,
            sink: None,
            checkpoint,
            stop: None,
            show_progress: false,
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn StorageSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Stop starting new identifiers once the channel reads `true`.
    #[must_use]
    pub fn with_stop_signal(mut self, stop: watch::Receiver<bool>) -> Self {
        self.stop = Some(stop);
        self
    }

    #[must_use]
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    fn stop_requested(&self) -> bool {
        self.stop.as_ref().is_some_and(|rx| *rx.borrow())
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(self.config.item_limit as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    }

    /// Process up to `item_limit` new identifiers discovered from `keywords`,
    /// then publish the output file.
    ///
    /// Only fatal conditions return an error: the checkpoint or output file
    /// failing, or a remote API refusing the credentials. Per-item failures
    /// are recorded and reported.
    pub async fn run(&self, keywords: &[String]) -> Result<RunReport, PipelineError> {
        let mut writer = OutputWriter::open(&self.config.output_path)?;
        let existing = OutputWriter::row_counts(&self.config.output_path)?;
        let recovered = self.checkpoint.reconcile(&existing)?;
        if recovered > 0 {
            tracing::warn!(recovered, "recorded output rows missing from the checkpoint");
        }

        let run_id = self.checkpoint.begin_run(self.config.item_limit)?;
        let mut report = RunReport {
            run_id,
            stats: RunStats {
                recovered,
                ..Default::default()
            },
            items: Vec::new(),
            keyword_errors: Vec::new(),
            publish: PublishOutcome::Disabled,
            stopped: false,
        };

        let pb = self.progress_bar();
        let result = self
            .process_keywords(keywords, &mut writer, &mut report, &pb)
            .await;
        pb.finish_and_clear();
        result?;

        report.stats.rows_written = writer.rows_written();
        drop(writer);

        report.publish = self.publish(report.stats.rows_written).await;

        self.checkpoint.finish_run(&RunRecord {
            id: run_id,
            started_at: String::new(),
            finished_at: None,
            item_limit: self.config.item_limit,
            persisted: report.stats.persisted,
            failed: report.stats.failed,
            deferred: report.stats.deferred,
            skipped: report.stats.skipped,
            rows: report.stats.rows_written,
            stopped: report.stopped,
            destination: match &report.publish {
                PublishOutcome::Published { destination } => Some(destination.to_string()),
                _ => None,
            },
        })?;

        tracing::info!(
            persisted = report.stats.persisted,
            failed = report.stats.failed,
            deferred = report.stats.deferred,
            skipped = report.stats.skipped,
            rows = report.stats.rows_written,
            "run finished"
        );
        Ok(report)
    }

    async fn process_keywords(
        &self,
        keywords: &[String],
        writer: &mut OutputWriter,
        report: &mut RunReport,
        pb: &ProgressBar,
    ) -> Result<(), PipelineError> {
        let keyword_limit = self.config.keyword_limit.unwrap_or(usize::MAX);
        let mut seen: HashSet<String> = HashSet::new();

        'keywords: for keyword in keywords.iter().take(keyword_limit) {
            if report.started() >= self.config.item_limit {
                break;
            }
            if self.stop_requested() {
                report.stopped = true;
                break;
            }

            let candidates = match self.discover(keyword, report).await? {
                Some(c) => c,
                None => continue,
            };

            for candidate in candidates {
                if !seen.insert(candidate.id.clone()) {
                    continue;
                }
                if self.checkpoint.is_done(&candidate.id)? {
                    report.stats.skipped += 1;
                    tracing::debug!(asin = %candidate.id, "already done, skipping");
                    continue;
                }
                if report.started() >= self.config.item_limit {
                    break 'keywords;
                }
                if report.started() > 0 {
                    self.pause().await;
                }
                if self.stop_requested() {
                    report.stopped = true;
                    tracing::info!("stop requested, not starting new items");
                    break 'keywords;
                }

                pb.set_message(candidate.id.clone());
                let product_id = candidate.id.clone();
                let keyword = candidate.keyword.clone();
                let state = self.process_item(candidate, writer, report).await?;

                match &state {
                    ItemState::Persisted { .. } => report.stats.persisted += 1,
                    ItemState::Failed { reason, .. } if reason.is_permanent() => {
                        report.stats.failed += 1
                    }
                    ItemState::Failed { .. } => report.stats.deferred += 1,
                    _ => {}
                }
                report.items.push(ItemSummary {
                    product_id,
                    keyword,
                    state,
                });
                pb.inc(1);
            }
        }
        Ok(())
    }

    /// Candidates for a keyword, from the cache or the search API.
    ///
    /// Returns `None` when the search failed for a non-fatal reason.
    async fn discover(
        &self,
        keyword: &str,
        report: &mut RunReport,
    ) -> Result<Option<Vec<ProductCandidate>>, PipelineError> {
        if !self.config.refresh_search
            && let Some(cached) = self.checkpoint.cached_candidates(keyword, self.config.max_pages)?
        {
            tracing::debug!(keyword, candidates = cached.len(), "using cached search results");
            report.stats.keywords_cached += 1;
            return Ok(Some(cached));
        }

        let pages = self.config.max_pages;
        let (result, attempts) = self
            .call(|| self.source.search_products(keyword, pages))
            .await;
        report.stats.search_calls += attempts;

        match result {
            Ok(candidates) => {
                report.stats.keywords_searched += 1;
                tracing::info!(keyword, candidates = candidates.len(), "keyword searched");
                self.checkpoint
                    .cache_candidates(keyword, pages, &candidates)?;
                Ok(Some(candidates))
            }
            Err(e) if e.is_fatal() => Err(PipelineError::Unauthorized(e.to_string())),
            Err(e) => {
                tracing::warn!(keyword, error = %e, "search failed, moving to next keyword");
                report.keyword_errors.push((keyword.to_string(), e.to_string()));
                Ok(None)
            }
        }
    }

    /// Walk one identifier through every stage to a terminal state.
    async fn process_item(
        &self,
        candidate: ProductCandidate,
        writer: &mut OutputWriter,
        report: &mut RunReport,
    ) -> Result<ItemState, PipelineError> {
        let id = candidate.id.clone();
        let state = ItemState::Discovered;
        tracing::info!(asin = %id, keyword = %candidate.keyword, "processing");

        let (detail, attempts) = self.call(|| self.source.fetch_detail(&candidate)).await;
        report.stats.detail_calls += attempts;
        let detail = match detail {
            Ok(d) => d,
            Err(e) => return self.fail_with_client(&id, state, &e, attempts),
        };
        let state = self.advance(&id, state, ItemState::DetailFetched)?;

        let (image_url, facts) = match self.extract(&detail, report).await? {
            Ok(found) => found,
            Err(reason) => return self.fail(&id, state, reason),
        };
        let state = self.advance(&id, state, ItemState::Extracted)?;

        let rows: Vec<OutputRow> = facts
            .into_iter()
            .map(|fact| OutputRow::from_fact(&detail, &image_url, fact))
            .collect();
        let count = writer.append_rows(&rows)?;
        self.checkpoint
            .mark_done(&ItemRecord::persisted(id.clone(), count))?;

        tracing::info!(asin = %id, rows = count, "persisted");
        self.advance(&id, state, ItemState::Persisted { rows: count })
    }

    /// Try panel images in order until one yields facts.
    ///
    /// The outer error is fatal for the run; the inner one fails the item.
    async fn extract(
        &self,
        detail: &ProductDetail,
        report: &mut RunReport,
    ) -> Result<Result<(String, Vec<ExtractedFact>), FailureReason>, PipelineError> {
        let images = detail.panel_images(self.config.max_panel_images);
        let mut tried = 0;

        for image in &images {
            tried += 1;
            if let Some(facts) = self.checkpoint.cached_facts(&image.url, &image.product_id)? {
                report.stats.vision_cached += 1;
                if !facts.is_empty() {
                    return Ok(Ok((image.url.clone(), facts)));
                }
                tracing::debug!(asin = %image.product_id, url = %image.url, "image already analysed, no facts panel");
                continue;
            }

            let (result, attempts) = self.call(|| self.extractor.extract_facts(image)).await;
            report.stats.vision_calls += attempts;

            if let Ok(facts) = &result {
                self.checkpoint.cache_facts(&image.url, facts)?;
            }
            match result {
                Ok(facts) if !facts.is_empty() => return Ok(Ok((image.url.clone(), facts))),
                Ok(_) => {
                    tracing::debug!(asin = %image.product_id, url = %image.url, "no facts panel on image");
                }
                Err(e) if e.is_fatal() => return Err(PipelineError::Unauthorized(e.to_string())),
                Err(e) => return Ok(Err(FailureReason::from_client(&e, attempts))),
            }
        }

        Ok(Err(FailureReason::new(
            FailureKind::Extraction,
            format!("no supplement facts panel in {tried} image(s)"),
            tried,
        )))
    }

    fn advance(
        &self,
        id: &str,
        state: ItemState,
        next: ItemState,
    ) -> Result<ItemState, PipelineError> {
        state
            .advance(next)
            .map_err(|(from, to)| PipelineError::IllegalTransition {
                id: id.to_string(),
                from,
                to,
            })
    }

    fn fail_with_client(
        &self,
        id: &str,
        state: ItemState,
        error: &ClientError,
        attempts: u32,
    ) -> Result<ItemState, PipelineError> {
        if error.is_fatal() {
            return Err(PipelineError::Unauthorized(error.to_string()));
        }
        self.fail(id, state, FailureReason::from_client(error, attempts))
    }

    /// Move to `Failed` in the pending stage and record it.
    fn fail(
        &self,
        id: &str,
        state: ItemState,
        reason: FailureReason,
    ) -> Result<ItemState, PipelineError> {
        let illegal = |(from, to)| PipelineError::IllegalTransition {
            id: id.to_string(),
            from,
            to,
        };
        let stage = state.pending_stage().ok_or_else(|| illegal((state.name(), "failed")))?;

        if reason.is_permanent() {
            self.checkpoint
                .mark_done(&ItemRecord::failed(id, stage, &reason))?;
            tracing::warn!(asin = %id, %stage, %reason, "item failed");
        } else {
            self.checkpoint.record_deferred(id, stage, &reason)?;
            tracing::warn!(asin = %id, %stage, %reason, "item deferred to a later run");
        }

        state.fail(reason).map_err(illegal)
    }

    /// Run one remote call under the retry policy, each attempt bounded by
    /// the call timeout. Returns the result and the number of attempts.
    async fn call<T, F, Fut>(&self, mut op: F) -> (Result<T, ClientError>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let timeout = self.config.call_timeout;
        let mut calls = 0;

        let result = with_retry(&self.config.retry, || {
            calls += 1;
            let attempt = op();
            async move {
                match tokio::time::timeout(timeout, attempt).await {
                    Ok(result) => result,
                    Err(_) => Err(ClientError::Timeout(timeout)),
                }
            }
        })
        .await;

        match result {
            RetryResult::Success(value) => (Ok(value), calls),
            RetryResult::Failed {
                last_error,
                attempts,
            } => (Err(last_error), attempts),
        }
    }

    /// Pause between items, cut short by a stop request.
    async fn pause(&self) {
        let delay = self.config.item_delay;
        if delay.is_zero() {
            return;
        }
        match &self.stop {
            Some(rx) => {
                let mut rx = rx.clone();
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    Ok(_) = rx.wait_for(|stop| *stop) => {}
                }
            }
            None => tokio::time::sleep(delay).await,
        }
    }

    async fn publish(&self, rows_written: usize) -> PublishOutcome {
        let Some(sink) = &self.sink else {
            return PublishOutcome::Disabled;
        };
        if rows_written == 0 && !self.config.publish.publish_always {
            tracing::info!("no new rows, skipping publish");
            return PublishOutcome::Skipped;
        }

        let publish = sink.publish(&self.config.output_path);
        match tokio::time::timeout(self.config.call_timeout.max(Duration::from_secs(60)), publish)
            .await
        {
            Ok(Ok(destination)) => {
                tracing::info!(%destination, "output published");
                PublishOutcome::Published { destination }
            }
            Ok(Err(e)) => {
                tracing::warn!(sink = sink.name(), error = %e, "publish failed; local file is intact");
                PublishOutcome::Failed {
                    error: e.to_string(),
                }
            }
            Err(_) => {
                tracing::warn!(sink = sink.name(), "publish timed out; local file is intact");
                PublishOutcome::Failed {
                    error: "publish timed out".to_string(),
                }
            }
        }
    }
}
