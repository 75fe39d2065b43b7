//! Test matrix runner: sample → inject → query → record, one cell at a time.
//!
//! Cells are evaluated in the grid's fixed order and each result is appended
//! to the store before the next cell starts. Resuming an interrupted run
//! needs no checkpoint: the runner counts what the store already holds for
//! this model and skips that many cells. The skipped cells' window draws are
//! replayed so a seeded run picks the same windows whether or not it was
//! interrupted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::{inject, sample, window_start};
use crate::error::{HaystackError, HaystackResult};
use crate::grid::{Grid, TestCell};
use crate::prompt::PromptTemplate;
use crate::result::TestResult;
use crate::retry::RetryingClient;
use crate::store::ResultStore;
use crate::tokenizer::{TokenId, Tokenizer};

/// What to do when a cell's query fails for good.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the run. Everything recorded so far stays valid and resumable.
    #[default]
    Abort,
    /// Record the cell with an `error` marker and an empty response, then go on.
    Skip,
}

impl std::str::FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            _ => Err(format!("invalid failure policy: {s}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Result batch key, normally the model identifier.
    pub store_id: String,
    pub grid: Grid,
    pub failure_policy: FailurePolicy,
    /// Keep the decoded injected context in each record.
    pub record_context: bool,
}

/// Shared stop switch. Checked before every cell; a call already in flight
/// is allowed to finish and be recorded.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Emitted after each recorded cell. Advisory only.
#[derive(Debug, Clone)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub context_percentage: f64,
    pub context_tokens: usize,
    pub depth: f64,
    pub failed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total_cells: usize,
    /// Cells found already recorded when the run started.
    pub resumed_from: usize,
    /// Cells evaluated by this run.
    pub evaluated: usize,
    /// Evaluated cells recorded with a failure marker.
    pub failed: usize,
}

pub struct Runner<'a, R: Rng> {
    tokenizer: &'a dyn Tokenizer,
    client: &'a RetryingClient,
    store: &'a dyn ResultStore,
    prompt: PromptTemplate,
    config: RunConfig,
    haystack: Vec<TokenId>,
    needle: Vec<TokenId>,
    rng: R,
    cancel: CancelFlag,
}

impl<'a, R: Rng> Runner<'a, R> {
    /// Tokenize the haystack and needle once and check that the needle fits
    /// the smallest window the grid will ask for.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tokenizer: &'a dyn Tokenizer,
        client: &'a RetryingClient,
        store: &'a dyn ResultStore,
        haystack: &str,
        needle: &str,
        prompt: PromptTemplate,
        config: RunConfig,
        rng: R,
    ) -> HaystackResult<Self> {
        let haystack = tokenizer.encode(haystack)?;
        let needle = tokenizer.encode(needle)?;
        if haystack.is_empty() {
            return Err(HaystackError::Config("haystack is empty".into()));
        }
        if needle.is_empty() {
            return Err(HaystackError::Config("needle is empty".into()));
        }

        let smallest_window = config.grid.context_size(0).min(haystack.len());
        if needle.len() > smallest_window {
            return Err(HaystackError::NeedleTooLarge {
                needle: needle.len(),
                window: smallest_window,
            });
        }
        if config.grid.context_size(0) > haystack.len() {
            warn!(
                haystack_tokens = haystack.len(),
                requested = config.grid.context_size(0),
                "haystack shorter than the smallest context size; windows will be clamped"
            );
        }

        info!(
            haystack_tokens = haystack.len(),
            needle_tokens = needle.len(),
            cells = config.grid.len(),
            "runner ready"
        );

        Ok(Self {
            tokenizer,
            client,
            store,
            prompt,
            config,
            haystack,
            needle,
            rng,
            cancel: CancelFlag::new(),
        })
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run(&mut self, on_progress: &mut dyn FnMut(&Progress)) -> HaystackResult<RunSummary> {
        let cells: Vec<TestCell> = self.config.grid.cells().collect();
        let store_id = self.config.store_id.clone();
        let already = self.store.count(&store_id)?;

        let mut summary = RunSummary {
            total_cells: cells.len(),
            resumed_from: already.min(cells.len()),
            ..Default::default()
        };

        if already >= cells.len() {
            if already > cells.len() {
                warn!(
                    store_id = %store_id,
                    recorded = already,
                    cells = cells.len(),
                    "store holds more results than the grid has cells"
                );
            }
            info!(store_id = %store_id, "nothing to do, all cells recorded");
            return Ok(summary);
        }
        if already > 0 {
            info!(store_id = %store_id, skipped = already, "resuming run");
            for cell in &cells[..already] {
                window_start(self.haystack.len(), cell.context_size, &mut self.rng);
            }
        }

        for (index, cell) in cells.iter().enumerate().skip(already) {
            if self.cancel.is_cancelled() {
                info!(store_id = %store_id, completed = index, "run cancelled");
                return Err(HaystackError::Cancelled { completed: index });
            }

            let result = self.evaluate(cell)?;
            self.store.append(&store_id, &result)?;

            summary.evaluated += 1;
            if result.is_failure() {
                summary.failed += 1;
            }

            let progress = Progress {
                completed: index + 1,
                total: cells.len(),
                context_percentage: cell.context_percentage,
                context_tokens: result.context_tokens,
                depth: cell.depth,
                failed: result.is_failure(),
            };
            info!(
                completed = progress.completed,
                total = progress.total,
                "completed test: {:.1}% context ({} tokens), {:.0}% depth",
                progress.context_percentage,
                progress.context_tokens,
                progress.depth * 100.0
            );
            on_progress(&progress);
        }

        Ok(summary)
    }

    fn evaluate(&mut self, cell: &TestCell) -> HaystackResult<TestResult> {
        let window = sample(&self.haystack, cell.context_size, &mut self.rng);
        let injected = inject(&window, &self.needle, cell.depth)?;
        let context = self.tokenizer.decode(&injected.tokens)?;
        debug!(
            window_tokens = window.len(),
            insert_index = injected.insert_index,
            depth = cell.depth,
            "needle injected"
        );

        let prompt = self.prompt.render(&context);
        let mut result = match self.client.complete(&prompt) {
            Ok(response) => TestResult::new(
                injected.len(),
                cell.context_percentage,
                cell.depth,
                response,
            ),
            Err(e) if !e.is_fatal() && self.config.failure_policy == FailurePolicy::Skip => {
                warn!(
                    context_tokens = injected.len(),
                    depth = cell.depth,
                    "cell failed, recording marker: {e}"
                );
                TestResult::failed(
                    injected.len(),
                    cell.context_percentage,
                    cell.depth,
                    e.to_string(),
                )
            }
            Err(e) => return Err(e),
        };

        if self.config.record_context {
            result.context_with_needle = Some(context);
        }
        Ok(result)
    }
}
