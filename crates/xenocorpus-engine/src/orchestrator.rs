use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use tracing::{info, warn};
use xenocorpus_contracts::jsonl::count_records;
use xenocorpus_contracts::vocab::{LABEL_HATE, PRIMARY_LABELS};
use xenocorpus_contracts::JsonlWriter;

use crate::config::GeneratorConfig;
use crate::gemini::GenerationBackend;
use crate::prompt::{build_prompt, PromptTemplate};
use crate::requester::{BatchFailure, BatchRequester};
use crate::validator::Validator;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSummary {
    pub batches: usize,
    pub failed_batches: usize,
    pub blocked_batches: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub per_class: IndexMap<String, usize>,
    pub output_path: PathBuf,
    pub rejected_path: PathBuf,
    pub include_non_hate: bool,
}

impl GenerationSummary {
    fn new(config: &GeneratorConfig, batches: usize) -> Self {
        Self {
            batches,
            failed_batches: 0,
            blocked_batches: 0,
            accepted: 0,
            rejected: 0,
            per_class: PRIMARY_LABELS
                .iter()
                .map(|label| (label.to_string(), 0))
                .collect(),
            output_path: config.output_path.clone(),
            rejected_path: config.rejected_path.clone(),
            include_non_hate: config.include_non_hate,
        }
    }

    /// Share of accepted records labeled hate; only meaningful for
    /// balanced runs.
    pub fn hate_proportion(&self) -> Option<f64> {
        if !self.include_non_hate || self.accepted == 0 {
            return None;
        }
        let hate = self.per_class.get(LABEL_HATE).copied().unwrap_or(0);
        Some(hate as f64 / self.accepted as f64)
    }
}

/// Per-batch rng seed derived from the run seed.
pub fn batch_seed(seed: u64, batch: usize) -> u64 {
    seed ^ (batch as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Bar over `total` batches; hidden when `visible` is false.
pub fn batch_progress(total: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let progress = ProgressBar::new(total as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} batches {msg}")
            .expect("valid template"),
    );
    progress
}

struct BatchOutcome {
    batch: usize,
    result: Result<Vec<Value>, BatchFailure>,
}

/// Runs `num_batches` generation batches on a bounded worker pool.
///
/// Workers only talk to the API. Validation, id assignment and file
/// appends happen on the calling thread as batches complete, so ids
/// follow completion order.
pub fn run_generation<B: GenerationBackend>(
    requester: &BatchRequester<B>,
    config: &GeneratorConfig,
    template: Option<&PromptTemplate>,
    seed: u64,
    num_batches: usize,
) -> anyhow::Result<GenerationSummary> {
    let mut summary = GenerationSummary::new(config, num_batches);
    if num_batches == 0 {
        return Ok(summary);
    }

    let existing = count_records(&config.output_path)? + count_records(&config.rejected_path)?;
    let mut validator = Validator::from_config(config).starting_after(existing as u64);
    let corpus = JsonlWriter::new(&config.output_path);
    let audit = JsonlWriter::new(&config.rejected_path);

    let workers = config.max_in_flight.max(1).min(num_batches);
    let cursor = AtomicUsize::new(0);
    let progress = batch_progress(num_batches, config.show_progress);
    info!(
        batches = num_batches,
        batch_size = config.batch_size,
        workers,
        output = %config.output_path.display(),
        "starting generation"
    );

    thread::scope(|scope| -> anyhow::Result<()> {
        let (tx, rx) = mpsc::channel::<BatchOutcome>();
        for _ in 0..workers {
            let tx = tx.clone();
            let cursor = &cursor;
            scope.spawn(move || loop {
                let batch = cursor.fetch_add(1, Ordering::Relaxed) + 1;
                if batch > num_batches {
                    break;
                }
                let mut rng = StdRng::seed_from_u64(batch_seed(seed, batch));
                let plan = build_prompt(
                    &mut rng,
                    config.batch_size,
                    config.include_non_hate,
                    template,
                );
                let result = requester.request_batch(&plan.text, batch);
                if tx.send(BatchOutcome { batch, result }).is_err() {
                    break;
                }
            });
        }
        drop(tx);

        let mut completed = 0usize;
        for outcome in rx {
            completed += 1;
            progress.inc(1);
            let raws = match outcome.result {
                Ok(raws) => raws,
                Err(failure) => {
                    summary.failed_batches += 1;
                    if failure.is_blocked() {
                        summary.blocked_batches += 1;
                    }
                    progress.suspend(|| warn!(batch = outcome.batch, "{failure}"));
                    continue;
                }
            };

            let screened = validator.screen(&raws, &crate::now_utc_iso());
            for record in &screened.accepted {
                *summary
                    .per_class
                    .entry(record.primary_label.clone())
                    .or_insert(0) += 1;
            }
            summary.accepted += corpus.append_batch(&screened.accepted)?;
            summary.rejected += audit.append_batch(&screened.rejected)?;

            progress.set_message(format!("{} accepted", summary.accepted));
            progress.suspend(|| {
                info!(
                    batch = outcome.batch,
                    completed,
                    total = num_batches,
                    accepted = screened.accepted.len(),
                    rejected = screened.rejected.len(),
                    running_accepted = summary.accepted,
                    "batch folded"
                )
            });
        }
        Ok(())
    })?;
    progress.finish_and_clear();

    info!(
        accepted = summary.accepted,
        rejected = summary.rejected,
        failed_batches = summary.failed_batches,
        "generation finished"
    );
    Ok(summary)
}
