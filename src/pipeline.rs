//! Batch redaction pipeline

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use lopdf::Document;
use tracing::{error, info, warn};

use crate::censor::{CensorStats, PatternCensor};
use crate::config::CensorConfig;
use crate::error::Result;
use crate::rewrite::{RewriteDriver, SharedDocument};

/// One input/output pair in a batch.
#[derive(Debug, Clone)]
pub struct RedactionJob {
    pub input: PathBuf,
    pub output: PathBuf,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchSummary {
    pub processed: usize,
    pub failed: usize,
}

/// Runs a batch of redaction jobs. Each document is processed on a blocking
/// worker; a failure aborts that document only and the batch continues.
pub struct Pipeline {
    config: CensorConfig,
    dry_run: bool,
}

impl Pipeline {
    pub fn new(config: CensorConfig, dry_run: bool) -> Self {
        Self { config, dry_run }
    }

    pub async fn execute(&self, jobs: Vec<RedactionJob>) -> BatchSummary {
        let mut summary = BatchSummary::default();
        let mut handles = Vec::with_capacity(jobs.len());
        for job in jobs {
            let config = self.config.clone();
            let dry_run = self.dry_run;
            handles.push((
                job.input.clone(),
                tokio::task::spawn_blocking(move || process_file(&config, &job, dry_run)),
            ));
        }
        for (input, handle) in handles {
            match handle.await {
                Ok(Ok(stats)) => {
                    summary.processed += 1;
                    info!(
                        input = %input.display(),
                        stats = %serde_json::to_string(&stats).unwrap_or_default(),
                        "document redacted"
                    );
                }
                Ok(Err(e)) => {
                    summary.failed += 1;
                    error!(input = %input.display(), error = %e, "document failed");
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(input = %input.display(), error = %e, "worker panicked");
                }
            }
        }
        summary
    }
}

/// Load, censor and save one document. Output is written only after the
/// whole document has been rewritten successfully.
pub fn process_file(config: &CensorConfig, job: &RedactionJob, dry_run: bool) -> Result<CensorStats> {
    let document = Document::load(&job.input)?;
    let (mut document, stats) = process_document(document, config)?;
    if dry_run {
        info!(input = %job.input.display(), "dry run, output not written");
    } else {
        document.save(&job.output)?;
    }
    Ok(stats)
}

/// The two censoring passes over an in-memory document: scan, then rewrite.
pub fn process_document(
    document: Document,
    config: &CensorConfig,
) -> Result<(Document, CensorStats)> {
    let mut censor = PatternCensor::new(config.token_definitions()?, config.draw_boxes)?;
    censor.scan(&document)?;
    let shared: SharedDocument = Rc::new(RefCell::new(document));
    {
        let mut driver = RewriteDriver::new(shared.clone(), &mut censor);
        driver.process()?;
    }
    let document = match Rc::try_unwrap(shared) {
        Ok(cell) => cell.into_inner(),
        Err(shared) => {
            // a leaked region sink kept the document alive
            warn!("document still shared after rewrite");
            shared.borrow().clone()
        }
    };
    Ok((document, censor.into_stats()))
}
