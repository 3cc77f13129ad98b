use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::pipeline::ScraperResult;
use super::ScraperGenerator;
use crate::error::{ForgeError, ForgeResult};
use crate::logging::RunIdGenerator;
use crate::templates::GenerationParams;

/// Cooperative stop flag for a running batch
#[derive(Debug, Clone, Default)]
pub struct BatchControl {
    stopped: Arc<AtomicBool>,
}

impl BatchControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop launching new pipelines. Pipelines already running finish.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl ScraperGenerator {
    /// Generate scrapers for up to `batch.max_domains` domains.
    ///
    /// Results come back in input order. A failing or panicking pipeline
    /// yields a rejected result for its domain and leaves the others alone.
    pub async fn batch_generate(&self, domains: &[String], params: &GenerationParams) -> ForgeResult<Vec<ScraperResult>> {
        let batch_id = Uuid::new_v4().to_string();
        let control = BatchControl::new();
        self.active_batches.insert(batch_id.clone(), control.clone());

        let results = self.batch_generate_with_control(domains, params, &control).await;

        self.active_batches.remove(&batch_id);
        results
    }

    /// Same as [`batch_generate`](Self::batch_generate), stopped through `control`
    #[instrument(skip_all, fields(component = "orchestrator", domains = domains.len()))]
    pub async fn batch_generate_with_control(
        &self,
        domains: &[String],
        params: &GenerationParams,
        control: &BatchControl,
    ) -> ForgeResult<Vec<ScraperResult>> {
        let limit = self.config.batch.max_domains;
        if domains.len() > limit {
            return Err(ForgeError::BatchTooLarge {
                requested: domains.len(),
                limit,
            });
        }

        let workers = self.config.batch.workers.max(1);
        info!("Starting batch of {} domains with {} workers", domains.len(), workers);

        let outcomes: Vec<ForgeResult<ScraperResult>> = stream::iter(domains.iter().enumerate())
            .map(|(position, domain)| self.batch_item(position, domain, params, control))
            .buffered(workers)
            .collect()
            .await;

        let results = outcomes.into_iter().collect::<ForgeResult<Vec<_>>>()?;
        let ready = results.iter().filter(|r| r.is_ready()).count();
        info!("Batch finished: {} of {} ready", ready, results.len());
        Ok(results)
    }

    /// Stop every batch currently running on this generator
    pub fn stop(&self) {
        for entry in self.active_batches.iter() {
            entry.value().stop();
        }
        info!("Stop requested for {} running batch(es)", self.active_batches.len());
    }

    async fn batch_item(
        &self,
        position: usize,
        domain: &str,
        params: &GenerationParams,
        control: &BatchControl,
    ) -> ForgeResult<ScraperResult> {
        let run_id = RunIdGenerator::generate();
        let operation = format!("batch_generate[{}]", position);

        if control.is_stopped() {
            return Ok(self
                .finish(self.failure_result(&run_id, domain, ForgeError::Cancelled, &operation))
                .await);
        }

        let outcome = AssertUnwindSafe(self.run_pipeline(&run_id, domain, params))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) if e.is_configuration() => {
                control.stop();
                Err(e)
            }
            Ok(Err(e)) => {
                warn!("Batch item {} ({}) failed: {}", position, domain, e);
                Ok(self.finish(self.failure_result(&run_id, domain, e, &operation)).await)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!("Batch item {} ({}) panicked: {}", position, domain, message);
                let error = ForgeError::internal(format!("pipeline panicked: {}", message));
                Ok(self.finish(self.failure_result(&run_id, domain, error, &operation)).await)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
