//! The polling consumer: scan, sort, dispatch, release.
//!
//! One poll is one thread-of-control walking scan → filter → dispatch. The
//! owning scheduler may run many consumers concurrently; all shared state
//! lives in the thread-safe repositories. A shutdown observed mid-batch
//! stops dispatching queued candidates and releases their tracking entries
//! without touching the lifecycle of the candidate already in flight.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::UNIX_EPOCH;

use rand::seq::SliceRandom;
use sluice_config::{EndpointSettings, SortBy};
use sluice_core::{MemoryRepository, Repository, SourceFile};
use sluice_events::{Event, EventBus};
use sluice_fsops::FileOperations;
use sluice_telemetry::Metrics;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace};

use crate::error::{EngineError, EngineResult};
use crate::exchange::{Delivery, DeliveryProcessor};
use crate::filter::{AdmissionFilter, FileFilter};
use crate::lock::create_read_lock;
use crate::scanner::Scanner;
use crate::strategy::ProcessStrategy;

/// Builder for a [`PollingConsumer`].
pub struct ConsumerBuilder {
    settings: EndpointSettings,
    processor: Arc<dyn DeliveryProcessor>,
    in_progress: Option<Arc<dyn Repository>>,
    idempotent: Option<Arc<dyn Repository>>,
    filter: Option<Arc<dyn FileFilter>>,
    file_predicate: Option<Arc<dyn FileFilter>>,
    events: Option<EventBus>,
    metrics: Option<Metrics>,
}

impl ConsumerBuilder {
    /// Override the in-progress repository (default: unbounded in-memory).
    #[must_use]
    pub fn with_in_progress_repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.in_progress = Some(repository);
        self
    }

    /// Override the idempotent repository (default: bounded in-memory when
    /// idempotent consumption is enabled).
    #[must_use]
    pub fn with_idempotent_repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.idempotent = Some(repository);
        self
    }

    /// Install a user filter, run before the pattern filters.
    #[must_use]
    pub fn with_filter(mut self, filter: Arc<dyn FileFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Install a file predicate, run after the pattern filters.
    #[must_use]
    pub fn with_file_predicate(mut self, predicate: Arc<dyn FileFilter>) -> Self {
        self.file_predicate = Some(predicate);
        self
    }

    /// Attach a shared event bus.
    #[must_use]
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Attach a shared metrics registry.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate the settings and assemble the consumer.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when validation rejects the settings
    /// and [`EngineError::Init`] when a collaborator cannot be constructed.
    pub fn build(self) -> EngineResult<PollingConsumer> {
        let settings = Arc::new(
            self.settings
                .validated()
                .map_err(|source| EngineError::Config { source })?,
        );
        let operations = FileOperations::new(Arc::clone(&settings))
            .map_err(|source| EngineError::operation("build", source))?;
        let events = self.events.unwrap_or_default();
        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => Metrics::new().map_err(|error| EngineError::Init {
                message: error.to_string(),
            })?,
        };

        let in_progress = self
            .in_progress
            .unwrap_or_else(|| Arc::new(MemoryRepository::unbounded()));
        let idempotent = if settings.idempotent_enabled() {
            Some(
                self.idempotent
                    .unwrap_or_else(|| Arc::new(MemoryRepository::new())),
            )
        } else {
            self.idempotent
        };

        let lock = create_read_lock(&settings, idempotent.as_ref())?;
        let admission = AdmissionFilter::new(
            Arc::clone(&settings),
            self.filter,
            self.file_predicate,
        );
        let scanner = Scanner::new(
            Arc::clone(&settings),
            admission,
            Arc::clone(&in_progress),
            idempotent.clone(),
        );
        let strategy = ProcessStrategy::new(
            Arc::clone(&settings),
            operations.clone(),
            lock,
            Arc::clone(&in_progress),
            idempotent.clone(),
        );

        Ok(PollingConsumer {
            settings,
            operations,
            processor: self.processor,
            scanner,
            strategy,
            in_progress,
            idempotent,
            events,
            metrics,
            prepared: AtomicBool::new(false),
        })
    }
}

/// Polls one root directory and drives admitted files through the consume
/// lifecycle.
pub struct PollingConsumer {
    settings: Arc<EndpointSettings>,
    operations: FileOperations,
    processor: Arc<dyn DeliveryProcessor>,
    scanner: Scanner,
    strategy: ProcessStrategy,
    in_progress: Arc<dyn Repository>,
    idempotent: Option<Arc<dyn Repository>>,
    events: EventBus,
    metrics: Metrics,
    prepared: AtomicBool,
}

impl PollingConsumer {
    /// Start building a consumer over `settings` dispatching to `processor`.
    #[must_use]
    pub fn builder(
        settings: EndpointSettings,
        processor: Arc<dyn DeliveryProcessor>,
    ) -> ConsumerBuilder {
        ConsumerBuilder {
            settings,
            processor,
            in_progress: None,
            idempotent: None,
            filter: None,
            file_predicate: None,
            events: None,
            metrics: None,
        }
    }

    /// The validated settings this consumer runs with.
    #[must_use]
    pub fn settings(&self) -> &EndpointSettings {
        &self.settings
    }

    /// The event bus lifecycle events are published to.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// The metrics registry this consumer records into.
    #[must_use]
    pub const fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Number of files currently tracked as in progress.
    #[must_use]
    pub fn in_progress_size(&self) -> usize {
        self.in_progress.len()
    }

    /// The idempotent repository in effect, when idempotent consumption is
    /// enabled.
    #[must_use]
    pub fn idempotent_repository(&self) -> Option<&Arc<dyn Repository>> {
        self.idempotent.as_ref()
    }

    /// Execute one poll: scan, sort, dispatch. Returns the number of
    /// candidates actually dispatched to the processor.
    ///
    /// # Errors
    ///
    /// Returns an error when the scan fails; per-candidate failures are
    /// reported through the error channel and do not stop the batch.
    pub async fn poll(&self) -> EngineResult<usize> {
        self.poll_internal(None).await
    }

    /// Run the poll loop until `shutdown` flips to `true`.
    ///
    /// # Errors
    ///
    /// Returns the scan error that stopped the loop, if any.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> EngineResult<()> {
        let mut interval = tokio::time::interval(self.settings.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            directory = %self.settings.directory.display(),
            interval = ?self.settings.poll_interval,
            "consumer started"
        );
        loop {
            if *shutdown.borrow() {
                break;
            }
            let ticked = tokio::select! {
                _ = interval.tick() => true,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    false
                }
            };
            if ticked {
                self.poll_internal(Some(&shutdown)).await?;
            }
        }
        info!(directory = %self.settings.directory.display(), "consumer stopped");
        Ok(())
    }

    async fn poll_internal(
        &self,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> EngineResult<usize> {
        if !self.prepared.swap(true, Ordering::SeqCst) {
            self.strategy.prepare_on_startup()?;
        }

        self.metrics.record_poll();
        self.events.publish(Event::PollStarted {
            directory: self.settings.directory.display().to_string(),
        });

        let mut files = self.scanner.scan()?;
        for file in &files {
            self.metrics.record_admission();
            self.events.publish(Event::FileAdmitted {
                path: file.absolute_path().display().to_string(),
            });
        }
        self.sort_candidates(&mut files);

        let mut queue: VecDeque<Delivery> = files.into_iter().map(Delivery::new).collect();
        self.apply_lazy_cap(&mut queue);

        let total = queue.len();
        if total > 0 {
            debug!(total, "files to consume");
        }

        let mut dispatched = 0;
        let mut index = 0;
        while let Some(mut delivery) = queue.pop_front() {
            if shutdown.is_some_and(|signal| *signal.borrow()) {
                debug!(
                    remaining = queue.len() + 1,
                    "shutdown requested, stopping batch"
                );
                self.scanner.release(delivery.file());
                break;
            }
            delivery.set_batch(index, total);
            if self.process_delivery(&mut delivery).await {
                dispatched += 1;
            }
            index += 1;
        }
        // Anything still queued was never dispatched; its tracking entries
        // must not outlive the batch.
        for delivery in &queue {
            self.scanner.release(delivery.file());
        }

        self.metrics.set_in_progress(self.in_progress.len());
        self.events.publish(Event::PollCompleted {
            directory: self.settings.directory.display().to_string(),
            candidates: total,
            dispatched,
        });
        Ok(dispatched)
    }

    fn sort_candidates(&self, files: &mut [SourceFile]) {
        match self.settings.sort_by {
            Some(SortBy::FileName { reverse }) => {
                files.sort_by_key(SourceFile::file_name);
                if reverse {
                    files.reverse();
                }
            }
            Some(SortBy::FileLength { reverse }) => {
                files.sort_by_key(SourceFile::file_length);
                if reverse {
                    files.reverse();
                }
            }
            Some(SortBy::LastModified { reverse }) => {
                files.sort_by_key(|file| file.last_modified().unwrap_or(UNIX_EPOCH));
                if reverse {
                    files.reverse();
                }
            }
            None => {}
        }
        if self.settings.shuffle {
            files.shuffle(&mut rand::rng());
        }
    }

    fn apply_lazy_cap(&self, queue: &mut VecDeque<Delivery>) {
        let cap = self.settings.max_messages_per_poll;
        if self.settings.eager_max_messages_per_poll || cap == 0 {
            return;
        }
        if queue.len() <= cap {
            return;
        }
        debug!(
            cap,
            total = queue.len(),
            "limiting poll to the configured maximum, releasing the excess"
        );
        while queue.len() > cap {
            if let Some(dropped) = queue.pop_back() {
                self.scanner.release(dropped.file());
            }
        }
    }

    /// Drive one delivery through begin → retrieve → process → complete.
    /// Returns whether the file was actually dispatched.
    async fn process_delivery(&self, delivery: &mut Delivery) -> bool {
        trace!(file = %delivery.file().absolute_path().display(), "processing file");

        let began = match self.strategy.begin(delivery).await {
            Ok(granted) => {
                if !granted {
                    debug!(
                        file = %delivery.file().absolute_path().display(),
                        "read lock not granted, skipping this cycle"
                    );
                    self.metrics.record_lock_timeout();
                    self.events.publish(Event::LockTimeout {
                        path: delivery.file().absolute_path().display().to_string(),
                    });
                }
                granted
            }
            Err(cause) => {
                self.report_failure(delivery, "begin", &cause);
                false
            }
        };
        if !began {
            if let Err(cause) = self.strategy.abort(delivery) {
                self.report_failure(delivery, "abort", &cause);
            }
            self.scanner.release(delivery.file());
            self.metrics.record_exchange("aborted");
            return false;
        }

        // The file may have changed while the lock was being acquired.
        if let Ok(metadata) = std::fs::metadata(delivery.file().absolute_path()) {
            delivery.file_mut().refresh_from(&metadata);
            delivery.refresh_headers();
        }

        if self.settings.retrieve_file {
            let path = delivery.file().absolute_path().to_path_buf();
            match self.operations.retrieve_file(&path) {
                Ok(body) => delivery.set_body(Some(body)),
                Err(source) => {
                    if self.settings.ignore_cannot_retrieve {
                        debug!(
                            file = %path.display(),
                            "cannot retrieve file, ignoring per configuration"
                        );
                        if let Err(cause) = self.strategy.abort(delivery) {
                            self.report_failure(delivery, "abort", &cause);
                        }
                        self.scanner.release(delivery.file());
                        return false;
                    }
                    let cause = EngineError::Retrieve { path, source };
                    self.report_failure(delivery, "retrieve", &cause);
                    if let Err(rollback_cause) = self.strategy.rollback(delivery) {
                        self.report_failure(delivery, "rollback", &rollback_cause);
                    }
                    self.metrics.record_exchange("failed");
                    return true;
                }
            }
        } else {
            trace!(
                file = %delivery.file().absolute_path().display(),
                "skipping retrieval"
            );
            delivery.set_body(None);
        }

        debug!(
            file = %delivery.file().absolute_path().display(),
            exchange = %delivery.id(),
            "dispatching to processor"
        );
        let outcome = self.processor.process(delivery).await;

        // Completion hook: exactly one of commit or rollback runs.
        match outcome {
            Ok(()) => match self.strategy.commit(delivery) {
                Ok(()) => {
                    self.metrics.record_exchange("completed");
                    self.events.publish(Event::ExchangeCompleted {
                        exchange_id: delivery.id().to_string(),
                        path: delivery.file().absolute_path().display().to_string(),
                    });
                }
                Err(cause) => {
                    self.report_failure(delivery, "commit", &cause);
                    self.metrics.record_exchange("failed");
                }
            },
            Err(cause) => {
                error!(
                    file = %delivery.file().absolute_path().display(),
                    error = %cause,
                    "processor failed, rolling back"
                );
                self.events.publish(Event::ExchangeFailed {
                    exchange_id: delivery.id().to_string(),
                    path: delivery.file().absolute_path().display().to_string(),
                    message: cause.to_string(),
                });
                if let Err(rollback_cause) = self.strategy.rollback(delivery) {
                    self.report_failure(delivery, "rollback", &rollback_cause);
                }
                self.metrics.record_exchange("failed");
            }
        }
        true
    }

    fn report_failure(&self, delivery: &Delivery, step: &'static str, cause: &EngineError) {
        error!(
            file = %delivery.file().absolute_path().display(),
            step,
            error = %cause,
            "consume lifecycle step failed"
        );
        self.events.publish(Event::ExchangeFailed {
            exchange_id: delivery.id().to_string(),
            path: delivery.file().absolute_path().display().to_string(),
            message: cause.to_string(),
        });
    }
}
