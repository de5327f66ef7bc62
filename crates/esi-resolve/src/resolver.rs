//! Fan-out/fan-in resolution of a page's ESI tags.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use esi_core::{CancelToken, EsiConfig, RequestContext};
use esi_fetch::{ResourceFetcher, TimeoutPolicy};
use esi_observability::{LogLevel, LogSink, StructuredLogger};
use esi_tag::{Entity, EntityCollection, Tag};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};

use crate::error::{CancelReason, ResolveError};

/// The first error reported by any worker of a batch.
#[derive(Debug, Default)]
struct FirstError(Mutex<Option<ResolveError>>);

impl FirstError {
    fn record(&self, err: ResolveError) {
        let mut slot = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    fn take(&self) -> Option<ResolveError> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

/// Everything one worker needs, owned.
struct Worker {
    index: usize,
    entity: Entity,
    timeout: Duration,
    fetcher: Arc<dyn ResourceFetcher>,
    scope: Arc<RequestContext>,
    request_cancel: CancelToken,
    results: mpsc::Sender<Tag>,
    first_error: Arc<FirstError>,
    logger: StructuredLogger,
}

impl Worker {
    async fn run(self) {
        let raw_tag = self.entity.raw_tag_str().into_owned();

        let data = match self
            .fetcher
            .fetch(&self.entity, self.timeout, &self.scope)
            .await
        {
            Ok(data) => data,
            Err(source) => {
                let err = if source.is_cancellation() && self.scope.is_done() {
                    ResolveError::Cancelled {
                        reason: self.cancel_reason(),
                        index: Some(self.index),
                        raw_tag: Some(raw_tag.clone()),
                    }
                } else {
                    ResolveError::Fetch {
                        index: self.index,
                        raw_tag: raw_tag.clone(),
                        source,
                    }
                };
                self.logger
                    .entry(LogLevel::Warn, "esi fetch failed")
                    .field_u64("index", self.index as u64)
                    .field("tag", raw_tag)
                    .field("error", err.to_string())
                    .emit();
                self.first_error.record(err);
                self.scope.cancel_token().cancel();
                return;
            }
        };

        let mut tag = self.entity.tag.clone();
        tag.data = data;

        let published = tokio::select! {
            biased;
            _ = self.scope.cancel_token().cancelled() => false,
            sent = self.results.send(tag) => sent.is_ok(),
        };
        if !published {
            let reason = self.cancel_reason();
            self.logger
                .entry(LogLevel::Warn, "esi fetch cancelled")
                .field_u64("index", self.index as u64)
                .field("tag", raw_tag.clone())
                .field("reason", reason.to_string())
                .emit();
            self.first_error.record(ResolveError::Cancelled {
                reason,
                index: Some(self.index),
                raw_tag: Some(raw_tag),
            });
        }
    }

    fn cancel_reason(&self) -> CancelReason {
        if self.request_cancel.is_cancelled() {
            CancelReason::RequestCancelled
        } else if self
            .scope
            .deadline
            .is_some_and(|d| tokio::time::Instant::now() >= d)
        {
            CancelReason::DeadlineExceeded
        } else {
            CancelReason::BatchCancelled
        }
    }
}

/// Fetches the fragments of all entities of a page concurrently.
///
/// One worker runs per entity. The first failure cancels the whole batch
/// and is the only thing returned; fragments are returned only when every
/// entity resolved. Every worker has finished when `resolve` returns.
#[derive(Clone)]
pub struct ParallelResolver {
    fetcher: Arc<dyn ResourceFetcher>,
    timeouts: TimeoutPolicy,
    batch_deadline: Option<Duration>,
    logger: StructuredLogger,
}

impl std::fmt::Debug for ParallelResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelResolver")
            .field("timeouts", &self.timeouts)
            .field("batch_deadline", &self.batch_deadline)
            .finish_non_exhaustive()
    }
}

impl ParallelResolver {
    /// Create a resolver with default timeouts.
    pub fn new(fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self {
            fetcher,
            timeouts: TimeoutPolicy::default(),
            batch_deadline: None,
            logger: StructuredLogger::default().with_component("esi-resolver"),
        }
    }

    /// Create a resolver configured from `config`, logging to `sink`.
    pub fn from_config(
        fetcher: Arc<dyn ResourceFetcher>,
        config: &EsiConfig,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            fetcher,
            timeouts: TimeoutPolicy::from_config(config),
            batch_deadline: config.batch_deadline,
            logger: StructuredLogger::from_config(config, sink).with_component("esi-resolver"),
        }
    }

    /// Set the timeout policy.
    pub fn with_timeouts(mut self, timeouts: TimeoutPolicy) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Bound every call to `deadline`, counted from its start.
    pub fn with_batch_deadline(mut self, deadline: Duration) -> Self {
        self.batch_deadline = Some(deadline);
        self
    }

    /// Set the logger.
    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger.with_component("esi-resolver");
        self
    }

    /// Resolve every entity of `entities` for `req`.
    ///
    /// The returned tags carry the fetched bytes and are in completion
    /// order; match them to the page by `start`/`end`. The collection
    /// itself is not modified.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn resolve(
        &self,
        entities: &EntityCollection,
        req: &RequestContext,
    ) -> Result<Vec<Tag>, ResolveError> {
        let started = Instant::now();
        if entities.is_empty() {
            return Ok(Vec::new());
        }

        let logger = self.logger.clone().with_request_id(req.request_id.clone());
        let scope = Arc::new(self.scope_for(req));
        let first_error = Arc::new(FirstError::default());
        let (tx, mut rx) = mpsc::channel::<Tag>(1);

        let mut workers = JoinSet::new();
        let mut tasks = HashMap::with_capacity(entities.len());
        for (index, entity) in entities.iter().enumerate() {
            let worker = Worker {
                index,
                entity: entity.clone(),
                timeout: self.timeouts.resolve(entity.timeout),
                fetcher: self.fetcher.clone(),
                scope: scope.clone(),
                request_cancel: req.cancel_token().clone(),
                results: tx.clone(),
                first_error: first_error.clone(),
                logger: logger.clone(),
            };
            let handle = workers.spawn(worker.run());
            tasks.insert(handle.id(), (index, entity.raw_tag_str().into_owned()));
        }
        drop(tx);

        let deadline = scope.deadline;
        let deadline_passed = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline_passed);

        // Workers are joined while fragments are collected so that a panic
        // cancels its siblings right away.
        let mut tags = Vec::with_capacity(entities.len());
        let mut channel_open = true;
        let mut deadline_hit = false;
        while channel_open || !workers.is_empty() {
            tokio::select! {
                tag = rx.recv(), if channel_open => match tag {
                    Some(tag) => tags.push(tag),
                    None => channel_open = false,
                },
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    if let Err(err) = joined {
                        let (index, raw_tag) = tasks.remove(&err.id()).unwrap_or_default();
                        let message = panic_message(err);
                        logger
                            .entry(LogLevel::Warn, "esi worker failed")
                            .field_u64("index", index as u64)
                            .field("tag", raw_tag.clone())
                            .field("error", message.clone())
                            .emit();
                        first_error.record(ResolveError::Worker {
                            index,
                            raw_tag,
                            message,
                        });
                        scope.cancel_token().cancel();
                    }
                },
                _ = &mut deadline_passed, if !deadline_hit => {
                    deadline_hit = true;
                    logger
                        .entry(LogLevel::Warn, "esi batch deadline exceeded")
                        .field_u64("entities", entities.len() as u64)
                        .field_u64("published", tags.len() as u64)
                        .emit();
                    first_error.record(ResolveError::Cancelled {
                        reason: CancelReason::DeadlineExceeded,
                        index: None,
                        raw_tag: None,
                    });
                    scope.cancel_token().cancel();
                },
                else => break,
            }
        }

        if let Some(err) = first_error.take() {
            logger
                .entry(LogLevel::Error, "esi batch failed")
                .field_u64("entities", entities.len() as u64)
                .field_bool("cancelled", err.is_cancellation())
                .field("error", err.to_string())
                .duration_ms("elapsed_ms", started.elapsed())
                .emit();
            return Err(err);
        }

        logger
            .entry(LogLevel::Debug, "esi batch resolved")
            .field_u64("entities", entities.len() as u64)
            .duration_ms("elapsed_ms", started.elapsed())
            .emit();
        Ok(tags)
    }

    /// The request as seen by workers: a child cancellation scope and the
    /// earlier of the request and batch deadlines.
    fn scope_for(&self, req: &RequestContext) -> RequestContext {
        let mut scope = req.scoped();
        if let Some(limit) = self.batch_deadline {
            let batch = tokio::time::Instant::now() + limit;
            scope.deadline = Some(match scope.deadline {
                Some(existing) => existing.min(batch),
                None => batch,
            });
        }
        scope
    }
}

/// Readable reason for a worker that ended without reporting.
fn panic_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "worker was aborted".to_string();
    }
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "worker panicked".to_string()),
        Err(err) => err.to_string(),
    }
}
