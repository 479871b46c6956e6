//! Background bulk dispatcher.
//!
//! # Responsibility
//! - Hold the per-group lease for the lifetime of one dispatch.
//! - Apply cheap actions as a single unit and enrichment item by item.
//! - Stream `DispatchEvent`s to the caller through one channel per dispatch.
//!
//! # Invariants
//! - Target ids are resolved once, before the task starts; the run never
//!   re-resolves a selection.
//! - Cancellation is checked between items only.
//! - The lease is released before the terminal event is sent.
//! - A panicking worker still ends the stream with one `Error` event.
//! - Failed and cancelled items cost nothing.

use crate::dispatch::action::{BulkAction, EnrichParams};
use crate::dispatch::cost::{CostEstimate, CostModel};
use crate::dispatch::enrichment::{EnrichmentProvider, EnrichmentResult, ProviderError};
use crate::dispatch::progress::{DispatchEvent, DispatchReport, FailedItem, ProgressEvent};
use crate::logging::one_line;
use crate::model::record::{GroupId, Record, RecordId};
use crate::repo::serp_log_repo::SerpLogEntry;
use log::{info, warn};
use std::any::Any;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const MAX_PANIC_MESSAGE_CHARS: usize = 160;

/// Single-writer slot owned by one group.
#[derive(Debug, Clone, Default)]
pub struct LeaseSlot {
    busy: Arc<AtomicBool>,
}

impl LeaseSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the slot, or returns `None` while another holder is active.
    pub fn try_acquire(&self) -> Option<GroupLease> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GroupLease {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_held(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Held lease; released on drop.
#[derive(Debug)]
pub struct GroupLease {
    busy: Arc<AtomicBool>,
}

impl Drop for GroupLease {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Mutation surface a dispatch runs against.
pub trait DispatchTarget: Send + Sync + 'static {
    type Error: Error + Send + Sync + 'static;

    fn group_id(&self) -> GroupId;
    fn lease(&self) -> &LeaseSlot;
    /// Rejects actions that can never succeed (unknown field, bad value).
    fn validate_action(&self, action: &BulkAction) -> Result<(), Self::Error>;
    /// Current record and its write version.
    fn snapshot(&self, id: RecordId) -> Option<(Record, u64)>;
    /// Applies a cheap action to every id as one unit. Returns records changed.
    fn apply_bulk(&self, ids: &[RecordId], action: &BulkAction) -> Result<usize, Self::Error>;
    /// Writes one enrichment result unless the record moved past
    /// `expected_version`.
    fn commit_enrichment(
        &self,
        id: RecordId,
        expected_version: u64,
        result: &EnrichmentResult,
    ) -> Result<(), Self::Error>;
    /// Records one enrichment attempt in the target's history.
    ///
    /// Targets without a history ignore it.
    fn record_attempt(&self, _entry: &SerpLogEntry) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[derive(Debug)]
pub enum DispatchError {
    /// Another dispatch holds the group's lease.
    GroupBusy(GroupId),
    /// No requested id exists any more.
    EmptyTarget,
    InvalidAction(String),
    /// The action failed as a whole.
    Failed(String),
    /// The background task panicked or was aborted.
    TaskAborted(String),
}

impl Display for DispatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GroupBusy(id) => write!(f, "group {id} already has a bulk operation in flight"),
            Self::EmptyTarget => write!(f, "bulk operation has no remaining target records"),
            Self::InvalidAction(message) => write!(f, "invalid bulk action: {message}"),
            Self::Failed(message) => write!(f, "bulk operation failed: {message}"),
            Self::TaskAborted(message) => write!(f, "bulk operation task aborted: {message}"),
        }
    }
}

impl Error for DispatchError {}

/// Retry and pricing knobs.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub cost_model: CostModel,
    /// Provider calls per item, first attempt included.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub backoff_base: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            cost_model: CostModel::default(),
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
        }
    }
}

/// Caller side of one running dispatch.
pub struct DispatchHandle {
    events: UnboundedReceiver<DispatchEvent>,
    cancel: CancellationToken,
    task: JoinHandle<Result<DispatchReport, String>>,
}

impl DispatchHandle {
    /// Requests a stop after the item in flight.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Next stream event; `None` once the stream is closed.
    pub async fn next_event(&mut self) -> Option<DispatchEvent> {
        self.events.recv().await
    }

    /// Drains every remaining event, then waits for the task.
    pub async fn collect(mut self) -> (Vec<DispatchEvent>, Result<DispatchReport, DispatchError>) {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        let outcome = self.finish().await;
        (events, outcome)
    }

    /// Waits for the task, ignoring unread events.
    pub async fn finish(self) -> Result<DispatchReport, DispatchError> {
        match self.task.await {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(message)) => Err(DispatchError::Failed(message)),
            Err(err) => Err(DispatchError::TaskAborted(err.to_string())),
        }
    }
}

struct WorkPlan {
    requested: usize,
    work: Vec<RecordId>,
    dropped: usize,
    skipped: usize,
}

fn plan_work<T: DispatchTarget + ?Sized>(
    target: &T,
    action: &BulkAction,
    ids: &[RecordId],
) -> WorkPlan {
    let skip_enriched = matches!(action, BulkAction::Enrich(params) if params.skip_enriched);
    let mut seen = HashSet::with_capacity(ids.len());
    let mut plan = WorkPlan {
        requested: ids.len(),
        work: Vec::with_capacity(ids.len()),
        dropped: 0,
        skipped: 0,
    };
    for id in ids {
        if !seen.insert(*id) {
            continue;
        }
        match target.snapshot(*id) {
            None => plan.dropped += 1,
            Some((record, _)) if record.is_trashed() => plan.dropped += 1,
            Some((record, _)) if skip_enriched && record.is_enriched() => plan.skipped += 1,
            Some(_) => plan.work.push(*id),
        }
    }
    plan
}

/// Cost of enriching `ids` under `cost_model`.
///
/// Missing, trashed and duplicate ids are not billed, nor are enriched ones
/// when `params.skip_enriched` is set.
pub fn estimate_cost<T: DispatchTarget + ?Sized>(
    target: &T,
    ids: &[RecordId],
    params: &EnrichParams,
    cost_model: &CostModel,
) -> CostEstimate {
    let plan = plan_work(target, &BulkAction::Enrich(params.clone()), ids);
    cost_model.estimate(plan.work.len(), params.depth)
}

/// Runs bulk actions against dispatch targets.
#[derive(Clone)]
pub struct BulkDispatcher {
    provider: Option<Arc<dyn EnrichmentProvider>>,
    settings: DispatchSettings,
}

impl BulkDispatcher {
    pub fn new(provider: Arc<dyn EnrichmentProvider>, settings: DispatchSettings) -> Self {
        Self {
            provider: Some(provider),
            settings,
        }
    }

    /// Dispatcher for cheap actions only; `Enrich` is rejected up front.
    pub fn without_enrichment(settings: DispatchSettings) -> Self {
        Self {
            provider: None,
            settings,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub fn can_enrich(&self) -> bool {
        self.provider.is_some()
    }

    /// Cost of enriching `ids` with `params`, after skip filtering.
    pub fn estimate<T: DispatchTarget + ?Sized>(
        &self,
        target: &T,
        ids: &[RecordId],
        params: &EnrichParams,
    ) -> CostEstimate {
        estimate_cost(target, ids, params, &self.settings.cost_model)
    }

    /// Starts a dispatch on a background task.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// - `GroupBusy` when another dispatch holds the group's lease.
    /// - `InvalidAction` when the target rejects the action up front, or the
    ///   action is `Enrich` and no provider is configured.
    /// - `EmptyTarget` when none of `ids` exists any more.
    pub fn dispatch<T: DispatchTarget>(
        &self,
        target: Arc<T>,
        action: BulkAction,
        ids: Vec<RecordId>,
    ) -> Result<DispatchHandle, DispatchError> {
        let group_id = target.group_id();
        let lease = target
            .lease()
            .try_acquire()
            .ok_or(DispatchError::GroupBusy(group_id))?;
        if matches!(action, BulkAction::Enrich(_)) && !self.can_enrich() {
            return Err(DispatchError::InvalidAction(
                "no enrichment provider configured".to_string(),
            ));
        }
        target
            .validate_action(&action)
            .map_err(|err| DispatchError::InvalidAction(err.to_string()))?;

        let plan = plan_work(target.as_ref(), &action, &ids);
        if plan.work.is_empty() && plan.skipped == 0 {
            return Err(DispatchError::EmptyTarget);
        }

        info!(
            "event=dispatch_start module=dispatch status=start group_id={} action={} total={} skipped={} dropped={}",
            group_id,
            action.kind().as_str(),
            plan.work.len(),
            plan.skipped,
            plan.dropped
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let worker = DispatchWorker {
            dispatcher: self.clone(),
            target,
            events: events_tx.clone(),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(supervise(worker, lease, events_tx, action, plan));

        Ok(DispatchHandle {
            events: events_rx,
            cancel,
            task,
        })
    }

    /// Calls the provider, retrying transient errors with backoff.
    ///
    /// Returns the outcome and the number of calls made.
    async fn analyze_with_retry(
        &self,
        provider: &dyn EnrichmentProvider,
        record: &Record,
        params: &EnrichParams,
        cancel: &CancellationToken,
    ) -> (Result<EnrichmentResult, ProviderError>, u32) {
        let mut attempt: u32 = 1;
        loop {
            match provider.analyze(record, params).await {
                Ok(result) => return (Ok(result), attempt),
                Err(ProviderError::Transient(message))
                    if attempt < self.settings.max_attempts && !cancel.is_cancelled() =>
                {
                    let delay = self
                        .settings
                        .backoff_base
                        .saturating_mul(2u32.saturating_pow(attempt - 1));
                    warn!(
                        "event=enrich_retry module=dispatch status=retry record_id={} attempt={} delay_ms={} reason={}",
                        record.id,
                        attempt,
                        delay.as_millis(),
                        message
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return (Err(err), attempt),
            }
        }
    }
}

/// Owns the lease and the terminal event; the worker runs as a child task so
/// a panic in it surfaces here as a `JoinError`.
async fn supervise<T: DispatchTarget>(
    worker: DispatchWorker<T>,
    lease: GroupLease,
    events: UnboundedSender<DispatchEvent>,
    action: BulkAction,
    plan: WorkPlan,
) -> Result<DispatchReport, String> {
    let group_id = worker.target.group_id();
    let kind = action.kind();

    let outcome = match tokio::spawn(worker.run(action, plan)).await {
        Ok(outcome) => outcome,
        Err(err) if err.is_panic() => Err(format!(
            "worker panicked: {}",
            panic_message(err.into_panic())
        )),
        Err(err) => Err(err.to_string()),
    };

    drop(lease);

    match outcome {
        Ok(report) => {
            info!(
                "event=dispatch_finish module=dispatch status=ok group_id={} action={} succeeded={} failed={} cancelled={} cost_micros={}",
                group_id,
                kind.as_str(),
                report.succeeded_count,
                report.failed_items.len(),
                report.cancelled,
                report.total_cost_micros
            );
            let _ = events.send(DispatchEvent::Complete {
                summary: report.clone(),
            });
            Ok(report)
        }
        Err(message) => {
            warn!(
                "event=dispatch_finish module=dispatch status=error group_id={} action={} reason={}",
                group_id,
                kind.as_str(),
                message
            );
            let _ = events.send(DispatchEvent::Error {
                message: message.clone(),
            });
            Err(message)
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    let text = if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    };
    one_line(&text, MAX_PANIC_MESSAGE_CHARS)
}

struct DispatchWorker<T: DispatchTarget> {
    dispatcher: BulkDispatcher,
    target: Arc<T>,
    events: UnboundedSender<DispatchEvent>,
    cancel: CancellationToken,
}

impl<T: DispatchTarget> DispatchWorker<T> {
    async fn run(self, action: BulkAction, plan: WorkPlan) -> Result<DispatchReport, String> {
        let mut report = DispatchReport {
            action: action.kind(),
            requested: plan.requested,
            dropped: plan.dropped,
            skipped: plan.skipped,
            succeeded_count: 0,
            failed_items: Vec::new(),
            cancelled: false,
            estimated_cost_micros: 0,
            total_cost_micros: 0,
        };

        match &action {
            BulkAction::Enrich(params) => {
                let provider = self
                    .dispatcher
                    .provider
                    .clone()
                    .ok_or_else(|| "no enrichment provider configured".to_string())?;
                self.enrich(provider.as_ref(), params, &plan.work, &mut report)
                    .await;
            }
            BulkAction::Delete | BulkAction::SetField { .. } | BulkAction::SetStatus { .. } => {
                report.succeeded_count = self
                    .target
                    .apply_bulk(&plan.work, &action)
                    .map_err(|err| err.to_string())?;
            }
        }
        Ok(report)
    }

    async fn enrich(
        &self,
        provider: &dyn EnrichmentProvider,
        params: &EnrichParams,
        work: &[RecordId],
        report: &mut DispatchReport,
    ) {
        let cost_model = self.dispatcher.settings.cost_model;
        let item_cost = cost_model.item_cost(params.depth);
        report.estimated_cost_micros = cost_model.estimate(work.len(), params.depth).total_micros;

        let total = work.len();
        for (index, id) in work.iter().enumerate() {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let label = match self.target.snapshot(*id) {
                None => {
                    report.failed_items.push(FailedItem {
                        id: *id,
                        reason: "record no longer exists".to_string(),
                    });
                    id.to_string()
                }
                Some((record, version)) => {
                    let (analyzed, attempts) = self
                        .dispatcher
                        .analyze_with_retry(provider, &record, params, &self.cancel)
                        .await;
                    let committed = analyzed.map_err(|err| err.to_string()).and_then(|result| {
                        self.target
                            .commit_enrichment(*id, version, &result)
                            .map(|()| result)
                            .map_err(|err| err.to_string())
                    });
                    let entry = match committed {
                        Ok(result) => {
                            let cost = result.cost_micros.unwrap_or(item_cost);
                            report.succeeded_count += 1;
                            report.total_cost_micros = report.total_cost_micros.saturating_add(cost);
                            SerpLogEntry::succeeded(&record, params, &result, cost, attempts)
                        }
                        Err(reason) => {
                            warn!(
                                "event=enrich_item module=dispatch status=error record_id={} attempts={} reason={}",
                                id, attempts, reason
                            );
                            let entry = SerpLogEntry::failed(&record, params, &reason, attempts);
                            report.failed_items.push(FailedItem { id: *id, reason });
                            entry
                        }
                    };
                    if let Err(err) = self.target.record_attempt(&entry) {
                        warn!(
                            "event=serp_log_append module=dispatch status=error record_id={} reason={}",
                            id, err
                        );
                    }
                    record.keyword
                }
            };

            let _ = self.events.send(DispatchEvent::Progress(ProgressEvent {
                processed: index + 1,
                total,
                current_label: label,
            }));
        }
    }
}
