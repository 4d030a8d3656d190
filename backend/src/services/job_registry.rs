use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{JobFailure, JobKey, JobKind, JobOutcome, JobPayload, JobState, JobStatus, Symbol};
use crate::services::process_invoker::Invoker;

type DoneSender = watch::Sender<Option<JobOutcome>>;
type DoneReceiver = watch::Receiver<Option<JobOutcome>>;

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("{key} is already running (run {run_id}); wait for it to finish")]
    Conflict { key: JobKey, run_id: Uuid },
}

/// Optional expiry for succeeded results, per job kind.
///
/// `None` keeps a result until it is explicitly invalidated. An expired
/// result is still served by [`JobRegistry::view`]; the next
/// [`JobRegistry::get_or_start`] treats it like an invalidation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpiryPolicy {
    pub train_ttl: Option<Duration>,
    pub sentiment_ttl: Option<Duration>,
}

impl ExpiryPolicy {
    pub fn never() -> Self {
        Self::default()
    }

    fn ttl(&self, kind: JobKind) -> Option<Duration> {
        match kind {
            JobKind::Train => self.train_ttl,
            JobKind::Sentiment => self.sentiment_ttl,
        }
    }

    pub fn is_expired(&self, kind: JobKind, finished_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.ttl(kind).and_then(|ttl| chrono::Duration::from_std(ttl).ok()) {
            Some(ttl) => now >= finished_at + ttl,
            None => false,
        }
    }
}

struct JobRecord {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    phase: Phase,
}

enum Phase {
    Running {
        done: DoneReceiver,
        // Result of the run being replaced, visible until the new one lands.
        previous: Option<Arc<JobPayload>>,
    },
    Succeeded {
        finished_at: DateTime<Utc>,
        result: Arc<JobPayload>,
    },
    Failed {
        finished_at: DateTime<Utc>,
        error: JobFailure,
        // Last good result of this key, kept across failed reruns.
        last_success: Option<Arc<JobPayload>>,
    },
}

/// Completion signal of one run. Any number of handles may wait on the same run.
#[derive(Clone)]
pub struct JobHandle {
    pub key: JobKey,
    pub run_id: Uuid,
    done: DoneReceiver,
}

impl JobHandle {
    /// Wait up to `timeout` for the run to finish. `None` means it is still
    /// running; dropping the handle or timing out never cancels the run.
    pub async fn wait(&mut self, timeout: Duration) -> Option<JobOutcome> {
        match tokio::time::timeout(timeout, self.done.wait_for(Option::is_some)).await {
            Ok(Ok(outcome)) => outcome.clone(),
            Ok(Err(_)) => Some(Err(JobFailure::ProcessFailure {
                exit_code: None,
                stderr: "job runner went away without reporting".to_string(),
            })),
            Err(_) => None,
        }
    }
}

/// What a caller got from [`JobRegistry::get_or_start`].
pub enum JobTicket {
    /// Cache hit, no new work.
    Ready(Arc<JobPayload>),
    /// This caller launched a new run.
    Started(JobHandle),
    /// This caller attached to a run already in flight.
    Joined(JobHandle),
}

impl JobTicket {
    pub fn run_id(&self) -> Option<Uuid> {
        match self {
            JobTicket::Ready(_) => None,
            JobTicket::Started(h) | JobTicket::Joined(h) => Some(h.run_id),
        }
    }

    /// Resolve to an outcome, waiting at most `timeout` for a pending run.
    pub async fn outcome(self, timeout: Duration) -> Option<JobOutcome> {
        match self {
            JobTicket::Ready(result) => Some(Ok(result)),
            JobTicket::Started(mut h) | JobTicket::Joined(mut h) => h.wait(timeout).await,
        }
    }
}

/// Non-blocking view of the result side of a record.
#[derive(Debug, Clone)]
pub enum JobView {
    Idle,
    Running { previous: Option<Arc<JobPayload>> },
    Succeeded(Arc<JobPayload>),
    Failed {
        error: JobFailure,
        last_success: Option<Arc<JobPayload>>,
    },
}

/// Owns every job record and is the only place job state changes.
///
/// Transitions for a key happen under that key's map entry lock, so of N
/// concurrent callers on an idle key exactly one starts the run and the rest
/// join it. Different keys never contend beyond the map's sharding.
pub struct JobRegistry {
    records: DashMap<JobKey, JobRecord>,
    invoker: Arc<dyn Invoker>,
    expiry: ExpiryPolicy,
}

impl JobRegistry {
    pub fn new(invoker: Arc<dyn Invoker>, expiry: ExpiryPolicy) -> Arc<Self> {
        Arc::new(Self {
            records: DashMap::new(),
            invoker,
            expiry,
        })
    }

    /// Return the cached result, join the running job, or start a new run.
    pub fn get_or_start(self: &Arc<Self>, key: JobKey) -> JobTicket {
        let now = Utc::now();
        let (handle, tx) = match self.records.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let previous = match &occupied.get().phase {
                    Phase::Running { done, .. } => {
                        let record = occupied.get();
                        return JobTicket::Joined(JobHandle {
                            key,
                            run_id: record.run_id,
                            done: done.clone(),
                        });
                    }
                    Phase::Succeeded { finished_at, result } => {
                        if !self.expiry.is_expired(key.kind, *finished_at, now) {
                            return JobTicket::Ready(result.clone());
                        }
                        info!("⌛ Result for {} expired, refreshing", key);
                        Some(result.clone())
                    }
                    Phase::Failed { last_success, .. } => last_success.clone(),
                };
                let (record, handle, tx) = Self::begin_run(&key, previous);
                occupied.insert(record);
                (handle, tx)
            }
            Entry::Vacant(vacant) => {
                let (record, handle, tx) = Self::begin_run(&key, None);
                vacant.insert(record);
                (handle, tx)
            }
        };

        self.start(handle, tx)
    }

    /// Discard a finished result and force a fresh run.
    ///
    /// Rejected with `Conflict` while a run is in flight. An idle key simply
    /// starts its first run.
    pub fn invalidate(self: &Arc<Self>, key: JobKey) -> Result<JobTicket, RegistryError> {
        let (handle, tx) = match self.records.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let previous = match &occupied.get().phase {
                    Phase::Running { .. } => {
                        return Err(RegistryError::Conflict {
                            run_id: occupied.get().run_id,
                            key,
                        });
                    }
                    Phase::Succeeded { result, .. } => Some(result.clone()),
                    Phase::Failed { last_success, .. } => last_success.clone(),
                };
                let (record, handle, tx) = Self::begin_run(&key, previous);
                occupied.insert(record);
                (handle, tx)
            }
            Entry::Vacant(vacant) => {
                let (record, handle, tx) = Self::begin_run(&key, None);
                vacant.insert(record);
                (handle, tx)
            }
        };

        info!("♻️ Invalidated {}", key);
        Ok(self.start(handle, tx))
    }

    pub fn peek(&self, key: &JobKey) -> JobStatus {
        match self.records.get(key) {
            Some(record) => status_of(key, &record),
            None => JobStatus {
                symbol: key.symbol.clone(),
                kind: key.kind,
                state: JobState::Idle,
                run_id: None,
                started_at: None,
                finished_at: None,
                error: None,
                has_result: false,
            },
        }
    }

    pub fn view(&self, key: &JobKey) -> JobView {
        let Some(record) = self.records.get(key) else {
            return JobView::Idle;
        };
        match &record.phase {
            Phase::Running { previous, .. } => JobView::Running {
                previous: previous.clone(),
            },
            Phase::Succeeded { result, .. } => JobView::Succeeded(result.clone()),
            Phase::Failed { error, last_success, .. } => JobView::Failed {
                error: error.clone(),
                last_success: last_success.clone(),
            },
        }
    }

    /// Status of every known record, ordered by key.
    pub fn snapshot(&self) -> Vec<JobStatus> {
        let mut statuses: Vec<JobStatus> = self
            .records
            .iter()
            .map(|entry| status_of(entry.key(), entry.value()))
            .collect();
        statuses.sort_by(|a, b| (&a.symbol, a.kind).cmp(&(&b.symbol, b.kind)));
        statuses
    }

    /// Symbols whose `kind` job is currently `Succeeded`, sorted.
    pub fn succeeded(&self, kind: JobKind) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self
            .records
            .iter()
            .filter(|entry| entry.key().kind == kind && matches!(entry.value().phase, Phase::Succeeded { .. }))
            .map(|entry| entry.key().symbol.clone())
            .collect();
        symbols.sort();
        symbols
    }

    fn begin_run(key: &JobKey, previous: Option<Arc<JobPayload>>) -> (JobRecord, JobHandle, DoneSender) {
        let run_id = Uuid::new_v4();
        let (tx, rx) = watch::channel(None);
        let record = JobRecord {
            run_id,
            started_at: Utc::now(),
            phase: Phase::Running {
                done: rx.clone(),
                previous,
            },
        };
        let handle = JobHandle {
            key: key.clone(),
            run_id,
            done: rx,
        };
        (record, handle, tx)
    }

    // Called with no map lock held.
    fn start(self: &Arc<Self>, handle: JobHandle, tx: DoneSender) -> JobTicket {
        self.spawn_run(handle.key.clone(), handle.run_id, tx);
        JobTicket::Started(handle)
    }

    fn spawn_run(self: &Arc<Self>, key: JobKey, run_id: Uuid, tx: DoneSender) {
        let registry = Arc::clone(self);
        info!("🏃 Starting {} (run {})", key, run_id);

        tokio::spawn(async move {
            let started = Instant::now();
            let invoker = registry.invoker.clone();
            let run_key = key.clone();

            // Inner task so a panicking invoker still yields an outcome.
            let outcome: JobOutcome = match tokio::spawn(async move { invoker.invoke(&run_key).await }).await {
                Ok(Ok(payload)) => Ok(Arc::new(payload)),
                Ok(Err(failure)) => Err(failure),
                Err(join_error) => {
                    error!("Job task for {} aborted: {}", key, join_error);
                    Err(JobFailure::ProcessFailure {
                        exit_code: None,
                        stderr: format!("job task aborted: {}", join_error),
                    })
                }
            };

            let elapsed_ms = started.elapsed().as_millis();
            match &outcome {
                Ok(_) => info!("✅ {} succeeded (run {}, {}ms)", key, run_id, elapsed_ms),
                Err(failure) => warn!("❌ {} failed (run {}, {}ms): {}", key, run_id, elapsed_ms, failure),
            }

            registry.finish(&key, run_id, &outcome);
            tx.send_replace(Some(outcome));
        });
    }

    fn finish(&self, key: &JobKey, run_id: Uuid, outcome: &JobOutcome) {
        let Some(mut record) = self.records.get_mut(key) else {
            error!("Record for {} vanished while run {} was in flight", key, run_id);
            return;
        };
        if record.run_id != run_id {
            error!("Run {} of {} finished but record belongs to run {}", run_id, key, record.run_id);
            return;
        }

        let finished_at = Utc::now();
        let previous = match &record.phase {
            Phase::Running { previous, .. } => previous.clone(),
            _ => None,
        };
        let phase = match outcome {
            Ok(result) => Phase::Succeeded {
                finished_at,
                result: result.clone(),
            },
            Err(failure) => Phase::Failed {
                finished_at,
                error: failure.clone(),
                last_success: previous,
            },
        };
        *record = JobRecord {
            run_id,
            started_at: record.started_at,
            phase,
        };
    }
}

fn status_of(key: &JobKey, record: &JobRecord) -> JobStatus {
    let (state, finished_at, error, has_result) = match &record.phase {
        Phase::Running { previous, .. } => (JobState::Running, None, None, previous.is_some()),
        Phase::Succeeded { finished_at, .. } => (JobState::Succeeded, Some(*finished_at), None, true),
        Phase::Failed {
            finished_at,
            error,
            last_success,
        } => (JobState::Failed, Some(*finished_at), Some(error.clone()), last_success.is_some()),
    };
    JobStatus {
        symbol: key.symbol.clone(),
        kind: key.kind,
        state,
        run_id: Some(record.run_id),
        started_at: Some(record.started_at),
        finished_at,
        error,
        has_result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SentimentResult;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const WAIT: Duration = Duration::from_secs(5);

    /// Counts invocations, sleeps `delay`, then pops a scripted outcome
    /// (defaulting to a sentiment result carrying the invocation number).
    struct FakeInvoker {
        calls: AtomicUsize,
        delay: Duration,
        script: Mutex<VecDeque<Result<JobPayload, JobFailure>>>,
    }

    impl FakeInvoker {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                script: Mutex::new(VecDeque::new()),
            })
        }

        fn then(self: &Arc<Self>, outcome: Result<JobPayload, JobFailure>) -> Arc<Self> {
            self.script.lock().push_back(outcome);
            self.clone()
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Invoker for FakeInvoker {
        async fn invoke(&self, _key: &JobKey) -> Result<JobPayload, JobFailure> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            self.script.lock().pop_front().unwrap_or_else(|| {
                Ok(JobPayload::Sentiment(SentimentResult {
                    score: 0.1,
                    headlines: vec![format!("run {}", n)],
                }))
            })
        }
    }

    struct PanickingInvoker;

    #[async_trait]
    impl Invoker for PanickingInvoker {
        async fn invoke(&self, _key: &JobKey) -> Result<JobPayload, JobFailure> {
            panic!("trainer blew up");
        }
    }

    fn key(symbol: &str) -> JobKey {
        JobKey::sentiment(Symbol::parse(symbol).unwrap())
    }

    fn headline(outcome: &JobOutcome) -> String {
        outcome.as_ref().unwrap().as_sentiment().unwrap().headlines[0].clone()
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_run() {
        let invoker = FakeInvoker::new(Duration::from_millis(100));
        let registry = JobRegistry::new(invoker.clone(), ExpiryPolicy::never());

        let mut started = 0;
        let mut waits = Vec::new();
        for _ in 0..3 {
            let ticket = registry.get_or_start(key("AAPL"));
            if matches!(ticket, JobTicket::Started(_)) {
                started += 1;
            }
            waits.push(tokio::spawn(ticket.outcome(WAIT)));
        }

        let mut outcomes = Vec::new();
        for wait in waits {
            outcomes.push(wait.await.unwrap().unwrap());
        }

        assert_eq!(started, 1);
        assert_eq!(invoker.calls(), 1);
        assert!(outcomes.iter().all(|o| o == &outcomes[0]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_tasks_launch_exactly_one_run() {
        let invoker = FakeInvoker::new(Duration::from_millis(50));
        let registry = JobRegistry::new(invoker.clone(), ExpiryPolicy::never());
        let barrier = Arc::new(tokio::sync::Barrier::new(16));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    registry.get_or_start(key("MSFT")).outcome(WAIT).await
                })
            })
            .collect();

        let mut outcomes = Vec::new();
        for task in tasks {
            outcomes.push(task.await.unwrap().unwrap());
        }

        assert_eq!(invoker.calls(), 1);
        assert!(outcomes.iter().all(|o| headline(o) == "run 1"));
    }

    #[tokio::test]
    async fn test_succeeded_result_is_served_from_cache() {
        let invoker = FakeInvoker::new(Duration::ZERO);
        let registry = JobRegistry::new(invoker.clone(), ExpiryPolicy::never());

        registry.get_or_start(key("AAPL")).outcome(WAIT).await.unwrap().unwrap();

        for _ in 0..5 {
            let ticket = registry.get_or_start(key("AAPL"));
            assert!(matches!(ticket, JobTicket::Ready(_)));
        }
        assert_eq!(invoker.calls(), 1);
        assert_eq!(registry.peek(&key("AAPL")).state, JobState::Succeeded);
    }

    #[tokio::test]
    async fn test_invalidate_while_running_is_a_conflict() {
        let invoker = FakeInvoker::new(Duration::from_millis(200));
        let registry = JobRegistry::new(invoker.clone(), ExpiryPolicy::never());

        let ticket = registry.get_or_start(key("AAPL"));
        let run_id = ticket.run_id().unwrap();

        let err = registry.invalidate(key("AAPL")).err().unwrap();
        assert_eq!(err, RegistryError::Conflict { key: key("AAPL"), run_id });

        ticket.outcome(WAIT).await.unwrap().unwrap();
        assert_eq!(invoker.calls(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_reruns_and_keeps_old_result_visible() {
        let invoker = FakeInvoker::new(Duration::from_millis(100));
        let registry = JobRegistry::new(invoker.clone(), ExpiryPolicy::never());

        let first = registry.get_or_start(key("AAPL")).outcome(WAIT).await.unwrap();
        assert_eq!(headline(&first), "run 1");

        let ticket = registry.invalidate(key("AAPL")).unwrap();
        assert!(matches!(ticket, JobTicket::Started(_)));

        match registry.view(&key("AAPL")) {
            JobView::Running { previous: Some(old) } => {
                assert_eq!(old.as_sentiment().unwrap().headlines[0], "run 1");
            }
            other => panic!("expected running with previous result, got {:?}", other),
        }

        let second = ticket.outcome(WAIT).await.unwrap();
        assert_eq!(headline(&second), "run 2");
        assert_eq!(invoker.calls(), 2);
    }

    #[tokio::test]
    async fn test_back_to_back_invalidations_launch_one_run() {
        let invoker = FakeInvoker::new(Duration::from_millis(100));
        let registry = JobRegistry::new(invoker.clone(), ExpiryPolicy::never());
        registry.get_or_start(key("AAPL")).outcome(WAIT).await.unwrap().unwrap();

        let first = registry.invalidate(key("AAPL"));
        let second = registry.invalidate(key("AAPL"));

        assert!(first.is_ok());
        assert!(matches!(second, Err(RegistryError::Conflict { .. })));
        first.unwrap().outcome(WAIT).await.unwrap().unwrap();
        assert_eq!(invoker.calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_broadcast_then_retried_on_next_request() {
        let failure = JobFailure::ProcessFailure {
            exit_code: Some(1),
            stderr: "no data".to_string(),
        };
        let invoker = FakeInvoker::new(Duration::from_millis(50)).then(Err(failure.clone()));
        let registry = JobRegistry::new(invoker.clone(), ExpiryPolicy::never());

        let a = registry.get_or_start(key("ZZZZ"));
        let b = registry.get_or_start(key("ZZZZ"));
        assert!(matches!(b, JobTicket::Joined(_)));

        assert_eq!(a.outcome(WAIT).await.unwrap().unwrap_err(), failure);
        assert_eq!(b.outcome(WAIT).await.unwrap().unwrap_err(), failure);

        let status = registry.peek(&key("ZZZZ"));
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.error, Some(failure));

        // failures are not cached as permanent
        let retry = registry.get_or_start(key("ZZZZ"));
        assert!(matches!(retry, JobTicket::Started(_)));
        assert!(retry.outcome(WAIT).await.unwrap().is_ok());
        assert_eq!(invoker.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_rerun_keeps_last_good_result() {
        let failure = JobFailure::Timeout { after_ms: 900_000 };
        let invoker = FakeInvoker::new(Duration::ZERO)
            .then(Ok(JobPayload::Sentiment(SentimentResult {
                score: 0.3,
                headlines: vec!["good run".to_string()],
            })))
            .then(Err(failure.clone()));
        let registry = JobRegistry::new(invoker.clone(), ExpiryPolicy::never());

        registry.get_or_start(key("AAPL")).outcome(WAIT).await.unwrap().unwrap();
        let rerun = registry.invalidate(key("AAPL")).unwrap();
        assert_eq!(rerun.outcome(WAIT).await.unwrap().unwrap_err(), failure);

        match registry.view(&key("AAPL")) {
            JobView::Failed {
                error,
                last_success: Some(kept),
            } => {
                assert_eq!(error, failure);
                assert_eq!(kept.as_sentiment().unwrap().headlines[0], "good run");
            }
            other => panic!("expected failed with last good result, got {:?}", other),
        }
        let status = registry.peek(&key("AAPL"));
        assert_eq!(status.state, JobState::Failed);
        assert!(status.has_result);
        assert!(registry.succeeded(JobKind::Sentiment).is_empty());

        // the next run still sees the kept result as its predecessor
        let retry = registry.get_or_start(key("AAPL"));
        assert!(matches!(registry.view(&key("AAPL")), JobView::Running { previous: Some(_) }));
        retry.outcome(WAIT).await.unwrap().unwrap();
        assert_eq!(invoker.calls(), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_process_leaves_key_failed_with_timeout() {
        use crate::services::process_invoker::{CommandSpec, ProcessInvoker};

        let spec = CommandSpec::new(
            "sh",
            vec!["-c".to_string(), "sleep 30".to_string()],
            Duration::from_millis(200),
        );
        let registry = JobRegistry::new(
            Arc::new(ProcessInvoker::new(spec.clone(), spec, None)),
            ExpiryPolicy::never(),
        );

        let started = Instant::now();
        let outcome = registry.get_or_start(key("AAPL")).outcome(WAIT).await.unwrap();

        assert_eq!(outcome.unwrap_err(), JobFailure::Timeout { after_ms: 200 });
        assert!(started.elapsed() < WAIT);
        let status = registry.peek(&key("AAPL"));
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.error, Some(JobFailure::Timeout { after_ms: 200 }));
    }

    #[tokio::test]
    async fn test_abandoned_wait_does_not_cancel_the_run() {
        let invoker = FakeInvoker::new(Duration::from_millis(150));
        let registry = JobRegistry::new(invoker.clone(), ExpiryPolicy::never());

        let ticket = registry.get_or_start(key("AAPL"));
        assert!(ticket.outcome(Duration::from_millis(10)).await.is_none());

        let mut late = match registry.get_or_start(key("AAPL")) {
            JobTicket::Joined(handle) => handle,
            _ => panic!("run should still be in flight"),
        };
        assert!(late.wait(WAIT).await.unwrap().is_ok());
        assert_eq!(registry.peek(&key("AAPL")).state, JobState::Succeeded);
        assert_eq!(invoker.calls(), 1);
    }

    #[tokio::test]
    async fn test_panicking_invoker_does_not_leave_key_running() {
        let registry = JobRegistry::new(Arc::new(PanickingInvoker), ExpiryPolicy::never());

        let outcome = registry.get_or_start(key("AAPL")).outcome(WAIT).await.unwrap();

        assert!(matches!(outcome, Err(JobFailure::ProcessFailure { exit_code: None, .. })));
        assert_eq!(registry.peek(&key("AAPL")).state, JobState::Failed);
    }

    #[tokio::test]
    async fn test_expired_result_triggers_refresh() {
        let invoker = FakeInvoker::new(Duration::ZERO);
        let expiry = ExpiryPolicy {
            train_ttl: None,
            sentiment_ttl: Some(Duration::ZERO),
        };
        let registry = JobRegistry::new(invoker.clone(), expiry);

        registry.get_or_start(key("AAPL")).outcome(WAIT).await.unwrap().unwrap();
        let ticket = registry.get_or_start(key("AAPL"));

        assert!(matches!(ticket, JobTicket::Started(_)));
        assert!(matches!(registry.view(&key("AAPL")), JobView::Running { previous: Some(_) }));
        ticket.outcome(WAIT).await.unwrap().unwrap();
        assert_eq!(invoker.calls(), 2);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let invoker = FakeInvoker::new(Duration::from_millis(50));
        let registry = JobRegistry::new(invoker.clone(), ExpiryPolicy::never());

        let a = registry.get_or_start(key("AAPL"));
        let b = registry.get_or_start(key("MSFT"));
        let c = registry.get_or_start(JobKey::train(Symbol::parse("AAPL").unwrap()));

        assert!(matches!(a, JobTicket::Started(_)));
        assert!(matches!(b, JobTicket::Started(_)));
        assert!(matches!(c, JobTicket::Started(_)));
        for ticket in [a, b, c] {
            ticket.outcome(WAIT).await.unwrap().unwrap();
        }

        assert_eq!(invoker.calls(), 3);
        assert_eq!(registry.succeeded(JobKind::Sentiment).len(), 2);
        assert_eq!(registry.succeeded(JobKind::Train), vec![Symbol::parse("AAPL").unwrap()]);
        assert_eq!(registry.snapshot().len(), 3);
    }

    #[test]
    fn test_expiry_policy_never_expires_by_default() {
        let policy = ExpiryPolicy::never();
        let long_ago = Utc::now() - chrono::Duration::days(365);
        assert!(!policy.is_expired(JobKind::Train, long_ago, Utc::now()));
    }
}
