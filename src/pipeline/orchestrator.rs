//! Checkpointed embed → upsert → commit driver.
//!
//! Two stages run concurrently. The embed stage is a spawned task that reads
//! batches from the [`Batcher`] and embeds them; it hands each result over a
//! channel of capacity 1, reserving the slot before it reads the next batch.
//! The control path receives batch `i`, upserts it, commits the checkpoint and
//! only then takes batch `i + 1`. While `i` is upserted, only `i + 1` is being
//! embedded, and the checkpoint is only ever written from here.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use super::batcher::Batcher;
use super::state::PipelineState;
use crate::checkpoint::CheckpointStore;
use crate::dataset::RecordSource;
use crate::error::{ConfigError, PipelineError, PipelineFailure};
use crate::models::{Batch, PipelineConfig, ProductPoint};
use crate::services::{Embedder, VectorStore};
use crate::utils::retry::{RetryPolicy, with_retry};

/// Knobs for one ingestion run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub batch_size: NonZeroUsize,
    /// Expected vector length; also used to create the collection.
    pub dimension: usize,
    pub retry: RetryPolicy,
    pub job_timeout: Option<Duration>,
}

impl PipelineOptions {
    pub fn from_config(config: &PipelineConfig, dimension: usize) -> Result<Self, ConfigError> {
        let batch_size = NonZeroUsize::new(config.batch_size).ok_or_else(|| {
            ConfigError::Validation("pipeline.batch_size must be greater than 0".to_string())
        })?;
        Ok(Self {
            batch_size,
            dimension,
            retry: config.retry_policy(),
            job_timeout: config.job_timeout(),
        })
    }
}

/// Outcome of a run that reached `DONE`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// First batch this run processed.
    pub start_index: u64,
    pub batches_committed: u64,
    pub records_upserted: u64,
    /// Records dropped because they could not be embedded.
    pub records_skipped: u64,
    pub last_committed: Option<u64>,
    pub elapsed: Duration,
}

/// What happened to one committed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub index: u64,
    pub upserted: usize,
    pub skipped: usize,
}

type CommitHook = Box<dyn FnMut(&BatchReport) + Send>;

/// A batch after the embed stage.
#[derive(Debug)]
struct EmbeddedBatch {
    index: u64,
    points: Vec<ProductPoint>,
    skipped: usize,
}

/// Failure raised inside the embed stage, tagged with the batch it concerns.
#[derive(Debug)]
struct StageFailure {
    index: u64,
    error: PipelineError,
}

type StageMessage = Result<EmbeddedBatch, StageFailure>;

#[derive(Debug, Default)]
struct Progress {
    start_index: u64,
    last_committed: Option<u64>,
    in_flight: Option<u64>,
    batches_committed: u64,
    records_upserted: u64,
    records_skipped: u64,
}

/// Aborts the embed stage if the control path goes away first.
struct StageHandle(Option<JoinHandle<()>>);

impl StageHandle {
    async fn finish(mut self) -> Result<(), JoinError> {
        match self.0.take() {
            Some(handle) => handle.await,
            None => Ok(()),
        }
    }
}

impl Drop for StageHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

pub struct Orchestrator<C> {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    checkpoint: C,
    options: PipelineOptions,
    state: PipelineState,
    on_commit: Option<CommitHook>,
}

impl<C: CheckpointStore> Orchestrator<C> {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        checkpoint: C,
        options: PipelineOptions,
    ) -> Self {
        Self {
            embedder,
            store,
            checkpoint,
            options,
            state: PipelineState::Init,
            on_commit: None,
        }
    }

    /// Called after every durable commit.
    pub fn on_commit(mut self, hook: impl FnMut(&BatchReport) + Send + 'static) -> Self {
        self.on_commit = Some(Box::new(hook));
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn checkpoint(&self) -> &C {
        &self.checkpoint
    }

    /// Run until the dataset is exhausted or the run fails.
    pub async fn run<S>(&mut self, source: S) -> Result<RunSummary, PipelineFailure>
    where
        S: RecordSource + Send + 'static,
    {
        self.run_until(source, std::future::pending()).await
    }

    /// Like [`run`](Self::run), but gives up as `Cancelled` once `shutdown` resolves.
    ///
    /// `source` must be positioned at the start of the dataset.
    pub async fn run_until<S, F>(
        &mut self,
        source: S,
        shutdown: F,
    ) -> Result<RunSummary, PipelineFailure>
    where
        S: RecordSource + Send + 'static,
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        let job_timeout = self.options.job_timeout;
        self.state = PipelineState::Init;
        let mut progress = Progress::default();

        let outcome = {
            let drive = self.drive(source, &mut progress);
            tokio::select! {
                result = drive => result,
                limit = expire(job_timeout) => Err(PipelineError::Timeout(limit)),
                _ = shutdown => Err(PipelineError::Cancelled),
            }
        };

        match outcome {
            Ok(()) => {
                self.transition(PipelineState::Done);
                let summary = RunSummary {
                    start_index: progress.start_index,
                    batches_committed: progress.batches_committed,
                    records_upserted: progress.records_upserted,
                    records_skipped: progress.records_skipped,
                    last_committed: progress.last_committed,
                    elapsed: started.elapsed(),
                };
                info!(
                    batches = summary.batches_committed,
                    upserted = summary.records_upserted,
                    skipped = summary.records_skipped,
                    elapsed_ms = summary.elapsed.as_millis() as u64,
                    "ingestion finished"
                );
                Ok(summary)
            }
            Err(error) => {
                self.transition(PipelineState::Failed);
                error!(
                    failing_batch = ?progress.in_flight,
                    last_committed = ?progress.last_committed,
                    error = %error,
                    "ingestion failed"
                );
                Err(PipelineFailure {
                    error,
                    failing_batch: progress.in_flight,
                    last_committed: progress.last_committed,
                })
            }
        }
    }

    async fn drive<S>(&mut self, source: S, progress: &mut Progress) -> Result<(), PipelineError>
    where
        S: RecordSource + Send + 'static,
    {
        let last_committed = self.checkpoint.load()?;
        let start_index = last_committed.map_or(0, |i| i + 1);
        progress.last_committed = last_committed;
        progress.start_index = start_index;

        let dimension = self.options.dimension as u64;
        let store = Arc::clone(&self.store);
        with_retry(&self.options.retry, "create collection", || {
            store.create_collection(dimension)
        })
        .await
        .into_result()?;

        self.transition(PipelineState::Resuming);
        progress.in_flight = Some(start_index);
        let batcher = Batcher::resume(source, self.options.batch_size, start_index)?;
        info!(
            start_index,
            batch_size = self.options.batch_size.get(),
            "resuming ingestion"
        );

        let (tx, mut rx) = mpsc::channel::<StageMessage>(1);
        let stage = StageHandle(Some(tokio::spawn(embed_stage(
            batcher,
            Arc::clone(&self.embedder),
            self.options.retry.clone(),
            self.options.dimension,
            tx,
        ))));

        let mut next = start_index;
        loop {
            self.transition(PipelineState::Processing(next));
            progress.in_flight = Some(next);

            let embedded = match rx.recv().await {
                None => break,
                Some(Ok(embedded)) => embedded,
                Some(Err(failure)) => {
                    progress.in_flight = Some(failure.index);
                    return Err(failure.error);
                }
            };
            debug_assert_eq!(embedded.index, next);

            if embedded.points.is_empty() {
                warn!(batch = next, "no embeddable records in batch, committing without upsert");
            } else {
                with_retry(&self.options.retry, "upsert", || {
                    store.upsert(&embedded.points)
                })
                .await
                .into_result()?;
            }

            self.transition(PipelineState::Committing(next));
            self.checkpoint.commit(next)?;

            let report = BatchReport {
                index: next,
                upserted: embedded.points.len(),
                skipped: embedded.skipped,
            };
            progress.last_committed = Some(next);
            progress.batches_committed += 1;
            progress.records_upserted += report.upserted as u64;
            progress.records_skipped += report.skipped as u64;
            debug!(
                batch = next,
                upserted = report.upserted,
                skipped = report.skipped,
                "batch committed"
            );
            if let Some(hook) = self.on_commit.as_mut() {
                hook(&report);
            }
            next += 1;
        }

        progress.in_flight = None;
        stage
            .finish()
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))
    }

    fn transition(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "pipeline state");
        self.state = next;
    }
}

async fn expire(limit: Option<Duration>) -> Duration {
    match limit {
        Some(limit) => {
            tokio::time::sleep(limit).await;
            limit
        }
        None => std::future::pending().await,
    }
}

async fn embed_stage<S: RecordSource>(
    mut batcher: Batcher<S>,
    embedder: Arc<dyn Embedder>,
    retry: RetryPolicy,
    dimension: usize,
    tx: mpsc::Sender<StageMessage>,
) {
    loop {
        // Holding a free slot before reading means batch `i + 2` is not read or
        // embedded until the control path has taken `i + 1`, which it only
        // does after committing `i`.
        let Ok(permit) = tx.reserve().await else {
            return;
        };
        let index = batcher.next_index();
        let message = match batcher.next_batch() {
            Ok(None) => return,
            Ok(Some(batch)) => embed_batch(embedder.as_ref(), &retry, dimension, batch)
                .await
                .map_err(|error| StageFailure { index, error }),
            Err(e) => Err(StageFailure {
                index,
                error: e.into(),
            }),
        };

        let failed = message.is_err();
        permit.send(message);
        if failed {
            return;
        }
    }
}

async fn embed_batch(
    embedder: &dyn Embedder,
    retry: &RetryPolicy,
    dimension: usize,
    batch: Batch,
) -> Result<EmbeddedBatch, PipelineError> {
    let outcomes = with_retry(retry, "embed", || embedder.embed(&batch.records))
        .await
        .into_result()?;

    if outcomes.len() != batch.len() {
        return Err(PipelineError::ResultCount {
            expected: batch.len(),
            actual: outcomes.len(),
        });
    }

    let mut points = Vec::with_capacity(batch.len());
    let mut skipped = 0;
    for (record, outcome) in batch.records.iter().zip(outcomes) {
        match outcome {
            Ok(vector) if vector.len() == dimension => {
                points.push(ProductPoint::new(record, vector));
            }
            Ok(vector) => {
                skipped += 1;
                warn!(
                    batch = batch.index,
                    record_id = %record.id,
                    expected = dimension,
                    actual = vector.len(),
                    "skipping record with wrong embedding dimension"
                );
            }
            Err(e) => {
                skipped += 1;
                warn!(
                    batch = batch.index,
                    record_id = %record.id,
                    error = %e,
                    "skipping record that failed embedding"
                );
            }
        }
    }

    Ok(EmbeddedBatch {
        index: batch.index,
        points,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{FileCheckpoint, MemoryCheckpoint};
    use crate::dataset::DatasetCursor;
    use crate::error::{EmbeddingError, StoreError};
    use crate::models::{DatasetFormat, Record, RecordId, SearchHit, SearchQuery};
    use crate::services::{CollectionInfo, EmbedOutcome, HealthResponse};
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashSet, VecDeque};
    use std::io::Cursor;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    const DIM: usize = 4;

    fn dataset(n: u64) -> DatasetCursor<Cursor<Vec<u8>>> {
        let lines: Vec<String> = (0..n)
            .map(|i| format!("{{\"id\": {i}, \"name\": \"product {i}\"}}"))
            .collect();
        DatasetCursor::from_reader(
            Cursor::new(lines.join("\n").into_bytes()),
            DatasetFormat::Auto,
        )
        .unwrap()
    }

    fn options(batch_size: usize) -> PipelineOptions {
        PipelineOptions {
            batch_size: NonZeroUsize::new(batch_size).unwrap(),
            dimension: DIM,
            retry: RetryPolicy::new(3)
                .with_base_delay(Duration::from_millis(1))
                .without_jitter(),
            job_timeout: None,
        }
    }

    fn num(record: &Record) -> u64 {
        match record.id {
            RecordId::Num(n) => n,
            RecordId::Str(_) => unreachable!(),
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        Embed(u64),
        UpsertStart(u64),
        UpsertEnd(u64),
        Commit(u64),
    }

    type EventLog = Arc<Mutex<Vec<Event>>>;

    #[derive(Default)]
    struct FakeEmbedder {
        log: EventLog,
        failing_ids: HashSet<u64>,
        transient_failures: AtomicU32,
        permanent_failure: bool,
        short_by_one: bool,
        delay: Option<Duration>,
        calls: AtomicUsize,
        embedded_ids: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, records: &[Record]) -> Result<Vec<EmbedOutcome>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(first) = records.first() {
                self.log.lock().unwrap().push(Event::Embed(num(first)));
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.permanent_failure {
                return Err(EmbeddingError::Server {
                    status: 400,
                    body: "bad request".to_string(),
                });
            }
            if self
                .transient_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(EmbeddingError::Timeout);
            }

            let mut out: Vec<EmbedOutcome> = records
                .iter()
                .map(|r| {
                    let id = num(r);
                    self.embedded_ids.lock().unwrap().push(id);
                    if self.failing_ids.contains(&id) {
                        Err(EmbeddingError::Rejected("image unreachable".to_string()))
                    } else {
                        Ok(vec![id as f32, 1.0, 0.0, 0.0])
                    }
                })
                .collect();
            if self.short_by_one {
                out.pop();
            }
            Ok(out)
        }

        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![0.0; DIM])
        }

        async fn health_check(&self) -> Result<HealthResponse, EmbeddingError> {
            Ok(HealthResponse::default())
        }

        fn dimension(&self) -> usize {
            DIM
        }
    }

    enum Scripted {
        Fail(StoreError),
        ApplyThenFail(StoreError),
    }

    #[derive(Default)]
    struct FakeStore {
        log: EventLog,
        upsert_delay: Option<Duration>,
        points: Mutex<BTreeMap<String, ProductPoint>>,
        script: Mutex<VecDeque<Option<Scripted>>>,
        always_fail: Option<fn() -> StoreError>,
        create_fails: bool,
        upsert_calls: AtomicUsize,
    }

    impl FakeStore {
        fn scripted(steps: Vec<Option<Scripted>>) -> Self {
            Self {
                script: Mutex::new(steps.into()),
                ..Default::default()
            }
        }

        fn snapshot(&self) -> BTreeMap<String, ProductPoint> {
            self.points.lock().unwrap().clone()
        }

        fn apply(&self, points: &[ProductPoint]) {
            let mut stored = self.points.lock().unwrap();
            for p in points {
                stored.insert(p.id.to_string(), p.clone());
            }
        }
    }

    #[async_trait]
    impl VectorStore for FakeStore {
        async fn health_check(&self) -> Result<bool, StoreError> {
            Ok(true)
        }

        async fn collection_info(&self) -> Result<Option<CollectionInfo>, StoreError> {
            Ok(Some(CollectionInfo {
                points_count: self.points.lock().unwrap().len() as u64,
            }))
        }

        async fn create_collection(&self, dimension: u64) -> Result<(), StoreError> {
            assert_eq!(dimension, DIM as u64);
            if self.create_fails {
                return Err(StoreError::Rejected("bad vector params".to_string()));
            }
            Ok(())
        }

        async fn upsert(&self, points: &[ProductPoint]) -> Result<(), StoreError> {
            self.upsert_calls.fetch_add(1, Ordering::SeqCst);
            let first = points.first().map(|p| match p.id {
                RecordId::Num(n) => n,
                RecordId::Str(_) => unreachable!(),
            });
            if let Some(first) = first {
                self.log.lock().unwrap().push(Event::UpsertStart(first));
            }
            if let Some(delay) = self.upsert_delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(first) = first {
                self.log.lock().unwrap().push(Event::UpsertEnd(first));
            }
            if let Some(make) = self.always_fail {
                return Err(make());
            }
            let step = self.script.lock().unwrap().pop_front().flatten();
            match step {
                None => {
                    self.apply(points);
                    Ok(())
                }
                Some(Scripted::Fail(e)) => Err(e),
                Some(Scripted::ApplyThenFail(e)) => {
                    self.apply(points);
                    Err(e)
                }
            }
        }

        async fn search(
            &self,
            _vector: Vec<f32>,
            _query: &SearchQuery,
        ) -> Result<Vec<SearchHit>, StoreError> {
            Ok(Vec::new())
        }

        fn collection(&self) -> &str {
            "products"
        }
    }

    fn orchestrator<C: CheckpointStore>(
        embedder: &Arc<FakeEmbedder>,
        store: &Arc<FakeStore>,
        checkpoint: C,
        options: PipelineOptions,
    ) -> Orchestrator<C> {
        Orchestrator::new(
            Arc::clone(embedder) as Arc<dyn Embedder>,
            Arc::clone(store) as Arc<dyn VectorStore>,
            checkpoint,
            options,
        )
    }

    #[tokio::test]
    async fn test_ten_records_in_batches_of_four() {
        let embedder = Arc::new(FakeEmbedder::default());
        let store = Arc::new(FakeStore::default());
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);

        let mut orch = orchestrator(&embedder, &store, MemoryCheckpoint::new(), options(4))
            .on_commit(move |r| sink.lock().unwrap().push(r.clone()));
        let summary = orch.run(dataset(10)).await.unwrap();

        assert_eq!(orch.state(), PipelineState::Done);
        assert_eq!(orch.checkpoint().commits(), &[0, 1, 2]);
        assert_eq!(summary.start_index, 0);
        assert_eq!(summary.batches_committed, 3);
        assert_eq!(summary.records_upserted, 10);
        assert_eq!(summary.last_committed, Some(2));
        assert_eq!(store.snapshot().len(), 10);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);

        let sizes: Vec<usize> = reports.lock().unwrap().iter().map(|r| r.upserted).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[tokio::test]
    async fn test_embedding_runs_at_most_one_batch_ahead() {
        let log = EventLog::default();
        let embedder = Arc::new(FakeEmbedder {
            log: Arc::clone(&log),
            ..Default::default()
        });
        let store = Arc::new(FakeStore {
            log: Arc::clone(&log),
            upsert_delay: Some(Duration::from_millis(20)),
            ..Default::default()
        });
        let sink = Arc::clone(&log);

        let mut orch = orchestrator(&embedder, &store, MemoryCheckpoint::new(), options(1))
            .on_commit(move |r| sink.lock().unwrap().push(Event::Commit(r.index)));
        orch.run(dataset(6)).await.unwrap();
        assert_eq!(orch.checkpoint().commits(), &[0, 1, 2, 3, 4, 5]);

        let events = log.lock().unwrap().clone();
        let position = |event: Event| events.iter().position(|e| *e == event).unwrap();

        for i in 0..6u64 {
            let upsert_end = position(Event::UpsertEnd(i));
            let embedded_so_far = events[..upsert_end]
                .iter()
                .filter(|e| matches!(e, Event::Embed(_)))
                .count() as u64;
            assert!(
                embedded_so_far <= i + 2,
                "{embedded_so_far} batches embedded before upsert {i} finished"
            );
            if i > 0 {
                assert!(position(Event::Commit(i - 1)) < position(Event::UpsertStart(i)));
            }
        }

        // The next batch is embedded while the current one is being upserted.
        assert!(position(Event::Embed(1)) < position(Event::UpsertEnd(0)));
    }

    #[tokio::test]
    async fn test_empty_dataset_is_done_without_commits() {
        let embedder = Arc::new(FakeEmbedder::default());
        let store = Arc::new(FakeStore::default());
        let mut orch = orchestrator(&embedder, &store, MemoryCheckpoint::new(), options(4));

        let summary = orch.run(dataset(0)).await.unwrap();
        assert_eq!(summary.batches_committed, 0);
        assert_eq!(summary.last_committed, None);
        assert!(orch.checkpoint().commits().is_empty());
    }

    #[tokio::test]
    async fn test_rerun_after_done_does_no_work() {
        let embedder = Arc::new(FakeEmbedder::default());
        let store = Arc::new(FakeStore::default());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.txt");

        orchestrator(&embedder, &store, FileCheckpoint::new(&path), options(4))
            .run(dataset(10))
            .await
            .unwrap();
        let before = store.snapshot();
        let embed_calls = embedder.calls.load(Ordering::SeqCst);
        let upsert_calls = store.upsert_calls.load(Ordering::SeqCst);

        let summary = orchestrator(&embedder, &store, FileCheckpoint::new(&path), options(4))
            .run(dataset(10))
            .await
            .unwrap();

        assert_eq!(summary.start_index, 3);
        assert_eq!(summary.batches_committed, 0);
        assert_eq!(summary.last_committed, Some(2));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), embed_calls);
        assert_eq!(store.upsert_calls.load(Ordering::SeqCst), upsert_calls);
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn test_resume_starts_after_last_commit() {
        let embedder = Arc::new(FakeEmbedder::default());
        let store = Arc::new(FakeStore::default());
        let mut orch = orchestrator(&embedder, &store, MemoryCheckpoint::starting_at(0), options(4));

        let summary = orch.run(dataset(10)).await.unwrap();

        assert_eq!(summary.start_index, 1);
        assert_eq!(orch.checkpoint().commits(), &[1, 2]);
        assert_eq!(
            *embedder.embedded_ids.lock().unwrap(),
            (4..10).collect::<Vec<u64>>()
        );
        let keys: Vec<String> = store.snapshot().into_keys().collect();
        assert_eq!(keys, vec!["4", "5", "6", "7", "8", "9"]);
    }

    #[tokio::test]
    async fn test_crash_between_upsert_and_commit_is_safe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.txt");
        let embedder = Arc::new(FakeEmbedder::default());

        // Batch 2 reaches the store but the run dies before committing it.
        let store = Arc::new(FakeStore::scripted(vec![
            None,
            None,
            Some(Scripted::ApplyThenFail(StoreError::Rejected(
                "connection lost".to_string(),
            ))),
        ]));
        let failure = orchestrator(&embedder, &store, FileCheckpoint::new(&path), options(2))
            .run(dataset(9))
            .await
            .unwrap_err();
        assert_eq!(failure.failing_batch, Some(2));
        assert_eq!(failure.last_committed, Some(1));
        assert_eq!(FileCheckpoint::new(&path).load().unwrap(), Some(1));

        let summary = orchestrator(&embedder, &store, FileCheckpoint::new(&path), options(2))
            .run(dataset(9))
            .await
            .unwrap();
        assert_eq!(summary.start_index, 2);
        assert_eq!(summary.last_committed, Some(4));

        let clean = Arc::new(FakeStore::default());
        orchestrator(
            &Arc::new(FakeEmbedder::default()),
            &clean,
            MemoryCheckpoint::new(),
            options(2),
        )
        .run(dataset(9))
        .await
        .unwrap();
        assert_eq!(store.snapshot(), clean.snapshot());
    }

    #[tokio::test]
    async fn test_record_failure_is_skipped_and_batch_commits() {
        let embedder = Arc::new(FakeEmbedder {
            failing_ids: HashSet::from([2]),
            ..Default::default()
        });
        let store = Arc::new(FakeStore::default());
        let mut orch = orchestrator(&embedder, &store, MemoryCheckpoint::new(), options(4));

        let summary = orch.run(dataset(4)).await.unwrap();

        assert_eq!(summary.records_upserted, 3);
        assert_eq!(summary.records_skipped, 1);
        assert_eq!(orch.checkpoint().commits(), &[0]);
        let keys: Vec<String> = store.snapshot().into_keys().collect();
        assert_eq!(keys, vec!["0", "1", "3"]);
    }

    #[tokio::test]
    async fn test_batch_without_embeddable_records_commits_without_upsert() {
        let embedder = Arc::new(FakeEmbedder {
            failing_ids: HashSet::from([0, 1]),
            ..Default::default()
        });
        let store = Arc::new(FakeStore::default());
        let mut orch = orchestrator(&embedder, &store, MemoryCheckpoint::new(), options(2));

        let summary = orch.run(dataset(3)).await.unwrap();

        assert_eq!(orch.checkpoint().commits(), &[0, 1]);
        assert_eq!(summary.records_skipped, 2);
        assert_eq!(store.upsert_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_store_errors_are_retried() {
        let embedder = Arc::new(FakeEmbedder::default());
        let store = Arc::new(FakeStore::scripted(vec![
            Some(Scripted::Fail(StoreError::Connection("refused".to_string()))),
            Some(Scripted::Fail(StoreError::Upsert("status: Unavailable".to_string()))),
        ]));
        let mut orch = orchestrator(&embedder, &store, MemoryCheckpoint::new(), options(4));

        orch.run(dataset(4)).await.unwrap();
        assert_eq!(store.upsert_calls.load(Ordering::SeqCst), 3);
        assert_eq!(orch.checkpoint().commits(), &[0]);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_fails_without_commit() {
        let embedder = Arc::new(FakeEmbedder::default());
        let store = Arc::new(FakeStore {
            always_fail: Some(|| StoreError::Connection("refused".to_string())),
            ..Default::default()
        });
        let mut orch = orchestrator(&embedder, &store, MemoryCheckpoint::new(), options(4));

        let failure = orch.run(dataset(8)).await.unwrap_err();

        assert_eq!(orch.state(), PipelineState::Failed);
        assert!(matches!(failure.error, PipelineError::Store(_)));
        assert_eq!(failure.failing_batch, Some(0));
        assert_eq!(failure.last_committed, None);
        assert_eq!(store.upsert_calls.load(Ordering::SeqCst), 3);
        assert!(orch.checkpoint().commits().is_empty());
    }

    #[tokio::test]
    async fn test_permanent_store_error_is_not_retried() {
        let embedder = Arc::new(FakeEmbedder::default());
        let store = Arc::new(FakeStore::scripted(vec![
            None,
            Some(Scripted::Fail(StoreError::Rejected(
                "wrong input: vector dimension error".to_string(),
            ))),
        ]));
        let mut orch = orchestrator(&embedder, &store, MemoryCheckpoint::new(), options(2));

        let failure = orch.run(dataset(6)).await.unwrap_err();

        assert_eq!(store.upsert_calls.load(Ordering::SeqCst), 2);
        assert_eq!(failure.failing_batch, Some(1));
        assert_eq!(failure.last_committed, Some(0));
        assert_eq!(orch.checkpoint().commits(), &[0]);
    }

    #[tokio::test]
    async fn test_embedder_retry_then_success() {
        let embedder = Arc::new(FakeEmbedder {
            transient_failures: AtomicU32::new(2),
            ..Default::default()
        });
        let store = Arc::new(FakeStore::default());
        let mut orch = orchestrator(&embedder, &store, MemoryCheckpoint::new(), options(4));

        orch.run(dataset(4)).await.unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_embedder_batch_failure_fails_run() {
        let embedder = Arc::new(FakeEmbedder {
            permanent_failure: true,
            ..Default::default()
        });
        let store = Arc::new(FakeStore::default());
        let mut orch = orchestrator(&embedder, &store, MemoryCheckpoint::starting_at(1), options(2));

        let failure = orch.run(dataset(6)).await.unwrap_err();

        assert!(matches!(failure.error, PipelineError::Embedding(_)));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(failure.failing_batch, Some(2));
        assert_eq!(failure.last_committed, Some(1));
        assert_eq!(store.upsert_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_result_count_mismatch_fails_run() {
        let embedder = Arc::new(FakeEmbedder {
            short_by_one: true,
            ..Default::default()
        });
        let store = Arc::new(FakeStore::default());
        let mut orch = orchestrator(&embedder, &store, MemoryCheckpoint::new(), options(3));

        let failure = orch.run(dataset(3)).await.unwrap_err();
        assert!(matches!(
            failure.error,
            PipelineError::ResultCount {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_dataset_error_after_commits() {
        let embedder = Arc::new(FakeEmbedder::default());
        let store = Arc::new(FakeStore::default());
        let source = DatasetCursor::from_reader(
            Cursor::new(b"{\"id\": 0}\n{\"id\": 1}\n{\"id\": 2}\n{\"title\": \"x\"}\n".to_vec()),
            DatasetFormat::Auto,
        )
        .unwrap();
        let mut orch = orchestrator(&embedder, &store, MemoryCheckpoint::new(), options(2));

        let failure = orch.run(source).await.unwrap_err();

        assert!(matches!(failure.error, PipelineError::Dataset(_)));
        assert_eq!(failure.failing_batch, Some(1));
        assert_eq!(failure.last_committed, Some(0));
        assert_eq!(orch.checkpoint().commits(), &[0]);
    }

    #[tokio::test]
    async fn test_collection_setup_failure_reports_no_batch() {
        let embedder = Arc::new(FakeEmbedder::default());
        let store = Arc::new(FakeStore {
            create_fails: true,
            ..Default::default()
        });
        let mut orch = orchestrator(&embedder, &store, MemoryCheckpoint::new(), options(2));

        let failure = orch.run(dataset(4)).await.unwrap_err();
        assert!(matches!(failure.error, PipelineError::Store(_)));
        assert_eq!(failure.failing_batch, None);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_job_timeout_fails_in_flight_batch() {
        let embedder = Arc::new(FakeEmbedder {
            delay: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        let store = Arc::new(FakeStore::default());
        let mut opts = options(2);
        opts.job_timeout = Some(Duration::from_millis(50));
        let mut orch = orchestrator(&embedder, &store, MemoryCheckpoint::starting_at(0), opts);

        let failure = orch.run(dataset(6)).await.unwrap_err();

        assert!(matches!(failure.error, PipelineError::Timeout(_)));
        assert_eq!(failure.failing_batch, Some(1));
        assert_eq!(failure.last_committed, Some(0));
        assert!(orch.checkpoint().commits().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_signal_cancels_run() {
        let embedder = Arc::new(FakeEmbedder {
            delay: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        let store = Arc::new(FakeStore::default());
        let mut orch = orchestrator(&embedder, &store, MemoryCheckpoint::new(), options(2));

        let failure = orch
            .run_until(dataset(4), tokio::time::sleep(Duration::from_millis(20)))
            .await
            .unwrap_err();

        assert!(matches!(failure.error, PipelineError::Cancelled));
        assert_eq!(failure.failing_batch, Some(0));
        assert_eq!(orch.state(), PipelineState::Failed);
    }

    #[test]
    fn test_options_from_config() {
        let config = PipelineConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(PipelineOptions::from_config(&config, 512).is_err());

        let opts = PipelineOptions::from_config(&PipelineConfig::default(), 512).unwrap();
        assert_eq!(opts.batch_size.get(), 10);
        assert_eq!(opts.retry.max_attempts, 3);
        assert!(opts.job_timeout.is_none());
    }
}
