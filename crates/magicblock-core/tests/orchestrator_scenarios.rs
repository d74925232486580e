//! End-to-end orchestrator behavior over in-memory collaborators.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use magicblock_core::content::ContentSource;
use magicblock_core::orchestrator::{Dispatch, FetchOutcome, QuestionView};
use magicblock_core::storage::InterceptPolicy;
use magicblock_core::{
    BoxId, Config, DatasetId, DatasetMeta, FetchError, GateOrchestrator, ManualClock,
    MemorySource, MemoryStore, NavigationEvent, QuizItem, Request, Response, Status,
    StorageError, Store, TimerState,
};

const START_MS: u64 = 1_700_000_000_000;

struct Harness {
    store: Arc<MemoryStore>,
    source: Arc<MemorySource>,
    clock: ManualClock,
}

impl Harness {
    fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            source: Arc::new(MemorySource::new()),
            clock: ManualClock::new(START_MS),
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.scheduler.seed = Some(7);
        config
    }

    fn load_with(&self, config: Config) -> GateOrchestrator {
        GateOrchestrator::load(
            Box::new(Arc::clone(&self.store)),
            config,
            self.source.clone(),
            Arc::new(self.clock.clone()),
        )
        .unwrap()
    }

    fn load(&self) -> GateOrchestrator {
        self.load_with(Self::config())
    }

    /// Publish a dataset whose item `i` is answered by `a{i}`, and register it.
    fn with_dataset(&self, orch: &mut GateOrchestrator, items: usize) -> DatasetId {
        let id = dataset();
        let content = (0..items)
            .map(|i| QuizItem {
                question: format!("q{i}"),
                answer: format!("a{i}"),
            })
            .collect();
        self.source.insert_dataset(&id, content);
        orch.add_dataset(id.clone(), DatasetMeta::with_length(items))
            .unwrap();
        id
    }
}

fn dataset() -> DatasetId {
    "buxr.data.master".parse().unwrap()
}

fn view(response: &Response) -> QuestionView {
    assert_eq!(response.status, Status::Success, "{response:?}");
    serde_json::from_value(response.result.clone().unwrap()).unwrap()
}

async fn reply(orch: &mut GateOrchestrator, request: Request) -> Response {
    match orch.handle(request).await {
        Dispatch::Reply(response) => response,
        Dispatch::Fetch(_) => panic!("expected an immediate reply"),
    }
}

#[tokio::test]
async fn correct_submission_promotes_item_and_rearms_timer() {
    let h = Harness::new();
    let mut orch = h.load();
    let id = h.with_dataset(&mut orch, 3);

    orch.start().unwrap();
    h.clock.advance(60_000);

    let question = view(&orch.handle_inline(Request::GetQuestion { is_retry: false }).await);
    assert_eq!(question.box_id, BoxId::One);
    assert_eq!(question.question, format!("q{}", question.item));
    assert_eq!(orch.timer().time_left(), 1_440_000);

    let resp = orch
        .handle_inline(Request::SubmitAnswer {
            answer: format!("  a{} ", question.item),
        })
        .await;
    assert_eq!(resp.result.unwrap()["correct"], true);
    assert_eq!(orch.timer().time_left(), orch.timer().session_duration());
    assert!(orch.timer().is_running());
    assert_eq!(orch.registry().get(&id).unwrap().boxes().two, vec![question.item]);
    assert!(orch.served().is_none());
}

#[tokio::test]
async fn wrong_submission_keeps_question_and_timer() {
    let h = Harness::new();
    let mut orch = h.load();
    let id = h.with_dataset(&mut orch, 3);
    orch.start().unwrap();
    h.clock.advance(30_000);

    let question = view(&orch.handle_inline(Request::GetQuestion { is_retry: false }).await);
    let resp = orch
        .handle_inline(Request::SubmitAnswer {
            answer: "nope".into(),
        })
        .await;
    assert_eq!(resp.result.unwrap()["correct"], false);
    assert_eq!(orch.timer().time_left(), 1_470_000);
    assert_eq!(orch.registry().get(&id).unwrap().boxes().one.len(), 3);

    // A retry with the right answer releases the gate; the item was already graded.
    let resp = orch
        .handle_inline(Request::SubmitAnswer {
            answer: format!("a{}", question.item),
        })
        .await;
    assert_eq!(resp.result.unwrap()["correct"], true);
    assert_eq!(orch.timer().time_left(), orch.timer().session_duration());
    assert_eq!(orch.registry().get(&id).unwrap().boxes().one.len(), 3);
}

#[tokio::test]
async fn wrong_answer_can_be_retried_after_restart() {
    let h = Harness::new();
    let mut orch = h.load();
    let id = h.with_dataset(&mut orch, 3);
    orch.start().unwrap();
    h.clock.advance(30_000);

    let question = view(&orch.handle_inline(Request::GetQuestion { is_retry: false }).await);
    let resp = orch
        .handle_inline(Request::SubmitAnswer {
            answer: "nope".into(),
        })
        .await;
    assert_eq!(resp.result.unwrap()["correct"], false);
    drop(orch);

    let mut orch = h.load();
    assert_eq!(orch.served().unwrap().pick.item, question.item);
    assert!(orch.registry().current().is_none());
    assert_eq!(orch.timer().time_left(), 1_470_000);

    let resp = orch
        .handle_inline(Request::SubmitAnswer {
            answer: format!("a{}", question.item),
        })
        .await;
    assert_eq!(resp.result.unwrap()["correct"], true);
    assert_eq!(orch.timer().time_left(), orch.timer().session_duration());
    assert_eq!(orch.registry().get(&id).unwrap().boxes().one.len(), 3);
    drop(orch);

    let orch = h.load();
    assert!(orch.served().is_none());
}

/// Serves from an inner source, moving the clock forward on every item fetch.
struct SlowSource {
    inner: MemorySource,
    clock: ManualClock,
    delay_ms: u64,
}

#[async_trait]
impl ContentSource for SlowSource {
    async fn fetch_meta(&self, id: &DatasetId) -> Result<DatasetMeta, FetchError> {
        self.inner.fetch_meta(id).await
    }

    async fn fetch_item(&self, id: &DatasetId, index: usize) -> Result<QuizItem, FetchError> {
        self.clock.advance(self.delay_ms);
        self.inner.fetch_item(id, index).await
    }
}

#[tokio::test]
async fn inline_fetch_slower_than_placeholder_is_still_served() {
    let clock = ManualClock::new(START_MS);
    let config = Harness::config();
    let source = Arc::new(SlowSource {
        inner: MemorySource::new(),
        clock: clock.clone(),
        delay_ms: config.question.pending_ttl_ms + 1_000,
    });
    let items = (0..4)
        .map(|i| QuizItem {
            question: format!("q{i}"),
            answer: format!("a{i}"),
        })
        .collect();
    source.inner.insert_dataset(&dataset(), items);

    let mut orch = GateOrchestrator::load(
        Box::new(MemoryStore::new()),
        config,
        Arc::clone(&source) as Arc<dyn ContentSource>,
        Arc::new(clock.clone()),
    )
    .unwrap();
    orch.add_dataset(dataset(), DatasetMeta::with_length(4))
        .unwrap();

    let question = view(&orch.handle_inline(Request::GetQuestion { is_retry: false }).await);
    assert_eq!(orch.served().unwrap().pick.item, question.item);
    assert_eq!(orch.registry().current(), Some(&dataset()));
    let scheduled = orch.registry().get(&dataset()).unwrap();
    assert_eq!(scheduled.interval_counter(), 1);
    assert_eq!(source.inner.item_fetches(), 1);
}

#[tokio::test]
async fn in_flight_question_is_not_fetched_twice() {
    let h = Harness::new();
    let mut orch = h.load();
    h.with_dataset(&mut orch, 5);

    let Dispatch::Fetch(job) = orch.handle(Request::GetQuestion { is_retry: false }).await else {
        panic!("expected a fetch");
    };
    let resp = reply(&mut orch, Request::GetQuestion { is_retry: false }).await;
    assert_eq!(resp.status, Status::Loading);
    let resp = reply(&mut orch, Request::GetQuestion { is_retry: true }).await;
    assert_eq!(resp.status, Status::Loading);

    assert!(orch.complete_fetch(job.run().await));
    let resp = reply(&mut orch, Request::GetQuestion { is_retry: true }).await;
    assert_eq!(resp.status, Status::Success);
    assert_eq!(h.source.item_fetches(), 1);
}

#[tokio::test]
async fn fetch_outliving_its_placeholder_is_dropped() {
    let h = Harness::new();
    let mut orch = h.load();
    let id = h.with_dataset(&mut orch, 5);

    let Dispatch::Fetch(stale) = orch.request_question(false) else {
        panic!("expected a fetch");
    };
    h.clock.advance(orch.config().question.pending_ttl_ms + 1);
    let Dispatch::Fetch(fresh) = orch.request_question(true) else {
        panic!("expected a new fetch after the placeholder expired");
    };
    assert_ne!(stale.ticket(), fresh.ticket());

    assert!(!orch.complete_fetch(stale.run().await));
    assert!(orch.registry().current().is_none());
    assert!(orch.registry().get(&id).unwrap().last_served().is_none());

    assert!(orch.complete_fetch(fresh.run().await));
    assert_eq!(orch.registry().current(), Some(&id));
}

#[tokio::test]
async fn failed_fetch_preserves_pending_grade() {
    let h = Harness::new();
    let mut orch = h.load();
    let id = h.with_dataset(&mut orch, 4);

    let first = view(&orch.handle_inline(Request::GetQuestion { is_retry: false }).await);

    let Dispatch::Fetch(job) = orch.request_question(false) else {
        panic!("expected a fetch");
    };
    let failed = FetchOutcome {
        ticket: job.ticket(),
        planned: job.planned().clone(),
        result: Err(FetchError::Missing("data/9.json".into())),
    };
    assert!(orch.complete_fetch(failed));

    let resp = reply(&mut orch, Request::GetQuestion { is_retry: true }).await;
    assert_eq!(resp.status, Status::Failed);
    assert_eq!(orch.served().unwrap().pick.item, first.item);
    assert_eq!(orch.registry().current(), Some(&id));

    let resp = orch.handle_inline(Request::AnswerCorrect).await;
    assert_eq!(resp.result.unwrap()["item"], first.item);
    assert_eq!(orch.registry().get(&id).unwrap().boxes().two, vec![first.item]);
}

#[tokio::test]
async fn no_datasets_fails_softly() {
    let h = Harness::new();
    let mut orch = h.load();
    let resp = orch.handle_inline(Request::GetQuestion { is_retry: false }).await;
    assert_eq!(resp.status, Status::Failed);

    let resp = orch.handle_inline(Request::AnswerIncorrect).await;
    assert_eq!(resp.status, Status::Success);
    assert_eq!(resp.result, Some(serde_json::Value::Null));
}

#[test]
fn intercept_policy_is_configurable() {
    let h = Harness::new();
    let mut always = h.load();
    let nav = |url: &str, frame_id| NavigationEvent {
        url: url.into(),
        frame_id,
    };

    assert!(always.on_navigation(&nav("https://www.youtube.com/watch?v=x", 0)));
    assert!(!always.on_navigation(&nav("https://www.youtube.com/embed/x", 4)));
    assert!(!always.on_navigation(&nav("https://docs.rs/", 0)));
    assert!(!always.on_navigation(&nav("not a url", 0)));

    let mut config = Harness::config();
    config.gate.intercept = InterceptPolicy::WhileRunning;
    let mut while_running = h.load_with(config);
    assert!(!while_running.should_intercept("https://youtube.com/"));
    while_running.start().unwrap();
    assert!(while_running.on_navigation(&nav("https://youtube.com/", 0)));
}

#[test]
fn session_survives_restart_and_charges_downtime() {
    let h = Harness::new();
    let mut orch = h.load();
    orch.set_session_duration(1).unwrap();
    orch.start().unwrap();
    drop(orch);

    h.clock.advance(20_000);
    let mut orch = h.load();
    assert_eq!(orch.timer().state(), TimerState::Running);
    orch.tick().unwrap();
    assert_eq!(orch.timer().time_left(), 40_000);

    h.clock.advance(45_000);
    assert!(orch.tick().unwrap().is_some());
    drop(orch);

    let orch = h.load();
    let status = orch.status();
    assert_eq!(status.state, TimerState::Idle);
    assert_eq!(status.time_left_ms, 60_000);
    assert_eq!(status.number_of_sessions, 1);
}

#[tokio::test]
async fn pending_question_survives_restart() {
    let h = Harness::new();
    let mut orch = h.load();
    let id = h.with_dataset(&mut orch, 3);
    let question = view(&orch.handle_inline(Request::GetQuestion { is_retry: false }).await);
    drop(orch);

    let mut orch = h.load();
    assert_eq!(orch.served().unwrap().pick.item, question.item);
    let regrade = orch.grade(true).unwrap().unwrap();
    assert_eq!(regrade.item, question.item);
    drop(orch);

    // Graded once; a restart must not make it gradable again.
    let mut orch = h.load();
    assert!(orch.served().is_none());
    assert!(orch.grade(true).unwrap().is_none());
    assert_eq!(orch.registry().get(&id).unwrap().boxes().two, vec![question.item]);
}

#[tokio::test]
async fn import_and_bootstrap_use_source_metadata() {
    let h = Harness::new();
    let mut orch = h.load();
    h.source.insert_meta(&dataset(), DatasetMeta::with_length(12));

    assert_eq!(orch.bootstrap_default_dataset().await.unwrap(), Some(dataset()));
    assert_eq!(orch.registry().get(&dataset()).unwrap().boxes().one.len(), 12);
    assert_eq!(orch.bootstrap_default_dataset().await.unwrap(), None);

    let other: DatasetId = "someone.quiz.main".parse().unwrap();
    let resp = orch
        .handle_inline(Request::ImportDataset { identity: other })
        .await;
    assert_eq!(resp.status, Status::Failed);
    assert_eq!(orch.list_datasets().len(), 1);
}

#[tokio::test]
async fn malformed_domains_are_ignored() {
    let h = Harness::new();
    let mut orch = h.load();

    let resp = orch
        .handle_inline(Request::AddDomain {
            url: "not a url".into(),
        })
        .await;
    assert_eq!(resp.status, Status::Success);
    assert_eq!(resp.result, Some(serde_json::Value::Null));

    let resp = orch
        .handle_inline(Request::IsBlocked {
            url: "not a url".into(),
        })
        .await;
    assert_eq!(resp.result, Some(serde_json::Value::Bool(false)));
}

/// Store whose writes can be switched off.
#[derive(Default)]
struct FailingStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
}

impl Store for FailingStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Locked);
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key)
    }
}

#[tokio::test]
async fn storage_failure_is_reported_and_state_is_kept() {
    let store = Arc::new(FailingStore::default());
    let clock = ManualClock::new(START_MS);
    let mut orch = GateOrchestrator::load(
        Box::new(Arc::clone(&store)),
        Harness::config(),
        Arc::new(MemorySource::new()),
        Arc::new(clock.clone()),
    )
    .unwrap();

    store.fail_writes.store(true, Ordering::SeqCst);
    assert!(matches!(orch.start(), Err(StorageError::Locked)));
    assert!(orch.timer().is_running());

    let resp = orch.handle_inline(Request::Reset).await;
    assert_eq!(resp.status, Status::Error);

    store.fail_writes.store(false, Ordering::SeqCst);
    clock.advance(1_000);
    let resp = orch.handle_inline(Request::Pause).await;
    assert_eq!(resp.status, Status::Success);
    assert_eq!(resp.result.unwrap()["state"], "paused");
}
