//! The gate orchestrator.
//!
//! [`GateOrchestrator`] owns the timer, the domain gate and the dataset
//! registry, and is the single entry point through which every request,
//! tick and fetch completion is applied. It never spawns work itself:
//! question fetches are handed back to the caller as a [`FetchJob`] whose
//! [`FetchOutcome`] is fed back through [`GateOrchestrator::complete_fetch`].
//! [`crate::service::GateService`] runs that loop on a tokio task;
//! [`GateOrchestrator::handle_inline`] runs it in place for one-shot callers.

pub mod protocol;

pub use protocol::{DatasetEntry, QuestionView, Request, Response, SessionStatus, Status};

use std::sync::Arc;

use rand::SeedableRng;
use rand_pcg::Mcg128Xsl64;
use serde_json::json;

use crate::cache::TtlCache;
use crate::content::ContentSource;
use crate::dataset::{
    DatasetId, DatasetMeta, DatasetRegistry, PlannedQuestion, QuizItem, Regrade, ServedQuestion,
};
use crate::error::{CoreError, FetchError, StorageError};
use crate::events::{timestamp, Event};
use crate::gate::{self, DomainGate};
use crate::storage::records::{
    self, PendingQuestionRecord, SessionRecord, PENDING_QUESTION_KEY, SESSION_KEY,
};
use crate::storage::{Config, InterceptPolicy, Store};
use crate::timer::{Clock, TimerEngine, DEFAULT_SESSION_MS};

const NEXT_QUESTION: &str = "next-question";

/// A navigation reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationEvent {
    pub url: String,
    /// Zero for the top-level frame.
    pub frame_id: i64,
}

/// What the caller should do with a request.
pub enum Dispatch {
    /// Send this response.
    Reply(Response),
    /// Answer `loading`, run the job, and feed its outcome back through
    /// [`GateOrchestrator::complete_fetch`].
    Fetch(FetchJob),
}

/// A question fetch started by `dataset.getQuestion`.
pub struct FetchJob {
    ticket: u64,
    planned: PlannedQuestion,
    source: Arc<dyn ContentSource>,
}

impl FetchJob {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    pub fn planned(&self) -> &PlannedQuestion {
        &self.planned
    }

    pub async fn run(self) -> FetchOutcome {
        let result = self
            .source
            .fetch_item(&self.planned.dataset, self.planned.pick.item)
            .await;
        FetchOutcome {
            ticket: self.ticket,
            planned: self.planned,
            result,
        }
    }
}

#[derive(Debug)]
pub struct FetchOutcome {
    pub ticket: u64,
    pub planned: PlannedQuestion,
    pub result: Result<QuizItem, FetchError>,
}

/// State of the next question.
#[derive(Debug, Clone)]
enum QuestionSlot {
    Loading { ticket: u64 },
    Ready(QuestionView),
    Failed(String),
}

pub struct GateOrchestrator {
    store: Box<dyn Store>,
    config: Config,
    source: Arc<dyn ContentSource>,
    clock: Arc<dyn Clock>,
    rng: Mcg128Xsl64,
    timer: TimerEngine,
    gate: DomainGate,
    registry: DatasetRegistry,
    question: TtlCache<&'static str, QuestionSlot>,
    /// Last served question, kept for `answer.submit`.
    served: Option<ServedQuestion>,
    next_ticket: u64,
}

impl GateOrchestrator {
    /// Rehydrate every component from `store`.
    ///
    /// Unreadable records fall back to defaults; only store I/O failures
    /// are returned.
    pub fn load(
        store: Box<dyn Store>,
        config: Config,
        source: Arc<dyn ContentSource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StorageError> {
        let now = clock.now_ms();

        let timer = match records::load::<SessionRecord>(store.as_ref(), SESSION_KEY) {
            Ok(Some(record)) => TimerEngine::restore(&record),
            Ok(None) => TimerEngine::new(initial_session_ms(&config), now),
            Err(e @ (StorageError::SchemaMismatch { .. } | StorageError::Corrupt { .. })) => {
                tracing::warn!(error = %e, "ignoring unreadable session");
                TimerEngine::new(initial_session_ms(&config), now)
            }
            Err(e) => return Err(e),
        }
        .with_persist_interval(config.session.persist_interval_ms);

        let gate = DomainGate::load(store.as_ref(), &config.gate.default_domains)?;
        let registry = DatasetRegistry::load(store.as_ref(), config.scheduler.clone())?;

        let rng = Mcg128Xsl64::seed_from_u64(config.scheduler.seed.unwrap_or_else(rand::random));

        let mut orchestrator = Self {
            store,
            config,
            source,
            clock,
            rng,
            timer,
            gate,
            registry,
            question: TtlCache::new(),
            served: None,
            next_ticket: 0,
        };
        orchestrator.restore_pending()?;

        tracing::debug!(
            state = ?orchestrator.timer.state(),
            domains = orchestrator.gate.len(),
            datasets = orchestrator.registry.len(),
            "orchestrator loaded"
        );
        Ok(orchestrator)
    }

    fn restore_pending(&mut self) -> Result<(), StorageError> {
        let record = match records::load::<PendingQuestionRecord>(
            self.store.as_ref(),
            PENDING_QUESTION_KEY,
        ) {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(()),
            Err(e @ (StorageError::SchemaMismatch { .. } | StorageError::Corrupt { .. })) => {
                tracing::warn!(error = %e, "ignoring unreadable pending question");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let Ok(dataset) = record.dataset.parse::<DatasetId>() else {
            tracing::warn!(dataset = %record.dataset, "pending question names a bad dataset");
            return Ok(());
        };
        let planned = PlannedQuestion {
            dataset,
            pick: record.pick,
        };
        // A graded question only waits for a retry; the boxes are settled.
        let restored = if record.graded {
            self.registry.get(&planned.dataset).is_some()
        } else {
            self.registry.commit(self.store.as_ref(), &planned)?
        };
        if restored {
            self.served = Some(ServedQuestion {
                dataset: planned.dataset,
                pick: planned.pick,
                item: record.item,
            });
        }
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn timer(&self) -> &TimerEngine {
        &self.timer
    }

    pub fn gate(&self) -> &DomainGate {
        &self.gate
    }

    pub fn registry(&self) -> &DatasetRegistry {
        &self.registry
    }

    /// The question awaiting an answer, if any.
    pub fn served(&self) -> Option<&ServedQuestion> {
        self.served.as_ref()
    }

    // ── Session ──────────────────────────────────────────────────────

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.timer.state(),
            time_left_ms: self.timer.time_left(),
            session_time_ms: self.timer.session_duration(),
            number_of_sessions: self.timer.completed_sessions(),
        }
    }

    pub fn start(&mut self) -> Result<Option<Event>, StorageError> {
        let now = self.clock.now_ms();
        let event = self.timer.start(now);
        self.commit_session(now, event)
    }

    pub fn pause(&mut self) -> Result<Option<Event>, StorageError> {
        let now = self.clock.now_ms();
        let event = self.timer.pause(now);
        self.commit_session(now, event)
    }

    pub fn toggle(&mut self) -> Result<Option<Event>, StorageError> {
        let now = self.clock.now_ms();
        let event = self.timer.toggle(now);
        self.commit_session(now, event)
    }

    pub fn reset(&mut self) -> Result<Event, StorageError> {
        let now = self.clock.now_ms();
        let event = self.timer.reset(now);
        log_event(&event);
        self.persist_session(now)?;
        Ok(event)
    }

    pub fn set_session_duration(&mut self, minutes: u64) -> Result<Event, CoreError> {
        let now = self.clock.now_ms();
        let event = self.timer.set_session_duration(minutes, now)?;
        log_event(&event);
        self.persist_session(now)?;
        Ok(event)
    }

    /// Apply the wall-clock delta since the last tick.
    ///
    /// Writes through on expiry and otherwise at most once per
    /// `session.persist_interval_ms` while running.
    pub fn tick(&mut self) -> Result<Option<Event>, StorageError> {
        let now = self.clock.now_ms();
        self.question.purge_expired(now);
        let event = self.timer.tick(now);
        if let Some(event) = &event {
            log_event(event);
        }
        if event.is_some() || (self.timer.is_running() && self.timer.persist_due(now)) {
            self.persist_session(now)?;
        }
        Ok(event)
    }

    fn commit_session(
        &mut self,
        now: u64,
        event: Option<Event>,
    ) -> Result<Option<Event>, StorageError> {
        if let Some(event) = &event {
            log_event(event);
            self.persist_session(now)?;
        }
        Ok(event)
    }

    fn persist_session(&mut self, now: u64) -> Result<(), StorageError> {
        records::save(self.store.as_ref(), SESSION_KEY, &self.timer.record())?;
        self.timer.mark_persisted(now);
        Ok(())
    }

    // ── Gate ─────────────────────────────────────────────────────────

    pub fn add_domain(&mut self, url: &str) -> Result<Option<String>, StorageError> {
        self.gate.add(self.store.as_ref(), url)
    }

    pub fn remove_domain(&mut self, url: &str) -> Result<Option<String>, StorageError> {
        self.gate.remove(self.store.as_ref(), url)
    }

    pub fn should_intercept(&self, url: &str) -> bool {
        if !self.gate.is_blocked(url) {
            return false;
        }
        match self.config.gate.intercept {
            InterceptPolicy::Always => true,
            InterceptPolicy::WhileRunning => self.timer.is_running(),
        }
    }

    /// Decide whether a completed navigation is redirected to the quiz.
    /// Sub-frame navigations never are.
    pub fn on_navigation(&mut self, event: &NavigationEvent) -> bool {
        if event.frame_id != 0 || !self.should_intercept(&event.url) {
            return false;
        }
        let now = self.clock.now_ms();
        log_event(&Event::NavigationIntercepted {
            domain: gate::normalize(&event.url).unwrap_or_default(),
            at: timestamp(now),
        });
        true
    }

    // ── Datasets ─────────────────────────────────────────────────────

    pub fn add_dataset(&mut self, id: DatasetId, meta: DatasetMeta) -> Result<(), StorageError> {
        self.forget_served_from(&id)?;
        self.registry.add(self.store.as_ref(), id, meta)
    }

    pub fn remove_dataset(&mut self, id: &DatasetId) -> Result<bool, StorageError> {
        self.forget_served_from(id)?;
        self.registry.remove(self.store.as_ref(), id)
    }

    pub fn list_datasets(&self) -> Vec<DatasetEntry> {
        self.registry.list().iter().map(DatasetEntry::from).collect()
    }

    /// Fetch a dataset's metadata from the content source and register it.
    pub async fn import_dataset(&mut self, id: DatasetId) -> Result<DatasetMeta, CoreError> {
        let source = Arc::clone(&self.source);
        let meta = source.fetch_meta(&id).await?;
        tracing::info!(dataset = %id, items = meta.length, "dataset imported");
        self.add_dataset(id, meta.clone())?;
        Ok(meta)
    }

    /// Import the configured default dataset when none are registered.
    pub async fn bootstrap_default_dataset(&mut self) -> Result<Option<DatasetId>, CoreError> {
        if !self.registry.is_empty() || !self.config.content.auto_import_default {
            return Ok(None);
        }
        let id: DatasetId = self.config.content.default_dataset.parse()?;
        self.import_dataset(id.clone()).await?;
        Ok(Some(id))
    }

    fn forget_served_from(&mut self, id: &DatasetId) -> Result<(), StorageError> {
        if self.served.as_ref().is_some_and(|s| &s.dataset == id) {
            self.served = None;
            self.store.remove(PENDING_QUESTION_KEY)?;
        }
        Ok(())
    }

    // ── Questions ────────────────────────────────────────────────────

    /// Serve the next question, starting a fetch when none is cached.
    ///
    /// While a fetch is in flight every call answers `loading`. A cached
    /// failure is reported to a retrying caller and discarded; a fresh
    /// request discards it and starts over.
    pub fn request_question(&mut self, is_retry: bool) -> Dispatch {
        let now = self.clock.now_ms();
        match self.question.get(&NEXT_QUESTION, now).cloned() {
            Some(QuestionSlot::Loading { .. }) => return Dispatch::Reply(Response::loading()),
            Some(QuestionSlot::Ready(view)) => {
                self.question.remove(&NEXT_QUESTION);
                return Dispatch::Reply(Response::success(view));
            }
            Some(QuestionSlot::Failed(message)) if is_retry => {
                self.question.remove(&NEXT_QUESTION);
                return Dispatch::Reply(Response::failed(message));
            }
            Some(QuestionSlot::Failed(_)) | None => {}
        }

        let planned = match self.registry.plan_next(&mut self.rng) {
            Ok(planned) => planned,
            Err(e) => {
                tracing::debug!(error = %e, "no question to serve");
                return Dispatch::Reply(Response::failed(e.to_string()));
            }
        };

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        tracing::debug!(
            ticket,
            dataset = %planned.dataset,
            item = planned.pick.item,
            "question fetch started"
        );
        self.question.insert(
            NEXT_QUESTION,
            QuestionSlot::Loading { ticket },
            self.config.question.pending_ttl_ms,
            now,
        );
        Dispatch::Fetch(FetchJob {
            ticket,
            planned,
            source: Arc::clone(&self.source),
        })
    }

    /// Apply a finished fetch. Returns false when the outcome no longer
    /// matches the live placeholder and was dropped.
    pub fn complete_fetch(&mut self, outcome: FetchOutcome) -> bool {
        let now = self.clock.now_ms();
        let live = matches!(
            self.question.get(&NEXT_QUESTION, now),
            Some(QuestionSlot::Loading { ticket }) if *ticket == outcome.ticket
        );
        if !live {
            tracing::debug!(ticket = outcome.ticket, "dropping stale question fetch");
            return false;
        }

        let (slot, ttl) = match self.settle_fetch(outcome, now) {
            Ok(view) => (QuestionSlot::Ready(view), self.config.question.ready_ttl_ms),
            Err(message) => (
                QuestionSlot::Failed(message),
                self.config.question.pending_ttl_ms,
            ),
        };
        self.question.insert(NEXT_QUESTION, slot, ttl, now);
        true
    }

    /// Commit a successful fetch as the served question, or describe why
    /// there is none.
    fn settle_fetch(&mut self, outcome: FetchOutcome, now: u64) -> Result<QuestionView, String> {
        let FetchOutcome { planned, result, .. } = outcome;
        let item = result.map_err(|e| {
            tracing::warn!(
                dataset = %planned.dataset,
                item = planned.pick.item,
                error = %e,
                "question fetch failed"
            );
            e.to_string()
        })?;
        match self.commit_question(planned, item, now) {
            Ok(Some(view)) => Ok(view),
            Ok(None) => Err("Dataset was removed".into()),
            Err(e) => {
                tracing::warn!(error = %e, "failed to record served question");
                Err(e.to_string())
            }
        }
    }

    fn commit_question(
        &mut self,
        planned: PlannedQuestion,
        item: QuizItem,
        now: u64,
    ) -> Result<Option<QuestionView>, StorageError> {
        if !self.registry.commit(self.store.as_ref(), &planned)? {
            return Ok(None);
        }
        let served = ServedQuestion {
            dataset: planned.dataset,
            pick: planned.pick,
            item,
        };
        save_pending(self.store.as_ref(), &served, false)?;
        log_event(&Event::QuestionServed {
            dataset: served.dataset.key(),
            from_box: served.pick.box_id,
            item: served.pick.item,
            at: timestamp(now),
        });
        let view = QuestionView::from(&served);
        self.served = Some(served);
        Ok(Some(view))
    }

    // ── Answers ──────────────────────────────────────────────────────

    /// Re-file the last served item. A correct answer also releases the
    /// gate by re-arming the timer; after a wrong one the question stays
    /// pending, across restarts too, for a retry.
    pub fn grade(&mut self, correct: bool) -> Result<Option<Regrade>, StorageError> {
        let now = self.clock.now_ms();
        let dataset = self.registry.current().cloned();
        let pending = self.served.is_some();

        let regrade = self.registry.grade(self.store.as_ref(), correct)?;
        if let (Some(regrade), Some(dataset)) = (&regrade, &dataset) {
            log_event(&Event::ItemRegraded {
                dataset: dataset.key(),
                item: regrade.item,
                from_box: regrade.from_box,
                to_box: regrade.to_box,
                correct,
                at: timestamp(now),
            });
        }

        if correct && (regrade.is_some() || pending) {
            self.served = None;
            self.store.remove(PENDING_QUESTION_KEY)?;
            let event = self.timer.reset(now);
            log_event(&event);
            self.persist_session(now)?;
        } else if regrade.is_some() {
            match &self.served {
                Some(served) => save_pending(self.store.as_ref(), served, true)?,
                None => self.store.remove(PENDING_QUESTION_KEY)?,
            }
        }
        Ok(regrade)
    }

    /// Compare `answer` with the served question's expected answer.
    ///
    /// Returns `None` when no question is pending. A wrong answer keeps the
    /// question so the user can try again.
    pub fn submit_answer(&mut self, answer: &str) -> Result<Option<bool>, StorageError> {
        let Some(served) = &self.served else {
            return Ok(None);
        };
        let correct = served.item.answer.trim() == answer.trim();
        self.grade(correct)?;
        Ok(Some(correct))
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// Apply one protocol request.
    pub async fn handle(&mut self, request: Request) -> Dispatch {
        if let Err(e) = self.tick() {
            tracing::warn!(error = %e, "failed to persist session on tick");
        }

        let result: Result<Response, CoreError> = match request {
            Request::GetTimeLeft => Ok(Response::success(self.timer.time_left())),
            Request::GetSessionTime => Ok(Response::success(self.timer.session_duration())),
            Request::UpdateSessionTime { minutes } => self
                .set_session_duration(minutes)
                .map(|_| Response::success(self.status())),
            Request::Start => self
                .start()
                .map(|_| Response::success(self.status()))
                .map_err(CoreError::from),
            Request::Pause => self
                .pause()
                .map(|_| Response::success(self.status()))
                .map_err(CoreError::from),
            Request::Toggle => self
                .toggle()
                .map(|_| Response::success(self.status()))
                .map_err(CoreError::from),
            Request::Reset => self
                .reset()
                .map(|_| Response::success(self.status()))
                .map_err(CoreError::from),
            Request::IsRunning => Ok(Response::success(self.timer.is_running())),
            Request::Status => Ok(Response::success(self.status())),

            Request::AddDomain { url } => self
                .add_domain(&url)
                .map(Response::success)
                .map_err(CoreError::from),
            Request::RemoveDomain { url } => self
                .remove_domain(&url)
                .map(Response::success)
                .map_err(CoreError::from),
            Request::IsBlocked { url } => Ok(Response::success(self.gate.is_blocked(&url))),
            Request::ListDomains => Ok(Response::success(self.gate.list())),

            Request::AddDataset { identity, meta } => {
                let entry = DatasetEntry::from(&identity);
                self.add_dataset(identity, meta)
                    .map(|_| Response::success(entry))
                    .map_err(CoreError::from)
            }
            Request::ImportDataset { identity } => {
                let entry = DatasetEntry::from(&identity);
                self.import_dataset(identity)
                    .await
                    .map(|_| Response::success(entry))
            }
            Request::RemoveDataset { identity } => self
                .remove_dataset(&identity)
                .map(Response::success)
                .map_err(CoreError::from),
            Request::ListDatasets => Ok(Response::success(self.list_datasets())),
            Request::GetQuestion { is_retry } => return self.request_question(is_retry),

            Request::AnswerCorrect => self
                .grade(true)
                .map(Response::success)
                .map_err(CoreError::from),
            Request::AnswerIncorrect => self
                .grade(false)
                .map(Response::success)
                .map_err(CoreError::from),
            Request::SubmitAnswer { answer } => match self.submit_answer(&answer) {
                Ok(Some(correct)) => Ok(Response::success(json!({ "correct": correct }))),
                Ok(None) => Ok(Response::failed("No question pending")),
                Err(e) => Err(e.into()),
            },

            Request::NavigationCompleted { url, frame_id } => {
                let intercept = self.on_navigation(&NavigationEvent { url, frame_id });
                Ok(Response::success(json!({ "intercept": intercept })))
            }
        };

        Dispatch::Reply(result.unwrap_or_else(|e| failure(&e)))
    }

    /// Apply one request and wait for any fetch it starts.
    ///
    /// Nothing else can run while the fetch is awaited, so its outcome is
    /// applied however long it took.
    pub async fn handle_inline(&mut self, request: Request) -> Response {
        match self.handle(request).await {
            Dispatch::Reply(response) => response,
            Dispatch::Fetch(job) => {
                let outcome = job.run().await;
                self.question.remove(&NEXT_QUESTION);
                let now = self.clock.now_ms();
                match self.settle_fetch(outcome, now) {
                    Ok(view) => Response::success(view),
                    Err(message) => Response::failed(message),
                }
            }
        }
    }
}

fn initial_session_ms(config: &Config) -> u64 {
    config
        .session
        .duration_min
        .checked_mul(60 * 1000)
        .filter(|ms| *ms > 0)
        .unwrap_or(DEFAULT_SESSION_MS)
}

/// Quiz and fetch problems are expected outcomes; everything else is an error.
fn failure(err: &CoreError) -> Response {
    match err {
        CoreError::Quiz(_) | CoreError::Fetch(_) => Response::failed(err.to_string()),
        _ => Response::error(err.to_string()),
    }
}

fn save_pending(
    store: &dyn Store,
    served: &ServedQuestion,
    graded: bool,
) -> Result<(), StorageError> {
    records::save(
        store,
        PENDING_QUESTION_KEY,
        &PendingQuestionRecord {
            dataset: served.dataset.key(),
            pick: served.pick,
            item: served.item.clone(),
            graded,
        },
    )
}

fn log_event(event: &Event) {
    tracing::info!(?event, "event");
}
