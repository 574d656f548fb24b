// src/engine/service.rs

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use rand::{SeedableRng, rngs::StdRng};
use serde::{Serialize, de::DeserializeOwned};
use validator::Validate;

use super::{
    leaderboard, lifecycle, local_date, release_gate, resolver, sampler,
    scheduler::{self, SlotDecision},
    session,
};
use crate::{
    bank::QuestionBank,
    error::AppError,
    models::{
        attempt::{AttemptSession, AttemptStart, PaperView, ResultView, ScoredResult, Solution},
        auto_test::{AutoTestConfig, DailySlotView},
        leaderboard::LeaderboardView,
        question::{PublicQuestion, QuestionId},
        test_definition::{CreateTestRequest, LifecycleState, SourcingConfig, TestDefinition, TestView},
    },
    store::{ATTEMPTS, AUTO_TEST_CONFIGS, DocumentStore, FieldFilter, Subscription, TESTS},
    utils::{clock::Clock, html::clean_html},
};

/// Attempts at a compare-and-set write before giving up.
const MAX_WRITE_RETRIES: usize = 8;

/// Orchestrates the engine over the document store and the question bank.
///
/// All time is read from the injected clock and all randomness comes from
/// one seeded generator, so a test can replay any scenario exactly.
pub struct AssessmentEngine {
    store: Arc<dyn DocumentStore>,
    bank: Arc<dyn QuestionBank>,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
    tz: FixedOffset,
}

impl AssessmentEngine {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        bank: Arc<dyn QuestionBank>,
        clock: Arc<dyn Clock>,
        tz: FixedOffset,
    ) -> Self {
        Self {
            store,
            bank,
            clock,
            rng: Mutex::new(StdRng::seed_from_u64(rand::random())),
            tz,
        }
    }

    /// Replaces the random source with a deterministic one.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        local_date(self.now(), self.tz)
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }

    /// Read-modify-write with compare-and-set. `apply` returns whether it
    /// changed the document; unchanged documents are not written back.
    async fn update<T, F>(&self, collection: &str, id: &str, mut apply: F) -> Result<T, AppError>
    where
        T: DeserializeOwned + Serialize + Send + Sync,
        F: FnMut(&mut T) -> Result<bool, AppError> + Send,
    {
        for attempt in 1..=MAX_WRITE_RETRIES {
            let (mut doc, revision) = self
                .store
                .load::<T>(collection, id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("{collection}/{id} not found")))?;

            if !apply(&mut doc)? {
                return Ok(doc);
            }
            if self.store.replace_doc(collection, id, revision, &doc).await? {
                return Ok(doc);
            }
            tracing::debug!(collection, id, attempt, "write conflict, retrying");
        }
        Err(AppError::Conflict(format!(
            "too many concurrent updates to {collection}/{id}"
        )))
    }

    /// Resolves the sourcing and draws the frozen question list.
    async fn draw_questions(
        &self,
        sourcing: &SourcingConfig,
        count: usize,
        strict: bool,
    ) -> Result<Vec<QuestionId>, AppError> {
        let candidates = resolver::resolve_candidates(self.bank.as_ref(), sourcing).await?;
        let draw = self.with_rng(|rng| sampler::sample(&candidates, count, rng));
        sampler::accept(draw, strict)
    }

    // ---- Test definitions ----

    pub async fn create_test(
        &self,
        scope_id: &str,
        created_by: &str,
        req: CreateTestRequest,
    ) -> Result<TestDefinition, AppError> {
        req.validate()?;
        req.sourcing.validate()?;
        lifecycle::validate_window(req.start_time, req.end_time, req.duration_minutes)?;

        let question_ids = match &req.sourcing {
            // A curated list is frozen as given, in its given order.
            SourcingConfig::Fixed { question_ids } => question_ids.clone(),
            SourcingConfig::Dynamic { count, strict, .. } => {
                self.draw_questions(&req.sourcing, *count, *strict).await?
            }
        };

        let test = TestDefinition {
            id: uuid::Uuid::new_v4().to_string(),
            owner_scope_id: scope_id.to_string(),
            title: clean_html(&req.title),
            start_time: req.start_time,
            end_time: req.end_time,
            duration_minutes: req.duration_minutes,
            sourcing: req.sourcing,
            question_ids,
            result_release_time: req.result_release_time,
            show_solutions: req.show_solutions,
            show_leaderboard: req.show_leaderboard,
            auto_slot_date: None,
            created_by: created_by.to_string(),
            created_at: self.now(),
        };

        if !self.store.create_doc(TESTS, &test.id, &test).await? {
            return Err(AppError::Conflict(format!("test {} already exists", test.id)));
        }
        tracing::info!(
            test_id = %test.id,
            scope_id,
            questions = test.question_ids.len(),
            "test created"
        );
        Ok(test)
    }

    /// Changes the title, the only field that may change after creation.
    pub async fn rename_test(&self, test_id: &str, title: &str) -> Result<TestDefinition, AppError> {
        let title = clean_html(title);
        if title.trim().is_empty() {
            return Err(AppError::BadRequest("title must not be empty".to_string()));
        }
        self.update::<TestDefinition, _>(TESTS, test_id, |test| {
            if test.title == title {
                return Ok(false);
            }
            test.title = title.clone();
            Ok(true)
        })
        .await
    }

    pub async fn get_test(&self, test_id: &str) -> Result<TestDefinition, AppError> {
        self.store
            .load::<TestDefinition>(TESTS, test_id)
            .await?
            .map(|(test, _)| test)
            .ok_or_else(|| AppError::NotFound(format!("test {test_id} not found")))
    }

    pub async fn test_view(&self, test_id: &str) -> Result<TestView, AppError> {
        let test = self.get_test(test_id).await?;
        let state = test.lifecycle(self.now());
        Ok(TestView { test, state })
    }

    /// Tests of a scope, earliest start first.
    pub async fn list_tests(&self, scope_id: &str) -> Result<Vec<TestView>, AppError> {
        let now = self.now();
        let mut tests: Vec<TestDefinition> =
            self.store.find_by(TESTS, "owner_scope_id", scope_id).await?;
        tests.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        Ok(tests
            .into_iter()
            .map(|test| {
                let state = test.lifecycle(now);
                TestView { test, state }
            })
            .collect())
    }

    // ---- Attempt sessions ----

    pub async fn start_attempt(
        &self,
        test_id: &str,
        user_id: &str,
        display_name: &str,
    ) -> Result<AttemptStart, AppError> {
        let test = self.get_test(test_id).await?;
        let sid = session::session_id(test_id, user_id);

        if let Some(existing) = self.existing_start(&sid).await? {
            return Ok(existing);
        }

        let now = self.now();
        let state = test.lifecycle(now);
        if state != LifecycleState::Active {
            return Err(AppError::TestNotActive(state));
        }

        if let Some(date) = test.auto_slot_date {
            if self
                .completed_auto_slot(&test.owner_scope_id, user_id, date)
                .await?
            {
                return Err(AppError::Conflict(
                    "today's auto-test has already been completed".to_string(),
                ));
            }
        }

        let fresh = self.with_rng(|rng| session::open(&test, user_id, display_name, now, rng));
        if self.store.create_doc(ATTEMPTS, &sid, &fresh).await? {
            tracing::info!(session_id = %sid, test_id, user_id, deadline = %fresh.deadline, "attempt started");
            return Ok(AttemptStart::Started(fresh));
        }

        // Another device created the session first; its document wins.
        self.existing_start(&sid)
            .await?
            .ok_or_else(|| AppError::InternalServerError(format!("session {sid} vanished")))
    }

    /// Resolves a start request against an already existing session.
    async fn existing_start(&self, sid: &str) -> Result<Option<AttemptStart>, AppError> {
        let Some((existing, _)) = self.store.load::<AttemptSession>(ATTEMPTS, sid).await? else {
            return Ok(None);
        };
        if existing.is_submitted() {
            return Ok(Some(AttemptStart::AlreadySubmitted(existing)));
        }
        if session::is_expired(&existing, self.now()) {
            let closed = self.close_session(sid).await?;
            return Ok(Some(AttemptStart::AlreadySubmitted(closed)));
        }
        tracing::info!(session_id = %sid, "duplicate start, resuming existing session");
        Ok(Some(AttemptStart::Resumed(existing)))
    }

    /// Loads a session and checks that `user_id` owns it.
    async fn owned_session(&self, sid: &str, user_id: &str) -> Result<AttemptSession, AppError> {
        let (found, _) = self
            .store
            .load::<AttemptSession>(ATTEMPTS, sid)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("attempt {sid} not found")))?;
        if found.user_id != user_id {
            return Err(AppError::Forbidden("attempt belongs to another user".to_string()));
        }
        Ok(found)
    }

    /// Loads a session owned by `user_id`, submitting it first if its deadline passed.
    pub async fn get_session(&self, sid: &str, user_id: &str) -> Result<AttemptSession, AppError> {
        let found = self.owned_session(sid, user_id).await?;
        if session::is_expired(&found, self.now()) {
            return self.close_session(sid).await;
        }
        Ok(found)
    }

    /// Rejects writes to a session past its deadline, submitting it on the way.
    async fn writable_session(&self, sid: &str, user_id: &str) -> Result<AttemptSession, AppError> {
        let found = self.owned_session(sid, user_id).await?;
        if session::is_expired(&found, self.now()) {
            tracing::info!(session_id = %sid, "late write rejected, forcing submission");
            self.close_session(sid).await?;
            return Err(AppError::SessionExpired {
                deadline: found.deadline,
            });
        }
        Ok(found)
    }

    /// The session with its questions in presentation order, answer key withheld.
    pub async fn get_paper(&self, sid: &str, user_id: &str) -> Result<PaperView, AppError> {
        let current = self.get_session(sid, user_id).await?;
        let questions = self
            .bank
            .get_questions(&current.question_order)
            .await?
            .iter()
            .map(PublicQuestion::from)
            .collect();
        let remaining_seconds = session::remaining_seconds(&current, self.now());
        Ok(PaperView {
            session: current,
            questions,
            remaining_seconds,
        })
    }

    pub async fn submit_answer(
        &self,
        sid: &str,
        user_id: &str,
        question_id: &str,
        option_index: Option<usize>,
    ) -> Result<AttemptSession, AppError> {
        self.writable_session(sid, user_id).await?;

        if let Some(index) = option_index {
            let question = self.bank.get_questions(&[question_id.to_string()]).await?;
            if let Some(q) = question.first() {
                if index >= q.options.len() {
                    return Err(AppError::BadRequest(format!(
                        "option {index} is out of range for question '{question_id}'"
                    )));
                }
            }
        }

        let now = self.now();
        let outcome = self
            .update::<AttemptSession, _>(ATTEMPTS, sid, |s| {
                session::record_answer(s, question_id, option_index, now)
            })
            .await;

        // The deadline can pass between the check above and the write.
        if let Err(AppError::SessionExpired { .. }) = &outcome {
            self.close_session(sid).await?;
        }
        outcome
    }

    pub async fn clear_answer(
        &self,
        sid: &str,
        user_id: &str,
        question_id: &str,
    ) -> Result<AttemptSession, AppError> {
        self.submit_answer(sid, user_id, question_id, None).await
    }

    pub async fn navigate(
        &self,
        sid: &str,
        user_id: &str,
        index: usize,
    ) -> Result<AttemptSession, AppError> {
        self.writable_session(sid, user_id).await?;
        let now = self.now();
        self.update::<AttemptSession, _>(ATTEMPTS, sid, |s| session::navigate(s, index, now))
            .await
    }

    /// Submits the attempt. Submitting twice returns the stored result.
    pub async fn submit_attempt(&self, sid: &str, user_id: &str) -> Result<ScoredResult, AppError> {
        let current = self.get_session(sid, user_id).await?;
        let closed = if current.is_submitted() {
            current
        } else {
            self.close_session(sid).await?
        };
        closed
            .result
            .ok_or_else(|| AppError::InternalServerError(format!("session {sid} has no result")))
    }

    /// Submits and grades a session, whoever asks. Idempotent.
    async fn close_session(&self, sid: &str) -> Result<AttemptSession, AppError> {
        let (current, _) = self
            .store
            .load::<AttemptSession>(ATTEMPTS, sid)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("attempt {sid} not found")))?;
        if current.is_submitted() {
            return Ok(current);
        }

        let test = self.get_test(&current.test_id).await?;
        let key = self.bank.answer_key(&test.question_ids).await?;
        let now = self.now();

        let closed = self
            .update::<AttemptSession, _>(ATTEMPTS, sid, |s| Ok(session::close(s, &key, now)))
            .await?;

        if let Some(result) = &closed.result {
            tracing::info!(
                session_id = %sid,
                auto = closed.auto_submitted,
                correct = result.correct,
                total = result.total,
                percentage = result.percentage,
                "attempt submitted"
            );
        }
        Ok(closed)
    }

    /// Submits every running session whose personal deadline has passed.
    pub async fn sweep_expired(&self) -> Result<usize, AppError> {
        let now = self.now();
        let running: Vec<AttemptSession> =
            self.store.find_by(ATTEMPTS, "state", "in_progress").await?;

        let mut closed = 0;
        for s in running.iter().filter(|s| session::is_expired(s, now)) {
            match self.close_session(&s.id).await {
                Ok(_) => closed += 1,
                Err(e) => tracing::warn!(session_id = %s.id, "auto-submit failed: {}", e),
            }
        }
        if closed > 0 {
            tracing::info!(closed, "auto-submitted expired sessions");
        }
        Ok(closed)
    }

    /// Sessions of a test, with expired ones submitted first.
    async fn settled_sessions(&self, test_id: &str) -> Result<Vec<AttemptSession>, AppError> {
        let now = self.now();
        let sessions: Vec<AttemptSession> = self.store.find_by(ATTEMPTS, "test_id", test_id).await?;
        let mut settled = Vec::with_capacity(sessions.len());
        for s in sessions {
            if session::is_expired(&s, now) {
                settled.push(self.close_session(&s.id).await?);
            } else {
                settled.push(s);
            }
        }
        Ok(settled)
    }

    // ---- Results ----

    pub async fn get_leaderboard(
        &self,
        test_id: &str,
        viewer_id: &str,
    ) -> Result<LeaderboardView, AppError> {
        let test = self.get_test(test_id).await?;
        let sessions = self.settled_sessions(test_id).await?;
        Ok(leaderboard::view_for(&test, &sessions, viewer_id, self.now(), self.tz))
    }

    pub async fn can_view_result(
        &self,
        test_id: &str,
        attempt_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let test = self.get_test(test_id).await?;
        let (attempt, _) = self
            .store
            .load::<AttemptSession>(ATTEMPTS, attempt_id)
            .await?
            .filter(|(a, _)| a.test_id == test_id)
            .ok_or_else(|| AppError::NotFound(format!("attempt {attempt_id} not found")))?;
        Ok(release_gate::can_view(&test, &attempt, now, self.tz))
    }

    /// What the owner of a session may see of its outcome right now.
    pub async fn view_result(&self, sid: &str, user_id: &str) -> Result<ResultView, AppError> {
        let current = self.get_session(sid, user_id).await?;
        let (Some(result), Some(submitted_at)) = (current.result.clone(), current.submitted_at) else {
            return Ok(ResultView::InProgress {
                deadline: current.deadline,
            });
        };

        let test = self.get_test(&current.test_id).await?;
        if !release_gate::can_view(&test, &current, self.now(), self.tz) {
            return Ok(ResultView::Pending {
                available_at: Some(release_gate::release_instant(&test, submitted_at, self.tz)),
            });
        }
        Ok(ResultView::Released {
            result,
            solutions_available: test.show_solutions,
        })
    }

    /// Correct answers and explanations, once released and enabled for the test.
    pub async fn solutions(&self, sid: &str, user_id: &str) -> Result<Vec<Solution>, AppError> {
        let current = self.get_session(sid, user_id).await?;
        let test = self.get_test(&current.test_id).await?;

        if !release_gate::can_view(&test, &current, self.now(), self.tz) {
            let available_at = current
                .submitted_at
                .map(|at| release_gate::release_instant(&test, at, self.tz));
            return Err(AppError::ResultNotYetReleased { available_at });
        }
        if !test.show_solutions {
            return Err(AppError::Forbidden(
                "solutions are not published for this test".to_string(),
            ));
        }

        let questions = self.bank.get_questions(&test.question_ids).await?;
        Ok(questions
            .into_iter()
            .map(|q| Solution {
                selected: current.answers.get(&q.id).copied().flatten(),
                question_id: q.id,
                prompt: q.prompt,
                options: q.options,
                correct_option_index: q.correct_option_index,
                explanation: q.explanation,
            })
            .collect())
    }

    /// Change feed of a test's attempts.
    pub fn subscribe_attempts(&self, test_id: &str) -> Subscription {
        self.store
            .subscribe(ATTEMPTS, Some(FieldFilter::new("test_id", test_id)))
    }

    // ---- Recurring scheduler ----

    pub async fn put_auto_config(
        &self,
        scope_id: &str,
        mut config: AutoTestConfig,
    ) -> Result<AutoTestConfig, AppError> {
        config.scope_id = scope_id.to_string();
        config.title = clean_html(&config.title);
        config.check()?;
        self.store.save(AUTO_TEST_CONFIGS, scope_id, &config).await?;
        tracing::info!(scope_id, enabled = config.enabled, "auto-test configuration saved");
        Ok(config)
    }

    pub async fn get_auto_config(&self, scope_id: &str) -> Result<Option<AutoTestConfig>, AppError> {
        Ok(self
            .store
            .load::<AutoTestConfig>(AUTO_TEST_CONFIGS, scope_id)
            .await?
            .map(|(cfg, _)| cfg))
    }

    /// Returns the scope's auto-slot for `date`, creating it on first access
    /// inside the daily window. `None` when the day is inactive, or when the
    /// slot does not exist yet and `now` is outside the window.
    pub async fn materialize_daily_slot(
        &self,
        scope_id: &str,
        date: NaiveDate,
    ) -> Result<Option<TestDefinition>, AppError> {
        let Some(config) = self.get_auto_config(scope_id).await? else {
            return Ok(None);
        };
        let now = self.now();
        let slot_id = scheduler::slot_id(scope_id, date);

        let decision = scheduler::decide(&config, date, now, self.tz);
        if decision == SlotDecision::Inactive {
            return Ok(None);
        }
        if let Some((existing, _)) = self.store.load::<TestDefinition>(TESTS, &slot_id).await? {
            return Ok(Some(existing));
        }
        let SlotDecision::Open { start, end } = decision else {
            return Ok(None);
        };

        let question_ids = self
            .draw_questions(
                &config.sourcing,
                config.question_count,
                scheduler::strict_sourcing(&config),
            )
            .await?;
        let slot = scheduler::build_slot(&config, date, (start, end), question_ids, now);

        if self.store.create_doc(TESTS, &slot.id, &slot).await? {
            tracing::info!(scope_id, test_id = %slot.id, questions = slot.question_ids.len(), "daily slot materialized");
            return Ok(Some(slot));
        }
        // Lost the race; the first writer's draw is the day's test.
        Ok(self
            .store
            .load::<TestDefinition>(TESTS, &slot_id)
            .await?
            .map(|(t, _)| t))
    }

    /// Whether `user_id` submitted any auto-slot of the scope on `date`.
    pub async fn completed_auto_slot(
        &self,
        scope_id: &str,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<bool, AppError> {
        let sessions: Vec<AttemptSession> = self.store.find_by(ATTEMPTS, "user_id", user_id).await?;
        Ok(scheduler::completed_on(&sessions, scope_id, date, self.tz))
    }

    /// Today's auto-slot for one user.
    pub async fn daily_slot(&self, scope_id: &str, user_id: &str) -> Result<DailySlotView, AppError> {
        let today = self.today();
        let test = self.materialize_daily_slot(scope_id, today).await?;
        let completed_today = self.completed_auto_slot(scope_id, user_id, today).await?;
        Ok(DailySlotView {
            test,
            completed_today,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{Duration, NaiveTime, Offset, TimeZone};

    use super::*;
    use crate::{
        bank::{StoreQuestionBank, test_support::question},
        models::test_definition::PoolSelector,
        store::MemoryStore,
        utils::clock::ManualClock,
    };

    struct Harness {
        engine: AssessmentEngine,
        bank: Arc<StoreQuestionBank>,
        clock: Arc<ManualClock>,
    }

    // 2025-03-10 is a Monday.
    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, d, h, m, 0).unwrap()
    }

    async fn harness(now: DateTime<Utc>) -> Harness {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let bank = Arc::new(StoreQuestionBank::new(store.clone()));
        let questions: Vec<_> = (1..=6)
            .map(|i| question(&format!("q{i}"), if i % 2 == 0 { "even" } else { "odd" }, 1))
            .collect();
        bank.import(&questions).await.unwrap();

        let clock = Arc::new(ManualClock::new(now));
        let engine = AssessmentEngine::new(store, bank.clone(), clock.clone(), Utc.fix()).with_seed(7);
        Harness { engine, bank, clock }
    }

    fn fixed_request(ids: &[&str], start: DateTime<Utc>, end: DateTime<Utc>, minutes: u32) -> CreateTestRequest {
        CreateTestRequest {
            title: "Weekly <b>quiz</b>".into(),
            start_time: start,
            end_time: end,
            duration_minutes: minutes,
            sourcing: SourcingConfig::Fixed {
                question_ids: ids.iter().map(|s| s.to_string()).collect(),
            },
            result_release_time: None,
            show_solutions: true,
            show_leaderboard: true,
        }
    }

    fn dynamic_request(count: usize, strict: bool) -> CreateTestRequest {
        CreateTestRequest {
            sourcing: SourcingConfig::Dynamic {
                pool: PoolSelector {
                    category_id: Some("odd".into()),
                    ..Default::default()
                },
                difficulty: None,
                count,
                strict,
            },
            ..fixed_request(&["q1"], at(10, 9, 0), at(10, 10, 0), 20)
        }
    }

    fn auto_config() -> AutoTestConfig {
        AutoTestConfig {
            scope_id: String::new(),
            enabled: true,
            title: "Daily".into(),
            sourcing: SourcingConfig::Dynamic {
                pool: PoolSelector {
                    category_id: Some("odd".into()),
                    ..Default::default()
                },
                difficulty: None,
                count: 3,
                strict: false,
            },
            daily_start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            daily_end_time: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            active_days_of_week: BTreeSet::from([1, 3, 5]),
            duration_minutes: 15,
            result_release_time: None,
            question_count: 3,
            show_solutions: false,
            show_leaderboard: true,
        }
    }

    #[tokio::test]
    async fn test_fixed_test_grades_around_deleted_question() {
        let h = harness(at(10, 8, 0)).await;
        let test = h
            .engine
            .create_test("g1", "admin", fixed_request(&["q1", "q2", "q3", "q4"], at(10, 9, 0), at(10, 10, 0), 30))
            .await
            .unwrap();
        assert_eq!(test.question_ids, vec!["q1", "q2", "q3", "q4"]);
        assert_eq!(test.title, "Weekly <b>quiz</b>");

        assert!(h.bank.delete("q4").await.unwrap());

        h.clock.set(at(10, 9, 0));
        let sid = h.engine.start_attempt(&test.id, "u1", "Ada").await.unwrap().into_session().id;
        for q in ["q1", "q2", "q3"] {
            h.engine.submit_answer(&sid, "u1", q, Some(1)).await.unwrap();
        }

        h.clock.set(at(10, 9, 10));
        let result = h.engine.submit_attempt(&sid, "u1").await.unwrap();
        assert_eq!(result.total, 3);
        assert_eq!(result.correct, 3);
        assert_eq!(result.excluded, 1);
        assert_eq!(result.percentage, 100);
        assert_eq!(result.time_taken_seconds, 600);
    }

    #[tokio::test]
    async fn test_late_start_is_capped_and_auto_submitted() {
        let h = harness(at(10, 8, 0)).await;
        let test = h
            .engine
            .create_test("g1", "admin", fixed_request(&["q1", "q2"], at(10, 9, 0), at(10, 10, 0), 20))
            .await
            .unwrap();

        h.clock.set(at(10, 9, 50));
        let started = h.engine.start_attempt(&test.id, "u1", "Ada").await.unwrap();
        assert!(matches!(started, AttemptStart::Started(_)));
        assert_eq!(started.session().deadline, at(10, 10, 0));

        h.clock.set(at(10, 10, 5));
        let err = h
            .engine
            .submit_answer(&started.session().id, "u1", "q1", Some(0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SessionExpired { .. }));

        let closed = h.engine.get_session(&started.session().id, "u1").await.unwrap();
        assert!(closed.is_submitted());
        assert!(closed.auto_submitted);
        assert_eq!(closed.submitted_at, Some(at(10, 10, 0)));
    }

    #[tokio::test]
    async fn test_start_outside_window_is_rejected() {
        let h = harness(at(10, 8, 0)).await;
        let test = h
            .engine
            .create_test("g1", "admin", fixed_request(&["q1"], at(10, 9, 0), at(10, 10, 0), 20))
            .await
            .unwrap();

        let err = h.engine.start_attempt(&test.id, "u1", "Ada").await.unwrap_err();
        assert!(matches!(err, AppError::TestNotActive(LifecycleState::Scheduled)));

        h.clock.set(at(10, 10, 0));
        let err = h.engine.start_attempt(&test.id, "u1", "Ada").await.unwrap_err();
        assert!(matches!(err, AppError::TestNotActive(LifecycleState::Ended)));
    }

    #[tokio::test]
    async fn test_duplicate_start_resumes_then_reports_submission() {
        let h = harness(at(10, 9, 0)).await;
        let test = h
            .engine
            .create_test("g1", "admin", fixed_request(&["q1", "q2"], at(10, 9, 0), at(10, 10, 0), 20))
            .await
            .unwrap();

        let first = h.engine.start_attempt(&test.id, "u1", "Ada").await.unwrap();
        let second = h.engine.start_attempt(&test.id, "u1", "Ada").await.unwrap();
        assert!(matches!(second, AttemptStart::Resumed(_)));
        assert_eq!(first.session().id, second.session().id);
        assert_eq!(first.session().question_order, second.session().question_order);

        let result = h.engine.submit_attempt(&first.session().id, "u1").await.unwrap();
        let again = h.engine.submit_attempt(&first.session().id, "u1").await.unwrap();
        assert_eq!(result, again);

        let third = h.engine.start_attempt(&test.id, "u1", "Ada").await.unwrap();
        assert!(matches!(third, AttemptStart::AlreadySubmitted(_)));
    }

    #[tokio::test]
    async fn test_other_users_cannot_touch_a_session() {
        let h = harness(at(10, 9, 0)).await;
        let test = h
            .engine
            .create_test("g1", "admin", fixed_request(&["q1"], at(10, 9, 0), at(10, 10, 0), 20))
            .await
            .unwrap();
        let sid = h.engine.start_attempt(&test.id, "u1", "Ada").await.unwrap().into_session().id;

        assert!(matches!(
            h.engine.submit_answer(&sid, "mallory", "q1", Some(0)).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            h.engine.submit_answer(&sid, "u1", "q1", Some(9)).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_dynamic_draw_respects_strictness() {
        let h = harness(at(10, 8, 0)).await;

        let err = h.engine.create_test("g1", "admin", dynamic_request(5, true)).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::InsufficientQuestions {
                requested: 5,
                available: 3
            }
        ));

        let partial = h.engine.create_test("g1", "admin", dynamic_request(5, false)).await.unwrap();
        let mut ids = partial.question_ids.clone();
        ids.sort();
        assert_eq!(ids, vec!["q1", "q3", "q5"]);
    }

    #[tokio::test]
    async fn test_result_release_time_gates_view_and_solutions() {
        let h = harness(at(10, 9, 0)).await;
        let mut req = fixed_request(&["q1", "q2"], at(10, 9, 0), at(10, 10, 0), 20);
        req.result_release_time = Some(NaiveTime::from_hms_opt(21, 0, 0).unwrap());
        let test = h.engine.create_test("g1", "admin", req).await.unwrap();

        let sid = h.engine.start_attempt(&test.id, "u1", "Ada").await.unwrap().into_session().id;
        assert!(matches!(
            h.engine.view_result(&sid, "u1").await.unwrap(),
            ResultView::InProgress { .. }
        ));
        h.engine.submit_answer(&sid, "u1", "q2", Some(1)).await.unwrap();
        h.engine.submit_attempt(&sid, "u1").await.unwrap();

        h.clock.set(at(10, 12, 0));
        match h.engine.view_result(&sid, "u1").await.unwrap() {
            ResultView::Pending { available_at } => assert_eq!(available_at, Some(at(10, 21, 0))),
            other => panic!("expected pending, got {other:?}"),
        }
        assert!(matches!(
            h.engine.solutions(&sid, "u1").await,
            Err(AppError::ResultNotYetReleased { .. })
        ));
        assert!(!h.engine.can_view_result(&test.id, &sid, h.engine.now()).await.unwrap());

        h.clock.set(at(10, 21, 0));
        match h.engine.view_result(&sid, "u1").await.unwrap() {
            ResultView::Released { result, solutions_available } => {
                assert_eq!(result.correct, 1);
                assert!(solutions_available);
            }
            other => panic!("expected released, got {other:?}"),
        }
        let solutions = h.engine.solutions(&sid, "u1").await.unwrap();
        assert_eq!(solutions.len(), 2);
        assert_eq!(solutions.iter().find(|s| s.question_id == "q2").unwrap().selected, Some(1));
    }

    #[tokio::test]
    async fn test_sweep_closes_only_expired_sessions() {
        let h = harness(at(10, 9, 0)).await;
        let test = h
            .engine
            .create_test("g1", "admin", fixed_request(&["q1"], at(10, 9, 0), at(10, 11, 0), 20))
            .await
            .unwrap();
        h.engine.start_attempt(&test.id, "early", "E").await.unwrap();
        h.clock.set(at(10, 9, 15));
        h.engine.start_attempt(&test.id, "late", "L").await.unwrap();

        h.clock.set(at(10, 9, 25));
        assert_eq!(h.engine.sweep_expired().await.unwrap(), 1);
        assert_eq!(h.engine.sweep_expired().await.unwrap(), 0);

        let board = h.engine.get_leaderboard(&test.id, "early").await.unwrap();
        assert!(!board.released);
        assert_eq!(board.own.unwrap().user_id, "early");
    }

    #[tokio::test]
    async fn test_daily_slot_lifecycle() {
        let h = harness(at(11, 12, 0)).await;
        h.engine.put_auto_config("g1", auto_config()).await.unwrap();

        // Tuesday is not an active day.
        assert!(h.engine.daily_slot("g1", "u1").await.unwrap().test.is_none());

        // Monday, before the window opens.
        h.clock.set(at(10, 9, 30));
        assert!(h.engine.daily_slot("g1", "u1").await.unwrap().test.is_none());

        h.clock.set(at(10, 10, 30));
        let slot = h.engine.daily_slot("g1", "u1").await.unwrap().test.unwrap();
        assert_eq!(slot.id, "auto:g1:2025-03-10");
        assert_eq!(slot.question_ids.len(), 3);
        let again = h.engine.daily_slot("g1", "u1").await.unwrap().test.unwrap();
        assert_eq!(again.question_ids, slot.question_ids);

        let sid = h.engine.start_attempt(&slot.id, "u1", "Ada").await.unwrap().into_session().id;
        h.engine.submit_attempt(&sid, "u1").await.unwrap();
        assert!(h.engine.daily_slot("g1", "u1").await.unwrap().completed_today);
        assert!(!h.engine.daily_slot("g1", "u2").await.unwrap().completed_today);

        // Wednesday draws its own slot.
        h.clock.set(at(12, 10, 30) + Duration::minutes(1));
        let wednesday = h.engine.daily_slot("g1", "u1").await.unwrap();
        assert_eq!(wednesday.test.unwrap().id, "auto:g1:2025-03-12");
        assert!(!wednesday.completed_today);
    }

    #[tokio::test]
    async fn test_rename_is_the_only_edit() {
        let h = harness(at(10, 8, 0)).await;
        let test = h
            .engine
            .create_test("g1", "admin", fixed_request(&["q1"], at(10, 9, 0), at(10, 10, 0), 20))
            .await
            .unwrap();
        let renamed = h.engine.rename_test(&test.id, "Final").await.unwrap();
        assert_eq!(renamed.title, "Final");
        assert_eq!(renamed.question_ids, test.question_ids);
        assert!(h.engine.rename_test(&test.id, "   ").await.is_err());

        let listed = h.engine.list_tests("g1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].state, LifecycleState::Scheduled);
    }
}
