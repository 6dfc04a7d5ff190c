// src/session/controller.rs

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use super::{
    api::AssessmentApi,
    clock::Clock,
    error::SessionError,
    storage::{AnswersRecord, SessionStorage, TimerRecord, answers_key, timer_key},
};
use crate::models::{
    attempt::{MAX_TIME_SPENT_MINUTES, SubmitAssessmentRequest, SubmitAssessmentResponse, SubmittedAnswer},
    question::{OptionLabel, PublicQuestion},
};

/// Lifecycle of one attempt.
///
/// `Loading -> Taking -> Submitting -> Results | Error`; `Error` is also reachable
/// from `Loading` and `Taking`. `Results` and `Error` are terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Loading,
    Taking,
    Submitting,
    Results(SubmitAssessmentResponse),
    Error(SessionError),
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Loading => "loading",
            Stage::Taking => "taking",
            Stage::Submitting => "submitting",
            Stage::Results(_) => "results",
            Stage::Error(_) => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Results(_) | Stage::Error(_))
    }

    pub fn can_transition_to(&self, next: &Stage) -> bool {
        match (self, next) {
            (Stage::Loading, Stage::Taking) => true,
            (Stage::Taking, Stage::Submitting) => true,
            (Stage::Submitting, Stage::Results(_)) => true,
            (from, Stage::Error(_)) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// User actions delivered to [`SessionController::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Select(OptionLabel),
    Next,
    ConfirmSubmit,
    CancelSubmit,
}

/// What `next()` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Moved to the following question.
    Moved,
    /// On the last question; the submit confirmation is now open.
    ConfirmSubmit,
    /// Nothing staged for the current question.
    NothingSelected,
    /// Not taking the assessment.
    Ignored,
}

/// Client-side state machine for one timed attempt.
///
/// All mutation goes through `&mut self`, so a single task owns the session and
/// the countdown, user commands and submission never interleave.
pub struct SessionController {
    api: Arc<dyn AssessmentApi>,
    storage: Arc<dyn SessionStorage>,
    clock: Arc<dyn Clock>,

    stage: Stage,
    user_id: Option<String>,
    assessment_id: Option<i64>,
    attempt_key: Option<Uuid>,
    title: String,
    time_limit: i32,
    time_left: i64,
    deadline: Option<DateTime<Utc>>,
    questions: Vec<PublicQuestion>,
    current_index: usize,
    answers: BTreeMap<i64, OptionLabel>,
    staged: Option<OptionLabel>,
    confirm_open: bool,
}

impl SessionController {
    pub fn new(api: Arc<dyn AssessmentApi>, storage: Arc<dyn SessionStorage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            api,
            storage,
            clock,
            stage: Stage::Loading,
            user_id: None,
            assessment_id: None,
            attempt_key: None,
            title: String::new(),
            time_limit: 0,
            time_left: 0,
            deadline: None,
            questions: Vec::new(),
            current_index: 0,
            answers: BTreeMap::new(),
            staged: None,
            confirm_open: false,
        }
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn is_taking(&self) -> bool {
        self.stage == Stage::Taking
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Nominal time limit in minutes.
    pub fn time_limit(&self) -> i32 {
        self.time_limit
    }

    /// Seconds remaining.
    pub fn time_left(&self) -> i64 {
        self.time_left
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    pub fn attempt_key(&self) -> Option<Uuid> {
        self.attempt_key
    }

    pub fn questions(&self) -> &[PublicQuestion] {
        &self.questions
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_question(&self) -> Option<&PublicQuestion> {
        self.questions.get(self.current_index)
    }

    pub fn answers(&self) -> &BTreeMap<i64, OptionLabel> {
        &self.answers
    }

    pub fn staged(&self) -> Option<OptionLabel> {
        self.staged
    }

    pub fn confirm_open(&self) -> bool {
        self.confirm_open
    }

    pub fn result(&self) -> Option<&SubmitAssessmentResponse> {
        match &self.stage {
            Stage::Results(result) => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&SessionError> {
        match &self.stage {
            Stage::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Starts the attempt, or resumes it from durable storage after a reload.
    ///
    /// Only valid while `Loading`; starting over needs a fresh controller.
    pub async fn start(&mut self, user_id: Option<&str>, assessment_id: Option<i64>) {
        if self.stage != Stage::Loading {
            tracing::warn!(stage = self.stage.as_str(), "start ignored outside loading");
            return;
        }

        let Some(user_id) = user_id.map(str::trim).filter(|u| !u.is_empty()) else {
            self.fail(SessionError::not_authenticated());
            return;
        };
        let Some(assessment_id) = assessment_id else {
            self.fail(SessionError::missing_assessment_id());
            return;
        };

        self.user_id = Some(user_id.to_string());
        self.assessment_id = Some(assessment_id);
        let now = self.clock.now();

        let restored_timer = self
            .load_record::<TimerRecord>(&timer_key(assessment_id, user_id))
            .filter(|timer| self.matches_assessment(timer.assessment_id, &timer_key(assessment_id, user_id)));

        let restored_answers = self
            .load_record::<AnswersRecord>(&answers_key(assessment_id, user_id))
            .filter(|record| self.matches_assessment(record.assessment_id, &answers_key(assessment_id, user_id)));

        if let Some(timer) = &restored_timer {
            self.deadline = Some(timer.end_time);
            self.time_left = seconds_until(timer.end_time, now);
            self.attempt_key = timer.attempt_key;
            tracing::info!(assessment_id, time_left = self.time_left, "Restored timer");
        }

        // The question set is never persisted, so this call happens even on resume.
        let response = match self.api.start(assessment_id).await {
            Ok(response) => response,
            Err(err) => {
                self.fail(err);
                return;
            }
        };

        self.title = response.title;
        self.time_limit = response.time_limit;
        self.questions = response.questions;

        if let Some(record) = restored_answers {
            let stored = record.answers.len();
            // Answers to questions no longer in the set are dropped.
            self.answers = record
                .answers
                .iter()
                .filter(|a| self.questions.iter().any(|q| q.id == a.question_id))
                .map(|a| (a.question_id, a.selected_option))
                .collect();
            if self.answers.len() < stored {
                tracing::info!(
                    assessment_id,
                    dropped = stored - self.answers.len(),
                    "Dropped restored answers for unknown questions"
                );
            }
            self.current_index = self.answers.len().min(self.questions.len().saturating_sub(1));
            self.staged = self.committed_for_current();
            tracing::info!(
                assessment_id,
                restored = self.answers.len(),
                current_index = self.current_index,
                "Restored answers"
            );
        }

        if restored_timer.is_none() {
            let limit_seconds = i64::from(self.time_limit) * 60;
            let deadline = now + Duration::seconds(limit_seconds);
            let attempt_key = Uuid::new_v4();

            self.deadline = Some(deadline);
            self.time_left = limit_seconds;
            self.attempt_key = Some(attempt_key);
            self.persist(
                &timer_key(assessment_id, user_id),
                &TimerRecord {
                    end_time: deadline,
                    assessment_id,
                    attempt_key: Some(attempt_key),
                },
            );
        } else if self.attempt_key.is_none() {
            // Timer written without an attempt key: give the resumed attempt one and keep it.
            let attempt_key = Uuid::new_v4();
            self.attempt_key = Some(attempt_key);
            if let Some(deadline) = self.deadline {
                self.persist(
                    &timer_key(assessment_id, user_id),
                    &TimerRecord {
                        end_time: deadline,
                        assessment_id,
                        attempt_key: Some(attempt_key),
                    },
                );
            }
        }

        self.transition(Stage::Taking);
    }

    /// Stages an option for the current question without committing it.
    pub fn select(&mut self, option: OptionLabel) {
        if !self.is_taking() {
            return;
        }
        self.staged = Some(option);
    }

    /// Commits the staged option, persists the answers, then moves on or opens
    /// the submit confirmation on the last question.
    pub fn next(&mut self) -> Advance {
        if !self.is_taking() {
            return Advance::Ignored;
        }
        let Some(option) = self.staged else {
            return Advance::NothingSelected;
        };
        let Some(question_id) = self.current_question().map(|q| q.id) else {
            return Advance::Ignored;
        };

        self.answers.insert(question_id, option);
        self.persist_answers();

        if self.current_index + 1 < self.questions.len() {
            self.current_index += 1;
            self.staged = self.committed_for_current();
            Advance::Moved
        } else {
            self.confirm_open = true;
            Advance::ConfirmSubmit
        }
    }

    pub fn cancel_submit(&mut self) {
        self.confirm_open = false;
    }

    pub async fn confirm_submit(&mut self) {
        if self.confirm_open {
            self.submit().await;
        }
    }

    /// One countdown step. Reaching zero submits without confirmation.
    ///
    /// Steps one second, but never stays above the time actually left before the
    /// deadline, so ticks lost while the task was stalled are caught up at once.
    pub async fn tick(&mut self) {
        if !self.is_taking() || self.time_left <= 0 {
            return;
        }
        let mut time_left = self.time_left - 1;
        if let Some(deadline) = self.deadline {
            time_left = time_left.min(seconds_until_ceil(deadline, self.clock.now()));
        }
        self.time_left = time_left.max(0);
        if self.time_left == 0 {
            tracing::info!(assessment_id = ?self.assessment_id, "Time is up, submitting");
            self.submit().await;
        }
    }

    /// Submits the attempt. A no-op unless `Taking`, which also blocks a second
    /// submit while one is in flight.
    pub async fn submit(&mut self) {
        if !self.is_taking() {
            tracing::debug!(stage = self.stage.as_str(), "submit ignored");
            return;
        }
        let (Some(user_id), Some(assessment_id)) = (self.user_id.clone(), self.assessment_id) else {
            self.fail(SessionError::missing_assessment_id());
            return;
        };

        let request = SubmitAssessmentRequest {
            answers: self.final_answers(),
            time_spent: self.time_spent_minutes(),
            attempt_key: self.attempt_key,
        };

        self.confirm_open = false;
        self.transition(Stage::Submitting);

        match self.api.submit(assessment_id, &request).await {
            Ok(result) => {
                self.clear(&timer_key(assessment_id, &user_id));
                self.clear(&answers_key(assessment_id, &user_id));
                tracing::info!(
                    assessment_id,
                    score = result.score,
                    passed = result.is_passed,
                    "Assessment submitted"
                );
                self.transition(Stage::Results(result));
            }
            // Durable state stays so a later start can recover the attempt.
            Err(err) => self.fail(err),
        }
    }

    /// Committed answers plus the staged pick for the current question, in question order.
    pub fn final_answers(&self) -> Vec<SubmittedAnswer> {
        let mut merged = self.answers.clone();
        if let (Some(option), Some(question)) = (self.staged, self.current_question()) {
            merged.insert(question.id, option);
        }

        self.questions
            .iter()
            .filter_map(|q| {
                merged.get(&q.id).map(|option| SubmittedAnswer {
                    question_id: q.id,
                    selected_option: *option,
                })
            })
            .collect()
    }

    /// Whole minutes used, rounded up, within `1..=MAX_TIME_SPENT_MINUTES`.
    pub fn time_spent_minutes(&self) -> i32 {
        let elapsed = (i64::from(self.time_limit) * 60 - self.time_left).max(0);
        let minutes = (elapsed + 59) / 60;
        minutes.clamp(1, i64::from(MAX_TIME_SPENT_MINUTES)) as i32
    }

    /// Applies a user command.
    pub async fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Select(option) => self.select(option),
            SessionCommand::Next => {
                self.next();
            }
            SessionCommand::ConfirmSubmit => self.confirm_submit().await,
            SessionCommand::CancelSubmit => self.cancel_submit(),
        }
    }

    /// Drives the attempt until it leaves `Taking`: one interval ticking every
    /// second, interleaved with commands. If the command channel closes the
    /// countdown continues until the deadline submits the attempt.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        if self.is_taking() && self.time_left <= 0 {
            // Deadline passed while the page was away.
            self.submit().await;
        }

        let period = StdDuration::from_secs(1);
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut commands_open = true;

        while self.is_taking() {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                command = commands.recv(), if commands_open => match command {
                    Some(command) => self.handle(command).await,
                    None => commands_open = false,
                },
            }
        }
    }

    fn transition(&mut self, next: Stage) {
        if !self.stage.can_transition_to(&next) {
            tracing::warn!(from = self.stage.as_str(), to = next.as_str(), "illegal stage transition ignored");
            return;
        }
        tracing::debug!(from = self.stage.as_str(), to = next.as_str(), "stage transition");
        self.stage = next;
    }

    fn fail(&mut self, err: SessionError) {
        tracing::warn!(stage = self.stage.as_str(), "Assessment session failed: {}", err);
        self.confirm_open = false;
        self.transition(Stage::Error(err));
    }

    fn committed_for_current(&self) -> Option<OptionLabel> {
        self.current_question()
            .and_then(|q| self.answers.get(&q.id))
            .copied()
    }

    fn matches_assessment(&self, stored_id: i64, key: &str) -> bool {
        if Some(stored_id) == self.assessment_id {
            return true;
        }
        tracing::info!(key, stored_id, "Discarding stale session record");
        self.clear(key);
        false
    }

    fn persist_answers(&self) {
        let (Some(user_id), Some(assessment_id)) = (self.user_id.as_deref(), self.assessment_id) else {
            return;
        };
        let record = AnswersRecord {
            assessment_id,
            answers: self
                .answers
                .iter()
                .map(|(question_id, option)| SubmittedAnswer {
                    question_id: *question_id,
                    selected_option: *option,
                })
                .collect(),
        };
        self.persist(&answers_key(assessment_id, user_id), &record);
    }

    fn load_record<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.storage.get(key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(key, "Discarding unreadable session record: {}", e);
                    self.clear(key);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, "Failed to read session record: {}", e);
                None
            }
        }
    }

    // Storage is best effort: a failed write never interrupts the attempt.
    fn persist<T: Serialize>(&self, key: &str, record: &T) {
        let result = serde_json::to_string(record)
            .map_err(std::io::Error::other)
            .and_then(|raw| self.storage.set(key, &raw));
        if let Err(e) = result {
            tracing::warn!(key, "Failed to persist session record: {}", e);
        }
    }

    fn clear(&self, key: &str) {
        if let Err(e) = self.storage.remove(key) {
            tracing::warn!(key, "Failed to clear session record: {}", e);
        }
    }
}

/// `max(0, floor((deadline - now) / 1s))`
fn seconds_until(deadline: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (deadline - now).num_milliseconds().max(0) / 1000
}

/// `max(0, ceil((deadline - now) / 1s))`
fn seconds_until_ceil(deadline: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    ((deadline - now).num_milliseconds().max(0) + 999) / 1000
}
