// src/core/session.rs

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::engine::{AttemptEngine, AttemptOutcome, Effect, Event, Phase};
use super::ports::{GameDescriptor, NewAttempt, PlayStore, PortError};
use super::template;

/// How long a completed session stays in the registry so the results
/// screen can refresh. The attempt itself is already durable by then.
const COMPLETED_RETENTION: Duration = Duration::from_secs(300);

/// Failures surfaced to the play handlers.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Port(#[from] PortError),

    #[error("game has no questions")]
    NoQuestions,

    #[error("session not found")]
    UnknownSession,
}

/// Events a client may send. Timer expiry is internal to the manager and
/// deliberately not representable here.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    SelectWord { word: usize },
    ClearSlot { slot: usize },
    Advance,
}

impl From<ClientEvent> for Event {
    fn from(event: ClientEvent) -> Self {
        match event {
            ClientEvent::SelectWord { word } => Event::SelectWord { word },
            ClientEvent::ClearSlot { slot } => Event::ClearSlot { slot },
            ClientEvent::Advance => Event::Advance,
        }
    }
}

/// One answer as shown on the results view. The key is present only when
/// the game reveals answers.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerView {
    pub question_id: i64,
    pub user_answers: Vec<String>,
    pub is_correct: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answers: Option<Vec<String>>,
}

/// What the client sees of a session. Never exposes the answer key while
/// a question is still being presented.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SessionView {
    Presenting {
        session_id: u64,
        question_index: usize,
        total_questions: usize,
        question_text: String,
        /// Text split on blank markers; render slots between segments.
        segments: Vec<String>,
        blank_count: usize,
        bank: Vec<String>,
        slots: Vec<String>,
        time_limit: u32,
        remaining_seconds: u64,
    },
    Completed {
        session_id: u64,
        score: usize,
        total_questions: usize,
        percentage: u32,
        time_taken: u64,
        answers: Vec<AnswerView>,
        /// Id of the persisted attempt; absent when the write failed.
        #[serde(skip_serializing_if = "Option::is_none")]
        attempt_id: Option<i64>,
    },
}

struct FinalResult {
    outcome: AttemptOutcome,
    time_taken: u64,
    attempt_id: Option<i64>,
}

struct Session {
    id: u64,
    game: GameDescriptor,
    student_id: i64,
    engine: AttemptEngine,
    rng: StdRng,
    started_at: Instant,
    deadline: Instant,
    timer: Option<JoinHandle<()>>,
    result: Option<FinalResult>,
}

impl Session {
    fn cancel_timer(&mut self) {
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
    }
}

/// Owns every live play session: the in-memory registry, the per-question
/// countdown tasks, and the single attempt submission per session. All
/// storage goes through the injected [`PlayStore`] port.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn PlayStore>,
    sessions: Arc<RwLock<HashMap<u64, Arc<Mutex<Session>>>>>,
    next_id: Arc<AtomicU64>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn PlayStore>) -> Self {
        Self {
            store,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Starts a fresh session at the first question. There is no resume:
    /// every start is a new `Presenting(0)` with a full timer.
    pub async fn start(&self, game_id: i64, student_id: i64) -> Result<SessionView, SessionError> {
        let game = self.store.load_game(game_id).await?;
        let questions = self.store.load_questions(game_id).await?;
        if questions.is_empty() {
            return Err(SessionError::NoQuestions);
        }

        let mut rng = StdRng::from_entropy();
        let engine = AttemptEngine::new(questions, &mut rng);

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let session = Arc::new(Mutex::new(Session {
            id,
            game,
            student_id,
            engine,
            rng,
            started_at: now,
            deadline: now,
            timer: None,
            result: None,
        }));

        self.sessions.write().await.insert(id, session.clone());

        let mut session = session.lock().await;
        self.arm_timer(&mut session, 0);
        tracing::info!(session_id = id, game_id, student_id, "Play session started");
        Ok(view_of(&session))
    }

    /// Applies a client event and returns the resulting view.
    pub async fn handle_event(
        &self,
        session_id: u64,
        student_id: i64,
        event: ClientEvent,
    ) -> Result<SessionView, SessionError> {
        let session = self.get(session_id, student_id).await?;
        let mut session = session.lock().await;
        let effect = {
            let Session { engine, rng, .. } = &mut *session;
            engine.apply(event.into(), rng)
        };
        self.dispatch(&mut session, effect).await;
        Ok(view_of(&session))
    }

    /// Current view of a session, for reloads of the play screen.
    pub async fn view(&self, session_id: u64, student_id: i64) -> Result<SessionView, SessionError> {
        let session = self.get(session_id, student_id).await?;
        let session = session.lock().await;
        Ok(view_of(&session))
    }

    async fn get(&self, session_id: u64, student_id: i64) -> Result<Arc<Mutex<Session>>, SessionError> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(&session_id).ok_or(SessionError::UnknownSession)?;
        // Sessions are private to the student who started them.
        if session.lock().await.student_id != student_id {
            return Err(SessionError::UnknownSession);
        }
        Ok(session.clone())
    }

    /// Countdown expiry for question `index`. Fed through the same state
    /// machine as user events; the engine drops it if the session already
    /// moved past that question.
    async fn expire(&self, session_id: u64, index: usize) {
        let session = {
            let sessions = self.sessions.read().await;
            match sessions.get(&session_id) {
                Some(session) => session.clone(),
                None => return,
            }
        };
        let mut session = session.lock().await;
        let effect = {
            let Session { engine, rng, .. } = &mut *session;
            engine.apply(Event::TimerExpired { index }, rng)
        };
        self.dispatch(&mut session, effect).await;
    }

    async fn dispatch(&self, session: &mut Session, effect: Effect) {
        match effect {
            Effect::None => {}
            Effect::Rearm { index } => self.arm_timer(session, index),
            Effect::Finalize(outcome) => {
                session.cancel_timer();
                self.submit(session, outcome).await;
                self.evict_later(session.id);
            }
        }
    }

    /// Re-arms the full per-question countdown. The previous timer task is
    /// always cancelled first, so a tick can never outlive its question.
    fn arm_timer(&self, session: &mut Session, index: usize) {
        session.cancel_timer();
        let deadline = Instant::now() + Duration::from_secs(u64::from(session.game.time_limit));
        session.deadline = deadline;

        let manager = self.clone();
        let session_id = session.id;
        session.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            manager.expire(session_id, index).await;
        }));
    }

    /// Drops the session from the registry once the retention window on
    /// its results has passed.
    fn evict_later(&self, session_id: u64) {
        let manager = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(COMPLETED_RETENTION).await;
            manager.sessions.write().await.remove(&session_id);
        });
    }

    /// Hands the finalized attempt to storage. The engine emits `Finalize`
    /// at most once, so this runs at most once per session. A failed write
    /// is logged and the locally computed results are still served.
    async fn submit(&self, session: &mut Session, outcome: AttemptOutcome) {
        let time_taken = session.started_at.elapsed().as_secs();
        let attempt = NewAttempt {
            game_id: session.game.id,
            student_id: session.student_id,
            score: outcome.score,
            total_questions: outcome.total_questions,
            time_taken,
            answers: outcome.answers.clone(),
        };

        let attempt_id = match self.store.create_attempt(attempt).await {
            Ok(id) => {
                tracing::info!(
                    session_id = session.id,
                    attempt_id = id,
                    score = outcome.score,
                    total = outcome.total_questions,
                    "Attempt recorded"
                );
                Some(id)
            }
            Err(e) => {
                tracing::error!(
                    session_id = session.id,
                    game_id = session.game.id,
                    student_id = session.student_id,
                    error = %e,
                    "Failed to persist attempt; serving locally computed results"
                );
                None
            }
        };

        session.result = Some(FinalResult {
            outcome,
            time_taken,
            attempt_id,
        });
    }
}

fn view_of(session: &Session) -> SessionView {
    match session.engine.phase() {
        Phase::Presenting { index } => {
            let question = &session.engine.questions()[index];
            SessionView::Presenting {
                session_id: session.id,
                question_index: index,
                total_questions: session.engine.questions().len(),
                question_text: question.text.clone(),
                segments: template::split_segments(&question.text),
                blank_count: question.blank_count,
                bank: session.engine.bank().to_vec(),
                slots: session.engine.slots(index).to_vec(),
                time_limit: session.game.time_limit,
                remaining_seconds: session
                    .deadline
                    .saturating_duration_since(Instant::now())
                    .as_secs(),
            }
        }
        Phase::Completed => {
            // Dispatch records the result before the lock is released;
            // rescore rather than panic if it is ever absent.
            let rescored;
            let (outcome, time_taken, attempt_id) = match session.result.as_ref() {
                Some(result) => (&result.outcome, result.time_taken, result.attempt_id),
                None => {
                    rescored = session.engine.outcome();
                    (&rescored, session.started_at.elapsed().as_secs(), None)
                }
            };
            let reveal = session.game.reveal_answers;
            let answers = outcome
                .answers
                .iter()
                .map(|a| AnswerView {
                    question_id: a.question_id,
                    user_answers: a.user_answers.clone(),
                    is_correct: a.is_correct,
                    correct_answers: reveal.then(|| a.correct_answers.clone()),
                })
                .collect();
            SessionView::Completed {
                session_id: session.id,
                score: outcome.score,
                total_questions: outcome.total_questions,
                percentage: outcome.percentage(),
                time_taken,
                answers,
                attempt_id,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::PlayQuestion;
    use crate::core::ports::PortResult;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct MemoryStore {
        time_limit: u32,
        reveal_answers: bool,
        fail_writes: bool,
        attempts: StdMutex<Vec<NewAttempt>>,
    }

    impl MemoryStore {
        fn new(time_limit: u32) -> Self {
            Self {
                time_limit,
                reveal_answers: true,
                fail_writes: false,
                attempts: StdMutex::new(Vec::new()),
            }
        }

        fn attempt_count(&self) -> usize {
            self.attempts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PlayStore for MemoryStore {
        async fn load_game(&self, game_id: i64) -> PortResult<GameDescriptor> {
            Ok(GameDescriptor {
                id: game_id,
                time_limit: self.time_limit,
                reveal_answers: self.reveal_answers,
            })
        }

        async fn load_questions(&self, _game_id: i64) -> PortResult<Vec<PlayQuestion>> {
            Ok(vec![
                PlayQuestion {
                    id: 11,
                    text: "The capital of Brazil is ___.".to_owned(),
                    correct_answers: vec!["Brasília".to_owned()],
                    distractors: vec!["Lima".to_owned()],
                    blank_count: 1,
                },
                PlayQuestion {
                    id: 12,
                    text: "___ and ___ are primary colors.".to_owned(),
                    correct_answers: vec!["Red".to_owned(), "Blue".to_owned()],
                    distractors: vec![],
                    blank_count: 2,
                },
            ])
        }

        async fn create_attempt(&self, attempt: NewAttempt) -> PortResult<i64> {
            if self.fail_writes {
                return Err(PortError::Storage("connection refused".to_owned()));
            }
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push(attempt);
            Ok(attempts.len() as i64)
        }
    }

    fn select(view: &SessionView, text: &str) -> ClientEvent {
        let SessionView::Presenting { bank, .. } = view else {
            panic!("expected a presenting view");
        };
        let word = bank.iter().position(|w| w == text).expect("word in bank");
        ClientEvent::SelectWord { word }
    }

    fn session_id(view: &SessionView) -> u64 {
        match view {
            SessionView::Presenting { session_id, .. } => *session_id,
            SessionView::Completed { session_id, .. } => *session_id,
        }
    }

    #[tokio::test]
    async fn start_presents_the_first_question_with_a_full_timer() {
        let manager = SessionManager::new(Arc::new(MemoryStore::new(60)));
        let view = manager.start(1, 100).await.unwrap();

        let SessionView::Presenting {
            question_index,
            total_questions,
            blank_count,
            remaining_seconds,
            ref bank,
            ..
        } = view
        else {
            panic!("expected a presenting view");
        };
        assert_eq!(question_index, 0);
        assert_eq!(total_questions, 2);
        assert_eq!(blank_count, 1);
        assert!(remaining_seconds <= 60 && remaining_seconds >= 59);
        let mut sorted = bank.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["Brasília", "Lima"]);
    }

    #[tokio::test]
    async fn full_session_scores_and_persists_one_attempt() {
        let store = Arc::new(MemoryStore::new(60));
        let manager = SessionManager::new(store.clone());

        let view = manager.start(1, 100).await.unwrap();
        let id = session_id(&view);

        let event = select(&view, "Brasília");
        manager.handle_event(id, 100, event).await.unwrap();
        let view = manager.handle_event(id, 100, ClientEvent::Advance).await.unwrap();

        let event = select(&view, "Red");
        let view = manager.handle_event(id, 100, event).await.unwrap();
        let event = select(&view, "Blue");
        manager.handle_event(id, 100, event).await.unwrap();
        let view = manager.handle_event(id, 100, ClientEvent::Advance).await.unwrap();

        let SessionView::Completed {
            score,
            total_questions,
            percentage,
            attempt_id,
            ref answers,
            ..
        } = view
        else {
            panic!("expected a completed view");
        };
        assert_eq!(score, 2);
        assert_eq!(total_questions, 2);
        assert_eq!(percentage, 100);
        assert_eq!(attempt_id, Some(1));
        assert!(answers.iter().all(|a| a.is_correct));
        // reveal_answers is on, so the key snapshot is included.
        assert_eq!(
            answers[0].correct_answers.as_deref(),
            Some(&["Brasília".to_owned()][..])
        );

        assert_eq!(store.attempt_count(), 1);
        let attempts = store.attempts.lock().unwrap();
        assert_eq!(attempts[0].game_id, 1);
        assert_eq!(attempts[0].student_id, 100);
        assert_eq!(attempts[0].score, 2);
    }

    #[tokio::test]
    async fn duplicate_terminal_advance_persists_a_single_attempt() {
        let store = Arc::new(MemoryStore::new(60));
        let manager = SessionManager::new(store.clone());

        let view = manager.start(1, 100).await.unwrap();
        let id = session_id(&view);

        manager.handle_event(id, 100, ClientEvent::Advance).await.unwrap();
        let first = manager.handle_event(id, 100, ClientEvent::Advance).await.unwrap();
        // The double-fire: a second finish lands after completion.
        let second = manager.handle_event(id, 100, ClientEvent::Advance).await.unwrap();

        assert!(matches!(first, SessionView::Completed { .. }));
        assert!(matches!(second, SessionView::Completed { .. }));
        assert_eq!(store.attempt_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_auto_advances_and_completes_the_session() {
        let store = Arc::new(MemoryStore::new(30));
        let manager = SessionManager::new(store.clone());

        let view = manager.start(1, 100).await.unwrap();
        let id = session_id(&view);

        // First question expires untouched.
        tokio::time::advance(Duration::from_secs(31)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        let view = manager.view(id, 100).await.unwrap();
        let SessionView::Presenting {
            question_index,
            remaining_seconds,
            ..
        } = view
        else {
            panic!("expected the second question");
        };
        assert_eq!(question_index, 1);
        // Re-entering Presenting re-armed the full limit.
        assert!(remaining_seconds >= 29);

        // Last question expires too: the session completes on its own.
        tokio::time::advance(Duration::from_secs(31)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        let view = manager.view(id, 100).await.unwrap();
        let SessionView::Completed { score, ref answers, .. } = view else {
            panic!("expected a completed view");
        };
        assert_eq!(score, 0);
        assert!(answers.iter().all(|a| a.user_answers.is_empty()));
        assert_eq!(store.attempt_count(), 1);
    }

    #[tokio::test]
    async fn failed_write_still_serves_results() {
        let mut store = MemoryStore::new(60);
        store.fail_writes = true;
        let manager = SessionManager::new(Arc::new(store));

        let view = manager.start(1, 100).await.unwrap();
        let id = session_id(&view);
        manager.handle_event(id, 100, ClientEvent::Advance).await.unwrap();
        let view = manager.handle_event(id, 100, ClientEvent::Advance).await.unwrap();

        let SessionView::Completed { attempt_id, score, .. } = view else {
            panic!("expected a completed view");
        };
        assert_eq!(attempt_id, None);
        assert_eq!(score, 0);
    }

    #[tokio::test]
    async fn answer_key_is_hidden_unless_the_game_reveals_it() {
        let mut store = MemoryStore::new(60);
        store.reveal_answers = false;
        let manager = SessionManager::new(Arc::new(store));

        let view = manager.start(1, 100).await.unwrap();
        let id = session_id(&view);
        manager.handle_event(id, 100, ClientEvent::Advance).await.unwrap();
        let view = manager.handle_event(id, 100, ClientEvent::Advance).await.unwrap();

        let SessionView::Completed { ref answers, .. } = view else {
            panic!("expected a completed view");
        };
        assert!(answers.iter().all(|a| a.correct_answers.is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn completed_sessions_are_evicted_after_the_retention_window() {
        let manager = SessionManager::new(Arc::new(MemoryStore::new(600)));
        let view = manager.start(1, 100).await.unwrap();
        let id = session_id(&view);

        manager.handle_event(id, 100, ClientEvent::Advance).await.unwrap();
        manager.handle_event(id, 100, ClientEvent::Advance).await.unwrap();

        // The results view survives a refresh shortly after completion.
        tokio::time::advance(Duration::from_secs(60)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        let view = manager.view(id, 100).await.unwrap();
        assert!(matches!(view, SessionView::Completed { .. }));

        // Past the retention window the registry entry is gone.
        tokio::time::advance(COMPLETED_RETENTION).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        let err = manager.view(id, 100).await.unwrap_err();
        assert!(matches!(err, SessionError::UnknownSession));
    }

    #[tokio::test]
    async fn completed_view_rescores_when_no_result_was_recorded() {
        let mut rng = StdRng::from_entropy();
        let mut engine = AttemptEngine::new(
            vec![PlayQuestion {
                id: 11,
                text: "The capital of Brazil is ___.".to_owned(),
                correct_answers: vec!["Brasília".to_owned()],
                distractors: vec![],
                blank_count: 1,
            }],
            &mut rng,
        );
        engine.apply(Event::Advance, &mut rng);
        assert_eq!(engine.phase(), Phase::Completed);

        let now = Instant::now();
        let session = Session {
            id: 9,
            game: GameDescriptor {
                id: 1,
                time_limit: 60,
                reveal_answers: true,
            },
            student_id: 100,
            engine,
            rng,
            started_at: now,
            deadline: now,
            timer: None,
            result: None,
        };

        let SessionView::Completed {
            score,
            total_questions,
            attempt_id,
            ..
        } = view_of(&session)
        else {
            panic!("expected a completed view");
        };
        assert_eq!(score, 0);
        assert_eq!(total_questions, 1);
        assert_eq!(attempt_id, None);
    }

    #[tokio::test]
    async fn sessions_are_private_to_their_student() {
        let manager = SessionManager::new(Arc::new(MemoryStore::new(60)));
        let view = manager.start(1, 100).await.unwrap();
        let id = session_id(&view);

        let err = manager.view(id, 200).await.unwrap_err();
        assert!(matches!(err, SessionError::UnknownSession));
    }
}
