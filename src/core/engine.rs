// src/core/engine.rs

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// A question as the engine plays it. Assumed already validated at
/// authoring time; the engine re-derives nothing except the word pool.
#[derive(Debug, Clone)]
pub struct PlayQuestion {
    pub id: i64,
    pub text: String,
    pub correct_answers: Vec<String>,
    pub distractors: Vec<String>,
    pub blank_count: usize,
}

/// Session phase. `Presenting` holds the index of the active question;
/// `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Presenting { index: usize },
    Completed,
}

/// Everything that can happen to a live session, user actions and timer
/// expiry alike, funneled through the same transition function.
#[derive(Debug, Clone, Copy)]
pub enum Event {
    /// Click on word `word` (index into the current shuffled bank).
    SelectWord { word: usize },
    /// Click on filled slot `slot` of the active question.
    ClearSlot { slot: usize },
    /// Explicit "next question" / "finish".
    Advance,
    /// Countdown for question `index` reached zero. The index identifies
    /// the question the timer was armed for; a stale tick is a no-op.
    TimerExpired { index: usize },
}

/// What the caller must do after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    None,
    /// A new question is active: cancel the old countdown, arm a fresh one.
    Rearm { index: usize },
    /// Terminal transition: persist exactly one attempt record.
    Finalize(AttemptOutcome),
}

/// One scored answer, with the key snapshotted at submission time. This is
/// the canonical stored shape; it never changes after finalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: i64,
    pub user_answers: Vec<String>,
    pub correct_answers: Vec<String>,
    pub is_correct: bool,
}

/// The finalized result of a play session.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptOutcome {
    pub answers: Vec<AnswerRecord>,
    pub score: usize,
    pub total_questions: usize,
}

impl AttemptOutcome {
    /// Display-only percentage, rounded to the nearest integer.
    pub fn percentage(&self) -> u32 {
        if self.total_questions == 0 {
            return 0;
        }
        (self.score as f64 / self.total_questions as f64 * 100.0).round() as u32
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Positional comparison under trim + case-fold. Binary: no partial credit.
pub fn is_answer_correct(user_answers: &[String], correct_answers: &[String]) -> bool {
    user_answers.len() == correct_answers.len()
        && user_answers
            .iter()
            .zip(correct_answers)
            .all(|(user, correct)| normalize(user) == normalize(correct))
}

/// Drives one student through one game's question list.
///
/// Pure state machine: `apply` mutates in memory and reports the required
/// side effect, but performs no I/O and owns no timer. The session manager
/// wires timers and persistence around it.
#[derive(Debug)]
pub struct AttemptEngine {
    questions: Vec<PlayQuestion>,
    phase: Phase,
    /// Filled slots per question, in blank order. Never longer than the
    /// question's blank count.
    slots: Vec<Vec<String>>,
    /// Shuffled word pool of the active question, re-rolled on every entry.
    bank: Vec<String>,
}

impl AttemptEngine {
    /// Starts a session at the first question. `questions` must be
    /// non-empty; callers refuse to start a game without questions.
    pub fn new<R: Rng>(questions: Vec<PlayQuestion>, rng: &mut R) -> Self {
        let slots = vec![Vec::new(); questions.len()];
        let mut engine = Self {
            questions,
            phase: Phase::Presenting { index: 0 },
            slots,
            bank: Vec::new(),
        };
        engine.reroll_bank(0, rng);
        engine
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn questions(&self) -> &[PlayQuestion] {
        &self.questions
    }

    /// Current shuffled word bank (active question only).
    pub fn bank(&self) -> &[String] {
        &self.bank
    }

    pub fn slots(&self, index: usize) -> &[String] {
        &self.slots[index]
    }

    fn reroll_bank<R: Rng>(&mut self, index: usize, rng: &mut R) {
        let question = &self.questions[index];
        let mut pool: Vec<String> = question
            .correct_answers
            .iter()
            .chain(&question.distractors)
            .cloned()
            .collect();
        pool.shuffle(rng);
        self.bank = pool;
    }

    /// Applies one event. Events arriving after `Completed` are ignored,
    /// which is what makes finalization at-most-once even when an explicit
    /// advance races a last-question timeout.
    pub fn apply<R: Rng>(&mut self, event: Event, rng: &mut R) -> Effect {
        let index = match self.phase {
            Phase::Presenting { index } => index,
            Phase::Completed => return Effect::None,
        };

        match event {
            Event::SelectWord { word } => {
                self.select_word(index, word);
                Effect::None
            }
            Event::ClearSlot { slot } => {
                if slot < self.slots[index].len() {
                    self.slots[index].remove(slot);
                }
                Effect::None
            }
            Event::Advance => self.advance(index, rng),
            Event::TimerExpired { index: armed } if armed == index => self.advance(index, rng),
            Event::TimerExpired { .. } => Effect::None,
        }
    }

    /// Toggle semantics: clicking a word already sitting in a slot frees
    /// it; otherwise it is appended to the next open slot if one remains.
    /// Matching is by text, so a duplicate pool entry can never occupy two
    /// slots at once.
    fn select_word(&mut self, index: usize, word: usize) {
        let Some(word) = self.bank.get(word).cloned() else {
            return;
        };
        let slots = &mut self.slots[index];
        if let Some(position) = slots.iter().position(|w| *w == word) {
            slots.remove(position);
        } else if slots.len() < self.questions[index].blank_count {
            slots.push(word);
        }
    }

    fn advance<R: Rng>(&mut self, index: usize, rng: &mut R) -> Effect {
        let next = index + 1;
        if next < self.questions.len() {
            self.phase = Phase::Presenting { index: next };
            self.reroll_bank(next, rng);
            Effect::Rearm { index: next }
        } else {
            self.phase = Phase::Completed;
            Effect::Finalize(self.outcome())
        }
    }

    /// Scores every question positionally against its key. A question whose
    /// stored key no longer matches its blank count (authoring-time data
    /// corruption) is scored incorrect rather than aborting the session.
    pub fn outcome(&self) -> AttemptOutcome {
        let answers: Vec<AnswerRecord> = self
            .questions
            .iter()
            .zip(&self.slots)
            .map(|(question, user_answers)| {
                let well_formed = question.blank_count > 0
                    && question.correct_answers.len() == question.blank_count;
                let is_correct = well_formed
                    && is_answer_correct(user_answers, &question.correct_answers);
                AnswerRecord {
                    question_id: question.id,
                    user_answers: user_answers.clone(),
                    correct_answers: question.correct_answers.clone(),
                    is_correct,
                }
            })
            .collect();

        let score = answers.iter().filter(|a| a.is_correct).count();
        AttemptOutcome {
            score,
            total_questions: answers.len(),
            answers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn question(id: i64, text: &str, answers: &[&str], distractors: &[&str]) -> PlayQuestion {
        PlayQuestion {
            id,
            text: text.to_owned(),
            blank_count: crate::core::template::blank_count(text),
            correct_answers: answers.iter().map(|s| s.to_string()).collect(),
            distractors: distractors.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn select_text(engine: &mut AttemptEngine, rng: &mut StdRng, text: &str) {
        let word = engine
            .bank()
            .iter()
            .position(|w| w == text)
            .expect("word present in bank");
        engine.apply(Event::SelectWord { word }, rng);
    }

    #[test]
    fn bank_is_a_permutation_of_answers_and_distractors() {
        let mut rng = rng();
        let engine = AttemptEngine::new(
            vec![question(1, "___ and ___", &["Red", "Blue"], &["Green"])],
            &mut rng,
        );
        let mut bank = engine.bank().to_vec();
        bank.sort();
        assert_eq!(bank, vec!["Blue", "Green", "Red"]);
    }

    #[test]
    fn selection_fills_slots_in_order_and_respects_the_cap() {
        let mut rng = rng();
        let mut engine = AttemptEngine::new(
            vec![question(1, "___ and ___", &["Red", "Blue"], &["Green"])],
            &mut rng,
        );

        select_text(&mut engine, &mut rng, "Green");
        select_text(&mut engine, &mut rng, "Red");
        assert_eq!(engine.slots(0), ["Green", "Red"]);

        // Both slots are filled; a third selection is refused.
        select_text(&mut engine, &mut rng, "Blue");
        assert_eq!(engine.slots(0), ["Green", "Red"]);
    }

    #[test]
    fn selecting_a_used_word_toggles_it_out() {
        let mut rng = rng();
        let mut engine = AttemptEngine::new(
            vec![question(1, "___ and ___", &["Red", "Blue"], &[])],
            &mut rng,
        );

        select_text(&mut engine, &mut rng, "Red");
        select_text(&mut engine, &mut rng, "Blue");
        select_text(&mut engine, &mut rng, "Red");
        assert_eq!(engine.slots(0), ["Blue"]);
    }

    #[test]
    fn duplicate_pool_text_occupies_at_most_one_slot() {
        let mut rng = rng();
        // "Red" appears twice in the pool: once as key, once as distractor.
        let mut engine = AttemptEngine::new(
            vec![question(1, "___ and ___", &["Red", "Blue"], &["Red"])],
            &mut rng,
        );

        let positions: Vec<usize> = engine
            .bank()
            .iter()
            .enumerate()
            .filter(|(_, w)| *w == "Red")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(positions.len(), 2);

        engine.apply(Event::SelectWord { word: positions[0] }, &mut rng);
        // Selecting the second "Red" tile toggles the first out instead of
        // filling a second slot with the same word.
        engine.apply(Event::SelectWord { word: positions[1] }, &mut rng);
        assert!(engine.slots(0).is_empty());
    }

    #[test]
    fn clearing_a_slot_shifts_later_slots_down() {
        let mut rng = rng();
        let mut engine = AttemptEngine::new(
            vec![question(1, "___ ___ ___", &["a", "b", "c"], &[])],
            &mut rng,
        );
        select_text(&mut engine, &mut rng, "a");
        select_text(&mut engine, &mut rng, "b");
        select_text(&mut engine, &mut rng, "c");

        engine.apply(Event::ClearSlot { slot: 0 }, &mut rng);
        assert_eq!(engine.slots(0), ["b", "c"]);

        // Out-of-range slot is a no-op.
        engine.apply(Event::ClearSlot { slot: 9 }, &mut rng);
        assert_eq!(engine.slots(0), ["b", "c"]);
    }

    #[test]
    fn advancing_rearms_the_timer_and_rerolls_the_bank() {
        let mut rng = rng();
        let mut engine = AttemptEngine::new(
            vec![
                question(1, "___", &["one"], &[]),
                question(2, "___", &["two"], &["decoy"]),
            ],
            &mut rng,
        );

        let effect = engine.apply(Event::Advance, &mut rng);
        assert_eq!(effect, Effect::Rearm { index: 1 });
        assert_eq!(engine.phase(), Phase::Presenting { index: 1 });
        let mut bank = engine.bank().to_vec();
        bank.sort();
        assert_eq!(bank, vec!["decoy", "two"]);
    }

    #[test]
    fn stale_timer_expiry_is_ignored() {
        let mut rng = rng();
        let mut engine = AttemptEngine::new(
            vec![
                question(1, "___", &["one"], &[]),
                question(2, "___", &["two"], &[]),
            ],
            &mut rng,
        );
        engine.apply(Event::Advance, &mut rng);

        // A tick armed for question 0 fires after we already moved on.
        let effect = engine.apply(Event::TimerExpired { index: 0 }, &mut rng);
        assert_eq!(effect, Effect::None);
        assert_eq!(engine.phase(), Phase::Presenting { index: 1 });
    }

    #[test]
    fn finalization_happens_exactly_once() {
        let mut rng = rng();
        let mut engine =
            AttemptEngine::new(vec![question(1, "___", &["one"], &[])], &mut rng);

        let first = engine.apply(Event::TimerExpired { index: 0 }, &mut rng);
        assert!(matches!(first, Effect::Finalize(_)));

        // The racing explicit advance lands after completion: no-op.
        let second = engine.apply(Event::Advance, &mut rng);
        assert_eq!(second, Effect::None);
        assert_eq!(engine.phase(), Phase::Completed);
    }

    #[test]
    fn scoring_is_positional_and_normalized() {
        let mut rng = rng();
        let mut engine = AttemptEngine::new(
            vec![question(1, "The capital of Brazil is ___.", &["Brasília"], &[])],
            &mut rng,
        );
        // Trailing space and different case still count.
        engine.slots[0] = vec!["  brasília ".to_owned()];

        let Effect::Finalize(outcome) = engine.apply(Event::Advance, &mut rng) else {
            panic!("expected finalization");
        };
        assert_eq!(outcome.score, 1);
        assert!(outcome.answers[0].is_correct);
        assert_eq!(outcome.percentage(), 100);
    }

    #[test]
    fn wrong_order_is_incorrect() {
        let mut rng = rng();
        let mut engine = AttemptEngine::new(
            vec![question(1, "___ and ___", &["Red", "Blue"], &[])],
            &mut rng,
        );
        engine.slots[0] = vec!["Blue".to_owned(), "Red".to_owned()];

        let Effect::Finalize(outcome) = engine.apply(Event::Advance, &mut rng) else {
            panic!("expected finalization");
        };
        assert_eq!(outcome.score, 0);
    }

    #[test]
    fn timed_out_question_yields_empty_incorrect_answer() {
        let mut rng = rng();
        let mut engine = AttemptEngine::new(
            vec![
                question(1, "___", &["one"], &[]),
                question(2, "___", &["two"], &[]),
            ],
            &mut rng,
        );
        select_text(&mut engine, &mut rng, "one");
        engine.apply(Event::TimerExpired { index: 0 }, &mut rng);
        // Question 1 expires untouched.
        let Effect::Finalize(outcome) = engine.apply(Event::TimerExpired { index: 1 }, &mut rng)
        else {
            panic!("expected finalization");
        };

        assert_eq!(outcome.score, 1);
        assert_eq!(outcome.total_questions, 2);
        assert_eq!(outcome.answers[1].user_answers, Vec::<String>::new());
        assert!(!outcome.answers[1].is_correct);
        assert_eq!(outcome.percentage(), 50);
    }

    #[test]
    fn corrupt_answer_key_scores_incorrect_without_panicking() {
        let mut rng = rng();
        // Two blanks but a single-entry key: unanswerable as authored.
        let mut broken = question(1, "___ and ___", &["Red"], &[]);
        broken.correct_answers = vec!["Red".to_owned()];
        let mut engine = AttemptEngine::new(vec![broken], &mut rng);
        engine.slots[0] = vec!["Red".to_owned()];

        let Effect::Finalize(outcome) = engine.apply(Event::Advance, &mut rng) else {
            panic!("expected finalization");
        };
        assert!(!outcome.answers[0].is_correct);
        assert_eq!(outcome.score, 0);
    }
}
