// src/core/template.rs

use std::sync::OnceLock;

use regex::Regex;

/// Upper bound on blanks per question. The answer form and the word bank
/// both size themselves from this.
pub const MAX_BLANKS: usize = 5;

/// A validated, storage-ready question.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuestion {
    pub text: String,
    pub correct_answers: Vec<String>,
    pub distractors: Vec<String>,
    pub blank_count: usize,
}

/// Raw authoring input, one per question in the teacher's form.
#[derive(Debug, Clone)]
pub struct QuestionInput {
    pub text: String,
    pub correct_answers: Vec<String>,
    pub distractors: Vec<String>,
}

/// Authoring validation failures. Messages are surfaced verbatim to the
/// authoring client, so they name the offending question (1-based).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("question {question} has no text")]
    EmptyText { question: usize },

    #[error("question {question} must contain at least one blank (___)")]
    NoBlanks { question: usize },

    #[error("question {question} has too many blanks ({count}, maximum is 5)")]
    TooManyBlanks { question: usize, count: usize },

    #[error("question {question} has {blanks} blanks but {answers} answers")]
    AnswerCountMismatch {
        question: usize,
        blanks: usize,
        answers: usize,
    },

    #[error("question {question} is missing correct answer {position}")]
    EmptyAnswer { question: usize, position: usize },
}

fn blank_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"_{3,}").expect("blank marker regex"))
}

/// Counts blank markers in a question text. A blank is a maximal run of
/// three or more underscores; `___`, `____` and longer all count as one.
pub fn blank_count(text: &str) -> usize {
    blank_marker().find_iter(text).count()
}

/// Splits a question text on its blank markers. Clients interleave the
/// returned segments with answer slots (segments.len() == blanks + 1).
pub fn split_segments(text: &str) -> Vec<String> {
    blank_marker().split(text).map(str::to_owned).collect()
}

/// Validates and compiles a single question. `index` is the 0-based
/// position in the authoring form, used only for error messages.
pub fn compile_question(
    index: usize,
    input: &QuestionInput,
) -> Result<CompiledQuestion, ValidationError> {
    let question = index + 1;

    let text = input.text.trim();
    if text.is_empty() {
        return Err(ValidationError::EmptyText { question });
    }

    let blanks = blank_count(text);
    if blanks == 0 {
        return Err(ValidationError::NoBlanks { question });
    }
    if blanks > MAX_BLANKS {
        return Err(ValidationError::TooManyBlanks {
            question,
            count: blanks,
        });
    }
    if input.correct_answers.len() != blanks {
        return Err(ValidationError::AnswerCountMismatch {
            question,
            blanks,
            answers: input.correct_answers.len(),
        });
    }

    let mut correct_answers = Vec::with_capacity(blanks);
    for (i, answer) in input.correct_answers.iter().enumerate() {
        let trimmed = answer.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyAnswer {
                question,
                position: i + 1,
            });
        }
        correct_answers.push(trimmed.to_owned());
    }

    // Empty distractors are dropped silently rather than rejected.
    let distractors = input
        .distractors
        .iter()
        .map(|d| d.trim())
        .filter(|d| !d.is_empty())
        .map(str::to_owned)
        .collect();

    Ok(CompiledQuestion {
        text: text.to_owned(),
        correct_answers,
        distractors,
        blank_count: blanks,
    })
}

/// Validates a whole authoring batch. All-or-nothing: the first violation
/// aborts and nothing is considered persistable.
pub fn compile_questions(
    inputs: &[QuestionInput],
) -> Result<Vec<CompiledQuestion>, ValidationError> {
    inputs
        .iter()
        .enumerate()
        .map(|(i, input)| compile_question(i, input))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(text: &str, answers: &[&str], distractors: &[&str]) -> QuestionInput {
        QuestionInput {
            text: text.to_owned(),
            correct_answers: answers.iter().map(|s| s.to_string()).collect(),
            distractors: distractors.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn counts_maximal_underscore_runs() {
        assert_eq!(blank_count("The capital of Brazil is ___."), 1);
        assert_eq!(blank_count("___ and ___ are primary colors."), 2);
        // Longer runs are still a single blank, not one per character.
        assert_eq!(blank_count("a ____ b _____ c"), 2);
        // Fewer than three underscores is not a marker.
        assert_eq!(blank_count("a __ b _ c"), 0);
        assert_eq!(blank_count(""), 0);
    }

    #[test]
    fn segments_interleave_with_blanks() {
        let segments = split_segments("___ and ___ are primary colors.");
        assert_eq!(segments, vec!["", " and ", " are primary colors."]);
    }

    #[test]
    fn accepts_well_formed_question() {
        let compiled = compile_question(
            0,
            &input("The capital of Brazil is ___.", &["Brasília"], &["Lima", ""]),
        )
        .unwrap();
        assert_eq!(compiled.blank_count, 1);
        assert_eq!(compiled.correct_answers, vec!["Brasília"]);
        // The empty distractor is dropped, not rejected.
        assert_eq!(compiled.distractors, vec!["Lima"]);
    }

    #[test]
    fn rejects_empty_text() {
        let err = compile_question(2, &input("   ", &[], &[])).unwrap_err();
        assert_eq!(err, ValidationError::EmptyText { question: 3 });
    }

    #[test]
    fn rejects_text_without_blanks() {
        let err = compile_question(0, &input("no gaps here", &["x"], &[])).unwrap_err();
        assert_eq!(err, ValidationError::NoBlanks { question: 1 });
    }

    #[test]
    fn rejects_more_than_five_blanks() {
        let err = compile_question(
            0,
            &input(
                "___ ___ ___ ___ ___ ___",
                &["a", "b", "c", "d", "e", "f"],
                &[],
            ),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::TooManyBlanks {
                question: 1,
                count: 6
            }
        );
    }

    #[test]
    fn rejects_answer_count_mismatch() {
        let err = compile_question(
            0,
            &input("___ and ___ are primary colors.", &["Red"], &[]),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::AnswerCountMismatch {
                question: 1,
                blanks: 2,
                answers: 1
            }
        );
    }

    #[test]
    fn rejects_blank_answer() {
        let err =
            compile_question(0, &input("___ and ___", &["Red", "   "], &[])).unwrap_err();
        assert_eq!(
            err,
            ValidationError::EmptyAnswer {
                question: 1,
                position: 2
            }
        );
    }

    #[test]
    fn batch_compilation_is_all_or_nothing() {
        let inputs = vec![
            input("The capital of Brazil is ___.", &["Brasília"], &[]),
            input("no blanks", &[], &[]),
        ];
        assert_eq!(
            compile_questions(&inputs).unwrap_err(),
            ValidationError::NoBlanks { question: 2 }
        );
    }
}
