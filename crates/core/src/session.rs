use crate::error::QuizError;
use crate::models::Question;
use crate::navigator::QuestionBankNavigator;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
    Correct,
    Incorrect { expected: String },
}

impl AnswerOutcome {
    pub fn is_correct(&self) -> bool {
        matches!(self, Self::Correct)
    }
}

/// One user's run through a generated quiz.
#[derive(Debug, Clone)]
pub struct QuizSession {
    topic: String,
    navigator: QuestionBankNavigator,
    answers: BTreeMap<usize, AnswerOutcome>,
}

impl QuizSession {
    pub fn new(topic: impl Into<String>, questions: Vec<Question>) -> Result<Self, QuizError> {
        Ok(Self {
            topic: topic.into(),
            navigator: QuestionBankNavigator::new(questions)?,
            answers: BTreeMap::new(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn navigator(&self) -> &QuestionBankNavigator {
        &self.navigator
    }

    pub fn current_question(&self) -> &Question {
        self.navigator.current_question()
    }

    pub fn cursor(&self) -> usize {
        self.navigator.cursor()
    }

    pub fn advance(&mut self, direction: i64) -> usize {
        self.navigator.advance(direction)
    }

    /// Grades `response` against the current question. A later answer to
    /// the same question replaces the earlier one.
    pub fn submit_answer(&mut self, response: &str) -> AnswerOutcome {
        let question = self.navigator.current_question();
        let outcome = if question.is_correct(response) {
            AnswerOutcome::Correct
        } else {
            AnswerOutcome::Incorrect {
                expected: question
                    .correct_choice()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| question.answer.clone()),
            }
        };

        self.answers.insert(self.navigator.cursor(), outcome.clone());
        outcome
    }

    pub fn answer_for(&self, index: usize) -> Option<&AnswerOutcome> {
        self.answers.get(&index)
    }

    /// Returns `(correct, answered)`.
    pub fn score(&self) -> (usize, usize) {
        let correct = self
            .answers
            .values()
            .filter(|outcome| outcome.is_correct())
            .count();
        (correct, self.answers.len())
    }

    pub fn is_complete(&self) -> bool {
        self.answers.len() == self.navigator.total_questions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Choice;

    fn questions() -> Vec<Question> {
        vec![
            Question {
                question: "2 + 2?".to_string(),
                choices: vec![Choice::new("A", "3"), Choice::new("B", "4")],
                answer: "B".to_string(),
                explanation: None,
            },
            Question {
                question: "Capital of France?".to_string(),
                choices: vec![Choice::new("A", "Paris"), Choice::new("B", "Rome")],
                answer: "A".to_string(),
                explanation: Some("Paris is the capital.".to_string()),
            },
        ]
    }

    #[test]
    fn empty_session_is_invalid() {
        assert!(matches!(
            QuizSession::new("math", Vec::new()),
            Err(QuizError::InvalidState(_))
        ));
    }

    #[test]
    fn grading_tracks_latest_answer_per_question() {
        let mut session = QuizSession::new("math", questions()).expect("bank is non-empty");

        let outcome = session.submit_answer("A");
        assert_eq!(
            outcome,
            AnswerOutcome::Incorrect {
                expected: "B) 4".to_string()
            }
        );
        assert_eq!(session.score(), (0, 1));

        assert!(session.submit_answer("B) 4").is_correct());
        assert_eq!(session.score(), (1, 1));
        assert!(!session.is_complete());

        session.advance(1);
        assert!(session.submit_answer("a").is_correct());
        assert_eq!(session.score(), (2, 2));
        assert!(session.is_complete());
        assert_eq!(session.answer_for(1), Some(&AnswerOutcome::Correct));
    }

    #[test]
    fn navigation_wraps_within_session() {
        let mut session = QuizSession::new("math", questions()).expect("bank is non-empty");
        assert_eq!(session.advance(-1), 1);
        assert_eq!(session.current_question().question, "Capital of France?");
        assert_eq!(session.advance(3), 0);
    }
}
