use crate::error::QuizError;
use crate::models::Question;

/// Cyclic cursor over a fixed, non-empty question bank.
///
/// Indices and steps wrap around the bank in both directions, so any
/// `i64` is a valid argument and the cursor is always in `[0, len)`.
#[derive(Debug, Clone)]
pub struct QuestionBankNavigator {
    questions: Vec<Question>,
    cursor: usize,
}

impl QuestionBankNavigator {
    pub fn new(questions: Vec<Question>) -> Result<Self, QuizError> {
        if questions.is_empty() {
            return Err(QuizError::InvalidState(
                "question bank is empty".to_string(),
            ));
        }

        Ok(Self {
            questions,
            cursor: 0,
        })
    }

    pub fn get_question_at_index(&self, index: i64) -> &Question {
        &self.questions[self.wrap(index)]
    }

    /// Moves the cursor by `direction` steps (negative steps go back) and
    /// returns the new position.
    pub fn advance(&mut self, direction: i64) -> usize {
        let step = self.wrap(direction);
        self.cursor = (self.cursor + step) % self.questions.len();
        self.cursor
    }

    pub fn next(&mut self) -> usize {
        self.advance(1)
    }

    pub fn previous(&mut self) -> usize {
        self.advance(-1)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current_question(&self) -> &Question {
        &self.questions[self.cursor]
    }

    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    fn wrap(&self, index: i64) -> usize {
        // Bank length always fits: a Vec cannot hold more than isize::MAX items.
        let len = self.questions.len() as i128;
        (i128::from(index).rem_euclid(len)) as usize
    }
}
