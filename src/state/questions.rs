use std::time::Duration;

/// A multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub text: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    /// Time players have to answer once the question opens.
    pub duration: Duration,
}

/// Source of the ordered question sequence played in every room.
pub trait QuestionSource: Send + Sync {
    /// Number of questions in the sequence.
    fn len(&self) -> usize;

    /// Question at `index`, if any.
    fn question(&self, index: usize) -> Option<&Question>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fixed, in-memory question list loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticQuestions {
    questions: Vec<Question>,
}

impl StaticQuestions {
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }
}

impl QuestionSource for StaticQuestions {
    fn len(&self) -> usize {
        self.questions.len()
    }

    fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }
}
