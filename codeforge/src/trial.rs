//! Solo trials: single-card exercises outside the duel arena.
//!
//! A trial poses either a use-case quiz or a syntax fill-in for one card,
//! grades the answer locally, and then opens a tutor chat about the solution.
//! Unlike duels there are no strikes and no timer; a wrong answer just shows
//! the correction.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    cards::Card,
    services::{ContentBackend, SyntaxExercise, UseCaseQuiz},
    Result,
};

/// Who said a chat line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// The player.
    User,
    /// The trickster tutor.
    Tutor,
}

/// One line of tutor chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who said it.
    pub role: ChatRole,
    /// What they said.
    pub text: String,
}

impl ChatMessage {
    /// A player line.
    pub fn user(text: &str) -> ChatMessage {
        ChatMessage {
            role: ChatRole::User,
            text: text.to_owned(),
        }
    }

    /// A tutor line.
    pub fn tutor(text: &str) -> ChatMessage {
        ChatMessage {
            role: ChatRole::Tutor,
            text: text.to_owned(),
        }
    }
}

/// The finished exercise a follow-up chat is about. The tutor needs the full
/// solution, and what the player actually answered, to talk about it
/// honestly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciseContext {
    /// What sort of exercise this was ("quiz", "syntax" or "duel").
    pub kind: String,
    /// The card the exercise was about.
    pub card_name: String,
    /// The question or code shown to the player, blanks and all.
    pub snippet: String,
    /// The correct answer.
    pub answer: String,
    /// The explanation already revealed to the player.
    pub explanation: String,
    /// What the player answered.
    pub user_answer: String,
    /// Whether the player's answer was right.
    pub correct: bool,
}

/// What a trial poses.
#[derive(Debug, Clone)]
pub enum TrialExercise {
    /// A multiple-choice use-case question.
    Quiz(UseCaseQuiz),
    /// A fill-in-the-blank syntax puzzle.
    Syntax(SyntaxExercise),
}

/// How a trial answer was graded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialOutcome {
    /// Was the answer right?
    pub correct: bool,
    /// What to tell the player.
    pub message: String,
}

/// A solo exercise for one card, graded locally.
pub struct Trial {
    backend: Arc<dyn ContentBackend>,
    card: Card,
    exercise: TrialExercise,
    /// Set once the answer is revealed; enables the tutor chat.
    context: Option<ExerciseContext>,
    history: Vec<ChatMessage>,
}

/// Compare a typed answer against the expected literal.
///
/// Solo trials are forgiving about surrounding whitespace but nothing else;
/// `use_state` does not pass for `useState`.
pub fn answers_match(expected: &str, guess: &str) -> bool {
    expected.trim().to_lowercase() == guess.trim().to_lowercase()
}

impl Trial {
    /// Pose a use-case quiz about `card`.
    pub async fn quiz(backend: Arc<dyn ContentBackend>, card: Card) -> Result<Trial> {
        let quiz = backend.use_case_quiz(&card).await?;
        Ok(Trial {
            backend,
            card,
            exercise: TrialExercise::Quiz(quiz),
            context: None,
            history: Vec::new(),
        })
    }

    /// Pose a syntax fill-in about `card`.
    pub async fn syntax(backend: Arc<dyn ContentBackend>, card: Card) -> Result<Trial> {
        let exercise = backend
            .syntax_exercise(&card, card.language.as_deref())
            .await?;
        Ok(Trial {
            backend,
            card,
            exercise: TrialExercise::Syntax(exercise),
            context: None,
            history: Vec::new(),
        })
    }

    /// The exercise being posed.
    pub fn exercise(&self) -> &TrialExercise {
        &self.exercise
    }

    /// The card under trial.
    pub fn card(&self) -> &Card {
        &self.card
    }

    /// Grade a quiz answer by option index.
    pub fn answer_quiz(&mut self, index: usize) -> TrialOutcome {
        let TrialExercise::Quiz(quiz) = &self.exercise else {
            return TrialOutcome {
                correct: false,
                message: "This trial is not a quiz.".to_owned(),
            };
        };
        let correct = index == quiz.correct_index;
        let message = if correct {
            format!("Correct! {}", quiz.explanation)
        } else {
            let right = quiz
                .options
                .get(quiz.correct_index)
                .map(String::as_str)
                .unwrap_or("(unknown)");
            format!(
                "Incorrect. The correct answer was: {}. {}",
                right, quiz.explanation
            )
        };
        self.context = Some(ExerciseContext {
            kind: "quiz".to_owned(),
            card_name: self.card.name.clone(),
            snippet: quiz.question.clone(),
            answer: quiz
                .options
                .get(quiz.correct_index)
                .cloned()
                .unwrap_or_default(),
            explanation: quiz.explanation.clone(),
            user_answer: quiz.options.get(index).cloned().unwrap_or_default(),
            correct,
        });
        TrialOutcome { correct, message }
    }

    /// Grade a typed syntax answer.
    pub fn answer_syntax(&mut self, guess: &str) -> TrialOutcome {
        let TrialExercise::Syntax(exercise) = &self.exercise else {
            return TrialOutcome {
                correct: false,
                message: "This trial is not a syntax puzzle.".to_owned(),
            };
        };
        let correct = answers_match(&exercise.blank_answer, guess);
        let message = if correct {
            format!("Correct! {}", exercise.explanation)
        } else {
            format!(
                "Incorrect. The correct answer was: {}. {}",
                exercise.blank_answer, exercise.explanation
            )
        };
        self.context = Some(ExerciseContext {
            kind: "syntax".to_owned(),
            card_name: self.card.name.clone(),
            snippet: exercise.snippet.clone(),
            answer: exercise.blank_answer.clone(),
            explanation: exercise.explanation.clone(),
            user_answer: guess.to_owned(),
            correct,
        });
        TrialOutcome { correct, message }
    }

    /// Ask the tutor a follow-up question about the revealed solution.
    /// Only available after an answer has been graded.
    pub async fn ask(&mut self, question: &str) -> Result<String> {
        let Some(context) = &self.context else {
            return Ok("Answer the trial first, then we can talk about it.".to_owned());
        };
        self.history.push(ChatMessage::user(question));
        let reply = self.backend.follow_up(context, &self.history).await?;
        self.history.push(ChatMessage::tutor(&reply));
        Ok(reply)
    }

    /// The chat so far.
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::ScriptedBackend;

    fn card() -> Card {
        crate::cards::RawCard {
            name: Some("useState".to_owned()),
            attribute: Some("EFFECT".to_owned()),
            image_prompt: Some("a phantom".to_owned()),
            language: Some("JavaScript".to_owned()),
            ..Default::default()
        }
        .clean()
        .unwrap()
    }

    #[test]
    fn answer_comparison_trims_and_lowercases() {
        assert!(answers_match("useState", "  usestate "));
        assert!(answers_match("strcpy(dest, src)", "STRCPY(dest, src)"));
        assert!(!answers_match("useState", "use_state"));
        // Interior whitespace matters in solo trials.
        assert!(!answers_match("strcpy(dest, src)", "strcpy(dest,src)"));
    }

    #[tokio::test]
    async fn quiz_grading_and_reveal() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.quizzes.lock().unwrap().push_back(UseCaseQuiz {
            question: "When do you reach for useState?".to_owned(),
            options: vec![
                "Routing".to_owned(),
                "Local component state".to_owned(),
                "Styling".to_owned(),
                "Data fetching".to_owned(),
            ],
            correct_index: 1,
            explanation: "It declares a state cell inside a component.".to_owned(),
        });
        let mut trial = Trial::quiz(backend, card()).await.unwrap();

        let outcome = trial.answer_quiz(3);
        assert!(!outcome.correct);
        assert_eq!(
            outcome.message,
            "Incorrect. The correct answer was: Local component state. It \
             declares a state cell inside a component."
        );
    }

    #[tokio::test]
    async fn syntax_grading_and_follow_up() {
        let backend = Arc::new(ScriptedBackend::new());
        backend
            .syntax_exercises
            .lock()
            .unwrap()
            .push_back(Ok(SyntaxExercise {
                snippet: "const [n, setN] = ___(0);".to_owned(),
                blank_answer: "useState".to_owned(),
                explanation: "The state hook, of course.".to_owned(),
            }));
        backend
            .follow_ups
            .lock()
            .unwrap()
            .push_back("Because hooks must run at the top level.".to_owned());
        let mut trial = Trial::syntax(backend, card()).await.unwrap();

        // Chat is locked until the answer is revealed.
        let reply = trial.ask("why?").await.unwrap();
        assert!(reply.contains("Answer the trial first"));
        assert!(trial.history().is_empty());

        let outcome = trial.answer_syntax(" USESTATE ");
        assert!(outcome.correct);
        assert_eq!(outcome.message, "Correct! The state hook, of course.");

        let reply = trial.ask("why at the top level?").await.unwrap();
        assert_eq!(reply, "Because hooks must run at the top level.");
        assert_eq!(trial.history().len(), 2);
        assert_eq!(trial.history()[0].role, ChatRole::User);
        assert_eq!(trial.history()[1].role, ChatRole::Tutor);
    }
}
