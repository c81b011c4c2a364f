//! Interfaces to generative AI services.
//!
//! Everything that talks to a model goes through [`ContentBackend`], so the
//! queue, search and duel logic never know which vendor is on the other end.
//! The OpenAI implementation lives in [`oai`]; tests use the scripted fake in
//! [`testing`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    cards::{Card, SkillLevel, Tier},
    errors::{CredentialError, API_KEY_VAR},
    session::Subject,
    trial::{ChatMessage, ExerciseContext},
    Result,
};

pub mod oai;

/// What the backend thinks of a search topic.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TopicAnalysis {
    /// Did the backend recognize this as a real library or topic?
    pub is_valid: bool,
    /// Why the topic was rejected, when it was.
    pub reason: Option<String>,
    /// The canonical name of the library, with typos fixed.
    pub refined_name: String,
    /// The canonical language name, if one applies.
    pub refined_language: Option<String>,
}

/// A catalogue item the user picked for card generation, with the tier we
/// want the backend to honor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CataloguePick {
    /// The function or concept name.
    pub name: String,
    /// The tier to generate the card at.
    pub tier: Tier,
}

/// A fill-in-the-blank syntax puzzle.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyntaxExercise {
    /// Code with the key call obfuscated as `___(____, ...)`.
    pub snippet: String,
    /// The exact literal that fills the blank.
    pub blank_answer: String,
    /// The reveal, in trickster voice.
    pub explanation: String,
}

/// A harder puzzle where the player must first identify which card's
/// function solves the problem, then fill in the call.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImplementationChallenge {
    /// Code with the key call obfuscated.
    pub snippet: String,
    /// The name of the card that must be played to answer.
    pub target_function: String,
    /// The exact literal that fills the blank.
    pub blank_answer: String,
    /// Explanation of the solution.
    pub explanation: String,
}

/// A multiple-choice question about when to use a function.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UseCaseQuiz {
    /// The question text.
    pub question: String,
    /// Four options, one of them right.
    pub options: Vec<String>,
    /// Index of the correct option.
    pub correct_index: usize,
    /// Why the correct option is correct.
    pub explanation: String,
}

/// Fail with [`CredentialError::Missing`] unless an API key is configured.
pub fn require_credential(backend: &dyn ContentBackend) -> Result<()> {
    if backend.credential_present() {
        Ok(())
    } else {
        Err(CredentialError::Missing.into())
    }
}

/// The generative backend every other component calls through.
///
/// All card-producing operations return validated [`Card`] values; raw model
/// output never escapes an implementation.
#[async_trait]
pub trait ContentBackend: Send + Sync {
    /// Is a credential configured? No other method should be called when
    /// this returns false.
    fn credential_present(&self) -> bool {
        std::env::var(API_KEY_VAR).map(|k| !k.is_empty()).unwrap_or(false)
    }

    /// Vet a search topic before spending real requests on it.
    async fn analyze_topic(&self, query: &str, language: &str) -> Result<TopicAnalysis>;

    /// List the enumerable items for a subject: functions for a library,
    /// concepts for a creative theme. Sorted by name.
    async fn list_catalogue(&self, subject: &Subject) -> Result<Vec<String>>;

    /// Classify every catalogue item into a tier, in one batched call.
    async fn classify_tiers(
        &self,
        subject: &Subject,
        items: &[String],
    ) -> Result<BTreeMap<String, Tier>>;

    /// Generate `count` ready-made cards for immediate display.
    async fn presentation_cards(&self, subject: &Subject, count: usize) -> Result<Vec<Card>>;

    /// Generate cards for specific catalogue picks.
    async fn cards_for_selection(
        &self,
        subject: &Subject,
        picks: &[CataloguePick],
    ) -> Result<Vec<Card>>;

    /// Generate the 11 peer cards that join `base` in a duel mini-deck.
    async fn duel_deck(&self, base: &Card, subject: &Subject) -> Result<Vec<Card>>;

    /// Generate card art for a prompt, returned as a data URL.
    async fn generate_art(&self, prompt: &str) -> Result<String>;

    /// Drop any cached art for a prompt so the next request regenerates it.
    async fn invalidate_art(&self, prompt: &str) -> Result<()>;

    /// Drop all cached art. Returns the number of entries removed.
    async fn clear_art(&self) -> Result<u64>;

    /// A syntax exercise for a card (beginner duels and solo rituals).
    async fn syntax_exercise(
        &self,
        card: &Card,
        language: Option<&str>,
    ) -> Result<SyntaxExercise>;

    /// An implementation challenge for a card (intermediate/advanced duels).
    async fn implementation_challenge(
        &self,
        card: &Card,
        skill: SkillLevel,
    ) -> Result<ImplementationChallenge>;

    /// A use-case quiz for a card (solo trials).
    async fn use_case_quiz(&self, card: &Card) -> Result<UseCaseQuiz>;

    /// Ask the tutor a follow-up question about a finished exercise.
    async fn follow_up(
        &self,
        context: &ExerciseContext,
        history: &[ChatMessage],
    ) -> Result<String>;
}
