//! Duel challenges and solo-trial exercises.
//!
//! None of these are cached: a player rematching the same card should get a
//! fresh puzzle, not the one they just memorized.

use async_openai::{types::CreateChatCompletionRequest, Client};
use async_trait::async_trait;
use lazy_static::lazy_static;
use log::trace;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{
    function_tool, function_tool_choice, system_message, tool_call_response,
    user_message, CHAT_MODEL,
};
use crate::{
    ai::{AiRequest, AiRequestStatic},
    cards::{Card, SkillLevel},
    services::{ImplementationChallenge, SyntaxExercise, UseCaseQuiz},
    ui::ProgressConfig,
    Result,
};

const TRICKSTER: &str = "You are a trickster duelist who tests programmers \
                         with small, precise code puzzles. Your snippets are \
                         real, runnable-looking code; your explanations are \
                         smug but technically exact.";

lazy_static! {
    static ref SYNTAX_EXERCISE_SCHEMA: serde_json::Value = json!({
        "type": "object",
        "properties": {
            "snippet": {
                "type": "string",
                "description": "Code using the function, with the key call obfuscated as ___(____, ...)."
            },
            "blank_answer": {
                "type": "string",
                "description": "The exact literal that fills the blank."
            },
            "explanation": { "type": "string" }
        },
        "required": ["snippet", "blank_answer", "explanation"]
    });

    static ref IMPLEMENTATION_CHALLENGE_SCHEMA: serde_json::Value = json!({
        "type": "object",
        "properties": {
            "snippet": {
                "type": "string",
                "description": "A small problem whose solution needs the target function, with the key call obfuscated."
            },
            "target_function": {
                "type": "string",
                "description": "The name of the card that solves the problem."
            },
            "blank_answer": {
                "type": "string",
                "description": "The exact literal that fills the blank."
            },
            "explanation": { "type": "string" }
        },
        "required": ["snippet", "target_function", "blank_answer", "explanation"]
    });

    static ref USE_CASE_QUIZ_SCHEMA: serde_json::Value = json!({
        "type": "object",
        "properties": {
            "question": { "type": "string" },
            "options": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Exactly four options."
            },
            "correct_index": {
                "type": "integer",
                "description": "Index of the correct option, 0 to 3."
            },
            "explanation": { "type": "string" }
        },
        "required": ["question", "options", "correct_index", "explanation"]
    });
}

fn card_blurb(card: &Card) -> String {
    match &card.language {
        Some(language) => format!("{} ({} {})", card.name, language, card.kind),
        None => format!("{} ({})", card.name, card.kind),
    }
}

/// A fill-in-the-blank exercise about one card.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct SyntaxExerciseRequest {
    pub(crate) card: Card,
    pub(crate) language: Option<String>,
}

#[async_trait]
impl AiRequest for SyntaxExerciseRequest {
    type Response = SyntaxExercise;

    async fn perform(&self, _error_history: &[anyhow::Error]) -> Result<Self::Response> {
        let client = Client::new();
        let language = self
            .language
            .as_deref()
            .or(self.card.language.as_deref())
            .unwrap_or("pseudocode");
        let prompt = format!(
            "Write a short {language} snippet that uses {blurb}, then \
             obfuscate the key call as `___(____, ...)`. The blank answer is \
             the exact call the blank replaces. Effect for reference: \
             {effect:?}.\n\nCall `report_exercise` with the puzzle.",
            language = language,
            blurb = card_blurb(&self.card),
            effect = self.card.description.effect,
        );
        let req = CreateChatCompletionRequest {
            model: CHAT_MODEL.to_owned(),
            messages: vec![system_message(TRICKSTER), user_message(prompt)],
            tools: Some(vec![function_tool(
                "report_exercise",
                "Report the syntax exercise.",
                &SYNTAX_EXERCISE_SCHEMA,
            )]),
            tool_choice: Some(function_tool_choice("report_exercise")),
            ..Default::default()
        };
        trace!("OpenAI request (full): {:?}", req);
        let resp = client.chat().create(req).await?;
        trace!("OpenAI response (full): {:?}", resp);
        tool_call_response::<SyntaxExercise>(&resp, "report_exercise")
    }
}

impl AiRequestStatic for SyntaxExerciseRequest {
    fn progress_config() -> &'static ProgressConfig<'static> {
        &ProgressConfig {
            emoji: "⚔️",
            msg: "Preparing a challenge",
            done_msg: "Prepared a challenge",
        }
    }

    fn cache_name() -> &'static str {
        "oai_syntax_exercise_v1"
    }

    fn cache_size() -> u64 {
        0
    }
}

/// A which-function-solves-this challenge for one card.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct ImplementationChallengeRequest {
    pub(crate) card: Card,
    pub(crate) skill: SkillLevel,
}

#[async_trait]
impl AiRequest for ImplementationChallengeRequest {
    type Response = ImplementationChallenge;

    async fn perform(&self, _error_history: &[anyhow::Error]) -> Result<Self::Response> {
        let client = Client::new();
        let prompt = format!(
            "Pose a {skill}-level problem whose idiomatic solution needs \
             {blurb}. Show the solution code with the key call obfuscated as \
             `___(____, ...)`, and do not name the function anywhere in the \
             snippet; identifying it is the point. Set `target_function` to \
             {name:?}.\n\nCall `report_challenge` with the puzzle.",
            skill = self.skill,
            blurb = card_blurb(&self.card),
            name = self.card.name,
        );
        let req = CreateChatCompletionRequest {
            model: CHAT_MODEL.to_owned(),
            messages: vec![system_message(TRICKSTER), user_message(prompt)],
            tools: Some(vec![function_tool(
                "report_challenge",
                "Report the implementation challenge.",
                &IMPLEMENTATION_CHALLENGE_SCHEMA,
            )]),
            tool_choice: Some(function_tool_choice("report_challenge")),
            ..Default::default()
        };
        trace!("OpenAI request (full): {:?}", req);
        let resp = client.chat().create(req).await?;
        trace!("OpenAI response (full): {:?}", resp);
        tool_call_response::<ImplementationChallenge>(&resp, "report_challenge")
    }
}

impl AiRequestStatic for ImplementationChallengeRequest {
    fn progress_config() -> &'static ProgressConfig<'static> {
        &ProgressConfig {
            emoji: "⚔️",
            msg: "Preparing a challenge",
            done_msg: "Prepared a challenge",
        }
    }

    fn cache_name() -> &'static str {
        "oai_impl_challenge_v1"
    }

    fn cache_size() -> u64 {
        0
    }
}

/// A multiple-choice quiz about when to use one card.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct UseCaseQuizRequest {
    pub(crate) card: Card,
}

#[async_trait]
impl AiRequest for UseCaseQuizRequest {
    type Response = UseCaseQuiz;

    async fn perform(&self, _error_history: &[anyhow::Error]) -> Result<Self::Response> {
        let client = Client::new();
        let prompt = format!(
            "Write a multiple-choice question about when a programmer should \
             reach for {blurb}. Give four options, exactly one correct, the \
             wrong ones plausible. Effect for reference: {effect:?}.\n\n\
             Call `report_quiz` with the question.",
            blurb = card_blurb(&self.card),
            effect = self.card.description.effect,
        );
        let req = CreateChatCompletionRequest {
            model: CHAT_MODEL.to_owned(),
            messages: vec![system_message(TRICKSTER), user_message(prompt)],
            tools: Some(vec![function_tool(
                "report_quiz",
                "Report the use-case quiz.",
                &USE_CASE_QUIZ_SCHEMA,
            )]),
            tool_choice: Some(function_tool_choice("report_quiz")),
            ..Default::default()
        };
        trace!("OpenAI request (full): {:?}", req);
        let resp = client.chat().create(req).await?;
        trace!("OpenAI response (full): {:?}", resp);
        tool_call_response::<UseCaseQuiz>(&resp, "report_quiz")
    }
}

impl AiRequestStatic for UseCaseQuizRequest {
    fn progress_config() -> &'static ProgressConfig<'static> {
        &ProgressConfig {
            emoji: "❓",
            msg: "Preparing a quiz",
            done_msg: "Prepared a quiz",
        }
    }

    fn cache_name() -> &'static str {
        "oai_use_case_quiz_v1"
    }

    fn cache_size() -> u64 {
        0
    }
}
