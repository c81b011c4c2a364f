//! The post-exercise tutor chat.

use async_openai::{types::CreateChatCompletionRequest, Client};
use async_trait::async_trait;
use anyhow::anyhow;
use log::trace;
use serde::{Deserialize, Serialize};

use super::{system_message, user_message, CHAT_MODEL};
use crate::{
    ai::{AiRequest, AiRequestStatic},
    trial::{ChatMessage, ChatRole, ExerciseContext},
    ui::ProgressConfig,
    Result,
};

/// A request for the tutor's next reply.
///
/// The whole history rides along in every request; conversations are short
/// and the tutor is stateless on our side. Never cached, since the same
/// question deserves a fresh answer in a new conversation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct FollowUpRequest {
    pub(crate) context: ExerciseContext,
    pub(crate) history: Vec<ChatMessage>,
}

#[async_trait]
impl AiRequest for FollowUpRequest {
    type Response = String;

    async fn perform(&self, _error_history: &[anyhow::Error]) -> Result<Self::Response> {
        let client = Client::new();
        let system = format!(
            "You are a trickster tutor discussing a {kind} exercise the player \
             just finished, about {card}. The snippet was:\n{snippet}\n\nThe \
             correct answer was {answer:?}, explained as: {explanation}\n\
             The player answered {user_answer:?}, which was {verdict}.\n\n\
             Answer follow-up questions honestly and concisely, in character.",
            kind = self.context.kind,
            card = self.context.card_name,
            snippet = self.context.snippet,
            answer = self.context.answer,
            explanation = self.context.explanation,
            user_answer = self.context.user_answer,
            verdict = if self.context.correct {
                "correct"
            } else {
                "incorrect"
            },
        );
        let mut messages = vec![system_message(&system)];
        for line in &self.history {
            match line.role {
                ChatRole::User => messages.push(user_message(line.text.clone())),
                // Replaying tutor lines as quoted user turns keeps the
                // request to two message shapes; short chats don't need more.
                ChatRole::Tutor => {
                    messages.push(user_message(format!("[You said]: {}", line.text)))
                }
            }
        }
        let req = CreateChatCompletionRequest {
            model: CHAT_MODEL.to_owned(),
            messages,
            ..Default::default()
        };
        trace!("OpenAI request (full): {:?}", req);
        let resp = client.chat().create(req).await?;
        trace!("OpenAI response (full): {:?}", resp);
        let choice = resp
            .choices
            .get(0)
            .ok_or_else(|| anyhow!("OpenAI did not return a reply"))?;
        choice
            .message
            .content
            .clone()
            .ok_or_else(|| anyhow!("OpenAI returned an empty reply"))
    }
}

impl AiRequestStatic for FollowUpRequest {
    fn progress_config() -> &'static ProgressConfig<'static> {
        &ProgressConfig {
            emoji: "💬",
            msg: "Consulting the tutor",
            done_msg: "Consulted the tutor",
        }
    }

    fn cache_name() -> &'static str {
        "oai_follow_up_v1"
    }

    fn cache_size() -> u64 {
        0
    }
}
