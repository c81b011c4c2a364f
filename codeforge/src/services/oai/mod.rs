//! OpenAI client.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context};
use async_openai::types::{
    ChatCompletionNamedToolChoice, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, ChatCompletionTool,
    ChatCompletionToolChoiceOption, ChatCompletionToolType,
    CreateChatCompletionResponse, FunctionName, FunctionObject, Role,
};
use async_trait::async_trait;
use log::debug;

use crate::{
    ai::AiRequestStatic,
    cards::{clean_cards, Card, SkillLevel, Tier},
    services::{
        ContentBackend, ImplementationChallenge, SyntaxExercise, TopicAnalysis,
        UseCaseQuiz,
    },
    session::Subject,
    trial::{ChatMessage, ExerciseContext},
    ui::Ui,
    Result,
};

mod analyze;
mod cards;
mod catalogue;
mod challenge;
mod chat;
mod image;
mod tiers;

/// The chat model every text request uses.
const CHAT_MODEL: &str = "gpt-4o-mini";

/// The shared lore every card-producing prompt opens with. Keeping this in
/// one place keeps the four regions and their clans consistent across
/// separately generated batches.
const WORLD_LORE: &str = "\
You are the Keeper of the Card Forge, a trickster archivist who turns \
programming constructs into collectible trading cards. The world has four \
great regions, one per card attribute: STRUCTURE (state, classes and \
modules), EFFECT (side effects, events and asynchronous magic), UTILITY \
(pure helpers and transformations) and RENDER (output and display). Each \
region is divided into named clans, and every card belongs to one. Card \
text is written in dramatic fantasy register, but the technical facts \
(parameters, return values, behavior) must stay accurate.";

/// The OpenAI implementation of [`ContentBackend`].
///
/// Each operation is its own request type under this module, with its own
/// cache namespace and progress labels.
pub struct OpenAiBackend {
    ui: Ui,
}

impl OpenAiBackend {
    /// Create a backend that reports progress through `ui`.
    pub fn new(ui: Ui) -> OpenAiBackend {
        OpenAiBackend { ui }
    }
}

/// Perform a one-request batch and return its single response.
async fn single<R: AiRequestStatic>(ui: &Ui, request: R) -> Result<R::Response> {
    let mut responses = R::perform_requests(ui, vec![request]).await?;
    responses
        .pop()
        .ok_or_else(|| anyhow!("OpenAI returned no response"))
}

#[async_trait]
impl ContentBackend for OpenAiBackend {
    async fn analyze_topic(&self, query: &str, language: &str) -> Result<TopicAnalysis> {
        single(
            &self.ui,
            analyze::TopicAnalysisRequest {
                query: query.to_owned(),
                language: language.to_owned(),
            },
        )
        .await
    }

    async fn list_catalogue(&self, subject: &Subject) -> Result<Vec<String>> {
        let mut items = single(
            &self.ui,
            catalogue::CatalogueRequest {
                subject: subject.clone(),
            },
        )
        .await?;
        items.retain(|name| !name.trim().is_empty());
        items.sort();
        items.dedup();
        Ok(items)
    }

    async fn classify_tiers(
        &self,
        subject: &Subject,
        items: &[String],
    ) -> Result<BTreeMap<String, Tier>> {
        let assignments = single(
            &self.ui,
            tiers::TierRequest {
                subject: subject.clone(),
                items: items.to_vec(),
            },
        )
        .await?;
        let mut map = BTreeMap::new();
        for assignment in assignments {
            if let Ok(tier) = assignment.tier.parse::<Tier>() {
                map.insert(assignment.name, tier);
            }
        }
        // Anything the model forgot lands in the middle tier.
        for item in items {
            map.entry(item.clone()).or_insert(Tier::Situational);
        }
        Ok(map)
    }

    async fn presentation_cards(&self, subject: &Subject, count: usize) -> Result<Vec<Card>> {
        let raw = single(
            &self.ui,
            cards::CardBatchRequest::presentation(subject, count),
        )
        .await?;
        let mut cards = clean_cards(raw);
        cards.truncate(count);
        Ok(cards)
    }

    async fn cards_for_selection(
        &self,
        subject: &Subject,
        picks: &[crate::services::CataloguePick],
    ) -> Result<Vec<Card>> {
        let raw = single(
            &self.ui,
            cards::CardBatchRequest::selection(subject, picks),
        )
        .await?;
        Ok(clean_cards(raw))
    }

    async fn duel_deck(&self, base: &Card, subject: &Subject) -> Result<Vec<Card>> {
        let raw = single(&self.ui, cards::CardBatchRequest::duel_peers(base, subject))
            .await?;
        Ok(clean_cards(raw))
    }

    async fn generate_art(&self, prompt: &str) -> Result<String> {
        single(
            &self.ui,
            image::ArtRequest {
                prompt: prompt.to_owned(),
            },
        )
        .await
    }

    async fn invalidate_art(&self, prompt: &str) -> Result<()> {
        image::ArtRequest::open_cache()?.remove(&image::ArtRequest {
            prompt: prompt.to_owned(),
        })
    }

    async fn clear_art(&self) -> Result<u64> {
        image::ArtRequest::open_cache()?.clear()
    }

    async fn syntax_exercise(
        &self,
        card: &Card,
        language: Option<&str>,
    ) -> Result<SyntaxExercise> {
        single(
            &self.ui,
            challenge::SyntaxExerciseRequest {
                card: card.clone(),
                language: language.map(str::to_owned),
            },
        )
        .await
    }

    async fn implementation_challenge(
        &self,
        card: &Card,
        skill: SkillLevel,
    ) -> Result<ImplementationChallenge> {
        single(
            &self.ui,
            challenge::ImplementationChallengeRequest {
                card: card.clone(),
                skill,
            },
        )
        .await
    }

    async fn use_case_quiz(&self, card: &Card) -> Result<UseCaseQuiz> {
        single(&self.ui, challenge::UseCaseQuizRequest { card: card.clone() }).await
    }

    async fn follow_up(
        &self,
        context: &ExerciseContext,
        history: &[ChatMessage],
    ) -> Result<String> {
        single(
            &self.ui,
            chat::FollowUpRequest {
                context: context.clone(),
                history: history.to_vec(),
            },
        )
        .await
    }
}

/// Generate a system message.
fn system_message(content: &str) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
        role: Role::System,
        content: content.to_owned(),
        name: None,
    })
}

/// Generate a user message.
fn user_message<S: Into<String>>(content: S) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
        role: Role::User,
        content: ChatCompletionRequestUserMessageContent::Text(content.into()),
        name: None,
    })
}

/// Describe a "function" tool GPT can call.
fn function_tool(
    name: &str,
    description: &str,
    parameters: &serde_json::Value,
) -> ChatCompletionTool {
    ChatCompletionTool {
        r#type: ChatCompletionToolType::Function,
        function: FunctionObject {
            name: name.to_owned(),
            description: Some(description.to_owned()),
            parameters: Some(parameters.clone()),
        },
    }
}

/// Specify a "function" tool GPT should call.
fn function_tool_choice(name: &str) -> ChatCompletionToolChoiceOption {
    ChatCompletionToolChoiceOption::Named(ChatCompletionNamedToolChoice {
        r#type: ChatCompletionToolType::Function,
        function: FunctionName {
            name: name.to_owned(),
        },
    })
}

/// Extract a "tool call" from a chat response.
fn tool_call_response<T>(
    resp: &CreateChatCompletionResponse,
    expected_function: &str,
) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let choice = resp
        .choices
        .get(0)
        .ok_or_else(|| anyhow!("OpenAI did not return a response to our request"))?;
    let tool_calls = choice
        .message
        .tool_calls
        .as_ref()
        .ok_or_else(|| anyhow!("OpenAI did not return tool calls in its response"))?;
    let tool_call = tool_calls
        .get(0)
        .ok_or_else(|| anyhow!("OpenAI did not return a tool call in its response"))?;
    let f = &tool_call.function;
    if f.name != expected_function {
        return Err(anyhow!(
            "OpenAI returned a response, but it called the wrong function: {}",
            f.name
        ));
    }
    debug!("OpenAI called: {}({:?})", expected_function, f.arguments);
    serde_json::from_str::<T>(&f.arguments).context("Failed to parse OpenAI response")
}

/// Describe a subject for a prompt.
fn subject_blurb(subject: &Subject) -> String {
    match &subject.language {
        Some(language) => format!("the {} library for {}", subject.name, language),
        None => format!("the theme \"{}\"", subject.name),
    }
}
