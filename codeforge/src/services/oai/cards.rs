//! Forging batches of cards.

use async_openai::{types::CreateChatCompletionRequest, Client};
use async_trait::async_trait;
use lazy_static::lazy_static;
use log::trace;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{
    function_tool, function_tool_choice, subject_blurb, system_message,
    tool_call_response, user_message, CHAT_MODEL, WORLD_LORE,
};
use crate::{
    ai::{AiRequest, AiRequestStatic},
    cards::{Card, RawCard},
    services::CataloguePick,
    session::Subject,
    ui::ProgressConfig,
    Result,
};

lazy_static! {
    /// A JSON Schema for the report_cards "function". This is the full card
    /// shape, minus the art fields we manage ourselves.
    static ref REPORT_CARDS_PARAMETERS_SCHEMA: serde_json::Value = json!({
        "type": "object",
        "properties": {
            "cards": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {
                            "type": "string",
                            "description": "The exact function or concept name."
                        },
                        "attribute": {
                            "type": "string",
                            "enum": ["STRUCTURE", "EFFECT", "UTILITY", "RENDER"]
                        },
                        "level": {
                            "type": "integer",
                            "description": "Complexity and power, 1 to 12."
                        },
                        "type": {
                            "type": "string",
                            "description": "The kind of construct, e.g. [Hook] or [Method]."
                        },
                        "card_category": {
                            "type": "string",
                            "description": "Lore category, e.g. Effect Monster or Spell Card."
                        },
                        "region": { "type": "string" },
                        "clan": { "type": "string" },
                        "description": {
                            "type": "object",
                            "properties": {
                                "effect": { "type": "string" },
                                "parameters": { "type": "string" },
                                "returns": { "type": "string" }
                            },
                            "required": ["effect", "parameters", "returns"]
                        },
                        "impact": {
                            "type": "integer",
                            "description": "Attack-style stat, 0 to 5000."
                        },
                        "ease_of_use": {
                            "type": "integer",
                            "description": "Defense-style stat, 0 to 5000."
                        },
                        "image_prompt": {
                            "type": "string",
                            "description": "A vivid art prompt for the card illustration, no text in the image."
                        },
                        "language": { "type": "string" },
                        "category": {
                            "type": "string",
                            "enum": ["Core", "Staple", "Situational", "Niche"]
                        }
                    },
                    "required": [
                        "name", "attribute", "level", "type", "description",
                        "impact", "ease_of_use", "image_prompt"
                    ]
                }
            }
        },
        "required": ["cards"]
    });
}

/// What a batch should contain.
#[derive(Debug, Clone, Deserialize, Serialize)]
enum BatchKind {
    /// `count` showcase cards chosen by the model.
    Presentation { count: usize },
    /// One card per named pick, at the named tier.
    Selection { picks: Vec<CataloguePick> },
    /// Companions for a duel mini-deck around `base_name`.
    DuelPeers { base_name: String, count: usize },
}

/// A request to forge one batch of cards.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct CardBatchRequest {
    subject: Subject,
    kind: BatchKind,
}

impl CardBatchRequest {
    /// The showcase batch a search deals immediately.
    pub(crate) fn presentation(subject: &Subject, count: usize) -> CardBatchRequest {
        CardBatchRequest {
            subject: subject.clone(),
            kind: BatchKind::Presentation { count },
        }
    }

    /// A batch for the player's catalogue picks.
    pub(crate) fn selection(subject: &Subject, picks: &[CataloguePick]) -> CardBatchRequest {
        CardBatchRequest {
            subject: subject.clone(),
            kind: BatchKind::Selection {
                picks: picks.to_vec(),
            },
        }
    }

    /// The 11 companions that join a card in the duel arena.
    pub(crate) fn duel_peers(base: &Card, subject: &Subject) -> CardBatchRequest {
        CardBatchRequest {
            subject: subject.clone(),
            kind: BatchKind::DuelPeers {
                base_name: base.name.clone(),
                count: 11,
            },
        }
    }

    fn expected_count(&self) -> usize {
        match &self.kind {
            BatchKind::Presentation { count } => *count,
            BatchKind::Selection { picks } => picks.len(),
            BatchKind::DuelPeers { count, .. } => *count,
        }
    }

    fn instructions(&self) -> String {
        let blurb = subject_blurb(&self.subject);
        match &self.kind {
            BatchKind::Presentation { count } => format!(
                "Forge {count} showcase cards for {blurb}: the items a \
                 newcomer should meet first, spread across the four regions.",
            ),
            BatchKind::Selection { picks } => {
                let lines = picks
                    .iter()
                    .map(|p| format!("- {} (tier: {})", p.name, p.tier))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!(
                    "Forge one card for each of these items of {blurb}, at \
                     the tier given:\n{lines}",
                )
            }
            BatchKind::DuelPeers { base_name, count } => format!(
                "Forge {count} cards from {blurb} to accompany {base_name:?} \
                 in a duel deck. Pick items a player would plausibly confuse \
                 with it, plus a few staples. Do not forge {base_name:?} \
                 itself.",
            ),
        }
    }
}

/// "Parameters" for the `report_cards` function.
#[derive(Debug, Clone, Deserialize, Serialize)]
struct ReportCardsParameters {
    cards: Vec<RawCard>,
}

#[async_trait]
impl AiRequest for CardBatchRequest {
    type Response = Vec<RawCard>;

    fn progress_increment(&self) -> u64 {
        self.expected_count() as u64
    }

    async fn perform(&self, _error_history: &[anyhow::Error]) -> Result<Self::Response> {
        let client = Client::new();
        let prompt = format!(
            "{instructions}\n\nCall `report_cards` with the forged cards.",
            instructions = self.instructions(),
        );
        let req = CreateChatCompletionRequest {
            model: CHAT_MODEL.to_owned(),
            messages: vec![system_message(WORLD_LORE), user_message(prompt)],
            tools: Some(vec![function_tool(
                "report_cards",
                "Report the batch of forged cards.",
                &REPORT_CARDS_PARAMETERS_SCHEMA,
            )]),
            tool_choice: Some(function_tool_choice("report_cards")),
            ..Default::default()
        };
        trace!("OpenAI request (full): {:?}", req);
        let resp = client.chat().create(req).await?;
        trace!("OpenAI response (full): {:?}", resp);
        let args = tool_call_response::<ReportCardsParameters>(&resp, "report_cards")?;
        Ok(args.cards)
    }
}

impl AiRequestStatic for CardBatchRequest {
    fn progress_config() -> &'static ProgressConfig<'static> {
        &ProgressConfig {
            emoji: "⚒️",
            msg: "Forging cards",
            done_msg: "Forged cards",
        }
    }

    fn cache_name() -> &'static str {
        "oai_card_batch_v1"
    }

    fn cache_size() -> u64 {
        500
    }
}
