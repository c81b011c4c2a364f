//! Classifying catalogue items into rarity tiers.

use async_openai::{types::CreateChatCompletionRequest, Client};
use async_trait::async_trait;
use lazy_static::lazy_static;
use log::trace;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{
    function_tool, function_tool_choice, subject_blurb, system_message,
    tool_call_response, user_message, CHAT_MODEL,
};
use crate::{
    ai::{AiRequest, AiRequestStatic},
    session::Subject,
    ui::ProgressConfig,
    Result,
};

lazy_static! {
    /// A JSON Schema for the report_tiers "function".
    static ref REPORT_TIERS_PARAMETERS_SCHEMA: serde_json::Value = json!({
        "type": "object",
        "properties": {
            "assignments": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "tier": {
                            "type": "string",
                            "enum": ["Core", "Staple", "Situational", "Niche"]
                        }
                    },
                    "required": ["name", "tier"]
                }
            }
        },
        "required": ["assignments"]
    });
}

/// A request to classify every catalogue item in one call.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct TierRequest {
    pub(crate) subject: Subject,
    pub(crate) items: Vec<String>,
}

/// One classified item, tier still as raw text.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct TierAssignment {
    pub(crate) name: String,
    pub(crate) tier: String,
}

/// "Parameters" for the `report_tiers` function.
#[derive(Debug, Clone, Deserialize, Serialize)]
struct ReportTiersParameters {
    assignments: Vec<TierAssignment>,
}

#[async_trait]
impl AiRequest for TierRequest {
    type Response = Vec<TierAssignment>;

    async fn perform(&self, _error_history: &[anyhow::Error]) -> Result<Self::Response> {
        let client = Client::new();
        let prompt = format!(
            "Classify each item of {blurb} into a tier:\n\
             - Core: essential, defining features\n\
             - Staple: extremely common, used in most projects\n\
             - Situational: useful in specific but common scenarios\n\
             - Niche: rarely used, specialized or legacy\n\n\
             Items:\n{items}\n\n\
             Call `report_tiers` with one assignment per item.",
            blurb = subject_blurb(&self.subject),
            items = self.items.join("\n"),
        );
        let req = CreateChatCompletionRequest {
            model: CHAT_MODEL.to_owned(),
            messages: vec![
                system_message(
                    "You are an archivist grading how central each item is to \
                     its library. Be decisive; every item gets exactly one tier.",
                ),
                user_message(prompt),
            ],
            tools: Some(vec![function_tool(
                "report_tiers",
                "Report the tier of every item.",
                &REPORT_TIERS_PARAMETERS_SCHEMA,
            )]),
            tool_choice: Some(function_tool_choice("report_tiers")),
            ..Default::default()
        };
        trace!("OpenAI request (full): {:?}", req);
        let resp = client.chat().create(req).await?;
        trace!("OpenAI response (full): {:?}", resp);
        let args = tool_call_response::<ReportTiersParameters>(&resp, "report_tiers")?;
        Ok(args.assignments)
    }
}

impl AiRequestStatic for TierRequest {
    fn progress_config() -> &'static ProgressConfig<'static> {
        &ProgressConfig {
            emoji: "⚖️",
            msg: "Grading the catalogue",
            done_msg: "Graded the catalogue",
        }
    }

    fn cache_name() -> &'static str {
        "oai_tiers_v1"
    }

    fn cache_size() -> u64 {
        200
    }
}
