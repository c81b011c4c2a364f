//! Vetting search topics before we spend a pile of requests on them.

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
    services::TopicAnalysis,
    ui::ProgressConfig,
    Result,
};

lazy_static! {
    /// A JSON Schema for the report_analysis "function" we tell OpenAI to
    /// call.
    static ref REPORT_ANALYSIS_PARAMETERS_SCHEMA: serde_json::Value = json!({
        "type": "object",
        "properties": {
            "is_valid": {
                "type": "boolean",
                "description": "Whether the query names a real, recognizable programming library or topic."
            },
            "reason": {
                "type": "string",
                "description": "A short, playful in-character reason when the topic is rejected."
            },
            "refined_name": {
                "type": "string",
                "description": "The canonical name of the library, with typos and casing fixed."
            },
            "refined_language": {
                "type": "string",
                "description": "The canonical programming language name, when one applies."
            }
        },
        "required": ["is_valid", "refined_name"]
    });
}

/// A request to vet a search topic.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct TopicAnalysisRequest {
    /// What the player typed.
    pub(crate) query: String,
    /// The language they claimed.
    pub(crate) language: String,
}

#[async_trait]
impl AiRequest for TopicAnalysisRequest {
    type Response = TopicAnalysis;

    async fn perform(&self, _error_history: &[anyhow::Error]) -> Result<Self::Response> {
        let client = Client::new();
        let prompt = format!(
            "A player wants to forge cards for {query:?}, which they say is a \
             {language} library. Decide whether this is a real library or \
             programming topic. Fix typos and casing in the refined names. If \
             it is not a real topic (a food, a typo too garbled to rescue, \
             random keyboard mashing), reject it with a short in-character \
             reason.\n\nCall `report_analysis` with your verdict.",
            query = self.query,
            language = self.language,
        );
        let req = CreateChatCompletionRequest {
            model: CHAT_MODEL.to_owned(),
            messages: vec![
                system_message(
                    "You are the gatekeeper of a card forge that turns \
                     programming libraries into trading cards. You are strict \
                     about nonsense but forgiving about typos.",
                ),
                user_message(prompt),
            ],
            tools: Some(vec![function_tool(
                "report_analysis",
                "Report whether the topic is forgeable.",
                &REPORT_ANALYSIS_PARAMETERS_SCHEMA,
            )]),
            tool_choice: Some(function_tool_choice("report_analysis")),
            ..Default::default()
        };
        trace!("OpenAI request (full): {:?}", req);
        let resp = client.chat().create(req).await?;
        trace!("OpenAI response (full): {:?}", resp);
        tool_call_response::<TopicAnalysis>(&resp, "report_analysis")
    }
}

impl AiRequestStatic for TopicAnalysisRequest {
    fn progress_config() -> &'static ProgressConfig<'static> {
        &ProgressConfig {
            emoji: "🔍",
            msg: "Consulting the gatekeeper",
            done_msg: "Consulted the gatekeeper",
        }
    }

    fn cache_name() -> &'static str {
        "oai_topic_analysis_v1"
    }

    fn cache_size() -> u64 {
        1000
    }
}
