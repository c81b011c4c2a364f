//! Enumerating everything forgeable for a subject.

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
    /// A JSON Schema for the report_catalogue "function".
    static ref REPORT_CATALOGUE_PARAMETERS_SCHEMA: serde_json::Value = json!({
        "type": "object",
        "properties": {
            "items": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Exact public names, one per item, no descriptions."
            }
        },
        "required": ["items"]
    });
}

/// A request for the full catalogue of a subject.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct CatalogueRequest {
    pub(crate) subject: Subject,
}

/// "Parameters" for the `report_catalogue` function.
#[derive(Debug, Clone, Deserialize, Serialize)]
struct ReportCatalogueParameters {
    items: Vec<String>,
}

#[async_trait]
impl AiRequest for CatalogueRequest {
    type Response = Vec<String>;

    async fn perform(&self, _error_history: &[anyhow::Error]) -> Result<Self::Response> {
        let client = Client::new();
        let prompt = format!(
            "List the public API of {blurb}: every commonly documented \
             function, method, hook or concept a practitioner would \
             recognize. Use exact names as they appear in code or common \
             usage. For a creative theme, list its iconic concepts instead.\n\n\
             Call `report_catalogue` with the list.",
            blurb = subject_blurb(&self.subject),
        );
        let req = CreateChatCompletionRequest {
            model: CHAT_MODEL.to_owned(),
            messages: vec![
                system_message(
                    "You are an archivist compiling a complete, accurate index. \
                     No lore here, just names.",
                ),
                user_message(prompt),
            ],
            tools: Some(vec![function_tool(
                "report_catalogue",
                "Report the catalogue of forgeable items.",
                &REPORT_CATALOGUE_PARAMETERS_SCHEMA,
            )]),
            tool_choice: Some(function_tool_choice("report_catalogue")),
            ..Default::default()
        };
        trace!("OpenAI request (full): {:?}", req);
        let resp = client.chat().create(req).await?;
        trace!("OpenAI response (full): {:?}", resp);
        let args =
            tool_call_response::<ReportCatalogueParameters>(&resp, "report_catalogue")?;
        Ok(args.items)
    }
}

impl AiRequestStatic for CatalogueRequest {
    fn progress_config() -> &'static ProgressConfig<'static> {
        &ProgressConfig {
            emoji: "📜",
            msg: "Indexing the catalogue",
            done_msg: "Indexed the catalogue",
        }
    }

    fn cache_name() -> &'static str {
        "oai_catalogue_v1"
    }

    fn cache_size() -> u64 {
        200
    }
}
