//! Gemini `generateContent` client running the function-calling loop.

use assist_core::{FunctionCall, FunctionDecl, ToolCollection};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{GenerateRequest, GenerationConfig, GenerationError, GenerativeBackend};
use super::TRACING_TARGET_BACKEND;

pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Model turns allowed per generation before giving up on a tool loop.
pub const DEFAULT_MAX_TURNS: usize = 5;

/// Backend talking to the Gemini API with an API key.
#[derive(Clone)]
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_turns: usize,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_turns", &self.max_turns)
            .finish_non_exhaustive()
    }
}

impl GeminiBackend {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_GEMINI_URL.to_owned(),
            model: DEFAULT_GEMINI_MODEL.to_owned(),
            max_turns: DEFAULT_MAX_TURNS,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    async fn send(
        &self,
        body: &GenerateContentRequest<'_>,
    ) -> Result<GenerateContentResponse, GenerationError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_owned))
                .unwrap_or_else(|| body.trim().to_owned());
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    async fn generate(
        &self,
        request: &GenerateRequest,
        tools: &ToolCollection,
    ) -> Result<String, GenerationError> {
        let declarations = function_declarations(tools);
        let mut contents = vec![Content::text("user", &request.prompt)];

        for turn in 1..=self.max_turns {
            tracing::debug!(
                target: TRACING_TARGET_BACKEND,
                model = %self.model,
                turn,
                "sending generateContent request"
            );
            let response = {
                let body = GenerateContentRequest {
                    system_instruction: Content::system(&request.system),
                    contents: &contents,
                    generation_config: &request.config,
                    tools: if declarations.is_empty() {
                        Vec::new()
                    } else {
                        vec![WireTool {
                            function_declarations: declarations.clone(),
                        }]
                    },
                };
                self.send(&body).await?
            };

            let Some(candidate) = response.candidates.into_iter().next() else {
                let reason = response
                    .prompt_feedback
                    .and_then(|f| f.block_reason)
                    .unwrap_or_else(|| "no candidates returned".to_owned());
                return Err(GenerationError::Blocked(reason));
            };
            let finish_reason = candidate.finish_reason;
            let content = candidate.content.unwrap_or_default();

            let calls: Vec<WireFunctionCall> = content
                .parts
                .iter()
                .filter_map(|part| part.function_call.clone())
                .collect();

            if calls.is_empty() {
                let text: String = content
                    .parts
                    .iter()
                    .filter(|part| part.thought != Some(true))
                    .filter_map(|part| part.text.as_deref())
                    .collect();
                return match finish_reason.as_deref() {
                    Some(reason @ ("SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT"))
                        if text.is_empty() =>
                    {
                        Err(GenerationError::Blocked(reason.to_owned()))
                    }
                    _ => Ok(text),
                };
            }

            contents.push(Content {
                role: Some("model".to_owned()),
                parts: content.parts,
            });

            let mut responses = Vec::with_capacity(calls.len());
            for call in calls {
                tracing::info!(
                    target: TRACING_TARGET_BACKEND,
                    tool = %call.name,
                    turn,
                    "model requested tool"
                );
                let args = if call.args.is_null() {
                    json!({})
                } else {
                    call.args
                };
                let output = tools
                    .call(FunctionCall::new(call.name.clone(), args))
                    .await?;
                responses.push(Part {
                    function_response: Some(WireFunctionResponse {
                        id: call.id,
                        name: call.name,
                        response: json!({ "value": output }),
                    }),
                    ..Part::default()
                });
            }
            contents.push(Content {
                role: Some("user".to_owned()),
                parts: responses,
            });
        }

        tracing::warn!(
            target: TRACING_TARGET_BACKEND,
            max_turns = self.max_turns,
            "tool loop did not converge"
        );
        Err(GenerationError::TurnLimit(self.max_turns))
    }
}

// ============================================================================
// SCHEMA CONVERSION
// ============================================================================

fn function_declarations(tools: &ToolCollection) -> Vec<WireFunctionDeclaration> {
    tools
        .declarations()
        .into_iter()
        .map(|decl: &FunctionDecl| WireFunctionDeclaration {
            name: decl.name.to_string(),
            description: decl.description.to_string(),
            parameters: gemini_schema(decl.parameters.clone()),
        })
        .collect()
}

/// Rewrites a JSON schema into the OpenAPI subset Gemini accepts.
///
/// `anyOf: [T, {type: null}]` becomes `T` with `nullable: true`; keywords
/// Gemini rejects are dropped, as are empty `required` lists.
pub(crate) fn gemini_schema(schema: Value) -> Value {
    let Value::Object(mut obj) = schema else {
        return schema;
    };

    if let Some(Value::Array(variants)) = obj.get("anyOf") {
        let non_null: Vec<&Value> = variants
            .iter()
            .filter(|v| v.get("type").and_then(Value::as_str) != Some("null"))
            .collect();
        if non_null.len() == 1 && variants.len() == 2 {
            let mut inner = gemini_schema(non_null[0].clone());
            if let Value::Object(inner_obj) = &mut inner {
                inner_obj.insert("nullable".to_owned(), Value::Bool(true));
                if let Some(description) = obj.remove("description") {
                    inner_obj.entry("description").or_insert(description);
                }
            }
            return inner;
        }
    }

    obj.remove("additionalProperties");
    obj.remove("prefixItems");
    if obj
        .get("required")
        .and_then(Value::as_array)
        .is_some_and(Vec::is_empty)
    {
        obj.remove("required");
    }

    if let Some(Value::Object(properties)) = obj.remove("properties") {
        let converted: Map<String, Value> = properties
            .into_iter()
            .map(|(k, v)| (k, gemini_schema(v)))
            .collect();
        obj.insert("properties".to_owned(), Value::Object(converted));
    }
    if let Some(items) = obj.remove("items") {
        obj.insert("items".to_owned(), gemini_schema(items));
    }
    if let Some(Value::Array(variants)) = obj.remove("anyOf") {
        obj.insert(
            "anyOf".to_owned(),
            Value::Array(variants.into_iter().map(gemini_schema).collect()),
        );
    }

    Value::Object(obj)
}

// ============================================================================
// WIRE FORMAT
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content,
    contents: &'a [Content],
    generation_config: &'a GenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTool {
    function_declarations: Vec<WireFunctionDeclaration>,
}

#[derive(Debug, Clone, Serialize)]
struct WireFunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(role: &str, text: &str) -> Self {
        Self {
            role: Some(role.to_owned()),
            ..Self::system(text)
        }
    }

    /// System instructions carry no role.
    fn system(text: &str) -> Self {
        Self {
            role: None,
            parts: vec![Part {
                text: Some(text.to_owned()),
                ..Part::default()
            }],
        }
    }
}

/// One content part. Fields this client does not interpret (such as
/// `thoughtSignature`) are kept so model turns round-trip unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<WireFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<WireFunctionResponse>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    response: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}
