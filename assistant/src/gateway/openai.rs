//! OpenAI-compatible chat-completions gateway
//!
//! Works against any provider exposing `POST {base_url}/chat/completions`
//! with function tools (OpenRouter, OpenAI, local servers).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::gateway::model::{
    ModelContext, ModelError, ModelGateway, ModelReply, Role, ToolCallRequest, Turn,
};
use crate::tools::ToolDefinition;

#[derive(Debug, Clone)]
pub struct OpenAiCompatibleGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatibleGateway {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn wire_message(turn: &Turn) -> Value {
    match turn.role {
        Role::User => json!({ "role": "user", "content": turn.content }),
        Role::Assistant if !turn.tool_calls.is_empty() => {
            let calls: Vec<Value> = turn
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": call.arguments.to_string(),
                        }
                    })
                })
                .collect();
            json!({ "role": "assistant", "content": Value::Null, "tool_calls": calls })
        }
        Role::Assistant => json!({ "role": "assistant", "content": turn.content }),
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": turn.tool_call_id,
            "content": turn.content,
        }),
    }
}

pub(crate) fn request_body(model: &str, context: ModelContext<'_>, tools: &[ToolDefinition]) -> Value {
    let mut messages = vec![json!({ "role": "system", "content": context.system })];
    messages.extend(context.transcript.iter().map(wire_message));

    let mut body = json!({ "model": model, "messages": messages });
    if !tools.is_empty() {
        let tools: Vec<Value> = tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    }
                })
            })
            .collect();
        body["tools"] = Value::Array(tools);
        body["tool_choice"] = json!("auto");
    }
    body
}

pub(crate) fn parse_reply(raw: &str) -> Result<ModelReply, ModelError> {
    let response: ChatResponse =
        serde_json::from_str(raw).map_err(|e| ModelError::Malformed(e.to_string()))?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ModelError::Malformed("response has no choices".to_string()))?;

    if choice.message.tool_calls.is_empty() {
        return Ok(ModelReply::Completion(
            choice.message.content.unwrap_or_default(),
        ));
    }

    let calls = choice
        .message
        .tool_calls
        .into_iter()
        .map(|call| {
            let arguments = if call.function.arguments.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str(&call.function.arguments).map_err(|e| {
                    ModelError::Malformed(format!(
                        "arguments of {} are not JSON: {e}",
                        call.function.name
                    ))
                })?
            };
            Ok(ToolCallRequest {
                id: call.id,
                name: call.function.name,
                arguments,
            })
        })
        .collect::<Result<Vec<_>, ModelError>>()?;
    Ok(ModelReply::ToolCalls(calls))
}

#[async_trait]
impl ModelGateway for OpenAiCompatibleGateway {
    async fn invoke(
        &self,
        context: ModelContext<'_>,
        tools: &[ToolDefinition],
    ) -> Result<ModelReply, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = request_body(&self.model, context, tools);

        tracing::debug!(
            model = %self.model,
            turns = context.transcript.len(),
            tools = tools.len(),
            "Invoking model"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Http(e.to_string()))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| ModelError::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(ModelError::Provider(format!("{status}: {raw}")));
        }
        parse_reply(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_includes_system_and_tools() {
        let transcript = vec![
            Turn::user("hello"),
            Turn::assistant_tool_calls(vec![ToolCallRequest {
                id: "call-1".to_string(),
                name: "ping_actor".to_string(),
                arguments: json!({ "actor_id": "worker-1" }),
            }]),
            Turn::tool_result("call-1", "{\"ok\":true}"),
        ];
        let tools = vec![ToolDefinition {
            name: "ping_actor".to_string(),
            description: "ping".to_string(),
            parameters: json!({ "type": "object" }),
        }];
        let body = request_body(
            "m",
            ModelContext {
                system: "be brief",
                transcript: &transcript,
            },
            &tools,
        );

        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][2]["tool_calls"][0]["function"]["name"], "ping_actor");
        assert_eq!(
            body["messages"][2]["tool_calls"][0]["function"]["arguments"],
            "{\"actor_id\":\"worker-1\"}"
        );
        assert_eq!(body["messages"][3]["tool_call_id"], "call-1");
        assert_eq!(body["tools"][0]["function"]["name"], "ping_actor");
    }

    #[test]
    fn test_request_body_omits_empty_tool_list() {
        let body = request_body(
            "m",
            ModelContext {
                system: "s",
                transcript: &[],
            },
            &[],
        );
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_parse_completion_and_tool_calls() {
        let completion = r#"{"choices":[{"message":{"content":"hi there"}}]}"#;
        assert_eq!(
            parse_reply(completion).unwrap(),
            ModelReply::Completion("hi there".to_string())
        );

        let calls = r#"{"choices":[{"message":{"content":null,"tool_calls":[
            {"id":"c1","type":"function","function":{"name":"spawn_actor","arguments":"{\"goals\":\"fetch X\"}"}}
        ]}}]}"#;
        match parse_reply(calls).unwrap() {
            ModelReply::ToolCalls(calls) => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].name, "spawn_actor");
                assert_eq!(calls[0].arguments["goals"], "fetch X");
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_empty_choices() {
        assert!(matches!(
            parse_reply(r#"{"choices":[]}"#),
            Err(ModelError::Malformed(_))
        ));
    }
}
