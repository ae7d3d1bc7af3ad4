//! Conversation and tool conversion into each backend's request shape.

use serde_json::{json, Map, Value};

use mindflow_core::ids::ToolCallId;
use mindflow_core::messages::{Content, ContentBlock, Message, Role};
use mindflow_core::tools::{ToolCall, ToolDefinition};

use crate::tool_parsing::{arguments_to_string, parse_tool_arguments};

// ── chat completions (flat) ─────────────────────────────────────────

/// Flatten messages to the chat-completions shape. Block content is
/// unpacked: tool_use blocks become `tool_calls`, tool_result blocks
/// become separate tool messages.
pub fn chat_messages(messages: &[Message]) -> Vec<Value> {
    let mut out = Vec::with_capacity(messages.len());
    for msg in messages {
        match &msg.content {
            Content::Text(text) => out.push(flat_message(
                msg.role,
                text,
                &msg.tool_calls,
                msg.tool_call_id.as_deref(),
            )),
            Content::Blocks(blocks) => {
                let mut text = String::new();
                let mut calls = msg.tool_calls.clone();
                let mut results = Vec::new();
                for block in blocks {
                    match block {
                        ContentBlock::Text { text: t } => text.push_str(t),
                        ContentBlock::ToolUse { id, name, input } => calls.push(ToolCall {
                            id: ToolCallId::from_raw(id.clone()),
                            name: name.clone(),
                            raw_arguments: arguments_to_string(input),
                        }),
                        ContentBlock::ToolResult {
                            tool_use_id,
                            content,
                        } => results.push(json!({
                            "role": "tool",
                            "tool_call_id": tool_use_id,
                            "content": content,
                        })),
                        ContentBlock::Other => {}
                    }
                }
                if !text.is_empty() || !calls.is_empty() || results.is_empty() {
                    out.push(flat_message(
                        msg.role,
                        &text,
                        &calls,
                        msg.tool_call_id.as_deref(),
                    ));
                }
                out.extend(results);
            }
        }
    }
    out
}

fn flat_message(role: Role, text: &str, calls: &[ToolCall], tool_call_id: Option<&str>) -> Value {
    let mut msg = json!({ "role": role.as_str() });
    msg["content"] = if text.is_empty() && !calls.is_empty() {
        Value::Null
    } else {
        json!(text)
    };
    if !calls.is_empty() {
        msg["tool_calls"] = Value::Array(
            calls
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id.as_str(),
                        "type": "function",
                        "function": { "name": c.name, "arguments": c.raw_arguments },
                    })
                })
                .collect(),
        );
    }
    if let Some(id) = tool_call_id {
        msg["tool_call_id"] = json!(id);
    }
    msg
}

pub fn chat_tools(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters_schema,
                },
            })
        })
        .collect()
}

// ── message blocks ──────────────────────────────────────────────────

/// Split out system text and convert the rest to block messages.
///
/// Tool-role messages become user messages carrying `tool_result` blocks;
/// consecutive results merge into one user message.
pub fn block_messages(messages: &[Message]) -> (Option<String>, Vec<Value>) {
    let mut system: Vec<String> = Vec::new();
    let mut out: Vec<Value> = Vec::new();
    let mut merging_results = false;

    for msg in messages {
        match msg.role {
            Role::System => {
                let text = msg.text();
                if !text.is_empty() {
                    system.push(text);
                }
            }
            Role::Tool => {
                let block = json!({
                    "type": "tool_result",
                    "tool_use_id": msg.answered_call_id().unwrap_or_default(),
                    "content": result_text(&msg.content),
                });
                if merging_results {
                    if let Some(content) = out
                        .last_mut()
                        .and_then(|m| m["content"].as_array_mut())
                    {
                        content.push(block);
                        continue;
                    }
                }
                out.push(json!({ "role": "user", "content": [block] }));
                merging_results = true;
            }
            Role::User | Role::Assistant => {
                merging_results = false;
                let blocks = to_blocks(msg);
                if blocks.is_empty() {
                    continue;
                }
                out.push(json!({ "role": msg.role.as_str(), "content": blocks }));
            }
        }
    }

    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    (system, out)
}

fn result_text(content: &Content) -> String {
    match content {
        Content::Text(text) => text.clone(),
        Content::Blocks(blocks) => blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.clone()),
                ContentBlock::ToolResult { content, .. } => Some(content.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(""),
    }
}

fn to_blocks(msg: &Message) -> Vec<Value> {
    let mut blocks = Vec::new();
    match &msg.content {
        Content::Text(text) if !text.is_empty() => {
            blocks.push(json!({ "type": "text", "text": text }));
        }
        Content::Text(_) => {}
        Content::Blocks(items) => {
            for block in items {
                match block {
                    ContentBlock::Text { text } if !text.is_empty() => {
                        blocks.push(json!({ "type": "text", "text": text }));
                    }
                    ContentBlock::ToolUse { id, name, input } => blocks.push(json!({
                        "type": "tool_use",
                        "id": id,
                        "name": name,
                        "input": input,
                    })),
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                    } => blocks.push(json!({
                        "type": "tool_result",
                        "tool_use_id": tool_use_id,
                        "content": content,
                    })),
                    _ => {}
                }
            }
        }
    }
    for call in &msg.tool_calls {
        blocks.push(json!({
            "type": "tool_use",
            "id": call.id.as_str(),
            "name": call.name,
            "input": Value::Object(parse_tool_arguments(&call.raw_arguments, &call.name)),
        }));
    }
    blocks
}

pub fn block_tools(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "input_schema": t.parameters_schema,
            })
        })
        .collect()
}

// ── relay ───────────────────────────────────────────────────────────

/// Chat-shaped messages with arguments sent as parsed objects.
pub fn relay_messages(messages: &[Message]) -> Vec<Value> {
    chat_messages(messages)
        .into_iter()
        .map(|mut msg| {
            if let Some(calls) = msg.get_mut("tool_calls").and_then(Value::as_array_mut) {
                for call in calls.iter_mut() {
                    let name = call["function"]["name"].as_str().unwrap_or_default().to_string();
                    let raw = call["function"]["arguments"].as_str().unwrap_or_default().to_string();
                    call["function"]["arguments"] = Value::Object(parse_tool_arguments(&raw, &name));
                }
            }
            if msg["content"].is_null() {
                msg["content"] = json!("");
            }
            msg
        })
        .collect()
}

// ── stateful responses ──────────────────────────────────────────────

pub fn responses_tools(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "name": t.name,
                "description": t.description,
                "parameters": t.parameters_schema,
            })
        })
        .collect()
}

/// Strip `null` entries so optional request fields are omitted.
pub fn without_nulls(mut body: Map<String, Value>) -> Value {
    body.retain(|_, v| !v.is_null());
    Value::Object(body)
}
