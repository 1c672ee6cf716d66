// src/hooks/types.rs — Host lifecycle payloads and responses

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle point the host is reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookEvent {
    SessionStart,
    PreToolUse,
    PostToolUse,
    UserPromptSubmit,
    Stop,
    #[serde(other)]
    Other,
}

impl HookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionStart => "SessionStart",
            Self::PreToolUse => "PreToolUse",
            Self::PostToolUse => "PostToolUse",
            Self::UserPromptSubmit => "UserPromptSubmit",
            Self::Stop => "Stop",
            Self::Other => "Other",
        }
    }
}

/// One structured payload per host invocation.
#[derive(Debug, Clone, Deserialize)]
pub struct HookInput {
    pub hook_event_name: HookEvent,
    pub session_id: String,
    /// Working directory of the host session.
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_input: Option<Value>,
    #[serde(default)]
    pub tool_response: Option<Value>,
    #[serde(default)]
    pub prompt: Option<String>,
}

impl HookInput {
    pub fn new(event: HookEvent, session_id: &str) -> Self {
        Self {
            hook_event_name: event,
            session_id: session_id.to_string(),
            cwd: None,
            tool_name: None,
            tool_input: None,
            tool_response: None,
            prompt: None,
        }
    }

    pub fn with_cwd(mut self, cwd: &str) -> Self {
        self.cwd = Some(cwd.to_string());
        self
    }

    pub fn with_tool(mut self, tool_name: &str, tool_input: Value) -> Self {
        self.tool_name = Some(tool_name.to_string());
        self.tool_input = Some(tool_input);
        self
    }

    pub fn with_response(mut self, tool_response: Value) -> Self {
        self.tool_response = Some(tool_response);
        self
    }

    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.prompt = Some(prompt.to_string());
        self
    }

    pub fn tool(&self) -> &str {
        self.tool_name.as_deref().unwrap_or("")
    }

    /// String field of the tool input.
    pub fn input_str(&self, key: &str) -> Option<&str> {
        self.tool_input.as_ref()?.get(key)?.as_str()
    }

    /// File the tool operated on, if any.
    pub fn file_path(&self) -> Option<&str> {
        ["file_path", "notebook_path", "path"]
            .iter()
            .find_map(|k| self.input_str(k))
    }

    /// File path relative to the session's working directory. Paths outside
    /// it, or payloads without a `cwd`, are returned unchanged.
    pub fn project_file_path(&self) -> Option<String> {
        let raw = self.file_path()?;
        let relative = self
            .cwd
            .as_deref()
            .and_then(|cwd| Path::new(raw).strip_prefix(cwd).ok())
            .and_then(Path::to_str)
            .filter(|p| !p.is_empty());
        Some(relative.unwrap_or(raw).to_string())
    }

    pub fn command(&self) -> Option<&str> {
        self.input_str("command")
    }

    /// Helper name for agent tools, falling back to the description.
    pub fn agent_name(&self) -> Option<&str> {
        self.input_str("subagent_type")
            .or_else(|| self.input_str("agent"))
            .or_else(|| self.input_str("description"))
    }

    /// Failure text when the tool response reports an error.
    ///
    /// Recognized shapes: `is_error: true`, a non-empty `error` string, or a
    /// non-zero `exit_code`. The text prefers `error`, then `stderr`, then
    /// `stdout`.
    pub fn failure(&self) -> Option<String> {
        let response = self.tool_response.as_ref()?;
        let text_of = |k: &str| {
            response
                .get(k)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        let flagged = response.get("is_error").and_then(Value::as_bool) == Some(true);
        let errored = text_of("error").is_some();
        let exit_code = response
            .get("exit_code")
            .or_else(|| response.get("exitCode"))
            .and_then(Value::as_i64)
            .unwrap_or(0);

        if !(flagged || errored || exit_code != 0) {
            return None;
        }
        let text = text_of("error")
            .or_else(|| text_of("stderr"))
            .or_else(|| text_of("stdout"))
            .map(String::from)
            .unwrap_or_else(|| format!("exit code {exit_code}"));
        Some(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Block,
}

/// The only channel back to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HookOutput {
    /// Gate response for `PreToolUse`.
    Decision {
        decision: Decision,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Informational text for the host to surface.
    Context { additional_context: String },
}

impl HookOutput {
    pub fn approve() -> Self {
        Self::Decision {
            decision: Decision::Approve,
            reason: None,
        }
    }

    pub fn approve_with(reason: impl Into<String>) -> Self {
        Self::Decision {
            decision: Decision::Approve,
            reason: Some(reason.into()),
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self::Decision {
            decision: Decision::Block,
            reason: Some(reason.into()),
        }
    }

    /// Context from collected messages, or a plain approve when there are none.
    pub fn from_messages(messages: Vec<String>) -> Self {
        if messages.is_empty() {
            Self::approve()
        } else {
            Self::Context {
                additional_context: messages.join("\n"),
            }
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(
            self,
            Self::Decision {
                decision: Decision::Block,
                ..
            }
        )
    }

    /// Reason or context text, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Decision { reason, .. } => reason.as_deref(),
            Self::Context { additional_context } => Some(additional_context),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_post_tool_use() {
        let input: HookInput = serde_json::from_value(json!({
            "hook_event_name": "PostToolUse",
            "session_id": "abc",
            "tool_name": "Bash",
            "tool_input": { "command": "npm test" },
            "tool_response": { "exit_code": 1, "stderr": "Cannot find module 'x'" }
        }))
        .unwrap();
        assert_eq!(input.hook_event_name, HookEvent::PostToolUse);
        assert_eq!(input.command(), Some("npm test"));
        assert_eq!(input.failure().as_deref(), Some("Cannot find module 'x'"));
    }

    #[test]
    fn test_unknown_event_and_missing_fields() {
        let input: HookInput = serde_json::from_value(json!({
            "hook_event_name": "Notification",
            "session_id": "abc"
        }))
        .unwrap();
        assert_eq!(input.hook_event_name, HookEvent::Other);
        assert!(input.file_path().is_none());
        assert!(input.failure().is_none());
    }

    #[test]
    fn test_paths_relative_to_cwd() {
        let input: HookInput = serde_json::from_value(json!({
            "hook_event_name": "PostToolUse",
            "session_id": "abc",
            "cwd": "/home/dev/proj",
            "tool_name": "Edit",
            "tool_input": { "file_path": "/home/dev/proj/src/a.rs" }
        }))
        .unwrap();
        assert_eq!(input.project_file_path().as_deref(), Some("src/a.rs"));

        let outside = input.clone().with_tool("Edit", json!({ "file_path": "/etc/hosts" }));
        assert_eq!(outside.project_file_path().as_deref(), Some("/etc/hosts"));

        let no_cwd = HookInput::new(HookEvent::PostToolUse, "abc")
            .with_tool("Read", json!({ "file_path": "/home/dev/proj/src/a.rs" }));
        assert_eq!(no_cwd.project_file_path().as_deref(), Some("/home/dev/proj/src/a.rs"));
    }

    #[test]
    fn test_failure_shapes() {
        let ok = HookInput::new(HookEvent::PostToolUse, "s")
            .with_response(json!({ "exit_code": 0, "stdout": "fine" }));
        assert!(ok.failure().is_none());

        let flagged = HookInput::new(HookEvent::PostToolUse, "s")
            .with_response(json!({ "is_error": true }));
        assert_eq!(flagged.failure().as_deref(), Some("exit code 0"));

        let errored = HookInput::new(HookEvent::PostToolUse, "s")
            .with_response(json!({ "error": "  File not found  " }));
        assert_eq!(errored.failure().as_deref(), Some("File not found"));
    }

    #[test]
    fn test_output_serialization() {
        assert_eq!(
            serde_json::to_value(HookOutput::approve()).unwrap(),
            json!({ "decision": "approve" })
        );
        assert_eq!(
            serde_json::to_value(HookOutput::block("stop")).unwrap(),
            json!({ "decision": "block", "reason": "stop" })
        );
        assert_eq!(
            serde_json::to_value(HookOutput::from_messages(vec!["a".into(), "b".into()])).unwrap(),
            json!({ "additional_context": "a\nb" })
        );
        assert_eq!(HookOutput::from_messages(Vec::new()), HookOutput::approve());
    }
}
