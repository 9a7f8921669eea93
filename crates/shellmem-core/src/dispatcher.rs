//! Tool call dispatch
//!
//! Validates an incoming call, routes it to the process executor or the
//! memory adapter, and guarantees exactly one well-formed response per call.
//! Nothing a handler does, including panicking, escapes this boundary.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use serde_json::{Map, Value};
use tracing::{debug, info_span, warn, Instrument};

use crate::memory::{self, MemoryBackend};
use crate::registry::{ToolKind, ToolRegistry};
use crate::response::ToolCallResponse;
use crate::shell::Executor;

/// A decoded `tools/call` request.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub name: String,
    /// `None` when the caller sent no arguments or an explicit `null`.
    pub arguments: Option<Value>,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, arguments: Option<Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Build from `tools/call` params: `{ "name": ..., "arguments": ... }`.
    pub fn from_params(params: &Value) -> Self {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let arguments = match params.get("arguments") {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.clone()),
        };
        Self { name, arguments }
    }
}

/// Why a call's arguments were rejected
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ArgumentError {
    #[error("arguments must be an object")]
    NotAnObject,
    #[error("missing required field '{0}'")]
    Missing(&'static str),
    #[error("field '{field}' must be a {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

fn required_str<'a>(args: &'a Map<String, Value>, field: &'static str) -> Result<&'a str, ArgumentError> {
    match args.get(field) {
        None | Some(Value::Null) => Err(ArgumentError::Missing(field)),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ArgumentError::WrongType {
            field,
            expected: "string",
        }),
    }
}

fn optional_str<'a>(
    args: &'a Map<String, Value>,
    field: &'static str,
) -> Result<Option<&'a str>, ArgumentError> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(ArgumentError::WrongType {
            field,
            expected: "string",
        }),
    }
}

/// Routes tool calls to their handlers.
///
/// All collaborators are injected at construction; the dispatcher holds no
/// mutable state, so one instance serves the whole process.
pub struct Dispatcher {
    registry: ToolRegistry,
    executor: Executor,
    memory: Arc<dyn MemoryBackend>,
    default_subject: String,
}

impl Dispatcher {
    pub fn new(
        registry: ToolRegistry,
        executor: Executor,
        memory: Arc<dyn MemoryBackend>,
        default_subject: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            executor,
            memory,
            default_subject: default_subject.into(),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Handle one call. Always returns exactly one response.
    pub async fn handle(&self, request: ToolCallRequest) -> ToolCallResponse {
        let span = info_span!("tool_call", tool = %request.name);
        async move {
            let started = Instant::now();
            let response = self.dispatch(request).await;
            if response.is_error {
                warn!(elapsed_ms = started.elapsed().as_millis() as u64, "Tool call failed");
            } else {
                debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Tool call succeeded");
            }
            response
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, request: ToolCallRequest) -> ToolCallResponse {
        let ToolCallRequest { name, arguments } = request;

        let Some(arguments) = arguments else {
            return ToolCallResponse::error(format!("Missing arguments for tool: {}", name));
        };

        let Some(kind) = self.registry.get(&name).map(|t| t.kind) else {
            return ToolCallResponse::error(format!("Unknown tool: {}", name));
        };

        let Value::Object(args) = arguments else {
            return ToolCallResponse::error(format!(
                "Invalid arguments for {}: {}",
                name,
                ArgumentError::NotAnObject
            ));
        };

        match AssertUnwindSafe(self.route(kind, &args)).catch_unwind().await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => ToolCallResponse::error(format!("Invalid arguments for {}: {}", name, e)),
            Err(panic) => ToolCallResponse::error(format!(
                "Error in {}: {}",
                name,
                panic_message(panic.as_ref())
            )),
        }
    }

    async fn route(
        &self,
        kind: ToolKind,
        args: &Map<String, Value>,
    ) -> Result<ToolCallResponse, ArgumentError> {
        let response = match kind {
            ToolKind::ListProcesses => self.executor.run_diagnostic().await,
            ToolKind::ExecuteCommand => {
                let command = required_str(args, "command")?;
                self.executor.run_shell(command).await
            }
            ToolKind::AddMemory => {
                let content = required_str(args, "content")?;
                let subject = optional_str(args, "user_id")?.unwrap_or(self.default_subject.as_str());
                if memory::add_memory(self.memory.as_ref(), content, subject).await {
                    ToolCallResponse::text(format!("Memory added for user {}", subject))
                } else {
                    ToolCallResponse::error(format!("Failed to add memory for user {}", subject))
                }
            }
            ToolKind::SearchMemories => {
                let query = required_str(args, "query")?;
                let subject = optional_str(args, "user_id")?.unwrap_or(self.default_subject.as_str());
                let records = memory::search_memories(self.memory.as_ref(), query, subject).await;
                ToolCallResponse::text(memory::format_memories(&records))
            }
        };
        Ok(response)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryError, MemoryRecord};
    use crate::shell::ExecutorConfig;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<(String, String, String)>>,
        records: Vec<MemoryRecord>,
        fail: bool,
    }

    #[async_trait]
    impl MemoryBackend for Recording {
        async fn add(&self, content: &str, subject: &str) -> Result<(), MemoryError> {
            self.calls
                .lock()
                .unwrap()
                .push(("add".into(), content.into(), subject.into()));
            if self.fail {
                Err(MemoryError::Transport("offline".into()))
            } else {
                Ok(())
            }
        }

        async fn search(&self, query: &str, subject: &str) -> Result<Vec<MemoryRecord>, MemoryError> {
            self.calls
                .lock()
                .unwrap()
                .push(("search".into(), query.into(), subject.into()));
            if self.fail {
                Err(MemoryError::Transport("offline".into()))
            } else {
                Ok(self.records.clone())
            }
        }
    }

    struct Panicking;

    #[async_trait]
    impl MemoryBackend for Panicking {
        async fn add(&self, _content: &str, _subject: &str) -> Result<(), MemoryError> {
            panic!("store exploded");
        }

        async fn search(&self, _query: &str, _subject: &str) -> Result<Vec<MemoryRecord>, MemoryError> {
            panic!("index exploded");
        }
    }

    fn dispatcher_with(memory: Arc<dyn MemoryBackend>) -> Dispatcher {
        Dispatcher::new(
            ToolRegistry::builtin(),
            Executor::new(ExecutorConfig::default()),
            memory,
            "default_user",
        )
    }

    fn call(name: &str, args: Value) -> ToolCallRequest {
        ToolCallRequest::new(name, Some(args))
    }

    #[tokio::test]
    async fn test_missing_arguments_fails_fast() {
        let backend = Arc::new(Recording::default());
        let d = dispatcher_with(backend.clone());
        let resp = d.handle(ToolCallRequest::new("add_memory", None)).await;
        assert!(resp.is_error);
        assert_eq!(resp.joined_text(), "Missing arguments for tool: add_memory");
        assert!(backend.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_arguments_checked_before_lookup() {
        let d = dispatcher_with(Arc::new(Recording::default()));
        let resp = d.handle(ToolCallRequest::new("bogus", None)).await;
        assert!(resp.is_error);
        assert_eq!(resp.joined_text(), "Missing arguments for tool: bogus");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let d = dispatcher_with(Arc::new(Recording::default()));
        let resp = d.handle(call("format_disk", json!({}))).await;
        assert!(resp.is_error);
        assert_eq!(resp.joined_text(), "Unknown tool: format_disk");
    }

    #[tokio::test]
    async fn test_missing_required_field() {
        let d = dispatcher_with(Arc::new(Recording::default()));
        let resp = d.handle(call("execute_command", json!({}))).await;
        assert!(resp.is_error);
        assert_eq!(
            resp.joined_text(),
            "Invalid arguments for execute_command: missing required field 'command'"
        );
    }

    #[tokio::test]
    async fn test_mistyped_field() {
        let d = dispatcher_with(Arc::new(Recording::default()));
        let resp = d.handle(call("search_memories", json!({ "query": 42 }))).await;
        assert!(resp.is_error);
        assert_eq!(
            resp.joined_text(),
            "Invalid arguments for search_memories: field 'query' must be a string"
        );

        let resp = d
            .handle(call("add_memory", json!({ "content": "x", "user_id": ["a"] })))
            .await;
        assert!(resp.is_error);
        assert!(resp.joined_text().contains("field 'user_id' must be a string"));
    }

    #[tokio::test]
    async fn test_arguments_must_be_object() {
        let d = dispatcher_with(Arc::new(Recording::default()));
        let resp = d.handle(call("execute_command", json!("echo hi"))).await;
        assert!(resp.is_error);
        assert_eq!(
            resp.joined_text(),
            "Invalid arguments for execute_command: arguments must be an object"
        );
    }

    #[tokio::test]
    async fn test_execute_command_routes_to_shell() {
        let d = dispatcher_with(Arc::new(Recording::default()));
        let resp = d.handle(call("execute_command", json!({ "command": "echo hi" }))).await;
        assert!(!resp.is_error);
        assert!(resp.joined_text().contains("hi"));

        let resp = d.handle(call("execute_command", json!({ "command": "exit 3" }))).await;
        assert!(resp.is_error);
        assert!(resp.joined_text().contains("status 3"));
    }

    #[tokio::test]
    async fn test_add_memory_uses_default_subject() {
        let backend = Arc::new(Recording::default());
        let d = dispatcher_with(backend.clone());
        let resp = d.handle(call("add_memory", json!({ "content": "likes tea" }))).await;
        assert!(!resp.is_error);
        assert_eq!(resp.joined_text(), "Memory added for user default_user");
        assert_eq!(
            backend.calls.lock().unwrap()[0],
            ("add".to_string(), "likes tea".to_string(), "default_user".to_string())
        );
    }

    #[tokio::test]
    async fn test_add_memory_failure_is_surfaced() {
        let backend = Arc::new(Recording {
            fail: true,
            ..Recording::default()
        });
        let d = dispatcher_with(backend);
        let resp = d
            .handle(call("add_memory", json!({ "content": "likes tea", "user_id": "alice" })))
            .await;
        assert!(resp.is_error);
        assert_eq!(resp.joined_text(), "Failed to add memory for user alice");
    }

    #[tokio::test]
    async fn test_search_formats_records() {
        let backend = Arc::new(Recording {
            records: vec![MemoryRecord::new("likes tea", 0.9)],
            ..Recording::default()
        });
        let d = dispatcher_with(backend.clone());
        let resp = d
            .handle(call("search_memories", json!({ "query": "drinks", "user_id": "alice" })))
            .await;
        assert!(!resp.is_error);
        assert_eq!(resp.joined_text(), "Memory: likes tea\nRelevance: 0.9\n---");
        assert_eq!(
            backend.calls.lock().unwrap()[0],
            ("search".to_string(), "drinks".to_string(), "alice".to_string())
        );
    }

    #[tokio::test]
    async fn test_search_empty_and_failed_look_the_same() {
        let empty = dispatcher_with(Arc::new(Recording::default()));
        let failed = dispatcher_with(Arc::new(Recording {
            fail: true,
            ..Recording::default()
        }));
        for d in [empty, failed] {
            let resp = d.handle(call("search_memories", json!({ "query": "tea" }))).await;
            assert_eq!(resp, ToolCallResponse::text("No memories found"));
        }
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_error_response() {
        let d = dispatcher_with(Arc::new(Panicking));
        let resp = d.handle(call("add_memory", json!({ "content": "x" }))).await;
        assert!(resp.is_error);
        assert_eq!(resp.joined_text(), "Error in add_memory: store exploded");

        // The dispatcher keeps working afterwards.
        let resp = d.handle(call("execute_command", json!({ "command": "echo ok" }))).await;
        assert!(!resp.is_error);
    }

    #[test]
    fn test_request_from_params() {
        let req = ToolCallRequest::from_params(&json!({ "name": "ping_tool", "arguments": null }));
        assert_eq!(req, ToolCallRequest::new("ping_tool", None));

        let req = ToolCallRequest::from_params(&json!({ "name": "execute_command" }));
        assert_eq!(req.arguments, None);

        let req = ToolCallRequest::from_params(&json!({ "arguments": { "a": 1 } }));
        assert_eq!(req.name, "");
        assert_eq!(req.arguments, Some(json!({ "a": 1 })));
    }
}
