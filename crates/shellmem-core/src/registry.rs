//! Tool definitions
//!
//! The registry is built once at startup and never changes afterwards.
//! Listing order is registration order.

use serde::Serialize;
use serde_json::{json, Value};

/// The closed set of tools this server knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    ListProcesses,
    ExecuteCommand,
    AddMemory,
    SearchMemories,
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [
        ToolKind::ListProcesses,
        ToolKind::ExecuteCommand,
        ToolKind::AddMemory,
        ToolKind::SearchMemories,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::ListProcesses => "list_processes",
            ToolKind::ExecuteCommand => "execute_command",
            ToolKind::AddMemory => "add_memory",
            ToolKind::SearchMemories => "search_memories",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

/// A tool as advertised to the caller via `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    #[serde(skip)]
    pub kind: ToolKind,
}

/// Static tool registry.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    /// Registry with every built-in tool.
    pub fn builtin() -> Self {
        let tools = ToolKind::ALL
            .into_iter()
            .map(|kind| ToolDescriptor {
                name: kind.name().to_string(),
                description: description(kind).to_string(),
                input_schema: input_schema(kind),
                kind,
            })
            .collect();
        Self { tools }
    }

    pub fn list_tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

fn description(kind: ToolKind) -> &'static str {
    match kind {
        ToolKind::ListProcesses => {
            "Show the running processes as a forest-style tree (parent/child hierarchy)."
        }
        ToolKind::ExecuteCommand => {
            "Execute a shell command on the host and return its output. The command is passed \
             to `sh -c` unmodified: pipes, redirects and substitutions are interpreted by the shell."
        }
        ToolKind::AddMemory => {
            "Store a piece of information in long-term memory for a user. Use for facts, \
             preferences and details worth recalling in later sessions."
        }
        ToolKind::SearchMemories => {
            "Search a user's stored memories by natural-language query. Results are ranked by relevance."
        }
    }
}

fn input_schema(kind: ToolKind) -> Value {
    match kind {
        ToolKind::ListProcesses => json!({
            "type": "object",
            "properties": {}
        }),
        ToolKind::ExecuteCommand => json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "The shell command to execute" }
            },
            "required": ["command"]
        }),
        ToolKind::AddMemory => json!({
            "type": "object",
            "properties": {
                "content": { "type": "string", "description": "The information to remember" },
                "user_id": { "type": "string", "description": "Subject the memory belongs to (defaults to the server's default user)" }
            },
            "required": ["content"]
        }),
        ToolKind::SearchMemories => json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "What to search for" },
                "user_id": { "type": "string", "description": "Subject whose memories are searched (defaults to the server's default user)" }
            },
            "required": ["query"]
        }),
    }
}
