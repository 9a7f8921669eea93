//! Shellmem Core - Tool registry, dispatch and stdio protocol
//!
//! Everything the `shellmem` binary needs to answer an agent's tool calls:
//! the static tool registry, the dispatcher that routes a call to its handler,
//! the process executor, the memory adapter, and the JSON-RPC loop on top.

pub mod dispatcher;
pub mod memory;
pub mod registry;
pub mod response;
pub mod server;
pub mod shell;

pub use dispatcher::{Dispatcher, ToolCallRequest};
pub use memory::{MemoryBackend, MemoryError, MemoryRecord};
pub use registry::{ToolDescriptor, ToolKind, ToolRegistry};
pub use response::{ContentBlock, ToolCallResponse};
pub use server::serve;
pub use shell::{Executor, ExecutorConfig};
