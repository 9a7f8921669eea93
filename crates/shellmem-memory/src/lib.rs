//! Shellmem Memory - hosted memory service client
//!
//! Talks to the Mem0 platform REST API and exposes it as a
//! `shellmem_core::MemoryBackend`.

pub mod mem0;

pub use mem0::{Mem0Client, Mem0Config, DEFAULT_BASE_URL};
