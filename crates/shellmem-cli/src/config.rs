//! Runtime configuration assembled from CLI flags and the environment

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use secrecy::SecretString;
use shellmem_core::ExecutorConfig;
use shellmem_memory::{Mem0Config, DEFAULT_BASE_URL};

/// Server flags. All are global so they parse before or after `serve`.
#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Memory service API key
    #[arg(long, env = "MEM0_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Memory service base URL
    #[arg(long, env = "MEM0_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    pub memory_url: String,

    /// Subject used when a memory tool call carries no user_id
    #[arg(long, env = "SHELLMEM_DEFAULT_USER", default_value = "default_user", global = true)]
    pub default_user: String,

    /// Process-tree helper script (defaults to the one installed next to the binary)
    #[arg(long, env = "SHELLMEM_HELPER", global = true)]
    pub helper: Option<PathBuf>,

    /// Kill child processes that run longer than this many seconds (off by default)
    #[arg(long, env = "SHELLMEM_COMMAND_TIMEOUT", global = true)]
    pub command_timeout: Option<u64>,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            api_key: None,
            memory_url: DEFAULT_BASE_URL.to_string(),
            default_user: "default_user".to_string(),
            helper: None,
            command_timeout: None,
        }
    }
}

impl ServeArgs {
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            helper: self.helper.clone(),
            timeout: self.command_timeout.map(Duration::from_secs),
            ..ExecutorConfig::default()
        }
    }

    pub fn memory_config(&self) -> Mem0Config {
        Mem0Config {
            base_url: self.memory_url.clone(),
            api_key: self
                .api_key
                .as_ref()
                .filter(|k| !k.is_empty())
                .map(|k| SecretString::new(k.clone())),
        }
    }
}
