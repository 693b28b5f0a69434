//! Runtime tuning knobs.

use serde::{Deserialize, Serialize};

/// Default threshold for slow-hook warnings
fn default_slow_hook_warning_ms() -> u64 {
    250
}

/// Settings for a [`PluginRuntime`](crate::PluginRuntime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// `initialize` and `peer_setup` calls slower than this are logged at
    /// `warn`. Plugins are never interrupted. 0 disables the warning.
    #[serde(default = "default_slow_hook_warning_ms")]
    pub slow_hook_warning_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            slow_hook_warning_ms: default_slow_hook_warning_ms(),
        }
    }
}

impl RuntimeConfig {
    /// Checks the settings for obviously wrong values.
    pub fn validate(&self) -> Result<(), String> {
        if self.slow_hook_warning_ms > 60_000 {
            return Err(format!(
                "slow_hook_warning_ms must be at most 60000, got {}",
                self.slow_hook_warning_ms
            ));
        }
        Ok(())
    }
}
