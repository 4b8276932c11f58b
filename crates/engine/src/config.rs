//! Engine configuration (§6 "Configuration (enumerated)"), serde-deserializable
//! from TOML the same way `sqruff`'s rule configuration loads a flat,
//! `#[serde(default)]`-backed settings struct from a file on disk.

use std::path::Path;

use serde::{Deserialize, Serialize};

use sqlexec_scheduler::SchedulerConfig;

fn default_thread_count() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

fn default_partitions() -> usize {
    4
}

/// Every field of §6's configuration table. `zone_offset` is stored in
/// minutes (the original's offset granularity), applied only to a
/// `TIMESTAMP WITH TIME ZONE` literal that carries no explicit offset of its
/// own (S7); a bare `TIMESTAMP` literal never consults it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub thread_count: usize,
    pub core_affinity: bool,
    pub initial_core: usize,
    pub assign_numa_nodes_uniformly: bool,
    pub default_partitions: usize,
    pub zone_offset_minutes: i32,
    pub normalize_float: bool,
    pub trace_external_log: bool,
    pub enable_index_join: bool,
    pub lob_session_root: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thread_count: default_thread_count(),
            core_affinity: false,
            initial_core: 0,
            assign_numa_nodes_uniformly: false,
            default_partitions: default_partitions(),
            zone_offset_minutes: 0,
            normalize_float: true,
            trace_external_log: false,
            enable_index_join: false,
            lob_session_root: None,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Slice of this config the scheduler crate actually needs; kept as a
    /// conversion rather than a shared type so `sqlexec-scheduler` never
    /// depends on `sqlexec-engine` (see `SchedulerConfig`'s own doc comment).
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            thread_count: self.thread_count,
            core_affinity: self.core_affinity,
            initial_core: self.initial_core,
            assign_numa_nodes_uniformly: self.assign_numa_nodes_uniformly,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_populated_without_any_toml() {
        let config = EngineConfig::default();
        assert!(config.thread_count >= 1);
        assert_eq!(config.default_partitions, 4);
        assert!(config.normalize_float);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults_for_missing_fields() {
        let config = EngineConfig::from_toml_str("thread_count = 4\ncore_affinity = true\n").unwrap();
        assert_eq!(config.thread_count, 4);
        assert!(config.core_affinity);
        assert_eq!(config.default_partitions, 4);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = EngineConfig { zone_offset_minutes: 540, lob_session_root: Some("/tmp/lob".into()), ..EngineConfig::default() };
        let text = toml::to_string(&config).unwrap();
        let back = EngineConfig::from_toml_str(&text).unwrap();
        assert_eq!(back.zone_offset_minutes, 540);
        assert_eq!(back.lob_session_root.as_deref(), Some("/tmp/lob"));
    }
}
