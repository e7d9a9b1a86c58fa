//! Options advertised by the engine during the UCI handshake

use std::collections::BTreeMap;

use serde::Serialize;

/// One `option name ... type ...` descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineOption {
    #[serde(rename = "type")]
    pub kind: String,
    pub default: Option<String>,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

/// What the engine said it supports. Built once while negotiating and never
/// modified afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineCapabilities {
    pub name: Option<String>,
    pub options: BTreeMap<String, EngineOption>,
    pub threads_supported: bool,
}

impl EngineCapabilities {
    pub(crate) fn record_option(&mut self, name: String, option: EngineOption) {
        if name.eq_ignore_ascii_case("Threads") {
            self.threads_supported = true;
        }
        self.options.insert(name, option);
    }

    pub fn option(&self, name: &str) -> Option<&EngineOption> {
        self.options.get(name)
    }

    /// Advertised upper bound of a spin option
    pub fn max_of(&self, name: &str) -> Option<i64> {
        self.option(name).and_then(|o| o.max)
    }

    /// Option values to apply right after the handshake.
    ///
    /// Hash is only raised on engines whose limit exceeds the 16 MB some
    /// builds are locked to, and Threads only when more than one is allowed.
    pub fn startup_settings(&self, multipv: u32, hash_mb: u32, max_threads: u32) -> Vec<(String, String)> {
        let mut settings = Vec::new();

        if self.option("MultiPV").is_some() {
            settings.push(("MultiPV".to_string(), multipv.max(1).to_string()));
        }

        if let Some(max) = self.max_of("Hash") {
            if max > 16 {
                let hash = (hash_mb as i64).min(max);
                settings.push(("Hash".to_string(), hash.to_string()));
            }
        }

        if self.threads_supported {
            if let Some(max) = self.max_of("Threads") {
                if max > 1 {
                    let threads = (max_threads.max(1) as i64).min(max);
                    settings.push(("Threads".to_string(), threads.to_string()));
                }
            }
        }

        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spin(default: i64, min: i64, max: i64) -> EngineOption {
        EngineOption {
            kind: "spin".into(),
            default: Some(default.to_string()),
            min: Some(min),
            max: Some(max),
        }
    }

    #[test]
    fn test_threads_option_sets_flag() {
        let mut caps = EngineCapabilities::default();
        caps.record_option("Hash".into(), spin(16, 1, 33554432));
        assert!(!caps.threads_supported);

        caps.record_option("Threads".into(), spin(1, 1, 1024));
        assert!(caps.threads_supported);
        assert_eq!(caps.max_of("Threads"), Some(1024));
    }

    #[test]
    fn test_startup_settings_respect_limits() {
        let mut caps = EngineCapabilities::default();
        caps.record_option("MultiPV".into(), spin(1, 1, 500));
        caps.record_option("Hash".into(), spin(16, 1, 2048));
        caps.record_option("Threads".into(), spin(1, 1, 1024));

        let settings = caps.startup_settings(1, 64, 2);
        assert_eq!(
            settings,
            vec![
                ("MultiPV".to_string(), "1".to_string()),
                ("Hash".to_string(), "64".to_string()),
                ("Threads".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_locked_hash_and_single_thread_are_left_alone() {
        let mut caps = EngineCapabilities::default();
        caps.record_option("Hash".into(), spin(16, 1, 16));
        caps.record_option("Threads".into(), spin(1, 1, 1));

        assert!(caps.startup_settings(1, 64, 2).is_empty());
    }
}
