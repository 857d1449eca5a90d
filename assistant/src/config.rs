use std::path::PathBuf;
use std::time::Duration;

use crate::actors::registry::RegistryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_env(value: &str) -> anyhow::Result<Self> {
        match value {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(anyhow::anyhow!(
                "Invalid LOG_FORMAT '{other}'. Expected 'pretty' or 'json'"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Period between background rounds
    pub heartbeat_interval: Duration,
    pub heartbeat_enabled: bool,
    /// Sliding window for follow-up user messages
    pub debounce: Duration,
    /// Gate for the coordination verbs
    pub actors_enabled: bool,
    pub kill_grace: Duration,
    pub max_live_actors: usize,
    pub reap_after: Duration,
    pub reap_interval: Duration,
    /// Model invocations a worker may make before it fails
    pub worker_max_steps: usize,
    /// Model invocations per executive or background pass
    pub agent_max_steps: usize,
    /// Receive timeout of the long-lived actors' mailbox loops
    pub executive_poll: Duration,
    pub llm_base_url: String,
    pub llm_model: String,
    /// Only the binary requires it
    pub llm_api_key: Option<String>,
    /// Root for the file tools
    pub workspace_dir: PathBuf,
    pub log_format: LogFormat,
}

impl RuntimeConfig {
    /// Read every key from the process environment; call `dotenvy::dotenv()` first.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same keys and defaults as [`RuntimeConfig::from_env`], read through `lookup`
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvSource(lookup);
        let workspace_dir = match env.get("WORKSPACE_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => std::env::current_dir()
                .map_err(|e| anyhow::anyhow!("Failed to resolve current directory: {e}"))?,
        };

        Ok(Self {
            heartbeat_interval: Duration::from_secs(env.parse("HEARTBEAT_INTERVAL", 900)?),
            heartbeat_enabled: env.bool("HEARTBEAT_ENABLED", true)?,
            debounce: env.seconds_f64("DEBOUNCE_SECONDS", 5.0)?,
            actors_enabled: env.bool("ACTORS_ENABLED", true)?,
            kill_grace: Duration::from_millis(env.parse("KILL_GRACE_MS", 5000)?),
            max_live_actors: env.parse("MAX_LIVE_ACTORS", 32)?,
            reap_after: Duration::from_secs(env.parse("REAP_AFTER_SECS", 3600)?),
            reap_interval: Duration::from_secs(env.parse("REAP_INTERVAL_SECS", 60)?),
            worker_max_steps: env.parse("WORKER_MAX_STEPS", 24)?,
            agent_max_steps: env.parse("AGENT_MAX_STEPS", 16)?,
            executive_poll: Duration::from_secs(env.parse("EXECUTIVE_POLL_SECS", 30)?),
            llm_base_url: env.str("LLM_BASE_URL", "https://openrouter.ai/api/v1"),
            llm_model: env.str("LLM_MODEL", "openrouter/auto"),
            llm_api_key: env.get("LLM_API_KEY").filter(|key| !key.is_empty()),
            workspace_dir,
            log_format: LogFormat::from_env(&env.str("LOG_FORMAT", "pretty"))?,
        })
        .and_then(Self::validated)
    }

    /// Millisecond-scale timings, heartbeat off, no sweep
    pub fn for_tests() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(900),
            heartbeat_enabled: false,
            debounce: Duration::from_millis(50),
            actors_enabled: true,
            kill_grace: Duration::from_millis(200),
            max_live_actors: 8,
            reap_after: Duration::from_secs(3600),
            reap_interval: Duration::ZERO,
            worker_max_steps: 8,
            agent_max_steps: 8,
            executive_poll: Duration::from_millis(100),
            llm_base_url: "http://127.0.0.1:0".to_string(),
            llm_model: "scripted".to_string(),
            llm_api_key: None,
            workspace_dir: std::env::temp_dir(),
            log_format: LogFormat::Pretty,
        }
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            kill_grace: self.kill_grace,
            max_live_actors: self.max_live_actors,
            reap_after: self.reap_after,
            reap_interval: self.reap_interval,
            actors_enabled: self.actors_enabled,
            ..RegistryConfig::default()
        }
    }

    fn validated(self) -> anyhow::Result<Self> {
        if self.heartbeat_interval.is_zero() {
            anyhow::bail!("HEARTBEAT_INTERVAL must be at least one second");
        }
        if self.max_live_actors == 0 {
            anyhow::bail!("MAX_LIVE_ACTORS must be at least 1");
        }
        if self.executive_poll.is_zero() {
            anyhow::bail!("EXECUTIVE_POLL_SECS must be at least one second");
        }
        Ok(self)
    }
}

struct EnvSource<F>(F);

impl<F> EnvSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn str(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> anyhow::Result<T>
    where
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(val) => val
                .trim()
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("Failed to parse env var {key}={val}: {e}")),
            None => Ok(default),
        }
    }

    /// Fractional seconds; negative, NaN and infinite values are rejected
    fn seconds_f64(&self, key: &str, default: f64) -> anyhow::Result<Duration> {
        let secs: f64 = self.parse(key, default)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| anyhow::anyhow!("Invalid env var {key}={secs}: {e}"))
    }

    fn bool(&self, key: &str, default: bool) -> anyhow::Result<bool> {
        match self.get(key) {
            Some(val) => match val.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(anyhow::anyhow!(
                    "Failed to parse env var {key}={val}: expected true or false"
                )),
            },
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<RuntimeConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        RuntimeConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = load(&[("WORKSPACE_DIR", "/srv/assistant")]).unwrap();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(900));
        assert!(config.heartbeat_enabled);
        assert_eq!(config.debounce, Duration::from_secs(5));
        assert!(config.actors_enabled);
        assert_eq!(config.kill_grace, Duration::from_millis(5000));
        assert_eq!(config.max_live_actors, 32);
        assert_eq!(config.reap_after, Duration::from_secs(3600));
        assert_eq!(config.reap_interval, Duration::from_secs(60));
        assert_eq!(config.worker_max_steps, 24);
        assert_eq!(config.agent_max_steps, 16);
        assert_eq!(config.executive_poll, Duration::from_secs(30));
        assert_eq!(config.llm_base_url, "https://openrouter.ai/api/v1");
        assert_eq!(config.llm_model, "openrouter/auto");
        assert_eq!(config.llm_api_key, None);
        assert_eq!(config.workspace_dir, PathBuf::from("/srv/assistant"));
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = load(&[
            ("HEARTBEAT_INTERVAL", "60"),
            ("HEARTBEAT_ENABLED", "off"),
            ("DEBOUNCE_SECONDS", " 0.25 "),
            ("ACTORS_ENABLED", "No"),
            ("MAX_LIVE_ACTORS", "4"),
            ("AGENT_MAX_STEPS", "3"),
            ("LLM_API_KEY", "sk-test"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(60));
        assert!(!config.heartbeat_enabled);
        assert_eq!(config.debounce, Duration::from_millis(250));
        assert!(!config.actors_enabled);
        assert_eq!(config.max_live_actors, 4);
        assert_eq!(config.agent_max_steps, 3);
        assert_eq!(config.llm_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.log_format, LogFormat::Json);

        for yes in ["1", "true", "YES", "on"] {
            assert!(load(&[("HEARTBEAT_ENABLED", yes)]).unwrap().heartbeat_enabled);
        }
        assert_eq!(load(&[("LLM_API_KEY", "")]).unwrap().llm_api_key, None);
    }

    #[test]
    fn test_malformed_values_name_the_key() {
        for (key, value) in [
            ("HEARTBEAT_INTERVAL", "abc"),
            ("ACTORS_ENABLED", "maybe"),
            ("DEBOUNCE_SECONDS", "-1"),
            ("DEBOUNCE_SECONDS", "NaN"),
            ("DEBOUNCE_SECONDS", "inf"),
            ("MAX_LIVE_ACTORS", "-3"),
        ] {
            let err = load(&[(key, value)]).unwrap_err().to_string();
            assert!(err.contains(key), "{key}={value} gave: {err}");
        }
        assert!(load(&[("HEARTBEAT_INTERVAL", "0")]).is_err());
        assert!(load(&[("LOG_FORMAT", "xml")]).is_err());
    }

    #[test]
    fn test_from_env_reports_bad_debounce() {
        // The only test in this crate that touches the process environment.
        std::env::set_var("DEBOUNCE_SECONDS", "-1");
        let result = RuntimeConfig::from_env();
        std::env::remove_var("DEBOUNCE_SECONDS");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("DEBOUNCE_SECONDS"), "got: {err}");
    }

    #[test]
    fn test_registry_config_carries_runtime_settings() {
        let config = RuntimeConfig {
            kill_grace: Duration::from_millis(750),
            max_live_actors: 3,
            actors_enabled: false,
            ..RuntimeConfig::for_tests()
        };
        let registry = config.registry_config();
        assert_eq!(registry.kill_grace, Duration::from_millis(750));
        assert_eq!(registry.max_live_actors, 3);
        assert!(!registry.actors_enabled);
        assert!(registry.reap_interval.is_zero());
    }

    #[test]
    fn test_validation_rejects_zero_capacity() {
        let config = RuntimeConfig {
            max_live_actors: 0,
            ..RuntimeConfig::for_tests()
        };
        assert!(config.validated().is_err());
        assert!(RuntimeConfig::for_tests().validated().is_ok());
    }

    #[test]
    fn test_log_format_names() {
        assert_eq!(LogFormat::from_env("json").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_env("pretty").unwrap(), LogFormat::Pretty);
        assert!(LogFormat::from_env("xml").is_err());
    }
}
