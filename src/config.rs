use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{InjectorError, InjectorResult};
use crate::perception::locator::LocatorList;

const CONFIG_FILE_NAME: &str = "autoprompt.toml";
const CONFIG_PATH_ENV: &str = "AUTOPROMPT_CONFIG";

/// Immutable settings shared by every component of one orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectorConfig {
    /// Query parameter that carries the prompt, e.g. `?bg_prompt=...`.
    pub prompt_param: String,
    pub locators: LocatorsConfig,
    pub session: SessionConfig,
    pub timing: TimingConfig,
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            prompt_param: "bg_prompt".into(),
            locators: LocatorsConfig::default(),
            session: SessionConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

/// Ordered fallback selectors. First match wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorsConfig {
    pub input: LocatorList,
    pub submit: LocatorList,
}

impl Default for LocatorsConfig {
    fn default() -> Self {
        Self {
            input: LocatorList::new([
                r#"rich-textarea .ql-editor[contenteditable="true"]"#,
                r#"div.ql-editor[contenteditable="true"]"#,
                r#"div[contenteditable="true"][role="textbox"]"#,
                r#"textarea[aria-label*="prompt" i]"#,
            ]),
            submit: LocatorList::new([
                "button.send-button",
                r#"button[aria-label*="Send" i]"#,
                r#"button[data-test-id="send-button"]"#,
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Elements that only render for a signed-in user.
    pub authenticated_indicators: LocatorList,
    /// Substrings that only ever appear in an actual sign-in page address.
    /// Never use a bare account domain here: signed-in pages link to it too.
    pub login_url_patterns: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            authenticated_indicators: LocatorList::new([
                r#"a[href*="SignOutOptions"]"#,
                r#"a[aria-label*="Google Account"]"#,
                "[data-ogsr-up]",
            ]),
            login_url_patterns: vec![
                "accounts.google.com/signin".into(),
                "accounts.google.com/v3/signin".into(),
                "accounts.google.com/servicelogin".into(),
                "accounts.google.com/interactivelogin".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub readiness_timeout_ms: u64,
    /// Settle delay between the input appearing and the first write.
    pub pre_injection_delay_ms: u64,
    /// Settle delay between the write and the first submit attempt.
    pub post_injection_delay_ms: u64,
    pub submit_max_attempts: u32,
    pub submit_retry_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            readiness_timeout_ms: 10_000,
            pre_injection_delay_ms: 500,
            post_injection_delay_ms: 300,
            submit_max_attempts: 3,
            submit_retry_delay_ms: 200,
        }
    }
}

impl TimingConfig {
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    pub fn pre_injection_delay(&self) -> Duration {
        Duration::from_millis(self.pre_injection_delay_ms)
    }

    pub fn post_injection_delay(&self) -> Duration {
        Duration::from_millis(self.post_injection_delay_ms)
    }

    pub fn submit_retry_delay(&self) -> Duration {
        Duration::from_millis(self.submit_retry_delay_ms)
    }
}

impl InjectorConfig {
    pub fn validate(&self) -> InjectorResult<()> {
        if self.prompt_param.trim().is_empty() {
            return Err(InjectorError::Config("prompt_param must not be empty".into()));
        }
        if self.locators.input.is_empty() {
            return Err(InjectorError::Config("locators.input must not be empty".into()));
        }
        if self.locators.submit.is_empty() {
            return Err(InjectorError::Config("locators.submit must not be empty".into()));
        }
        if self.timing.submit_max_attempts == 0 {
            return Err(InjectorError::Config(
                "timing.submit_max_attempts must be at least 1".into(),
            ));
        }
        if self.timing.readiness_timeout_ms == 0 {
            return Err(InjectorError::Config(
                "timing.readiness_timeout_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// How the orchestrator is being hosted. Passed in explicitly, never sniffed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    /// Real page: settle delays apply and the URL flow runs on start.
    Live,
    /// Harness: no settle delays, no automatic URL run.
    Test,
}

fn resolve_config_path() -> InjectorResult<PathBuf> {
    if let Ok(explicit) = std::env::var(CONFIG_PATH_ENV) {
        let candidate = PathBuf::from(explicit);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found via {CONFIG_PATH_ENV}");
            return Ok(candidate);
        }
        tracing::warn!(path = %candidate.display(), "{CONFIG_PATH_ENV} points to a missing file");
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join(CONFIG_FILE_NAME);
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(InjectorError::Config(format!(
        "{CONFIG_FILE_NAME} not found next to executable or in working directory"
    )))
}

pub fn load_config_from(path: &Path) -> InjectorResult<InjectorConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: InjectorConfig = toml::from_str(&content)?;
    config.validate()?;
    tracing::info!(
        path = %path.display(),
        param = %config.prompt_param,
        input_locators = config.locators.input.len(),
        submit_locators = config.locators.submit.len(),
        "config loaded"
    );
    Ok(config)
}

pub fn load_config() -> InjectorResult<InjectorConfig> {
    let path = resolve_config_path()?;
    load_config_from(&path)
}

/// Loads the config, falling back to the built-in defaults on any error.
pub fn load_config_or_default() -> InjectorConfig {
    match load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(error = %e, "using default injector config");
            InjectorConfig::default()
        }
    }
}

pub fn save_config(config: &InjectorConfig, path: &Path) -> InjectorResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = InjectorConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.prompt_param, "bg_prompt");
        assert_eq!(cfg.timing.submit_max_attempts, 3);
        assert_eq!(cfg.timing.submit_retry_delay(), Duration::from_millis(200));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: InjectorConfig = toml::from_str(
            r#"
            prompt_param = "q"

            [timing]
            submit_max_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.prompt_param, "q");
        assert_eq!(cfg.timing.submit_max_attempts, 5);
        assert_eq!(cfg.timing.readiness_timeout_ms, 10_000);
        assert!(!cfg.locators.input.is_empty());
    }

    #[test]
    fn rejects_zero_attempts() {
        let mut cfg = InjectorConfig::default();
        cfg.timing.submit_max_attempts = 0;
        assert!(matches!(cfg.validate(), Err(InjectorError::Config(_))));
    }

    #[test]
    fn rejects_empty_param() {
        let mut cfg = InjectorConfig::default();
        cfg.prompt_param = "  ".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn save_then_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut cfg = InjectorConfig::default();
        cfg.locators.submit = LocatorList::new(["button#go"]);
        save_config(&cfg, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.locators.submit.as_slice(), ["button#go".to_string()]);
    }

    // Only test that touches the process environment.
    #[test]
    fn explicit_config_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "prompt_param = \"from_env\"\n").unwrap();

        std::env::set_var(CONFIG_PATH_ENV, &path);
        let resolved = resolve_config_path();
        let loaded = load_config();
        std::env::remove_var(CONFIG_PATH_ENV);

        assert_eq!(resolved.unwrap(), path);
        let loaded = loaded.unwrap();
        assert_eq!(loaded.prompt_param, "from_env");
        assert_eq!(loaded.timing.submit_max_attempts, 3);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[timing]\nsubmit_max_attempts = 0\n").unwrap();
        assert!(load_config_from(&path).is_err());
    }
}
