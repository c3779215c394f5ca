use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Embedded default configuration.
const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

/// Env var naming an overlay file to use instead of the default location.
pub const CONFIG_ENV_VAR: &str = "CMDGATE_CONFIG";

/// Overlay location used when neither `--config` nor `$CMDGATE_CONFIG` is set.
const DEFAULT_OVERLAY_PATH: &str = "~/.config/cmdgate/config.toml";

// ── Final (merged) config types ──

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub permissions: Permissions,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// NDJSON audit log path; empty disables auditing. `~` and `$VAR` expand.
    pub audit_log: String,
    /// Inputs longer than this are only evaluated up to the cap.
    pub max_input_bytes: usize,
    /// Wall-clock budget for tokenizing one command.
    pub tokenize_budget_ms: u64,
    /// Tools whose input is a shell command line.
    pub shell_tools: Vec<String>,
    /// Escalate Allow → Ask for segments that redirect output to a file.
    pub redirection_escalates: bool,
    /// Records buffered for the audit writer before new ones are dropped.
    pub audit_queue_capacity: usize,
    /// How long shutdown waits for buffered audit records to be written.
    pub audit_flush_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            audit_log: String::new(),
            max_input_bytes: 64 * 1024,
            tokenize_budget_ms: 50,
            shell_tools: vec!["Bash".into()],
            redirection_escalates: true,
            audit_queue_capacity: 1024,
            audit_flush_timeout_ms: 200,
        }
    }
}

impl Settings {
    /// Expanded audit log path, `None` when auditing is disabled.
    pub fn audit_log_path(&self) -> Option<PathBuf> {
        if self.audit_log.trim().is_empty() {
            None
        } else {
            Some(expand_path(&self.audit_log))
        }
    }
}

/// The three pattern lists, e.g. `allow = ["Bash(kubectl get:*)"]`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Permissions {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub ask: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

// ── Overlay types (user config that merges with defaults) ──

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigOverlay {
    #[serde(default)]
    settings: SettingsOverlay,
    #[serde(default)]
    permissions: PermissionsOverlay,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SettingsOverlay {
    audit_log: Option<String>,
    max_input_bytes: Option<usize>,
    tokenize_budget_ms: Option<u64>,
    shell_tools: Option<Vec<String>>,
    redirection_escalates: Option<bool>,
    audit_queue_capacity: Option<usize>,
    audit_flush_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PermissionsOverlay {
    #[serde(default)]
    replace: bool,
    #[serde(default)]
    allow: Vec<String>,
    #[serde(default)]
    ask: Vec<String>,
    #[serde(default)]
    deny: Vec<String>,
    #[serde(default)]
    remove_allow: Vec<String>,
    #[serde(default)]
    remove_ask: Vec<String>,
    #[serde(default)]
    remove_deny: Vec<String>,
}

/// Where an overlay comes from, and whether its absence is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OverlaySource {
    path: PathBuf,
    required: bool,
}

// ── Merge logic ──

/// Merge a user list into a default list.
/// In replace mode: user list replaces default entirely.
/// In merge mode: remove items first, then extend with additions (deduped).
fn merge_list(base: &mut Vec<String>, add: Vec<String>, remove: &[String], replace: bool) {
    if replace {
        *base = add;
    } else {
        base.retain(|item| !remove.contains(item));
        for item in add {
            if !base.contains(&item) {
                base.push(item);
            }
        }
    }
}

/// Expand `~` and environment variables in a configured path.
pub fn expand_path(raw: &str) -> PathBuf {
    let expanded = shellexpand::full(raw).unwrap_or_else(|_| shellexpand::tilde(raw));
    PathBuf::from(expanded.as_ref())
}

impl Config {
    /// Load the default embedded configuration.
    pub fn default_config() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded default config must parse")
    }

    /// Load configuration with resolution order:
    /// 1. Start with embedded defaults
    /// 2. Merge the user overlay from `explicit`, else `$CMDGATE_CONFIG`,
    ///    else `~/.config/cmdgate/config.toml` (if it exists)
    ///
    /// User config merges with defaults: lists extend, scalars override.
    /// Set `replace = true` in `[permissions]` to replace the default lists.
    /// Use `remove_<list>` to subtract specific patterns from defaults.
    ///
    /// An explicitly named overlay that is missing is an error; the default
    /// location being absent is not.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let source = Self::overlay_source(explicit, std::env::var(CONFIG_ENV_VAR).ok());
        let mut config = Self::default_config();
        if let Some(overlay) = Self::read_overlay(&source)? {
            config.apply_overlay(overlay);
        }
        Ok(config)
    }

    fn overlay_source(explicit: Option<&Path>, env_value: Option<String>) -> OverlaySource {
        if let Some(path) = explicit {
            return OverlaySource {
                path: path.to_path_buf(),
                required: true,
            };
        }
        match env_value.filter(|v| !v.trim().is_empty()) {
            Some(value) => OverlaySource {
                path: expand_path(&value),
                required: true,
            },
            None => OverlaySource {
                path: expand_path(DEFAULT_OVERLAY_PATH),
                required: false,
            },
        }
    }

    fn read_overlay(source: &OverlaySource) -> Result<Option<ConfigOverlay>, ConfigError> {
        let path = &source.path;
        if !path.exists() {
            if source.required {
                return Err(ConfigError::Missing { path: path.clone() });
            }
            return Ok(None);
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let overlay = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        Ok(Some(overlay))
    }

    /// Apply an overlay on top of this config (merge semantics).
    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        // Settings: scalar overrides
        let s = overlay.settings;
        if let Some(v) = s.audit_log {
            self.settings.audit_log = v;
        }
        if let Some(v) = s.max_input_bytes {
            self.settings.max_input_bytes = v;
        }
        if let Some(v) = s.tokenize_budget_ms {
            self.settings.tokenize_budget_ms = v;
        }
        if let Some(v) = s.shell_tools {
            self.settings.shell_tools = v;
        }
        if let Some(v) = s.redirection_escalates {
            self.settings.redirection_escalates = v;
        }
        if let Some(v) = s.audit_queue_capacity {
            self.settings.audit_queue_capacity = v;
        }
        if let Some(v) = s.audit_flush_timeout_ms {
            self.settings.audit_flush_timeout_ms = v;
        }

        // Permissions
        let p = overlay.permissions;
        merge_list(
            &mut self.permissions.allow,
            p.allow,
            &p.remove_allow,
            p.replace,
        );
        merge_list(&mut self.permissions.ask, p.ask, &p.remove_ask, p.replace);
        merge_list(&mut self.permissions.deny, p.deny, &p.remove_deny, p.replace);
    }

    /// Apply an overlay from a TOML string.
    pub fn apply_overlay_str(&mut self, toml_str: &str) -> Result<(), ConfigError> {
        let overlay: ConfigOverlay = toml::from_str(toml_str).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        self.apply_overlay(overlay);
        Ok(())
    }
}
