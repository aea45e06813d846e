//! Global configuration parsing and validation.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Assignment sweep settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AssignmentConfig {
    /// Interval of the safety-net assignment pass; 0 disables the sweep.
    #[serde(default = "default_assignment_sweep")]
    pub sweep_interval_seconds: u64,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: default_assignment_sweep(),
        }
    }
}

fn default_assignment_sweep() -> u64 {
    5
}

/// Idle-waiting abandonment settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AbandonConfig {
    /// Whether the abandon sweep runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// A waiting conversation idle for longer than this is abandoned.
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_seconds: u64,
    /// How often the sweep looks for idle conversations.
    #[serde(default = "default_abandon_sweep")]
    pub sweep_interval_seconds: u64,
}

impl Default for AbandonConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            wait_timeout_seconds: default_wait_timeout(),
            sweep_interval_seconds: default_abandon_sweep(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_wait_timeout() -> u64 {
    900
}

fn default_abandon_sweep() -> u64 {
    30
}

/// Dashboard statistics windows.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MetricsConfig {
    /// Trailing window for the average first-response time.
    #[serde(default = "default_response_window")]
    pub response_window_hours: u32,
    /// Trailing window for the satisfaction score.
    #[serde(default = "default_satisfaction_window")]
    pub satisfaction_window_days: u32,
    /// How long a computed snapshot is served before recomputation.
    #[serde(default = "default_cache_seconds")]
    pub cache_seconds: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            response_window_hours: default_response_window(),
            satisfaction_window_days: default_satisfaction_window(),
            cache_seconds: default_cache_seconds(),
        }
    }
}

fn default_response_window() -> u32 {
    24
}

fn default_satisfaction_window() -> u32 {
    30
}

fn default_cache_seconds() -> u64 {
    5
}

/// Department to role routing.
///
/// A department listed here may only be served by agents whose role name
/// appears in its list. Departments absent from the map accept every role.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RoutingConfig {
    /// Department tag mapped to eligible role names.
    #[serde(default)]
    pub departments: HashMap<String, Vec<String>>,
}

impl RoutingConfig {
    /// Whether a role name may serve the given department. Departments with
    /// no mapping are open to every role.
    #[must_use]
    pub fn role_serves(&self, department: &str, role_name: &str) -> bool {
        self.departments
            .get(department)
            .is_none_or(|roles| roles.iter().any(|r| r == role_name))
    }
}

/// Keyword lists used to infer priority and department at intake.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TriageConfig {
    /// Keywords that mark a conversation as `urgent`.
    #[serde(default = "default_urgent_keywords")]
    pub urgent_keywords: Vec<String>,
    /// Keywords that mark a conversation as `high`.
    #[serde(default = "default_high_keywords")]
    pub high_keywords: Vec<String>,
    /// Department tag mapped to keywords that select it.
    #[serde(default = "default_department_keywords")]
    pub department_keywords: Vec<DepartmentKeywords>,
    /// Department used when nothing matches.
    #[serde(default = "default_department")]
    pub default_department: String,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            urgent_keywords: default_urgent_keywords(),
            high_keywords: default_high_keywords(),
            department_keywords: default_department_keywords(),
            default_department: default_department(),
        }
    }
}

/// Keyword rule selecting a department.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DepartmentKeywords {
    /// Department tag assigned on match.
    pub department: String,
    /// Case-insensitive substrings that trigger the rule.
    pub keywords: Vec<String>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| (*w).to_owned()).collect()
}

fn default_urgent_keywords() -> Vec<String> {
    words(&["urgent", "spoedeisend", "asap", "emergency", "probleem", "fout"])
}

fn default_high_keywords() -> Vec<String> {
    words(&["complaint", "klacht", "refund", "terugbetaling", "cancel", "opzeggen"])
}

fn default_department_keywords() -> Vec<DepartmentKeywords> {
    vec![
        DepartmentKeywords {
            department: "billing".into(),
            keywords: words(&["betal", "payment", "prijs"]),
        },
        DepartmentKeywords {
            department: "technical".into(),
            keywords: words(&["technisch", "fout", "bug"]),
        },
        DepartmentKeywords {
            department: "sales".into(),
            keywords: words(&["verkoop", "abonnement", "premium"]),
        },
    ]
}

fn default_department() -> String {
    "general".into()
}

fn default_retention_days() -> u32 {
    90
}

fn default_http_port() -> u16 {
    3000
}

fn default_ipc_name() -> String {
    "livechat".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/livechat.db")
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// `SQLite` database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// HTTP port for the JSON API.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Named pipe / Unix socket identifier for `livechat-ctl`.
    #[serde(default = "default_ipc_name")]
    pub ipc_name: String,
    /// Shared secret expected on IPC commands; `None` disables the check.
    #[serde(default)]
    pub ipc_auth_token: Option<String>,
    /// Operator identifiers allowed to call administrative routes.
    pub admin_user_ids: Vec<String>,
    /// Days after close/abandon before a conversation is purged.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Assignment sweep settings.
    #[serde(default)]
    pub assignment: AssignmentConfig,
    /// Idle-waiting abandonment settings.
    #[serde(default)]
    pub abandon: AbandonConfig,
    /// Dashboard statistics windows.
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Department to role routing.
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Intake triage keywords.
    #[serde(default)]
    pub triage: TriageConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate that an operator may use administrative operations.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unauthorized` if the id is not in the allow-list.
    pub fn ensure_admin(&self, user_id: &str) -> Result<()> {
        if self.admin_user_ids.iter().any(|id| id == user_id) {
            Ok(())
        } else {
            Err(AppError::Unauthorized("caller is not an administrator".into()))
        }
    }

    /// Idle time after which a waiting conversation is abandoned.
    #[must_use]
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.abandon.wait_timeout_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.admin_user_ids.is_empty() {
            return Err(AppError::Config("admin_user_ids must not be empty".into()));
        }

        if self.abandon.enabled && self.abandon.sweep_interval_seconds == 0 {
            return Err(AppError::Config(
                "abandon.sweep_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.metrics.response_window_hours == 0 || self.metrics.satisfaction_window_days == 0 {
            return Err(AppError::Config(
                "metrics windows must be greater than zero".into(),
            ));
        }

        if let Some((department, _)) = self
            .routing
            .departments
            .iter()
            .find(|(_, roles)| roles.is_empty())
        {
            return Err(AppError::Config(format!(
                "routing.departments.{department} must list at least one role"
            )));
        }

        Ok(())
    }
}
