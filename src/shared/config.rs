//! Application configuration. Bot credentials, chat routing, feature switches.
//!
//! Sources, later wins: optional TOML file named by `DESK_CONFIG`, then `DESK_*`
//! environment variables (`__` separates nested keys, e.g. `DESK_CHATS__NAVIGATOR`).

use crate::domain::DomainError;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

pub const ENV_PREFIX: &str = "DESK";
pub const CONFIG_PATH_ENV: &str = "DESK_CONFIG";

/// Moscow.
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 3;
/// Percent.
pub const DEFAULT_VAT_RATE: u32 = 22;
pub const DEFAULT_REGISTRY_TIMEOUT_SECS: u64 = 12;
pub const DEFAULT_CONVERTER_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_TICK_SECS: u64 = 30;
pub const DEFAULT_REMINDER_TEXT: &str =
    "Уважаемые партнёры, через 15 минут заканчивается приём заявок";

/// Which relay this instance is. Derived from the configured sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Users pick a category; each category has its own staff chat.
    Category,
    /// One accounting chat next to the navigator.
    Accounting,
    /// Application flow, invoices and the approval chat.
    Application,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CategoryChat {
    pub label: String,
    pub chat_id: i64,
}

/// Staff chat ids. Zero means not configured.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ChatsConfig {
    pub navigator: i64,
    pub accounting: i64,
    pub approval: i64,
    pub categories: Vec<CategoryChat>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ApplicationConfig {
    pub enabled: bool,
    /// Labels offered on the first step of the flow.
    pub companies: Vec<String>,
    pub template_path: Option<String>,
    pub output_dir: Option<String>,
    pub vat_rate: Option<f64>,
    /// First invoice number for a fresh database.
    pub invoice_start: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RegistryConfig {
    pub enabled: Option<bool>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ConverterConfig {
    pub enabled: bool,
    pub soffice_path: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ReminderConfig {
    pub enabled: bool,
    pub hour: Option<u32>,
    pub minute: Option<u32>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BroadcastConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub bot_token: Option<String>,
    pub access_password: Option<String>,
    pub data_dir: Option<String>,
    pub utc_offset_hours: Option<i32>,
    pub chats: ChatsConfig,
    /// Responder user id -> alias shown to users. An empty alias falls back to the username.
    pub responders: HashMap<String, String>,
    /// Compact form for env files: "id,id=alias,...". Merged into `responders`.
    pub responder_aliases: Option<String>,
    pub application: ApplicationConfig,
    pub registry: RegistryConfig,
    pub converter: ConverterConfig,
    pub reminder: ReminderConfig,
    pub scheduler: SchedulerConfig,
    pub broadcast: BroadcastConfig,
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("application.companies")
}

/// Parse "1,2=Anna, 3 = Bob" into id -> alias. Malformed ids are skipped.
pub fn parse_responder_list(s: &str) -> HashMap<i64, String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .filter_map(|part| {
            let (id, alias) = part.split_once('=').unwrap_or((part, ""));
            let id = id.trim().parse::<i64>().ok()?;
            Some((id, alias.trim().to_string()))
        })
        .collect()
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();
        let mut c = config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            c = c.add_source(config::File::with_name(&path));
        }
        c = c.add_source(environment());
        c.build()?.try_deserialize()
    }

    /// Parse a TOML document (no environment overlay).
    pub fn from_toml_str(toml: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// Startup requirements: a bot token and the shared access password.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.bot_token().is_none() {
            return Err(DomainError::Config(format!(
                "bot token is not set ({}_BOT_TOKEN)",
                ENV_PREFIX
            )));
        }
        if self.access_password().is_none() {
            return Err(DomainError::Config(format!(
                "access password is not set ({}_ACCESS_PASSWORD)",
                ENV_PREFIX
            )));
        }
        if self.profile() == Profile::Application && self.application.companies.is_empty() {
            return Err(DomainError::Config(
                "application.companies must list at least one company".into(),
            ));
        }
        Ok(())
    }

    pub fn bot_token(&self) -> Option<&str> {
        self.bot_token.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn access_password(&self) -> Option<&str> {
        self.access_password
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn profile(&self) -> Profile {
        if self.application.enabled {
            Profile::Application
        } else if !self.chats.categories.is_empty() {
            Profile::Category
        } else {
            Profile::Accounting
        }
    }

    pub fn data_dir_or_default(&self) -> PathBuf {
        PathBuf::from(self.data_dir.as_deref().unwrap_or("./data"))
    }

    pub fn utc_offset_hours_or_default(&self) -> i32 {
        self.utc_offset_hours.unwrap_or(DEFAULT_UTC_OFFSET_HOURS)
    }

    /// Responder id -> alias, table entries override the compact list.
    pub fn responders(&self) -> HashMap<i64, String> {
        let mut out = self
            .responder_aliases
            .as_deref()
            .map(parse_responder_list)
            .unwrap_or_default();
        for (id, alias) in &self.responders {
            if let Ok(id) = id.trim().parse::<i64>() {
                out.insert(id, alias.trim().to_string());
            }
        }
        out
    }

    /// Every staff chat this instance serves (navigator first), zeros skipped.
    pub fn staff_chats(&self) -> Vec<i64> {
        let mut chats = vec![self.chats.navigator, self.chats.accounting, self.chats.approval];
        chats.extend(self.chats.categories.iter().map(|c| c.chat_id));
        let mut seen = std::collections::HashSet::new();
        chats.retain(|&c| c != 0 && seen.insert(c));
        chats
    }

    /// Staff chats that receive relayed user messages besides the navigator,
    /// in lookup order for reply mirroring.
    pub fn mirror_chats(&self) -> Vec<i64> {
        let mut chats: Vec<i64> = self.chats.categories.iter().map(|c| c.chat_id).collect();
        chats.push(self.chats.accounting);
        chats.retain(|&c| c != 0 && c != self.chats.navigator);
        chats
    }

    pub fn category_chat(&self, label: &str) -> Option<i64> {
        self.chats
            .categories
            .iter()
            .find(|c| c.label == label)
            .map(|c| c.chat_id)
            .filter(|&c| c != 0)
    }

    /// VAT percent. Non-finite values fall back to the default.
    pub fn vat_rate_or_default(&self) -> Decimal {
        self.application
            .vat_rate
            .and_then(|r| Decimal::try_from(r).ok())
            .map(|r| r.round_dp(4))
            .unwrap_or_else(|| Decimal::from(DEFAULT_VAT_RATE))
    }

    pub fn invoice_start_or_default(&self) -> i64 {
        self.application.invoice_start.unwrap_or(1)
    }

    pub fn template_path_or_default(&self) -> PathBuf {
        PathBuf::from(
            self.application
                .template_path
                .as_deref()
                .unwrap_or("templates/invoice_template.xlsx"),
        )
    }

    pub fn output_dir_or_default(&self) -> PathBuf {
        self.application
            .output_dir
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.data_dir_or_default().join("invoices"))
    }

    pub fn registry_enabled(&self) -> bool {
        self.registry.enabled.unwrap_or(true)
    }

    pub fn registry_base_url_or_default(&self) -> String {
        self.registry
            .base_url
            .clone()
            .unwrap_or_else(|| "https://www.rusprofile.ru".to_string())
    }

    pub fn registry_timeout_secs_or_default(&self) -> u64 {
        self.registry
            .timeout_secs
            .unwrap_or(DEFAULT_REGISTRY_TIMEOUT_SECS)
    }

    pub fn converter_timeout_secs_or_default(&self) -> u64 {
        self.converter
            .timeout_secs
            .unwrap_or(DEFAULT_CONVERTER_TIMEOUT_SECS)
    }

    /// Local reminder time (hour, minute). Defaults to 15:35.
    pub fn reminder_time_or_default(&self) -> (u32, u32) {
        (
            self.reminder.hour.unwrap_or(15).min(23),
            self.reminder.minute.unwrap_or(35).min(59),
        )
    }

    pub fn reminder_text_or_default(&self) -> String {
        self.reminder
            .text
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REMINDER_TEXT.to_string())
    }

    pub fn tick_secs_or_default(&self) -> u64 {
        self.scheduler.tick_secs.unwrap_or(DEFAULT_TICK_SECS).max(1)
    }
}
