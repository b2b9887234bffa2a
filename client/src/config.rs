//! Configuration management for the client.

use autopatch_engine::{FieldDef, FieldType, FormConfig};
use std::env;
use std::path::PathBuf;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Form settings shared with the engine
    pub form: FormConfig,
    /// SQLite connection URL for the structured backend
    pub database_url: String,
    /// Directory holding key-value store files
    pub storage_dir: PathBuf,
    /// Fields bound to the form
    pub fields: Vec<FieldDef>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let action = lookup("AUTOPATCH_ACTION").ok_or(ConfigError::MissingAction)?;
        let mut form = FormConfig::new(action);

        if let Some(events) = lookup("AUTOPATCH_GET_WHEN") {
            form = form.with_get_when(&events);
        }

        if let Some(content_type) = lookup("AUTOPATCH_CONTENT_TYPE") {
            let content_type = content_type
                .parse()
                .map_err(|_| ConfigError::InvalidContentType(content_type))?;
            form = form.with_content_type(content_type);
        }

        if let Some(flag) = lookup("AUTOPATCH_WITH_CREDENTIALS") {
            form = form.with_credentials(parse_flag("AUTOPATCH_WITH_CREDENTIALS", &flag)?);
        }

        if let Some(ms) = lookup("AUTOPATCH_DEBOUNCE_MS") {
            let ms = ms
                .parse()
                .map_err(|_| ConfigError::InvalidNumber("AUTOPATCH_DEBOUNCE_MS"))?;
            form = form.with_debounce_ms(ms);
        }

        if let Some(max) = lookup("AUTOPATCH_MAX_HISTORY") {
            let max = max
                .parse()
                .map_err(|_| ConfigError::InvalidNumber("AUTOPATCH_MAX_HISTORY"))?;
            form = form.with_max_history(max);
        }

        if let Some(flag) = lookup("AUTOPATCH_USE_LOCAL_STORAGE") {
            form = form.with_local_storage(parse_flag("AUTOPATCH_USE_LOCAL_STORAGE", &flag)?);
        }

        form.validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let database_url = lookup("AUTOPATCH_DATABASE_URL")
            .unwrap_or_else(|| "sqlite://autopatch.db?mode=rwc".to_string());

        let storage_dir = lookup("AUTOPATCH_STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let fields = match lookup("AUTOPATCH_FIELDS") {
            Some(list) => parse_fields(&list)?,
            None => Vec::new(),
        };

        Ok(Self {
            form,
            database_url,
            storage_dir,
            fields,
        })
    }
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidFlag(name)),
    }
}

/// Parse a field list such as `$.name:string!,$.age:int,$.notes`.
///
/// The type defaults to `json`; a trailing `!` marks the field required.
pub fn parse_fields(list: &str) -> Result<Vec<FieldDef>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|spec| !spec.is_empty())
        .map(|spec| {
            let (spec, required) = match spec.strip_suffix('!') {
                Some(rest) => (rest, true),
                None => (spec, false),
            };
            let (path, field_type) = match spec.split_once(':') {
                Some((path, ty)) => (
                    path,
                    ty.parse::<FieldType>()
                        .map_err(|_| ConfigError::InvalidField(spec.to_string()))?,
                ),
                None => (spec, FieldType::Json),
            };
            if path.is_empty() {
                return Err(ConfigError::InvalidField(spec.to_string()));
            }
            Ok(if required {
                FieldDef::required(path, field_type)
            } else {
                FieldDef::optional(path, field_type)
            })
        })
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("AUTOPATCH_ACTION environment variable is required")]
    MissingAction,

    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    #[error("Invalid boolean value for {0}")]
    InvalidFlag(&'static str),

    #[error("Invalid number for {0}")]
    InvalidNumber(&'static str),

    #[error("Invalid field definition: {0}")]
    InvalidField(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
