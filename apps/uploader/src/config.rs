use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;
use upload_core::{FieldSource, UploaderConfig};

const DEFAULT_SETTINGS_FILE: &str = "uploader.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub action: String,
    pub limit: usize,
    pub auto_upload: bool,
    pub response_url_key: Option<String>,
    pub accept: Option<String>,
    pub field_name: String,
    pub data: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub with_credentials: bool,
    pub bearer_token: Option<String>,
    pub max_file_size: Option<u64>,
    pub chunk_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            action: "http://127.0.0.1:8080/upload".into(),
            limit: 0,
            auto_upload: true,
            response_url_key: Some("url".into()),
            accept: None,
            field_name: "file".into(),
            data: HashMap::new(),
            headers: HashMap::new(),
            with_credentials: false,
            bearer_token: None,
            max_file_size: None,
            chunk_size: 64 * 1024,
        }
    }
}

/// Every key is optional; present keys override the defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    action: Option<String>,
    limit: Option<usize>,
    auto_upload: Option<bool>,
    response_url_key: Option<String>,
    accept: Option<String>,
    field_name: Option<String>,
    data: Option<HashMap<String, String>>,
    headers: Option<HashMap<String, String>>,
    with_credentials: Option<bool>,
    bearer_token: Option<String>,
    max_file_size: Option<u64>,
    chunk_size: Option<usize>,
}

impl Settings {
    pub fn uploader_config(&self) -> UploaderConfig {
        let mut config = UploaderConfig::new(self.action.clone());
        config.limit = self.limit;
        config.auto_upload = self.auto_upload;
        config.response_url_key = self.response_url_key.clone();
        config.accept = self.accept.clone();
        config.transfer.name = FieldSource::Fixed(self.field_name.clone());
        config.transfer.data = FieldSource::Fixed(self.data.clone());
        config.transfer.headers = self.headers.clone();
        config.transfer.with_credentials = self.with_credentials;
        config
    }

    fn apply_file(&mut self, file_cfg: FileSettings) {
        if let Some(v) = file_cfg.action {
            self.action = v;
        }
        if let Some(v) = file_cfg.limit {
            self.limit = v;
        }
        if let Some(v) = file_cfg.auto_upload {
            self.auto_upload = v;
        }
        if let Some(v) = file_cfg.response_url_key {
            self.response_url_key = (!v.is_empty()).then_some(v);
        }
        if let Some(v) = file_cfg.accept {
            self.accept = Some(v);
        }
        if let Some(v) = file_cfg.field_name {
            self.field_name = v;
        }
        if let Some(v) = file_cfg.data {
            self.data.extend(v);
        }
        if let Some(v) = file_cfg.headers {
            self.headers.extend(v);
        }
        if let Some(v) = file_cfg.with_credentials {
            self.with_credentials = v;
        }
        if let Some(v) = file_cfg.bearer_token {
            self.bearer_token = Some(v);
        }
        if let Some(v) = file_cfg.max_file_size {
            self.max_file_size = Some(v);
        }
        if let Some(v) = file_cfg.chunk_size {
            self.chunk_size = v;
        }
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("UPLOAD_ACTION") {
            self.action = v;
        }
        if let Some(v) = var("APP__ACTION") {
            self.action = v;
        }
        if let Some(v) = var("APP__LIMIT").and_then(|v| v.parse().ok()) {
            self.limit = v;
        }
        if let Some(v) = var("APP__AUTO_UPLOAD").and_then(|v| parse_bool(&v)) {
            self.auto_upload = v;
        }
        if let Some(v) = var("APP__RESPONSE_URL_KEY") {
            self.response_url_key = (!v.is_empty()).then_some(v);
        }
        if let Some(v) = var("APP__ACCEPT") {
            self.accept = Some(v);
        }
        if let Some(v) = var("APP__FIELD_NAME") {
            self.field_name = v;
        }
        if let Some(v) = var("APP__WITH_CREDENTIALS").and_then(|v| parse_bool(&v)) {
            self.with_credentials = v;
        }
        if let Some(v) = var("UPLOAD_TOKEN") {
            self.bearer_token = Some(v);
        }
        if let Some(v) = var("APP__BEARER_TOKEN") {
            self.bearer_token = Some(v);
        }
        if let Some(v) = var("APP__MAX_FILE_SIZE").and_then(|v| v.parse().ok()) {
            self.max_file_size = Some(v);
        }
        if let Some(v) = var("APP__CHUNK_SIZE").and_then(|v| v.parse().ok()) {
            self.chunk_size = v;
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Defaults, then the settings file, then environment variables. An explicit
/// `path` must exist; the implicit `uploader.toml` is optional.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let (path, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_SETTINGS_FILE), false),
    };
    if required || path.exists() {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
        let file_cfg: FileSettings = toml::from_str(&raw)
            .with_context(|| format!("invalid settings file '{}'", path.display()))?;
        settings.apply_file(file_cfg);
    }

    settings.apply_env(|key| std::env::var(key).ok());
    Ok(settings)
}
