use std::{collections::HashMap, fmt, sync::Arc};

use shared::{
    domain::{FileDescriptor, FileRecord},
    error::ConfigError,
};

use crate::transport::TransferRequest;

const DEFAULT_EVENT_CAPACITY: usize = 1024;
const DEFAULT_FIELD_NAME: &str = "file";

#[derive(Clone)]
pub enum FieldSource<T> {
    Fixed(T),
    PerRecord(Arc<dyn Fn(&FileRecord) -> T + Send + Sync>),
}

impl<T: Clone> FieldSource<T> {
    pub fn resolve(&self, record: &FileRecord) -> T {
        match self {
            Self::Fixed(value) => value.clone(),
            Self::PerRecord(compute) => compute(record),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for FieldSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            Self::PerRecord(_) => f.write_str("PerRecord(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub action: String,
    pub name: FieldSource<String>,
    pub data: FieldSource<HashMap<String, String>>,
    pub headers: HashMap<String, String>,
    pub with_credentials: bool,
}

impl TransferOptions {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            name: FieldSource::Fixed(DEFAULT_FIELD_NAME.to_string()),
            data: FieldSource::Fixed(HashMap::new()),
            headers: HashMap::new(),
            with_credentials: false,
        }
    }

    pub(crate) fn request_for(&self, record: &FileRecord) -> TransferRequest {
        TransferRequest {
            record: record.clone(),
            file: record.file.clone(),
            action: self.action.clone(),
            name: self.name.resolve(record),
            data: self.data.resolve(record),
            headers: self.headers.clone(),
            with_credentials: self.with_credentials,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Maximum number of files in the list; `0` means unlimited.
    pub limit: usize,
    pub auto_upload: bool,
    /// Field of a successful response whose value replaces the record url.
    pub response_url_key: Option<String>,
    pub accept: Option<String>,
    pub default_file_list: Vec<FileDescriptor>,
    pub event_capacity: usize,
    pub transfer: TransferOptions,
}

impl UploaderConfig {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            limit: 0,
            auto_upload: true,
            response_url_key: None,
            accept: None,
            default_file_list: Vec::new(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            transfer: TransferOptions::new(action),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transfer.action.trim().is_empty() {
            return Err(ConfigError::EmptyAction);
        }
        if let FieldSource::Fixed(name) = &self.transfer.name {
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyFieldName);
            }
        }
        if self
            .response_url_key
            .as_deref()
            .is_some_and(|key| key.is_empty())
        {
            return Err(ConfigError::EmptyResponseUrlKey);
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::ZeroEventCapacity);
        }
        if let Some(value) = self
            .transfer
            .headers
            .iter()
            .find_map(|(name, value)| name.trim().is_empty().then(|| value.clone()))
        {
            return Err(ConfigError::EmptyHeaderName { value });
        }
        Ok(())
    }
}
