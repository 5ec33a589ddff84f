use thiserror::Error;

/// Invalid uploader configuration. This is the only failure the core reports
/// as an error; everything else ends up as record state or a notification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("upload action must not be empty")]
    EmptyAction,
    #[error("upload field name must not be empty")]
    EmptyFieldName,
    #[error("response url key must not be empty when set")]
    EmptyResponseUrlKey,
    #[error("event capacity must be greater than zero")]
    ZeroEventCapacity,
    #[error("header name must not be empty (value {value:?})")]
    EmptyHeaderName { value: String },
}
