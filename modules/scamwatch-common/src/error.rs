use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum ScamwatchError {
    #[error("Unknown {kind}: {value:?}")]
    UnknownVariant { kind: &'static str, value: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ScamwatchError {
    pub(crate) fn unknown(kind: &'static str, value: &str) -> Self {
        ScamwatchError::UnknownVariant {
            kind,
            value: value.to_string(),
        }
    }
}
