use std::fmt;

/// Failure of a gateway request, carrying the message shown to the client.
#[derive(Debug)]
pub enum GatewayError {
    /// The symbol has no retrievable history.
    NotFound(String),
    /// The request itself is malformed (e.g. an unknown history range).
    InvalidArgument(String),
    /// Upstream answered but the metadata record was empty.
    UpstreamEmpty(String),
    /// Any other upstream or processing failure.
    UpstreamFailure {
        message: String,
        source: anyhow::Error,
    },
}

impl GatewayError {
    pub fn quote_failure(symbol: &str, source: anyhow::Error) -> Self {
        Self::UpstreamFailure {
            message: format!("Failed to fetch data for {symbol}. Exception: {source:#}"),
            source,
        }
    }

    pub fn history_failure(symbol: &str, source: anyhow::Error) -> Self {
        Self::UpstreamFailure {
            message: format!("Failed to fetch history for {symbol}. Exception: {source:#}"),
            source,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(m) | Self::InvalidArgument(m) | Self::UpstreamEmpty(m) => m,
            Self::UpstreamFailure { message, .. } => message,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::UpstreamEmpty(_) => "upstream_empty",
            Self::UpstreamFailure { .. } => "upstream_failure",
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gateway error ({}): {}", self.kind(), self.message())
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::UpstreamFailure { source, .. } => Some(&**source),
            _ => None,
        }
    }
}
