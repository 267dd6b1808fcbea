use thiserror::Error;

/// Binance error codes that mean the account cannot cover the order
const INSUFFICIENT_FUNDS_CODES: &[i64] = &[-2018, -2019];

/// Binance error codes for orders rejected on their parameters
const INVALID_ORDER_CODES: &[i64] = &[-1013, -1111, -2021, -4003, -4164];

#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Transport failure (`status` is None) or a non-business HTTP error
    #[error("HTTP error{}: {message}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Http { status: Option<u16>, message: String },

    #[error("Binance API error {code}: {msg}")]
    Api { code: i64, msg: String },

    #[error("Invalid order ({code}): {msg}")]
    InvalidOrder { code: i64, msg: String },

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Market {0} not found")]
    MarketNotFound(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("API credentials required for signed endpoint {0}")]
    MissingCredentials(String),
}

impl ExchangeError {
    /// Map a Binance `{code, msg}` error body to a typed error
    pub fn from_api(code: i64, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        if INSUFFICIENT_FUNDS_CODES.contains(&code) {
            Self::InsufficientFunds(msg)
        } else if INVALID_ORDER_CODES.contains(&code) {
            Self::InvalidOrder { code, msg }
        } else {
            Self::Api { code, msg }
        }
    }

    /// Network errors, 5xx and 429 are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status: None, .. } => true,
            Self::Http {
                status: Some(status),
                ..
            } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_mapping() {
        assert!(matches!(
            ExchangeError::from_api(-2019, "Margin is insufficient."),
            ExchangeError::InsufficientFunds(_)
        ));
        assert!(matches!(
            ExchangeError::from_api(-4164, "notional too small"),
            ExchangeError::InvalidOrder { code: -4164, .. }
        ));
        assert!(matches!(
            ExchangeError::from_api(-1121, "Invalid symbol."),
            ExchangeError::Api { code: -1121, .. }
        ));
    }

    #[test]
    fn test_retryable() {
        let network = ExchangeError::Http {
            status: None,
            message: "connection reset".into(),
        };
        let throttled = ExchangeError::Http {
            status: Some(429),
            message: String::new(),
        };
        let not_found = ExchangeError::Http {
            status: Some(404),
            message: String::new(),
        };

        assert!(network.is_retryable());
        assert!(throttled.is_retryable());
        assert!(!not_found.is_retryable());
        assert!(!ExchangeError::from_api(-2019, "x").is_retryable());
    }

    #[test]
    fn test_display() {
        let err = ExchangeError::Http {
            status: Some(502),
            message: "Bad Gateway".into(),
        };
        assert_eq!(err.to_string(), "HTTP error (502): Bad Gateway");
    }
}
