use thiserror::Error;

use crate::backtest::{BacktestError, ValidationError};

/// Service layer error types
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Backtest failed: {0}")]
    Backtest(#[from] BacktestError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::ExchangeError;

    #[test]
    fn test_error_messages_name_the_layer() {
        let err = ServiceError::from(ValidationError::ZeroConcurrency);
        assert!(err.to_string().starts_with("Invalid request:"));

        let err = ServiceError::from(BacktestError::from(ExchangeError::RateLimit("429".into())));
        let message = err.to_string();
        assert!(message.starts_with("Backtest failed:"));
        assert!(message.contains("429"));
    }
}
