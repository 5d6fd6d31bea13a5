use thiserror::Error;

/// Failures raised by an account store.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("account '{0}' not found")]
    NotFound(String),

    #[error("account '{0}' already exists")]
    AlreadyExists(String),

    #[error("invalid username/password for '{0}'")]
    InvalidCredentials(String),

    #[error("balance of account '{0}' would overflow")]
    BalanceOverflow(String),

    #[error("account manager has been closed")]
    Closed,

    #[error("account store error: {0}")]
    Store(String),
}

/// Failures raised by a stock exchange.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("quote not available for '{0}'")]
    QuoteUnavailable(String),

    #[error("exchange is closed")]
    Closed,
}

/// Misuse of an order queue, or a processor that rejected a dispatched order.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("order queue '{queue}' has no order processor")]
    NoProcessor { queue: String },

    #[error("order processor failed: {0}")]
    Processor(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker is not properly initialized, or has been closed")]
    InvalidState,

    #[error("requested stock, '{0}' does not exist")]
    UnknownInstrument(String),

    #[error("account operation failed: {0}")]
    Account(#[from] AccountError),

    #[error("exchange operation failed: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("order dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),
}

pub type BrokerResult<T> = Result<T, BrokerError>;
