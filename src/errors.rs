pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The price history is empty. Every session starts from a seed candle.
    #[error("Price history is empty: the session requires a seed candle")]
    HistoryEmpty,

    /// The initial or current balance is not positive. Trading requires a positive balance.
    #[error("Balance must be positive (got: {0})")]
    NegZeroBalance(f64),

    /// The market is closed, positions cannot be opened.
    #[error("Market is closed")]
    MarketClosed,

    /// A manual pump or dump received a non-finite delta.
    #[error("Invalid price delta: {0}")]
    InvalidDelta(f64),

    /// A price is not finite or not strictly positive.
    #[error("Invalid price: {0}")]
    InvalidPrice(f64),

    /// The candle does not respect `low <= min(open, close) <= max(open, close) <= high`.
    #[error("Invalid candle: open {open}, high {high}, low {low}, close {close}")]
    InvalidCandle {
        /// Open price.
        open: f64,
        /// High price.
        high: f64,
        /// Low price.
        low: f64,
        /// Close price.
        close: f64,
    },

    /// A required field was not given to a builder.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// The position was not found.
    #[error("Position #{0} not found")]
    PositionNotFound(u32),

    /// The position is already closed.
    #[error("Position #{0} is already closed")]
    PositionClosed(u32),

    /// The price history capacity must hold at least one candle.
    #[error("History capacity must be positive (got: {0})")]
    InvalidCapacity(usize),

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The volatility tier name is not recognized.
    #[error("Unknown volatility tier: {0}")]
    UnknownTier(String),

    /// The pattern name is not recognized.
    #[error("Unknown pattern: {0}")]
    UnknownPattern(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// TOML deserialization error occurred.
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}
