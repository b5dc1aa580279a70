//! Database configuration.

use recordb_engine::TransactionMode;

/// Configuration of a [`Database`](crate::Database).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Database name passed to the engine.
    pub name: String,

    /// Schema version to open at.
    pub version: u64,

    /// Mode used by [`Database::transaction_default`](crate::Database::transaction_default).
    pub default_mode: TransactionMode,

    /// Whether a transaction after `close()` reopens the database.
    pub reopen_after_close: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "recordb".to_string(),
            version: 1,
            default_mode: TransactionMode::ReadOnly,
            reopen_after_close: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the database name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the schema version.
    #[must_use]
    pub const fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Sets the default transaction mode.
    #[must_use]
    pub const fn default_mode(mut self, mode: TransactionMode) -> Self {
        self.default_mode = mode;
        self
    }

    /// Sets whether the database reopens after `close()`.
    #[must_use]
    pub const fn reopen_after_close(mut self, value: bool) -> Self {
        self.reopen_after_close = value;
        self
    }
}
