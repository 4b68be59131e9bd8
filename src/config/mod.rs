/// Direct database connection and schema provisioning
pub mod database;

/// Platform endpoint and public key from environment variables
pub mod platform;

/// Cache and realtime tuning loaded from the TOML settings file
pub mod settings;
