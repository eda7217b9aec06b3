//! Policies configuring how requests are executed.

pub mod retry;

pub use retry::RetryConfig;
