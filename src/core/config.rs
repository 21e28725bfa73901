use std::env;
use std::time::Duration;

/// Name of the environment variable holding the Exchange account password.
/// Fixed by the surrounding automation; do not rename.
pub const PASSWORD_ENV: &str = "EXCHANGE_ORDER_PASSWORD";

/// Optional Sentry DSN for remote error reporting. Unset disables the sink.
pub const DSN_ENV: &str = "EXCHANGE_AUTO_FORWARD_DSN";

/// Directory that receives the rotating log files.
pub const LOG_DIR_ENV: &str = "EXCHANGE_BOOKING_LOG_DIR";

/// Single global timeout applied to every EWS request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub password: Option<String>,
    pub sentry_dsn: Option<String>,
    pub log_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let password = env::var(PASSWORD_ENV).ok();
        let sentry_dsn = env::var(DSN_ENV).ok();
        let log_dir = env::var(LOG_DIR_ENV).unwrap_or_else(|_| "./".to_string());

        Self {
            password,
            sentry_dsn,
            log_dir,
        }
    }
}
