//! Service configuration, read once at startup from the environment.

use secrecy::SecretString;

/// Default LLM model when `ANTHROPIC_MODEL` is not set.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-6";

/// Default recipient for brief-submission emails.
pub const DEFAULT_NOTIFY_EMAIL: &str = "production@bmasiamusic.com";

/// Default venue timezone when none is known.
pub const DEFAULT_TIMEZONE: &str = "Asia/Bangkok";

/// All recognized options. Optional adapters stay `None` when their
/// credentials are absent and the service degrades per §7 of the spec.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// LLM API key; chat and LLM-first recommendation paths need it.
    pub anthropic_api_key: Option<SecretString>,
    /// LLM model id.
    pub anthropic_model: String,
    /// Web-search API key; research tool degrades without it.
    pub search_api_key: Option<String>,
    /// SQLite path. Unset ⇒ persistence skipped, submission is email-only.
    pub database_url: Option<String>,
    /// SMTP credentials.
    pub smtp_user: Option<String>,
    pub smtp_pass: Option<String>,
    /// Recipient for brief-submission notifications.
    pub notify_email: String,
    /// Music-platform pre-shared API token.
    pub syb_api_token: Option<String>,
    /// External base URL used in generated links (approval, tracking pixel).
    pub base_url: String,
    /// Listening port.
    pub port: u16,
    /// Path to the static playlist catalog file.
    pub playlist_catalog: String,
    /// Fallback IANA timezone for venues.
    pub default_timezone: String,
}

impl AppConfig {
    /// Build config from environment variables. All values are read once.
    pub fn from_env() -> Self {
        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);

        Self {
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY")
                .ok()
                .filter(|v| !v.is_empty())
                .map(SecretString::from),
            anthropic_model: std::env::var("ANTHROPIC_MODEL")
                .unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            search_api_key: std::env::var("BRAVE_API_KEY").ok().filter(|v| !v.is_empty()),
            database_url: std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            smtp_user: std::env::var("SMTP_USER").ok().filter(|v| !v.is_empty()),
            smtp_pass: std::env::var("SMTP_PASS").ok().filter(|v| !v.is_empty()),
            notify_email: std::env::var("NOTIFY_EMAIL")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_NOTIFY_EMAIL.to_string()),
            syb_api_token: std::env::var("SYB_API_TOKEN").ok().filter(|v| !v.is_empty()),
            base_url: std::env::var("BASE_URL")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| format!("http://localhost:{port}")),
            port,
            playlist_catalog: std::env::var("PLAYLIST_CATALOG")
                .unwrap_or_else(|_| "syb_playlists.json".to_string()),
            default_timezone: std::env::var("DEFAULT_TIMEZONE")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_model_is_set() {
        assert!(!DEFAULT_MODEL.is_empty());
    }

    #[test]
    fn default_timezone_parses() {
        let tz: Result<chrono_tz::Tz, _> = DEFAULT_TIMEZONE.parse();
        assert!(tz.is_ok());
    }
}
