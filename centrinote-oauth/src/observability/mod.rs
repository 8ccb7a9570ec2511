//! Observability (logging, tracing)
//!
//! Structured logging for the OAuth service plus the redaction helper every
//! module uses before a code, token or state value reaches a log line.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Number of characters of a secret that may appear in diagnostics
pub const REDACTED_PREFIX_LEN: usize = 8;

/// Initialize the tracing subscriber
///
/// Sets up:
/// - Environment-based log level filtering (`RUST_LOG`)
/// - Pretty formatting in debug builds
/// - JSON formatting in release builds
///
/// # Example
///
/// ```rust,no_run
/// use centrinote_oauth::observability;
///
/// # fn main() -> anyhow::Result<()> {
/// observability::init()?;
/// tracing::info!("OAuth service started");
/// # Ok(())
/// # }
/// ```
pub fn init() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            EnvFilter::new("info,centrinote_oauth=debug,tower_http=debug")
        } else {
            EnvFilter::new("info")
        }
    });

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()?;
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    }

    Ok(())
}

/// Truncate a secret to a short prefix for diagnostics
///
/// Values no longer than the prefix are fully masked so that short test
/// secrets never leak either.
///
/// # Example
///
/// ```rust
/// use centrinote_oauth::observability::redact;
///
/// assert_eq!(redact("abcdefghijklmnop"), "abcdefgh…");
/// assert_eq!(redact("short"), "…");
/// ```
#[must_use]
pub fn redact(secret: &str) -> String {
    let mut chars = secret.chars();
    let prefix: String = chars.by_ref().take(REDACTED_PREFIX_LEN).collect();
    if chars.next().is_none() {
        return "…".to_string();
    }
    format!("{prefix}…")
}

/// Redact an optional secret, rendering `None` as `-`
#[must_use]
pub fn redact_opt(secret: Option<&str>) -> String {
    secret.map_or_else(|| "-".to_string(), redact)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_long_secret_keeps_prefix() {
        assert_eq!(redact("AT1-very-long-access-token"), "AT1-very…");
    }

    #[test]
    fn test_redact_short_secret_is_fully_masked() {
        assert_eq!(redact("abc"), "…");
        assert_eq!(redact("12345678"), "…");
        assert_eq!(redact(""), "…");
    }

    #[test]
    fn test_redact_multibyte() {
        assert_eq!(redact("ééééééééé"), "éééééééé…");
    }

    #[test]
    fn test_redact_opt() {
        assert_eq!(redact_opt(None), "-");
        assert_eq!(redact_opt(Some("refresh-token-value")), "refresh-…");
    }
}
