use std::time::Duration;

/// Configures HTTP timeout and retry behavior.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Per-attempt transport timeout in milliseconds.
    pub timeout_ms: u64,
    /// Total attempts per call, including the first one.
    pub max_attempts: usize,
    /// Base retry backoff in milliseconds (exponential strategy).
    pub base_delay_ms: u64,
    /// Upper bound for a single backoff sleep in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_backoff_ms: 30_000,
        }
    }
}

impl ClientOptions {
    /// Reads options from the environment, keeping defaults for unset variables.
    ///
    /// Reads:
    /// - `UPSTREAM_TIMEOUT_MS`
    /// - `UPSTREAM_MAX_ATTEMPTS` (must be at least 1)
    /// - `UPSTREAM_BASE_DELAY_MS`
    /// - `UPSTREAM_MAX_BACKOFF_MS`
    pub fn from_env() -> std::result::Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> std::result::Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let options = Self {
            timeout_ms: parse_var(&lookup, "UPSTREAM_TIMEOUT_MS")?.unwrap_or(defaults.timeout_ms),
            max_attempts: parse_var(&lookup, "UPSTREAM_MAX_ATTEMPTS")?
                .unwrap_or(defaults.max_attempts),
            base_delay_ms: parse_var(&lookup, "UPSTREAM_BASE_DELAY_MS")?
                .unwrap_or(defaults.base_delay_ms),
            max_backoff_ms: parse_var(&lookup, "UPSTREAM_MAX_BACKOFF_MS")?
                .unwrap_or(defaults.max_backoff_ms),
        };
        if options.max_attempts == 0 {
            return Err("UPSTREAM_MAX_ATTEMPTS must be at least 1".to_owned());
        }
        Ok(options)
    }

    /// Derives the immutable retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.base_delay_ms),
            self.max_attempts,
            Duration::from_millis(self.max_backoff_ms),
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> std::result::Result<Option<T>, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|err| format!("{key} has invalid value '{raw}': {err}")),
        None => Ok(None),
    }
}

/// Retry parameters fixed for the lifetime of an executor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_attempts: usize,
    max_backoff: Duration,
}

impl RetryPolicy {
    /// `max_attempts` below 1 is raised to 1.
    pub fn new(base_delay: Duration, max_attempts: usize, max_backoff: Duration) -> Self {
        Self {
            base_delay,
            max_attempts: max_attempts.max(1),
            max_backoff,
        }
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        ClientOptions::default().retry_policy()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::{ClientOptions, RetryPolicy};

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_match_gateway_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay(), Duration::from_secs(1));
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.max_backoff(), Duration::from_secs(30));
        assert_eq!(ClientOptions::default().timeout(), Duration::from_secs(30));
    }

    #[test]
    fn unset_variables_keep_defaults() {
        let options = ClientOptions::from_lookup(lookup(&[("UPSTREAM_MAX_ATTEMPTS", "5")]))
            .expect("options must parse");
        assert_eq!(
            options,
            ClientOptions {
                max_attempts: 5,
                ..ClientOptions::default()
            }
        );
    }

    #[test]
    fn blank_variable_is_treated_as_unset() {
        let options = ClientOptions::from_lookup(lookup(&[("UPSTREAM_TIMEOUT_MS", "  ")]))
            .expect("options must parse");
        assert_eq!(options.timeout_ms, 30_000);
    }

    #[test]
    fn invalid_number_is_rejected() {
        let err = ClientOptions::from_lookup(lookup(&[("UPSTREAM_BASE_DELAY_MS", "soon")]))
            .expect_err("non-numeric delay must fail");
        assert!(err.contains("UPSTREAM_BASE_DELAY_MS"));
    }

    #[test]
    fn zero_attempts_is_rejected_from_env() {
        let err = ClientOptions::from_lookup(lookup(&[("UPSTREAM_MAX_ATTEMPTS", "0")]))
            .expect_err("zero attempts must fail");
        assert!(err.contains("at least 1"));
    }

    #[test]
    fn policy_floors_attempts_at_one() {
        let policy = RetryPolicy::new(Duration::from_millis(10), 0, Duration::from_secs(1));
        assert_eq!(policy.max_attempts(), 1);
    }
}
