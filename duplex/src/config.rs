//! Session configuration.
//!
//! Defaults reproduce the plain handshake: `Hello from parent` /
//! `Hello from child`, a 100-byte line buffer, 30 seconds per blocking step.
//! Every field can be overridden from the environment (`DUPLEX_*`).

use std::collections::HashMap;
use std::env::VarError;
use std::time::Duration;

use crate::split::Role;

pub const DEFAULT_LINE_CAPACITY: usize = 100;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub const ENV_LINE_CAPACITY: &str = "DUPLEX_LINE_CAPACITY";
pub const ENV_TIMEOUT_SECS: &str = "DUPLEX_TIMEOUT_SECS";
pub const ENV_PARENT_GREETING: &str = "DUPLEX_PARENT_GREETING";
pub const ENV_CHILD_GREETING: &str = "DUPLEX_CHILD_GREETING";

const ENV_VARS: [&str; 4] = [
    ENV_LINE_CAPACITY,
    ENV_TIMEOUT_SECS,
    ENV_PARENT_GREETING,
    ENV_CHILD_GREETING,
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {var}={value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl ConfigError {
    pub fn invalid(var: &'static str, value: impl Into<String>, reason: &'static str) -> Self {
        Self::Invalid {
            var,
            value: value.into(),
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplexConfig {
    /// Line buffer size in bytes. A payload may use all but one byte of it.
    pub line_capacity: usize,
    /// Bound on every blocking step; `None` waits forever.
    pub timeout: Option<Duration>,
    /// `None` sends no greeting at all.
    pub parent_greeting: Option<String>,
    pub child_greeting: Option<String>,
}

impl Default for DuplexConfig {
    fn default() -> Self {
        Self {
            line_capacity: DEFAULT_LINE_CAPACITY,
            timeout: Some(DEFAULT_TIMEOUT),
            parent_greeting: Some(Role::Parent.greeting()),
            child_greeting: Some(Role::Child.greeting()),
        }
    }
}

impl DuplexConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_line_capacity(mut self, capacity: usize) -> Self {
        self.line_capacity = capacity;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_parent_greeting(mut self, greeting: Option<String>) -> Self {
        self.parent_greeting = greeting;
        self
    }

    pub fn with_child_greeting(mut self, greeting: Option<String>) -> Self {
        self.child_greeting = greeting;
        self
    }

    pub fn greeting(&self, role: Role) -> Option<&str> {
        match role {
            Role::Parent => self.parent_greeting.as_deref(),
            Role::Child => self.child_greeting.as_deref(),
        }
    }

    /// Longest line the handshake accepts, newline excluded.
    pub fn max_line_length(&self) -> usize {
        self.line_capacity.saturating_sub(1)
    }

    /// Read overrides from the process environment.
    ///
    /// A variable that is set but not valid UTF-8 is an error, not unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        for var in ENV_VARS {
            if let Some(value) = env_value(var, std::env::var(var))? {
                values.insert(var, value);
            }
        }
        Self::from_lookup(|var| values.get(var).cloned())
    }

    /// Read overrides through `lookup`, starting from the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_LINE_CAPACITY) {
            config.line_capacity = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid(ENV_LINE_CAPACITY, &raw, "not a number"))?;
        }

        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            config.timeout = match raw.trim() {
                "0" | "none" | "off" => None,
                secs => Some(Duration::from_secs(secs.parse().map_err(|_| {
                    ConfigError::invalid(ENV_TIMEOUT_SECS, &raw, "not a number of seconds")
                })?)),
            };
        }

        if let Some(raw) = lookup(ENV_PARENT_GREETING) {
            config.parent_greeting = (!raw.is_empty()).then_some(raw);
        }
        if let Some(raw) = lookup(ENV_CHILD_GREETING) {
            config.child_greeting = (!raw.is_empty()).then_some(raw);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.line_capacity < 2 {
            return Err(ConfigError::invalid(
                ENV_LINE_CAPACITY,
                self.line_capacity.to_string(),
                "must leave room for at least one byte",
            ));
        }
        for (var, greeting) in [
            (ENV_PARENT_GREETING, &self.parent_greeting),
            (ENV_CHILD_GREETING, &self.child_greeting),
        ] {
            if let Some(g) = greeting
                && g.contains('\n')
            {
                return Err(ConfigError::invalid(
                    var,
                    g.as_str(),
                    "greeting must be a single line",
                ));
            }
        }
        Ok(())
    }
}

fn env_value(
    var: &'static str,
    value: Result<String, VarError>,
) -> Result<Option<String>, ConfigError> {
    match value {
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(raw)) => Err(ConfigError::invalid(
            var,
            raw.to_string_lossy(),
            "not valid UTF-8",
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStringExt;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn defaults_match_plain_handshake() {
        let config = DuplexConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, DuplexConfig::default());
        assert_eq!(config.greeting(Role::Parent), Some("Hello from parent"));
        assert_eq!(config.greeting(Role::Child), Some("Hello from child"));
        assert_eq!(config.max_line_length(), 99);
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn env_overrides_apply() {
        let config = DuplexConfig::from_lookup(lookup(&[
            ("DUPLEX_LINE_CAPACITY", "16"),
            ("DUPLEX_TIMEOUT_SECS", "5"),
            ("DUPLEX_PARENT_GREETING", "ping"),
            ("DUPLEX_CHILD_GREETING", "pong"),
        ]))
        .unwrap();
        assert_eq!(config.max_line_length(), 15);
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.greeting(Role::Parent), Some("ping"));
        assert_eq!(config.greeting(Role::Child), Some("pong"));
    }

    #[test]
    fn timeout_can_be_disabled() {
        for raw in ["0", "none", "off"] {
            let config =
                DuplexConfig::from_lookup(lookup(&[("DUPLEX_TIMEOUT_SECS", raw)])).unwrap();
            assert_eq!(config.timeout, None, "{raw}");
        }
    }

    #[test]
    fn empty_greeting_means_silent() {
        let config = DuplexConfig::from_lookup(lookup(&[("DUPLEX_CHILD_GREETING", "")])).unwrap();
        assert_eq!(config.greeting(Role::Child), None);
        assert_eq!(config.greeting(Role::Parent), Some("Hello from parent"));
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = DuplexConfig::from_lookup(lookup(&[("DUPLEX_LINE_CAPACITY", "abc")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"invalid configuration: DUPLEX_LINE_CAPACITY="abc": not a number"#
        );
        assert!(DuplexConfig::from_lookup(lookup(&[("DUPLEX_TIMEOUT_SECS", "-1")])).is_err());
    }

    #[test]
    fn non_utf8_value_is_rejected_not_ignored() {
        let raw = OsString::from_vec(b"caf\xe9".to_vec());
        let err = env_value(ENV_CHILD_GREETING, Err(VarError::NotUnicode(raw))).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: ENV_CHILD_GREETING,
                reason: "not valid UTF-8",
                ..
            }
        ));
        assert_eq!(env_value(ENV_CHILD_GREETING, Err(VarError::NotPresent)), Ok(None));
    }

    #[test]
    fn rejects_capacity_without_room_for_payload() {
        assert!(DuplexConfig::from_lookup(lookup(&[("DUPLEX_LINE_CAPACITY", "1")])).is_err());
    }

    #[test]
    fn rejects_multi_line_greeting() {
        let config = DuplexConfig::default().with_parent_greeting(Some("a\nb".into()));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                var: ENV_PARENT_GREETING,
                ..
            })
        ));
    }
}
