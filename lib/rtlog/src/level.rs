use std::fmt;
use std::str::FromStr;

/// Log levels accepted by the `-log` flag on every node binary. `Panic` and `Fatal` both map
/// onto `slog::Level::Critical` since slog has no equivalent granularity, but are kept distinct
/// here so callers can decide whether to abort the process after logging.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
    Panic,
    Fatal,
}

impl FromStr for Level {
    type Err = crate::error::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "panic" => Ok(Level::Panic),
            "fatal" => Ok(Level::Fatal),
            other => Err(crate::error::ConfigError::InvalidLogLevel(other.to_string())),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Panic => "panic",
            Level::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

impl Level {
    pub fn to_slog(self) -> slog::Level {
        match self {
            Level::Debug => slog::Level::Debug,
            Level::Info => slog::Level::Info,
            Level::Warn => slog::Level::Warning,
            Level::Error => slog::Level::Error,
            Level::Panic | Level::Fatal => slog::Level::Critical,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_accepted_value() {
        for (text, expect) in &[
            ("debug", Level::Debug),
            ("info", Level::Info),
            ("warn", Level::Warn),
            ("error", Level::Error),
            ("panic", Level::Panic),
            ("fatal", Level::Fatal),
        ] {
            assert_eq!(Level::from_str(text).unwrap(), *expect);
        }
    }

    #[test]
    fn rejects_unknown_value() {
        assert!(Level::from_str("trace").is_err());
    }
}
