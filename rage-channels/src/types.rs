use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl Deref for $name {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

id_newtype!(ChannelId);
id_newtype!(UserId);
id_newtype!(EventId);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid slack timestamp {0:?}")]
pub struct InvalidTimestamp(pub String);

/// Slack message timestamp (`"1716572940.000123"`).
///
/// Ordering is numeric; the fractional part is normalized to microseconds.
#[derive(Debug, Clone)]
pub struct SlackTimestamp {
    seconds: i64,
    micros: i64,
    raw: String,
}

impl SlackTimestamp {
    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    pub fn micros(&self) -> i64 {
        self.micros
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn total_micros(&self) -> i64 {
        self.seconds
            .saturating_mul(1_000_000)
            .saturating_add(self.micros)
    }

    /// Time elapsed from `earlier` to `self`, saturating at zero.
    pub fn elapsed_since(&self, earlier: &SlackTimestamp) -> Duration {
        let diff = self.total_micros().saturating_sub(earlier.total_micros());
        Duration::from_micros(u64::try_from(diff).unwrap_or(0))
    }
}

impl FromStr for SlackTimestamp {
    type Err = InvalidTimestamp;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidTimestamp(raw.to_string());
        let trimmed = raw.trim();
        let mut parts = trimmed.split('.');
        let seconds_raw = parts.next().ok_or_else(invalid)?;
        let micros_raw = parts.next().unwrap_or("0");
        if parts.next().is_some()
            || seconds_raw.is_empty()
            || !seconds_raw.bytes().all(|b| b.is_ascii_digit())
            || !micros_raw.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        let seconds = seconds_raw.parse::<i64>().map_err(|_| invalid())?;
        let micros_digits = micros_raw.chars().take(6).collect::<String>();
        let micros_padded = format!("{micros_digits:0<6}");
        let micros = micros_padded.parse::<i64>().map_err(|_| invalid())?;
        Ok(Self {
            seconds,
            micros,
            raw: trimmed.to_string(),
        })
    }
}

impl PartialEq for SlackTimestamp {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SlackTimestamp {}

impl PartialOrd for SlackTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SlackTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.seconds, self.micros).cmp(&(other.seconds, other.micros))
    }
}

impl fmt::Display for SlackTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A message delivered by an ingress, reduced to what detection needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub ts: SlackTimestamp,
}

/// One entry of `conversations.history`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    /// Absent for integration and bot posts that carry only a `bot_id`.
    pub user: Option<UserId>,
    pub ts: SlackTimestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub id: UserId,
    pub name: String,
    pub is_bot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::SlackTimestamp;
    use std::time::Duration;

    fn ts(raw: &str) -> SlackTimestamp {
        raw.parse().expect("timestamp should parse")
    }

    #[test]
    fn parse_normalizes_fractional_precision() {
        let parsed = ts("1716572940.000123");
        assert_eq!(parsed.seconds(), 1716572940);
        assert_eq!(parsed.micros(), 123);

        let short = ts("1716572940.5");
        assert_eq!(short.micros(), 500_000);

        let whole = ts("1716572940");
        assert_eq!(whole.micros(), 0);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("".parse::<SlackTimestamp>().is_err());
        assert!("abc".parse::<SlackTimestamp>().is_err());
        assert!("1.2.3".parse::<SlackTimestamp>().is_err());
        assert!("-5.0".parse::<SlackTimestamp>().is_err());
        assert!("12.x1".parse::<SlackTimestamp>().is_err());
    }

    #[test]
    fn ordering_is_numeric_not_lexical() {
        assert!(ts("1716572940.000100") > ts("1716572940.000099"));
        assert!(ts("999.9") < ts("1000.0"));
        assert_eq!(ts("10.5"), ts("10.500000"));
    }

    #[test]
    fn elapsed_since_keeps_fraction_and_saturates() {
        assert_eq!(
            ts("1000.250000").elapsed_since(&ts("955.000000")),
            Duration::from_micros(45_250_000)
        );
        assert_eq!(ts("900.0").elapsed_since(&ts("1000.0")), Duration::ZERO);
    }
}
