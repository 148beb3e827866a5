//! Configuration for the bulk verification service.
//!
//! Loaded through figment: struct defaults merged with raw environment
//! variables (`ADDR`, `RESULT_TTL`, ...). Duration options accept either an
//! integer number of seconds or a Go-style string such as `30s` or `15m`,
//! matching what operators of the service already export.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variables recognized by [`AppConfig::load`].
const ENV_KEYS: &[&str] = &[
    "ADDR",
    "READ_TIMEOUT",
    "WRITE_TIMEOUT",
    "MAX_EMAILS",
    "RESULT_TTL",
    "STORE_RESULTS",
    "LEVEL1_CONCURRENCY",
    "LEVEL2_CONCURRENCY",
    "JOB_CONCURRENCY",
    "VALIDATION_RATE",
    "RATE_JITTER",
    "LOCAL_IPS",
    "SMTP_CONNECT_TIMEOUT",
    "SMTP_OPERATION_TIMEOUT",
    "SMTP_FROM_EMAIL",
    "SMTP_HELO_NAME",
    "SMTP_CATCH_ALL",
    "JSON_LOGS",
];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Listen address; a bare `:port` binds all interfaces.
    pub addr: String,
    /// Bound on collecting a request body.
    #[serde(with = "duration_str")]
    pub read_timeout: Duration,
    /// Bound on producing a response.
    #[serde(with = "duration_str")]
    pub write_timeout: Duration,
    /// Maximum addresses accepted in one bulk submission.
    pub max_emails: usize,
    /// How long finished jobs stay queryable; zero disables expiry.
    #[serde(with = "duration_str")]
    pub result_ttl: Duration,
    /// Default for per-job result retention.
    pub store_results: bool,
    /// Process-wide bound on concurrent level-1 verifications.
    pub level1_concurrency: usize,
    /// Process-wide bound on concurrent level-2 verifications.
    pub level2_concurrency: usize,
    /// Default worker count per job when the request does not set one.
    pub job_concurrency: usize,
    /// Target level-2 probe rate in probes per second.
    pub validation_rate: f64,
    /// Jitter fraction applied to the probe rate each second.
    pub rate_jitter: f64,
    /// Local source addresses for outbound SMTP, comma separated.
    #[serde(with = "comma_list")]
    pub local_ips: Vec<String>,
    #[serde(with = "duration_str")]
    pub smtp_connect_timeout: Duration,
    #[serde(with = "duration_str")]
    pub smtp_operation_timeout: Duration,
    /// Envelope sender for MAIL FROM.
    pub smtp_from_email: String,
    /// Hostname announced in HELO.
    pub smtp_helo_name: String,
    /// Whether level-2 verification runs the catch-all probe.
    pub smtp_catch_all: bool,
    /// Emit JSON-structured logs instead of the human-readable format.
    pub json_logs: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            addr: ":8080".to_string(),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            max_emails: 100_000,
            result_ttl: Duration::from_secs(15 * 60),
            store_results: true,
            level1_concurrency: 1000,
            level2_concurrency: 100,
            job_concurrency: 200,
            validation_rate: 20.0,
            rate_jitter: 0.1,
            local_ips: Vec::new(),
            smtp_connect_timeout: Duration::from_secs(10),
            smtp_operation_timeout: Duration::from_secs(10),
            smtp_from_email: "user@example.org".to_string(),
            smtp_helo_name: "localhost".to_string(),
            smtp_catch_all: true,
            json_logs: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults overridden by the environment.
    pub fn load() -> Result<Self, figment::Error> {
        use figment::providers::{Env, Serialized};
        use figment::Figment;

        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Env::raw().only(ENV_KEYS))
            .extract()
    }

    /// The address to bind, normalizing Go-style `:8080` notation.
    pub fn listen_addr(&self) -> String {
        if self.addr.starts_with(':') {
            format!("0.0.0.0{}", self.addr)
        } else {
            self.addr.clone()
        }
    }
}

/// Serde adapter for duration options: accepts `30s`/`15m`/`500ms`-style
/// strings or a plain number of seconds.
pub(crate) mod duration_str {
    use serde::{de, Deserializer, Serializer};
    use std::fmt;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        struct DurationVisitor;

        impl de::Visitor<'_> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a duration like \"30s\" or a number of seconds")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
                parse_duration(v).ok_or_else(|| E::custom(format!("invalid duration: {v:?}")))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
                Ok(Duration::from_secs(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
                u64::try_from(v)
                    .map(Duration::from_secs)
                    .map_err(|_| E::custom("negative duration"))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Duration, E> {
                if v < 0.0 {
                    return Err(E::custom("negative duration"));
                }
                Ok(Duration::from_secs_f64(v))
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }

    pub fn format_duration(d: &Duration) -> String {
        if d.subsec_millis() == 0 {
            format!("{}s", d.as_secs())
        } else {
            format!("{}ms", d.as_millis())
        }
    }

    pub fn parse_duration(s: &str) -> Option<Duration> {
        let s = s.trim();
        let (value, unit) = match s.find(|c: char| c.is_ascii_alphabetic()) {
            Some(idx) => (&s[..idx], &s[idx..]),
            None => (s, "s"),
        };
        let value: f64 = value.trim().parse().ok()?;
        if value < 0.0 {
            return None;
        }
        let secs = match unit {
            "ms" => value / 1000.0,
            "s" => value,
            "m" => value * 60.0,
            "h" => value * 3600.0,
            _ => return None,
        };
        Some(Duration::from_secs_f64(secs))
    }
}

/// Serde adapter for comma-separated list options.
pub(crate) mod comma_list {
    use serde::{de, Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.join(","))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<String>, D::Error> {
        struct ListVisitor;

        impl<'de> de::Visitor<'de> for ListVisitor {
            type Value = Vec<String>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a comma-separated string or a sequence of strings")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect())
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut out = Vec::new();
                while let Some(item) = seq.next_element::<String>()? {
                    out.push(item);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_any(ListVisitor)
    }
}
