//! # verifier_core
//!
//! Email verification primitives for the bulk verification service: address
//! parsing, MX resolution, disposable/free/role classification, and live SMTP
//! probing.
//!
//! ## Features
//!
//! - **Syntax parsing** with RFC 5322 validation via the `email_address` crate
//! - **MX resolution** through hickory-resolver with sensible fallbacks
//! - **Fast disposable detection** using a Bloom filter over an embedded list
//! - **SMTP dialogue** (HELO, MAIL FROM, RCPT TO, catch-all probe) over plain
//!   TCP with per-command timeouts and local source-IP rotation
//!
//! ## Example
//!
//! ```rust,no_run
//! use verifier_core::{Level, Verifier, VerifierConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let verifier = Verifier::new(VerifierConfig::default())?;
//!     let verdict = verifier.verify("user@example.com", Level::Mx).await?;
//!     println!("reachable: {:?}", verdict.reachable);
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod dns;
pub mod smtp;
pub mod syntax;
pub mod verifier;

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration for the verifier facade.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Timeout for establishing the TCP connection to an MX host.
    pub connect_timeout: Duration,
    /// Timeout applied to each individual SMTP command exchange.
    pub operation_timeout: Duration,
    /// Envelope sender used in MAIL FROM.
    pub from_email: String,
    /// Hostname announced in HELO.
    pub helo_name: String,
    /// Local source addresses rotated round-robin for outbound probes.
    pub local_ips: Vec<IpAddr>,
    /// Whether level-2 verification performs the catch-all probe.
    pub check_catch_all: bool,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            operation_timeout: Duration::from_secs(10),
            from_email: "user@example.org".to_string(),
            helo_name: "localhost".to_string(),
            local_ips: Vec::new(),
            check_catch_all: true,
        }
    }
}

/// Verification depth.
///
/// Level 1 (`Mx`) stops after DNS and classification; level 2 (`Smtp`) adds
/// the live SMTP dialogue against the candidate's mail exchanger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Level {
    /// Syntax + DNS MX lookup + classification; no connection to the host.
    Mx,
    /// Level 1 plus SMTP dialogue: connect, HELO, MAIL FROM, RCPT TO.
    Smtp,
}

impl From<Level> for u8 {
    fn from(level: Level) -> Self {
        match level {
            Level::Mx => 1,
            Level::Smtp => 2,
        }
    }
}

impl TryFrom<u8> for Level {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Level::Mx),
            2 => Ok(Level::Smtp),
            other => Err(format!("invalid verification level: {other}")),
        }
    }
}

/// Deliverability judgement for an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reachable {
    Yes,
    No,
    Unknown,
}

/// Parsed address parts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Syntax {
    pub username: String,
    pub domain: String,
    pub valid: bool,
}

/// Outcome of the SMTP dialogue against a mail exchanger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpDetails {
    /// The MX host accepted the connection and greeted.
    pub host_exists: bool,
    /// RCPT TO was refused with a mailbox-full condition.
    pub full_inbox: bool,
    /// The server accepts RCPT TO for arbitrary local parts.
    pub catch_all: bool,
    /// RCPT TO for the candidate address was accepted.
    pub deliverable: bool,
    /// The mailbox is reported disabled or suspended.
    pub disabled: bool,
}

/// A single mail exchanger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MxHost {
    pub host: String,
    pub pref: u16,
}

/// Result of an MX lookup, sorted by preference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MxRecords {
    pub has_mx_record: bool,
    pub records: Vec<MxHost>,
}

/// Domain/local-part classification consulted by the engine when it
/// synthesizes verdicts without a full verification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub disposable: bool,
    pub free: bool,
    pub role_account: bool,
    pub suggestion: Option<String>,
}

/// Complete verdict for one address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    /// The address as submitted.
    pub email: String,
    pub reachable: Reachable,
    pub syntax: Syntax,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smtp: Option<SmtpDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    pub disposable: bool,
    pub role_account: bool,
    pub free: bool,
    pub has_mx_records: bool,
}

/// Errors produced by the verification primitives.
#[derive(Error, Debug)]
pub enum VerifierError {
    #[error("dns lookup failed: {0}")]
    Dns(#[from] hickory_resolver::ResolveError),
    #[error("no mail servers found for domain: {0}")]
    NoMailServers(String),
    #[error("smtp connect failed: {0}")]
    Connect(String),
    #[error("smtp dialogue failed: {0}")]
    Smtp(String),
    #[error("smtp operation timed out: {0}")]
    Timeout(String),
}

pub type Result<T> = std::result::Result<T, VerifierError>;

/// The verification surface consumed by the bulk engine.
///
/// The engine only ever talks to this trait; production wires in [`Verifier`]
/// and tests substitute a scripted implementation.
#[async_trait]
pub trait Verify: Send + Sync {
    /// Parse an address into its parts without any network I/O.
    fn parse_syntax(&self, email: &str) -> Syntax;

    /// Classify the parsed address (disposable/free/role, typo suggestion).
    fn classify(&self, syntax: &Syntax) -> Classification;

    /// Resolve the domain's mail exchangers.
    async fn lookup_mx(&self, domain: &str) -> Result<MxRecords>;

    /// Run a full verification at the given level.
    async fn verify(&self, email: &str, level: Level) -> Result<Verdict>;
}

// Re-export main types
pub use classify::DomainClassifier;
pub use dns::MxResolver;
pub use smtp::SmtpProber;
pub use verifier::Verifier;
