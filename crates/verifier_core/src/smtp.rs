//! SMTP probing over plain TCP.
//!
//! Speaks just enough of the protocol to judge deliverability: greeting,
//! HELO, MAIL FROM, an optional catch-all RCPT with a random local part, and
//! RCPT TO for the candidate address. Every command exchange is bounded by
//! the configured operation timeout. Outbound connections rotate through the
//! configured local source addresses round-robin.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rand::distr::{Alphanumeric, SampleString};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::timeout;
use tracing::debug;

use crate::{MxRecords, Result, SmtpDetails, VerifierConfig, VerifierError};

const SMTP_PORT: u16 = 25;

/// A complete SMTP response, possibly multi-line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SmtpResponse {
    code: u16,
    lines: Vec<String>,
}

impl SmtpResponse {
    fn message(&self) -> String {
        self.lines.join(" ")
    }

    const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// Parse one response line into (code, is_last, text).
    fn parse_line(line: &str) -> Result<(u16, bool, String)> {
        let bytes = line.as_bytes();
        if bytes.len() < 3 {
            return Err(VerifierError::Smtp(format!(
                "response line too short: {line:?}"
            )));
        }
        let code = std::str::from_utf8(&bytes[..3])
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .ok_or_else(|| VerifierError::Smtp(format!("invalid status code in {line:?}")))?;
        let is_last = bytes.get(3) != Some(&b'-');
        let text = line.get(4..).unwrap_or("").to_string();
        Ok((code, is_last, text))
    }
}

/// One live connection to a mail exchanger.
struct SmtpSession {
    reader: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    operation_timeout: Duration,
}

impl SmtpSession {
    async fn read_response(&mut self) -> Result<SmtpResponse> {
        let mut code = 0;
        let mut lines = Vec::new();
        loop {
            let line = timeout(self.operation_timeout, self.reader.next_line())
                .await
                .map_err(|_| VerifierError::Timeout("waiting for smtp response".to_string()))?
                .map_err(|e| VerifierError::Smtp(format!("read failed: {e}")))?
                .ok_or_else(|| VerifierError::Smtp("connection closed by server".to_string()))?;

            let (line_code, is_last, text) = SmtpResponse::parse_line(&line)?;
            code = line_code;
            lines.push(text);
            if is_last {
                return Ok(SmtpResponse { code, lines });
            }
        }
    }

    async fn command(&mut self, cmd: &str) -> Result<SmtpResponse> {
        debug!(command = %cmd.split_whitespace().next().unwrap_or(cmd), "smtp command");
        timeout(
            self.operation_timeout,
            self.writer.write_all(format!("{cmd}\r\n").as_bytes()),
        )
        .await
        .map_err(|_| VerifierError::Timeout(format!("sending {cmd}")))?
        .map_err(|e| VerifierError::Smtp(format!("write failed: {e}")))?;
        self.read_response().await
    }
}

/// Probes mailboxes by speaking SMTP to the domain's best mail exchanger.
pub struct SmtpProber {
    connect_timeout: Duration,
    operation_timeout: Duration,
    from_email: String,
    helo_name: String,
    local_ips: Vec<IpAddr>,
    check_catch_all: bool,
    next_ip: AtomicUsize,
}

impl SmtpProber {
    pub fn new(config: &VerifierConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            operation_timeout: config.operation_timeout,
            from_email: config.from_email.clone(),
            helo_name: config.helo_name.clone(),
            local_ips: config.local_ips.clone(),
            check_catch_all: config.check_catch_all,
            next_ip: AtomicUsize::new(0),
        }
    }

    /// Run the SMTP dialogue for `email` against the domain's mail servers.
    ///
    /// # Errors
    /// Connection, timeout, and protocol failures are errors; a refused
    /// RCPT is a normal outcome captured in the returned details.
    pub async fn probe(&self, domain: &str, email: &str, mx: &MxRecords) -> Result<SmtpDetails> {
        let host = mx
            .records
            .first()
            .map(|r| r.host.as_str())
            .ok_or_else(|| VerifierError::NoMailServers(domain.to_string()))?;

        let stream = self.connect(host).await?;
        let (read_half, write_half) = stream.into_split();
        let mut session = SmtpSession {
            reader: BufReader::new(read_half).lines(),
            writer: write_half,
            operation_timeout: self.operation_timeout,
        };

        let greeting = session.read_response().await?;
        if greeting.code != 220 {
            return Err(VerifierError::Smtp(format!(
                "unexpected greeting from {host}: {} {}",
                greeting.code,
                greeting.message()
            )));
        }

        let mut details = SmtpDetails {
            host_exists: true,
            ..Default::default()
        };

        let helo = session.command(&format!("HELO {}", self.helo_name)).await?;
        if !helo.is_success() {
            return Err(VerifierError::Smtp(format!(
                "HELO rejected: {} {}",
                helo.code,
                helo.message()
            )));
        }

        let mail = session
            .command(&format!("MAIL FROM:<{}>", self.from_email))
            .await?;
        if !mail.is_success() {
            return Err(VerifierError::Smtp(format!(
                "MAIL FROM rejected: {} {}",
                mail.code,
                mail.message()
            )));
        }

        // A server that accepts a random local part accepts anything, so the
        // real RCPT would carry no signal and is skipped.
        if self.check_catch_all {
            let probe = format!("{}@{}", random_local_part(), domain);
            let rcpt = session.command(&format!("RCPT TO:<{probe}>")).await?;
            if rcpt.is_success() {
                details.catch_all = true;
            }
        }

        if !details.catch_all {
            let rcpt = session.command(&format!("RCPT TO:<{email}>")).await?;
            if rcpt.is_success() {
                details.deliverable = true;
            } else {
                interpret_rcpt_refusal(rcpt.code, &rcpt.message(), &mut details);
            }
        }

        let _ = session.command("QUIT").await;
        Ok(details)
    }

    async fn connect(&self, host: &str) -> Result<TcpStream> {
        let attempt = async {
            let mut last_err: Option<io::Error> = None;
            for addr in tokio::net::lookup_host((host, SMTP_PORT)).await? {
                match self.connect_one(addr).await {
                    Ok(stream) => return Ok(stream),
                    Err(e) => last_err = Some(e),
                }
            }
            Err(last_err
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses")))
        };

        timeout(self.connect_timeout, attempt)
            .await
            .map_err(|_| VerifierError::Timeout(format!("connecting to {host}")))?
            .map_err(|e| VerifierError::Connect(format!("{host}: {e}")))
    }

    async fn connect_one(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        match self.next_local_ip(addr.is_ipv6()) {
            Some(local) => {
                let socket = if addr.is_ipv6() {
                    TcpSocket::new_v6()?
                } else {
                    TcpSocket::new_v4()?
                };
                socket.bind(SocketAddr::new(local, 0))?;
                socket.connect(addr).await
            }
            None => TcpStream::connect(addr).await,
        }
    }

    /// Round-robin over the configured local addresses matching the target's
    /// address family.
    fn next_local_ip(&self, v6: bool) -> Option<IpAddr> {
        let candidates: Vec<IpAddr> = self
            .local_ips
            .iter()
            .copied()
            .filter(|ip| ip.is_ipv6() == v6)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let idx = self.next_ip.fetch_add(1, Ordering::Relaxed);
        Some(candidates[idx % candidates.len()])
    }
}

/// Map a refused RCPT onto the mailbox conditions we can name.
fn interpret_rcpt_refusal(code: u16, message: &str, details: &mut SmtpDetails) {
    let message = message.to_lowercase();
    if code == 452
        || code == 552
        || message.contains("full")
        || message.contains("quota")
        || message.contains("insufficient storage")
    {
        details.full_inbox = true;
    } else if message.contains("disabled")
        || message.contains("suspended")
        || message.contains("deactivated")
    {
        details.disabled = true;
    }
}

fn random_local_part() -> String {
    Alphanumeric
        .sample_string(&mut rand::rng(), 16)
        .to_lowercase()
}
