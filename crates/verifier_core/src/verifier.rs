//! Verifier facade orchestrating syntax, classification, DNS, and SMTP.

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::{
    classify::DomainClassifier, dns::MxResolver, smtp::SmtpProber, syntax, Classification, Level,
    MxRecords, Reachable, Result, Syntax, Verdict, Verify, VerifierConfig,
};

/// Configured verifier producing a [`Verdict`] per address.
pub struct Verifier {
    classifier: DomainClassifier,
    resolver: MxResolver,
    prober: SmtpProber,
}

impl Verifier {
    pub fn new(config: VerifierConfig) -> anyhow::Result<Self> {
        Ok(Self {
            classifier: DomainClassifier::new(),
            resolver: MxResolver::new(),
            prober: SmtpProber::new(&config),
        })
    }

    /// Verify one address at the given level.
    ///
    /// Level 1 never touches the candidate host. Level 2 runs the SMTP
    /// dialogue against the best MX; connection and protocol failures are
    /// errors, while a refused mailbox is a clean `reachable: no` verdict.
    #[instrument(skip(self), fields(email = %email))]
    pub async fn verify(&self, email: &str, level: Level) -> Result<Verdict> {
        let email = email.trim();
        let parsed = syntax::parse(email);

        if !parsed.valid {
            debug!("syntax invalid");
            return Ok(Verdict {
                email: email.to_string(),
                reachable: Reachable::No,
                syntax: parsed,
                smtp: None,
                suggestion: None,
                disposable: false,
                role_account: false,
                free: false,
                has_mx_records: false,
            });
        }

        let class = self.classifier.classify(&parsed);
        let mx = self.resolver.lookup(&parsed.domain).await?;

        let mut verdict = Verdict {
            email: email.to_string(),
            reachable: Reachable::Unknown,
            syntax: parsed,
            smtp: None,
            suggestion: class.suggestion,
            disposable: class.disposable,
            role_account: class.role_account,
            free: class.free,
            has_mx_records: mx.has_mx_record,
        };

        if !mx.has_mx_record {
            verdict.reachable = Reachable::No;
            return Ok(verdict);
        }

        if level == Level::Mx {
            return Ok(verdict);
        }

        let smtp = self
            .prober
            .probe(&verdict.syntax.domain, email, &mx)
            .await?;
        verdict.reachable = if smtp.deliverable {
            Reachable::Yes
        } else if smtp.catch_all {
            Reachable::Unknown
        } else {
            Reachable::No
        };
        verdict.smtp = Some(smtp);
        Ok(verdict)
    }
}

#[async_trait]
impl Verify for Verifier {
    fn parse_syntax(&self, email: &str) -> Syntax {
        syntax::parse(email)
    }

    fn classify(&self, syntax: &Syntax) -> Classification {
        self.classifier.classify(syntax)
    }

    async fn lookup_mx(&self, domain: &str) -> Result<MxRecords> {
        self.resolver.lookup(domain).await
    }

    async fn verify(&self, email: &str, level: Level) -> Result<Verdict> {
        Verifier::verify(self, email, level).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_syntax_short_circuits() {
        let verifier = Verifier::new(VerifierConfig::default()).unwrap();
        let verdict = verifier.verify("@@bad", Level::Mx).await.unwrap();
        assert!(!verdict.syntax.valid);
        assert_eq!(verdict.reachable, Reachable::No);
        assert!(verdict.smtp.is_none());
        assert_eq!(verdict.email, "@@bad");
    }

    #[tokio::test]
    async fn test_verdict_carries_original_address() {
        let verifier = Verifier::new(VerifierConfig::default()).unwrap();
        let verdict = verifier.verify("  spaced@@x  ", Level::Mx).await.unwrap();
        assert_eq!(verdict.email, "spaced@@x");
    }

    #[tokio::test]
    #[ignore = "Requires network access"]
    async fn test_level1_real_domain() {
        let verifier = Verifier::new(VerifierConfig::default()).unwrap();
        let verdict = verifier.verify("someone@gmail.com", Level::Mx).await.unwrap();
        assert!(verdict.syntax.valid);
        assert!(verdict.has_mx_records);
        assert!(verdict.free);
        assert_eq!(verdict.reachable, Reachable::Unknown);
        assert!(verdict.smtp.is_none());
    }
}
