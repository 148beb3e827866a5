//! MX resolution through hickory-resolver.
//!
//! A domain with no MX records is a normal outcome (`has_mx_record: false`),
//! not an error; only transport-level resolution failures surface as errors
//! so callers can retry them on the next lookup.

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use tracing::{debug, warn};

use crate::{MxHost, MxRecords, Result};

/// Async MX resolver over the system DNS configuration, falling back to
/// Cloudflare when the system configuration cannot be loaded.
pub struct MxResolver {
    resolver: TokioResolver,
}

impl MxResolver {
    pub fn new() -> Self {
        let resolver = match TokioResolver::builder(TokioConnectionProvider::default()) {
            Ok(builder) => builder.build(),
            Err(e) => {
                warn!(error = %e, "system DNS configuration failed, using Cloudflare fallback");
                TokioResolver::builder_with_config(
                    ResolverConfig::cloudflare(),
                    TokioConnectionProvider::default(),
                )
                .build()
            }
        };
        Self { resolver }
    }

    pub fn with_config(config: ResolverConfig, opts: ResolverOpts) -> Self {
        let resolver =
            TokioResolver::builder_with_config(config, TokioConnectionProvider::default())
                .with_options(opts)
                .build();
        Self { resolver }
    }

    /// Resolve the domain's mail exchangers, sorted by preference.
    ///
    /// # Errors
    /// Returns an error only for transport failures (timeouts, SERVFAIL);
    /// NXDOMAIN and empty answers yield `has_mx_record: false`.
    pub async fn lookup(&self, domain: &str) -> Result<MxRecords> {
        match self.resolver.mx_lookup(domain).await {
            Ok(lookup) => {
                let mut records: Vec<MxHost> = lookup
                    .iter()
                    .map(|mx| MxHost {
                        host: mx.exchange().to_utf8().trim_end_matches('.').to_string(),
                        pref: mx.preference(),
                    })
                    .collect();
                records.sort_by_key(|r| r.pref);

                debug!(domain = %domain, count = records.len(), "mx lookup complete");
                Ok(MxRecords {
                    has_mx_record: !records.is_empty(),
                    records,
                })
            }
            Err(err) if err.is_no_records_found() || err.is_nx_domain() => {
                debug!(domain = %domain, "no mx records");
                Ok(MxRecords::default())
            }
            Err(err) => {
                warn!(domain = %domain, error = %err, "mx lookup failed");
                Err(err.into())
            }
        }
    }
}

impl Default for MxResolver {
    fn default() -> Self {
        Self::new()
    }
}
