//! The per-job worker pool.
//!
//! One producer feeds addresses into a rendezvous channel; K workers drain
//! it, verify, and fan results out to the job buffer and the callback
//! sender. The channel is deliberately unbuffered so slow workers throttle
//! the producer, and the callback channel's bound throttles workers in turn.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use verifier_core::{Level, Reachable, SmtpDetails, Verdict, Verify};

use super::callback::CallbackSender;
use super::job::{EmailResult, Job};
use super::limiter::LevelLimiter;
use super::mx_cache::MxCache;
use super::pacer::ProbePacer;

/// Per-job knobs taken from the submission payload.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Worker count; 0 falls back to the server default.
    pub concurrency: usize,
    pub callback_url: Option<String>,
    /// Callback batch size; 0 falls back to the default of 200.
    pub callback_batch: usize,
}

/// The bulk verification engine: shared pacing, limiting, and caching around
/// the verifier primitive.
pub struct Engine {
    verifier: Arc<dyn Verify>,
    pacer: Arc<ProbePacer>,
    limiter: Arc<LevelLimiter>,
    mx_cache: Arc<MxCache>,
    default_concurrency: usize,
}

impl Engine {
    pub fn new(
        verifier: Arc<dyn Verify>,
        pacer: Arc<ProbePacer>,
        limiter: Arc<LevelLimiter>,
        mx_cache: Arc<MxCache>,
        default_concurrency: usize,
    ) -> Self {
        Self {
            verifier,
            pacer,
            limiter,
            mx_cache,
            default_concurrency,
        }
    }

    pub fn verifier(&self) -> &Arc<dyn Verify> {
        &self.verifier
    }

    pub fn pacer(&self) -> &Arc<ProbePacer> {
        &self.pacer
    }

    pub fn limiter(&self) -> &Arc<LevelLimiter> {
        &self.limiter
    }

    /// Drive a job to completion: sort, fan out, drain, close the callback,
    /// mark completed.
    pub async fn run_job(
        self: Arc<Self>,
        job: Arc<Job>,
        mut emails: Vec<String>,
        opts: RunOptions,
    ) {
        job.mark_running();
        info!(
            job_id = %job.id,
            total = emails.len(),
            level = u8::from(job.level),
            "job started"
        );

        // Grouping addresses by domain maximizes MX-cache hits and lets the
        // catch-all short-circuit cover whole runs of a domain.
        sort_by_domain(&mut emails);

        let concurrency =
            effective_concurrency(opts.concurrency, self.default_concurrency, emails.len());

        let callback = opts
            .callback_url
            .map(|url| CallbackSender::start(url, opts.callback_batch, job.id.clone()));

        let (tx, rx) = async_channel::bounded::<String>(1);
        let mut workers = Vec::with_capacity(concurrency);
        for _ in 0..concurrency {
            let engine = self.clone();
            let job = job.clone();
            let rx = rx.clone();
            let results_tx = callback.as_ref().map(CallbackSender::sender);
            workers.push(tokio::spawn(async move {
                while let Ok(email) = rx.recv().await {
                    engine
                        .process_address(&job, &email, results_tx.as_ref())
                        .await;
                }
            }));
        }
        drop(rx);

        for email in emails {
            if tx.send(email).await.is_err() {
                break;
            }
        }
        drop(tx);

        for worker in workers {
            if let Err(e) = worker.await {
                warn!(job_id = %job.id, error = %e, "worker task failed");
            }
        }

        if let Some(callback) = callback {
            callback.close(true).await;
        }
        job.mark_completed();
        info!(
            job_id = %job.id,
            done = job.done(),
            failed = job.failed(),
            "job completed"
        );
    }

    /// Verify one address and record the outcome on the job.
    async fn process_address(
        &self,
        job: &Job,
        email: &str,
        callback: Option<&mpsc::Sender<EmailResult>>,
    ) {
        if job.level == Level::Smtp {
            self.pacer.acquire().await;
        }
        let _permit = self.limiter.acquire(job.level).await;

        let syntax = self.verifier.parse_syntax(email);
        if !syntax.valid {
            let verdict = Verdict {
                email: email.to_string(),
                reachable: Reachable::No,
                syntax,
                smtp: None,
                suggestion: None,
                disposable: false,
                role_account: false,
                free: false,
                has_mx_records: false,
            };
            job.incr_done();
            self.emit(job, EmailResult::verdict(email, verdict), callback)
                .await;
            return;
        }

        let mx = self
            .mx_cache
            .lookup(self.verifier.as_ref(), &syntax.domain)
            .await;

        let outcome = if job.level == Level::Mx {
            let class = self.verifier.classify(&syntax);
            let has_mx = mx.as_ref().is_some_and(|m| m.has_mx_record);
            Ok(Verdict {
                email: email.to_string(),
                reachable: if has_mx {
                    Reachable::Unknown
                } else {
                    Reachable::No
                },
                syntax: syntax.clone(),
                smtp: None,
                suggestion: class.suggestion,
                disposable: class.disposable,
                role_account: class.role_account,
                free: class.free,
                has_mx_records: has_mx,
            })
        } else if job.catch_all(&syntax.domain) == Some(true) {
            // The domain accepts anything; probing again buys no signal.
            debug!(job_id = %job.id, domain = %syntax.domain, "catch-all short-circuit");
            let class = self.verifier.classify(&syntax);
            Ok(Verdict {
                email: email.to_string(),
                reachable: Reachable::Unknown,
                syntax: syntax.clone(),
                smtp: Some(SmtpDetails {
                    host_exists: true,
                    full_inbox: false,
                    catch_all: true,
                    deliverable: false,
                    disabled: false,
                }),
                suggestion: class.suggestion,
                disposable: class.disposable,
                role_account: class.role_account,
                free: class.free,
                has_mx_records: true,
            })
        } else {
            let verify = AssertUnwindSafe(self.verifier.verify(email, Level::Smtp));
            match verify.catch_unwind().await {
                Ok(Ok(verdict)) => {
                    if verdict.smtp.as_ref().is_some_and(|s| s.catch_all) {
                        job.set_catch_all(&syntax.domain, true);
                    }
                    Ok(verdict)
                }
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => {
                    warn!(job_id = %job.id, email = %email, "verifier panicked");
                    Err("verifier panicked".to_string())
                }
            }
        };

        // done is bumped before failed so a poller never observes
        // failed > done.
        let result = match outcome {
            Ok(verdict) => {
                let result = EmailResult::verdict(email, verdict);
                job.incr_done();
                result
            }
            Err(message) => {
                let result = EmailResult::error(email, message);
                job.incr_done();
                job.incr_failed();
                result
            }
        };
        self.emit(job, result, callback).await;
    }

    async fn emit(
        &self,
        job: &Job,
        result: EmailResult,
        callback: Option<&mpsc::Sender<EmailResult>>,
    ) {
        match callback {
            Some(tx) => {
                job.add_result(result.clone());
                let _ = tx.send(result).await;
            }
            None => job.add_result(result),
        }
    }
}

/// Clamp the requested concurrency into [1, total], defaulting when unset.
fn effective_concurrency(requested: usize, default: usize, total: usize) -> usize {
    let requested = if requested == 0 { default } else { requested };
    requested.min(total).max(1)
}

/// Order addresses by the substring after the last `@`.
pub(crate) fn sort_by_domain(emails: &mut [String]) {
    emails.sort_by(|a, b| domain_of(a).cmp(domain_of(b)));
}

fn domain_of(email: &str) -> &str {
    email.rfind('@').map(|i| &email[i + 1..]).unwrap_or("")
}
