//! Webhook streaming of results.
//!
//! A single consumer drains a bounded channel, groups results into
//! fixed-size batches, and POSTs each batch to the configured URL. The
//! channel holds at most two batches; when it fills, workers block on
//! enqueue, so a slow webhook throttles verification instead of buffering
//! without bound. Delivery is best effort: HTTP failures are logged and
//! dropped, and the polling endpoints remain the authoritative source.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::job::EmailResult;

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_CALLBACK_BATCH: usize = 200;

/// One webhook POST body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub job_id: String,
    pub results: Vec<EmailResult>,
    #[serde(rename = "final")]
    pub is_final: bool,
}

#[derive(Clone)]
struct Poster {
    client: reqwest::Client,
    url: String,
    job_id: String,
}

impl Poster {
    async fn post(&self, results: Vec<EmailResult>, is_final: bool) {
        let payload = CallbackPayload {
            job_id: self.job_id.clone(),
            results,
            is_final,
        };
        debug!(
            job_id = %self.job_id,
            count = payload.results.len(),
            is_final,
            "posting callback batch"
        );
        if let Err(e) = self.client.post(&self.url).json(&payload).send().await {
            warn!(job_id = %self.job_id, url = %self.url, error = %e, "callback post failed");
        }
    }
}

/// Batches results for one job and streams them to a webhook.
pub struct CallbackSender {
    tx: mpsc::Sender<EmailResult>,
    task: JoinHandle<()>,
    poster: Poster,
}

impl CallbackSender {
    /// Spawn the consumer for a job. A `batch_size` of 0 falls back to the
    /// default of 200.
    pub fn start(url: String, batch_size: usize, job_id: String) -> Self {
        let batch_size = if batch_size == 0 {
            DEFAULT_CALLBACK_BATCH
        } else {
            batch_size
        };
        let poster = Poster {
            client: reqwest::Client::builder()
                .timeout(CALLBACK_TIMEOUT)
                .build()
                .expect("callback http client"),
            url,
            job_id,
        };
        let (tx, rx) = mpsc::channel(batch_size * 2);
        let task = tokio::spawn(consume(rx, poster.clone(), batch_size));
        Self { tx, task, poster }
    }

    /// A handle workers use to enqueue results; sending blocks when the
    /// channel is full.
    pub fn sender(&self) -> mpsc::Sender<EmailResult> {
        self.tx.clone()
    }

    /// Flush the remainder and, when `final_payload` is set, POST the
    /// `{results: [], final: true}` terminator.
    pub async fn close(self, final_payload: bool) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            warn!(error = %e, "callback consumer task failed");
        }
        if final_payload {
            self.poster.post(Vec::new(), true).await;
        }
    }
}

async fn consume(mut rx: mpsc::Receiver<EmailResult>, poster: Poster, batch_size: usize) {
    let mut batch: Vec<EmailResult> = Vec::with_capacity(batch_size);
    while let Some(result) = rx.recv().await {
        batch.push(result);
        if batch.len() >= batch_size {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
            poster.post(full, false).await;
        }
    }
    if !batch.is_empty() {
        poster.post(batch, false).await;
    }
}
