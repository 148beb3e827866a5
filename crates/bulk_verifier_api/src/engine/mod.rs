//! The bulk verification engine.
//!
//! Everything that coordinates correctness under concurrent load lives here:
//! job lifecycle and expiry, the two-tier concurrency limiter, the global
//! probe pacer, the MX and catch-all caches, the worker pool, and the
//! webhook batcher. The verification itself is delegated to the
//! [`verifier_core::Verify`] implementation the engine is constructed with.

pub mod callback;
pub mod job;
pub mod limiter;
pub mod manager;
pub mod mx_cache;
pub mod pacer;
pub mod worker;

pub use callback::{CallbackPayload, CallbackSender};
pub use job::{EmailResult, Job, JobSnapshot, JobStatus};
pub use limiter::LevelLimiter;
pub use manager::JobManager;
pub use mx_cache::MxCache;
pub use pacer::ProbePacer;
pub use worker::{Engine, RunOptions};
