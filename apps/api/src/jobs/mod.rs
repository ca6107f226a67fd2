//! Background jobs
//!
//! - [`acquisition`]: turns requested media links into playable assets
//! - [`vote_scheduler`]: opens and resolves audience votes, auto-advances
//!
//! Both run as independent tokio tasks against the shared store and stop
//! when the shutdown token is cancelled.

pub mod acquisition;
pub mod error;
pub mod vote_scheduler;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use acquisition::{AcquisitionPipeline, PollOutcome};
pub use error::{JobError, JobResult};
pub use vote_scheduler::{TickReport, VoteScheduler};

use crate::config::Config;
use crate::services::AcquisitionTool;
use crate::state::AppContext;

/// Spawn every background job.
pub fn spawn_all<T: AcquisitionTool>(
    ctx: &AppContext,
    config: &Config,
    tool: Arc<T>,
    shutdown: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let pipeline = AcquisitionPipeline::new(ctx.clone(), tool, config.acquisition.clone());
    let scheduler = VoteScheduler::new(ctx.clone(), config.vote.clone());

    vec![
        tokio::spawn(pipeline.run(shutdown.clone())),
        tokio::spawn(scheduler.run(shutdown.clone())),
    ]
}
