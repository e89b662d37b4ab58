//! Automated demo run through all five journey steps.
//!
//! The run is a tokio task paced by tokio time, returned to the caller as an
//! [`AutoPlay`] handle that can be cancelled. Each tick goes through
//! [`MangoChain::advance_to`](crate::journey::MangoChain::advance_to), so a
//! reset in the middle of a run makes the remaining ticks bounce off the
//! step gate instead of skipping ahead.

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::Pacing;
use crate::journey::{lock, SharedChain, FINAL_STEP};
use crate::sink::Severity;

#[derive(Debug)]
pub struct AutoPlay {
    task: JoinHandle<()>,
}

impl AutoPlay {
    /// Stop the run; steps already recorded stay recorded.
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the run to end. `true` if it ran to completion, `false` if it
    /// was cancelled.
    pub async fn join(self) -> bool {
        self.task.await.is_ok()
    }
}

/// Start an automated run, or `None` when the batch has already started.
///
/// Must be called from within a tokio runtime.
pub fn simulate_full_journey(chain: &SharedChain, pacing: Pacing) -> Option<AutoPlay> {
    if !lock(chain).begin_autoplay() {
        return None;
    }

    let chain = SharedChain::clone(chain);
    let task = tokio::spawn(async move {
        for step in 1..=FINAL_STEP {
            sleep(pacing.step_interval()).await;
            let outcome = lock(&chain).advance_to(step);
            debug!(step, ?outcome, "autoplay tick");
        }
        sleep(pacing.completion_delay()).await;
        lock(&chain).notify(
            "Demo complete! Now scan the QR code with any camera.",
            Severity::Success,
        );
        info!("autoplay finished");
    });

    Some(AutoPlay { task })
}
