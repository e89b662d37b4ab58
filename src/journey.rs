//! Journey state machine for the current batch.
//!
//! [`MangoChain`] is the whole mutable state of a session: the current batch,
//! its ledger and the step it has reached. Steps run 0 (not harvested) to 5
//! (consumer purchase). A step may never skip past the next one, but an
//! earlier step may be recorded again; every accepted step from 1 to 5 writes
//! exactly one block.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::config::FarmProfile;
use crate::model::{long_date, BatchId, Ledger};
use crate::qr::QrPayload;
use crate::sink::{
    LedgerView, Notifier, RenderSink, Severity, StageStatus, StageView, TracingNotifier,
    TracingRender,
};
use crate::verify::{classify, Verdict, VerifyContext};

pub const FINAL_STEP: u8 = 5;

const SYSTEM_ACTOR: &str = "Blockchain System";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JourneyStep {
    pub step: u8,
    pub name: &'static str,
    pub action: &'static str,
    pub from: &'static str,
    pub to: &'static str,
    pub description: &'static str,
}

pub static JOURNEY_STEPS: [JourneyStep; FINAL_STEP as usize] = [
    JourneyStep {
        step: 1,
        name: "Farm Harvest",
        action: "Harvest recorded on blockchain",
        from: "Green Valley Farm",
        to: SYSTEM_ACTOR,
        description: "Mangoes harvested and recorded on blockchain",
    },
    JourneyStep {
        step: 2,
        name: "Processing & Packing",
        action: "Washed, graded, and packed",
        from: "Farm",
        to: "Packing Facility",
        description: "Quality check and packaging completed",
    },
    JourneyStep {
        step: 3,
        name: "Transportation",
        action: "Shipped via refrigerated truck",
        from: "Packing Facility",
        to: "Distribution Center",
        description: "Transport with temperature control",
    },
    JourneyStep {
        step: 4,
        name: "Supermarket Display",
        action: "Placed on shelf with QR code",
        from: "Distribution Center",
        to: "FreshMart Supermarket",
        description: "Product displayed for consumers",
    },
    JourneyStep {
        step: 5,
        name: "Consumer Purchase",
        action: "Purchased by consumer",
        from: "Supermarket",
        to: "Consumer",
        description: "Consumer scans QR to verify authenticity",
    },
];

/// 1-based lookup into [`JOURNEY_STEPS`].
pub fn journey_step(step: u8) -> Option<&'static JourneyStep> {
    step.checked_sub(1)
        .and_then(|i| JOURNEY_STEPS.get(usize::from(i)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// `block_index` is `None` only for step 0, which writes no block.
    Advanced {
        step: u8,
        block_index: Option<u64>,
    },
    Rejected(Rejection),
}

impl StepOutcome {
    pub fn is_advanced(&self) -> bool {
        matches!(self, StepOutcome::Advanced { .. })
    }
}

/// Why a step request left the state untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    /// Tried to skip ahead; `next` must be recorded first.
    CompleteStepFirst { next: u8 },
    /// Quick harvest on a batch that has already started.
    AlreadyHarvested,
    /// Past the final step.
    UnknownStep { step: u8 },
}

pub struct MangoChain {
    profile: FarmProfile,
    batch: BatchId,
    ledger: Ledger,
    current_step: u8,
    notifier: Arc<dyn Notifier>,
    render: Arc<dyn RenderSink>,
}

impl MangoChain {
    /// Fresh session on the profile's initial batch, at step 0 with a genesis
    /// ledger. Notifications and renders go to `tracing` until replaced.
    pub fn new(profile: FarmProfile) -> Self {
        Self {
            batch: BatchId::new(profile.initial_batch.clone()),
            profile,
            ledger: Ledger::new(),
            current_step: 0,
            notifier: Arc::new(TracingNotifier),
            render: Arc::new(TracingRender),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_render_sink(mut self, render: Arc<dyn RenderSink>) -> Self {
        self.render = render;
        self
    }

    pub fn profile(&self) -> &FarmProfile {
        &self.profile
    }

    pub fn batch(&self) -> &BatchId {
        &self.batch
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn current_step(&self) -> u8 {
        self.current_step
    }

    /// Record `step` unless it skips past the next one. An earlier step is
    /// recorded again and the journey moves back to it; step 0 moves back to
    /// the start without writing a block.
    pub fn advance_to(&mut self, step: u8) -> StepOutcome {
        let next = self.current_step + 1;
        let rejection = if step > FINAL_STEP {
            Some(Rejection::UnknownStep { step })
        } else if step > next {
            Some(Rejection::CompleteStepFirst { next })
        } else {
            None
        };
        if let Some(rejection) = rejection {
            self.reject(rejection);
            return StepOutcome::Rejected(rejection);
        }

        self.current_step = step;
        let Some(descriptor) = journey_step(step) else {
            debug!(batch = %self.batch, "journey moved back to start");
            self.refresh();
            return StepOutcome::Advanced {
                step,
                block_index: None,
            };
        };

        let block_index = self
            .ledger
            .append(descriptor.from, descriptor.to, descriptor.action)
            .index;
        info!(batch = %self.batch, step, block_index, name = descriptor.name, "journey step recorded");

        self.notify(
            &format!("Step {step} completed: {}", descriptor.name),
            Severity::Success,
        );
        if step == FINAL_STEP {
            self.notify(
                "Journey complete! Now scan the QR code to verify authenticity.",
                Severity::Info,
            );
        }
        self.refresh();
        StepOutcome::Advanced {
            step,
            block_index: Some(block_index),
        }
    }

    /// Quick harvest: step 1, only for a batch that has not started.
    pub fn harvest(&mut self) -> StepOutcome {
        if self.current_step > 0 {
            self.reject(Rejection::AlreadyHarvested);
            return StepOutcome::Rejected(Rejection::AlreadyHarvested);
        }
        self.advance_to(1)
    }

    /// Back to step 0. Ledger blocks stay.
    pub fn reset_journey(&mut self) {
        self.current_step = 0;
        info!(batch = %self.batch, "journey reset");
        self.notify("Journey reset. Start from Step 1.", Severity::Info);
        self.refresh();
    }

    /// Start a new batch: fresh id, step 0, and a new ledger holding genesis
    /// plus the batch creation record. The previous ledger is discarded.
    pub fn new_batch(&mut self) -> &BatchId {
        self.batch = BatchId::generate(&self.profile.batch_prefix);
        self.current_step = 0;
        self.ledger.initialize();
        self.ledger.append(
            self.profile.farm.clone(),
            SYSTEM_ACTOR,
            format!("New batch created: {}", self.batch),
        );
        info!(batch = %self.batch, "new batch created");

        self.notify(
            &format!("New batch created: {}", self.batch),
            Severity::Success,
        );
        self.refresh();
        &self.batch
    }

    /// Append a free-standing test block; the journey is untouched.
    pub fn add_test_transaction(&mut self) -> u64 {
        let index = self
            .ledger
            .append("Test User", SYSTEM_ACTOR, "Test transaction added by judge")
            .index;
        self.notify("Test transaction added to blockchain", Severity::Success);
        self.refresh();
        index
    }

    /// Classify a scanned string; an accepted scan is recorded on the ledger.
    pub fn verify(&mut self, scanned: &str) -> Verdict {
        let verdict = classify(
            scanned,
            &VerifyContext {
                current_batch: self.batch.as_str(),
                current_step: self.current_step,
                profile: &self.profile,
            },
        );

        match &verdict {
            Verdict::Match(product) => {
                self.ledger.append(
                    "QR Scanner",
                    "Verification System",
                    format!("Product verified via QR scan: {}", product.batch_id),
                );
                info!(batch = %product.batch_id, batch_match = %product.batch_match, "scan verified");
                self.notify("QR code scanned successfully! Product verified.", Severity::Success);
                self.refresh();
            }
            Verdict::NoMatch { preview } => {
                info!(%preview, "scan rejected");
                self.notify(
                    "Invalid QR code - Not a MangoChain product",
                    Severity::Warning,
                );
            }
        }
        verdict
    }

    /// Verify the payload currently on display, as if it had been scanned.
    pub fn simulate_scan(&mut self) -> Verdict {
        let payload = self.qr_payload().to_string();
        self.verify(&payload)
    }

    /// Rebuild the QR payload from the live state.
    pub fn qr_payload(&self) -> QrPayload {
        let now = OffsetDateTime::now_utc();
        QrPayload {
            scheme: self.profile.verify_scheme.clone(),
            domain: self.profile.verify_domain.clone(),
            batch_id: self.batch.to_string(),
            farm: self.profile.farm.clone(),
            farmer: self.profile.farmer.clone(),
            product: self.profile.product.clone(),
            location: self.profile.location.clone(),
            harvest: long_date(now),
            step: self.current_step,
            blocks: self.ledger.len(),
            hash: QrPayload::hash_prefix(&self.ledger.latest().integrity_token),
            time_ms: now.unix_timestamp_nanos() / 1_000_000,
        }
    }

    pub fn stage_label(&self) -> &'static str {
        journey_step(self.current_step)
            .map(|s| s.name)
            .unwrap_or("Ready for harvest")
    }

    pub fn stages(&self) -> Vec<StageView> {
        JOURNEY_STEPS
            .iter()
            .map(|s| StageView {
                step: s.step,
                name: s.name,
                description: s.description,
                status: match s.step.cmp(&self.current_step) {
                    std::cmp::Ordering::Less => StageStatus::Completed,
                    std::cmp::Ordering::Equal => StageStatus::Active,
                    std::cmp::Ordering::Greater => StageStatus::Pending,
                },
            })
            .collect()
    }

    pub fn view(&self) -> LedgerView {
        LedgerView {
            batch_id: self.batch.to_string(),
            current_step: self.current_step,
            stage: self.stage_label().to_string(),
            stages: self.stages(),
            block_count: self.ledger.len(),
            blocks: self.ledger.blocks().to_vec(),
            qr_payload: self.qr_payload().to_string(),
        }
    }

    pub fn notify(&self, message: &str, severity: Severity) {
        self.notifier.notify(message, severity);
    }

    /// Gate for the automated demo: only a batch that has not started may run.
    pub(crate) fn begin_autoplay(&self) -> bool {
        if self.current_step > 0 {
            self.notify("Journey already in progress! Reset first.", Severity::Warning);
            return false;
        }
        self.notify("Starting automated demo...", Severity::Info);
        true
    }

    fn reject(&self, rejection: Rejection) {
        debug!(batch = %self.batch, current = self.current_step, ?rejection, "step rejected");
        let message = match rejection {
            Rejection::CompleteStepFirst { next } => format!("Please complete step {next} first!"),
            Rejection::AlreadyHarvested => {
                "Batch already harvested! Try 'New Batch' instead.".to_string()
            }
            Rejection::UnknownStep { step } => {
                format!("There is no step {step}; the journey ends at step {FINAL_STEP}.")
            }
        };
        self.notify(&message, Severity::Warning);
    }

    fn refresh(&self) {
        self.render.render(&self.view());
    }
}

/// Session state shared between request handlers and scheduled tasks.
pub type SharedChain = Arc<Mutex<MangoChain>>;

pub fn shared(chain: MangoChain) -> SharedChain {
    Arc::new(Mutex::new(chain))
}

/// Lock the session, recovering from a poisoned mutex.
pub fn lock(chain: &SharedChain) -> MutexGuard<'_, MangoChain> {
    chain.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::NotificationFeed;
    use crate::verify::BatchMatch;

    #[derive(Default)]
    struct RenderLog(Mutex<Vec<LedgerView>>);

    impl RenderSink for RenderLog {
        fn render(&self, view: &LedgerView) {
            self.0.lock().expect("render log").push(view.clone());
        }
    }

    fn chain() -> (MangoChain, Arc<NotificationFeed>, Arc<RenderLog>) {
        let feed = Arc::new(NotificationFeed::new(64));
        let renders = Arc::new(RenderLog::default());
        let chain = MangoChain::new(FarmProfile::default())
            .with_notifier(feed.clone())
            .with_render_sink(renders.clone());
        (chain, feed, renders)
    }

    #[test]
    fn fresh_session_starts_at_genesis() {
        let (chain, _, _) = chain();
        assert_eq!(chain.current_step(), 0);
        assert_eq!(chain.ledger().len(), 1);
        assert_eq!(chain.batch().as_str(), "MANGO2024-001");
        assert_eq!(chain.stage_label(), "Ready for harvest");
    }

    #[test]
    fn skipping_is_rejected_then_steps_advance_in_order() {
        let (mut chain, feed, _) = chain();

        assert_eq!(
            chain.advance_to(2),
            StepOutcome::Rejected(Rejection::CompleteStepFirst { next: 1 })
        );
        assert_eq!(chain.current_step(), 0);
        assert_eq!(chain.ledger().len(), 1);
        let warning = feed.last().expect("warning");
        assert_eq!(warning.message, "Please complete step 1 first!");
        assert_eq!(warning.severity, Severity::Warning);

        assert_eq!(
            chain.advance_to(1),
            StepOutcome::Advanced {
                step: 1,
                block_index: Some(1)
            }
        );
        assert_eq!(chain.current_step(), 1);
        assert_eq!(chain.ledger().len(), 2);

        assert!(chain.advance_to(2).is_advanced());
        assert_eq!(chain.current_step(), 2);
        assert_eq!(chain.ledger().len(), 3);
    }

    #[test]
    fn each_step_appends_its_descriptor() {
        let (mut chain, _, _) = chain();
        for step in 1..=FINAL_STEP {
            let before = chain.ledger().len();
            assert!(chain.advance_to(step).is_advanced());
            assert_eq!(chain.current_step(), step);
            assert_eq!(chain.ledger().len(), before + 1);

            let descriptor = journey_step(step).expect("descriptor");
            let block = chain.ledger().latest();
            assert_eq!(block.from, descriptor.from);
            assert_eq!(block.to, descriptor.to);
            assert_eq!(block.action, descriptor.action);
            assert_eq!(chain.stage_label(), descriptor.name);
        }
    }

    #[test]
    fn far_skips_never_mutate() {
        let (mut chain, _, renders) = chain();
        chain.advance_to(1);
        let rendered = renders.0.lock().expect("renders").len();
        for step in [3, 4, 5, 9, u8::MAX] {
            assert!(!chain.advance_to(step).is_advanced());
            assert_eq!(chain.current_step(), 1);
            assert_eq!(chain.ledger().len(), 2);
        }
        assert_eq!(renders.0.lock().expect("renders").len(), rendered);
    }

    #[test]
    fn earlier_step_is_recorded_again() {
        let (mut chain, feed, _) = chain();
        chain.advance_to(1);
        chain.advance_to(2);

        assert_eq!(
            chain.advance_to(1),
            StepOutcome::Advanced {
                step: 1,
                block_index: Some(3)
            }
        );
        assert_eq!(chain.current_step(), 1);
        assert_eq!(chain.ledger().len(), 4);
        assert_eq!(chain.ledger().latest().action, "Harvest recorded on blockchain");
        assert_eq!(
            feed.last().expect("notification").message,
            "Step 1 completed: Farm Harvest"
        );

        assert!(chain.advance_to(2).is_advanced());
        assert_eq!(chain.current_step(), 2);
        assert_eq!(chain.ledger().len(), 5);
    }

    #[test]
    fn same_step_twice_writes_two_blocks() {
        let (mut chain, _, _) = chain();
        chain.advance_to(1);
        assert!(chain.advance_to(1).is_advanced());
        assert_eq!(chain.current_step(), 1);
        assert_eq!(chain.ledger().len(), 3);
    }

    #[test]
    fn step_zero_moves_back_without_a_block() {
        let (mut chain, _, renders) = chain();
        chain.advance_to(1);
        chain.advance_to(2);
        let rendered = renders.0.lock().expect("renders").len();

        assert_eq!(
            chain.advance_to(0),
            StepOutcome::Advanced {
                step: 0,
                block_index: None
            }
        );
        assert_eq!(chain.current_step(), 0);
        assert_eq!(chain.ledger().len(), 3);
        assert_eq!(chain.stage_label(), "Ready for harvest");
        assert_eq!(renders.0.lock().expect("renders").len(), rendered + 1);
    }

    #[test]
    fn nothing_after_final_step() {
        let (mut chain, feed, _) = chain();
        for step in 1..=FINAL_STEP {
            chain.advance_to(step);
        }
        assert_eq!(
            chain.advance_to(6),
            StepOutcome::Rejected(Rejection::UnknownStep { step: 6 })
        );
        assert_eq!(chain.current_step(), FINAL_STEP);
        assert_eq!(chain.ledger().len(), 6);
        assert_eq!(feed.last().expect("warning").severity, Severity::Warning);
    }

    #[test]
    fn final_step_announces_completion() {
        let (mut chain, feed, _) = chain();
        for step in 1..=FINAL_STEP {
            chain.advance_to(step);
        }
        let last = feed.last().expect("notification");
        assert!(last.message.starts_with("Journey complete!"));
        assert_eq!(last.severity, Severity::Info);
    }

    #[test]
    fn reset_keeps_ledger() {
        let (mut chain, _, _) = chain();
        chain.advance_to(1);
        chain.advance_to(2);
        chain.advance_to(3);
        chain.reset_journey();
        assert_eq!(chain.current_step(), 0);
        assert_eq!(chain.ledger().len(), 4);

        chain.reset_journey();
        assert_eq!(chain.current_step(), 0);
        assert_eq!(chain.ledger().len(), 4);
        assert!(chain.advance_to(1).is_advanced());
        assert_eq!(chain.ledger().len(), 5);
    }

    #[test]
    fn new_batch_starts_over() {
        let (mut chain, feed, _) = chain();
        chain.advance_to(1);
        chain.advance_to(2);

        let batch = chain.new_batch().clone();
        assert!(batch.as_str().starts_with("MANGO2024-"));
        assert_eq!(batch.as_str().len(), "MANGO2024-".len() + 3);
        assert_eq!(chain.current_step(), 0);
        assert_eq!(chain.ledger().len(), 2);
        assert_eq!(chain.ledger().blocks()[0].from, "GENESIS");
        assert_eq!(
            chain.ledger().latest().action,
            format!("New batch created: {batch}")
        );
        assert_eq!(
            feed.last().expect("notification").message,
            format!("New batch created: {batch}")
        );
    }

    #[test]
    fn new_batch_twice_resets_both_times() {
        let (mut chain, _, _) = chain();
        chain.new_batch();
        assert_eq!(chain.ledger().len(), 2);
        assert_eq!(chain.current_step(), 0);
        chain.new_batch();
        assert_eq!(chain.ledger().len(), 2);
        assert_eq!(chain.current_step(), 0);
    }

    #[test]
    fn harvest_only_once_per_batch() {
        let (mut chain, feed, _) = chain();
        assert!(chain.harvest().is_advanced());
        assert_eq!(
            chain.harvest(),
            StepOutcome::Rejected(Rejection::AlreadyHarvested)
        );
        assert_eq!(chain.current_step(), 1);
        assert_eq!(chain.ledger().len(), 2);
        assert_eq!(
            feed.last().expect("warning").message,
            "Batch already harvested! Try 'New Batch' instead."
        );
    }

    #[test]
    fn test_transaction_leaves_journey_alone() {
        let (mut chain, _, _) = chain();
        chain.advance_to(1);
        assert_eq!(chain.add_test_transaction(), 2);
        assert_eq!(chain.current_step(), 1);
        assert_eq!(chain.ledger().latest().from, "Test User");
    }

    #[test]
    fn stage_statuses_follow_current_step() {
        let (mut chain, _, _) = chain();
        chain.advance_to(1);
        chain.advance_to(2);
        let statuses: Vec<_> = chain.stages().into_iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            [
                StageStatus::Completed,
                StageStatus::Active,
                StageStatus::Pending,
                StageStatus::Pending,
                StageStatus::Pending,
            ]
        );
    }

    #[test]
    fn payload_reflects_live_state() {
        let (mut chain, _, _) = chain();
        chain.advance_to(1);
        let payload = chain.qr_payload();
        assert_eq!(payload.batch_id, "MANGO2024-001");
        assert_eq!(payload.step, 1);
        assert_eq!(payload.blocks, 2);
        assert!(chain
            .ledger()
            .latest()
            .integrity_token
            .starts_with(&payload.hash));
        assert!(payload
            .to_string()
            .starts_with("https://mangochain.verify/MANGO2024-001?"));
    }

    #[test]
    fn scan_of_own_payload_is_current_batch() {
        let (mut chain, _, _) = chain();
        let before = chain.ledger().len();
        match chain.simulate_scan() {
            Verdict::Match(product) => {
                assert_eq!(product.batch_match, BatchMatch::CurrentBatch);
                assert_eq!(product.step, "0");
            }
            other => panic!("expected match, got {other:?}"),
        }
        assert_eq!(chain.ledger().len(), before + 1);
        assert_eq!(
            chain.ledger().latest().action,
            "Product verified via QR scan: MANGO2024-001"
        );
    }

    #[test]
    fn scan_of_other_batch_is_recorded_as_different() {
        let (mut chain, _, _) = chain();
        match chain.verify("https://mangochain.verify/MANGO2024-555?step=3") {
            Verdict::Match(product) => {
                assert_eq!(product.batch_match, BatchMatch::DifferentBatch)
            }
            other => panic!("expected match, got {other:?}"),
        }
        assert_eq!(
            chain.ledger().latest().action,
            "Product verified via QR scan: MANGO2024-555"
        );
    }

    #[test]
    fn rejected_scan_leaves_ledger_alone() {
        let (mut chain, feed, renders) = chain();
        let rendered = renders.0.lock().expect("renders").len();
        assert!(!chain.verify("WIFI:S:guest;T:WPA;P:hunter2;;").is_match());
        assert_eq!(chain.ledger().len(), 1);
        assert_eq!(renders.0.lock().expect("renders").len(), rendered);
        assert_eq!(feed.last().expect("warning").severity, Severity::Warning);
    }

    #[test]
    fn every_mutation_renders_full_view() {
        let (mut chain, _, renders) = chain();
        chain.advance_to(1);
        chain.add_test_transaction();
        chain.reset_journey();

        let renders = renders.0.lock().expect("renders");
        assert_eq!(renders.len(), 3);
        let last = renders.last().expect("view");
        assert_eq!(last.current_step, 0);
        assert_eq!(last.block_count, 3);
        assert_eq!(last.blocks.len(), 3);
    }

    #[test]
    fn autoplay_gate_requires_fresh_batch() {
        let (mut chain, feed, _) = chain();
        assert!(chain.begin_autoplay());
        chain.advance_to(1);
        assert!(!chain.begin_autoplay());
        assert_eq!(
            feed.last().expect("warning").message,
            "Journey already in progress! Reset first."
        );
    }
}
