//! HTTP routes the demo page drives: journey steps, batches, QR codes and scans.
//!
//! Step rejections and unrecognized scans are normal outcomes and come back as
//! `200` with the outcome in the body.

use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::error;

use crate::autoplay::{simulate_full_journey, AutoPlay};
use crate::config::{Pacing, Settings};
use crate::journey::{lock, shared, MangoChain, SharedChain, StepOutcome};
use crate::model::Block;
use crate::qr::{render_svg, QrPayload};
use crate::sink::{LedgerView, Notification, NotificationFeed, Severity};
use crate::verify::Verdict;

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub chain: SharedChain,
    pub autoplay: Arc<Mutex<Option<AutoPlay>>>,
    pub pacing: Pacing,
    pub notifications: Arc<NotificationFeed>,
    pub view: watch::Receiver<LedgerView>,
}

impl AppState {
    /// Fresh session wired to a notification feed and a watch-channel render sink.
    pub fn new(settings: &Settings) -> Self {
        let notifications = Arc::new(NotificationFeed::new(settings.notification_capacity));
        let chain = MangoChain::new(settings.farm.clone()).with_notifier(notifications.clone());
        let (view_tx, view) = watch::channel(chain.view());
        let chain = chain.with_render_sink(Arc::new(view_tx));

        Self {
            chain: shared(chain),
            autoplay: Arc::new(Mutex::new(None)),
            pacing: settings.autoplay,
            notifications,
            view,
        }
    }

    fn autoplay(&self) -> MutexGuard<'_, Option<AutoPlay>> {
        self.autoplay.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cancel any automated run still in flight.
    fn stop_autoplay(&self) -> bool {
        match self.autoplay().take() {
            Some(run) if !run.is_finished() => {
                run.cancel();
                true
            }
            _ => false,
        }
    }

    fn latest_view(&self) -> LedgerView {
        self.view.borrow().clone()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/state", get(current_state))
        .route("/ledger", get(list_blocks))
        .route("/ledger/latest", get(latest_block))
        .route("/ledger/test", post(add_test_transaction))
        .route("/journey/step/:step", post(advance_step))
        .route("/journey/harvest", post(harvest))
        .route("/journey/reset", post(reset_journey))
        .route("/journey/simulate", post(start_autoplay))
        .route("/journey/simulate/cancel", post(cancel_autoplay))
        .route("/batch", post(new_batch))
        .route("/qr", get(qr_payload))
        .route("/qr.svg", get(qr_svg))
        .route("/scan", post(scan))
        .route("/scan/simulate", post(simulate_scan))
        .route("/notifications", get(notifications))
        .route("/health", get(health))
        .route("/version", get(version))
        .with_state(state)
}

/// GET /state: the last rendered view
pub async fn current_state(State(state): State<AppState>) -> Json<LedgerView> {
    Json(state.latest_view())
}

/// GET /ledger
pub async fn list_blocks(State(state): State<AppState>) -> Json<Vec<Block>> {
    Json(lock(&state.chain).ledger().blocks().to_vec())
}

/// GET /ledger/latest: explorer summary
#[derive(Debug, Serialize, Deserialize)]
pub struct ExplorerResp {
    pub batch_id: String,
    pub total_blocks: usize,
    pub latest: Block,
}
pub async fn latest_block(State(state): State<AppState>) -> Json<ExplorerResp> {
    let guard = lock(&state.chain);
    Json(ExplorerResp {
        batch_id: guard.batch().to_string(),
        total_blocks: guard.ledger().len(),
        latest: guard.ledger().latest().clone(),
    })
}

/// POST /ledger/test
pub async fn add_test_transaction(State(state): State<AppState>) -> Json<Block> {
    let mut guard = lock(&state.chain);
    guard.add_test_transaction();
    Json(guard.ledger().latest().clone())
}

/// POST /journey/step/:step
pub async fn advance_step(
    State(state): State<AppState>,
    Path(step): Path<u8>,
) -> Json<StepOutcome> {
    Json(lock(&state.chain).advance_to(step))
}

/// POST /journey/harvest
pub async fn harvest(State(state): State<AppState>) -> Json<StepOutcome> {
    Json(lock(&state.chain).harvest())
}

/// POST /journey/reset: also cancels a running autoplay
pub async fn reset_journey(State(state): State<AppState>) -> Json<LedgerView> {
    state.stop_autoplay();
    lock(&state.chain).reset_journey();
    Json(state.latest_view())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AutoPlayResp {
    pub running: bool,
}

/// POST /journey/simulate
pub async fn start_autoplay(State(state): State<AppState>) -> Json<AutoPlayResp> {
    let mut slot = state.autoplay();
    if slot.as_ref().is_some_and(|run| !run.is_finished()) {
        lock(&state.chain).notify(
            "Journey already in progress! Reset first.",
            Severity::Warning,
        );
        return Json(AutoPlayResp { running: false });
    }

    *slot = simulate_full_journey(&state.chain, state.pacing);
    Json(AutoPlayResp {
        running: slot.is_some(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResp {
    pub cancelled: bool,
}

/// POST /journey/simulate/cancel
pub async fn cancel_autoplay(State(state): State<AppState>) -> Json<CancelResp> {
    Json(CancelResp {
        cancelled: state.stop_autoplay(),
    })
}

/// POST /batch: new batch; cancels a running autoplay
pub async fn new_batch(State(state): State<AppState>) -> Json<LedgerView> {
    state.stop_autoplay();
    lock(&state.chain).new_batch();
    Json(state.latest_view())
}

#[derive(Debug, Serialize)]
pub struct QrResp {
    pub payload: String,
    pub fields: QrPayload,
}

/// GET /qr: payload rebuilt from the live ledger
pub async fn qr_payload(State(state): State<AppState>) -> Json<QrResp> {
    let fields = lock(&state.chain).qr_payload();
    Json(QrResp {
        payload: fields.to_string(),
        fields,
    })
}

/// GET /qr.svg: downloadable QR image of the live payload
pub async fn qr_svg(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let (batch, payload) = {
        let guard = lock(&state.chain);
        (guard.batch().to_string(), guard.qr_payload().to_string())
    };
    let svg = render_svg(&payload).map_err(|e| {
        error!(%e, "QR render failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/svg+xml".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"MangoChain_{batch}.svg\""),
            ),
        ],
        svg,
    ))
}

#[derive(Debug, Deserialize)]
pub struct ScanReq {
    pub decoded: String,
}

/// POST /scan: a string decoded by the page's camera scanner
pub async fn scan(State(state): State<AppState>, Json(req): Json<ScanReq>) -> Json<Verdict> {
    Json(lock(&state.chain).verify(&req.decoded))
}

/// POST /scan/simulate: verify the payload currently on display
pub async fn simulate_scan(State(state): State<AppState>) -> Json<Verdict> {
    Json(lock(&state.chain).simulate_scan())
}

/// GET /notifications: oldest first
pub async fn notifications(State(state): State<AppState>) -> Json<Vec<Notification>> {
    Json(state.notifications.recent())
}

/// GET /health
#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
}
pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

/// GET /version
#[derive(Serialize)]
pub struct Version {
    pub version: &'static str,
    pub git_sha: Option<&'static str>,
}
pub async fn version() -> Json<Version> {
    Json(Version {
        version: env!("CARGO_PKG_VERSION"),
        git_sha: option_env!("GIT_SHA"),
    })
}
