//! Scan sources and the scanner driver.
//!
//! Camera access and per-frame decoding belong to whatever sits behind a
//! [`ScanSource`]; the core only sees successfully decoded strings, a stop
//! signal, or a camera failure it reports to the user.

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::journey::{lock, SharedChain};
use crate::sink::Severity;
use crate::verify::Verdict;

/// Why the camera could not be started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("Camera permission denied. Please allow camera access.")]
    PermissionDenied,
    #[error("No camera found. Try on a device with camera.")]
    NotFound,
    #[error("Camera access required")]
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Decoded(String),
    Failed(CameraError),
    Stopped,
}

#[async_trait]
pub trait ScanSource: Send {
    /// Next event, or `None` once the source is exhausted.
    async fn next_event(&mut self) -> Option<ScanEvent>;
}

/// How a scanner session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanSummary {
    Scanned(Verdict),
    Stopped,
    CameraFailed(CameraError),
}

/// Run one scanner session: the first decoded string is verified against the
/// session, after which the scanner stops.
pub async fn run_scanner<S>(source: &mut S, chain: &SharedChain) -> ScanSummary
where
    S: ScanSource + ?Sized,
{
    lock(chain).notify(
        "Camera scanner started. Point at QR code.",
        Severity::Success,
    );

    let summary = loop {
        match source.next_event().await {
            Some(ScanEvent::Decoded(text)) if text.trim().is_empty() => continue,
            Some(ScanEvent::Decoded(text)) => {
                info!(len = text.len(), "QR code decoded");
                break ScanSummary::Scanned(lock(chain).verify(&text));
            }
            Some(ScanEvent::Failed(error)) => {
                warn!(%error, "camera unavailable");
                lock(chain).notify(
                    &format!("{error} (try the simulated scan instead)"),
                    Severity::Warning,
                );
                return ScanSummary::CameraFailed(error);
            }
            Some(ScanEvent::Stopped) | None => break ScanSummary::Stopped,
        }
    };

    lock(chain).notify("Scanner stopped", Severity::Info);
    summary
}

/// Events pushed from elsewhere in the process.
pub struct ChannelScanSource {
    rx: mpsc::Receiver<ScanEvent>,
}

impl ChannelScanSource {
    pub fn new(capacity: usize) -> (mpsc::Sender<ScanEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }
}

#[async_trait]
impl ScanSource for ChannelScanSource {
    async fn next_event(&mut self) -> Option<ScanEvent> {
        self.rx.recv().await
    }
}

/// One decoded payload per line, e.g. the raw output of an external decoder
/// piped into stdin. End of input stops the scanner.
pub struct LineScanSource<R> {
    lines: Lines<R>,
}

impl<R: AsyncBufRead + Unpin> LineScanSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }
}

#[async_trait]
impl<R> ScanSource for LineScanSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_event(&mut self) -> Option<ScanEvent> {
        match self.lines.next_line().await {
            Ok(Some(line)) => Some(ScanEvent::Decoded(line)),
            Ok(None) => None,
            Err(error) => {
                warn!(%error, "scan input closed");
                None
            }
        }
    }
}
