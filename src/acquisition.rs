//! Exposure and acquisition workflow
//!
//! Sets the exposure time, starts the acquisition and waits for it to finish.
//! Short exposures are polled for progress right away. Long exposures first
//! wait out most of the exposure time in an abortable window, then switch to
//! polling for the final stretch.
//!
//! The abort flag is only consulted during that window. Once the workflow has
//! started polling, [`AbortHandle::abort`] has no effect and the acquisition
//! runs to completion.

use crate::error::{Result, SiError};
use crate::io::Dispatcher;
use crate::protocol::commands::{
    Acquire, CameraCommand, InquireAcquisitionStatus, SetExposureTime, TerminateAcquisition,
};
use crate::protocol::data::Done;
use crate::protocol::response::{Response, ResultKind};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Timing parameters of the acquisition workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposureConfig {
    /// Exposures shorter than this are polled from the start
    pub short_exposure_threshold: Duration,
    /// Delay between acquisition status polls
    pub poll_interval: Duration,
    /// Slack on both sides of the exposure time
    ///
    /// Long exposures start polling this long before the exposure ends, and
    /// polling gives up this long after it should have ended.
    pub timeout_margin: Duration,
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self {
            short_exposure_threshold: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
            timeout_margin: Duration::from_secs(10),
        }
    }
}

/// How the workflow waits for the exposure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExposureMode {
    /// Short exposure, polled to completion without abort checks
    Blocking,
    /// Long exposure with an abortable wait before polling
    Pollable,
}

/// Progress of one acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionState {
    Idle,
    ExposureSet,
    Acquiring(ExposureMode),
    /// Exposure finished, waiting for the completion notice
    Readout,
    Done,
    Aborted,
    TimedOut,
    Rejected,
    /// Transport or protocol failure
    Failed,
}

impl ExposureMode {
    /// Mode used for an exposure of the given length
    pub fn for_exposure(exposure: Duration, config: &ExposureConfig) -> Self {
        if exposure < config.short_exposure_threshold {
            ExposureMode::Blocking
        } else {
            ExposureMode::Pollable
        }
    }
}

impl AcquisitionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AcquisitionState::Done
                | AcquisitionState::Aborted
                | AcquisitionState::TimedOut
                | AcquisitionState::Rejected
                | AcquisitionState::Failed
        )
    }

    fn from_error(error: &SiError) -> Self {
        match error {
            SiError::Aborted => AcquisitionState::Aborted,
            SiError::Timeout(_) => AcquisitionState::TimedOut,
            SiError::Rejected { .. } => AcquisitionState::Rejected,
            _ => AcquisitionState::Failed,
        }
    }
}

/// Shared abort flag
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the acquisition to stop
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A running acquisition
///
/// # Examples
///
/// ```no_run
/// use si_camera_rust::acquisition::{Acquisition, ExposureConfig};
/// use si_camera_rust::io::{ConnectionConfig, Dispatcher, DispatcherConfig, TcpConnector};
///
/// # async fn example() -> si_camera_rust::Result<()> {
/// let connector = TcpConnector::new(ConnectionConfig::new("192.168.1.20:2055"));
/// let dispatcher = Dispatcher::spawn(connector, DispatcherConfig::default());
///
/// let acquisition = Acquisition::start(dispatcher, 30.0, ExposureConfig::default());
/// let abort = acquisition.abort_handle();
/// // Another task may call abort.abort() during the exposure
/// let done = acquisition.wait().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Acquisition {
    abort: AbortHandle,
    state: watch::Receiver<AcquisitionState>,
    task: JoinHandle<Result<Done>>,
}

impl Acquisition {
    /// Start the workflow on a background task
    pub fn start(dispatcher: Dispatcher, exposure_secs: f64, config: ExposureConfig) -> Self {
        let abort = AbortHandle::new();
        let (state_tx, state) = watch::channel(AcquisitionState::Idle);

        let task_abort = abort.clone();
        let task = tokio::spawn(async move {
            run_acquisition(&dispatcher, exposure_secs, &config, &task_abort, &state_tx).await
        });

        Acquisition { abort, state, task }
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Request the acquisition to stop; see the module docs for when this applies
    pub fn abort(&self) {
        self.abort.abort();
    }

    /// Current state
    pub fn state(&self) -> AcquisitionState {
        *self.state.borrow()
    }

    /// Receiver for state changes
    pub fn subscribe(&self) -> watch::Receiver<AcquisitionState> {
        self.state.clone()
    }

    /// Wait for the workflow to finish
    pub async fn wait(self) -> Result<Done> {
        self.task
            .await
            .map_err(|e| SiError::TaskFailed(e.to_string()))?
    }
}

fn publish(state_tx: &watch::Sender<AcquisitionState>, state: AcquisitionState) {
    info!(state = ?state, "Acquisition state changed");
    state_tx.send_replace(state);
}

/// Run one acquisition to completion on the calling task
///
/// Returns the completion notice of the `Acquire` command. The final state is
/// published on `state_tx` whether the workflow succeeds or fails.
pub async fn run_acquisition(
    dispatcher: &Dispatcher,
    exposure_secs: f64,
    config: &ExposureConfig,
    abort: &AbortHandle,
    state_tx: &watch::Sender<AcquisitionState>,
) -> Result<Done> {
    let result = acquire(dispatcher, exposure_secs, config, abort, state_tx).await;

    match &result {
        Ok(done) => {
            debug!(func_number = done.func_number, "Acquisition complete");
            publish(state_tx, AcquisitionState::Done);
        }
        Err(e) => {
            warn!(error = %e, "Acquisition failed");
            publish(state_tx, AcquisitionState::from_error(e));
        }
    }
    result
}

async fn acquire(
    dispatcher: &Dispatcher,
    exposure_secs: f64,
    config: &ExposureConfig,
    abort: &AbortHandle,
    state_tx: &watch::Sender<AcquisitionState>,
) -> Result<Done> {
    let exposure = Duration::try_from_secs_f64(exposure_secs).map_err(|_| {
        SiError::InvalidParameter(format!("invalid exposure time {}", exposure_secs))
    })?;

    dispatcher
        .execute(&SetExposureTime {
            seconds: exposure_secs,
        })
        .await?
        .into_done()?;
    publish(state_tx, AcquisitionState::ExposureSet);

    match dispatcher.execute_no_ack(&Acquire).await? {
        Response::Ack(true) => {}
        other => {
            warn!(response = other.kind_name(), "Acquire not acknowledged");
            return Err(SiError::Rejected {
                func_number: Acquire.func_number(),
            });
        }
    }
    let started = Instant::now();

    let mode = ExposureMode::for_exposure(exposure, config);
    publish(state_tx, AcquisitionState::Acquiring(mode));
    if mode == ExposureMode::Pollable {
        let window = exposure.saturating_sub(config.timeout_margin);

        while started.elapsed() < window {
            if abort.is_aborted() {
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Aborting acquisition"
                );
                terminate(dispatcher, config.timeout_margin).await;
                return Err(SiError::Aborted);
            }
            let left = window - started.elapsed().min(window);
            tokio::time::sleep(config.poll_interval.min(left)).await;
        }
        if abort.is_aborted() {
            warn!("Abort requested after the abortable window closed; ignored");
        }
    }

    let deadline = exposure + config.timeout_margin;
    loop {
        let status = dispatcher
            .execute(&InquireAcquisitionStatus)
            .await?
            .into_acquisition_status()?;
        debug!(
            exp_done_percent = status.exp_done_percent,
            readout_done_percent = status.readout_done_percent,
            "Acquisition progress"
        );
        if status.is_exposure_done() {
            break;
        }
        if started.elapsed() > deadline {
            return Err(SiError::Timeout(format!(
                "exposure of {:?} not finished after {:?}",
                exposure,
                started.elapsed()
            )));
        }
        tokio::time::sleep(config.poll_interval).await;
    }

    publish(state_tx, AcquisitionState::Readout);
    dispatcher
        .await_result(Acquire.func_number(), ResultKind::DONE)
        .await?
        .into_done()
}

/// Stop the running exposure; failures are logged, never returned
///
/// The completion notice of the terminate command is collected so it does
/// not reach the next caller.
async fn terminate(dispatcher: &Dispatcher, limit: Duration) {
    let func_number = TerminateAcquisition.func_number();
    if let Err(e) = dispatcher.execute_no_ack(&TerminateAcquisition).await {
        warn!(error = %e, "Terminate request failed");
        return;
    }
    match dispatcher
        .await_result_within(func_number, ResultKind::DONE, limit)
        .await
    {
        Ok(_) => debug!("Acquisition terminated"),
        Err(e) => warn!(error = %e, "No completion notice for terminate"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exposure_config_defaults() {
        let config = ExposureConfig::default();
        assert_eq!(config.short_exposure_threshold, Duration::from_secs(10));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.timeout_margin, Duration::from_secs(10));
    }

    #[test]
    fn test_exposure_mode_by_length() {
        let config = ExposureConfig::default();
        assert_eq!(
            ExposureMode::for_exposure(Duration::from_secs(2), &config),
            ExposureMode::Blocking
        );
        assert_eq!(
            ExposureMode::for_exposure(Duration::from_secs(10), &config),
            ExposureMode::Pollable
        );
        assert_eq!(
            ExposureMode::for_exposure(Duration::from_secs(30), &config),
            ExposureMode::Pollable
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(AcquisitionState::Done.is_terminal());
        assert!(AcquisitionState::Aborted.is_terminal());
        assert!(!AcquisitionState::Readout.is_terminal());
        assert!(!AcquisitionState::Acquiring(ExposureMode::Blocking).is_terminal());
    }

    #[test]
    fn test_error_state_mapping() {
        assert_eq!(
            AcquisitionState::from_error(&SiError::Rejected { func_number: 1037 }),
            AcquisitionState::Rejected
        );
        assert_eq!(
            AcquisitionState::from_error(&SiError::Timeout("t".into())),
            AcquisitionState::TimedOut
        );
        assert_eq!(
            AcquisitionState::from_error(&SiError::DispatcherClosed),
            AcquisitionState::Failed
        );
    }

    #[tokio::test]
    async fn test_cancelled_task_reported_as_task_failure() {
        let (_state_tx, state) = watch::channel(AcquisitionState::Idle);
        let task: JoinHandle<Result<Done>> = tokio::spawn(std::future::pending());
        task.abort();
        let acquisition = Acquisition {
            abort: AbortHandle::new(),
            state,
            task,
        };

        let result = acquisition.wait().await;
        assert!(matches!(result, Err(SiError::TaskFailed(_))));
    }

    #[test]
    fn test_abort_handle_is_shared() {
        let handle = AbortHandle::new();
        let clone = handle.clone();
        clone.abort();
        assert!(handle.is_aborted());
    }
}
