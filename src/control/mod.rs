//! # Control Module
//!
//! Fixed-cadence control loop: maps every input source to a channel
//! vector, merges them and hands the result to the PPM scheduler.
//!
//! This module handles:
//! - Polling device snapshots and the serial receiver
//! - Merging contributions by largest deviation from neutral
//! - Output channel inversion
//! - Holding the last channel values while no source is active
//! - Periodic status logging and optional channel recording
//!
//! The loop never waits on the input readers or on the scheduler; all three
//! exchange only last-value state.

pub mod mixer;
pub mod source;

pub use mixer::{merge, Mixer};
pub use source::{ChannelSource, DeviceSource, ReceiverSource};

use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::controller::channel_mapper::{ChannelMapper, ChannelVector};
use crate::error::{PpmBridgeError, Result};
use crate::ppm::PpmHandle;
use crate::telemetry::ChannelRecorder;

/// Cycles between status log lines (about 5s at 60Hz)
pub const LOG_INTERVAL_CYCLES: u64 = 300;

/// Mix loop writing merged channels into a [`PpmHandle`]
pub struct ControlLoop {
    sources: Vec<Box<dyn ChannelSource>>,
    mapper: ChannelMapper,
    mixer: Mixer,
    output: PpmHandle,
    recorder: Option<ChannelRecorder>,
    period: Duration,
    cycles: u64,
    holding: bool,
}

impl std::fmt::Debug for ControlLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let labels: Vec<&str> = self.sources.iter().map(|s| s.label()).collect();
        f.debug_struct("ControlLoop")
            .field("sources", &labels)
            .field("mixer", &self.mixer)
            .field("period", &self.period)
            .field("cycles", &self.cycles)
            .finish_non_exhaustive()
    }
}

impl ControlLoop {
    /// Creates a control loop without sources
    ///
    /// # Arguments
    ///
    /// * `output` - Scheduler handle receiving the merged channels
    /// * `mapper` - Channel mapper applied to every source
    /// * `mixer` - Merge rule and output inversion
    /// * `period` - Time between mix cycles
    pub fn new(output: PpmHandle, mapper: ChannelMapper, mixer: Mixer, period: Duration) -> Self {
        Self {
            sources: Vec::new(),
            mapper,
            mixer,
            output,
            recorder: None,
            period,
            cycles: 0,
            holding: false,
        }
    }

    /// Adds a channel source
    ///
    /// Sources are merged in the order they were added.
    pub fn add_source(&mut self, source: Box<dyn ChannelSource>) {
        debug!("Adding channel source {}", source.label());
        self.sources.push(source);
    }

    /// Records every merged vector with `recorder`
    #[must_use]
    pub fn with_recorder(mut self, recorder: ChannelRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Number of configured sources, active or not
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Number of cycles that updated the scheduler
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Runs one mix cycle
    ///
    /// Collects the contribution of every active source, merges them and
    /// writes the result to the scheduler.
    ///
    /// # Errors
    ///
    /// Returns `NoSources` if no source is active. The scheduler keeps its
    /// previous channel values in that case.
    pub fn cycle(&mut self) -> Result<ChannelVector> {
        let states: Vec<ChannelVector> = self
            .sources
            .iter()
            .filter_map(|source| source.current(&self.mapper))
            .collect();

        let merged = self.mixer.mix(&states)?;
        self.output.update_channels(&merged);
        self.cycles += 1;

        if let Some(recorder) = self.recorder.as_mut() {
            if let Err(e) = recorder.record(&merged, states.len()) {
                warn!("Channel recording disabled: {}", e);
                self.recorder = None;
            }
        }

        Ok(merged)
    }

    /// Runs mix cycles every period until `shutdown` turns true or its
    /// sender is dropped
    ///
    /// # Errors
    ///
    /// Returns `Io` error if the final flush of the channel recording fails.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Starting control loop every {}ms with {} source(s)",
            self.period.as_millis(),
            self.sources.len()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            match self.cycle() {
                Ok(merged) => {
                    if self.holding {
                        info!("Input sources active again");
                        self.holding = false;
                    }
                    if self.cycles % LOG_INTERVAL_CYCLES == 0 {
                        info!("Channels: {:?}", merged);
                    }
                }
                Err(PpmBridgeError::NoSources) => {
                    if !self.holding {
                        warn!("No active input sources, holding last channel values");
                        self.holding = true;
                    }
                }
                Err(e) => warn!("Control cycle failed: {}", e),
            }
        }

        info!("Control loop stopped after {} cycles", self.cycles);

        match self.recorder.as_mut() {
            Some(recorder) => recorder.flush(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::mapper::InputSnapshot;
    use crate::controller::profile::{DeviceProfile, HandbrakeInput, WheelInput};
    use crate::ppm::engine::mocks::MockEngine;
    use crate::ppm::{PpmScheduler, PpmSettings};
    use crate::receiver::SharedReceiver;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn output() -> PpmHandle {
        PpmScheduler::new(MockEngine::new(), PpmSettings::default())
            .await
            .unwrap()
            .handle()
    }

    fn control_loop(output: PpmHandle) -> ControlLoop {
        ControlLoop::new(
            output,
            ChannelMapper::default(),
            Mixer::new(),
            Duration::from_millis(16),
        )
    }

    fn wheel_source() -> (Arc<InputSnapshot>, Box<dyn ChannelSource>) {
        let snapshot = Arc::new(InputSnapshot::new());
        let source = DeviceSource::new("wheel", DeviceProfile::Wheel, Arc::clone(&snapshot));
        (snapshot, Box::new(source))
    }

    // ==================== Cycle Tests ====================

    #[tokio::test]
    async fn test_cycle_without_sources_holds_output() {
        let output = output().await;
        output.update_channel(0, 1700);

        let mut control = control_loop(output.clone());
        assert!(matches!(control.cycle(), Err(PpmBridgeError::NoSources)));
        assert_eq!(output.widths()[0], 1700);
        assert_eq!(control.cycles(), 0);
    }

    #[tokio::test]
    async fn test_cycle_updates_scheduler() {
        let output = output().await;
        let mut control = control_loop(output.clone());
        let (snapshot, source) = wheel_source();
        control.add_source(source);

        snapshot.set(WheelInput::Steer as usize, 16383);
        let merged = control.cycle().unwrap();

        assert_eq!(merged[0], 2000);
        assert_eq!(output.widths(), merged.to_vec());
        assert_eq!(control.cycles(), 1);
    }

    #[tokio::test]
    async fn test_cycle_merges_wheel_and_handbrake() {
        let output = output().await;
        let mut control = control_loop(output.clone());

        let (wheel, source) = wheel_source();
        control.add_source(source);

        let handbrake = Arc::new(InputSnapshot::new());
        control.add_source(Box::new(DeviceSource::new(
            "handbrake",
            DeviceProfile::Handbrake,
            Arc::clone(&handbrake),
        )));
        assert_eq!(control.source_count(), 2);

        // Light throttle, full handbrake: the handbrake deviates further
        wheel.set(WheelInput::Gas as usize, 205);
        handbrake.set(HandbrakeInput::Brake as usize, 127);

        let merged = control.cycle().unwrap();
        assert_eq!(merged[1], 1000);
        assert_eq!(output.widths()[1], 1000);
    }

    #[tokio::test]
    async fn test_disconnected_receiver_is_skipped() {
        let output = output().await;
        output.update_channel(2, 1234);

        let receiver = SharedReceiver::new();
        let mut control = control_loop(output.clone());
        control.add_source(Box::new(ReceiverSource::new("sbus", Box::new(receiver.clone()))));

        assert!(matches!(control.cycle(), Err(PpmBridgeError::NoSources)));
        assert_eq!(output.widths()[2], 1234);

        receiver.publish(&[500, 500, 1000]);
        assert_eq!(control.cycle().unwrap()[2], 2000);
        assert_eq!(output.widths()[2], 2000);
    }

    #[tokio::test]
    async fn test_cycle_applies_output_inversion() {
        let output = output().await;
        let mut control = ControlLoop::new(
            output.clone(),
            ChannelMapper::default(),
            Mixer::with_reversed(&[0]),
            Duration::from_millis(16),
        );
        let (snapshot, source) = wheel_source();
        control.add_source(source);

        snapshot.set(WheelInput::Steer as usize, 0);
        assert_eq!(control.cycle().unwrap()[0], 2000);
    }

    #[tokio::test]
    async fn test_cycle_records_channels() {
        let dir = TempDir::new().unwrap();
        let recorder = ChannelRecorder::new(dir.path(), 100, 2, Duration::ZERO).unwrap();

        let output = output().await;
        let mut control = control_loop(output).with_recorder(recorder);
        let (_snapshot, source) = wheel_source();
        control.add_source(source);

        for _ in 0..3 {
            control.cycle().unwrap();
        }
        // Dropping the loop flushes the buffered records
        drop(control);

        let files = crate::telemetry::logger::recording_files(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        let contents = std::fs::read_to_string(&files[0]).unwrap();
        assert_eq!(contents.lines().count(), 3);
    }

    // ==================== Run Loop Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_run_picks_up_input_changes() {
        let output = output().await;
        let mut control = control_loop(output.clone());
        let (snapshot, source) = wheel_source();
        control.add_source(source);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(control.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(output.widths()[0], 1500);

        snapshot.set(WheelInput::Steer as usize, 0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(output.widths()[0], 1000);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_when_sender_dropped() {
        let output = output().await;
        let control = control_loop(output);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(control.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(40)).await;
        drop(shutdown_tx);

        assert!(task.await.unwrap().is_ok());
    }
}
