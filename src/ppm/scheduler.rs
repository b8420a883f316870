//! # PPM Frame Scheduler
//!
//! Owns the live channel-width array and keeps a waveform describing it
//! transmitting on the PPM pin.
//!
//! ## Frame Loop
//!
//! Once per frame period the scheduler:
//!
//! 1. Reads the live widths and builds a pulse train ([`build_frame`])
//! 2. Creates a waveform from it and transmits it on repeat
//! 3. Stores the handle in the [`WaveRing`]
//! 4. Sleeps until one frame period has passed since the previous build
//! 5. Deletes the handle from two frames ago
//!
//! Channel updates through a [`PpmHandle`] only touch the width array; the
//! next frame picks them up, so update latency is at most one frame period.
//!
//! ## States
//!
//! `Idle -> Running -> Stopped`. `Stopped` is terminal and only reached
//! through [`PpmScheduler::cancel`], which stops transmission and deletes
//! every outstanding waveform.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, info, warn};

use super::engine::WaveformEngine;
use super::frame::{
    build_frame, clamp_width, max_channels, CHANNEL_CENTER_US, FRAME_MS_MAX, FRAME_MS_MIN,
};
use super::ring::{WaveId, WaveRing};
use crate::error::Result;

/// Scheduler timing and output settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PpmSettings {
    /// GPIO pin the PPM signal is emitted on.
    pub gpio: u32,
    /// Frame period in milliseconds.
    pub frame_ms: u32,
    /// Number of channels in each frame.
    pub channels: usize,
}

impl Default for PpmSettings {
    fn default() -> Self {
        Self {
            gpio: 8,
            frame_ms: 20,
            channels: 8,
        }
    }
}

impl PpmSettings {
    /// Clamps the frame period to 5-100ms and the channel count to what
    /// fits in one frame.
    ///
    /// # Examples
    ///
    /// ```
    /// use ppm_bridge::ppm::scheduler::PpmSettings;
    ///
    /// let settings = PpmSettings { gpio: 8, frame_ms: 2, channels: 8 }.normalized();
    /// assert_eq!(settings.frame_ms, 5);
    /// assert_eq!(settings.channels, 2);
    /// ```
    #[must_use]
    pub fn normalized(self) -> Self {
        let frame_ms = self.frame_ms.clamp(FRAME_MS_MIN, FRAME_MS_MAX);
        let channels = self.channels.clamp(1, max_channels(frame_ms));
        Self {
            gpio: self.gpio,
            frame_ms,
            channels,
        }
    }

    /// Frame period in microseconds.
    #[must_use]
    pub fn frame_us(&self) -> u32 {
        self.frame_ms * 1000
    }
}

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Constructed, no frame transmitted yet.
    Idle,
    /// Transmitting frames.
    Running,
    /// Transmission stopped and all waveforms deleted.
    Stopped,
}

/// Live channel widths shared between the scheduler and its handles.
#[derive(Debug)]
struct ChannelWidths {
    widths: Box<[AtomicU16]>,
}

impl ChannelWidths {
    fn new(channels: usize) -> Self {
        Self {
            widths: (0..channels)
                .map(|_| AtomicU16::new(CHANNEL_CENTER_US))
                .collect(),
        }
    }

    fn snapshot(&self) -> Vec<u16> {
        self.widths
            .iter()
            .map(|w| w.load(Ordering::Relaxed))
            .collect()
    }
}

/// Cloneable writer for the scheduler's live channel widths.
///
/// # Examples
///
/// ```
/// # tokio_test::block_on(async {
/// use ppm_bridge::ppm::scheduler::{PpmScheduler, PpmSettings};
/// # use ppm_bridge::ppm::engine::WaveformEngine;
/// # use ppm_bridge::ppm::frame::Pulse;
/// # struct Null;
/// # #[async_trait::async_trait]
/// # impl WaveformEngine for Null {
/// #     async fn set_pin_low(&mut self, _: u32) -> ppm_bridge::error::Result<()> { Ok(()) }
/// #     async fn stop_all_transmission(&mut self) -> ppm_bridge::error::Result<()> { Ok(()) }
/// #     async fn create_waveform(&mut self, _: &[Pulse]) -> ppm_bridge::error::Result<u32> {
/// #         Ok(0)
/// #     }
/// #     async fn transmit_repeating(&mut self, _: u32) -> ppm_bridge::error::Result<()> { Ok(()) }
/// #     async fn delete_waveform(&mut self, _: u32) -> ppm_bridge::error::Result<()> { Ok(()) }
/// # }
/// let scheduler = PpmScheduler::new(Null, PpmSettings::default()).await?;
/// let handle = scheduler.handle();
///
/// handle.update_channel(0, 1800);
/// handle.update_channel(1, 2500); // clamped
/// assert_eq!(&handle.widths()[..2], &[1800, 2000]);
/// # Ok::<(), ppm_bridge::error::PpmBridgeError>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct PpmHandle {
    widths: Arc<ChannelWidths>,
}

impl PpmHandle {
    /// Number of channels in each frame.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.widths.widths.len()
    }

    /// Sets one channel width, clamped to 1000-2000us.
    ///
    /// Out-of-range channel indices are ignored.
    pub fn update_channel(&self, channel: usize, width: u16) {
        if let Some(cell) = self.widths.widths.get(channel) {
            cell.store(clamp_width(width), Ordering::Relaxed);
        }
    }

    /// Sets the leading channel widths from a slice.
    ///
    /// Extra values beyond the channel count are dropped; channels beyond the
    /// slice keep their current width.
    pub fn update_channels(&self, widths: &[u16]) {
        for (cell, &width) in self.widths.widths.iter().zip(widths) {
            cell.store(clamp_width(width), Ordering::Relaxed);
        }
    }

    /// Current channel widths.
    #[must_use]
    pub fn widths(&self) -> Vec<u16> {
        self.widths.snapshot()
    }
}

/// PPM frame scheduler driving a [`WaveformEngine`].
pub struct PpmScheduler<E: WaveformEngine> {
    engine: E,
    settings: PpmSettings,
    widths: Arc<ChannelWidths>,
    ring: WaveRing,
    /// Retired handles whose deletion failed, retried every frame
    undeleted: Vec<WaveId>,
    state: SchedulerState,
    frames_sent: u64,
}

impl<E: WaveformEngine> std::fmt::Debug for PpmScheduler<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PpmScheduler")
            .field("settings", &self.settings)
            .field("state", &self.state)
            .field("ring", &self.ring)
            .field("undeleted", &self.undeleted)
            .finish_non_exhaustive()
    }
}

impl<E: WaveformEngine> PpmScheduler<E> {
    /// Creates a scheduler, halts any waveform left transmitting by an
    /// earlier process and drives the PPM pin low.
    ///
    /// Settings are normalized with [`PpmSettings::normalized`]. All channels
    /// start at the neutral 1500us.
    ///
    /// # Errors
    ///
    /// Returns the engine error if transmission cannot be halted or the pin
    /// cannot be driven, which means the waveform engine is unreachable.
    pub async fn new(mut engine: E, settings: PpmSettings) -> Result<Self> {
        let settings = settings.normalized();
        engine.stop_all_transmission().await?;
        engine.set_pin_low(settings.gpio).await?;

        info!(
            "PPM scheduler ready on GPIO {} ({} channels, {}ms frame)",
            settings.gpio, settings.channels, settings.frame_ms
        );

        Ok(Self {
            engine,
            settings,
            widths: Arc::new(ChannelWidths::new(settings.channels)),
            ring: WaveRing::new(),
            undeleted: Vec::new(),
            state: SchedulerState::Idle,
            frames_sent: 0,
        })
    }

    /// Returns a handle for updating channel widths.
    #[must_use]
    pub fn handle(&self) -> PpmHandle {
        PpmHandle {
            widths: Arc::clone(&self.widths),
        }
    }

    /// Effective settings after normalization.
    #[must_use]
    pub fn settings(&self) -> PpmSettings {
        self.settings
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Number of frames transmitted.
    #[must_use]
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Builds a waveform from the live widths and starts transmitting it.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the waveform cannot be created or
    /// transmitted. A waveform that was created but not transmitted is
    /// deleted before returning, or kept for a later retry if that fails.
    pub async fn transmit_frame(&mut self) -> Result<WaveId> {
        let widths = self.widths.snapshot();
        let pulses = build_frame(&widths, self.settings.gpio, self.settings.frame_us());

        let id = self.engine.create_waveform(&pulses).await?;
        if let Err(e) = self.engine.transmit_repeating(id).await {
            if let Err(delete_err) = self.engine.delete_waveform(id).await {
                debug!("Failed to delete untransmitted waveform {}: {}", id, delete_err);
                self.undeleted.push(id);
            }
            return Err(e);
        }

        if self.state == SchedulerState::Idle {
            self.state = SchedulerState::Running;
        }

        if let Some(stale) = self.ring.acquire_next(id) {
            if let Err(e) = self.engine.delete_waveform(stale).await {
                warn!("Failed to delete waveform {}: {}", stale, e);
                self.undeleted.push(stale);
            }
        }

        self.frames_sent += 1;
        debug!("Transmitting waveform {} with widths {:?}", id, widths);
        Ok(id)
    }

    /// Deletes the waveform from two frames ago, if any, and retries
    /// earlier deletions that failed.
    ///
    /// Handles that still cannot be deleted are kept for the next call and
    /// for [`cancel`](Self::cancel).
    ///
    /// # Errors
    ///
    /// Returns the first engine error encountered.
    pub async fn retire_oldest(&mut self) -> Result<()> {
        let mut retiring = std::mem::take(&mut self.undeleted);
        retiring.extend(self.ring.retire_oldest());

        let mut first_error = None;
        for id in retiring {
            if let Err(e) = self.engine.delete_waveform(id).await {
                self.undeleted.push(id);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Retired handles still waiting to be deleted.
    #[must_use]
    pub fn undeleted(&self) -> &[WaveId] {
        &self.undeleted
    }

    /// Runs the frame loop until `shutdown` turns true or its sender is
    /// dropped, then cancels the scheduler.
    ///
    /// Per-frame engine failures are logged and the loop keeps its cadence;
    /// the engine keeps repeating the last good waveform meanwhile.
    ///
    /// # Errors
    ///
    /// Returns the error from [`cancel`](Self::cancel).
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let period = Duration::from_micros(u64::from(self.settings.frame_us()));
        let mut frame_start = Instant::now();

        info!("Starting PPM frame loop at {}ms", self.settings.frame_ms);

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.transmit_frame().await {
                warn!("Failed to transmit PPM frame: {}", e);
            }

            tokio::select! {
                _ = sleep_until(frame_start + period) => {}
                _ = shutdown.changed() => break,
            }
            frame_start = Instant::now();

            if let Err(e) = self.retire_oldest().await {
                warn!("Failed to delete old waveform: {}", e);
            }
        }

        info!("Stopping PPM frame loop after {} frames", self.frames_sent);
        self.cancel().await
    }

    /// Stops transmission and deletes every outstanding waveform.
    ///
    /// All waveforms are attempted even if some deletions fail.
    ///
    /// # Errors
    ///
    /// Returns the first engine error encountered.
    pub async fn cancel(&mut self) -> Result<()> {
        self.state = SchedulerState::Stopped;

        let mut first_error = self.engine.stop_all_transmission().await.err();

        let mut outstanding = std::mem::take(&mut self.undeleted);
        outstanding.extend(self.ring.drain());

        for id in outstanding {
            if let Err(e) = self.engine.delete_waveform(id).await {
                warn!("Failed to delete waveform {}: {}", id, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ppm::engine::mocks::{EngineCall, MockEngine};
    use crate::ppm::frame::{frame_duration, Pulse, GAP_US};

    async fn scheduler(engine: &MockEngine) -> PpmScheduler<MockEngine> {
        PpmScheduler::new(engine.clone(), PpmSettings::default())
            .await
            .unwrap()
    }

    fn stop_count(engine: &MockEngine) -> usize {
        engine
            .get_calls()
            .iter()
            .filter(|call| **call == EngineCall::StopAll)
            .count()
    }

    fn created_pulses(engine: &MockEngine) -> Vec<Vec<Pulse>> {
        engine
            .get_calls()
            .into_iter()
            .filter_map(|call| match call {
                EngineCall::Create(_, pulses) => Some(pulses),
                _ => None,
            })
            .collect()
    }

    // ==================== Settings Tests ====================

    #[test]
    fn test_default_settings() {
        let settings = PpmSettings::default();
        assert_eq!(settings.gpio, 8);
        assert_eq!(settings.frame_ms, 20);
        assert_eq!(settings.channels, 8);
        assert_eq!(settings.frame_us(), 20_000);
    }

    #[test]
    fn test_settings_clamp_frame_period() {
        let low = PpmSettings { gpio: 8, frame_ms: 1, channels: 8 }.normalized();
        assert_eq!(low.frame_ms, 5);

        let high = PpmSettings { gpio: 8, frame_ms: 500, channels: 8 }.normalized();
        assert_eq!(high.frame_ms, 100);
        assert_eq!(high.channels, 8);
    }

    #[test]
    fn test_settings_cap_channels() {
        let settings = PpmSettings { gpio: 8, frame_ms: 10, channels: 8 }.normalized();
        assert_eq!(settings.channels, 4);

        let settings = PpmSettings { gpio: 8, frame_ms: 20, channels: 0 }.normalized();
        assert_eq!(settings.channels, 1);
    }

    // ==================== Construction Tests ====================

    #[tokio::test]
    async fn test_new_halts_leftovers_and_drives_pin_low() {
        let engine = MockEngine::new();
        let scheduler = scheduler(&engine).await;

        assert_eq!(
            engine.get_calls(),
            vec![EngineCall::StopAll, EngineCall::SetPinLow(8)]
        );
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.handle().widths(), vec![CHANNEL_CENTER_US; 8]);
    }

    #[tokio::test]
    async fn test_new_fails_when_engine_unreachable() {
        let engine = MockEngine::new();
        engine.set_unreachable();

        let result = PpmScheduler::new(engine, PpmSettings::default()).await;
        assert!(result.is_err());
    }

    // ==================== Channel Update Tests ====================

    #[tokio::test]
    async fn test_update_channels_clamps_and_truncates() {
        let engine = MockEngine::new();
        let scheduler = scheduler(&engine).await;
        let handle = scheduler.handle();

        handle.update_channels(&[900, 2100, 1700, 1300, 1500, 1500, 1500, 1500, 1999, 1999]);
        assert_eq!(
            handle.widths(),
            vec![1000, 2000, 1700, 1300, 1500, 1500, 1500, 1500]
        );
    }

    #[tokio::test]
    async fn test_update_channels_partial_slice() {
        let engine = MockEngine::new();
        let scheduler = scheduler(&engine).await;
        let handle = scheduler.handle();

        handle.update_channels(&[1100, 1900]);
        assert_eq!(&handle.widths()[..3], &[1100, 1900, CHANNEL_CENTER_US]);
    }

    #[tokio::test]
    async fn test_update_channel_ignores_out_of_range_index() {
        let engine = MockEngine::new();
        let scheduler = scheduler(&engine).await;
        let handle = scheduler.handle();

        handle.update_channel(42, 1000);
        assert_eq!(handle.widths(), vec![CHANNEL_CENTER_US; 8]);
        assert_eq!(handle.channel_count(), 8);
    }

    #[tokio::test]
    async fn test_update_does_not_transmit() {
        let engine = MockEngine::new();
        let scheduler = scheduler(&engine).await;

        scheduler.handle().update_channel(0, 1800);
        assert!(engine.created().is_empty());
    }

    // ==================== Frame Tests ====================

    #[tokio::test]
    async fn test_transmit_frame_uses_live_widths() {
        let engine = MockEngine::new();
        let mut scheduler = scheduler(&engine).await;
        scheduler.handle().update_channel(0, 1800);

        let id = scheduler.transmit_frame().await.unwrap();

        let pulses = &created_pulses(&engine)[0];
        assert_eq!(pulses.len(), 18);
        assert_eq!(pulses[1].duration_us, 1800 - GAP_US);
        assert_eq!(frame_duration(pulses), 20_000);
        assert!(engine.get_calls().contains(&EngineCall::Transmit(id)));
        assert_eq!(scheduler.state(), SchedulerState::Running);
        assert_eq!(scheduler.frames_sent(), 1);
    }

    #[tokio::test]
    async fn test_transmit_frame_error_keeps_idle() {
        let engine = MockEngine::new();
        let mut scheduler = scheduler(&engine).await;
        engine.set_fail_create(true);

        assert!(scheduler.transmit_frame().await.is_err());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.frames_sent(), 0);
    }

    #[tokio::test]
    async fn test_buffer_rotation() {
        let engine = MockEngine::new();
        let mut scheduler = scheduler(&engine).await;

        let frame1 = scheduler.transmit_frame().await.unwrap();
        scheduler.retire_oldest().await.unwrap();
        let _frame2 = scheduler.transmit_frame().await.unwrap();
        scheduler.retire_oldest().await.unwrap();
        let _frame3 = scheduler.transmit_frame().await.unwrap();

        // Frame 1 is still in flight until frame 3 has been built
        assert!(engine.deleted().is_empty());

        scheduler.retire_oldest().await.unwrap();
        assert_eq!(engine.deleted(), vec![frame1]);

        // Deleted before frame 4 is created
        let frame4 = scheduler.transmit_frame().await.unwrap();
        let calls = engine.get_calls();
        let delete_pos = calls
            .iter()
            .position(|c| *c == EngineCall::Delete(frame1))
            .unwrap();
        let create4_pos = calls
            .iter()
            .position(|c| matches!(c, EngineCall::Create(id, _) if *id == frame4))
            .unwrap();
        assert!(delete_pos < create4_pos);
    }

    // ==================== Shutdown Tests ====================

    #[tokio::test]
    async fn test_cancel_stops_and_deletes_everything() {
        let engine = MockEngine::new();
        let mut scheduler = scheduler(&engine).await;

        for _ in 0..5 {
            scheduler.transmit_frame().await.unwrap();
            scheduler.retire_oldest().await.unwrap();
        }
        scheduler.transmit_frame().await.unwrap();

        scheduler.cancel().await.unwrap();

        let mut created = engine.created();
        let mut deleted = engine.deleted();
        created.sort_unstable();
        deleted.sort_unstable();
        assert_eq!(created, deleted);
        assert_eq!(stop_count(&engine), 2);
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    #[tokio::test]
    async fn test_failed_retire_is_retried() {
        let engine = MockEngine::new();
        let mut scheduler = scheduler(&engine).await;

        let frame1 = scheduler.transmit_frame().await.unwrap();
        scheduler.transmit_frame().await.unwrap();
        scheduler.transmit_frame().await.unwrap();

        engine.set_fail_delete(true);
        assert!(scheduler.retire_oldest().await.is_err());
        assert_eq!(scheduler.undeleted(), &[frame1]);

        engine.set_fail_delete(false);
        scheduler.transmit_frame().await.unwrap();
        scheduler.retire_oldest().await.unwrap();

        assert_eq!(engine.deleted(), vec![frame1, frame1 + 1]);
        assert!(scheduler.undeleted().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_deletes_handles_whose_retire_failed() {
        let engine = MockEngine::new();
        let mut scheduler = scheduler(&engine).await;

        engine.set_fail_delete(true);
        for _ in 0..5 {
            scheduler.transmit_frame().await.unwrap();
            let _ = scheduler.retire_oldest().await;
        }
        assert_eq!(scheduler.undeleted().len(), 3);
        assert!(engine.deleted().is_empty());

        engine.set_fail_delete(false);
        scheduler.cancel().await.unwrap();

        let mut deleted = engine.deleted();
        deleted.sort_unstable();
        assert_eq!(deleted, engine.created());
        assert!(scheduler.undeleted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_keeps_frame_cadence_and_cleans_up() {
        let engine = MockEngine::new();
        let scheduler = scheduler(&engine).await;
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(scheduler.run(rx));

        tokio::time::sleep(Duration::from_millis(70)).await;
        tx.send(true).unwrap();
        task.await.unwrap().unwrap();

        let created = engine.created();
        assert!(created.len() >= 3, "expected at least 3 frames, got {}", created.len());

        // A waveform is only deleted once two newer ones exist
        let calls = engine.get_calls();
        let stop_pos = calls.iter().rposition(|c| *c == EngineCall::StopAll).unwrap();
        for (pos, call) in calls.iter().enumerate().take(stop_pos) {
            if let EngineCall::Delete(id) = call {
                let newer_created = calls[..pos]
                    .iter()
                    .filter(|c| matches!(c, EngineCall::Create(other, _) if *other > *id))
                    .count();
                assert!(newer_created >= 2, "waveform {} deleted too early", id);
            }
        }

        // Everything created is gone after shutdown
        let mut deleted = engine.deleted();
        deleted.sort_unstable();
        assert_eq!(created, deleted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_when_sender_dropped() {
        let engine = MockEngine::new();
        let scheduler = scheduler(&engine).await;
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(scheduler.run(rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(tx);

        task.await.unwrap().unwrap();
        assert_eq!(stop_count(&engine), 2);
    }
}
