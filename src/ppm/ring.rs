//! # Waveform Handle Ring
//!
//! Fixed-depth round robin of waveform handles.
//!
//! The waveform engine keeps finishing the previous waveform for a short time
//! after a new one has been submitted, so a handle may only be deleted once
//! two newer waveforms exist. With a depth of [`WAVE_SLOTS`] = 3 the ring holds
//! the active waveform, the one it just replaced, and one free slot.

/// Number of waveform slots in the ring.
pub const WAVE_SLOTS: usize = 3;

/// Handle to a waveform created by the waveform engine.
pub type WaveId = u32;

/// Round robin of waveform handles.
///
/// [`acquire_next`](WaveRing::acquire_next) stores the newest handle,
/// [`retire_oldest`](WaveRing::retire_oldest) hands back the handle that is
/// two frames old and therefore safe to delete.
///
/// # Examples
///
/// ```
/// use ppm_bridge::ppm::ring::WaveRing;
///
/// let mut ring = WaveRing::new();
/// assert_eq!(ring.acquire_next(10), None);
/// assert_eq!(ring.retire_oldest(), None);
/// assert_eq!(ring.acquire_next(11), None);
/// assert_eq!(ring.retire_oldest(), None);
/// assert_eq!(ring.acquire_next(12), None);
/// assert_eq!(ring.retire_oldest(), Some(10));
/// ```
#[derive(Debug, Default)]
pub struct WaveRing {
    slots: [Option<WaveId>; WAVE_SLOTS],
    next: usize,
}

impl WaveRing {
    /// Creates an empty ring.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the newest waveform handle in the next slot.
    ///
    /// Returns a handle that still occupied the slot, which only happens when
    /// a previous [`retire_oldest`](WaveRing::retire_oldest) was skipped; the
    /// caller must delete it.
    pub fn acquire_next(&mut self, id: WaveId) -> Option<WaveId> {
        let displaced = self.slots[self.next].replace(id);
        self.next = (self.next + 1) % WAVE_SLOTS;
        displaced
    }

    /// Removes and returns the oldest handle, the one written two
    /// acquisitions ago.
    pub fn retire_oldest(&mut self) -> Option<WaveId> {
        self.slots[self.next].take()
    }

    /// Handle of the most recently acquired waveform.
    #[must_use]
    pub fn newest(&self) -> Option<WaveId> {
        self.slots[(self.next + WAVE_SLOTS - 1) % WAVE_SLOTS]
    }

    /// Number of handles currently held.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Removes every handle, oldest first.
    pub fn drain(&mut self) -> Vec<WaveId> {
        let mut ids = Vec::with_capacity(WAVE_SLOTS);
        for offset in 0..WAVE_SLOTS {
            let index = (self.next + offset) % WAVE_SLOTS;
            if let Some(id) = self.slots[index].take() {
                ids.push(id);
            }
        }
        ids
    }
}
