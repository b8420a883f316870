//! Channel sources consulted by the control loop.

use std::sync::Arc;

use crate::controller::channel_mapper::{ChannelMapper, ChannelVector};
use crate::controller::mapper::InputSnapshot;
use crate::controller::profile::DeviceProfile;
use crate::receiver::SerialReceiver;

/// Something that contributes a channel vector each mix cycle.
pub trait ChannelSource: Send {
    /// Name used in log messages.
    fn label(&self) -> &str;

    /// Current contribution, or `None` while the source is inactive.
    fn current(&self, mapper: &ChannelMapper) -> Option<ChannelVector>;
}

/// Input device source reading the snapshot its reader thread maintains.
#[derive(Debug, Clone)]
pub struct DeviceSource {
    label: String,
    profile: DeviceProfile,
    snapshot: Arc<InputSnapshot>,
}

impl DeviceSource {
    /// Creates a device source.
    #[must_use]
    pub fn new(
        label: impl Into<String>,
        profile: DeviceProfile,
        snapshot: Arc<InputSnapshot>,
    ) -> Self {
        Self {
            label: label.into(),
            profile,
            snapshot,
        }
    }
}

impl ChannelSource for DeviceSource {
    fn label(&self) -> &str {
        &self.label
    }

    /// Devices always contribute; unset bindings sit at rest.
    fn current(&self, mapper: &ChannelMapper) -> Option<ChannelVector> {
        Some(mapper.map_device(self.profile, &self.snapshot))
    }
}

/// Serial receiver source, active only while the receiver is connected.
pub struct ReceiverSource {
    label: String,
    receiver: Box<dyn SerialReceiver>,
}

impl std::fmt::Debug for ReceiverSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiverSource")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl ReceiverSource {
    /// Creates a receiver source.
    #[must_use]
    pub fn new(label: impl Into<String>, receiver: Box<dyn SerialReceiver>) -> Self {
        Self {
            label: label.into(),
            receiver,
        }
    }
}

impl ChannelSource for ReceiverSource {
    fn label(&self) -> &str {
        &self.label
    }

    fn current(&self, mapper: &ChannelMapper) -> Option<ChannelVector> {
        if !self.receiver.is_connected() {
            return None;
        }
        Some(mapper.map_receiver(&self.receiver.latest_channels()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::channel_mapper::NEUTRAL_CHANNELS;
    use crate::controller::profile::WheelInput;
    use crate::receiver::{MockSerialReceiver, SharedReceiver};

    #[test]
    fn test_device_source_follows_snapshot() {
        let snapshot = Arc::new(InputSnapshot::new());
        let source = DeviceSource::new("wheel", DeviceProfile::Wheel, Arc::clone(&snapshot));
        let mapper = ChannelMapper::default();

        assert_eq!(source.label(), "wheel");
        assert_eq!(source.current(&mapper), Some(NEUTRAL_CHANNELS));

        snapshot.set(WheelInput::Steer as usize, 0);
        assert_eq!(source.current(&mapper).unwrap()[0], 1000);
    }

    #[test]
    fn test_receiver_source_inactive_when_disconnected() {
        let mut mock = MockSerialReceiver::new();
        mock.expect_is_connected().return_const(false);
        mock.expect_latest_channels().never();

        let source = ReceiverSource::new("sbus", Box::new(mock));
        assert_eq!(source.current(&ChannelMapper::default()), None);
    }

    #[test]
    fn test_receiver_source_maps_values() {
        let mut mock = MockSerialReceiver::new();
        mock.expect_is_connected().return_const(true);
        mock.expect_latest_channels()
            .times(1)
            .returning(|| vec![1000, 0]);

        let source = ReceiverSource::new("sbus", Box::new(mock));
        let channels = source.current(&ChannelMapper::default()).unwrap();
        assert_eq!(channels, [2000, 1000, 1500, 1500, 1500, 1500, 1500, 1500]);
    }

    #[test]
    fn test_receiver_source_with_shared_receiver() {
        let receiver = SharedReceiver::new();
        let source = ReceiverSource::new("sbus", Box::new(receiver.clone()));
        let mapper = ChannelMapper::default();

        assert_eq!(source.current(&mapper), None);

        receiver.publish(&[500, 750]);
        assert_eq!(source.current(&mapper).unwrap()[1], 1750);

        receiver.disconnect();
        assert_eq!(source.current(&mapper), None);
    }
}
