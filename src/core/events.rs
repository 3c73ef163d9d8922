//! Events delivered to the emulator by the host message bus

use std::sync::mpsc::{self, Receiver, Sender};

/// Inbound device event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Set one configuration field, bypassing the line protocol
    SetParameter { key: String, value: String },
    /// Configuration was changed elsewhere
    ConfigChange,
    /// Send an adapter command; `AT` is added when framing
    InjectCommand(String),
}

/// Sending half handed to event producers
pub type EventSender = Sender<DeviceEvent>;

/// Receiving half polled by the run loop
pub struct EventBus {
    rx: Receiver<DeviceEvent>,
}

impl EventBus {
    /// Create a connected sender/bus pair
    pub fn channel() -> (EventSender, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self { rx })
    }

    /// Drain every pending event without blocking
    pub fn drain(&mut self) -> Vec<DeviceEvent> {
        self.rx.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_in_order() {
        let (tx, mut bus) = EventBus::channel();
        tx.send(DeviceEvent::ConfigChange).unwrap();
        tx.send(DeviceEvent::InjectCommand("Z".into())).unwrap();

        assert_eq!(
            bus.drain(),
            vec![DeviceEvent::ConfigChange, DeviceEvent::InjectCommand("Z".into())]
        );
        assert!(bus.drain().is_empty());
    }

    #[test]
    fn test_drain_after_senders_dropped() {
        let (tx, mut bus) = EventBus::channel();
        tx.send(DeviceEvent::ConfigChange).unwrap();
        drop(tx);

        assert_eq!(bus.drain(), vec![DeviceEvent::ConfigChange]);
        assert!(bus.drain().is_empty());
    }
}
