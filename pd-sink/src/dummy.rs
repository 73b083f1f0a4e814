//! Scripted driver for exercising the policy engine in tests.

use {
    crate::{
        header::Header,
        message::Message,
        queue::EventQueue,
        sink::{Driver, DriverState, Event},
        Instant,
    },
    std::vec::Vec,
};

pub struct DummyDriver {
    state: DriverState,
    events: EventQueue<Event, 6>,
    sent: Vec<(Header, Vec<u8>)>,
}

impl DummyDriver {
    pub fn new() -> Self {
        Self {
            state: DriverState::Usb20,
            events: EventQueue::new(),
            sent: Vec::new(),
        }
    }

    /// Queues a received message the way the real driver would: the
    /// first valid message promotes the state to UsbPd, and the state
    /// change is observed before the message.
    pub fn inject_message(&mut self, header: Header, payload: &[u8]) {
        if self.state != DriverState::UsbPd {
            self.state = DriverState::UsbPd;
            self.events.push(Event::StateChanged);
        }
        let message = Message::parse(header, payload);
        self.events.push(Event::MessageReceived(header, message));
    }

    /// Moves the driver to `state` and queues the state-change event.
    pub fn set_state(&mut self, state: DriverState) {
        self.state = state;
        self.events.push(Event::StateChanged);
    }

    /// Oldest transmitted message, if any.
    pub fn probe_transmitted(&mut self) -> Option<(Header, Vec<u8>)> {
        if self.sent.is_empty() {
            None
        } else {
            Some(self.sent.remove(0))
        }
    }
}

impl Driver for DummyDriver {
    fn init(&mut self) {
        self.state = DriverState::Usb20;
        self.events.clear();
    }

    fn start_sink(&mut self) {}

    fn stop(&mut self) {
        self.state = DriverState::Usb20;
        self.events.clear();
    }

    fn poll(&mut self, _now: Instant) {}

    fn get_event(&mut self) -> Option<Event> {
        self.events.pop()
    }

    fn send_message(&mut self, header: Header, payload: &[u8]) {
        self.sent.push((header, payload.to_vec()));
    }

    fn state(&self) -> DriverState {
        self.state
    }
}
