//! Sink policy engine: capability evaluation, power requests and
//! contract state.

use {
    crate::{
        header::{ControlMessageType, DataMessageType, Header, SpecificationRevision},
        message::Message,
        pdo::{FixedVariableRequestDataObject, PowerDataObject, PpsRequestDataObject},
        timeout::Timeout,
        Duration, Instant,
    },
    heapless::Vec,
};

/// A programmable contract reverts to 5V unless it is re-requested within
/// 10s; request every 8s to stay inside the window.
const PPS_REQUEST_INTERVAL_MS: u32 = 8_000;

/// Interface of the CC transceiver driver, as seen by the policy engine.
pub trait Driver {
    /// Resets the transceiver. Communication is stopped until
    /// [`start_sink`](Driver::start_sink) is called.
    fn init(&mut self);

    /// Starts monitoring CC1 and CC2 for attachment in the sink role.
    fn start_sink(&mut self);

    /// Stops the transceiver; no further messages are sent or received.
    fn stop(&mut self);

    /// Drives the attach state machine once. Must be called at least
    /// every 1ms while PD traffic may be occurring.
    fn poll(&mut self, now: Instant);

    /// Retrieves the oldest pending event.
    fn get_event(&mut self) -> Option<Event>;

    /// Sends a message. The message ID is stamped in by the driver.
    fn send_message(&mut self, header: Header, payload: &[u8]);

    /// Sends a message without payload.
    fn send_header_message(&mut self, message_type: ControlMessageType) {
        let header = Header::create_ctrl(message_type, SpecificationRevision::R2_0);
        self.send_message(header, &[]);
    }

    /// Current attachment state.
    fn state(&self) -> DriverState;
}

/// Driver attachment state.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverState {
    /// VBUS is present, monitoring for activity on CC1/CC2
    Usb20,
    /// Activity on CC1/CC2 has been detected, waiting for the first USB PD message
    UsbPdWait,
    /// Successful USB PD communication established
    UsbPd,
    /// Wait period after a failure
    UsbRetryWait,
}

/// Event pushed by the driver and consumed by the policy engine.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// The attachment state has changed; read it from the driver.
    StateChanged,
    /// A valid message arrived, already parsed out of the RX buffer.
    MessageReceived(Header, Message),
}

/// Power supply type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SupplyType {
    /// Fixed supply (Vmin = Vmax)
    Fixed = 0,
    /// Battery
    Battery = 1,
    /// Variable supply (non-battery)
    Variable = 2,
    /// Programmable power supply
    Pps = 3,
}

/// Power source capability
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SourceCapability {
    /// Supply type (fixed, battery, variable etc.)
    pub supply_type: SupplyType,
    /// Position within the capabilities message, 1-based; echoed verbatim
    /// in the request
    pub obj_pos: u8,
    /// Maximum current (in mA)
    pub max_current: u16,
    /// Voltage (in mV); the maximum voltage for variable and programmable
    /// supplies
    pub voltage: u16,
    /// Minimum voltage (in mV); equals `voltage` for fixed supplies
    pub min_voltage: u16,
}

/// Power delivery protocol
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Protocol {
    /// No USB PD communication (5V only)
    Usb20,
    /// USB PD communication
    UsbPd,
}

/// Notification passed to the application's event handler.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CallbackEvent {
    /// Power delivery protocol has changed
    ProtocolChanged,
    /// Source capabilities have changed (immediately request power)
    SourceCapabilitiesChanged(Vec<SourceCapability, 7>),
    /// Requested power has been accepted (but not ready yet)
    PowerAccepted,
    /// Requested power has been rejected
    PowerRejected,
    /// Requested power is now ready
    PowerReady,
}

/// Request returned by the event handler and executed by the sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Request {
    RequestPower {
        /// Desired voltage (in mV)
        voltage: u16,
        /// Maximum current (in mA), or 0 for the capability's maximum
        max_current: u16,
    },
    RequestPowerFromCapability {
        /// Index into the capability table
        index: usize,
        /// Desired voltage (in mV)
        voltage: u16,
        /// Maximum current (in mA), or 0 for the capability's maximum
        max_current: u16,
    },
}

/// Capability held by the sink to notify the application.
///
/// The handler runs inside [`Sink::poll`] and must not block. A returned
/// [`Request`] is executed by the sink right after the handler returns,
/// which gives the application a synchronous path from a notification to
/// a power request.
pub trait EventHandler {
    fn handle_event(&mut self, event: CallbackEvent) -> Option<Request>;
}

/// USB PD power sink.
///
/// Evaluates source capabilities and negotiates power contracts over a
/// [`Driver`]. [`poll`](Sink::poll) must be called at least every 1ms.
pub struct Sink<DRIVER, HANDLER> {
    driver: DRIVER,
    handler: HANDLER,

    protocol: Protocol,

    /// Parsed capabilities of the attached source
    source_caps: Vec<SourceCapability, 7>,

    /// Indicates if the source can deliver unconstrained power (e.g. a
    /// wall wart)
    is_unconstrained: bool,

    /// Indicates if the source supports extended messages
    supports_ext_message: bool,

    /// Requested voltage (in mV); non-zero only between a request and the
    /// accept/reject outcome
    requested_voltage: u16,

    /// Requested maximum current (in mA)
    requested_max_current: u16,

    /// Active voltage (in mV)
    active_voltage: u16,

    /// Active maximum current (in mA)
    active_max_current: u16,

    /// Specification revision (of the last received message)
    spec_rev: SpecificationRevision,

    /// Capability index of the active programmable contract
    selected_pps_index: Option<usize>,

    /// Keep-alive timer for the programmable contract
    pps_timer: Timeout,
}

impl<DRIVER: Driver, HANDLER: EventHandler> Sink<DRIVER, HANDLER> {
    pub fn new(driver: DRIVER, handler: HANDLER) -> Self {
        Self {
            driver,
            handler,
            protocol: Protocol::Usb20,
            source_caps: Vec::new(),
            is_unconstrained: false,
            supports_ext_message: false,
            requested_voltage: 0,
            requested_max_current: 0,
            active_voltage: 5000,
            active_max_current: 900,
            spec_rev: SpecificationRevision::R2_0,
            selected_pps_index: None,
            pps_timer: Timeout::new(),
        }
    }

    /// Initializes the sink and starts listening for USB PD messages.
    pub fn init(&mut self) {
        self.driver.init();
        self.driver.start_sink();
        self.update_protocol();
    }

    /// Polls the driver, handles its events and keeps an active
    /// programmable contract alive.
    pub fn poll(&mut self, now: Instant) {
        self.pps_timer.update(now);
        self.driver.poll(now);

        while let Some(event) = self.driver.get_event() {
            self.handle_event(event);
        }

        // Re-request the programmable contract before the source gives up
        // on it, unless a request is already in flight.
        if let Some(index) = self.selected_pps_index {
            if self.requested_voltage == 0 && self.pps_timer.is_expired() {
                debug!("PPS keep-alive");
                self.request_power_from_capability(
                    index,
                    self.active_voltage,
                    self.active_max_current,
                );
            }
        }
    }

    /// Requests the specified voltage from the source.
    ///
    /// A fixed capability covering the voltage is preferred; a
    /// programmable one is used otherwise. The source answers with
    /// `Accept` and `PS_Ready` (or `Reject`), reported through the event
    /// handler. A max current of 0 requests the capability's maximum.
    ///
    /// When a programmable capability is selected, the sink re-requests
    /// it every 8 seconds as the standard requires.
    ///
    /// Returns the object position of the selected capability, or `None`
    /// if the source offers no matching voltage.
    pub fn request_power(&mut self, voltage: u16, max_current: u16) -> Option<u8> {
        let fixed = self.source_caps.iter().position(|cap| {
            cap.supply_type == SupplyType::Fixed
                && voltage >= cap.min_voltage
                && voltage <= cap.voltage
        });

        let index = fixed.or_else(|| {
            self.source_caps.iter().position(|cap| {
                cap.supply_type == SupplyType::Pps
                    && voltage >= cap.min_voltage
                    && voltage <= cap.voltage
            })
        });

        let Some(index) = index else {
            warn!("unsupported voltage requested");
            return None;
        };

        self.request_power_from_capability(index, voltage, max_current)
    }

    /// Requests the specified voltage from the capability at `index`.
    ///
    /// Returns the capability's object position, or `None` if the index
    /// is invalid or voltage or current are out of range for it.
    pub fn request_power_from_capability(
        &mut self,
        index: usize,
        voltage: u16,
        mut max_current: u16,
    ) -> Option<u8> {
        let cap = *self.source_caps.get(index)?;

        let payload = match cap.supply_type {
            SupplyType::Fixed => {
                if voltage < cap.min_voltage || voltage > cap.voltage {
                    return None;
                }
                if max_current == 0 {
                    max_current = cap.max_current;
                }
                Self::request_payload_fixed(cap.obj_pos, max_current)
            }
            SupplyType::Pps => {
                if voltage < cap.min_voltage || voltage > cap.voltage {
                    return None;
                }
                if max_current == 0 {
                    max_current = cap.max_current;
                } else if max_current < 25 || max_current > cap.max_current {
                    return None;
                }
                Self::request_payload_pps(cap.obj_pos, voltage, max_current)
            }
            _ => return None,
        };

        let header = Header::create_data(DataMessageType::Request, 1, self.spec_rev);
        self.driver.send_message(header, &payload);

        self.requested_voltage = voltage;
        self.requested_max_current = max_current;

        if cap.supply_type == SupplyType::Pps {
            self.selected_pps_index = Some(index);
            self.pps_timer.start(Duration::millis(PPS_REQUEST_INTERVAL_MS));
        } else {
            self.selected_pps_index = None;
            self.pps_timer.cancel();
        }

        Some(cap.obj_pos)
    }

    /// Active power delivery protocol
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Capabilities of the attached source; empty until a
    /// `Source_Capabilities` message has arrived
    pub fn source_caps(&self) -> &[SourceCapability] {
        &self.source_caps
    }

    pub fn is_unconstrained(&self) -> bool {
        self.is_unconstrained
    }

    pub fn supports_ext_message(&self) -> bool {
        self.supports_ext_message
    }

    /// Requested voltage (in mV); 0 when no request is outstanding
    pub fn requested_voltage(&self) -> u16 {
        self.requested_voltage
    }

    /// Requested maximum current (in mA)
    pub fn requested_max_current(&self) -> u16 {
        self.requested_max_current
    }

    /// Voltage of the active contract (in mV)
    pub fn active_voltage(&self) -> u16 {
        self.active_voltage
    }

    /// Maximum current of the active contract (in mA)
    pub fn active_max_current(&self) -> u16 {
        self.active_max_current
    }

    /// Capability index of the active programmable contract
    pub fn selected_pps_index(&self) -> Option<usize> {
        self.selected_pps_index
    }

    pub fn driver(&mut self) -> &mut DRIVER {
        &mut self.driver
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::StateChanged => {
                if self.update_protocol() {
                    self.notify(CallbackEvent::ProtocolChanged);
                }
            }
            Event::MessageReceived(header, message) => self.handle_msg(header, message),
        }
    }

    fn handle_msg(&mut self, header: Header, message: Message) {
        self.spec_rev = header.spec_revision();

        match message {
            Message::SourceCapabilities(pdos) => self.handle_source_capabilities(&pdos),
            Message::Accept => self.notify(CallbackEvent::PowerAccepted),
            Message::Reject | Message::Wait => {
                self.requested_voltage = 0;
                self.requested_max_current = 0;
                self.selected_pps_index = None;
                self.pps_timer.cancel();
                self.notify(CallbackEvent::PowerRejected);
            }
            Message::PsReady => {
                self.active_voltage = self.requested_voltage;
                self.active_max_current = self.requested_max_current;
                self.requested_voltage = 0;
                self.requested_max_current = 0;
                self.notify(CallbackEvent::PowerReady);
            }
            // Answered by the transceiver's automatic GoodCRC only.
            _ => {}
        }
    }

    fn handle_source_capabilities(&mut self, pdos: &[PowerDataObject]) {
        self.source_caps.clear();
        self.is_unconstrained = false;
        self.supports_ext_message = false;

        for (i, pdo) in pdos.iter().enumerate() {
            let obj_pos = i as u8 + 1;

            let cap = match *pdo {
                PowerDataObject::FixedSupply(supply) => {
                    let voltage = supply.voltage() * 50;

                    // The fixed 5V capability carries additional flags.
                    if voltage == 5000 {
                        self.is_unconstrained = supply.unconstrained_power();
                        self.supports_ext_message =
                            supply.unchunked_extended_messages_supported();
                    }

                    SourceCapability {
                        supply_type: SupplyType::Fixed,
                        obj_pos,
                        max_current: supply.max_current() * 10,
                        voltage,
                        min_voltage: voltage,
                    }
                }
                PowerDataObject::Battery(battery) => SourceCapability {
                    supply_type: SupplyType::Battery,
                    obj_pos,
                    max_current: 0,
                    voltage: battery.max_voltage() * 50,
                    min_voltage: battery.min_voltage() * 50,
                },
                PowerDataObject::VariableSupply(supply) => SourceCapability {
                    supply_type: SupplyType::Variable,
                    obj_pos,
                    max_current: supply.max_current() * 10,
                    voltage: supply.max_voltage() * 50,
                    min_voltage: supply.min_voltage() * 50,
                },
                PowerDataObject::Pps(supply) => SourceCapability {
                    supply_type: SupplyType::Pps,
                    obj_pos,
                    max_current: u16::from(supply.maximum_current()) * 50,
                    voltage: u16::from(supply.max_voltage()) * 100,
                    min_voltage: u16::from(supply.min_voltage()) * 100,
                },
                PowerDataObject::Unknown(_) => continue,
            };

            let _ = self.source_caps.push(cap);
        }

        let caps = self.source_caps.clone();
        self.notify(CallbackEvent::SourceCapabilitiesChanged(caps));
    }

    fn update_protocol(&mut self) -> bool {
        let old_protocol = self.protocol;

        if self.driver.state() == DriverState::UsbPd {
            self.protocol = Protocol::UsbPd;
        } else {
            self.protocol = Protocol::Usb20;
            self.active_voltage = 5000;
            self.active_max_current = 900;
            self.source_caps.clear();
            self.selected_pps_index = None;
            self.pps_timer.cancel();
        }

        self.protocol != old_protocol
    }

    fn notify(&mut self, event: CallbackEvent) {
        if let Some(request) = self.handler.handle_event(event) {
            match request {
                Request::RequestPower {
                    voltage,
                    max_current,
                } => {
                    self.request_power(voltage, max_current);
                }
                Request::RequestPowerFromCapability {
                    index,
                    voltage,
                    max_current,
                } => {
                    self.request_power_from_capability(index, voltage, max_current);
                }
            }
        }
    }

    fn request_payload_fixed(obj_pos: u8, current: u16) -> [u8; 4] {
        let mut current = (u32::from(current) + 5) / 10;
        if current > 0x3ff {
            current = 0x3ff;
        }
        let current = current as u16;

        let mut payload = [0; 4];
        FixedVariableRequestDataObject(0)
            .with_operating_current(current)
            .with_maximum_operating_current(current)
            .with_object_position(obj_pos)
            .with_no_usb_suspend(true)
            .with_usb_communications_capable(true)
            .to_bytes(&mut payload);
        payload
    }

    fn request_payload_pps(obj_pos: u8, voltage: u16, current: u16) -> [u8; 4] {
        let mut payload = [0; 4];
        PpsRequestDataObject(0)
            .with_raw_output_voltage(voltage / 20)
            .with_raw_operating_current((current / 50) as u8)
            .with_object_position(obj_pos)
            .with_no_usb_suspend(true)
            .with_usb_communications_capable(true)
            .to_bytes(&mut payload);
        payload
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::dummy::DummyDriver,
        byteorder::{ByteOrder, LittleEndian},
        std::{cell::RefCell, rc::Rc, vec::Vec as StdVec},
    };

    /// Simplified record of the notifications seen by the handler.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Seen {
        Protocol,
        Caps(usize),
        Accepted,
        Rejected,
        Ready,
    }

    #[derive(Default)]
    struct RecordingHandler {
        seen: Rc<RefCell<StdVec<Seen>>>,
        /// Request returned on the next source-capabilities notification.
        on_caps: Option<Request>,
    }

    impl EventHandler for RecordingHandler {
        fn handle_event(&mut self, event: CallbackEvent) -> Option<Request> {
            let mut seen = self.seen.borrow_mut();
            match event {
                CallbackEvent::ProtocolChanged => seen.push(Seen::Protocol),
                CallbackEvent::SourceCapabilitiesChanged(caps) => {
                    seen.push(Seen::Caps(caps.len()));
                    return self.on_caps.take();
                }
                CallbackEvent::PowerAccepted => seen.push(Seen::Accepted),
                CallbackEvent::PowerRejected => seen.push(Seen::Rejected),
                CallbackEvent::PowerReady => seen.push(Seen::Ready),
            }
            None
        }
    }

    fn make_sink() -> (
        Sink<DummyDriver, RecordingHandler>,
        Rc<RefCell<StdVec<Seen>>>,
    ) {
        let seen = Rc::new(RefCell::new(StdVec::new()));
        let handler = RecordingHandler {
            seen: seen.clone(),
            on_caps: None,
        };
        let mut sink = Sink::new(DummyDriver::new(), handler);
        sink.init();
        (sink, seen)
    }

    fn poll_at(sink: &mut Sink<DummyDriver, RecordingHandler>, ms: u32) {
        sink.poll(Instant::from_ticks(ms));
    }

    fn inject_source_caps(sink: &mut Sink<DummyDriver, RecordingHandler>, pdos: &[u32], ms: u32) {
        inject_source_caps_rev(sink, pdos, ms, SpecificationRevision::R2_0);
    }

    fn inject_source_caps_rev(
        sink: &mut Sink<DummyDriver, RecordingHandler>,
        pdos: &[u32],
        ms: u32,
        rev: SpecificationRevision,
    ) {
        let header = Header::create_data(DataMessageType::SourceCapabilities, pdos.len() as u8, rev);
        let mut payload = [0u8; 28];
        for (i, pdo) in pdos.iter().enumerate() {
            LittleEndian::write_u32(&mut payload[i * 4..i * 4 + 4], *pdo);
        }
        sink.driver()
            .inject_message(header, &payload[..pdos.len() * 4]);
        poll_at(sink, ms);
    }

    fn inject_control(
        sink: &mut Sink<DummyDriver, RecordingHandler>,
        message_type: ControlMessageType,
        ms: u32,
    ) {
        let header = Header::create_ctrl(message_type, SpecificationRevision::R2_0);
        sink.driver().inject_message(header, &[]);
        poll_at(sink, ms);
    }

    const FIXED_5V_3A: u32 = 0x0801_912C;
    const FIXED_9V_3A: u32 = 0x0002_D12C;
    const PPS_3V3_TO_12V2: u32 = 0xC0F4_21E1;

    #[test]
    fn fixed_9v_contract() {
        let (mut sink, seen) = make_sink();

        inject_source_caps(&mut sink, &[FIXED_5V_3A, FIXED_9V_3A], 1);
        assert_eq!(seen.borrow().as_slice(), &[Seen::Protocol, Seen::Caps(2)]);

        assert_eq!(sink.request_power(9_000, 0), Some(2));
        assert_eq!(sink.requested_voltage(), 9_000);
        assert_eq!(sink.requested_max_current(), 3_000);

        let (header, payload) = sink.driver().probe_transmitted().unwrap();
        assert_eq!(
            header.message_type(),
            crate::header::MessageType::Data(DataMessageType::Request)
        );
        assert_eq!(header.num_objects(), 1);

        let rdo = FixedVariableRequestDataObject(LittleEndian::read_u32(&payload));
        assert_eq!(rdo.operating_current(), 300);
        assert_eq!(rdo.maximum_operating_current(), 300);
        assert_eq!(rdo.object_position(), 2);
        assert!(rdo.no_usb_suspend());
        assert!(rdo.usb_communications_capable());

        inject_control(&mut sink, ControlMessageType::Accept, 2);
        inject_control(&mut sink, ControlMessageType::PsRdy, 3);

        assert_eq!(sink.active_voltage(), 9_000);
        assert_eq!(sink.active_max_current(), 3_000);
        assert_eq!(sink.requested_voltage(), 0);
        assert_eq!(
            seen.borrow().as_slice(),
            &[
                Seen::Protocol,
                Seen::Caps(2),
                Seen::Accepted,
                Seen::Ready
            ]
        );
    }

    #[test]
    fn pps_contract_with_keep_alive() {
        let (mut sink, _seen) = make_sink();

        // Four fixed levels none of which covers 5V, then the
        // programmable capability at object position 5.
        let fixed_12v = 0x0003_C12C;
        let fixed_15v = 0x0004_B12C;
        let fixed_20v = 0x0006_412C;
        inject_source_caps(
            &mut sink,
            &[FIXED_9V_3A, fixed_12v, fixed_15v, fixed_20v, PPS_3V3_TO_12V2],
            1,
        );

        assert_eq!(sink.request_power(5_000, 2_000), Some(5));
        assert_eq!(sink.selected_pps_index(), Some(4));

        let (header, payload) = sink.driver().probe_transmitted().unwrap();
        assert_eq!(header.num_objects(), 1);
        let rdo = PpsRequestDataObject(LittleEndian::read_u32(&payload));
        assert_eq!(rdo.object_position(), 5);
        assert_eq!(rdo.raw_output_voltage(), 250);
        assert_eq!(rdo.raw_operating_current(), 40);

        inject_control(&mut sink, ControlMessageType::Accept, 2);
        inject_control(&mut sink, ControlMessageType::PsRdy, 3);
        assert_eq!(sink.active_voltage(), 5_000);
        assert_eq!(sink.active_max_current(), 2_000);

        // Nothing happens before the keep-alive interval has elapsed.
        poll_at(&mut sink, 7_999);
        assert!(sink.driver().probe_transmitted().is_none());

        // At the deadline the same request goes out again on its own.
        poll_at(&mut sink, 8_001);
        let (header2, payload2) = sink.driver().probe_transmitted().unwrap();
        assert_eq!(header2.message_type(), header.message_type());
        assert_eq!(payload2, payload);
        assert_eq!(sink.requested_voltage(), 5_000);
    }

    #[test]
    fn keep_alive_waits_while_request_outstanding() {
        let (mut sink, _seen) = make_sink();
        inject_source_caps(&mut sink, &[FIXED_9V_3A, PPS_3V3_TO_12V2], 1);

        assert_eq!(sink.request_power(5_000, 2_000), Some(2));
        let _ = sink.driver().probe_transmitted().unwrap();

        // No PS_Ready yet: the request is still outstanding, so the timer
        // expiry must not produce another one.
        poll_at(&mut sink, 9_000);
        assert!(sink.driver().probe_transmitted().is_none());
    }

    #[test]
    fn rejected_request() {
        let (mut sink, seen) = make_sink();
        inject_source_caps(&mut sink, &[FIXED_9V_3A, PPS_3V3_TO_12V2], 1);

        assert_eq!(sink.request_power(5_000, 2_000), Some(2));
        assert_eq!(sink.selected_pps_index(), Some(1));

        inject_control(&mut sink, ControlMessageType::Reject, 2);

        assert_eq!(sink.requested_voltage(), 0);
        assert_eq!(sink.requested_max_current(), 0);
        assert_eq!(sink.selected_pps_index(), None);
        assert!(seen.borrow().contains(&Seen::Rejected));

        // The keep-alive is gone along with the contract.
        poll_at(&mut sink, 20_000);
        assert!(sink.driver().probe_transmitted().is_none());
    }

    #[test]
    fn wait_clears_the_request_too() {
        let (mut sink, seen) = make_sink();
        inject_source_caps(&mut sink, &[FIXED_5V_3A, FIXED_9V_3A], 1);

        assert_eq!(sink.request_power(9_000, 0), Some(2));
        inject_control(&mut sink, ControlMessageType::Wait, 2);

        assert_eq!(sink.requested_voltage(), 0);
        assert!(seen.borrow().contains(&Seen::Rejected));
    }

    #[test]
    fn unsupported_voltage() {
        let (mut sink, _seen) = make_sink();
        inject_source_caps(&mut sink, &[FIXED_5V_3A, FIXED_9V_3A], 1);

        assert_eq!(sink.request_power(7_000, 0), None);
        assert!(sink.driver().probe_transmitted().is_none());
        assert_eq!(sink.requested_voltage(), 0);
    }

    #[test]
    fn pps_current_out_of_range() {
        let (mut sink, _seen) = make_sink();
        inject_source_caps(&mut sink, &[FIXED_9V_3A, PPS_3V3_TO_12V2], 1);

        // Below the 25mA floor and above the capability's maximum.
        assert_eq!(sink.request_power(5_000, 10), None);
        assert_eq!(sink.request_power(5_000, 5_000), None);
        assert!(sink.driver().probe_transmitted().is_none());
    }

    #[test]
    fn fall_back_to_usb_20_resets_the_contract() {
        let (mut sink, seen) = make_sink();

        inject_source_caps(&mut sink, &[FIXED_5V_3A, FIXED_9V_3A], 1);
        assert_eq!(sink.protocol(), Protocol::UsbPd);

        assert_eq!(sink.request_power(9_000, 0), Some(2));
        inject_control(&mut sink, ControlMessageType::Accept, 2);
        inject_control(&mut sink, ControlMessageType::PsRdy, 3);
        assert_eq!(sink.active_voltage(), 9_000);

        sink.driver().set_state(DriverState::Usb20);
        poll_at(&mut sink, 4);

        assert_eq!(sink.protocol(), Protocol::Usb20);
        assert_eq!(sink.active_voltage(), 5_000);
        assert_eq!(sink.active_max_current(), 900);
        assert!(sink.source_caps().is_empty());
        assert_eq!(sink.selected_pps_index(), None);
        assert_eq!(seen.borrow().iter().filter(|s| **s == Seen::Protocol).count(), 2);
    }

    #[test]
    fn handler_request_is_executed_synchronously() {
        let seen = Rc::new(RefCell::new(StdVec::new()));
        let handler = RecordingHandler {
            seen: seen.clone(),
            on_caps: Some(Request::RequestPower {
                voltage: 9_000,
                max_current: 0,
            }),
        };
        let mut sink = Sink::new(DummyDriver::new(), handler);
        sink.init();

        inject_source_caps(&mut sink, &[FIXED_5V_3A, FIXED_9V_3A], 1);

        // The request returned by the handler went out during poll.
        let (_, payload) = sink.driver().probe_transmitted().unwrap();
        let rdo = FixedVariableRequestDataObject(LittleEndian::read_u32(&payload));
        assert_eq!(rdo.object_position(), 2);
        assert_eq!(sink.requested_voltage(), 9_000);
    }

    #[test]
    fn spec_revision_is_latched_from_received_headers() {
        let (mut sink, _seen) = make_sink();

        inject_source_caps_rev(
            &mut sink,
            &[FIXED_5V_3A, FIXED_9V_3A],
            1,
            SpecificationRevision::R3_0,
        );

        assert_eq!(sink.request_power(9_000, 0), Some(2));
        let (header, _) = sink.driver().probe_transmitted().unwrap();
        assert_eq!(header.spec_revision(), SpecificationRevision::R3_0);
    }

    #[test]
    fn first_fixed_pdo_flags() {
        let (mut sink, _seen) = make_sink();

        // 5V PDO with unconstrained power (bit 27) and extended message
        // support (bit 24).
        let fixed_5v_flags = FIXED_5V_3A | (1 << 27) | (1 << 24);
        inject_source_caps(&mut sink, &[fixed_5v_flags, FIXED_9V_3A], 1);

        assert!(sink.is_unconstrained());
        assert!(sink.supports_ext_message());
    }

    #[test]
    fn skipped_augmented_pdo_keeps_object_positions() {
        let (mut sink, _seen) = make_sink();

        // An EPR AVS object sits at position 2; it must not shift the
        // following capability's object position.
        let avs = (0b11 << 30) | (0b01 << 28) | 0x1234;
        inject_source_caps(&mut sink, &[FIXED_5V_3A, avs, FIXED_9V_3A], 1);

        assert_eq!(sink.source_caps().len(), 2);
        assert_eq!(sink.source_caps()[1].obj_pos, 3);
        assert_eq!(sink.request_power(9_000, 0), Some(3));
    }

    #[test]
    fn current_adoption_from_capability() {
        let (mut sink, _seen) = make_sink();
        inject_source_caps(&mut sink, &[FIXED_5V_3A, FIXED_9V_3A], 1);

        // Explicit current is used as given.
        assert_eq!(sink.request_power(9_000, 1_500), Some(2));
        assert_eq!(sink.requested_max_current(), 1_500);

        let (_, payload) = sink.driver().probe_transmitted().unwrap();
        let rdo = FixedVariableRequestDataObject(LittleEndian::read_u32(&payload));
        assert_eq!(rdo.operating_current(), 150);
    }
}
