//! FUSB302B driver for a USB PD sink.
//!
//! Communicates with the transceiver over I2C, manages the attachment
//! state (suitable for a sink) and frames messages through the chip's
//! FIFO. [`poll`](pd_sink::sink::Driver::poll) must be called at least
//! every 1ms; events are buffered in a short internal queue until the
//! policy engine consumes them.

#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible to the other modules.
mod fmt;

pub mod registers;

#[cfg(test)]
mod sim;

use {
    crate::registers::{
        BusError, Control0, Control1, Control3, DeviceId, Mask1, MaskA, MaskB, Power, Register,
        Registers, Reset, Revision, Slice, Switches0, Switches1,
    },
    embedded_hal::{
        blocking::{
            delay::DelayMs,
            i2c::{Write, WriteRead},
        },
        digital::v2::InputPin,
    },
    pd_sink::{
        header::{ControlMessageType, Header, MessageType},
        message::Message,
        queue::EventQueue,
        sink::{Driver, DriverState, Event},
        timeout::Timeout,
        token::Token,
        CcPin, Duration, Instant,
    },
};

/// Depth of the RX payload ring.
const NUM_MESSAGE_BUF: usize = 4;

/// Depth of the event queue towards the policy engine.
const EVENT_QUEUE_DEPTH: usize = 6;

/// FUSB302B transceiver driver.
///
/// `I2C` is the bus the chip hangs off, `IRQ` the (active low) INT_N
/// input and `DELAY` provides the single busy wait after a chip reset.
pub struct Fusb302b<I2C, IRQ, DELAY> {
    registers: Registers<I2C>,

    /// INT_N input; low while the chip has pending interrupts
    int_n: IRQ,

    delay: DELAY,

    /// CC line currently being measured
    measuring_cc: CcPin,

    /// Driver-scoped one-shot timer
    timeout: Timeout,

    /// RX payload ring
    rx_message_buf: [[u8; 64]; NUM_MESSAGE_BUF],

    /// Next RX ring slot
    rx_message_index: usize,

    /// Events not yet consumed by the policy engine
    events: EventQueue<Event, EVENT_QUEUE_DEPTH>,

    /// Current attachment state
    state: DriverState,

    /// ID for the next transmitted message
    next_message_id: u8,
}

impl<I2C, IRQ, DELAY> Fusb302b<I2C, IRQ, DELAY>
where
    I2C: Write + WriteRead,
    IRQ: InputPin,
    DELAY: DelayMs<u8>,
{
    pub fn new(i2c: I2C, int_n: IRQ, delay: DELAY) -> Self {
        Self {
            registers: Registers::new(i2c),
            int_n,
            delay,
            measuring_cc: CcPin::CC1,
            timeout: Timeout::new(),
            rx_message_buf: [[0; 64]; NUM_MESSAGE_BUF],
            rx_message_index: 0,
            events: EventQueue::new(),
            state: DriverState::Usb20,
            next_message_id: 0,
        }
    }

    /// Reads and decodes the DEVICE_ID register.
    pub fn device_id(&mut self) -> Result<DeviceId, BusError> {
        self.registers.device_id()
    }

    /// Indicates if an event is waiting to be consumed.
    pub fn has_event(&self) -> bool {
        !self.events.is_empty()
    }

    fn is_interrupt_asserted(&self) -> bool {
        self.int_n.is_low().unwrap_or(false)
    }

    fn try_init(&mut self) -> Result<(), BusError> {
        // full reset of the chip and its PD logic
        self.registers
            .set_reset(Reset::default().with_sw_res(true).with_pd_reset(true))?;
        self.delay.delay_ms(10);

        // power up everything except the internal oscillator
        self.registers.set_power(
            Power::default()
                .with_bandgap_wake(true)
                .with_measure_block(true)
                .with_receiver(true),
        )?;

        // disable all CC monitoring
        self.registers.set_switches0(Switches0(0))?;

        // mask all interrupts, including good CRC sent
        self.registers.set_mask1(Mask1(0xff))?;
        self.registers.set_mask_a(MaskA(0xff))?;
        self.registers.set_mask_b(MaskB(0xff))?;

        self.next_message_id = 0;
        self.timeout.cancel();
        self.state = DriverState::Usb20;
        self.events.clear();
        Ok(())
    }

    fn try_start_sink(&mut self) -> Result<(), BusError> {
        // The FUSB302B could poll CC1/CC2 with its toggle engine, but the
        // interrupt line doubles as a debug pin on this board, so the
        // lines are measured manually instead.

        // BMC slicer threshold: 1.35V with 85mV hysteresis
        self.registers
            .set_slice(Slice::default().with_sdac(0x20).with_sda_hys(0b01))?;

        self.start_measurement(CcPin::CC1)
    }

    fn try_stop(&mut self) -> Result<(), BusError> {
        // release the CC lines and mask everything
        self.registers.set_switches0(Switches0(0))?;
        self.registers.set_mask1(Mask1(0xff))?;
        self.registers.set_mask_a(MaskA(0xff))?;
        self.registers.set_mask_b(MaskB(0xff))?;

        // keep only the bandgap powered
        self.registers
            .set_power(Power::default().with_bandgap_wake(true))?;

        self.timeout.cancel();
        self.state = DriverState::Usb20;
        self.events.clear();
        Ok(())
    }

    fn start_measurement(&mut self, cc: CcPin) -> Result<(), BusError> {
        let mut switches0 = Switches0::default().with_pdwn1(true).with_pdwn2(true);
        match cc {
            CcPin::CC1 => switches0.set_meas_cc1(true),
            CcPin::CC2 => switches0.set_meas_cc2(true),
        }

        // test the CC line
        self.registers.set_switches0(switches0)?;
        self.timeout.start(Duration::millis(10));
        self.measuring_cc = cc;
        Ok(())
    }

    fn check_measurement(&mut self) -> Result<(), BusError> {
        // the first read is discarded, the value may not have settled
        let _ = self.registers.status0()?;
        if self.registers.status0()?.bc_lvl() == 0 {
            // no activity, flip to the other CC line
            return self.start_measurement(!self.measuring_cc);
        }

        self.establish_usb_pd_wait(self.measuring_cc)
    }

    fn check_for_interrupts(&mut self) -> Result<(), BusError> {
        let mut may_have_message = false;

        let interrupt = self.registers.interrupt()?;
        let interrupta = self.registers.interrupta()?;
        let interruptb = self.registers.interruptb()?;

        if interrupta.i_hardrst() {
            debug!("hard reset received");
            return self.establish_retry_wait();
        }
        if interrupta.i_retryfail() {
            debug!("retry failed");
        }
        if interrupta.i_txsent() {
            trace!("TX ack");
            // turn off the internal oscillator once the TX FIFO has drained
            if self.registers.status1()?.tx_empty() {
                let power = self.registers.power()?.with_internal_oscillator(false);
                self.registers.set_power(power)?;
            }
        }
        if interrupt.i_activity() {
            may_have_message = true;
        }
        if interrupt.i_crc_chk() {
            trace!("CRC ok");
            may_have_message = true;
        }
        if interruptb.i_gcrcsent() {
            trace!("good CRC sent");
            may_have_message = true;
        }
        if may_have_message {
            self.check_for_msg()?;
        }
        Ok(())
    }

    fn check_for_msg(&mut self) -> Result<(), BusError> {
        while !self.registers.status1()?.rx_empty() {
            let mut header = 0;
            let Some(len) = self.read_message(&mut header)? else {
                // not an SOP frame; the RX FIFO has been flushed
                break;
            };

            if !self.registers.status0()?.crc_chk() {
                debug!("invalid CRC, message discarded");
            } else if Header(header).message_type()
                == MessageType::Control(ControlMessageType::GoodCRC)
            {
                trace!("good CRC packet");
            } else {
                // The first valid message proves PD communication.
                if self.state != DriverState::UsbPd {
                    self.establish_usb_pd();
                }

                let header = Header(header);
                let payload = &self.rx_message_buf[self.rx_message_index][..len];
                let message = Message::parse(header, payload);
                self.events.push(Event::MessageReceived(header, message));

                self.rx_message_index = (self.rx_message_index + 1) % NUM_MESSAGE_BUF;
            }
        }
        Ok(())
    }

    /// Reads a frame from the RX FIFO into the current ring slot.
    ///
    /// Returns the payload length, or `None` for a non-SOP frame (the
    /// FIFO is flushed in that case).
    fn read_message(&mut self, header: &mut u16) -> Result<Option<usize>, BusError> {
        // token and header
        let mut buf = [0u8; 3];
        self.registers.read_fifo(&mut buf)?;

        if (buf[0] & 0xe0) != 0xe0 {
            self.registers
                .set_control1(Control1::default().with_rx_flush(true))?;
            warn!("non-SOP token, RX FIFO flushed");
            return Ok(None);
        }

        *header = u16::from_le_bytes([buf[1], buf[2]]);

        // payload plus the trailing CRC
        let len = Header(*header).num_objects() as usize * 4;
        let slot = &mut self.rx_message_buf[self.rx_message_index];
        self.registers.read_fifo(&mut slot[..len + 4])?;

        Ok(Some(len))
    }

    fn establish_retry_wait(&mut self) -> Result<(), BusError> {
        debug!("resetting, entering retry wait");

        self.try_init()?;
        self.state = DriverState::UsbRetryWait;
        self.timeout.start(Duration::millis(500));
        self.events.push(Event::StateChanged);
        Ok(())
    }

    fn establish_usb_20(&mut self) -> Result<(), BusError> {
        self.state = DriverState::Usb20;
        self.try_start_sink()
    }

    fn establish_usb_pd_wait(&mut self, cc: CcPin) -> Result<(), BusError> {
        // enable automatic retries
        self.registers
            .set_control3(Control3::default().with_auto_retry(true).with_n_retries(3))?;

        // unmask the CC activity and CRC check interrupts
        self.registers
            .set_mask1(Mask1(0xff).with_m_activity(false).with_m_crc_chk(false))?;

        // unmask all interrupts (hard reset, tx sent etc.)
        self.registers.set_mask_a(MaskA(0))?;

        // enable the good CRC sent interrupt
        self.registers.set_mask_b(MaskB(0))?;

        // enable the pull downs and monitoring on the active CC line
        let mut switches0 = Switches0::default().with_pdwn1(true).with_pdwn2(true);
        match cc {
            CcPin::CC1 => switches0.set_meas_cc1(true),
            CcPin::CC2 => switches0.set_meas_cc2(true),
        }
        self.registers.set_switches0(switches0)?;

        // automatic GoodCRC and BMC transmission on the active CC line
        let mut switches1 = Switches1::default()
            .with_auto_crc(true)
            .with_specrev(Revision::R2_0 as u8);
        match cc {
            CcPin::CC1 => switches1.set_txcc1(true),
            CcPin::CC2 => switches1.set_txcc2(true),
        }
        self.registers.set_switches1(switches1)?;

        // let the interrupts drive INT_N
        self.registers.set_control0(Control0(0))?;

        self.state = DriverState::UsbPdWait;
        self.timeout.start(Duration::millis(300));
        Ok(())
    }

    fn establish_usb_pd(&mut self) {
        self.state = DriverState::UsbPd;
        self.timeout.cancel();
        debug!("USB PD communication established");
        self.events.push(Event::StateChanged);
    }

    fn try_poll(&mut self) -> Result<(), BusError> {
        if self.is_interrupt_asserted() {
            self.check_for_interrupts()?;
        } else if self.timeout.is_expired() {
            match self.state {
                DriverState::UsbPdWait => {
                    debug!("no PD message, giving up on this attachment");
                    self.establish_retry_wait()?;
                }
                DriverState::Usb20 => self.check_measurement()?,
                DriverState::UsbRetryWait => self.establish_usb_20()?,
                DriverState::UsbPd => {}
            }
        }
        Ok(())
    }

    fn try_send_message(&mut self, mut header: Header, payload: &[u8]) -> Result<(), BusError> {
        // transmission requires the internal oscillator
        self.registers.set_power(
            Power::default()
                .with_bandgap_wake(true)
                .with_measure_block(true)
                .with_receiver(true)
                .with_internal_oscillator(true),
        )?;

        let payload_len = header.num_objects() as usize * 4;

        header.set_message_id(self.next_message_id);

        // token stream, prefixed with the FIFO register address
        let mut buf = [0u8; 40];
        buf[0] = Register::Fifo as u8;
        buf[1] = Token::Sop1 as u8;
        buf[2] = Token::Sop1 as u8;
        buf[3] = Token::Sop1 as u8;
        buf[4] = Token::Sop2 as u8;
        buf[5] = Token::PackSym as u8 | (payload_len + 2) as u8;
        header.to_bytes(&mut buf[6..8]);
        buf[8..8 + payload_len].copy_from_slice(&payload[..payload_len]);
        let mut n = 8 + payload_len;
        buf[n] = Token::JamCrc as u8;
        n += 1;
        buf[n] = Token::Eop as u8;
        n += 1;
        buf[n] = Token::TxOff as u8;
        n += 1;
        buf[n] = Token::TxOn as u8;
        n += 1;

        // the chip appends the CRC and transmits
        self.registers.write_raw(&buf[..n])?;

        self.next_message_id = (self.next_message_id + 1) & 0x07;
        Ok(())
    }
}

impl<I2C, IRQ, DELAY> Driver for Fusb302b<I2C, IRQ, DELAY>
where
    I2C: Write + WriteRead,
    IRQ: InputPin,
    DELAY: DelayMs<u8>,
{
    fn init(&mut self) {
        if self.try_init().is_err() {
            warn!("bus error during init");
        }
    }

    fn start_sink(&mut self) {
        if self.try_start_sink().is_err() {
            warn!("bus error during sink start");
        }
    }

    fn stop(&mut self) {
        if self.try_stop().is_err() {
            warn!("bus error during stop");
        }
    }

    fn poll(&mut self, now: Instant) {
        self.timeout.update(now);

        if self.try_poll().is_err() {
            warn!("bus error during poll");
        }
    }

    fn get_event(&mut self) -> Option<Event> {
        self.events.pop()
    }

    fn send_message(&mut self, header: Header, payload: &[u8]) {
        if self.try_send_message(header, payload).is_err() {
            warn!("bus error during send");
        }
    }

    fn state(&self) -> DriverState {
        self.state
    }
}
