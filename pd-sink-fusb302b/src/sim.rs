//! Register-level FUSB302B model backing the driver tests.
//!
//! The I2C bus, the INT_N pin and the delay provider all share one
//! [`ChipModel`] through `Rc`, so tests can script interrupts and FIFO
//! frames and inspect everything the driver wrote.

use {
    embedded_hal::{
        blocking::{
            delay::DelayMs,
            i2c::{Write, WriteRead},
        },
        digital::v2::InputPin,
    },
    std::{cell::RefCell, collections::VecDeque, rc::Rc},
};

const I2C_ADDRESS: u8 = 0b0100010;

const REG_CONTROL1: usize = 0x07;
const REG_RESET: usize = 0x0C;
const REG_INTERRUPTA: usize = 0x3E;
const REG_INTERRUPTB: usize = 0x3F;
const REG_STATUS0: usize = 0x40;
const REG_STATUS1: usize = 0x41;
const REG_INTERRUPT: usize = 0x42;
const REG_FIFO: u8 = 0x43;

pub struct ChipModel {
    pub regs: [u8; 0x44],
    pub rx_fifo: VecDeque<u8>,
    /// Bursts written to the TX FIFO, register address stripped.
    pub tx_writes: Vec<Vec<u8>>,
}

impl ChipModel {
    pub fn new() -> Self {
        Self {
            regs: [0; 0x44],
            rx_fifo: VecDeque::new(),
            tx_writes: Vec::new(),
        }
    }

    /// INT_N is asserted while any interrupt flag is pending.
    pub fn interrupt_pending(&self) -> bool {
        self.regs[REG_INTERRUPT] != 0
            || self.regs[REG_INTERRUPTA] != 0
            || self.regs[REG_INTERRUPTB] != 0
    }

    /// Sets the measured voltage band on the active CC line.
    pub fn set_bc_lvl(&mut self, level: u8) {
        self.regs[REG_STATUS0] = (self.regs[REG_STATUS0] & !0x03) | (level & 0x03);
    }

    pub fn inject_hard_reset(&mut self) {
        self.regs[REG_INTERRUPTA] |= 0x01;
    }

    pub fn inject_tx_sent(&mut self) {
        self.regs[REG_INTERRUPTA] |= 0x04;
    }

    /// Queues a received frame and raises the CRC-check interrupt.
    pub fn inject_frame(&mut self, token: u8, header: u16, payload: &[u8], crc_ok: bool) {
        self.rx_fifo.push_back(token);
        self.rx_fifo.extend(header.to_le_bytes());
        self.rx_fifo.extend(payload.iter().copied());
        // CRC bytes; the driver discards them.
        self.rx_fifo.extend([0u8; 4]);

        if crc_ok {
            self.regs[REG_STATUS0] |= 0x10;
        } else {
            self.regs[REG_STATUS0] &= !0x10;
        }
        self.regs[REG_INTERRUPT] |= 0x10;
    }

    fn write(&mut self, bytes: &[u8]) {
        let reg = bytes[0];
        if reg == REG_FIFO {
            self.tx_writes.push(bytes[1..].to_vec());
            return;
        }
        for (i, value) in bytes[1..].iter().enumerate() {
            self.write_register(reg + i as u8, *value);
        }
    }

    fn write_register(&mut self, reg: u8, value: u8) {
        match reg as usize {
            REG_CONTROL1 => {
                // RX_FLUSH empties the receive FIFO and self-clears.
                if value & 0x04 != 0 {
                    self.rx_fifo.clear();
                }
                self.regs[REG_CONTROL1] = value & !0x04;
            }
            REG_RESET => {
                // Self-clearing; pending interrupts do not survive it.
                self.regs[REG_INTERRUPT] = 0;
                self.regs[REG_INTERRUPTA] = 0;
                self.regs[REG_INTERRUPTB] = 0;
            }
            other => self.regs[other] = value,
        }
    }

    fn read_register(&mut self, reg: u8) -> u8 {
        match reg as usize {
            // Interrupt registers clear on read.
            REG_INTERRUPT | REG_INTERRUPTA | REG_INTERRUPTB => {
                let value = self.regs[reg as usize];
                self.regs[reg as usize] = 0;
                value
            }
            REG_STATUS1 => {
                let mut value = self.regs[REG_STATUS1] & !0x20;
                if self.rx_fifo.is_empty() {
                    value |= 0x20; // RX_EMPTY
                }
                value | 0x08 // the TX FIFO drains instantly
            }
            other => self.regs[other],
        }
    }
}

#[derive(Clone)]
pub struct SimBus(pub Rc<RefCell<ChipModel>>);

impl Write for SimBus {
    type Error = ();

    fn write(&mut self, addr: u8, bytes: &[u8]) -> Result<(), ()> {
        assert_eq!(addr, I2C_ADDRESS);
        self.0.borrow_mut().write(bytes);
        Ok(())
    }
}

impl WriteRead for SimBus {
    type Error = ();

    fn write_read(&mut self, addr: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<(), ()> {
        assert_eq!(addr, I2C_ADDRESS);
        let mut chip = self.0.borrow_mut();
        let reg = bytes[0];
        if reg == REG_FIFO {
            for byte in buffer.iter_mut() {
                *byte = chip.rx_fifo.pop_front().unwrap_or(0);
            }
        } else {
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = chip.read_register(reg + i as u8);
            }
        }
        Ok(())
    }
}

pub struct SimPin(pub Rc<RefCell<ChipModel>>);

impl InputPin for SimPin {
    type Error = core::convert::Infallible;

    fn is_high(&self) -> Result<bool, Self::Error> {
        Ok(!self.0.borrow().interrupt_pending())
    }

    fn is_low(&self) -> Result<bool, Self::Error> {
        Ok(self.0.borrow().interrupt_pending())
    }
}

pub struct SimDelay;

impl DelayMs<u8> for SimDelay {
    fn delay_ms(&mut self, _ms: u8) {}
}
