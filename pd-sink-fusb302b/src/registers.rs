//! FUSB302B register map and typed register I/O.

use {
    embedded_hal::blocking::i2c::{Write, WriteRead},
    proc_bitfield::bitfield,
};

/// I2C address of the FUSB302BMPX
const DEVICE_ADDRESS: u8 = 0b0100010;

/// An I2C transfer failed (e.g. NACK). The operation is abandoned and
/// retried by a later poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusError;

macro_rules! generate_register_read {
    ($reg:ident, $fn:ident) => {
        pub fn $fn(&mut self) -> Result<$reg, BusError> {
            Ok(self.read_register_raw(Register::$reg as u8)?.into())
        }
    };
}

macro_rules! generate_register_write {
    ($reg:ident, $fn:ident) => {
        paste::item! {
            pub fn [<set_ $fn>](&mut self, value: $reg) -> Result<(), BusError> {
                self.write_register_raw(Register::$reg as u8, value.0)
            }
        }
    };
}

macro_rules! generate_register_clear {
    ($reg:ident, $fn:ident) => {
        paste::item! {
            pub fn [<clear_ $fn>](&mut self) -> Result<(), BusError> {
                self.write_register_raw(Register::$reg as u8, 0)
            }
        }
    };
}

macro_rules! generate_register_accessors {
    () => {};

    (($reg:ident, $fn:ident, r), $($tail:tt)*) => {
        generate_register_read!($reg, $fn);

        generate_register_accessors!($($tail)*);
    };

    (($reg:ident, $fn:ident, rw), $($tail:tt)*) => {
        generate_register_read!($reg, $fn);
        generate_register_write!($reg, $fn);

        generate_register_accessors!($($tail)*);
    };

    (($reg:ident, $fn:ident, w), $($tail:tt)*) => {
        generate_register_write!($reg, $fn);

        generate_register_accessors!($($tail)*);
    };

    (($reg:ident, $fn:ident, rc), $($tail:tt)*) => {
        generate_register_read!($reg, $fn);
        generate_register_clear!($reg, $fn);

        generate_register_accessors!($($tail)*);
    };
}

/// Typed access to the FUSB302B registers over I2C.
pub struct Registers<I2C> {
    i2c: I2C,
}

impl<I2C: Write + WriteRead> Registers<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    fn read_register_raw(&mut self, register: u8) -> Result<u8, BusError> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(DEVICE_ADDRESS, &[register], &mut buf)
            .map_err(|_| BusError)?;
        Ok(buf[0])
    }

    fn write_register_raw(&mut self, register: u8, value: u8) -> Result<(), BusError> {
        self.i2c
            .write(DEVICE_ADDRESS, &[register, value])
            .map_err(|_| BusError)
    }

    /// Reads `buf.len()` bytes from the RX FIFO.
    pub fn read_fifo(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
        self.i2c
            .write_read(DEVICE_ADDRESS, &[Register::Fifo as u8], buf)
            .map_err(|_| BusError)
    }

    /// Writes a raw buffer whose first byte is the register address. Used
    /// for burst writes into the TX FIFO.
    pub fn write_raw(&mut self, buf: &[u8]) -> Result<(), BusError> {
        self.i2c.write(DEVICE_ADDRESS, buf).map_err(|_| BusError)
    }

    generate_register_accessors!(
        (DeviceId, device_id, r),
        (Switches0, switches0, rw),
        (Switches1, switches1, rw),
        (Measure, measure, rw),
        (Slice, slice, rw),
        (Control0, control0, rw),
        (Control1, control1, rw),
        (Control2, control2, rw),
        (Control3, control3, rw),
        (Mask1, mask1, rw),
        (Power, power, rw),
        (Reset, reset, w),
        (OcPreg, ocpreg, rw),
        (MaskA, mask_a, rw),
        (MaskB, mask_b, rw),
        (Control4, control4, rw),
        (Status0A, status0a, r),
        (Status1A, status1a, r),
        (InterruptA, interrupta, rc),
        (InterruptB, interruptb, rc),
        (Status0, status0, r),
        (Status1, status1, r),
        (Interrupt, interrupt, rc),
    );
}

/// FUSB302B register addresses
#[derive(Clone, Copy)]
pub enum Register {
    DeviceId = 0x01,
    Switches0 = 0x02,
    Switches1 = 0x03,
    Measure = 0x04,
    Slice = 0x05,
    Control0 = 0x06,
    Control1 = 0x07,
    Control2 = 0x08,
    Control3 = 0x09,
    Mask1 = 0x0A,
    Power = 0x0B,
    Reset = 0x0C,
    OcPreg = 0x0D,
    MaskA = 0x0E,
    MaskB = 0x0F,
    Control4 = 0x10,
    Status0A = 0x3C,
    Status1A = 0x3D,
    InterruptA = 0x3E,
    InterruptB = 0x3F,
    Status0 = 0x40,
    Status1 = 0x41,
    Interrupt = 0x42,
    Fifo = 0x43,
}

/// Revision bits used for the automatic GoodCRC acknowledge packet.
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum Revision {
    R1_0 = 0b00,
    R2_0 = 0b01,
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct DeviceId(pub u8): Debug, FromStorage, IntoStorage {
        /// Device version
        pub version_id: u8 @ 4..=7,
        pub product_id: u8 @ 2..=3,
        /// Revision history of each version
        pub revision_id: u8 @ 0..=1,
    }
}

impl DeviceId {
    pub fn product(&self) -> &'static str {
        match self.product_id() {
            0 => "FUSB302B__X",
            1 => "FUSB302B01MPX",
            2 => "FUSB302B10MPX",
            _ => "FUSB302B11MPX",
        }
    }

    pub fn version(&self) -> char {
        const VERSIONS: &[u8; 16] = b"????????ABCDEFGH";
        VERSIONS[self.version_id() as usize] as char
    }

    pub fn revision(&self) -> char {
        (b'A' + self.revision_id()) as char
    }
}

impl core::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} {}_rev.{}", self.product(), self.version(), self.revision())
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Switches0(pub u8): Debug, FromStorage, IntoStorage {
        /// Apply host pull up current to CC2
        pub pu_en2: bool @ 7,
        /// Apply host pull up current to CC1
        pub pu_en1: bool @ 6,
        /// Turn on the VCONN current to CC2
        pub vconn_cc2: bool @ 5,
        /// Turn on the VCONN current to CC1
        pub vconn_cc1: bool @ 4,
        /// Use the measure block to monitor or measure the voltage on CC2
        pub meas_cc2: bool @ 3,
        /// Use the measure block to monitor or measure the voltage on CC1
        pub meas_cc1: bool @ 2,
        /// Device pull down on CC2
        pub pdwn2: bool @ 1,
        /// Device pull down on CC1
        pub pdwn1: bool @ 0,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Switches1(pub u8): Debug, FromStorage, IntoStorage {
        /// Power role bit used for the GoodCRC acknowledge packet
        pub powerrole: bool @ 7,
        /// Revision bits used for the GoodCRC acknowledge packet
        pub specrev: u8 @ 5..=6,
        /// Data role bit used for the GoodCRC acknowledge packet
        pub datarole: bool @ 4,
        /// Automatically send a GoodCRC acknowledge when a message with a
        /// good CRC is received
        pub auto_crc: bool @ 2,
        /// Enable the BMC transmit driver on CC2
        pub txcc2: bool @ 1,
        /// Enable the BMC transmit driver on CC1
        pub txcc1: bool @ 0,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Measure(pub u8): Debug, FromStorage, IntoStorage {
        /// Measure VBUS with the MDAC instead of CC
        pub meas_vbus: bool @ 6,
        /// Measure block DAC data input
        pub mdac: u8 @ 0..=5,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Slice(pub u8): Debug, FromStorage, IntoStorage {
        /// BMC slicer hysteresis: 0b00 none, 0b01 85mV, 0b10 170mV, 0b11 255mV
        pub sda_hys: u8 @ 6..=7,
        /// BMC slicer DAC threshold
        pub sdac: u8 @ 0..=5,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Control0(pub u8): Debug, FromStorage, IntoStorage {
        /// Flush the TX FIFO
        pub tx_flush: bool @ 6,
        /// Mask all interrupts from driving the INT_N pin
        pub int_mask: bool @ 5,
        /// Host pull up current: 0b00 none, 0b01 default USB, 0b10 1.5A, 0b11 3A
        pub host_cur: u8 @ 2..=3,
        /// Start the transmitter automatically on a preamble
        pub auto_pre: bool @ 1,
        /// Start the transmitter
        pub tx_start: bool @ 0,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Control1(pub u8): Debug, FromStorage, IntoStorage {
        /// Enable SOP''_DEBUG packets
        pub ensop2db: bool @ 6,
        /// Enable SOP'_DEBUG packets
        pub ensop1db: bool @ 5,
        /// BIST mode
        pub bist_mode2: bool @ 4,
        /// Flush the RX FIFO
        pub rx_flush: bool @ 2,
        /// Enable SOP'' packets
        pub ensop2: bool @ 1,
        /// Enable SOP' packets
        pub ensop1: bool @ 0,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Control2(pub u8): Debug, FromStorage, IntoStorage {
        /// Toggle engine power saving
        pub tog_save_pwr: u8 @ 6..=7,
        /// Only stop toggling on an Rd value
        pub tog_rd_only: bool @ 5,
        /// Enable the wake detection
        pub wake_en: bool @ 3,
        /// Toggle mode: 0b01 DRP, 0b10 sink, 0b11 source
        pub mode: u8 @ 1..=2,
        /// Enable the toggle engine
        pub toggle: bool @ 0,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Control3(pub u8): Debug, FromStorage, IntoStorage {
        /// Send a hard reset packet
        pub send_hard_reset: bool @ 6,
        /// BIST test mode
        pub bist_tmode: bool @ 5,
        /// Automatically send a hard reset after a soft reset failed
        pub auto_hardreset: bool @ 4,
        /// Automatically send a soft reset after retries failed
        pub auto_softreset: bool @ 3,
        /// Number of transmit retries
        pub n_retries: u8 @ 1..=2,
        /// Retry transmitting automatically when no GoodCRC arrives
        pub auto_retry: bool @ 0,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Mask1(pub u8): Debug, FromStorage, IntoStorage {
        pub m_vbusok: bool @ 7,
        pub m_activity: bool @ 6,
        pub m_comp_chng: bool @ 5,
        pub m_crc_chk: bool @ 4,
        pub m_alert: bool @ 3,
        pub m_wake: bool @ 2,
        pub m_collision: bool @ 1,
        pub m_bc_lvl: bool @ 0,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Power(pub u8): Debug, FromStorage, IntoStorage {
        /// Internal oscillator
        pub internal_oscillator: bool @ 3,
        /// Receiver and current references
        pub receiver: bool @ 2,
        /// Measure block
        pub measure_block: bool @ 1,
        /// Bandgap and wake circuit
        pub bandgap_wake: bool @ 0,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Reset(pub u8): Debug, FromStorage, IntoStorage {
        /// Reset the PD logic only
        pub pd_reset: bool @ 1,
        /// Reset the entire chip
        pub sw_res: bool @ 0,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct OcPreg(pub u8): Debug, FromStorage, IntoStorage {
        /// Over-current range selection
        pub ocp_range: bool @ 3,
        /// Over-current threshold
        pub ocp_cur: u8 @ 0..=2,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct MaskA(pub u8): Debug, FromStorage, IntoStorage {
        pub m_ocp_temp: bool @ 7,
        pub m_togdone: bool @ 6,
        pub m_softfail: bool @ 5,
        pub m_retryfail: bool @ 4,
        pub m_hardsent: bool @ 3,
        pub m_txsent: bool @ 2,
        pub m_softrst: bool @ 1,
        pub m_hardrst: bool @ 0,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct MaskB(pub u8): Debug, FromStorage, IntoStorage {
        pub m_gcrcsent: bool @ 0,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Control4(pub u8): Debug, FromStorage, IntoStorage {
        /// Stop toggling when an audio accessory is detected
        pub tog_exit_aud: bool @ 0,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Status0A(pub u8): Debug, FromStorage, IntoStorage {
        /// All soft reset attempts failed
        pub softfail: bool @ 5,
        /// All retries failed
        pub retryfail: bool @ 4,
        /// Internal power state
        pub power23: u8 @ 2..=3,
        /// A soft reset packet was received
        pub softrst: bool @ 1,
        /// A hard reset packet was received
        pub hardrst: bool @ 0,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Status1A(pub u8): Debug, FromStorage, IntoStorage {
        /// Toggle engine state
        pub togss: u8 @ 3..=5,
        /// The last packet was SOP''_DEBUG
        pub rxsop2db: bool @ 2,
        /// The last packet was SOP'_DEBUG
        pub rxsop1db: bool @ 1,
        /// The last packet was SOP
        pub rxsop: bool @ 0,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct InterruptA(pub u8): Debug, FromStorage, IntoStorage {
        pub i_ocp_temp: bool @ 7,
        pub i_togdone: bool @ 6,
        pub i_softfail: bool @ 5,
        pub i_retryfail: bool @ 4,
        pub i_hardsent: bool @ 3,
        pub i_txsent: bool @ 2,
        pub i_softrst: bool @ 1,
        pub i_hardrst: bool @ 0,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct InterruptB(pub u8): Debug, FromStorage, IntoStorage {
        pub i_gcrcsent: bool @ 0,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Status0(pub u8): Debug, FromStorage, IntoStorage {
        /// VBUS is above the valid threshold
        pub vbusok: bool @ 7,
        /// Activity on the measured CC line
        pub activity: bool @ 6,
        /// Measured CC is above the MDAC reference
        pub comp: bool @ 5,
        /// The last received packet had a correct CRC
        pub crc_chk: bool @ 4,
        pub alert: bool @ 3,
        pub wake: bool @ 2,
        /// Voltage band on the measured CC line
        pub bc_lvl: u8 @ 0..=1,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Status1(pub u8): Debug, FromStorage, IntoStorage {
        /// The last packet was SOP''
        pub rxsop2: bool @ 7,
        /// The last packet was SOP'
        pub rxsop1: bool @ 6,
        pub rx_empty: bool @ 5,
        pub rx_full: bool @ 4,
        pub tx_empty: bool @ 3,
        pub tx_full: bool @ 2,
        pub ovrtemp: bool @ 1,
        pub ocp: bool @ 0,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Interrupt(pub u8): Debug, FromStorage, IntoStorage {
        pub i_vbusok: bool @ 7,
        pub i_activity: bool @ 6,
        pub i_comp_chng: bool @ 5,
        pub i_crc_chk: bool @ 4,
        pub i_alert: bool @ 3,
        pub i_wake: bool @ 2,
        pub i_collision: bool @ 1,
        pub i_bc_lvl: bool @ 0,
    }
}
