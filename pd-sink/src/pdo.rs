//! Power data objects and request data objects.

use {
    byteorder::{ByteOrder, LittleEndian},
    proc_bitfield::bitfield,
};

/// A single 32-bit source capability.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerDataObject {
    FixedSupply(FixedSupply),
    Battery(Battery),
    VariableSupply(VariableSupply),
    /// Programmable power supply (the only augmented PDO this sink knows).
    Pps(SprProgrammablePowerSupply),
    /// Augmented PDO of a subtype other than PPS. Kept so that object
    /// positions of the following entries stay correct.
    Unknown(u32),
}

impl PowerDataObject {
    pub fn parse(raw: u32) -> Self {
        match raw >> 30 {
            0b00 => PowerDataObject::FixedSupply(FixedSupply(raw)),
            0b01 => PowerDataObject::Battery(Battery(raw)),
            0b10 => PowerDataObject::VariableSupply(VariableSupply(raw)),
            _ => {
                let apdo = SprProgrammablePowerSupply(raw);
                if apdo.supply() == 0b00 {
                    PowerDataObject::Pps(apdo)
                } else {
                    PowerDataObject::Unknown(raw)
                }
            }
        }
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct FixedSupply(pub u32): Debug, FromStorage, IntoStorage {
        /// Fixed supply
        pub kind: u8 @ 30..=31,
        /// Dual-role power
        pub dual_role_power: bool @ 29,
        /// USB suspend supported
        pub usb_suspend_supported: bool @ 28,
        /// Unconstrained power
        pub unconstrained_power: bool @ 27,
        /// USB communications capable
        pub usb_communications_capable: bool @ 26,
        /// Dual-role data
        pub dual_role_data: bool @ 25,
        /// Unchunked extended messages supported
        pub unchunked_extended_messages_supported: bool @ 24,
        /// Peak current
        pub peak_current: u8 @ 20..=21,
        /// Voltage in 50mV units
        pub voltage: u16 @ 10..=19,
        /// Maximum current in 10mA units
        pub max_current: u16 @ 0..=9,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Battery(pub u32): Debug, FromStorage, IntoStorage {
        /// Battery
        pub kind: u8 @ 30..=31,
        /// Maximum voltage in 50mV units
        pub max_voltage: u16 @ 20..=29,
        /// Minimum voltage in 50mV units
        pub min_voltage: u16 @ 10..=19,
        /// Maximum allowable power in 250mW units
        pub max_power: u16 @ 0..=9,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct VariableSupply(pub u32): Debug, FromStorage, IntoStorage {
        /// Variable supply (non-battery)
        pub kind: u8 @ 30..=31,
        /// Maximum voltage in 50mV units
        pub max_voltage: u16 @ 20..=29,
        /// Minimum voltage in 50mV units
        pub min_voltage: u16 @ 10..=19,
        /// Maximum current in 10mA units
        pub max_current: u16 @ 0..=9,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct SprProgrammablePowerSupply(pub u32): Debug, FromStorage, IntoStorage {
        /// Augmented power data object
        pub kind: u8 @ 30..=31,
        /// 0b00 marks an SPR programmable power supply
        pub supply: u8 @ 28..=29,
        pub pps_power_limited: bool @ 27,
        /// Maximum voltage in 100mV units
        pub max_voltage: u8 @ 17..=24,
        /// Minimum voltage in 100mV units
        pub min_voltage: u8 @ 8..=15,
        /// Maximum current in 50mA units
        pub maximum_current: u8 @ 0..=6,
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct FixedVariableRequestDataObject(pub u32): Debug, FromStorage, IntoStorage {
        /// Valid range 1..=7
        pub object_position: u8 @ 28..=31,
        pub giveback_flag: bool @ 27,
        pub capability_mismatch: bool @ 26,
        pub usb_communications_capable: bool @ 25,
        pub no_usb_suspend: bool @ 24,
        /// Operating current in 10mA units
        pub operating_current: u16 @ 10..=19,
        /// Maximum operating current in 10mA units
        pub maximum_operating_current: u16 @ 0..=9,
    }
}

impl FixedVariableRequestDataObject {
    pub fn to_bytes(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(buf, self.0);
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct PpsRequestDataObject(pub u32): Debug, FromStorage, IntoStorage {
        /// Valid range 1..=7
        pub object_position: u8 @ 28..=31,
        pub capability_mismatch: bool @ 26,
        pub usb_communications_capable: bool @ 25,
        pub no_usb_suspend: bool @ 24,
        /// Output voltage in 20mV units
        pub raw_output_voltage: u16 @ 8..=19,
        /// Operating current in 50mA units
        pub raw_operating_current: u8 @ 0..=6,
    }
}

impl PpsRequestDataObject {
    pub fn to_bytes(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(buf, self.0);
    }
}
