//! Parsed view of the received USB PD messages this sink reacts to.

use {
    crate::{
        header::{ControlMessageType, DataMessageType, Header, MessageType},
        pdo::PowerDataObject,
    },
    byteorder::{ByteOrder, LittleEndian},
    heapless::Vec,
};

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Message {
    Accept,
    Reject,
    Wait,
    PsReady,
    SoftReset,
    GetSinkCap,
    SourceCapabilities(Vec<PowerDataObject, 7>),
    Unknown,
}

impl Message {
    pub fn parse(header: Header, payload: &[u8]) -> Self {
        match header.message_type() {
            MessageType::Control(ControlMessageType::Accept) => Message::Accept,
            MessageType::Control(ControlMessageType::Reject) => Message::Reject,
            MessageType::Control(ControlMessageType::Wait) => Message::Wait,
            MessageType::Control(ControlMessageType::PsRdy) => Message::PsReady,
            MessageType::Control(ControlMessageType::SoftReset) => Message::SoftReset,
            MessageType::Control(ControlMessageType::GetSinkCap) => Message::GetSinkCap,
            MessageType::Data(DataMessageType::SourceCapabilities) => Message::SourceCapabilities(
                payload
                    .chunks_exact(4)
                    .take(header.num_objects() as usize)
                    .map(|buf| PowerDataObject::parse(LittleEndian::read_u32(buf)))
                    .collect(),
            ),
            _ => {
                trace!("unhandled message type");
                Message::Unknown
            }
        }
    }
}
