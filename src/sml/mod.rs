//! SML (Smart Message Language) message model.
//!
//! A frame payload is an SML file: a sequence of messages, each carrying a
//! tagged body. Only the bodies meters actually push on their optical or
//! serial interface are modelled; everything else is kept as [`MessageBody::Other`].

mod parser;

pub use parser::parse_file;

use std::fmt;
use thiserror::Error;

/// Message body tag of an open response.
pub const OPEN_RESPONSE: u32 = 0x0101;
/// Message body tag of a close response.
pub const CLOSE_RESPONSE: u32 = 0x0201;
/// Message body tag of a measurement-list (GetList) response.
pub const GET_LIST_RESPONSE: u32 = 0x0701;
/// Message body tag of an attention response.
pub const ATTENTION_RESPONSE: u32 = 0xFF01;

/// Errors produced while parsing an SML payload.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("unexpected end of SML data at offset {0}")]
    UnexpectedEnd(usize),
    #[error("unknown SML type field {field:#x} at offset {offset}")]
    UnknownType { field: u8, offset: usize },
    #[error("expected {expected} at offset {offset}")]
    UnexpectedType {
        expected: &'static str,
        offset: usize,
    },
    #[error("expected a list of {expected} elements at offset {offset}, found {found}")]
    ListLength {
        expected: usize,
        found: usize,
        offset: usize,
    },
    #[error("integer of {0} bytes does not fit the field")]
    IntegerWidth(usize),
    #[error("unknown SML time variant {0}")]
    TimeVariant(u8),
}

/// An octet string, shown as hex in debug dumps.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct OctetString(pub Vec<u8>);

impl OctetString {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for OctetString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

/// A parsed SML file.
#[derive(Debug, Clone, PartialEq)]
pub struct SmlFile {
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub transaction_id: OctetString,
    pub group_no: u8,
    pub abort_on_error: u8,
    pub body: MessageBody,
    pub crc: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    OpenResponse(OpenResponse),
    CloseResponse(CloseResponse),
    GetListResponse(GetListResponse),
    AttentionResponse(AttentionResponse),
    /// A body this crate does not interpret; its content was skipped.
    Other { tag: u32 },
}

impl MessageBody {
    /// The wire tag of this body.
    pub fn tag(&self) -> u32 {
        match self {
            MessageBody::OpenResponse(_) => OPEN_RESPONSE,
            MessageBody::CloseResponse(_) => CLOSE_RESPONSE,
            MessageBody::GetListResponse(_) => GET_LIST_RESPONSE,
            MessageBody::AttentionResponse(_) => ATTENTION_RESPONSE,
            MessageBody::Other { tag } => *tag,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenResponse {
    pub codepage: Option<OctetString>,
    pub client_id: Option<OctetString>,
    pub req_file_id: OctetString,
    pub server_id: OctetString,
    pub ref_time: Option<Time>,
    pub sml_version: Option<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CloseResponse {
    pub global_signature: Option<OctetString>,
}

/// A measurement-list response.
#[derive(Debug, Clone, PartialEq)]
pub struct GetListResponse {
    pub client_id: Option<OctetString>,
    pub server_id: OctetString,
    pub list_name: Option<OctetString>,
    pub act_sensor_time: Option<Time>,
    pub val_list: Vec<ListEntry>,
    pub list_signature: Option<OctetString>,
    pub act_gateway_time: Option<Time>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttentionResponse {
    pub server_id: OctetString,
    pub attention_no: OctetString,
    pub attention_msg: Option<OctetString>,
}

/// One measurement of a measurement-list response.
///
/// `value` is nominally mandatory but some meters omit it.
#[derive(Debug, Clone, PartialEq)]
pub struct ListEntry {
    pub obj_name: OctetString,
    pub status: Option<u64>,
    pub val_time: Option<Time>,
    pub unit: Option<u8>,
    pub scaler: Option<i8>,
    pub value: Option<Value>,
    pub value_signature: Option<OctetString>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    OctetString(OctetString),
    Boolean(bool),
    Integer(i64),
    Unsigned(u64),
    List(Vec<Value>),
}

/// An SML time value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Time {
    SecIndex(u32),
    Timestamp(u32),
    LocalTimestamp {
        timestamp: u32,
        local_offset: i16,
        season_offset: i16,
    },
}

impl Time {
    /// The raw counter carried by this time value, whatever its variant.
    pub fn counter(&self) -> u32 {
        match *self {
            Time::SecIndex(secs) | Time::Timestamp(secs) => secs,
            Time::LocalTimestamp { timestamp, .. } => timestamp,
        }
    }
}
