//! SML encoders for building test frames.

use crate::obis::ObisCode;
use crate::sml::{CLOSE_RESPONSE, GET_LIST_RESPONSE, OPEN_RESPONSE};
use crate::transport::START_SEQUENCE;

/// Server id used by every generated measurement list.
pub const SERVER_ID: [u8; 10] = [0x0a, 0x01, 0x49, 0x53, 0x4b, 0x00, 0x04, 0x32, 0x5e, 0xc5];

const SKIPPED: u8 = 0x01;

pub fn octets(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 2);
    if bytes.len() + 1 < 0x10 {
        out.push((bytes.len() + 1) as u8);
    } else {
        let total = bytes.len() + 2;
        out.push(0x80 | (total >> 4) as u8);
        out.push((total & 0x0F) as u8);
    }
    out.extend_from_slice(bytes);
    out
}

pub fn unsigned(value: u64, width: usize) -> Vec<u8> {
    let mut out = vec![0x60 | (width + 1) as u8];
    out.extend_from_slice(&value.to_be_bytes()[8 - width..]);
    out
}

pub fn signed(value: i64, width: usize) -> Vec<u8> {
    let mut out = vec![0x50 | (width + 1) as u8];
    out.extend_from_slice(&value.to_be_bytes()[8 - width..]);
    out
}

pub fn boolean(value: bool) -> Vec<u8> {
    vec![0x42, u8::from(value)]
}

pub fn list(items: &[Vec<u8>]) -> Vec<u8> {
    let mut out = if items.len() < 0x10 {
        vec![0x70 | items.len() as u8]
    } else {
        vec![0xF0 | (items.len() >> 4) as u8, (items.len() & 0x0F) as u8]
    };
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

fn optional(value: Option<Vec<u8>>) -> Vec<u8> {
    value.unwrap_or_else(|| vec![SKIPPED])
}

fn sec_index(secs: u32) -> Vec<u8> {
    list(&[unsigned(1, 1), unsigned(u64::from(secs), 4)])
}

/// Encode a complete SML message with the given body tag and encoded body.
pub fn message(tag: u32, body: Vec<u8>) -> Vec<u8> {
    list(&[
        octets(&[0x00, 0x01]),
        unsigned(0, 1),
        unsigned(0, 1),
        list(&[unsigned(u64::from(tag), 2), body]),
        unsigned(0xBEEF, 2),
        vec![0x00],
    ])
}

pub fn open_response() -> Vec<u8> {
    message(
        OPEN_RESPONSE,
        list(&[
            vec![SKIPPED],
            vec![SKIPPED],
            octets(b"file01"),
            octets(&SERVER_ID),
            vec![SKIPPED],
            unsigned(1, 1),
        ]),
    )
}

pub fn close_response() -> Vec<u8> {
    message(CLOSE_RESPONSE, list(&[vec![SKIPPED]]))
}

/// A list entry to encode into a measurement-list response.
pub struct TestEntry {
    pub obis: ObisCode,
    pub unit: Option<u8>,
    pub scaler: Option<i8>,
    pub value: Option<Vec<u8>>,
}

impl TestEntry {
    fn new(obis: &str, value: Option<Vec<u8>>) -> Self {
        Self {
            obis: obis.parse().unwrap(),
            unit: None,
            scaler: None,
            value,
        }
    }

    pub fn unsigned(obis: &str, value: u64, unit: Option<u8>, scaler: Option<i8>) -> Self {
        let width = if value > u64::from(u32::MAX) { 8 } else { 4 };
        Self {
            unit,
            scaler,
            ..Self::new(obis, Some(unsigned(value, width)))
        }
    }

    pub fn signed(obis: &str, value: i64, unit: Option<u8>, scaler: Option<i8>) -> Self {
        let width = if i32::try_from(value).is_ok() { 4 } else { 8 };
        Self {
            unit,
            scaler,
            ..Self::new(obis, Some(signed(value, width)))
        }
    }

    pub fn octets(obis: &str, value: &[u8]) -> Self {
        Self::new(obis, Some(octets(value)))
    }

    pub fn boolean(obis: &str, value: bool) -> Self {
        Self::new(obis, Some(boolean(value)))
    }

    pub fn list(obis: &str, values: &[Vec<u8>]) -> Self {
        Self::new(obis, Some(list(values)))
    }

    pub fn missing(obis: &str) -> Self {
        Self::new(obis, None)
    }

    fn encode(&self) -> Vec<u8> {
        list(&[
            octets(&self.obis.0),
            vec![SKIPPED],
            vec![SKIPPED],
            optional(self.unit.map(|u| unsigned(u64::from(u), 1))),
            optional(self.scaler.map(|s| signed(i64::from(s), 1))),
            optional(self.value.clone()),
            vec![SKIPPED],
        ])
    }
}

pub fn get_list_response(entries: &[TestEntry], sensor_time: Option<u32>) -> Vec<u8> {
    let entries: Vec<Vec<u8>> = entries.iter().map(TestEntry::encode).collect();
    message(
        GET_LIST_RESPONSE,
        list(&[
            vec![SKIPPED],
            octets(&SERVER_ID),
            vec![SKIPPED],
            optional(sensor_time.map(sec_index)),
            list(&entries),
            vec![SKIPPED],
            vec![SKIPPED],
        ]),
    )
}

/// Concatenate messages and zero-pad to a multiple of four bytes.
pub fn payload(messages: &[Vec<u8>]) -> Vec<u8> {
    let mut out = messages.concat();
    while out.len() % 4 != 0 {
        out.push(0x00);
    }
    out
}

/// Wrap messages into a complete transport frame, envelope included.
pub fn frame(messages: &[Vec<u8>]) -> Vec<u8> {
    let body = messages.concat();
    let padding = (4 - body.len() % 4) % 4;

    let mut out = START_SEQUENCE.to_vec();
    out.extend_from_slice(&payload(messages));
    out.extend_from_slice(&[0x1b, 0x1b, 0x1b, 0x1b, 0x1a, padding as u8, 0x00, 0x00]);
    out
}
