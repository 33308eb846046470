//! `#`-separated text output.
//!
//! ```text
//! 1-0:96.50.1*1#ISK#
//! 1-0:1.8.0*255#1234.5#Wh
//! act_sensor_time#42#
//! ```

use crate::obis::ObisCode;
use crate::output::{EntryError, EntryFormatter, EntryLine};
use crate::sml::{ListEntry, Value};
use crate::unit::{DlmsUnits, UnitResolver};

/// Formats entries as `A-B:C.D.E*F#<value>#[unit]`.
pub struct TextFormatter<U = DlmsUnits> {
    units: U,
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self::new(DlmsUnits)
    }
}

impl<U: UnitResolver> TextFormatter<U> {
    pub fn new(units: U) -> Self {
        Self { units }
    }

    fn reading(&self, obis: ObisCode, raw: f64, entry: &ListEntry) -> String {
        let value = scaled(raw, entry.scaler.unwrap_or(0));
        let unit = entry
            .unit
            .and_then(|code| self.units.resolve(code))
            .unwrap_or_default();
        format!("{obis}#{value}#{unit}")
    }
}

impl<U: UnitResolver> EntryFormatter for TextFormatter<U> {
    fn format_entry(&self, entry: &ListEntry) -> Result<Option<EntryLine>, EntryError> {
        let value = entry.value.as_ref().ok_or(EntryError::MissingValue)?;
        let name = entry.obj_name.as_bytes();
        let obis = ObisCode::from_bytes(name).ok_or(EntryError::ObjectName(name.len()))?;

        let line = match value {
            Value::OctetString(bytes) => EntryLine {
                text: format!("{obis}#{}#", octets_to_text(bytes.as_bytes())),
                flush: false,
            },
            Value::Boolean(flag) => EntryLine {
                text: format!("{obis}#{flag}#"),
                flush: false,
            },
            Value::Integer(raw) => EntryLine {
                text: self.reading(obis, *raw as f64, entry),
                flush: true,
            },
            Value::Unsigned(raw) => EntryLine {
                text: self.reading(obis, *raw as f64, entry),
                flush: true,
            },
            Value::List(_) => return Ok(None),
        };

        Ok(Some(line))
    }

    fn format_sensor_time(&self, counter: u32) -> String {
        format!("act_sensor_time#{counter}#")
    }
}

/// Scale `raw` by `10^scaler` and print it with `max(0, -scaler)` decimals.
pub fn scaled(raw: f64, scaler: i8) -> String {
    let exponent = i32::from(scaler);
    let precision = usize::try_from(-exponent).unwrap_or(0);
    let value = raw * 10f64.powi(exponent);
    format!("{value:.precision$}")
}

/// Render an octet string as text when it is printable ASCII, otherwise as
/// lowercase hex bytes each followed by a space.
pub fn octets_to_text(bytes: &[u8]) -> String {
    if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    bytes.iter().map(|b| format!("{b:02x} ")).collect()
}
