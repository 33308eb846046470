//! OBIS object identifiers.
//!
//! An OBIS code names a metering quantity with six byte-sized groups
//! `A-B:C.D.E*F`, e.g. `1-0:1.8.0*255` for the total imported active energy.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A six-group OBIS code as transmitted in an SML list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ObisCode(pub [u8; 6]);

impl ObisCode {
    /// Build an OBIS code from an SML object name.
    ///
    /// Returns `None` unless the name is exactly six bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        <[u8; 6]>::try_from(bytes).ok().map(Self)
    }
}

impl fmt::Display for ObisCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a}-{b}:{c}.{d}.{e}*{g}")
    }
}

/// Errors returned when parsing an OBIS code string.
#[derive(Error, Debug, PartialEq)]
pub enum ParseObisError {
    #[error("invalid OBIS code: expected format A-B:C.D.E*F")]
    InvalidFormat,
    #[error("invalid OBIS code: '{0}' is not a byte value")]
    InvalidGroup(String),
}

impl FromStr for ObisCode {
    type Err = ParseObisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, rest) = s.split_once('-').ok_or(ParseObisError::InvalidFormat)?;
        let (b, rest) = rest.split_once(':').ok_or(ParseObisError::InvalidFormat)?;
        let (cde, f) = rest.split_once('*').ok_or(ParseObisError::InvalidFormat)?;

        let mut groups = vec![a, b];
        groups.extend(cde.split('.'));
        groups.push(f);
        if groups.len() != 6 {
            return Err(ParseObisError::InvalidFormat);
        }

        let mut bytes = [0u8; 6];
        for (slot, group) in bytes.iter_mut().zip(groups) {
            *slot = group
                .parse()
                .map_err(|_| ParseObisError::InvalidGroup(group.to_string()))?;
        }

        Ok(ObisCode(bytes))
    }
}

impl From<[u8; 6]> for ObisCode {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}
