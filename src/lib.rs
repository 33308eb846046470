//! `sml-listener` library.
//!
//! The binary (`src/main.rs`) is responsible for process setup and exit codes.
//! Everything else lives here: the input [`channel`], the SML [`transport`]
//! framing, the [`sml`] parser, and the [`decoder`] that prints readings
//! through an [`output`] formatter. [`app`] ties them together and can be
//! driven with any byte stream.

pub mod app;
pub mod channel;
pub mod decoder;
pub mod obis;
pub mod output;
pub mod sml;
pub mod transport;
pub mod unit;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use app::{ArgsOutcome, Options, RunError, parse_args, run_with_io};
pub use channel::{Channel, ChannelError, LinePolicy, open_channel};
pub use decoder::{Decoder, Flow, RunMode};
pub use obis::{ObisCode, ParseObisError};
pub use output::text::TextFormatter;
pub use output::{EntryError, EntryFormatter, EntryLine};
pub use sml::{ParseError, SmlFile, parse_file};
pub use transport::FrameListener;
pub use unit::{DlmsUnits, UnitResolver};
