//! Input channel for meter data.
//!
//! A channel is either a serial device switched to raw 9600 8N1 mode or, for
//! the device name `-`, standard input. Both are read the same way downstream.

#[cfg(feature = "serial")]
pub mod serial;

use log::debug;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::io::{AsyncRead, ReadBuf};

/// Device name that selects standard input.
pub const STDIN_DEVICE: &str = "-";

/// Errors returned while setting up a channel.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("open({path}): {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("{path}: cannot configure serial line: {source}")]
    Configure {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("{path}: cannot wait for input: {source}")]
    Register {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("{path}: serial support not compiled in")]
    SerialUnavailable { path: String },
}

/// How to treat a serial line that rejects the raw-mode settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinePolicy {
    /// Warn and keep reading with whatever settings the line has.
    #[default]
    Degraded,
    /// Fail with [`ChannelError::Configure`].
    Strict,
}

/// An open input channel.
#[derive(Debug)]
pub enum Channel {
    Stdin(tokio::io::Stdin),
    #[cfg(feature = "serial")]
    Serial(serial::SerialPort),
}

impl Channel {
    pub fn is_stdin(&self) -> bool {
        matches!(self, Channel::Stdin(_))
    }
}

/// Open `path` as a meter channel. `-` selects standard input and touches no device.
pub fn open_channel(path: &str, policy: LinePolicy) -> Result<Channel, ChannelError> {
    if path == STDIN_DEVICE {
        debug!("reading meter data from stdin");
        return Ok(Channel::Stdin(tokio::io::stdin()));
    }
    open_serial(path, policy)
}

#[cfg(feature = "serial")]
fn open_serial(path: &str, policy: LinePolicy) -> Result<Channel, ChannelError> {
    serial::SerialPort::open(path, policy).map(Channel::Serial)
}

#[cfg(not(feature = "serial"))]
fn open_serial(path: &str, _policy: LinePolicy) -> Result<Channel, ChannelError> {
    Err(ChannelError::SerialUnavailable {
        path: path.to_string(),
    })
}

impl AsyncRead for Channel {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Channel::Stdin(stdin) => Pin::new(stdin).poll_read(cx, buf),
            #[cfg(feature = "serial")]
            Channel::Serial(port) => Pin::new(port).poll_read(cx, buf),
        }
    }
}
