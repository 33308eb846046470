//! SML transport layer: finds frame boundaries in a raw byte stream.
//!
//! A frame starts with `1b1b1b1b 01010101` and ends with `1b1b1b1b 1a` plus
//! three bytes (padding count and CRC). In between, data is aligned to
//! four-byte blocks and a literal escape block is sent twice.

use log::{debug, warn};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

/// Start of every transport frame.
pub const START_SEQUENCE: [u8; 8] = [0x1b, 0x1b, 0x1b, 0x1b, 0x01, 0x01, 0x01, 0x01];

/// Leading and trailing envelope bytes stripped before parsing.
pub const ENVELOPE_LEN: usize = 8;

/// Frames longer than this are dropped.
pub const MAX_FRAME_LEN: usize = 8096;

const ESCAPE: [u8; 4] = [0x1b; 4];
const VERSION_1: [u8; 4] = [0x01; 4];
const END_MARKER: u8 = 0x1a;

enum Body {
    Complete,
    Discarded,
    EndOfInput,
}

/// Pulls complete transport frames out of a byte stream, one at a time.
pub struct FrameListener<R> {
    reader: BufReader<R>,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameListener<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buffer: Vec::with_capacity(512),
        }
    }

    /// Wait for the next complete frame, envelope included.
    ///
    /// The frame borrows the listener's buffer and is overwritten by the
    /// next call. Returns `Ok(None)` at end of input; a frame cut short by
    /// the end of input is dropped.
    pub async fn next_frame(&mut self) -> io::Result<Option<&[u8]>> {
        loop {
            if !self.sync_to_start().await? {
                return Ok(None);
            }
            match self.read_body().await? {
                Body::Complete => {
                    debug!("received frame of {} bytes", self.buffer.len());
                    return Ok(Some(self.buffer.as_slice()));
                }
                Body::Discarded => continue,
                Body::EndOfInput => return Ok(None),
            }
        }
    }

    /// Consume bytes until a start sequence has been read.
    async fn sync_to_start(&mut self) -> io::Result<bool> {
        let mut matched = 0;
        while matched < START_SEQUENCE.len() {
            let Some(byte) = self.read_byte().await? else {
                return Ok(false);
            };
            matched = match (byte, matched) {
                (0x1b, 0..=3) => matched + 1,
                (0x1b, 4) => 4,
                (0x1b, _) => 1,
                (0x01, 4..=7) => matched + 1,
                _ => 0,
            };
        }
        self.buffer.clear();
        self.buffer.extend_from_slice(&START_SEQUENCE);
        Ok(true)
    }

    async fn read_body(&mut self) -> io::Result<Body> {
        loop {
            if self.buffer.len() + 2 * ESCAPE.len() > MAX_FRAME_LEN {
                warn!("frame exceeds {MAX_FRAME_LEN} bytes, discarding");
                return Ok(Body::Discarded);
            }

            let Some(block) = self.read_block().await? else {
                debug!("input ended inside a frame");
                return Ok(Body::EndOfInput);
            };
            if block != ESCAPE {
                self.buffer.extend_from_slice(&block);
                continue;
            }

            let Some(next) = self.read_block().await? else {
                debug!("input ended inside a frame");
                return Ok(Body::EndOfInput);
            };
            if next[0] == END_MARKER {
                self.buffer.extend_from_slice(&ESCAPE);
                self.buffer.extend_from_slice(&next);
                return Ok(Body::Complete);
            } else if next == ESCAPE {
                self.buffer.extend_from_slice(&ESCAPE);
            } else if next == VERSION_1 {
                debug!("start sequence inside a frame, restarting");
                self.buffer.clear();
                self.buffer.extend_from_slice(&START_SEQUENCE);
            } else {
                warn!("unrecognized escape sequence {next:02x?}, resynchronizing");
                return Ok(Body::Discarded);
            }
        }
    }

    async fn read_byte(&mut self) -> io::Result<Option<u8>> {
        match self.reader.read_u8().await {
            Ok(byte) => Ok(Some(byte)),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn read_block(&mut self) -> io::Result<Option<[u8; 4]>> {
        let mut block = [0u8; 4];
        match self.reader.read_exact(&mut block).await {
            Ok(_) => Ok(Some(block)),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }
}
