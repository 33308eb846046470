//! Core application runner for `sml-listener`.
//!
//! Argument handling and the listen loop live here, apart from process exit,
//! so they can be tested with in-memory streams.

use crate::channel::{self, ChannelError, LinePolicy};
use crate::decoder::{Decoder, Flow, RunMode};
use crate::output::EntryFormatter;
use crate::output::text::TextFormatter;
use crate::transport::FrameListener;
use crate::unit::DlmsUnits;
use clap::Parser;
use clap::error::ErrorKind;
use log::debug;
use std::ffi::OsString;
use std::io::{self, Write};
use thiserror::Error;
use tokio::io::AsyncRead;

/// Exit codes for the application
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_ERROR: i32 = 1;

/// Command line options.
#[derive(Parser, Debug, Clone)]
#[command(about, version)]
pub struct Options {
    /// Single shot mode, print one measurement list and exit
    #[arg(short = 's', long = "single")]
    pub single: bool,

    /// Verbose output, dump every parsed SML file
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Exit if the serial line cannot be switched to raw 9600 8N1
    #[arg(long)]
    pub strict_line: bool,

    /// Serial device the meter is connected to, e.g. /dev/ttyUSB0.
    /// Use - to read from stdin.
    #[arg(value_name = "DEVICE")]
    pub devices: Vec<String>,
}

impl Options {
    pub fn mode(&self) -> RunMode {
        RunMode {
            single_shot: self.single,
            verbose: self.verbose,
        }
    }

    pub fn line_policy(&self) -> LinePolicy {
        if self.strict_line {
            LinePolicy::Strict
        } else {
            LinePolicy::Degraded
        }
    }

    pub fn device(&self) -> &str {
        self.devices.first().map(String::as_str).unwrap_or_default()
    }
}

/// Result of argument parsing.
#[derive(Debug)]
pub enum ArgsOutcome {
    /// Arguments are valid, start listening.
    Run(Options),
    /// Print `message` to stdout (and `diagnostic` to stderr) and exit with `code`.
    Exit {
        code: i32,
        message: String,
        diagnostic: Option<String>,
    },
}

/// Parse the full argument vector, program name included.
pub fn parse_args<I, T>(args: I) -> ArgsOutcome
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    let program = args
        .first()
        .map(|arg| arg.to_string_lossy().into_owned())
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());
    let hint = format!("Use {program} -h for help.");

    let options = match Options::try_parse_from(&args) {
        Ok(options) => options,
        Err(e) => {
            let rendered = e.render().to_string().trim_end().to_string();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ArgsOutcome::Exit {
                    code: EXIT_SUCCESS,
                    message: rendered,
                    diagnostic: None,
                },
                _ => ArgsOutcome::Exit {
                    code: EXIT_ERROR,
                    message: hint,
                    diagnostic: Some(rendered),
                },
            };
        }
    };

    if options.devices.len() != 1 {
        return ArgsOutcome::Exit {
            code: EXIT_ERROR,
            message: format!("error: Arguments mismatch.\n{hint}"),
            diagnostic: None,
        };
    }

    ArgsOutcome::Run(options)
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Listen on `channel` until it ends or single-shot mode is satisfied.
///
/// Readings and verbose dumps go to `out`, data stream problems to `err`.
/// Frames are decoded one at a time in arrival order.
pub async fn run_with_io<R: AsyncRead + Unpin>(
    mode: RunMode,
    channel: R,
    formatter: &dyn EntryFormatter,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<(), RunError> {
    let decoder = Decoder::new(mode, formatter);
    let mut listener = FrameListener::new(channel);

    while let Some(frame) = listener.next_frame().await? {
        if decoder.on_frame(frame, out, err)? == Flow::Stop {
            debug!("single shot done");
            break;
        }
    }

    out.flush()?;
    Ok(())
}

/// Open the configured device and listen on it, printing to stdout/stderr.
pub async fn run(options: &Options) -> Result<(), RunError> {
    let channel = channel::open_channel(options.device(), options.line_policy())?;
    let formatter = TextFormatter::new(DlmsUnits);

    let stdout = io::stdout();
    let stderr = io::stderr();
    run_with_io(
        options.mode(),
        channel,
        &formatter,
        &mut stdout.lock(),
        &mut stderr.lock(),
    )
    .await
}
