//! Per-frame decoding: strip the transport envelope, parse the SML file and
//! print every measurement entry.

use crate::output::EntryFormatter;
use crate::sml::{self, GetListResponse, MessageBody};
use crate::transport::ENVELOPE_LEN;
use log::debug;
use std::io::{self, Write};

/// Run-mode flags, fixed at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunMode {
    /// Stop after the first measurement list.
    pub single_shot: bool,
    /// Dump every parsed file before its entries.
    pub verbose: bool,
}

/// What the listen loop should do after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Turns frames into output lines.
pub struct Decoder<'a> {
    mode: RunMode,
    formatter: &'a dyn EntryFormatter,
}

impl<'a> Decoder<'a> {
    pub fn new(mode: RunMode, formatter: &'a dyn EntryFormatter) -> Self {
        Self { mode, formatter }
    }

    /// Decode one frame, envelope included.
    ///
    /// Readings go to `out`, per-frame and per-entry problems to `err`. Only
    /// write failures are returned as errors.
    pub fn on_frame(
        &self,
        frame: &[u8],
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> io::Result<Flow> {
        if frame.len() < 2 * ENVELOPE_LEN {
            writeln!(err, "error: frame of {} bytes is too short", frame.len())?;
            return Ok(Flow::Continue);
        }
        let payload = &frame[ENVELOPE_LEN..frame.len() - ENVELOPE_LEN];

        let file = match sml::parse_file(payload) {
            Ok(file) => file,
            Err(e) => {
                writeln!(err, "error: could not parse SML file: {e}")?;
                return Ok(Flow::Continue);
            }
        };

        if self.mode.verbose {
            writeln!(out, "{file:#?}")?;
            writeln!(out, "OBIS data #{}", file.messages.len())?;
        }

        for message in &file.messages {
            let MessageBody::GetListResponse(list) = &message.body else {
                debug!("ignoring message body {:#06x}", message.body.tag());
                continue;
            };

            self.write_list(list, out, err)?;

            if self.mode.single_shot {
                return Ok(Flow::Stop);
            }
        }

        Ok(Flow::Continue)
    }

    fn write_list(
        &self,
        list: &GetListResponse,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> io::Result<()> {
        for entry in &list.val_list {
            match self.formatter.format_entry(entry) {
                Ok(Some(line)) => {
                    writeln!(out, "{}", line.text)?;
                    if line.flush {
                        out.flush()?;
                    }
                }
                Ok(None) => {}
                Err(e) => writeln!(err, "{e}")?,
            }
        }

        match list.act_sensor_time {
            Some(time) => writeln!(out, "{}", self.formatter.format_sensor_time(time.counter())),
            None => writeln!(err, "Error in data stream. Sensor time is missing."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::text::TextFormatter;
    use crate::test_utils::{self, TestEntry};
    use crate::unit::DlmsUnits;

    fn decode(mode: RunMode, frame: &[u8]) -> (Flow, String, String) {
        let formatter = TextFormatter::new(DlmsUnits);
        let decoder = Decoder::new(mode, &formatter);
        let mut out = Vec::new();
        let mut err = Vec::new();
        let flow = decoder.on_frame(frame, &mut out, &mut err).unwrap();
        (
            flow,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    fn meter_frame() -> Vec<u8> {
        test_utils::frame(&[
            test_utils::open_response(),
            test_utils::get_list_response(
                &[
                    TestEntry::octets("129-129:199.130.3*255", b"ISK"),
                    TestEntry::octets("1-0:0.0.9*255", &test_utils::SERVER_ID),
                    TestEntry::unsigned("1-0:1.8.0*255", 123_456_789, Some(30), Some(-1)),
                    TestEntry::signed("1-0:16.7.0*255", -420, Some(27), Some(0)),
                    TestEntry::boolean("1-0:96.90.2*1", true),
                    TestEntry::list("1-0:96.5.0*255", &[test_utils::unsigned(1, 1)]),
                ],
                Some(1234567),
            ),
            test_utils::close_response(),
        ])
    }

    #[test]
    fn test_renders_entries_in_order() {
        let (flow, out, err) = decode(RunMode::default(), &meter_frame());
        assert_eq!(flow, Flow::Continue);
        assert_eq!(
            out,
            "129-129:199.130.3*255#ISK#\n\
             1-0:0.0.9*255#0a 01 49 53 4b 00 04 32 5e c5 #\n\
             1-0:1.8.0*255#12345678.9#Wh\n\
             1-0:16.7.0*255#-420#W\n\
             1-0:96.90.2*1#true#\n\
             act_sensor_time#1234567#\n"
        );
        assert!(err.is_empty());
    }

    #[test]
    fn test_hand_assembled_frame() {
        // one measurement list: 1-0:1.8.0*255 = 12345 * 10^-2 Wh, sensor time 42
        let frame = hex::decode(concat!(
            "1b1b1b1b01010101",
            "76050000000162006200726307017701070102030405060172620165",
            "0000002a7177070100010800ff0101621e52fe6500003039010101",
            "63123400",
            "00",
            "1b1b1b1b1a010000",
        ))
        .unwrap();

        let (_, out, err) = decode(RunMode::default(), &frame);
        assert_eq!(out, "1-0:1.8.0*255#123.45#Wh\nact_sensor_time#42#\n");
        assert!(err.is_empty());
    }

    #[test]
    fn test_missing_value_skips_only_that_entry() {
        let frame = test_utils::frame(&[test_utils::get_list_response(
            &[
                TestEntry::unsigned("1-0:1.8.0*255", 100, Some(30), None),
                TestEntry::missing("1-0:2.8.0*255"),
                TestEntry::unsigned("1-0:16.7.0*255", 26, Some(27), None),
            ],
            Some(5),
        )]);

        let (flow, out, err) = decode(RunMode::default(), &frame);
        assert_eq!(flow, Flow::Continue);
        assert_eq!(
            out,
            "1-0:1.8.0*255#100#Wh\n1-0:16.7.0*255#26#W\nact_sensor_time#5#\n"
        );
        assert_eq!(
            err,
            "Error in data stream. Entry value is missing. Skipping this.\n"
        );
    }

    #[test]
    fn test_single_shot_stops_after_first_list() {
        let frame = test_utils::frame(&[
            test_utils::get_list_response(
                &[TestEntry::unsigned("1-0:1.8.0*255", 1, None, None)],
                Some(1),
            ),
            test_utils::get_list_response(
                &[TestEntry::unsigned("1-0:2.8.0*255", 2, None, None)],
                Some(2),
            ),
        ]);

        let single = RunMode {
            single_shot: true,
            verbose: false,
        };
        let (flow, out, _) = decode(single, &frame);
        assert_eq!(flow, Flow::Stop);
        assert_eq!(out, "1-0:1.8.0*255#1#\nact_sensor_time#1#\n");

        let (flow, out, _) = decode(RunMode::default(), &frame);
        assert_eq!(flow, Flow::Continue);
        assert_eq!(out.lines().count(), 4);
    }

    #[test]
    fn test_single_shot_ignores_frames_without_list() {
        let frame = test_utils::frame(&[test_utils::open_response(), test_utils::close_response()]);
        let single = RunMode {
            single_shot: true,
            verbose: false,
        };
        let (flow, out, err) = decode(single, &frame);
        assert_eq!(flow, Flow::Continue);
        assert!(out.is_empty());
        assert!(err.is_empty());
    }

    #[test]
    fn test_parse_failure_is_reported() {
        let mut frame = test_utils::frame(&[]);
        frame.splice(8..8, [0x76, 0x05, 0x00, 0x00]);

        let (flow, out, err) = decode(RunMode::default(), &frame);
        assert_eq!(flow, Flow::Continue);
        assert!(out.is_empty());
        assert!(err.starts_with("error: could not parse SML file"));
    }

    #[test]
    fn test_short_frame_is_reported() {
        let (flow, out, err) = decode(RunMode::default(), &[0x1b; 12]);
        assert_eq!(flow, Flow::Continue);
        assert!(out.is_empty());
        assert!(err.contains("too short"));
    }

    #[test]
    fn test_missing_sensor_time() {
        let frame = test_utils::frame(&[test_utils::get_list_response(
            &[TestEntry::boolean("1-0:96.90.2*1", false)],
            None,
        )]);

        let (_, out, err) = decode(RunMode::default(), &frame);
        assert_eq!(out, "1-0:96.90.2*1#false#\n");
        assert_eq!(err, "Error in data stream. Sensor time is missing.\n");
    }

    #[test]
    fn test_verbose_dumps_file() {
        let verbose = RunMode {
            single_shot: false,
            verbose: true,
        };
        let (_, out, _) = decode(verbose, &meter_frame());
        assert!(out.contains("GetListResponse"));
        assert!(out.contains("0a0149534b0004325ec5"));
        assert!(out.contains("OBIS data #3\n"));
        assert!(out.ends_with("act_sensor_time#1234567#\n"));
    }
}
