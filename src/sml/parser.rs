use super::*;
use log::{debug, warn};

const OPTIONAL_SKIPPED: u8 = 0x01;
const END_OF_MESSAGE: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    OctetString,
    Boolean,
    Integer,
    Unsigned,
    List,
}

/// A decoded type-length field. For lists `len` counts elements, for every
/// other type it counts payload bytes.
struct TypeLength {
    kind: Kind,
    len: usize,
}

/// Parse an SML file from a frame payload (transport envelope already removed).
///
/// Zero padding between and after messages is skipped. When a later message
/// is malformed the messages read so far are kept.
pub fn parse_file(payload: &[u8]) -> Result<SmlFile, ParseError> {
    debug!("parsing SML file of {} bytes", payload.len());

    let mut parser = Parser::new(payload);
    let mut messages = Vec::new();

    while let Some(byte) = parser.peek() {
        if byte == END_OF_MESSAGE {
            parser.pos += 1;
            continue;
        }
        match parser.message() {
            Ok(message) => messages.push(message),
            Err(e) if messages.is_empty() => return Err(e),
            Err(e) => {
                warn!("could not read the whole SML file: {e}");
                break;
            }
        }
    }

    Ok(SmlFile { messages })
}

struct Parser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn next_byte(&mut self) -> Result<u8, ParseError> {
        let byte = self.peek().ok_or(ParseError::UnexpectedEnd(self.pos))?;
        self.pos += 1;
        Ok(byte)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(ParseError::UnexpectedEnd(self.pos))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    // Messages

    fn message(&mut self) -> Result<Message, ParseError> {
        self.list(6)?;
        let transaction_id = self.octet_string()?;
        let group_no = self.unsigned_as()?;
        let abort_on_error = self.unsigned_as()?;
        let body = self.message_body()?;
        let crc = self.unsigned_as()?;
        if self.peek() == Some(END_OF_MESSAGE) {
            self.pos += 1;
        }

        Ok(Message {
            transaction_id,
            group_no,
            abort_on_error,
            body,
            crc,
        })
    }

    fn message_body(&mut self) -> Result<MessageBody, ParseError> {
        self.list(2)?;
        let tag: u32 = self.unsigned_as()?;

        let body = match tag {
            OPEN_RESPONSE => MessageBody::OpenResponse(self.open_response()?),
            CLOSE_RESPONSE => MessageBody::CloseResponse(self.close_response()?),
            GET_LIST_RESPONSE => MessageBody::GetListResponse(self.get_list_response()?),
            ATTENTION_RESPONSE => MessageBody::AttentionResponse(self.attention_response()?),
            _ => {
                debug!("skipping SML message body {tag:#06x}");
                self.skip()?;
                MessageBody::Other { tag }
            }
        };

        Ok(body)
    }

    fn open_response(&mut self) -> Result<OpenResponse, ParseError> {
        self.list(6)?;
        Ok(OpenResponse {
            codepage: self.optional(Self::octet_string)?,
            client_id: self.optional(Self::octet_string)?,
            req_file_id: self.octet_string()?,
            server_id: self.octet_string()?,
            ref_time: self.optional(Self::time)?,
            sml_version: self.optional(Self::unsigned_as::<u8>)?,
        })
    }

    fn close_response(&mut self) -> Result<CloseResponse, ParseError> {
        self.list(1)?;
        Ok(CloseResponse {
            global_signature: self.optional(Self::octet_string)?,
        })
    }

    fn get_list_response(&mut self) -> Result<GetListResponse, ParseError> {
        self.list(7)?;
        Ok(GetListResponse {
            client_id: self.optional(Self::octet_string)?,
            server_id: self.octet_string()?,
            list_name: self.optional(Self::octet_string)?,
            act_sensor_time: self.optional(Self::time)?,
            val_list: self.val_list()?,
            list_signature: self.optional(Self::octet_string)?,
            act_gateway_time: self.optional(Self::time)?,
        })
    }

    fn attention_response(&mut self) -> Result<AttentionResponse, ParseError> {
        self.list(4)?;
        let response = AttentionResponse {
            server_id: self.octet_string()?,
            attention_no: self.octet_string()?,
            attention_msg: self.optional(Self::octet_string)?,
        };
        // attention details are a parameter tree nobody here reads
        if !self.skipped() {
            self.skip()?;
        }
        Ok(response)
    }

    fn val_list(&mut self) -> Result<Vec<ListEntry>, ParseError> {
        let len = self.expect(Kind::List, "a value list")?;
        (0..len).map(|_| self.list_entry()).collect()
    }

    fn list_entry(&mut self) -> Result<ListEntry, ParseError> {
        self.list(7)?;
        Ok(ListEntry {
            obj_name: self.octet_string()?,
            status: self.optional(Self::unsigned_as::<u64>)?,
            val_time: self.optional(Self::time)?,
            unit: self.optional(Self::unsigned_as::<u8>)?,
            scaler: self.optional(Self::integer_as::<i8>)?,
            value: self.optional(Self::value)?,
            value_signature: self.optional(Self::octet_string)?,
        })
    }

    fn time(&mut self) -> Result<Time, ParseError> {
        let offset = self.pos;
        let tl = self.type_length()?;
        match tl.kind {
            // some meters send the seconds index without the choice wrapper
            Kind::Unsigned => {
                let secs = self.unsigned_bytes(tl.len)?;
                u32::try_from(secs)
                    .map(Time::SecIndex)
                    .map_err(|_| ParseError::IntegerWidth(tl.len))
            }
            Kind::List if tl.len == 2 => match self.unsigned_as::<u8>()? {
                1 => Ok(Time::SecIndex(self.unsigned_as()?)),
                2 => Ok(Time::Timestamp(self.unsigned_as()?)),
                3 => {
                    self.list(3)?;
                    Ok(Time::LocalTimestamp {
                        timestamp: self.unsigned_as()?,
                        local_offset: self.integer_as()?,
                        season_offset: self.integer_as()?,
                    })
                }
                other => Err(ParseError::TimeVariant(other)),
            },
            Kind::List => Err(ParseError::ListLength {
                expected: 2,
                found: tl.len,
                offset,
            }),
            _ => Err(ParseError::UnexpectedType {
                expected: "an SML time",
                offset,
            }),
        }
    }

    // Primitives

    fn type_length(&mut self) -> Result<TypeLength, ParseError> {
        let offset = self.pos;
        let first = self.next_byte()?;

        let kind = match (first >> 4) & 0x07 {
            0x0 => Kind::OctetString,
            0x4 => Kind::Boolean,
            0x5 => Kind::Integer,
            0x6 => Kind::Unsigned,
            0x7 => Kind::List,
            field => return Err(ParseError::UnknownType { field, offset }),
        };

        let mut len = usize::from(first & 0x0F);
        let mut tl_bytes = 1;
        let mut more = first & 0x80 != 0;
        while more {
            let byte = self.next_byte()?;
            len = (len << 4) | usize::from(byte & 0x0F);
            more = byte & 0x80 != 0;
            tl_bytes += 1;
        }

        if kind != Kind::List {
            len = len
                .checked_sub(tl_bytes)
                .ok_or(ParseError::UnexpectedType {
                    expected: "a length covering its type-length field",
                    offset,
                })?;
        }

        Ok(TypeLength { kind, len })
    }

    fn expect(&mut self, kind: Kind, expected: &'static str) -> Result<usize, ParseError> {
        let offset = self.pos;
        let tl = self.type_length()?;
        if tl.kind != kind {
            return Err(ParseError::UnexpectedType { expected, offset });
        }
        Ok(tl.len)
    }

    fn list(&mut self, expected: usize) -> Result<(), ParseError> {
        let offset = self.pos;
        let found = self.expect(Kind::List, "a list")?;
        if found != expected {
            return Err(ParseError::ListLength {
                expected,
                found,
                offset,
            });
        }
        Ok(())
    }

    fn skipped(&mut self) -> bool {
        if self.peek() == Some(OPTIONAL_SKIPPED) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn optional<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<Option<T>, ParseError> {
        if self.skipped() {
            Ok(None)
        } else {
            parse(self).map(Some)
        }
    }

    fn octet_string(&mut self) -> Result<OctetString, ParseError> {
        let len = self.expect(Kind::OctetString, "an octet string")?;
        Ok(OctetString(self.take(len)?.to_vec()))
    }

    fn unsigned_as<T: TryFrom<u64>>(&mut self) -> Result<T, ParseError> {
        let len = self.expect(Kind::Unsigned, "an unsigned integer")?;
        let value = self.unsigned_bytes(len)?;
        T::try_from(value).map_err(|_| ParseError::IntegerWidth(len))
    }

    fn integer_as<T: TryFrom<i64>>(&mut self) -> Result<T, ParseError> {
        let len = self.expect(Kind::Integer, "a signed integer")?;
        let value = self.integer_bytes(len)?;
        T::try_from(value).map_err(|_| ParseError::IntegerWidth(len))
    }

    fn unsigned_bytes(&mut self, len: usize) -> Result<u64, ParseError> {
        if !(1..=8).contains(&len) {
            return Err(ParseError::IntegerWidth(len));
        }
        let bytes = self.take(len)?;
        Ok(bytes.iter().fold(0, |acc, &b| (acc << 8) | u64::from(b)))
    }

    fn integer_bytes(&mut self, len: usize) -> Result<i64, ParseError> {
        if !(1..=8).contains(&len) {
            return Err(ParseError::IntegerWidth(len));
        }
        let bytes = self.take(len)?;
        let sign: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
        Ok(bytes.iter().fold(sign, |acc, &b| (acc << 8) | i64::from(b)))
    }

    fn value(&mut self) -> Result<Value, ParseError> {
        let offset = self.pos;
        let tl = self.type_length()?;
        match tl.kind {
            Kind::OctetString => Ok(Value::OctetString(OctetString(self.take(tl.len)?.to_vec()))),
            Kind::Boolean => {
                if tl.len != 1 {
                    return Err(ParseError::UnexpectedType {
                        expected: "a one-byte boolean",
                        offset,
                    });
                }
                Ok(Value::Boolean(self.next_byte()? != 0))
            }
            Kind::Integer => Ok(Value::Integer(self.integer_bytes(tl.len)?)),
            Kind::Unsigned => Ok(Value::Unsigned(self.unsigned_bytes(tl.len)?)),
            Kind::List => (0..tl.len)
                .map(|_| self.value())
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
        }
    }

    fn skip(&mut self) -> Result<(), ParseError> {
        let tl = self.type_length()?;
        if tl.kind == Kind::List {
            for _ in 0..tl.len {
                self.skip()?;
            }
        } else {
            self.take(tl.len)?;
        }
        Ok(())
    }
}
