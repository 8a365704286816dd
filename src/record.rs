use anyhow::{anyhow, bail};
use bytes::{Buf, BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// The leading length / type byte of a record: values below [RecordKind::DATA_OFFSET] are control
///  opcodes, everything else is a data record with `value - DATA_OFFSET` payload bytes.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
pub enum RecordKind {
    /// no body - keepalive, and a nudge for the receiver to check for gaps
    Ping = 0,
    /// the sender closed its side of the stream
    Eof = 1,
    /// the sender considers the stream broken; nothing after this record is processed
    Corrupt = 2,
    /// request to re-send an inclusive range of message ids
    Request = 3,
    /// the inclusive range of message ids will never be re-sent
    Missing = 4,
}

impl RecordKind {
    pub const DATA_OFFSET: usize = 5;
}

/// Maximum encodable value of a record's length field
const MAX_LENGTH_FIELD: usize = 0x7fff;

/// Upper bound for the payload of a single data record
pub const MAX_PAYLOAD_LEN: usize = MAX_LENGTH_FIELD - RecordKind::DATA_OFFSET;

/// Length fields up to this value are encoded in a single byte
const MAX_SHORT_LENGTH_FIELD: usize = 0x7f;

/// Serialized size of a `Request` or `Missing` record
pub const RANGE_RECORD_LEN: usize = 5;

/// A single record inside a packet. Message ids are in their truncated on-the-wire form.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Record<'a> {
    Ping,
    Eof,
    Corrupt,
    Request { min: u16, max: u16 },
    Missing { min: u16, max: u16 },
    Data { id: u16, payload: &'a [u8] },
}

impl Record<'_> {
    /// The number of bytes this record occupies when serialized
    pub fn serialized_len(&self) -> usize {
        match self {
            Record::Ping | Record::Eof | Record::Corrupt => 1,
            Record::Request { .. } | Record::Missing { .. } => RANGE_RECORD_LEN,
            Record::Data { payload, .. } => data_record_len(payload.len()),
        }
    }

    /// NB: The caller is responsible for ensuring that a data payload does not exceed
    ///      [MAX_PAYLOAD_LEN]
    pub fn ser(&self, buf: &mut BytesMut) {
        match self {
            Record::Ping => buf.put_u8(RecordKind::Ping.into()),
            Record::Eof => buf.put_u8(RecordKind::Eof.into()),
            Record::Corrupt => buf.put_u8(RecordKind::Corrupt.into()),
            Record::Request { min, max } => {
                buf.put_u8(RecordKind::Request.into());
                buf.put_u16(*min);
                buf.put_u16(*max);
            }
            Record::Missing { min, max } => {
                buf.put_u8(RecordKind::Missing.into());
                buf.put_u16(*min);
                buf.put_u16(*max);
            }
            Record::Data { id, payload } => {
                debug_assert!(payload.len() <= MAX_PAYLOAD_LEN);

                let length_field = payload.len() + RecordKind::DATA_OFFSET;
                if length_field <= MAX_SHORT_LENGTH_FIELD {
                    buf.put_u8(length_field as u8);
                }
                else {
                    buf.put_u8(0x80 | ((length_field >> 8) & 0x7f) as u8);
                    buf.put_u8((length_field & 0xff) as u8);
                }
                buf.put_u16(*id);
                buf.put_slice(payload);
            }
        }
    }
}

/// The serialized size of a data record with a payload of the given length
pub fn data_record_len(payload_len: usize) -> usize {
    let header_len = if payload_len + RecordKind::DATA_OFFSET <= MAX_SHORT_LENGTH_FIELD { 1 } else { 2 };
    header_len + size_of::<u16>() + payload_len
}

/// Parses the records in a received buffer, in order.
///
/// Parsing stops after the first error (truncated or inconsistent record), and after a `Corrupt`
///  record since nothing following it is meaningful.
pub struct RecordReader<'a> {
    buf: &'a [u8],
    done: bool,
}

impl<'a> RecordReader<'a> {
    pub fn new(buf: &'a [u8]) -> RecordReader<'a> {
        RecordReader { buf, done: false }
    }

    fn try_next(&mut self) -> anyhow::Result<Record<'a>> {
        let first = self.buf.get_u8();
        let length_field = if first as usize > MAX_SHORT_LENGTH_FIELD {
            if !self.buf.has_remaining() {
                bail!("two-byte length field truncated after first byte {:#04x}", first);
            }
            ((first as usize) << 8 | self.buf.get_u8() as usize) & MAX_LENGTH_FIELD
        }
        else {
            first as usize
        };

        if length_field < RecordKind::DATA_OFFSET {
            let kind = RecordKind::try_from_primitive(length_field as u8)
                .map_err(|e| anyhow!("invalid record kind: {}", e))?;

            return match kind {
                RecordKind::Ping => Ok(Record::Ping),
                RecordKind::Eof => Ok(Record::Eof),
                RecordKind::Corrupt => Ok(Record::Corrupt),
                RecordKind::Request | RecordKind::Missing => {
                    if self.buf.remaining() < 2 * size_of::<u16>() {
                        bail!("{:?} record truncated: {} bytes remaining", kind, self.buf.remaining());
                    }
                    let min = self.buf.get_u16();
                    let max = self.buf.get_u16();
                    if kind == RecordKind::Request {
                        Ok(Record::Request { min, max })
                    }
                    else {
                        Ok(Record::Missing { min, max })
                    }
                }
            };
        }

        let payload_len = length_field - RecordKind::DATA_OFFSET;
        if self.buf.remaining() < size_of::<u16>() + payload_len {
            bail!("data record declares {} payload bytes, but only {} bytes remain", payload_len, self.buf.remaining());
        }

        let id = self.buf.get_u16();
        let (payload, rest) = self.buf.split_at(payload_len);
        self.buf = rest;
        Ok(Record::Data { id, payload })
    }
}

impl<'a> Iterator for RecordReader<'a> {
    type Item = anyhow::Result<Record<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.buf.is_empty() {
            return None;
        }

        let result = self.try_next();
        match &result {
            Err(_) | Ok(Record::Corrupt) => self.done = true,
            _ => {}
        }
        Some(result)
    }
}
