//! Minimal NDEF wire model: just enough framing to size, store, and reload
//! the single-record messages this system exchanges with tags.

use thiserror::Error;

/// Capability reported by a tag when its NDEF status is queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagStatus {
    NotSupported,
    ReadOnly,
    ReadWrite,
}

/// NDEF type name format (low three bits of the record flag byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeNameFormat {
    Empty,
    WellKnown,
    Media,
    AbsoluteUri,
    External,
    Unknown,
}

impl TypeNameFormat {
    pub fn value(self) -> u8 {
        match self {
            Self::Empty => 0x00,
            Self::WellKnown => 0x01,
            Self::Media => 0x02,
            Self::AbsoluteUri => 0x03,
            Self::External => 0x04,
            Self::Unknown => 0x05,
        }
    }

    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Empty),
            0x01 => Some(Self::WellKnown),
            0x02 => Some(Self::Media),
            0x03 => Some(Self::AbsoluteUri),
            0x04 => Some(Self::External),
            0x05 => Some(Self::Unknown),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum NdefError {
    #[error("truncated NDEF message")]
    Truncated,
    #[error("unsupported type name format {0:#04x}")]
    UnsupportedFormat(u8),
    #[error("chunked NDEF records are not supported")]
    Chunked,
    #[error("record type of {0} bytes exceeds the 255 byte field limit")]
    TypeTooLong(usize),
    #[error("record identifier of {0} bytes exceeds the 255 byte field limit")]
    IdentifierTooLong(usize),
    #[error("record payload of {0} bytes exceeds the 4 GiB field limit")]
    PayloadTooLarge(usize),
}

const FLAG_MESSAGE_BEGIN: u8 = 0x80;
const FLAG_MESSAGE_END: u8 = 0x40;
const FLAG_CHUNK: u8 = 0x20;
const FLAG_SHORT_RECORD: u8 = 0x10;
const FLAG_ID_LENGTH: u8 = 0x08;
const FORMAT_MASK: u8 = 0x07;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdefRecord {
    pub format: TypeNameFormat,
    pub record_type: Vec<u8>,
    pub identifier: Vec<u8>,
    pub payload: Vec<u8>,
}

impl NdefRecord {
    /// An application-defined payload: `Unknown` format, no type, no
    /// identifier. This is the only record shape the controller writes.
    pub fn unknown(payload: Vec<u8>) -> Self {
        Self {
            format: TypeNameFormat::Unknown,
            record_type: Vec::new(),
            identifier: Vec::new(),
            payload,
        }
    }

    fn is_short(&self) -> bool {
        self.payload.len() < 256
    }

    /// The length fields are one byte for type and identifier and at most
    /// four bytes for the payload; anything larger cannot be framed.
    fn check_bounds(&self) -> Result<(), NdefError> {
        if self.record_type.len() > u8::MAX as usize {
            return Err(NdefError::TypeTooLong(self.record_type.len()));
        }
        if self.identifier.len() > u8::MAX as usize {
            return Err(NdefError::IdentifierTooLong(self.identifier.len()));
        }
        if self.payload.len() > u32::MAX as usize {
            return Err(NdefError::PayloadTooLarge(self.payload.len()));
        }
        Ok(())
    }

    /// Wire size of this record: flags + type length + payload length field
    /// (1 byte for short records, 4 otherwise) + identifier length byte when
    /// an identifier is present + the three variable fields themselves.
    pub fn encoded_len(&self) -> usize {
        let payload_len_field = if self.is_short() { 1 } else { 4 };
        let id_len_field = if self.identifier.is_empty() { 0 } else { 1 };
        2 + payload_len_field
            + id_len_field
            + self.record_type.len()
            + self.identifier.len()
            + self.payload.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NdefMessage {
    pub records: Vec<NdefRecord>,
}

impl NdefMessage {
    pub fn new(records: Vec<NdefRecord>) -> Self {
        Self { records }
    }

    /// Total wire size, the value compared against a tag's capacity.
    pub fn encoded_len(&self) -> usize {
        self.records.iter().map(NdefRecord::encoded_len).sum()
    }

    pub fn encode(&self) -> Result<Vec<u8>, NdefError> {
        let mut out = Vec::with_capacity(self.encoded_len());
        let last = self.records.len().saturating_sub(1);
        for (index, record) in self.records.iter().enumerate() {
            record.check_bounds()?;
            let mut flags = record.format.value();
            if index == 0 {
                flags |= FLAG_MESSAGE_BEGIN;
            }
            if index == last {
                flags |= FLAG_MESSAGE_END;
            }
            if record.is_short() {
                flags |= FLAG_SHORT_RECORD;
            }
            if !record.identifier.is_empty() {
                flags |= FLAG_ID_LENGTH;
            }
            out.push(flags);
            out.push(record.record_type.len() as u8);
            if record.is_short() {
                out.push(record.payload.len() as u8);
            } else {
                out.extend_from_slice(&(record.payload.len() as u32).to_be_bytes());
            }
            if !record.identifier.is_empty() {
                out.push(record.identifier.len() as u8);
            }
            out.extend_from_slice(&record.record_type);
            out.extend_from_slice(&record.identifier);
            out.extend_from_slice(&record.payload);
        }
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, NdefError> {
        let mut records = Vec::new();
        let mut rest = bytes;

        while !rest.is_empty() {
            let flags = rest[0];
            if flags & FLAG_CHUNK != 0 {
                return Err(NdefError::Chunked);
            }
            let format = TypeNameFormat::from_value(flags & FORMAT_MASK)
                .ok_or(NdefError::UnsupportedFormat(flags & FORMAT_MASK))?;
            let short = flags & FLAG_SHORT_RECORD != 0;
            let has_id = flags & FLAG_ID_LENGTH != 0;
            rest = &rest[1..];

            let type_len = *rest.first().ok_or(NdefError::Truncated)? as usize;
            rest = &rest[1..];

            let payload_len = if short {
                let len = *rest.first().ok_or(NdefError::Truncated)? as usize;
                rest = &rest[1..];
                len
            } else {
                if rest.len() < 4 {
                    return Err(NdefError::Truncated);
                }
                let len = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
                rest = &rest[4..];
                len
            };

            let id_len = if has_id {
                let len = *rest.first().ok_or(NdefError::Truncated)? as usize;
                rest = &rest[1..];
                len
            } else {
                0
            };

            if rest.len() < type_len + id_len + payload_len {
                return Err(NdefError::Truncated);
            }
            let (record_type, after_type) = rest.split_at(type_len);
            let (identifier, after_id) = after_type.split_at(id_len);
            let (payload, after_payload) = after_id.split_at(payload_len);
            rest = after_payload;

            records.push(NdefRecord {
                format,
                record_type: record_type.to_vec(),
                identifier: identifier.to_vec(),
                payload: payload.to_vec(),
            });
        }

        Ok(Self { records })
    }
}
