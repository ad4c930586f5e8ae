//! Byte-exact binary frame for one envelope.
//!
//! Layout, in order: u32 total frame length (includes any caller-reserved
//! leading bytes), i64 timestamp in 100 ns file-time ticks, i16 timezone
//! offset minutes, u8 level, u16 flags, u8 queue priority, u8 string field
//! count, u32 binary payload length, the length-prefixed UTF-8 string
//! fields, then the binary payload. Every integer is little-endian except
//! the flags field, which deployed peers read high byte first.
//!
//! The return route is not part of the field table: it only matters to the
//! node holding the envelope and is recomputed hop by hop.
//!
//! Encoding and decoding are pure and stateless; safe for unlimited
//! concurrent use.

use time::{OffsetDateTime, UtcOffset};

use crate::envelope::{Envelope, EnvelopeFlags, Level};
use crate::error::ProtoError;

/// Fixed string field table: Text, PayloadText, OriginChain, EngineName,
/// SerialId, ScopeIdScrambled, SessionId, UserId, CostingHistory, Owner.
pub const STRING_FIELD_COUNT: u8 = 10;

/// 100 ns ticks between 1601-01-01 and 1970-01-01.
const FILE_TIME_UNIX_DIFF: i128 = 116_444_736_000_000_000;

/// Serialize an envelope, reserving `reserve` leading bytes the caller may
/// use for outer framing. The total length written includes the reserve.
pub fn encode(envelope: &Envelope, reserve: usize) -> Result<Vec<u8>, ProtoError> {
    let mut out = vec![0u8; reserve];
    out.extend_from_slice(&[0u8; 4]);

    out.extend_from_slice(&file_time_ticks(&envelope.timestamp)?.to_le_bytes());
    out.extend_from_slice(&envelope.timestamp.offset().whole_minutes().to_le_bytes());
    out.push(envelope.level.to_wire());
    // Flags travel high byte first; everything else is little-endian.
    out.extend_from_slice(&envelope.flags.bits().to_be_bytes());
    out.push(envelope.queue_priority);
    out.push(STRING_FIELD_COUNT);

    let payload_len = envelope.payload_binary.as_ref().map_or(0, Vec::len);
    let payload_len = u32::try_from(payload_len)
        .map_err(|_| ProtoError::Encode("binary payload too large".into()))?;
    out.extend_from_slice(&payload_len.to_le_bytes());

    for field in string_fields(envelope) {
        let len = u32::try_from(field.len())
            .map_err(|_| ProtoError::Encode("string field too large".into()))?;
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(field.as_bytes());
    }

    if let Some(payload) = &envelope.payload_binary {
        out.extend_from_slice(payload);
    }

    let total = u32::try_from(out.len())
        .map_err(|_| ProtoError::Encode("frame too large".into()))?;
    out[reserve..reserve + 4].copy_from_slice(&total.to_le_bytes());
    Ok(out)
}

/// Deserialize a frame produced by [`encode`] with the same `reserve`.
///
/// A total length that disagrees with the actual buffer length is the one
/// fatal framing error; the transport is expected to resync on it.
pub fn decode(buffer: &[u8], reserve: usize) -> Result<Envelope, ProtoError> {
    let mut reader = Reader { buffer, position: reserve };

    let total = reader.u32()?;
    if total as usize != buffer.len() {
        return Err(ProtoError::Frame(format!(
            "declared frame length {total} does not match buffer length {}",
            buffer.len()
        )));
    }

    let ticks = reader.i64()?;
    let tz_minutes = reader.i16()?;
    let level = Level::from_wire(reader.u8()?);
    let flags = EnvelopeFlags::from_bits(u16::from_be_bytes(reader.array()?));
    let queue_priority = reader.u8()?;
    let field_count = reader.u8()?;
    let payload_len = reader.u32()? as usize;

    let mut fields = Vec::with_capacity(usize::from(field_count));
    for _ in 0..field_count {
        let len = reader.u32()? as usize;
        let bytes = reader.take(len)?;
        let value = std::str::from_utf8(bytes)
            .map_err(|err| ProtoError::Decode(format!("string field not utf-8: {err}")))?;
        fields.push(value.to_owned());
    }

    let payload_binary = if payload_len > 0 {
        Some(reader.take(payload_len)?.to_vec())
    } else {
        None
    };

    let mut fields = fields.into_iter();
    let mut next = || fields.next().unwrap_or_default();

    let mut envelope = Envelope::unstamped();
    envelope.timestamp = timestamp_from_ticks(ticks, tz_minutes)?;
    envelope.level = level;
    envelope.flags = flags;
    envelope.queue_priority = queue_priority;
    envelope.payload_binary = payload_binary;
    envelope.text = next();
    envelope.payload_text = next();
    envelope.origin_chain = next();
    envelope.engine_name = next();
    envelope.serial_id = next();
    envelope.scope_id_scrambled = next();
    envelope.session_id = next();
    envelope.user_id = next();
    envelope.costing_history = next();
    envelope.owner = next();
    Ok(envelope)
}

fn string_fields(envelope: &Envelope) -> [&str; STRING_FIELD_COUNT as usize] {
    [
        &envelope.text,
        &envelope.payload_text,
        &envelope.origin_chain,
        &envelope.engine_name,
        &envelope.serial_id,
        &envelope.scope_id_scrambled,
        &envelope.session_id,
        &envelope.user_id,
        &envelope.costing_history,
        &envelope.owner,
    ]
}

fn file_time_ticks(timestamp: &OffsetDateTime) -> Result<i64, ProtoError> {
    let ticks = timestamp.unix_timestamp_nanos() / 100 + FILE_TIME_UNIX_DIFF;
    i64::try_from(ticks).map_err(|_| ProtoError::Encode("timestamp out of range".into()))
}

fn timestamp_from_ticks(ticks: i64, tz_minutes: i16) -> Result<OffsetDateTime, ProtoError> {
    let nanos = (i128::from(ticks) - FILE_TIME_UNIX_DIFF) * 100;
    let utc = OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .map_err(|err| ProtoError::Decode(format!("timestamp out of range: {err}")))?;
    let offset = UtcOffset::from_whole_seconds(i32::from(tz_minutes) * 60)
        .map_err(|err| ProtoError::Decode(format!("timezone offset out of range: {err}")))?;
    Ok(utc.to_offset(offset))
}

struct Reader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], ProtoError> {
        let end = self
            .position
            .checked_add(len)
            .filter(|&end| end <= self.buffer.len())
            .ok_or_else(|| ProtoError::Decode("truncated frame".into()))?;
        let slice = &self.buffer[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ProtoError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, ProtoError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, ProtoError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn i16(&mut self) -> Result<i16, ProtoError> {
        Ok(i16::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, ProtoError> {
        Ok(i64::from_le_bytes(self.array()?))
    }
}
