//! Stream framing for the TCP transport
//!
//! Every message is a one-byte tag, a little-endian `u32` body length and the
//! body:
//!
//! ```text
//! DATA: u32 segment count, then per segment u32 length + bytes
//! INFO: u32 key length + key, u32 value length + value (UTF-8)
//! ```
//!
//! Readers skip bodies with an unknown tag, so newer peers can add message
//! kinds without breaking older ones.

use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::types::{FrameItem, MAX_SEGMENTS};

pub(crate) const TAG_DATA: u8 = 1;
pub(crate) const TAG_INFO: u8 = 2;

const HEADER_LEN: usize = 5;
/// Upper bound on a single message body, to stop a corrupt length from
/// allocating unbounded memory.
const MAX_BODY_LEN: usize = 256 * 1024 * 1024;

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Inbound {
    Data(FrameItem),
    Info { key: String, value: String },
    Unknown(u8),
    Malformed(String),
}

/// Encode a data message.
///
/// Fails with `InvalidInput` when the body would exceed the limit readers
/// enforce, since such a message would desynchronize the stream.
pub(crate) fn encode_data(frame: &FrameItem) -> io::Result<Vec<u8>> {
    let body_len = 4 + frame.segments().map(|s| 4 + s.len()).sum::<usize>();
    let mut out = Vec::with_capacity(HEADER_LEN + check_body_len(body_len)?);
    push_header(&mut out, TAG_DATA, body_len)?;
    out.extend_from_slice(&len_field(frame.count())?);
    for segment in frame.segments() {
        out.extend_from_slice(&len_field(segment.len())?);
        out.extend_from_slice(segment);
    }
    Ok(out)
}

pub(crate) fn encode_info(key: &str, value: &str) -> io::Result<Vec<u8>> {
    let body_len = 8 + key.len() + value.len();
    let mut out = Vec::with_capacity(HEADER_LEN + check_body_len(body_len)?);
    push_header(&mut out, TAG_INFO, body_len)?;
    for field in [key, value] {
        out.extend_from_slice(&len_field(field.len())?);
        out.extend_from_slice(field.as_bytes());
    }
    Ok(out)
}

pub(crate) fn write_message<W: Write>(writer: &mut W, message: &[u8]) -> io::Result<()> {
    writer.write_all(message)?;
    writer.flush()
}

fn check_body_len(body_len: usize) -> io::Result<usize> {
    if body_len > MAX_BODY_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("message body of {} bytes exceeds limit of {}", body_len, MAX_BODY_LEN),
        ));
    }
    Ok(body_len)
}

fn len_field(len: usize) -> io::Result<[u8; 4]> {
    u32::try_from(len)
        .map(u32::to_le_bytes)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("length {} does not fit in u32", len)))
}

fn push_header(out: &mut Vec<u8>, tag: u8, body_len: usize) -> io::Result<()> {
    out.push(tag);
    out.extend_from_slice(&len_field(check_body_len(body_len)?)?);
    Ok(())
}

/// Read the next message.
///
/// `Ok(None)` means the peer closed the stream. I/O errors and oversized
/// bodies are returned as errors since the stream can no longer be framed;
/// a well-framed body that fails to decode is reported as `Malformed`.
pub(crate) fn read_message<R: Read>(reader: &mut R) -> io::Result<Option<Inbound>> {
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let tag = header[0];
    let body_len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;
    if body_len > MAX_BODY_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message body of {} bytes exceeds limit", body_len),
        ));
    }

    let mut body = vec![0u8; body_len];
    reader.read_exact(&mut body)?;

    let inbound = match tag {
        TAG_DATA => match decode_data(&body) {
            Ok(frame) => Inbound::Data(frame),
            Err(reason) => Inbound::Malformed(reason),
        },
        TAG_INFO => match decode_info(&body) {
            Ok((key, value)) => Inbound::Info { key, value },
            Err(reason) => Inbound::Malformed(reason),
        },
        other => Inbound::Unknown(other),
    };
    Ok(Some(inbound))
}

struct Cursor<'a> {
    bytes: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], String> {
        if self.bytes.len() < n {
            return Err(format!("truncated {}: need {} bytes, have {}", what, n, self.bytes.len()));
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn u32(&mut self, what: &str) -> Result<usize, String> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize)
    }

    fn finish(&self) -> Result<(), String> {
        if self.bytes.is_empty() {
            Ok(())
        } else {
            Err(format!("{} trailing bytes", self.bytes.len()))
        }
    }
}

fn decode_data(body: &[u8]) -> Result<FrameItem, String> {
    let mut cursor = Cursor { bytes: body };
    let count = cursor.u32("segment count")?;
    // Zero segments is passed through; the pull side rejects it per frame.
    if count > MAX_SEGMENTS {
        return Err(format!("segment count {} exceeds limit of {}", count, MAX_SEGMENTS));
    }

    let mut segments: Vec<Arc<[u8]>> = Vec::with_capacity(count);
    for _ in 0..count {
        let len = cursor.u32("segment length")?;
        segments.push(Arc::from(cursor.take(len, "segment")?));
    }
    cursor.finish()?;

    Ok(FrameItem::from_segments(segments))
}

fn decode_info(body: &[u8]) -> Result<(String, String), String> {
    let mut cursor = Cursor { bytes: body };
    let key_len = cursor.u32("key length")?;
    let key = cursor.take(key_len, "key")?;
    let value_len = cursor.u32("value length")?;
    let value = cursor.take(value_len, "value")?;
    cursor.finish()?;

    let key = String::from_utf8(key.to_vec()).map_err(|_| "info key is not UTF-8".to_string())?;
    let value =
        String::from_utf8(value.to_vec()).map_err(|_| "info value is not UTF-8".to_string())?;
    Ok((key, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn read_all(mut bytes: &[u8]) -> Vec<Inbound> {
        let mut out = Vec::new();
        while let Some(message) = read_message(&mut bytes).unwrap() {
            out.push(message);
        }
        out
    }

    #[test]
    fn data_and_info_share_one_stream() {
        let frame = FrameItem::from_segments([vec![1u8, 2, 3, 4], vec![5u8; 8]]);
        let mut stream = encode_info("CAPS", "video/x-raw").unwrap();
        stream.extend(encode_data(&frame).unwrap());

        let messages = read_all(&stream);
        assert_eq!(
            messages,
            [
                Inbound::Info { key: "CAPS".into(), value: "video/x-raw".into() },
                Inbound::Data(frame),
            ]
        );
    }

    #[test]
    fn unknown_tags_are_skipped_without_losing_sync() {
        let mut stream = vec![0x7f, 3, 0, 0, 0, 0xaa, 0xbb, 0xcc];
        stream.extend(encode_data(&FrameItem::from_segments([vec![9u8]])).unwrap());

        let messages = read_all(&stream);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], Inbound::Unknown(0x7f));
        assert!(matches!(messages[1], Inbound::Data(_)));
    }

    #[test]
    fn bad_bodies_are_malformed() {
        // Claims two segments, carries one
        let body = [2u8, 0, 0, 0, 1, 0, 0, 0, 0xff];
        let mut stream = vec![TAG_DATA, body.len() as u8, 0, 0, 0];
        stream.extend_from_slice(&body);
        assert!(matches!(read_all(&stream)[0], Inbound::Malformed(_)));

        // Too many segments
        let body = 17u32.to_le_bytes();
        let mut stream = vec![TAG_DATA, 4, 0, 0, 0];
        stream.extend_from_slice(&body);
        assert!(matches!(read_all(&stream)[0], Inbound::Malformed(_)));
    }

    #[test]
    fn truncated_header_is_end_of_stream() {
        let stream = [TAG_DATA, 4, 0];
        assert!(read_message(&mut &stream[..]).unwrap().is_none());
    }

    #[test]
    fn oversized_body_is_an_error() {
        let stream = [TAG_DATA, 0xff, 0xff, 0xff, 0xff];
        assert!(read_message(&mut &stream[..]).is_err());
    }

    #[test]
    fn oversized_frames_are_rejected_at_encode() {
        // Shared segments keep the allocation small while the body passes the limit
        let segment: Arc<[u8]> = vec![0u8; MAX_BODY_LEN / 8].into();
        let frame = FrameItem::new(vec![segment; 9]);

        let err = encode_data(&frame).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    proptest! {
        #[test]
        fn prop_frames_survive_framing(
            segments in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..64), 1..=MAX_SEGMENTS)
        ) {
            let frame = FrameItem::from_segments(segments);
            let encoded = encode_data(&frame).unwrap();
            let decoded = read_message(&mut &encoded[..]).unwrap();
            prop_assert_eq!(decoded, Some(Inbound::Data(frame)));
        }
    }
}
