use std::io::Write;

use crate::{
    buffer::{BufWriter, Buffer},
    codec::consts::{keys, RequestType},
    errors::EncodingError,
};

mod call;
mod delete;
mod insert;
mod ping;
mod replace;
mod select;
mod update;
mod upsert;

pub(crate) use self::{
    call::Call, delete::Delete, insert::Insert, ping::Ping, replace::Replace, select::Select,
    update::Update, upsert::Upsert,
};

/// Every packet starts with the frame length encoded as a fixed-width
/// `uint32` so it can be reserved up front and patched after the body.
const SIZE_PREFIX_LEN: usize = 5;

/// Body of an IPROTO request.
pub trait Request {
    /// Type of this request.
    fn request_type() -> RequestType
    where
        Self: Sized;

    /// Encode body into MessagePack and write it to provided [`Write`].
    fn encode_body(&self, buf: &mut dyn Write) -> Result<(), EncodingError>;
}

/// Encode a complete request frame into the output buffer.
///
/// Reserves the 5-byte size prefix, emits `header` + `body` maps behind it
/// and back-fills the prefix with the payload length. If a body encoder
/// fails, everything written for this request is dropped again so the
/// buffer never carries a torn frame.
pub(crate) fn encode_request<R: Request>(
    out: &mut Buffer,
    sync: u64,
    schema_version: Option<u32>,
    body: &R,
) -> Result<(), EncodingError> {
    let frame_start = out.end();
    let prefix = out.append_back(SIZE_PREFIX_LEN);

    match encode_frame(out, sync, schema_version, body) {
        Ok(()) => {
            let end = out.end();
            let payload = out.distance(&prefix, &end) - SIZE_PREFIX_LEN;
            out.release_iter(end);

            let mut patch = [0u8; SIZE_PREFIX_LEN];
            patch[0] = rmp::Marker::U32.to_u8();
            patch[1..].copy_from_slice(&(payload as u32).to_be_bytes());
            out.set(&prefix, &patch);

            out.release_iter(prefix);
            out.release_iter(frame_start);
            Ok(())
        }
        Err(err) => {
            let end = out.end();
            let written = out.distance(&frame_start, &end);
            out.release_iter(end);
            out.release_iter(prefix);
            if written > 0 {
                out.drop_back(written);
            }
            out.release_iter(frame_start);
            Err(err)
        }
    }
}

fn encode_frame<R: Request>(
    out: &mut Buffer,
    sync: u64,
    schema_version: Option<u32>,
    body: &R,
) -> Result<(), EncodingError> {
    let mut w = BufWriter::new(out);
    let map_len = if schema_version.is_some() { 3 } else { 2 };
    rmp::encode::write_map_len(&mut w, map_len)?;
    rmp::encode::write_pfix(&mut w, keys::REQUEST_TYPE)?;
    rmp::encode::write_uint(&mut w, R::request_type() as u64)?;
    rmp::encode::write_pfix(&mut w, keys::SYNC)?;
    rmp::encode::write_uint(&mut w, sync)?;
    if let Some(version) = schema_version {
        rmp::encode::write_pfix(&mut w, keys::SCHEMA_VERSION)?;
        rmp::encode::write_uint(&mut w, u64::from(version))?;
    }
    body.encode_body(&mut w)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::consts::IteratorType;

    fn flatten(buf: &mut Buffer) -> Vec<u8> {
        let begin = buf.begin();
        let bytes = buf
            .io_slices(&begin, usize::MAX)
            .iter()
            .flat_map(|s| s.iter().copied())
            .collect();
        buf.release_iter(begin);
        bytes
    }

    fn frame_parts(bytes: &[u8]) -> (usize, rmpv::Value, rmpv::Value) {
        assert_eq!(bytes[0], 0xce, "size must use the uint32 tag");
        let size = u32::from_be_bytes(bytes[1..5].try_into().unwrap()) as usize;
        let mut rest = &bytes[5..];
        let header = rmpv::decode::read_value(&mut rest).unwrap();
        let body = rmpv::decode::read_value(&mut rest).unwrap();
        assert!(rest.is_empty());
        (size, header, body)
    }

    fn header_field(header: &rmpv::Value, key: u8) -> Option<rmpv::Value> {
        header
            .as_map()
            .unwrap()
            .iter()
            .find(|(k, _)| k.as_u64() == Some(u64::from(key)))
            .map(|(_, v)| v.clone())
    }

    #[test]
    fn size_prefix_matches_payload_length() {
        let mut buf = Buffer::new();
        encode_request(&mut buf, 3, None, &Ping {}).unwrap();
        let bytes = flatten(&mut buf);
        let (size, _, _) = frame_parts(&bytes);
        assert_eq!(size, bytes.len() - SIZE_PREFIX_LEN);
    }

    #[test]
    fn header_carries_type_and_sync() {
        let mut buf = Buffer::new();
        encode_request(&mut buf, 0xdead_beef_u64, None, &Ping {}).unwrap();
        let bytes = flatten(&mut buf);
        let (_, header, body) = frame_parts(&bytes);
        assert_eq!(
            header_field(&header, keys::REQUEST_TYPE).unwrap().as_u64(),
            Some(RequestType::Ping as u64)
        );
        assert_eq!(
            header_field(&header, keys::SYNC).unwrap().as_u64(),
            Some(0xdead_beef)
        );
        assert_eq!(body, rmpv::Value::Map(vec![]));
    }

    #[test]
    fn schema_version_is_optional() {
        let mut buf = Buffer::new();
        encode_request(&mut buf, 1, Some(11), &Ping {}).unwrap();
        let bytes = flatten(&mut buf);
        let (_, header, _) = frame_parts(&bytes);
        assert_eq!(
            header_field(&header, keys::SCHEMA_VERSION).unwrap().as_u64(),
            Some(11)
        );
    }

    #[test]
    fn select_body_shape() {
        let mut buf = Buffer::new();
        let select = Select::new(512, 0, 1, 0, IteratorType::Eq, (666u32,));
        encode_request(&mut buf, 7, None, &select).unwrap();
        let bytes = flatten(&mut buf);
        let (_, _, body) = frame_parts(&bytes);
        let body = body.as_map().unwrap();
        assert_eq!(body.len(), 6);
        let field = |key: u8| {
            body.iter()
                .find(|(k, _)| k.as_u64() == Some(u64::from(key)))
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(field(keys::SPACE_ID).as_u64(), Some(512));
        assert_eq!(field(keys::LIMIT).as_u64(), Some(1));
        assert_eq!(
            field(keys::ITERATOR).as_u64(),
            Some(IteratorType::Eq as u64)
        );
        assert_eq!(field(keys::KEY), rmpv::Value::Array(vec![666.into()]));
    }

    #[test]
    fn update_body_includes_ops() {
        let mut buf = Buffer::new();
        let ops = vec![rmpv::Value::Array(vec![
            "=".into(),
            2.into(),
            "new".into(),
        ])];
        let update = Update::new(512, 0, None, (666u32,), ops);
        encode_request(&mut buf, 8, None, &update).unwrap();
        let bytes = flatten(&mut buf);
        let (_, header, body) = frame_parts(&bytes);
        assert_eq!(
            header_field(&header, keys::REQUEST_TYPE).unwrap().as_u64(),
            Some(RequestType::Update as u64)
        );
        assert_eq!(body.as_map().unwrap().len(), 4);
    }

    #[test]
    fn consecutive_requests_share_the_buffer() {
        let mut buf = Buffer::new();
        encode_request(&mut buf, 1, None, &Ping {}).unwrap();
        let first_len = buf.len();
        encode_request(&mut buf, 2, None, &Ping {}).unwrap();
        let bytes = flatten(&mut buf);

        let (size, _, _) = frame_parts(&bytes[..first_len]);
        assert_eq!(size, first_len - SIZE_PREFIX_LEN);
        let (_, header, _) = frame_parts(&bytes[first_len..]);
        assert_eq!(header_field(&header, keys::SYNC).unwrap().as_u64(), Some(2));
    }
}
