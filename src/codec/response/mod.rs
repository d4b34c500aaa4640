use std::io::Read;

use rmp::Marker;
use rmpv::Value;
use tracing::debug;

use crate::{
    buffer::{BufReader, Buffer, BufferIter},
    codec::consts::{error_keys, keys, response_codes},
    errors::DecodingError,
};

/// Decoded response header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Request correlation id echoed by the server.
    pub sync: u64,
    /// `0` for success, `0x8000 | errcode` for a server error.
    pub code: u32,
    pub schema_version: u32,
}

/// One entry of the server-side error stack (body key `0x52`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorFrame {
    pub type_name: String,
    pub file: String,
    pub line: u32,
    pub msg: String,
    pub saved_errno: i64,
    pub errcode: u32,
}

#[derive(Clone, Debug, Default)]
pub struct ResponseBody {
    /// Tuple list under body key `0x30`.
    pub data: Option<Vec<Value>>,
    /// Error chain, most recent first; non-empty whenever `code != 0`.
    pub error_stack: Option<Vec<ErrorFrame>>,
}

/// Fully decoded inbound message.
#[derive(Clone, Debug)]
pub struct Response {
    /// Total frame size on the wire, size prefix included.
    pub size: usize,
    pub header: ResponseHeader,
    pub body: ResponseBody,
}

impl Response {
    pub fn is_ok(&self) -> bool {
        self.header.code == response_codes::OK
    }

    /// Server error code with the IPROTO error bit stripped.
    pub fn error_code(&self) -> Option<u32> {
        if self.is_ok() {
            None
        } else {
            Some(self.header.code & !response_codes::ERROR_RANGE_START)
        }
    }
}

/// Result of one frame-decoding attempt.
#[derive(Debug)]
pub(crate) enum FrameOutcome {
    /// Frame decoded; the caller advances its cursor by `response.size`.
    Decoded(Response),
    /// The frame is not fully buffered yet; nothing was consumed.
    NeedMore,
    /// The frame is complete but malformed; the caller should record the
    /// error and advance past the `size` bytes to resynchronize.
    Skip { error: DecodingError, size: usize },
}

/// Try to decode one response frame at `itr`, never advancing the cursor.
///
/// An `Err` return means the size prefix itself is corrupt: the stream
/// position can no longer be trusted and the connection must be aborted.
pub(crate) fn decode_frame_at(
    buf: &Buffer,
    itr: &BufferIter,
) -> Result<FrameOutcome, DecodingError> {
    if !buf.has(itr, 1) {
        return Ok(FrameOutcome::NeedMore);
    }
    let mut reader = BufReader::new_at(buf, itr);
    let mut tag = [0u8; 1];
    reader.read_exact(&mut tag).expect("availability checked");

    let width = match Marker::from_u8(tag[0]) {
        Marker::FixPos(x) => {
            return decode_checked_frame(buf, itr, reader, 1, x as usize);
        }
        Marker::U8 => 1,
        Marker::U16 => 2,
        Marker::U32 => 4,
        Marker::U64 => 8,
        _ => return Err(DecodingError::CorruptSizePrefix),
    };
    if !buf.has(itr, 1 + width) {
        return Ok(FrameOutcome::NeedMore);
    }

    let mut raw = [0u8; 8];
    reader
        .read_exact(&mut raw[8 - width..])
        .expect("availability checked");
    let size = u64::from_be_bytes(raw);
    if size > u64::from(u32::MAX) {
        return Err(DecodingError::CorruptSizePrefix);
    }
    decode_checked_frame(buf, itr, reader, 1 + width, size as usize)
}

fn decode_checked_frame(
    buf: &Buffer,
    itr: &BufferIter,
    mut reader: BufReader<'_>,
    prefix_len: usize,
    size: usize,
) -> Result<FrameOutcome, DecodingError> {
    let total = prefix_len + size;
    if !buf.has(itr, total) {
        return Ok(FrameOutcome::NeedMore);
    }
    match decode_payload(&mut reader, size) {
        Ok((header, body)) => Ok(FrameOutcome::Decoded(Response {
            size: total,
            header,
            body,
        })),
        Err(error) => Ok(FrameOutcome::Skip { error, size: total }),
    }
}

fn decode_payload(
    reader: &mut BufReader<'_>,
    size: usize,
) -> Result<(ResponseHeader, ResponseBody), DecodingError> {
    let mut frame = reader.take(size as u64);

    let header = decode_header(&mut frame)?;
    let body = if frame.limit() > 0 {
        decode_body(&mut frame, header.code)?
    } else {
        ResponseBody::default()
    };
    Ok((header, body))
}

fn decode_header(mut frame: impl Read) -> Result<ResponseHeader, DecodingError> {
    let map_len = rmp::decode::read_map_len(&mut frame)?;
    let mut code: Option<u32> = None;
    let mut sync: Option<u64> = None;
    let mut schema_version: u32 = 0;
    for _ in 0..map_len {
        let key: u8 = rmp::decode::read_pfix(&mut frame)?;
        match key {
            keys::RESPONSE_CODE => {
                code = Some(rmp::decode::read_int(&mut frame)?);
            }
            keys::SYNC => {
                sync = Some(rmp::decode::read_int(&mut frame)?);
            }
            keys::SCHEMA_VERSION => {
                schema_version = rmp::decode::read_int(&mut frame)?;
            }
            rest => {
                debug!("Unexpected key encountered in response header: {}", rest);
                let _ = rmpv::decode::read_value(&mut frame)?;
            }
        }
    }
    Ok(ResponseHeader {
        sync: sync.ok_or_else(|| DecodingError::missing_key("sync"))?,
        code: code.ok_or_else(|| DecodingError::missing_key("code"))?,
        schema_version,
    })
}

fn decode_body(mut frame: impl Read, code: u32) -> Result<ResponseBody, DecodingError> {
    let mut data = None;
    let mut error_stack: Option<Vec<ErrorFrame>> = None;
    let mut description: Option<String> = None;

    let map_len = rmp::decode::read_map_len(&mut frame)?;
    for _ in 0..map_len {
        let key: u8 = rmp::decode::read_pfix(&mut frame)?;
        match key {
            keys::DATA => {
                let tuples = rmp::decode::read_array_len(&mut frame)?;
                let mut values = Vec::with_capacity(tuples as usize);
                for _ in 0..tuples {
                    values.push(rmpv::decode::read_value(&mut frame)?);
                }
                data = Some(values);
            }
            keys::ERROR_24 => match rmpv::decode::read_value(&mut frame)? {
                Value::String(s) => description = s.into_str(),
                other => {
                    return Err(DecodingError::type_mismatch("string", format!("{:?}", other)))
                }
            },
            keys::ERROR => {
                error_stack = Some(decode_error_stack(&mut frame)?);
            }
            rest => {
                debug!("Unexpected key encountered in response body: {}", rest);
                let _ = rmpv::decode::read_value(&mut frame)?;
            }
        }
    }

    // Older servers only send the plain-text error; synthesize a single
    // stack frame so callers always get a non-empty chain on failure.
    if code != response_codes::OK && error_stack.as_ref().map_or(true, Vec::is_empty) {
        let msg = description.unwrap_or_else(|| "unknown server error".to_owned());
        error_stack = Some(vec![ErrorFrame {
            msg,
            errcode: code & !response_codes::ERROR_RANGE_START,
            ..ErrorFrame::default()
        }]);
    }

    Ok(ResponseBody { data, error_stack })
}

fn decode_error_stack(mut frame: impl Read) -> Result<Vec<ErrorFrame>, DecodingError> {
    let mut stack = Vec::new();
    let map_len = rmp::decode::read_map_len(&mut frame)?;
    for _ in 0..map_len {
        let key: u8 = rmp::decode::read_pfix(&mut frame)?;
        if key != error_keys::STACK {
            debug!("Unexpected key encountered in error description: {}", key);
            let _ = rmpv::decode::read_value(&mut frame)?;
            continue;
        }
        let frames = rmp::decode::read_array_len(&mut frame)?;
        for _ in 0..frames {
            stack.push(decode_error_frame(&mut frame)?);
        }
    }
    Ok(stack)
}

fn decode_error_frame(mut frame: impl Read) -> Result<ErrorFrame, DecodingError> {
    let mut out = ErrorFrame::default();
    let map_len = rmp::decode::read_map_len(&mut frame)?;
    for _ in 0..map_len {
        let key: u8 = rmp::decode::read_pfix(&mut frame)?;
        match key {
            error_keys::TYPE => out.type_name = read_string(&mut frame)?,
            error_keys::FILE => out.file = read_string(&mut frame)?,
            error_keys::LINE => out.line = rmp::decode::read_int(&mut frame)?,
            error_keys::MESSAGE => out.msg = read_string(&mut frame)?,
            error_keys::ERRNO => out.saved_errno = rmp::decode::read_int(&mut frame)?,
            error_keys::ERRCODE => out.errcode = rmp::decode::read_int(&mut frame)?,
            _ => {
                let _ = rmpv::decode::read_value(&mut frame)?;
            }
        }
    }
    Ok(out)
}

fn read_string(mut frame: impl Read) -> Result<String, DecodingError> {
    match rmpv::decode::read_value(&mut frame)? {
        Value::String(s) => Ok(s.into_str().unwrap_or_default()),
        other => Err(DecodingError::type_mismatch("string", format!("{:?}", other))),
    }
}
