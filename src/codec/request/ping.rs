use std::io::Write;

use super::Request;
use crate::{codec::consts::RequestType, errors::EncodingError};

#[derive(Clone, Debug)]
pub(crate) struct Ping {}

impl Request for Ping {
    fn request_type() -> RequestType {
        RequestType::Ping
    }

    fn encode_body(&self, mut buf: &mut dyn Write) -> Result<(), EncodingError> {
        rmp::encode::write_map_len(&mut buf, 0)?;
        Ok(())
    }
}
