use std::io::Write;

use crate::{
    codec::{
        consts::{keys, RequestType},
        utils::{write_kv_tuple, write_kv_u32},
    },
    errors::EncodingError,
    tuple::Tuple,
};

use super::Request;

#[derive(Clone, Debug)]
pub(crate) struct Update<K, O> {
    pub space_id: u32,
    pub index_id: u32,
    pub index_base: Option<u32>,
    pub key: K,
    pub ops: O,
}

impl<K, O> Update<K, O> {
    pub(crate) fn new(space_id: u32, index_id: u32, index_base: Option<u32>, key: K, ops: O) -> Self {
        Self {
            space_id,
            index_id,
            index_base,
            key,
            ops,
        }
    }
}

impl<K: Tuple, O: Tuple> Request for Update<K, O> {
    fn request_type() -> RequestType
    where
        Self: Sized,
    {
        RequestType::Update
    }

    fn encode_body(&self, mut buf: &mut dyn Write) -> Result<(), EncodingError> {
        let map_len = if self.index_base.is_some() { 5 } else { 4 };
        rmp::encode::write_map_len(&mut buf, map_len)?;
        write_kv_u32(buf, keys::SPACE_ID, self.space_id)?;
        write_kv_u32(buf, keys::INDEX_ID, self.index_id)?;
        if let Some(value) = self.index_base {
            write_kv_u32(buf, keys::INDEX_BASE, value)?;
        }
        write_kv_tuple(buf, keys::KEY, &self.key)?;
        write_kv_tuple(buf, keys::TUPLE, &self.ops)?;
        Ok(())
    }
}
