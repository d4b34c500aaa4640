/// IPROTO map keys.
///
/// Describes only keys used in this crate.
///
/// See details [here](https://github.com/tarantool/tarantool/blob/master/src/box/iproto_constants.h).
pub mod keys {
    pub const REQUEST_TYPE: u8 = 0x00;
    pub const RESPONSE_CODE: u8 = 0x00;
    pub const SYNC: u8 = 0x01;
    pub const SCHEMA_VERSION: u8 = 0x05;
    pub const SPACE_ID: u8 = 0x10;
    pub const INDEX_ID: u8 = 0x11;
    pub const LIMIT: u8 = 0x12;
    pub const OFFSET: u8 = 0x13;
    pub const ITERATOR: u8 = 0x14;
    pub const INDEX_BASE: u8 = 0x15;
    pub const KEY: u8 = 0x20;
    pub const TUPLE: u8 = 0x21;
    pub const FUNCTION_NAME: u8 = 0x22;
    pub const OPS: u8 = 0x28;
    pub const DATA: u8 = 0x30;
    pub const ERROR_24: u8 = 0x31;
    pub const ERROR: u8 = 0x52;
}

/// Keys of the MP_ERROR map carried under [`keys::ERROR`].
pub mod error_keys {
    pub const STACK: u8 = 0x00;

    pub const TYPE: u8 = 0x00;
    pub const FILE: u8 = 0x01;
    pub const LINE: u8 = 0x02;
    pub const MESSAGE: u8 = 0x03;
    pub const ERRNO: u8 = 0x04;
    pub const ERRCODE: u8 = 0x05;
}

pub mod response_codes {
    pub const OK: u32 = 0x0;
    pub const ERROR_RANGE_START: u32 = 0x8000;
    pub const ERROR_RANGE_END: u32 = 0x8fff;
}

/// IPROTO command codes for the requests this crate sends.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestType {
    Select = 1,
    Insert = 2,
    Replace = 3,
    Update = 4,
    Delete = 5,
    Upsert = 9,
    Call = 10,
    Ping = 64,
}

/// Index iterator for SELECT requests, wire values per the server
/// ([docs](https://www.tarantool.io/en/doc/latest/dev_guide/internals/box_protocol/)).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[repr(u32)]
pub enum IteratorType {
    /// Key == x, ascending order.
    #[default]
    Eq = 0,
    /// Key == x, descending order.
    Req = 1,
    /// All tuples.
    All = 2,
    /// Key < x.
    Lt = 3,
    /// Key <= x.
    Le = 4,
    /// Key >= x.
    Ge = 5,
    /// Key > x.
    Gt = 6,
    /// All bits of x are set in the key.
    BitsAllSet = 7,
    /// At least one bit of x is set.
    BitsAnySet = 8,
    /// No bits of x are set.
    BitsAllNotSet = 9,
    /// Key overlaps the rectangle x.
    Overlaps = 10,
    /// Tuples in distance order from point x.
    Neighbor = 11,
}
