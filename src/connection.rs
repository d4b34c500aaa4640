use std::{
    cell::{Cell, Ref, RefCell, RefMut},
    cmp::Ordering,
    collections::HashMap,
    fmt,
    rc::Rc,
};

use tracing::{debug, trace};

use crate::{
    buffer::{Buffer, BufferIter},
    codec::{
        consts::IteratorType,
        request::{encode_request, Call, Delete, Insert, Ping, Replace, Request, Select, Update, Upsert},
        response::{decode_frame_at, FrameOutcome, Response},
        DecodeStatus, Greeting,
    },
    errors::{ConnectionError, DecodingError, Error},
    tuple::Tuple,
};

/// Connection life cycle. Only `Ready` connections put new requests on the
/// wire; requests encoded earlier queue in the output buffer and flush once
/// the handshake finishes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Greeting,
    Ready,
    Failed,
    Closed,
}

pub(crate) struct ConnectionInner {
    pub(crate) token: usize,
    pub(crate) state: ConnectionState,
    pub(crate) in_buf: Buffer,
    pub(crate) out_buf: Buffer,
    /// Cursor separating decoded and raw data in the input buffer.
    decoded: BufferIter,
    futures: HashMap<u64, Response>,
    pub(crate) error: Option<ConnectionError>,
    pub(crate) greeting: Option<Greeting>,
    sync_counter: Rc<Cell<u64>>,
    gc_interval: u32,
    decoded_since_gc: u32,
}

impl ConnectionInner {
    fn next_sync(&self) -> u64 {
        let sync = self.sync_counter.get();
        self.sync_counter.set(sync + 1);
        sync
    }

    pub(crate) fn fail(&mut self, error: ConnectionError) {
        debug!("Connection {} failed: {}", self.token, error);
        self.state = ConnectionState::Failed;
        self.error = Some(error);
    }

    pub(crate) fn has_data_to_decode(&self) -> bool {
        self.in_buf.has(&self.decoded, 1)
    }

    /// Decode the greeting once all 128 bytes arrived. Returns `true` when
    /// the connection moved to `Ready`.
    pub(crate) fn try_decode_greeting(&mut self) -> Result<bool, DecodingError> {
        if !self.in_buf.has(&self.decoded, Greeting::SIZE) {
            return Ok(false);
        }
        let mut raw = [0u8; Greeting::SIZE];
        self.in_buf.get(&self.decoded, &mut raw);
        let greeting = Greeting::decode(raw)?;
        self.in_buf.advance(&self.decoded, Greeting::SIZE);
        debug!("Server: {}", greeting.server);
        trace!("Salt: {:?}", greeting.salt);
        self.greeting = Some(greeting);
        self.state = ConnectionState::Ready;
        Ok(true)
    }

    /// Try to decode one response at the decoded-data cursor.
    ///
    /// `Err` means the size prefix is corrupt and the stream position can no
    /// longer be trusted; the caller must abort the connection.
    pub(crate) fn process_response(&mut self) -> Result<DecodeStatus, DecodingError> {
        match decode_frame_at(&self.in_buf, &self.decoded)? {
            FrameOutcome::NeedMore => Ok(DecodeStatus::NeedMore),
            FrameOutcome::Decoded(response) => {
                trace!(
                    "Received response: sync={}, code={}, schema={}",
                    response.header.sync,
                    response.header.code,
                    response.header.schema_version
                );
                self.in_buf.advance(&self.decoded, response.size);
                self.futures.insert(response.header.sync, response);
                self.maybe_compact();
                Ok(DecodeStatus::Success)
            }
            FrameOutcome::Skip { error, size } => {
                self.error = Some(ConnectionError::new(
                    format!("Failed to decode response, skipping frame: {}", error),
                    None,
                ));
                self.in_buf.advance(&self.decoded, size);
                Ok(DecodeStatus::Err)
            }
        }
    }

    /// Release the decoded part of the input buffer every `gc_interval`
    /// responses.
    fn maybe_compact(&mut self) {
        self.decoded_since_gc += 1;
        if self.decoded_since_gc < self.gc_interval {
            return;
        }
        self.decoded_since_gc = 0;
        let consumed = self.in_buf.offset_of(&self.decoded);
        if consumed > 0 {
            debug!(
                "Compacting input buffer of connection {}: {} bytes",
                self.token, consumed
            );
            self.in_buf.drop_front(consumed);
        }
    }

    pub(crate) fn pending_responses(&self) -> usize {
        self.futures.len()
    }

    pub(crate) fn mark_closed(&mut self) {
        self.state = ConnectionState::Closed;
        self.futures.clear();
    }
}

/// Handle to a single server connection.
///
/// Handles are cheap to clone and may be stored in containers; they all
/// share one underlying connection. Request methods encode into the output
/// buffer and return the request's sync id, which doubles as the future
/// handle: once [`crate::Connector::wait`] reports completion the response
/// is claimed with [`Connection::get_response`].
#[derive(Clone)]
pub struct Connection {
    inner: Rc<RefCell<ConnectionInner>>,
}

impl Connection {
    pub(crate) fn new(sync_counter: Rc<Cell<u64>>, gc_interval: u32) -> Self {
        let mut in_buf = Buffer::new();
        let decoded = in_buf.begin();
        Self {
            inner: Rc::new(RefCell::new(ConnectionInner {
                // Real token is assigned once the socket is registered.
                token: usize::MAX,
                state: ConnectionState::New,
                in_buf,
                out_buf: Buffer::new(),
                decoded,
                futures: HashMap::new(),
                error: None,
                greeting: None,
                sync_counter,
                gc_interval,
                decoded_since_gc: 0,
            })),
        }
    }

    pub(crate) fn inner_mut(&self) -> RefMut<'_, ConnectionInner> {
        self.inner.borrow_mut()
    }

    pub(crate) fn inner_ref(&self) -> Ref<'_, ConnectionInner> {
        self.inner.borrow()
    }

    pub(crate) fn token(&self) -> usize {
        self.inner.borrow().token
    }

    fn send<R: Request>(&self, body: &R) -> Result<u64, Error> {
        let mut inner = self.inner.borrow_mut();
        match inner.state {
            ConnectionState::Failed => {
                return Err(inner
                    .error
                    .clone()
                    .map_or(Error::ConnectionClosed, Error::Connection))
            }
            ConnectionState::Closed => return Err(Error::ConnectionClosed),
            _ => {}
        }
        let sync = inner.next_sync();
        trace!("Encoding {:?} request with sync {}", R::request_type(), sync);
        encode_request(&mut inner.out_buf, sync, None, body)?;
        Ok(sync)
    }

    /// Send PING request
    /// ([docs](https://www.tarantool.io/en/doc/latest/dev_guide/internals/box_protocol/#iproto-ping-0x40)).
    pub fn ping(&self) -> Result<u64, Error> {
        self.send(&Ping {})
    }

    /// Call a stored procedure with the given arguments.
    pub fn call<T: Tuple>(&self, function_name: &str, args: T) -> Result<u64, Error> {
        self.send(&Call::new(function_name, args))
    }

    pub fn select<K: Tuple>(
        &self,
        space_id: u32,
        index_id: u32,
        limit: u32,
        offset: u32,
        iterator: IteratorType,
        key: K,
    ) -> Result<u64, Error> {
        self.send(&Select::new(space_id, index_id, limit, offset, iterator, key))
    }

    pub fn insert<T: Tuple>(&self, space_id: u32, tuple: T) -> Result<u64, Error> {
        self.send(&Insert::new(space_id, tuple))
    }

    pub fn replace<T: Tuple>(&self, space_id: u32, tuple: T) -> Result<u64, Error> {
        self.send(&Replace::new(space_id, tuple))
    }

    pub fn update<K: Tuple, O: Tuple>(
        &self,
        space_id: u32,
        index_id: u32,
        key: K,
        ops: O,
    ) -> Result<u64, Error> {
        self.send(&Update::new(space_id, index_id, None, key, ops))
    }

    pub fn upsert<T: Tuple, O: Tuple>(
        &self,
        space_id: u32,
        tuple: T,
        ops: O,
        index_base: u32,
    ) -> Result<u64, Error> {
        self.send(&Upsert::new(space_id, index_base, tuple, ops))
    }

    pub fn delete<K: Tuple>(&self, space_id: u32, index_id: u32, key: K) -> Result<u64, Error> {
        self.send(&Delete::new(space_id, index_id, key))
    }

    /// Whether the response for `sync` has been received.
    pub fn future_is_ready(&self, sync: u64) -> bool {
        self.inner.borrow().futures.contains_key(&sync)
    }

    /// Extract the response for `sync`, removing it from the connection.
    pub fn get_response(&self, sync: u64) -> Option<Response> {
        self.inner.borrow_mut().futures.remove(&sync)
    }

    /// Number of responses received but not yet claimed.
    pub fn pending_responses(&self) -> usize {
        self.inner.borrow().pending_responses()
    }

    /// Drop all pending responses.
    pub fn flush(&self) {
        self.inner.borrow_mut().futures.clear();
    }

    /// Clear the stored error. Pending responses are kept; combine with
    /// [`Connection::flush`] to discard them as well.
    pub fn reset(&self) {
        self.inner.borrow_mut().error = None;
    }

    pub fn error(&self) -> Option<ConnectionError> {
        self.inner.borrow().error.clone()
    }

    /// Greeting received from the server during connect.
    pub fn greeting(&self) -> Option<Greeting> {
        self.inner.borrow().greeting.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.borrow().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Box-like accessor: `conn.space(512).replace(&tuple)`.
    pub fn space(&self, space_id: u32) -> Space {
        Space {
            conn: self.clone(),
            space_id,
        }
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Connection {}

impl PartialOrd for Connection {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordered by socket token so connections fit in ordered maps.
impl Ord for Connection {
    fn cmp(&self, other: &Self) -> Ordering {
        self.token().cmp(&other.token())
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Connection({})", self.token())
    }
}

/// Request methods scoped to one space.
#[derive(Clone, Debug)]
pub struct Space {
    conn: Connection,
    space_id: u32,
}

impl Space {
    pub fn insert<T: Tuple>(&self, tuple: T) -> Result<u64, Error> {
        self.conn.insert(self.space_id, tuple)
    }

    pub fn replace<T: Tuple>(&self, tuple: T) -> Result<u64, Error> {
        self.conn.replace(self.space_id, tuple)
    }

    pub fn delete<K: Tuple>(&self, key: K) -> Result<u64, Error> {
        self.conn.delete(self.space_id, 0, key)
    }

    pub fn update<K: Tuple, O: Tuple>(&self, key: K, ops: O) -> Result<u64, Error> {
        self.conn.update(self.space_id, 0, key, ops)
    }

    pub fn upsert<T: Tuple, O: Tuple>(&self, tuple: T, ops: O) -> Result<u64, Error> {
        self.conn.upsert(self.space_id, tuple, ops, 0)
    }

    pub fn select<K: Tuple>(
        &self,
        limit: u32,
        offset: u32,
        iterator: IteratorType,
        key: K,
    ) -> Result<u64, Error> {
        self.conn
            .select(self.space_id, 0, limit, offset, iterator, key)
    }

    /// Request methods scoped to a secondary index of this space.
    pub fn index(&self, index_id: u32) -> Index {
        Index {
            conn: self.conn.clone(),
            space_id: self.space_id,
            index_id,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Index {
    conn: Connection,
    space_id: u32,
    index_id: u32,
}

impl Index {
    pub fn delete<K: Tuple>(&self, key: K) -> Result<u64, Error> {
        self.conn.delete(self.space_id, self.index_id, key)
    }

    pub fn update<K: Tuple, O: Tuple>(&self, key: K, ops: O) -> Result<u64, Error> {
        self.conn.update(self.space_id, self.index_id, key, ops)
    }

    pub fn select<K: Tuple>(
        &self,
        limit: u32,
        offset: u32,
        iterator: IteratorType,
        key: K,
    ) -> Result<u64, Error> {
        self.conn
            .select(self.space_id, self.index_id, limit, offset, iterator, key)
    }
}
