//! Connector: owns the net provider and drives all registered connections.
//!
//! The scheduling model is single-threaded cooperative. `wait`, `wait_all`,
//! `wait_any` and `connect` are the only suspension points; each iteration
//! polls socket readiness, flushes output buffers with gathering writes,
//! fills input buffers with scattering reads and decodes every complete
//! response into the per-connection futures map.

use std::{cell::Cell, collections::BTreeMap, io, rc::Rc, time::Duration};

use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::{
    buffer::AVAILABLE_IOVEC_COUNT,
    builder::ConnectorBuilder,
    codec::DecodeStatus,
    connection::{Connection, ConnectionInner, ConnectionState},
    errors::{ConnectionError, Error},
    net::{Interest, NetProvider, TokioNetProvider},
};

pub struct Connector<P: NetProvider = TokioNetProvider> {
    provider: P,
    connections: BTreeMap<usize, Connection>,
    /// Sync counter shared by every connection of this connector.
    sync_counter: Rc<Cell<u64>>,
    connect_timeout: Option<Duration>,
    input_gc_interval: u32,
    read_chunk: usize,
}

impl Connector<TokioNetProvider> {
    pub fn new() -> Self {
        ConnectorBuilder::default().build()
    }

    /// Create new [`ConnectorBuilder`].
    pub fn builder() -> ConnectorBuilder {
        ConnectorBuilder::default()
    }
}

impl Default for Connector<TokioNetProvider> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: NetProvider> Connector<P> {
    /// Connector over a custom I/O backend with default settings.
    pub fn with_provider(provider: P) -> Self {
        ConnectorBuilder::default().build_with_provider(provider)
    }

    pub(crate) fn with_settings(
        provider: P,
        connect_timeout: Option<Duration>,
        input_gc_interval: u32,
        read_chunk: usize,
    ) -> Self {
        Self {
            provider,
            connections: BTreeMap::new(),
            sync_counter: Rc::new(Cell::new(0)),
            connect_timeout,
            input_gc_interval,
            read_chunk,
        }
    }

    /// Establish a connection and drive the event loop until the server
    /// greeting is received and parsed.
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<Connection, Error> {
        let deadline = self.connect_timeout.map(|t| Instant::now() + t);
        debug!("Connecting to {}:{}", host, port);

        let conn = Connection::new(self.sync_counter.clone(), self.input_gc_interval);
        conn.inner_mut().state = ConnectionState::Connecting;

        let connecting = self.provider.connect(host, port);
        let token = match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connecting)
                .await
                .map_err(|_| Error::ConnectTimeout)?,
            None => connecting.await,
        }
        .map_err(|err| {
            conn.inner_mut().fail(ConnectionError::from(&err));
            Error::Connect(err)
        })?;

        {
            let mut inner = conn.inner_mut();
            inner.token = token;
            inner.state = ConnectionState::Greeting;
        }
        self.connections.insert(token, conn.clone());

        loop {
            match conn.state() {
                ConnectionState::Ready => break,
                ConnectionState::Failed => {
                    let err = conn
                        .error()
                        .unwrap_or_else(|| ConnectionError::new("connect failed", None));
                    self.drop_registration(&conn);
                    return Err(Error::Connection(err));
                }
                ConnectionState::Closed => return Err(Error::ConnectionClosed),
                _ => {}
            }
            let remaining = match remaining_before(deadline) {
                Ok(remaining) => remaining,
                Err(_) => {
                    self.close(&conn);
                    return Err(Error::ConnectTimeout);
                }
            };
            self.service(remaining).await?;
        }

        debug!(
            "Connection {} ready, server: {}",
            token,
            conn.greeting().map(|g| g.server).unwrap_or_default()
        );
        Ok(conn)
    }

    /// Drive the event loop until the response for `sync` arrives.
    pub async fn wait(
        &mut self,
        conn: &Connection,
        sync: u64,
        timeout: Option<Duration>,
    ) -> Result<(), Error> {
        self.wait_all(conn, &[sync], timeout).await
    }

    /// Drive the event loop until every response in `syncs` arrives.
    pub async fn wait_all(
        &mut self,
        conn: &Connection,
        syncs: &[u64],
        timeout: Option<Duration>,
    ) -> Result<(), Error> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if syncs.iter().all(|sync| conn.future_is_ready(*sync)) {
                return Ok(());
            }
            match conn.state() {
                ConnectionState::Failed => {
                    return Err(conn
                        .error()
                        .map_or(Error::ConnectionClosed, Error::Connection));
                }
                ConnectionState::Closed => return Err(Error::ConnectionClosed),
                _ => {}
            }
            if !self.connections.contains_key(&conn.token()) {
                return Err(Error::ConnectionClosed);
            }
            let remaining = remaining_before(deadline)?;
            self.service(remaining).await?;
        }
    }

    /// Drive the event loop until any registered connection holds at least
    /// one unclaimed response; `None` on timeout.
    pub async fn wait_any(&mut self, timeout: Option<Duration>) -> Option<Connection> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(conn) = self
                .connections
                .values()
                .find(|conn| conn.pending_responses() > 0)
            {
                return Some(conn.clone());
            }
            let can_progress = self.connections.values().any(|conn| {
                matches!(
                    conn.state(),
                    ConnectionState::Greeting | ConnectionState::Ready
                )
            });
            if !can_progress && deadline.is_none() {
                return None;
            }
            let remaining = remaining_before(deadline).ok()?;
            if let Err(err) = self.service(remaining).await {
                warn!("Service iteration failed in wait_any: {}", err);
                return None;
            }
        }
    }

    /// Deregister and close the connection's socket; pending responses are
    /// dropped, the handle stays observable in `Closed` state.
    pub fn close(&mut self, conn: &Connection) {
        debug!("Closing connection {}", conn.token());
        self.drop_registration(conn);
        conn.inner_mut().mark_closed();
    }

    fn drop_registration(&mut self, conn: &Connection) {
        let token = conn.token();
        self.provider.close(token);
        self.connections.remove(&token);
    }

    /// One event-loop iteration: poll readiness, then service every ready
    /// socket.
    async fn service(&mut self, timeout: Option<Duration>) -> Result<(), Error> {
        let mut interests = Vec::with_capacity(self.connections.len());
        for (token, conn) in &self.connections {
            let inner = conn.inner_ref();
            let interest = match inner.state {
                ConnectionState::Greeting => Some(Interest::READABLE),
                // Write interest follows directly from queued output.
                ConnectionState::Ready if inner.out_buf.is_empty() => Some(Interest::READABLE),
                ConnectionState::Ready => Some(Interest::READABLE | Interest::WRITABLE),
                _ => None,
            };
            if let Some(interest) = interest {
                interests.push((*token, interest));
            }
        }

        if interests.is_empty() {
            if let Some(timeout) = timeout {
                tokio::time::sleep(timeout).await;
            }
            return Ok(());
        }

        let events = self.provider.poll(&interests, timeout).await?;
        for (token, ready) in events {
            let Some(conn) = self.connections.get(&token).cloned() else {
                continue;
            };
            if ready.is_writable() {
                Self::pump_out(&mut self.provider, &conn);
            }
            if ready.is_readable() {
                Self::pump_in(&mut self.provider, &conn, self.read_chunk);
            }
            if conn.state() == ConnectionState::Failed {
                self.drop_registration(&conn);
            }
        }
        Ok(())
    }

    /// Flush as much of the output buffer as the socket accepts.
    fn pump_out(provider: &mut P, conn: &Connection) {
        let mut guard = conn.inner_mut();
        let inner = &mut *guard;
        while !inner.out_buf.is_empty() {
            let begin = inner.out_buf.begin();
            let written = {
                let slices = inner.out_buf.io_slices(&begin, AVAILABLE_IOVEC_COUNT);
                provider.send(inner.token, &slices)
            };
            inner.out_buf.release_iter(begin);
            match written {
                Ok(0) => {
                    inner.fail(ConnectionError::new("connection closed during write", None));
                    break;
                }
                Ok(n) => {
                    trace!("Sent {} bytes on connection {}", n, inner.token);
                    inner.out_buf.drop_front(n);
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    inner.fail(ConnectionError::from(&err));
                    break;
                }
            }
        }
    }

    /// Read whatever the socket has into the input buffer and decode it.
    fn pump_in(provider: &mut P, conn: &Connection, read_chunk: usize) {
        let mut guard = conn.inner_mut();
        let inner = &mut *guard;
        loop {
            let reservation = inner.in_buf.append_back(read_chunk);
            let received = {
                let mut slices = inner.in_buf.io_slices_mut(&reservation, AVAILABLE_IOVEC_COUNT);
                provider.recv(inner.token, &mut slices)
            };
            match received {
                Ok(0) => {
                    inner.in_buf.drop_back(read_chunk);
                    inner.in_buf.release_iter(reservation);
                    inner.fail(ConnectionError::new("connection reset by peer", None));
                    break;
                }
                Ok(n) => {
                    trace!("Received {} bytes on connection {}", n, inner.token);
                    if n < read_chunk {
                        inner.in_buf.drop_back(read_chunk - n);
                    }
                    inner.in_buf.release_iter(reservation);
                    Self::drain_responses(inner);
                    if inner.state == ConnectionState::Failed || n < read_chunk {
                        break;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    inner.in_buf.drop_back(read_chunk);
                    inner.in_buf.release_iter(reservation);
                    break;
                }
                Err(err) => {
                    inner.in_buf.drop_back(read_chunk);
                    inner.in_buf.release_iter(reservation);
                    inner.fail(ConnectionError::from(&err));
                    break;
                }
            }
        }
    }

    /// Decode everything decodable in the input buffer: the greeting while
    /// handshaking, response frames afterwards. A malformed frame is
    /// skipped; a corrupt size prefix kills the connection.
    fn drain_responses(inner: &mut ConnectionInner) {
        if inner.state == ConnectionState::Greeting {
            match inner.try_decode_greeting() {
                Ok(true) => {}
                Ok(false) => return,
                Err(err) => {
                    inner.fail(ConnectionError::new(
                        format!("Failed to parse greeting: {}", err),
                        None,
                    ));
                    return;
                }
            }
        }
        if inner.state != ConnectionState::Ready {
            return;
        }
        while inner.has_data_to_decode() {
            match inner.process_response() {
                Ok(DecodeStatus::Success) => continue,
                Ok(DecodeStatus::NeedMore) => break,
                Ok(DecodeStatus::Err) => {
                    warn!("Skipped malformed response frame on connection {}", inner.token);
                    continue;
                }
                Err(err) => {
                    inner.fail(ConnectionError::new(
                        format!("Protocol corruption: {}", err),
                        None,
                    ));
                    break;
                }
            }
        }
    }
}

fn remaining_before(deadline: Option<Instant>) -> Result<Option<Duration>, Error> {
    match deadline {
        Some(deadline) => {
            let now = Instant::now();
            if now >= deadline {
                Err(Error::Timeout)
            } else {
                Ok(Some(deadline - now))
            }
        }
        None => Ok(None),
    }
}
