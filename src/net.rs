//! Pluggable I/O backend.
//!
//! The connector drives sockets through the [`NetProvider`] trait:
//! registration happens in `connect`, readiness is gathered per `poll` call
//! (the interest set doubles as the `modify` operation of classic pollers)
//! and data moves through nonblocking vectored reads and writes.
//! [`TokioNetProvider`] is the default backend.

use std::{
    collections::HashMap,
    io::{self, IoSlice, IoSliceMut},
    time::Duration,
};

use async_trait::async_trait;
use futures::{future::select_all, FutureExt};
use socket2::SockRef;
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

pub use tokio::io::{Interest, Ready};

/// I/O backend used by [`crate::Connector`].
///
/// Tokens identify registered sockets. `send`/`recv` must be nonblocking:
/// they return `WouldBlock` instead of waiting, and `Ok(0)` on EOF the way
/// the underlying socket does.
#[async_trait(?Send)]
pub trait NetProvider {
    /// Open a TCP connection and register it, returning its token.
    async fn connect(&mut self, host: &str, port: u16) -> io::Result<usize>;

    /// Wait until at least one of the sockets in `interests` becomes ready
    /// or the timeout expires. Returns every ready socket observed in this
    /// iteration; an empty vector means timeout.
    async fn poll(
        &mut self,
        interests: &[(usize, Interest)],
        timeout: Option<Duration>,
    ) -> io::Result<Vec<(usize, Ready)>>;

    /// Gathering write of `bufs` to the socket.
    fn send(&mut self, token: usize, bufs: &[IoSlice<'_>]) -> io::Result<usize>;

    /// Scattering read from the socket into `bufs`.
    fn recv(&mut self, token: usize, bufs: &mut [IoSliceMut<'_>]) -> io::Result<usize>;

    /// Deregister the socket and close it.
    fn close(&mut self, token: usize);
}

/// Default provider: tokio TCP streams polled through their readiness API.
pub struct TokioNetProvider {
    streams: HashMap<usize, TcpStream>,
    next_token: usize,
}

impl TokioNetProvider {
    pub fn new() -> Self {
        Self {
            streams: HashMap::new(),
            next_token: 0,
        }
    }

    fn stream(&self, token: usize) -> io::Result<&TcpStream> {
        self.streams.get(&token).ok_or_else(unknown_token)
    }
}

impl Default for TokioNetProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown_token() -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, "unknown socket token")
}

#[async_trait(?Send)]
impl NetProvider for TokioNetProvider {
    async fn connect(&mut self, host: &str, port: u16) -> io::Result<usize> {
        let stream = TcpStream::connect((host, port)).await?;
        if let Err(err) = SockRef::from(&stream).set_keepalive(true) {
            warn!("Failed to enable SO_KEEPALIVE: {}", err);
        }
        let token = self.next_token;
        self.next_token += 1;
        self.streams.insert(token, stream);
        debug!("Registered socket {} for {}:{}", token, host, port);
        Ok(token)
    }

    async fn poll(
        &mut self,
        interests: &[(usize, Interest)],
        timeout: Option<Duration>,
    ) -> io::Result<Vec<(usize, Ready)>> {
        let mut pollers = Vec::with_capacity(interests.len());
        for &(token, interest) in interests {
            let Some(stream) = self.streams.get(&token) else {
                continue;
            };
            pollers.push(async move { (token, stream.ready(interest).await) }.boxed_local());
        }
        if pollers.is_empty() {
            if let Some(timeout) = timeout {
                tokio::time::sleep(timeout).await;
            }
            return Ok(Vec::new());
        }

        let select = select_all(pollers);
        let ((token, ready), _, rest) = match timeout {
            Some(timeout) => match tokio::time::timeout(timeout, select).await {
                Ok(resolved) => resolved,
                Err(_) => return Ok(Vec::new()),
            },
            None => select.await,
        };

        let mut events = vec![(token, ready?)];
        // Pick up sockets that became ready in the same iteration.
        for pending in rest {
            if let Some((token, ready)) = pending.now_or_never() {
                events.push((token, ready?));
            }
        }
        trace!("Poll returned {} ready socket(s)", events.len());
        Ok(events)
    }

    fn send(&mut self, token: usize, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        self.stream(token)?.try_write_vectored(bufs)
    }

    fn recv(&mut self, token: usize, bufs: &mut [IoSliceMut<'_>]) -> io::Result<usize> {
        self.stream(token)?.try_read_vectored(bufs)
    }

    fn close(&mut self, token: usize) {
        if self.streams.remove(&token).is_some() {
            debug!("Closed socket {}", token);
        }
    }
}
