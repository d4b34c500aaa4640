//! Asynchronous connector for the Tarantool binary protocol (IPROTO).
//!
//! Requests are encoded into a segmented output [`Buffer`] and return a
//! sync id that doubles as a future handle; the [`Connector`] owns the
//! event loop that flushes output, reads responses with vectored I/O and
//! resolves futures. `wait`/`wait_all`/`wait_any` are the only suspension
//! points, so a connector and its connections stay on one thread.
//!
//! ```no_run
//! # async fn example() -> Result<(), tarantool_connector::Error> {
//! use tarantool_connector::Connector;
//!
//! let mut connector = Connector::new();
//! let conn = connector.connect("127.0.0.1", 3301).await?;
//! let sync = conn.ping()?;
//! connector.wait(&conn, sync, None).await?;
//! let response = conn.get_response(sync).expect("wait returned");
//! assert!(response.is_ok());
//! # Ok(())
//! # }
//! ```

pub use rmpv::Value;

pub use self::{
    buffer::{Buffer, BufferIter},
    builder::ConnectorBuilder,
    codec::{
        consts::IteratorType,
        response::{ErrorFrame, Response, ResponseBody, ResponseHeader},
        DecodeStatus, Greeting,
    },
    connection::{Connection, ConnectionState, Index, Space},
    connector::Connector,
    errors::{ConnectionError, DecodingError, EncodingError, Error},
    net::{Interest, NetProvider, Ready, TokioNetProvider},
    tuple::{Tuple, TupleElement},
};

mod buffer;
mod builder;
mod codec;
mod connection;
mod connector;
mod errors;
mod net;
mod tuple;
