use std::time::Duration;

use crate::{
    connector::Connector,
    net::{NetProvider, TokioNetProvider},
};

/// Build a [`Connector`] with tuned parameters.
#[derive(Clone, Debug)]
pub struct ConnectorBuilder {
    connect_timeout: Option<Duration>,
    input_gc_interval: u32,
    read_chunk: usize,
}

impl Default for ConnectorBuilder {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            input_gc_interval: 100,
            read_chunk: 16 * 1024,
        }
    }
}

impl ConnectorBuilder {
    /// Sets timeout for connect (TCP establishment plus greeting).
    ///
    /// By default disabled.
    pub fn connect_timeout(&mut self, connect_timeout: impl Into<Option<Duration>>) -> &mut Self {
        self.connect_timeout = connect_timeout.into();
        self
    }

    /// Sets how many decoded responses to accumulate before the consumed
    /// part of a connection's input buffer is released.
    ///
    /// By default 100.
    pub fn input_gc_interval(&mut self, interval: u32) -> &mut Self {
        self.input_gc_interval = interval.max(1);
        self
    }

    /// Sets how many bytes to reserve per read attempt.
    ///
    /// By default 16 KiB.
    pub fn read_chunk(&mut self, bytes: usize) -> &mut Self {
        self.read_chunk = bytes.max(1);
        self
    }

    /// Build a connector over the default tokio provider.
    pub fn build(&self) -> Connector<TokioNetProvider> {
        self.build_with_provider(TokioNetProvider::new())
    }

    /// Build a connector over a custom I/O backend.
    pub fn build_with_provider<P: NetProvider>(&self, provider: P) -> Connector<P> {
        Connector::with_settings(
            provider,
            self.connect_timeout,
            self.input_gc_interval,
            self.read_chunk,
        )
    }
}
