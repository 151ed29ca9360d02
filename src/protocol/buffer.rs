//! Byte queues connecting the engine to its transport.

use bytes::{Buf, Bytes, BytesMut};

/// Growable receive buffer for the downstream side.
///
/// Bytes are appended at the back as they arrive and consumed from the
/// front by the engine. [`peek`](Self::peek) never consumes.
#[derive(Debug, Default)]
pub struct ReceiveBuffer {
    inner: BytesMut,
}

impl ReceiveBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: BytesMut::with_capacity(capacity),
        }
    }

    /// Number of unconsumed bytes.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Append newly arrived bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.inner.extend_from_slice(data);
    }

    /// View all unconsumed bytes.
    pub fn peek(&self) -> &[u8] {
        &self.inner
    }

    /// Consume and return up to `n` bytes from the front.
    pub fn read(&mut self, n: usize) -> Bytes {
        let n = n.min(self.inner.len());
        self.inner.split_to(n).freeze()
    }

    /// Consume and return every buffered byte.
    pub fn read_all(&mut self) -> BytesMut {
        self.inner.split()
    }

    /// Discard up to `n` bytes from the front.
    pub fn drain(&mut self, n: usize) {
        let n = n.min(self.inner.len());
        self.inner.advance(n);
    }
}

/// A pair of output pipes the engine writes into.
pub trait Circuit {
    /// Queue bytes for the obfuscated (network) side.
    fn write_downstream(&mut self, data: &[u8]);

    /// Queue bytes for the plaintext (application) side.
    fn write_upstream(&mut self, data: &[u8]);
}

/// In-memory [`Circuit`] that collects engine output until it is taken.
#[derive(Debug, Default)]
pub struct BufferedCircuit {
    upstream: BytesMut,
    downstream: BytesMut,
}

impl BufferedCircuit {
    /// Create an empty circuit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take everything written upstream so far.
    pub fn take_upstream(&mut self) -> Bytes {
        self.upstream.split().freeze()
    }

    /// Take everything written downstream so far.
    pub fn take_downstream(&mut self) -> Bytes {
        self.downstream.split().freeze()
    }

    /// Check if there is output waiting in either direction.
    pub fn has_output(&self) -> bool {
        !self.upstream.is_empty() || !self.downstream.is_empty()
    }
}

impl Circuit for BufferedCircuit {
    fn write_downstream(&mut self, data: &[u8]) {
        self.downstream.extend_from_slice(data);
    }

    fn write_upstream(&mut self, data: &[u8]) {
        self.upstream.extend_from_slice(data);
    }
}
