//! Per-connection obfs3 state machine.
//!
//! The engine performs no I/O. The surrounding transport appends incoming
//! bytes to a [`ReceiveBuffer`], calls one of the `received_*` handlers, and
//! forwards whatever the engine wrote into its [`Circuit`].

use bytes::BytesMut;

use crate::crypto::{
    derive_cipher, derive_magic, random_padding, SecureRandom, StreamCipher,
    UniformDh, HASH_LEN, PUBKEY_LEN,
};
use crate::error::{Error, Result};
use crate::protocol::{Circuit, EngineConfig, Labels, ReceiveBuffer, Role, MAX_MAGIC_SEARCH};

/// Handshake progress of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Waiting for the peer's 192-byte public key.
    AwaitingPeerKey,
    /// Keys are derived; skipping peer padding until its magic shows up.
    SearchingForMarker,
    /// Handshake complete; all traffic passes through the ciphers.
    Open,
}

/// Material derived from the shared secret, created all at once.
struct SessionKeys {
    send: StreamCipher,
    recv: StreamCipher,
    peer_magic: [u8; HASH_LEN],
}

/// One end of an obfs3 connection.
pub struct Obfs3 {
    role: Role,
    labels: Labels,
    config: EngineConfig,
    state: State,
    dh: UniformDh,
    keys: Option<SessionKeys>,
    /// Upstream data that arrived before the send cipher existed.
    pending: BytesMut,
    /// Leading bytes of the receive buffer known not to start the magic.
    scanned_padding: usize,
    handshake_sent: bool,
}

impl Obfs3 {
    /// Create an engine with the default configuration and a fresh key pair.
    pub fn new(role: Role) -> Self {
        Self::build(role, EngineConfig::default(), UniformDh::new())
    }

    /// Create an engine with a custom configuration.
    pub fn with_config(role: Role, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(role, config, UniformDh::new()))
    }

    /// Create an engine around an existing key pair.
    pub fn with_key_pair(role: Role, config: EngineConfig, dh: UniformDh) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(role, config, dh))
    }

    fn build(role: Role, config: EngineConfig, dh: UniformDh) -> Self {
        Self {
            role,
            labels: role.labels(),
            config,
            state: State::AwaitingPeerKey,
            dh,
            keys: None,
            pending: BytesMut::new(),
            scanned_padding: 0,
            handshake_sent: false,
        }
    }

    /// Which end of the connection this engine runs.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current handshake state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Check if the handshake is complete.
    pub fn is_open(&self) -> bool {
        self.state == State::Open
    }

    /// Our UniformDH public key.
    pub fn public_key(&self) -> &[u8; PUBKEY_LEN] {
        self.dh.public_key()
    }

    /// Bytes of peer padding skipped so far while looking for the magic.
    pub fn scanned_padding(&self) -> usize {
        self.scanned_padding
    }

    /// Bytes of upstream data waiting for the handshake.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Send the opening handshake message: `PUBKEY | WR(PADLEN)`.
    ///
    /// Must be called exactly once, before any application data.
    pub fn circuit_connected(&mut self, circuit: &mut impl Circuit) -> Result<()> {
        if self.handshake_sent {
            return Err(Error::HandshakeAlreadySent);
        }

        let padding_len = SecureRandom::padding_len(self.config.max_padding);
        let mut message = Vec::with_capacity(PUBKEY_LEN + padding_len);
        message.extend_from_slice(self.dh.public_key());
        message.extend_from_slice(&random_padding(padding_len));

        tracing::debug!(
            role = %self.role,
            len = message.len(),
            padding_len,
            "obfs3 handshake queued"
        );

        circuit.write_downstream(&message);
        self.handshake_sent = true;
        Ok(())
    }

    /// Handle application data headed for the network.
    ///
    /// Data is encrypted and written at once when the send cipher exists,
    /// and queued otherwise.
    pub fn received_upstream(&mut self, data: &[u8], circuit: &mut impl Circuit) {
        if data.is_empty() {
            return;
        }

        match self.keys.as_mut() {
            Some(keys) => {
                let message = keys.send.crypt(data);
                tracing::trace!(len = message.len(), "obfs3 transmitting application data");
                circuit.write_downstream(&message);
            }
            None => {
                tracing::debug!(
                    len = data.len(),
                    "got upstream data before doing handshake, caching"
                );
                self.pending.extend_from_slice(data);
            }
        }
    }

    /// Handle bytes that arrived from the network.
    ///
    /// Runs every handler the current state allows in one pass, so a buffer
    /// holding the peer key, its padding, its magic and ciphertext is fully
    /// processed by a single call. Returning `Ok(())` with bytes still
    /// buffered means more input is needed.
    ///
    /// # Errors
    ///
    /// [`Error::CorruptedPublicKey`] and [`Error::TooMuchPadding`] are fatal;
    /// the connection must be closed.
    pub fn received_downstream(
        &mut self,
        buf: &mut ReceiveBuffer,
        circuit: &mut impl Circuit,
    ) -> Result<()> {
        if self.state == State::AwaitingPeerKey {
            self.read_handshake(buf, circuit)?;
        }

        if self.state == State::SearchingForMarker {
            self.scan_for_magic(buf)?;
        }

        if self.state == State::Open {
            self.relay_downstream(buf, circuit);
        }

        Ok(())
    }

    /// Read the peer's public key, derive keys and send `WR(PADLEN) | MAGIC | E(queued)`.
    fn read_handshake(&mut self, buf: &mut ReceiveBuffer, circuit: &mut impl Circuit) -> Result<()> {
        if buf.len() < PUBKEY_LEN {
            tracing::debug!(len = buf.len(), "not enough bytes for key");
            return Ok(());
        }

        tracing::debug!(len = buf.len(), "got handshake data (waiting for key)");

        let peer_public = buf.read(PUBKEY_LEN);
        let shared_secret = self.dh.shared_secret(&peer_public)?;

        let mut send = derive_cipher(&shared_secret, self.labels.send_key);
        let recv = derive_cipher(&shared_secret, self.labels.recv_key);
        let peer_magic = derive_magic(&shared_secret, self.labels.recv_magic);
        let magic = derive_magic(&shared_secret, self.labels.send_magic);

        // Padding goes first so the magic is not alone in its segment.
        let padding_len = SecureRandom::padding_len(self.config.max_padding);
        let mut queued = std::mem::take(&mut self.pending);
        send.crypt_in_place(&mut queued);

        let mut message = Vec::with_capacity(padding_len + HASH_LEN + queued.len());
        message.extend_from_slice(&random_padding(padding_len));
        message.extend_from_slice(&magic);
        message.extend_from_slice(&queued);

        tracing::debug!(
            role = %self.role,
            len = message.len(),
            padding_len,
            queued = queued.len(),
            "transmitting magic"
        );
        circuit.write_downstream(&message);

        self.keys = Some(SessionKeys {
            send,
            recv,
            peer_magic,
        });
        self.state = State::SearchingForMarker;
        Ok(())
    }

    /// Look for the peer's magic; on a hit drain it and everything before it.
    fn scan_for_magic(&mut self, buf: &mut ReceiveBuffer) -> Result<()> {
        let Some(keys) = self.keys.as_ref() else {
            return Ok(());
        };

        let chunk = buf.peek();
        let start = self.scanned_padding.min(chunk.len());
        let found = chunk[start..]
            .windows(HASH_LEN)
            .position(|window| window == keys.peer_magic);

        match found {
            Some(offset) => {
                let index = start + offset;
                tracing::debug!(padding = index, "found magic, draining {} bytes", index + HASH_LEN);
                buf.drain(index + HASH_LEN);
                self.scanned_padding = index;
                self.state = State::Open;
                Ok(())
            }
            None => {
                if buf.len() > MAX_MAGIC_SEARCH {
                    tracing::warn!(len = buf.len(), "too much padding");
                    return Err(Error::TooMuchPadding(buf.len()));
                }
                // A match could still start in the last HASH_LEN - 1 bytes.
                self.scanned_padding = buf.len().saturating_sub(HASH_LEN - 1);
                tracing::debug!(len = buf.len(), "did not find magic this time");
                Ok(())
            }
        }
    }

    fn relay_downstream(&mut self, buf: &mut ReceiveBuffer, circuit: &mut impl Circuit) {
        if buf.is_empty() {
            return;
        }
        let Some(keys) = self.keys.as_mut() else {
            return;
        };

        let mut data = buf.read_all();
        tracing::trace!(len = data.len(), "processing application data");
        keys.recv.crypt_in_place(&mut data);
        circuit.write_upstream(&data);
    }
}

impl std::fmt::Debug for Obfs3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Obfs3")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .field("scanned_padding", &self.scanned_padding)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{BufferedCircuit, MAX_MESSAGE_PADDING, MAX_PADDING};
    use bytes::Bytes;

    const NO_PADDING: EngineConfig = EngineConfig { max_padding: 0 };

    struct Endpoint {
        engine: Obfs3,
        circuit: BufferedCircuit,
        inbox: ReceiveBuffer,
    }

    impl Endpoint {
        fn new(role: Role, config: EngineConfig) -> Self {
            Self::from_engine(Obfs3::with_config(role, config).unwrap())
        }

        fn with_key(role: Role, config: EngineConfig, private: [u8; PUBKEY_LEN]) -> Self {
            let dh = UniformDh::from_private_bytes(private);
            Self::from_engine(Obfs3::with_key_pair(role, config, dh).unwrap())
        }

        fn from_engine(engine: Obfs3) -> Self {
            Self {
                engine,
                circuit: BufferedCircuit::new(),
                inbox: ReceiveBuffer::new(),
            }
        }

        fn connect(&mut self) -> Bytes {
            self.engine.circuit_connected(&mut self.circuit).unwrap();
            self.circuit.take_downstream()
        }

        fn send(&mut self, data: &[u8]) -> Bytes {
            self.engine.received_upstream(data, &mut self.circuit);
            self.circuit.take_downstream()
        }

        fn receive(&mut self, data: &[u8]) -> Result<()> {
            self.inbox.extend(data);
            self.engine.received_downstream(&mut self.inbox, &mut self.circuit)
        }
    }

    /// Run both handshake messages across in order; both ends end up open.
    fn run_handshake(initiator: &mut Endpoint, responder: &mut Endpoint) {
        let initiator_hello = initiator.connect();
        let responder_hello = responder.connect();

        responder.receive(&initiator_hello).unwrap();
        initiator.receive(&responder_hello).unwrap();

        let initiator_sync = initiator.circuit.take_downstream();
        let responder_sync = responder.circuit.take_downstream();

        responder.receive(&initiator_sync).unwrap();
        initiator.receive(&responder_sync).unwrap();
    }

    #[test]
    fn test_handshake_message_layout() {
        let mut endpoint = Endpoint::new(Role::Initiator, EngineConfig::default());
        let hello = endpoint.connect();

        assert!(hello.len() >= PUBKEY_LEN);
        assert!(hello.len() <= PUBKEY_LEN + MAX_MESSAGE_PADDING);
        assert_eq!(&hello[..PUBKEY_LEN], endpoint.engine.public_key());
        assert_eq!(endpoint.engine.state(), State::AwaitingPeerKey);
    }

    #[test]
    fn test_handshake_sent_once() {
        let mut endpoint = Endpoint::new(Role::Responder, EngineConfig::default());
        endpoint.connect();

        let err = endpoint
            .engine
            .circuit_connected(&mut endpoint.circuit)
            .unwrap_err();
        assert!(matches!(err, Error::HandshakeAlreadySent));
        assert!(endpoint.circuit.take_downstream().is_empty());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = EngineConfig {
            max_padding: MAX_MESSAGE_PADDING + 1,
        };
        assert!(Obfs3::with_config(Role::Initiator, config).is_err());
    }

    #[test]
    fn test_handshake_round_trip() {
        let mut initiator = Endpoint::new(Role::Initiator, EngineConfig::default());
        let mut responder = Endpoint::new(Role::Responder, EngineConfig::default());

        // Written before either side has keys.
        assert!(initiator.send(b"GET / HTTP/1.1\r\n").is_empty());
        assert!(responder.send(b"220 ready\r\n").is_empty());

        run_handshake(&mut initiator, &mut responder);

        assert_eq!(initiator.engine.state(), State::Open);
        assert_eq!(responder.engine.state(), State::Open);
        assert!(initiator.inbox.is_empty());
        assert!(responder.inbox.is_empty());

        assert_eq!(&responder.circuit.take_upstream()[..], b"GET / HTTP/1.1\r\n");
        assert_eq!(&initiator.circuit.take_upstream()[..], b"220 ready\r\n");

        // Steady state in both directions.
        let ciphertext = initiator.send(b"ping");
        assert_ne!(&ciphertext[..], b"ping");
        responder.receive(&ciphertext).unwrap();
        assert_eq!(&responder.circuit.take_upstream()[..], b"ping");

        let ciphertext = responder.send(b"pong");
        initiator.receive(&ciphertext).unwrap();
        assert_eq!(&initiator.circuit.take_upstream()[..], b"pong");
    }

    #[test]
    fn test_zero_padding_scenario() {
        let mut initiator = Endpoint::new(Role::Initiator, NO_PADDING);
        let mut responder = Endpoint::new(Role::Responder, NO_PADDING);

        let initiator_hello = initiator.connect();
        let responder_hello = responder.connect();
        assert_eq!(initiator_hello.len(), PUBKEY_LEN);
        assert_eq!(responder_hello.len(), PUBKEY_LEN);

        responder.receive(&initiator_hello).unwrap();
        assert_eq!(responder.engine.state(), State::SearchingForMarker);
        let responder_sync = responder.circuit.take_downstream();
        assert_eq!(responder_sync.len(), HASH_LEN);

        let mut wire = responder_hello.to_vec();
        wire.extend_from_slice(&responder_sync);

        assert_eq!(initiator.engine.state(), State::AwaitingPeerKey);
        initiator.receive(&wire).unwrap();

        assert_eq!(initiator.engine.state(), State::Open);
        assert!(initiator.inbox.is_empty());
        assert!(initiator.circuit.take_upstream().is_empty());
        assert_eq!(initiator.engine.scanned_padding(), 0);
    }

    #[test]
    fn test_short_key_is_a_no_op() {
        let mut endpoint = Endpoint::new(Role::Initiator, EngineConfig::default());
        endpoint.connect();
        endpoint.send(b"queued");

        endpoint.receive(&[0x42u8; PUBKEY_LEN - 1]).unwrap();
        endpoint.receive(&[]).unwrap();

        assert_eq!(endpoint.engine.state(), State::AwaitingPeerKey);
        assert_eq!(endpoint.inbox.len(), PUBKEY_LEN - 1);
        assert_eq!(endpoint.engine.pending_len(), 6);
        assert!(!endpoint.circuit.has_output());
    }

    #[test]
    fn test_corrupted_key_is_fatal() {
        let mut endpoint = Endpoint::new(Role::Responder, EngineConfig::default());
        endpoint.connect();
        endpoint.send(b"queued");

        // All-ones is above the group modulus.
        let err = endpoint.receive(&[0xffu8; PUBKEY_LEN]).unwrap_err();
        assert!(matches!(err, Error::CorruptedPublicKey(ref key) if key == &[0xffu8; PUBKEY_LEN]));
        assert!(err.is_protocol_violation());

        assert_eq!(endpoint.engine.state(), State::AwaitingPeerKey);
        assert!(endpoint.engine.keys.is_none());
        assert_eq!(endpoint.engine.pending_len(), 6);
        assert!(!endpoint.circuit.has_output());
    }

    #[test]
    fn test_queued_data_keeps_call_order() {
        let mut initiator = Endpoint::new(Role::Initiator, EngineConfig::default());
        let mut responder = Endpoint::new(Role::Responder, EngineConfig::default());

        for chunk in [&b"first "[..], b"second ", b"", b"third"] {
            assert!(initiator.send(chunk).is_empty());
        }
        assert_eq!(initiator.engine.pending_len(), 18);

        run_handshake(&mut initiator, &mut responder);

        assert_eq!(initiator.engine.pending_len(), 0);
        assert_eq!(&responder.circuit.take_upstream()[..], b"first second third");

        // Later writes go straight out and are not prefixed by stale queue.
        let ciphertext = initiator.send(b"fourth");
        assert_eq!(ciphertext.len(), 6);
        responder.receive(&ciphertext).unwrap();
        assert_eq!(&responder.circuit.take_upstream()[..], b"fourth");
    }

    #[test]
    fn test_data_sent_while_searching_is_encrypted_immediately() {
        let mut initiator = Endpoint::new(Role::Initiator, EngineConfig::default());
        let mut responder = Endpoint::new(Role::Responder, EngineConfig::default());

        let initiator_hello = initiator.connect();
        let responder_hello = responder.connect();
        initiator.receive(&responder_hello).unwrap();
        assert_eq!(initiator.engine.state(), State::SearchingForMarker);

        let mut wire = initiator_hello.to_vec();
        wire.extend_from_slice(&initiator.circuit.take_downstream());
        let early = initiator.send(b"while searching");
        assert_eq!(early.len(), 15);
        wire.extend_from_slice(&early);

        responder.receive(&wire).unwrap();
        assert_eq!(responder.engine.state(), State::Open);
        assert_eq!(&responder.circuit.take_upstream()[..], b"while searching");
    }

    #[test]
    fn test_magic_found_after_any_padding() {
        for padding in [0, 1, 31, 32, 33, 1000, MAX_MESSAGE_PADDING, MAX_MESSAGE_PADDING + 1, MAX_PADDING] {
            let mut initiator = Endpoint::new(Role::Initiator, EngineConfig::default());
            let mut responder = Endpoint::new(Role::Responder, NO_PADDING);

            let initiator_hello = initiator.connect();
            let responder_hello = responder.connect();
            responder.send(b"queued reply");
            responder.receive(&initiator_hello).unwrap();
            let responder_sync = responder.circuit.take_downstream();

            let mut wire = responder_hello.to_vec();
            wire.extend(std::iter::repeat(0u8).take(padding));
            wire.extend_from_slice(&responder_sync);

            initiator.receive(&wire).unwrap();

            assert_eq!(initiator.engine.state(), State::Open, "padding {}", padding);
            assert_eq!(initiator.engine.scanned_padding(), padding);
            assert!(initiator.inbox.is_empty());
            assert_eq!(&initiator.circuit.take_upstream()[..], b"queued reply");
        }
    }

    #[test]
    fn test_padding_budget() {
        let mut endpoint = Endpoint::new(Role::Initiator, EngineConfig::default());
        endpoint.connect();
        let peer = UniformDh::new();

        endpoint.receive(peer.public_key()).unwrap();
        for _ in 0..8 {
            endpoint.receive(&[0u8; 1000]).unwrap();
        }
        endpoint.receive(&[0u8; MAX_MAGIC_SEARCH - 8000]).unwrap();

        assert_eq!(endpoint.engine.state(), State::SearchingForMarker);
        assert_eq!(endpoint.inbox.len(), MAX_MAGIC_SEARCH);
        assert_eq!(endpoint.engine.scanned_padding(), MAX_MAGIC_SEARCH - (HASH_LEN - 1));

        let err = endpoint.receive(&[0u8]).unwrap_err();
        assert!(matches!(err, Error::TooMuchPadding(n) if n == MAX_MAGIC_SEARCH + 1));
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn test_magic_split_across_fragments() {
        let mut initiator = Endpoint::new(Role::Initiator, EngineConfig::default());
        let mut responder = Endpoint::new(Role::Responder, NO_PADDING);

        let initiator_hello = initiator.connect();
        let responder_hello = responder.connect();
        responder.receive(&initiator_hello).unwrap();
        let responder_sync = responder.circuit.take_downstream();

        initiator.receive(&responder_hello).unwrap();
        initiator.receive(&[0xaau8; 100]).unwrap();
        initiator.receive(&responder_sync[..HASH_LEN / 2]).unwrap();
        assert_eq!(initiator.engine.state(), State::SearchingForMarker);
        assert_eq!(initiator.inbox.len(), 100 + HASH_LEN / 2);

        initiator.receive(&responder_sync[HASH_LEN / 2..]).unwrap();
        assert_eq!(initiator.engine.state(), State::Open);
        assert!(initiator.inbox.is_empty());
    }

    /// Everything the initiator sends to a responder with a fixed key.
    fn initiator_stream(responder_key: [u8; PUBKEY_LEN]) -> Vec<u8> {
        let mut initiator = Endpoint::new(Role::Initiator, EngineConfig::default());
        let responder_public = UniformDh::from_private_bytes(responder_key).public_key().to_vec();

        let mut stream = initiator.connect().to_vec();
        initiator.send(b"queued one, ");
        initiator.send(b"queued two, ");
        initiator.receive(&responder_public).unwrap();
        stream.extend_from_slice(&initiator.circuit.take_downstream());
        stream.extend_from_slice(&initiator.send(b"after the magic"));
        stream
    }

    #[test]
    fn test_fragmentation_invariance() {
        let responder_key = [0x3cu8; PUBKEY_LEN];
        let stream = initiator_stream(responder_key);

        let mut reference = Endpoint::with_key(Role::Responder, EngineConfig::default(), responder_key);
        reference.connect();
        reference.receive(&stream).unwrap();
        let expected = reference.circuit.take_upstream();

        assert_eq!(reference.engine.state(), State::Open);
        assert_eq!(&expected[..], b"queued one, queued two, after the magic");

        for chunk_size in [1, 2, 31, 32, 33, 191, 192, 193, 1024] {
            let mut responder = Endpoint::with_key(Role::Responder, EngineConfig::default(), responder_key);
            responder.connect();

            let mut upstream = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                responder.receive(chunk).unwrap();
                upstream.extend_from_slice(&responder.circuit.take_upstream());
            }

            assert_eq!(responder.engine.state(), State::Open, "chunk size {}", chunk_size);
            assert_eq!(upstream, expected, "chunk size {}", chunk_size);
            assert!(responder.inbox.is_empty());
        }
    }

    #[test]
    fn test_debug_hides_keys() {
        let endpoint = Endpoint::new(Role::Initiator, EngineConfig::default());
        let rendered = format!("{:?}", endpoint.engine);
        assert!(rendered.contains("Initiator"));
        assert!(rendered.contains("AwaitingPeerKey"));
    }
}
