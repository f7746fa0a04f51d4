//! Per-connection SOCKS5 handshake state machine.
//!
//! The [`Session`] does no I/O. Bytes read from the client are handed to
//! [`Session::feed`], which accumulates them and decodes as many complete
//! frames as the current phase allows, returning the [`Action`]s the
//! connection has to carry out. Incomplete frames are left in the buffer
//! untouched until more bytes arrive.

use crate::{
    address::Destination,
    auth::{Authenticator, decode_auth, decode_greeting, select_auth_method},
    commands::{REPLY_LEN, decode_connect, encode_reply},
    protocol::{AUTH_VERSION, AuthMethod, AuthStatus, ReplyCode, Version},
};
use bytes::{Buf, Bytes, BytesMut};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Phase of the handshake. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Init,
    Auth,
    Connect,
    Relay,
}

/// Action is something the connection must do on behalf of the session,
/// in the order returned
#[derive(Debug, PartialEq)]
pub enum Action {
    /// Write these bytes to the client
    Reply(Vec<u8>),
    /// Close the client connection
    Close,
    /// Open an outbound connection, then call [`Session::establish`] or
    /// [`Session::outbound_failed`]
    Connect(Destination),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Gate {
    /// Decoding frames
    Open,
    /// CONNECT decoded, bytes are held for the relay
    AwaitingOutbound,
    /// Nothing more is decoded and input is discarded
    Halted,
}

pub struct Session {
    phase: Phase,
    gate: Gate,
    pending: BytesMut,
    authenticator: Arc<dyn Authenticator>,
}

impl Session {
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            phase: Phase::Init,
            gate: Gate::Open,
            pending: BytesMut::new(),
            authenticator,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// is_halted is true once the session will never act on input again
    pub fn is_halted(&self) -> bool {
        self.gate == Gate::Halted
    }

    /// pending returns the bytes received but not consumed by a frame
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// feed appends client bytes and decodes every complete frame
    pub fn feed(&mut self, data: &[u8]) -> Vec<Action> {
        let mut actions = Vec::new();

        match self.gate {
            Gate::Halted => return actions,
            Gate::AwaitingOutbound => {
                self.pending.extend_from_slice(data);
                return actions;
            }
            Gate::Open => self.pending.extend_from_slice(data),
        }

        while self.gate == Gate::Open {
            let progressed = match self.phase {
                Phase::Init => self.greeting(&mut actions),
                Phase::Auth => self.authenticate(&mut actions),
                Phase::Connect => self.connect_request(&mut actions),
                Phase::Relay => false,
            };

            if !progressed {
                break;
            }
        }

        actions
    }

    /// establish moves the session to RELAY once the outbound connection is
    /// up, handing over any bytes that arrived after the CONNECT request
    pub fn establish(&mut self) -> Bytes {
        debug_assert_eq!(self.gate, Gate::AwaitingOutbound);

        self.phase = Phase::Relay;
        self.gate = Gate::Halted;
        self.pending.split().freeze()
    }

    /// outbound_failed halts the session and returns the reply the client
    /// gets before being disconnected
    pub fn outbound_failed(&mut self) -> [u8; REPLY_LEN] {
        self.halt();
        encode_reply(ReplyCode::ConnectionRefused)
    }

    fn halt(&mut self) {
        self.gate = Gate::Halted;
        self.pending.clear();
    }

    fn greeting(&mut self, actions: &mut Vec<Action>) -> bool {
        let (methods, len) = match decode_greeting(&self.pending) {
            Ok(Some(frame)) => frame,
            Ok(None) => return false,
            Err(e) => {
                debug!("{e}");
                self.halt();
                actions.push(Action::Close);
                return true;
            }
        };
        self.pending.advance(len);

        let method = select_auth_method(&methods);

        // ServerChoice method selection reply format
        // +----+--------+
        // |VER | METHOD |
        // +----+--------+
        // | 1  |   1    |
        // +----+--------+
        actions.push(Action::Reply(vec![Version::SOCKS5 as u8, method as u8]));

        match method {
            AuthMethod::UserPass => self.phase = Phase::Auth,
            AuthMethod::NoAcceptable => {
                debug!("client offered no acceptable method: {methods:?}");
                self.halt();
                actions.push(Action::Close);
            }
        }

        true
    }

    fn authenticate(&mut self, actions: &mut Vec<Action>) -> bool {
        let Some((creds, len)) = decode_auth(&self.pending) else {
            return false;
        };
        self.pending.advance(len);

        let status = if self.authenticator.verify(&creds.username, &creds.password) {
            AuthStatus::Success
        } else {
            AuthStatus::Failure
        };

        // Username/Password Server response
        // +----+--------+
        // |VER | STATUS |
        // +----+--------+
        // | 1  |   1    |
        // +----+--------+
        actions.push(Action::Reply(vec![AUTH_VERSION, status as u8]));

        match status {
            AuthStatus::Success => {
                info!("user {} authenticated", creds.username);
                self.phase = Phase::Connect;
            }
            AuthStatus::Failure => {
                warn!("authentication failed for user {}", creds.username);
                self.halt();
                actions.push(Action::Close);
            }
        }

        true
    }

    fn connect_request(&mut self, actions: &mut Vec<Action>) -> bool {
        match decode_connect(&self.pending) {
            Ok(None) => false,
            Ok(Some((destination, len))) => {
                self.pending.advance(len);
                self.gate = Gate::AwaitingOutbound;
                actions.push(Action::Connect(destination));
                true
            }
            Err(reply_code) => {
                debug!("refusing CONNECT request: {reply_code:?}");
                self.halt();
                actions.push(Action::Reply(encode_reply(reply_code).to_vec()));

                // A malformed address closes the connection, other
                // refusals leave it open and silent
                if reply_code == ReplyCode::ServerFailure {
                    actions.push(Action::Close);
                }
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Host;
    use crate::auth::CredentialStore;
    use std::net::Ipv4Addr;

    fn session() -> Session {
        Session::new(Arc::new(CredentialStore::from_iter([(
            "login", "password",
        )])))
    }

    fn auth_frame(user: &[u8], pass: &[u8]) -> Vec<u8> {
        let mut frame = vec![0x01, user.len() as u8];
        frame.extend_from_slice(user);
        frame.push(pass.len() as u8);
        frame.extend_from_slice(pass);
        frame
    }

    fn handshake_bytes() -> Vec<u8> {
        let mut data = vec![0x05, 0x02, 0x00, 0x02];
        data.extend(auth_frame(b"login", b"password"));
        data.extend_from_slice(&[0x05, 0x01, 0x00, 0x03, 11]);
        data.extend_from_slice(b"example.com");
        data.extend_from_slice(&8080u16.to_be_bytes());
        data
    }

    fn expected_actions() -> Vec<Action> {
        vec![
            Action::Reply(vec![0x05, 0x02]),
            Action::Reply(vec![0x01, 0x00]),
            Action::Connect(Destination {
                host: Host::DomainName("example.com".into()),
                port: 8080,
            }),
        ]
    }

    #[test]
    fn whole_handshake_in_one_piece() {
        let mut session = session();
        assert_eq!(session.feed(&handshake_bytes()), expected_actions());
        assert_eq!(session.phase(), Phase::Connect);
        assert!(session.pending().is_empty());
    }

    #[test]
    fn handshake_byte_by_byte() {
        let mut session = session();
        let mut actions = Vec::new();
        for byte in handshake_bytes() {
            actions.extend(session.feed(&[byte]));
        }
        assert_eq!(actions, expected_actions());
        assert!(session.pending().is_empty());
    }

    #[test]
    fn handshake_in_uneven_chunks() {
        let data = handshake_bytes();
        for chunk in 2..data.len() {
            let mut session = session();
            let mut actions = Vec::new();
            for piece in data.chunks(chunk) {
                actions.extend(session.feed(piece));
            }
            assert_eq!(actions, expected_actions(), "chunk size {chunk}");
        }
    }

    #[test]
    fn partial_greeting_keeps_bytes() {
        let mut session = session();
        assert!(session.feed(&[0x05, 0x03, 0x00]).is_empty());
        assert_eq!(session.pending(), &[0x05, 0x03, 0x00]);
        assert_eq!(session.phase(), Phase::Init);

        assert_eq!(
            session.feed(&[0x01, 0x02]),
            vec![Action::Reply(vec![0x05, 0x02])]
        );
        assert_eq!(session.phase(), Phase::Auth);
    }

    #[test]
    fn no_acceptable_method() {
        let mut session = session();
        assert_eq!(
            session.feed(&[0x05, 0x01, 0x00]),
            vec![Action::Reply(vec![0x05, 0xFF]), Action::Close]
        );
        assert_eq!(session.phase(), Phase::Init);
        assert!(session.is_halted());
        assert!(session.feed(&auth_frame(b"login", b"password")).is_empty());
    }

    #[test]
    fn socks4_closes_without_reply() {
        let mut session = session();
        assert!(session.feed(&[0x04]).is_empty());
        assert_eq!(session.feed(&[0x01]), vec![Action::Close]);
        assert!(session.is_halted());
    }

    #[test]
    fn wrong_password_closes() {
        let mut session = session();
        session.feed(&[0x05, 0x01, 0x02]);
        assert_eq!(
            session.feed(&auth_frame(b"login", b"hunter2")),
            vec![Action::Reply(vec![0x01, 0x01]), Action::Close]
        );
        assert_eq!(session.phase(), Phase::Auth);
    }

    #[test]
    fn unsupported_command_halts_without_close() {
        let mut session = session();
        session.feed(&[0x05, 0x01, 0x02]);
        session.feed(&auth_frame(b"login", b"password"));

        let actions = session.feed(&[0x05, 0x02, 0x00, 0x01, 127, 0, 0, 1, 0, 80]);
        assert_eq!(
            actions,
            vec![Action::Reply(vec![0x05, 0x07, 0x00, 0x01, 0, 0, 0, 0, 0, 0])]
        );
        assert_eq!(session.phase(), Phase::Connect);
        assert!(session.is_halted());

        // A retry on the same session is ignored
        assert!(session.feed(&[0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0, 80]).is_empty());
    }

    #[test]
    fn ipv6_refused() {
        let mut session = session();
        session.feed(&[0x05, 0x01, 0x02]);
        session.feed(&auth_frame(b"login", b"password"));

        let actions = session.feed(&[0x05, 0x01, 0x00, 0x04]);
        assert_eq!(
            actions,
            vec![Action::Reply(encode_reply(ReplyCode::AddrTypeUnsupported).to_vec())]
        );
    }

    #[test]
    fn malformed_domain_closes() {
        let mut session = session();
        session.feed(&[0x05, 0x01, 0x02]);
        session.feed(&auth_frame(b"login", b"password"));

        let actions = session.feed(&[0x05, 0x01, 0x00, 0x03, 1, 0xFF, 0, 80]);
        assert_eq!(
            actions,
            vec![
                Action::Reply(encode_reply(ReplyCode::ServerFailure).to_vec()),
                Action::Close
            ]
        );
    }

    #[test]
    fn bytes_after_connect_are_handed_to_relay() {
        let mut session = session();
        session.feed(&[0x05, 0x01, 0x02]);
        session.feed(&auth_frame(b"login", b"password"));

        let mut request = vec![0x05, 0x01, 0x00, 0x01, 10, 0, 0, 1, 0x1F, 0x90];
        request.extend_from_slice(b"GET /");
        let actions = session.feed(&request);
        assert_eq!(
            actions,
            vec![Action::Connect(Destination {
                host: Host::IPv4(Ipv4Addr::new(10, 0, 0, 1)),
                port: 8080,
            })]
        );

        // Not parsed as another request while the outbound connect is pending
        assert!(session.feed(b" HTTP/1.1").is_empty());

        let early = session.establish();
        assert_eq!(&early[..], b"GET / HTTP/1.1");
        assert_eq!(session.phase(), Phase::Relay);
        assert!(session.feed(b"more").is_empty());
    }

    #[test]
    fn outbound_failure_reply() {
        let mut session = session();
        session.feed(&[0x05, 0x01, 0x02]);
        session.feed(&auth_frame(b"login", b"password"));
        session.feed(&[0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0, 1]);

        assert_eq!(
            session.outbound_failed(),
            [0x05, 0x05, 0x00, 0x01, 0, 0, 0, 0, 0, 0]
        );
        assert!(session.is_halted());
        assert_eq!(session.phase(), Phase::Connect);
    }
}
