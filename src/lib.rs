//! A SOCKS5 CONNECT proxy with username/password authentication
//!
//! ## SOCKS5 Implementation
//!
//! - Features:
//!     - CONNECT with IPv4 and domain name destinations
//!     - Username/Password Authentication, required for every client
//!     - Pluggable credential lookup through [`Authenticator`]
//!     - Incremental handshake parsing, tolerant of arbitrarily split reads
//!     - Async using tokio, one task per client connection
//! - [SOCKS5 (RFC 1928)](https://datatracker.ietf.org/doc/html/rfc1928)
//! - [Username/Password Authentication (RFC 1929)](https://datatracker.ietf.org/doc/html/rfc1929)
//!
//! # Example
//! ```no_run
//! use authsocks::{CredentialStore, Socks5Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let users = CredentialStore::new().with_user("login", "password");
//!     let server = Socks5Server::new("127.0.0.1:1080").with_authenticator(users);
//!     server.run().await
//! }
//! ```

pub mod address;
pub mod auth;
pub mod commands;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod session;

// Re-export main types at crate root for convenience
pub use address::{Destination, Host};
pub use auth::{Authenticator, CredentialStore, UserPass};
pub use protocol::{AuthMethod, Command, ReplyCode, Version};
pub use relay::{RelayLink, RelayStats};
pub use server::Socks5Server;
pub use session::{Action, Phase, Session};
