use crate::protocol::{AuthMethod, Version};
use anyhow::{Result, bail};
use std::collections::HashMap;

/// Authenticator decides whether a username/password pair may use the proxy.
/// It is shared read-only between every session.
pub trait Authenticator: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> bool;
}

/// UserPass holds username/password credentials, either as
/// dictated server-side or as sent by a client
#[derive(Clone, Debug, PartialEq)]
pub struct UserPass {
    pub username: String,
    pub password: String,
}

impl Authenticator for UserPass {
    fn verify(&self, username: &str, password: &str) -> bool {
        self.username == username && self.password == password
    }
}

/// CredentialStore maps usernames to passwords. It is filled at
/// construction and never mutated afterwards.
#[derive(Clone, Debug, Default)]
pub struct CredentialStore {
    users: HashMap<String, String>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// with_user adds a username/password pair to the store
    pub fn with_user(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.users.insert(username.into(), password.into());
        self
    }
}

impl<U, P> FromIterator<(U, P)> for CredentialStore
where
    U: Into<String>,
    P: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (U, P)>>(iter: I) -> Self {
        Self {
            users: iter
                .into_iter()
                .map(|(u, p)| (u.into(), p.into()))
                .collect(),
        }
    }
}

impl Authenticator for CredentialStore {
    fn verify(&self, username: &str, password: &str) -> bool {
        self.users
            .get(username)
            .is_some_and(|expected| expected == password)
    }
}

/// decode_greeting peeks at a ClientHello and returns the offered methods
/// together with the number of bytes the frame occupies.
///
/// Nothing is consumed: `Ok(None)` means the frame is not complete yet.
pub fn decode_greeting(data: &[u8]) -> Result<Option<(Vec<u8>, usize)>> {
    // ClientHello format
    // +----+----------+----------+
    // |VER | NMETHODS | METHODS  |
    // +----+----------+----------+
    // | 1  |    1     | 1 to 255 |
    // +----+----------+----------+

    if data.len() < 2 {
        return Ok(None);
    }

    // Ensure version is 0x05 -> SOCKS5
    let version = data[0];
    if version != Version::SOCKS5 as u8 {
        bail!("[ERR] not SOCKS5: version {version:#04x}");
    }

    let n_methods = data[1] as usize;
    if data.len() < 2 + n_methods {
        return Ok(None);
    }

    Ok(Some((data[2..2 + n_methods].to_vec(), 2 + n_methods)))
}

/// select_auth_method picks username/password if the client offers it.
/// There is no anonymous path, so anything else is not acceptable.
pub fn select_auth_method(client_methods: &[u8]) -> AuthMethod {
    if client_methods.contains(&(AuthMethod::UserPass as u8)) {
        AuthMethod::UserPass
    } else {
        AuthMethod::NoAcceptable
    }
}

/// decode_auth peeks at a username/password request and returns the
/// credentials and the frame length once every byte has arrived
pub fn decode_auth(data: &[u8]) -> Option<(UserPass, usize)> {
    // Client Username/Password Request
    // +----+------+----------+------+----------+
    // |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
    // +----+------+----------+------+----------+
    // | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
    // +----+------+----------+------+----------+

    // VER is not checked
    let username_len = *data.get(1)? as usize;
    let username = data.get(2..2 + username_len)?;

    let password_len = *data.get(2 + username_len)? as usize;
    let start = 3 + username_len;
    let password = data.get(start..start + password_len)?;

    let creds = UserPass {
        username: String::from_utf8_lossy(username).into_owned(),
        password: String::from_utf8_lossy(password).into_owned(),
    };

    Some((creds, start + password_len))
}
