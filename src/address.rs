use crate::protocol::{AddressType, ReplyCode};
use std::fmt;
use std::net::Ipv4Addr;
use tokio::{io, net::TcpStream};

/// Host is the DST.ADDR of a CONNECT request
#[derive(Debug, Clone, PartialEq)]
pub enum Host {
    IPv4(Ipv4Addr),
    DomainName(String),
}

/// Destination is the target host and port a client asked to reach
#[derive(Debug, Clone, PartialEq)]
pub struct Destination {
    pub host: Host,
    pub port: u16,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Host::IPv4(ip) => write!(f, "{ip}:{}", self.port),
            Host::DomainName(domain) => write!(f, "{domain}:{}", self.port),
        }
    }
}

/// Destination implementation block
impl Destination {
    /// connect opens the outbound TCP connection; domain names are
    /// resolved by the runtime
    pub async fn connect(&self) -> io::Result<TcpStream> {
        match &self.host {
            Host::IPv4(ip) => TcpStream::connect((*ip, self.port)).await,
            Host::DomainName(domain) => TcpStream::connect((domain.as_str(), self.port)).await,
        }
    }
}

/// parse_destination parses ATYP, DST.ADDR and DST.PORT from `data`
/// starting at `offset` without consuming anything.
///
/// Returns `Ok(None)` when the buffer does not yet hold the whole address,
/// otherwise the destination and the offset just past the port. A refusal
/// the client has to be told about is returned as the matching reply code.
pub fn parse_destination(
    data: &[u8],
    offset: usize,
) -> Result<Option<(Destination, usize)>, ReplyCode> {
    let Some(&atyp) = data.get(offset) else {
        return Ok(None);
    };

    let addr_type = AddressType::from_byte(atyp).ok_or(ReplyCode::AddrTypeUnsupported)?;

    // Push offset past ATYP
    let mut offset = offset + 1;

    let host = match addr_type {
        AddressType::IPv4 => {
            // Address (4 bytes) + port (2 bytes)
            if data.len() < offset + 6 {
                return Ok(None);
            }

            let ip_bytes: [u8; 4] = [
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            ];
            offset += 4;

            Host::IPv4(Ipv4Addr::from(ip_bytes))
        }
        AddressType::DomainName => {
            // First octet in DomainName contains the number of
            // octets to follow
            let Some(&len) = data.get(offset) else {
                return Ok(None);
            };
            let domain_len = len as usize;
            offset += 1;

            if data.len() < offset + domain_len + 2 {
                return Ok(None);
            }

            let domain = std::str::from_utf8(&data[offset..offset + domain_len])
                .map_err(|_| ReplyCode::ServerFailure)?;
            offset += domain_len;

            Host::DomainName(domain.to_owned())
        }
    };

    // Grab port -> BigEndian (network order)
    let port = u16::from_be_bytes([data[offset], data[offset + 1]]);
    offset += 2;

    Ok(Some((Destination { host, port }, offset)))
}
