use crate::address::{Destination, parse_destination};
use crate::protocol::{AddressType, Command, RSV, ReplyCode, Version};
use tracing::debug;

/// Length of every CONNECT reply this server sends
pub const REPLY_LEN: usize = 10;

/// decode_connect peeks at a CONNECT request. `Ok(None)` means more bytes
/// are needed; `Err` carries the reply code for a request that is refused.
pub fn decode_connect(data: &[u8]) -> Result<Option<(Destination, usize)>, ReplyCode> {
    // SOCKS5 request format
    // +----+-----+-------+------+----------+----------+
    // |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
    // +----+-----+-------+------+----------+----------+
    // | 1  |  1  | X'00' |  1   | Variable |    2     |
    // +----+-----+-------+------+----------+----------+

    if data.len() < 4 {
        return Ok(None);
    }

    // VER and RSV are not checked
    match Command::from_byte(data[1]) {
        Some(Command::Connect) => parse_destination(data, 3),
        Some(other) => {
            debug!("{other:?} not supported");
            Err(ReplyCode::CommandNotSupported)
        }
        None => {
            debug!("unknown command {:#04x}", data[1]);
            Err(ReplyCode::CommandNotSupported)
        }
    }
}

/// encode_reply builds a CONNECT reply. BND.ADDR and BND.PORT are always
/// reported as 0.0.0.0:0, whatever the outbound socket is bound to.
pub fn encode_reply(reply_code: ReplyCode) -> [u8; REPLY_LEN] {
    // SOCKS5 reply format
    // +----+-----+-------+------+----------+----------+
    // |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
    // +----+-----+-------+------+----------+----------+
    // | 1  |  1  | X'00' |  1   | Variable |    2     |
    // +----+-----+-------+------+----------+----------+
    [
        Version::SOCKS5 as u8,
        reply_code as u8,
        RSV,
        AddressType::IPv4 as u8,
        0,
        0,
        0,
        0,
        0,
        0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Host;

    #[test]
    fn success_reply_is_all_zero_address() {
        assert_eq!(
            encode_reply(ReplyCode::Succeeded),
            [0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(encode_reply(ReplyCode::ConnectionRefused)[1], 0x05);
        assert_eq!(encode_reply(ReplyCode::AddrTypeUnsupported)[1], 0x08);
    }

    #[test]
    fn connect_ipv4() {
        let data = [0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x50];
        let (dest, len) = decode_connect(&data).unwrap().unwrap();
        assert_eq!(len, data.len());
        assert_eq!(dest.port, 80);
        assert!(matches!(dest.host, Host::IPv4(ip) if ip.is_loopback()));
    }

    #[test]
    fn command_refused_before_address_arrives() {
        assert_eq!(
            decode_connect(&[0x05, 0x02, 0x00, 0x01]),
            Err(ReplyCode::CommandNotSupported)
        );
        assert_eq!(
            decode_connect(&[0x05, 0x7F, 0x00, 0x01]),
            Err(ReplyCode::CommandNotSupported)
        );
    }

    #[test]
    fn short_request_waits() {
        assert_eq!(decode_connect(&[0x05, 0x01, 0x00]), Ok(None));
        assert_eq!(decode_connect(&[0x05, 0x01, 0x00, 0x03, 4, b'a']), Ok(None));
    }
}
