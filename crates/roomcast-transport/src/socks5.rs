//! SOCKS5 client handshake (RFC 1928), no-auth only.
//!
//! When a proxy is configured the client connects to the proxy first,
//! runs this handshake to have the proxy open a tunnel to the real
//! server, and then speaks the normal framing through the tunnel.
//!
//! ```text
//! client → proxy   05 01 00                      greeting: 1 method, no-auth
//! proxy  → client  05 00                         method chosen
//! client → proxy   05 01 00 03 len host.. hi lo  CONNECT host:port
//! proxy  → client  05 00 00 atyp addr.. hi lo    succeeded
//! ```

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::TransportError;

/// Default port of a SOCKS5 proxy.
pub const DEFAULT_SOCKS5_PORT: u16 = 1080;

/// How long a proxy gets to finish the handshake when no read timeout
/// is configured.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

const VERSION: u8 = 0x05;
const NO_AUTH: u8 = 0x00;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

/// The greeting offering only the no-auth method.
pub fn greeting() -> [u8; 3] {
    [VERSION, 0x01, NO_AUTH]
}

/// Checks the proxy's method selection.
pub fn check_greeting(reply: &[u8]) -> Result<(), TransportError> {
    match reply {
        [VERSION, NO_AUTH] => Ok(()),
        other => Err(TransportError::Socks5(format!(
            "proxy refused no-auth method: {other:02x?}"
        ))),
    }
}

/// Builds a CONNECT request with domain-name addressing.
pub fn connect_request(host: &str, port: u16) -> Result<Vec<u8>, TransportError> {
    let host_len = u8::try_from(host.len())
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| TransportError::Socks5(format!("bad target host length {}", host.len())))?;
    let mut request = Vec::with_capacity(7 + host.len());
    request.extend_from_slice(&[VERSION, CMD_CONNECT, 0x00, ATYP_DOMAIN, host_len]);
    request.extend_from_slice(host.as_bytes());
    request.extend_from_slice(&port.to_be_bytes());
    Ok(request)
}

/// Checks the first two bytes of the CONNECT reply.
pub fn check_connect_reply(reply: &[u8]) -> Result<(), TransportError> {
    match reply {
        [VERSION, 0x00, ..] => Ok(()),
        [VERSION, code, ..] => Err(TransportError::Socks5(format!(
            "proxy connect failed with reply code {code:#04x}"
        ))),
        other => Err(TransportError::Socks5(format!("malformed connect reply: {other:02x?}"))),
    }
}

/// Runs the full handshake over an already connected proxy stream.
///
/// On success the stream is a tunnel to `host:port`.
pub async fn handshake<S>(stream: &mut S, host: &str, port: u16) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = connect_request(host, port)?;

    stream.write_all(&greeting()).await.map_err(TransportError::SendFailed)?;
    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await.map_err(TransportError::ReceiveFailed)?;
    check_greeting(&choice)?;

    stream.write_all(&request).await.map_err(TransportError::SendFailed)?;
    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await.map_err(TransportError::ReceiveFailed)?;
    check_connect_reply(&head)?;

    // Consume the bound address so the tunnel starts clean.
    let addr_len = match head[3] {
        ATYP_IPV4 => 4,
        ATYP_IPV6 => 16,
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await.map_err(TransportError::ReceiveFailed)?;
            usize::from(len[0])
        }
        other => {
            return Err(TransportError::Socks5(format!("unknown bound address type {other:#04x}")));
        }
    };
    let mut bound = vec![0u8; addr_len + 2];
    stream.read_exact(&mut bound).await.map_err(TransportError::ReceiveFailed)?;

    tracing::debug!(host, port, "socks5 tunnel established");
    Ok(())
}

/// [`handshake`], failing if the proxy has not finished within `limit`.
pub async fn handshake_within<S>(
    stream: &mut S,
    host: &str,
    port: u16,
    limit: Duration,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio::time::timeout(limit, handshake(stream, host, port))
        .await
        .map_err(|_| TransportError::Socks5(format!("proxy silent for {limit:?}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_request_layout() {
        assert_eq!(
            connect_request("ab.c", 6500).unwrap(),
            vec![0x05, 0x01, 0x00, 0x03, 4, b'a', b'b', b'.', b'c', 0x19, 0x64]
        );
        assert!(connect_request("", 1).is_err());
        assert!(connect_request(&"x".repeat(256), 1).is_err());
    }

    #[test]
    fn test_reply_checks() {
        assert!(check_greeting(&[0x05, 0x00]).is_ok());
        assert!(check_greeting(&[0x05, 0xff]).is_err());
        assert!(check_greeting(&[0x05, 0x00, 0x00]).is_err());
        assert!(check_connect_reply(&[0x05, 0x00, 0x00, 0x01]).is_ok());
        assert!(check_connect_reply(&[0x05, 0x05]).is_err());
        assert!(check_connect_reply(&[0x05]).is_err());
    }

    #[tokio::test]
    async fn test_handshake_against_fake_proxy() {
        let (mut client, mut proxy) = tokio::io::duplex(256);

        let proxy_task = tokio::spawn(async move {
            let mut greeting = [0u8; 3];
            proxy.read_exact(&mut greeting).await.unwrap();
            assert_eq!(greeting, [0x05, 0x01, 0x00]);
            proxy.write_all(&[0x05, 0x00]).await.unwrap();

            let mut head = [0u8; 5];
            proxy.read_exact(&mut head).await.unwrap();
            let mut rest = vec![0u8; head[4] as usize + 2];
            proxy.read_exact(&mut rest).await.unwrap();
            assert_eq!(&rest[..9], b"game.test");

            proxy
                .write_all(&[0x05, 0x00, 0x00, 0x01, 10, 0, 0, 1, 0x1f, 0x90])
                .await
                .unwrap();
            proxy.write_all(b"tunnel").await.unwrap();
        });

        handshake(&mut client, "game.test", 6500).await.unwrap();
        let mut tail = [0u8; 6];
        client.read_exact(&mut tail).await.unwrap();
        assert_eq!(&tail, b"tunnel");
        proxy_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_refused() {
        let (mut client, mut proxy) = tokio::io::duplex(64);
        tokio::spawn(async move {
            let mut greeting = [0u8; 3];
            let _ = proxy.read_exact(&mut greeting).await;
            let _ = proxy.write_all(&[0x05, 0xff]).await;
        });
        let err = handshake(&mut client, "game.test", 6500).await.unwrap_err();
        assert!(matches!(err, TransportError::Socks5(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_proxy_times_out() {
        let (mut client, _proxy) = tokio::io::duplex(64);
        let err = handshake_within(&mut client, "game.test", 6500, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Socks5(ref m) if m.contains("silent")));
    }
}
