//! `host[:port]` parsing for configuration strings.

use crate::TransportError;

/// Splits an address string into host and port.
///
/// Accepted forms:
///
/// - `[2001:db8::1]:6500` or `[2001:db8::1]` (bracketed IPv6)
/// - `example.org:6500` or `10.0.0.1:6500`
/// - `example.org` (uses `default_port`)
/// - `2001:db8::1` (bare IPv6, uses `default_port`)
pub fn parse_address(address: &str, default_port: u16) -> Result<(String, u16), TransportError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(TransportError::InvalidAddress("empty address".into()));
    }

    if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| TransportError::InvalidAddress(format!("unclosed bracket in {address}")))?;
        if host.is_empty() {
            return Err(TransportError::InvalidAddress(format!("empty host in {address}")));
        }
        let port = match tail {
            "" => default_port,
            _ => {
                let port = tail.strip_prefix(':').ok_or_else(|| {
                    TransportError::InvalidAddress(format!("unexpected text after bracket in {address}"))
                })?;
                parse_port(address, port)?
            }
        };
        return Ok((host.to_string(), port));
    }

    match address.split_once(':') {
        // More than one colon and no brackets: a bare IPv6 literal.
        Some((_, rest)) if rest.contains(':') => Ok((address.to_string(), default_port)),
        Some((host, port)) => {
            if host.is_empty() {
                return Err(TransportError::InvalidAddress(format!("empty host in {address}")));
            }
            Ok((host.to_string(), parse_port(address, port)?))
        }
        None => Ok((address.to_string(), default_port)),
    }
}

fn parse_port(address: &str, port: &str) -> Result<u16, TransportError> {
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(TransportError::InvalidAddress(format!(
            "bad port `{port}` in {address}"
        ))),
        Ok(port) => Ok(port),
    }
}
