//! Out-of-band control signals.
//!
//! A control signal is the UTF-8 replacement character `U+FFFD`
//! (`EF BF BD`) followed by one ASCII digit. It is sent as a whole
//! transport message on its own, outside the packet tag space, and must
//! be checked for before normal dispatch.

/// `U+FFFD` in UTF-8.
const PREFIX: [u8; 3] = [0xef, 0xbf, 0xbd];

/// Why the server ended a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlSignal {
    /// The server is shutting down.
    ServerShutdown,
    /// The server is full and refused the connection.
    AccessDenied,
}

impl ControlSignal {
    /// Encodes the four-byte signal.
    pub fn to_bytes(self) -> [u8; 4] {
        let digit = match self {
            Self::ServerShutdown => b'0',
            Self::AccessDenied => b'1',
        };
        [PREFIX[0], PREFIX[1], PREFIX[2], digit]
    }

    /// Recognizes a control signal. Any other message returns `None`.
    pub fn parse(message: &[u8]) -> Option<Self> {
        match message {
            [0xef, 0xbf, 0xbd, b'0'] => Some(Self::ServerShutdown),
            [0xef, 0xbf, 0xbd, b'1'] => Some(Self::AccessDenied),
            _ => None,
        }
    }
}

impl std::fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ServerShutdown => f.write_str("server shutting down"),
            Self::AccessDenied => f.write_str("access denied"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_bytes() {
        assert_eq!(&ControlSignal::AccessDenied.to_bytes()[..], "\u{FFFD}1".as_bytes());
        assert_eq!(&ControlSignal::ServerShutdown.to_bytes()[..], "\u{FFFD}0".as_bytes());
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            ControlSignal::parse("\u{FFFD}1".as_bytes()),
            Some(ControlSignal::AccessDenied)
        );
        assert_eq!(ControlSignal::parse("\u{FFFD}2".as_bytes()), None);
        // A packet that happens to start with the same bytes but is longer.
        assert_eq!(ControlSignal::parse("\u{FFFD}0x".as_bytes()), None);
    }
}
