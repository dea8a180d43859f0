use thiserror::Error;

use crate::core::TabId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("session coordinator has shut down")]
    Shutdown,
    #[error("unknown tab: {0}")]
    UnknownTab(TabId),
    #[error("tab {0} has no live channel")]
    NotConnected(TabId),
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Best-effort classification of transport error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectErrorKind {
    AuthenticationFailure,
    Timeout,
    ConnectionRefused,
    HostUnreachable,
    KeyNotFound,
    DnsResolutionFailure,
    Generic,
}

impl ConnectErrorKind {
    pub fn classify(message: &str) -> Self {
        let message = message.to_ascii_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|needle| message.contains(needle));

        // Key problems usually also mention authentication, so check them first.
        if has(&[
            "no such file",
            "key not found",
            "failed to load key",
            "could not read key",
            "identity file",
        ]) {
            Self::KeyNotFound
        } else if has(&[
            "authentication failed",
            "auth fail",
            "permission denied",
            "access denied",
            "invalid password",
        ]) {
            Self::AuthenticationFailure
        } else if has(&["timed out", "timeout"]) {
            Self::Timeout
        } else if has(&["connection refused", "econnrefused"]) {
            Self::ConnectionRefused
        } else if has(&[
            "failed to lookup",
            "name or service not known",
            "nodename nor servname",
            "no such host",
            "dns",
            "enotfound",
        ]) {
            Self::DnsResolutionFailure
        } else if has(&[
            "host unreachable",
            "no route to host",
            "network is unreachable",
            "ehostunreach",
        ]) {
            Self::HostUnreachable
        } else {
            Self::Generic
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::AuthenticationFailure => "Authentication failed",
            Self::Timeout => "Connection timed out",
            Self::ConnectionRefused => "Connection refused",
            Self::HostUnreachable => "Host unreachable",
            Self::KeyNotFound => "Private key not found",
            Self::DnsResolutionFailure => "Could not resolve host",
            Self::Generic => "Connection failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_common_transport_messages() {
        let cases = [
            ("Authentication failed", ConnectErrorKind::AuthenticationFailure),
            ("Permission denied (publickey)", ConnectErrorKind::AuthenticationFailure),
            ("connection timed out after 30s", ConnectErrorKind::Timeout),
            ("Connection refused (os error 111)", ConnectErrorKind::ConnectionRefused),
            ("No route to host", ConnectErrorKind::HostUnreachable),
            (
                "failed to load key ~/.ssh/id_ed25519: No such file or directory",
                ConnectErrorKind::KeyNotFound,
            ),
            (
                "failed to lookup address information: Name or service not known",
                ConnectErrorKind::DnsResolutionFailure,
            ),
            ("channel exploded", ConnectErrorKind::Generic),
            ("", ConnectErrorKind::Generic),
        ];

        for (message, expected) in cases {
            assert_eq!(ConnectErrorKind::classify(message), expected, "{message}");
        }
    }
}
