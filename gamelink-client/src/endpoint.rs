//! Transport endpoint parsing: `tcp://`, `tls://`, `ws://`, `wss://`.

use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Byte-stream transport, optionally TLS-wrapped.
    Stream { host: String, port: u16, tls: bool },
    /// Message-oriented transport (WebSocket), optionally TLS-wrapped.
    WebSocket { url: String, tls: bool },
}

impl Endpoint {
    pub fn parse(uri: &str) -> Result<Self, ClientError> {
        if let Some(rest) = uri.strip_prefix("tcp://") {
            let (host, port) = split_host_port(rest, uri)?;
            return Ok(Endpoint::Stream {
                host,
                port,
                tls: false,
            });
        }
        if let Some(rest) = uri.strip_prefix("tls://") {
            let (host, port) = split_host_port(rest, uri)?;
            return Ok(Endpoint::Stream {
                host,
                port,
                tls: true,
            });
        }
        if uri.starts_with("ws://") {
            return Ok(Endpoint::WebSocket {
                url: uri.to_owned(),
                tls: false,
            });
        }
        if uri.starts_with("wss://") {
            return Ok(Endpoint::WebSocket {
                url: uri.to_owned(),
                tls: true,
            });
        }
        Err(ClientError::InvalidEndpoint(uri.to_owned()))
    }

    pub fn uses_websocket(&self) -> bool {
        matches!(self, Endpoint::WebSocket { .. })
    }

    pub fn uses_tls(&self) -> bool {
        match self {
            Endpoint::Stream { tls, .. } => *tls,
            Endpoint::WebSocket { tls, .. } => *tls,
        }
    }
}

fn split_host_port(rest: &str, original: &str) -> Result<(String, u16), ClientError> {
    let (host, port_str) = rest
        .rsplit_once(':')
        .ok_or_else(|| ClientError::InvalidEndpoint(original.to_owned()))?;
    let port: u16 = port_str
        .parse()
        .map_err(|_| ClientError::InvalidEndpoint(original.to_owned()))?;
    if host.is_empty() {
        return Err(ClientError::InvalidEndpoint(original.to_owned()));
    }
    Ok((host.to_owned(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp() {
        let ep = Endpoint::parse("tcp://game.example.com:7777").unwrap();
        assert_eq!(
            ep,
            Endpoint::Stream {
                host: "game.example.com".to_owned(),
                port: 7777,
                tls: false
            }
        );
        assert!(!ep.uses_websocket());
        assert!(!ep.uses_tls());
    }

    #[test]
    fn parses_tls() {
        let ep = Endpoint::parse("tls://game.example.com:7778").unwrap();
        assert!(ep.uses_tls());
        assert!(!ep.uses_websocket());
    }

    #[test]
    fn parses_ws_and_wss() {
        let ws = Endpoint::parse("ws://game.example.com/socket").unwrap();
        assert!(ws.uses_websocket());
        assert!(!ws.uses_tls());

        let wss = Endpoint::parse("wss://game.example.com/socket").unwrap();
        assert!(wss.uses_websocket());
        assert!(wss.uses_tls());
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(Endpoint::parse("http://game.example.com").is_err());
    }

    #[test]
    fn rejects_missing_port() {
        assert!(Endpoint::parse("tcp://game.example.com").is_err());
    }
}
