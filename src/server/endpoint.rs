// Endpoint value type
// host + port pair the listener binds to; "*" means every interface

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;

/// Host name that binds all interfaces.
pub const WILDCARD_HOST: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Build from a raw OS socket address, e.g. the peer of an accepted connection.
    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Host as handed to the resolver: the wildcard becomes the unspecified IPv4 address.
    pub fn resolver_host(&self) -> String {
        if self.host == WILDCARD_HOST {
            Ipv4Addr::UNSPECIFIED.to_string()
        } else {
            self.host.clone()
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(WILDCARD_HOST, 0)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::from_socket_addr(addr)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Parses `host:port`, `*:port` and `[v6]:port`.
impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("Invalid endpoint '{s}': missing port"))?;
        let port = port
            .parse::<u16>()
            .map_err(|e| format!("Invalid port in '{s}': {e}"))?;
        let host = match host.strip_prefix('[') {
            Some(inner) => inner
                .strip_suffix(']')
                .ok_or_else(|| format!("Invalid endpoint '{s}': unclosed '['"))?,
            // An unbracketed colon means an IPv6 literal without brackets
            None if host.contains(':') || host.contains(']') => {
                return Err(format!("Invalid endpoint '{s}': IPv6 hosts need brackets"));
            }
            None => host,
        };
        if host.is_empty() {
            return Err(format!("Invalid endpoint '{s}': missing host"));
        }
        Ok(Self::new(host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_rewritten_for_resolver() {
        let ep = Endpoint::new("*", 8080);
        assert_eq!(ep.resolver_host(), "0.0.0.0");
        assert_eq!(ep.host(), "*");
        assert_eq!(Endpoint::new("localhost", 1).resolver_host(), "localhost");
    }

    #[test]
    fn test_parse_and_display() {
        let ep: Endpoint = "*:8080".parse().unwrap();
        assert_eq!(ep, Endpoint::new("*", 8080));
        assert_eq!(ep.to_string(), "*:8080");

        let v6: Endpoint = "[::1]:9000".parse().unwrap();
        assert_eq!(v6.host(), "::1");
        assert_eq!(v6.to_string(), "[::1]:9000");
    }

    #[test]
    fn test_parse_errors() {
        assert!("localhost".parse::<Endpoint>().is_err());
        assert!("host:99999".parse::<Endpoint>().is_err());
        assert!(":80".parse::<Endpoint>().is_err());
        assert!("[]:80".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_parse_rejects_unbracketed_ipv6() {
        assert!("::1:80".parse::<Endpoint>().is_err());
        assert!("::1".parse::<Endpoint>().is_err());
        assert!("[::1:80".parse::<Endpoint>().is_err());
        assert!("::1]:80".parse::<Endpoint>().is_err());
        assert_eq!(
            "[fe80::1]:443".parse::<Endpoint>().unwrap(),
            Endpoint::new("fe80::1", 443)
        );
    }

    #[test]
    fn test_from_socket_addr() {
        let addr: SocketAddr = "10.0.0.7:4242".parse().unwrap();
        let ep = Endpoint::from(addr);
        assert_eq!(ep.host(), "10.0.0.7");
        assert_eq!(ep.port(), 4242);
    }
}
