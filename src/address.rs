// Copyright Rouven Bauer
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The `{host, port}` value type used as the universal pool and
//! routing-table key.

use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};

pub(crate) const DEFAULT_PORT: u16 = 7687;

/// A server address.
///
/// Two addresses are equal iff their `host_port()` strings are equal —
/// `resolved_host` is metadata, not part of identity, since it only records
/// *how* the address was last reached, not *which* server it names.
#[derive(Debug, Clone)]
pub struct Address {
    host: String,
    port: u16,
    resolved_host: Option<String>,
    key: String,
}

impl PartialEq for Address {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let key = Self::make_key(&host, port);
        Self {
            host,
            port,
            resolved_host: None,
            key,
        }
    }

    fn make_key(host: &str, port: u16) -> String {
        if host.contains(':') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn resolved_host(&self) -> Option<&str> {
        self.resolved_host.as_deref()
    }

    /// The canonical `host:port` string used as the pool/routing-table key.
    pub fn host_port(&self) -> &str {
        &self.key
    }

    /// Returns a new address identifying the same server but annotated with
    /// the concrete host a resolver produced for it. Addresses are immutable
    /// after construction; resolution always produces a new value.
    pub fn resolve_with(&self, resolved_host: impl Into<String>) -> Self {
        Self {
            resolved_host: Some(resolved_host.into()),
            ..self.clone()
        }
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key)
    }
}

impl From<(&str, u16)> for Address {
    fn from((host, port): (&str, u16)) -> Self {
        Self::new(host, port)
    }
}

impl From<(String, u16)> for Address {
    fn from((host, port): (String, u16)) -> Self {
        Self::new(host, port)
    }
}

impl From<&str> for Address {
    fn from(hostport: &str) -> Self {
        let (host, port) = parse_host_port(hostport);
        Self::new(host, port)
    }
}

/// Splits `host[:port]`/`[host]:port` into `(host, port)`, defaulting the
/// port when absent.
fn parse_host_port(s: &str) -> (String, u16) {
    if let Some(rest) = s.strip_prefix('[') {
        // [IPv6] or [IPv6]:port
        return match rest.rfind(']') {
            Some(end) => {
                let host = &rest[..end];
                let port = rest[end + 1..]
                    .strip_prefix(':')
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(DEFAULT_PORT);
                (host.to_string(), port)
            }
            None => (s.to_string(), DEFAULT_PORT),
        };
    }
    match s.rfind(':') {
        Some(pos) if s[..pos].find(':').is_none() => {
            // single colon => IPv4/hostname:port
            let port = s[pos + 1..].parse().unwrap_or(DEFAULT_PORT);
            (s[..pos].to_string(), port)
        }
        // zero or multiple colons (bare IPv6) => no port given
        _ => (s.to_string(), DEFAULT_PORT),
    }
}

/// Host-name resolution capability.
///
/// `resolve` is free to return the seed address itself; order is preserved
/// and used as the router-probing order.
pub trait HostResolver: Debug + Send + Sync {
    fn resolve(&self, seed: &Address) -> Vec<Address>;
}

/// A resolver that performs no resolution: the seed is the only candidate.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityResolver;

impl HostResolver for IdentityResolver {
    fn resolve(&self, seed: &Address) -> Vec<Address> {
        vec![seed.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("localhost", "localhost", 7687)]
    #[case("localhost:7687", "localhost", 7687)]
    #[case("localhost:1337", "localhost", 1337)]
    #[case("example.com", "example.com", 7687)]
    #[case("example.com:1337", "example.com", 1337)]
    #[case("127.0.0.1", "127.0.0.1", 7687)]
    #[case("127.0.0.1:1337", "127.0.0.1", 1337)]
    #[case("[::1]", "::1", 7687)]
    #[case("[::1]:1337", "::1", 1337)]
    #[case("::1", "::1", 7687)]
    fn parses_host_and_port(#[case] input: &str, #[case] host: &str, #[case] port: u16) {
        let addr = Address::from(input);
        assert_eq!(addr.host(), host);
        assert_eq!(addr.port(), port);
    }

    #[test]
    fn equality_and_hash_are_driven_by_host_port_only() {
        let a = Address::new("s1", 7687);
        let b = Address::new("s1", 7687).resolve_with("10.0.0.1");
        assert_eq!(a, b);

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn different_ports_are_different_addresses() {
        assert_ne!(Address::new("s1", 7687), Address::new("s1", 7688));
    }

    #[test]
    fn display_brackets_ipv6_hosts() {
        assert_eq!(Address::new("::1", 7687).to_string(), "[::1]:7687");
        assert_eq!(Address::new("s1", 7687).to_string(), "s1:7687");
    }

    #[test]
    fn resolve_with_is_immutable_construction() {
        let base = Address::new("s1", 7687);
        let resolved = base.resolve_with("10.0.0.5");
        assert_eq!(base.resolved_host(), None);
        assert_eq!(resolved.resolved_host(), Some("10.0.0.5"));
        assert_eq!(base, resolved);
    }

    #[test]
    fn identity_resolver_returns_seed_only() {
        let seed = Address::new("seed", 7687);
        assert_eq!(IdentityResolver.resolve(&seed), vec![seed]);
    }
}
