//! URL grammar and validation (`spec.md` §4.F, §6): `scheme://host[:port]`.
//!
//! Parsing never performs I/O; a successful parse only guarantees the text
//! is *shaped* like an endpoint, not that it resolves.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::error::CoreError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheme {
    Tcp,
    Tcps,
}

impl Scheme {
    pub fn is_tls(self) -> bool {
        matches!(self, Scheme::Tcps)
    }

    fn as_str(self) -> &'static str {
        match self {
            Scheme::Tcp => "tcp",
            Scheme::Tcps => "tcps",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a parsed host was shaped; carried so the resolver can skip DNS
/// lookups entirely for literal addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostForm {
    Ipv4,
    Ipv6,
    DnsName,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Url {
    scheme: Scheme,
    host: String,
    host_form: HostForm,
    port: u16,
}

impl Url {
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn host_form(&self) -> HostForm {
        self.host_form
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Parses `scheme "://" host [":" port]`. Empty input, an unparseable
    /// host, a missing or zero port, or a malformed IPv4-shaped host (e.g.
    /// `10.12.14.15.16`) all fail with `BadAddress` (`spec.md` §4.F, §8
    /// boundary scenarios 1-5).
    pub fn parse(input: &str) -> Result<Url, CoreError> {
        if input.is_empty() {
            return Err(CoreError::bad_address("empty url"));
        }
        let (scheme_str, rest) = input
            .split_once("://")
            .ok_or_else(|| CoreError::bad_address(format!("missing scheme separator in '{input}'")))?;
        let scheme = match scheme_str {
            "tcp" => Scheme::Tcp,
            "tcps" => Scheme::Tcps,
            other => return Err(CoreError::bad_address(format!("unsupported scheme '{other}'"))),
        };
        if rest.is_empty() {
            return Err(CoreError::bad_address("missing host"));
        }

        let (host_part, port_part) = split_host_port(rest)?;
        if host_part.is_empty() {
            return Err(CoreError::bad_address("empty host"));
        }
        let port_part = port_part.ok_or_else(|| CoreError::bad_address(format!("missing port in '{input}'")))?;
        let port: u16 = port_part
            .parse()
            .map_err(|_| CoreError::bad_address(format!("unparseable port '{port_part}'")))?;
        if port == 0 {
            return Err(CoreError::bad_address("port 0 is not a valid endpoint"));
        }

        let (host, host_form) = classify_host(host_part)?;
        Ok(Url {
            scheme,
            host,
            host_form,
            port,
        })
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.host_form {
            HostForm::Ipv6 => write!(f, "{}://[{}]:{}", self.scheme, self.host, self.port),
            _ => write!(f, "{}://{}:{}", self.scheme, self.host, self.port),
        }
    }
}

/// Splits `host[:port]`, respecting a bracketed IPv6 literal's embedded
/// colons.
fn split_host_port(rest: &str) -> Result<(&str, Option<&str>), CoreError> {
    if let Some(stripped) = rest.strip_prefix('[') {
        let (inside, after) = stripped
            .split_once(']')
            .ok_or_else(|| CoreError::bad_address("unterminated ipv6 literal"))?;
        let port = after.strip_prefix(':').filter(|p| !p.is_empty());
        return Ok((inside, port));
    }
    match rest.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() => Ok((host, Some(port))),
        _ => Ok((rest, None)),
    }
}

fn classify_host(host: &str) -> Result<(String, HostForm), CoreError> {
    if Ipv4Addr::from_str(host).is_ok() {
        return Ok((host.to_string(), HostForm::Ipv4));
    }
    if Ipv6Addr::from_str(host).is_ok() {
        return Ok((host.to_string(), HostForm::Ipv6));
    }
    // A host made up only of digits and dots that failed to parse as IPv4
    // (extra octets, out-of-range bytes, ...) is not a valid DNS name either.
    if host.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(CoreError::bad_address(format!("malformed ipv4-shaped host '{host}'")));
    }
    if is_valid_dns_name(host) {
        return Ok((host.to_string(), HostForm::DnsName));
    }
    Err(CoreError::bad_address(format!("unparseable host '{host}'")))
}

fn is_valid_dns_name(host: &str) -> bool {
    !host.is_empty()
        && !host.starts_with('.')
        && !host.starts_with('-')
        && !host.ends_with('.')
        && !host.ends_with('-')
        && host.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_url_is_bad_address() {
        assert!(Url::parse("").is_err());
    }

    #[test]
    fn url_without_scheme_separator_is_bad_address() {
        assert!(Url::parse("abcd").is_err());
    }

    #[test]
    fn extra_dotted_ipv4_host_is_bad_address() {
        assert!(Url::parse("tcp://10.12.14.15.16:1234").is_err());
    }

    #[test]
    fn missing_port_is_bad_address() {
        assert!(Url::parse("tcp://10.12.14.15").is_err());
    }

    #[test]
    fn zero_port_is_bad_address() {
        assert!(Url::parse("tcp://10.12.14.15:0").is_err());
    }

    #[test]
    fn valid_ipv4_endpoint_parses() {
        let url = Url::parse("tcp://10.11.12.13:1234").unwrap();
        assert_eq!(url.scheme(), Scheme::Tcp);
        assert_eq!(url.host(), "10.11.12.13");
        assert_eq!(url.host_form(), HostForm::Ipv4);
        assert_eq!(url.port(), 1234);
    }

    #[test]
    fn bracketed_ipv6_endpoint_parses() {
        let url = Url::parse("tcps://[::1]:9559").unwrap();
        assert_eq!(url.scheme(), Scheme::Tcps);
        assert_eq!(url.host(), "::1");
        assert_eq!(url.host_form(), HostForm::Ipv6);
    }

    #[test]
    fn dns_name_endpoint_parses() {
        let url = Url::parse("tcp://directory.internal:9559").unwrap();
        assert_eq!(url.host_form(), HostForm::DnsName);
    }
}
