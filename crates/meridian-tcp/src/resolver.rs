//! DNS resolution over `tokio::net::lookup_host`, implementing
//! `meridian-core`'s [`Resolver`] trait (`spec.md` §4.F).

use std::net::IpAddr;

use async_trait::async_trait;
use meridian_core::error::{codes, CoreError};
use meridian_core::net::{ResolveEntry, Resolver};

/// The production [`Resolver`]. `lookup_host` needs a `host:port` pair even
/// though the port is discarded here; the port the caller actually dials is
/// the one parsed out of the original URL, not this placeholder.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioResolver;

impl TokioResolver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Resolver for TokioResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<ResolveEntry>, CoreError> {
        let lookup_target = format!("{host}:0");
        let addrs = tokio::net::lookup_host(&lookup_target)
            .await
            .map_err(|err| CoreError::new(codes::HOST_NOT_FOUND, format!("dns lookup for '{host}' failed: {err}")))?;

        let entries: Vec<ResolveEntry> = addrs
            .map(|addr| match addr.ip() {
                IpAddr::V4(v4) => ResolveEntry::new(v4.to_string(), false),
                IpAddr::V6(v6) => ResolveEntry::new(v6.to_string(), true),
            })
            .collect();

        if entries.is_empty() {
            return Err(CoreError::new(codes::HOST_NOT_FOUND, format!("no addresses for '{host}'")));
        }
        Ok(entries)
    }
}
