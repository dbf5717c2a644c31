//! Asynchronous name resolution (`spec.md` §4.F): `ResolveUrlList`/`ResolveUrl`
//! plus `findFirstValidIfAny`, built over a pluggable [`Resolver`] so tests
//! never touch a real DNS substrate.

use async_trait::async_trait;

use super::url::{HostForm, Url};
use crate::config::IpV6Policy;
use crate::error::CoreError;

/// One result of DNS resolution: an address literal plus its family bit.
/// Order is preserved from the resolver (`spec.md` §3 ResolveEntry).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolveEntry {
    pub address: String,
    pub is_ipv6: bool,
}

impl ResolveEntry {
    pub fn new(address: impl Into<String>, is_ipv6: bool) -> Self {
        Self {
            address: address.into(),
            is_ipv6,
        }
    }
}

/// Performs the actual host lookup. `meridian-tcp` implements this over
/// `tokio::net::lookup_host`; tests use [`MockResolver`].
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Result<Vec<ResolveEntry>, CoreError>;
}

/// `ResolveUrlList(url, cb)`: validates `raw_url` synchronously (failing
/// with `BadAddress` before any lookup per §4.F), then resolves its host --
/// skipping the resolver entirely when the host is already an IP literal.
pub async fn resolve_url_list(resolver: &dyn Resolver, raw_url: &str) -> Result<(Url, Vec<ResolveEntry>), CoreError> {
    let url = Url::parse(raw_url)?;
    let entries = match url.host_form() {
        HostForm::DnsName => resolver.resolve(url.host()).await?,
        HostForm::Ipv4 => vec![ResolveEntry::new(url.host(), false)],
        HostForm::Ipv6 => vec![ResolveEntry::new(url.host(), true)],
    };
    Ok((url, entries))
}

/// `ResolveUrl(url, ipV6Policy, cb)`: resolves then narrows to a single
/// entry via [`find_first_valid_if_any`].
pub async fn resolve_url(
    resolver: &dyn Resolver,
    raw_url: &str,
    ipv6_policy: IpV6Policy,
) -> Result<Option<ResolveEntry>, CoreError> {
    let (_, entries) = resolve_url_list(resolver, raw_url).await?;
    Ok(find_first_valid_if_any(&entries, ipv6_policy.allowed()))
}

/// Scans `entries` in order: prefers any IPv4 entry over any IPv6 entry when
/// `ipv6_allowed`; returns the first IPv4 entry when `!ipv6_allowed`; returns
/// `None` if no admissible entry exists (`spec.md` §4.F).
pub fn find_first_valid_if_any(entries: &[ResolveEntry], ipv6_allowed: bool) -> Option<ResolveEntry> {
    if let Some(first_v4) = entries.iter().find(|entry| !entry.is_ipv6) {
        return Some(first_v4.clone());
    }
    if ipv6_allowed {
        return entries.iter().find(|entry| entry.is_ipv6).cloned();
    }
    None
}

/// Resolver backed by a fixed host -> entries table, for tests and `direct`
/// topology runs that never touch real DNS.
#[derive(Default)]
pub struct MockResolver {
    entries: std::collections::HashMap<String, Vec<ResolveEntry>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(mut self, host: impl Into<String>, entries: Vec<ResolveEntry>) -> Self {
        self.entries.insert(host.into(), entries);
        self
    }
}

#[async_trait]
impl Resolver for MockResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<ResolveEntry>, CoreError> {
        self.entries
            .get(host)
            .cloned()
            .ok_or_else(|| CoreError::new(crate::error::codes::HOST_NOT_FOUND, format!("no mock entry for '{host}'")))
    }
}
