//! Domain block list.
//!
//! Every URL is reduced to a bare host before it is stored or compared:
//! no scheme, no port, no path, no leading `www.`, lower case. Input that
//! does not yield a host is never blocked and never stored.

use std::collections::BTreeSet;

use url::Url;

use crate::error::StorageError;
use crate::storage::records::{self, DomainListRecord, BLOCKED_DOMAINS_KEY};
use crate::storage::Store;

/// Reduce `input` to the domain the block list is keyed by.
///
/// Accepts full URLs as well as bare hosts such as `youtube.com`.
pub fn normalize(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let host = match Url::parse(input) {
        Ok(url) if url.host_str().is_some() => url.host_str().map(str::to_string),
        _ if !input.contains("://") => Url::parse(&format!("http://{input}"))
            .ok()
            .and_then(|url| url.host_str().map(str::to_string)),
        _ => None,
    }?;

    let mut domain = host.to_lowercase();
    while domain.ends_with('.') {
        domain.pop();
    }
    while let Some(rest) = domain.strip_prefix("www.") {
        domain = rest.to_string();
    }

    if domain.is_empty() {
        None
    } else {
        Some(domain)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DomainGate {
    domains: BTreeSet<String>,
}

impl DomainGate {
    /// Gate over `domains`, normalizing each and dropping the unusable ones.
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            domains: domains
                .into_iter()
                .filter_map(|d| normalize(d.as_ref()))
                .collect(),
        }
    }

    /// Restore the persisted block list, or seed it with `defaults` when the
    /// store has none (or an unreadable one).
    pub fn load(store: &dyn Store, defaults: &[String]) -> Result<Self, StorageError> {
        match records::load::<DomainListRecord>(store, BLOCKED_DOMAINS_KEY) {
            Ok(Some(record)) => Ok(Self::new(record.0)),
            Ok(None) => {
                tracing::debug!("no stored block list, using defaults");
                Ok(Self::new(defaults))
            }
            Err(e @ (StorageError::SchemaMismatch { .. } | StorageError::Corrupt { .. })) => {
                tracing::warn!(error = %e, "ignoring unreadable block list");
                Ok(Self::new(defaults))
            }
            Err(e) => Err(e),
        }
    }

    /// Block the domain of `url`. Returns the normalized domain, or `None`
    /// when `url` has no usable host.
    pub fn add(&mut self, store: &dyn Store, url: &str) -> Result<Option<String>, StorageError> {
        let Some(domain) = normalize(url) else {
            tracing::debug!(%url, "ignoring unparseable domain");
            return Ok(None);
        };
        if self.domains.insert(domain.clone()) {
            tracing::info!(%domain, "domain blocked");
            self.save(store)?;
        }
        Ok(Some(domain))
    }

    /// Unblock the domain of `url`. Returns the normalized domain, or `None`
    /// when `url` has no usable host.
    pub fn remove(&mut self, store: &dyn Store, url: &str) -> Result<Option<String>, StorageError> {
        let Some(domain) = normalize(url) else {
            tracing::debug!(%url, "ignoring unparseable domain");
            return Ok(None);
        };
        if self.domains.remove(&domain) {
            tracing::info!(%domain, "domain unblocked");
            self.save(store)?;
        }
        Ok(Some(domain))
    }

    pub fn is_blocked(&self, url: &str) -> bool {
        normalize(url).is_some_and(|domain| self.domains.contains(&domain))
    }

    /// Blocked domains in lexical order.
    pub fn list(&self) -> Vec<String> {
        self.domains.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    fn save(&self, store: &dyn Store) -> Result<(), StorageError> {
        records::save(store, BLOCKED_DOMAINS_KEY, &DomainListRecord(self.list()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{GateConfig, MemoryStore};
    use proptest::prelude::*;

    fn default_gate() -> DomainGate {
        DomainGate::new(GateConfig::default().default_domains)
    }

    #[test]
    fn normalize_strips_scheme_www_path_and_case() {
        assert_eq!(
            normalize("https://WWW.YouTube.com/watch?v=x").as_deref(),
            Some("youtube.com")
        );
        assert_eq!(normalize("youtube.com").as_deref(), Some("youtube.com"));
        assert_eq!(
            normalize("http://example.com:8080/a").as_deref(),
            Some("example.com")
        );
        assert_eq!(normalize("example.com.").as_deref(), Some("example.com"));
    }

    #[test]
    fn normalize_rejects_input_without_host() {
        assert_eq!(normalize("not a url"), None);
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("file:///etc/hosts"), None);
        assert_eq!(normalize("https://"), None);
    }

    #[test]
    fn default_list_blocks_youtube_watch_page() {
        let gate = default_gate();
        assert!(gate.is_blocked("https://www.youtube.com/watch?v=x"));
        assert!(!gate.is_blocked("not a url"));
        assert!(!gate.is_blocked("https://docs.rs/tokio"));
    }

    #[test]
    fn matching_is_exact_on_domain() {
        let gate = DomainGate::new(["youtube.com"]);
        assert!(!gate.is_blocked("https://m.youtube.com/"));
        assert!(!gate.is_blocked("https://notyoutube.com/"));
    }

    #[test]
    fn add_and_remove_persist_block_list() {
        let store = MemoryStore::new();
        let mut gate = DomainGate::new(Vec::<String>::new());

        let added = gate.add(&store, "https://www.Reddit.com/r/rust").unwrap();
        assert_eq!(added.as_deref(), Some("reddit.com"));
        assert!(gate.is_blocked("reddit.com"));

        let reloaded = DomainGate::load(&store, &[]).unwrap();
        assert_eq!(reloaded.list(), vec!["reddit.com".to_string()]);

        gate.remove(&store, "reddit.com").unwrap();
        let reloaded = DomainGate::load(&store, &["x.com".into()]).unwrap();
        assert!(reloaded.is_empty());
    }

    #[test]
    fn malformed_input_is_a_noop() {
        let store = MemoryStore::new();
        let mut gate = default_gate();
        let before = gate.list();

        assert_eq!(gate.add(&store, "not a url").unwrap(), None);
        assert_eq!(gate.remove(&store, "not a url").unwrap(), None);
        assert_eq!(gate.list(), before);
        assert!(store.is_empty());
    }

    #[test]
    fn load_upgrades_bare_array() {
        let store = MemoryStore::new();
        store
            .set(BLOCKED_DOMAINS_KEY, r#"["www.twitch.tv","twitter.com"]"#)
            .unwrap();
        let gate = DomainGate::load(&store, &[]).unwrap();
        assert_eq!(gate.list(), vec!["twitch.tv".to_string(), "twitter.com".to_string()]);
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(
            scheme in prop::option::of(prop_oneof![Just("http://"), Just("https://")]),
            www in any::<bool>(),
            labels in prop::collection::vec("[a-zA-Z0-9]{1,12}", 1..4),
            tld in "[a-z]{2,6}",
            path in "(/[a-z0-9]{0,8}){0,3}",
        ) {
            let host = format!("{}.{}", labels.join("."), tld);
            let url = format!(
                "{}{}{}{}",
                scheme.unwrap_or(""),
                if www { "www." } else { "" },
                host,
                path
            );
            let once = normalize(&url);
            prop_assert!(once.is_some());
            let twice = once.as_deref().and_then(normalize);
            prop_assert_eq!(twice, once);
        }
    }
}
