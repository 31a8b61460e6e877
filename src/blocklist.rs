use thiserror::Error;
use url::Url;

pub const DEFAULT_BLOCKED_DOMAINS: &[&str] = &[
    "maliciousbook.com",
    "evilvideos.com",
    "darkwebforum.com",
    "shadytok.com",
    "suspiciouspins.com",
    "ilanbigio.com",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("blocked URL: {url}")]
pub struct BlockedUrl {
    pub url: String,
    pub domain: String,
}

/// Denylist of hostnames. A URL is blocked when its host equals an entry or
/// is a subdomain of one. Hosts are compared lowercased.
#[derive(Clone, Debug)]
pub struct UrlBlocklist {
    domains: Vec<String>,
}

impl Default for UrlBlocklist {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCKED_DOMAINS.iter().copied())
    }
}

impl UrlBlocklist {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            domains: domains
                .into_iter()
                .map(|d| d.as_ref().trim().trim_end_matches('.').to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    /// Blocklist that lets everything through.
    pub fn empty() -> Self {
        Self { domains: Vec::new() }
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn check(&self, url: &str) -> Result<(), BlockedUrl> {
        let host = hostname(url);
        if host.is_empty() {
            return Ok(());
        }
        for blocked in &self.domains {
            let subdomain = host
                .strip_suffix(blocked.as_str())
                .is_some_and(|rest| rest.ends_with('.'));
            if host == *blocked || subdomain {
                return Err(BlockedUrl { url: url.to_string(), domain: blocked.clone() });
            }
        }
        Ok(())
    }
}

fn hostname(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_end_matches('.').to_ascii_lowercase()))
        .unwrap_or_default()
}
