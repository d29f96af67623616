//! Cookie jar backend
//!
//! Writes follow what a browser does when a script sets a long-lived cookie
//! on the broadest domain it is allowed to:
//!
//! 1. Probe for the top domain: try `Domain=` on progressively longer
//!    suffixes of the hostname (`herokuapp.com`, then `app.herokuapp.com`)
//!    and keep the first one the jar accepts.
//! 2. Write the cookie scoped to that domain.
//! 3. Read it back; if it is not visible, write it host-only instead.
//!
//! Bare labels (`dev`) and IP addresses have no top domain and always get
//! host-only cookies. Public suffixes are never accepted as a `Domain=`.

use std::collections::BTreeSet;
use std::net::IpAddr;

use chrono::{Duration, Utc};

use crate::db::{Database, StoredCookie};
use crate::error::Result;

use super::{BackendKind, KeyValueStore};

/// Lifetime of cookies written by this backend
pub const COOKIE_MAX_AGE_DAYS: i64 = 365;

/// Name of the throwaway cookie used to probe for the top domain
const PROBE_COOKIE: &str = "__tld__";

const COOKIE_PATH: &str = "/";

/// Built-in public suffixes; extend through `[cookies] public_suffixes`
pub const DEFAULT_PUBLIC_SUFFIXES: &[&str] = &[
    "com",
    "net",
    "org",
    "edu",
    "gov",
    "io",
    "co",
    "dev",
    "app",
    "info",
    "biz",
    "me",
    "us",
    "uk",
    "co.uk",
    "org.uk",
    "ac.uk",
    "de",
    "fr",
    "jp",
    "co.jp",
    "au",
    "com.au",
    "ca",
    "localhost",
    "herokuapp.com",
    "github.io",
    "appspot.com",
    "blogspot.com",
    "netlify.app",
    "vercel.app",
    "pages.dev",
    "cloudfront.net",
    "azurewebsites.net",
];

/// Domains under which unrelated parties register names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicSuffixes(BTreeSet<String>);

impl PublicSuffixes {
    /// The built-in list
    pub fn builtin() -> Self {
        Self(
            DEFAULT_PUBLIC_SUFFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }

    /// The built-in list plus `extra`
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut suffixes = Self::builtin();
        for s in extra {
            let s = s.as_ref().trim().trim_start_matches('.').to_ascii_lowercase();
            if !s.is_empty() {
                suffixes.0.insert(s);
            }
        }
        suffixes
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.0.contains(domain)
    }
}

impl Default for PublicSuffixes {
    fn default() -> Self {
        Self::builtin()
    }
}

/// True when `host` is an IPv4/IPv6 literal or ends in a numeric label
fn is_ip_host(host: &str) -> bool {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if bare.parse::<IpAddr>().is_ok() {
        return true;
    }
    host.rsplit('.')
        .next()
        .map(|label| !label.is_empty() && label.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

/// RFC 6265 domain-match of `host` against a cookie domain
fn domain_match(host: &str, domain: &str) -> bool {
    if host == domain {
        return true;
    }
    !is_ip_host(host)
        && host.len() > domain.len()
        && host.ends_with(domain)
        && host.as_bytes()[host.len() - domain.len() - 1] == b'.'
}

/// Candidate top domains, shortest first; empty for IPs and bare labels
fn domain_levels(host: &str) -> Vec<String> {
    if is_ip_host(host) {
        return Vec::new();
    }
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 1 {
        return Vec::new();
    }
    (0..labels.len() - 1)
        .rev()
        .map(|i| labels[i..].join("."))
        .collect()
}

/// Percent-decode a stored value; stray `%` escapes or invalid UTF-8 are malformed
fn decode_value(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let well_formed = bytes.iter().enumerate().all(|(i, &b)| {
        b != b'%'
            || bytes
                .get(i + 1..i + 3)
                .map_or(false, |hex| hex.iter().all(u8::is_ascii_hexdigit))
    });
    if !well_formed {
        return None;
    }
    urlencoding::decode(raw).ok().map(|v| v.into_owned())
}

/// Cookie jar view for a single page host
pub struct CookieBackend<'a> {
    db: &'a Database,
    host: String,
    suffixes: &'a PublicSuffixes,
}

impl<'a> CookieBackend<'a> {
    pub fn new(db: &'a Database, host: impl Into<String>, suffixes: &'a PublicSuffixes) -> Self {
        Self {
            db,
            host: host.into().to_ascii_lowercase(),
            suffixes,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Whether the jar accepts `Domain=domain` from this host
    fn accepts_domain(&self, domain: &str) -> bool {
        if is_ip_host(&self.host) || !domain_match(&self.host, domain) {
            return false;
        }
        domain == self.host || !self.suffixes.contains(domain)
    }

    /// Store a cookie; returns false when the jar rejects its domain
    fn write_cookie(&self, name: &str, encoded: &str, domain: Option<&str>) -> Result<bool> {
        let (domain, host_only) = match domain {
            Some(d) if d == self.host => (d.to_string(), true),
            Some(d) if self.accepts_domain(d) => (d.to_string(), false),
            Some(d) => {
                tracing::trace!(host = %self.host, domain = d, name, "Cookie domain rejected");
                return Ok(false);
            }
            None => (self.host.clone(), true),
        };

        let now = Utc::now();
        self.db.upsert_cookie(&StoredCookie {
            name: name.to_string(),
            value: encoded.to_string(),
            domain,
            path: COOKIE_PATH.to_string(),
            host_only,
            expires_at: now + Duration::days(COOKIE_MAX_AGE_DAYS),
            created_at: now,
        })?;
        Ok(true)
    }

    fn is_visible(&self, cookie: &StoredCookie) -> bool {
        if cookie.host_only {
            cookie.domain == self.host
        } else {
            domain_match(&self.host, &cookie.domain)
        }
    }

    fn visible_cookies(&self, name: &str) -> Result<Vec<StoredCookie>> {
        Ok(self
            .db
            .cookies_named(name, Utc::now())?
            .into_iter()
            .filter(|c| self.is_visible(c))
            .collect())
    }

    /// Raw (still encoded) value of the most specific visible cookie
    fn read_raw(&self, name: &str) -> Result<Option<String>> {
        Ok(self.visible_cookies(name)?.into_iter().next().map(|c| c.value))
    }

    fn remove(&self, name: &str) -> Result<()> {
        for cookie in self.visible_cookies(name)? {
            self.db
                .delete_cookie(&cookie.name, &cookie.domain, &cookie.path)?;
        }
        Ok(())
    }

    /// Broadest domain this host may scope cookies to, if any
    pub fn top_domain(&self) -> Result<Option<String>> {
        for level in domain_levels(&self.host) {
            if !self.write_cookie(PROBE_COOKIE, "1", Some(&level))? {
                continue;
            }
            let visible = self.read_raw(PROBE_COOKIE)?.is_some();
            self.db.delete_cookie(PROBE_COOKIE, &level, COOKIE_PATH)?;
            if visible {
                return Ok(Some(level));
            }
        }
        Ok(None)
    }
}

impl KeyValueStore for CookieBackend<'_> {
    fn get(&self, key: &str) -> Option<String> {
        let raw = match self.read_raw(key) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(host = %self.host, key, error = %e, "Cookie read failed");
                return None;
            }
        };

        let value = decode_value(&raw);
        if value.is_none() {
            tracing::debug!(host = %self.host, key, "Ignoring cookie with malformed encoding");
        }
        value
    }

    fn set(&self, key: &str, value: Option<&str>) -> Result<()> {
        let Some(value) = value else {
            return self.remove(key);
        };

        let encoded = urlencoding::encode(value);
        let top = self.top_domain()?;
        self.write_cookie(key, &encoded, top.as_deref())?;

        if self.get(key).as_deref() == Some(value) {
            return Ok(());
        }

        tracing::debug!(host = %self.host, key, "Falling back to host-only cookie");
        self.write_cookie(key, &encoded, None)?;
        Ok(())
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Cookie
    }
}
