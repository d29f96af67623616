//! Page environment passed explicitly into enrichment, storage and dispatch.
//!
//! A [`PageEnvironment`] is the subset of the browser's `location` and
//! `navigator` that normalization cares about: the scheme the page was
//! delivered over, its hostname, the raw query string and the user agent.

use std::fmt;

use url::Url;

use crate::error::Result;

/// Delivery scheme of the page that issued a tracking call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
    /// Local file access (`file:`)
    File,
    /// Extension-packaged page (`chrome-extension:`)
    ChromeExtension,
    /// Any other scheme, lowercased, without the trailing colon
    Other(String),
}

impl Scheme {
    /// Parse a scheme with or without its trailing colon (`"https:"`, `"https"`).
    pub fn parse(s: &str) -> Self {
        let s = s.trim().trim_end_matches(':').to_ascii_lowercase();
        match s.as_str() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            "file" => Scheme::File,
            "chrome-extension" => Scheme::ChromeExtension,
            _ => Scheme::Other(s),
        }
    }

    /// Scheme name without the colon
    pub fn as_str(&self) -> &str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
            Scheme::File => "file",
            Scheme::ChromeExtension => "chrome-extension",
            Scheme::Other(s) => s,
        }
    }

    /// True for schemes that never reach the network (file, extension pages)
    pub fn is_local(&self) -> bool {
        matches!(self, Scheme::File | Scheme::ChromeExtension)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.as_str())
    }
}

/// Location and navigator data for the page issuing calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageEnvironment {
    pub scheme: Scheme,
    /// Hostname without port; empty for `file:` pages
    pub hostname: String,
    pub port: Option<u16>,
    /// Raw query string, including the leading `?` when non-empty
    pub search: String,
    pub user_agent: String,
}

impl PageEnvironment {
    /// Environment for a page on `hostname` with no query string and no user agent.
    pub fn new(scheme: Scheme, hostname: impl Into<String>) -> Self {
        Self {
            scheme,
            hostname: hostname.into().to_ascii_lowercase(),
            port: None,
            search: String::new(),
            user_agent: String::new(),
        }
    }

    /// Build an environment from a full page href.
    pub fn from_url(href: &str, user_agent: impl Into<String>) -> Result<Self> {
        let url = Url::parse(href)?;
        let search = match url.query() {
            Some(q) if !q.is_empty() => format!("?{}", q),
            _ => String::new(),
        };

        Ok(Self {
            scheme: Scheme::parse(url.scheme()),
            hostname: url.host_str().unwrap_or_default().to_ascii_lowercase(),
            port: url.port(),
            search,
            user_agent: user_agent.into(),
        })
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Decoded query parameters in the order they appear.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let raw = self.search.strip_prefix('?').unwrap_or(&self.search);
        url::form_urlencoded::parse(raw.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// First value of the named query parameter
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query_pairs()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Serialized origin used to key the local store
    pub fn origin(&self) -> String {
        match (&self.scheme, self.port) {
            (Scheme::File, _) => "file://".to_string(),
            (scheme, Some(port)) => format!("{}://{}:{}", scheme.as_str(), self.hostname, port),
            (scheme, None) => format!("{}://{}", scheme.as_str(), self.hostname),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_parse() {
        assert_eq!(Scheme::parse("http:"), Scheme::Http);
        assert_eq!(Scheme::parse("HTTPS"), Scheme::Https);
        assert_eq!(Scheme::parse("file:"), Scheme::File);
        assert_eq!(Scheme::parse("chrome-extension:"), Scheme::ChromeExtension);
        assert_eq!(Scheme::parse("ftp:"), Scheme::Other("ftp".to_string()));
        assert_eq!(Scheme::Https.to_string(), "https:");
    }

    #[test]
    fn test_scheme_is_local() {
        assert!(Scheme::File.is_local());
        assert!(Scheme::ChromeExtension.is_local());
        assert!(!Scheme::Http.is_local());
        assert!(!Scheme::Https.is_local());
        assert!(!Scheme::Other("moz-extension".to_string()).is_local());
    }

    #[test]
    fn test_from_url() {
        let page = PageEnvironment::from_url("https://dev:300/path?a=1", "ua").unwrap();
        assert_eq!(page.scheme, Scheme::Https);
        assert_eq!(page.hostname, "dev");
        assert_eq!(page.port, Some(300));
        assert_eq!(page.search, "?a=1");
        assert_eq!(page.user_agent, "ua");
        assert_eq!(page.origin(), "https://dev:300");
    }

    #[test]
    fn test_from_file_url() {
        let page = PageEnvironment::from_url("file:///tmp/index.html", "ua").unwrap();
        assert_eq!(page.scheme, Scheme::File);
        assert_eq!(page.hostname, "");
        assert_eq!(page.search, "");
        assert_eq!(page.origin(), "file://");
    }

    #[test]
    fn test_extension_origin() {
        let page =
            PageEnvironment::from_url("chrome-extension://abcdef/popup.html", "ua").unwrap();
        assert_eq!(page.scheme, Scheme::ChromeExtension);
        assert_eq!(page.origin(), "chrome-extension://abcdef");
    }

    #[test]
    fn test_from_url_rejects_garbage() {
        assert!(PageEnvironment::from_url("not a url", "ua").is_err());
    }

    #[test]
    fn test_query_pairs_decode() {
        let page = PageEnvironment::new(Scheme::Https, "example.com")
            .with_search("?utm_source=news+letter&utm_term=a%26b&empty=");
        assert_eq!(
            page.query_pairs(),
            vec![
                ("utm_source".to_string(), "news letter".to_string()),
                ("utm_term".to_string(), "a&b".to_string()),
                ("empty".to_string(), String::new()),
            ]
        );
        assert_eq!(page.query_param("utm_term").as_deref(), Some("a&b"));
        assert!(page.query_param("missing").is_none());
    }

    #[test]
    fn test_empty_search_has_no_pairs() {
        let page = PageEnvironment::new(Scheme::Https, "example.com");
        assert!(page.query_pairs().is_empty());
    }
}
