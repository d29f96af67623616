//! Context enrichment
//!
//! Builds the `context` object of an envelope from whatever the caller
//! supplied plus what can be learned from the page:
//!
//! - `library`: caller value verbatim, else `{name: "analytics.js", version}`
//! - `userAgent`: always the page's user agent
//! - `campaign`: parsed from `utm_*` query parameters
//! - `referrer`: from a referrer-network query parameter, else from the
//!   persisted slot; whichever is found is persisted again. Extra keys of a
//!   caller-supplied referrer object are kept next to `id` and `type`.
//!
//! Missing or malformed inputs only ever omit the optional fields.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::page::PageEnvironment;
use crate::storage::KeyValueStore;

/// Storage key of the persisted referrer slot
pub const REFERRER_KEY: &str = "s:context.referrer";

/// Library name reported when the caller does not supply one
pub const LIBRARY_NAME: &str = "analytics.js";

/// Library version reported when the caller does not supply one
pub const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Built-in referrer networks: query parameter name -> network type
pub const DEFAULT_REFERRER_NETWORKS: &[(&str, &str)] =
    &[("btid", "dataxu"), ("urid", "millennial-media")];

/// UTM campaign parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Campaign {
    /// Campaign from the page query string; `None` when no `utm_*` parameter is present
    pub fn from_page(page: &PageEnvironment) -> Option<Self> {
        let mut campaign = Campaign::default();
        let mut found = false;

        for (key, value) in page.query_pairs() {
            let slot = match key.as_str() {
                "utm_source" => &mut campaign.source,
                "utm_medium" => &mut campaign.medium,
                "utm_term" => &mut campaign.term,
                "utm_content" => &mut campaign.content,
                "utm_campaign" => &mut campaign.name,
                _ => continue,
            };
            // First occurrence wins
            if slot.is_none() {
                *slot = Some(value);
                found = true;
            }
        }

        found.then_some(campaign)
    }
}

/// Traffic source resolved from a referrer-network parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Referrer {
    pub id: String,
    #[serde(rename = "type")]
    pub referrer_type: String,
    /// Caller-supplied keys kept alongside `id` and `type`
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Referrer {
    pub fn new(id: impl Into<String>, referrer_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            referrer_type: referrer_type.into(),
            extra: Map::new(),
        }
    }

    /// Keep caller keys other than `id` and `type`; resolved values win
    fn merge_caller(&mut self, caller: Map<String, Value>) {
        for (key, value) in caller {
            if key != "id" && key != "type" {
                self.extra.entry(key).or_insert(value);
            }
        }
    }
}

/// Lookup table from short query parameter name to network type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferrerNetworks(BTreeMap<String, String>);

impl ReferrerNetworks {
    /// The built-in table
    pub fn builtin() -> Self {
        Self(
            DEFAULT_REFERRER_NETWORKS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    /// The built-in table with `extra` entries merged over it
    pub fn with_extra(extra: &BTreeMap<String, String>) -> Self {
        let mut networks = Self::builtin();
        networks
            .0
            .extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        networks
    }

    pub fn lookup(&self, param: &str) -> Option<&str> {
        self.0.get(param).map(String::as_str)
    }

    /// First recognized, non-empty network parameter in query order
    pub fn from_page(&self, page: &PageEnvironment) -> Option<Referrer> {
        page.query_pairs()
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .find_map(|(key, value)| {
                self.lookup(&key)
                    .map(|network| Referrer::new(value, network))
            })
    }
}

impl Default for ReferrerNetworks {
    fn default() -> Self {
        Self::builtin()
    }
}

/// The `context` object of an envelope
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    pub library: Value,
    pub user_agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign: Option<Campaign>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<Referrer>,
    /// Caller-supplied keys, carried through unchanged
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Builds [`Context`] values for one write key's envelopes
#[derive(Debug, Clone)]
pub struct ContextEnricher {
    library: Value,
    networks: ReferrerNetworks,
}

impl Default for ContextEnricher {
    fn default() -> Self {
        Self::new(ReferrerNetworks::builtin())
    }
}

impl ContextEnricher {
    pub fn new(networks: ReferrerNetworks) -> Self {
        Self {
            library: default_library(LIBRARY_VERSION),
            networks,
        }
    }

    /// Report a different library version by default
    pub fn with_library_version(mut self, version: &str) -> Self {
        self.library = default_library(version);
        self
    }

    /// Build the context for one call.
    ///
    /// `context` wins over `options` when both are supplied; `options` is only
    /// promoted when `context` is absent.
    pub fn enrich(
        &self,
        context: Option<Map<String, Value>>,
        options: Option<Map<String, Value>>,
        page: &PageEnvironment,
        store: &dyn KeyValueStore,
    ) -> Context {
        let mut extra = context.or(options).unwrap_or_default();

        let library = match extra.remove("library") {
            Some(Value::Null) | None => self.library.clone(),
            Some(library) => library,
        };
        extra.remove("userAgent");

        let campaign = Campaign::from_page(page);
        if campaign.is_some() {
            extra.remove("campaign");
        }

        let referrer = self.resolve_referrer(page, store).map(|mut referrer| {
            if let Some(Value::Object(caller)) = extra.remove("referrer") {
                referrer.merge_caller(caller);
            }
            referrer
        });

        Context {
            library,
            user_agent: page.user_agent.clone(),
            campaign,
            referrer,
            extra,
        }
    }

    /// Referrer from the query string, else the persisted slot.
    ///
    /// Whatever is resolved is written back so it keeps following the
    /// visitor across page loads.
    pub fn resolve_referrer(
        &self,
        page: &PageEnvironment,
        store: &dyn KeyValueStore,
    ) -> Option<Referrer> {
        let referrer = self
            .networks
            .from_page(page)
            .or_else(|| read_persisted_referrer(store))?;

        match serde_json::to_string(&referrer) {
            Ok(json) => {
                if let Err(e) = store.set(REFERRER_KEY, Some(&json)) {
                    tracing::warn!(error = %e, backend = ?store.kind(), "Failed to persist referrer");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to encode referrer"),
        }

        Some(referrer)
    }
}

fn default_library(version: &str) -> Value {
    serde_json::json!({
        "name": LIBRARY_NAME,
        "version": version,
    })
}

/// Previously persisted referrer; unparsable values count as absent
pub fn read_persisted_referrer(store: &dyn KeyValueStore) -> Option<Referrer> {
    let raw = store.get(REFERRER_KEY)?;
    match serde_json::from_str(&raw) {
        Ok(referrer) => Some(referrer),
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring unparsable persisted referrer");
            None
        }
    }
}
