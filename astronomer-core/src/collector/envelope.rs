//! Raw calls and the envelopes built from them
//!
//! A [`RawCall`] is what the host runtime hands over: a call type, its primary
//! arguments, an optional explicit user id, and the caller's `context` /
//! `options` objects. [`EnvelopeBuilder::build`] turns it into an immutable
//! [`Envelope`] ready for the ingestion API.
//!
//! ## Wire shape
//!
//! ```json
//! {
//!   "type": "track",
//!   "event": "Signed Up",
//!   "properties": { "plan": "pro" },
//!   "userId": "user-1",
//!   "anonymousId": "0b6f0a7e-5d3c-4c8e-9a8b-2f1e6c7d9a10",
//!   "context": { "library": { "name": "analytics.js", "version": "0.1.0" }, "userAgent": "..." },
//!   "messageId": "9f1d2c3b-...",
//!   "timestamp": "2024-05-01T12:00:00Z",
//!   "sentAt": "2024-05-01T12:00:00.120Z",
//!   "writeKey": "oq0vdlg7yi"
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::{Context, ContextEnricher};
use crate::error::{Error, Result};
use crate::identity::{generate_id, Identity, IdentityResolver, UserState};
use crate::page::PageEnvironment;
use crate::storage::KeyValueStore;

/// Ingestion route for each call type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Page,
    Identify,
    Track,
    Group,
    Alias,
}

impl Endpoint {
    /// Path under the API version prefix
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Page => "/p",
            Endpoint::Identify => "/i",
            Endpoint::Track => "/t",
            Endpoint::Group => "/g",
            Endpoint::Alias => "/a",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        match path {
            "/p" => Some(Endpoint::Page),
            "/i" => Some(Endpoint::Identify),
            "/t" => Some(Endpoint::Track),
            "/g" => Some(Endpoint::Group),
            "/a" => Some(Endpoint::Alias),
            _ => None,
        }
    }
}

/// Call-type specific arguments of a raw call
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CallKind {
    Page {
        #[serde(default)]
        category: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        properties: Map<String, Value>,
    },
    Identify {
        #[serde(default)]
        traits: Map<String, Value>,
    },
    Track {
        #[serde(default)]
        event: Option<String>,
        #[serde(default)]
        properties: Map<String, Value>,
    },
    Group {
        #[serde(default, rename = "groupId")]
        group_id: Option<String>,
        #[serde(default)]
        traits: Map<String, Value>,
    },
    Alias {
        #[serde(default)]
        to: Option<String>,
        #[serde(default)]
        from: Option<String>,
    },
}

impl CallKind {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            CallKind::Page { .. } => Endpoint::Page,
            CallKind::Identify { .. } => Endpoint::Identify,
            CallKind::Track { .. } => Endpoint::Track,
            CallKind::Group { .. } => Endpoint::Group,
            CallKind::Alias { .. } => Endpoint::Alias,
        }
    }
}

/// A tracking call as described by the host runtime
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCall {
    #[serde(flatten)]
    pub kind: CallKind,

    /// Explicit user id; ignored by alias calls, which use `to`
    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub context: Option<Map<String, Value>>,

    #[serde(default)]
    pub options: Option<Map<String, Value>>,

    /// When the call was made; defaults to build time
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl RawCall {
    pub fn new(kind: CallKind) -> Self {
        Self {
            kind,
            user_id: None,
            context: None,
            options: None,
            timestamp: None,
        }
    }

    pub fn page(category: Option<&str>, name: Option<&str>) -> Self {
        Self::new(CallKind::Page {
            category: category.map(str::to_string),
            name: name.map(str::to_string),
            properties: Map::new(),
        })
    }

    pub fn identify(user_id: Option<&str>) -> Self {
        Self::new(CallKind::Identify {
            traits: Map::new(),
        })
        .with_user_id(user_id)
    }

    pub fn track(event: impl Into<String>) -> Self {
        Self::new(CallKind::Track {
            event: Some(event.into()),
            properties: Map::new(),
        })
    }

    pub fn group(group_id: impl Into<String>) -> Self {
        Self::new(CallKind::Group {
            group_id: Some(group_id.into()),
            traits: Map::new(),
        })
    }

    pub fn alias(to: impl Into<String>, from: Option<&str>) -> Self {
        Self::new(CallKind::Alias {
            to: Some(to.into()),
            from: from.map(str::to_string),
        })
    }

    /// Parse a JSON call description; an unknown or missing `type` is an invalid call
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::InvalidCall(format!("unrecognized call description: {}", e)))
    }

    /// Set properties on page and track calls; other call types have none
    pub fn with_properties(mut self, props: Map<String, Value>) -> Self {
        match &mut self.kind {
            CallKind::Page { properties, .. } | CallKind::Track { properties, .. } => {
                *properties = props
            }
            _ => {}
        }
        self
    }

    /// Set traits on identify and group calls; other call types have none
    pub fn with_traits(mut self, new_traits: Map<String, Value>) -> Self {
        match &mut self.kind {
            CallKind::Identify { traits } | CallKind::Group { traits, .. } => *traits = new_traits,
            _ => {}
        }
        self
    }

    pub fn with_user_id(mut self, user_id: Option<&str>) -> Self {
        self.user_id = user_id.map(str::to_string);
        self
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_options(mut self, options: Map<String, Value>) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn endpoint(&self) -> Endpoint {
        self.kind.endpoint()
    }
}

/// Call-type specific fields of an envelope
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Payload {
    Page {
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        category: Option<String>,
        properties: Map<String, Value>,
    },
    Identify {
        traits: Map<String, Value>,
    },
    Track {
        event: String,
        properties: Map<String, Value>,
    },
    Group {
        #[serde(rename = "groupId")]
        group_id: String,
        traits: Map<String, Value>,
    },
    Alias {
        #[serde(rename = "previousId")]
        previous_id: String,
    },
}

impl Payload {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            Payload::Page { .. } => Endpoint::Page,
            Payload::Identify { .. } => Endpoint::Identify,
            Payload::Track { .. } => Endpoint::Track,
            Payload::Group { .. } => Endpoint::Group,
            Payload::Alias { .. } => Endpoint::Alias,
        }
    }
}

/// Normalized event sent to the ingestion API
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(flatten)]
    pub payload: Payload,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    pub anonymous_id: String,

    pub context: Context,

    /// Fresh v4 UUID per envelope
    pub message_id: String,

    /// When the call was made
    pub timestamp: DateTime<Utc>,

    /// When the envelope was built
    pub sent_at: DateTime<Utc>,

    pub write_key: String,
}

impl Envelope {
    pub fn endpoint(&self) -> Endpoint {
        self.payload.endpoint()
    }

    /// Wire JSON, indented for display
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn required(value: Option<String>, call: &str, field: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::InvalidCall(format!(
            "{} call requires a non-empty `{}`",
            call, field
        ))),
    }
}

/// Assembles envelopes for one write key
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    write_key: String,
    enricher: ContextEnricher,
}

impl EnvelopeBuilder {
    /// Builder stamping `write_key` on every envelope; a blank key is a config error
    pub fn new(write_key: impl Into<String>) -> Result<Self> {
        let write_key = write_key.into();
        if write_key.trim().is_empty() {
            return Err(Error::Config("write key must not be empty".to_string()));
        }
        Ok(Self {
            write_key,
            enricher: ContextEnricher::default(),
        })
    }

    pub fn with_enricher(mut self, enricher: ContextEnricher) -> Self {
        self.enricher = enricher;
        self
    }

    pub fn write_key(&self) -> &str {
        &self.write_key
    }

    /// Build the envelope for `call`.
    ///
    /// Fails with [`Error::InvalidCall`] when a required argument is missing:
    /// alias `to`, track `event`, group `groupId`. Validation happens before
    /// enrichment, so an invalid call never touches `store`.
    pub fn build(
        &self,
        call: RawCall,
        user: &UserState,
        page: &PageEnvironment,
        store: &dyn KeyValueStore,
    ) -> Result<Envelope> {
        let RawCall {
            kind,
            user_id,
            context,
            options,
            timestamp,
        } = call;

        let (payload, identity) = match kind {
            CallKind::Page {
                category,
                name,
                properties,
            } => (
                Payload::Page {
                    name,
                    category,
                    properties,
                },
                IdentityResolver::resolve(user, user_id.as_deref()),
            ),
            CallKind::Identify { traits } => (
                Payload::Identify { traits },
                IdentityResolver::resolve(user, user_id.as_deref()),
            ),
            CallKind::Track { event, properties } => (
                Payload::Track {
                    event: required(event, "track", "event")?,
                    properties,
                },
                IdentityResolver::resolve(user, user_id.as_deref()),
            ),
            CallKind::Group { group_id, traits } => (
                Payload::Group {
                    group_id: required(group_id, "group", "groupId")?,
                    traits,
                },
                IdentityResolver::resolve(user, user_id.as_deref()),
            ),
            CallKind::Alias { to, from } => {
                let to = required(to, "alias", "to")?;
                let alias = IdentityResolver::resolve_alias(user, &to, from.as_deref());
                (
                    Payload::Alias {
                        previous_id: alias.previous_id,
                    },
                    Identity {
                        anonymous_id: alias.anonymous_id,
                        user_id: Some(alias.user_id),
                    },
                )
            }
        };

        let context = self.enricher.enrich(context, options, page, store);
        let sent_at = Utc::now();

        let envelope = Envelope {
            payload,
            user_id: identity.user_id,
            anonymous_id: identity.anonymous_id,
            context,
            message_id: generate_id(),
            timestamp: timestamp.unwrap_or(sent_at),
            sent_at,
            write_key: self.write_key.clone(),
        };

        tracing::debug!(
            message_id = %envelope.message_id,
            endpoint = envelope.endpoint().path(),
            backend = ?store.kind(),
            "Built envelope"
        );

        Ok(envelope)
    }
}
