//! Single entry point tying normalization and delivery together.

use chrono::Utc;

use crate::config::Config;
use crate::context::{ContextEnricher, ReferrerNetworks};
use crate::db::Database;
use crate::error::Result;
use crate::identity::UserState;
use crate::page::PageEnvironment;
use crate::storage::{Backend, PublicSuffixes, StorageSelector};

use super::dispatcher::{Delivery, Dispatcher};
use super::envelope::{Envelope, EnvelopeBuilder, RawCall};

/// Normalizes raw calls for one write key and delivers them
pub struct Tracker {
    builder: EnvelopeBuilder,
    dispatcher: Dispatcher,
    db: Database,
    suffixes: PublicSuffixes,
}

impl Tracker {
    /// Create a tracker from configuration.
    ///
    /// Fails when the write key is missing or the host is malformed. Runs
    /// database migrations so the storage backends are usable immediately,
    /// then drops cookies that have expired since the last run.
    pub fn new(config: &Config, db: Database) -> Result<Self> {
        config.integration.validate()?;
        db.migrate()?;

        let purged = db.purge_expired_cookies(Utc::now())?;
        if purged > 0 {
            tracing::debug!(purged, "Purged expired cookies");
        }

        let write_key = config.integration.api_key.clone().unwrap_or_default();
        let enricher =
            ContextEnricher::new(ReferrerNetworks::with_extra(&config.referrer_networks));

        Ok(Self {
            builder: EnvelopeBuilder::new(write_key)?.with_enricher(enricher),
            dispatcher: Dispatcher::from_config(&config.integration)?,
            db,
            suffixes: PublicSuffixes::with_extra(config.cookies.public_suffixes.iter()),
        })
    }

    pub fn write_key(&self) -> &str {
        self.builder.write_key()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Persistence backend for `page`
    pub fn storage(&self, page: &PageEnvironment) -> Backend<'_> {
        StorageSelector::new(&self.db, &self.suffixes).select(page)
    }

    /// Build the envelope for `call` without sending it
    pub fn normalize(
        &self,
        call: RawCall,
        user: &UserState,
        page: &PageEnvironment,
    ) -> Result<Envelope> {
        let store = self.storage(page);
        self.builder.build(call, user, page, &store)
    }

    /// Deliver an already built envelope
    pub async fn dispatch(&self, page: &PageEnvironment, envelope: &Envelope) -> Result<Delivery> {
        self.dispatcher.send(page, envelope).await
    }

    /// Normalize and deliver in one step
    pub async fn send(
        &self,
        call: RawCall,
        user: &UserState,
        page: &PageEnvironment,
    ) -> Result<(Envelope, Delivery)> {
        let envelope = self.normalize(call, user, page)?;
        let delivery = self.dispatch(page, &envelope).await?;
        Ok((envelope, delivery))
    }
}
