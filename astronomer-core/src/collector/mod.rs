//! Envelope assembly and delivery
//!
//! A tracking call flows through three stages:
//! - [`EnvelopeBuilder`] validates the [`RawCall`], resolves identity and
//!   enriches the context
//! - [`Dispatcher`] POSTs the resulting [`Envelope`] to the ingestion API
//! - [`Tracker`] owns both, plus the storage backing referrer persistence
//!
//! ## Usage
//!
//! Set the write key in `~/.config/astronomer/config.toml`:
//!
//! ```toml
//! [integration]
//! api_key = "oq0vdlg7yi"
//! host = "api.astronomer.io"
//! ```

mod dispatcher;
mod envelope;
mod tracker;

pub use dispatcher::{delivery_scheme, Delivery, Dispatcher, IngestResponse, API_VERSION_PREFIX};
pub use envelope::{CallKind, Endpoint, Envelope, EnvelopeBuilder, Payload, RawCall};
pub use tracker::Tracker;
