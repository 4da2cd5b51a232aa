//! HTTP client for the pulsar observation catalog.
//!
//! The catalog exposes a GraphQL endpoint. This crate wraps the one query
//! the pipeline needs: listing observations by time range, pulsar and
//! project.
//!
//! # Example
//!
//! ```no_run
//! use meerpipe_catalog::{CatalogClient, ObservationFilter, Result};
//!
//! # async fn example() -> Result<()> {
//! let client = CatalogClient::builder()
//!     .base_url("https://pulsars.org.au/api")
//!     .auth_token("secret")
//!     .build()?;
//!
//! let filter = ObservationFilter {
//!     pulsar: Some("J0437-4715".to_string()),
//!     ..Default::default()
//! };
//! for obs in client.observations().list(&filter).await?.observations {
//!     println!("{} {}", obs.pulsar, obs.utc);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod error;
pub mod types;

pub use api::ObservationsApi;
pub use client::{CatalogClient, ClientBuilder};
pub use error::{Error, Result};
pub use types::*;
