//! Observations API.

use crate::client::CatalogClient;
use crate::error::Result;
use crate::types::{CatalogObservation, ObservationFilter, ObservationListing, ObservationsData};

const OBSERVATIONS_QUERY: &str = r#"
query Observations($pulsar: String, $utcStartGte: String, $utcStartLte: String, $project: String) {
  allObservations(
    pulsar_Name: $pulsar
    utcStart_Gte: $utcStartGte
    utcStart_Lte: $utcStartLte
    project_Code: $project
  ) {
    edges {
      node {
        pulsar { name }
        utcStart
        project { code short }
      }
    }
  }
}
"#;

/// Observations API client.
pub struct ObservationsApi {
    client: CatalogClient,
}

impl ObservationsApi {
    pub(crate) fn new(client: CatalogClient) -> Self {
        Self { client }
    }

    /// List observations matching the filter, in catalog order.
    ///
    /// A record missing its pulsar name or start time lands in
    /// [`ObservationListing::malformed`]; only transport and GraphQL
    /// failures fail the call.
    pub async fn list(&self, filter: &ObservationFilter) -> Result<ObservationListing> {
        let data: ObservationsData = self
            .client
            .graphql(OBSERVATIONS_QUERY, filter.variables())
            .await?;

        let mut listing = ObservationListing::default();
        for edge in data.all_observations.edges {
            match CatalogObservation::try_from(edge.node) {
                Ok(observation) => listing.observations.push(observation),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed catalog record");
                    listing.malformed.push(e);
                }
            }
        }

        tracing::debug!(
            count = listing.observations.len(),
            malformed = listing.malformed.len(),
            "catalog observations listed"
        );
        Ok(listing)
    }
}
