//! Request and response types.

use meerpipe_types::ObsUtc;
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Public types
// ─────────────────────────────────────────────────────────────────────────────

/// Observation query filters. Absent filters leave the query unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservationFilter {
    pub start: Option<ObsUtc>,
    pub end: Option<ObsUtc>,
    pub pulsar: Option<String>,
    pub project: Option<String>,
}

impl ObservationFilter {
    pub fn is_unconstrained(&self) -> bool {
        self.start.is_none() && self.end.is_none() && self.pulsar.is_none() && self.project.is_none()
    }

    /// GraphQL variables for this filter; UTC bounds go out as ISO-8601.
    pub(crate) fn variables(&self) -> ObservationVariables {
        ObservationVariables {
            pulsar: self.pulsar.clone(),
            utc_start_gte: self.start.map(|u| u.to_iso8601()),
            utc_start_lte: self.end.map(|u| u.to_iso8601()),
            project: self.project.clone(),
        }
    }
}

/// One observation as listed by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogObservation {
    pub pulsar: String,
    pub utc: ObsUtc,
    /// Long proposal ID, e.g. `SCI-20180516-MB-05`.
    pub project_code: Option<String>,
    /// Short project code, when the catalog knows one.
    pub project_short: Option<String>,
}

/// The result of an observation listing.
///
/// Records the catalog returned but that could not be read are kept apart
/// in `malformed` so the rest of the listing stays usable.
#[derive(Debug, Default)]
pub struct ObservationListing {
    pub observations: Vec<CatalogObservation>,
    pub malformed: Vec<crate::Error>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct GraphQlRequest<'a, V: Serialize> {
    pub query: &'a str,
    pub variables: V,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlError {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ObservationVariables {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pulsar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utc_start_gte: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utc_start_lte: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ObservationsData {
    pub all_observations: Connection<ObservationNode>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Connection<T> {
    #[serde(default = "Vec::new")]
    pub edges: Vec<Edge<T>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Edge<T> {
    pub node: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ObservationNode {
    pub pulsar: Option<NamedNode>,
    pub utc_start: Option<String>,
    pub project: Option<ProjectNode>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NamedNode {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProjectNode {
    pub code: Option<String>,
    pub short: Option<String>,
}

impl TryFrom<ObservationNode> for CatalogObservation {
    type Error = crate::Error;

    fn try_from(node: ObservationNode) -> crate::Result<Self> {
        let pulsar = node
            .pulsar
            .map(|p| p.name)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| crate::Error::Malformed("observation without pulsar name".into()))?;
        let raw_utc = node
            .utc_start
            .ok_or_else(|| crate::Error::Malformed(format!("observation of {pulsar} without utcStart")))?;
        let utc = ObsUtc::parse(&raw_utc)
            .map_err(|e| crate::Error::Malformed(e.to_string()))?;
        let (project_code, project_short) = node
            .project
            .map(|p| (p.code, p.short))
            .unwrap_or((None, None));

        Ok(Self {
            pulsar,
            utc,
            project_code,
            project_short,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_variables_iso() {
        let filter = ObservationFilter {
            start: Some(ObsUtc::parse("2021-01-01-00:00:00").unwrap()),
            pulsar: Some("J0437-4715".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(filter.variables()).unwrap();
        assert_eq!(json["utcStartGte"], "2021-01-01T00:00:00+00:00");
        assert_eq!(json["pulsar"], "J0437-4715");
        assert!(json.get("utcStartLte").is_none());
        assert!(json.get("project").is_none());
    }

    #[test]
    fn test_default_filter_is_unconstrained() {
        assert!(ObservationFilter::default().is_unconstrained());
    }

    #[test]
    fn test_node_conversion() {
        let node: ObservationNode = serde_json::from_value(serde_json::json!({
            "pulsar": {"name": "J1909-3744"},
            "utcStart": "2022-05-01T10:20:30+00:00",
            "project": {"code": "SCI-20180516-MB-05", "short": "PTA"}
        }))
        .unwrap();
        let obs = CatalogObservation::try_from(node).unwrap();
        assert_eq!(obs.utc.to_string(), "2022-05-01-10:20:30");
        assert_eq!(obs.project_short.as_deref(), Some("PTA"));
    }

    #[test]
    fn test_node_without_utc_is_malformed() {
        let node: ObservationNode = serde_json::from_value(serde_json::json!({
            "pulsar": {"name": "J1909-3744"}
        }))
        .unwrap();
        assert!(matches!(
            CatalogObservation::try_from(node),
            Err(crate::Error::Malformed(_))
        ));
    }
}
