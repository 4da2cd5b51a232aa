//! API endpoint implementations.

mod observations;

pub use observations::ObservationsApi;
