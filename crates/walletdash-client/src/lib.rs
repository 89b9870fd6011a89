//! HTTP client for the dashboard aggregation endpoint.
//!
//! The backend serves one JSON document per wallet at
//! `GET {base}/dashboard/{address}`. [`DashboardFetcher`] is the seam the
//! request coordinator depends on; [`DashboardClient`] is the reqwest-backed
//! implementation.

pub mod client;
pub mod error;

pub use client::{DashboardClient, DashboardFetcher, DEFAULT_TIMEOUT};
pub use error::{FetchError, FetchResult};
