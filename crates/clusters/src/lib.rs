//! Cluster domain (site grouping, artifacts, input fingerprints).
//!
//! Pure domain logic only: no IO, no persistence concerns.

pub mod artifact;
pub mod site;

pub use artifact::{build_clusters, ClusterArtifact, Fingerprint, SiteCluster};
pub use site::{FieldSite, SiteId};
