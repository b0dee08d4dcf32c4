//! ArgoCD Local User Controller Library
//!
//! Core functionality for the local-user token lifecycle controller: the
//! `ClusterArgoCD` CRD types, the per-user token reconciler and its renewal
//! timer registry, the Kubernetes secret store seam, and the HS256 token
//! codec. Unit tests live next to the modules; end-to-end reconcile tests
//! run against the in-memory store under `tests/`.

pub mod cli;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod server;
pub mod store;
pub mod token;
