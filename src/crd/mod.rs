//! # Custom Resource Definitions
//!
//! CRD types for the ArgoCD Local User Controller.
//!
//! This module contains all the Kubernetes Custom Resource Definition types
//! used by the controller, including ClusterArgoCD and its related types.
//!
//! ## Module Structure
//!
//! - `spec.rs` - Main CRD specification and default values
//! - `status.rs` - Status types for tracking reconciliation state

mod spec;
mod status;

// Re-export all public types
pub use spec::{ClusterArgoCD, ClusterArgoCDSpec, LocalUserSpec};
pub use status::{ClusterArgoCDStatus, Condition};
