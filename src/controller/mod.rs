//! # Controller
//!
//! Core controller modules for the ArgoCD local-user controller.
//!
//! - `backoff`: Fibonacci backoff mechanism for retries
//! - `reconciler`: Core reconciliation logic

pub mod backoff;
pub mod reconciler;
