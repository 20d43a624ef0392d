//! Integration tests for apply-and-settle against a live API server
//!
//! - `apply_operations`: Stories about applying each supported kind through
//!   the kube-rs backed stores

mod apply_operations;
mod helpers;
