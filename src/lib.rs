//! Access-key rotation for an IAM user whose credentials live in Terraform
//! Cloud workspace variables.
//!
//! A run issues a new key, writes it into every target workspace, and only
//! then deletes the previous key. See [`rotation::RotationOrchestrator`].

pub mod cli;
pub mod config;
pub mod credentials;
pub mod logging;
pub mod propagation;
pub mod reconcile;
pub mod rotation;
pub mod schedule;
pub mod workspaces;
