//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates. Host applications can depend on `shelf-workspace` and
//! enable `service` (the full `core-service` facade, on by default) or
//! `reconcile-only` (just the edit log and reconciliation engine) without
//! wiring each crate individually.
