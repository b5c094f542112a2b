//! # Poolwatch
//!
//! Resumable ingestion engine for public pool and spa inspection records.
//!
//! Poolwatch polls municipal open-data portals and inspection websites,
//! maps each jurisdiction's records onto one canonical shape, deduplicates
//! them by content hash, resolves them onto stable facility rows, and keeps
//! a per-run audit log. Runs are resumable from a persisted cursor and safe
//! to replay.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │  Adapters   │──▶│ Transformers│──▶│ Dedup +      │──▶│  SQLite  │
//! │ Socrata/    │   │ per         │   │ Facility     │   │  Store   │
//! │ ArcGIS/HTML │   │ jurisdiction│   │ resolution   │   │          │
//! └─────────────┘   └─────────────┘   └──────────────┘   └──────────┘
//!        ▲                                                     │
//!        └──────────── cursor saved after every batch ◀────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! poolwatch init                                  # create database, load sources
//! poolwatch sources                               # health-check every source
//! poolwatch sync austin-pools --type backfill     # one source
//! poolwatch sync-all --type incremental           # daily worker
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`adapters`] | Fetch + cursor contract and its implementations |
//! | [`transformers`] | Per-jurisdiction raw → canonical mapping |
//! | [`registry`] | Adapter and transformer lookup |
//! | [`ingest`] | Run orchestration |
//! | [`dedup`] | Hash-based change detection and persistence |
//! | [`resolver`] | Facility identity and slug allocation |
//! | [`retry`] | Exponential backoff |
//! | [`sources`] | Config sync and health checks |
//! | [`sqlite_store`] | SQLite implementation of the store |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod adapters;
pub mod config;
pub mod db;
pub mod dedup;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod sources;
pub mod sqlite_store;
pub mod transformers;
