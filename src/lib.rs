//! # EcoCircular Auction Extraction
//!
//! HTTP service that pulls auction-eligible items ("prendas") out of the
//! EcoCircular SQL Server store. The stored procedure
//! `dbo.sp_Extraccion_Subasta` moves the items to the "in auction" status
//! and returns them, together with any validation diagnostics.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌───────────────┐   ┌────────────┐
//! │   HTTP   │──▶│  Extractor  │──▶│ StoreConnection│──▶│ SQL Server │
//! │  (axum)  │   │ (orchestr.) │   │  (tiberius)    │   │  procedure │
//! └──────────┘   └──────┬──────┘   └───────────────┘   └────────────┘
//!                       │
//!            ┌──────────┴──────────┐
//!            ▼                     ▼
//!      ┌───────────┐        ┌─────────────┐
//!      │ classify  │        │ materialize │
//!      │ (errors)  │        │ (rows)      │
//!      └───────────┘        └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! subastas --config ./config/subastas.toml serve
//! subastas --config ./config/subastas.toml extract --employee-id E-100 --date-from 2024-03-01
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`models`] | Request/response shapes |
//! | [`store`] | Store traits, SQL Server and scripted backends |
//! | [`classify`] | Store error code classification |
//! | [`materialize`] | Result-set to response mapping |
//! | [`extraction`] | Extraction orchestrator |
//! | [`server`] | HTTP server |

pub mod classify;
pub mod config;
pub mod extraction;
pub mod logging;
pub mod materialize;
pub mod models;
pub mod server;
pub mod store;
