//! Prometheus exporter for site and circuit health.
//!
//! This crate polls a vendor network-monitoring REST API on a fixed interval
//! and republishes the returned site/circuit health data via an HTTP
//! `/metrics` endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │   Vendor API    │────>│     Poller      │────>│   HTTP Server   │
//! │  (JSON status)  │     │ (map + collect) │     │   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! Run the exporter binary with a configuration file:
//!
//! ```bash
//! sitewatch-exporter --config config.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod api;
pub mod collector;
pub mod config;
pub mod http;
pub mod mapping;
pub mod poller;

pub use collector::{MetricCollector, SharedCollector};
pub use config::ExporterConfig;
pub use http::HttpServer;
pub use poller::ApiPoller;
