//! # Crawl Query
//!
//! A read-facing query layer over a store of crawled pages.
//!
//! Crawl Query answers free-text and URL-scoped searches, serves page
//! content by id, and runs an interactive command session over a WebSocket
//! that streams search results as the store cursor advances.
//!
//! ## Architecture
//!
//! ```text
//!   HTTP handlers ──┐
//!                   ├──▶ QueryEngine ──▶ query::build ──▶ Repository ──▶ ResultStream
//!   WS sessions  ───┘         │                          (SQLite / memory)
//!   CLI (cq)     ─────────────┘
//! ```
//!
//! Every surface goes through one [`engine::QueryEngine`], which holds the
//! injected repository handle and the per-operation deadline.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Page records and wire items |
//! | [`error`] | Typed query and store errors |
//! | [`query`] | Search expression builder |
//! | [`store`] | Repository trait, SQLite and in-memory implementations |
//! | [`search`] | Lazy result streams, drain-to-list, counting |
//! | [`get`] | Lookup by id |
//! | [`engine`] | Facade shared by all surfaces |
//! | [`protocol`] | WebSocket command and frame types |
//! | [`session`] | Per-connection session state machine |
//! | [`server`] | HTTP/WebSocket server |
//! | [`import`] | JSON Lines page import |
//! | [`extensions`] | Forbidden extension listing |
//! | [`logging`] | Tracing setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod extensions;
pub mod get;
pub mod import;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod protocol;
pub mod query;
pub mod search;
pub mod server;
pub mod session;
pub mod store;
