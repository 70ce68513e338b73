//! # Services Layer
//!
//! Clients for collaborators that live outside this process.
//!
//! - [`listing_catalog`] - listing summaries from the marketplace listing service

pub mod listing_catalog;

pub use listing_catalog::HttpListingCatalog;
