//! Freight quote workflow library
//!
//! This crate provides the trip-quote request workflow used by the trucking
//! client apps: resolving pickup and destination addresses, talking to the
//! embedded map surface, estimating the route and submitting the assembled
//! quote to the backend.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod circuit_breaker;
pub mod config;
pub mod errors;
pub mod events;
pub mod map_bridge;
pub mod models;
pub mod services;
pub mod wizard;

pub use errors::{ServiceError, Violation};
pub use map_bridge::{MapBridge, MapEvent, MapMessage, MapSurface};
pub use models::{AddressPoint, Confidence, Coordinate, RouteEstimate};
pub use services::location::LocationResolver;
pub use services::quotes::QuoteAssembler;
pub use services::routing::RouteEstimator;
pub use wizard::{WizardController, WizardStage, WizardState};
