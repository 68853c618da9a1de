//! `hermes-gateway`: the data-plane and routing-policy core of the Hermes
//! API gateway — route model, matcher, cache/registry client, load
//! balancer, plugin chain, rate limiter, circuit breaker, and reverse
//! proxy. The HTTP server binary that wires this library to Actix Web
//! lives in the sibling `hermes-server` crate.

pub mod balancer;
pub mod breaker;
pub mod config;
pub mod context;
pub mod gateway;
pub mod logs;
pub mod matcher;
pub mod model;
pub mod plugins;
pub mod proxy;
pub mod ratelimit;
pub mod registry;
pub mod route_table;

pub use gateway::{Gateway, InboundRequest};
pub use model::error::GatewayError;
pub use model::route::Route;
