// footprint-api: Async Rust client for the Footprint security-posture API

pub mod auth;
pub mod batch;
pub mod client;
pub mod contract;
mod endpoints;
pub mod error;
pub mod generation_date;
pub mod models;
pub mod network;
pub mod pagination;
pub mod transport;

pub use auth::{AuthStrategy, Credentials, Session, SessionTokens};
pub use batch::{MAX_TARGETS_PER_REQUEST, ScanSurfaceBatcher};
pub use client::HttpClient;
pub use contract::{FootprintClient, GLOBAL_ADMIN_ROLE, LazyReport};
pub use error::Error;
pub use generation_date::GenerationDate;
pub use pagination::{MAX_PAGE_SIZE, Paginator};
pub use transport::TransportConfig;
