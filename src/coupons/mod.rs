pub mod code;
pub mod context;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod redemption;
pub mod repository;
pub mod rules;
pub mod service;

#[cfg(test)]
pub mod memory;

pub use code::*;
pub use engine::*;
pub use error::*;
pub use handlers::*;
pub use metrics::*;
pub use models::*;
pub use redemption::*;
pub use repository::*;
pub use service::*;
