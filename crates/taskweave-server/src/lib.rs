pub mod client;
pub mod error;
pub mod handlers;
pub mod server;

pub use client::{ClientId, ClientRegistry};
pub use error::ApiError;
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
