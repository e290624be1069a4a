//! HTTP gateway: the service's JSON API surface.

mod handlers;
mod server;
mod types;

pub use server::{GatewayState, start_server};
