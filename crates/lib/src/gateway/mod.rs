//! Bot HTTP server: channel messages, proactive notify, SSO auth pages.

mod server;

pub use server::{router, run_gateway, GatewayState};
