pub mod api_errors;
pub mod auth;
pub mod extract;
pub mod http;
pub mod webhook;
pub mod ws;
pub mod yookassa;
