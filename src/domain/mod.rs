pub mod account;
pub mod chat;
pub mod error;
pub mod event;
pub mod gateway;
pub mod id;
pub mod money;
pub mod notification;
pub mod payment;
pub mod store;
