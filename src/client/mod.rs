pub mod client_config;
pub mod connection;
pub mod downcalls;
pub mod error;
pub mod member;
mod member_registry;
pub mod upcall_handler;
pub mod upcalls;
pub mod view;
