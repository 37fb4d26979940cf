//! Core infrastructure: storage, durability, configuration, the host hub and
//! the per-session context every subsystem receives.

pub mod broker;
pub mod config;
pub mod db;
pub mod documents;
pub mod error;
pub mod hub;
pub mod migration;
pub mod model;
pub mod schemas;
pub mod session;
pub mod settings;
pub mod store;
pub mod time;
