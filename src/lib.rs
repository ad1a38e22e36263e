pub mod api;
pub mod auth;
pub mod config;
pub mod geo;
pub mod ranges;
pub mod resolver;
pub mod service;
pub mod stats;
pub mod storage;
