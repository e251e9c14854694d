pub mod api;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod models;
pub mod query;
pub mod remote;
pub mod services;
pub mod state;
