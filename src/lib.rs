pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
