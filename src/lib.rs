pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod flash;
pub mod models;
pub mod routes;
pub mod rules;
pub mod services;
pub mod state;
pub mod validation;
