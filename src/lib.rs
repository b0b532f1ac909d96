//! Query/search pipeline and cache-aside services for the ERP entity catalog
//! (companies, users, user-company links).

pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod logging;
pub mod query;
pub mod services;
pub mod state;
pub mod utils;
pub mod web;
