pub mod api;
pub mod book;
pub mod config;
pub mod database;
pub mod discussion;
pub mod error;
pub mod group;
pub mod progress;
pub mod schedule;
pub mod state;
pub mod user;
pub mod utils;
