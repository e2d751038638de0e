#[macro_use]
extern crate log;

pub mod auth;
pub mod config;
pub mod db;
pub mod model;
pub mod operations;
pub mod paths;
pub mod store;
pub mod util;
