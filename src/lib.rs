pub mod attributes;
pub mod config;
pub mod database;
pub mod error;
pub mod fulltext;
pub mod reflection;
pub mod registry;
pub mod signals;
pub mod utils;
