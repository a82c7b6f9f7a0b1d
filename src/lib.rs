pub mod collector;
pub mod config;
pub mod db;
pub mod loader;
pub mod merge;
pub mod model;
pub mod search;
pub mod web;
