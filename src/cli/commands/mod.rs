pub mod calendar;
pub mod config;
pub mod db;
pub mod stats;
