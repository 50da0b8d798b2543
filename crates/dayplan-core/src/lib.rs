pub mod cache;
pub mod config;
pub mod datetime;
pub mod message;
pub mod planner;
pub mod render;
pub mod schedule;
pub mod task;
