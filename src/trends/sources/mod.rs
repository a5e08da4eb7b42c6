// src/trends/sources/mod.rs
pub mod google;
pub mod reddit;
pub mod rss;
