// src/handlers/mod.rs

pub mod actors;
pub mod ingest;
pub mod posts;
