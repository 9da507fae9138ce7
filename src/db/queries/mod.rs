//! Database queries

pub mod b2b;
