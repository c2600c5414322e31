// src/blockchain/services/mod.rs

pub mod formatter;
pub mod normalizer;
pub mod retry;
pub mod token;
