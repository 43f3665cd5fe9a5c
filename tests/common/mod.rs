#![allow(dead_code)] // Each test binary uses a different subset

pub mod fake_cluster;
pub mod strategies;

pub use fake_cluster::*;
