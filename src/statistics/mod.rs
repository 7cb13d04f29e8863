//! Statistics intake: entity classification, series repair and the provider
//! interfaces the host implements.

pub mod classifier;
pub mod normalizer;
pub mod provider;

pub use classifier::*;
pub use normalizer::*;
pub use provider::*;
