//! Reference asset catalogs built on the engine.

pub mod ecom;
