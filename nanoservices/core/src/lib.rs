//! medallion_core: layered data-materialization engine
//!
//! Assets are declared once in an [`AssetRegistry`](dag::AssetRegistry), each
//! bound to a storage adapter for its layer (source, bronze/silver/gold object
//! store, warehouse). The [`Scheduler`](scheduler::Scheduler) runs the
//! resulting graph in dependency order with bounded concurrency, isolating
//! failures to the failed asset and its descendants.
//!
//! Basic usage:
//!
//! ```no_run
//! use medallion_core::catalog::ecom;
//! use medallion_core::dag::AssetRegistry;
//! use medallion_core::engine::Engine;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::from_config_file("medallion.yaml")?;
//! let mut registry = AssetRegistry::new();
//! ecom::register_all(&mut registry, engine.adapters())?;
//! let report = engine.run(&registry).await?;
//! println!("{}", report.to_json()?);
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod asset;
pub mod builder;
pub mod catalog;
pub mod config;
pub mod dag;
pub mod engine;
pub mod metadata;
pub mod scheduler;
pub mod store;
pub mod transforms;

pub mod logging;

pub mod metrics;
