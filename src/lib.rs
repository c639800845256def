//! stepflow - declarative multi-step agent pipelines.
//!
//! Steps declare when they fire (at start, after other steps, after all or
//! any of a set, or on a router's signal). The engine walks the registry
//! from a starting input, threading outputs forward, and keeps an ordered
//! record of every firing.
//!
//! # Modules
//!
//! - [`flow`] - Step registry, execution engine, routing, state and records
//! - [`crew`] - Agents and tasks compiled into flow pipelines
//! - [`config`] - `stepflow.yml` loading, merging, interpolation and validation
//! - [`cli`] - Command-line interface and argument parsing
//! - [`ui`] - Spinners, themes and terminal output
//! - [`error`] - Error types and result aliases
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use stepflow::flow::{Engine, EngineOptions, PipelineBuilder};
//!
//! let registry = PipelineBuilder::new()
//!     .start("fetch", |ctx| Ok(json!(ctx.input()["n"].as_i64().unwrap_or(0) * 2)))
//!     .listen("report", "fetch", |ctx| Ok(json!(format!("got {}", ctx.input()))))
//!     .build()?;
//!
//! let mut engine = Engine::new(registry, EngineOptions::default())?;
//! let outcome = engine.run(json!({"n": 21}))?;
//! assert_eq!(outcome.output, Some(json!("got 42")));
//! assert_eq!(engine.record().step_names(), vec!["fetch", "report"]);
//! # Ok::<(), stepflow::FlowError>(())
//! ```

pub mod cli;
pub mod config;
pub mod crew;
pub mod error;
pub mod flow;
pub mod ui;

pub use error::{FlowError, Result};
