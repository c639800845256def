//! Declarative step pipelines.
//!
//! A pipeline is a [`StepRegistry`] of named steps, each with a [`Trigger`]
//! saying when it fires. The [`Engine`] runs a validated registry, threading
//! each step's output into the steps listening for it. Router steps emit a
//! signal that selects which `OnSignal` branch runs next.
//!
//! ```
//! use serde_json::json;
//! use stepflow::flow::{Engine, EngineOptions, PipelineBuilder, Trigger};
//!
//! let registry = PipelineBuilder::new()
//!     .start("fetch", |_| Ok(json!([1, 2, 3])))
//!     .router("route", Trigger::OnStep("fetch".into()), &["small", "large"], |ctx| {
//!         let n = ctx.input().as_array().map_or(0, Vec::len);
//!         Ok(if n > 10 { "large" } else { "small" }.to_string())
//!     })
//!     .on_signal("small_batch", "small", |_| Ok(json!("handled")))
//!     .on_signal("large_batch", "large", |_| Ok(json!("queued")))
//!     .build()?;
//!
//! let mut engine = Engine::new(registry, EngineOptions::default())?;
//! let outcome = engine.run(json!(null))?;
//! assert_eq!(outcome.output, Some(json!("handled")));
//! # Ok::<(), stepflow::FlowError>(())
//! ```

pub mod dependency;
pub mod engine;
pub mod export;
pub mod record;
pub mod registry;
pub mod state;
pub mod step;

pub use dependency::DependencyGraph;
pub use engine::{Engine, EngineOptions, RunOutcome, RunProgress};
pub use export::{to_dot, to_mermaid, GraphFormat};
pub use record::{ExecutionRecord, RecordEntry, StepStatus};
pub use registry::{PipelineBuilder, StepRegistry};
pub use state::{PipelineState, StateHandle};
pub use step::{CancelFlag, Step, StepAction, StepContext, Trigger};
