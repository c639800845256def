//! Crews: role-playing agents working through a list of tasks.
//!
//! A [`Crew`] compiles its tasks into a [`StepRegistry`](crate::flow::StepRegistry)
//! so they run on the same engine as hand-built pipelines. Every task renders
//! a prompt from its agent and the run inputs, then asks a
//! [`CompletionClient`] for the answer.
//!
//! ```
//! use serde_json::json;
//! use stepflow::config::{AgentConfig, TaskConfig};
//! use stepflow::crew::{Crew, EchoClient};
//! use stepflow::flow::EngineOptions;
//!
//! let planner = AgentConfig {
//!     role: "Content Planner".into(),
//!     goal: "Plan content on {topic}".into(),
//!     backstory: String::new(),
//! };
//! let plan: TaskConfig =
//!     serde_yaml::from_str("description: Outline {topic}\nagent: planner").unwrap();
//!
//! let crew = Crew::new("writer").agent("planner", planner).task("plan", plan);
//! let mut engine = crew.engine(EchoClient, EngineOptions::default())?;
//! let outcome = engine.run(json!({"topic": "Rust"}))?;
//! assert_eq!(outcome.output, Some(json!("Current Task: Outline Rust")));
//! # Ok::<(), stepflow::FlowError>(())
//! ```

pub mod client;
pub mod compiler;
pub mod prompt;

pub use client::{CompletionClient, CompletionRequest, EchoClient, ScriptedClient};
pub use compiler::Crew;
