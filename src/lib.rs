//! gptscript: a Rust client for the gptscript engine.
//!
//! Talks to the engine's SDK server over HTTP (spawning a shared one if no
//! URL is configured) or forks the engine binary per run. Every request
//! becomes a [`Run`](run::Run) whose output streams in the background.
//!
//! # Quick Start
//!
//! ```no_run
//! use gptscript::prelude::*;
//!
//! # async fn example() -> gptscript::error::Result<()> {
//! let engine = Gptscript::new(GlobalOptions::from_env()).await?;
//! let tool = ToolDef::builder().instructions("What is the capital of the United States?").build();
//!
//! let run = engine.evaluate(Options::default(), &[tool]).await?;
//! println!("{}", run.text().await?);
//! engine.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod prelude;
pub mod protocol;
pub mod run;
pub mod transport;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;

pub use config::{EngineSettings, GlobalOptions, TransportMode};
pub use engine::{Gptscript, ServerRegistry};
pub use error::{GptscriptError, Result, RunError};
pub use run::{Run, RunState};
