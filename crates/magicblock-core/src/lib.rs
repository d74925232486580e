//! # Magic Block Core Library
//!
//! This library provides the core logic for Magic Block: a focus timer that
//! gates distracting websites behind a spaced-repetition quiz. It follows a
//! CLI-first philosophy; every operation is reachable through the
//! `magicblock-cli` binary, and any UI is a thin layer over the same
//! request protocol.
//!
//! ## Architecture
//!
//! - **Timer Engine**: A wall-clock-based state machine; the caller invokes
//!   `tick()` periodically and progress is computed from elapsed time
//! - **Domain Gate**: The block list and URL normalization
//! - **Datasets**: Leitner-box scheduling per dataset and a registry that
//!   picks which dataset serves the next question
//! - **Storage**: SQLite key-value persistence with versioned records and
//!   TOML configuration
//! - **Orchestrator**: Composes the above behind one request entry point
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: Focus session state machine
//! - [`DomainGate`]: Blocked-domain checks
//! - [`DatasetRegistry`]: Question selection and grading
//! - [`GateOrchestrator`]: Request handling and persistence
//! - [`GateService`]: Runs the orchestrator on a tokio task

pub mod cache;
pub mod content;
pub mod dataset;
pub mod error;
pub mod events;
pub mod gate;
pub mod orchestrator;
pub mod service;
pub mod storage;
pub mod timer;

pub use content::{ContentSource, GitHubRawSource, MemorySource};
pub use dataset::{BoxId, Dataset, DatasetId, DatasetMeta, DatasetRegistry, QuizItem};
pub use error::{ConfigError, CoreError, FetchError, QuizError, StorageError, ValidationError};
pub use events::Event;
pub use gate::DomainGate;
pub use orchestrator::{GateOrchestrator, NavigationEvent, Request, Response, Status};
pub use service::{GateClient, GateService};
pub use storage::{Config, Database, MemoryStore, Store};
pub use timer::{Clock, ManualClock, SystemClock, TimerEngine, TimerState};
