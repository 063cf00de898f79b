//! `ringscan-engine`: entity resolution and anomaly scoring engine.
//!
//! Pure engine crate: receives pre-parsed public records, returns groups,
//! formation bursts, cross-program matches and per-record risk assessments.
//! No CLI or IO dependencies.

pub mod burst;
pub mod config;
pub mod crossref;
pub mod engine;
pub mod error;
pub mod index;
pub mod model;
pub mod network;
pub mod normalize;
pub mod score;
pub mod summary;

pub use config::EngineConfig;
pub use engine::{Engine, Report};
pub use error::EngineError;
pub use model::{Record, RecordKind, RiskAssessment, RiskLevel};
