//! Brute-force certification of tree-ensemble robustness against
//! `k`-feature threshold perturbations.
//!
//! [`attack::brute_force`] reports, for each test instance, whether an
//! attacker who rewrites at most `k` features can flip the ensemble's
//! prediction, and aggregates this into the accuracy under attack.

pub mod attack;
pub mod benchmark;
pub mod config;
pub mod cpu_time;
pub mod data;
pub mod error;
pub mod forest;
pub mod model;
pub mod results;
pub mod utils;

pub use attack::{brute_force, AttackReport, Verdict};
pub use config::AttackConfig;
pub use data::{load_dataset, FeatureMatrix, Label};
pub use error::AttackError;
pub use forest::{load_forest, Forest};
pub use model::Ensemble;
