//! Dujyo CPV (Creative Proof of Value)
//!
//! Validators qualify in one of three categories (economic stake, verified
//! creative content, community engagement), each scored in basis points from
//! its evidence. The proposer for a round is the validator with the highest
//! `score_bps * lambda_bps` for its category; ties go to the earliest
//! registration, so selection is a pure function of the registry contents.

pub mod config;
pub mod registry;
pub mod validator;

pub use config::CpvConfig;
pub use registry::{ConsensusStats, RoundOutcome, ValidationRound, ValidatorRegistry};
pub use validator::{Category, Evidence, Validator};
