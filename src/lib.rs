//! Detection and validation of encrypted-container artefacts in raw disk
//! images. The pipeline reads an image in fixed-size blocks, locates
//! high-entropy and signature-bearing regions, classifies them against known
//! container formats, and verifies the labels with structural header checks.

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod engine;
pub mod entropy;
pub mod error;
pub mod findings;
pub mod io;
pub mod signatures;
pub mod validate;

pub use aggregate::{BlockAnalysis, CandidateRegion};
pub use classify::{ClassifiedRegion, FormatClassifier, FormatLabel};
pub use config::ScanConfig;
pub use engine::{Engine, ScanOutcome, ScanReport};
pub use error::{Result, ScanError};
pub use findings::{FindingContext, FindingRecord};
pub use io::BlockReader;
pub use signatures::{ContainerFormat, SignatureHit, SignatureRegistry};
pub use validate::{CheckOutcome, CheckStatus, Validator, Verdict, VerdictKind};
