//! primertool: PCR/Sanger sequencing primer design for genomic variants,
//! exons, genes and raw genomic intervals.
//!
//! A biological request is resolved into one or more genomic target windows,
//! an external primer design tool is driven over those windows with adaptive
//! widening, candidate pairs are filtered for genomic uniqueness, and the
//! accepted pairs are assembled into an order table ready for laboratory
//! ordering.

pub mod annotation;
pub mod chunking;
pub mod design;
pub mod engine;
pub mod error;
pub mod genome;
pub mod hgvs;
pub mod mutalyzer;
pub mod ordertable;
pub mod request;
pub mod snp_mask;
pub mod targets;
pub mod uniqueness;

pub use error::PrimertoolError;
pub use request::{Assembly, PrimerPipeline};
