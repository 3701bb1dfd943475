//! Query pipeline for energyqa.
//!
//! This crate ties the corpus to the question-answering flow: domain scoping,
//! evidence retrieval with confidence calibration, and prompt assembly,
//! orchestrated per query by [`session::Session`].

pub mod embedding;
pub mod prompt;
pub mod retriever;
pub mod scope;
pub mod session;
