//! Metaprompt - Categorical Meta-Prompting Engine
//!
//! Metaprompt turns task descriptions into structured prompts, refines them
//! iteratively against a quality rubric, and composes refinement stages into
//! pipelines with budget enforcement. The algebra is small and law-abiding:
//! prompt construction is a structure-preserving mapping from tasks,
//! quality-graded values compose monadically, and execution context is
//! navigated comonadically.
//!
//! # Core Concepts
//!
//! - **Graded values**: every produced value carries a quality score in
//!   \[0, 1\]; composition can only lower it, never inflate it
//! - **Best result wins**: the refinement loop returns the best quality
//!   observed, never a later regression
//! - **Budget checkpoints**: every executed stage appends to an append-only
//!   ledger; overrun beyond the halt threshold stops the run
//! - **Explicit boundaries**: completion and assessment are traits; retry is
//!   a decorator, never implicit engine behavior
//!
//! # Modules
//!
//! - [`domain`] - task, prompt, graded value, and observation types
//! - [`quality`] - scores, rubrics, and the windowed quality monitor
//! - [`functor`] - task classification and prompt construction
//! - [`llm`] - completion client trait, HTTP implementation, retry decorator
//! - [`assess`] - quality assessor trait and rubric-driven LLM assessor
//! - [`refine`] - the iterative refinement loop
//! - [`compose`] - expression parser and composition engine
//! - [`ledger`] - per-run budget ledger
//! - [`config`] - configuration types and loading

pub mod assess;
pub mod compose;
pub mod config;
pub mod domain;
pub mod error;
pub mod functor;
pub mod ledger;
pub mod llm;
pub mod quality;
pub mod refine;

pub use error::EngineError;

/// Initialize tracing output for embedders and tests
///
/// Respects `RUST_LOG`; defaults to `metaprompt=info`. Safe to call more
/// than once.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("metaprompt=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
