//! Test tooling colocated with the domain types it exercises: a fake,
//! in-memory [`crate::engine::EngineClient`] so C5/C6/C7/C9/C10 can be unit
//! tested without a live workflow engine, and a scriptable review-LLM
//! collaborator fake for C9.
//!
//! Gated behind `cfg(test)` or the `testing` feature so it never ships in
//! a release build of a downstream crate.

pub mod fake_engine;
pub mod fake_llm;

pub use fake_engine::FakeEngineClient;
pub use fake_llm::FakeReviewLlm;
