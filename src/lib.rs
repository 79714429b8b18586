//! # Rextro RAG
//!
//! Agentic retrieval-augmented question answering for the Rextro Exhibition.
//!
//! This library provides:
//! - An HTTP API answering visitor questions (`POST /ask`)
//! - A tool-calling agent grounded on a pgvector knowledge base, the
//!   exhibition REST API and a static overview document
//! - Optional Google login with server-side sessions
//!
//! ## Architecture
//!
//! HTTP surface → answer pipeline (timeout, retry, shape coercion) → agent
//! loop → tools → {vector retrieval, REST listings, document} → LLM →
//! structured answer.
//!
//! ## Example
//!
//! ```rust,ignore
//! use rextro_rag::agent::{Agent, AnswerPipeline, RetryPolicy};
//!
//! let agent = Agent::new(llm, tools, &config.agent);
//! let pipeline = AnswerPipeline::new(Arc::new(agent), RetryPolicy::from(&config.agent));
//! let answer = pipeline.answer("When does the exhibition open?").await;
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod llm;
pub mod oauth;
pub mod retrieval;
pub mod session;
pub mod tools;

pub use config::Config;
