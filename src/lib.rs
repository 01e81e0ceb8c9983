//! guichet — conversational RAG core for a banking assistant
//!
//! Turns uploaded PDF/Markdown documents into searchable chunks, retrieves
//! relevant context for user questions, maintains multi-turn conversation
//! state, exposes read-only data tools the model can invoke, and streams
//! incremental answers back to the caller.

pub mod chat;
pub mod chunk;
pub mod config;
pub mod embed;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod meta;
pub mod model;
pub mod retrieval;
pub mod session;
pub mod tools;
pub mod vector;
