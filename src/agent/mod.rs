//! Consultation agent: the tool-calling engine behind the chat endpoint.

pub mod engine;
pub mod tools;

pub use engine::{ChatEvent, ChatRequest, ConsultationEngine};
