//! Generative-text structuring for scanned prescriptions.
//!
//! This crate turns raw OCR text into labeled prescription sections using an
//! external text-generation service, and scrapes the reply for the medicine
//! names the rest of the pipeline resolves. The same service backs a
//! free-form assistant chat.

pub mod chat;
pub mod client;
pub mod extraction;
pub mod prompts;

pub use chat::*;
pub use client::*;
pub use extraction::*;
pub use prompts::*;
