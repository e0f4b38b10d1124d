//! DocIt's `summarizeData` callable function.
//!
//! An authenticated caller sends a prompt; the [`orchestrator`] runs a Gemini
//! generation under a fixed persona, and the model may read the caller's own
//! items, lists and folders through the data-fetch [`tools`] before answering.
#![deny(unsafe_code)]

pub mod auth;
pub mod backend;
pub mod config;
pub mod orchestrator;
pub mod prelude;
pub mod record;
pub mod server;
pub mod store;
pub mod tools;

pub use assist_core::{FunctionCall, FunctionDecl, ToolCollection, ToolError, ToolSchema};
pub use assist_macros::ToolSchema;

pub use auth::{AuthContext, AuthError, FirebaseVerifier, TokenVerifier};
pub use backend::{
    GeminiBackend, GenerateRequest, GenerationConfig, GenerationError, GenerativeBackend,
};
pub use orchestrator::Orchestrator;
pub use record::{ItemRecord, ListRecord, RecordError};
pub use server::{AppState, Error, SummarizeRequest, router, summarize_data};
pub use store::{
    Collection, Document, DocumentStore, FieldValue, FirestoreStore, MemoryStore, StoreError,
};
pub use tools::{DataTools, FetchRequest, Toolset};
