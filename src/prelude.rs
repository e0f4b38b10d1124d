//! Convenient re-exports for wiring the function up.
//!
//! ```rust
//! use docit_functions::prelude::*;
//! ```

// Tool registry
pub use crate::{FunctionCall, FunctionDecl, ToolCollection, ToolError, ToolSchema};

// Data access
pub use crate::store::{
    Collection, Document, DocumentStore, FieldValue, FirestoreStore, MemoryStore,
};
pub use crate::tools::{DataTools, FetchRequest, Toolset};

// Generation
pub use crate::backend::{GeminiBackend, GenerationConfig, GenerationError, GenerativeBackend};
pub use crate::orchestrator::Orchestrator;

// Serving
pub use crate::auth::{AuthContext, FirebaseVerifier, TokenVerifier};
pub use crate::server::{AppState, SummarizeRequest, router, summarize_data};

pub use serde_json::{Value, json};
