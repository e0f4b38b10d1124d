#![deny(unsafe_code)]
//! Typed tool registry shared by the DocIt assistant.
//!
//! A [`ToolCollection`] maps tool names to async functions taking one
//! deserializable input and producing a serializable output. Every
//! registration records a [`FunctionDecl`] carrying the JSON schema of both
//! sides, which is what a generative backend advertises to the model.

use std::{borrow::Cow, collections::HashMap, fmt, future::Future, sync::Arc};

use futures::{FutureExt, future::BoxFuture};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{self, Value};

// Re-export once_cell for use in generated code
pub use once_cell;

const TRACING_TARGET: &str = "assist_core::collection";

// ============================================================================
// TOOL SCHEMA TRAIT AND IMPLEMENTATIONS
// ============================================================================

/// Trait for types that can generate a JSON Schema representation of themselves.
pub trait ToolSchema {
    fn schema() -> Value;
}

macro_rules! prim {
    ($ty:ty, $name:expr) => {
        impl ToolSchema for $ty {
            fn schema() -> Value {
                static SCHEMA: Lazy<Value> = Lazy::new(|| serde_json::json!({ "type": $name }));
                SCHEMA.clone()
            }
        }
    };
}

prim!(bool, "boolean");
prim!(i8, "integer");
prim!(i16, "integer");
prim!(i32, "integer");
prim!(i64, "integer");
prim!(isize, "integer");
prim!(u8, "integer");
prim!(u16, "integer");
prim!(u32, "integer");
prim!(u64, "integer");
prim!(usize, "integer");
prim!(f32, "number");
prim!(f64, "number");
prim!(String, "string");
prim!(str, "string");
prim!((), "null");

impl ToolSchema for &'_ str {
    fn schema() -> Value {
        <str as ToolSchema>::schema()
    }
}

// Generic containers build their schema on every call; concrete derived
// types cache the composed result instead.
impl<T: ToolSchema> ToolSchema for Option<T> {
    fn schema() -> Value {
        serde_json::json!({
            "anyOf": [
                T::schema(),
                { "type": "null" }
            ]
        })
    }
}

impl<T: ToolSchema> ToolSchema for Vec<T> {
    fn schema() -> Value {
        serde_json::json!({
            "type": "array",
            "items": T::schema()
        })
    }
}

impl<T: ToolSchema> ToolSchema for HashMap<String, T> {
    fn schema() -> Value {
        serde_json::json!({
            "type": "object",
            "additionalProperties": T::schema()
        })
    }
}

macro_rules! impl_tuples {
    ($($len:expr => ($($name:ident)+))+) => {
        $(
            impl<$($name: ToolSchema),+> ToolSchema for ($($name,)+) {
                fn schema() -> Value {
                    serde_json::json!({
                        "type": "array",
                        "prefixItems": [$($name::schema()),+],
                        "minItems": $len,
                        "maxItems": $len
                    })
                }
            }
        )+
    }
}

impl_tuples! {
    1 => (T0)
    2 => (T0 T1)
    3 => (T0 T1 T2)
    4 => (T0 T1 T2 T3)
    5 => (T0 T1 T2 T3 T4)
    6 => (T0 T1 T2 T3 T4 T5)
}

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Errors that can occur while registering or dispatching tools.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool '{name}' not found")]
    FunctionNotFound { name: Cow<'static, str> },

    #[error("tool '{name}' is already registered")]
    AlreadyRegistered { name: &'static str },

    /// The arguments did not match the tool's input schema. The tool body
    /// never ran.
    #[error("invalid arguments for tool '{name}': {source}")]
    Deserialize {
        name: Cow<'static, str>,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize output of tool '{name}': {source}")]
    Serialization {
        name: Cow<'static, str>,
        #[source]
        source: serde_json::Error,
    },

    /// The tool body ran and returned an error.
    #[error("tool '{name}' failed: {source}")]
    Execution {
        name: Cow<'static, str>,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ToolError {
    /// Name of the tool the error is about.
    pub fn tool_name(&self) -> &str {
        match self {
            Self::FunctionNotFound { name }
            | Self::Deserialize { name, .. }
            | Self::Serialization { name, .. }
            | Self::Execution { name, .. } => name.as_ref(),
            Self::AlreadyRegistered { name } => name,
        }
    }
}

// ============================================================================
// CORE MODELS
// ============================================================================

/// A model-issued request to run one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: Value,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Type-erased async tool body.
pub type ToolFunc = dyn Fn(Value) -> BoxFuture<'static, Result<Value, ToolError>> + Send + Sync;

/// Declaration of a tool as advertised to a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: Cow<'static, str>,
    pub description: Cow<'static, str>,
    /// JSON schema of the input object.
    pub parameters: Value,
    /// JSON schema of the serialized output.
    pub returns: Value,
}

impl FunctionDecl {
    pub fn new(
        name: &'static str,
        description: &'static str,
        parameters: Value,
        returns: Value,
    ) -> Self {
        Self {
            name: Cow::Borrowed(name),
            description: Cow::Borrowed(description),
            parameters,
            returns,
        }
    }
}

// ============================================================================
// TOOL COLLECTION
// ============================================================================

/// Name-indexed set of callable tools.
///
/// Collections are built once and then shared read-only; cloning is cheap
/// because tool bodies are reference counted.
#[derive(Default, Clone)]
pub struct ToolCollection {
    funcs: HashMap<&'static str, Arc<ToolFunc>>,
    declarations: HashMap<&'static str, FunctionDecl>,
}

impl fmt::Debug for ToolCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolCollection")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fallible async tool under `name`.
    ///
    /// Arguments are deserialized into `I` before `func` runs; a mismatch is
    /// reported as [`ToolError::Deserialize`]. An `Err` from `func` becomes
    /// [`ToolError::Execution`].
    pub fn register<I, O, E, F, Fut>(
        &mut self,
        name: &'static str,
        desc: &'static str,
        func: F,
    ) -> Result<&mut Self, ToolError>
    where
        I: 'static + DeserializeOwned + Send + ToolSchema,
        O: 'static + Serialize + Send + ToolSchema,
        E: 'static + std::error::Error + Send + Sync,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
    {
        if self.funcs.contains_key(name) {
            return Err(ToolError::AlreadyRegistered { name });
        }

        self.declarations
            .insert(name, FunctionDecl::new(name, desc, I::schema(), O::schema()));

        let func_arc: Arc<F> = Arc::new(func);
        self.funcs.insert(
            name,
            Arc::new(
                move |raw: Value| -> BoxFuture<'static, Result<Value, ToolError>> {
                    let func = func_arc.clone();
                    async move {
                        let input: I = serde_json::from_value(raw).map_err(|source| {
                            ToolError::Deserialize {
                                name: Cow::Borrowed(name),
                                source,
                            }
                        })?;
                        let output: O =
                            (func)(input).await.map_err(|e| ToolError::Execution {
                                name: Cow::Borrowed(name),
                                source: Box::new(e),
                            })?;
                        serde_json::to_value(output).map_err(|source| ToolError::Serialization {
                            name: Cow::Borrowed(name),
                            source,
                        })
                    }
                    .boxed()
                },
            ),
        );

        tracing::debug!(target: TRACING_TARGET, tool = name, "registered tool");
        Ok(self)
    }

    /// Runs the tool named in `call` with its arguments.
    pub async fn call(&self, call: FunctionCall) -> Result<Value, ToolError> {
        let FunctionCall { name, arguments } = call;
        let async_func = self
            .funcs
            .get(name.as_str())
            .ok_or(ToolError::FunctionNotFound {
                name: Cow::Owned(name),
            })?;
        async_func(arguments).await
    }

    pub fn unregister(&mut self, name: &str) -> Result<(), ToolError> {
        if self.funcs.remove(name).is_none() {
            return Err(ToolError::FunctionNotFound {
                name: Cow::Owned(name.to_string()),
            });
        }
        self.declarations.remove(name);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.funcs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.funcs.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn descriptions(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.declarations
            .values()
            .map(|d| (d.name.as_ref(), d.description.as_ref()))
    }

    /// Declarations sorted by name, so requests built from them are stable.
    pub fn declarations(&self) -> Vec<&FunctionDecl> {
        let mut decls: Vec<_> = self.declarations.values().collect();
        decls.sort_unstable_by(|a, b| a.name.cmp(&b.name));
        decls
    }

    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self.declarations())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod schema_tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_primitive_schemas() {
        assert_eq!(bool::schema(), json!({"type": "boolean"}));
        assert_eq!(i32::schema(), json!({"type": "integer"}));
        assert_eq!(f64::schema(), json!({"type": "number"}));
        assert_eq!(String::schema(), json!({"type": "string"}));
        assert_eq!(<&str>::schema(), json!({"type": "string"}));
        assert_eq!(<()>::schema(), json!({"type": "null"}));
    }

    #[test]
    fn test_option_schema() {
        assert_eq!(
            <Option<String>>::schema(),
            json!({"anyOf": [{"type": "string"}, {"type": "null"}]})
        );
    }

    #[test]
    fn test_container_schemas() {
        assert_eq!(
            <Vec<i64>>::schema(),
            json!({"type": "array", "items": {"type": "integer"}})
        );
        assert_eq!(
            <HashMap<String, bool>>::schema(),
            json!({"type": "object", "additionalProperties": {"type": "boolean"}})
        );
        assert_eq!(
            <(i32, String)>::schema(),
            json!({
                "type": "array",
                "prefixItems": [{"type": "integer"}, {"type": "string"}],
                "minItems": 2,
                "maxItems": 2
            })
        );
    }

    #[test]
    fn test_concurrent_schema_access() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    for _ in 0..100 {
                        assert_eq!(String::schema()["type"], "string");
                        assert_eq!(u64::schema()["type"], "integer");
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
