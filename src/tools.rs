//! Data-fetch tools the model may call to read the caller's items, lists and folders.

use std::sync::Arc;

use assist_core::{ToolCollection, ToolError};
use assist_macros::ToolSchema;
use serde::{Deserialize, Serialize};

use crate::record::{ItemRecord, ListRecord, RecordError};
use crate::store::{Collection, Document, DocumentStore, StoreError};

/// Tracing target for tool execution.
pub const TRACING_TARGET_TOOLS: &str = "docit_functions::tools";

pub const FETCH_ITEMS: &str = "fetch_items";
pub const FETCH_LISTS: &str = "fetch_lists";
pub const FETCH_FOLDERS: &str = "fetch_folders";

const FETCH_ITEMS_DESC: &str = "Fetches the items created by a user, with their name, count, \
     description and creation/modification dates. Pass the caller's userId.";
const FETCH_LISTS_DESC: &str = "Fetches the lists created by a user, with their name, \
     description and creation/modification dates. Pass the caller's userId.";
const FETCH_FOLDERS_DESC: &str = "Fetches the folders created by a user, with their name, \
     description and creation/modification dates. Pass the caller's userId.";

/// Input shared by every data-fetch tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToolSchema)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    /// Identifier of the user whose records are fetched.
    #[serde(default)]
    pub user_id: Option<String>,
}

impl FetchRequest {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }
}

/// Which tools a generation may use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Toolset {
    /// Plain generation without data access.
    #[value(name = "none")]
    Empty,
    /// Items only.
    Items,
    /// Items, lists and folders.
    #[default]
    All,
}

impl Toolset {
    pub fn tool_names(self) -> &'static [&'static str] {
        match self {
            Self::Empty => &[],
            Self::Items => &[FETCH_ITEMS],
            Self::All => &[FETCH_ITEMS, FETCH_LISTS, FETCH_FOLDERS],
        }
    }
}

/// A data-fetch tool failed.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Data-fetch tools over a shared document store.
#[derive(Clone)]
pub struct DataTools {
    store: Arc<dyn DocumentStore>,
}

impl DataTools {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn fetch_items(&self, user_id: &str) -> Result<Vec<ItemRecord>, FetchError> {
        self.fetch(Collection::Items, user_id, ItemRecord::from_document)
            .await
    }

    pub async fn fetch_lists(&self, user_id: &str) -> Result<Vec<ListRecord>, FetchError> {
        self.fetch(Collection::Lists, user_id, ListRecord::from_document)
            .await
    }

    pub async fn fetch_folders(&self, user_id: &str) -> Result<Vec<ListRecord>, FetchError> {
        self.fetch(Collection::Folders, user_id, ListRecord::from_document)
            .await
    }

    /// An empty `user_id` yields no records and never reaches the store.
    async fn fetch<R>(
        &self,
        collection: Collection,
        user_id: &str,
        normalize: fn(&Document) -> Result<R, RecordError>,
    ) -> Result<Vec<R>, FetchError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            tracing::debug!(
                target: TRACING_TARGET_TOOLS,
                collection = %collection,
                "no user id supplied, returning no records"
            );
            return Ok(Vec::new());
        }

        let documents = self.store.query_owned(collection, user_id).await?;
        let total = documents.len();
        let records = documents
            .iter()
            .filter(|doc| doc.owner() == Some(user_id))
            .map(normalize)
            .collect::<Result<Vec<_>, _>>()?;

        if records.len() != total {
            tracing::warn!(
                target: TRACING_TARGET_TOOLS,
                collection = %collection,
                dropped = total - records.len(),
                "store returned documents owned by another user"
            );
        }

        tracing::debug!(
            target: TRACING_TARGET_TOOLS,
            collection = %collection,
            count = records.len(),
            "fetched records"
        );
        Ok(records)
    }

    /// Registers the tools selected by `toolset` into `collection`, bound to
    /// `caller`.
    ///
    /// A call only reads records when its `userId` argument names `caller`;
    /// any other id, or none, yields no records.
    pub fn register(
        &self,
        toolset: Toolset,
        caller: &str,
        collection: &mut ToolCollection,
    ) -> Result<(), ToolError> {
        let caller: Arc<str> = Arc::from(caller.trim());
        for name in toolset.tool_names() {
            let tools = self.clone();
            let caller = caller.clone();
            match *name {
                FETCH_ITEMS => collection.register(
                    FETCH_ITEMS,
                    FETCH_ITEMS_DESC,
                    move |req: FetchRequest| {
                        let tools = tools.clone();
                        let caller = caller.clone();
                        async move {
                            let user_id = permitted_user(FETCH_ITEMS, &caller, &req);
                            tools.fetch_items(user_id).await
                        }
                    },
                )?,
                FETCH_LISTS => collection.register(
                    FETCH_LISTS,
                    FETCH_LISTS_DESC,
                    move |req: FetchRequest| {
                        let tools = tools.clone();
                        let caller = caller.clone();
                        async move {
                            let user_id = permitted_user(FETCH_LISTS, &caller, &req);
                            tools.fetch_lists(user_id).await
                        }
                    },
                )?,
                _ => collection.register(
                    FETCH_FOLDERS,
                    FETCH_FOLDERS_DESC,
                    move |req: FetchRequest| {
                        let tools = tools.clone();
                        let caller = caller.clone();
                        async move {
                            let user_id = permitted_user(FETCH_FOLDERS, &caller, &req);
                            tools.fetch_folders(user_id).await
                        }
                    },
                )?,
            };
        }
        Ok(())
    }

    /// Builds a fresh collection holding the tools selected by `toolset`,
    /// bound to `caller`.
    pub fn collection(
        &self,
        toolset: Toolset,
        caller: &str,
    ) -> Result<ToolCollection, ToolError> {
        let mut collection = ToolCollection::new();
        self.register(toolset, caller, &mut collection)?;
        Ok(collection)
    }
}

/// Id a tool call may read: the caller's own, and only when the model asked
/// for it. Anything else maps to the empty id, which reads nothing.
fn permitted_user<'a>(tool: &str, caller: &'a str, req: &FetchRequest) -> &'a str {
    let requested = req.user_id.as_deref().map(str::trim).unwrap_or_default();
    if requested.is_empty() {
        return "";
    }
    if requested != caller {
        tracing::warn!(
            target: TRACING_TARGET_TOOLS,
            tool,
            caller,
            requested,
            "model requested another user's records, returning none"
        );
        return "";
    }
    caller
}
