//! Documents: file bytes in object storage plus a metadata row.
//!
//! Objects are stored in the `documents` bucket under `{owner}/{uuid}-{file name}`
//! so paths never collide and the platform's storage policy can match on the
//! owner prefix. The row is only written once the bytes are stored; a failed
//! insert removes the object again.

use super::{Resource, ResourceApi, SortKey};
use crate::{
    entities::{DocumentModel, document},
    errors::{Error, Result},
};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// The `documents` table.
pub struct Documents;

/// Metadata of a stored document.
#[derive(Debug, Clone, Serialize)]
pub struct NewDocument {
    /// Display name
    pub name: String,
    /// Grouping shown in the UI
    pub category: String,
    /// Object path inside the `documents` bucket
    pub storage_path: String,
    /// Content type of the stored bytes
    pub mime_type: String,
    /// Size of the stored bytes
    pub file_size: i64,
    /// Family member the record belongs to
    pub family_member_id: Option<Uuid>,
}

/// Metadata fields to change. The stored bytes cannot be replaced in place.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentPatch {
    /// New display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New grouping shown in the UI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// New family member the record belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_member_id: Option<Uuid>,
}

/// A file to upload.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Original file name
    pub name: String,
    /// Grouping shown in the UI
    pub category: String,
    /// Content type of the stored bytes
    pub mime_type: String,
    /// File contents
    pub bytes: Vec<u8>,
    /// Family member the record belongs to
    pub family_member_id: Option<Uuid>,
}

impl Resource for Documents {
    const TABLE: &'static str = document::TABLE;
    const SORT: SortKey = SortKey::NEWEST_FIRST;

    type Row = DocumentModel;
    type New = NewDocument;
    type Patch = DocumentPatch;

    fn validate(new: &NewDocument) -> Result<()> {
        if new.storage_path.is_empty() {
            return Err(Error::validation("document has no storage path"));
        }
        Ok(())
    }

    fn validate_patch(patch: &DocumentPatch) -> Result<()> {
        if patch.name.as_deref().is_some_and(|v| v.trim().is_empty()) {
            return Err(Error::validation("document name cannot be empty"));
        }
        Ok(())
    }
}

/// Object path for a new upload.
fn object_path(owner: Uuid, name: &str) -> String {
    let file_name: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("{owner}/{}-{file_name}", Uuid::new_v4())
}

impl ResourceApi<Documents> {
    /// Stores the bytes, then records the document row.
    pub async fn upload(&self, upload: Upload) -> Result<DocumentModel> {
        if upload.name.trim().is_empty() {
            return Err(Error::validation("document name cannot be empty"));
        }
        let owner = self.client().require_session().await?.owner();
        let file_size = i64::try_from(upload.bytes.len())
            .map_err(|_| Error::validation("document too large"))?;

        let bucket = self.client().storage(document::BUCKET);
        let path = bucket
            .upload(&object_path(owner, &upload.name), upload.bytes, &upload.mime_type)
            .await?;

        let created = self
            .create(NewDocument {
                name: upload.name,
                category: upload.category,
                storage_path: path.clone(),
                mime_type: upload.mime_type,
                file_size,
                family_member_id: upload.family_member_id,
            })
            .await;

        match created {
            Ok(row) => Ok(row),
            Err(e) => {
                warn!("Document row insert failed, removing {}: {}", path, e);
                if let Err(cleanup) = bucket.remove(std::slice::from_ref(&path)).await {
                    warn!("Could not remove orphaned object {}: {}", path, cleanup);
                }
                Err(e)
            }
        }
    }

    /// Deletes the document row, then its stored bytes. Removing an absent document succeeds.
    pub async fn remove(&self, id: Uuid) -> Result<()> {
        let Some(row) = self.delete_returning(id).await? else {
            return Ok(());
        };
        self.client()
            .storage(document::BUCKET)
            .remove(&[row.storage_path.clone()])
            .await?;
        info!("Removed document {} ({})", row.name, row.storage_path);
        Ok(())
    }

    /// Public URL of a document's bytes.
    pub fn url(&self, row: &DocumentModel) -> Result<String> {
        self.client()
            .storage(document::BUCKET)
            .public_url(&row.storage_path)
    }
}
