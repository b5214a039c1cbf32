//! Proposal, version and document persistence

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;

use super::{new_id, new_public_id, StoreError, StoreResult};
use crate::domain::proposals::{NewDocument, Proposal, ProposalDocument, ProposalVersion};

fn proposal_not_found() -> StoreError {
    StoreError::NotFound("Proposal not found".to_string())
}

#[async_trait]
pub trait ProposalStore: Send + Sync {
    /// Creates the proposal together with version 1
    async fn create_proposal(
        &self,
        owner_email: &str,
        title: Option<String>,
        payload: Value,
    ) -> StoreResult<(Proposal, ProposalVersion)>;

    /// Newest-updated first
    async fn list_proposals(&self, owner_email: &str) -> StoreResult<Vec<Proposal>>;

    /// None when missing or owned by someone else
    async fn get_owned_proposal(
        &self,
        proposal_id: &str,
        owner_email: &str,
    ) -> StoreResult<Option<Proposal>>;

    async fn get_by_public_id(&self, public_id: &str) -> StoreResult<Option<Proposal>>;

    /// Appends version `latest + 1` and makes it the proposal's current payload
    async fn create_version(
        &self,
        proposal_id: &str,
        owner_email: &str,
        title: Option<String>,
        payload: Value,
    ) -> StoreResult<ProposalVersion>;

    /// Ascending by version number
    async fn list_versions(
        &self,
        proposal_id: &str,
        owner_email: &str,
    ) -> StoreResult<Vec<ProposalVersion>>;

    async fn get_version(
        &self,
        proposal_id: &str,
        version: i32,
        owner_email: &str,
    ) -> StoreResult<Option<ProposalVersion>>;

    async fn add_document(
        &self,
        proposal_id: &str,
        owner_email: &str,
        document: NewDocument,
    ) -> StoreResult<ProposalDocument>;

    /// Ascending by creation time, optionally limited to one version
    async fn list_documents(
        &self,
        proposal_id: &str,
        owner_email: &str,
        version: Option<i32>,
    ) -> StoreResult<Vec<ProposalDocument>>;

    async fn get_document(
        &self,
        proposal_id: &str,
        owner_email: &str,
        document_id: &str,
    ) -> StoreResult<Option<ProposalDocument>>;

    /// True when a document was removed
    async fn delete_document(
        &self,
        proposal_id: &str,
        owner_email: &str,
        document_id: &str,
    ) -> StoreResult<bool>;
}

fn build_document(proposal_id: &str, document: NewDocument) -> ProposalDocument {
    ProposalDocument {
        document_id: new_id("doc"),
        proposal_id: proposal_id.to_string(),
        kind: document.kind,
        version: document.version,
        filename: document.filename,
        content_type: document.content_type,
        bucket: document.bucket,
        key: document.key,
        size_bytes: document.size_bytes,
        meta: document.meta,
        created_at: Utc::now(),
        download_url: None,
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default)]
struct MemoryInner {
    proposals: HashMap<String, Proposal>,
    versions: HashMap<String, Vec<ProposalVersion>>,
    documents: HashMap<String, Vec<ProposalDocument>>,
}

impl MemoryInner {
    fn owned(&self, proposal_id: &str, owner_email: &str) -> StoreResult<&Proposal> {
        self.proposals
            .get(proposal_id)
            .filter(|p| p.owner_email == owner_email)
            .ok_or_else(proposal_not_found)
    }
}

#[derive(Default)]
pub struct MemoryProposalStore {
    inner: Mutex<MemoryInner>,
}

#[async_trait]
impl ProposalStore for MemoryProposalStore {
    async fn create_proposal(
        &self,
        owner_email: &str,
        title: Option<String>,
        payload: Value,
    ) -> StoreResult<(Proposal, ProposalVersion)> {
        let now = Utc::now();
        let proposal = Proposal {
            proposal_id: new_id("prop"),
            public_id: new_public_id(),
            owner_email: owner_email.to_string(),
            title: title.clone(),
            payload: payload.clone(),
            latest_version: 1,
            created_at: now,
            updated_at: now,
        };
        let version = ProposalVersion {
            version_id: new_id("ver"),
            proposal_id: proposal.proposal_id.clone(),
            version: 1,
            title,
            payload,
            created_at: now,
        };

        let mut inner = self.inner.lock();
        inner
            .proposals
            .insert(proposal.proposal_id.clone(), proposal.clone());
        inner
            .versions
            .insert(proposal.proposal_id.clone(), vec![version.clone()]);
        Ok((proposal, version))
    }

    async fn list_proposals(&self, owner_email: &str) -> StoreResult<Vec<Proposal>> {
        let inner = self.inner.lock();
        let mut rows: Vec<Proposal> = inner
            .proposals
            .values()
            .filter(|p| p.owner_email == owner_email)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(rows)
    }

    async fn get_owned_proposal(
        &self,
        proposal_id: &str,
        owner_email: &str,
    ) -> StoreResult<Option<Proposal>> {
        let inner = self.inner.lock();
        Ok(inner.owned(proposal_id, owner_email).ok().cloned())
    }

    async fn get_by_public_id(&self, public_id: &str) -> StoreResult<Option<Proposal>> {
        let inner = self.inner.lock();
        Ok(inner
            .proposals
            .values()
            .find(|p| p.public_id == public_id)
            .cloned())
    }

    async fn create_version(
        &self,
        proposal_id: &str,
        owner_email: &str,
        title: Option<String>,
        payload: Value,
    ) -> StoreResult<ProposalVersion> {
        let mut inner = self.inner.lock();
        inner.owned(proposal_id, owner_email)?;

        let now = Utc::now();
        let proposal = inner
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(proposal_not_found)?;
        proposal.latest_version += 1;
        if title.is_some() {
            proposal.title = title;
        }
        proposal.payload = payload.clone();
        proposal.updated_at = now;

        let version = ProposalVersion {
            version_id: new_id("ver"),
            proposal_id: proposal_id.to_string(),
            version: proposal.latest_version,
            title: proposal.title.clone(),
            payload,
            created_at: now,
        };
        inner
            .versions
            .entry(proposal_id.to_string())
            .or_default()
            .push(version.clone());
        Ok(version)
    }

    async fn list_versions(
        &self,
        proposal_id: &str,
        owner_email: &str,
    ) -> StoreResult<Vec<ProposalVersion>> {
        let inner = self.inner.lock();
        inner.owned(proposal_id, owner_email)?;
        let mut versions = inner.versions.get(proposal_id).cloned().unwrap_or_default();
        versions.sort_by_key(|v| v.version);
        Ok(versions)
    }

    async fn get_version(
        &self,
        proposal_id: &str,
        version: i32,
        owner_email: &str,
    ) -> StoreResult<Option<ProposalVersion>> {
        let inner = self.inner.lock();
        if inner.owned(proposal_id, owner_email).is_err() {
            return Ok(None);
        }
        Ok(inner
            .versions
            .get(proposal_id)
            .and_then(|vs| vs.iter().find(|v| v.version == version))
            .cloned())
    }

    async fn add_document(
        &self,
        proposal_id: &str,
        owner_email: &str,
        document: NewDocument,
    ) -> StoreResult<ProposalDocument> {
        let mut inner = self.inner.lock();
        inner.owned(proposal_id, owner_email)?;
        let doc = build_document(proposal_id, document);
        inner
            .documents
            .entry(proposal_id.to_string())
            .or_default()
            .push(doc.clone());
        Ok(doc)
    }

    async fn list_documents(
        &self,
        proposal_id: &str,
        owner_email: &str,
        version: Option<i32>,
    ) -> StoreResult<Vec<ProposalDocument>> {
        let inner = self.inner.lock();
        inner.owned(proposal_id, owner_email)?;
        let mut docs: Vec<ProposalDocument> = inner
            .documents
            .get(proposal_id)
            .map(|docs| {
                docs.iter()
                    .filter(|d| version.is_none() || d.version == version)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        docs.sort_by_key(|d| d.created_at);
        Ok(docs)
    }

    async fn get_document(
        &self,
        proposal_id: &str,
        owner_email: &str,
        document_id: &str,
    ) -> StoreResult<Option<ProposalDocument>> {
        let inner = self.inner.lock();
        if inner.owned(proposal_id, owner_email).is_err() {
            return Ok(None);
        }
        Ok(inner
            .documents
            .get(proposal_id)
            .and_then(|docs| docs.iter().find(|d| d.document_id == document_id))
            .cloned())
    }

    async fn delete_document(
        &self,
        proposal_id: &str,
        owner_email: &str,
        document_id: &str,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        if inner.owned(proposal_id, owner_email).is_err() {
            return Ok(false);
        }
        let Some(docs) = inner.documents.get_mut(proposal_id) else {
            return Ok(false);
        };
        let before = docs.len();
        docs.retain(|d| d.document_id != document_id);
        Ok(docs.len() != before)
    }
}

// ============================================================================
// Postgres
// ============================================================================

pub struct PgProposalStore {
    pool: PgPool,
}

impl PgProposalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn owns(&self, proposal_id: &str, owner_email: &str) -> StoreResult<bool> {
        let row: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM proposals WHERE proposal_id = $1 AND owner_email = $2")
                .bind(proposal_id)
                .bind(owner_email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }
}

const PROPOSAL_COLUMNS: &str =
    "proposal_id, public_id, owner_email, title, payload, latest_version, created_at, updated_at";
const VERSION_COLUMNS: &str = "version_id, proposal_id, version, title, payload, created_at";
const DOCUMENT_COLUMNS: &str = "document_id, proposal_id, kind, version, filename, content_type, \
     bucket, object_key, size_bytes, meta, created_at";

#[async_trait]
impl ProposalStore for PgProposalStore {
    async fn create_proposal(
        &self,
        owner_email: &str,
        title: Option<String>,
        payload: Value,
    ) -> StoreResult<(Proposal, ProposalVersion)> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let proposal: Proposal = sqlx::query_as(&format!(
            "INSERT INTO proposals (proposal_id, public_id, owner_email, title, payload, latest_version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, 1, $6, $6) RETURNING {PROPOSAL_COLUMNS}"
        ))
        .bind(new_id("prop"))
        .bind(new_public_id())
        .bind(owner_email)
        .bind(&title)
        .bind(&payload)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let version: ProposalVersion = sqlx::query_as(&format!(
            "INSERT INTO proposal_versions (proposal_id, version, version_id, title, payload, created_at) \
             VALUES ($1, 1, $2, $3, $4, $5) RETURNING {VERSION_COLUMNS}"
        ))
        .bind(&proposal.proposal_id)
        .bind(new_id("ver"))
        .bind(&title)
        .bind(&payload)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((proposal, version))
    }

    async fn list_proposals(&self, owner_email: &str) -> StoreResult<Vec<Proposal>> {
        let rows = sqlx::query_as(&format!(
            "SELECT {PROPOSAL_COLUMNS} FROM proposals WHERE owner_email = $1 ORDER BY updated_at DESC"
        ))
        .bind(owner_email)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_owned_proposal(
        &self,
        proposal_id: &str,
        owner_email: &str,
    ) -> StoreResult<Option<Proposal>> {
        let row = sqlx::query_as(&format!(
            "SELECT {PROPOSAL_COLUMNS} FROM proposals WHERE proposal_id = $1 AND owner_email = $2"
        ))
        .bind(proposal_id)
        .bind(owner_email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_by_public_id(&self, public_id: &str) -> StoreResult<Option<Proposal>> {
        let row = sqlx::query_as(&format!(
            "SELECT {PROPOSAL_COLUMNS} FROM proposals WHERE public_id = $1"
        ))
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn create_version(
        &self,
        proposal_id: &str,
        owner_email: &str,
        title: Option<String>,
        payload: Value,
    ) -> StoreResult<ProposalVersion> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // The row lock taken by UPDATE serializes concurrent version bumps
        let bumped: Option<(i32, Option<String>)> = sqlx::query_as(
            "UPDATE proposals \
             SET latest_version = latest_version + 1, payload = $3, title = COALESCE($4, title), updated_at = $5 \
             WHERE proposal_id = $1 AND owner_email = $2 \
             RETURNING latest_version, title",
        )
        .bind(proposal_id)
        .bind(owner_email)
        .bind(&payload)
        .bind(&title)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((next_version, title)) = bumped else {
            return Err(proposal_not_found());
        };

        let version: ProposalVersion = sqlx::query_as(&format!(
            "INSERT INTO proposal_versions (proposal_id, version, version_id, title, payload, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {VERSION_COLUMNS}"
        ))
        .bind(proposal_id)
        .bind(next_version)
        .bind(new_id("ver"))
        .bind(&title)
        .bind(&payload)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(version)
    }

    async fn list_versions(
        &self,
        proposal_id: &str,
        owner_email: &str,
    ) -> StoreResult<Vec<ProposalVersion>> {
        if !self.owns(proposal_id, owner_email).await? {
            return Err(proposal_not_found());
        }
        let rows = sqlx::query_as(&format!(
            "SELECT {VERSION_COLUMNS} FROM proposal_versions WHERE proposal_id = $1 ORDER BY version ASC"
        ))
        .bind(proposal_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_version(
        &self,
        proposal_id: &str,
        version: i32,
        owner_email: &str,
    ) -> StoreResult<Option<ProposalVersion>> {
        let row = sqlx::query_as(
            "SELECT v.version_id, v.proposal_id, v.version, v.title, v.payload, v.created_at \
             FROM proposal_versions v JOIN proposals p ON p.proposal_id = v.proposal_id \
             WHERE v.proposal_id = $1 AND v.version = $2 AND p.owner_email = $3",
        )
        .bind(proposal_id)
        .bind(version)
        .bind(owner_email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn add_document(
        &self,
        proposal_id: &str,
        owner_email: &str,
        document: NewDocument,
    ) -> StoreResult<ProposalDocument> {
        if !self.owns(proposal_id, owner_email).await? {
            return Err(proposal_not_found());
        }
        let doc = build_document(proposal_id, document);
        sqlx::query(
            "INSERT INTO proposal_documents \
             (proposal_id, document_id, kind, version, filename, content_type, bucket, object_key, size_bytes, meta, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(&doc.proposal_id)
        .bind(&doc.document_id)
        .bind(&doc.kind)
        .bind(doc.version)
        .bind(&doc.filename)
        .bind(&doc.content_type)
        .bind(&doc.bucket)
        .bind(&doc.key)
        .bind(doc.size_bytes)
        .bind(&doc.meta)
        .bind(doc.created_at)
        .execute(&self.pool)
        .await?;
        Ok(doc)
    }

    async fn list_documents(
        &self,
        proposal_id: &str,
        owner_email: &str,
        version: Option<i32>,
    ) -> StoreResult<Vec<ProposalDocument>> {
        if !self.owns(proposal_id, owner_email).await? {
            return Err(proposal_not_found());
        }
        let rows = sqlx::query_as(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM proposal_documents \
             WHERE proposal_id = $1 AND ($2::INTEGER IS NULL OR version = $2) \
             ORDER BY created_at ASC"
        ))
        .bind(proposal_id)
        .bind(version)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_document(
        &self,
        proposal_id: &str,
        owner_email: &str,
        document_id: &str,
    ) -> StoreResult<Option<ProposalDocument>> {
        if !self.owns(proposal_id, owner_email).await? {
            return Ok(None);
        }
        let row = sqlx::query_as(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM proposal_documents WHERE proposal_id = $1 AND document_id = $2"
        ))
        .bind(proposal_id)
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_document(
        &self,
        proposal_id: &str,
        owner_email: &str,
        document_id: &str,
    ) -> StoreResult<bool> {
        if !self.owns(proposal_id, owner_email).await? {
            return Ok(false);
        }
        let result =
            sqlx::query("DELETE FROM proposal_documents WHERE proposal_id = $1 AND document_id = $2")
                .bind(proposal_id)
                .bind(document_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(version: Option<i32>, name: &str) -> NewDocument {
        NewDocument {
            kind: "rfp".to_string(),
            version,
            filename: name.to_string(),
            content_type: Some("application/pdf".to_string()),
            bucket: "bucket".to_string(),
            key: format!("proposals/{name}"),
            size_bytes: 10,
            meta: json!({}),
        }
    }

    #[tokio::test]
    async fn test_versions_increment_from_one() {
        let store = MemoryProposalStore::default();
        let (proposal, v1) = store
            .create_proposal("a@x.gov", Some("Draft".into()), json!({"sites": 1}))
            .await
            .unwrap();
        assert_eq!(v1.version, 1);
        assert_eq!(proposal.latest_version, 1);

        let v2 = store
            .create_version(&proposal.proposal_id, "a@x.gov", None, json!({"sites": 2}))
            .await
            .unwrap();
        let v3 = store
            .create_version(&proposal.proposal_id, "a@x.gov", Some("Final".into()), json!({"sites": 3}))
            .await
            .unwrap();
        assert_eq!((v2.version, v3.version), (2, 3));
        assert_eq!(v2.title.as_deref(), Some("Draft"));

        let versions = store
            .list_versions(&proposal.proposal_id, "a@x.gov")
            .await
            .unwrap();
        let numbers: Vec<i32> = versions.iter().map(|v| v.version).collect();
        assert_eq!(numbers, vec![1, 2, 3]);

        let current = store
            .get_owned_proposal(&proposal.proposal_id, "a@x.gov")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.payload, json!({"sites": 3}));
        assert_eq!(current.title.as_deref(), Some("Final"));
        assert_eq!(current.latest_version, 3);
    }

    #[tokio::test]
    async fn test_other_owner_cannot_read_or_write() {
        let store = MemoryProposalStore::default();
        let (proposal, _) = store
            .create_proposal("a@x.gov", None, json!({}))
            .await
            .unwrap();
        let id = proposal.proposal_id.as_str();

        assert!(store.get_owned_proposal(id, "b@x.gov").await.unwrap().is_none());
        assert!(store.get_version(id, 1, "b@x.gov").await.unwrap().is_none());
        assert!(matches!(
            store.create_version(id, "b@x.gov", None, json!({})).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.list_versions(id, "b@x.gov").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(store.list_proposals("b@x.gov").await.unwrap().is_empty());

        // The public link bypasses ownership
        let public = store.get_by_public_id(&proposal.public_id).await.unwrap();
        assert_eq!(public.map(|p| p.proposal_id), Some(proposal.proposal_id.clone()));
    }

    #[tokio::test]
    async fn test_documents_by_version() {
        let store = MemoryProposalStore::default();
        let (proposal, _) = store
            .create_proposal("a@x.gov", None, json!({}))
            .await
            .unwrap();
        let id = proposal.proposal_id.as_str();

        let first = store.add_document(id, "a@x.gov", doc(Some(1), "a.pdf")).await.unwrap();
        store.add_document(id, "a@x.gov", doc(Some(2), "b.pdf")).await.unwrap();
        store.add_document(id, "a@x.gov", doc(None, "c.pdf")).await.unwrap();

        assert_eq!(store.list_documents(id, "a@x.gov", None).await.unwrap().len(), 3);
        let v1 = store.list_documents(id, "a@x.gov", Some(1)).await.unwrap();
        assert_eq!(v1.len(), 1);
        assert_eq!(v1[0].filename, "a.pdf");
        assert!(first.document_id.starts_with("doc_"));

        assert!(store
            .get_document(id, "b@x.gov", &first.document_id)
            .await
            .unwrap()
            .is_none());
        assert!(!store.delete_document(id, "b@x.gov", &first.document_id).await.unwrap());
        assert!(store.delete_document(id, "a@x.gov", &first.document_id).await.unwrap());
        assert!(!store.delete_document(id, "a@x.gov", &first.document_id).await.unwrap());
    }
}
