//! Proposal routes: versions, public share links, diffs and attachments

use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use serde_json::Value;
use std::sync::Arc;

use crate::api::{Created, ListResponse, NoContent};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::proposals::{
    CreateProposalRequest, CreateVersionRequest, DiffQuery, DocumentListQuery, NewDocument,
    Proposal, ProposalDiff, ProposalDocument, ProposalVersion, PublicProposal,
};
use crate::error::{ApiError, ApiResult};
use crate::services::storage::PRESIGN_TTL;

const DEFAULT_DOCUMENT_KIND: &str = "attachment";

async fn owned_proposal(state: &AppState, proposal_id: &str, owner_email: &str) -> ApiResult<Proposal> {
    state
        .stores
        .proposals
        .get_owned_proposal(proposal_id, owner_email)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Proposal {proposal_id} not found")))
}

/// POST /api/v1/proposals
pub async fn create_proposal(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProposalRequest>,
) -> ApiResult<Created<Value>> {
    let (proposal, version) = state
        .stores
        .proposals
        .create_proposal(&auth.owner_email, req.title, req.payload)
        .await?;
    tracing::info!(proposal_id = %proposal.proposal_id, owner = %auth.owner_email, "Proposal created");
    Ok(Created(serde_json::json!({
        "proposal": proposal,
        "version": version,
    })))
}

/// GET /api/v1/proposals
pub async fn list_proposals(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> ApiResult<ListResponse<Proposal>> {
    let proposals = state.stores.proposals.list_proposals(&auth.owner_email).await?;
    Ok(ListResponse::new(proposals))
}

/// GET /api/v1/proposals/:proposal_id
pub async fn get_proposal(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(proposal_id): Path<String>,
) -> ApiResult<Json<Proposal>> {
    Ok(Json(owned_proposal(&state, &proposal_id, &auth.owner_email).await?))
}

/// GET /api/v1/proposals/public/:public_id
pub async fn get_public_proposal(
    State(state): State<Arc<AppState>>,
    Path(public_id): Path<String>,
) -> ApiResult<Json<PublicProposal>> {
    let proposal = state
        .stores
        .proposals
        .get_by_public_id(&public_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Proposal not found"))?;
    Ok(Json(proposal.into()))
}

/// POST /api/v1/proposals/:proposal_id/versions
pub async fn create_version(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(proposal_id): Path<String>,
    Json(req): Json<CreateVersionRequest>,
) -> ApiResult<Created<ProposalVersion>> {
    let version = state
        .stores
        .proposals
        .create_version(&proposal_id, &auth.owner_email, req.title, req.payload)
        .await?;
    tracing::info!(proposal_id = %proposal_id, version = version.version, "Proposal version created");
    Ok(Created(version))
}

/// GET /api/v1/proposals/:proposal_id/versions
pub async fn list_versions(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(proposal_id): Path<String>,
) -> ApiResult<ListResponse<ProposalVersion>> {
    owned_proposal(&state, &proposal_id, &auth.owner_email).await?;
    let versions = state
        .stores
        .proposals
        .list_versions(&proposal_id, &auth.owner_email)
        .await?;
    Ok(ListResponse::new(versions))
}

async fn owned_version(
    state: &AppState,
    proposal_id: &str,
    version: i32,
    owner_email: &str,
) -> ApiResult<ProposalVersion> {
    state
        .stores
        .proposals
        .get_version(proposal_id, version, owner_email)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Version {version} not found")))
}

/// GET /api/v1/proposals/:proposal_id/versions/:version
pub async fn get_version(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path((proposal_id, version)): Path<(String, i32)>,
) -> ApiResult<Json<ProposalVersion>> {
    Ok(Json(
        owned_version(&state, &proposal_id, version, &auth.owner_email).await?,
    ))
}

/// GET /api/v1/proposals/:proposal_id/diff?from_version&to_version
pub async fn diff_versions(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(proposal_id): Path<String>,
    Query(query): Query<DiffQuery>,
) -> ApiResult<Json<ProposalDiff>> {
    let from = owned_version(&state, &proposal_id, query.from_version, &auth.owner_email).await?;
    let to = owned_version(&state, &proposal_id, query.to_version, &auth.owner_email).await?;
    Ok(Json(ProposalDiff::between(&from, &to)))
}

async fn with_download_url(state: &AppState, mut document: ProposalDocument) -> ProposalDocument {
    if let Some(storage) = &state.storage {
        document.download_url = storage.presign_get(&document.key, PRESIGN_TTL).await;
    }
    document
}

/// POST /api/v1/proposals/:proposal_id/documents
///
/// Multipart fields: `file` (required), `kind`, `version`.
pub async fn upload_document(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(proposal_id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<Created<ProposalDocument>> {
    let storage = state.storage()?;
    owned_proposal(&state, &proposal_id, &auth.owner_email).await?;

    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut kind = DEFAULT_DOCUMENT_KIND.to_string();
    let mut version: Option<i32> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;
                file = Some((filename, content_type, bytes.to_vec()));
            }
            "kind" => {
                let text = field.text().await.unwrap_or_default();
                if !text.trim().is_empty() {
                    kind = text.trim().to_lowercase();
                }
            }
            "version" => {
                let text = field.text().await.unwrap_or_default();
                version = Some(
                    text.trim()
                        .parse()
                        .map_err(|_| ApiError::bad_request("version must be an integer"))?,
                );
            }
            _ => {}
        }
    }

    let (filename, content_type, bytes) =
        file.ok_or_else(|| ApiError::bad_request("Missing 'file' field"))?;
    if bytes.is_empty() {
        return Err(ApiError::bad_request("Uploaded file is empty"));
    }
    if bytes.len() > state.settings.max_upload_bytes {
        return Err(ApiError::bad_request(format!(
            "File exceeds the {} byte upload limit",
            state.settings.max_upload_bytes
        )));
    }

    let size_bytes = bytes.len() as i64;
    let stored = storage
        .upload_bytes(
            bytes,
            &format!("proposals/{proposal_id}"),
            &filename,
            content_type.as_deref().unwrap_or("application/octet-stream"),
        )
        .await
        .map_err(ApiError::Internal)?;

    let document = state
        .stores
        .proposals
        .add_document(
            &proposal_id,
            &auth.owner_email,
            NewDocument {
                kind,
                version,
                filename: stored.filename,
                content_type,
                bucket: stored.bucket,
                key: stored.key,
                size_bytes,
                meta: serde_json::json!({ "original_filename": filename }),
            },
        )
        .await?;
    tracing::info!(
        proposal_id = %proposal_id,
        document_id = %document.document_id,
        size = size_bytes,
        "Document uploaded"
    );
    Ok(Created(with_download_url(&state, document).await))
}

/// GET /api/v1/proposals/:proposal_id/documents
pub async fn list_documents(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(proposal_id): Path<String>,
    Query(query): Query<DocumentListQuery>,
) -> ApiResult<ListResponse<ProposalDocument>> {
    owned_proposal(&state, &proposal_id, &auth.owner_email).await?;
    let documents = state
        .stores
        .proposals
        .list_documents(&proposal_id, &auth.owner_email, query.version)
        .await?;
    let mut out = Vec::with_capacity(documents.len());
    for document in documents {
        out.push(with_download_url(&state, document).await);
    }
    Ok(ListResponse::new(out))
}

/// GET /api/v1/proposals/:proposal_id/documents/:document_id
pub async fn get_document(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path((proposal_id, document_id)): Path<(String, String)>,
) -> ApiResult<Json<ProposalDocument>> {
    let document = state
        .stores
        .proposals
        .get_document(&proposal_id, &auth.owner_email, &document_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Document {document_id} not found")))?;
    Ok(Json(with_download_url(&state, document).await))
}

/// DELETE /api/v1/proposals/:proposal_id/documents/:document_id
pub async fn delete_document(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path((proposal_id, document_id)): Path<(String, String)>,
) -> ApiResult<NoContent> {
    let document = state
        .stores
        .proposals
        .get_document(&proposal_id, &auth.owner_email, &document_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Document {document_id} not found")))?;

    if let Some(storage) = &state.storage {
        if let Err(e) = storage.delete(&document.key).await {
            tracing::warn!(key = %document.key, error = %e, "Failed to delete document object");
        }
    }
    state
        .stores
        .proposals
        .delete_document(&proposal_id, &auth.owner_email, &document_id)
        .await?;
    Ok(NoContent)
}
