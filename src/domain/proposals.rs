//! Proposal, version and attached-document types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Proposal entity; `payload` mirrors the latest version
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Proposal {
    pub proposal_id: String,
    pub public_id: String,
    pub owner_email: String,
    pub title: Option<String>,
    pub payload: Value,
    pub latest_version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Read-only view served on the public share link
#[derive(Debug, Clone, Serialize)]
pub struct PublicProposal {
    pub public_id: String,
    pub title: Option<String>,
    pub payload: Value,
    pub latest_version: i32,
    pub updated_at: DateTime<Utc>,
}

impl From<Proposal> for PublicProposal {
    fn from(p: Proposal) -> Self {
        Self {
            public_id: p.public_id,
            title: p.title,
            payload: p.payload,
            latest_version: p.latest_version,
            updated_at: p.updated_at,
        }
    }
}

/// Immutable snapshot of a proposal payload
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProposalVersion {
    pub version_id: String,
    pub proposal_id: String,
    pub version: i32,
    pub title: Option<String>,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

/// File attached to a proposal (RFP, report, supporting material)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProposalDocument {
    pub document_id: String,
    pub proposal_id: String,
    pub kind: String,
    pub version: Option<i32>,
    pub filename: String,
    pub content_type: Option<String>,
    pub bucket: String,
    #[sqlx(rename = "object_key")]
    pub key: String,
    pub size_bytes: i64,
    #[serde(default)]
    pub meta: Value,
    pub created_at: DateTime<Utc>,
    /// Presigned download link, filled in by the API layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[sqlx(default)]
    pub download_url: Option<String>,
}

/// Fields needed to register an uploaded object
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub kind: String,
    pub version: Option<i32>,
    pub filename: String,
    pub content_type: Option<String>,
    pub bucket: String,
    pub key: String,
    pub size_bytes: i64,
    pub meta: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProposalRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "empty_object")]
    pub payload: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateVersionRequest {
    #[serde(default)]
    pub title: Option<String>,
    pub payload: Value,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentListQuery {
    #[serde(default)]
    pub version: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiffQuery {
    pub from_version: i32,
    pub to_version: i32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DiffEntry {
    /// Dotted JSON path, array indices included (`modules.2`)
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProposalDiff {
    pub proposal_id: String,
    pub from_version: i32,
    pub to_version: i32,
    pub added: Vec<DiffEntry>,
    pub removed: Vec<DiffEntry>,
    pub changed: Vec<DiffEntry>,
}

impl ProposalDiff {
    pub fn between(from: &ProposalVersion, to: &ProposalVersion) -> Self {
        let mut diff = Self {
            proposal_id: to.proposal_id.clone(),
            from_version: from.version,
            to_version: to.version,
            added: Vec::new(),
            removed: Vec::new(),
            changed: Vec::new(),
        };
        diff.walk("", &from.payload, &to.payload);
        diff
    }

    fn walk(&mut self, path: &str, from: &Value, to: &Value) {
        match (from, to) {
            (Value::Object(a), Value::Object(b)) => {
                for (key, left) in a {
                    let child = join_path(path, key);
                    match b.get(key) {
                        Some(right) => self.walk(&child, left, right),
                        None => self.removed.push(DiffEntry {
                            path: child,
                            from: Some(left.clone()),
                            to: None,
                        }),
                    }
                }
                for (key, right) in b {
                    if !a.contains_key(key) {
                        self.added.push(DiffEntry {
                            path: join_path(path, key),
                            from: None,
                            to: Some(right.clone()),
                        });
                    }
                }
            }
            (Value::Array(a), Value::Array(b)) => {
                for (i, left) in a.iter().enumerate() {
                    let child = join_path(path, &i.to_string());
                    match b.get(i) {
                        Some(right) => self.walk(&child, left, right),
                        None => self.removed.push(DiffEntry {
                            path: child,
                            from: Some(left.clone()),
                            to: None,
                        }),
                    }
                }
                for (i, right) in b.iter().enumerate().skip(a.len()) {
                    self.added.push(DiffEntry {
                        path: join_path(path, &i.to_string()),
                        from: None,
                        to: Some(right.clone()),
                    });
                }
            }
            _ if from != to => self.changed.push(DiffEntry {
                path: if path.is_empty() { "$".to_string() } else { path.to_string() },
                from: Some(from.clone()),
                to: Some(to.clone()),
            }),
            _ => {}
        }
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn version(n: i32, payload: Value) -> ProposalVersion {
        ProposalVersion {
            version_id: format!("ver_{n}"),
            proposal_id: "prop_x".to_string(),
            version: n,
            title: None,
            payload,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_diff_reports_dotted_paths() {
        let from = version(
            1,
            json!({"complexity": "M", "modules": ["dt_discovery"], "meta": {"owner": "a", "draft": true}}),
        );
        let to = version(
            2,
            json!({"complexity": "L", "modules": ["dt_discovery", "sa_audit"], "meta": {"owner": "a"}, "sites": 2}),
        );

        let diff = ProposalDiff::between(&from, &to);
        assert_eq!(diff.from_version, 1);
        assert_eq!(diff.to_version, 2);

        let added: Vec<&str> = diff.added.iter().map(|e| e.path.as_str()).collect();
        let removed: Vec<&str> = diff.removed.iter().map(|e| e.path.as_str()).collect();
        let changed: Vec<&str> = diff.changed.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(added, vec!["modules.1", "sites"]);
        assert_eq!(removed, vec!["meta.draft"]);
        assert_eq!(changed, vec!["complexity"]);
        assert_eq!(diff.changed[0].to, Some(json!("L")));
    }

    #[test]
    fn test_identical_payloads_have_empty_diff() {
        let payload = json!({"a": [1, 2, {"b": null}]});
        let diff = ProposalDiff::between(&version(1, payload.clone()), &version(2, payload));
        assert!(diff.added.is_empty() && diff.removed.is_empty() && diff.changed.is_empty());
    }

    #[test]
    fn test_type_change_is_a_change() {
        let diff = ProposalDiff::between(&version(1, json!({"a": 1})), &version(2, json!({"a": {"b": 1}})));
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].path, "a");
    }
}
