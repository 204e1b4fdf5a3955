//! JSON shapes spoken by the project REST API.

use crate::document::{DocumentKind, DocumentRef, RemoteDocument, Timestamp};
use crate::error::{SyncError, SyncResult};
use crate::shapes::AssetId;
use serde::Deserialize;
use serde_json::{Value, json};

/// Responses arrive either wrapped as `{ status, message: {...} }` or bare.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Wrapped {
        message: T,
        #[allow(dead_code)]
        #[serde(default)]
        status: Option<Value>,
    },
    Bare(T),
}

impl<T> Envelope<T> {
    fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { message, .. } | Envelope::Bare(message) => message,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DocumentBody {
    /// Required so that an error envelope is not mistaken for an empty document.
    content: Value,
    #[serde(rename = "lastEditTime", default)]
    last_edit_time: Value,
}

#[derive(Debug, Deserialize)]
struct LastUpdateBody {
    last_update: Value,
}

#[derive(Debug, Deserialize)]
struct UploadBody {
    id: AssetId,
}

/// Path segment of each document kind.
pub(crate) fn collection(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Page => "pages",
        DocumentKind::Translation => "translations",
        DocumentKind::Canvas => "canvas",
    }
}

pub(crate) fn fetch_path(document: DocumentRef) -> String {
    format!("/api/{}/get?id={}", collection(document.kind), document.id)
}

pub(crate) fn last_update_path(document: DocumentRef) -> String {
    format!("/api/{}/last_update?id={}", collection(document.kind), document.id)
}

/// HTTP method used to persist a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PersistMethod {
    Put,
    Patch,
}

/// Method, path and JSON body for persisting `content`.
pub(crate) fn persist_request(
    document: DocumentRef,
    content: &str,
) -> (PersistMethod, &'static str, Value) {
    let id = document.id.0;
    match document.kind {
        DocumentKind::Page => (
            PersistMethod::Put,
            "/api/pages/content",
            json!({ "page_id": id, "content": content }),
        ),
        DocumentKind::Translation => (
            PersistMethod::Patch,
            "/api/translations/update",
            json!({ "translation_id": id, "new_content": content }),
        ),
        DocumentKind::Canvas => (
            PersistMethod::Put,
            "/api/canvas/content",
            json!({ "canvas_id": id, "new_content": content }),
        ),
    }
}

/// Parse a document response.
pub(crate) fn parse_document(body: &str) -> SyncResult<RemoteDocument> {
    let envelope: Envelope<DocumentBody> = serde_json::from_str(body)?;
    let doc = envelope.into_inner();

    let content = match doc.content {
        Value::Null => String::new(),
        Value::String(text) => text,
        // Some servers store canvas content as a JSON object rather than a string.
        other => serde_json::to_string(&other)?,
    };
    let last_edit_time = match parse_timestamp(&doc.last_edit_time) {
        Ok(ts) => ts,
        Err(err) => {
            log::debug!("Ignoring unreadable lastEditTime: {err}");
            None
        }
    };

    Ok(RemoteDocument {
        content,
        last_edit_time,
    })
}

/// Parse a `last_update` response.
pub(crate) fn parse_last_update(body: &str) -> SyncResult<Option<Timestamp>> {
    let envelope: Envelope<LastUpdateBody> = serde_json::from_str(body)?;
    parse_timestamp(&envelope.into_inner().last_update)
}

/// Parse an upload response.
pub(crate) fn parse_upload(body: &str) -> SyncResult<AssetId> {
    let envelope: Envelope<UploadBody> = serde_json::from_str(body)?;
    Ok(envelope.into_inner().id)
}

/// A unix-seconds timestamp written as a number, a numeric string, `null` or `"Null"`.
pub(crate) fn parse_timestamp(value: &Value) -> SyncResult<Option<Timestamp>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(|secs| Some(Timestamp::from_secs(secs)))
            .ok_or_else(|| SyncError::SerializationFailure(format!("bad timestamp {n}"))),
        Value::String(s) if s.trim().is_empty() || s.eq_ignore_ascii_case("null") => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(|secs| Some(Timestamp::from_secs(secs)))
            .map_err(|_| SyncError::SerializationFailure(format!("bad timestamp {s:?}"))),
        other => Err(SyncError::SerializationFailure(format!(
            "bad timestamp {other}"
        ))),
    }
}
