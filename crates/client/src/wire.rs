//! Tolerant decoding of backend response shapes.
//!
//! Different backend revisions wrap the same data differently: a job id
//! may be the whole body, a `content` string, or a `jobId` / `job_id` /
//! `id` field, possibly nested one level inside `content` or `data`.
//! Every such variation is resolved here, in a fixed priority order, so
//! callers only ever see the canonical types below.

use serde_json::Value;

use lumo_core::job::BackendStatus;
use lumo_core::problem::Problem;
use lumo_core::types::{JobId, Timestamp};

/// Keys that may hold a job id, in priority order.
const JOB_ID_KEYS: &[&str] = &["jobId", "job_id", "id"];

/// Wrapper objects that may hold the real payload, in priority order.
const WRAPPER_KEYS: &[&str] = &["content", "data"];

/// Keys that may hold a history list when the body is not a bare array.
const HISTORY_LIST_KEYS: &[&str] = &["items", "content", "data", "history", "jobs", "results"];

// ---------------------------------------------------------------------------
// Job id
// ---------------------------------------------------------------------------

/// Extract a job id from a creation response.
///
/// Tried in order:
/// 1. the body itself, when it is a string or number;
/// 2. `content`, when it is a string;
/// 3. `jobId`, `job_id`, `id` on the body;
/// 4. the same keys inside the `content` or `data` wrapper object.
///
/// Empty strings never count.
pub fn extract_job_id(body: &Value) -> Option<JobId> {
    if let Some(id) = scalar_id(body) {
        return Some(id);
    }

    let object = body.as_object()?;

    if let Some(id) = object.get("content").and_then(Value::as_str).and_then(non_empty) {
        return Some(id);
    }

    if let Some(id) = id_from_keys(body) {
        return Some(id);
    }

    WRAPPER_KEYS
        .iter()
        .filter_map(|key| object.get(*key))
        .find_map(id_from_keys)
}

fn id_from_keys(value: &Value) -> Option<JobId> {
    let object = value.as_object()?;
    JOB_ID_KEYS
        .iter()
        .filter_map(|key| object.get(*key))
        .find_map(scalar_id)
}

fn scalar_id(value: &Value) -> Option<JobId> {
    match value {
        Value::String(s) => non_empty(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Interpret a non-JSON creation body as a bare job id.
///
/// Only short, token-like bodies qualify; anything resembling an HTML or
/// prose error page is rejected.
pub fn bare_text_job_id(text: &str) -> Option<JobId> {
    let trimmed = text.trim().trim_matches('"');
    let token_like = !trimmed.is_empty()
        && trimmed.len() <= 128
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'));
    token_like.then(|| trimmed.to_string())
}

// ---------------------------------------------------------------------------
// Field lookup
// ---------------------------------------------------------------------------
//
// Backend revisions spell the same field differently and some send more
// than one spelling at once. Each field is read from its key list in
// priority order; the first usable value wins and the others are ignored.

const IMAGE_URL_KEYS: &[&str] = &["imageUrl", "image_url", "url", "videoUrl", "video_url"];
const IMAGE_URLS_KEYS: &[&str] = &["imageUrls", "image_urls", "urls", "outputs"];
const STATUS_ERROR_KEYS: &[&str] = &["error", "message", "errorMessage", "error_message"];

/// History records carry their own `id` first; `jobId` / `job_id` only
/// stand in when it is missing.
const HISTORY_ID_KEYS: &[&str] = &["id", "jobId", "job_id"];
const USER_ID_KEYS: &[&str] = &["userId", "user_id"];
const ASPECT_RATIO_KEYS: &[&str] = &["aspectRatio", "aspect_ratio"];
const CREATED_AT_KEYS: &[&str] = &["createdAt", "created_at"];
const UPDATED_AT_KEYS: &[&str] = &["updatedAt", "updated_at"];

const PROBLEM_CODE_KEYS: &[&str] = &["code", "errorCode", "error_code"];
const PROBLEM_MESSAGE_KEYS: &[&str] = &["message", "error", "title"];
const TRACE_ID_KEYS: &[&str] = &["traceId", "trace_id", "requestId", "request_id"];

/// First non-blank string under `keys`. Values of other types are skipped.
fn text_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find_map(|v| v.as_str().and_then(non_empty))
}

/// First non-empty URL list under `keys`.
fn url_list_field(value: &Value, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .map(url_list)
        .find(|urls| !urls.is_empty())
        .unwrap_or_default()
}

/// First string or numeric id under `keys`.
fn id_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find_map(scalar_id)
}

/// First parseable timestamp under `keys`.
fn timestamp_field(value: &Value, keys: &[&str]) -> Option<Timestamp> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find_map(timestamp)
}

/// Accept a single URL string, a list of strings, or a list of objects
/// carrying `url`.
fn url_list(value: &Value) -> Vec<String> {
    let urls: Vec<&str> = match value {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.as_str()),
                Value::Object(o) => o.get("url").and_then(Value::as_str),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    urls.into_iter()
        .filter(|u| !u.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// RFC 3339 strings or epoch milliseconds. Anything else is `None`
/// rather than a rejected record.
fn timestamp(value: &Value) -> Option<Timestamp> {
    match value {
        Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&chrono::Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Job status
// ---------------------------------------------------------------------------

/// Canonical job status as reported by `GET /jobs/{id}`.
///
/// URLs are exactly as the backend sent them; normalization happens in
/// the polling engine.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatusPayload {
    pub status: BackendStatus,
    pub image_url: Option<String>,
    pub image_urls: Vec<String>,
    pub error: Option<String>,
}

/// Decode a status body, unwrapping `content` / `data` when the root has
/// no `status`. Returns `None` for anything that is not a recognisable
/// status document.
pub fn decode_status(body: &Value) -> Option<JobStatusPayload> {
    let candidate = if body.get("status").is_some() {
        body
    } else {
        WRAPPER_KEYS
            .iter()
            .filter_map(|key| body.get(*key))
            .find(|inner| inner.get("status").is_some())?
    };

    let Some(raw) = candidate.get("status").and_then(Value::as_str) else {
        tracing::debug!("Status body did not match expected shape");
        return None;
    };
    let Some(status) = BackendStatus::parse(raw) else {
        tracing::warn!(status = %raw, "Unrecognised backend job status");
        return None;
    };

    Some(JobStatusPayload {
        status,
        image_url: text_field(candidate, IMAGE_URL_KEYS),
        image_urls: url_list_field(candidate, IMAGE_URLS_KEYS),
        error: text_field(candidate, STATUS_ERROR_KEYS),
    })
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// A persisted job record as returned by `GET /history`.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub id: JobId,
    pub prompt: Option<String>,
    pub user_id: Option<String>,
    pub status: Option<String>,
    pub image_url: Option<String>,
    pub image_urls: Vec<String>,
    pub aspect_ratio: Option<String>,
    pub model: Option<String>,
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
}

impl HistoryEntry {
    /// Read one history record. Only the id is required.
    pub fn from_value(item: &Value) -> Result<Self, String> {
        if !item.is_object() {
            return Err(format!("history entry is not an object: {item}"));
        }
        let id = id_field(item, HISTORY_ID_KEYS).ok_or("history entry has no id")?;

        Ok(Self {
            id,
            prompt: text_field(item, &["prompt"]),
            user_id: id_field(item, USER_ID_KEYS),
            status: text_field(item, &["status"]),
            image_url: text_field(item, IMAGE_URL_KEYS),
            image_urls: url_list_field(item, IMAGE_URLS_KEYS),
            aspect_ratio: text_field(item, ASPECT_RATIO_KEYS),
            model: text_field(item, &["model"]),
            created_at: timestamp_field(item, CREATED_AT_KEYS),
            updated_at: timestamp_field(item, UPDATED_AT_KEYS),
        })
    }

    /// Parsed backend status, if present and recognised.
    pub fn backend_status(&self) -> Option<BackendStatus> {
        self.status.as_deref().and_then(BackendStatus::parse)
    }
}

/// Decode a history body into entries, newest first.
///
/// Accepts a bare array or an array under one of `HISTORY_LIST_KEYS`.
/// Entries that do not decode are skipped with a warning rather than
/// failing the whole list.
pub fn decode_history(body: &Value) -> Result<Vec<HistoryEntry>, String> {
    let list = match body {
        Value::Array(items) => items,
        Value::Object(object) => HISTORY_LIST_KEYS
            .iter()
            .find_map(|key| object.get(*key).and_then(Value::as_array))
            .ok_or_else(|| "history body contains no list".to_string())?,
        _ => return Err("history body is neither a list nor an object".to_string()),
    };

    let mut entries: Vec<HistoryEntry> = list
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match HistoryEntry::from_value(item) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(index, error = %e, "Skipping malformed history entry");
                None
            }
        })
        .collect();

    // Stable sort keeps backend order for entries without timestamps.
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Credits
// ---------------------------------------------------------------------------

/// The user's current credit balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditBalance {
    pub credits: i64,
}

/// Decode a credits body: `credits`, `balance` or `remaining`, on the
/// root or inside a wrapper.
pub fn decode_credits(body: &Value) -> Option<CreditBalance> {
    const KEYS: &[&str] = &["credits", "balance", "remaining"];

    let read = |value: &Value| {
        KEYS.iter()
            .filter_map(|key| value.get(*key))
            .find_map(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
    };

    read(body)
        .or_else(|| WRAPPER_KEYS.iter().filter_map(|k| body.get(*k)).find_map(read))
        .or_else(|| body.as_i64())
        .map(|credits| CreditBalance { credits })
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// Read the new access token out of a refresh response.
pub fn decode_access_token(body: &Value) -> Option<String> {
    const KEYS: &[&str] = &["accessToken", "access_token", "token"];

    let read = |value: &Value| text_field(value, KEYS);

    read(body).or_else(|| WRAPPER_KEYS.iter().filter_map(|k| body.get(*k)).find_map(read))
}

// ---------------------------------------------------------------------------
// Problems
// ---------------------------------------------------------------------------

/// Decode a non-2xx body into a problem, falling back to a code derived
/// from the HTTP status when the body is not a problem document.
pub fn decode_problem(status: u16, body: &str) -> Problem {
    let parsed = serde_json::from_str::<Value>(body).ok().and_then(|value| {
        // `{"code": ...}`, then `{"error": {"code": ...}}`
        problem_from_value(&value).or_else(|| value.get("error").and_then(problem_from_value))
    });

    parsed.unwrap_or_else(|| {
        let snippet: String = body.trim().chars().take(200).collect();
        let problem = Problem::new(fallback_code(status));
        if snippet.is_empty() {
            problem
        } else {
            problem.with_message(snippet)
        }
    })
}

/// Read a problem document. `None` unless it carries a non-blank code.
fn problem_from_value(value: &Value) -> Option<Problem> {
    let code = text_field(value, PROBLEM_CODE_KEYS)?;
    Some(Problem {
        code,
        message: text_field(value, PROBLEM_MESSAGE_KEYS),
        detail: text_field(value, &["detail"]),
        meta: value.get("meta").filter(|meta| !meta.is_null()).cloned(),
        trace_id: text_field(value, TRACE_ID_KEYS),
    })
}

/// Problem code implied by an HTTP status when the body carries none.
pub fn fallback_code(status: u16) -> String {
    match status {
        400 | 422 => "VALIDATION_ERROR".to_string(),
        401 => "UNAUTHORIZED".to_string(),
        402 => "INSUFFICIENT_CREDITS".to_string(),
        403 => "FORBIDDEN".to_string(),
        429 => "RATE_LIMITED".to_string(),
        502..=504 => "UPSTREAM_ERROR".to_string(),
        other => format!("HTTP_{other}"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
