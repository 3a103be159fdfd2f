//! Problem-to-UI mapping.
//!
//! The backend reports user-actionable failures as problem documents
//! with a machine-readable `code`. [`map_problem_to_ui`] decides how each
//! one is surfaced: a transient toast, a blocking modal, or a redirect.

use serde::{Deserialize, Serialize};

/// Where the pricing page lives, for credit and plan related CTAs.
pub const PRICING_PATH: &str = "/pricing";

/// Where the login page lives, for auth related redirects.
pub const LOGIN_PATH: &str = "/login";

/// A structured error returned by the backend (or synthesized by the client).
///
/// The serde form is the canonical camelCase document. Backend spellings
/// such as `error_code` or `trace_id` are resolved by the client before a
/// `Problem` is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    /// Code-specific extras, e.g. `{"current": 2, "needed": 5}`.
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
    #[serde(default)]
    pub trace_id: Option<String>,
}

impl Problem {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Default::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Read an integer field out of `meta`, accepting numeric strings.
    fn meta_u64(&self, key: &str) -> Option<u64> {
        let value = self.meta.as_ref()?.get(key)?;
        value
            .as_u64()
            .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
    }

    /// Server-supplied explanation, preferring `detail` over `message`.
    fn server_text(&self) -> Option<&str> {
        self.detail
            .as_deref()
            .or(self.message.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Known problem codes, grouped by how they are surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemCode {
    InsufficientCredits,
    ForbiddenFeature,
    InvalidToken,
    Validation,
    RateLimited,
    Upstream,
    Unknown,
}

impl ProblemCode {
    pub fn classify(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "INSUFFICIENT_CREDITS" | "NOT_ENOUGH_CREDITS" => Self::InsufficientCredits,
            "FEATURE_FORBIDDEN" | "FORBIDDEN_FEATURE" | "FORBIDDEN" | "PLAN_REQUIRED" => {
                Self::ForbiddenFeature
            }
            "INVALID_TOKEN" | "TOKEN_EXPIRED" | "EXPIRED_TOKEN" | "UNAUTHORIZED" => {
                Self::InvalidToken
            }
            "VALIDATION_ERROR" | "VALIDATION_FAILED" | "BAD_REQUEST" => Self::Validation,
            "RATE_LIMITED" | "TOO_MANY_REQUESTS" => Self::RateLimited,
            "UPSTREAM_ERROR" | "PROVIDER_ERROR" | "UPSTREAM_TIMEOUT" | "PROVIDER_UNAVAILABLE" => {
                Self::Upstream
            }
            _ => Self::Unknown,
        }
    }
}

/// How a problem is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UiActionKind {
    Toast,
    Modal,
    Redirect,
}

/// A call to action attached to a modal or redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cta {
    pub label: String,
    pub href: String,
}

impl Cta {
    fn new(label: &str, href: &str) -> Self {
        Self {
            label: label.to_string(),
            href: href.to_string(),
        }
    }
}

/// The UI decision for a problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UiAction {
    pub kind: UiActionKind,
    pub message: String,
    pub cta: Option<Cta>,
}

impl UiAction {
    fn toast(message: impl Into<String>) -> Self {
        Self {
            kind: UiActionKind::Toast,
            message: message.into(),
            cta: None,
        }
    }
}

/// Map a problem to the way it should be shown to the user.
///
/// Total over every code; unrecognised codes fall through to a generic
/// toast that carries the trace id when one is present.
pub fn map_problem_to_ui(problem: &Problem) -> UiAction {
    match ProblemCode::classify(&problem.code) {
        ProblemCode::InsufficientCredits => {
            let message = match (problem.meta_u64("current"), problem.meta_u64("needed")) {
                (Some(current), Some(needed)) => format!(
                    "Not enough credits: this generation needs {needed} and you have {current}."
                ),
                (None, Some(needed)) => {
                    format!("Not enough credits: this generation needs {needed}.")
                }
                _ => "You don't have enough credits for this generation.".to_string(),
            };
            UiAction {
                kind: UiActionKind::Modal,
                message,
                cta: Some(Cta::new("Get more credits", PRICING_PATH)),
            }
        }
        ProblemCode::ForbiddenFeature => UiAction {
            kind: UiActionKind::Modal,
            message: problem
                .server_text()
                .unwrap_or("This feature is not included in your current plan.")
                .to_string(),
            cta: Some(Cta::new("Upgrade plan", PRICING_PATH)),
        },
        ProblemCode::InvalidToken => UiAction {
            kind: UiActionKind::Redirect,
            message: "Your session has expired. Please sign in again.".to_string(),
            cta: Some(Cta::new("Sign in", LOGIN_PATH)),
        },
        ProblemCode::Validation => UiAction::toast(
            problem
                .server_text()
                .unwrap_or("Some of the generation settings are invalid."),
        ),
        ProblemCode::RateLimited => {
            UiAction::toast("You're sending requests too quickly. Please wait a moment.")
        }
        ProblemCode::Upstream => UiAction::toast(
            "The generation provider is having trouble right now. Please try again shortly.",
        ),
        ProblemCode::Unknown => {
            let base = "Something went wrong. Please try again.";
            match problem.trace_id.as_deref().filter(|t| !t.is_empty()) {
                Some(trace) => UiAction::toast(format!("{base} (trace: {trace})")),
                None => UiAction::toast(base),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_credits_is_modal_with_amounts() {
        let problem = Problem::new("INSUFFICIENT_CREDITS")
            .with_meta(serde_json::json!({"current": 2, "needed": 5}));
        let action = map_problem_to_ui(&problem);

        assert_eq!(action.kind, UiActionKind::Modal);
        assert!(action.message.contains('2'));
        assert!(action.message.contains('5'));
        assert_eq!(action.cta.unwrap().href, PRICING_PATH);
    }

    #[test]
    fn insufficient_credits_accepts_string_amounts() {
        let problem = Problem::new("insufficient_credits")
            .with_meta(serde_json::json!({"current": "1", "needed": "3"}));
        let action = map_problem_to_ui(&problem);
        assert!(action.message.contains('1'));
        assert!(action.message.contains('3'));
    }

    #[test]
    fn insufficient_credits_without_meta_still_modal() {
        let action = map_problem_to_ui(&Problem::new("INSUFFICIENT_CREDITS"));
        assert_eq!(action.kind, UiActionKind::Modal);
        assert!(action.cta.is_some());
    }

    #[test]
    fn forbidden_feature_is_modal() {
        let action = map_problem_to_ui(
            &Problem::new("FEATURE_FORBIDDEN").with_message("Video requires Pro"),
        );
        assert_eq!(action.kind, UiActionKind::Modal);
        assert_eq!(action.message, "Video requires Pro");
    }

    #[test]
    fn auth_failures_redirect_to_login() {
        for code in ["INVALID_TOKEN", "TOKEN_EXPIRED", "UNAUTHORIZED"] {
            let action = map_problem_to_ui(&Problem::new(code));
            assert_eq!(action.kind, UiActionKind::Redirect, "{code}");
            assert_eq!(action.cta.as_ref().unwrap().href, LOGIN_PATH);
        }
    }

    #[test]
    fn validation_rate_limit_and_upstream_are_toasts() {
        for code in ["VALIDATION_ERROR", "RATE_LIMITED", "UPSTREAM_ERROR", "PROVIDER_ERROR"] {
            let action = map_problem_to_ui(&Problem::new(code));
            assert_eq!(action.kind, UiActionKind::Toast, "{code}");
            assert!(action.cta.is_none());
        }
    }

    #[test]
    fn validation_uses_server_detail() {
        let mut problem = Problem::new("VALIDATION_FAILED").with_message("generic");
        problem.detail = Some("prompt: too long".into());
        assert_eq!(map_problem_to_ui(&problem).message, "prompt: too long");
    }

    #[test]
    fn unknown_code_includes_trace_id() {
        let action = map_problem_to_ui(&Problem::new("KABOOM").with_trace_id("abc-123"));
        assert_eq!(action.kind, UiActionKind::Toast);
        assert!(action.message.contains("abc-123"));
    }

    #[test]
    fn unknown_code_without_trace_is_generic() {
        let action = map_problem_to_ui(&Problem::new(""));
        assert_eq!(action.kind, UiActionKind::Toast);
        assert!(!action.message.contains("trace"));
    }

    #[test]
    fn problem_round_trips_camel_case() {
        let problem: Problem = serde_json::from_str(
            r#"{"code":"RATE_LIMITED","message":"slow down","traceId":"t-1"}"#,
        )
        .unwrap();
        assert_eq!(problem.code, "RATE_LIMITED");
        assert_eq!(problem.message.as_deref(), Some("slow down"));
        assert_eq!(problem.trace_id.as_deref(), Some("t-1"));
    }
}
