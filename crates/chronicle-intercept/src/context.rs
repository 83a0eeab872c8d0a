//! Call context and actor extraction.
//!
//! The interceptor is wired into an RPC server through this contract: the
//! server hands over the full method path and the incoming metadata
//! headers, and gets the same context back (with a request ID attached)
//! for the downstream handler.

/// Metadata header key the request ID is attached under.
pub const REQUEST_ID_KEY: &str = "request-id";

const USER_ID_KEY: &str = "user-id";
const USER_EMAIL_KEY: &str = "user-email";
const USER_ROLE_KEY: &str = "user-role";
const USER_AGENT_KEY: &str = "user-agent";
const FORWARDED_FOR_KEY: &str = "x-forwarded-for";

/// Incoming call metadata; keys are matched case-insensitively, as RPC
/// metadata headers are.
#[derive(Debug, Clone, Default)]
pub struct CallMetadata {
    entries: std::collections::HashMap<String, String>,
}

impl CallMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut metadata = Self::new();
        for (key, value) in pairs {
            metadata.insert(key.as_ref(), value.into());
        }
        metadata
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.entries.insert(key.to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    /// Header value or empty string.
    pub fn get_or_empty(&self, key: &str) -> String {
        self.get(key).unwrap_or_default().to_string()
    }
}

/// Per-call context threaded around the downstream handler.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Full method path, `/<package.Service>/<Method>`.
    pub full_method: String,

    pub metadata: CallMetadata,

    /// Request ID assigned by the interceptor; `None` for bypassed calls.
    pub request_id: Option<String>,
}

impl CallContext {
    pub fn new(full_method: impl Into<String>, metadata: CallMetadata) -> Self {
        Self {
            full_method: full_method.into(),
            metadata,
            request_id: None,
        }
    }

    /// Attach a request ID to the context and its metadata, so the
    /// downstream handler can correlate its own logs.
    pub(crate) fn attach_request_id(&mut self, request_id: &str) {
        self.request_id = Some(request_id.to_string());
        self.metadata.insert(REQUEST_ID_KEY, request_id);
    }

    pub fn user_agent(&self) -> String {
        self.metadata.get_or_empty(USER_AGENT_KEY)
    }
}

/// The actor behind a call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: String,
    pub email: String,
    pub role: String,
}

/// Pulls the actor identity out of call metadata. Servers with their own
/// auth layer inject a custom implementation.
pub trait UserExtractor: Send + Sync {
    fn extract_user(&self, metadata: &CallMetadata) -> UserIdentity;
}

/// Pulls the client address out of call metadata.
pub trait IpExtractor: Send + Sync {
    fn extract_ip(&self, metadata: &CallMetadata) -> String;
}

/// Default extractor reading the `user-id`, `user-email`, and `user-role`
/// headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderUserExtractor;

impl UserExtractor for HeaderUserExtractor {
    fn extract_user(&self, metadata: &CallMetadata) -> UserIdentity {
        UserIdentity {
            id: metadata.get_or_empty(USER_ID_KEY),
            email: metadata.get_or_empty(USER_EMAIL_KEY),
            role: metadata.get_or_empty(USER_ROLE_KEY),
        }
    }
}

/// Default extractor reading the `x-forwarded-for` header.
#[derive(Debug, Clone, Copy, Default)]
pub struct XForwardedForExtractor;

impl IpExtractor for XForwardedForExtractor {
    fn extract_ip(&self, metadata: &CallMetadata) -> String {
        metadata.get_or_empty(FORWARDED_FOR_KEY)
    }
}
