//! The unary audit interceptor.

use crate::context::{CallContext, HeaderUserExtractor, IpExtractor, UserExtractor, XForwardedForExtractor};
use crate::payload;
use chronicle_core::{
    capitalize, ChangeEvent, ChronicleConfig, Document, EffectiveRule, Operation,
};
use chronicle_redact::{DiffCalculator, Sanitizer};
use chronicle_store::BulkIndexer;
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Wraps unary RPC handlers and emits one audit event per matching call.
///
/// The interceptor never alters the handler's response, never blocks the
/// RPC path on audit I/O, and never surfaces an audit failure to the
/// caller. Handler errors pass through unchanged with no event emitted.
pub struct AuditInterceptor {
    config: Arc<ChronicleConfig>,
    indexer: Arc<BulkIndexer>,
    sanitizer: Sanitizer,
    user_extractor: Box<dyn UserExtractor>,
    ip_extractor: Box<dyn IpExtractor>,
}

impl AuditInterceptor {
    /// Create an interceptor with the default header-based extractors.
    pub fn new(config: Arc<ChronicleConfig>, indexer: Arc<BulkIndexer>) -> Self {
        Self::with_extractors(
            config,
            indexer,
            Box::new(HeaderUserExtractor),
            Box::new(XForwardedForExtractor),
        )
    }

    /// Create an interceptor with custom actor/address extraction, for
    /// servers that carry identity in their own auth layer.
    pub fn with_extractors(
        config: Arc<ChronicleConfig>,
        indexer: Arc<BulkIndexer>,
        user_extractor: Box<dyn UserExtractor>,
        ip_extractor: Box<dyn IpExtractor>,
    ) -> Self {
        Self {
            config,
            indexer,
            sanitizer: Sanitizer::new(),
            user_extractor,
            ip_extractor,
        }
    }

    /// Run one unary call through the interceptor.
    ///
    /// Calls whose domain, rule, or inferred operation do not match the
    /// configuration are passed straight through.
    pub async fn call<Req, Resp, Err, H, Fut>(
        &self,
        ctx: CallContext,
        req: Req,
        handler: H,
    ) -> Result<Resp, Err>
    where
        Req: Serialize,
        Resp: Serialize,
        H: FnOnce(CallContext, Req) -> Fut,
        Fut: Future<Output = Result<Resp, Err>>,
    {
        let Some((domain, method_name)) = split_method(&ctx.full_method) else {
            return handler(ctx, req).await;
        };
        let Some(rule) = self.config.resolve(&domain, &method_name) else {
            return handler(ctx, req).await;
        };
        let rule = self.config.effective_rule(rule);

        let mut ctx = ctx;
        let request_id = Uuid::new_v4().to_string();
        ctx.attach_request_id(&request_id);

        let user = self.user_extractor.extract_user(&ctx.metadata);
        let ip_address = self.ip_extractor.extract_ip(&ctx.metadata);
        let user_agent = ctx.user_agent();

        // The request snapshot is taken regardless of capture settings:
        // primary-key extraction needs it.
        let req_doc = payload::to_document(&req);

        let started = Instant::now();
        let resp = handler(ctx.clone(), req).await?;
        let duration = started.elapsed();

        let resp_doc = payload::to_document(&resp);
        let operation = Operation::infer(&method_name);

        // Merge request and response for key extraction; response wins.
        let merged = payload::merge(req_doc.as_ref(), resp_doc.as_ref());
        let Some(primary_key) = rule.primary_key.resolve(&merged) else {
            // No key, no event; the call itself is unaffected.
            return Ok(resp);
        };

        let (before, after) = split_images(operation, req_doc, resp_doc, &rule);

        let diff_calc = DiffCalculator::new(rule.excluded.clone(), rule.sensitive.clone());
        let changes = diff_calc.calculate(before.as_ref(), after.as_ref());
        let changes = self.sanitizer.sanitize_diffs(changes, &rule.sensitive);

        let before = before.map(|d| self.sanitizer.sanitize_document(&d, &rule.excluded, &rule.sensitive));
        let after = after.map(|d| self.sanitizer.sanitize_document(&d, &rule.excluded, &rule.sensitive));

        let metadata = self.bounded_metadata(&method_name, duration.as_millis() as u64, &rule);

        let event = ChangeEvent::builder(&domain, capitalize(&domain), operation, primary_key)
            .change_data(before)
            .after_data(after)
            .changes(changes)
            .changed_by(user.id, user.email)
            .request_id(request_id)
            .ip_address(ip_address)
            .user_agent(user_agent)
            .metadata(metadata)
            .build();

        // Non-blocking handoff; a full queue drops the event, the caller
        // never notices.
        if let Err(err) = self.indexer.enqueue(event) {
            tracing::warn!(
                method = %ctx.full_method,
                error = %err,
                "audit event dropped"
            );
        }

        Ok(resp)
    }

    /// Build the event metadata, keeping it under the configured byte cap.
    /// Custom per-entity entries are dropped first when the cap is hit.
    fn bounded_metadata(&self, method_name: &str, duration_ms: u64, rule: &EffectiveRule) -> Document {
        let mut metadata = Document::new();
        metadata.insert("method".to_string(), json!(method_name));
        metadata.insert("duration_ms".to_string(), json!(duration_ms));
        for (key, value) in &rule.metadata {
            metadata.insert(key.clone(), json!(value));
        }

        let max = self.config.global.max_metadata_size;
        if serialized_len(&metadata) > max && !rule.metadata.is_empty() {
            tracing::warn!(
                domain = %rule.domain,
                limit = max,
                "event metadata over size limit; custom entries dropped"
            );
            metadata.retain(|key, _| key == "method" || key == "duration_ms");
        }

        metadata
    }
}

fn serialized_len(doc: &Document) -> usize {
    serde_json::to_string(doc).map(|s| s.len()).unwrap_or(usize::MAX)
}

/// Split a full method path `/<package.Service>/<Method>` into the
/// lowercase domain (first dotted segment of the package) and the method
/// name. Paths that do not match the shape bypass auditing.
fn split_method(full_method: &str) -> Option<(String, String)> {
    let mut parts = full_method.split('/');
    let leading = parts.next()?;
    if !leading.is_empty() {
        return None;
    }
    let service = parts.next()?;
    let method = parts.next()?;
    if service.is_empty() || method.is_empty() {
        return None;
    }

    let domain = service.split('.').next()?.to_ascii_lowercase();
    if domain.is_empty() {
        return None;
    }
    Some((domain, method.to_string()))
}

/// Assign the captured snapshots to before/after images by operation.
fn split_images(
    operation: Operation,
    req_doc: Option<Document>,
    resp_doc: Option<Document>,
    rule: &EffectiveRule,
) -> (Option<Document>, Option<Document>) {
    let (before, after) = match operation {
        Operation::Create => (None, resp_doc),
        Operation::Delete => (req_doc, None),
        Operation::Patch | Operation::Reschedule => {
            (req_doc.map(|d| payload::normalize_patch(&d)), resp_doc)
        }
        _ => (req_doc, resp_doc),
    };

    (
        before.filter(|_| rule.include_before_data),
        after.filter(|_| rule.include_after_data),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_well_formed_method_paths() {
        let (domain, method) = split_method("/appointment.AppointmentService/AddAppointment").unwrap();
        assert_eq!(domain, "appointment");
        assert_eq!(method, "AddAppointment");

        let (domain, method) = split_method("/Patient/DeletePatient").unwrap();
        assert_eq!(domain, "patient");
        assert_eq!(method, "DeletePatient");
    }

    #[test]
    fn rejects_malformed_method_paths() {
        assert!(split_method("").is_none());
        assert!(split_method("no-leading-slash/Method").is_none());
        assert!(split_method("/onlyservice").is_none());
        assert!(split_method("//Method").is_none());
        assert!(split_method("/service.S/").is_none());
    }
}
