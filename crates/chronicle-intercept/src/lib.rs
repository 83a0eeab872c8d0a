//! # chronicle-intercept
//!
//! The wire-facing layer of the Chronicle audit pipeline.
//!
//! [`AuditInterceptor`] wraps a unary RPC handler. For every call whose
//! domain and inferred operation match a configured rule it synthesizes a
//! redacted [`chronicle_core::ChangeEvent`] from the request/response pair
//! and hands it to the bulk pipeline with a non-blocking enqueue. The
//! response returned to the caller is never altered, and no audit failure
//! ever reaches it.
//!
//! ## Usage
//!
//! ```no_run
//! use chronicle_intercept::{AuditPipeline, CallContext, CallMetadata};
//!
//! # async fn serve() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = AuditPipeline::init("config/audit.yaml").await?;
//! let interceptor = pipeline.interceptor();
//!
//! // Inside the RPC server's unary dispatch:
//! let ctx = CallContext::new(
//!     "/appointment.AppointmentService/AddAppointment",
//!     CallMetadata::from_pairs([("user-id", "u1")]),
//! );
//! let request = serde_json::json!({"id": "APT-1"});
//! let response: Result<serde_json::Value, std::io::Error> = interceptor
//!     .call(ctx, request, |_ctx, req| async move { Ok(req) })
//!     .await;
//! # let _ = response;
//! pipeline.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod interceptor;
pub mod payload;
pub mod setup;

pub use context::{
    CallContext, CallMetadata, HeaderUserExtractor, IpExtractor, UserExtractor, UserIdentity,
    XForwardedForExtractor,
};
pub use interceptor::AuditInterceptor;
pub use setup::{AuditPipeline, SetupError};
