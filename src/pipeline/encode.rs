//! Payload encoding: page bytes → base64 for the multimodal request body.
//!
//! The Gemini `inline_data` part and edgequake-llm's `ImageData` both carry
//! standard (padded) base64. Pages are sent in their original encoding: a
//! single-page PDF stays a PDF, a JPEG stays a JPEG. No rasterisation happens
//! here, the model reads the document directly.

use crate::document::PageUnit;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// Base64 text plus the MIME type declared to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    pub data: String,
    pub mime_type: &'static str,
}

/// Encode a page unit for submission.
pub fn encode_payload(unit: &PageUnit) -> EncodedPayload {
    let data = STANDARD.encode(&unit.bytes);
    debug!("Encoded {} → {} bytes base64", unit.label(), data.len());
    EncodedPayload {
        data,
        mime_type: unit.media_type.mime_type(),
    }
}
