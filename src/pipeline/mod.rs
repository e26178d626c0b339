//! Pipeline stages for document-to-CSV extraction.
//!
//! Each submodule implements exactly one transformation step and is tested
//! on its own; [`crate::batch`] strings them together.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ split ──▶ encode ──▶ extract ──▶ sanitize ──▶ naming
//! (dir/Drive) (pdfium) (base64)  (model)     (fences)     (skip/write)
//! ```
//!
//! 1. [`input`]:    enumerate local files or download a Drive folder
//! 2. [`split`]:    one standalone single-page PDF per page; JPEGs pass
//!    through. Runs in `spawn_blocking`
//! 3. [`encode`]:   base64 payload plus declared MIME type
//! 4. [`extract`]:  the model call with rate-limit retry; the only stage
//!    with network I/O to the model
//! 5. [`sanitize`]: strip code fences, read the metadata line
//! 6. [`naming`]:   output names and the skip checks that make re-runs
//!    idempotent

pub mod encode;
pub mod extract;
pub mod input;
pub mod naming;
pub mod sanitize;
pub mod split;
