//! S3 client module with AWS SigV4 signing
//!
//! This module provides:
//! - AWS Signature Version 4 request authentication
//! - Bucket and object operations over a `Transport`
//! - The status mapping that makes bucket create/delete idempotent

pub mod client;
pub mod outcome;
pub mod signer;
pub mod types;

// Re-export main types for convenience
pub use client::{Result, S3Client, S3Error, DEFAULT_CONTENT_TYPE};
pub use outcome::{Operation, Outcome};
pub use signer::{AuthError, Authentication};
pub use types::{DirectoryEntries, ObjectOutput, ObjectRegistry};
