//! s3lite - S3-compatible object storage client with AWS SigV4 signing

pub mod cli;
pub mod config;
pub mod s3;
pub mod transport;

pub use config::{Config, Profile};
pub use s3::{Authentication, S3Client, S3Error};
pub use transport::{Connection, Response, Transport};
