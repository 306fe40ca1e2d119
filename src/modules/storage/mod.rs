//! Storage module for relayed files
//!
//! Provides the S3-compatible storage client used for uploads, deletions,
//! and presigned URL generation.

mod s3_client;

pub use s3_client::{ObjectStorage, S3Client};
