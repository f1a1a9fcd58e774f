//! Status code mapping for storage operations
//!
//! Every facade call classifies the final HTTP status through
//! `Operation::classify`, so the idempotency rules live in one table:
//!
//! | Operation                      | Status  | Outcome         |
//! |--------------------------------|---------|-----------------|
//! | bucket/object existence probe  | 2xx/3xx | `Completed`     |
//! | any other operation            | 2xx     | `Completed`     |
//! | existence probe, delete        | 404     | `NotFound`      |
//! | create bucket                  | 409     | `AlreadyExists` |
//! | anything else                  | other   | `Failed`        |

use hyper::StatusCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    BucketExists,
    ObjectExists,
    CreateBucket,
    PutObject,
    GetObject,
    DeleteBucket,
    DeleteObject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Completed,
    NotFound,
    AlreadyExists,
    Failed,
}

impl Operation {
    pub fn classify(self, status: StatusCode) -> Outcome {
        use Operation::*;

        match (self, status.as_u16()) {
            (BucketExists | ObjectExists, 200..=399) => Outcome::Completed,
            (_, 200..=299) => Outcome::Completed,
            (BucketExists | ObjectExists | DeleteBucket | DeleteObject, 404) => Outcome::NotFound,
            (CreateBucket, 409) => Outcome::AlreadyExists,
            _ => Outcome::Failed,
        }
    }
}
