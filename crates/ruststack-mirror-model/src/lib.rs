//! Data types shared by the RustStack Mirror engine and its storage backends.
//!
//! Everything here is plain data: listing pages and key summaries produced by
//! a backend, object metadata returned by a probe, ACLs, and the requests the
//! engine issues for single-shot and multipart copies. Behavior (comparison,
//! retries, bookkeeping) lives in `ruststack-mirror-core`.

pub mod acl;
pub mod listing;
pub mod object;
pub mod request;

pub use acl::{AccessControlList, Grant, Grantee, Owner, Permission};
pub use listing::{ListCursor, ListPage};
pub use object::{DestinationMetadata, Fingerprint, KeySummary, ObjectMetadata, normalize_etag};
pub use request::{ByteRange, CompletedPart, CopyRequest};
