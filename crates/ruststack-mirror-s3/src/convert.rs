//! Conversions between SDK types and mirror model types.

use std::collections::HashMap;

use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::get_object_acl::GetObjectAclOutput;
use aws_sdk_s3::operation::head_object::HeadObjectOutput;
use aws_sdk_s3::types::{
    Grant as S3Grant, ObjectVersion, Permission as S3Permission, Type as GranteeType,
};
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use ruststack_mirror_core::StorageError;
use ruststack_mirror_model::{
    AccessControlList, CopyRequest, Grant, Grantee, KeySummary, ObjectMetadata, Owner, Permission,
};

/// Characters left unescaped in a copy source: unreserved plus `/`.
const COPY_SOURCE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// HTTP status of a failed SDK call, when a response was received.
pub(crate) fn status_of<E>(err: &SdkError<E, HttpResponse>) -> Option<u16> {
    err.raw_response().map(|r| r.status().as_u16())
}

/// Convert an SDK failure into a [`StorageError`].
pub(crate) fn storage_error<E>(operation: &'static str, err: SdkError<E, HttpResponse>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = status_of(&err);
    let message = match err.as_service_error() {
        Some(service) => match (service.code(), service.message()) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (Some(code), None) => code.to_owned(),
            (None, Some(message)) => message.to_owned(),
            (None, None) => DisplayErrorContext(&err).to_string(),
        },
        None => DisplayErrorContext(&err).to_string(),
    };
    StorageError::Service {
        operation,
        status,
        message,
    }
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

pub(crate) fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

fn to_size(len: Option<i64>) -> u64 {
    len.and_then(|n| u64::try_from(n).ok()).unwrap_or_default()
}

/// Summary of the latest revision in a versions listing, or `None` for
/// older revisions and entries without a key.
pub(crate) fn summary_from_version(version: &ObjectVersion) -> Option<KeySummary> {
    if version.is_latest() != Some(true) {
        return None;
    }
    let mut summary = KeySummary::new(
        version.key()?,
        to_size(version.size()),
        version.e_tag().unwrap_or_default(),
    );
    summary.last_modified = version.last_modified().and_then(to_chrono);
    summary.version_id = version
        .version_id()
        .filter(|v| *v != "null")
        .map(ToOwned::to_owned);
    Some(summary)
}

pub(crate) fn metadata_from_head(head: &HeadObjectOutput) -> ObjectMetadata {
    ObjectMetadata {
        size: to_size(head.content_length()),
        etag: head.e_tag().map(ToOwned::to_owned),
        last_modified: head.last_modified().and_then(to_chrono),
        content_type: head.content_type().map(ToOwned::to_owned),
        content_encoding: head.content_encoding().map(ToOwned::to_owned),
        content_disposition: head.content_disposition().map(ToOwned::to_owned),
        cache_control: head.cache_control().map(ToOwned::to_owned),
        user_metadata: head.metadata().cloned().unwrap_or_default(),
    }
}

/// `x-amz-copy-source` value for a request, pinned to its version.
pub(crate) fn copy_source(request: &CopyRequest) -> String {
    let mut source = format!(
        "{}/{}",
        request.source_bucket,
        utf8_percent_encode(&request.source_key, COPY_SOURCE)
    );
    if let Some(version) = &request.source_version_id {
        source.push_str("?versionId=");
        source.extend(utf8_percent_encode(version, COPY_SOURCE));
    }
    source
}

pub(crate) fn user_metadata(metadata: &ObjectMetadata) -> Option<HashMap<String, String>> {
    (!metadata.user_metadata.is_empty()).then(|| metadata.user_metadata.clone())
}

// ---------------------------------------------------------------------------
// ACLs
// ---------------------------------------------------------------------------

/// `x-amz-grant-*` header values, comma-joined per permission.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct GrantHeaders {
    pub(crate) full_control: Option<String>,
    pub(crate) read: Option<String>,
    pub(crate) read_acp: Option<String>,
    pub(crate) write_acp: Option<String>,
}

impl GrantHeaders {
    pub(crate) fn from_acl(acl: &AccessControlList) -> Self {
        let mut full_control = Vec::new();
        let mut read = Vec::new();
        let mut read_acp = Vec::new();
        let mut write_acp = Vec::new();
        for grant in &acl.grants {
            let target = match grant.permission {
                Permission::FullControl => &mut full_control,
                Permission::Read => &mut read,
                Permission::ReadAcp => &mut read_acp,
                Permission::WriteAcp => &mut write_acp,
                // Not applicable to objects.
                Permission::Write => continue,
            };
            target.push(grant.grantee.header_value());
        }
        let join = |values: Vec<String>| (!values.is_empty()).then(|| values.join(", "));
        Self {
            full_control: join(full_control),
            read: join(read),
            read_acp: join(read_acp),
            write_acp: join(write_acp),
        }
    }
}

pub(crate) fn acl_from_output(output: &GetObjectAclOutput) -> AccessControlList {
    AccessControlList {
        owner: output.owner().and_then(|owner| {
            Some(Owner {
                id: owner.id()?.to_owned(),
                display_name: owner.display_name().map(ToOwned::to_owned),
            })
        }),
        grants: output.grants().iter().filter_map(grant_from_sdk).collect(),
    }
}

fn grant_from_sdk(grant: &S3Grant) -> Option<Grant> {
    let grantee = grant.grantee()?;
    let grantee = match grantee.r#type() {
        GranteeType::CanonicalUser => Grantee::canonical_user(grantee.id()?),
        GranteeType::Group => Grantee::group(grantee.uri()?),
        GranteeType::AmazonCustomerByEmail => Grantee::Email {
            email: grantee.email_address()?.to_owned(),
        },
        _ => return None,
    };
    let permission = match grant.permission()? {
        S3Permission::FullControl => Permission::FullControl,
        S3Permission::Read => Permission::Read,
        S3Permission::ReadAcp => Permission::ReadAcp,
        S3Permission::Write => Permission::Write,
        S3Permission::WriteAcp => Permission::WriteAcp,
        _ => return None,
    };
    Some(Grant::new(grantee, permission))
}
