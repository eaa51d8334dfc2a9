//! Access control lists.

use std::fmt;

use serde::{Deserialize, Serialize};

/// URI of the predefined group covering everyone, including anonymous users.
pub const ALL_USERS_GROUP: &str = "http://acs.amazonaws.com/groups/global/AllUsers";

/// URI of the predefined group covering any authenticated AWS account.
pub const AUTHENTICATED_USERS_GROUP: &str =
    "http://acs.amazonaws.com/groups/global/AuthenticatedUsers";

/// URI of the predefined server access log delivery group.
pub const LOG_DELIVERY_GROUP: &str = "http://acs.amazonaws.com/groups/s3/LogDelivery";

/// The owner of an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    /// The canonical user ID of the owner.
    pub id: String,
    /// The display name of the owner, if reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// An object ACL: an optional owner and its grants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessControlList {
    /// The object owner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<Owner>,
    /// Grants in the order the backend reported them.
    #[serde(default)]
    pub grants: Vec<Grant>,
}

impl AccessControlList {
    /// Whether the ACL carries no grants.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

/// An ACL grant that pairs a grantee with a permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    /// The entity receiving the permission.
    pub grantee: Grantee,
    /// The permission granted.
    pub permission: Permission,
}

impl Grant {
    /// Create a grant.
    #[must_use]
    pub fn new(grantee: Grantee, permission: Permission) -> Self {
        Self {
            grantee,
            permission,
        }
    }
}

/// A grantee in an ACL grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum Grantee {
    /// A canonical user identified by an account-scoped ID.
    CanonicalUser {
        /// The canonical user ID.
        id: String,
    },
    /// A predefined group identified by URI.
    Group {
        /// The group URI.
        uri: String,
    },
    /// A grantee identified by email address.
    Email {
        /// The email address.
        email: String,
    },
}

impl Grantee {
    /// Create a group grantee.
    #[must_use]
    pub fn group(uri: impl Into<String>) -> Self {
        Self::Group { uri: uri.into() }
    }

    /// Create a canonical user grantee.
    #[must_use]
    pub fn canonical_user(id: impl Into<String>) -> Self {
        Self::CanonicalUser { id: id.into() }
    }

    /// Header value form used by `x-amz-grant-*` headers.
    #[must_use]
    pub fn header_value(&self) -> String {
        match self {
            Self::CanonicalUser { id } => format!("id=\"{id}\""),
            Self::Group { uri } => format!("uri=\"{uri}\""),
            Self::Email { email } => format!("emailAddress=\"{email}\""),
        }
    }
}

/// A permission that can be granted to a grantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    /// READ, WRITE, READ_ACP and WRITE_ACP.
    FullControl,
    /// Read the object data.
    Read,
    /// Write (bucket-level only, ignored on objects).
    Write,
    /// Read the object ACL.
    ReadAcp,
    /// Write the object ACL.
    WriteAcp,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FullControl => "FULL_CONTROL",
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::ReadAcp => "READ_ACP",
            Self::WriteAcp => "WRITE_ACP",
        };
        f.write_str(s)
    }
}
