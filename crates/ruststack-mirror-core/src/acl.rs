//! ACL handling for cross-account copies.

use ruststack_mirror_model::acl::{ALL_USERS_GROUP, AUTHENTICATED_USERS_GROUP};
use ruststack_mirror_model::{AccessControlList, Grant, Grantee};

/// Rewrite a source ACL so it can be applied in another account.
///
/// Canonical-user and email grantees belong to the source account and are
/// dropped, along with the owner. Grants to the public groups carry over.
#[must_use]
pub fn cross_account_acl(source: &AccessControlList) -> AccessControlList {
    AccessControlList {
        owner: None,
        grants: source
            .grants
            .iter()
            .filter(|grant| is_portable(grant))
            .cloned()
            .collect(),
    }
}

fn is_portable(grant: &Grant) -> bool {
    matches!(
        &grant.grantee,
        Grantee::Group { uri } if uri == ALL_USERS_GROUP || uri == AUTHENTICATED_USERS_GROUP
    )
}
