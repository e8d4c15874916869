//! Credential domain model
//!
//! [`GrantKind`](grant::GrantKind) classifies how a provider issues
//! credentials; [`CredentialRequest`](value_objects::CredentialRequest) and
//! [`CredentialContext`](value_objects::CredentialContext) are the immutable
//! value objects flowing through a grant.

pub mod grant;
pub mod value_objects;
