//! Credential handler adapters
//!
//! Two grant strategies cover the provider catalog: the OAuth2
//! authorization-code dance ([`oauth2::OAuth2Handler`]) and the
//! bearer-token paste flow ([`token::StaticTokenHandler`]). Both are
//! parameterized by a [`provider::ProviderDescriptor`] loaded from
//! configuration — adding a provider is data, not code.

pub mod oauth2;
pub mod provider;
pub mod token;

pub use oauth2::OAuth2Handler;
pub use provider::ProviderDescriptor;
pub use token::StaticTokenHandler;
