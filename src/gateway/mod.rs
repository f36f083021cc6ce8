//! XML gateway transport
//!
//! Wraps the single XML endpoint of the remote system behind the
//! [`Gateway`] trait.
//!
//! # Overview
//!
//! - **Envelopes**: requests carry sender credentials plus either a login or
//!   a session id, and exactly one function (`query`, `lookup`,
//!   `readEntityDetails`, `getAPISession`)
//! - **Sessions**: one API session per entity, reused across calls and
//!   re-acquired once when the gateway rejects it
//! - **Failures**: status blocks are classified into authentication,
//!   permission, transient, and generic gateway errors
//! - **Records**: result elements are converted to JSON objects; repeated
//!   sibling tags become arrays
//!
//! # Example
//!
//! ```rust,ignore
//! use intacct_source::gateway::{Filter, Gateway, GatewayClient, QueryRequest};
//!
//! let client = GatewayClient::from_config(&config)?;
//! let request = QueryRequest::new("CUSTOMER", 100)
//!     .with_filter(Some(Filter::greater_or_equal("WHENMODIFIED", "03/01/2024 00:00:00")))
//!     .with_order_by("RECORDNO");
//! let page = client.query(&request).await?;
//! ```

mod client;
mod envelope;
mod response;
mod types;

pub use client::{Gateway, GatewayClient};
pub use envelope::{build_request, Authentication, Function};
pub use response::{classify_failure, field_declarations, parse_document, GatewayResponse, XmlNode};
pub use types::{Credentials, FieldDeclaration, Filter, QueryPage, QueryRequest, Session};

#[cfg(test)]
pub(crate) mod fake;
