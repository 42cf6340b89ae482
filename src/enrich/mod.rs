//! Everything that talks to the enrichment endpoint: the HTTP client, the
//! profile parser, the in-memory credential pool, the request governor, and
//! the credential validator.

mod client;
mod governor;
mod pool;
mod profile;
mod validator;

pub use client::{EnrichmentClient, QueryReply, MAX_BODY_BYTES};
pub use governor::{RequestGovernor, RequestPermit};
pub use pool::CredentialPool;
pub use profile::parse_profile;
pub use validator::{probe_verdict, CredentialValidator, ProbeVerdict};
