//! # persona-crawler core library
//!
//! Enriches a list of target email addresses with LinkedIn profile data by
//! querying the Live Persona Card endpoint, minting and rotating bearer
//! credentials from a pool of provisioned login accounts.
//!
//! The crate is a single-process batch engine: build a [`Config`], hand a
//! [`LoginDriver`] and a [`Shutdown`] handle to [`Engine::new`], and call
//! [`Engine::run`]. The run ends when the work queue is drained or when
//! both credentials and accounts are exhausted.

mod auth;
mod config;
mod engine;
mod enrich;
mod error;
mod logging;
mod models;
mod output;
mod shutdown;
mod store;

pub use crate::auth::{CredentialMinter, LoginDriver, WebDriverLoginDriver};
pub use crate::config::{Config, ConfigBuilder, ConfigFile};
pub use crate::engine::Engine;
pub use crate::enrich::{
    CredentialPool, CredentialValidator, EnrichmentClient, ProbeVerdict, QueryReply,
    RequestGovernor,
};
pub use crate::error::{AppError, Result};
pub use crate::logging::EventLog;
pub use crate::models::{Account, EmailStats, EmailStatus, Outcome, ProfileData};
pub use crate::output::HitWriter;
pub use crate::shutdown::{install_signal_handler, Shutdown};
pub use crate::store::Store;
