//! Postguard: anti-abuse and PII-custody service for imageboard posting
//!
//! Every submission passes through the risk decision engine before the
//! posting layer accepts it; every address the system keeps is encrypted at
//! rest, purged on schedule, and disclosed to third parties only through the
//! human-gated workflow.

pub mod config;
pub mod constants;
pub mod counters;
pub mod crypto;
pub mod db;
pub mod disclosure;
pub mod error;
pub mod moderation;
pub mod reputation;
pub mod retention;
pub mod routes;
pub mod security;
pub mod spam;

pub use config::Config;
pub use error::{AppError, Result};

use std::sync::Arc;

use crate::disclosure::DisclosureService;
use crate::moderation::ModerationService;
use crate::retention::RetentionEngine;
use crate::spam::{CaptchaService, SpamEngine};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub config: Config,
    pub engine: Arc<SpamEngine>,
    pub captcha: CaptchaService,
    pub disclosure: Arc<DisclosureService>,
    pub retention: Arc<RetentionEngine>,
    pub moderation: Arc<ModerationService>,
}
