pub mod captcha;
pub mod check;
pub mod disclosure;
pub mod health;
pub mod moderation;
pub mod retention;

pub use captcha::{issue_captcha, verify_captcha};
pub use check::check_submission;
pub use disclosure::{
    approve_disclosure, list_pending_disclosures, queue_disclosure, reject_disclosure,
};
pub use health::health_check;
pub use moderation::{
    ban_media, check_ban, create_ban, create_report, list_reports, record_decision,
};
pub use retention::run_retention;
