pub mod spur;
pub mod stopforumspam;

pub use spur::SpurClient;
pub use stopforumspam::StopForumSpamClient;
