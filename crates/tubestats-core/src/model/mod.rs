pub mod metrics;
pub mod video;

pub use metrics::{LikeView, Stat, VideoStat};
pub use video::{Avatar, Label, Owner, VideoPage, VideoRecord};
