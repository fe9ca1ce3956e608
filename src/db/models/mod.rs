pub mod export_job;
pub mod pending_job;

pub use export_job::{BadgeColor, ExportJob, JobBadge, JobCounts, JobDisplay, JobStatus};
pub use pending_job::PendingJob;
