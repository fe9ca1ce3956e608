mod dedupe_keys;
mod export_jobs;
mod pending_jobs;
