pub mod pull_status;
