pub mod client;
pub mod error;
pub mod types;

pub use client::{SubmissionApi, SubmissionClient};
pub use error::ApiError;
pub use types::{Profile, Submission, SubmissionPage};
