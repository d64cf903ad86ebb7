//! Request and response bodies

pub mod batches;
pub mod billing;
pub mod claims;

use serde::Deserialize;
use validator::Validate;

/// A free-text reason, required by rejections
#[derive(Debug, Deserialize, Validate)]
pub struct ReasonRequest {
    #[validate(length(max = 1000))]
    pub reason: String,
}
