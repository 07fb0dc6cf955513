mod stats;
mod url;

pub use stats::StatsResponse;
pub use url::{
    BatchRequestItem, BatchResponseItem, HealthResponse, ShortenRequest, ShortenResponse, UserUrl,
};
