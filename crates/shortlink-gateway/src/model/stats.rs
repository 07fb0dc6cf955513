use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub urls: u64,
    pub users: u64,
}
