use std::time::Duration;

/// Connection settings for the client. The reconnect policy is bounded and
/// fixed-interval; once the attempt cap is exhausted the client stays
/// offline until `run` is called again.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub server_url: String,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:5000/ws".to_string(),
            reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(1),
        }
    }
}
