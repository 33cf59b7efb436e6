use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use mailward_core::ThrottleNotifier;

/// Publishes failed-login notices to the pub/sub channel the ban daemon
/// watches. Strictly best effort: a dead redis never fails a login.
#[derive(Clone)]
pub struct RedisFailBanNotifier {
    conn: ConnectionManager,
    channel: String,
    brand: String,
}

impl RedisFailBanNotifier {
    pub fn new(conn: ConnectionManager, channel: impl Into<String>, brand: impl Into<String>) -> Self {
        Self {
            conn,
            channel: channel.into(),
            brand: brand.into(),
        }
    }
}

#[async_trait::async_trait]
impl ThrottleNotifier for RedisFailBanNotifier {
    async fn invalid_login(&self, username: &str, remote_addr: &str) {
        let mut conn = self.conn.clone();
        let message = ban_message(&self.brand, username, remote_addr);
        if let Err(error) = conn.publish::<_, _, ()>(&self.channel, message).await {
            tracing::warn!(%error, "fail-ban notification dropped");
        }
    }
}

/// Message format the ban daemon's regexp matches on.
fn ban_message(brand: &str, username: &str, remote_addr: &str) -> String {
    format!("{brand} UI: Invalid password for {username} by {remote_addr}")
}
