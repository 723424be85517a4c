use redis::RedisResult;
use tracing::info;

pub const SWEEP_LOCK_KEY: &str = "pinbox:delivery:sweep";

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Advisory lock: `SET key token NX EX ttl`. Returns whether this caller
    /// now holds it.
    pub async fn acquire_lock(&self, key: &str, token: &str, ttl_seconds: u64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await?;

        if result.is_some() {
            info!("Lock acquired: {}", key);
        }
        Ok(result.is_some())
    }

    /// Release the lock only if `token` still owns it.
    pub async fn release_lock(&self, key: &str, token: &str) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let script = redis::Script::new(
            r#"
            if redis.call("GET", KEYS[1]) == ARGV[1] then
                return redis.call("DEL", KEYS[1])
            else
                return 0
            end
        "#,
        );

        let deleted: i64 = script.key(key).arg(token).invoke_async(&mut conn).await?;
        Ok(deleted == 1)
    }

    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}
