use crate::core::{Mutex, Pending};
use anyhow::Error;
use log::debug;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use uuid::Uuid;

// KEYS[1]: lock key
// ARGV[1]: owner token
const RELEASE_MUTEX_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

const RETRY_INTERVAL: Duration = Duration::from_millis(50);

fn owner_token() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Clone)]
pub(crate) struct RedisMutex {
    conn: MultiplexedConnection,
    // lock lifetime; a holder that never releases loses the lock after this
    expire: Duration,
    // how long acquire waits before giving up
    timeout: Duration,
}

impl RedisMutex {
    pub async fn connect(client: redis::Client, expire: Duration, timeout: Duration) -> Result<Self, Error> {
        let conn = client.get_multiplexed_tokio_connection().await?;
        Ok(Self { conn, expire, timeout })
    }

    async fn try_acquire(&self, key: &str, token: &str) -> Result<bool, Error> {
        let mut conn = self.conn.clone();
        let res: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(self.expire.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(res.is_some())
    }
}

impl Mutex for RedisMutex {
    fn acquire<'a>(&'a self, key: &'a str) -> Pending<'a, String> {
        Box::pin(async move {
            let token = owner_token();
            let deadline = Instant::now() + self.timeout;
            loop {
                if self.try_acquire(key, &token).await? {
                    debug!("acquired lock {}", key);
                    return Ok(token);
                }
                if Instant::now() >= deadline {
                    return Err(Error::msg(format!("timed out waiting for lock {}", key)));
                }
                sleep(RETRY_INTERVAL).await;
            }
        })
    }

    fn release<'a>(&'a self, key: &'a str, token: &'a str) -> Pending<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let removed: i32 = redis::Script::new(RELEASE_MUTEX_SCRIPT)
                .key(key)
                .arg(token)
                .invoke_async(&mut conn)
                .await?;
            if removed == 0 {
                debug!("lock {} had already expired", key);
            }
            Ok(())
        })
    }
}
