use std::collections::HashMap;

use fred::prelude::*;
use fred::types::RedisValue;
use log::info;
use once_cell::sync::OnceCell;

#[derive(Clone)]
pub struct RedisManager {
    client: RedisClient,
}

static INSTANCE: OnceCell<RedisManager> = OnceCell::new();

impl RedisManager {
    pub fn new(redis_url: &str) -> Result<Self, RedisError> {
        let config = RedisConfig::from_url(redis_url)?;
        let client = RedisClient::new(config, None, None, None);

        Ok(Self { client })
    }

    pub fn init_global(redis_url: &str) -> Result<&'static RedisManager, RedisError> {
        INSTANCE.get_or_try_init(|| Self::new(redis_url))
    }

    pub fn global() -> Option<&'static RedisManager> {
        INSTANCE.get()
    }

    pub fn client(&self) -> RedisClient {
        self.client.clone()
    }

    pub async fn connect(&self) -> Result<(), RedisError> {
        self.client.connect();
        self.client.wait_for_connect().await?;
        info!("Connected to Redis");
        Ok(())
    }

    pub async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        seconds: i64,
    ) -> Result<(), RedisError> {
        self.client
            .set::<(), _, _>(key, value, None, None, false)
            .await?;
        self.client.expire::<(), _>(key, seconds).await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, RedisError> {
        let value: Option<String> = self.client.get(key).await?;
        Ok(value)
    }

    pub async fn delete(&self, key: &str) -> Result<(), RedisError> {
        self.client.del::<(), _>(key).await
    }

    pub async fn stream_add(&self, stream: &str, pairs: &[(&str, &str)]) -> Result<(), RedisError> {
        let mut fields: Vec<(String, String)> = Vec::with_capacity(pairs.len());
        for (field, value) in pairs {
            fields.push(((*field).to_owned(), (*value).to_owned()));
        }

        self.client
            .xadd::<(), _, _, _, _>(stream, false, None, "*", fields)
            .await
    }

    /// Reads entries after `last_id` from one stream and advances `last_id`
    /// past everything returned.
    pub async fn stream_read(
        &self,
        stream: &str,
        last_id: &mut String,
        count: u64,
    ) -> Result<Vec<(String, HashMap<String, String>)>, RedisError> {
        let streams = vec![stream];
        let ids = vec![last_id.as_str()];

        let raw_result: RedisValue = self
            .client
            .xread::<RedisValue, _, _>(Some(count), None, streams, ids)
            .await?;

        let mut result: Vec<(String, HashMap<String, String>)> = Vec::new();

        if let RedisValue::Array(streams_array) = raw_result {
            for stream_entry in streams_array {
                if let RedisValue::Array(stream_data) = stream_entry {
                    if stream_data.len() >= 2 {
                        if let RedisValue::Array(messages) = &stream_data[1] {
                            for message in messages {
                                if let RedisValue::Array(msg_data) = message {
                                    if msg_data.len() >= 2 {
                                        let msg_id = msg_data[0]
                                            .as_str()
                                            .map(|s| s.to_string())
                                            .unwrap_or_default();

                                        if let RedisValue::Array(fields_array) = &msg_data[1] {
                                            let mut fields_map = HashMap::new();

                                            for i in (0..fields_array.len()).step_by(2) {
                                                if i + 1 < fields_array.len() {
                                                    let key = fields_array[i]
                                                        .as_str()
                                                        .map(|s| s.to_string())
                                                        .unwrap_or_default();
                                                    let value = fields_array[i + 1]
                                                        .as_str()
                                                        .map(|s| s.to_string())
                                                        .unwrap_or_default();
                                                    fields_map.insert(key, value);
                                                }
                                            }

                                            if !msg_id.is_empty() && msg_id > *last_id {
                                                *last_id = msg_id.clone();
                                            }

                                            result.push((msg_id, fields_map));
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok(result)
    }
}
