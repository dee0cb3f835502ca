//! Discord REST implementation of the chat platform
//!
//! Talks to the v10 HTTP API with a bot token. Forum posts are threads
//! whose starter message shares the thread's id.

use crate::config::DiscordConfig;
use crate::error::AppError;
use crate::governance::models::VoteMarker;
use crate::governance::platform::{Channel, ChatPlatform, Message, Reaction, Thread};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("DiscordBot (bloom-governance, ", env!("CARGO_PKG_VERSION"), ")");
const MAX_RATE_LIMIT_RETRIES: u32 = 3;
const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ApiChannel {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiEmoji {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl ApiEmoji {
    /// Unicode emoji by character, custom emoji as `<:name:id>`
    fn render(&self) -> String {
        match (&self.id, &self.name) {
            (Some(id), Some(name)) => format!("<:{}:{}>", name, id),
            (Some(id), None) => format!("<:_:{}>", id),
            (None, Some(name)) => name.clone(),
            (None, None) => String::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiReaction {
    count: u64,
    emoji: ApiEmoji,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    id: String,
    channel_id: String,
    #[serde(default)]
    reactions: Vec<ApiReaction>,
}

impl ApiMessage {
    fn into_message(self) -> Result<Message, AppError> {
        Ok(Message {
            id: parse_snowflake(&self.id)?,
            channel_id: parse_snowflake(&self.channel_id)?,
            reactions: self
                .reactions
                .into_iter()
                .map(|r| Reaction {
                    emoji: r.emoji.render(),
                    count: r.count,
                })
                .collect(),
        })
    }
}

fn parse_snowflake(raw: &str) -> Result<u64, AppError> {
    raw.parse()
        .map_err(|_| AppError::Platform(format!("Invalid snowflake from Discord: '{}'", raw)))
}

pub struct DiscordClient {
    http: Client,
    api_base: String,
    bot_token: String,
}

impl DiscordClient {
    pub fn new(config: &DiscordConfig) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: config.api_base.as_str().trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.endpoint(path))
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.bot_token))
    }

    /// Send a request, waiting out 429 responses up to `MAX_RATE_LIMIT_RETRIES` times
    async fn dispatch(&self, builder: RequestBuilder) -> Result<Response, AppError> {
        let mut attempt = 0;
        loop {
            let request = builder
                .try_clone()
                .ok_or_else(|| AppError::Internal("Discord request body is not replayable".to_string()))?;
            let response = request.send().await?;
            if response.status() != StatusCode::TOO_MANY_REQUESTS || attempt >= MAX_RATE_LIMIT_RETRIES {
                return Ok(response);
            }

            let header = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await.unwrap_or_default();
            let delay = retry_delay(header.as_deref(), &body);
            attempt += 1;
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Rate limited by Discord, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Send a request; 404 becomes `None`, other failures `Platform` errors
    async fn execute<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<Option<T>, AppError> {
        let response = self.dispatch(builder).await?;
        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url(), "Discord response");

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Platform(format!("Discord returned {}: {}", status, body)));
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        Ok(Some(response.json::<T>().await?))
    }

    /// Like `execute`, but a missing resource is an error
    async fn execute_required<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> Result<T, AppError> {
        self.execute(builder)
            .await?
            .ok_or_else(|| AppError::Platform(format!("{} not found", what)))
    }
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

/// Wait time for a 429: the JSON `retry_after`, else the `Retry-After`
/// header, both in (possibly fractional) seconds, capped at `MAX_RETRY_DELAY`
fn retry_delay(header: Option<&str>, body: &str) -> Duration {
    let secs = serde_json::from_str::<RateLimitBody>(body)
        .map(|b| b.retry_after)
        .ok()
        .or_else(|| header.and_then(|h| h.trim().parse::<f64>().ok()))
        .filter(|s| s.is_finite() && *s >= 0.0)
        .unwrap_or(1.0);
    Duration::from_secs_f64(secs.min(MAX_RETRY_DELAY.as_secs_f64()))
}

fn reaction_path(channel_id: u64, message_id: u64, emoji: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(emoji.as_bytes()).collect();
    format!("/channels/{}/messages/{}/reactions/{}/@me", channel_id, message_id, encoded)
}

#[async_trait]
impl ChatPlatform for DiscordClient {
    async fn resolve_channel_by_name(&self, guild_id: u64, name: &str) -> Result<Option<Channel>, AppError> {
        let path = format!("/guilds/{}/channels", guild_id);
        let channels: Vec<ApiChannel> = self
            .execute(self.request(Method::GET, &path))
            .await?
            .unwrap_or_default();

        channels
            .into_iter()
            .find(|c| c.name.as_deref() == Some(name))
            .map(|c| {
                Ok(Channel {
                    id: parse_snowflake(&c.id)?,
                    name: name.to_string(),
                })
            })
            .transpose()
    }

    async fn get_channel(&self, channel_id: u64) -> Result<Option<Channel>, AppError> {
        let path = format!("/channels/{}", channel_id);
        let channel: Option<ApiChannel> = self.execute(self.request(Method::GET, &path)).await?;
        channel
            .map(|c| {
                Ok(Channel {
                    id: parse_snowflake(&c.id)?,
                    name: c.name.unwrap_or_default(),
                })
            })
            .transpose()
    }

    async fn create_thread(&self, channel: &Channel, name: &str, content: &str) -> Result<Thread, AppError> {
        let path = format!("/channels/{}/threads", channel.id);
        let body = serde_json::json!({
            "name": name,
            "message": { "content": content },
        });
        let created: ApiChannel = self
            .execute_required(self.request(Method::POST, &path).json(&body), "Forum channel")
            .await?;

        Ok(Thread {
            id: parse_snowflake(&created.id)?,
            channel_id: channel.id,
            name: created.name.unwrap_or_else(|| name.to_string()),
        })
    }

    async fn get_thread(&self, channel: &Channel, thread_id: u64) -> Result<Option<Thread>, AppError> {
        let path = format!("/channels/{}", thread_id);
        let found: Option<ApiChannel> = self.execute(self.request(Method::GET, &path)).await?;

        // A thread id that resolves to a thread under some other channel is
        // treated as missing.
        let Some(found) = found else {
            return Ok(None);
        };
        if found.parent_id.as_deref() != Some(channel.id.to_string().as_str()) {
            return Ok(None);
        }

        Ok(Some(Thread {
            id: parse_snowflake(&found.id)?,
            channel_id: channel.id,
            name: found.name.unwrap_or_default(),
        }))
    }

    async fn fetch_message(&self, thread: &Thread, message_id: u64) -> Result<Option<Message>, AppError> {
        let path = format!("/channels/{}/messages/{}", thread.id, message_id);
        let message: Option<ApiMessage> = self.execute(self.request(Method::GET, &path)).await?;
        message.map(ApiMessage::into_message).transpose()
    }

    async fn add_reaction(&self, message: &Message, marker: VoteMarker) -> Result<(), AppError> {
        let path = reaction_path(message.channel_id, message.id, marker.symbol());
        let response = self.dispatch(self.request(Method::PUT, &path)).await?;
        if !response.status().is_success() {
            return Err(AppError::Platform(format!(
                "Failed to add {} to message {}: {}",
                marker.symbol(),
                message.id,
                response.status()
            )));
        }
        Ok(())
    }

    async fn send(&self, thread: &Thread, text: &str) -> Result<(), AppError> {
        let path = format!("/channels/{}/messages", thread.id);
        let body = serde_json::json!({ "content": text });
        let _: ApiMessage = self
            .execute_required(self.request(Method::POST, &path).json(&body), "Thread")
            .await?;
        Ok(())
    }
}
