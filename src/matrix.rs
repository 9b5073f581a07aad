//! Minimal Matrix client-server API transport.
//!
//! Talks plain HTTP to the homeserver: password login, room join, long-poll
//! `/sync`, and `m.room.message` sends with optional HTML formatting. No
//! end-to-end encryption; rooms are expected to be unencrypted.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// Outbound side of the chat service as seen by command handlers.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a text message to a room, with an optional HTML rendering.
    async fn send_text(&self, room: &str, body: &str, html: Option<&str>) -> Result<()>;

    /// Resolve a user ID to a display name, falling back to the ID itself.
    async fn display_name(&self, user_id: &str) -> String;
}

fn encode(segment: &str) -> String {
    utf8_percent_encode(segment, NON_ALPHANUMERIC).to_string()
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    user_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncResponse {
    pub next_batch: String,
    #[serde(default)]
    pub rooms: Rooms,
}

#[derive(Debug, Default, Deserialize)]
pub struct Rooms {
    #[serde(default)]
    pub join: std::collections::HashMap<String, JoinedRoom>,
}

#[derive(Debug, Default, Deserialize)]
pub struct JoinedRoom {
    #[serde(default)]
    pub timeline: Timeline,
}

#[derive(Debug, Default, Deserialize)]
pub struct Timeline {
    #[serde(default)]
    pub events: Vec<RoomEvent>,
}

#[derive(Debug, Deserialize)]
pub struct RoomEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub sender: String,
    #[serde(default)]
    pub origin_server_ts: u64,
    #[serde(default)]
    pub content: Value,
}

impl RoomEvent {
    /// The plain-text body, if this is an `m.text` room message.
    pub fn text_body(&self) -> Option<&str> {
        if self.event_type != "m.room.message" {
            return None;
        }
        if self.content.get("msgtype").and_then(Value::as_str) != Some("m.text") {
            return None;
        }
        self.content.get("body").and_then(Value::as_str)
    }
}

#[derive(Debug, Deserialize)]
struct DisplayNameResponse {
    #[serde(default)]
    displayname: Option<String>,
}

/// Logged-in Matrix session over the client-server HTTP API.
pub struct MatrixClient {
    server: String,
    client: reqwest::Client,
    access_token: String,
    pub user_id: String,
}

impl MatrixClient {
    /// Password login against `/_matrix/client/v3/login`.
    pub async fn login(server: &str, username: &str, password: &str) -> Result<Self> {
        let server = server.trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build Matrix HTTP client")?;

        let url = format!("{server}/_matrix/client/v3/login");
        let payload = json!({
            "type": "m.login.password",
            "identifier": {"type": "m.id.user", "user": username},
            "password": password,
            "initial_device_display_name": "ollamatrix",
        });
        let resp = client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .context("Failed to reach Matrix homeserver for login")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Matrix login failed with {status}: {body}");
        }
        let login: LoginResponse = resp.json().await.context("Invalid Matrix login response")?;
        tracing::info!("Logged in to Matrix as {}", login.user_id);

        Ok(Self {
            server,
            client,
            access_token: login.access_token,
            user_id: login.user_id,
        })
    }

    /// Join a room by alias or ID.
    pub async fn join(&self, room: &str) -> Result<()> {
        let url = format!("{}/_matrix/client/v3/join/{}", self.server, encode(room));
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&json!({}))
            .send()
            .await
            .with_context(|| format!("Failed to reach homeserver to join {room}"))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Failed to join {room}: {status}: {body}");
        }
        tracing::info!("Joined room {}", room);
        Ok(())
    }

    /// Long-poll `/sync`. With `since = None` this returns the initial
    /// snapshot and the first batch token.
    pub async fn sync(&self, since: Option<&str>, timeout_ms: u64) -> Result<SyncResponse> {
        let url = format!("{}/_matrix/client/v3/sync", self.server);
        let timeout = timeout_ms.to_string();
        let mut query: Vec<(&str, &str)> = vec![("timeout", &timeout)];
        if let Some(since) = since {
            query.push(("since", since));
        }
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&query)
            // The request must outlive the server-side long poll.
            .timeout(Duration::from_millis(timeout_ms) + Duration::from_secs(30))
            .send()
            .await
            .context("Matrix sync request failed")?;
        if !resp.status().is_success() {
            anyhow::bail!("Matrix sync returned {}", resp.status());
        }
        let sync: SyncResponse = resp.json().await.context("Invalid Matrix sync response")?;
        Ok(sync)
    }
}

#[async_trait]
impl ChatTransport for MatrixClient {
    async fn send_text(&self, room: &str, body: &str, html: Option<&str>) -> Result<()> {
        let txn_id = Uuid::new_v4();
        let url = format!(
            "{}/_matrix/client/v3/rooms/{}/send/m.room.message/{}",
            self.server,
            encode(room),
            txn_id
        );
        let mut content = json!({
            "msgtype": "m.text",
            "body": body,
        });
        if let Some(html) = html {
            content["format"] = json!("org.matrix.custom.html");
            content["formatted_body"] = json!(html);
        }
        let resp = self
            .client
            .put(&url)
            .bearer_auth(&self.access_token)
            .json(&content)
            .send()
            .await
            .with_context(|| format!("Failed to send message to {room}"))?;
        if !resp.status().is_success() {
            anyhow::bail!("Message send to {room} returned {}", resp.status());
        }
        Ok(())
    }

    async fn display_name(&self, user_id: &str) -> String {
        let url = format!(
            "{}/_matrix/client/v3/profile/{}/displayname",
            self.server,
            encode(user_id)
        );
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await;
        match resp {
            Ok(resp) if resp.status().is_success() => resp
                .json::<DisplayNameResponse>()
                .await
                .ok()
                .and_then(|p| p.displayname)
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| user_id.to_string()),
            _ => user_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sync_response() {
        let raw = json!({
            "next_batch": "s72595_4483_1934",
            "rooms": {
                "join": {
                    "!room:example.org": {
                        "timeline": {
                            "events": [
                                {
                                    "type": "m.room.message",
                                    "sender": "@alice:example.org",
                                    "origin_server_ts": 1724400000000u64,
                                    "content": {"msgtype": "m.text", "body": ".ai hello"}
                                },
                                {
                                    "type": "m.room.member",
                                    "sender": "@bob:example.org",
                                    "origin_server_ts": 1724400001000u64,
                                    "content": {"membership": "join"}
                                },
                                {
                                    "type": "m.room.message",
                                    "sender": "@carol:example.org",
                                    "origin_server_ts": 1724400002000u64,
                                    "content": {"msgtype": "m.image", "body": "cat.png"}
                                }
                            ]
                        }
                    }
                }
            }
        });
        let sync: SyncResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(sync.next_batch, "s72595_4483_1934");
        let room = &sync.rooms.join["!room:example.org"];
        assert_eq!(room.timeline.events.len(), 3);
        assert_eq!(room.timeline.events[0].text_body(), Some(".ai hello"));
        assert_eq!(room.timeline.events[1].text_body(), None);
        assert_eq!(room.timeline.events[2].text_body(), None);
    }

    #[test]
    fn test_empty_sync_response() {
        let sync: SyncResponse = serde_json::from_value(json!({"next_batch": "s1"})).unwrap();
        assert!(sync.rooms.join.is_empty());
    }

    #[test]
    fn test_room_id_percent_encoding() {
        assert_eq!(encode("!abc:example.org"), "%21abc%3Aexample%2Eorg");
        assert_eq!(encode("#lounge:example.org"), "%23lounge%3Aexample%2Eorg");
    }
}
