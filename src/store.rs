//! Hosted channel-store client and change feed
//!
//! The store is an external collaborator: a hosted database exposing the
//! channel table (and the credential table) over a REST endpoint. Reads
//! fail soft to the built-in fallback channel list; writes report success
//! or failure and never panic the UI.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;

use crate::channels::{fallback_channels, Channel, ChannelEvent};

const CHANNEL_TABLE: &str = "xtv_cdn_channel";
const USER_TABLE: &str = "xtv_cdn_users";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP error: {0}")]
    Status(u16),
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Row from the credential table. Only what the login gate needs.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct StoreUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Clone)]
pub struct StoreClient {
    base_url: String,
    api_key: String,
    agent: ureq::Agent,
}

impl StoreClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(30)))
            .timeout_connect(Some(Duration::from_secs(10)))
            .build()
            .new_agent();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            agent,
        }
    }

    fn rest_url(&self, table: &str, query: &str) -> String {
        format!("{}/rest/v1/{}?{}", self.base_url, table, query)
    }

    fn get_json(&self, url: &str) -> Result<String, StoreError> {
        let mut response = self
            .agent
            .get(url)
            .header("apikey", &self.api_key)
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .call()
            .map_err(|e| StoreError::Request(e.to_string()))?;

        if response.status() != 200 {
            return Err(StoreError::Status(response.status().as_u16()));
        }

        response
            .body_mut()
            .read_to_string()
            .map_err(|e| StoreError::Request(e.to_string()))
    }

    /// Raw channel fetch; errors propagate. Feed polling and the soft
    /// wrappers below build on this.
    pub fn fetch_channels_raw(&self) -> Result<Vec<Channel>, StoreError> {
        let url = self.rest_url(
            CHANNEL_TABLE,
            "status=eq.true&order=group_title.asc,channel_name.asc&select=*",
        );
        let body = self.get_json(&url)?;
        serde_json::from_str(&body).map_err(|e| StoreError::Decode(e.to_string()))
    }

    /// Channel list for the UI. Falls back to the built-in list when the
    /// store errors out or has nothing, mirroring how the dashboard must
    /// keep working without its backend.
    pub fn fetch_channels(&self) -> Vec<Channel> {
        match self.fetch_channels_raw() {
            Ok(channels) if !channels.is_empty() => {
                log::info!("loaded {} channels from store", channels.len());
                channels
            }
            Ok(_) => {
                log::warn!("no channels in store, using fallback list");
                fallback_channels()
            }
            Err(e) => {
                log::warn!("channel fetch failed ({}), using fallback list", e);
                fallback_channels()
            }
        }
    }

    /// Live channels only, busiest first.
    pub fn fetch_live_channels(&self) -> Vec<Channel> {
        let url = self.rest_url(
            CHANNEL_TABLE,
            "status=eq.true&is_live=eq.true&order=clients_count.desc&select=*",
        );
        let result = self
            .get_json(&url)
            .and_then(|body| {
                serde_json::from_str::<Vec<Channel>>(&body)
                    .map_err(|e| StoreError::Decode(e.to_string()))
            });
        match result {
            Ok(channels) if !channels.is_empty() => channels,
            _ => fallback_channels().into_iter().filter(|c| c.is_live).collect(),
        }
    }

    /// Toggle a channel's liveness (and optionally its viewer count).
    /// Returns whether the store accepted the write.
    pub fn update_channel_status(&self, id: &str, is_live: bool, clients_count: Option<u32>) -> bool {
        let url = self.rest_url(CHANNEL_TABLE, &format!("id=eq.{}", id));
        let mut patch = serde_json::json!({
            "is_live": is_live,
            "updated_at": chrono::Utc::now().to_rfc3339(),
        });
        if let Some(count) = clients_count {
            patch["clients_count"] = serde_json::json!(count);
        }

        let result = self
            .agent
            .patch(&url)
            .header("apikey", &self.api_key)
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .send(patch.to_string());

        match result {
            Ok(response) if response.status().is_success() => {
                log::info!("channel {} set {}", id, if is_live { "LIVE" } else { "OFFLINE" });
                true
            }
            Ok(response) => {
                log::warn!("status update rejected: HTTP {}", response.status());
                false
            }
            Err(e) => {
                log::warn!("status update failed: {}", e);
                false
            }
        }
    }

    pub fn create_channel(&self, channel: &Channel) -> bool {
        let url = self.rest_url(CHANNEL_TABLE, "select=*");
        let body = match serde_json::to_string(channel) {
            Ok(b) => b,
            Err(_) => return false,
        };
        let result = self
            .agent
            .post(&url)
            .header("apikey", &self.api_key)
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .send(body);
        matches!(result, Ok(r) if r.status().is_success())
    }

    pub fn delete_channel(&self, id: &str) -> bool {
        let url = self.rest_url(CHANNEL_TABLE, &format!("id=eq.{}", id));
        let result = self
            .agent
            .delete(&url)
            .header("apikey", &self.api_key)
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .call();
        matches!(result, Ok(r) if r.status().is_success())
    }

    /// Credential-table lookup for the login gate.
    pub fn fetch_user(&self, username: &str, password: &str) -> Result<Option<StoreUser>, StoreError> {
        let url = self.rest_url(
            USER_TABLE,
            &format!("username=eq.{}&password=eq.{}&select=*", username, password),
        );
        let body = self.get_json(&url)?;
        let mut users: Vec<StoreUser> =
            serde_json::from_str(&body).map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(if users.is_empty() { None } else { Some(users.remove(0)) })
    }
}

/// Diff two channel snapshots into feed events. Order: inserts and updates
/// in new-snapshot order, then deletes.
pub fn diff_snapshots(old: &[Channel], new: &[Channel]) -> Vec<ChannelEvent> {
    let mut events = Vec::new();

    for channel in new {
        match old.iter().find(|c| c.id == channel.id) {
            None => events.push(ChannelEvent::Insert(channel.clone())),
            Some(previous) if previous != channel => events.push(ChannelEvent::Update {
                new: channel.clone(),
                old: Some(previous.clone()),
            }),
            Some(_) => {}
        }
    }

    for channel in old {
        if !new.iter().any(|c| c.id == channel.id) {
            events.push(ChannelEvent::Delete(channel.clone()));
        }
    }

    events
}

/// Change-notification stream for the channel table.
///
/// `open()` hands back a handle owning a background polling thread; the
/// handle is the only way to receive events and dropping (or `close()`-ing)
/// it stops the thread. No process-wide registry: whoever composes the
/// session owns the subscription.
pub struct ChangeFeed;

impl ChangeFeed {
    pub fn open(client: StoreClient, interval: Duration) -> ChangeFeedHandle {
        let (sender, receiver) = channel();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let thread = thread::spawn(move || {
            Self::poll_loop(client, interval, sender, stop_flag);
        });

        ChangeFeedHandle {
            receiver,
            stop,
            thread: Some(thread),
        }
    }

    fn poll_loop(
        client: StoreClient,
        interval: Duration,
        sender: Sender<ChannelEvent>,
        stop: Arc<AtomicBool>,
    ) {
        let mut snapshot: Option<Vec<Channel>> = None;

        loop {
            if stop.load(Ordering::Relaxed) {
                return;
            }

            match client.fetch_channels_raw() {
                Ok(current) => {
                    if let Some(ref previous) = snapshot {
                        for event in diff_snapshots(previous, &current) {
                            if sender.send(event).is_err() {
                                return; // receiver gone
                            }
                        }
                    }
                    snapshot = Some(current);
                }
                // Transient store trouble; keep the old snapshot and retry
                Err(e) => log::debug!("change feed poll failed: {}", e),
            }

            // Sleep in small steps so close() is prompt
            let mut slept = Duration::ZERO;
            while slept < interval {
                if stop.load(Ordering::Relaxed) {
                    return;
                }
                let step = Duration::from_millis(200).min(interval - slept);
                thread::sleep(step);
                slept += step;
            }
        }
    }
}

/// Live subscription handle. Poll it from the UI loop; close or drop it to
/// end the subscription.
pub struct ChangeFeedHandle {
    receiver: Receiver<ChannelEvent>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ChangeFeedHandle {
    /// Drain whatever events have arrived since the last poll.
    pub fn poll(&self) -> Vec<ChannelEvent> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }

    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ChangeFeedHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_snapshots() {
        let mut base = fallback_channels();
        base.truncate(3);

        let mut next = base.clone();
        next[1].is_live = false; // update
        next.remove(0); // delete
        let mut added = base[1].clone();
        added.id = "new-1".to_string();
        next.push(added); // insert

        let events = diff_snapshots(&base, &next);
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], ChannelEvent::Update { new, .. } if !new.is_live));
        assert!(matches!(&events[1], ChannelEvent::Insert(c) if c.id == "new-1"));
        assert!(matches!(&events[2], ChannelEvent::Delete(c) if c.id == base[0].id));
    }

    #[test]
    fn test_diff_snapshots_no_change() {
        let base = fallback_channels();
        assert!(diff_snapshots(&base, &base).is_empty());
    }

    #[test]
    fn test_fetch_channels_fails_soft() {
        // Port 9 (discard) refuses connections immediately
        let client = StoreClient::new("http://127.0.0.1:9", "test-key");
        let channels = client.fetch_channels();
        assert_eq!(channels, fallback_channels());
        assert!(client.fetch_channels_raw().is_err());
    }

    #[test]
    fn test_change_feed_close_stops_thread() {
        let client = StoreClient::new("http://127.0.0.1:9", "test-key");
        let handle = ChangeFeed::open(client, Duration::from_millis(50));
        thread::sleep(Duration::from_millis(120));
        assert!(handle.poll().is_empty());
        // close() joins the polling thread; returning at all is the assertion
        handle.close();
    }
}
