//! Channel data model, built-in fallback list and change-feed events

#![allow(dead_code)]

use serde::{Deserialize, Serialize};

use crate::protocol::{self, StreamCandidate, StreamUrlAnalysis};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Iptv,
    Vod,
    #[default]
    Live,
    Surveillance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RestreamMode {
    Always,
    OnDemand,
    Scheduled,
    #[default]
    Direct,
}

impl RestreamMode {
    pub fn label(&self) -> &'static str {
        match self {
            RestreamMode::Always => "ALWAYS",
            RestreamMode::OnDemand => "ON-DEMAND",
            RestreamMode::Scheduled => "SCHEDULED",
            RestreamMode::Direct => "DIRECT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum ChannelLevel {
    #[default]
    #[serde(rename = "0-public")]
    Public,
    #[serde(rename = "1-basic")]
    Basic,
    #[serde(rename = "2-standard")]
    Standard,
    #[serde(rename = "3-premium")]
    Premium,
    #[serde(rename = "4-vip")]
    Vip,
    #[serde(rename = "5-super-vip")]
    SuperVip,
}

impl ChannelLevel {
    pub fn label(&self) -> &'static str {
        match self {
            ChannelLevel::Public => "PUBLIC",
            ChannelLevel::Basic => "BASIC",
            ChannelLevel::Standard => "STANDARD",
            ChannelLevel::Premium => "PREMIUM",
            ChannelLevel::Vip => "VIP",
            ChannelLevel::SuperVip => "SUPER VIP",
        }
    }
}

/// One broadcastable source, as stored in the hosted channel table. The
/// player treats this as a read-only value object for the duration of a
/// playback session; liveness changes round-trip through the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub tvg_id: String,
    #[serde(default)]
    pub tvg_name: String,
    #[serde(default)]
    pub tvg_logo: String,
    #[serde(default)]
    pub group_title: String,
    pub channel_name: String,
    #[serde(default)]
    pub stream_name: String,
    pub stream_url: String,
    #[serde(rename = "type", default)]
    pub stream_type: StreamType,
    #[serde(default)]
    pub restream: RestreamMode,
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub level: ChannelLevel,
    #[serde(default)]
    pub publish_url: String,
    #[serde(default)]
    pub publish_url_rtmp: String,
    #[serde(default)]
    pub publish_url_flv: String,
    #[serde(default)]
    pub is_live: bool,
    #[serde(default)]
    pub clients_count: u32,
    // Denormalized media descriptors, display only
    #[serde(default)]
    pub video_codec: String,
    #[serde(default)]
    pub video_resolution: String,
    #[serde(default)]
    pub video_fps: u32,
    #[serde(default)]
    pub audio_codec: String,
    #[serde(default)]
    pub audio_freq: u32,
    #[serde(default)]
    pub audio_channels: u32,
    #[serde(default)]
    pub schedule_enabled: bool,
    #[serde(default)]
    pub schedule_start_time: String,
    #[serde(default)]
    pub schedule_end_time: String,
    #[serde(default)]
    pub schedule_timezone: String,
    #[serde(default)]
    pub schedule_days: Vec<u8>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Channel {
    /// Analyze this channel's stream URLs. Recomputed on every call; the
    /// result is deterministic for identical channel fields, so callers may
    /// hold or discard it freely.
    pub fn analysis(&self) -> StreamUrlAnalysis {
        protocol::analyze(
            &self.stream_url,
            &self.stream_name,
            self.restream,
            Some(self.publish_url.as_str()),
            Some(self.publish_url_rtmp.as_str()),
            Some(self.publish_url_flv.as_str()),
        )
    }

    /// Ordered fallback pool for playback: every non-empty URL slot this
    /// channel has. Never empty (the raw URL is always included).
    pub fn candidates(&self) -> Vec<StreamCandidate> {
        protocol::all_candidates(&self.analysis())
    }
}

/// Change-feed notification for the channel table.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Insert(Channel),
    Update { new: Channel, old: Option<Channel> },
    Delete(Channel),
}

/// Merge one feed event into an in-memory channel list. Inserts append,
/// updates replace by id (or append if the row was unknown), deletes remove.
pub fn apply_event(channels: &mut Vec<Channel>, event: &ChannelEvent) {
    match event {
        ChannelEvent::Insert(new) => {
            if !channels.iter().any(|c| c.id == new.id) {
                channels.push(new.clone());
            }
        }
        ChannelEvent::Update { new, .. } => {
            if let Some(existing) = channels.iter_mut().find(|c| c.id == new.id) {
                *existing = new.clone();
            } else {
                channels.push(new.clone());
            }
        }
        ChannelEvent::Delete(old) => {
            channels.retain(|c| c.id != old.id);
        }
    }
}

fn fallback_channel(
    id: &str,
    tvg_id: &str,
    name: &str,
    stream_name: &str,
    group: &str,
    url: &str,
    publish_url: &str,
    stream_type: StreamType,
    resolution: &str,
    fps: u32,
) -> Channel {
    Channel {
        id: id.to_string(),
        tvg_id: tvg_id.to_string(),
        tvg_name: name.to_string(),
        tvg_logo: String::new(),
        group_title: group.to_string(),
        channel_name: name.to_string(),
        stream_name: stream_name.to_string(),
        stream_url: url.to_string(),
        stream_type,
        restream: RestreamMode::Direct,
        status: true,
        level: ChannelLevel::Public,
        publish_url: publish_url.to_string(),
        publish_url_rtmp: String::new(),
        publish_url_flv: String::new(),
        is_live: true,
        clients_count: 0,
        video_codec: "h264".to_string(),
        video_resolution: resolution.to_string(),
        video_fps: fps,
        audio_codec: "aac".to_string(),
        audio_freq: 48000,
        audio_channels: 2,
        schedule_enabled: false,
        schedule_start_time: String::new(),
        schedule_end_time: String::new(),
        schedule_timezone: "Asia/Jakarta".to_string(),
        schedule_days: vec![1, 2, 3, 4, 5, 6, 7],
        created_at: String::new(),
        updated_at: String::new(),
    }
}

/// Built-in channel set used when the store is unreachable or empty.
pub fn fallback_channels() -> Vec<Channel> {
    vec![
        fallback_channel(
            "test-hls-1",
            "test-hls-tears",
            "Test HLS - Tears of Steel",
            "test_hls_tears",
            "Test Streams",
            "https://demo.unified-streaming.com/k8s/features/stable/video/tears-of-steel/tears-of-steel.ism/.m3u8",
            "https://demo.unified-streaming.com/k8s/features/stable/video/tears-of-steel/tears-of-steel.ism/.m3u8",
            StreamType::Live,
            "1080p",
            24,
        ),
        fallback_channel(
            "test-hls-2",
            "test-hls-sintel",
            "Test HLS - Sintel",
            "test_hls_sintel",
            "Test Streams",
            "https://bitdash-a.akamaihd.net/content/sintel/hls/playlist.m3u8",
            "https://bitdash-a.akamaihd.net/content/sintel/hls/playlist.m3u8",
            StreamType::Live,
            "720p",
            24,
        ),
        fallback_channel(
            "test-mp4-1",
            "test-mp4-bunny",
            "Test MP4 - Big Buck Bunny",
            "test_mp4_bunny",
            "Test Streams",
            "https://commondatastorage.googleapis.com/gtv-videos-bucket/sample/BigBuckBunny.mp4",
            "",
            StreamType::Vod,
            "720p",
            30,
        ),
        fallback_channel(
            "iptv-144",
            "al-jazeera",
            "Al Jazeera",
            "al_jazeera",
            "News",
            "https://iptv.lancartech.co.id:443/mohrezza/mohrezza@Reg1-3/144.m3u8",
            "https://iptv.lancartech.co.id:443/mohrezza/mohrezza@Reg1-3/144.m3u8",
            StreamType::Iptv,
            "720p",
            25,
        ),
        fallback_channel(
            "iptv-145",
            "abc-australia",
            "ABC Australia",
            "abc_australia",
            "International",
            "https://iptv.lancartech.co.id:443/mohrezza/mohrezza@Reg1-3/145.m3u8",
            "https://iptv.lancartech.co.id:443/mohrezza/mohrezza@Reg1-3/145.m3u8",
            StreamType::Iptv,
            "720p",
            25,
        ),
    ]
}
