//! Stream protocol detection and candidate resolution
//!
//! Everything here is pure string work: no network access, no probing.
//! A channel record carries up to four candidate URLs (the raw stream URL
//! plus optional HLS/FLV/RTMP publish URLs from the restreamer) and the
//! player needs them classified and ranked before it touches a decoder.

#![allow(dead_code)]

use serde::{Deserialize, Serialize};

use crate::channels::RestreamMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamProtocol {
    Hls,
    Flv,
    Rtmp,
    Dash,
    Webrtc,
    Direct,
    Unknown,
}

impl StreamProtocol {
    pub fn label(&self) -> &'static str {
        match self {
            StreamProtocol::Hls => "HLS",
            StreamProtocol::Flv => "FLV",
            StreamProtocol::Rtmp => "RTMP",
            StreamProtocol::Dash => "DASH",
            StreamProtocol::Webrtc => "WebRTC",
            StreamProtocol::Direct => "DIRECT",
            StreamProtocol::Unknown => "UNKNOWN",
        }
    }
}

/// Static descriptor for a protocol. The priority here is the fixed
/// preference table (1 = best), independent of what any particular channel
/// has configured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProtocolInfo {
    pub protocol: StreamProtocol,
    pub priority: u8,
    pub description: &'static str,
    pub supported: bool,
}

pub fn protocol_info(protocol: StreamProtocol) -> ProtocolInfo {
    match protocol {
        StreamProtocol::Hls => ProtocolInfo {
            protocol,
            priority: 1,
            description: "HTTP Live Streaming (HLS)",
            supported: true,
        },
        StreamProtocol::Flv => ProtocolInfo {
            protocol,
            priority: 2,
            description: "Flash Video (FLV)",
            supported: true,
        },
        StreamProtocol::Rtmp => ProtocolInfo {
            protocol,
            priority: 3,
            description: "Real-Time Messaging Protocol (RTMP)",
            supported: true,
        },
        StreamProtocol::Webrtc => ProtocolInfo {
            protocol,
            priority: 4,
            description: "Web Real-Time Communication",
            supported: false,
        },
        StreamProtocol::Dash => ProtocolInfo {
            protocol,
            priority: 5,
            description: "Dynamic Adaptive Streaming (DASH)",
            supported: false,
        },
        StreamProtocol::Direct => ProtocolInfo {
            protocol,
            priority: 6,
            description: "Direct Stream (Protocol Unknown)",
            supported: true,
        },
        StreamProtocol::Unknown => ProtocolInfo {
            protocol,
            priority: 7,
            description: "Unknown Protocol",
            supported: false,
        },
    }
}

/// Classify a URL by its syntax alone. Total over all inputs: empty or
/// garbage strings come back as `Unknown`, never an error.
pub fn detect(url: &str) -> StreamProtocol {
    let url = url.trim();
    if url.is_empty() {
        return StreamProtocol::Unknown;
    }
    let lower = url.to_ascii_lowercase();

    if ends_with_ext(&lower, ".m3u8") || lower.contains("/hls/") || lower.contains("/live/") {
        return StreamProtocol::Hls;
    }
    if ends_with_ext(&lower, ".flv") || lower.contains("/flv/") {
        return StreamProtocol::Flv;
    }
    if lower.starts_with("rtmp://") || lower.starts_with("rtmps://") {
        return StreamProtocol::Rtmp;
    }
    if ends_with_ext(&lower, ".mpd") || lower.contains("/dash/") {
        return StreamProtocol::Dash;
    }
    if lower.starts_with("webrtc:") || lower.contains("/webrtc/") {
        return StreamProtocol::Webrtc;
    }
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return StreamProtocol::Direct;
    }

    StreamProtocol::Unknown
}

/// True when the URL path ends with `ext`, ignoring any `?query` tail.
fn ends_with_ext(lower: &str, ext: &str) -> bool {
    let path = lower.split('?').next().unwrap_or(lower);
    path.ends_with(ext)
}

/// Publish URLs the restreaming service exposes for a channel. Slots are
/// `None` only when they could not be synthesized either.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishUrls {
    pub hls: Option<String>,
    pub flv: Option<String>,
    pub rtmp: Option<String>,
}

/// Derived view of a channel's stream URLs. Recomputed from the raw fields
/// whenever it is needed; identical inputs always produce identical output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamUrlAnalysis {
    pub original_url: String,
    pub detected_protocol: StreamProtocol,
    pub publish_urls: PublishUrls,
    /// Playback order: whichever restream transcodes are actually configured
    /// first, then `direct` as the guaranteed fallback, then the detected
    /// protocol of the raw URL if it adds anything new. Deliberately NOT the
    /// same ordering as the static `protocol_info` table.
    pub priority: Vec<StreamProtocol>,
    pub is_restream: bool,
}

/// One playable URL for a channel, tagged with the static priority number
/// (1=hls, 2=flv, 3=rtmp, 4=raw/direct).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamCandidate {
    pub url: String,
    pub protocol: StreamProtocol,
    pub priority: u8,
}

/// Synthesize publish URLs from the raw stream URL when the channel record
/// does not carry explicit ones. The restreamer publishes next to the
/// source directory, with `/live/` swapped for `/publish/`.
pub fn generate_publish_urls(stream_url: &str, stream_name: &str) -> PublishUrls {
    if stream_url.trim().is_empty() || stream_name.trim().is_empty() {
        return PublishUrls::default();
    }

    let parts: Vec<&str> = stream_url.split('/').collect();
    let base: String = parts[..parts.len().saturating_sub(1)].join("/");
    let publish_base = base.replacen("/live/", "/publish/", 1);
    let host = parts.get(2).copied().unwrap_or("");

    PublishUrls {
        hls: Some(format!("{}/{}.m3u8", publish_base, stream_name)),
        flv: Some(format!("{}/{}.flv", publish_base, stream_name)),
        rtmp: Some(format!("rtmp://{}/live/{}", host, stream_name)),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    match value {
        Some(s) if !s.trim().is_empty() => Some(s.to_string()),
        _ => None,
    }
}

/// Analyze a channel's raw stream fields into an ordered playback plan.
///
/// Explicit publish URLs always win over synthesized ones, but only
/// explicit (non-empty) ones count as "configured" when building the
/// priority list. The raw URL is appended as `direct` unconditionally so
/// the list is never empty.
pub fn analyze(
    stream_url: &str,
    stream_name: &str,
    restream: RestreamMode,
    publish_url: Option<&str>,
    publish_url_rtmp: Option<&str>,
    publish_url_flv: Option<&str>,
) -> StreamUrlAnalysis {
    let detected_protocol = detect(stream_url);
    let is_restream = restream != RestreamMode::Direct;

    let generated = generate_publish_urls(stream_url, stream_name);
    let publish_urls = PublishUrls {
        hls: non_empty(publish_url).or(generated.hls),
        flv: non_empty(publish_url_flv).or(generated.flv),
        rtmp: non_empty(publish_url_rtmp).or(generated.rtmp),
    };

    let mut priority = Vec::new();
    if non_empty(publish_url).is_some() {
        priority.push(StreamProtocol::Hls);
    }
    if non_empty(publish_url_flv).is_some() {
        priority.push(StreamProtocol::Flv);
    }
    if non_empty(publish_url_rtmp).is_some() {
        priority.push(StreamProtocol::Rtmp);
    }
    priority.push(StreamProtocol::Direct);
    if detected_protocol != StreamProtocol::Unknown && !priority.contains(&detected_protocol) {
        priority.push(detected_protocol);
    }

    StreamUrlAnalysis {
        original_url: stream_url.to_string(),
        detected_protocol,
        publish_urls,
        priority,
        is_restream,
    }
}

fn slot_url(analysis: &StreamUrlAnalysis, protocol: StreamProtocol) -> Option<&str> {
    let slot = match protocol {
        StreamProtocol::Hls => analysis.publish_urls.hls.as_deref(),
        StreamProtocol::Flv => analysis.publish_urls.flv.as_deref(),
        StreamProtocol::Rtmp => analysis.publish_urls.rtmp.as_deref(),
        _ => None,
    };
    slot.filter(|s| !s.trim().is_empty())
}

/// Walk the analysis priority list and return the first protocol whose URL
/// slot is populated. The unconditional `direct` entry guarantees this
/// always yields a non-empty URL.
pub fn best_candidate(analysis: &StreamUrlAnalysis) -> (String, StreamProtocol) {
    for protocol in &analysis.priority {
        match protocol {
            StreamProtocol::Hls | StreamProtocol::Flv | StreamProtocol::Rtmp => {
                if let Some(url) = slot_url(analysis, *protocol) {
                    return (url.to_string(), *protocol);
                }
            }
            StreamProtocol::Direct => {
                return (analysis.original_url.clone(), analysis.detected_protocol);
            }
            _ => {}
        }
    }
    (analysis.original_url.clone(), analysis.detected_protocol)
}

/// Every playable URL the channel has, in static priority order. This is
/// the enumeration view for the UI and the playback fallback pool; its
/// ordering is fixed per protocol and may disagree with
/// `StreamUrlAnalysis::priority` for the same channel. Both orderings are
/// kept on purpose.
pub fn all_candidates(analysis: &StreamUrlAnalysis) -> Vec<StreamCandidate> {
    let mut candidates = Vec::new();

    if let Some(url) = slot_url(analysis, StreamProtocol::Hls) {
        candidates.push(StreamCandidate {
            url: url.to_string(),
            protocol: StreamProtocol::Hls,
            priority: 1,
        });
    }
    if let Some(url) = slot_url(analysis, StreamProtocol::Flv) {
        candidates.push(StreamCandidate {
            url: url.to_string(),
            protocol: StreamProtocol::Flv,
            priority: 2,
        });
    }
    if let Some(url) = slot_url(analysis, StreamProtocol::Rtmp) {
        candidates.push(StreamCandidate {
            url: url.to_string(),
            protocol: StreamProtocol::Rtmp,
            priority: 3,
        });
    }

    // The raw URL is always playable as a last resort.
    candidates.push(StreamCandidate {
        url: analysis.original_url.clone(),
        protocol: analysis.detected_protocol,
        priority: 4,
    });

    candidates.sort_by_key(|c| c.priority);
    candidates
}
