//! Playback controller: candidate selection, fallback and bounded retry
//!
//! One `PlaybackController` per mounted player. It owns the decoder adapter
//! exclusively and is driven by `tick()` from the UI update loop; decoder
//! events arrive tagged with the attempt id that produced them, so anything
//! from a superseded attach is discarded before it can touch state.

#![allow(dead_code)]

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::channels::Channel;
use crate::decoder::{AttemptId, DecoderAdapter, DecoderEvent, HlsEngineState};
use crate::protocol::{StreamCandidate, StreamProtocol};

/// Consecutive failures before auto-retry stops and the operator has to act.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 3;
/// Delay before advancing after a fatal decoder error.
pub const DECODER_RETRY_DELAY: Duration = Duration::from_secs(2);
/// Delay before advancing after an invalid-URL short circuit.
pub const INVALID_URL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Known-good streams tried once every channel candidate has failed.
pub struct TestStream {
    pub url: &'static str,
    pub protocol: StreamProtocol,
    pub name: &'static str,
}

pub const TEST_STREAMS: &[TestStream] = &[
    TestStream {
        url: "https://demo.unified-streaming.com/k8s/features/stable/video/tears-of-steel/tears-of-steel.ism/.m3u8",
        protocol: StreamProtocol::Hls,
        name: "Test HLS Stream (Tears of Steel)",
    },
    TestStream {
        url: "https://bitdash-a.akamaihd.net/content/sintel/hls/playlist.m3u8",
        protocol: StreamProtocol::Hls,
        name: "Test HLS Stream (Sintel)",
    },
    TestStream {
        url: "https://commondatastorage.googleapis.com/gtv-videos-bucket/sample/BigBuckBunny.mp4",
        protocol: StreamProtocol::Direct,
        name: "Test MP4 Stream (Big Buck Bunny)",
    },
];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlaybackError {
    #[error("Invalid stream URL")]
    InvalidCandidate,
    #[error("Video error (code {code}): {message}")]
    DecoderFatal { code: i32, message: String },
    #[error("Streaming engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("All streams failed to load")]
    PoolExhausted,
    #[error("Playback rejected: {0}")]
    PlaybackRejected(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackState {
    /// No channel selected, or session was reset.
    Idle,
    /// A candidate is chosen and will be attached on the next tick (unless
    /// a retry delay is still pending).
    Selecting,
    /// Attach in flight. `waiting_for_engine` means an HLS candidate is
    /// parked until the shared engine finishes loading.
    Attaching { waiting_for_engine: bool },
    Playing,
    Paused,
    /// Too many consecutive failures (or an unrecoverable one); auto-retry
    /// is off until the operator intervenes.
    Error(PlaybackError),
    /// Channel pool and test pool are both spent.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidatePool {
    Channel,
    Test,
}

/// Stateful playback session. All mutation happens in `tick()` and the
/// explicit operator methods; the decoder is torn down before every new
/// attach so at most one decoder instance is alive per session.
pub struct PlaybackController {
    adapter: Box<dyn DecoderAdapter>,
    channel: Option<Channel>,
    candidates: Vec<StreamCandidate>,
    pool: CandidatePool,
    index: usize,
    consecutive_errors: u32,
    loading: bool,
    /// Attempt id the controller currently honors events for. 0 = none.
    attempt: AttemptId,
    next_attempt: AttemptId,
    retry_at: Option<Instant>,
    state: PlaybackState,
    play_intent: bool,
    last_error: Option<PlaybackError>,
}

impl PlaybackController {
    pub fn new(adapter: Box<dyn DecoderAdapter>) -> Self {
        Self {
            adapter,
            channel: None,
            candidates: Vec::new(),
            pool: CandidatePool::Channel,
            index: 0,
            consecutive_errors: 0,
            loading: false,
            attempt: 0,
            next_attempt: 0,
            retry_at: None,
            state: PlaybackState::Idle,
            play_intent: false,
            last_error: None,
        }
    }

    // --- accessors ---------------------------------------------------------

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    pub fn last_error(&self) -> Option<&PlaybackError> {
        self.last_error.as_ref()
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn pool(&self) -> CandidatePool {
        self.pool
    }

    pub fn candidate_index(&self) -> usize {
        self.index
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn play_intent(&self) -> bool {
        self.play_intent
    }

    pub fn channel_candidates(&self) -> &[StreamCandidate] {
        &self.candidates
    }

    /// URL, protocol and display name of the candidate the session is on.
    pub fn current_candidate(&self) -> Option<(String, StreamProtocol, String)> {
        match self.pool {
            CandidatePool::Channel => self.candidates.get(self.index).map(|c| {
                (c.url.clone(), c.protocol, format!("#{} {}", self.index + 1, c.protocol.label()))
            }),
            CandidatePool::Test => TEST_STREAMS
                .get(self.index)
                .map(|t| (t.url.to_string(), t.protocol, t.name.to_string())),
        }
    }

    /// Candidates left in the active pool after the current one.
    pub fn remaining_in_pool(&self) -> usize {
        let len = match self.pool {
            CandidatePool::Channel => self.candidates.len(),
            CandidatePool::Test => TEST_STREAMS.len(),
        };
        len.saturating_sub(self.index + 1)
    }

    pub fn adapter_mut(&mut self) -> &mut dyn DecoderAdapter {
        self.adapter.as_mut()
    }

    // --- operator actions --------------------------------------------------

    /// Select a channel (or clear the session with `None`). Cancels any
    /// in-flight attach, resets the error counter and starts over on the
    /// channel pool.
    pub fn set_channel(&mut self, channel: Option<Channel>) {
        self.cancel_pending();
        self.adapter.detach();
        self.consecutive_errors = 0;
        self.pool = CandidatePool::Channel;
        self.index = 0;
        self.last_error = None;

        match channel {
            Some(ch) => {
                log::info!("channel selected: {}", ch.channel_name);
                self.candidates = ch.candidates();
                self.channel = Some(ch);
                self.state = PlaybackState::Selecting;
            }
            None => {
                self.candidates.clear();
                self.channel = None;
                self.play_intent = false;
                self.state = PlaybackState::Idle;
            }
        }
    }

    /// Manual "try next stream". Fresh error counter, immediate advance.
    pub fn try_next(&mut self) {
        self.cancel_pending();
        self.consecutive_errors = 0;
        self.last_error = None;
        self.advance_candidate();
    }

    /// Switch to the built-in test pool from the top.
    pub fn use_test_streams(&mut self) {
        self.cancel_pending();
        log::info!("switching to test streams");
        self.consecutive_errors = 0;
        self.last_error = None;
        self.pool = CandidatePool::Test;
        self.index = 0;
        self.state = PlaybackState::Selecting;
    }

    /// Switch back to the channel pool from the top. No-op when the channel
    /// has no candidates to go back to.
    pub fn use_channel_streams(&mut self) {
        if self.candidates.is_empty() {
            return;
        }
        self.cancel_pending();
        log::info!("switching back to channel streams");
        self.consecutive_errors = 0;
        self.last_error = None;
        self.pool = CandidatePool::Channel;
        self.index = 0;
        self.state = PlaybackState::Selecting;
    }

    /// Full reset: cancel everything, tear down the decoder, back to an
    /// idle session on the channel pool. The candidate list stays loaded so
    /// the operator can immediately start over.
    pub fn reset(&mut self) {
        self.cancel_pending();
        self.adapter.detach();
        self.consecutive_errors = 0;
        self.pool = CandidatePool::Channel;
        self.index = 0;
        self.last_error = None;
        self.play_intent = false;
        self.state = PlaybackState::Idle;
    }

    /// Play/pause intent. Independent of the load/error machinery: while an
    /// attach or retry is pending the intent is remembered and applied once
    /// the decoder reports ready. Requesting play with nothing attached at
    /// all is an immediate error.
    pub fn set_play_intent(&mut self, play: bool) {
        if !play {
            self.play_intent = false;
            if self.state == PlaybackState::Playing {
                self.state = PlaybackState::Paused;
            }
            return;
        }

        match self.state {
            PlaybackState::Playing | PlaybackState::Paused => {
                self.play_intent = true;
                self.state = PlaybackState::Playing;
            }
            PlaybackState::Idle if !self.adapter.is_attached() => {
                self.last_error = Some(PlaybackError::PlaybackRejected(
                    "No video source available".to_string(),
                ));
                self.play_intent = false;
            }
            // Deferred until a playable state is reached
            _ => self.play_intent = true,
        }
    }

    // --- driving -----------------------------------------------------------

    /// Advance the session. Call once per UI frame with the current time.
    pub fn tick(&mut self, now: Instant) {
        self.drain_decoder_events(now);

        if let Some(deadline) = self.retry_at {
            if now >= deadline {
                self.retry_at = None;
                self.advance_candidate();
            }
        }

        if self.state == (PlaybackState::Attaching { waiting_for_engine: true }) {
            match self.adapter.hls_engine_state() {
                HlsEngineState::Ready => self.do_attach(),
                HlsEngineState::Failed(reason) => {
                    // Unrecoverable for this build; no auto-retry.
                    log::warn!("streaming engine failed to load: {}", reason);
                    let err = PlaybackError::EngineUnavailable(reason);
                    self.last_error = Some(err.clone());
                    self.loading = false;
                    self.state = PlaybackState::Error(err);
                }
                HlsEngineState::NotLoaded | HlsEngineState::Loading => {}
            }
            return;
        }

        if self.state == PlaybackState::Selecting && !self.loading && self.retry_at.is_none() {
            self.begin_attach(now);
        }
    }

    fn drain_decoder_events(&mut self, now: Instant) {
        for event in self.adapter.poll_events() {
            let tag = match &event {
                DecoderEvent::Ready(a)
                | DecoderEvent::Stalled(a)
                | DecoderEvent::Waiting(a) => *a,
                DecoderEvent::Error { attempt, .. } | DecoderEvent::Rejected { attempt, .. } => {
                    *attempt
                }
            };
            if tag != self.attempt || self.attempt == 0 {
                log::debug!("dropping stale decoder event from attempt {}", tag);
                continue;
            }

            match event {
                DecoderEvent::Ready(_) => {
                    log::debug!("decoder ready");
                    self.loading = false;
                    self.consecutive_errors = 0;
                    self.last_error = None;
                    self.state = if self.play_intent {
                        PlaybackState::Playing
                    } else {
                        PlaybackState::Paused
                    };
                }
                DecoderEvent::Error { code, message, .. } => {
                    log::warn!("decoder error {}: {}", code, message);
                    self.handle_failure_at(
                        now,
                        PlaybackError::DecoderFatal { code, message },
                        DECODER_RETRY_DELAY,
                    );
                }
                DecoderEvent::Rejected { reason, .. } => {
                    log::warn!("playback rejected: {}", reason);
                    self.last_error = Some(PlaybackError::PlaybackRejected(reason));
                    self.play_intent = false;
                    if self.state == PlaybackState::Playing {
                        self.state = PlaybackState::Paused;
                    }
                }
                DecoderEvent::Stalled(_) => log::debug!("decoder stalled"),
                DecoderEvent::Waiting(_) => log::debug!("decoder waiting for data"),
            }
        }
    }

    fn begin_attach(&mut self, now: Instant) {
        // Concurrency guard: one attach in flight per session, extra
        // requests are dropped rather than queued.
        if self.loading {
            return;
        }

        let candidate = match self.current_candidate() {
            Some(c) => c,
            None => {
                // Empty pool slot; treat like an invalid candidate.
                self.handle_failure_at(now, PlaybackError::InvalidCandidate, INVALID_URL_RETRY_DELAY);
                return;
            }
        };
        let (url, protocol, label) = candidate;

        if url.trim().is_empty() {
            log::warn!("empty stream URL for {}, skipping", label);
            self.handle_failure_at(now, PlaybackError::InvalidCandidate, INVALID_URL_RETRY_DELAY);
            return;
        }

        if protocol == StreamProtocol::Hls
            && self.adapter.hls_engine_state() != HlsEngineState::Ready
        {
            self.adapter.load_hls_engine();
            self.state = PlaybackState::Attaching { waiting_for_engine: true };
            return;
        }

        self.do_attach();
    }

    fn do_attach(&mut self) {
        let (url, protocol, label) = match self.current_candidate() {
            Some(c) => c,
            None => return,
        };

        // Tear down the previous decoder before creating a new one; the
        // adapter makes this idempotent.
        self.adapter.detach();

        self.next_attempt += 1;
        self.attempt = self.next_attempt;
        self.loading = true;
        self.state = PlaybackState::Attaching { waiting_for_engine: false };
        log::info!("loading stream: {} - {}", label, url);
        self.adapter.attach(&url, protocol, self.attempt);
    }

    fn handle_failure_at(&mut self, now: Instant, error: PlaybackError, delay: Duration) {
        self.loading = false;
        self.attempt = 0;
        self.consecutive_errors += 1;
        self.last_error = Some(error.clone());

        if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
            log::warn!("too many consecutive errors, stopping auto-retry");
            self.retry_at = None;
            self.state = PlaybackState::Error(error);
        } else {
            self.retry_at = Some(now + delay);
            self.state = PlaybackState::Selecting;
        }
    }

    /// Move to the next candidate: rest of the active pool first, then the
    /// test pool, then give up.
    fn advance_candidate(&mut self) {
        match self.pool {
            CandidatePool::Channel => {
                if self.index + 1 < self.candidates.len() {
                    self.index += 1;
                    self.state = PlaybackState::Selecting;
                } else {
                    log::info!("all channel streams failed, switching to test streams");
                    self.pool = CandidatePool::Test;
                    self.index = 0;
                    self.state = PlaybackState::Selecting;
                }
            }
            CandidatePool::Test => {
                if self.index + 1 < TEST_STREAMS.len() {
                    self.index += 1;
                    self.state = PlaybackState::Selecting;
                } else {
                    log::warn!("all streams failed");
                    self.last_error = Some(PlaybackError::PoolExhausted);
                    self.state = PlaybackState::Exhausted;
                }
            }
        }
    }

    /// Invalidate any outstanding attach and pending retry timer. A
    /// cancelled attach's eventual events no longer match `self.attempt`
    /// and are dropped on arrival.
    fn cancel_pending(&mut self) {
        self.retry_at = None;
        if self.loading {
            self.adapter.detach();
            self.loading = false;
        }
        self.attempt = 0;
    }

    // --- decoder passthrough ----------------------------------------------

    pub fn set_muted(&mut self, muted: bool) {
        self.adapter.set_muted(muted);
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.adapter.set_volume(volume);
    }

    pub fn request_fullscreen(&mut self) {
        self.adapter.request_fullscreen();
    }

    pub fn take_frame(&mut self) -> Option<crate::decoder::DecodedFrame> {
        self.adapter.take_frame()
    }
}
