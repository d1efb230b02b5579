// Decoder adapter for the playback controller.
//
// Wraps either the ffmpeg-next based internal decoder (feature
// "internal-player") or a stub that reports every attach as failed. The
// controller drives whichever is compiled in through the DecoderAdapter
// trait and never touches the decode thread directly.
//
// To install FFmpeg development libraries:
// - Ubuntu/Debian: sudo apt install libavcodec-dev libavformat-dev libavutil-dev libswscale-dev
// - Fedora: sudo dnf install ffmpeg-devel
// - macOS: brew install ffmpeg

#![allow(dead_code)]

use crate::protocol::StreamProtocol;

/// Monotonically increasing id for attach attempts. Decoder events carry
/// the id of the attempt that produced them; the controller drops events
/// from superseded attempts.
pub type AttemptId = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum DecoderEvent {
    /// Decoder opened the stream and can produce frames.
    Ready(AttemptId),
    /// Fatal decoder error; the attempt is dead.
    Error {
        attempt: AttemptId,
        code: i32,
        message: String,
    },
    /// Decoder is alive but starved of data.
    Stalled(AttemptId),
    /// Decoder is buffering before it can (re)start.
    Waiting(AttemptId),
    /// A play request was refused (e.g. output device rejected it).
    Rejected { attempt: AttemptId, reason: String },
}

/// State of the process-wide adaptive-streaming engine. Loaded lazily at
/// most once; concurrent sessions observe the same load.
#[derive(Debug, Clone, PartialEq)]
pub enum HlsEngineState {
    NotLoaded,
    Loading,
    Ready,
    Failed(String),
}

/// Decoded video frame for rendering
#[derive(Clone)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>, // RGB24 data
    pub pts: i64,
}

/// The seam between the playback controller and whatever actually decodes.
///
/// `attach` is asynchronous: it returns immediately and the outcome arrives
/// through `poll_events`, tagged with the attempt id. `detach` is idempotent.
pub trait DecoderAdapter {
    fn attach(&mut self, url: &str, protocol: StreamProtocol, attempt: AttemptId);
    fn detach(&mut self);
    fn is_attached(&self) -> bool;
    fn poll_events(&mut self) -> Vec<DecoderEvent>;
    fn take_frame(&mut self) -> Option<DecodedFrame>;
    fn set_muted(&mut self, muted: bool);
    fn set_volume(&mut self, volume: f32);
    fn request_fullscreen(&mut self);
    /// Current state of the shared segmented-streaming engine.
    fn hls_engine_state(&self) -> HlsEngineState;
    /// Kick off the engine load if it has not started yet.
    fn load_hls_engine(&mut self);
}

/// Pick the decoder implementation compiled into this build.
pub fn default_adapter() -> Box<dyn DecoderAdapter> {
    Box::new(player_impl::InternalDecoder::new())
}

#[cfg(feature = "internal-player")]
mod player_impl {
    use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    extern crate ffmpeg_next as ffmpeg;
    use ffmpeg::format::Pixel;
    use ffmpeg::media::Type;
    use ffmpeg::software::scaling::{context::Context as ScalingContext, flag::Flags};
    use ffmpeg::util::frame::video::Video as VideoFrame;

    use super::{AttemptId, DecodedFrame, DecoderAdapter, DecoderEvent, HlsEngineState};
    use crate::protocol::StreamProtocol;

    static HLS_ENGINE: Mutex<HlsEngineState> = Mutex::new(HlsEngineState::NotLoaded);

    fn engine_state() -> HlsEngineState {
        HLS_ENGINE.lock().unwrap().clone()
    }

    fn load_engine() {
        {
            let mut state = HLS_ENGINE.lock().unwrap();
            if *state != HlsEngineState::NotLoaded {
                return;
            }
            *state = HlsEngineState::Loading;
        }
        thread::spawn(|| {
            log::debug!("loading segmented-streaming engine");
            let result = match ffmpeg::init() {
                Ok(()) => HlsEngineState::Ready,
                Err(e) => HlsEngineState::Failed(e.to_string()),
            };
            *HLS_ENGINE.lock().unwrap() = result;
        });
    }

    enum DecodeCommand {
        Stop,
    }

    /// Internal video decoder. One decode thread per attached stream; the
    /// thread reports back over an mpsc channel with events tagged by the
    /// attempt that spawned it, so stale threads cannot corrupt a newer
    /// session.
    pub struct InternalDecoder {
        command_sender: Option<Sender<DecodeCommand>>,
        event_receiver: Option<Receiver<DecoderEvent>>,
        current_frame: Arc<Mutex<Option<DecodedFrame>>>,
        attached: bool,
        volume: f32,
        muted: bool,
    }

    impl InternalDecoder {
        pub fn new() -> Self {
            // Idempotent; the engine load path calls it again for HLS.
            ffmpeg::init().ok();

            Self {
                command_sender: None,
                event_receiver: None,
                current_frame: Arc::new(Mutex::new(None)),
                attached: false,
                volume: 1.0,
                muted: false,
            }
        }

        fn decode_thread(
            url: String,
            protocol: StreamProtocol,
            attempt: AttemptId,
            current_frame: Arc<Mutex<Option<DecodedFrame>>>,
            cmd_rx: Receiver<DecodeCommand>,
            event_tx: Sender<DecoderEvent>,
        ) {
            let mut options = ffmpeg::Dictionary::new();
            options.set("reconnect", "1");
            options.set("reconnect_streamed", "1");
            options.set("reconnect_delay_max", "5");
            options.set("timeout", "5000000"); // 5 second timeout
            if protocol == StreamProtocol::Rtmp {
                options.set("rtmp_live", "live");
            }

            let mut ictx = match ffmpeg::format::input_with_dictionary(&url, options) {
                Ok(ctx) => ctx,
                Err(e) => {
                    let _ = event_tx.send(DecoderEvent::Error {
                        attempt,
                        code: 1,
                        message: format!("Failed to open stream: {}", e),
                    });
                    return;
                }
            };

            let video_stream_index = match ictx.streams().best(Type::Video) {
                Some(stream) => stream.index(),
                None => {
                    let _ = event_tx.send(DecoderEvent::Error {
                        attempt,
                        code: 2,
                        message: "No video stream found".to_string(),
                    });
                    return;
                }
            };

            let parameters = ictx.stream(video_stream_index).map(|s| s.parameters());
            let context_decoder = match parameters
                .ok_or_else(|| "video stream vanished".to_string())
                .and_then(|p| {
                    ffmpeg::codec::context::Context::from_parameters(p).map_err(|e| e.to_string())
                }) {
                Ok(ctx) => ctx,
                Err(e) => {
                    let _ = event_tx.send(DecoderEvent::Error {
                        attempt,
                        code: 3,
                        message: format!("Failed to read stream parameters: {}", e),
                    });
                    return;
                }
            };

            let mut decoder = match context_decoder.decoder().video() {
                Ok(d) => d,
                Err(e) => {
                    let _ = event_tx.send(DecoderEvent::Error {
                        attempt,
                        code: 3,
                        message: format!("Failed to create decoder: {}", e),
                    });
                    return;
                }
            };

            let width = decoder.width();
            let height = decoder.height();

            // Scale down oversized sources for the UI texture
            let (target_width, target_height) = if width > 1280 || height > 720 {
                let scale = f64::min(1280.0 / width as f64, 720.0 / height as f64);
                ((width as f64 * scale) as u32, (height as f64 * scale) as u32)
            } else {
                (width, height)
            };

            let mut scaler = match ScalingContext::get(
                decoder.format(),
                width,
                height,
                Pixel::RGB24,
                target_width,
                target_height,
                Flags::BILINEAR,
            ) {
                Ok(s) => s,
                Err(e) => {
                    let _ = event_tx.send(DecoderEvent::Error {
                        attempt,
                        code: 4,
                        message: format!("Failed to create scaler: {}", e),
                    });
                    return;
                }
            };

            let _ = event_tx.send(DecoderEvent::Ready(attempt));

            let frame_duration = Duration::from_secs_f64(1.0 / 30.0);
            let mut last_frame_time = Instant::now();

            for (stream, packet) in ictx.packets() {
                match cmd_rx.try_recv() {
                    Ok(DecodeCommand::Stop) | Err(TryRecvError::Disconnected) => return,
                    Err(TryRecvError::Empty) => {}
                }

                if stream.index() != video_stream_index {
                    continue;
                }

                if decoder.send_packet(&packet).is_err() {
                    continue;
                }

                let mut decoded = VideoFrame::empty();
                while decoder.receive_frame(&mut decoded).is_ok() {
                    let mut rgb_frame = VideoFrame::empty();
                    if scaler.run(&decoded, &mut rgb_frame).is_ok() {
                        let data = rgb_frame.data(0);
                        let stride = rgb_frame.stride(0);

                        // Copy row by row, dropping the stride padding
                        let mut frame_data =
                            Vec::with_capacity((target_width * target_height * 3) as usize);
                        for y in 0..target_height as usize {
                            let row_start = y * stride;
                            let row_end = row_start + (target_width as usize * 3);
                            frame_data.extend_from_slice(&data[row_start..row_end]);
                        }

                        *current_frame.lock().unwrap() = Some(DecodedFrame {
                            width: target_width,
                            height: target_height,
                            data: frame_data,
                            pts: decoded.pts().unwrap_or(0),
                        });

                        // Don't outrun the UI
                        let elapsed = last_frame_time.elapsed();
                        if elapsed < frame_duration {
                            thread::sleep(frame_duration - elapsed);
                        }
                        last_frame_time = Instant::now();
                    }
                }
            }

            let _ = event_tx.send(DecoderEvent::Stalled(attempt));
        }
    }

    impl DecoderAdapter for InternalDecoder {
        fn attach(&mut self, url: &str, protocol: StreamProtocol, attempt: AttemptId) {
            self.detach();

            let (cmd_tx, cmd_rx) = channel();
            let (event_tx, event_rx) = channel();
            self.command_sender = Some(cmd_tx);
            self.event_receiver = Some(event_rx);
            self.attached = true;

            let url = url.to_string();
            let frame = Arc::clone(&self.current_frame);
            thread::spawn(move || {
                Self::decode_thread(url, protocol, attempt, frame, cmd_rx, event_tx);
            });
        }

        fn detach(&mut self) {
            if let Some(ref sender) = self.command_sender {
                let _ = sender.send(DecodeCommand::Stop);
            }
            self.command_sender = None;
            self.event_receiver = None;
            self.attached = false;
            *self.current_frame.lock().unwrap() = None;
        }

        fn is_attached(&self) -> bool {
            self.attached
        }

        fn poll_events(&mut self) -> Vec<DecoderEvent> {
            let mut events = Vec::new();
            if let Some(ref receiver) = self.event_receiver {
                loop {
                    match receiver.try_recv() {
                        Ok(event) => events.push(event),
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => {
                            self.event_receiver = None;
                            break;
                        }
                    }
                }
            }
            events
        }

        fn take_frame(&mut self) -> Option<DecodedFrame> {
            self.current_frame.lock().unwrap().take()
        }

        fn set_muted(&mut self, muted: bool) {
            self.muted = muted;
        }

        fn set_volume(&mut self, volume: f32) {
            self.volume = volume.clamp(0.0, 1.0);
        }

        fn request_fullscreen(&mut self) {}

        fn hls_engine_state(&self) -> HlsEngineState {
            engine_state()
        }

        fn load_hls_engine(&mut self) {
            load_engine();
        }
    }

    impl Drop for InternalDecoder {
        fn drop(&mut self) {
            self.detach();
        }
    }
}

// Stub implementation when internal-player feature is disabled. Every
// attach fails with a decoder error so the controller's fallback path still
// runs; the engine reports ready so HLS candidates are attempted at all.
#[cfg(not(feature = "internal-player"))]
mod player_impl {
    use super::{AttemptId, DecodedFrame, DecoderAdapter, DecoderEvent, HlsEngineState};
    use crate::protocol::StreamProtocol;

    pub struct InternalDecoder {
        pending: Vec<DecoderEvent>,
        attached: bool,
        volume: f32,
        muted: bool,
    }

    impl InternalDecoder {
        pub fn new() -> Self {
            Self {
                pending: Vec::new(),
                attached: false,
                volume: 1.0,
                muted: false,
            }
        }
    }

    impl DecoderAdapter for InternalDecoder {
        fn attach(&mut self, _url: &str, _protocol: StreamProtocol, attempt: AttemptId) {
            self.attached = true;
            self.pending.push(DecoderEvent::Error {
                attempt,
                code: -1,
                message: "Internal player not enabled. Build with --features internal-player"
                    .to_string(),
            });
        }

        fn detach(&mut self) {
            self.attached = false;
            self.pending.clear();
        }

        fn is_attached(&self) -> bool {
            self.attached
        }

        fn poll_events(&mut self) -> Vec<DecoderEvent> {
            std::mem::take(&mut self.pending)
        }

        fn take_frame(&mut self) -> Option<DecodedFrame> {
            None
        }

        fn set_muted(&mut self, muted: bool) {
            self.muted = muted;
        }

        fn set_volume(&mut self, volume: f32) {
            self.volume = volume.clamp(0.0, 1.0);
        }

        fn request_fullscreen(&mut self) {}

        fn hls_engine_state(&self) -> HlsEngineState {
            HlsEngineState::Ready
        }

        fn load_hls_engine(&mut self) {}
    }
}
