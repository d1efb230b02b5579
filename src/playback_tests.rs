//! Tests for the playback controller's fallback and retry behavior

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::{Duration, Instant};

    use crate::channels::Channel;
    use crate::decoder::{
        AttemptId, DecodedFrame, DecoderAdapter, DecoderEvent, HlsEngineState,
    };
    use crate::playback::{
        CandidatePool, PlaybackController, PlaybackError, PlaybackState, TEST_STREAMS,
    };
    use crate::protocol::StreamProtocol;

    #[derive(Default)]
    struct FakeState {
        attaches: Vec<(String, StreamProtocol, AttemptId)>,
        detaches: u32,
        attached: bool,
        pending: Vec<DecoderEvent>,
        engine: Option<HlsEngineState>,
        engine_loads: u32,
    }

    struct FakeDecoder {
        state: Rc<RefCell<FakeState>>,
    }

    impl DecoderAdapter for FakeDecoder {
        fn attach(&mut self, url: &str, protocol: StreamProtocol, attempt: AttemptId) {
            let mut s = self.state.borrow_mut();
            s.attaches.push((url.to_string(), protocol, attempt));
            s.attached = true;
        }

        fn detach(&mut self) {
            let mut s = self.state.borrow_mut();
            if s.attached {
                s.detaches += 1;
            }
            s.attached = false;
        }

        fn is_attached(&self) -> bool {
            self.state.borrow().attached
        }

        fn poll_events(&mut self) -> Vec<DecoderEvent> {
            std::mem::take(&mut self.state.borrow_mut().pending)
        }

        fn take_frame(&mut self) -> Option<DecodedFrame> {
            None
        }

        fn set_muted(&mut self, _muted: bool) {}
        fn set_volume(&mut self, _volume: f32) {}
        fn request_fullscreen(&mut self) {}

        fn hls_engine_state(&self) -> HlsEngineState {
            self.state
                .borrow()
                .engine
                .clone()
                .unwrap_or(HlsEngineState::Ready)
        }

        fn load_hls_engine(&mut self) {
            let mut s = self.state.borrow_mut();
            s.engine_loads += 1;
            if s.engine == Some(HlsEngineState::NotLoaded) {
                s.engine = Some(HlsEngineState::Loading);
            }
        }
    }

    fn controller() -> (PlaybackController, Rc<RefCell<FakeState>>) {
        let state = Rc::new(RefCell::new(FakeState::default()));
        let adapter = FakeDecoder { state: Rc::clone(&state) };
        (PlaybackController::new(Box::new(adapter)), state)
    }

    /// Channel with two candidates when `publish_url` is set (HLS publish
    /// slot plus the raw URL), one otherwise.
    fn test_channel(stream_url: &str, publish_url: &str) -> Channel {
        serde_json::from_value(serde_json::json!({
            "id": "ch-1",
            "channel_name": "Test Channel",
            "stream_url": stream_url,
            "publish_url": publish_url,
        }))
        .unwrap()
    }

    fn push_event(state: &Rc<RefCell<FakeState>>, event: DecoderEvent) {
        state.borrow_mut().pending.push(event);
    }

    fn attach_count(state: &Rc<RefCell<FakeState>>) -> usize {
        state.borrow().attaches.len()
    }

    #[test]
    fn test_select_channel_attaches_first_candidate() {
        let (mut ctl, state) = controller();
        let t0 = Instant::now();

        ctl.set_channel(Some(test_channel("https://h/x.mp4", "https://h/pub/x.m3u8")));
        assert_eq!(*ctl.state(), PlaybackState::Selecting);

        ctl.tick(t0);
        assert_eq!(
            *ctl.state(),
            PlaybackState::Attaching { waiting_for_engine: false }
        );
        let s = state.borrow();
        assert_eq!(s.attaches.len(), 1);
        assert_eq!(s.attaches[0].0, "https://h/pub/x.m3u8");
        assert_eq!(s.attaches[0].1, StreamProtocol::Hls);
        assert_eq!(s.attaches[0].2, 1);
    }

    #[test]
    fn test_no_duplicate_attach_while_loading() {
        let (mut ctl, state) = controller();
        let t0 = Instant::now();

        ctl.set_channel(Some(test_channel("https://h/x.mp4", "")));
        ctl.tick(t0);
        ctl.tick(t0 + Duration::from_millis(16));
        ctl.tick(t0 + Duration::from_millis(32));
        assert_eq!(attach_count(&state), 1);
        assert!(ctl.is_loading());
    }

    #[test]
    fn test_ready_event_starts_playback() {
        let (mut ctl, state) = controller();
        let t0 = Instant::now();

        ctl.set_channel(Some(test_channel("https://h/x.mp4", "")));
        ctl.set_play_intent(true);
        ctl.tick(t0);

        push_event(&state, DecoderEvent::Ready(1));
        ctl.tick(t0 + Duration::from_millis(100));

        assert_eq!(*ctl.state(), PlaybackState::Playing);
        assert_eq!(ctl.consecutive_errors(), 0);
        assert!(ctl.last_error().is_none());
        assert!(!ctl.is_loading());
    }

    #[test]
    fn test_ready_without_play_intent_pauses() {
        let (mut ctl, state) = controller();
        let t0 = Instant::now();

        ctl.set_channel(Some(test_channel("https://h/x.mp4", "")));
        ctl.tick(t0);
        push_event(&state, DecoderEvent::Ready(1));
        ctl.tick(t0 + Duration::from_millis(100));

        assert_eq!(*ctl.state(), PlaybackState::Paused);

        ctl.set_play_intent(true);
        assert_eq!(*ctl.state(), PlaybackState::Playing);
        ctl.set_play_intent(false);
        assert_eq!(*ctl.state(), PlaybackState::Paused);
    }

    #[test]
    fn test_decoder_error_retries_after_two_seconds() {
        let (mut ctl, state) = controller();
        let t0 = Instant::now();

        ctl.set_channel(Some(test_channel("https://h/x.mp4", "https://h/pub/x.m3u8")));
        ctl.tick(t0);

        push_event(
            &state,
            DecoderEvent::Error { attempt: 1, code: 3, message: "decode failed".into() },
        );
        ctl.tick(t0);
        assert_eq!(ctl.consecutive_errors(), 1);
        assert_eq!(*ctl.state(), PlaybackState::Selecting);
        assert_eq!(attach_count(&state), 1);

        // Delay not elapsed yet
        ctl.tick(t0 + Duration::from_secs(1));
        assert_eq!(attach_count(&state), 1);

        // Deadline reached: advance to the raw URL and attach it
        ctl.tick(t0 + Duration::from_secs(2));
        assert_eq!(attach_count(&state), 2);
        let s = state.borrow();
        assert_eq!(s.attaches[1].0, "https://h/x.mp4");
        assert_eq!(s.attaches[1].2, 2);
    }

    #[test]
    fn test_invalid_url_short_circuit_uses_short_delay() {
        let (mut ctl, state) = controller();
        let t0 = Instant::now();

        // Empty stream URL: single candidate whose URL is blank
        ctl.set_channel(Some(test_channel("", "")));
        ctl.tick(t0);

        assert_eq!(attach_count(&state), 0);
        assert_eq!(ctl.consecutive_errors(), 1);
        assert_eq!(ctl.last_error(), Some(&PlaybackError::InvalidCandidate));

        ctl.tick(t0 + Duration::from_millis(500));
        assert_eq!(attach_count(&state), 0);

        // One second later the controller has moved on to the test pool
        ctl.tick(t0 + Duration::from_secs(1));
        assert_eq!(ctl.pool(), CandidatePool::Test);
        assert_eq!(attach_count(&state), 1);
        assert_eq!(state.borrow().attaches[0].0, TEST_STREAMS[0].url);
    }

    #[test]
    fn test_exhaustion_and_manual_recovery() {
        let (mut ctl, state) = controller();
        let mut now = Instant::now();
        let mut next_attempt = 0u64;

        // Two channel candidates, then the three test streams
        ctl.set_channel(Some(test_channel("https://h/x.mp4", "https://h/pub/x.m3u8")));

        let mut fail_current = |ctl: &mut PlaybackController, now: &mut Instant| {
            ctl.tick(*now);
            next_attempt += 1;
            push_event(
                &state,
                DecoderEvent::Error { attempt: next_attempt, code: 1, message: "open failed".into() },
            );
            ctl.tick(*now);
            *now += Duration::from_secs(2);
            ctl.tick(*now);
        };

        // Three straight failures stop auto-retry
        fail_current(&mut ctl, &mut now);
        fail_current(&mut ctl, &mut now);
        fail_current(&mut ctl, &mut now);

        assert_eq!(ctl.consecutive_errors(), 3);
        assert!(matches!(ctl.state(), PlaybackState::Error(_)));
        // Channel pool spent after two, third failure was the first test stream
        assert_eq!(ctl.pool(), CandidatePool::Test);
        assert_eq!(attach_count(&state), 3);

        // Stuck until the operator acts
        now += Duration::from_secs(30);
        ctl.tick(now);
        assert_eq!(attach_count(&state), 3);

        // Manual skip resets the counter and keeps going through the pool
        ctl.try_next();
        assert_eq!(ctl.consecutive_errors(), 0);
        fail_current(&mut ctl, &mut now);
        fail_current(&mut ctl, &mut now);

        // Both pools spent: five attach attempts total, terminal state
        assert_eq!(attach_count(&state), 5);
        assert_eq!(*ctl.state(), PlaybackState::Exhausted);
        assert_eq!(ctl.last_error(), Some(&PlaybackError::PoolExhausted));

        now += Duration::from_secs(60);
        ctl.tick(now);
        assert_eq!(attach_count(&state), 5);
    }

    #[test]
    fn test_stale_events_are_dropped() {
        let (mut ctl, state) = controller();
        let t0 = Instant::now();

        ctl.set_channel(Some(test_channel("https://h/x.mp4", "")));
        ctl.tick(t0);
        assert_eq!(attach_count(&state), 1);

        // Switch channels while attempt 1 is still in flight
        let mut other = test_channel("https://h/y.mp4", "");
        other.id = "ch-2".to_string();
        ctl.set_channel(Some(other));
        ctl.tick(t0 + Duration::from_millis(50));
        assert_eq!(attach_count(&state), 2);

        // The superseded attempt's Ready arrives late and must not count
        push_event(&state, DecoderEvent::Ready(1));
        ctl.tick(t0 + Duration::from_millis(100));
        assert_eq!(
            *ctl.state(),
            PlaybackState::Attaching { waiting_for_engine: false }
        );
        assert!(ctl.is_loading());

        // The current attempt's Ready does
        push_event(&state, DecoderEvent::Ready(2));
        ctl.tick(t0 + Duration::from_millis(150));
        assert_eq!(*ctl.state(), PlaybackState::Paused);
    }

    #[test]
    fn test_hls_waits_for_engine_load() {
        let (mut ctl, state) = controller();
        let t0 = Instant::now();
        state.borrow_mut().engine = Some(HlsEngineState::NotLoaded);

        ctl.set_channel(Some(test_channel("https://h/x.mp4", "https://h/pub/x.m3u8")));
        ctl.tick(t0);

        assert_eq!(
            *ctl.state(),
            PlaybackState::Attaching { waiting_for_engine: true }
        );
        assert_eq!(state.borrow().engine_loads, 1);
        assert_eq!(attach_count(&state), 0);

        // Still loading: nothing happens
        ctl.tick(t0 + Duration::from_millis(200));
        assert_eq!(attach_count(&state), 0);

        // Engine comes up, the parked candidate attaches
        state.borrow_mut().engine = Some(HlsEngineState::Ready);
        ctl.tick(t0 + Duration::from_millis(400));
        assert_eq!(attach_count(&state), 1);
        assert_eq!(state.borrow().attaches[0].1, StreamProtocol::Hls);
    }

    #[test]
    fn test_engine_failure_is_not_retried() {
        let (mut ctl, state) = controller();
        let t0 = Instant::now();
        state.borrow_mut().engine = Some(HlsEngineState::NotLoaded);

        ctl.set_channel(Some(test_channel("https://h/x.mp4", "https://h/pub/x.m3u8")));
        ctl.tick(t0);

        state.borrow_mut().engine = Some(HlsEngineState::Failed("no codec".into()));
        ctl.tick(t0 + Duration::from_millis(200));

        assert!(matches!(
            ctl.state(),
            PlaybackState::Error(PlaybackError::EngineUnavailable(_))
        ));
        // Engine failure is terminal, not a counted candidate failure
        assert_eq!(ctl.consecutive_errors(), 0);
        assert_eq!(attach_count(&state), 0);

        ctl.tick(t0 + Duration::from_secs(10));
        assert_eq!(attach_count(&state), 0);
    }

    #[test]
    fn test_play_with_no_source_is_rejected() {
        let (mut ctl, _state) = controller();

        ctl.set_play_intent(true);
        assert_eq!(*ctl.state(), PlaybackState::Idle);
        assert!(!ctl.play_intent());
        assert_eq!(
            ctl.last_error(),
            Some(&PlaybackError::PlaybackRejected(
                "No video source available".to_string()
            ))
        );
    }

    #[test]
    fn test_play_intent_deferred_during_attach() {
        let (mut ctl, state) = controller();
        let t0 = Instant::now();

        ctl.set_channel(Some(test_channel("https://h/x.mp4", "")));
        ctl.tick(t0);

        // Pressing play mid-load is remembered, not rejected
        ctl.set_play_intent(true);
        assert!(ctl.play_intent());
        assert!(ctl.last_error().is_none());

        push_event(&state, DecoderEvent::Ready(1));
        ctl.tick(t0 + Duration::from_millis(100));
        assert_eq!(*ctl.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_rejected_event_clears_play_intent() {
        let (mut ctl, state) = controller();
        let t0 = Instant::now();

        ctl.set_channel(Some(test_channel("https://h/x.mp4", "")));
        ctl.set_play_intent(true);
        ctl.tick(t0);
        push_event(&state, DecoderEvent::Ready(1));
        ctl.tick(t0 + Duration::from_millis(50));
        assert_eq!(*ctl.state(), PlaybackState::Playing);

        push_event(
            &state,
            DecoderEvent::Rejected { attempt: 1, reason: "output busy".into() },
        );
        ctl.tick(t0 + Duration::from_millis(100));

        assert_eq!(*ctl.state(), PlaybackState::Paused);
        assert!(!ctl.play_intent());
        assert!(matches!(
            ctl.last_error(),
            Some(PlaybackError::PlaybackRejected(_))
        ));
    }

    #[test]
    fn test_manual_pool_switches() {
        let (mut ctl, state) = controller();
        let t0 = Instant::now();

        ctl.set_channel(Some(test_channel("https://h/x.mp4", "https://h/pub/x.m3u8")));
        ctl.tick(t0);

        ctl.use_test_streams();
        assert_eq!(ctl.pool(), CandidatePool::Test);
        assert_eq!(ctl.candidate_index(), 0);
        assert_eq!(ctl.consecutive_errors(), 0);

        ctl.tick(t0 + Duration::from_millis(50));
        assert_eq!(attach_count(&state), 2);
        assert_eq!(state.borrow().attaches[1].0, TEST_STREAMS[0].url);

        ctl.use_channel_streams();
        assert_eq!(ctl.pool(), CandidatePool::Channel);
        assert_eq!(ctl.candidate_index(), 0);
        ctl.tick(t0 + Duration::from_millis(100));
        assert_eq!(attach_count(&state), 3);
        assert_eq!(state.borrow().attaches[2].0, "https://h/pub/x.m3u8");
    }

    #[test]
    fn test_use_channel_streams_noop_without_candidates() {
        let (mut ctl, _state) = controller();
        ctl.use_test_streams();
        assert_eq!(ctl.pool(), CandidatePool::Test);

        // No channel loaded, so there is nothing to go back to
        ctl.use_channel_streams();
        assert_eq!(ctl.pool(), CandidatePool::Test);
    }

    #[test]
    fn test_reset_keeps_candidates_but_goes_idle() {
        let (mut ctl, state) = controller();
        let t0 = Instant::now();

        ctl.set_channel(Some(test_channel("https://h/x.mp4", "https://h/pub/x.m3u8")));
        ctl.set_play_intent(true);
        ctl.tick(t0);

        ctl.reset();
        assert_eq!(*ctl.state(), PlaybackState::Idle);
        assert!(!ctl.play_intent());
        assert_eq!(ctl.consecutive_errors(), 0);
        assert!(!state.borrow().attached);
        // The candidate list survives so playback can restart immediately
        assert_eq!(ctl.channel_candidates().len(), 2);
    }

    #[test]
    fn test_detach_before_every_attach() {
        let (mut ctl, state) = controller();
        let t0 = Instant::now();

        ctl.set_channel(Some(test_channel("https://h/x.mp4", "https://h/pub/x.m3u8")));
        ctl.tick(t0);
        push_event(
            &state,
            DecoderEvent::Error { attempt: 1, code: 2, message: "no video stream".into() },
        );
        ctl.tick(t0);
        ctl.tick(t0 + Duration::from_secs(2));

        let s = state.borrow();
        assert_eq!(s.attaches.len(), 2);
        // The failed decoder was torn down before the second attach
        assert!(s.detaches >= 1);
        assert!(s.attached);
    }
}
