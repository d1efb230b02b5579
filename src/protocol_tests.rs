//! Tests for protocol detection and stream candidate resolution

#[cfg(test)]
mod tests {
    use crate::channels::RestreamMode;
    use crate::protocol::*;

    #[test]
    fn test_detect_all_protocols() {
        assert_eq!(detect("https://cdn.example.com/chan/index.m3u8"), StreamProtocol::Hls);
        assert_eq!(detect("https://cdn.example.com/hls/chan/42.ts"), StreamProtocol::Hls);
        assert_eq!(detect("https://cdn.example.com/live/chan/42.ts"), StreamProtocol::Hls);
        assert_eq!(detect("https://cdn.example.com/chan.flv"), StreamProtocol::Flv);
        assert_eq!(detect("https://cdn.example.com/flv/chan"), StreamProtocol::Flv);
        assert_eq!(detect("rtmp://cdn.example.com/app/chan"), StreamProtocol::Rtmp);
        assert_eq!(detect("rtmps://cdn.example.com/app/chan"), StreamProtocol::Rtmp);
        assert_eq!(detect("https://cdn.example.com/chan.mpd"), StreamProtocol::Dash);
        assert_eq!(detect("https://cdn.example.com/dash/chan"), StreamProtocol::Dash);
        assert_eq!(detect("webrtc:example-session"), StreamProtocol::Webrtc);
        assert_eq!(detect("https://cdn.example.com/webrtc/chan"), StreamProtocol::Webrtc);
        assert_eq!(detect("https://cdn.example.com/movie.mp4"), StreamProtocol::Direct);
        assert_eq!(detect("http://cdn.example.com/movie.avi"), StreamProtocol::Direct);
        assert_eq!(detect("ftp://cdn.example.com/movie.mp4"), StreamProtocol::Unknown);
        assert_eq!(detect(""), StreamProtocol::Unknown);
        assert_eq!(detect("   "), StreamProtocol::Unknown);
    }

    #[test]
    fn test_detect_first_match_wins() {
        // An m3u8 inside an /flv/ path is still HLS: extension rules for HLS
        // run before the FLV path rules
        assert_eq!(detect("https://h/flv/playlist.m3u8"), StreamProtocol::Hls);
        // /live/ marks HLS even with an .flv extension
        assert_eq!(detect("https://h/live/chan.flv"), StreamProtocol::Hls);
        // rtmp:// URL with /live/ path is HLS by rule order
        assert_eq!(detect("rtmp://h/live/chan"), StreamProtocol::Hls);
    }

    #[test]
    fn test_detect_query_strings_and_case() {
        assert_eq!(detect("https://h/c.m3u8?token=abc&x=1"), StreamProtocol::Hls);
        assert_eq!(detect("https://h/c.M3U8"), StreamProtocol::Hls);
        assert_eq!(detect("RTMP://h/app/chan"), StreamProtocol::Rtmp);
        assert_eq!(detect("HTTPS://h/c.mp4"), StreamProtocol::Direct);
        assert_eq!(detect("  https://h/c.m3u8  "), StreamProtocol::Hls);
        // Extension hidden in the query does not count
        assert_eq!(detect("https://h/page?file=x.m3u8"), StreamProtocol::Direct);
    }

    #[test]
    fn test_analyze_with_explicit_publish_urls() {
        let analysis = analyze(
            "https://origin.example.com/live/chan1.ts",
            "chan1",
            RestreamMode::Always,
            Some("https://edge.example.com/publish/chan1.m3u8"),
            Some("rtmp://edge.example.com/live/chan1"),
            None,
        );

        assert!(analysis.is_restream);
        assert_eq!(analysis.detected_protocol, StreamProtocol::Hls);
        assert_eq!(
            analysis.priority,
            vec![StreamProtocol::Hls, StreamProtocol::Rtmp, StreamProtocol::Direct]
        );
        assert_eq!(
            analysis.publish_urls.hls.as_deref(),
            Some("https://edge.example.com/publish/chan1.m3u8")
        );
        assert_eq!(
            analysis.publish_urls.rtmp.as_deref(),
            Some("rtmp://edge.example.com/live/chan1")
        );
        // FLV slot falls back to the synthesized URL. The source path has no
        // directory under /live/, so the publish-base substitution is a no-op
        assert_eq!(
            analysis.publish_urls.flv.as_deref(),
            Some("https://origin.example.com/live/chan1.flv")
        );
    }

    #[test]
    fn test_analyze_bare_hls_url() {
        let analysis = analyze(
            "https://cdn.example.com/streams/chan.m3u8",
            "chan",
            RestreamMode::Direct,
            None,
            None,
            None,
        );

        assert!(!analysis.is_restream);
        // No explicit publish URLs configured, so playback order is the raw
        // URL first, then its detected protocol
        assert_eq!(
            analysis.priority,
            vec![StreamProtocol::Direct, StreamProtocol::Hls]
        );

        let (url, protocol) = best_candidate(&analysis);
        assert_eq!(url, "https://cdn.example.com/streams/chan.m3u8");
        assert_eq!(protocol, StreamProtocol::Hls);
    }

    #[test]
    fn test_analyze_blank_slots_not_configured() {
        // Whitespace-only publish URLs do not count as configured
        let analysis = analyze(
            "https://h/x.mp4",
            "x",
            RestreamMode::Direct,
            Some("   "),
            Some(""),
            None,
        );
        assert_eq!(analysis.priority, vec![StreamProtocol::Direct]);
    }

    #[test]
    fn test_analyze_is_deterministic() {
        let run = || {
            analyze(
                "https://h/live/a.ts",
                "a",
                RestreamMode::OnDemand,
                Some("https://h/pub/a.m3u8"),
                None,
                Some("https://h/pub/a.flv"),
            )
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_best_candidate_skips_empty_slots() {
        // HLS configured first in priority but its slot was emptied; FLV is
        // next in line
        let mut analysis = analyze(
            "https://h/x.mp4",
            "x",
            RestreamMode::Always,
            Some("https://h/pub/x.m3u8"),
            None,
            Some("https://h/pub/x.flv"),
        );
        analysis.publish_urls.hls = None;

        let (url, protocol) = best_candidate(&analysis);
        assert_eq!(url, "https://h/pub/x.flv");
        assert_eq!(protocol, StreamProtocol::Flv);
    }

    #[test]
    fn test_best_candidate_always_terminates_with_direct() {
        let analysis = analyze("https://h/x.webm", "", RestreamMode::Direct, None, None, None);
        let (url, protocol) = best_candidate(&analysis);
        assert_eq!(url, "https://h/x.webm");
        assert_eq!(protocol, StreamProtocol::Direct);
    }

    #[test]
    fn test_all_candidates_static_ordering() {
        let analysis = analyze(
            "https://h/live/x.ts",
            "x",
            RestreamMode::Always,
            Some("https://h/pub/x.m3u8"),
            Some("rtmp://h/live/x"),
            Some("https://h/pub/x.flv"),
        );

        let candidates = all_candidates(&analysis);
        assert_eq!(candidates.len(), 4);
        assert_eq!(candidates[0].protocol, StreamProtocol::Hls);
        assert_eq!(candidates[0].priority, 1);
        assert_eq!(candidates[1].protocol, StreamProtocol::Flv);
        assert_eq!(candidates[1].priority, 2);
        assert_eq!(candidates[2].protocol, StreamProtocol::Rtmp);
        assert_eq!(candidates[2].priority, 3);
        // Raw URL last, tagged with its detected protocol
        assert_eq!(candidates[3].url, "https://h/live/x.ts");
        assert_eq!(candidates[3].protocol, StreamProtocol::Hls);
        assert_eq!(candidates[3].priority, 4);
    }

    #[test]
    fn test_all_candidates_raw_url_always_present() {
        let analysis = analyze("https://h/x.mp4", "", RestreamMode::Direct, None, None, None);
        let candidates = all_candidates(&analysis);
        assert!(candidates.iter().any(|c| c.url == "https://h/x.mp4"));
        assert!(!candidates.is_empty());
    }

    #[test]
    fn test_two_orderings_can_disagree() {
        // Configured order puts FLV before HLS is impossible by construction,
        // but the raw-vs-publish ordering does diverge: playback order tries
        // the raw URL (direct) before the synthesized HLS slot, while the
        // enumeration view lists synthesized HLS first.
        let analysis = analyze(
            "https://h/live/x.ts",
            "x",
            RestreamMode::Direct,
            None,
            None,
            None,
        );

        assert_eq!(analysis.priority[0], StreamProtocol::Direct);
        let candidates = all_candidates(&analysis);
        assert_eq!(candidates[0].protocol, StreamProtocol::Hls);
        assert_ne!(candidates[0].url, analysis.original_url);
    }

    #[test]
    fn test_protocol_info_table() {
        assert_eq!(protocol_info(StreamProtocol::Hls).priority, 1);
        assert_eq!(protocol_info(StreamProtocol::Flv).priority, 2);
        assert_eq!(protocol_info(StreamProtocol::Rtmp).priority, 3);
        assert!(!protocol_info(StreamProtocol::Webrtc).supported);
        assert!(!protocol_info(StreamProtocol::Dash).supported);
        assert!(protocol_info(StreamProtocol::Direct).supported);
    }

    #[test]
    fn test_generate_publish_urls_requires_name() {
        assert_eq!(generate_publish_urls("https://h/live/x.ts", ""), PublishUrls::default());
        assert_eq!(generate_publish_urls("", "x"), PublishUrls::default());
    }
}
