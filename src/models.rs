//! UI data models for the dashboard

#![allow(dead_code)]

/// UI Tab selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Client,
    Panel,
    Console,
}

impl Tab {
    pub fn label(&self) -> &'static str {
        match self {
            Tab::Client => "Watch",
            Tab::Panel => "Panel",
            Tab::Console => "Console",
        }
    }
}

/// Aggregate numbers for the panel's stat tiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PanelStats {
    pub total_channels: usize,
    pub live_channels: usize,
    pub total_viewers: u64,
    pub groups: usize,
}

impl PanelStats {
    pub fn compute(channels: &[crate::channels::Channel]) -> Self {
        let mut groups: Vec<&str> = channels.iter().map(|c| c.group_title.as_str()).collect();
        groups.sort_unstable();
        groups.dedup();

        Self {
            total_channels: channels.len(),
            live_channels: channels.iter().filter(|c| c.is_live).count(),
            total_viewers: channels.iter().map(|c| c.clients_count as u64).sum(),
            groups: groups.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::fallback_channels;

    #[test]
    fn test_panel_stats() {
        let mut channels = fallback_channels();
        channels[0].clients_count = 7;
        channels[1].is_live = false;

        let stats = PanelStats::compute(&channels);
        assert_eq!(stats.total_channels, 5);
        assert_eq!(stats.live_channels, 4);
        assert_eq!(stats.total_viewers, 7);
        // Test Streams, News, International
        assert_eq!(stats.groups, 3);
    }
}
