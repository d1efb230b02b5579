//! XTV Dashboard - streaming channel dashboard and player
//! Watch view with automatic stream fallback, management panel backed by a
//! hosted channel store, and a console for session logs.

// Hide console window on Windows release builds
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

// Use mimalloc for faster memory allocation (Linux, macOS)
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use eframe::egui;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

mod auth;
mod channels;
mod config;
mod decoder;
mod models;
mod playback;
mod protocol;
mod store;

#[cfg(test)]
mod playback_tests;
#[cfg(test)]
mod protocol_tests;

use auth::SessionUser;
use channels::{apply_event, Channel, ChannelEvent};
use config::AppConfig;
use models::{PanelStats, Tab};
use playback::{CandidatePool, PlaybackController, PlaybackState, MAX_CONSECUTIVE_ERRORS};
use store::{ChangeFeed, ChangeFeedHandle, StoreClient};

/// Case-insensitive substring check without allocation
fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() { return true; }
    if needle.len() > haystack.len() { return false; }

    haystack.as_bytes()
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}

fn timestamp_now() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

/// Background task messages
enum TaskResult {
    ChannelsLoaded(Vec<Channel>),
    LoginResult(Result<SessionUser, String>),
    StatusUpdated { id: String, is_live: bool, ok: bool },
    ChannelDeleted { id: String, ok: bool },
    Error(String),
}

fn main() -> Result<(), eframe::Error> {
    env_logger::init();

    // Force X11 backend on Linux before any windowing code runs
    #[cfg(target_os = "linux")]
    {
        std::env::set_var("WINIT_UNIX_BACKEND", "x11");
        std::env::remove_var("WAYLAND_DISPLAY");
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1250.0, 700.0])
            .with_min_inner_size([1000.0, 550.0]),
        vsync: true,
        hardware_acceleration: eframe::HardwareAcceleration::Preferred,
        ..Default::default()
    };

    eframe::run_native(
        "XTV Dashboard",
        options,
        Box::new(|cc| {
            cc.egui_ctx.set_visuals(egui::Visuals::dark());
            Ok(Box::new(DashboardApp::new()))
        }),
    )
}

struct DashboardApp {
    config: AppConfig,

    // Login fields
    username: String,
    password: String,
    login_error: String,
    logging_in: bool,
    session: Option<SessionUser>,

    // Store
    store: Option<StoreClient>,
    feed: Option<ChangeFeedHandle>,
    channels: Vec<Channel>,
    channels_loading: bool,

    // Playback
    controller: PlaybackController,
    selected_channel_id: Option<String>,
    video_texture: Option<egui::TextureHandle>,
    volume: f32,
    muted: bool,

    // UI state
    current_tab: Tab,
    search_query: String,
    show_live_only: bool,
    status_message: String,
    console_log: Vec<String>,

    // Background tasks
    task_receiver: Receiver<TaskResult>,
    task_sender: Sender<TaskResult>,
}

impl DashboardApp {
    fn new() -> Self {
        let config = AppConfig::load();
        let (task_sender, task_receiver) = channel();

        let store = if config.store_url.is_empty() {
            None
        } else {
            Some(StoreClient::new(&config.store_url, &config.store_api_key))
        };

        let mut controller = PlaybackController::new(decoder::default_adapter());
        controller.set_volume(config.volume);
        controller.set_muted(config.muted);

        let mut app = Self {
            username: config.saved_username.clone(),
            password: config.saved_password.clone(),
            login_error: String::new(),
            logging_in: false,
            session: None,
            store,
            feed: None,
            channels: Vec::new(),
            channels_loading: false,
            controller,
            selected_channel_id: None,
            video_texture: None,
            volume: config.volume,
            muted: config.muted,
            current_tab: Tab::Client,
            search_query: String::new(),
            show_live_only: false,
            status_message: String::new(),
            console_log: vec![format!("[{}] [INFO] XTV Dashboard started", timestamp_now())],
            task_receiver,
            task_sender,
            config,
        };

        if app.config.auto_login && !app.username.is_empty() && !app.password.is_empty() {
            app.start_login();
        }

        app
    }

    /// Add a message to the console log
    fn log(&mut self, message: &str) {
        self.console_log.push(format!("[{}] {}", timestamp_now(), message));
        // Keep log size limited
        if self.console_log.len() > 500 {
            self.console_log.remove(0);
        }
    }

    // --- background tasks --------------------------------------------------

    fn start_login(&mut self) {
        if self.logging_in {
            return;
        }
        self.logging_in = true;
        self.login_error.clear();

        let store = self.store.clone();
        let username = self.username.clone();
        let password = self.password.clone();
        let sender = self.task_sender.clone();

        thread::spawn(move || {
            let result = auth::login(store.as_ref(), &username, &password);
            let _ = sender.send(TaskResult::LoginResult(result));
        });
    }

    fn load_channels(&mut self) {
        if self.channels_loading {
            return;
        }
        self.channels_loading = true;
        let sender = self.task_sender.clone();

        match self.store.clone() {
            Some(client) => {
                thread::spawn(move || {
                    let channels = client.fetch_channels();
                    let _ = sender.send(TaskResult::ChannelsLoaded(channels));
                });
            }
            None => {
                // No store configured; the built-in list is immediate
                let _ = sender.send(TaskResult::ChannelsLoaded(channels::fallback_channels()));
            }
        }
    }

    fn open_feed(&mut self) {
        if self.feed.is_some() {
            return;
        }
        if let Some(client) = self.store.clone() {
            let interval = Duration::from_secs(self.config.feed_poll_secs.max(1));
            self.feed = Some(ChangeFeed::open(client, interval));
            self.log("[INFO] Channel change feed opened");
        }
    }

    fn toggle_live(&mut self, id: String, is_live: bool) {
        let Some(client) = self.store.clone() else {
            self.log("[WARN] No store configured, status change is local only");
            if let Some(ch) = self.channels.iter_mut().find(|c| c.id == id) {
                ch.is_live = is_live;
            }
            return;
        };
        let sender = self.task_sender.clone();
        thread::spawn(move || {
            let ok = client.update_channel_status(&id, is_live, None);
            let _ = sender.send(TaskResult::StatusUpdated { id, is_live, ok });
        });
    }

    fn delete_channel(&mut self, id: String) {
        let Some(client) = self.store.clone() else {
            self.channels.retain(|c| c.id != id);
            return;
        };
        let sender = self.task_sender.clone();
        thread::spawn(move || {
            let ok = client.delete_channel(&id);
            let _ = sender.send(TaskResult::ChannelDeleted { id, ok });
        });
    }

    fn process_task_results(&mut self) {
        while let Ok(result) = self.task_receiver.try_recv() {
            match result {
                TaskResult::LoginResult(Ok(user)) => {
                    self.logging_in = false;
                    self.log(&format!(
                        "[INFO] Logged in as {} ({})",
                        user.username,
                        user.role.label()
                    ));
                    self.session = Some(user);

                    if self.config.save_state {
                        self.config.saved_username = self.username.clone();
                        self.config.saved_password = self.password.clone();
                        self.config.save();
                    }

                    self.load_channels();
                    self.open_feed();
                }
                TaskResult::LoginResult(Err(e)) => {
                    self.logging_in = false;
                    self.login_error = e.clone();
                    self.log(&format!("[WARN] Login failed: {}", e));
                }
                TaskResult::ChannelsLoaded(channels) => {
                    self.channels_loading = false;
                    self.log(&format!("[INFO] Loaded {} channels", channels.len()));
                    self.channels = channels;
                }
                TaskResult::StatusUpdated { id, is_live, ok } => {
                    if ok {
                        if let Some(ch) = self.channels.iter_mut().find(|c| c.id == id) {
                            ch.is_live = is_live;
                        }
                        self.log(&format!(
                            "[INFO] Channel {} is now {}",
                            id,
                            if is_live { "LIVE" } else { "OFFLINE" }
                        ));
                    } else {
                        self.log(&format!("[ERROR] Status update failed for {}", id));
                        self.status_message = "Status update failed".to_string();
                    }
                }
                TaskResult::ChannelDeleted { id, ok } => {
                    if ok {
                        self.channels.retain(|c| c.id != id);
                        self.log(&format!("[INFO] Channel {} deleted", id));
                    } else {
                        self.log(&format!("[ERROR] Delete failed for {}", id));
                    }
                }
                TaskResult::Error(e) => {
                    self.log(&format!("[ERROR] {}", e));
                    self.status_message = e;
                }
            }
        }
    }

    fn process_feed_events(&mut self) {
        let events: Vec<ChannelEvent> = match self.feed {
            Some(ref feed) => feed.poll(),
            None => return,
        };

        for event in events {
            match &event {
                ChannelEvent::Insert(ch) => {
                    self.log(&format!("[FEED] New channel: {}", ch.channel_name));
                }
                ChannelEvent::Update { new, old } => {
                    let was_live = old.as_ref().map(|o| o.is_live).unwrap_or(new.is_live);
                    if new.is_live != was_live {
                        self.log(&format!(
                            "[FEED] {} went {}",
                            new.channel_name,
                            if new.is_live { "LIVE" } else { "OFFLINE" }
                        ));
                    }
                }
                ChannelEvent::Delete(ch) => {
                    self.log(&format!("[FEED] Channel removed: {}", ch.channel_name));
                    if self.selected_channel_id.as_deref() == Some(ch.id.as_str()) {
                        self.selected_channel_id = None;
                        self.controller.set_channel(None);
                    }
                }
            }
            apply_event(&mut self.channels, &event);
        }
    }

    // --- playback ----------------------------------------------------------

    fn select_channel(&mut self, channel: Channel) {
        self.log(&format!("[INFO] Watching: {}", channel.channel_name));
        self.selected_channel_id = Some(channel.id.clone());
        self.video_texture = None;
        self.controller.set_channel(Some(channel));
        self.controller.set_play_intent(true);
    }

    fn logout(&mut self) {
        self.log("[INFO] Logged out");
        self.session = None;
        self.controller.set_channel(None);
        self.selected_channel_id = None;
        self.video_texture = None;
        if let Some(feed) = self.feed.take() {
            feed.close();
        }
        self.channels.clear();
        if !self.config.save_state {
            self.password.clear();
        }
    }

    // --- views -------------------------------------------------------------

    fn show_login(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(120.0);
                ui.heading("XTV Dashboard");
                ui.label("Sign in to continue");
                ui.add_space(20.0);

                let mut submit = false;

                egui::Grid::new("login_grid")
                    .num_columns(2)
                    .spacing([10.0, 8.0])
                    .show(ui, |ui| {
                        ui.label("Username:");
                        let user_resp = ui.add(
                            egui::TextEdit::singleline(&mut self.username).desired_width(220.0),
                        );
                        ui.end_row();

                        ui.label("Password:");
                        let pass_resp = ui.add(
                            egui::TextEdit::singleline(&mut self.password)
                                .password(true)
                                .desired_width(220.0),
                        );
                        ui.end_row();

                        submit = (user_resp.lost_focus() || pass_resp.lost_focus())
                            && ui.input(|i| i.key_pressed(egui::Key::Enter));
                    });

                ui.add_space(8.0);
                ui.checkbox(&mut self.config.save_state, "Remember me");
                ui.checkbox(&mut self.config.auto_login, "Sign in automatically");
                ui.add_space(10.0);

                if self.logging_in {
                    ui.spinner();
                    ui.label("Signing in...");
                } else if ui.button("Sign In").clicked() || submit {
                    self.start_login();
                }

                if !self.login_error.is_empty() {
                    ui.add_space(8.0);
                    ui.colored_label(egui::Color32::RED, &self.login_error);
                }
            });
        });
    }

    fn show_top_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("XTV");
                ui.separator();

                for tab in [Tab::Client, Tab::Panel, Tab::Console] {
                    // Panel is gated on a management role
                    if tab == Tab::Panel {
                        let can_manage = self
                            .session
                            .as_ref()
                            .map(|s| s.role.can_manage())
                            .unwrap_or(false);
                        if !can_manage {
                            continue;
                        }
                    }
                    if ui
                        .selectable_label(self.current_tab == tab, tab.label())
                        .clicked()
                    {
                        self.current_tab = tab;
                    }
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("Logout").clicked() {
                        self.logout();
                    }
                    if let Some(ref session) = self.session {
                        ui.label(format!("{} ({})", session.username, session.role.label()));
                    }
                });
            });
        });
    }

    fn show_client_view(&mut self, ctx: &egui::Context) {
        let mut pending_selection: Option<Channel> = None;

        egui::SidePanel::left("channel_list")
            .default_width(280.0)
            .show(ctx, |ui| {
                ui.add_space(4.0);
                ui.horizontal(|ui| {
                    ui.label("🔍");
                    ui.text_edit_singleline(&mut self.search_query);
                });
                ui.checkbox(&mut self.show_live_only, "Live only");
                ui.separator();

                if self.channels_loading {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label("Loading channels...");
                    });
                }

                egui::ScrollArea::vertical().show(ui, |ui| {
                    let mut last_group = String::new();
                    for ch in &self.channels {
                        if self.show_live_only && !ch.is_live {
                            continue;
                        }
                        if !self.search_query.is_empty()
                            && !contains_ignore_case(&ch.channel_name, &self.search_query)
                            && !contains_ignore_case(&ch.group_title, &self.search_query)
                        {
                            continue;
                        }

                        if ch.group_title != last_group {
                            last_group = ch.group_title.clone();
                            ui.add_space(6.0);
                            ui.label(
                                egui::RichText::new(&last_group)
                                    .small()
                                    .color(egui::Color32::GRAY),
                            );
                        }

                        let selected =
                            self.selected_channel_id.as_deref() == Some(ch.id.as_str());
                        let live_marker = if ch.is_live { "🔴 " } else { "" };
                        let label = format!("{}{}", live_marker, ch.channel_name);
                        if ui.selectable_label(selected, label).clicked() {
                            pending_selection = Some(ch.clone());
                        }
                    }
                });
            });

        if let Some(channel) = pending_selection {
            self.select_channel(channel);
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            self.show_player_pane(ctx, ui);
        });
    }

    fn show_player_pane(&mut self, ctx: &egui::Context, ui: &mut egui::Ui) {
        // Pull the newest decoded frame into a texture
        if let Some(frame) = self.controller.take_frame() {
            let image = egui::ColorImage::from_rgb(
                [frame.width as usize, frame.height as usize],
                &frame.data,
            );
            self.video_texture =
                Some(ctx.load_texture("video_frame", image, egui::TextureOptions::LINEAR));
        }

        let state = self.controller.state().clone();

        ui.vertical_centered(|ui| {
            if let Some(ref texture) = self.video_texture {
                let available = ui.available_size();
                let tex_size = texture.size_vec2();
                let aspect = tex_size.x / tex_size.y;

                let (width, height) = if available.x / available.y > aspect {
                    (available.y * aspect * 0.9, available.y * 0.9)
                } else {
                    (available.x * 0.9, available.x / aspect * 0.9)
                };

                ui.image((texture.id(), egui::vec2(width, height)));
            } else {
                ui.add_space(60.0);
                match &state {
                    PlaybackState::Idle => {
                        ui.label("Select a channel to start watching");
                    }
                    PlaybackState::Selecting | PlaybackState::Attaching { .. } => {
                        ui.spinner();
                        match self.controller.current_candidate() {
                            Some((_, _, label)) => {
                                ui.label(format!("Connecting: {}", label));
                            }
                            None => {
                                ui.label("Connecting...");
                            }
                        }
                        if matches!(state, PlaybackState::Attaching { waiting_for_engine: true })
                        {
                            ui.label("Preparing streaming engine...");
                        }
                    }
                    PlaybackState::Playing | PlaybackState::Paused => {
                        ui.spinner();
                        ui.label("Waiting for video...");
                    }
                    PlaybackState::Error(e) => {
                        ui.colored_label(egui::Color32::RED, format!("⚠ {}", e));
                    }
                    PlaybackState::Exhausted => {
                        ui.colored_label(
                            egui::Color32::RED,
                            "All streams failed to load. The channel may be offline.",
                        );
                    }
                }

                let errors = self.controller.consecutive_errors();
                if errors > 0 {
                    ui.add_space(6.0);
                    ui.colored_label(
                        egui::Color32::YELLOW,
                        format!("Retries: {}/{}", errors, MAX_CONSECUTIVE_ERRORS),
                    );
                }
                if let Some(err) = self.controller.last_error() {
                    if !matches!(state, PlaybackState::Error(_) | PlaybackState::Exhausted) {
                        ui.colored_label(egui::Color32::YELLOW, format!("Last error: {}", err));
                    }
                }
            }
        });

        // Manual recovery actions once auto-retry has given up (or any time
        // the operator wants to skip ahead)
        let stuck = matches!(state, PlaybackState::Error(_) | PlaybackState::Exhausted);
        if stuck || self.controller.consecutive_errors() > 0 {
            ui.add_space(6.0);
            ui.horizontal(|ui| {
                let remaining = self.controller.remaining_in_pool();
                if remaining > 0
                    && ui
                        .button(format!("Try Next Stream ({} remaining)", remaining))
                        .clicked()
                {
                    self.controller.try_next();
                }
                if self.controller.pool() == CandidatePool::Channel
                    && ui.button("Try Test Streams").clicked()
                {
                    self.controller.use_test_streams();
                }
                if self.controller.pool() == CandidatePool::Test
                    && !self.controller.channel_candidates().is_empty()
                    && ui.button("Back to Channel").clicked()
                {
                    self.controller.use_channel_streams();
                }
                if ui.button("Reset").clicked() {
                    self.controller.reset();
                    self.video_texture = None;
                }
            });
        }

        // Transport controls
        ui.separator();
        ui.horizontal(|ui| {
            let channel_name = self
                .controller
                .channel()
                .map(|c| c.channel_name.clone())
                .unwrap_or_default();
            ui.label(&channel_name);

            if self.controller.pool() == CandidatePool::Test {
                ui.label(
                    egui::RichText::new("TEST POOL")
                        .small()
                        .color(egui::Color32::YELLOW),
                );
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("⛶").on_hover_text("Fullscreen").clicked() {
                    self.controller.request_fullscreen();
                }

                let slider = ui.add(
                    egui::Slider::new(&mut self.volume, 0.0..=1.0)
                        .show_value(false)
                        .text("🔊"),
                );
                if slider.changed() {
                    self.controller.set_volume(self.volume);
                    self.config.volume = self.volume;
                    self.config.save();
                }

                let mute_icon = if self.muted { "🔇" } else { "🔈" };
                if ui.button(mute_icon).clicked() {
                    self.muted = !self.muted;
                    self.controller.set_muted(self.muted);
                    self.config.muted = self.muted;
                    self.config.save();
                }

                let playing = matches!(state, PlaybackState::Playing);
                let play_icon = if playing { "⏸" } else { "▶" };
                if ui.button(play_icon).clicked() {
                    self.controller.set_play_intent(!playing);
                }
            });
        });
    }

    fn show_panel_view(&mut self, ctx: &egui::Context) {
        let mut pending_toggle: Option<(String, bool)> = None;
        let mut pending_delete: Option<String> = None;

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Channel Management");
            ui.add_space(8.0);

            let stats = PanelStats::compute(&self.channels);
            ui.horizontal(|ui| {
                stat_tile(ui, "Channels", &stats.total_channels.to_string());
                stat_tile(ui, "Live", &stats.live_channels.to_string());
                stat_tile(ui, "Viewers", &stats.total_viewers.to_string());
                stat_tile(ui, "Groups", &stats.groups.to_string());
            });

            ui.add_space(10.0);
            ui.separator();

            egui::ScrollArea::vertical().show(ui, |ui| {
                egui::Grid::new("channel_table")
                    .num_columns(7)
                    .striped(true)
                    .spacing([14.0, 6.0])
                    .show(ui, |ui| {
                        ui.strong("Channel");
                        ui.strong("Group");
                        ui.strong("Level");
                        ui.strong("Restream");
                        ui.strong("Protocols");
                        ui.strong("Viewers");
                        ui.strong("");
                        ui.end_row();

                        for ch in &self.channels {
                            ui.label(&ch.channel_name);
                            ui.label(&ch.group_title);
                            ui.label(ch.level.label());
                            ui.label(ch.restream.label());

                            let protocols: Vec<&str> = ch
                                .candidates()
                                .iter()
                                .map(|c| c.protocol.label())
                                .collect();
                            ui.label(protocols.join(" / "));

                            ui.label(ch.clients_count.to_string());

                            ui.horizontal(|ui| {
                                let live_label = if ch.is_live { "Set Offline" } else { "Set Live" };
                                if ui.small_button(live_label).clicked() {
                                    pending_toggle = Some((ch.id.clone(), !ch.is_live));
                                }
                                if ui.small_button("🗑").on_hover_text("Delete").clicked() {
                                    pending_delete = Some(ch.id.clone());
                                }
                            });
                            ui.end_row();
                        }
                    });
            });
        });

        if let Some((id, is_live)) = pending_toggle {
            self.toggle_live(id, is_live);
        }
        if let Some(id) = pending_delete {
            self.delete_channel(id);
        }
    }

    fn show_console_view(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("Console");
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("Clear").clicked() {
                        self.console_log.clear();
                    }
                });
            });
            ui.separator();
            egui::ScrollArea::vertical()
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    for line in &self.console_log {
                        let color = if line.contains("[ERROR]") {
                            egui::Color32::RED
                        } else if line.contains("[WARN]") {
                            egui::Color32::YELLOW
                        } else {
                            ui.visuals().text_color()
                        };
                        ui.label(
                            egui::RichText::new(line).monospace().color(color).size(11.0),
                        );
                    }
                });
        });
    }
}

fn stat_tile(ui: &mut egui::Ui, label: &str, value: &str) {
    egui::Frame::group(ui.style()).show(ui, |ui| {
        ui.vertical(|ui| {
            ui.label(egui::RichText::new(value).heading());
            ui.label(egui::RichText::new(label).small().color(egui::Color32::GRAY));
        });
    });
}

impl eframe::App for DashboardApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_task_results();
        self.process_feed_events();
        self.controller.tick(Instant::now());

        if self.session.is_none() {
            self.show_login(ctx);
            if self.logging_in {
                ctx.request_repaint_after(Duration::from_millis(200));
            }
            return;
        }

        self.show_top_bar(ctx);
        match self.current_tab {
            Tab::Client => self.show_client_view(ctx),
            Tab::Panel => self.show_panel_view(ctx),
            Tab::Console => self.show_console_view(ctx),
        }

        // Continuous repaint while the decoder is producing frames or the
        // controller has pending work; idle views tick slowly for the feed
        match self.controller.state() {
            PlaybackState::Playing | PlaybackState::Selecting | PlaybackState::Attaching { .. } => {
                ctx.request_repaint_after(Duration::from_millis(16));
            }
            _ => {
                ctx.request_repaint_after(Duration::from_millis(500));
            }
        }
    }
}
