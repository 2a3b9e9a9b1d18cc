use eframe::egui;
use egui::{Color32, CornerRadius, RichText, ScrollArea, Stroke, Ui, ViewportBuilder};
use log::error;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

mod cooldown;
mod db;
mod explorer;
mod models;
mod quotes_client;
mod scheduler;

use crate::db::Database;
use crate::explorer::{Action, Explorer, ExplorerConfig};
use crate::models::{DisplayItem, Mode};
use crate::quotes_client::{FetchError, QuoteClient};
use crate::scheduler::{parse_delay, SchedulerState};

fn main() -> Result<(), eframe::Error> {
    env_logger::init();

    let options = eframe::NativeOptions {
        viewport: ViewportBuilder::default()
            .with_inner_size([1100.0, 780.0])
            .with_min_inner_size([720.0, 520.0])
            .with_title("Quote Explorer"),
        ..Default::default()
    };

    eframe::run_native(
        "Quote Explorer",
        options,
        Box::new(|cc| {
            let mut app = QuoteExplorerApp::new();

            if let Some(storage) = cc.storage {
                // Restore the saved theme preference
                if let Some(theme_str) = storage.get_string("is_dark_mode") {
                    if let Ok(is_dark_mode) = theme_str.parse::<bool>() {
                        app.is_dark_mode = is_dark_mode;
                        app.theme = if is_dark_mode {
                            AppTheme::dark()
                        } else {
                            AppTheme::light()
                        };
                    }
                }
            }

            Ok(Box::new(app))
        }),
    )
}

struct AppTheme {
    background: Color32,
    card_background: Color32,
    card_visited_background: Color32,
    text: Color32,
    secondary_text: Color32,
    visited_text: Color32,
    highlight: Color32,
    separator: Color32,
    destructive: Color32,
    button_background: Color32,
    button_foreground: Color32,
    button_active_background: Color32,
    button_hover_background: Color32,
}

impl AppTheme {
    fn dark() -> Self {
        Self {
            background: Color32::from_rgb(18, 18, 18),
            card_background: Color32::from_rgb(30, 30, 30),
            card_visited_background: Color32::from_rgb(24, 24, 24),
            text: Color32::from_rgb(240, 240, 240),
            secondary_text: Color32::from_rgb(180, 180, 180),
            visited_text: Color32::from_rgb(130, 130, 130),
            highlight: Color32::from_rgb(150, 130, 250), // Violet accent
            separator: Color32::from_rgb(60, 60, 60),
            destructive: Color32::from_rgb(235, 90, 90),
            button_background: Color32::from_rgb(66, 66, 66),
            button_foreground: Color32::from_rgb(240, 240, 240),
            button_active_background: Color32::from_rgb(150, 130, 250),
            button_hover_background: Color32::from_rgb(80, 80, 80),
        }
    }

    fn light() -> Self {
        Self {
            background: Color32::from_rgb(245, 245, 245),
            card_background: Color32::from_rgb(255, 255, 255),
            card_visited_background: Color32::from_rgb(238, 238, 238),
            text: Color32::from_rgb(20, 20, 20),
            secondary_text: Color32::from_rgb(90, 90, 90),
            visited_text: Color32::from_rgb(150, 150, 150),
            highlight: Color32::from_rgb(98, 70, 220), // Darker violet for contrast
            separator: Color32::from_rgb(200, 200, 200),
            destructive: Color32::from_rgb(200, 40, 40),
            button_background: Color32::from_rgb(235, 235, 235),
            button_foreground: Color32::from_rgb(20, 20, 20),
            button_active_background: Color32::from_rgb(98, 70, 220),
            button_hover_background: Color32::from_rgb(210, 210, 210),
        }
    }

    fn apply_to_ctx(&self, ctx: &egui::Context) {
        let mut style = (*ctx.style()).clone();

        // Base colors
        style.visuals.panel_fill = self.background;
        style.visuals.window_fill = self.card_background;
        style.visuals.window_stroke = Stroke::new(1.0, self.separator);
        style.visuals.widgets.noninteractive.bg_fill = self.card_background;

        // Text
        style.visuals.widgets.noninteractive.fg_stroke = Stroke::new(1.0, self.text);

        // Buttons
        style.visuals.widgets.inactive.bg_fill = self.button_background;
        style.visuals.widgets.inactive.fg_stroke = Stroke::new(1.0, self.button_foreground);
        style.visuals.widgets.active.bg_fill = self.button_active_background;
        style.visuals.widgets.active.fg_stroke = Stroke::new(1.0, self.button_foreground);
        style.visuals.widgets.hovered.bg_fill = self.button_hover_background;
        style.visuals.widgets.hovered.fg_stroke = Stroke::new(1.0, self.button_foreground);

        // Selection
        style.visuals.selection.bg_fill = self.highlight;
        style.visuals.selection.stroke = Stroke::new(1.0, self.highlight);

        // Rounding
        style.visuals.window_corner_radius = CornerRadius::same(8);
        style.visuals.menu_corner_radius = CornerRadius::same(6);
        style.visuals.widgets.noninteractive.corner_radius = CornerRadius::same(4);
        style.visuals.widgets.inactive.corner_radius = CornerRadius::same(4);
        style.visuals.widgets.hovered.corner_radius = CornerRadius::same(4);
        style.visuals.widgets.active.corner_radius = CornerRadius::same(4);

        ctx.set_style(style);
    }

    /// Card border: highlighted while unvisited, muted once followed.
    fn card_stroke(&self, visited: bool) -> Stroke {
        if visited {
            Stroke::new(1.0, self.separator)
        } else {
            Stroke::new(1.2, self.highlight.gamma_multiply(0.6))
        }
    }
}

struct QuoteExplorerApp {
    explorer: Explorer,
    client: QuoteClient,
    theme: AppTheme,
    is_dark_mode: bool,
    loading: bool,
    fetch_thread: Option<thread::JoinHandle<()>>,
    items_receiver: Option<Receiver<(Mode, Result<Vec<DisplayItem>, FetchError>)>>,
    // Auto-advance controls
    delay_input: String,
    delay_error: Option<String>,
    initialized: bool,
}

impl QuoteExplorerApp {
    fn new() -> Self {
        let database = match Database::new() {
            Ok(db) => Arc::new(db),
            Err(e) => {
                error!("Failed to open the on-disk store: {}", e);
                // Run without persistence rather than not at all
                Arc::new(Database::open_in_memory().expect("Failed to create fallback store"))
            }
        };

        let explorer = Explorer::new(database, ExplorerConfig::default(), Instant::now());
        let delay_input = explorer.delay_secs().to_string();

        Self {
            explorer,
            client: QuoteClient::new(),
            theme: AppTheme::dark(),
            is_dark_mode: true,
            loading: false,
            fetch_thread: None,
            items_receiver: None,
            delay_input,
            delay_error: None,
            initialized: false,
        }
    }

    /// Kick off a background fetch for a mode. `force` bypasses the client
    /// cache (used by regenerate); a normal load serves cached lists.
    fn spawn_fetch(&mut self, mode: Mode, force: bool) {
        if self.loading {
            return; // Don't start another load if we're already loading
        }
        self.loading = true;

        let client = self.client.clone();
        let (tx, rx) = std::sync::mpsc::channel();

        let handle = thread::spawn(move || {
            let result = if force {
                client.fetch_fresh_items(mode)
            } else {
                client.fetch_items(mode)
            };
            let _ = tx.send((mode, result));
        });

        self.fetch_thread = Some(handle);
        self.items_receiver = Some(rx);
    }

    fn check_fetch_thread(&mut self) {
        if let Some(rx) = &self.items_receiver {
            match rx.try_recv() {
                Ok((mode, Ok(items))) => {
                    self.explorer.apply_fetch_success(mode, items, Instant::now());
                    self.loading = false;
                    self.items_receiver = None; // Consume the receiver
                }
                Ok((mode, Err(err))) => {
                    error!("fetch for {} failed: {}", mode.as_str(), err);
                    self.explorer.apply_fetch_failure(mode, &err);
                    self.loading = false;
                    self.items_receiver = None; // Consume the receiver
                }
                Err(_) => {
                    // Still waiting for results
                }
            }
        }

        // Reap the worker once it is done
        if let Some(handle) = &self.fetch_thread {
            if handle.is_finished() {
                if let Some(handle) = self.fetch_thread.take() {
                    let _ = handle.join();
                }
            }
        }
    }

    fn open_link(&self, url: &str) {
        if let Err(e) = open::that(url) {
            error!("Failed to open URL: {}", e);
        }
    }

    fn toggle_theme(&mut self) {
        self.is_dark_mode = !self.is_dark_mode;
        self.theme = if self.is_dark_mode {
            AppTheme::dark()
        } else {
            AppTheme::light()
        };
    }

    fn switch_mode(&mut self, mode: Mode) {
        if self.explorer.mode() == mode {
            return;
        }
        self.explorer.switch_mode(mode, Instant::now());
        self.delay_error = None;
        // No cached list for the new mode: fetch one
        if self.explorer.items().is_empty() && !self.loading {
            self.spawn_fetch(mode, false);
        }
    }

    fn render_tab_buttons(&mut self, ui: &mut Ui) {
        let button_size = [84.0, 32.0];
        let mut switch_to = None;

        for mode in Mode::ALL {
            let selected = self.explorer.mode() == mode;
            let tab_btn = ui.add_sized(
                button_size,
                egui::Button::new(if selected {
                    RichText::new(mode.tab_label())
                        .size(16.0)
                        .color(self.theme.highlight)
                        .strong()
                } else {
                    RichText::new(mode.tab_label())
                        .size(16.0)
                        .color(self.theme.secondary_text)
                })
                .fill(if selected {
                    self.theme.card_background
                } else {
                    Color32::TRANSPARENT
                })
                .stroke(if selected {
                    Stroke::new(2.0, self.theme.highlight)
                } else {
                    Stroke::NONE
                }),
            );

            if tab_btn.clicked() {
                switch_to = Some(mode);
            }
        }

        if let Some(mode) = switch_to {
            self.switch_mode(mode);
        }
    }

    fn render_refresh_button(&mut self, ui: &mut Ui) {
        let cooldown = self.explorer.cooldown_remaining();
        let label = if self.loading {
            "Loading...".to_string()
        } else if cooldown > 0 {
            format!("Wait {}s", cooldown)
        } else {
            "New Items".to_string()
        };

        let enabled = !self.loading && self.explorer.can_regenerate();
        let refresh_btn = ui.add_enabled(
            enabled,
            egui::Button::new(
                RichText::new(format!("\u{21bb} {}", label))
                    .size(15.0)
                    .color(self.theme.button_foreground),
            )
            .min_size(egui::Vec2::new(110.0, 32.0))
            .corner_radius(CornerRadius::same(6))
            .fill(self.theme.button_background),
        );

        if refresh_btn.hovered() {
            ui.output_mut(|o| o.cursor_icon = egui::CursorIcon::PointingHand);
        }

        if refresh_btn.clicked() && self.explorer.begin_regenerate() {
            let mode = self.explorer.mode();
            // Drop the stale cache partition first so a failed forced fetch
            // cannot resurrect the old list on the next normal load
            self.client.invalidate(mode);
            self.spawn_fetch(mode, true);
        }
    }

    fn render_auto_advance_controls(&mut self, ui: &mut Ui) {
        let now = Instant::now();

        let mut auto = self.explorer.auto_enabled();
        if ui
            .checkbox(&mut auto, RichText::new("Auto-advance").color(self.theme.text))
            .changed()
        {
            if auto {
                match self.explorer.start_auto_advance(&self.delay_input, now) {
                    Ok(()) => self.delay_error = None,
                    Err(e) => self.delay_error = Some(e.to_string()),
                }
            } else {
                self.explorer.disable_auto_advance();
                self.delay_error = None;
            }
        }

        ui.add_space(12.0);
        ui.label(RichText::new("Delay (s)").color(self.theme.secondary_text));
        let delay_edit = ui.add(
            egui::TextEdit::singleline(&mut self.delay_input)
                .desired_width(48.0)
                .hint_text("10"),
        );
        if delay_edit.changed() {
            self.delay_error = None;
        }

        // The start trigger stays disabled for invalid input; nothing gets
        // clamped behind the user's back at arm time.
        let delay_valid = parse_delay(&self.delay_input).is_ok();
        let can_start =
            delay_valid && !self.explorer.auto_enabled() && !self.explorer.items().is_empty();
        let start_btn = ui.add_enabled(
            can_start,
            egui::Button::new(RichText::new("Start").size(14.0))
                .corner_radius(CornerRadius::same(6)),
        );
        if start_btn.clicked() {
            match self.explorer.start_auto_advance(&self.delay_input, now) {
                Ok(()) => self.delay_error = None,
                Err(e) => self.delay_error = Some(e.to_string()),
            }
        }

        // Inline validation message next to the input
        if let Some(err) = &self.delay_error {
            ui.label(
                RichText::new(err)
                    .color(self.theme.destructive)
                    .size(13.0)
                    .italics(),
            );
        } else if let Err(err) = parse_delay(&self.delay_input) {
            ui.label(
                RichText::new(err.to_string())
                    .color(self.theme.destructive)
                    .size(13.0)
                    .italics(),
            );
        }

        // Scheduler status readout
        match self.explorer.scheduler_state() {
            SchedulerState::Armed { deadline, .. } => {
                let left = deadline.saturating_duration_since(now).as_secs();
                ui.label(
                    RichText::new(format!("Next opens in {}s", left.max(1)))
                        .color(self.theme.secondary_text)
                        .size(13.0),
                );
            }
            SchedulerState::Exhausted => {
                ui.label(
                    RichText::new("All items visited")
                        .color(self.theme.secondary_text)
                        .size(13.0)
                        .italics(),
                );
            }
            SchedulerState::Idle | SchedulerState::Advancing { .. } => {}
        }
    }

    fn render_notice_banner(&mut self, ui: &mut Ui) {
        let Some(notice) = self.explorer.notice().cloned() else {
            return;
        };

        let mut dismiss = false;
        let mut retry = false;

        egui::Frame::new()
            .fill(self.theme.card_background)
            .stroke(Stroke::new(1.5, self.theme.destructive))
            .corner_radius(CornerRadius::same(8))
            .inner_margin(12.0)
            .outer_margin(egui::vec2(8.0, 6.0))
            .show(ui, |ui| {
                ui.horizontal(|ui| {
                    ui.vertical(|ui| {
                        ui.label(
                            RichText::new(&notice.title)
                                .color(self.theme.destructive)
                                .strong(),
                        );
                        ui.label(
                            RichText::new(&notice.detail)
                                .color(self.theme.secondary_text)
                                .size(13.0),
                        );
                    });
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.button("Dismiss").clicked() {
                            dismiss = true;
                        }
                        if ui
                            .add_enabled(!self.loading, egui::Button::new("Retry"))
                            .clicked()
                        {
                            retry = true;
                        }
                    });
                });
            });

        if dismiss {
            self.explorer.dismiss_notice();
        }
        if retry {
            self.explorer.dismiss_notice();
            let mode = self.explorer.mode();
            self.spawn_fetch(mode, false);
        }
    }

    fn render_item_grid(&mut self, ui: &mut Ui) {
        // Clone for rendering so click handling below can borrow mutably
        let items = self.explorer.items().to_vec();

        if items.is_empty() {
            ui.vertical_centered(|ui| {
                ui.add_space(60.0);
                ui.label(
                    RichText::new("Nothing to show.")
                        .color(self.theme.secondary_text)
                        .size(18.0)
                        .italics(),
                );
                ui.label(
                    RichText::new("Use the refresh button to load items.")
                        .color(self.theme.secondary_text)
                        .size(14.0),
                );
            });
            return;
        }

        let mut clicked_id: Option<String> = None;
        let columns = ((ui.available_width() / 300.0).floor() as usize).max(1);

        ScrollArea::vertical()
            .auto_shrink([false, false])
            .show(ui, |ui| {
                for chunk in items.chunks(columns) {
                    ui.columns(columns, |cols| {
                        for (i, item) in chunk.iter().enumerate() {
                            let visited = self.explorer.is_visited(&item.id);
                            if self.render_item_card(&mut cols[i], item, visited) {
                                clicked_id = Some(item.id.clone());
                            }
                        }
                    });
                }
                ui.add_space(12.0);
            });

        if let Some(id) = clicked_id {
            if let Some(Action::OpenUrl(url)) = self.explorer.handle_click(&id) {
                self.open_link(&url);
            }
        }
    }

    /// One card. Returns true when the card body was clicked.
    fn render_item_card(&self, ui: &mut Ui, item: &DisplayItem, visited: bool) -> bool {
        let mut clicked = false;

        let fill = if visited {
            self.theme.card_visited_background
        } else {
            self.theme.card_background
        };

        egui::Frame::new()
            .fill(fill)
            .corner_radius(CornerRadius::same(8))
            .stroke(self.theme.card_stroke(visited))
            .inner_margin(12.0)
            .outer_margin(egui::vec2(6.0, 6.0))
            .show(ui, |ui| {
                ui.set_min_height(88.0);

                let text_color = if visited {
                    self.theme.visited_text
                } else {
                    self.theme.text
                };
                let body = ui.add(
                    egui::Label::new(
                        RichText::new(&item.primary_text)
                            .color(text_color)
                            .size(15.0)
                            .strong(),
                    )
                    .wrap()
                    .sense(egui::Sense::click()),
                );
                if body.clicked() {
                    clicked = true;
                }
                if body.hovered() {
                    ui.output_mut(|o| o.cursor_icon = egui::CursorIcon::PointingHand);
                }

                if let Some(secondary) = &item.secondary_text {
                    ui.add_space(4.0);
                    ui.label(
                        RichText::new(format!("— {}", secondary))
                            .color(self.theme.secondary_text)
                            .size(13.0)
                            .italics(),
                    );
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Max), |ui| {
                    if visited {
                        ui.label(
                            RichText::new("\u{2713} visited")
                                .color(self.theme.visited_text)
                                .size(12.0),
                        );
                    } else {
                        let open_hint = ui.add(
                            egui::Label::new(
                                RichText::new("\u{2197}")
                                    .color(self.theme.secondary_text)
                                    .size(14.0),
                            )
                            .sense(egui::Sense::click()),
                        );
                        if open_hint.clicked() {
                            clicked = true;
                        }
                    }
                });
            });

        clicked
    }
}

impl eframe::App for QuoteExplorerApp {
    // Save the app state when the app is closing
    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        storage.set_string("is_dark_mode", self.is_dark_mode.to_string());
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.explorer.teardown();
    }

    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Apply our custom theme
        self.theme.apply_to_ctx(ctx);

        // Check if a background fetch has finished
        self.check_fetch_thread();

        // Initial load on the first frame: cached lists show immediately,
        // otherwise go to the network
        if !self.initialized {
            self.initialized = true;
            if self.explorer.items().is_empty() {
                let mode = self.explorer.mode();
                self.spawn_fetch(mode, false);
            }
        }

        // Drive the cooldown and the auto-advance scheduler
        let now = Instant::now();
        for action in self.explorer.tick(now) {
            let Action::OpenUrl(url) = action;
            self.open_link(&url);
        }

        // Keep repainting while a countdown is visible on screen
        if self.explorer.timers_active() {
            ctx.request_repaint_after(Duration::from_millis(250));
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            // Header: title, tabs, theme toggle and refresh on the right
            ui.horizontal(|ui| {
                ui.heading(
                    RichText::new("Quote Explorer")
                        .color(self.theme.highlight)
                        .size(24.0),
                );
                ui.add_space(20.0);

                ui.horizontal(|ui| {
                    self.render_tab_buttons(ui);
                });

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    // Theme toggle button
                    let theme_icon = if self.is_dark_mode { "\u{2600}" } else { "\u{263e}" };
                    let theme_btn = ui.add(
                        egui::Button::new(
                            RichText::new(theme_icon)
                                .color(self.theme.button_foreground)
                                .size(20.0),
                        )
                        .min_size(egui::Vec2::new(32.0, 32.0))
                        .corner_radius(CornerRadius::same(16))
                        .fill(self.theme.button_background),
                    );
                    if theme_btn.hovered() {
                        ui.output_mut(|o| o.cursor_icon = egui::CursorIcon::PointingHand);
                    }
                    if theme_btn.clicked() {
                        self.toggle_theme();
                        ctx.request_repaint();
                    }

                    ui.add_space(12.0);
                    self.render_refresh_button(ui);
                });
            });

            ui.add_space(6.0);
            ui.add(egui::Separator::default().spacing(8.0));

            // Mode heading plus the auto-advance control row
            ui.horizontal(|ui| {
                ui.label(
                    RichText::new(self.explorer.mode().heading())
                        .color(self.theme.text)
                        .size(18.0)
                        .strong(),
                );
                ui.add_space(8.0);
                ui.label(
                    RichText::new(format!(
                        "{} items, {} visited",
                        self.explorer.items().len(),
                        self.explorer.visited_count()
                    ))
                    .color(self.theme.secondary_text)
                    .size(13.0),
                );
            });

            ui.add_space(4.0);

            // Auto-advance controls on their own row
            ui.horizontal(|ui| {
                self.render_auto_advance_controls(ui);
            });

            ui.add_space(4.0);

            self.render_notice_banner(ui);

            // Loading indicator
            if self.loading {
                ui.vertical_centered(|ui| {
                    ui.add_space(100.0);
                    ui.spinner();
                    ui.add_space(20.0);
                    ui.label(
                        RichText::new("Loading...")
                            .color(self.theme.secondary_text)
                            .size(18.0),
                    );
                });
                return;
            }

            self.render_item_grid(ui);
        });
    }
}
