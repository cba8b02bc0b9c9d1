//! Natter Desktop: egui app state and UI.

use eframe::egui;
use natter::agent::Progress;
use natter::app::{AppState, SubmitError};
use natter::llm::OllamaClient;
use natter::session::{Role, Turn};
use natter::tools::BuiltinTools;
use natter::worker::{PendingTurn, TurnWorker};
use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::sync::watch;

const CHAT_INPUT_HEIGHT: f32 = 90.0;
const CHAT_MESSAGES_MIN_HEIGHT: f32 = 80.0;
const LOG_BUFFER_MAX_LINES: usize = 2000;

/// Ring buffer of log lines for the Logs screen.
static LOG_LINES: OnceLock<Mutex<VecDeque<String>>> = OnceLock::new();

fn log_buffer() -> &'static Mutex<VecDeque<String>> {
    LOG_LINES.get_or_init(|| Mutex::new(VecDeque::new()))
}

fn push_log_line(line: String) {
    if let Ok(mut buf) = log_buffer().lock() {
        buf.push_back(line);
        while buf.len() > LOG_BUFFER_MAX_LINES {
            buf.pop_front();
        }
    }
}

/// Logger that appends to LOG_LINES and mirrors warnings to stderr.
struct DesktopLogger;

impl log::Log for DesktopLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.target().starts_with("natter")
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("{} [{}] {}", clock(), record.level(), record.args());
        if record.level() <= log::Level::Warn {
            eprintln!("{}", line);
        }
        push_log_line(line);
    }

    fn flush(&self) {}
}

/// UTC wall clock, HH:MM:SS.mmm.
fn clock() -> String {
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = t.as_secs();
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        (secs / 3600) % 24,
        (secs / 60) % 60,
        secs % 60,
        t.subsec_millis()
    )
}

static LOGGER: DesktopLogger = DesktopLogger;

pub fn install_logger() {
    let _ = LOG_LINES.get_or_init(|| Mutex::new(VecDeque::new()));
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Debug);
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Default)]
enum Screen {
    #[default]
    Chat,
    Profiles,
    Logs,
}

/// Profile being edited in the dialog.
struct ProfileDraft {
    idx: usize,
    name: String,
    prefix: String,
}

/// Status line shown above the input while a reply is outstanding.
fn progress_label(progress: &Progress) -> String {
    match progress {
        Progress::Idle => "Thinking...".to_string(),
        Progress::Tool(name) => format!("Using tool {}", name),
    }
}

pub struct NatterApp {
    state: AppState,
    /// Owns the worker threads; dropped with the app.
    runtime: tokio::runtime::Runtime,
    worker: TurnWorker,
    progress: watch::Receiver<Progress>,
    /// When Some, a turn is in flight; polled every frame.
    pending: Option<PendingTurn>,
    /// When Some, a model listing is in flight.
    models_receiver: Option<mpsc::Receiver<Result<Vec<String>, String>>>,
    models_error: Option<String>,
    chat_input: String,
    chat_error: Option<String>,
    tools_input: String,
    profile_draft: Option<ProfileDraft>,
    current_screen: Screen,
    /// Last known window size, saved as geometry on exit.
    window_size: Option<egui::Vec2>,
}

impl NatterApp {
    /// Space between the main screen title and the content below.
    const SCREEN_TITLE_BOTTOM_SPACING: f32 = 18.0;
    const SCREEN_FOOTER_SPACING: f32 = 24.0;

    pub fn new(_cc: &eframe::CreationContext<'_>, state: AppState) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap_or_else(|e| {
                log::error!("failed to build tokio runtime: {}", e);
                std::process::exit(1);
            });
        let client = OllamaClient::new(natter::config::resolve_host(state.config()));
        log::info!("desktop started, ollama at {}", client.base_url());
        let worker = TurnWorker::new(
            Arc::new(client),
            Arc::new(BuiltinTools::new()),
            runtime.handle().clone(),
        );
        let progress = worker.progress();
        let tools_input = state.config().tools.clone();

        let mut app = Self {
            state,
            runtime,
            worker,
            progress,
            pending: None,
            models_receiver: None,
            models_error: None,
            chat_input: String::new(),
            chat_error: None,
            tools_input,
            profile_draft: None,
            current_screen: Screen::default(),
            window_size: None,
        };
        app.refresh_models();
        app
    }

    /// Ask the server for its model list in the background.
    fn refresh_models(&mut self) {
        let (tx, rx) = mpsc::channel();
        let client = OllamaClient::new(natter::config::resolve_host(self.state.config()));
        self.runtime.spawn(async move {
            let result = client
                .list_models()
                .await
                .map(|models| models.into_iter().map(|m| m.name).collect())
                .map_err(|e| e.to_string());
            let _ = tx.send(result);
        });
        self.models_receiver = Some(rx);
    }

    fn poll_models(&mut self) {
        let Some(rx) = &self.models_receiver else {
            return;
        };
        match rx.try_recv() {
            Ok(Ok(models)) => {
                log::info!("found {} models", models.len());
                self.models_error = None;
                self.state.set_models(models);
                self.models_receiver = None;
            }
            Ok(Err(e)) => {
                log::warn!("could not list models: {}", e);
                self.models_error = Some(e);
                self.models_receiver = None;
            }
            Err(mpsc::TryRecvError::Empty) => {}
            Err(mpsc::TryRecvError::Disconnected) => self.models_receiver = None,
        }
    }

    fn poll_chat_turn(&mut self) {
        let Some(pending) = &mut self.pending else {
            return;
        };
        if let Some(turn) = pending.try_take() {
            self.pending = None;
            self.state.complete_turn(turn);
        }
    }

    fn start_chat_turn(&mut self) {
        match self.state.submit_user_message(&self.chat_input) {
            Ok(job) => {
                self.chat_input.clear();
                self.chat_error = None;
                self.pending = Some(self.worker.submit(job));
            }
            Err(SubmitError::Empty) => {}
            Err(e) => self.chat_error = Some(e.to_string()),
        }
    }

    fn render_turn(ui: &mut egui::Ui, turn: &Turn) {
        let is_user = turn.role == Role::User;
        let frame = egui::Frame::none()
            .fill(if is_user {
                ui.style().visuals.extreme_bg_color
            } else {
                ui.style().visuals.panel_fill
            })
            .stroke(egui::Stroke::new(
                1.0,
                ui.style().visuals.widgets.noninteractive.bg_stroke.color,
            ))
            .rounding(egui::Rounding::same(8.0))
            .inner_margin(egui::Margin::same(8.0));

        let response = frame
            .show(ui, |ui| {
                ui.set_width(ui.available_width());
                if is_user {
                    ui.label(egui::RichText::new(&turn.content).strong());
                } else {
                    ui.label(&turn.content);
                }
            })
            .response;
        if let Some(think) = turn.think_content.as_deref().filter(|t| !t.is_empty()) {
            response.on_hover_text(think);
        }
    }

    fn ui_sessions_panel(&mut self, ui: &mut egui::Ui) {
        ui.add_space(16.0);
        ui.heading("Chats");
        ui.add_space(8.0);
        if ui.button("New chat").clicked() {
            self.state.create_session();
        }
        ui.add_space(8.0);

        let current = self.state.conversations().current_index();
        let pending = self.state.pending_session();
        let titles: Vec<String> = self
            .state
            .conversations()
            .sessions()
            .iter()
            .map(|s| s.title.clone())
            .collect();
        let mut select = None;
        let mut delete = None;
        egui::ScrollArea::vertical().show(ui, |ui| {
            for (idx, title) in titles.iter().enumerate() {
                ui.horizontal(|ui| {
                    if ui.small_button("x").on_hover_text("Delete chat").clicked() {
                        delete = Some(idx);
                    }
                    let label = if pending == Some(idx) {
                        format!("{} …", title)
                    } else {
                        title.clone()
                    };
                    if ui.selectable_label(idx == current, label).clicked() {
                        select = Some(idx);
                    }
                });
            }
        });
        if let Some(idx) = select {
            self.state.select_session(idx);
        }
        if let Some(idx) = delete {
            self.state.delete_session(idx);
        }
    }

    /// Messages, status line, input and the model/tools row.
    fn ui_chat(&mut self, ui: &mut egui::Ui) {
        let busy = self.state.is_pending();
        let row_height = ui.spacing().interact_size.y + 8.0;
        let status_height = ui.spacing().interact_size.y;
        let bottom_section_height = CHAT_INPUT_HEIGHT
            + 16.0
            + row_height
            + status_height
            + Self::SCREEN_FOOTER_SPACING;
        let messages_height =
            (ui.available_height() - bottom_section_height).max(CHAT_MESSAGES_MIN_HEIGHT);

        let session = self.state.conversations().current();
        egui::ScrollArea::vertical()
            .max_height(messages_height)
            .stick_to_bottom(true)
            .auto_shrink([false, false])
            .show(ui, |ui| {
                if session.history.is_empty() {
                    ui.label("Say something to start the conversation.");
                }
                for turn in &session.history {
                    Self::render_turn(ui, turn);
                    ui.add_space(8.0);
                }
            });

        ui.add_space(8.0);
        if busy {
            let label = progress_label(&self.progress.borrow());
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label(label);
            });
        } else {
            ui.add_space(status_height);
        }

        let response = ui
            .add_enabled_ui(!busy, |ui| {
                ui.add_sized(
                    [ui.available_width(), CHAT_INPUT_HEIGHT],
                    egui::TextEdit::multiline(&mut self.chat_input)
                        .hint_text("Message (Ctrl+Enter to send)"),
                )
            })
            .inner;
        ui.add_space(8.0);

        let mut send_now = false;
        ui.horizontal(|ui| {
            let models = self.state.models().to_vec();
            let current = self
                .state
                .effective_model()
                .unwrap_or_else(|| "no model".to_string());
            let mut chosen = None;
            egui::ComboBox::from_id_source("model_select")
                .selected_text(current.as_str())
                .show_ui(ui, |ui| {
                    for m in &models {
                        if ui.selectable_label(*m == current, m).clicked() {
                            chosen = Some(m.clone());
                        }
                    }
                });
            if let Some(m) = chosen {
                self.state.set_model(&m);
            }
            if ui
                .add_enabled(self.models_receiver.is_none(), egui::Button::new("Refresh"))
                .clicked()
            {
                self.refresh_models();
            }

            ui.add_space(8.0);
            ui.label("Tools:");
            let tools = ui.add(
                egui::TextEdit::singleline(&mut self.tools_input)
                    .desired_width(80.0)
                    .hint_text("off"),
            );
            if tools.changed() {
                self.state.set_tools(&self.tools_input);
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.add_enabled(!busy, egui::Button::new("Send")).clicked() {
                    send_now = true;
                }
            });
        });

        if !busy && response.has_focus() {
            let modifiers = ui.input(|i| i.modifiers);
            if (modifiers.command || modifiers.ctrl) && ui.input(|i| i.key_pressed(egui::Key::Enter))
            {
                send_now = true;
            }
        }
        if send_now {
            self.start_chat_turn();
        }

        if let Some(err) = self.chat_error.as_ref().or(self.models_error.as_ref()) {
            ui.add_space(8.0);
            ui.colored_label(egui::Color32::RED, err);
        }
    }

    fn ui_profiles_screen(&mut self, ui: &mut egui::Ui) {
        ui.add_space(16.0);
        ui.heading("Profiles");
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);
        ui.label("The selected profile's prefix is sent as the system message.");
        ui.add_space(8.0);

        let selected = self.state.config().selected_profile_idx;
        let profiles = self.state.config().profiles.clone();
        let only_one = profiles.len() <= 1;
        let mut select = None;
        let mut remove = None;
        egui::Grid::new("profiles_grid")
            .num_columns(3)
            .spacing([12.0, 8.0])
            .show(ui, |ui| {
                for (idx, profile) in profiles.iter().enumerate() {
                    if ui.selectable_label(idx == selected, &profile.name).clicked() {
                        select = Some(idx);
                    }
                    if ui.button("Edit").clicked() {
                        self.profile_draft = Some(ProfileDraft {
                            idx,
                            name: profile.name.clone(),
                            prefix: profile.prefix.clone(),
                        });
                    }
                    if ui.add_enabled(!only_one, egui::Button::new("Remove")).clicked() {
                        remove = Some(idx);
                    }
                    ui.end_row();
                }
            });
        if let Some(idx) = select {
            self.state.select_profile(idx);
        }
        if let Some(idx) = remove {
            self.state.remove_profile(idx);
        }

        ui.add_space(12.0);
        if ui.button("Add profile").clicked() {
            let idx = self.state.add_profile();
            let profile = &self.state.config().profiles[idx];
            self.profile_draft = Some(ProfileDraft {
                idx,
                name: profile.name.clone(),
                prefix: profile.prefix.clone(),
            });
        }
    }

    fn ui_profile_dialog(&mut self, ctx: &egui::Context) {
        let Some(draft) = &mut self.profile_draft else {
            return;
        };
        let mut open = true;
        let mut save = false;
        let mut cancel = false;
        egui::Window::new("Edit profile")
            .open(&mut open)
            .collapsible(false)
            .resizable(true)
            .show(ctx, |ui| {
                ui.label("Name");
                ui.text_edit_singleline(&mut draft.name);
                ui.add_space(8.0);
                ui.label("Prefix");
                ui.add(
                    egui::TextEdit::multiline(&mut draft.prefix)
                        .desired_rows(6)
                        .desired_width(360.0),
                );
                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    save = ui.button("Save").clicked();
                    cancel = ui.button("Cancel").clicked();
                });
            });
        if save {
            self.state.update_profile(draft.idx, &draft.name, &draft.prefix);
        }
        if save || cancel || !open {
            self.profile_draft = None;
        }
    }

    fn ui_logs_screen(&self, ui: &mut egui::Ui) {
        ui.add_space(16.0);
        ui.heading("Logs");
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);

        let lines: Vec<String> = log_buffer()
            .lock()
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default();

        egui::ScrollArea::vertical()
            .stick_to_bottom(true)
            .auto_shrink([false, false])
            .show(ui, |ui| {
                for line in &lines {
                    ui.label(egui::RichText::new(line.as_str()).family(egui::FontFamily::Monospace));
                }
                if lines.is_empty() {
                    ui.label("No log output yet.");
                }
            });
    }
}

impl eframe::App for NatterApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_models();
        self.poll_chat_turn();
        self.window_size = Some(ctx.screen_rect().size());
        if self.pending.is_some() || self.models_receiver.is_some() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }

        let current_screen = &mut self.current_screen;
        egui::SidePanel::left("sidebar")
            .resizable(false)
            .exact_width(120.0)
            .show(ctx, |ui| {
                ui.add_space(16.0);
                ui.heading("Natter");
                ui.add_space(16.0);
                for (screen, label) in [
                    (Screen::Chat, "Chat"),
                    (Screen::Profiles, "Profiles"),
                    (Screen::Logs, "Logs"),
                ] {
                    if ui.selectable_label(*current_screen == screen, label).clicked() {
                        *current_screen = screen;
                    }
                    ui.add_space(8.0);
                }
            });

        if self.current_screen == Screen::Chat {
            egui::SidePanel::right("sessions_panel")
                .resizable(true)
                .default_width(220.0)
                .show(ctx, |ui| self.ui_sessions_panel(ui));
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::Frame::none()
                .inner_margin(egui::Margin::symmetric(16.0, 0.0))
                .show(ui, |ui| match self.current_screen {
                    Screen::Chat => {
                        ui.add_space(16.0);
                        let title = self.state.conversations().current().title.clone();
                        ui.heading(title);
                        ui.add_space(8.0);
                        self.ui_chat(ui);
                    }
                    Screen::Profiles => self.ui_profiles_screen(ui),
                    Screen::Logs => self.ui_logs_screen(ui),
                });
        });

        self.ui_profile_dialog(ctx);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        let geometry = self
            .window_size
            .map(|s| format!("{}x{}", s.x.round() as i32, s.y.round() as i32));
        log::info!("desktop exiting");
        self.state.shutdown(geometry);
    }
}
