//*** START FILE: src/main.rs ***//
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use clap::Parser;
use eframe::{egui, App, NativeOptions};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use weavelang_reader::backend::spawn_backend;
use weavelang_reader::cache::LoadStatus;
use weavelang_reader::locator::TokenLayout;
use weavelang_reader::parsing::explanation::Explanation;
use weavelang_reader::store::{AnnotationStore, FixtureStore, HttpStore, StoreError};
use weavelang_reader::types::notation::{GrammarRuleDetail, VocabExample};
use weavelang_reader::{
    load_or_default, ConfigError, Document, Lookup, ReaderError, ReaderSession, RuleId, TokenRef, VocabId,
};

#[derive(Parser, Debug)]
#[command(name = "weavelang-reader", about = "Read a document with its grammar and vocabulary notations")]
struct Args {
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
    /// JSON fixture with documents and notations; replaces the HTTP store.
    #[arg(long)]
    fixture: Option<PathBuf>,
    /// Document JSON to open. Defaults to the fixture's first document.
    #[arg(long)]
    document: Option<PathBuf>,
}

#[derive(Error, Debug)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to start store workers: {0}")]
    Workers(#[from] std::io::Error),
    #[error(transparent)]
    Session(#[from] ReaderError),
    #[error("failed to read document {path}: {message}")]
    Document { path: String, message: String },
    #[error("no document to open; pass --document or a --fixture that contains one")]
    NoDocument,
    #[error("ui error: {0}")]
    Ui(#[from] eframe::Error),
}

struct ReaderApp {
    session: ReaderSession,
    layout: TokenLayout,
    hovered: Option<TokenRef>,
    vocab_id_input: u64,
    rule_id_input: u64,
    action_error: Option<String>,
    show_debug_log: bool,
}

impl ReaderApp {
    fn new(session: ReaderSession) -> Self {
        Self {
            session,
            layout: TokenLayout::new(),
            hovered: None,
            vocab_id_input: 1,
            rule_id_input: 1,
            action_error: None,
            show_debug_log: false,
        }
    }

    fn report(&mut self, result: Result<(), ReaderError>) {
        self.action_error = result.err().map(|e| e.to_string());
    }

    fn mark_vocab(&mut self) {
        let state = self.session.selection();
        let target = state.active_sentence().zip(state.positions().next());
        let result = match (self.session.document_id(), target) {
            (None, _) => Err(ReaderError::NoDocument),
            (_, None) => Err(ReaderError::EmptySelection),
            (Some(document_id), Some((sentence_id, position))) => {
                self.session
                    .create_vocab_notation(document_id, sentence_id, position, VocabId(self.vocab_id_input))
            }
        };
        self.report(result);
    }

    fn mark_grammar(&mut self) {
        let result = self.session.create_grammar_notation_for_selection(RuleId(self.rule_id_input));
        self.report(result);
    }

    /// Feed this frame's pointer input into the selection machine.
    fn handle_pointer(&mut self, ctx: &egui::Context, text_area: egui::Rect) {
        let (pressed, down, released, pos, merge) = ctx.input(|i| {
            (
                i.pointer.primary_pressed(),
                i.pointer.primary_down(),
                i.pointer.primary_released(),
                i.pointer.interact_pos(),
                i.modifiers.shift,
            )
        });
        let Some(pos) = pos else {
            return;
        };
        let hit = self.layout.identify(pos);
        if pressed && text_area.contains(pos) {
            self.session.pointer_down(hit, pos);
        } else if down {
            self.session.pointer_move(pos, hit);
        }
        if released {
            self.session.pointer_up(hit, pos, merge);
        }
    }

    fn show_tooltip(&mut self, ctx: &egui::Context) {
        let Some(key) = self.hovered else {
            return;
        };
        let rule_ids: Vec<RuleId> = self.session.grammar_for_token(&key).iter().map(|n| n.rule_id).collect();
        let rules: Vec<(RuleId, Lookup<GrammarRuleDetail>)> = rule_ids
            .into_iter()
            .map(|rule_id| (rule_id, self.session.resolve_rule_detail(rule_id)))
            .collect();
        let example = self.session.resolve_vocab_example(key);
        if rules.is_empty() && matches!(example, Lookup::Absent | Lookup::Failed) {
            return;
        }

        egui::show_tooltip_at_pointer(ctx, egui::Id::new("token_tooltip"), |ui| {
            ui.set_max_width(360.0);
            match &example {
                Lookup::Ready(example) => example_ui(ui, example),
                Lookup::Pending => {
                    ui.weak("Looking up vocabulary…");
                }
                Lookup::Absent | Lookup::Failed => {}
            }
            for (rule_id, lookup) in &rules {
                ui.separator();
                match lookup {
                    Lookup::Ready(detail) => {
                        ui.strong(&detail.name);
                        explanation_ui(ui, &detail.explanation);
                    }
                    Lookup::Pending => {
                        ui.weak(format!("Loading rule {}…", rule_id));
                    }
                    Lookup::Failed => {
                        ui.colored_label(egui::Color32::RED, format!("Rule {} unavailable", rule_id));
                    }
                    Lookup::Absent => {}
                }
            }
        });
    }
}

impl App for ReaderApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.session.poll();

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("Reload notations").clicked() {
                        let result = self.session.reload();
                        self.report(result);
                        ui.close_menu();
                    }
                    if ui.button("Exit").clicked() {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    }
                });
                ui.menu_button("View", |ui| {
                    ui.checkbox(&mut self.show_debug_log, "Debug log");
                });
            });
        });

        egui::SidePanel::right("side_panel_right")
            .min_width(260.0)
            .default_width(320.0)
            .show(ctx, |ui| {
                ui.heading("Annotations");
                ui.separator();
                match self.session.load_status() {
                    LoadStatus::Uninitialized => {
                        ui.label("No document loaded.");
                    }
                    LoadStatus::Loading => {
                        ui.horizontal(|ui| {
                            ui.spinner();
                            ui.label("Loading notations…");
                        });
                    }
                    LoadStatus::Ready => {
                        let cache = self.session.cache();
                        ui.label(format!(
                            "{} grammar / {} vocab notations",
                            cache.grammar_notations().len(),
                            cache.vocab_notations().len()
                        ));
                    }
                    LoadStatus::Failed(message) => {
                        ui.colored_label(egui::Color32::RED, format!("Notations unavailable: {}", message));
                    }
                }
                ui.separator();

                ui.label("Selection:");
                match self.session.selection_snapshot().filter(|s| !s.is_empty()) {
                    Some(change) => {
                        ui.strong(change.joined_text(" "));
                        if let Some(context) = &change.context {
                            ui.weak(&context.sentence_body);
                        }
                    }
                    None => {
                        ui.weak("Click or drag across tokens.");
                    }
                }
                ui.separator();

                ui.horizontal(|ui| {
                    ui.label("Vocab id:");
                    ui.add(egui::DragValue::new(&mut self.vocab_id_input).speed(1.0).clamp_range(1..=u32::MAX));
                });
                if ui.button("Mark first selected token").clicked() {
                    self.mark_vocab();
                }
                ui.horizontal(|ui| {
                    ui.label("Rule id:");
                    ui.add(egui::DragValue::new(&mut self.rule_id_input).speed(1.0).clamp_range(1..=u32::MAX));
                });
                if ui.button("Mark selection with rule").clicked() {
                    self.mark_grammar();
                }
                if let Some(err) = &self.action_error {
                    ui.colored_label(egui::Color32::RED, err);
                }

                if self.show_debug_log {
                    ui.separator();
                    ui.collapsing("Debug log", |ui| {
                        egui::ScrollArea::vertical()
                            .id_source("debug_log_scroll")
                            .max_height(300.0)
                            .stick_to_bottom(true)
                            .show(ui, |ui| {
                                for entry in self.session.event_log().entries() {
                                    ui.monospace(&entry.summary);
                                }
                            });
                    });
                }
            });

        let text_area = egui::CentralPanel::default()
            .show(ctx, |ui| {
                egui::ScrollArea::vertical()
                    .id_source("document_scroll")
                    .auto_shrink([false, false])
                    .show(ui, |ui| render_document(ui, &self.session, &mut self.layout));
            })
            .response
            .rect;

        self.hovered = ctx.pointer_hover_pos().and_then(|pos| self.layout.identify(pos));
        self.handle_pointer(ctx, text_area);
        self.show_tooltip(ctx);

        if self.session.outstanding() > 0 || self.session.load_status() == &LoadStatus::Loading {
            ctx.request_repaint_after(Duration::from_millis(50));
        }
    }
}

/// Paint every sentence as a row of token labels, recording where each landed.
fn render_document(ui: &mut egui::Ui, session: &ReaderSession, layout: &mut TokenLayout) {
    layout.clear();
    let Some(document) = session.document() else {
        ui.label("No document.");
        return;
    };
    if !document.title.is_empty() {
        ui.heading(&document.title);
        ui.separator();
    }
    for sentence in &document.sentences {
        ui.horizontal_wrapped(|ui| {
            ui.spacing_mut().item_spacing.x = 4.0;
            for token in &sentence.tokens {
                let key = TokenRef::new(document.document_id, sentence.sentence_id, token.position);
                let mut text = egui::RichText::new(&token.text).size(18.0);
                if !session.grammar_for_token(&key).is_empty() {
                    text = text.color(egui::Color32::from_rgb(90, 160, 255));
                }
                if !session.vocab_for_token(&key).is_empty() {
                    text = text.underline();
                }
                if session.selection().contains(sentence.sentence_id, token.position) {
                    text = text
                        .background_color(egui::Color32::from_rgb(255, 220, 120))
                        .color(egui::Color32::BLACK);
                }
                if !token.selectable {
                    text = text.weak();
                }
                let response = ui.add(egui::Label::new(text).selectable(false));
                layout.push(key, response.rect, token.selectable);
            }
        });
        ui.add_space(6.0);
    }
}

fn example_ui(ui: &mut egui::Ui, example: &VocabExample) {
    if let Some(headword) = &example.headword {
        ui.strong(headword);
    }
    explanation_ui(ui, &example.explanation);
    if let Some(original) = &example.original_sentence {
        ui.weak(original);
    }
}

fn explanation_ui(ui: &mut egui::Ui, explanation: &Explanation) {
    match explanation {
        Explanation::Structured { text, notes } => {
            ui.label(text);
            for (name, value) in notes {
                ui.horizontal_wrapped(|ui| {
                    ui.weak(format!("{}:", name));
                    ui.label(value);
                });
            }
        }
        Explanation::Plain(text) if !text.trim().is_empty() => {
            ui.label(text);
        }
        Explanation::Plain(_) => {}
    }
}

fn read_document(file_path: &Path) -> Result<Document, AppError> {
    let error = |message: String| AppError::Document {
        path: file_path.display().to_string(),
        message,
    };
    let file = File::open(file_path).map_err(|e| error(e.to_string()))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| error(e.to_string()))
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("weavelang_reader=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .try_init();
}

fn run() -> Result<(), AppError> {
    init_tracing();
    let args = Args::parse();
    let config = load_or_default(&args.config)?;

    let (store, fixture_document): (Arc<dyn AnnotationStore>, Option<Document>) = match &args.fixture {
        Some(path) => {
            let store = FixtureStore::from_path(path)?;
            let first = store.document_ids().first().and_then(|id| store.document(*id));
            info!("using fixture store {}", path.display());
            (Arc::new(store), first)
        }
        None => {
            info!("using annotation store at {}", config.api_base_url);
            (Arc::new(HttpStore::new(&config.api_base_url, config.request_timeout())?), None)
        }
    };
    let document = match &args.document {
        Some(path) => read_document(path)?,
        None => fixture_document.ok_or(AppError::NoDocument)?,
    };

    let backend = spawn_backend(store, config.worker_threads)?;
    let mut session = ReaderSession::new(&config, backend);
    session.open_document(document)?;

    let options = NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_min_inner_size([800.0, 500.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Weavelang Reader",
        options,
        Box::new(move |_cc| Box::new(ReaderApp::new(session))),
    )?;
    Ok(())
}

fn main() {
    let exit_code = run_and_report(run);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run_and_report<F, E>(runner: F) -> i32
where
    F: FnOnce() -> Result<(), E>,
    E: std::fmt::Display,
{
    match runner() {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("weavelang-reader: {}", err);
            1
        }
    }
}

//*** END FILE: src/main.rs ***//
