use bevy::{
    log::LogPlugin,
    prelude::*,
    window::{PresentMode, WindowTheme},
    winit::WinitSettings,
};
use bevy_egui::{
    EguiContexts, EguiGlobalSettings, EguiPlugin, EguiPrimaryContextPass, PrimaryEguiContext, egui,
};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::mpsc::{Receiver, TryRecvError};
use step_render::config::{MAX_HEIGHT, MAX_WIDTH, MIN_HEIGHT, MIN_WIDTH};
use step_render::{
    ARCHIVE_NAME, BatchConfig, BatchMessage, BatchReport, FailurePolicy, FileOutcome,
    RenderSettings, Resolution, SoftwareBackend, Upload, spawn_batch, view_count,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Tab {
    #[default]
    Main,
    Settings,
}

/// Session state. Nothing here outlives the process.
#[derive(Resource)]
struct AppState {
    tab: Tab,
    settings: RenderSettings,
    /// Resolution edited in the settings tab, copied into each batch at start.
    resolution: Resolution,
    queued: Vec<PathBuf>,
    job: Option<BatchJob>,
    progress: f32,
    report: Option<BatchReport>,
    status: Option<String>,
    error: Option<String>,
}

struct BatchJob {
    receiver: Mutex<Receiver<BatchMessage>>,
    files: usize,
}

impl AppState {
    fn new(settings: RenderSettings, error: Option<String>) -> Self {
        Self {
            tab: Tab::Main,
            resolution: settings.resolution().unwrap_or_default(),
            settings,
            queued: Vec::new(),
            job: None,
            progress: 0.0,
            report: None,
            status: None,
            error,
        }
    }
}

fn main() {
    let (settings, error) = match RenderSettings::load() {
        Ok(settings) => (settings, None),
        Err(e) => (RenderSettings::default(), Some(format!("{e}; using defaults"))),
    };

    App::new()
        .insert_resource(AppState::new(settings, error))
        .add_plugins(
            DefaultPlugins
                .set(WindowPlugin {
                    primary_window: Some(Window {
                        title: "Batch STEP File Renderer".into(),
                        present_mode: PresentMode::AutoVsync,
                        window_theme: Some(WindowTheme::Dark),
                        ..Default::default()
                    }),
                    ..Default::default()
                })
                .set(LogPlugin {
                    filter: "info,wgpu_core=warn,wgpu_hal=warn".into(),
                    level: bevy::log::Level::INFO,
                    ..Default::default()
                }),
        )
        .add_plugins(EguiPlugin::default())
        .insert_resource(WinitSettings::desktop_app())
        .add_systems(Startup, setup_camera)
        .add_systems(Update, poll_batch)
        .add_systems(EguiPrimaryContextPass, ui_system)
        .run();
}

fn setup_camera(mut commands: Commands, mut egui_global_settings: ResMut<EguiGlobalSettings>) {
    // The UI is the whole window; a single 2D camera hosts the egui context.
    egui_global_settings.auto_create_primary_context = false;
    commands.spawn((PrimaryEguiContext, Camera2d));
}

fn start_batch(state: &mut AppState) {
    let uploads = match state
        .queued
        .iter()
        .map(|path| Upload::from_path(path))
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(uploads) => uploads,
        Err(e) => {
            state.error = Some(e.to_string());
            return;
        }
    };

    let mut settings = state.settings.clone();
    settings.width = state.resolution.width();
    settings.height = state.resolution.height();
    let config = match BatchConfig::from_settings(&settings) {
        Ok(config) => config,
        Err(e) => {
            state.error = Some(e.to_string());
            return;
        }
    };

    let files = uploads.len();
    let receiver = spawn_batch(SoftwareBackend::from_settings(&settings), config, uploads);
    state.job = Some(BatchJob {
        receiver: Mutex::new(receiver),
        files,
    });
    state.progress = 0.0;
    state.report = None;
    state.error = None;
    state.status = Some(format!("Processing {files} files, please wait…"));
    info!("Started batch of {} files", files);
}

fn poll_batch(mut state: ResMut<AppState>) {
    let Some(job) = state.job.as_ref() else {
        return;
    };

    let mut messages = Vec::new();
    let mut disconnected = false;
    if let Ok(receiver) = job.receiver.lock() {
        loop {
            match receiver.try_recv() {
                Ok(msg) => messages.push(msg),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }
    }
    let files = job.files;

    for msg in messages {
        match msg {
            BatchMessage::Progress(fraction) => {
                state.progress = fraction as f32;
            }
            BatchMessage::Finished(report) => {
                info!("Batch finished: {} of {} files rendered", report.rendered(), files);
                state.status = Some(format!(
                    "Rendered {} of {} files.",
                    report.rendered(),
                    files
                ));
                state.report = Some(report);
                state.job = None;
                return;
            }
            BatchMessage::Failed(err) => {
                state.error = Some(err);
                state.status = None;
                state.job = None;
                return;
            }
        }
    }

    if disconnected {
        state.error = Some("The render worker stopped unexpectedly".to_string());
        state.status = None;
        state.job = None;
    }
}

fn ui_system(mut contexts: EguiContexts, mut state: ResMut<AppState>) {
    let Ok(ctx) = contexts.ctx_mut() else {
        return;
    };
    let state = &mut *state;

    egui::TopBottomPanel::top("tabs").show(ctx, |ui| {
        ui.horizontal(|ui| {
            ui.heading("Batch STEP File Renderer");
            ui.separator();
            ui.selectable_value(&mut state.tab, Tab::Main, "Main");
            ui.selectable_value(&mut state.tab, Tab::Settings, "Settings");
        });
    });

    egui::CentralPanel::default().show(ctx, |ui| match state.tab {
        Tab::Main => main_tab(ui, state),
        Tab::Settings => settings_tab(ui, state),
    });

    // Keep frames coming while the worker reports progress.
    if state.job.is_some() {
        ctx.request_repaint();
    }
}

fn main_tab(ui: &mut egui::Ui, state: &mut AppState) {
    ui.label("Upload STEP files, render them from all sides and download the images as a ZIP.");
    ui.separator();

    let busy = state.job.is_some();
    ui.add_enabled_ui(!busy, |ui| {
        ui.horizontal(|ui| {
            if ui.button("Add STEP files…").clicked()
                && let Some(paths) = rfd::FileDialog::new()
                    .add_filter("STEP", &["step", "stp"])
                    .pick_files()
            {
                for path in paths {
                    if !state.queued.contains(&path) {
                        state.queued.push(path);
                    }
                }
            }
            if ui.button("Clear").clicked() {
                state.queued.clear();
                state.report = None;
                state.status = None;
                state.progress = 0.0;
            }
        });

        let mut remove = None;
        egui::ScrollArea::vertical()
            .max_height(220.0)
            .show(ui, |ui| {
                for (idx, path) in state.queued.iter().enumerate() {
                    ui.horizontal(|ui| {
                        if ui.small_button("✕").clicked() {
                            remove = Some(idx);
                        }
                        ui.label(
                            path.file_name()
                                .map(|n| n.to_string_lossy().into_owned())
                                .unwrap_or_else(|| path.display().to_string()),
                        );
                    });
                }
            });
        if let Some(idx) = remove {
            state.queued.remove(idx);
        }
    });

    if state.queued.is_empty() {
        ui.label("No files queued");
    } else {
        let views = view_count(state.settings.view_step).unwrap_or(0);
        ui.label(format!(
            "{} files × {} views at {}×{} px",
            state.queued.len(),
            views,
            state.resolution.width(),
            state.resolution.height()
        ));
    }

    ui.separator();
    let can_start = !busy && !state.queued.is_empty();
    if ui.add_enabled(can_start, egui::Button::new("Render")).clicked() {
        start_batch(state);
    }

    if state.job.is_some() || state.progress > 0.0 {
        ui.add(egui::ProgressBar::new(state.progress).show_percentage());
    }
    if let Some(status) = &state.status {
        ui.label(status);
    }
    if let Some(err) = &state.error {
        ui.colored_label(egui::Color32::from_rgb(230, 80, 80), err);
    }

    let Some(report) = &state.report else {
        return;
    };
    ui.separator();
    for file in &report.files {
        match &file.outcome {
            FileOutcome::Rendered { images } => {
                ui.label(format!("{} → {}/ ({} images)", file.name, file.folder, images));
            }
            FileOutcome::Skipped { error } => {
                ui.colored_label(
                    egui::Color32::from_rgb(230, 160, 60),
                    format!("{}: skipped ({})", file.name, error),
                );
            }
        }
    }

    if ui.button("Save ZIP…").clicked()
        && let Some(dest) = rfd::FileDialog::new()
            .set_file_name(ARCHIVE_NAME)
            .add_filter("ZIP", &["zip"])
            .save_file()
    {
        let result = std::fs::copy(&report.archive, &dest);
        match result {
            Ok(_) => {
                info!("Saved archive to {}", dest.display());
                state.status = Some(format!("Saved {}", dest.display()));
            }
            Err(e) => {
                state.error = Some(format!("Failed to save {}: {e}", dest.display()));
            }
        }
    }
}

fn settings_tab(ui: &mut egui::Ui, state: &mut AppState) {
    ui.heading("Resolution");
    let mut width = state.resolution.width();
    let mut height = state.resolution.height();
    egui::Grid::new("resolution").num_columns(2).show(ui, |ui| {
        ui.label("Width (px):");
        ui.add(egui::DragValue::new(&mut width).range(MIN_WIDTH..=MAX_WIDTH));
        ui.end_row();
        ui.label("Height (px):");
        ui.add(egui::DragValue::new(&mut height).range(MIN_HEIGHT..=MAX_HEIGHT));
        ui.end_row();
    });
    state.resolution = Resolution::clamped(width, height);

    ui.separator();
    ui.heading("Rendering");

    // Quality maps to -log10(tessellation_factor): 1.5 (low) to 4.0 (ultra)
    let mut quality = -state.settings.tessellation_factor.log10();
    ui.horizontal(|ui| {
        ui.label("Mesh quality:");
        let slider = ui.add(
            egui::Slider::new(&mut quality, 1.5_f64..=4.0_f64)
                .show_value(false)
                .custom_formatter(|v, _| {
                    if v > 3.5 {
                        "Ultra".to_string()
                    } else if v > 2.8 {
                        "High".to_string()
                    } else if v > 2.2 {
                        "Medium".to_string()
                    } else {
                        "Low".to_string()
                    }
                }),
        );
        if slider.changed() {
            state.settings.tessellation_factor = 10_f64.powf(-quality);
        }
        slider.on_hover_text("Finer meshes give smoother curved surfaces but load slower");
    });

    let mut skip = state.settings.on_failure == FailurePolicy::Skip;
    if ui
        .checkbox(&mut skip, "Skip files that fail instead of stopping the batch")
        .changed()
    {
        state.settings.on_failure = if skip {
            FailurePolicy::Skip
        } else {
            FailurePolicy::Abort
        };
    }

    let views = view_count(state.settings.view_step).unwrap_or(0);
    ui.label(format!(
        "Each file is captured from {} directions in {}° steps.",
        views, state.settings.view_step
    ));
    ui.label(format!(
        "The archive is written to {}",
        state.settings.archive_path().display()
    ));
}
