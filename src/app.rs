use eframe::egui;
use egui::{Color32, ColorImage, Pos2, Rect, Sense, TextureHandle, TextureOptions, Vec2};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use crate::components::chat_input::ChatInputPanel;
use crate::components::layers::{LayerAction, LayersPanel, apply_layer_action};
use crate::components::properties::PropertiesPanel;
use crate::components::toolbar::{self, ToolbarAction};
use crate::compositor::Compositor;
use crate::interaction::CanvasInteraction;
use crate::io::{FileHandler, IoResult};
use crate::settings::AppSettings;
use crate::store::LayerStore;

/// Last IO outcome, shown in the status bar.
struct StatusLine {
    text: String,
    is_error: bool,
}

impl StatusLine {
    fn info(text: impl Into<String>) -> Self {
        Self { text: text.into(), is_error: false }
    }

    fn error(text: impl Into<String>) -> Self {
        Self { text: text.into(), is_error: true }
    }
}

pub struct CaptionApp {
    store: LayerStore,
    compositor: Compositor,
    interaction: CanvasInteraction,
    settings: AppSettings,
    file_handler: FileHandler,

    io_sender: mpsc::Sender<IoResult>,
    io_receiver: mpsc::Receiver<IoResult>,
    pending_io_ops: usize,

    /// Composited canvas and the store revision it was rendered from.
    texture: Option<TextureHandle>,
    rendered_revision: Option<u64>,

    layers_panel: LayersPanel,
    properties_panel: PropertiesPanel,
    chat_input: ChatInputPanel,
    status: Option<StatusLine>,

    /// Set once a frame panicked; the app then only shows this message.
    fatal: Option<String>,
}

impl CaptionApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, settings: AppSettings) -> Self {
        let mut store = LayerStore::new(settings.canvas_width, settings.canvas_height);
        store.set_zoom(settings.default_zoom);
        store.set_default_font_family(&settings.font_family);
        let (io_sender, io_receiver) = mpsc::channel();
        log::info!(
            "Canvas {}x{} at {:.0}%, font '{}'",
            settings.canvas_width,
            settings.canvas_height,
            settings.default_zoom * 100.0,
            settings.font_family
        );

        Self {
            store,
            compositor: Compositor::new(),
            interaction: CanvasInteraction::new(),
            file_handler: FileHandler::with_dir(settings.export_dir()),
            chat_input: ChatInputPanel::new(settings.chat_start_y),
            settings,
            io_sender,
            io_receiver,
            pending_io_ops: 0,
            texture: None,
            rendered_revision: None,
            layers_panel: LayersPanel::default(),
            properties_panel: PropertiesPanel::default(),
            status: None,
            fatal: None,
        }
    }

    // --- IO ---------------------------------------------------------------

    fn open_path(&mut self, path: PathBuf) {
        log::info!("Opening {}", path.display());
        self.pending_io_ops += 1;
        crate::io::spawn_load(path, self.io_sender.clone());
    }

    fn export(&mut self) {
        let export_dir = self.settings.export_dir();
        let Some(path) = self.file_handler.pick_export_path(export_dir.as_deref()) else {
            return;
        };
        let surface = self.compositor.render_for_export(&self.store);
        self.pending_io_ops += 1;
        crate::io::spawn_export(surface, path, self.io_sender.clone());
    }

    fn poll_io(&mut self, ctx: &egui::Context) {
        while let Ok(result) = self.io_receiver.try_recv() {
            self.pending_io_ops = self.pending_io_ops.saturating_sub(1);
            self.status = Some(match result {
                IoResult::ImageLoaded { bitmap, path } => {
                    let (w, h) = (bitmap.width(), bitmap.height());
                    self.store.add_image_layer(bitmap);
                    StatusLine::info(format!("Loaded {} ({}x{})", file_name(&path), w, h))
                }
                IoResult::LoadFailed { path, error } => {
                    StatusLine::error(format!("Could not open {}: {}", file_name(&path), error))
                }
                IoResult::ExportComplete { path } => StatusLine::info(format!("Exported {}", path.display())),
                IoResult::ExportFailed { error, .. } => StatusLine::error(format!("Export failed: {}", error)),
            });
        }
        if self.pending_io_ops > 0 {
            ctx.request_repaint();
        }
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped: Vec<egui::DroppedFile> = ctx.input(|i| i.raw.dropped_files.clone());
        for file in dropped {
            if let Some(path) = file.path {
                if crate::io::is_image_path(&path) {
                    self.open_path(path);
                } else {
                    self.status = Some(StatusLine::error(format!("Not an image: {}", file_name(&path))));
                }
            } else if let Some(bytes) = file.bytes {
                self.pending_io_ops += 1;
                crate::io::spawn_load_bytes(bytes, file.name, self.io_sender.clone());
            }
        }
    }

    fn handle_toolbar(&mut self, action: ToolbarAction) {
        match action {
            ToolbarAction::OpenImage => {
                if let Some(path) = self.file_handler.pick_image() {
                    self.open_path(path);
                }
            }
            ToolbarAction::ExportPng => self.export(),
            ToolbarAction::ChooseExportDir => {
                let current = self.settings.export_dir();
                if let Some(dir) = self.file_handler.pick_folder(current.as_deref()) {
                    self.settings.export_dir = dir.to_string_lossy().into_owned();
                    self.settings.save();
                    self.status = Some(StatusLine::info(format!("Exports go to {}", dir.display())));
                }
            }
            ToolbarAction::ZoomIn => self.store.zoom_in(),
            ToolbarAction::ZoomOut => self.store.zoom_out(),
            ToolbarAction::ResetZoom => self.store.reset_zoom(),
            ToolbarAction::ClearCanvas => {
                self.interaction.pointer_leave();
                self.store.clear(self.settings.canvas_width, self.settings.canvas_height);
            }
        }
    }

    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        if ctx.wants_keyboard_input() {
            return;
        }
        let Some(id) = self.store.selected_id() else { return };
        let (delete, duplicate) = ctx.input(|i| {
            (
                i.key_pressed(egui::Key::Delete),
                i.modifiers.command && i.key_pressed(egui::Key::D),
            )
        });
        if delete {
            apply_layer_action(&mut self.store, LayerAction::Delete(id));
        } else if duplicate {
            apply_layer_action(&mut self.store, LayerAction::Duplicate(id));
        }
    }

    // --- Canvas -------------------------------------------------------------

    /// Re-render the surface when the store changed since the last upload.
    fn refresh_texture(&mut self, ctx: &egui::Context) {
        let revision = self.store.revision();
        if self.rendered_revision == Some(revision) {
            return;
        }
        self.rendered_revision = Some(revision);

        let surface = self.compositor.render(&self.store);
        if surface.width() == 0 || surface.height() == 0 {
            self.texture = None;
            return;
        }
        let size = [surface.width() as usize, surface.height() as usize];
        let image = ColorImage::from_rgba_unmultiplied(size, surface.as_raw());
        match &mut self.texture {
            Some(texture) => texture.set(image, TextureOptions::LINEAR),
            None => self.texture = Some(ctx.load_texture("canvas", image, TextureOptions::LINEAR)),
        }
    }

    fn show_canvas(&mut self, ui: &mut egui::Ui) {
        let Some(texture) = &self.texture else {
            ui.centered_and_justified(|ui| ui.weak("Nothing to show"));
            return;
        };
        let texture_id = texture.id();
        let [tw, th] = texture.size();
        let ppp = ui.ctx().pixels_per_point();
        let display = Vec2::new(tw as f32, th as f32) / ppp;

        egui::ScrollArea::both().drag_to_scroll(false).show(ui, |ui| {
            let (rect, response) = ui.allocate_exact_size(display, Sense::click_and_drag());
            ui.painter().image(
                texture_id,
                rect,
                Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                Color32::WHITE,
            );

            let visible = ui.clip_rect().intersect(rect);
            let to_surface = |p: Pos2| {
                (
                    (p.x - rect.min.x) / rect.width() * tw as f32,
                    (p.y - rect.min.y) / rect.height() * th as f32,
                )
            };
            let (pressed, released, pointer) = ui.input(|i| {
                (i.pointer.primary_pressed(), i.pointer.primary_released(), i.pointer.hover_pos())
            });
            let inside = pointer.filter(|p| visible.contains(*p));

            if pressed
                && response.hovered()
                && let Some(p) = inside
            {
                let (sx, sy) = to_surface(p);
                self.interaction.pointer_down(&mut self.store, sx, sy);
            }
            if self.interaction.is_dragging() {
                match inside {
                    Some(p) => {
                        let (sx, sy) = to_surface(p);
                        self.interaction.pointer_move(&mut self.store, sx, sy);
                    }
                    None => self.interaction.pointer_leave(),
                }
            }
            if released {
                self.interaction.pointer_up();
            }

            if response.hovered() {
                let zoom = ui.input(|i| i.zoom_delta());
                if zoom > 1.0 {
                    self.store.zoom_in();
                } else if zoom < 1.0 {
                    self.store.zoom_out();
                }
                if self.interaction.is_dragging() {
                    ui.ctx().set_cursor_icon(egui::CursorIcon::Grabbing);
                }
            }
        });
    }

    // --- Frame --------------------------------------------------------------

    fn frame(&mut self, ctx: &egui::Context) {
        self.poll_io(ctx);
        self.handle_dropped_files(ctx);
        self.handle_shortcuts(ctx);

        let busy = self.pending_io_ops > 0;
        let mut toolbar_action = None;
        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            toolbar_action = toolbar::show(ui, self.store.zoom(), busy);
        });
        if let Some(action) = toolbar_action {
            self.handle_toolbar(action);
        }

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let (w, h) = self.store.canvas_size();
                ui.weak(format!("{}x{}", w, h));
                ui.separator();
                match &self.status {
                    Some(s) if s.is_error => {
                        ui.colored_label(ui.visuals().error_fg_color, &s.text);
                    }
                    Some(s) => {
                        ui.label(&s.text);
                    }
                    None => {
                        ui.weak("Ready");
                    }
                }
            });
        });

        egui::SidePanel::left("input_panel").default_width(260.0).show(ctx, |ui| {
            egui::ScrollArea::vertical().id_source("input_scroll").show(ui, |ui| {
                self.chat_input.show(ui, &mut self.store);
            });
        });

        egui::SidePanel::right("layer_panel").default_width(300.0).show(ctx, |ui| {
            egui::TopBottomPanel::bottom("properties")
                .resizable(true)
                .default_height(ui.available_height() * 0.55)
                .show_inside(ui, |ui| {
                    ui.heading("Properties");
                    ui.separator();
                    egui::ScrollArea::vertical().id_source("props_scroll").show(ui, |ui| {
                        self.properties_panel.show(ui, &mut self.store);
                    });
                });
            self.layers_panel.show(ui, &mut self.store);
        });

        // Drag, zoom and panel edits above all land before the upload.
        self.refresh_texture(ctx);
        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(Color32::from_gray(32)))
            .show(ctx, |ui| self.show_canvas(ui));
        // Edits made by the canvas itself show up next frame.
        if self.rendered_revision != Some(self.store.revision()) {
            ctx.request_repaint();
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn show_fatal(ctx: &egui::Context, message: &str) {
    egui::CentralPanel::default().show(ctx, |ui| {
        ui.vertical_centered(|ui| {
            ui.add_space(80.0);
            ui.heading("CaptionFE hit an unexpected error");
            ui.add_space(8.0);
            ui.label(message);
            ui.add_space(8.0);
            match crate::logger::log_path() {
                Some(path) => ui.weak(format!("Details were written to {}", path.display())),
                None => ui.weak("No session log is available."),
            };
            ui.weak("Restart the app to continue.");
        });
    });
}

impl eframe::App for CaptionApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if let Some(message) = &self.fatal {
            show_fatal(ctx, message);
            return;
        }
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| self.frame(ctx)));
        if let Err(payload) = result {
            let message = panic_message(payload.as_ref());
            log::error!("Frame panicked: {}", message);
            self.fatal = Some(message);
            ctx.request_repaint();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        let caught = std::panic::catch_unwind(|| panic!("boom {}", 7)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "boom 7");
        let caught = std::panic::catch_unwind(|| std::panic::panic_any(42u8)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "unknown panic payload");
    }

    #[test]
    fn file_name_falls_back_to_full_path() {
        assert_eq!(file_name(Path::new("/tmp/shot.png")), "shot.png");
        assert_eq!(file_name(Path::new("/")), "/");
    }
}
