//! egui overlay hosting the parameter panel.

use winit::event::WindowEvent;
use winit::window::Window;

use crate::app::AppContext;
use crate::panel::ControlId;

/// Tessellated overlay for one frame, handed to the renderer.
pub struct UiFrame {
    pub primitives: Vec<egui::ClippedPrimitive>,
    pub textures_delta: egui::TexturesDelta,
    pub pixels_per_point: f32,
}

/// Owns the egui context and its winit input state.
pub struct EguiHost {
    context: egui::Context,
    state: egui_winit::State,
}

impl EguiHost {
    pub fn new(window: &Window) -> Self {
        let context = egui::Context::default();
        let state = egui_winit::State::new(
            context.clone(),
            egui::ViewportId::ROOT,
            window,
            None,
            None,
            None,
        );
        Self { context, state }
    }

    /// Feeds a window event to egui. Returns true when egui consumed it and
    /// the orbit controls should not see it.
    pub fn on_window_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        self.state.on_window_event(window, event).consumed
    }

    /// Whether the pointer is over the panel or dragging one of its widgets.
    pub fn wants_pointer_input(&self) -> bool {
        self.context.wants_pointer_input() || self.context.is_pointer_over_area()
    }

    pub fn run<F>(&mut self, window: &Window, run_ui: F) -> UiFrame
    where
        F: FnMut(&egui::Context),
    {
        let raw_input = self.state.take_egui_input(window);
        let output = self.context.run(raw_input, run_ui);
        self.state
            .handle_platform_output(window, output.platform_output);
        let pixels_per_point = output.pixels_per_point;
        UiFrame {
            primitives: self.context.tessellate(output.shapes, pixels_per_point),
            textures_delta: output.textures_delta,
            pixels_per_point,
        }
    }
}

/// Draws the panel folders as collapsible sections of sliders, plus a status
/// line per asset that is still loading or failed. Returns the sliders the
/// user moved this frame with their new values.
pub fn draw_panel(ctx: &egui::Context, app: &AppContext) -> Vec<(ControlId, f32)> {
    let mut changes = Vec::new();
    egui::Window::new("Controls")
        .anchor(egui::Align2::RIGHT_TOP, [-8.0, 8.0])
        .resizable(false)
        .default_width(280.0)
        .show(ctx, |ui| {
            for folder in app.panel.folders() {
                egui::CollapsingHeader::new(folder.as_str())
                    .default_open(true)
                    .show(ui, |ui| {
                        for control in app.panel.folder_controls(folder) {
                            let Some(mut value) = app.control_value(control.id) else {
                                continue;
                            };
                            let slider = egui::Slider::new(&mut value, control.min..=control.max)
                                .step_by(f64::from(control.step))
                                .text(control.label.as_str());
                            if ui.add(slider).changed() {
                                changes.push((control.id, value));
                            }
                        }
                    });
            }

            let status = app.status_lines();
            if !status.is_empty() {
                ui.separator();
                for line in status {
                    ui.label(line);
                }
            }
        });
    changes
}
