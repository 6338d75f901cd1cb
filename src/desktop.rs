use eframe::egui;

use crate::backend::RenderBackend;
use crate::color::{Rgb, rgb};
use crate::config::FluidConfiguration;
use crate::cpu::CpuBackend;
use crate::pointer::{PointerTracker, circle_points};
use crate::resolution::Dimensions;
use crate::service::FluidService;

const PRESETS: [&str; 3] = ["default", "smoke", "circle"];

/// Hosts a [`FluidService`] on the CPU backend inside an egui window.
pub struct FluidApp {
    service: FluidService<CpuBackend>,
    base_config: FluidConfiguration,
    /// `None` runs the configuration the app was started with.
    preset: Option<&'static str>,
    texture: Option<egui::TextureHandle>,
    tracker: PointerTracker,
    color: Rgb,
    paused: bool,
    frame_count: usize,
    /// Drawing-buffer pixels per screen point.
    pixel_scale: f32,
}

impl FluidApp {
    pub fn new(config: FluidConfiguration) -> Self {
        let mut app = Self {
            service: FluidService::new(config.clone()),
            base_config: config,
            preset: None,
            texture: None,
            tracker: PointerTracker::new(),
            color: rgb(25, 25, 127),
            paused: false,
            frame_count: 0,
            pixel_scale: 0.5,
        };
        app.rebind(Dimensions::new(320, 240));
        app
    }

    fn rebind(&mut self, surface: Dimensions) {
        let mut config = self
            .preset
            .and_then(FluidConfiguration::preset)
            .unwrap_or_else(|| self.base_config.clone());
        config.sim_resolution = self.base_config.sim_resolution;
        config.dye_resolution = self.base_config.dye_resolution;

        self.service = FluidService::new(config);
        self.tracker.reset();
        self.frame_count = 0;
        if let Err(err) = self
            .service
            .bind(CpuBackend::new(surface.width, surface.height))
        {
            log::error!("failed to bind fluid service: {}", err);
        }
    }

    fn surface(&self) -> Dimensions {
        self.service
            .backend()
            .map(|backend| backend.drawing_buffer_size())
            .unwrap_or_default()
    }

    fn handle_pointer(&mut self, response: &egui::Response, rect: egui::Rect) {
        let surface = self.surface();

        if response.dragged_by(egui::PointerButton::Primary) {
            if let Some(pos) = response.interact_pointer_pos() {
                let px = (pos.x - rect.left()) * surface.width as f32 / rect.width();
                let py = (pos.y - rect.top()) * surface.height as f32 / rect.height();
                if let Some(movement) = self.tracker.track(px, py, surface) {
                    if let Err(err) = self.service.splat_movement(&movement, self.color) {
                        log::error!("splat failed: {}", err);
                    }
                }
            }
        } else {
            self.tracker.reset();
        }

        if response.secondary_clicked() {
            if let Err(err) = self.service.multiple_splats(10) {
                log::error!("splats failed: {}", err);
            }
        }
    }
}

impl eframe::App for FluidApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("liquidglow");

            ui.horizontal(|ui| {
                if ui.button("Pause/Resume").clicked() {
                    self.paused = !self.paused;
                }
                if ui.button("Random splats").clicked() {
                    if let Err(err) = self.service.multiple_splats(10) {
                        log::error!("splats failed: {}", err);
                    }
                }

                if ui.button("Ring").clicked() {
                    let surface = self.surface();
                    let force = self.service.config().splat_force;
                    for point in circle_points((0.5, 0.5), 24, 0.1, 0.05, surface) {
                        let dx = (point.delta_x - point.x) * force;
                        let dy = (point.delta_y - point.y) * force;
                        if let Err(err) = self.service.splat(point.x, point.y, dx, dy, self.color) {
                            log::error!("splat failed: {}", err);
                            break;
                        }
                    }
                }

                ui.label("Preset:");
                for preset in PRESETS {
                    if ui.selectable_label(self.preset == Some(preset), preset).clicked()
                        && self.preset != Some(preset)
                    {
                        self.preset = Some(preset);
                        let surface = self.surface();
                        self.rebind(surface);
                    }
                }

                ui.add(egui::Slider::new(&mut self.pixel_scale, 0.25..=1.0).text("Pixel Scale"));
            });

            ui.separator();

            let available = ui.available_size();
            let (rect, response) = ui.allocate_exact_size(
                egui::Vec2::new(available.x, (available.y - 24.0).max(1.0)),
                egui::Sense::click_and_drag(),
            );

            let width = ((rect.width() * self.pixel_scale) as u32).max(1);
            let height = ((rect.height() * self.pixel_scale) as u32).max(1);
            if let Some(backend) = self.service.backend_mut() {
                backend.set_drawing_buffer_size(width, height);
            }

            self.handle_pointer(&response, rect);

            if !self.paused && self.service.is_bound() {
                match self.service.tick() {
                    Ok(()) => self.frame_count += 1,
                    Err(err) => log::error!("tick failed: {}", err),
                }
            }

            if let Some(backend) = self.service.backend() {
                let size = backend.drawing_buffer_size();
                let image = egui::ColorImage::from_rgba_premultiplied(
                    [size.width as usize, size.height as usize],
                    &backend.read_surface_rgba8(),
                );
                match &mut self.texture {
                    Some(texture) => texture.set(image, egui::TextureOptions::LINEAR),
                    None => {
                        self.texture =
                            Some(ctx.load_texture("fluid", image, egui::TextureOptions::LINEAR));
                    }
                }
            }

            if let Some(texture) = &self.texture {
                ui.painter().rect_filled(rect, 0.0, egui::Color32::BLACK);
                ui.painter().image(
                    texture.id(),
                    rect,
                    egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                    egui::Color32::WHITE,
                );
            }

            let surface = self.surface();
            ui.label(format!(
                "Frame: {} | Surface: {}x{} | Left-drag: push dye | Right-click: random splats",
                self.frame_count, surface.width, surface.height
            ));
        });

        ctx.request_repaint();
    }
}
