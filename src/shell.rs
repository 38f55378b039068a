//! Platform driver: owns the winit event loop, routes input to the orbit
//! controls and the panel, and runs one [`RenderLoop`] step per redraw.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use glam::Vec2;
use log::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy};
use winit::window::{Window, WindowId};

use crate::app::AppContext;
use crate::assets::LoadQueue;
use crate::input::{apply_drag, map_mouse_button, wheel_notches, PointerState};
use crate::render::Renderer;
use crate::render_loop::{LoopState, RenderLoop};
use crate::ui::{draw_panel, EguiHost};

const WINDOW_TITLE: &str = "envmap-viewer";

/// Canvas selectors tried in order by the web entry point.
pub const CANVAS_SELECTORS: [&str; 2] = ["canvas.webgl", "canvas"];

/// Runs `query` over [`CANVAS_SELECTORS`] and returns the first hit with the
/// selector that found it.
pub fn find_canvas_with<T, E>(
    mut query: impl FnMut(&str) -> Result<Option<T>, E>,
) -> Result<Option<(&'static str, T)>, E> {
    for selector in CANVAS_SELECTORS {
        if let Some(element) = query(selector)? {
            return Ok(Some((selector, element)));
        }
    }
    Ok(None)
}

/// Events delivered to the shell from outside winit.
pub enum ViewerEvent {
    /// The renderer finished initialising on the browser's event loop.
    RendererReady(Result<Renderer, String>),
}

/// The window, GPU renderer or event loop could not be created.
#[derive(Debug)]
pub struct WindowInitError {
    message: String,
}

impl WindowInitError {
    pub fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    pub fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

pub(crate) fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

pub struct ViewerShell {
    app: AppContext,
    queue: LoadQueue,
    render_loop: RenderLoop,
    pointer: PointerState,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    egui: Option<EguiHost>,
    #[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
    proxy: EventLoopProxy<ViewerEvent>,
    #[cfg(target_arch = "wasm32")]
    canvas: Option<web_sys::HtmlCanvasElement>,
    error: Option<anyhow::Error>,
}

impl ViewerShell {
    pub fn new(app: AppContext, queue: LoadQueue, proxy: EventLoopProxy<ViewerEvent>) -> Self {
        Self {
            app,
            queue,
            render_loop: RenderLoop::new(),
            pointer: PointerState::new(),
            window: None,
            renderer: None,
            egui: None,
            proxy,
            #[cfg(target_arch = "wasm32")]
            canvas: None,
            error: None,
        }
    }

    /// Error that ended the event loop, if any.
    pub fn finish(self) -> Result<()> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.render_loop.token().stop();
        self.error = Some(err);
        event_loop.exit();
    }

    fn window_attributes(&mut self) -> winit::window::WindowAttributes {
        let attributes = Window::default_attributes().with_title(WINDOW_TITLE);
        #[cfg(target_arch = "wasm32")]
        let attributes = {
            use winit::platform::web::WindowAttributesExtWebSys;
            attributes.with_canvas(self.canvas.take())
        };
        #[cfg(not(target_arch = "wasm32"))]
        let attributes = attributes.with_inner_size(winit::dpi::LogicalSize::new(
            self.app.viewport.width as f64,
            self.app.viewport.height as f64,
        ));
        attributes
    }

    fn install_renderer(&mut self, mut renderer: Renderer) {
        let window = renderer.window();
        let scale_factor = window.scale_factor();
        let size = window.inner_size().to_logical::<f64>(scale_factor);
        self.app.resize(
            &mut renderer,
            size.width.round() as u32,
            size.height.round() as u32,
            scale_factor,
        );
        info!("renderer ready");
        self.renderer = Some(renderer);
    }

    fn resize_to_window(&mut self) {
        let (Some(window), Some(renderer)) = (self.window.as_ref(), self.renderer.as_mut()) else {
            return;
        };
        let scale_factor = window.scale_factor();
        let size = window.inner_size().to_logical::<f64>(scale_factor);
        if self.app.resize(
            renderer,
            size.width.round() as u32,
            size.height.round() as u32,
            scale_factor,
        ) {
            debug!(
                "resized to {}x{} at pixel ratio {}",
                self.app.viewport.width, self.app.viewport.height, self.app.viewport.pixel_ratio
            );
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        self.app.apply_load_events(&self.queue);
        let (Some(window), Some(renderer)) = (self.window.as_ref(), self.renderer.as_mut()) else {
            return;
        };

        let mut changes = Vec::new();
        let overlay = self.egui.as_mut().map(|host| {
            let app = &self.app;
            host.run(window, |ctx| changes = draw_panel(ctx, app))
        });
        for (id, value) in changes {
            self.app.set_control(id, value);
        }

        match self
            .render_loop
            .step(&mut self.app, renderer, overlay.as_ref())
        {
            Ok(LoopState::Continue) => {}
            Ok(LoopState::Stopped) => event_loop.exit(),
            Err(err) => self.fail(event_loop, err),
        }
    }
}

impl ApplicationHandler<ViewerEvent> for ViewerShell {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attributes = self.window_attributes();
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                let err = WindowInitError::from_error("window", err);
                self.fail(event_loop, err.into());
                return;
            }
        };
        self.egui = Some(EguiHost::new(&window));
        self.window = Some(Arc::clone(&window));

        #[cfg(not(target_arch = "wasm32"))]
        {
            match pollster::block_on(Renderer::new(window)) {
                Ok(renderer) => self.install_renderer(renderer),
                Err(err) => {
                    let err = WindowInitError::from_error("renderer", format!("{err:#}"));
                    self.fail(event_loop, err.into());
                }
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let renderer = Renderer::new(window).await.map_err(|err| format!("{err:#}"));
                if proxy.send_event(ViewerEvent::RendererReady(renderer)).is_err() {
                    error!("event loop closed before the renderer was ready");
                }
            });
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            ViewerEvent::RendererReady(Ok(renderer)) => self.install_renderer(renderer),
            ViewerEvent::RendererReady(Err(message)) => {
                let err = WindowInitError::from_error("renderer", message);
                self.fail(event_loop, err.into());
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(window) = self.window.clone() else {
            return;
        };
        if window.id() != window_id {
            return;
        }
        let consumed = self
            .egui
            .as_mut()
            .is_some_and(|host| host.on_window_event(&window, &event));
        let over_panel = self
            .egui
            .as_ref()
            .is_some_and(EguiHost::wants_pointer_input);

        match event {
            WindowEvent::CloseRequested => {
                self.render_loop.token().stop();
                event_loop.exit();
            }
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                self.resize_to_window();
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let button = map_mouse_button(button);
                match state {
                    ElementState::Pressed if !consumed && !over_panel => {
                        self.pointer.press(button);
                    }
                    ElementState::Pressed => {}
                    ElementState::Released => self.pointer.release(button),
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let position = position.to_logical::<f32>(window.scale_factor());
                if let Some(drag) = self.pointer.move_to(Vec2::new(position.x, position.y)) {
                    let height = self.app.viewport.height as f32;
                    apply_drag(&mut self.app.controls, &self.app.scene.camera, drag, height);
                }
            }
            WindowEvent::CursorLeft { .. } => self.pointer.leave(),
            WindowEvent::MouseWheel { delta, .. } if !consumed && !over_panel => {
                self.app.controls.handle_wheel(wheel_notches(delta));
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

/// Opens a window and runs the viewer until it is closed. Window and GPU
/// failures surface as [`WindowInitError`] so callers can fall back to a
/// headless run.
#[cfg(not(target_arch = "wasm32"))]
pub fn run_native<S>(app: AppContext, source: S) -> Result<()>
where
    S: crate::assets::AssetSource + Clone + Send + 'static,
{
    use std::panic::{self, AssertUnwindSafe};

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(|| {
        EventLoop::<ViewerEvent>::with_user_event().build()
    }));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;

    let queue = LoadQueue::new();
    app.start_loading(&queue, source);
    let mut shell = ViewerShell::new(app, queue, event_loop.create_proxy());
    event_loop.run_app(&mut shell)?;
    shell.finish()
}

/// Attaches the viewer to `canvas` and hands the event loop to the browser.
#[cfg(target_arch = "wasm32")]
pub fn spawn_web<S>(app: AppContext, source: S, canvas: web_sys::HtmlCanvasElement) -> Result<()>
where
    S: crate::assets::AssetSource + Clone + 'static,
{
    use winit::platform::web::EventLoopExtWebSys;

    let event_loop = EventLoop::<ViewerEvent>::with_user_event().build()?;
    let queue = LoadQueue::new();
    app.start_loading(&queue, source);
    let mut shell = ViewerShell::new(app, queue, event_loop.create_proxy());
    shell.canvas = Some(canvas);
    event_loop.spawn_app(shell);
    Ok(())
}
