use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;

use crate::app::AppContext;
use crate::render::FrameTarget;
use crate::ui::UiFrame;

/// Shared cancellation flag for the render loop.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Continue,
    Stopped,
}

/// Per-frame driver. The platform shell calls [`RenderLoop::step`] once per
/// animation frame until it reports [`LoopState::Stopped`].
#[derive(Debug, Default)]
pub struct RenderLoop {
    token: StopToken,
    frames: u64,
}

impl RenderLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> StopToken {
        self.token.clone()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Advances the orbit controls, draws the frame and clears the material
    /// dirty flags the frame consumed.
    pub fn step<T>(
        &mut self,
        app: &mut AppContext,
        target: &mut T,
        overlay: Option<&UiFrame>,
    ) -> Result<LoopState>
    where
        T: FrameTarget + ?Sized,
    {
        if self.token.is_stopped() {
            return Ok(LoopState::Stopped);
        }
        app.controls.update(&mut app.scene.camera);
        target.render(&app.scene, overlay)?;
        app.scene.acknowledge_material_updates();
        self.frames += 1;
        Ok(LoopState::Continue)
    }
}
