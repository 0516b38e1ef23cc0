use euclid::{default::Size2D, size2};
use glow::HasContext;

/// The drawing surface as seen by the application: viewport tracking and clearing.
pub struct Renderer {
    context: glow::Context,
    size: Size2D<u32>,
}

impl Renderer {
    pub fn new(context: glow::Context) -> Renderer {
        Renderer {
            context,
            size: size2(0, 0),
        }
    }

    pub fn init(&mut self, width: u32, height: u32) {
        log::info!("Renderer init at {}x{}", width, height);
        self.set_viewport(width, height);
    }

    pub fn on_window_resize(&mut self, width: u32, height: u32) {
        self.set_viewport(width, height);
    }

    pub fn size(&self) -> Size2D<u32> {
        self.size
    }

    pub unsafe fn clear(&mut self, color: [f32; 4]) {
        self.context
            .clear_color(color[0], color[1], color[2], color[3]);
        self.context.clear(glow::COLOR_BUFFER_BIT);
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.size = size2(width, height);
        unsafe {
            self.context.viewport(0, 0, width as i32, height as i32);
        }
    }
}
