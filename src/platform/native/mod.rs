mod audio;

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    thread,
    time::Instant,
};

use anyhow::{format_err, Error};
use euclid::{
    default::{Point2D, Size2D},
    point2, size2,
};
use glutin::{
    dpi::{LogicalSize, PhysicalSize},
    event::{
        ElementState, Event, KeyboardInput, ModifiersState, MouseButton as GlutinMouseButton,
        MouseScrollDelta, VirtualKeyCode, WindowEvent,
    },
    event_loop::{ControlFlow, EventLoop, EventLoopProxy},
    window::{Fullscreen, Window},
    NotCurrent, RawContext,
};

use crate::{
    constants::WHEEL_DELTA,
    input::{input_queue, InputError, InputMessage, InputReceiver, InputSender, Key, KeyState},
    platform::fatal,
    renderer::Renderer,
};

pub use audio::{start_audio_playback, AudioError, AudioOutput};

#[derive(Copy, Clone, Debug, PartialEq)]
enum PlatformEvent {
    SetFullScreen(bool),
    Close,
}

/// Window sizes and mode shared between the event thread and the render thread.
///
/// `client_size` is what the window system last reported. `surface_size` is what the renderer
/// and the input translator use; it only catches up at present time.
struct WindowState {
    client_size: Mutex<Size2D<u32>>,
    surface_size: Mutex<Size2D<u32>>,
    full_screen: AtomicBool,
}

impl WindowState {
    fn new(size: Size2D<u32>) -> Self {
        Self {
            client_size: Mutex::new(size),
            surface_size: Mutex::new(size),
            full_screen: AtomicBool::new(false),
        }
    }

    fn set_client_size(&self, size: Size2D<u32>) {
        *self
            .client_size
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = size;
    }

    fn surface_size(&self) -> Size2D<u32> {
        *self
            .surface_size
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Adopts the client size as the new surface size if they differ.
    fn take_resize(&self) -> Option<Size2D<u32>> {
        let client_size = *self
            .client_size
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut surface_size = self
            .surface_size
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *surface_size == client_size {
            None
        } else {
            *surface_size = client_size;
            Some(client_size)
        }
    }

    /// Returns whether the mode changed.
    fn set_full_screen(&self, enable: bool) -> bool {
        self.full_screen.swap(enable, Ordering::AcqRel) != enable
    }

    fn is_full_screen(&self) -> bool {
        self.full_screen.load(Ordering::Acquire)
    }
}

/// Handle to the window for the application. Requests are carried out on the event thread.
#[derive(Clone)]
pub struct WindowControl {
    state: Arc<WindowState>,
    proxy: EventLoopProxy<PlatformEvent>,
}

impl WindowControl {
    pub fn toggle_fullscreen(&self) {
        self.set_full_screen(!self.is_full_screen());
    }

    pub fn is_full_screen(&self) -> bool {
        self.state.is_full_screen()
    }

    pub fn set_full_screen(&self, enable: bool) {
        if self.state.set_full_screen(enable) {
            self.send(PlatformEvent::SetFullScreen(enable));
        }
    }

    pub fn close(&self) {
        self.send(PlatformEvent::Close);
    }

    /// Size of the drawing surface as of the last presented frame.
    pub fn surface_size(&self) -> Size2D<u32> {
        self.state.surface_size()
    }

    fn send(&self, event: PlatformEvent) {
        if self.proxy.send_event(event).is_err() {
            log::debug!("Event loop is gone, dropping {:?}", event);
        }
    }
}

/// Creates the window, starts the render thread and runs the event loop on the calling thread.
///
/// `f` runs once on the render thread with the GL context current and returns the per-frame
/// update function. Each frame that function gets the elapsed time and every input message queued
/// since the previous frame, in order; returning `false` closes the window.
pub fn run<F, U>(title: &str, size: (u32, u32), f: F) -> !
where
    F: FnOnce(&mut Renderer, WindowControl) -> U + Send + 'static,
    U: FnMut(f32, &[InputMessage], &mut Renderer) -> bool,
{
    env_logger::init();
    let event_loop = EventLoop::<PlatformEvent>::with_user_event();
    let wb = glutin::window::WindowBuilder::new()
        .with_title(title)
        .with_inner_size(LogicalSize::new(size.0, size.1))
        .with_resizable(true);
    let windowed_context = match glutin::ContextBuilder::new()
        .with_gl(glutin::GlRequest::Specific(glutin::Api::OpenGlEs, (2, 0)))
        .with_vsync(true)
        .build_windowed(wb, &event_loop)
    {
        Ok(windowed_context) => windowed_context,
        Err(e) => fatal(&format_err!("Can't create the GL context: {}", e)),
    };
    let (raw_context, window) = unsafe { windowed_context.split() };

    let inner_size = window.inner_size();
    let window_state = Arc::new(WindowState::new(size2(inner_size.width, inner_size.height)));
    let control = WindowControl {
        state: Arc::clone(&window_state),
        proxy: event_loop.create_proxy(),
    };
    let (input_sender, input_receiver) = input_queue();

    let spawned = thread::Builder::new().name("render".into()).spawn({
        let control = control.clone();
        let window_state = Arc::clone(&window_state);
        move || {
            if let Err(e) = render_loop(raw_context, control, window_state, input_receiver, f) {
                fatal(&e);
            }
        }
    });
    if let Err(e) = spawned {
        fatal(&Error::new(e).context("Can't start the render thread"));
    }

    let mut translator = InputTranslator::new(input_sender, Arc::clone(&window_state));
    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Wait;
        let result = match event {
            Event::UserEvent(PlatformEvent::SetFullScreen(enable)) => {
                apply_full_screen(&window, enable);
                Ok(())
            }
            Event::UserEvent(PlatformEvent::Close) => {
                *control_flow = ControlFlow::Exit;
                Ok(())
            }
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => {
                    *control_flow = ControlFlow::Exit;
                    Ok(())
                }
                WindowEvent::Resized(size) => {
                    window_state.set_client_size(size2(size.width, size.height));
                    Ok(())
                }
                WindowEvent::ModifiersChanged(modifiers) => {
                    translator.on_modifiers_changed(modifiers);
                    Ok(())
                }
                WindowEvent::KeyboardInput {
                    input:
                        KeyboardInput {
                            virtual_keycode,
                            state,
                            ..
                        },
                    ..
                } => {
                    if translator.on_key(virtual_keycode, state) == KeyOutcome::ToggleFullscreen {
                        control.toggle_fullscreen();
                    }
                    Ok(())
                }
                WindowEvent::MouseInput { state, button, .. } => {
                    translator.on_mouse_button(button, state)
                }
                WindowEvent::CursorMoved { position, .. } => {
                    translator.on_cursor_moved(point2(position.x, position.y))
                }
                WindowEvent::MouseWheel { delta, .. } => translator.on_mouse_wheel(delta),
                _ => Ok(()),
            },
            _ => Ok(()),
        };
        if let Err(e) = result {
            fatal(&e.into());
        }
    })
}

fn render_loop<F, U>(
    context: RawContext<NotCurrent>,
    control: WindowControl,
    window_state: Arc<WindowState>,
    input: InputReceiver,
    f: F,
) -> Result<(), Error>
where
    F: FnOnce(&mut Renderer, WindowControl) -> U,
    U: FnMut(f32, &[InputMessage], &mut Renderer) -> bool,
{
    let context = unsafe { context.make_current() }
        .map_err(|(_, e)| format_err!("Can't make the GL context current: {}", e))?;
    let mut renderer = Renderer::new(glow::Context::from_loader_function(|addr| {
        context.get_proc_address(addr)
    }));
    let size = window_state.surface_size();
    renderer.init(size.width, size.height);

    let mut update_fn = f(&mut renderer, control.clone());

    let mut inputs = Vec::new();
    let mut last_time = Instant::now();
    loop {
        inputs.clear();
        inputs.extend(input.drain());

        let now = Instant::now();
        let dt = (now - last_time).as_micros() as f32 / 1_000_000.;
        last_time = now;
        if !update_fn(dt, &inputs, &mut renderer) {
            break;
        }

        context
            .swap_buffers()
            .map_err(|e| format_err!("SwapBuffers error in present: {}", e))?;
        if let Some(size) = window_state.take_resize() {
            log::info!("Resize to {:?}", size);
            context.resize(PhysicalSize::new(size.width, size.height));
            renderer.on_window_resize(size.width, size.height);
        }
    }

    control.close();
    Ok(())
}

fn apply_full_screen(window: &Window, enable: bool) {
    log::info!("Full screen: {}", enable);
    if enable {
        window.set_fullscreen(Some(Fullscreen::Borderless(window.current_monitor())));
    } else {
        window.set_fullscreen(None);
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum KeyOutcome {
    Queued,
    ToggleFullscreen,
}

/// Turns window events into input messages on the event thread.
struct InputTranslator {
    sender: InputSender,
    window_state: Arc<WindowState>,
    cursor: Point2D<f64>,
    modifiers: ModifiersState,
}

impl InputTranslator {
    fn new(sender: InputSender, window_state: Arc<WindowState>) -> Self {
        Self {
            sender,
            window_state,
            cursor: point2(0., 0.),
            modifiers: ModifiersState::empty(),
        }
    }

    fn on_key(&mut self, key: Option<VirtualKeyCode>, state: ElementState) -> KeyOutcome {
        // Alt+Enter belongs to the platform
        if key == Some(VirtualKeyCode::Return) && self.modifiers.alt() {
            if state == ElementState::Pressed {
                return KeyOutcome::ToggleFullscreen;
            }
            return KeyOutcome::Queued;
        }
        let key = key.map(translate_key_code).unwrap_or(Key::Unknown);
        self.sender
            .push(InputMessage::keyboard(key, translate_state(state)));
        KeyOutcome::Queued
    }

    /// Reports side-independent Shift, Control and Alt presses and releases.
    fn on_modifiers_changed(&mut self, modifiers: ModifiersState) {
        let generic = [
            (ModifiersState::SHIFT, Key::Shift),
            (ModifiersState::CTRL, Key::Control),
            (ModifiersState::ALT, Key::Alt),
        ];
        for (flag, key) in generic.iter() {
            let was_down = self.modifiers.contains(*flag);
            let is_down = modifiers.contains(*flag);
            if was_down != is_down {
                let state = if is_down { KeyState::Down } else { KeyState::Up };
                self.sender.push(InputMessage::keyboard(*key, state));
            }
        }
        self.modifiers = modifiers;
    }

    fn on_mouse_button(
        &mut self,
        button: GlutinMouseButton,
        state: ElementState,
    ) -> Result<(), InputError> {
        self.push_mouse(Some(translate_mouse_button(button)), translate_state(state), 0)
    }

    fn on_cursor_moved(&mut self, position: Point2D<f64>) -> Result<(), InputError> {
        self.cursor = position;
        self.push_mouse(None, KeyState::Up, 0)
    }

    fn on_mouse_wheel(&mut self, delta: MouseScrollDelta) -> Result<(), InputError> {
        let wheel_delta = match delta {
            MouseScrollDelta::LineDelta(_, y) => (y * WHEEL_DELTA) as i32,
            MouseScrollDelta::PixelDelta(p) => p.y as i32,
        };
        self.push_mouse(None, KeyState::Up, wheel_delta)
    }

    fn push_mouse(
        &mut self,
        key: Option<Key>,
        state: KeyState,
        wheel_delta: i32,
    ) -> Result<(), InputError> {
        let msg = InputMessage::mouse(
            key,
            state,
            self.cursor,
            wheel_delta,
            self.window_state.surface_size(),
        )?;
        self.sender.push(msg);
        Ok(())
    }
}

fn translate_state(state: ElementState) -> KeyState {
    match state {
        ElementState::Pressed => KeyState::Down,
        ElementState::Released => KeyState::Up,
    }
}

fn translate_mouse_button(button: GlutinMouseButton) -> Key {
    match button {
        GlutinMouseButton::Left => Key::MouseLeft,
        GlutinMouseButton::Right => Key::MouseRight,
        GlutinMouseButton::Middle => Key::MouseWheel,
        GlutinMouseButton::Other(_) => Key::Unknown,
    }
}

fn translate_key_code(vk: VirtualKeyCode) -> Key {
    match vk {
        VirtualKeyCode::A => Key::A,
        VirtualKeyCode::B => Key::B,
        VirtualKeyCode::C => Key::C,
        VirtualKeyCode::D => Key::D,
        VirtualKeyCode::E => Key::E,
        VirtualKeyCode::F => Key::F,
        VirtualKeyCode::G => Key::G,
        VirtualKeyCode::H => Key::H,
        VirtualKeyCode::I => Key::I,
        VirtualKeyCode::J => Key::J,
        VirtualKeyCode::K => Key::K,
        VirtualKeyCode::L => Key::L,
        VirtualKeyCode::M => Key::M,
        VirtualKeyCode::N => Key::N,
        VirtualKeyCode::O => Key::O,
        VirtualKeyCode::P => Key::P,
        VirtualKeyCode::Q => Key::Q,
        VirtualKeyCode::R => Key::R,
        VirtualKeyCode::S => Key::S,
        VirtualKeyCode::T => Key::T,
        VirtualKeyCode::U => Key::U,
        VirtualKeyCode::V => Key::V,
        VirtualKeyCode::W => Key::W,
        VirtualKeyCode::X => Key::X,
        VirtualKeyCode::Y => Key::Y,
        VirtualKeyCode::Z => Key::Z,
        VirtualKeyCode::Key0 => Key::Key0,
        VirtualKeyCode::Key1 => Key::Key1,
        VirtualKeyCode::Key2 => Key::Key2,
        VirtualKeyCode::Key3 => Key::Key3,
        VirtualKeyCode::Key4 => Key::Key4,
        VirtualKeyCode::Key5 => Key::Key5,
        VirtualKeyCode::Key6 => Key::Key6,
        VirtualKeyCode::Key7 => Key::Key7,
        VirtualKeyCode::Key8 => Key::Key8,
        VirtualKeyCode::Key9 => Key::Key9,
        VirtualKeyCode::F1 => Key::F1,
        VirtualKeyCode::F2 => Key::F2,
        VirtualKeyCode::F3 => Key::F3,
        VirtualKeyCode::F4 => Key::F4,
        VirtualKeyCode::F5 => Key::F5,
        VirtualKeyCode::F6 => Key::F6,
        VirtualKeyCode::F7 => Key::F7,
        VirtualKeyCode::F8 => Key::F8,
        VirtualKeyCode::F9 => Key::F9,
        VirtualKeyCode::F10 => Key::F10,
        VirtualKeyCode::F11 => Key::F11,
        VirtualKeyCode::F12 => Key::F12,
        VirtualKeyCode::Numpad0 => Key::Numpad0,
        VirtualKeyCode::Numpad1 => Key::Numpad1,
        VirtualKeyCode::Numpad2 => Key::Numpad2,
        VirtualKeyCode::Numpad3 => Key::Numpad3,
        VirtualKeyCode::Numpad4 => Key::Numpad4,
        VirtualKeyCode::Numpad5 => Key::Numpad5,
        VirtualKeyCode::Numpad6 => Key::Numpad6,
        VirtualKeyCode::Numpad7 => Key::Numpad7,
        VirtualKeyCode::Numpad8 => Key::Numpad8,
        VirtualKeyCode::Numpad9 => Key::Numpad9,
        VirtualKeyCode::Divide => Key::NumpadSlash,
        VirtualKeyCode::Multiply => Key::NumpadAsterisk,
        VirtualKeyCode::Subtract => Key::NumpadMinus,
        VirtualKeyCode::Add => Key::NumpadPlus,
        VirtualKeyCode::Decimal => Key::NumpadPeriod,
        VirtualKeyCode::NumpadEnter => Key::Enter,
        VirtualKeyCode::Left => Key::Left,
        VirtualKeyCode::Right => Key::Right,
        VirtualKeyCode::Up => Key::Up,
        VirtualKeyCode::Down => Key::Down,
        VirtualKeyCode::Back => Key::Backspace,
        VirtualKeyCode::Tab => Key::Tab,
        VirtualKeyCode::Return => Key::Enter,
        VirtualKeyCode::Home => Key::Home,
        VirtualKeyCode::End => Key::End,
        VirtualKeyCode::PageUp => Key::PageUp,
        VirtualKeyCode::PageDown => Key::PageDown,
        VirtualKeyCode::Insert => Key::Insert,
        VirtualKeyCode::Delete => Key::Delete,
        VirtualKeyCode::LShift => Key::LeftShift,
        VirtualKeyCode::RShift => Key::RightShift,
        VirtualKeyCode::LControl => Key::LeftControl,
        VirtualKeyCode::RControl => Key::RightControl,
        VirtualKeyCode::LAlt => Key::LeftAlt,
        VirtualKeyCode::RAlt => Key::RightAlt,
        VirtualKeyCode::Escape => Key::Escape,
        VirtualKeyCode::Space => Key::Space,
        VirtualKeyCode::Pause => Key::Pause,
        VirtualKeyCode::Numlock => Key::NumLock,
        VirtualKeyCode::Scroll => Key::ScrollLock,
        VirtualKeyCode::Capital => Key::CapsLock,
        VirtualKeyCode::Snapshot => Key::PrintScreen,
        VirtualKeyCode::Comma => Key::Comma,
        VirtualKeyCode::Period => Key::Period,
        VirtualKeyCode::Minus => Key::Minus,
        VirtualKeyCode::Equals => Key::Equals,
        VirtualKeyCode::Semicolon => Key::Semicolon,
        VirtualKeyCode::Slash => Key::Slash,
        VirtualKeyCode::Grave => Key::GraveAccent,
        VirtualKeyCode::LBracket => Key::LeftSquareBracket,
        VirtualKeyCode::Backslash => Key::Backslash,
        VirtualKeyCode::RBracket => Key::RightSquareBracket,
        VirtualKeyCode::Apostrophe => Key::Apostrophe,
        _ => Key::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator(size: Size2D<u32>) -> (InputTranslator, InputReceiver) {
        let (sender, receiver) = input_queue();
        let state = Arc::new(WindowState::new(size));
        (InputTranslator::new(sender, state), receiver)
    }

    #[test]
    fn key_codes_translate_by_range_and_name() {
        assert_eq!(translate_key_code(VirtualKeyCode::Q), Key::Q);
        assert_eq!(translate_key_code(VirtualKeyCode::Key7), Key::Key7);
        assert_eq!(translate_key_code(VirtualKeyCode::F11), Key::F11);
        assert_eq!(translate_key_code(VirtualKeyCode::Numpad3), Key::Numpad3);
        assert_eq!(translate_key_code(VirtualKeyCode::Back), Key::Backspace);
        assert_eq!(translate_key_code(VirtualKeyCode::LBracket), Key::LeftSquareBracket);
        assert_eq!(translate_key_code(VirtualKeyCode::Mail), Key::Unknown);
        assert_eq!(translate_mouse_button(GlutinMouseButton::Middle), Key::MouseWheel);
        assert_eq!(translate_mouse_button(GlutinMouseButton::Other(8)), Key::Unknown);
    }

    #[test]
    fn events_are_queued_in_order() {
        let (mut translator, receiver) = translator(size2(201, 101));
        translator.on_key(Some(VirtualKeyCode::A), ElementState::Pressed);
        translator.on_cursor_moved(point2(100., 51.)).unwrap();
        translator.on_key(Some(VirtualKeyCode::A), ElementState::Released);
        translator.on_key(None, ElementState::Pressed);

        assert_eq!(
            receiver.poll(),
            Some(InputMessage::keyboard(Key::A, KeyState::Down))
        );
        assert_eq!(
            receiver.poll(),
            Some(InputMessage::Mouse {
                key: None,
                state: KeyState::Up,
                position: point2(0.5, 0.5),
                wheel_delta: 0,
            })
        );
        assert_eq!(
            receiver.poll(),
            Some(InputMessage::keyboard(Key::A, KeyState::Up))
        );
        assert_eq!(
            receiver.poll(),
            Some(InputMessage::keyboard(Key::Unknown, KeyState::Down))
        );
        assert_eq!(receiver.poll(), None);
    }

    #[test]
    fn wheel_and_buttons_use_last_cursor_position() {
        let (mut translator, receiver) = translator(size2(11, 11));
        translator.on_cursor_moved(point2(10., 11.)).unwrap();
        translator
            .on_mouse_wheel(MouseScrollDelta::LineDelta(0., -2.))
            .unwrap();
        translator
            .on_mouse_button(GlutinMouseButton::Right, ElementState::Pressed)
            .unwrap();

        let drained: Vec<_> = receiver.drain().collect();
        assert_eq!(drained.len(), 3);
        assert_eq!(
            drained[1],
            InputMessage::Mouse {
                key: None,
                state: KeyState::Up,
                position: point2(1., 0.),
                wheel_delta: -240,
            }
        );
        assert_eq!(
            drained[2],
            InputMessage::Mouse {
                key: Some(Key::MouseRight),
                state: KeyState::Down,
                position: point2(1., 0.),
                wheel_delta: 0,
            }
        );
    }

    #[test]
    fn mouse_input_without_window_size_fails() {
        let (mut translator, receiver) = translator(size2(0, 0));
        assert!(translator.on_cursor_moved(point2(3., 3.)).is_err());
        assert_eq!(receiver.poll(), None);
    }

    #[test]
    fn alt_enter_toggles_fullscreen_instead_of_queueing() {
        let (mut translator, receiver) = translator(size2(100, 100));
        translator.modifiers = ModifiersState::ALT;
        assert_eq!(
            translator.on_key(Some(VirtualKeyCode::Return), ElementState::Pressed),
            KeyOutcome::ToggleFullscreen
        );
        assert_eq!(
            translator.on_key(Some(VirtualKeyCode::Return), ElementState::Released),
            KeyOutcome::Queued
        );
        assert_eq!(receiver.poll(), None);

        translator.modifiers = ModifiersState::empty();
        translator.on_key(Some(VirtualKeyCode::Return), ElementState::Pressed);
        assert_eq!(
            receiver.poll(),
            Some(InputMessage::keyboard(Key::Enter, KeyState::Down))
        );
    }

    #[test]
    fn modifier_changes_report_generic_keys() {
        let (mut translator, receiver) = translator(size2(100, 100));
        translator.on_modifiers_changed(ModifiersState::SHIFT | ModifiersState::ALT);
        translator.on_modifiers_changed(ModifiersState::ALT | ModifiersState::CTRL);
        translator.on_modifiers_changed(ModifiersState::ALT | ModifiersState::CTRL);
        translator.on_modifiers_changed(ModifiersState::empty());

        let drained: Vec<_> = receiver.drain().collect();
        assert_eq!(
            drained,
            vec![
                InputMessage::keyboard(Key::Shift, KeyState::Down),
                InputMessage::keyboard(Key::Alt, KeyState::Down),
                InputMessage::keyboard(Key::Shift, KeyState::Up),
                InputMessage::keyboard(Key::Control, KeyState::Down),
                InputMessage::keyboard(Key::Control, KeyState::Up),
                InputMessage::keyboard(Key::Alt, KeyState::Up),
            ]
        );
        assert!(translator.modifiers.is_empty());
    }

    #[test]
    fn resize_is_picked_up_lazily() {
        let state = WindowState::new(size2(800, 500));
        assert_eq!(state.take_resize(), None);

        state.set_client_size(size2(640, 480));
        assert_eq!(state.surface_size(), size2(800, 500));
        assert_eq!(state.take_resize(), Some(size2(640, 480)));
        assert_eq!(state.surface_size(), size2(640, 480));
        assert_eq!(state.take_resize(), None);
    }

    #[test]
    fn full_screen_changes_only_when_different() {
        let state = WindowState::new(size2(800, 500));
        assert!(!state.is_full_screen());
        assert!(!state.set_full_screen(false));
        assert!(state.set_full_screen(true));
        assert!(state.is_full_screen());
        assert!(!state.set_full_screen(true));
        assert!(state.set_full_screen(false));
    }
}
