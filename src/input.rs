use std::sync::mpsc;

use euclid::{
    default::{Point2D, Size2D},
    point2,
};
use thiserror::Error;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Key {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
    M,
    N,
    O,
    P,
    Q,
    R,
    S,
    T,
    U,
    V,
    W,
    X,
    Y,
    Z,
    Key0,
    Key1,
    Key2,
    Key3,
    Key4,
    Key5,
    Key6,
    Key7,
    Key8,
    Key9,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
    Numpad0,
    Numpad1,
    Numpad2,
    Numpad3,
    Numpad4,
    Numpad5,
    Numpad6,
    Numpad7,
    Numpad8,
    Numpad9,
    NumpadSlash,
    NumpadAsterisk,
    NumpadMinus,
    NumpadPlus,
    NumpadPeriod,
    Left,
    Right,
    Up,
    Down,
    Backspace,
    Tab,
    Enter,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    Shift,
    Control,
    Alt,
    LeftShift,
    RightShift,
    LeftControl,
    RightControl,
    LeftAlt,
    RightAlt,
    Escape,
    Space,
    Pause,
    NumLock,
    ScrollLock,
    CapsLock,
    PrintScreen,
    Comma,
    Period,
    Minus,
    Equals,
    Semicolon,
    Slash,
    GraveAccent,
    LeftSquareBracket,
    Backslash,
    RightSquareBracket,
    Apostrophe,
    MouseLeft,
    MouseRight,
    MouseWheel,
    Unknown,
}

impl Key {
    pub const LETTERS: [Key; 26] = [
        Key::A,
        Key::B,
        Key::C,
        Key::D,
        Key::E,
        Key::F,
        Key::G,
        Key::H,
        Key::I,
        Key::J,
        Key::K,
        Key::L,
        Key::M,
        Key::N,
        Key::O,
        Key::P,
        Key::Q,
        Key::R,
        Key::S,
        Key::T,
        Key::U,
        Key::V,
        Key::W,
        Key::X,
        Key::Y,
        Key::Z,
    ];

    pub const DIGITS: [Key; 10] = [
        Key::Key0,
        Key::Key1,
        Key::Key2,
        Key::Key3,
        Key::Key4,
        Key::Key5,
        Key::Key6,
        Key::Key7,
        Key::Key8,
        Key::Key9,
    ];

    /// Position of the key within its alphabetic or numeric range.
    pub fn letter_index(self) -> Option<usize> {
        Key::LETTERS.iter().position(|k| *k == self)
    }

    pub fn digit_index(self) -> Option<usize> {
        Key::DIGITS.iter().position(|k| *k == self)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum KeyState {
    Down,
    Up,
}

/// A platform event translated into engine terms.
///
/// Mouse positions are normalized to the unit square with the origin in the bottom-left corner of
/// the drawing surface. Messages without a button (moves, wheel turns) carry no key and report
/// `KeyState::Up`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum InputMessage {
    Keyboard {
        key: Key,
        state: KeyState,
    },
    Mouse {
        key: Option<Key>,
        state: KeyState,
        position: Point2D<f32>,
        wheel_delta: i32,
    },
}

impl InputMessage {
    pub fn keyboard(key: Key, state: KeyState) -> Self {
        InputMessage::Keyboard { key, state }
    }

    pub fn mouse(
        key: Option<Key>,
        state: KeyState,
        raw_position: Point2D<f64>,
        wheel_delta: i32,
        surface_size: Size2D<u32>,
    ) -> Result<Self, InputError> {
        Ok(InputMessage::Mouse {
            key,
            state,
            position: normalize_position(raw_position, surface_size)?,
            wheel_delta,
        })
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum InputError {
    #[error("window size is not known yet ({width}x{height}), cannot place mouse input")]
    UnknownWindowSize { width: u32, height: u32 },
}

/// Maps a pixel position (origin top-left) onto the unit square (origin bottom-left).
pub fn normalize_position(
    raw: Point2D<f64>,
    surface_size: Size2D<u32>,
) -> Result<Point2D<f32>, InputError> {
    if surface_size.width <= 1 || surface_size.height <= 1 {
        return Err(InputError::UnknownWindowSize {
            width: surface_size.width,
            height: surface_size.height,
        });
    }
    let x = raw.x / f64::from(surface_size.width - 1);
    let y = (f64::from(surface_size.height) - raw.y) / f64::from(surface_size.height - 1);
    // the cursor is still reported outside the client area while a button is held
    Ok(point2(x.max(0.).min(1.) as f32, y.max(0.).min(1.) as f32))
}

/// Creates the two ends of the input queue: the event thread pushes, the render loop polls.
pub fn input_queue() -> (InputSender, InputReceiver) {
    let (tx, rx) = mpsc::channel();
    (InputSender(tx), InputReceiver(rx))
}

#[derive(Clone)]
pub struct InputSender(mpsc::Sender<InputMessage>);

impl InputSender {
    pub fn push(&self, msg: InputMessage) {
        // nobody left to consume input once the render loop is gone
        if self.0.send(msg).is_err() {
            log::trace!("Dropping input message {:?}, receiver is closed", msg);
        }
    }
}

pub struct InputReceiver(mpsc::Receiver<InputMessage>);

impl InputReceiver {
    /// Oldest queued message, without blocking.
    pub fn poll(&self) -> Option<InputMessage> {
        self.0.try_recv().ok()
    }

    /// Everything queued so far, oldest first.
    pub fn drain(&self) -> impl Iterator<Item = InputMessage> + '_ {
        self.0.try_iter()
    }
}
