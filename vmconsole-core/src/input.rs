//! Local input → remote input event conversion.
//!
//! Translates pointer and keyboard events captured by the host view
//! into the [`PointerEvent`] / [`KeyEvent`] values the transport
//! forwards to the remote session.

use bitflags::bitflags;

use crate::error::ConsoleError;
use crate::session::ClientProperties;
use crate::transport::RemoteTransport;

bitflags! {
    /// Pointer button mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PointerButtons: u8 {
        const LEFT        = 0b0000_0001;
        const MIDDLE      = 0b0000_0010;
        const RIGHT       = 0b0000_0100;
        const SCROLL_UP   = 0b0000_1000;
        const SCROLL_DOWN = 0b0001_0000;
    }
}

/// Pointer state in remote display coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerEvent {
    pub x: i32,
    pub y: i32,
    pub buttons: PointerButtons,
}

/// Key press or release, identified by X11 keysym.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub keysym: u32,
    pub pressed: bool,
}

impl KeyEvent {
    pub fn press(keysym: u32) -> Self {
        Self { keysym, pressed: true }
    }

    pub fn release(keysym: u32) -> Self {
        Self { keysym, pressed: false }
    }
}

/// Keysyms used by the console itself.
pub mod keysym {
    pub const RETURN: u32 = 0xFF0D;
    pub const CONTROL_LEFT: u32 = 0xFFE3;
    pub const ALT_LEFT: u32 = 0xFFE9;
    pub const DELETE: u32 = 0xFFFF;
}

/// Input as captured by the host view, in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocalInput {
    Pointer { x: f64, y: f64, buttons: PointerButtons },
    Key(KeyEvent),
}

// ── InputForwarder ───────────────────────────────────────────────

/// Thin pass-through from local input to the remote session.
pub struct InputForwarder;

impl InputForwarder {
    /// Map viewport coordinates onto the remote display, undoing the
    /// applied scale and the view's scroll offset.
    pub fn translate_pointer(x: f64, y: f64, buttons: PointerButtons, props: &ClientProperties) -> PointerEvent {
        let scale = if props.scale > 0.0 { props.scale } else { 1.0 };
        PointerEvent {
            x: ((x + props.scroll_left) / scale).floor() as i32,
            y: ((y + props.scroll_top) / scale).floor() as i32,
            buttons,
        }
    }

    /// Forward one input event. Returns `false` when it was dropped
    /// because the keyboard is disabled.
    pub fn forward(
        transport: &mut dyn RemoteTransport,
        props: &ClientProperties,
        input: LocalInput,
    ) -> Result<bool, ConsoleError> {
        match input {
            LocalInput::Pointer { x, y, buttons } => {
                transport.send_pointer(Self::translate_pointer(x, y, buttons, props))?;
                Ok(true)
            }
            LocalInput::Key(_) if !props.keyboard_enabled => Ok(false),
            LocalInput::Key(event) => {
                transport.send_key(event)?;
                Ok(true)
            }
        }
    }

    /// Ctrl, Alt, Delete pressed in order, then released in reverse.
    pub fn ctrl_alt_del_sequence() -> [KeyEvent; 6] {
        [
            KeyEvent::press(keysym::CONTROL_LEFT),
            KeyEvent::press(keysym::ALT_LEFT),
            KeyEvent::press(keysym::DELETE),
            KeyEvent::release(keysym::DELETE),
            KeyEvent::release(keysym::ALT_LEFT),
            KeyEvent::release(keysym::CONTROL_LEFT),
        ]
    }

    pub fn send_ctrl_alt_del(transport: &mut dyn RemoteTransport) -> Result<(), ConsoleError> {
        for event in Self::ctrl_alt_del_sequence() {
            transport.send_key(event)?;
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
