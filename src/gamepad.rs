//! Gamepad input through the Linux joystick interface (`/dev/input/js*`).
//!
//! The device is opened non-blocking and drained once per frame. Button and
//! axis events are folded into [`RawInput`] as pad controls.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use nix::fcntl::OFlag;

use crate::config::InputConfig;
use crate::input::{Control, PadButton, RawInput};

const JS_EVENT_BUTTON: u8 = 0x01;
const JS_EVENT_AXIS: u8 = 0x02;
const JS_EVENT_INIT: u8 = 0x80;
const EVENT_SIZE: usize = 8;
/// Frames between attempts to open a missing device.
const REOPEN_INTERVAL: u32 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsEvent {
    pub value: i16,
    pub kind: u8,
    pub number: u8,
}

impl JsEvent {
    pub fn parse(buf: &[u8; EVENT_SIZE]) -> Self {
        // bytes 0..4 are a millisecond timestamp, unused here
        Self {
            value: i16::from_ne_bytes([buf[4], buf[5]]),
            kind: buf[6],
            number: buf[7],
        }
    }
}

/// Horizontal axes: left stick and d-pad hat.
const X_AXES: [u8; 2] = [0, 6];
const Y_AXES: [u8; 2] = [1, 7];
const AXIS_COUNT: usize = 8;

/// Which joystick numbers mean what, plus the last reported position of
/// every axis so that stick and hat never release each other.
#[derive(Debug, Clone, Copy)]
pub struct PadMapping {
    pub confirm: u8,
    pub back: u8,
    pub axis_threshold: i16,
    axes: [i16; AXIS_COUNT],
}

impl From<&InputConfig> for PadMapping {
    fn from(config: &InputConfig) -> Self {
        Self {
            confirm: config.pad_confirm,
            back: config.pad_back,
            axis_threshold: config.axis_threshold,
            axes: [0; AXIS_COUNT],
        }
    }
}

impl PadMapping {
    fn button(&self, number: u8) -> PadButton {
        if number == self.confirm {
            PadButton::Confirm
        } else if number == self.back {
            PadButton::Back
        } else {
            PadButton::Other(number)
        }
    }

    fn any_axis(&self, axes: [u8; 2], pressed: impl Fn(i16) -> bool) -> bool {
        axes.iter().any(|&a| pressed(self.axes[a as usize]))
    }

    /// Applies one event to `raw`.
    pub fn apply(&mut self, event: JsEvent, raw: &mut RawInput) {
        match event.kind & !JS_EVENT_INIT {
            JS_EVENT_BUTTON => {
                let control = Control::Pad(self.button(event.number));
                if event.value != 0 {
                    raw.press(control);
                } else {
                    raw.release(control);
                }
            }
            JS_EVENT_AXIS => {
                // 0/1 are the left stick, 6/7 the d-pad hat on most pads
                let (axes, negative, positive) = if X_AXES.contains(&event.number) {
                    (X_AXES, PadButton::Left, PadButton::Right)
                } else if Y_AXES.contains(&event.number) {
                    (Y_AXES, PadButton::Up, PadButton::Down)
                } else {
                    return;
                };
                self.axes[event.number as usize] = event.value;

                let threshold = self.axis_threshold.max(1);
                let neg = self.any_axis(axes, |v| v <= -threshold);
                let pos = !neg && self.any_axis(axes, |v| v >= threshold);
                for (button, down) in [(negative, neg), (positive, pos)] {
                    let control = Control::Pad(button);
                    match (down, raw.is_held(control)) {
                        (true, false) => raw.press(control),
                        (false, true) => raw.release(control),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
}

pub struct Gamepad {
    path: PathBuf,
    mapping: PadMapping,
    device: Option<File>,
    retry_in: u32,
}

impl Gamepad {
    pub fn new(path: impl Into<PathBuf>, mapping: PadMapping) -> Self {
        Self {
            path: path.into(),
            mapping,
            device: None,
            retry_in: 0,
        }
    }

    fn open(path: &Path) -> std::io::Result<File> {
        OpenOptions::new()
            .read(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(path)
    }

    /// Drains pending events into `raw`, opening the device if needed.
    pub fn poll(&mut self, raw: &mut RawInput) {
        if self.device.is_none() {
            if self.retry_in > 0 {
                self.retry_in -= 1;
                return;
            }
            match Self::open(&self.path) {
                Ok(file) => {
                    info!("Gamepad: opened {}", self.path.display());
                    self.device = Some(file);
                }
                Err(e) => {
                    debug!("Gamepad: {} unavailable: {}", self.path.display(), e);
                    self.retry_in = REOPEN_INTERVAL;
                    return;
                }
            }
        }

        let Some(device) = self.device.as_mut() else { return };
        let mut buf = [0u8; EVENT_SIZE];
        loop {
            match device.read_exact(&mut buf) {
                Ok(()) => self.mapping.apply(JsEvent::parse(&buf), raw),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("Gamepad: lost {}: {}", self.path.display(), e);
                    self.device = None;
                    self.retry_in = REOPEN_INTERVAL;
                    self.mapping.axes = [0; AXIS_COUNT];
                    raw.release_device(|c| !matches!(c, Control::Pad(_)));
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputSampler;

    fn event(kind: u8, number: u8, value: i16) -> JsEvent {
        JsEvent { value, kind, number }
    }

    fn mapping() -> PadMapping {
        PadMapping::from(&InputConfig::default())
    }

    #[test]
    fn parse_native_layout() {
        let mut buf = [0u8; EVENT_SIZE];
        buf[0..4].copy_from_slice(&1234u32.to_ne_bytes());
        buf[4..6].copy_from_slice(&(-32767i16).to_ne_bytes());
        buf[6] = JS_EVENT_AXIS;
        buf[7] = 1;
        assert_eq!(JsEvent::parse(&buf), event(JS_EVENT_AXIS, 1, -32767));
    }

    #[test]
    fn buttons_map_to_confirm_and_back() {
        let mut sampler = InputSampler::new();
        let mut pad = mapping();
        pad.apply(event(JS_EVENT_BUTTON, 0, 1), sampler.raw_mut());
        pad.apply(event(JS_EVENT_BUTTON | JS_EVENT_INIT, 5, 1), sampler.raw_mut());
        sampler.update();
        assert!(sampler.on_hit(Control::Pad(PadButton::Confirm)));
        assert!(sampler.is_down(Control::Pad(PadButton::Other(5))));

        pad.apply(event(JS_EVENT_BUTTON, 0, 0), sampler.raw_mut());
        sampler.update();
        assert!(sampler.on_release(Control::Pad(PadButton::Confirm)));
    }

    #[test]
    fn axes_press_one_direction_at_a_time() {
        let mut sampler = InputSampler::new();
        let mut pad = mapping();
        pad.apply(event(JS_EVENT_AXIS, 0, 30000), sampler.raw_mut());
        sampler.update();
        assert!(sampler.is_down(Control::Pad(PadButton::Right)));

        pad.apply(event(JS_EVENT_AXIS, 0, -30000), sampler.raw_mut());
        sampler.update();
        assert!(sampler.is_down(Control::Pad(PadButton::Left)));
        assert!(!sampler.is_down(Control::Pad(PadButton::Right)));

        pad.apply(event(JS_EVENT_AXIS, 7, 200), sampler.raw_mut());
        pad.apply(event(JS_EVENT_AXIS, 0, 100), sampler.raw_mut());
        sampler.update();
        assert!(!sampler.is_down(Control::Pad(PadButton::Left)));
        assert!(!sampler.is_down(Control::Pad(PadButton::Down)));
    }

    #[test]
    fn stick_noise_keeps_a_held_hat_direction() {
        let mut sampler = InputSampler::new();
        let mut pad = mapping();
        pad.apply(event(JS_EVENT_AXIS, 6, -32767), sampler.raw_mut());
        sampler.update();
        sampler.update();
        assert_eq!(sampler.hold_frames(Control::Pad(PadButton::Left)), 2);

        pad.apply(event(JS_EVENT_AXIS, 0, 120), sampler.raw_mut());
        sampler.update();
        assert!(sampler.is_down(Control::Pad(PadButton::Left)));
        assert_eq!(sampler.hold_frames(Control::Pad(PadButton::Left)), 3);

        // centring the hat releases only once the stick is centred too
        pad.apply(event(JS_EVENT_AXIS, 0, -30000), sampler.raw_mut());
        pad.apply(event(JS_EVENT_AXIS, 6, 0), sampler.raw_mut());
        sampler.update();
        assert!(sampler.is_down(Control::Pad(PadButton::Left)));
        pad.apply(event(JS_EVENT_AXIS, 0, 0), sampler.raw_mut());
        sampler.update();
        assert!(!sampler.is_down(Control::Pad(PadButton::Left)));
    }

    #[test]
    fn missing_device_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut pad = Gamepad::new(dir.path().join("js9"), mapping());
        let mut raw = RawInput::default();
        pad.poll(&mut raw);
        assert!(pad.device.is_none());
        assert_eq!(pad.retry_in, REOPEN_INTERVAL);
    }
}
