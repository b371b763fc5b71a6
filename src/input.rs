//! Per-frame input sampling.
//!
//! Device handlers write into [`RawInput`] as events arrive. Once per frame
//! [`InputSampler::update`] snapshots that raw state and derives edge, level
//! and hold-duration queries that behave the same for every device.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Keyboard keys the launcher distinguishes. Anything else is `Other`
/// carrying the raw keysym, which still counts for "press any key".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Left,
    Right,
    Up,
    Down,
    Return,
    Escape,
    Other(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadButton {
    Left,
    Right,
    Up,
    Down,
    Confirm,
    Back,
    Other(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerButton {
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Key(Key),
    Pad(PadButton),
    Pointer(PointerButton),
}

/// Raw "currently active" state as reported by device handlers.
///
/// A press is latched until the next sample so a tap shorter than one
/// frame still registers.
#[derive(Debug, Default)]
pub struct RawInput {
    down: HashSet<Control>,
    latched: HashSet<Control>,
    pointer: Option<(f64, f64)>,
}

impl RawInput {
    pub fn press(&mut self, control: Control) {
        self.down.insert(control);
        self.latched.insert(control);
    }

    pub fn release(&mut self, control: Control) {
        self.down.remove(&control);
    }

    /// Whether a handler currently reports `control` as down.
    pub fn is_held(&self, control: Control) -> bool {
        self.down.contains(&control)
    }

    pub fn set_pointer(&mut self, x: f64, y: f64) {
        self.pointer = Some((x, y));
    }

    pub fn clear_pointer(&mut self) {
        self.pointer = None;
    }

    /// Forgets everything held, e.g. after focus was lost.
    pub fn release_all(&mut self) {
        self.down.clear();
        self.latched.clear();
    }

    pub fn release_device(&mut self, keep: impl Fn(&Control) -> bool) {
        self.down.retain(|c| keep(c));
        self.latched.retain(|c| keep(c));
    }

    fn take_active(&mut self) -> HashSet<Control> {
        let mut active: HashSet<Control> = self.latched.drain().collect();
        active.extend(self.down.iter().copied());
        active
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ControlState {
    prev: bool,
    cur: bool,
    held: u32,
}

/// Edge and hold tracking for one family of controls.
#[derive(Debug)]
struct Tracker<C> {
    states: HashMap<C, ControlState>,
}

impl<C> Default for Tracker<C> {
    fn default() -> Self {
        Self { states: HashMap::new() }
    }
}

impl<C: Copy + Eq + Hash> Tracker<C> {
    fn update(&mut self, active: &HashSet<C>) {
        for &c in active {
            self.states.entry(c).or_default();
        }
        for (c, state) in self.states.iter_mut() {
            state.prev = state.cur;
            state.cur = active.contains(c);
            state.held = match (state.prev, state.cur) {
                (true, true) => state.held.saturating_add(1),
                (false, true) => 1,
                (_, false) => 0,
            };
        }
        self.states.retain(|_, s| s.prev || s.cur);
    }

    fn get(&self, c: &C) -> ControlState {
        self.states.get(c).copied().unwrap_or_default()
    }

    fn any_hit(&self) -> bool {
        self.states.values().any(|s| s.cur && !s.prev)
    }
}

/// Auto-repeat cadence for directional controls: a tap fires at once, a
/// hold fires again every `repeat_period` frames once it has lasted longer
/// than `hold_threshold` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatPolicy {
    pub hold_threshold: u32,
    pub repeat_period: u32,
}

impl Default for RepeatPolicy {
    fn default() -> Self {
        Self { hold_threshold: 30, repeat_period: 3 }
    }
}

impl RepeatPolicy {
    pub fn fires(&self, hit: bool, held: u32) -> bool {
        hit || (held > self.hold_threshold && held % self.repeat_period.max(1) == 0)
    }
}

/// Device-independent navigation events for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NavInput {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub confirm: bool,
    pub back: bool,
}

#[derive(Debug, Default)]
pub struct InputSampler {
    raw: RawInput,
    controls: Tracker<Control>,
    pointer: Option<(f64, f64)>,
    prev_pointer: Option<(f64, f64)>,
}

impl InputSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw_mut(&mut self) -> &mut RawInput {
        &mut self.raw
    }

    /// Samples the raw state. Call exactly once per frame before querying.
    pub fn update(&mut self) {
        let active = self.raw.take_active();
        self.controls.update(&active);
        self.prev_pointer = self.pointer;
        self.pointer = self.raw.pointer;
    }

    /// Drops all held state on both sides, as if every control was released
    /// long ago.
    pub fn reset(&mut self) {
        self.raw.release_all();
        self.controls = Tracker::default();
        self.prev_pointer = self.pointer;
    }

    pub fn on_hit(&self, control: Control) -> bool {
        let s = self.controls.get(&control);
        s.cur && !s.prev
    }

    pub fn on_release(&self, control: Control) -> bool {
        let s = self.controls.get(&control);
        s.prev && !s.cur
    }

    pub fn is_down(&self, control: Control) -> bool {
        self.controls.get(&control).cur
    }

    /// Consecutive frames, including this one, that `control` has been down.
    pub fn hold_frames(&self, control: Control) -> u32 {
        self.controls.get(&control).held
    }

    pub fn triggered(&self, control: Control, policy: &RepeatPolicy) -> bool {
        policy.fires(self.on_hit(control), self.hold_frames(control))
    }

    /// True if any key or button went down this frame.
    pub fn any_hit(&self) -> bool {
        self.controls.any_hit()
    }

    pub fn pointer(&self) -> Option<(f64, f64)> {
        self.pointer
    }

    pub fn pointer_moved(&self) -> bool {
        self.pointer.is_some() && self.pointer != self.prev_pointer
    }

    pub fn navigation(&self, policy: &RepeatPolicy) -> NavInput {
        NavInput {
            left: self.any_triggered(&[Control::Key(Key::Left), Control::Pad(PadButton::Left)], policy),
            right: self.any_triggered(&[Control::Key(Key::Right), Control::Pad(PadButton::Right)], policy),
            up: self.any_triggered(&[Control::Key(Key::Up), Control::Pad(PadButton::Up)], policy),
            down: self.any_triggered(&[Control::Key(Key::Down), Control::Pad(PadButton::Down)], policy),
            confirm: self.any_hit_of(&[Control::Key(Key::Return), Control::Pad(PadButton::Confirm)]),
            back: self.any_hit_of(&[Control::Key(Key::Escape), Control::Pad(PadButton::Back)]),
        }
    }

    fn any_triggered(&self, controls: &[Control], policy: &RepeatPolicy) -> bool {
        controls.iter().any(|&c| self.triggered(c, policy))
    }

    fn any_hit_of(&self, controls: &[Control]) -> bool {
        controls.iter().any(|&c| self.on_hit(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RIGHT: Control = Control::Key(Key::Right);

    fn frame(sampler: &mut InputSampler, down: bool) {
        if down {
            sampler.raw_mut().press(RIGHT);
        } else {
            sampler.raw_mut().release(RIGHT);
        }
        sampler.update();
    }

    #[test]
    fn edges_and_levels() {
        let mut s = InputSampler::new();
        frame(&mut s, true);
        assert!(s.on_hit(RIGHT));
        assert!(s.is_down(RIGHT));
        assert_eq!(s.hold_frames(RIGHT), 1);

        frame(&mut s, true);
        assert!(!s.on_hit(RIGHT));
        assert_eq!(s.hold_frames(RIGHT), 2);

        frame(&mut s, false);
        assert!(s.on_release(RIGHT));
        assert!(!s.is_down(RIGHT));
        assert_eq!(s.hold_frames(RIGHT), 0);

        frame(&mut s, false);
        assert!(!s.on_release(RIGHT));
    }

    #[test]
    fn hold_produces_tap_plus_repeats() {
        let policy = RepeatPolicy::default();
        for k in 0..6 {
            let mut s = InputSampler::new();
            let frames = policy.hold_threshold + k * policy.repeat_period;
            let mut triggers = 0;
            for _ in 0..frames {
                frame(&mut s, true);
                if s.triggered(RIGHT, &policy) {
                    triggers += 1;
                }
            }
            assert_eq!(triggers, k + 1, "k = {}", k);
        }
    }

    #[test]
    fn release_resets_repeat() {
        let policy = RepeatPolicy::default();
        let mut s = InputSampler::new();
        for _ in 0..40 {
            frame(&mut s, true);
        }
        frame(&mut s, false);
        assert_eq!(s.hold_frames(RIGHT), 0);
        frame(&mut s, true);
        assert_eq!(s.hold_frames(RIGHT), 1);
        assert!(s.triggered(RIGHT, &policy));
        frame(&mut s, true);
        assert!(!s.triggered(RIGHT, &policy));
    }

    #[test]
    fn short_tap_is_latched() {
        let mut s = InputSampler::new();
        s.raw_mut().press(Control::Key(Key::Return));
        s.raw_mut().release(Control::Key(Key::Return));
        s.update();
        assert!(s.on_hit(Control::Key(Key::Return)));
        s.update();
        assert!(s.on_release(Control::Key(Key::Return)));
    }

    #[test]
    fn devices_feed_the_same_navigation() {
        let policy = RepeatPolicy::default();
        let mut s = InputSampler::new();
        s.raw_mut().press(Control::Pad(PadButton::Down));
        s.raw_mut().press(Control::Key(Key::Return));
        s.update();
        let nav = s.navigation(&policy);
        assert!(nav.down && nav.confirm);
        assert!(!nav.up && !nav.left && !nav.right && !nav.back);
    }

    #[test]
    fn pointer_motion() {
        let mut s = InputSampler::new();
        s.update();
        assert!(!s.pointer_moved());
        s.raw_mut().set_pointer(10.0, 20.0);
        s.update();
        assert!(s.pointer_moved());
        assert_eq!(s.pointer(), Some((10.0, 20.0)));
        s.update();
        assert!(!s.pointer_moved());
    }

    #[test]
    fn reset_forgets_held_controls() {
        let mut s = InputSampler::new();
        frame(&mut s, true);
        s.reset();
        s.update();
        assert!(!s.is_down(RIGHT));
        assert!(!s.any_hit());
    }
}
