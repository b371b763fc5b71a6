use std::time::Instant;

use anyhow::{Context, Result};
use log::{error, info, warn};
use smithay_client_toolkit::{
    compositor::{CompositorHandler, CompositorState},
    delegate_compositor, delegate_keyboard, delegate_output, delegate_pointer, delegate_registry,
    delegate_seat, delegate_shm, delegate_layer,
    output::{OutputHandler, OutputState},
    registry::{ProvidesRegistryState, RegistryState},
    seat::{
        keyboard::{KeyEvent, KeyboardHandler, Modifiers},
        pointer::{PointerEvent, PointerEventKind, PointerHandler},
        Capability, SeatHandler, SeatState,
    },
    shell::{
        wlr_layer::{
            Anchor, KeyboardInteractivity, Layer, LayerShell, LayerShellHandler, LayerSurface,
            LayerSurfaceConfigure,
        },
        WaylandSurface,
    },
    shm::{slot::SlotPool, Shm, ShmHandler},
};
use wayland_client::{
    globals::GlobalList,
    protocol::{wl_keyboard, wl_output, wl_pointer, wl_seat, wl_shm, wl_surface},
    Connection, QueueHandle,
};
use xkbcommon::xkb::{self, keysyms};
use crate::config::ThemeConfig;
use crate::executor::ProcessLauncher;
use crate::gamepad::Gamepad;
use crate::input::{Control, Key, PointerButton};
use crate::state::{Display, RenderView, Session, Step};
use crate::ui::render::Renderer;

const BTN_LEFT: u32 = 0x110;
const BTN_RIGHT: u32 = 0x111;
const BTN_MIDDLE: u32 = 0x112;

/// The layer surface and everything needed to rebuild it after a game
/// has had the screen.
pub struct Screen {
    conn: Connection,
    qh: QueueHandle<WaylandApp>,
    compositor_state: CompositorState,
    layer_shell_state: LayerShell,
    shm_state: Shm,

    layer_surface: Option<LayerSurface>,
    pool: Option<SlotPool>,
    renderer: Option<Renderer>,
    pub width: u32,
    pub height: u32,
    fullscreen: bool,
}

impl Screen {
    fn new(
        conn: &Connection,
        globals: &GlobalList,
        qh: &QueueHandle<WaylandApp>,
        theme: &ThemeConfig,
    ) -> Result<Self> {
        let compositor_state = CompositorState::bind(globals, qh).context("wl_compositor not available")?;
        let shm_state = Shm::bind(globals, qh).context("wl_shm not available")?;
        let layer_shell_state = LayerShell::bind(globals, qh).context("zwlr_layer_shell_v1 not available")?;

        Ok(Self {
            conn: conn.clone(),
            qh: qh.clone(),
            compositor_state,
            layer_shell_state,
            shm_state,
            layer_surface: None,
            pool: None,
            renderer: None,
            width: theme.width,
            height: theme.height,
            fullscreen: theme.fullscreen,
        })
    }

    /// Creates the layer surface and waits for its first configure.
    pub fn open(&mut self) {
        let surface = self.compositor_state.create_surface(&self.qh);
        let layer_surface = self.layer_shell_state.create_layer_surface(
            &self.qh,
            surface,
            Layer::Overlay,
            Some("booth"),
            None,
        );

        if self.fullscreen {
            layer_surface.set_anchor(Anchor::TOP | Anchor::BOTTOM | Anchor::LEFT | Anchor::RIGHT);
            layer_surface.set_exclusive_zone(-1);
            layer_surface.set_size(0, 0);
        } else {
            layer_surface.set_anchor(Anchor::empty());
            layer_surface.set_size(self.width, self.height);
        }
        layer_surface.set_keyboard_interactivity(KeyboardInteractivity::Exclusive);
        layer_surface.commit();

        self.layer_surface = Some(layer_surface);
        self.renderer = Some(Renderer::new());
    }

    fn is_open(&self) -> bool {
        self.layer_surface.is_some()
    }

    fn configure(&mut self, configure: LayerSurfaceConfigure) {
        if configure.new_size.0 > 0 {
            self.width = configure.new_size.0;
        }
        if configure.new_size.1 > 0 {
            self.height = configure.new_size.1;
        }

        let needed = self.width as usize * self.height as usize * 4;
        if self.pool.is_none() {
            match SlotPool::new(needed, &self.shm_state) {
                Ok(pool) => self.pool = Some(pool),
                Err(e) => error!("Screen: could not create shm pool: {}", e),
            }
        }

        if let Some(pool) = &mut self.pool {
            if pool.len() < needed {
                if let Err(e) = pool.resize(needed) {
                    error!("Screen: could not grow shm pool: {}", e);
                }
            }
        }
    }

    pub fn draw(&mut self, view: &RenderView) {
        let width = self.width;
        let height = self.height;
        if width == 0 || height == 0 { return; }

        let (Some(layer_surface), Some(pool), Some(renderer)) =
            (&self.layer_surface, self.pool.as_mut(), self.renderer.as_mut())
        else {
            return;
        };

        let (buffer, canvas) = match pool.create_buffer(
            width as i32,
            height as i32,
            (width * 4) as i32,
            wl_shm::Format::Argb8888,
        ) {
            Ok(b) => b,
            Err(e) => {
                warn!("Screen: no buffer this frame: {}", e);
                return;
            }
        };

        if let Some(mut pixmap) = tiny_skia::PixmapMut::from_bytes(canvas, width, height) {
            renderer.draw(&mut pixmap, view);

            for chunk in canvas.chunks_exact_mut(4) {
                chunk.swap(0, 2);
            }

            layer_surface.wl_surface().attach(Some(buffer.wl_buffer()), 0, 0);
            layer_surface.wl_surface().damage(0, 0, width as i32, height as i32);
            layer_surface.wl_surface().commit();
        }
    }
}

impl Display for Screen {
    fn suspend(&mut self) {
        info!("Screen: releasing the display");
        self.layer_surface = None;
        self.pool = None;
        self.renderer = None;
        if let Err(e) = self.conn.flush() {
            warn!("Screen: flush after teardown failed: {}", e);
        }
    }

    fn resume(&mut self) -> Result<()> {
        info!("Screen: taking the display back");
        self.open();
        self.conn.flush().context("flushing the new layer surface")?;
        Ok(())
    }
}

pub struct WaylandApp {
    pub registry_state: RegistryState,
    pub seat_state: SeatState,
    pub output_state: OutputState,

    pub screen: Screen,
    pub session: Session,
    gamepad: Gamepad,

    pub should_exit: bool,
    /// Error that ended the session, reported by `main`.
    pub fatal: Option<anyhow::Error>,
}

impl WaylandApp {
    pub fn new(
        conn: &Connection,
        globals: &GlobalList,
        qh: &QueueHandle<Self>,
        session: Session,
        gamepad: Gamepad,
        theme: &ThemeConfig,
    ) -> Result<Self> {
        let registry_state = RegistryState::new(globals);
        let seat_state = SeatState::new(globals, qh);
        let output_state = OutputState::new(globals, qh);
        let screen = Screen::new(conn, globals, qh, theme)?;

        Ok(Self {
            registry_state,
            seat_state,
            output_state,
            screen,
            session,
            gamepad,
            should_exit: false,
            fatal: None,
        })
    }

    /// One frame: sample every device, step the session and redraw if needed.
    pub fn tick(&mut self) {
        self.gamepad.poll(self.session.input_mut().raw_mut());

        match self.session.tick(Instant::now()) {
            Step::Continue => {}
            Step::Quit => {
                info!("Session: quit requested");
                self.should_exit = true;
                return;
            }
            Step::Launch(request) => {
                if let Err(e) = self.session.launch_cycle(request, &mut self.screen, &ProcessLauncher) {
                    error!("{:#}", e);
                    self.fatal = Some(e);
                    self.should_exit = true;
                    return;
                }
            }
        }

        let now = Instant::now();
        if self.screen.is_open() && self.session.take_redraw(now) {
            self.screen.draw(&self.session.view(now));
        }
    }

    fn draw_now(&mut self) {
        let now = Instant::now();
        self.screen.draw(&self.session.view(now));
    }
}

fn map_key(sym: xkb::Keysym) -> Key {
    let raw = u32::from(sym);
    match raw {
        keysyms::KEY_Left => Key::Left,
        keysyms::KEY_Right => Key::Right,
        keysyms::KEY_Up => Key::Up,
        keysyms::KEY_Down => Key::Down,
        keysyms::KEY_Return | keysyms::KEY_KP_Enter => Key::Return,
        keysyms::KEY_Escape => Key::Escape,
        other => Key::Other(other),
    }
}

fn map_button(button: u32) -> Option<PointerButton> {
    match button {
        BTN_LEFT => Some(PointerButton::Left),
        BTN_RIGHT => Some(PointerButton::Right),
        BTN_MIDDLE => Some(PointerButton::Middle),
        _ => None,
    }
}

impl LayerShellHandler for WaylandApp {
    fn closed(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _layer: &LayerSurface) {
        info!("Screen: layer surface closed by the compositor");
        self.should_exit = true;
    }

    fn configure(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _layer: &LayerSurface,
        configure: LayerSurfaceConfigure,
        _serial: u32,
    ) {
        self.screen.configure(configure);
        self.session.set_viewport(self.screen.width, self.screen.height);
        self.draw_now();
    }
}

impl CompositorHandler for WaylandApp {
    fn scale_factor_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_factor: i32,
    ) {}

    fn frame(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _time: u32,
    ) {}

    fn transform_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_transform: wl_output::Transform,
    ) {}

    fn surface_enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {}

    fn surface_leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {}
}

impl OutputHandler for WaylandApp {
    fn output_state(&mut self) -> &mut OutputState {
        &mut self.output_state
    }
    fn new_output(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _output: wl_output::WlOutput) {}
    fn update_output(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _output: wl_output::WlOutput) {}
    fn output_destroyed(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _output: wl_output::WlOutput) {}
}

impl SeatHandler for WaylandApp {
    fn seat_state(&mut self) -> &mut SeatState {
        &mut self.seat_state
    }

    fn new_seat(&mut self, _: &Connection, _: &QueueHandle<Self>, _: wl_seat::WlSeat) {}

    fn new_capability(
        &mut self,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
        seat: wl_seat::WlSeat,
        capability: Capability,
    ) {
        match capability {
            Capability::Keyboard => {
                if let Err(e) = self.seat_state.get_keyboard(qh, &seat, None) {
                    warn!("Seat: no keyboard: {}", e);
                }
            }
            Capability::Pointer => {
                if let Err(e) = self.seat_state.get_pointer(qh, &seat) {
                    warn!("Seat: no pointer: {}", e);
                }
            }
            _ => {}
        }
    }

    fn remove_capability(
        &mut self,
        _conn: &Connection,
        _: &QueueHandle<Self>,
        _: wl_seat::WlSeat,
        capability: Capability,
    ) {
        let raw = self.session.input_mut().raw_mut();
        match capability {
            Capability::Keyboard => raw.release_device(|c| !matches!(c, Control::Key(_))),
            Capability::Pointer => {
                raw.release_device(|c| !matches!(c, Control::Pointer(_)));
                raw.clear_pointer();
            }
            _ => {}
        }
    }

    fn remove_seat(&mut self, _: &Connection, _: &QueueHandle<Self>, _: wl_seat::WlSeat) {}
}

impl KeyboardHandler for WaylandApp {
    fn enter(
        &mut self,
        _: &Connection,
        _: &QueueHandle<Self>,
        _: &wl_keyboard::WlKeyboard,
        _: &wl_surface::WlSurface,
        _: u32,
        _: &[u32],
        _: &[xkb::Keysym],
    ) {}

    fn leave(
        &mut self,
        _: &Connection,
        _: &QueueHandle<Self>,
        _: &wl_keyboard::WlKeyboard,
        _: &wl_surface::WlSurface,
        _: u32,
    ) {
        // no release events arrive once focus is gone
        self.session
            .input_mut()
            .raw_mut()
            .release_device(|c| !matches!(c, Control::Key(_)));
    }

    fn press_key(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _serial: u32,
        event: KeyEvent,
    ) {
        let key = map_key(event.keysym);
        self.session.input_mut().raw_mut().press(Control::Key(key));
    }

    fn release_key(
        &mut self,
        _: &Connection,
        _: &QueueHandle<Self>,
        _: &wl_keyboard::WlKeyboard,
        _: u32,
        event: KeyEvent,
    ) {
        let key = map_key(event.keysym);
        self.session.input_mut().raw_mut().release(Control::Key(key));
    }

    fn update_modifiers(
        &mut self,
        _: &Connection,
        _: &QueueHandle<Self>,
        _: &wl_keyboard::WlKeyboard,
        _serial: u32,
        _modifiers: Modifiers,
        _layout: u32,
    ) {}
}

impl PointerHandler for WaylandApp {
    fn pointer_frame(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _pointer: &wl_pointer::WlPointer,
        events: &[PointerEvent],
    ) {
        let raw = self.session.input_mut().raw_mut();
        for event in events {
            let (x, y) = event.position;
            match event.kind {
                PointerEventKind::Enter { .. } | PointerEventKind::Motion { .. } => raw.set_pointer(x, y),
                PointerEventKind::Leave { .. } => {
                    raw.release_device(|c| !matches!(c, Control::Pointer(_)));
                    raw.clear_pointer();
                }
                PointerEventKind::Press { button, .. } => {
                    raw.set_pointer(x, y);
                    if let Some(b) = map_button(button) {
                        raw.press(Control::Pointer(b));
                    }
                }
                PointerEventKind::Release { button, .. } => {
                    if let Some(b) = map_button(button) {
                        raw.release(Control::Pointer(b));
                    }
                }
                _ => {}
            }
        }
    }
}

impl ShmHandler for WaylandApp {
    fn shm_state(&mut self) -> &mut Shm {
        &mut self.screen.shm_state
    }
}

delegate_compositor!(WaylandApp);
delegate_output!(WaylandApp);
delegate_shm!(WaylandApp);
delegate_seat!(WaylandApp);
delegate_keyboard!(WaylandApp);
delegate_pointer!(WaylandApp);
delegate_layer!(WaylandApp);
delegate_registry!(WaylandApp);

impl ProvidesRegistryState for WaylandApp {
    fn registry(&mut self) -> &mut RegistryState {
        &mut self.registry_state
    }

    fn runtime_add_global(&mut self, _: &Connection, _: &QueueHandle<Self>, _: u32, _: &str, _: u32) {
    }
    fn runtime_remove_global(&mut self, _: &Connection, _: &QueueHandle<Self>, _: u32, _: &str) {
    }
}
