use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::info;
use tiny_skia::Pixmap;

use crate::catalog::Catalog;
use crate::config::{Config, ThemeConfig};
use crate::executor::{LaunchOutcome, Launcher};
use crate::grid::{Cursor, Direction, FrameSignals, GridSelector};
use crate::input::{Control, InputSampler, PointerButton, RepeatPolicy};
use crate::model::CatalogEntry;
use crate::sources::Source;
use crate::ui::images::ImageLoader;
use crate::ui::layout::{GridLayout, PageZone};

/// How long the selected tile animates after the selection moves.
pub const PULSE_DURATION: Duration = Duration::from_millis(300);

/// The rendering context the session tears down around a launch.
pub trait Display {
    fn suspend(&mut self);
    /// Rebuilds everything `suspend` released. An error here ends the session.
    fn resume(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub index: usize,
    pub dir: PathBuf,
    pub executable: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Continue,
    Launch(LaunchRequest),
    Quit,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub dir: PathBuf,
    pub title: String,
    pub outcome: LaunchOutcome,
    pub shown_at: Instant,
}

#[derive(Debug, Clone)]
pub enum Phase {
    Browsing,
    Report(Report),
}

/// Everything the render sink needs for one frame.
pub struct RenderView<'a> {
    pub phase: &'a Phase,
    pub theme: &'a ThemeConfig,
    pub layout: &'a GridLayout,
    pub page_entries: &'a [CatalogEntry],
    pub page: usize,
    pub pages: usize,
    pub cursor: Cursor,
    pub selected: Option<&'a CatalogEntry>,
    pub signals: FrameSignals,
    pub selection_age: Duration,
    pub placeholder: Option<&'a Pixmap>,
    /// A finished report has been up long enough to accept a key.
    pub report_ready: bool,
}

pub struct Session {
    config: Config,
    source: Box<dyn Source>,
    catalog: Catalog,
    images: ImageLoader,
    input: InputSampler,
    repeat: RepeatPolicy,
    grid: GridSelector,
    layout: GridLayout,
    phase: Phase,
    signals: FrameSignals,
    selected_at: Instant,
    launch_args: Vec<String>,
    redraw: bool,
    report_was_ready: bool,
}

impl Session {
    pub fn new(config: Config, source: Box<dyn Source>, launch_args: Vec<String>) -> Self {
        let grid = GridSelector::new(config.grid.rows, config.grid.cols);
        let layout = GridLayout::new(&config.theme, grid.rows(), grid.cols(), config.theme.width, config.theme.height);
        let repeat = RepeatPolicy {
            hold_threshold: config.input.hold_threshold,
            repeat_period: config.input.repeat_period,
        };

        let mut session = Self {
            config,
            source,
            catalog: Catalog::default(),
            images: ImageLoader::new(),
            input: InputSampler::new(),
            repeat,
            grid,
            layout,
            phase: Phase::Browsing,
            signals: FrameSignals::default(),
            selected_at: Instant::now(),
            launch_args,
            redraw: true,
            report_was_ready: false,
        };
        session.reload();
        session
    }

    #[cfg(test)]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn cursor(&self) -> Cursor {
        self.grid.cursor()
    }

    pub fn selection(&self) -> Option<usize> {
        self.grid.selection(self.catalog.len())
    }

    pub fn input_mut(&mut self) -> &mut InputSampler {
        &mut self.input
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.layout = GridLayout::new(&self.config.theme, self.grid.rows(), self.grid.cols(), width, height);
        self.redraw = true;
    }

    /// Rescans the games directory and reloads every image. The cursor goes
    /// back to the first entry.
    pub fn reload(&mut self) {
        self.catalog = Catalog::scan(self.source.as_ref(), self.config.general.sort_by_difficulty);
        self.catalog.load_images(&self.images);
        self.grid.reset();
        self.redraw = true;
    }

    /// Runs one frame of input handling.
    pub fn tick(&mut self, now: Instant) -> Step {
        self.input.update();
        match self.phase {
            Phase::Browsing => self.browse(now),
            Phase::Report(_) => {
                self.report(now);
                Step::Continue
            }
        }
    }

    fn browse(&mut self, now: Instant) -> Step {
        let len = self.catalog.len();
        let nav = self.input.navigation(&self.repeat);
        if nav.back {
            return Step::Quit;
        }

        // one axis per frame, in a fixed order
        if nav.left {
            self.grid.navigate(Direction::Left, len);
        } else if nav.right {
            self.grid.navigate(Direction::Right, len);
        } else if nav.up {
            self.grid.navigate(Direction::Up, len);
        } else if nav.down {
            self.grid.navigate(Direction::Down, len);
        }

        let mut confirm = nav.confirm;
        if let Some((x, y)) = self.input.pointer() {
            // a click confirms only a cell that was already selected
            let before_hover = self.grid.cursor();
            let cell = self.layout.cell_at(x, y);
            if self.input.pointer_moved() {
                if let Some((row, col)) = cell {
                    self.grid.hover(row, col, len);
                }
            }
            if self.input.on_hit(Control::Pointer(PointerButton::Left)) {
                match (cell, self.layout.zone_at(x, y)) {
                    (Some((row, col)), _) => {
                        if before_hover.row == row && before_hover.col == col {
                            confirm = true;
                        } else {
                            self.grid.hover(row, col, len);
                        }
                    }
                    (None, Some(PageZone::Back)) => self.grid.page_back(len),
                    (None, Some(PageZone::Forward)) => self.grid.page_forward(len),
                    (None, None) => {}
                }
            }
        }

        self.signals = self.grid.finish_frame(len);
        if self.signals.selection_changed || self.signals.page_changed {
            self.selected_at = now;
            self.redraw = true;
        }

        if confirm {
            if let Some(index) = self.grid.selection(len) {
                if let Some(entry) = self.catalog.get(index) {
                    return Step::Launch(LaunchRequest {
                        index,
                        dir: entry.dir.clone(),
                        executable: entry.executable.clone(),
                    });
                }
            }
        }
        Step::Continue
    }

    fn report_delay(&self) -> Duration {
        Duration::from_millis(self.config.general.report_delay_ms)
    }

    fn report_ready(&self, now: Instant) -> bool {
        match &self.phase {
            Phase::Report(report) if !report.outcome.is_failure() => {
                now.saturating_duration_since(report.shown_at) >= self.report_delay()
            }
            _ => false,
        }
    }

    fn report(&mut self, now: Instant) {
        let Phase::Report(report) = &self.phase else { return };

        let dismissed = if report.outcome.is_failure() {
            let nav = self.input.navigation(&self.repeat);
            nav.confirm || nav.back || self.input.on_hit(Control::Pointer(PointerButton::Left))
        } else {
            let ready = self.report_ready(now);
            if ready && !self.report_was_ready {
                self.report_was_ready = true;
                self.redraw = true;
            }
            ready && self.input.any_hit()
        };

        if dismissed {
            info!("Session: report dismissed, back to browsing");
            self.phase = Phase::Browsing;
            self.grid.reset();
            self.redraw = true;
        }
    }

    /// Hands the machine to the requested game and takes it back. The
    /// display is torn down for the duration and all images reloaded after.
    pub fn launch_cycle<D, L>(&mut self, request: LaunchRequest, display: &mut D, launcher: &L) -> Result<()>
    where
        D: Display + ?Sized,
        L: Launcher + ?Sized,
    {
        let title = self
            .catalog
            .get(request.index)
            .map(|e| e.title.clone())
            .unwrap_or_default();
        info!("Session: launching {:?} from {}", title, request.dir.display());

        self.catalog.release_images();
        display.suspend();

        let outcome = launcher.launch(&request.executable, &self.launch_args);

        display
            .resume()
            .context("reinitializing the display after the game exited")?;

        self.reload();
        self.input.reset();
        self.report_was_ready = false;
        self.phase = Phase::Report(Report {
            dir: request.dir,
            title,
            outcome,
            shown_at: Instant::now(),
        });
        Ok(())
    }

    /// Whether the frame should be drawn; clears the pending flag.
    pub fn take_redraw(&mut self, now: Instant) -> bool {
        let animating = matches!(self.phase, Phase::Browsing)
            && now.saturating_duration_since(self.selected_at) < PULSE_DURATION;
        std::mem::take(&mut self.redraw) || animating
    }

    pub fn view(&self, now: Instant) -> RenderView<'_> {
        let per_page = self.grid.per_page();
        let cursor = self.grid.cursor();
        RenderView {
            phase: &self.phase,
            theme: &self.config.theme,
            layout: &self.layout,
            page_entries: self.catalog.page(cursor.page, per_page),
            page: cursor.page,
            pages: self.catalog.pages(per_page),
            cursor,
            selected: self.selection().and_then(|i| self.catalog.get(i)),
            signals: self.signals,
            selection_age: now.saturating_duration_since(self.selected_at),
            placeholder: self.images.placeholder(),
            report_ready: self.report_ready(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::LaunchFailure;
    use crate::input::Key;
    use crate::model::EntryConfig;
    use std::cell::{Cell, RefCell};
    use std::path::Path;
    use std::rc::Rc;

    struct FakeSource {
        count: usize,
        scans: Rc<Cell<usize>>,
    }

    impl Source for FakeSource {
        fn scan(&self) -> Result<Vec<CatalogEntry>> {
            self.scans.set(self.scans.get() + 1);
            Ok((0..self.count)
                .map(|i| {
                    let config = EntryConfig { title: format!("game {}", i), ..EntryConfig::default() };
                    CatalogEntry::new(PathBuf::from(format!("/games/{:02}", i)), config).unwrap()
                })
                .collect())
        }
    }

    #[derive(Default)]
    struct FakeDisplay {
        suspended: usize,
        resumed: usize,
        fail_resume: bool,
    }

    impl Display for FakeDisplay {
        fn suspend(&mut self) {
            self.suspended += 1;
        }

        fn resume(&mut self) -> Result<()> {
            self.resumed += 1;
            if self.fail_resume {
                anyhow::bail!("no compositor");
            }
            Ok(())
        }
    }

    struct FakeLauncher {
        outcome: LaunchOutcome,
        calls: RefCell<Vec<(PathBuf, Vec<String>)>>,
    }

    impl FakeLauncher {
        fn new(outcome: LaunchOutcome) -> Self {
            Self { outcome, calls: RefCell::new(Vec::new()) }
        }
    }

    impl Launcher for FakeLauncher {
        fn launch(&self, executable: &Path, args: &[String]) -> LaunchOutcome {
            self.calls.borrow_mut().push((executable.to_path_buf(), args.to_vec()));
            self.outcome.clone()
        }
    }

    fn session(count: usize) -> (Session, Rc<Cell<usize>>) {
        let scans = Rc::new(Cell::new(0));
        let mut config = Config::default();
        config.grid.rows = 2;
        config.grid.cols = 4;
        let source = FakeSource { count, scans: scans.clone() };
        (Session::new(config, Box::new(source), vec!["10.0.0.1".to_string()]), scans)
    }

    fn tap(session: &mut Session, control: Control, now: Instant) -> Step {
        session.input_mut().raw_mut().press(control);
        let step = session.tick(now);
        session.input_mut().raw_mut().release(control);
        session.tick(now);
        step
    }

    fn key(k: Key) -> Control {
        Control::Key(k)
    }

    #[test]
    fn confirm_launches_the_selected_entry() {
        let (mut s, _) = session(10);
        let now = Instant::now();
        tap(&mut s, key(Key::Right), now);
        tap(&mut s, key(Key::Down), now);
        assert_eq!(s.selection(), Some(5));

        let step = tap(&mut s, key(Key::Return), now);
        assert_eq!(
            step,
            Step::Launch(LaunchRequest {
                index: 5,
                dir: PathBuf::from("/games/05"),
                executable: PathBuf::from("/games/05/autorun.exe"),
            })
        );
    }

    #[test]
    fn launch_cycle_tears_down_and_rebuilds() {
        let (mut s, scans) = session(10);
        let now = Instant::now();
        tap(&mut s, key(Key::Right), now);
        let Step::Launch(request) = tap(&mut s, key(Key::Return), now) else {
            panic!("expected a launch");
        };

        let mut display = FakeDisplay::default();
        let launcher = FakeLauncher::new(LaunchOutcome::Exited(0));
        s.launch_cycle(request, &mut display, &launcher).unwrap();

        assert_eq!((display.suspended, display.resumed), (1, 1));
        assert_eq!(scans.get(), 2);
        assert_eq!(
            launcher.calls.borrow().as_slice(),
            &[(PathBuf::from("/games/01/autorun.exe"), vec!["10.0.0.1".to_string()])]
        );
        assert!(matches!(s.phase(), Phase::Report(r) if r.outcome == LaunchOutcome::Exited(0)));
        assert_eq!(s.cursor(), Cursor::default());
        assert!(s.catalog().entries().iter().all(CatalogEntry::images_loaded));
    }

    #[test]
    fn failure_report_needs_explicit_dismissal() {
        let (mut s, _) = session(3);
        let request = LaunchRequest {
            index: 0,
            dir: PathBuf::from("/games/00"),
            executable: PathBuf::from("/games/00/autorun.exe"),
        };
        let launcher = FakeLauncher::new(LaunchOutcome::Failed(LaunchFailure::InvalidPath));
        s.launch_cycle(request, &mut FakeDisplay::default(), &launcher).unwrap();

        let later = Instant::now() + Duration::from_secs(10);
        tap(&mut s, key(Key::Other(0x61)), later);
        tap(&mut s, key(Key::Right), later);
        assert!(matches!(s.phase(), Phase::Report(_)));

        tap(&mut s, key(Key::Return), later);
        assert!(matches!(s.phase(), Phase::Browsing));
        assert_eq!(s.selection(), Some(0));
    }

    #[test]
    fn finished_report_waits_before_accepting_keys() {
        let (mut s, _) = session(3);
        let request = LaunchRequest {
            index: 2,
            dir: PathBuf::from("/games/02"),
            executable: PathBuf::from("/games/02/autorun.exe"),
        };
        s.launch_cycle(request, &mut FakeDisplay::default(), &FakeLauncher::new(LaunchOutcome::Exited(3)))
            .unwrap();

        let start = Instant::now();
        tap(&mut s, key(Key::Other(0x61)), start);
        assert!(matches!(s.phase(), Phase::Report(_)));
        assert!(!s.view(start).report_ready);

        let later = start + Duration::from_millis(2100);
        assert!(s.view(later).report_ready);
        tap(&mut s, Control::Pointer(PointerButton::Right), later);
        assert!(matches!(s.phase(), Phase::Browsing));
    }

    #[test]
    fn failed_resume_is_fatal() {
        let (mut s, _) = session(1);
        let request = LaunchRequest {
            index: 0,
            dir: PathBuf::from("/games/00"),
            executable: PathBuf::from("/games/00/autorun.exe"),
        };
        let mut display = FakeDisplay { fail_resume: true, ..FakeDisplay::default() };
        let result = s.launch_cycle(request, &mut display, &FakeLauncher::new(LaunchOutcome::Exited(0)));
        assert!(result.is_err());
    }

    #[test]
    fn empty_catalog_cannot_launch() {
        let (mut s, _) = session(0);
        let now = Instant::now();
        tap(&mut s, key(Key::Right), now);
        assert_eq!(tap(&mut s, key(Key::Return), now), Step::Continue);
        assert_eq!(s.selection(), None);
        assert_eq!(s.view(now).pages, 0);
    }

    #[test]
    fn escape_quits_from_browsing() {
        let (mut s, _) = session(2);
        assert_eq!(tap(&mut s, key(Key::Escape), Instant::now()), Step::Quit);
    }

    #[test]
    fn pointer_hover_click_and_paging() {
        let (mut s, _) = session(10);
        let now = Instant::now();
        let layout = s.layout;
        let tile = layout.tile_rect(1, 2).unwrap();
        let (x, y) = ((tile.left() + 5.0) as f64, (tile.top() + 5.0) as f64);

        s.input_mut().raw_mut().set_pointer(x, y);
        s.tick(now);
        assert_eq!(s.selection(), Some(6));

        let step = tap(&mut s, Control::Pointer(PointerButton::Left), now);
        assert!(matches!(step, Step::Launch(LaunchRequest { index: 6, .. })));

        let zone = layout.zone_rect(PageZone::Forward).unwrap();
        s.input_mut().raw_mut().set_pointer((zone.left() + 2.0) as f64, (zone.top() + 2.0) as f64);
        tap(&mut s, Control::Pointer(PointerButton::Left), now);
        assert_eq!(s.cursor().page, 1);
        assert_eq!(s.selection(), Some(8));
    }

    #[test]
    fn click_on_a_new_cell_selects_before_it_launches() {
        let (mut s, _) = session(10);
        let now = Instant::now();
        let tile = s.layout.tile_rect(0, 3).unwrap();
        s.input_mut().raw_mut().set_pointer((tile.left() + 5.0) as f64, (tile.top() + 5.0) as f64);

        // move and click arrive in the same frame
        let step = tap(&mut s, Control::Pointer(PointerButton::Left), now);
        assert_eq!(step, Step::Continue);
        assert_eq!(s.selection(), Some(3));

        let step = tap(&mut s, Control::Pointer(PointerButton::Left), now);
        assert!(matches!(step, Step::Launch(LaunchRequest { index: 3, .. })));
    }

    #[test]
    fn selection_change_requests_redraw() {
        let (mut s, _) = session(4);
        let now = Instant::now();
        s.tick(now);
        assert!(s.take_redraw(now));
        let idle = now + Duration::from_secs(1);
        s.tick(idle);
        assert!(!s.take_redraw(idle));
        tap(&mut s, key(Key::Right), idle);
        assert!(s.take_redraw(idle));
        assert!(s.view(idle).signals.current == Some(1));
    }
}
