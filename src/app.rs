use crate::config;
use crate::game::beatmap::{Beatmap, PLAYFIELD_HEIGHT, PLAYFIELD_WIDTH};
use crate::game::lookup::BeatmapLookup;
use crate::game::mods::Mods;
use crate::game::playback::{PlaybackSession, PlaybackState, Snapshot};
use crate::game::replay::Replay;
use crate::game::visibility::VisualKind;
use crate::render::{COLOR_BORDER, COLOR_CURSOR, COLOR_OBJECT, COLOR_TEXT, Frame};
use log::{error, info, warn};
use std::error::Error;
use std::io::Write;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

// One state update per tick at a nominal 60 per second; the clock itself
// never skips frames to catch up.
const TICK_INTERVAL: Duration = Duration::from_micros(16_667);

const OBJECT_RADIUS: f32 = 25.0;
const CURSOR_RADIUS: f32 = 5.0;
const FUZZY_THRESHOLD: u32 = 70;

pub fn run() -> Result<(), Box<dyn Error>> {
    let cfg = config::get();

    let replay_folder = resolve_replay_folder(&cfg.replay_folder)?;
    let replay_path = select_replay(&replay_folder)?;
    let replay = Replay::from_path(&replay_path)?;
    info!(
        "Loaded replay: {} - score {} ({}x combo), mods {}",
        replay.player_name,
        replay.score,
        replay.max_combo,
        replay.mods.label()
    );
    if let Some(set_on) = replay.set_on() {
        info!("Set on {}", set_on.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    let songs_folder = if cfg.songs_folder.is_empty() {
        replay_folder
            .parent()
            .unwrap_or(Path::new("."))
            .join("Songs")
    } else {
        PathBuf::from(&cfg.songs_folder)
    };
    let cache_path = replay_folder
        .parent()
        .unwrap_or(Path::new("."))
        .join("beatmap_cache.json");

    let mut lookup = BeatmapLookup::new(songs_folder, cache_path);
    let beatmap = match lookup.find(&replay.beatmap_hash) {
        Some(path) => {
            let bytes = std::fs::read(&path)?;
            Beatmap::parse(&String::from_utf8_lossy(&bytes))?
        }
        None => {
            warn!("Corresponding beatmap not found; playing cursor only");
            Beatmap::default()
        }
    };

    let mut session = PlaybackSession::new(replay, beatmap);
    session.start();
    info!(
        "Replay loaded with {} frames. Controls: DELETE pause/resume, ESC stop, 1-5 toggle mods",
        session.total_frames()
    );

    let event_loop = EventLoop::new()?;
    let mut app = App {
        session,
        window: None,
        gfx: None,
        last_snapshot: None,
        next_tick: Instant::now(),
        size: (cfg.display_width, cfg.display_height),
    };
    event_loop.run_app(&mut app)?;
    Ok(())
}

// --- Replay selection (interactive, before the window opens) ---

fn resolve_replay_folder(configured: &str) -> Result<PathBuf, Box<dyn Error>> {
    let path = PathBuf::from(configured);
    if path.is_dir() {
        return Ok(path);
    }
    warn!("Configured replay folder {configured:?} does not exist");
    loop {
        print!("Enter the path to your replay folder: ");
        std::io::stdout().flush()?;
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        let folder = input.trim();
        if Path::new(folder).is_dir() {
            config::set_replay_folder(folder);
            return Ok(PathBuf::from(folder));
        }
        println!("Invalid folder path. Please try again.");
    }
}

fn list_replay_files(folder: &Path) -> Result<Vec<String>, Box<dyn Error>> {
    let mut files: Vec<String> = std::fs::read_dir(folder)?
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            name.to_ascii_lowercase().ends_with(".osr").then_some(name)
        })
        .collect();
    files.sort();
    Ok(files)
}

fn select_replay(folder: &Path) -> Result<PathBuf, Box<dyn Error>> {
    let files = list_replay_files(folder)?;
    if files.is_empty() {
        return Err(format!("no .osr files found in {}", folder.display()).into());
    }
    for (i, name) in files.iter().enumerate() {
        println!("{}. {name}", i + 1);
    }
    loop {
        print!("Enter the number or name of the replay to play: ");
        std::io::stdout().flush()?;
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        let choice = input.trim();
        if choice.is_empty() {
            continue;
        }

        if let Ok(number) = choice.parse::<usize>() {
            if (1..=files.len()).contains(&number) {
                return Ok(folder.join(&files[number - 1]));
            }
        } else {
            let mut matches: Vec<(&String, u32)> = files
                .iter()
                .map(|name| (name, partial_ratio(choice, name)))
                .filter(|&(_, ratio)| ratio > FUZZY_THRESHOLD)
                .collect();
            matches.sort_by(|a, b| b.1.cmp(&a.1));
            match matches.len() {
                0 => {}
                1 => return Ok(folder.join(matches[0].0)),
                _ => {
                    println!("Multiple matches found:");
                    for (i, (name, _)) in matches.iter().enumerate() {
                        println!("{}. {name}", i + 1);
                    }
                    print!("Enter the number of your choice: ");
                    std::io::stdout().flush()?;
                    let mut sub = String::new();
                    std::io::stdin().read_line(&mut sub)?;
                    if let Ok(number) = sub.trim().parse::<usize>()
                        && (1..=matches.len()).contains(&number)
                    {
                        return Ok(folder.join(matches[number - 1].0));
                    }
                }
            }
        }
        println!("Invalid selection. Please try again.");
    }
}

/// Best character-overlap ratio of the shorter string against any aligned
/// window of the longer one, 0..=100. Coarse, but enough to pick a replay by
/// a fragment of its file name.
fn partial_ratio(a: &str, b: &str) -> u32 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let s: Vec<char> = short.chars().collect();
    let l: Vec<char> = long.chars().collect();
    if s.is_empty() || s.len() > l.len() {
        return 0;
    }
    let mut best = 0usize;
    for start in 0..=(l.len() - s.len()) {
        let hits = s.iter().zip(&l[start..]).filter(|(x, y)| *x == *y).count();
        best = best.max(hits);
    }
    (best * 100 / s.len()) as u32
}

// --- Window shell ---

struct Gfx {
    _context: softbuffer::Context<Arc<Window>>,
    surface: softbuffer::Surface<Arc<Window>, Arc<Window>>,
}

struct App {
    session: PlaybackSession,
    window: Option<Arc<Window>>,
    gfx: Option<Gfx>,
    last_snapshot: Option<Snapshot>,
    next_tick: Instant,
    size: (u32, u32),
}

impl App {
    fn init_window(&mut self, event_loop: &ActiveEventLoop) -> Result<(), Box<dyn Error>> {
        let attrs = Window::default_attributes()
            .with_title("osrview")
            .with_inner_size(LogicalSize::new(self.size.0, self.size.1));
        let window = Arc::new(event_loop.create_window(attrs)?);
        let context = softbuffer::Context::new(window.clone())?;
        let mut surface = softbuffer::Surface::new(&context, window.clone())?;

        let inner = window.inner_size();
        self.size = (inner.width.max(1), inner.height.max(1));
        surface.resize(
            NonZeroU32::new(self.size.0).unwrap(),
            NonZeroU32::new(self.size.1).unwrap(),
        )?;

        self.window = Some(window);
        self.gfx = Some(Gfx {
            _context: context,
            surface,
        });
        Ok(())
    }

    fn toggle_mod(&mut self, index: usize) {
        let (flag, name) = Mods::TOGGLEABLE[index];
        let mods = self.session.active_mods() ^ flag;
        info!("Toggled {name}");
        self.session.set_active_mods(mods);
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, code: KeyCode) {
        match code {
            KeyCode::Delete => self.session.toggle_pause(),
            KeyCode::Escape => {
                self.session.stop();
                event_loop.exit();
            }
            KeyCode::Digit1 => self.toggle_mod(0),
            KeyCode::Digit2 => self.toggle_mod(1),
            KeyCode::Digit3 => self.toggle_mod(2),
            KeyCode::Digit4 => self.toggle_mod(3),
            KeyCode::Digit5 => self.toggle_mod(4),
            _ => {}
        }
    }

    fn tick_and_draw(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(snapshot) = self.session.tick() {
            self.last_snapshot = Some(snapshot);
        } else if self.session.state() == PlaybackState::Finished {
            info!("Replay finished");
            event_loop.exit();
            return;
        }

        let Some(gfx) = self.gfx.as_mut() else { return };
        let (width, height) = self.size;
        let mut buffer = match gfx.surface.buffer_mut() {
            Ok(buffer) => buffer,
            Err(e) => {
                error!("Failed to acquire frame buffer: {e}");
                return;
            }
        };

        let mut frame = Frame::new(&mut buffer, width, height);
        frame.clear(0x000000);
        if let Some(snapshot) = &self.last_snapshot {
            draw_snapshot(
                &mut frame,
                snapshot,
                self.session.active_mods(),
                self.session.total_frames(),
                self.session.state() == PlaybackState::Paused,
                width,
                height,
            );
        }

        if let Err(e) = buffer.present() {
            error!("Failed to present frame: {e}");
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none()
            && let Err(e) = self.init_window(event_loop)
        {
            error!("Failed to initialize window: {e}");
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref().cloned() else {
            return;
        };
        if window_id != window.id() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested. Shutting down.");
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if new_size.width > 0
                    && new_size.height > 0
                    && let Some(gfx) = self.gfx.as_mut()
                {
                    self.size = (new_size.width, new_size.height);
                    if let Err(e) = gfx.surface.resize(
                        NonZeroU32::new(new_size.width).unwrap(),
                        NonZeroU32::new(new_size.height).unwrap(),
                    ) {
                        error!("Failed to resize surface: {e}");
                    }
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed()
                    && !event.repeat
                    && let PhysicalKey::Code(code) = event.physical_key
                {
                    self.handle_key(event_loop, code);
                }
            }
            WindowEvent::RedrawRequested => self.tick_and_draw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        if now >= self.next_tick {
            if let Some(window) = self.window.as_ref() {
                window.request_redraw();
            }
            self.next_tick = now + TICK_INTERVAL;
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_tick));
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_snapshot(
    frame: &mut Frame,
    snapshot: &Snapshot,
    mods: Mods,
    total_frames: usize,
    paused: bool,
    width: u32,
    height: u32,
) {
    // Chart space maps onto the window with independent axis scales, so the
    // playfield always fills the window.
    let scale_x = width as f32 / PLAYFIELD_WIDTH;
    let scale_y = height as f32 / PLAYFIELD_HEIGHT;
    let radius = OBJECT_RADIUS * scale_x;

    for visual in &snapshot.visuals {
        let x = visual.x * scale_x;
        let y = visual.y * scale_y;
        match &visual.kind {
            VisualKind::Circle => {
                frame.fill_circle(x, y, radius, COLOR_OBJECT, visual.alpha);
                frame.stroke_circle(x, y, radius, 2.0, COLOR_BORDER, visual.alpha);
                frame.stroke_circle(
                    x,
                    y,
                    radius * (1.0 + visual.approach),
                    2.0,
                    COLOR_BORDER,
                    visual.alpha,
                );
            }
            VisualKind::Slider { path } => {
                let mut prev = None;
                for &(px, py) in path {
                    let p = (px * scale_x, py * scale_y);
                    if let Some((lx, ly)) = prev {
                        frame.line(lx, ly, p.0, p.1, radius, COLOR_OBJECT, visual.alpha);
                    }
                    prev = Some(p);
                }
                frame.fill_circle(x, y, radius, COLOR_OBJECT, visual.alpha);
                frame.stroke_circle(
                    x,
                    y,
                    radius * (1.0 + visual.approach),
                    2.0,
                    COLOR_BORDER,
                    visual.alpha,
                );
            }
            VisualKind::Spinner { progress } => {
                let cx = PLAYFIELD_WIDTH * 0.5 * scale_x;
                let cy = PLAYFIELD_HEIGHT * 0.5 * scale_y;
                let spin_radius = width.min(height) as f32 * 0.3;
                frame.stroke_circle(cx, cy, spin_radius, 2.0, COLOR_OBJECT, 255);
                frame.arc(cx, cy, spin_radius, *progress, spin_radius * 0.1, COLOR_BORDER);
            }
        }
    }

    let (cx, cy) = snapshot.cursor;
    frame.fill_circle(cx * scale_x, cy * scale_y, CURSOR_RADIUS, COLOR_CURSOR, 255);

    frame.text(10, 10, &format!("TIME: {:.2} MS", snapshot.time), COLOR_TEXT);
    frame.text(
        10,
        30,
        &format!("VISIBLE OBJECTS: {}", snapshot.visuals.len()),
        COLOR_TEXT,
    );
    frame.text(10, 50, &format!("ACTIVE MODS: {}", mods.label()), COLOR_TEXT);
    frame.text(
        10,
        70,
        &format!("FRAME: {}/{}", snapshot.frame_index + 1, total_frames),
        COLOR_TEXT,
    );
    if paused {
        frame.text(10, 90, "PAUSED", COLOR_TEXT);
    }
}

#[cfg(test)]
mod tests {
    use super::partial_ratio;

    #[test]
    fn exact_substring_is_a_full_match() {
        assert_eq!(
            partial_ratio("freedom", "Player - FreeDom Dive [Ex].osr"),
            100
        );
    }

    #[test]
    fn unrelated_strings_score_low() {
        assert!(partial_ratio("zzzz", "abcd.osr") < 70);
    }

    #[test]
    fn empty_query_never_matches() {
        assert_eq!(partial_ratio("", "anything"), 0);
    }
}
