use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{self, Stdout, Write};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chunk_maze::{
    Cell as MapCell, Chunk, MapChunks, MapConfig, MapGenerator, MapObserver, Phase, Pos, Step,
};
use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{ExecutableCommand, QueueableCommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use unicode_width::UnicodeWidthStr;

const CELL_W: usize = 2;
const DEFAULT_RENDER_FPS: u64 = 60;
const LOG_FILE_VAR: &str = "CHUNKMAZE_LOG";

#[derive(Clone, Copy, PartialEq)]
enum Glyph {
    Void,
    Grass,
    Path,
    Head,
    Exit,
}

#[derive(Clone, Copy, PartialEq)]
struct Tile {
    glyph: Glyph,
    color: Color,
}

const VOID: Tile = Tile {
    glyph: Glyph::Void,
    color: Color::Reset,
};

/// Cell rectangle covering every chunk of the map.
#[derive(Clone, Copy, PartialEq, Default)]
struct Bounds {
    min: Pos,
    width: usize,
    height: usize,
}

impl Bounds {
    fn of(map: &MapChunks) -> Self {
        let size = map.chunk_size() as i32;
        let mut origins = map.chunks().iter().map(Chunk::origin);
        let Some(first) = origins.next() else {
            return Self::default();
        };
        let (mut min, mut max) = (first, first);
        for origin in origins {
            min.x = min.x.min(origin.x);
            min.y = min.y.min(origin.y);
            max.x = max.x.max(origin.x);
            max.y = max.y.max(origin.y);
        }
        Self {
            min,
            width: (max.x - min.x + size) as usize,
            height: (max.y - min.y + size) as usize,
        }
    }

    fn pos(&self, x: usize, y: usize) -> Pos {
        Pos::new(self.min.x + x as i32, self.min.y + y as i32)
    }
}

struct Renderer {
    last: Vec<Tile>,
    last_hud: String,
    bounds: Bounds,
    needs_full: bool,
    origin_x: u16,
    origin_y: u16,
}

impl Renderer {
    fn new() -> Self {
        Self {
            last: Vec::new(),
            last_hud: String::new(),
            bounds: Bounds::default(),
            needs_full: true,
            origin_x: 0,
            origin_y: 1,
        }
    }

    fn fit(&mut self, bounds: Bounds) {
        if bounds != self.bounds {
            self.bounds = bounds;
            self.last = vec![VOID; bounds.width * bounds.height];
            self.needs_full = true;
        }
    }
}

/// Collects finished cells for the headless text dump.
#[derive(Default)]
struct TextCanvas {
    cells: HashMap<Pos, char>,
}

impl MapObserver for TextCanvas {
    fn materialize_cell(&mut self, _chunk: usize, pos: Pos, cell: &MapCell) {
        self.cells.insert(pos, if cell.is_path() { '#' } else { '.' });
    }

    fn chunk_completed(&mut self, index: usize, chunk: &Chunk) {
        let (wx, wy) = chunk.world_position(chunk.origin());
        info!(
            index,
            origin = %chunk.origin(),
            world_x = wx,
            world_y = wy,
            branches = chunk.branches().len(),
            "chunk completed"
        );
    }
}

fn main() -> Result<()> {
    let headless = std::env::args().skip(1).any(|arg| arg == "--print");
    init_logging(headless)?;
    let config = MapConfig::from_env().context("loading configuration")?;
    let generator = MapGenerator::new(config)?;

    if headless {
        return print_map(generator);
    }

    let mut stdout = io::stdout();
    terminal::enable_raw_mode()?;
    stdout.execute(EnterAlternateScreen)?;
    stdout.execute(Hide)?;

    let result = run(&mut stdout, generator);

    stdout.execute(Show)?;
    stdout.execute(LeaveAlternateScreen)?;
    terminal::disable_raw_mode()?;
    result
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_logging(headless: bool) -> Result<()> {
    if headless {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_writer(io::stderr)
            .init();
        return Ok(());
    }
    // The viewer owns the terminal, so logs only go to a file when asked.
    let Ok(path) = std::env::var(LOG_FILE_VAR) else {
        return Ok(());
    };
    let file = File::create(&path).with_context(|| format!("creating log file {path}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

fn print_map(mut generator: MapGenerator) -> Result<()> {
    let mut canvas = TextCanvas::default();
    let report = generator.run(&mut canvas)?;
    info!(
        produced = report.produced,
        requested = report.requested,
        seed = report.seed,
        reason = ?report.reason,
        "generation report"
    );

    let map = generator.map();
    for (exit, _) in map.available_exits() {
        canvas.cells.insert(exit, 'o');
    }
    let bounds = Bounds::of(map);
    let mut out = io::stdout().lock();
    for y in 0..bounds.height {
        let row: String = (0..bounds.width)
            .map(|x| canvas.cells.get(&bounds.pos(x, y)).copied().unwrap_or(' '))
            .collect();
        writeln!(out, "{}", row.trim_end())?;
    }
    writeln!(
        out,
        "seed {}: {} of {} chunks ({:?})",
        report.seed, report.produced, report.requested, report.reason
    )?;
    Ok(())
}

fn run(stdout: &mut Stdout, mut generator: MapGenerator) -> Result<()> {
    let mut renderer = Renderer::new();
    let mut status = String::new();
    let step_mode = generator.config().step_mode;
    let step_time = Duration::from_millis(generator.config().step_millis);
    let frame_time = Duration::from_micros(1_000_000 / read_render_fps());
    let mut auto = step_mode;
    let mut last_step = Instant::now();

    if !step_mode {
        finish(&mut generator, &mut status);
    }

    loop {
        let frame_start = Instant::now();
        while event::poll(Duration::from_millis(0))? {
            if let Event::Key(key) = event::read()? {
                match key.kind {
                    KeyEventKind::Press | KeyEventKind::Repeat => match key.code {
                        KeyCode::Char('q') => return Ok(()),
                        KeyCode::Char(' ') => {
                            auto = false;
                            advance(&mut generator, &mut status);
                        }
                        KeyCode::Char('a') => auto = !auto,
                        KeyCode::Char('f') => finish(&mut generator, &mut status),
                        KeyCode::Char('r') => {
                            generator.reset(-1);
                            status.clear();
                            stdout.queue(Clear(ClearType::All))?;
                            renderer.needs_full = true;
                            if !step_mode {
                                finish(&mut generator, &mut status);
                            }
                        }
                        _ => {}
                    },
                    _ => {}
                }
            }
        }

        if auto && !generator.is_done() && last_step.elapsed() >= step_time {
            last_step = Instant::now();
            advance(&mut generator, &mut status);
        }
        render(stdout, &generator, &mut renderer, auto, &status)?;

        let elapsed = frame_start.elapsed();
        if elapsed < frame_time {
            thread::sleep(frame_time - elapsed);
        }
    }
}

fn advance(generator: &mut MapGenerator, status: &mut String) {
    match generator.advance(&mut ()) {
        Ok(Step::Pending(_)) => {}
        Ok(Step::Done(reason)) => *status = format!("done: {reason:?}"),
        Err(err) => *status = format!("stopped: {err}"),
    }
}

fn finish(generator: &mut MapGenerator, status: &mut String) {
    while !generator.is_done() {
        advance(generator, status);
    }
}

fn read_render_fps() -> u64 {
    std::env::var("CHUNKMAZE_FPS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_RENDER_FPS)
}

fn render(
    stdout: &mut Stdout,
    generator: &MapGenerator,
    renderer: &mut Renderer,
    auto: bool,
    status: &str,
) -> io::Result<()> {
    let map = generator.map();
    let bounds = Bounds::of(map);
    if bounds != renderer.bounds {
        stdout.queue(Clear(ClearType::All))?;
    }
    renderer.fit(bounds);

    let needed_h = (bounds.height + 2) as u16;
    let needed_w = (bounds.width * CELL_W) as u16;

    stdout.queue(MoveTo(0, 0))?;

    let (term_w, term_h) = terminal::size()?;
    if term_w < needed_w || term_h < needed_h {
        stdout.queue(Clear(ClearType::All))?;
        let msg = format!(
            "Terminal too small. Need at least {}x{} (cols x rows). Current: {}x{}.",
            needed_w, needed_h, term_w, term_h
        );
        stdout.queue(Print(msg))?;
        stdout.flush()?;
        renderer.needs_full = true;
        return Ok(());
    }

    let origin_x = (term_w - needed_w) / 2;
    let origin_y = (term_h - needed_h) / 2 + 1;
    if origin_x != renderer.origin_x || origin_y != renderer.origin_y {
        renderer.origin_x = origin_x;
        renderer.origin_y = origin_y;
        renderer.needs_full = true;
    }

    let attached = map
        .last_attachment()
        .map_or_else(String::new, |a| format!("Entered {:?} at {}  ", a.dir, a.exit));
    let branching = map
        .chosen_direction()
        .map_or_else(String::new, |dir| format!("Towards {dir:?}  "));
    let hud = format!(
        "Chunks: {}/{}  Seed: {}  Branch: {:.0}%  {}{}{}  {}  (space step, a auto, f finish, r new, q quit)",
        map.len(),
        generator.config().chunk_count,
        generator.seed(),
        generator.branch_probability(),
        attached,
        branching,
        if auto { "auto" } else { "paused" },
        status
    );
    if renderer.needs_full || hud != renderer.last_hud {
        stdout.queue(MoveTo(0, renderer.origin_y - 1))?;
        stdout.queue(SetForegroundColor(Color::White))?;
        stdout.queue(Clear(ClearType::CurrentLine))?;
        stdout.queue(Print(&hud))?;
        stdout.queue(ResetColor)?;
        renderer.last_hud = hud;
    }

    let exits: HashSet<Pos> = map.available_exits().map(|(pos, _)| pos).collect();
    let head = growing_head(generator);
    for y in 0..bounds.height {
        for x in 0..bounds.width {
            let tile = tile_for(map, bounds.pos(x, y), head, &exits);
            let idx = y * bounds.width + x;
            if renderer.needs_full || tile != renderer.last[idx] {
                renderer.last[idx] = tile;
                draw_cell(stdout, renderer, x, y, tile)?;
            }
        }
    }
    renderer.needs_full = false;

    stdout.flush()?;
    Ok(())
}

/// Tail of the branch being grown, if a chunk is under construction.
fn growing_head(generator: &MapGenerator) -> Option<Pos> {
    match generator.phase() {
        Phase::GrowTrunk | Phase::GrowBranch(_) | Phase::ChooseBranch => generator
            .map()
            .chunks()
            .last()
            .and_then(|chunk| chunk.branches().last())
            .and_then(|branch| branch.last())
            .copied(),
        _ => None,
    }
}

fn tile_for(map: &MapChunks, pos: Pos, head: Option<Pos>, exits: &HashSet<Pos>) -> Tile {
    if head == Some(pos) {
        return Tile {
            glyph: Glyph::Head,
            color: Color::Red,
        };
    }
    if exits.contains(&pos) {
        return Tile {
            glyph: Glyph::Exit,
            color: Color::Yellow,
        };
    }
    match map.cell_at(pos) {
        None => VOID,
        Some(MapCell::Grass) => Tile {
            glyph: Glyph::Grass,
            color: Color::DarkGreen,
        },
        Some(MapCell::Path { .. }) => Tile {
            glyph: Glyph::Path,
            color: Color::White,
        },
    }
}

fn draw_cell(stdout: &mut Stdout, renderer: &Renderer, x: usize, y: usize, tile: Tile) -> io::Result<()> {
    let text = match tile.glyph {
        Glyph::Void => "  ",
        Glyph::Grass => "··",
        Glyph::Path => "██",
        Glyph::Head => "██",
        Glyph::Exit => "▓",
    };
    let x_pos = renderer.origin_x + (x * CELL_W) as u16;
    let y_pos = renderer.origin_y + y as u16;
    stdout.queue(MoveTo(x_pos, y_pos))?;
    stdout.queue(SetForegroundColor(tile.color))?;
    stdout.queue(Print(text))?;
    let w = UnicodeWidthStr::width(text);
    if w < CELL_W {
        for _ in 0..(CELL_W - w) {
            stdout.queue(Print(' '))?;
        }
    }
    stdout.queue(ResetColor)?;
    Ok(())
}
