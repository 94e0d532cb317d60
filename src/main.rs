use std::fs;
use std::path::Path;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
    MouseEvent, MouseEventKind,
};
use crossterm::execute;
use ratatui::layout::Rect;
use ratatui::DefaultTerminal;

use choropleth_tui::app::{App, Screen};
use choropleth_tui::cache::RegionEntry;
use choropleth_tui::data::tiger::TigerSource;
use choropleth_tui::data::{FileSource, GeometrySource, Region, StateRecord};
use choropleth_tui::ui;

/// Results delivered from worker threads back onto the interactive thread
enum WorkerMessage {
    States(choropleth_tui::Result<Vec<StateRecord>>),
    Progress {
        generation: u64,
        done: usize,
    },
    Counties {
        generation: u64,
        region: Region,
        result: choropleth_tui::Result<Arc<RegionEntry>>,
    },
}

fn main() -> Result<()> {
    init_tracing();

    // Initialize terminal
    let mut terminal = ratatui::init();
    terminal.clear()?;

    // Enable mouse capture
    execute!(std::io::stdout(), EnableMouseCapture)?;

    // Run the app
    let result = run(&mut terminal);

    // Disable mouse capture and restore terminal
    let _ = execute!(std::io::stdout(), DisableMouseCapture);
    ratatui::restore();

    result
}

/// Log to a file so the alternate screen stays clean. RUST_LOG controls
/// the filter as usual.
fn init_tracing() {
    match fs::File::create("choropleth-tui.log") {
        Ok(file) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .try_init();
        }
        Err(e) => eprintln!("Warning: no log file: {e}"),
    }
}

/// Pick the geometry source: local GeoJSON fixtures when present (offline
/// runs and development), otherwise the Census TIGERweb services
fn build_source(
    tx: Option<(mpsc::Sender<WorkerMessage>, u64)>,
) -> choropleth_tui::Result<Box<dyn GeometrySource>> {
    let data_dir = Path::new("data");
    if data_dir.join("counties.geojson").exists() {
        return Ok(Box::new(FileSource::new(data_dir)));
    }
    let mut source = TigerSource::new()?;
    if let Some((tx, generation)) = tx {
        // Sender is not Sync; the progress callback crosses a Sync bound
        let tx = std::sync::Mutex::new(tx);
        source = source.with_progress(Box::new(move |done, _total| {
            if let Ok(tx) = tx.lock() {
                let _ = tx.send(WorkerMessage::Progress { generation, done });
            }
        }));
    }
    Ok(Box::new(source))
}

fn spawn_states_fetch(tx: mpsc::Sender<WorkerMessage>) {
    thread::spawn(move || {
        let result = build_source(None).and_then(|source| source.fetch_states());
        let _ = tx.send(WorkerMessage::States(result));
    });
}

/// Kick off a county fetch for the region off the interactive thread. The
/// cache guarantees at most one network request per region; the generation
/// tag lets the receiver drop results for abandoned selections.
fn start_region_fetch(app: &mut App, region: Region, tx: &mpsc::Sender<WorkerMessage>) {
    let generation = app.select_region(region);
    let cache = app.cache.clone();
    let tx = tx.clone();
    thread::spawn(move || {
        let result = build_source(Some((tx.clone(), generation)))
            .and_then(|source| cache.get_or_load(region, source.as_ref()));
        let _ = tx.send(WorkerMessage::Counties {
            generation,
            region,
            result,
        });
    });
}

fn deliver(app: &mut App, message: WorkerMessage) {
    match message {
        WorkerMessage::States(result) => app.deliver_states(result),
        WorkerMessage::Progress { generation, done } => app.fetch_progress(generation, done),
        WorkerMessage::Counties {
            generation,
            region,
            result,
        } => app.deliver_counties(generation, region, result),
    }
}

fn handle_key(app: &mut App, code: KeyCode, tx: &mpsc::Sender<WorkerMessage>) {
    match app.screen {
        Screen::Picker => match code {
            KeyCode::Char('q') | KeyCode::Esc => app.quit(),
            KeyCode::Up | KeyCode::Char('k') => app.picker_move(-1),
            KeyCode::Down | KeyCode::Char('j') => app.picker_move(1),
            KeyCode::Enter => {
                let region = app.picker_region();
                start_region_fetch(app, region, tx);
            }
            KeyCode::Char(c @ '1'..='5') => {
                app.picker_index = (c as u8 - b'1') as usize;
                let region = app.picker_region();
                start_region_fetch(app, region, tx);
            }
            _ => {}
        },
        Screen::Map => match code {
            KeyCode::Char('q') => app.quit(),
            KeyCode::Char('b') | KeyCode::Esc => app.back_to_picker(),

            KeyCode::Char('m') => app.cycle_method(),
            KeyCode::Char('c') => app.cycle_palette(),
            KeyCode::Char('a') => app.apply(),
            KeyCode::Char('e') => export_snapshot(app),

            // Pan with hjkl or arrow keys
            KeyCode::Left | KeyCode::Char('h') => app.pan(-10, 0),
            KeyCode::Right | KeyCode::Char('l') => app.pan(10, 0),
            KeyCode::Up | KeyCode::Char('k') => app.pan(0, -6),
            KeyCode::Down | KeyCode::Char('j') => app.pan(0, 6),

            // Zoom
            KeyCode::Char('+') | KeyCode::Char('=') => app.zoom_in(),
            KeyCode::Char('-') | KeyCode::Char('_') => app.zoom_out(),

            _ => {}
        },
    }
}

/// Write the artifact into the working directory; the exporter itself only
/// produces bytes
fn export_snapshot(app: &mut App) {
    match app.build_snapshot() {
        None => {
            app.status = Some("apply a classification before exporting".to_string());
        }
        Some(Ok((filename, bytes))) => match fs::write(&filename, bytes) {
            Ok(()) => {
                tracing::info!(filename = %filename, "snapshot written");
                app.status = Some(format!("exported to {filename}"));
            }
            Err(e) => app.status = Some(format!("export failed: {e}")),
        },
        Some(Err(e)) => app.status = Some(format!("export failed: {e}")),
    }
}

/// Handle mouse events: hover, wheel zoom, drag pan, and picker clicks
fn handle_mouse(app: &mut App, mouse: MouseEvent, panel: Rect, tx: &mpsc::Sender<WorkerMessage>) {
    let inside = mouse.column >= panel.x
        && mouse.column < panel.x + panel.width
        && mouse.row >= panel.y
        && mouse.row < panel.y + panel.height;
    let col = mouse.column.saturating_sub(panel.x);
    let row = mouse.row.saturating_sub(panel.y);

    if app.screen == Screen::Picker {
        if inside && mouse.kind == MouseEventKind::Down(MouseButton::Left) {
            if let Some(region) = app.pick_region_at(col, row) {
                start_region_fetch(app, region, tx);
            }
        }
        return;
    }

    match mouse.kind {
        MouseEventKind::Moved => {
            if inside {
                app.on_cursor_move(col, row);
            } else {
                app.on_cursor_leave();
            }
        }
        MouseEventKind::ScrollUp if inside => app.zoom_at(col, row, true),
        MouseEventKind::ScrollDown if inside => app.zoom_at(col, row, false),
        MouseEventKind::Down(MouseButton::Left) if inside => app.begin_drag(col, row),
        MouseEventKind::Drag(MouseButton::Left) => app.handle_drag(col, row),
        MouseEventKind::Up(MouseButton::Left) => app.end_drag(),
        _ => {}
    }
}

fn run(terminal: &mut DefaultTerminal) -> Result<()> {
    let mut app = App::new();
    let (tx, rx) = mpsc::channel();

    // State outlines for the picker load in the background at startup
    spawn_states_fetch(tx.clone());

    // Main loop
    loop {
        let size = terminal.size()?;
        let panel = ui::map_panel_inner(size.width, size.height);
        app.set_panel_size(panel.width, panel.height);

        // Drain worker deliveries before drawing
        while let Ok(message) = rx.try_recv() {
            deliver(&mut app, message);
        }

        terminal.draw(|frame| ui::render(frame, &app))?;

        if event::poll(Duration::from_millis(33))? {
            match event::read()? {
                Event::Key(key) => {
                    // Only handle key press events (not release)
                    if key.kind == KeyEventKind::Press {
                        handle_key(&mut app, key.code, &tx);
                    }
                }
                Event::Mouse(mouse) => {
                    handle_mouse(&mut app, mouse, panel, &tx);
                }
                Event::Resize(..) => {} // picked up from terminal.size() next pass
                _ => {}
            }
        }

        // Throttled hover resolution and tooltip dwell
        app.tick(Instant::now());

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
