use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
    Frame as UiFrame,
};

use crate::app::{App, FetchState, HoverState, Screen};
use crate::braille::BrailleCanvas;
use crate::classify::NO_DATA_COLOR;
use crate::data::Region;
use crate::export::with_commas;
use crate::map::renderer::{render_frame, render_overview, FrameKind};

/// Width of the control sidebar on both screens
pub const SIDEBAR_WIDTH: u16 = 30;

fn rgb(color: (u8, u8, u8)) -> Color {
    Color::Rgb(color.0, color.1, color.2)
}

/// Inner rect of the map panel (inside its border) for the given terminal
/// size. The event loop uses this to translate mouse coordinates; render()
/// must agree with it.
pub fn map_panel_inner(width: u16, height: u16) -> Rect {
    let map_width = width.saturating_sub(SIDEBAR_WIDTH);
    let map_height = height.saturating_sub(1); // status bar
    Rect {
        x: SIDEBAR_WIDTH + 1,
        y: 1,
        width: map_width.saturating_sub(2),
        height: map_height.saturating_sub(2),
    }
}

/// Render the UI
pub fn render(frame: &mut UiFrame, app: &App) {
    let area = frame.area();

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),    // Main content
            Constraint::Length(1), // Status bar
        ])
        .split(area);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(10)])
        .split(rows[0]);

    match app.screen {
        Screen::Picker => render_picker_sidebar(frame, app, columns[0]),
        Screen::Map => render_map_sidebar(frame, app, columns[0]),
    }
    render_map_panel(frame, app, columns[1]);
    render_status_bar(frame, app, rows[1]);
}

fn render_picker_sidebar(frame: &mut UiFrame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            " Regions ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let mut lines = Vec::new();
    for (i, region) in Region::ALL.iter().enumerate() {
        let marker = if i == app.picker_index { "▶ " } else { "  " };
        let style = if i == app.picker_index {
            Style::default().fg(rgb(region.accent_color())).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(rgb(region.accent_color()))
        };
        lines.push(Line::from(vec![
            Span::styled(marker.to_string(), Style::default().fg(Color::White)),
            Span::styled(format!("{}. {}", i + 1, region.name()), style),
        ]));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "↑/↓ or 1-5 to choose,",
        Style::default().fg(Color::DarkGray),
    )));
    lines.push(Line::from(Span::styled(
        "Enter to load counties.",
        Style::default().fg(Color::DarkGray),
    )));

    if let FetchState::Failed { region, message } = &app.fetch {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("{} load failed:", region.name()),
            Style::default().fg(Color::Red),
        )));
        lines.push(Line::from(Span::styled(
            message.clone(),
            Style::default().fg(Color::Red),
        )));
        lines.push(Line::from(Span::styled(
            "Select again to retry.",
            Style::default().fg(Color::DarkGray),
        )));
    }

    frame.render_widget(Paragraph::new(lines), inner);
}

fn render_map_sidebar(frame: &mut UiFrame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            " Controls ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let mut lines = vec![
        Line::from(vec![
            Span::styled("Method: ", Style::default().fg(Color::DarkGray)),
            Span::styled(app.method.label(), Style::default().fg(Color::Yellow)),
        ]),
        Line::from(vec![
            Span::styled("Colors: ", Style::default().fg(Color::DarkGray)),
            Span::styled(app.palette.name(), Style::default().fg(Color::Yellow)),
        ]),
    ];

    // Palette ramp preview, five blocks light to dark
    let ramp: Vec<Span> = app
        .palette
        .colors()
        .iter()
        .map(|&c| Span::styled("████", Style::default().fg(rgb(c))))
        .collect();
    lines.push(Line::from(ramp));
    lines.push(Line::from(""));

    match &app.classification {
        Some(classification) if !classification.is_empty() => {
            lines.push(Line::from(Span::styled(
                "Legend (population)",
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            )));
            let colors = app.palette.colors();
            for (class, color) in classification.classes.iter().zip(colors) {
                lines.push(Line::from(vec![
                    Span::styled("██ ", Style::default().fg(rgb(color))),
                    Span::styled(
                        format!("{} - {}", with_commas(class.low), with_commas(class.high)),
                        Style::default().fg(Color::Gray),
                    ),
                ]));
            }
            let has_no_data = app
                .entry
                .as_ref()
                .is_some_and(|e| e.counties.iter().any(|c| c.population == 0));
            if has_no_data {
                lines.push(Line::from(vec![
                    Span::styled("██ ", Style::default().fg(rgb(NO_DATA_COLOR))),
                    Span::styled("No Data", Style::default().fg(Color::Gray)),
                ]));
            }
        }
        _ => {
            lines.push(Line::from(Span::styled(
                "Press 'a' to apply the",
                Style::default().fg(Color::DarkGray),
            )));
            lines.push(Line::from(Span::styled(
                "choropleth symbology.",
                Style::default().fg(Color::DarkGray),
            )));
        }
    }

    lines.push(Line::from(""));
    for help in [
        "m  cycle method",
        "c  cycle colors",
        "a  apply",
        "e  export HTML",
        "b  back to regions",
        "q  quit",
    ] {
        lines.push(Line::from(Span::styled(
            help,
            Style::default().fg(Color::DarkGray),
        )));
    }

    frame.render_widget(Paragraph::new(lines), inner);
}

fn render_map_panel(frame: &mut UiFrame, app: &App, area: Rect) {
    let title = match (app.screen, app.region, &app.classification) {
        (Screen::Picker, ..) => " United States — Select a Region ".to_string(),
        (Screen::Map, Some(region), Some(c)) if !c.is_empty() => format!(
            " {} Region Counties — {} ({}) ",
            region.name(),
            c.method.label(),
            app.palette.name()
        ),
        (Screen::Map, Some(region), _) => format!(" {} Region Counties ", region.name()),
        (Screen::Map, None, _) => " Counties ".to_string(),
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            title,
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    frame.render_widget(MapWidget { app }, inner);
}

/// Widget rendering Braille layers with per-layer colors, plus the tooltip
/// and cursor marker on top
struct MapWidget<'a> {
    app: &'a App,
}

impl MapWidget<'_> {
    /// Blit one canvas at a character offset, skipping blank cells
    fn render_layer(
        canvas: &BrailleCanvas,
        color: Color,
        offset: (u16, u16),
        area: Rect,
        buf: &mut Buffer,
    ) {
        for (row_idx, row_str) in canvas.rows().enumerate() {
            let y = offset.1 as usize + row_idx;
            if y >= area.height as usize {
                break;
            }
            for (col_idx, ch) in row_str.chars().enumerate() {
                let x = offset.0 as usize + col_idx;
                if x >= area.width as usize {
                    break;
                }
                if ch == '\u{2800}' {
                    continue;
                }
                buf[(area.x + x as u16, area.y + y as u16)].set_char(ch).set_fg(color);
            }
        }
    }

    fn render_overview_screen(&self, area: Rect, buf: &mut Buffer) {
        if self.app.states.is_empty() {
            let message = if self.app.states_loading {
                "Loading state outlines from the Census service..."
            } else {
                "State outlines unavailable — press 1-5 to pick a region."
            };
            center_text(message, Color::Gray, area, buf);
            return;
        }

        let viewport = self.app.overview_viewport(area.width, area.height);
        let layers = render_overview(&self.app.states, &viewport);
        for (region, canvas) in &layers.regions {
            Self::render_layer(canvas, rgb(region.accent_color()), (0, 0), area, buf);
        }
        Self::render_layer(&layers.outlines, Color::White, (0, 0), area, buf);
    }

    fn render_map_screen(&self, area: Rect, buf: &mut Buffer) {
        if let FetchState::Pending { region, done, total } = &self.app.fetch {
            center_text(
                &format!(
                    "Loading {} counties... state {}/{}",
                    region.name(),
                    done,
                    total
                ),
                Color::Gray,
                area,
                buf,
            );
            return;
        }

        let Some(entry) = &self.app.entry else {
            return;
        };
        let colors = self.app.palette.colors();

        for map_frame in &self.app.frames {
            let layers = render_frame(&entry.counties, self.app.classification.as_ref(), map_frame);
            let offset = (map_frame.col, map_frame.row);

            for (class_idx, canvas) in layers.classes.iter().enumerate() {
                Self::render_layer(canvas, rgb(colors[class_idx]), offset, area, buf);
            }
            Self::render_layer(&layers.no_data, rgb(NO_DATA_COLOR), offset, area, buf);
            Self::render_layer(&layers.outlines, Color::DarkGray, offset, area, buf);

            // Inset frames get a visible border and title
            if map_frame.kind != FrameKind::Primary {
                let rect = Rect {
                    x: area.x + map_frame.col,
                    y: area.y + map_frame.row,
                    width: map_frame.width.min(area.width.saturating_sub(map_frame.col)),
                    height: map_frame
                        .height
                        .min(area.height.saturating_sub(map_frame.row)),
                };
                if rect.width >= 2 && rect.height >= 2 {
                    Block::default()
                        .borders(Borders::ALL)
                        .border_style(Style::default().fg(Color::White))
                        .title(Span::styled(
                            map_frame.kind.title(),
                            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
                        ))
                        .render(rect, buf);
                }
            }
        }

        // North arrow marker, top-right corner of the panel
        if area.width >= 4 {
            let x = area.x + area.width - 2;
            buf[(x, area.y)].set_char('N').set_fg(Color::White);
            buf[(x, area.y + 1)].set_char('↑').set_fg(Color::White);
        }

        self.render_tooltip(area, buf);

        if let Some((col, row)) = self.app.mouse_pos {
            if col < area.width && row < area.height {
                buf[(area.x + col, area.y + row)].set_char('╋').set_fg(Color::Red);
            }
        }
    }

    /// County name + population box near the cursor, shown only after the
    /// hover dwell has elapsed
    fn render_tooltip(&self, area: Rect, buf: &mut Buffer) {
        let Some(county) = self.app.tooltip_county() else {
            return;
        };
        let Some((col, row)) = self.app.mouse_pos else {
            return;
        };

        let name = county.name.clone();
        let population = format!("Population: {}", with_commas(county.population as f64));
        let width = name.len().max(population.len()) as u16 + 2;

        // Offset from the cursor; flip left when near the right edge
        let mut x = col + 2;
        if x + width > area.width {
            x = col.saturating_sub(width + 1);
        }
        let y = row.saturating_sub(1);

        let style = Style::default().fg(Color::Black).bg(Color::Rgb(0xf5, 0xf5, 0xdc));
        for (dy, text) in [(0u16, &name), (1u16, &population)] {
            let line_y = y + dy;
            if line_y >= area.height {
                continue;
            }
            for (dx, ch) in format!(" {text} ").chars().enumerate() {
                let line_x = x + dx as u16;
                if line_x >= area.width {
                    break;
                }
                buf[(area.x + line_x, area.y + line_y)].set_char(ch).set_style(style);
            }
        }
    }
}

impl Widget for MapWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        match self.app.screen {
            Screen::Picker => self.render_overview_screen(area, buf),
            Screen::Map => self.render_map_screen(area, buf),
        }
    }
}

fn center_text(text: &str, color: Color, area: Rect, buf: &mut Buffer) {
    if area.height == 0 {
        return;
    }
    let y = area.y + area.height / 2;
    let x = area.x + area.width.saturating_sub(text.len() as u16) / 2;
    for (i, ch) in text.chars().enumerate() {
        let px = x + i as u16;
        if px >= area.x + area.width {
            break;
        }
        buf[(px, y)].set_char(ch).set_fg(color);
    }
}

fn render_status_bar(frame: &mut UiFrame, app: &App, area: Rect) {
    let mut spans = Vec::new();

    match app.screen {
        Screen::Picker => {
            spans.push(Span::styled(
                " Population by region viewer ",
                Style::default().fg(Color::Cyan),
            ));
            if app.states_loading {
                spans.push(Span::styled(
                    "| fetching state outlines... ",
                    Style::default().fg(Color::Yellow),
                ));
            }
        }
        Screen::Map => {
            spans.push(Span::styled(" Zoom: ", Style::default().fg(Color::DarkGray)));
            spans.push(Span::styled(
                format!("{:.1}x ", app.viewport.zoom),
                Style::default().fg(Color::Yellow),
            ));
            spans.push(Span::styled("| Scale: ", Style::default().fg(Color::DarkGray)));
            spans.push(Span::styled(
                format!("~{:.0} mi ", app.viewport.scale_miles()),
                Style::default().fg(Color::Magenta),
            ));
            if let HoverState::Hovering { fips, .. } | HoverState::Showing { fips } = &app.hover {
                if let Some(county) = app
                    .entry
                    .as_ref()
                    .and_then(|e| e.counties.iter().find(|c| &c.fips == fips))
                {
                    spans.push(Span::styled("| ", Style::default().fg(Color::DarkGray)));
                    spans.push(Span::styled(
                        format!("{} ", county.name),
                        Style::default().fg(Color::Cyan),
                    ));
                }
            }
            spans.push(Span::styled(
                "| drag:pan wheel:zoom hjkl:pan +/-:zoom ",
                Style::default().fg(Color::DarkGray),
            ));
        }
    }

    if let Some(status) = &app.status {
        spans.push(Span::styled("| ", Style::default().fg(Color::DarkGray)));
        spans.push(Span::styled(status.clone(), Style::default().fg(Color::Green)));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
