use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use std::{error::Error, time::Duration};

use ratatui::{
    backend::Backend,
    style::{Color, Style},
    symbols,
    text::Span,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType},
    Frame, Terminal,
};

use radial8::{gui::TerminalGuard, layout::N_TARGETS, session::SessionRecord};

const CUE_COLORS: [Color; N_TARGETS] = [
    Color::Red,
    Color::Green,
    Color::Yellow,
    Color::Blue,
    Color::Magenta,
    Color::Cyan,
    Color::LightRed,
    Color::LightGreen,
];

/// Trajectories as chart points, y flipped so up on screen is up on the
/// task display.
struct Trajectories {
    lines: Vec<(u8, Vec<(f64, f64)>)>,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
}

impl Trajectories {
    fn new(record: &SessionRecord) -> Self {
        let lines: Vec<(u8, Vec<(f64, f64)>)> = record
            .trials
            .iter()
            .map(|t| {
                let points = t.cursor_trajectory.iter().map(|p| (p.x, -p.y)).collect();
                (t.cue, points)
            })
            .collect();

        let all = lines.iter().flat_map(|(_, points)| points.iter());
        let (mut x_min, mut x_max, mut y_min, mut y_max) =
            (f64::MAX, f64::MIN, f64::MAX, f64::MIN);
        for &(x, y) in all {
            x_min = x_min.min(x);
            x_max = x_max.max(x);
            y_min = y_min.min(y);
            y_max = y_max.max(y);
        }
        if x_min > x_max {
            (x_min, x_max, y_min, y_max) = (0.0, 1.0, -1.0, 0.0);
        }

        Self {
            lines,
            x_bounds: pad(x_min, x_max),
            y_bounds: pad(y_min, y_max),
        }
    }
}

fn pad(min: f64, max: f64) -> [f64; 2] {
    let margin = ((max - min) * 0.05).max(1.0);
    [min - margin, max + margin]
}

fn labels(bounds: [f64; 2], flip: bool) -> Vec<Span<'static>> {
    let mid = (bounds[0] + bounds[1]) / 2.0;
    [bounds[0], mid, bounds[1]]
        .iter()
        .map(|&v| Span::from(format!("{:.0}", if flip { -v } else { v })))
        .collect()
}

/// Show every trajectory of `record` until a key is pressed.
pub fn engage_plot(record: &SessionRecord) -> Result<(), Box<dyn Error>> {
    let trajectories = Trajectories::new(record);
    let mut guard = TerminalGuard::enter(false)?;
    run_plot(guard.terminal(), &trajectories)?;
    Ok(())
}

fn run_plot<B: Backend>(terminal: &mut Terminal<B>, trajectories: &Trajectories) -> std::io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, trajectories))?;

        if event::poll(Duration::from_millis(250))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press
                    && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
                {
                    return Ok(());
                }
            }
        }
    }
}

fn ui(f: &mut Frame, trajectories: &Trajectories) {
    let datasets = trajectories
        .lines
        .iter()
        .map(|(cue, points)| {
            Dataset::default()
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(CUE_COLORS[usize::from(*cue) % N_TARGETS]))
                .data(points)
        })
        .collect();

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .title(" Cursor trajectories, colored by cue (q to quit) ")
                .borders(Borders::ALL),
        )
        .x_axis(
            Axis::default()
                .title(Span::styled("x px", Style::default().fg(Color::Red)))
                .style(Style::default().fg(Color::White))
                .bounds(trajectories.x_bounds)
                .labels(labels(trajectories.x_bounds, false)),
        )
        .y_axis(
            Axis::default()
                .title(Span::styled("y px", Style::default().fg(Color::Red)))
                .style(Style::default().fg(Color::White))
                .bounds(trajectories.y_bounds)
                .labels(labels(trajectories.y_bounds, true)),
        );

    f.render_widget(chart, f.size());
}
