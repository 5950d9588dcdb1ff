use std::{
    io,
    time::{Duration, Instant},
};

use crate::{
    gui::{error::RadialGuiError, terminal::TerminalGuard},
    layout::Viewport,
    logging::ConsoleSwitch,
    scheduler::{CuePicker, TrialState},
    session::{Session, SessionClock},
    shutdown::StopFlag,
};

use crossterm::event::{
    self, Event, KeyCode, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use log::info;
use ratatui::{
    prelude::*,
    symbols::Marker,
    widgets::{
        block::{Position, Title},
        canvas::{Canvas, Circle, Points},
        *,
    },
};

const TARGET_COLOR: Color = Color::Rgb(70, 130, 180);
const CUE_COLOR: Color = Color::LightRed;
const MIN_WIDTH: u16 = 20;
const MIN_HEIGHT: u16 = 10;

/// Whether the task loop keeps going after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

/// Route one terminal event to the session. Mouse positions go through
/// `viewport`, the canvas area as last drawn.
pub fn handle_event<P: CuePicker>(
    session: &mut Session<P>,
    event: &Event,
    viewport: &Viewport,
    now: f64,
) -> Control {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
            KeyCode::Esc | KeyCode::Char('q') => Control::Quit,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Control::Quit,
            _ => Control::Continue,
        },
        Event::Mouse(MouseEvent {
            kind, column, row, ..
        }) => {
            let Some(p) = viewport.cell_to_canvas(*column, *row) else {
                return Control::Continue;
            };
            match kind {
                MouseEventKind::Down(MouseButton::Left) => {
                    session.pointer_down(p, now);
                }
                MouseEventKind::Moved | MouseEventKind::Drag(_) => session.pointer_moved(p),
                _ => {}
            }
            Control::Continue
        }
        _ => Control::Continue,
    }
}

/// Draw the targets and cursor over the whole frame, returning the viewport
/// the canvas ended up in.
pub fn render<P: CuePicker>(frame: &mut Frame, session: &Session<P>) -> Viewport {
    let scheduler = session.scheduler();
    let layout = scheduler.layout();
    let state = scheduler.state();
    let (width, height) = (layout.width(), layout.height());

    let trial = (scheduler.trial_count() + 1).min(scheduler.requested_trial_count());
    let title = Title::from(Line::from(vec![
        " radial8 ".magenta().bold(),
        format!(
            "trial {}/{} | {} ",
            trial,
            scheduler.requested_trial_count(),
            state
        )
        .into(),
    ]));
    let hint = match state {
        TrialState::Idle => " Click the center ",
        TrialState::Waiting { .. } => " Wait for the cue ",
        TrialState::Active { .. } => " Click the red target ",
        TrialState::Terminal => " Done ",
    };
    let instructions = Title::from(Line::from(vec![
        hint.into(),
        " Quit ".into(),
        "<Esc>/<Q> ".magenta().bold(),
    ]));
    let block = Block::default()
        .title(title.alignment(Alignment::Center))
        .title(
            instructions
                .alignment(Alignment::Center)
                .position(Position::Bottom),
        )
        .borders(Borders::ALL);

    let area = frame.size();
    let viewport = Viewport::new(block.inner(area), width, height);

    let center_color = match state {
        TrialState::Idle => Color::White,
        _ => Color::DarkGray,
    };
    let cued = scheduler.active_target().map(usize::from);
    let cursor = session.cursor();

    // The canvas counts y upwards, the layout downwards
    let canvas = Canvas::default()
        .block(block)
        .marker(Marker::Braille)
        .x_bounds([0.0, width])
        .y_bounds([0.0, height])
        .paint(move |ctx| {
            let center = layout.center();
            ctx.draw(&Circle {
                x: center.x,
                y: height - center.y,
                radius: layout.center_radius(),
                color: center_color,
            });
            for (i, target) in layout.targets().iter().enumerate() {
                ctx.draw(&Circle {
                    x: target.x,
                    y: height - target.y,
                    radius: layout.target_radius(),
                    color: if cued == Some(i) { CUE_COLOR } else { TARGET_COLOR },
                });
            }
            if let Some(p) = cursor {
                ctx.draw(&Points {
                    coords: &[(p.x, height - p.y)],
                    color: Color::Yellow,
                });
            }
        });
    frame.render_widget(canvas, area);

    viewport
}

/// Run the task display until every trial is done, the operator quits or
/// `stop` is raised, drawing `frame_rate` times a second. Console logging
/// is muted while the display is up.
pub fn run_task<P: CuePicker>(
    session: &mut Session<P>,
    clock: &SessionClock,
    frame_rate: f64,
    stop: &StopFlag,
    console: Option<&ConsoleSwitch>,
) -> Result<(), RadialGuiError> {
    if let Some(console) = console {
        console.mute();
    }
    let res = run_frames(session, clock, frame_rate, stop);
    if let Some(console) = console {
        console.unmute();
    }
    res
}

fn run_frames<P: CuePicker>(
    session: &mut Session<P>,
    clock: &SessionClock,
    frame_rate: f64,
    stop: &StopFlag,
) -> Result<(), RadialGuiError> {
    let mut guard = TerminalGuard::enter(true)?;
    let terminal = guard.terminal();

    let size = terminal.size()?;
    if size.width < MIN_WIDTH || size.height < MIN_HEIGHT {
        return Err(RadialGuiError::TooSmall {
            width: size.width,
            height: size.height,
        });
    }

    frame_loop(terminal, session, clock, frame_rate, stop, || {
        if event::poll(Duration::ZERO)? {
            event::read().map(Some)
        } else {
            Ok(None)
        }
    })
}

/// The frame loop proper. `next_event` hands over pending terminal events
/// without blocking and returns `None` once there are none left.
fn frame_loop<B, P, E>(
    terminal: &mut Terminal<B>,
    session: &mut Session<P>,
    clock: &SessionClock,
    frame_rate: f64,
    stop: &StopFlag,
    mut next_event: E,
) -> Result<(), RadialGuiError>
where
    B: Backend,
    P: CuePicker,
    E: FnMut() -> io::Result<Option<Event>>,
{
    let layout = session.scheduler().layout();
    let mut viewport = Viewport::new(Rect::default(), layout.width(), layout.height());
    let frame_time = Duration::from_secs_f64(1.0 / frame_rate);
    let mut deadline = Instant::now();

    while !session.is_finished() {
        while let Some(event) = next_event()? {
            if handle_event(session, &event, &viewport, clock.now_ms()) == Control::Quit {
                info!("Quit requested");
                session.cancel();
            }
        }
        if stop.is_requested() {
            info!("Termination signal received, stopping the task");
            session.cancel();
        }
        if session.is_finished() {
            break;
        }

        session.on_frame(clock.now_ms());
        terminal.draw(|frame| viewport = render(frame, session))?;

        deadline += frame_time;
        let now = Instant::now();
        if deadline > now {
            spin_sleep::sleep(deadline - now);
        } else {
            deadline = now;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_queue::SampleQueue;
    use crate::scheduler::{
        tests::{test_layout, ScriptedPicker},
        SchedulerEvent,
    };
    use crate::session::tests::test_metadata;
    use crossterm::event::{KeyEvent, KeyEventState};
    use ratatui::backend::TestBackend;

    fn session() -> Session<ScriptedPicker> {
        Session::open(
            test_metadata(2),
            test_layout(30.0),
            ScriptedPicker::new(&[2, 6]),
            SampleQueue::new(),
        )
    }

    fn click(column: u16, row: u16) -> Event {
        Event::Mouse(MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column,
            row,
            modifiers: KeyModifiers::NONE,
        })
    }

    fn key(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    // 92x37 cells leaves a 90x35 canvas, so one cell is 10x20 pixels
    fn draw(terminal: &mut Terminal<TestBackend>, session: &Session<ScriptedPicker>) -> Viewport {
        let mut viewport = Viewport::new(Rect::default(), 0.0, 0.0);
        terminal
            .draw(|frame| viewport = render(frame, session))
            .unwrap();
        viewport
    }

    #[test]
    fn clicks_reach_the_session() {
        let mut terminal = Terminal::new(TestBackend::new(92, 37)).unwrap();
        let mut session = session();
        let viewport = draw(&mut terminal, &session);

        // Canvas (450, 350) sits under cell (46, 18)
        let control = handle_event(&mut session, &click(46, 18), &viewport, 10.0);
        assert_eq!(control, Control::Continue);
        assert!(matches!(
            session.scheduler().state(),
            TrialState::Waiting { .. }
        ));

        assert!(matches!(
            session.on_frame(20.0),
            SchedulerEvent::TargetOnset { target: 2, .. }
        ));

        // Target 2 is at (450, 600): cell (46, 31)
        handle_event(&mut session, &click(46, 31), &viewport, 30.0);
        assert_eq!(session.trials().len(), 1);
        assert_eq!(session.trials()[0].cue, 2);
    }

    #[test]
    fn clicks_outside_canvas_do_nothing() {
        let mut terminal = Terminal::new(TestBackend::new(92, 37)).unwrap();
        let mut session = session();
        let viewport = draw(&mut terminal, &session);

        handle_event(&mut session, &click(0, 0), &viewport, 10.0);
        assert_eq!(session.scheduler().state(), TrialState::Idle);
        assert_eq!(session.cursor(), None);
    }

    #[test]
    fn quit_keys() {
        let mut session = session();
        let viewport = Viewport::new(Rect::new(0, 0, 10, 10), 900.0, 700.0);
        for (code, modifiers) in [
            (KeyCode::Esc, KeyModifiers::NONE),
            (KeyCode::Char('q'), KeyModifiers::NONE),
            (KeyCode::Char('c'), KeyModifiers::CONTROL),
        ] {
            assert_eq!(
                handle_event(&mut session, &key(code, modifiers), &viewport, 0.0),
                Control::Quit
            );
        }
        assert_eq!(
            handle_event(
                &mut session,
                &key(KeyCode::Char('c'), KeyModifiers::NONE),
                &viewport,
                0.0
            ),
            Control::Continue
        );
    }

    #[test]
    fn renders_status() {
        let mut terminal = Terminal::new(TestBackend::new(92, 37)).unwrap();
        let mut session = session();
        draw(&mut terminal, &session);

        let text: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect();
        assert!(text.contains("trial 1/2 | idle"));
        assert!(text.contains("Click the center"));

        let center = session.scheduler().layout().center();
        session.pointer_down(center, 0.0);
        session.on_frame(1.0);
        draw(&mut terminal, &session);
        let text: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect();
        assert!(text.contains("trial 1/2 | target 2"));
    }

    fn screen(terminal: &Terminal<TestBackend>) -> String {
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    #[test]
    fn stop_flag_cancels_the_running_trial() {
        let mut terminal = Terminal::new(TestBackend::new(92, 37)).unwrap();
        let mut session = session();
        let center = session.scheduler().layout().center();
        session.pointer_down(center, 0.0);

        let stop = StopFlag::new();
        let raised = stop.clone();
        let mut polls = 0;
        frame_loop(
            &mut terminal,
            &mut session,
            &SessionClock::start(),
            1000.0,
            &stop,
            || {
                polls += 1;
                if polls == 3 {
                    raised.request();
                }
                Ok(None)
            },
        )
        .unwrap();

        assert_eq!(polls, 3);
        assert!(session.is_finished());
        assert!(session.scheduler().was_cancelled());
        assert_eq!(session.current_trial_len(), 0);
        assert!(screen(&terminal).contains("trial 1/2 | target 2"));

        let record = session.close().unwrap();
        assert!(record.trials.is_empty());
        assert_eq!(record.metadata.completed_trial_count, 0);
    }

    #[test]
    fn raised_flag_stops_before_the_first_frame() {
        let mut terminal = Terminal::new(TestBackend::new(92, 37)).unwrap();
        let mut session = session();
        let stop = StopFlag::new();
        stop.request();

        frame_loop(
            &mut terminal,
            &mut session,
            &SessionClock::start(),
            60.0,
            &stop,
            || Ok(None),
        )
        .unwrap();

        assert!(session.is_finished());
        assert!(session.summary().cancelled);
        assert!(!screen(&terminal).contains("trial"));
    }

    #[test]
    fn quit_key_in_the_loop() {
        let mut terminal = Terminal::new(TestBackend::new(92, 37)).unwrap();
        let mut session = session();
        let mut events = vec![key(KeyCode::Esc, KeyModifiers::NONE)].into_iter();

        frame_loop(
            &mut terminal,
            &mut session,
            &SessionClock::start(),
            60.0,
            &StopFlag::new(),
            || Ok(events.next()),
        )
        .unwrap();

        assert!(session.scheduler().was_cancelled());
    }
}
