use std::{path::PathBuf, time::Duration};

use crate::gui::{error::RadialGuiError, terminal::TerminalGuard};

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
};

/// What a key press does to the selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectorAction {
    Move(usize),
    Select(usize),
    Quit,
    Nothing,
}

fn on_key(code: KeyCode, modifiers: KeyModifiers, cursor: usize, n_ports: usize) -> SelectorAction {
    match code {
        KeyCode::Down | KeyCode::Char('j') => SelectorAction::Move((cursor + 1) % n_ports),
        KeyCode::Up | KeyCode::Char('k') => SelectorAction::Move((cursor + n_ports - 1) % n_ports),
        KeyCode::Enter => SelectorAction::Select(cursor),
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => SelectorAction::Quit,
        KeyCode::Char('q') | KeyCode::Esc => SelectorAction::Quit,
        _ => SelectorAction::Nothing,
    }
}

fn selector_list(available_ports: &[PathBuf]) -> List<'_> {
    let title = Title::from(" Select the amplifier ".magenta().bold());
    let instructions = Title::from(Line::from(vec![
        " Navigate ".into(),
        "<Up>/<Down>".magenta().bold(),
        " Select ".into(),
        "<Enter>".magenta().bold(),
        " Quit ".into(),
        "<Q> ".magenta().bold(),
    ]));
    let block = Block::default()
        .title(title.alignment(Alignment::Center))
        .title(
            instructions
                .alignment(Alignment::Center)
                .position(Position::Bottom),
        )
        .borders(Borders::ALL);
    let port_names = available_ports.iter().map(|p| p.to_string_lossy());
    List::new(port_names)
        .style(Style::default().fg(Color::White))
        .highlight_symbol(">>")
        .highlight_style(Style::default().fg(Color::Magenta))
        .block(block)
}

/// Let the operator pick one of `available_ports`. `None` means they quit.
pub fn device_selector(
    mut available_ports: Vec<PathBuf>,
) -> Result<Option<PathBuf>, RadialGuiError> {
    if available_ports.is_empty() {
        return Ok(None);
    }

    let mut guard = TerminalGuard::enter(false)?;
    let terminal = guard.terminal();

    let mut cursor = 0;
    let mut list_state = ListState::default().with_selected(Some(cursor));
    let n_ports = available_ports.len();
    let selected_port = loop {
        list_state.select(Some(cursor));
        let list = selector_list(&available_ports);
        terminal.draw(|frame| {
            let area = frame.size();
            frame.render_stateful_widget(list, area, &mut list_state);
        })?;

        if event::poll(Duration::from_millis(16))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match on_key(key.code, key.modifiers, cursor, n_ports) {
                    SelectorAction::Move(to) => cursor = to,
                    SelectorAction::Select(i) => break Some(i),
                    SelectorAction::Quit => break None,
                    SelectorAction::Nothing => {}
                }
            }
        }
    };

    drop(guard);
    Ok(selected_port.map(|i| available_ports.swap_remove(i)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;

    #[test]
    fn keys() {
        let none = KeyModifiers::NONE;
        assert_eq!(on_key(KeyCode::Down, none, 2, 3), SelectorAction::Move(0));
        assert_eq!(on_key(KeyCode::Up, none, 0, 3), SelectorAction::Move(2));
        assert_eq!(on_key(KeyCode::Enter, none, 1, 3), SelectorAction::Select(1));
        assert_eq!(on_key(KeyCode::Char('q'), none, 1, 3), SelectorAction::Quit);
        assert_eq!(
            on_key(KeyCode::Char('c'), KeyModifiers::CONTROL, 1, 3),
            SelectorAction::Quit
        );
        assert_eq!(on_key(KeyCode::Char('c'), none, 1, 3), SelectorAction::Nothing);
    }

    #[test]
    fn lists_ports() {
        let ports = vec![PathBuf::from("/dev/ttyUSB0"), PathBuf::from("/dev/ttyUSB1")];
        let mut terminal = Terminal::new(TestBackend::new(40, 6)).unwrap();
        let mut state = ListState::default().with_selected(Some(1));
        terminal
            .draw(|frame| {
                frame.render_stateful_widget(selector_list(&ports), frame.size(), &mut state)
            })
            .unwrap();

        let buffer = terminal.backend().buffer();
        let text: String = buffer.content().iter().map(|c| c.symbol()).collect();
        assert!(text.contains("/dev/ttyUSB0"));
        assert!(text.contains(">>/dev/ttyUSB1"));
        assert!(text.contains("Select the amplifier"));
    }
}
