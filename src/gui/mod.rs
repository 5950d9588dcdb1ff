//! Terminal screens: picking the amplifier's port and running the task.

mod device_selector;
mod error;
mod task_view;
mod terminal;

pub use device_selector::device_selector;
pub use error::RadialGuiError;
pub use task_view::{handle_event, render, run_task, Control};
pub use terminal::TerminalGuard;
