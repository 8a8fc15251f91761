use deckgen_lib::task::TaskStatus;

/// ANSI color codes
pub struct Color;

impl Color {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
}

const BAR_WIDTH: usize = 30;

pub fn paint(text: &str, color: &str, use_color: bool) -> String {
    if use_color {
        format!("{}{}{}", color, text, Color::RESET)
    } else {
        text.to_string()
    }
}

/// `[#########.....................]  30%`
pub fn progress_bar(progress: u8) -> String {
    let filled = BAR_WIDTH * usize::from(progress.min(100)) / 100;
    format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        ".".repeat(BAR_WIDTH - filled),
        progress
    )
}

/// One-line status summary
pub fn render_status(status: &TaskStatus, use_color: bool) -> String {
    match status {
        TaskStatus::Initializing => paint("initializing", Color::DIM, use_color),
        TaskStatus::Processing { progress } => format!(
            "{} {}",
            paint("processing", Color::YELLOW, use_color),
            progress_bar(*progress)
        ),
        TaskStatus::Completed => paint("completed", Color::GREEN, use_color),
        TaskStatus::Error { message } => {
            format!("{} {}", paint("error", Color::RED, use_color), message)
        }
    }
}
