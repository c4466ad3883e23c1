//! Terminal output: the stderr logger and colored status lines.

use std::io::Write;

use log::{Level, LevelFilter, Log};
use owo_colors::OwoColorize;

struct ShellLogger;

static LOGGER: ShellLogger = ShellLogger;

fn paint_level(level: Level) -> String {
    let tag = format!("{level:5}");
    match level {
        Level::Error => tag.bright_red().to_string(),
        Level::Warn => tag.bright_yellow().to_string(),
        Level::Info => tag.bright_blue().to_string(),
        Level::Debug => tag.bright_cyan().to_string(),
        Level::Trace => tag.bright_magenta().to_string(),
    }
}

impl Log for ShellLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        writeln!(
            stderr,
            "{} {} {}",
            paint_level(record.level()),
            record.target().dimmed(),
            record.args()
        )
        .ok();
    }

    fn flush(&self) {
        std::io::stderr().flush().ok();
    }
}

pub fn init(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    log::set_max_level(level);
    log::set_logger(&LOGGER)
}

/// One failed command, as shown to the user.
pub fn error_line(command: &str, message: impl std::fmt::Display) -> String {
    format!("{}: {message}", command.bright_red())
}

pub fn prompt(pwd: &str) -> String {
    format!("{}{}> ", "clusterfs:".bright_green(), pwd.bright_blue())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_carry_their_text() {
        assert!(error_line("rm", "not found").contains("not found"));
        assert!(prompt("/a/b").contains("/a/b"));
        assert!(paint_level(Level::Warn).contains("WARN"));
    }
}
