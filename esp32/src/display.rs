use bitaxe_logger_common::StatusDisplay;

/// Status lines on the serial console. The board has no panel driver yet.
pub struct ConsoleDisplay;

impl StatusDisplay for ConsoleDisplay {
    fn display_line(&mut self, line: &str) {
        log::info!("[display] {line}");
    }
}
