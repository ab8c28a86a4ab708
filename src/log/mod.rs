// Log module

mod config;
mod logger;

pub use config::*;
pub use logger::*;

#[macro_export]
macro_rules! log_error {
    // Logs an ERROR message if the level is enabled
    // Takes the logger and the message to log
    ($logger:expr, $msg:expr) => {
        if $logger.config.error_enabled {
            $logger.log(&format!("[ERROR] {}", $msg));
        }
    };
}

#[macro_export]
macro_rules! log_warning {
    // Logs a WARNING message if the level is enabled
    // Takes the logger and the message to log
    ($logger:expr, $msg:expr) => {
        if $logger.config.warning_enabled {
            $logger.log(&format!("[WARNING] {}", $msg));
        }
    };
}

#[macro_export]
macro_rules! log_debug {
    // Logs a DEBUG message if the level is enabled
    // Takes the logger and the message to log
    ($logger:expr, $msg:expr) => {
        if $logger.config.debug_enabled {
            $logger.log(&format!("[DEBUG] {}", $msg));
        }
    };
}
