//! Resume cursor persistence
//!
//! The cursor is the Jetstream `time_us` of the last processed event, kept
//! as a plain integer in a text file. It is read once at startup and written
//! at shutdown.

use std::fs;
use std::path::Path;

/// Current wall-clock time in microseconds
pub fn now_micros() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

/// Load the cursor from `file_path`
///
/// A missing file is created holding the current time, so a first run
/// starts from "now" instead of replaying the whole stream.
pub fn load_cursor(file_path: &str) -> Result<i64, Box<dyn std::error::Error>> {
    if !Path::new(file_path).exists() {
        let cursor = now_micros();
        fs::write(file_path, cursor.to_string())?;
        log::info!("No existing cursor file found, starting from now: {}", cursor);
        return Ok(cursor);
    }

    let raw = fs::read_to_string(file_path)?;
    let cursor: i64 = raw
        .trim()
        .parse()
        .map_err(|e| format!("Invalid cursor in {}: {}", file_path, e))?;

    log::info!("Loaded cursor {} from {}", cursor, file_path);
    Ok(cursor)
}

/// Persist the cursor; non-positive values are ignored
pub fn save_cursor(file_path: &str, cursor: i64) -> Result<(), Box<dyn std::error::Error>> {
    if cursor <= 0 {
        log::debug!("Skipping cursor save, nothing processed");
        return Ok(());
    }

    fs::write(file_path, cursor.to_string())?;
    log::debug!("Saved cursor {} to {}", cursor, file_path);
    Ok(())
}
