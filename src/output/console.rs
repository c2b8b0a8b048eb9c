// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convpipe contributors

//! Console progress
//!
//! On a terminal a progress bar tracks the run and each finished node is
//! printed above it. Otherwise plain lines are written:
//!
//! ```text
//! [1/3] Converting to jpg...
//! [1/3] jpg OK (1.2s)
//! [2/3] png FAIL (0.5s) - plugin not found
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use super::{format_duration, ProgressReporter};

/// Progress written to stderr for people
pub struct ConsoleProgress {
    writer: Mutex<Box<dyn Write + Send>>,
    bar: Option<ProgressBar>,
    completed: AtomicUsize,
    quiet: bool,
}

impl ConsoleProgress {
    /// Progress on stderr, with a bar when stderr is a terminal
    pub fn new(quiet: bool) -> Self {
        let bar = (!quiet && console::user_attended_stderr()).then(create_progress_bar);
        Self {
            writer: Mutex::new(Box::new(std::io::stderr())),
            bar,
            completed: AtomicUsize::new(0),
            quiet,
        }
    }

    /// Plain-line progress into any writer
    pub fn with_writer(writer: impl Write + Send + 'static, quiet: bool) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
            bar: None,
            completed: AtomicUsize::new(0),
            quiet,
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    fn write_line(&self, line: &str) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", line);
            let _ = writer.flush();
        }
    }
}

fn create_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.blue} {msg} [{bar:30.cyan/blue}] {pos}/{len} ({elapsed})")
    {
        pb.set_style(style.progress_chars("█▓░"));
    }
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

impl ProgressReporter for ConsoleProgress {
    fn stage_started(&self, current: usize, total: usize, target: &str) {
        if self.quiet {
            return;
        }

        let message = format!("[{}/{}] Converting to {}...", current, total, target);
        match &self.bar {
            Some(bar) => {
                bar.set_length(total as u64);
                bar.set_message(message);
            }
            None => self.write_line(&message),
        }
    }

    fn stage_completed(
        &self,
        current: usize,
        total: usize,
        target: &str,
        duration: Duration,
        success: bool,
        error: Option<&str>,
    ) {
        if self.quiet {
            return;
        }

        let position = format!("[{}/{}]", current, total);
        let elapsed = format!("({})", format_duration(duration));
        let mut line = match (&self.bar, success) {
            (Some(_), true) => format!("{} {} {} {}", "✓".green(), position, target, elapsed.dimmed()),
            (Some(_), false) => format!("{} {} {} {}", "✗".red(), position, target, elapsed.dimmed()),
            (None, true) => format!("{} {} {} {}", position, target, "OK".green(), elapsed),
            (None, false) => format!("{} {} {} {}", position, target, "FAIL".red(), elapsed),
        };
        if let (false, Some(error)) = (success, error.filter(|e| !e.is_empty())) {
            line.push_str(&format!(" - {}", error));
        }

        match &self.bar {
            Some(bar) => {
                bar.println(line);
                bar.inc(1);
                if self.completed.fetch_add(1, Ordering::SeqCst) + 1 >= total {
                    bar.finish_and_clear();
                }
            }
            None => self.write_line(&line),
        }
    }
}
