use crate::ui::theme;
use crate::ui::Icons;
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::time::Duration;

/// File-count progress for a scan. Hidden when stdout is not a terminal.
pub struct ScanProgress {
    bar: ProgressBar,
}

impl ScanProgress {
    pub fn new(total_files: usize) -> Self {
        let bar = if console::Term::stdout().is_term() {
            let bar = ProgressBar::new(total_files as u64);
            if let Ok(style) = ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}") {
                bar.set_style(style.progress_chars("=> "));
            }
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        } else {
            ProgressBar::hidden()
        };
        Self { bar }
    }

    pub fn start_file(&self, path: &str) {
        self.bar.set_message(path.to_string());
    }

    pub fn finish_file(&self) {
        self.bar.inc(1);
    }

    /// Print above the bar without tearing it
    pub fn println(&self, line: impl AsRef<str>) {
        if self.bar.is_hidden() {
            println!("{}", line.as_ref());
        } else {
            self.bar.println(line);
        }
    }

    pub fn finish_with_summary(&self, duration: Duration, files: usize, definitions: usize, calls: usize) {
        self.bar.finish_and_clear();
        println!();
        println!(
            "{} {}",
            Icons::CHECK.style(theme().success.clone()),
            format!("Scanned in {}", HumanDuration(duration)).style(theme().success.clone())
        );
        println!(
            "  {} {}  {} {}  {} {}",
            Icons::FILE.style(theme().info.clone()),
            files,
            Icons::ACTION.style(theme().info.clone()),
            definitions,
            Icons::CALL.style(theme().info.clone()),
            calls
        );
    }
}
