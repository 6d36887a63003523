//! Terminal progress bar fed by indexing events.

use async_trait::async_trait;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::models::IndexingEvent;
use crate::services::Notifier;

pub struct ProgressNotifier {
    bar: ProgressBar,
    verbose: bool,
}

impl ProgressNotifier {
    pub fn new(verbose: bool) -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        Self { bar, verbose }
    }
}

#[async_trait]
impl Notifier for ProgressNotifier {
    async fn notify(&self, event: IndexingEvent) {
        match event {
            IndexingEvent::IndexingStarted(p) => {
                self.bar.set_length(p.total_files as u64);
                if p.skipped_files > 0 {
                    self.bar
                        .println(format!("{} oversize files skipped", p.skipped_files));
                }
            }
            IndexingEvent::IndexingStatus(p) => {
                if self.verbose || p.status != "file_indexed" {
                    self.bar.println(format!("{} {}", style(&p.status).cyan(), p.message));
                }
            }
            IndexingEvent::IndexingProgress(p) => {
                self.bar.set_position(p.current as u64);
                let name = p.file_path.rsplit('/').next().unwrap_or(&p.file_path);
                self.bar.set_message(name.to_string());
            }
            IndexingEvent::IndexingWarning(p) => {
                if self.verbose {
                    self.bar.println(format!(
                        "{} {}: {}",
                        style("warning").yellow(),
                        p.file_path,
                        p.warning
                    ));
                }
            }
            IndexingEvent::IndexingError(p) => {
                let location = p.file_path.map(|f| format!("{f}: ")).unwrap_or_default();
                self.bar
                    .println(format!("{} {}{}", style("error").red(), location, p.error));
            }
            IndexingEvent::IndexingCompleted(_) => self.bar.finish_and_clear(),
        }
    }
}
