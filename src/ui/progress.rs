use indicatif::{ProgressBar, ProgressStyle};

/// Bar measured in seconds of the run's planned length.
pub fn create_run_progress_bar(planned_secs: u64) -> ProgressBar {
    let pb = ProgressBar::new(planned_secs.max(1));
    let style = ProgressStyle::default_bar()
        .template("▕{bar:25}▏ {percent:>3}% • {elapsed_precise} • {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█░ ");
    pb.set_style(style);
    pb
}
