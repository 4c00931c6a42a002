use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

pub fn create_status_spinner(multi_progress: &MultiProgress) -> ProgressBar {
    let pb = multi_progress.add(ProgressBar::new_spinner());
    let style = ProgressStyle::default_spinner()
        .template("{prefix:.bold.dim} {spinner} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_prefix("BeatClock");
    pb
}

/// Static line with the keyboard bindings.
pub fn create_help_line(multi_progress: &MultiProgress) -> ProgressBar {
    let pb = multi_progress.add(ProgressBar::new_spinner());
    let style = ProgressStyle::default_spinner()
        .template("{prefix:.dim} {wide_msg:.dim}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_prefix("Keys");
    pb.set_message(
        "[0-9] tempo  [+/-] nudge  [b] lock  [space/c] play/pause  [enter] play/stop  [p] play  [s] stop  [q] quit",
    );
    pb
}
