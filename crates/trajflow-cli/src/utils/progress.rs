use indicatif::{ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use std::fmt::Write as _;
use std::time::Duration;
use trajflow::engine::progress::{Progress, ProgressCallback};

const SPINNER_TICK: Duration = Duration::from_millis(80);

/// Renders run progress on stderr: a spinner while a phase is busy and a frame bar
/// while a trajectory is being read.
///
/// `ProgressBar` is internally shared, so the callback holds its own handle to the
/// same bar and can be moved onto the coordinator's rank thread.
#[derive(Clone)]
pub struct CliProgressHandler {
    bar: ProgressBar,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr())
            .with_style(spinner_style());
        bar.finish_and_clear();
        Self { bar }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let bar = self.bar.clone();
        Box::new(move |event| apply(&bar, event))
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn apply(bar: &ProgressBar, event: Progress) {
    match event {
        Progress::PhaseStart { name } => {
            bar.reset();
            bar.set_style(spinner_style());
            bar.set_length(0);
            bar.set_message(name);
            bar.enable_steady_tick(SPINNER_TICK);
        }
        Progress::PhaseFinish => {
            bar.disable_steady_tick();
            bar.finish_with_message("done");
        }
        Progress::TaskStart { label, total_steps } => {
            bar.disable_steady_tick();
            bar.reset();
            bar.set_style(frame_style());
            bar.set_length(total_steps);
            bar.set_message(label);
        }
        Progress::TaskIncrement => bar.inc(1),
        Progress::TaskFinish => {
            // Trajectories with an unknown frame count may stop short of the length.
            if let Some(len) = bar.length() {
                bar.set_position(len.max(bar.position()));
            }
            bar.finish();
        }
        Progress::Message(text) if bar.is_finished() => bar.set_message(text),
        Progress::Message(text) => bar.println(format!("  {text}")),
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn frame_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg:<24} [{bar:40.cyan/blue}] {pos}/{len} frames ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .with_key("eta", |state: &ProgressState, w: &mut dyn std::fmt::Write| {
            let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
        })
        .progress_chars("=> ")
}
