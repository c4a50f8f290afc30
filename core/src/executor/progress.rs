use std::collections::HashMap;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

const OVERALL_TEMPLATE: &str =
    "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} nodes ({percent}%) {msg}";
const TASK_TEMPLATE: &str = "  {spinner:.green} {msg}";

/// Terminal progress bars for a sequence run: one overall bar plus a
/// spinner per running node. Everything is a no-op when disabled.
pub struct ProgressMonitor {
    multi: MultiProgress,
    overall: ProgressBar,
    task_bars: HashMap<String, ProgressBar>,
    enabled: bool,
}

impl ProgressMonitor {
    pub fn new(total_tasks: usize, enabled: bool) -> Self {
        let multi = MultiProgress::new();
        if !enabled {
            return Self {
                multi,
                overall: ProgressBar::hidden(),
                task_bars: HashMap::new(),
                enabled: false,
            };
        }

        let overall = multi.add(ProgressBar::new(total_tasks as u64));
        if let Ok(style) = ProgressStyle::default_bar().template(OVERALL_TEMPLATE) {
            overall.set_style(style.progress_chars("=> "));
        }
        overall.set_message("starting");

        Self {
            multi,
            overall,
            task_bars: HashMap::new(),
            enabled: true,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn add_task(&mut self, task_id: &str) {
        if !self.enabled {
            return;
        }

        let bar = self.multi.add(ProgressBar::new_spinner());
        if let Ok(style) = ProgressStyle::default_spinner().template(TASK_TEMPLATE) {
            bar.set_style(style);
        }
        bar.set_message(task_id.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));

        self.task_bars.insert(task_id.to_string(), bar);
    }

    pub fn complete_task(&mut self, task_id: &str, success: bool, duration_ms: u64) {
        if !self.enabled {
            return;
        }

        if let Some(bar) = self.task_bars.remove(task_id) {
            let mark = if success { "ok" } else { "FAILED" };
            bar.finish_with_message(format!("{task_id} {mark} ({duration_ms}ms)"));
        }
        self.overall.inc(1);
    }

    pub fn update_stage(&self, step_index: usize, total_steps: usize) {
        if self.enabled {
            self.overall
                .set_message(format!("step {}/{}", step_index + 1, total_steps));
        }
    }

    pub fn finish(&self, success: bool) {
        if !self.enabled {
            return;
        }
        let msg = if success { "all nodes completed" } else { "run incomplete" };
        self.overall.finish_with_message(msg);
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        for (_, bar) in self.task_bars.drain() {
            bar.finish_and_clear();
        }
    }
}
