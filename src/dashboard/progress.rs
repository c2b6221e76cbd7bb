use crate::constants::STATUS_POLL_INTERVAL_MS;
use crate::status::{NodeState, NodeStatus};
use colored::{ColoredString, Colorize};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Spinner view of the run, refreshed by polling each node's status and log.
pub struct ProgressPoller {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl ProgressPoller {
    pub fn spawn(states: Vec<Arc<NodeState>>) -> Self {
        let (stop, mut stopped) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let multi = MultiProgress::new();
            let style = ProgressStyle::default_spinner()
                .template("{spinner:.green} {prefix:.bold} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            let bars: Vec<(Arc<NodeState>, ProgressBar)> = states
                .into_iter()
                .map(|state| {
                    let bar = multi.add(ProgressBar::new_spinner());
                    bar.set_style(style.clone());
                    bar.set_prefix(state.name().to_string());
                    (state, bar)
                })
                .collect();

            let mut ticker = tokio::time::interval(Duration::from_millis(STATUS_POLL_INTERVAL_MS));
            loop {
                tokio::select! {
                    _ = ticker.tick() => render(&bars),
                    _ = &mut stopped => break,
                }
            }
            render(&bars);
            for (_, bar) in &bars {
                bar.finish();
            }
        });
        Self { stop, handle }
    }

    /// Final refresh, then tear the view down.
    pub async fn finish(self) {
        let _ = self.stop.send(());
        let _ = self.handle.await;
    }
}

fn render(bars: &[(Arc<NodeState>, ProgressBar)]) {
    for (state, bar) in bars {
        let status = state.status();
        let log = state.log_text();
        let message = match last_line(&log) {
            Some(line) if !status.is_terminal() => format!("{} {}", status_label(status), line),
            _ => status_label(status).to_string(),
        };
        bar.set_message(message);
        if !status.is_terminal() && status != NodeStatus::Pending {
            bar.tick();
        }
    }
}

pub fn status_label(status: NodeStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        NodeStatus::Pending => text.normal(),
        NodeStatus::Building => text.yellow(),
        NodeStatus::Pushing => text.cyan(),
        NodeStatus::Success => text.green(),
        NodeStatus::Failure => text.red(),
    }
}

/// Last non-blank line of captured output
pub fn last_line(log: &str) -> Option<&str> {
    log.lines().rev().map(str::trim).find(|l| !l.is_empty())
}
