use std::time::Duration;

use tokio::time::Instant;

/// Wall-clock budget of one run: the coarse limit gates starting another
/// source, the fine limit gates processing another item.
#[derive(Debug, Clone, Copy)]
pub struct RunBudget {
    started: Instant,
    coarse: Duration,
    fine: Duration,
}

impl RunBudget {
    pub fn start(coarse: Duration, fine: Duration) -> Self {
        Self {
            started: Instant::now(),
            coarse,
            fine,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn coarse_exceeded(&self) -> bool {
        self.elapsed() > self.coarse
    }

    pub fn fine_exceeded(&self) -> bool {
        self.elapsed() > self.fine
    }

    /// Elapsed seconds with one decimal, e.g. `"12.3s"`.
    pub fn duration_label(&self) -> String {
        format!("{:.1}s", self.elapsed().as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn limits_trip_strictly_after_their_threshold() {
        let budget = RunBudget::start(Duration::from_secs(45), Duration::from_secs(55));
        assert!(!budget.coarse_exceeded());

        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(!budget.coarse_exceeded());

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(budget.coarse_exceeded());
        assert!(!budget.fine_exceeded());
        assert_eq!(budget.duration_label(), "45.5s");

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(budget.fine_exceeded());
    }
}
