//! Ordered step lists with branch splicing

use tracing::{info, instrument};

use crate::crawler::{CrawlReport, Crawler};
use crate::errors::CrawlError;
use crate::step::{BranchSignal, Step};

/// A labelled sequence of steps, run front to back
#[derive(Debug, Clone)]
pub struct Plan {
    label: String,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, Default)]
pub struct PlanReport {
    pub reports: Vec<CrawlReport>,
    pub branches: usize,
}

impl PlanReport {
    pub fn executed_labels(&self) -> Vec<&str> {
        self.reports.iter().map(|r| r.label.as_str()).collect()
    }
}

impl Plan {
    pub fn new(label: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            label: label.into(),
            steps,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Run every step in order.
    ///
    /// A branch from step `i` replaces up to `invalid_steps` of the steps
    /// after it with the signal's alternate route; the branching step itself
    /// is not repeated. Any other error ends the plan.
    #[instrument(level = "info", skip(self, crawler), fields(plan = %self.label))]
    pub async fn run(&self, crawler: &Crawler) -> Result<PlanReport, CrawlError> {
        let mut steps = self.steps.clone();
        let mut report = PlanReport::default();
        let mut index = 0;

        while index < steps.len() {
            match crawler.crawl(&steps[index]).await {
                Ok(step_report) => report.reports.push(step_report),
                Err(CrawlError::Branch(signal)) => {
                    info!(
                        "Plan '{}' branching at '{}': {}",
                        self.label,
                        steps[index].label(),
                        signal
                    );
                    splice(&mut steps, index, signal);
                    report.branches += 1;
                }
                Err(error) => return Err(error),
            }
            index += 1;
        }

        info!(
            "Plan '{}' done: {} steps, {} branches",
            self.label,
            report.reports.len(),
            report.branches
        );
        Ok(report)
    }
}

fn splice(steps: &mut Vec<Step>, index: usize, signal: BranchSignal) {
    let start = index + 1;
    let end = (start + signal.invalid_steps).min(steps.len());
    steps.splice(start..end, signal.alt_route);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(steps: &[Step]) -> Vec<&str> {
        steps.iter().map(|s| s.label()).collect()
    }

    #[test]
    fn test_splice_replaces_following_steps() {
        let mut steps = vec![
            Step::new("Storage"),
            Step::new("Clear data"),
            Step::new("Confirm"),
            Step::new("Back"),
        ];
        let signal = BranchSignal::new("no data button", vec![Step::new("Clear cache")], 2);
        splice(&mut steps, 0, signal);
        assert_eq!(labels(&steps), vec!["Storage", "Clear cache", "Back"]);
    }

    #[test]
    fn test_splice_clamps_at_plan_end() {
        let mut steps = vec![Step::new("Storage"), Step::new("Clear data")];
        let signal = BranchSignal::new(
            "different layout",
            vec![Step::new("Open menu"), Step::new("Clear cache")],
            5,
        );
        splice(&mut steps, 1, signal);
        assert_eq!(labels(&steps), vec!["Storage", "Clear data", "Open menu", "Clear cache"]);
    }
}
