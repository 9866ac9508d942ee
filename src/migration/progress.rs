//! Overall migration progress as a single fraction in `[0, 1]`.

use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Receives overall progress fractions, in order and never decreasing.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, fraction: f64);
}

impl<F> ProgressObserver for F
where
    F: Fn(f64) + Send + Sync,
{
    fn on_progress(&self, fraction: f64) {
        self(fraction)
    }
}

/// Forwards fractions to another task through an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<f64>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<f64>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressObserver for ChannelObserver {
    fn on_progress(&self, fraction: f64) {
        // a dropped receiver only means nobody is listening any more
        let _ = self.sender.send(fraction);
    }
}

/// Turns step-local progress into monotonic overall progress.
pub struct ProgressReporter {
    observer: Option<Arc<dyn ProgressObserver>>,
    min_delta: f64,
    current: f64,
    last_delivered: Option<f64>,
    finished: bool,
}

impl ProgressReporter {
    pub fn new(observer: Option<Arc<dyn ProgressObserver>>) -> Self {
        Self {
            observer,
            min_delta: 0.0,
            current: 0.0,
            last_delivered: None,
            finished: false,
        }
    }

    /// Coalesces intermediate reports closer than `min_delta` to the last
    /// delivered fraction.
    pub fn with_min_delta(mut self, min_delta: f64) -> Self {
        self.min_delta = min_delta.clamp(0.0, 1.0);
        self
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Records `step_local` progress of step `step_index` out of `step_count`.
    ///
    /// Overall progress is `(step_index + step_local) / step_count`. Values
    /// below the current fraction are ignored. The fraction `1.0` is only
    /// ever delivered by [`ProgressReporter::finish`].
    pub fn report(&mut self, step_index: usize, step_count: usize, step_local: f64) {
        if self.finished || step_count == 0 {
            return;
        }
        let step_local = if step_local.is_nan() {
            0.0
        } else {
            step_local.clamp(0.0, 1.0)
        };
        let overall = ((step_index as f64 + step_local) / step_count as f64).clamp(0.0, 1.0);
        if overall < self.current {
            return;
        }
        self.current = overall;
        if overall >= 1.0 {
            return;
        }

        let at_boundary = step_local == 0.0 || step_local == 1.0;
        if let Some(last) = self.last_delivered {
            if overall <= last {
                return;
            }
            if !at_boundary && overall - last < self.min_delta {
                return;
            }
        }
        self.deliver(overall);
    }

    /// Delivers `1.0` once. Later calls do nothing.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.current = 1.0;
        self.deliver(1.0);
    }

    fn deliver(&mut self, fraction: f64) {
        self.last_delivered = Some(fraction);
        if let Some(observer) = &self.observer {
            observer.on_progress(fraction);
        }
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("has_observer", &self.observer.is_some())
            .field("min_delta", &self.min_delta)
            .field("current", &self.current)
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording() -> (Arc<Mutex<Vec<f64>>>, Arc<dyn ProgressObserver>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer: Arc<dyn ProgressObserver> =
            Arc::new(move |fraction: f64| sink.lock().unwrap().push(fraction));
        (seen, observer)
    }

    #[test]
    fn test_overall_fraction_is_monotonic_and_finishes_once() {
        let (seen, observer) = recording();
        let mut reporter = ProgressReporter::new(Some(observer));
        reporter.report(0, 2, 0.0);
        reporter.report(0, 2, 0.5);
        reporter.report(0, 2, 0.2);
        reporter.report(0, 2, 1.0);
        reporter.report(1, 2, 0.0);
        reporter.report(1, 2, 1.0);
        reporter.finish();
        reporter.finish();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, vec![0.0, 0.25, 0.5, 1.0]);
    }

    #[test]
    fn test_min_delta_coalesces_but_keeps_boundaries() {
        let (seen, observer) = recording();
        let mut reporter = ProgressReporter::new(Some(observer)).with_min_delta(0.3);
        reporter.report(0, 1, 0.0);
        reporter.report(0, 1, 0.1);
        reporter.report(0, 1, 0.2);
        reporter.report(0, 1, 0.35);
        reporter.report(0, 1, 0.5);
        reporter.finish();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, vec![0.0, 0.35, 1.0]);
    }

    #[test]
    fn test_out_of_range_input_is_clamped() {
        let (seen, observer) = recording();
        let mut reporter = ProgressReporter::new(Some(observer));
        reporter.report(0, 4, -3.0);
        reporter.report(1, 4, 7.0);
        reporter.report(0, 0, 0.5);
        assert_eq!(seen.lock().unwrap().clone(), vec![0.0, 0.5]);
    }

    #[test]
    fn test_absent_observer_is_a_no_op() {
        let mut reporter = ProgressReporter::new(None);
        reporter.report(0, 1, 0.5);
        reporter.finish();
        assert!(reporter.is_finished());
        assert_eq!(reporter.current(), 1.0);
    }

    #[tokio::test]
    async fn test_channel_observer_forwards_in_order() {
        let (observer, mut receiver) = ChannelObserver::new();
        let mut reporter = ProgressReporter::new(Some(Arc::new(observer)));
        reporter.report(0, 2, 1.0);
        reporter.finish();
        drop(reporter);

        let mut seen = Vec::new();
        while let Some(fraction) = receiver.recv().await {
            seen.push(fraction);
        }
        assert_eq!(seen, vec![0.5, 1.0]);
    }
}
