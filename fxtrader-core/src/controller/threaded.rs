//! The control loop on a dedicated worker thread.

use super::{Controller, RunSummary};
use crate::shutdown::StopHandle;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::info;

/// Owns the worker running [`Controller::run_until_stopped`].
///
/// The only signals crossing the thread boundary are the stop flag, the
/// running flag and the final join.
pub struct ThreadedController {
    handle: JoinHandle<(Controller, RunSummary)>,
    running: Arc<AtomicBool>,
    stop: StopHandle,
}

impl ThreadedController {
    pub fn spawn(mut controller: Controller) -> io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let stop = controller.stop_handle();
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new().name("tick-loop".into()).spawn(move || {
            let summary = controller.run_until_stopped();
            flag.store(false, Ordering::Release);
            (controller, summary)
        })?;
        Ok(Self {
            handle,
            running,
            stop,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Ask the loop to stop after its current tick.
    pub fn stop(&self) {
        info!("stop requested, waiting for the current tick to finish");
        self.stop.request_stop();
    }

    /// Block until the loop ends on its own or a stop is requested, then
    /// join the worker and hand the controller back.
    pub fn wait_for_stop(self, poll: Duration) -> thread::Result<(Controller, RunSummary)> {
        while self.is_running() && !self.stop.is_stop_requested() {
            thread::sleep(poll);
        }
        self.handle.join()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::BacktestBroker;
    use crate::clock::RealTimeClock;
    use crate::controller::StopReason;
    use crate::data::BacktestFeed;
    use crate::portfolio::{Portfolio, RiskConfig};
    use rust_decimal_macros::dec;

    fn controller(stop: &StopHandle) -> Controller {
        let clock = RealTimeClock::new(Duration::from_millis(10)).cancel_on(stop.clone());
        Controller::new(
            Box::new(clock),
            Box::new(BacktestBroker::new(BacktestFeed::new(), dec!(0))),
            Portfolio::new(RiskConfig::default()),
            Vec::new(),
        )
        .with_stop_handle(stop.clone())
    }

    #[test]
    fn stop_ends_infinite_clock() {
        let stop = StopHandle::new();
        let threaded = ThreadedController::spawn(controller(&stop)).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(threaded.is_running());

        threaded.stop();
        let (controller, summary) = threaded.wait_for_stop(Duration::from_millis(5)).unwrap();
        assert_eq!(summary.reason, StopReason::StopRequested);
        assert!(controller.broker().current_tick().is_some());
    }

    #[test]
    fn external_stop_handle_is_shared() {
        let stop = StopHandle::new();
        let threaded = ThreadedController::spawn(controller(&stop)).unwrap();
        stop.request_stop();
        let (_, summary) = threaded.wait_for_stop(Duration::from_millis(5)).unwrap();
        assert_eq!(summary.reason, StopReason::StopRequested);
    }
}
