//! Periodic control task.
//!
//! Re-sends the controller board's output state at `control_interval_ms`
//! from its own thread, so a slow UI pass never delays the heater and
//! pump commands. The event loop publishes a [`ControlSnapshot`] into
//! [`SharedControl`]; this task only reads it.
//!
//! ```text
//!  ┌──────────────┐ publish  ┌───────────────┐ tick  ┌──────────────┐
//!  │ Orchestrator │────────▶│ SharedControl │──────▶│ OutputPort   │
//!  │ (event loop) │         │  (snapshot)   │       │ (link write) │
//!  └──────────────┘         └───────────────┘       └──────────────┘
//! ```
//!
//! [`ControlSnapshot`]: crate::app::ControlSnapshot

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::info;

use crate::app::control;
use crate::app::ports::OutputPort;
use crate::app::SharedControl;

/// Where and how the control thread runs.
#[derive(Debug, Clone, Copy)]
struct ThreadSpec {
    /// Null-terminated for the FreeRTOS task name.
    name: &'static str,
    /// APP core; the Bluetooth host stays on core 0.
    core: i32,
    priority: u8,
    stack_kb: usize,
}

const CONTROL_THREAD: ThreadSpec = ThreadSpec {
    name: "control\0",
    core: 1,
    priority: 10,
    stack_kb: 8,
};

impl ThreadSpec {
    fn display_name(&self) -> &'static str {
        self.name.trim_end_matches('\0')
    }

    #[cfg(target_os = "espidf")]
    fn spawn(self, f: impl FnOnce() + Send + 'static) -> std::io::Result<JoinHandle<()>> {
        // Applies to the next pthread created from this thread.
        let ret = unsafe {
            let mut cfg = esp_idf_svc::sys::esp_create_default_pthread_config();
            cfg.pin_to_core = self.core;
            cfg.prio = i32::from(self.priority);
            cfg.stack_size = (self.stack_kb * 1024) as i32;
            cfg.thread_name = self.name.as_ptr().cast();
            esp_idf_svc::sys::esp_pthread_set_cfg(&cfg)
        };
        if ret != esp_idf_svc::sys::ESP_OK as i32 {
            return Err(std::io::Error::other(format!(
                "pthread config for {} rejected: {ret}",
                self.display_name()
            )));
        }
        info!(
            "{} thread: core {}, priority {}, {} KB stack",
            self.display_name(),
            self.core,
            self.priority,
            self.stack_kb
        );
        thread::Builder::new().name(self.display_name().into()).spawn(f)
    }

    #[cfg(not(target_os = "espidf"))]
    fn spawn(self, f: impl FnOnce() + Send + 'static) -> std::io::Result<JoinHandle<()>> {
        info!("{} thread: host, {} KB stack", self.display_name(), self.stack_kb);
        thread::Builder::new()
            .name(self.display_name().into())
            .stack_size(self.stack_kb * 1024)
            .spawn(f)
    }
}

/// Handle to a running control task.
pub struct ControlTask {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl ControlTask {
    /// Ask the task to exit after its current tick and wait for it.
    pub fn stop(self) {
        self.stop.store(true, Ordering::Release);
        if self.handle.join().is_err() {
            log::error!("control task panicked");
        }
    }
}

async fn control_loop<O: OutputPort>(
    shared: SharedControl,
    out: O,
    period: Duration,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Acquire) {
        control::tick(&shared.snapshot(), &out);
        async_io_mini::Timer::after(period).await;
    }
}

/// Start the control task on its pinned thread, ticking every `period`.
pub fn spawn<O>(shared: SharedControl, out: O, period: Duration) -> std::io::Result<ControlTask>
where
    O: OutputPort + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    let handle = CONTROL_THREAD.spawn(move || {
        let executor: edge_executor::LocalExecutor<'_, 2> = edge_executor::LocalExecutor::new();
        info!("control task started ({} ms period)", period.as_millis());
        futures_lite::future::block_on(executor.run(control_loop(shared, out, period, flag)));
    })?;
    Ok(ControlTask { stop, handle })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ControlSnapshot;
    use crate::link::protocol::{AdvancedOutputCommand, OutputCommand};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<OutputCommand>>>);

    impl OutputPort for Sink {
        fn output(&self, cmd: &OutputCommand) {
            self.0.lock().unwrap().push(*cmd);
        }
        fn advanced_output(&self, _cmd: &AdvancedOutputCommand) {}
        fn alt_control(&self, _on: bool) {}
        fn temperature_control(&self, _temperature: f32) {}
    }

    #[test]
    fn ticks_until_stopped() {
        let shared = SharedControl::new();
        shared.publish(ControlSnapshot {
            initialized: true,
            target_temp: 93,
            ..ControlSnapshot::default()
        });
        let sink = Sink::default();
        let task = spawn(shared, sink.clone(), Duration::from_millis(5)).unwrap();
        std::thread::sleep(Duration::from_millis(60));
        task.stop();

        let sent = sink.0.lock().unwrap().clone();
        assert!(sent.len() >= 2);
        assert!(sent.iter().all(|c| !c.relay && c.pump == 0.0 && c.temperature == 93.0));
    }

    #[test]
    fn uninitialised_snapshot_sends_nothing() {
        let sink = Sink::default();
        let task = spawn(SharedControl::new(), sink.clone(), Duration::from_millis(5)).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        task.stop();
        assert!(sink.0.lock().unwrap().is_empty());
    }
}
