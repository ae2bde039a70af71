//! # Listener Dispatcher
//!
//! Runs the listeners of one packet type over one [`PacketEvent`].
//!
//! # Rules
//!
//! - Listeners run in priority order over the snapshot taken when the pass
//!   starts.
//! - Once the event is cancelled, only listeners registered with
//!   `ignore_cancelled` still run.
//! - Monitor listeners see the event read-only.
//! - An `Err` or a panic from one listener is reported as a
//!   [`TapError::ListenerFault`]; the next listener runs on the event as the
//!   failing listener left it.

use crate::event::PacketEvent;
use crate::faults::FaultReporter;
use crate::listener::{ListenerHandle, ListenerRegistry};
use crate::timings::ListenerTimings;
use packettap_core::TapError;
use packettap_protocol::PacketType;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// Result of one dispatch pass
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Listeners that were called
    pub invoked: usize,
    /// Listeners skipped because the event was cancelled
    pub skipped: usize,
    pub faults: Vec<TapError>,
}

impl DispatchOutcome {
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}

pub struct Dispatcher {
    listeners: Arc<ListenerRegistry>,
    faults: FaultReporter,
    timings: ListenerTimings,
}

impl Dispatcher {
    pub fn new(listeners: Arc<ListenerRegistry>, faults: FaultReporter, timings: ListenerTimings) -> Self {
        Self {
            listeners,
            faults,
            timings,
        }
    }

    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    pub fn faults(&self) -> &FaultReporter {
        &self.faults
    }

    pub fn timings(&self) -> &ListenerTimings {
        &self.timings
    }

    /// Unregister a listener and drop its fault count and timings
    pub fn unregister(&self, handle: &ListenerHandle) -> bool {
        let removed = self.listeners.unregister(handle);
        self.faults.forget(handle.id());
        self.timings.forget(handle.id());
        removed
    }

    pub fn has_listeners(&self, packet: PacketType) -> bool {
        self.listeners.has_listeners(packet)
    }

    /// Run every listener of the event's packet type
    pub fn dispatch(&self, event: &mut PacketEvent) -> DispatchOutcome {
        let packet = event.packet_type();
        let snapshot = self.listeners.snapshot(packet);
        let mut outcome = DispatchOutcome::default();

        for listener in snapshot.iter() {
            if event.is_cancelled() && !listener.ignores_cancelled() {
                outcome.skipped += 1;
                continue;
            }

            event.set_read_only(listener.priority().is_monitor());
            let started = self.timings.is_enabled().then(Instant::now);
            let result = panic::catch_unwind(AssertUnwindSafe(|| listener.invoke(event)));
            if let Some(started) = started {
                self.timings.record(listener, started.elapsed());
            }
            outcome.invoked += 1;

            let message = match result {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{:#}", e),
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };
            outcome.faults.push(self.faults.report(listener, packet, message));
        }

        event.set_read_only(false);
        outcome
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ListenerPriority;
    use crate::listener::ListenerOptions;
    use crate::testing::{self, CHAT};
    use packettap_core::AccessError;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Barrier;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(
            Arc::new(ListenerRegistry::new()),
            FaultReporter::new(2),
            ListenerTimings::new(true),
        )
    }

    fn recording(
        log: &Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
    ) -> impl Fn(&mut PacketEvent) -> anyhow::Result<()> + Send + Sync + 'static {
        let log = log.clone();
        move |_| {
            log.lock().push(name);
            Ok(())
        }
    }

    #[test]
    fn test_priority_and_cancellation() {
        let dispatcher = dispatcher();
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = dispatcher.listeners();

        registry
            .register(&[CHAT], ListenerOptions::new().priority(1), recording(&log, "low"))
            .unwrap();
        registry
            .register(
                &[CHAT],
                ListenerOptions::new().priority(0).ignore_cancelled(),
                recording(&log, "ignoring"),
            )
            .unwrap();
        let cancel_log = log.clone();
        registry
            .register(
                &[CHAT],
                ListenerOptions::new().priority(10),
                move |event: &mut PacketEvent| {
                    cancel_log.lock().push("high");
                    event.cancel()?;
                    Ok(())
                },
            )
            .unwrap();

        let mut event = PacketEvent::new(testing::chat("hi"), None);
        let outcome = dispatcher.dispatch(&mut event);

        assert!(event.is_cancelled());
        assert_eq!(*log.lock(), vec!["high", "ignoring"]);
        assert_eq!(outcome.invoked, 2);
        assert_eq!(outcome.skipped, 1);
        assert!(outcome.is_clean());
    }

    #[test]
    fn test_faults_are_isolated() {
        let dispatcher = dispatcher();
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = dispatcher.listeners();

        registry
            .register(&[CHAT], ListenerOptions::new().priority(3), recording(&log, "before"))
            .unwrap();
        let failing = registry
            .register(
                &[CHAT],
                ListenerOptions::new().priority(2).named("failing"),
                |event: &mut PacketEvent| {
                    event.packet_mut()?.write(0, "partial".to_string())?;
                    anyhow::bail!("boom")
                },
            )
            .unwrap();
        registry
            .register(
                &[CHAT],
                ListenerOptions::new().priority(1).named("panicking"),
                |_: &mut PacketEvent| -> anyhow::Result<()> { panic!("listener exploded") },
            )
            .unwrap();
        let seen = Arc::new(Mutex::new(None));
        let seen_by_last = seen.clone();
        registry
            .register(
                &[CHAT],
                ListenerOptions::new().priority(0),
                move |event: &mut PacketEvent| {
                    *seen_by_last.lock() = Some(event.packet().read::<String>(0)?);
                    Ok(())
                },
            )
            .unwrap();

        for _ in 0..4 {
            let mut event = PacketEvent::new(testing::chat("hi"), None);
            let outcome = dispatcher.dispatch(&mut event);
            assert_eq!(outcome.invoked, 4);
            assert_eq!(outcome.faults.len(), 2);
            assert!(matches!(
                &outcome.faults[1],
                TapError::ListenerFault { listener, message, .. }
                    if listener == "panicking" && message.contains("listener exploded")
            ));
        }

        assert_eq!(*log.lock(), vec!["before"; 4]);
        assert_eq!(seen.lock().as_deref(), Some("partial"));
        assert_eq!(dispatcher.faults().fault_count(failing.id()), 4);
        assert_eq!(dispatcher.faults().total_faults(), 8);
    }

    #[test]
    fn test_unregister_drops_listener_stats() {
        let dispatcher = dispatcher();
        let registry = dispatcher.listeners();

        for _ in 0..3 {
            let handle = registry
                .register(&[CHAT], ListenerOptions::new().named("churn"), |_: &mut PacketEvent| {
                    anyhow::bail!("boom")
                })
                .unwrap();
            let mut event = PacketEvent::new(testing::chat("hi"), None);
            dispatcher.dispatch(&mut event);
            assert_eq!(dispatcher.faults().fault_count(handle.id()), 1);
            assert!(dispatcher.timings().get(handle.id()).is_some());

            assert!(dispatcher.unregister(&handle));
            assert!(!dispatcher.unregister(&handle));
            assert_eq!(dispatcher.faults().fault_count(handle.id()), 0);
            assert!(dispatcher.timings().get(handle.id()).is_none());
        }

        assert_eq!(dispatcher.faults().tracked(), 0);
        assert!(dispatcher.timings().is_empty());
        assert_eq!(dispatcher.faults().total_faults(), 3);
    }

    #[test]
    fn test_monitor_is_read_only() {
        let dispatcher = dispatcher();
        let result = Arc::new(Mutex::new(None));
        let observed = result.clone();
        dispatcher
            .listeners()
            .register(
                &[CHAT],
                ListenerOptions::new().priority(ListenerPriority::MONITOR),
                move |event: &mut PacketEvent| {
                    *observed.lock() = Some(event.cancel());
                    Ok(())
                },
            )
            .unwrap();

        let mut event = PacketEvent::new(testing::chat("hi"), None);
        dispatcher.dispatch(&mut event);

        assert_eq!(*result.lock(), Some(Err(AccessError::ReadOnly)));
        assert!(!event.is_cancelled());
        assert!(!event.is_read_only());
    }

    #[test]
    fn test_unregister_during_dispatch() {
        let dispatcher = Arc::new(dispatcher());
        let barrier = Arc::new(Barrier::new(2));
        let log = Arc::new(Mutex::new(Vec::new()));

        let gate = barrier.clone();
        let first_pass = AtomicBool::new(true);
        dispatcher
            .listeners()
            .register(&[CHAT], ListenerOptions::new().priority(10), move |_: &mut PacketEvent| {
                if first_pass.swap(false, Ordering::SeqCst) {
                    // Let the other thread unregister, then wait until it has
                    gate.wait();
                    gate.wait();
                }
                Ok(())
            })
            .unwrap();
        let handle = dispatcher
            .listeners()
            .register(&[CHAT], ListenerOptions::new().priority(1), recording(&log, "second"))
            .unwrap();

        let remover = {
            let dispatcher = dispatcher.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                assert!(dispatcher.listeners().unregister(&handle));
                barrier.wait();
            })
        };

        let mut event = PacketEvent::new(testing::chat("hi"), None);
        assert_eq!(dispatcher.dispatch(&mut event).invoked, 2);
        remover.join().unwrap();
        assert_eq!(*log.lock(), vec!["second"]);

        let mut event = PacketEvent::new(testing::chat("hi"), None);
        assert_eq!(dispatcher.dispatch(&mut event).invoked, 1);
        assert_eq!(*log.lock(), vec!["second"]);
    }

    #[test]
    fn test_timings_recorded() {
        let dispatcher = dispatcher();
        let handle = dispatcher
            .listeners()
            .register(&[CHAT], ListenerOptions::new().named("timed"), |_: &mut PacketEvent| Ok(()))
            .unwrap();

        for _ in 0..3 {
            dispatcher.dispatch(&mut PacketEvent::new(testing::chat("hi"), None));
        }

        let stats = dispatcher.timings().get(handle.id()).unwrap();
        assert_eq!(stats.name, "timed");
        assert_eq!(stats.invocations, 3);
    }
}
