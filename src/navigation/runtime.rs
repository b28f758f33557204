//! Navigation event loop
//!
//! Runs the controller on a dedicated thread. Engine events, the provisioning
//! result and shutdown requests arrive on separate channels and are handled
//! one at a time, in arrival order. After every message the controller status
//! is published for other threads to read.

use super::controller::{NavigationStatus, VoiceNavigationController};
use crate::assets::{spawn_provisioning, AssetProvisioner, ProvisioningError};
use crate::engine::{EngineEventReceiver, RecognitionEngine};
use crate::output::PresentationSink;
use crossbeam_channel::{never, select, unbounded, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

enum Control {
    Shutdown,
}

#[derive(Default)]
struct StatusCell {
    status: Mutex<NavigationStatus>,
    changed: Condvar,
}

impl StatusCell {
    fn publish(&self, status: NavigationStatus) {
        *self.status.lock() = status;
        self.changed.notify_all();
    }
}

/// Handle to the navigation thread
pub struct NavigationRuntime {
    control: Sender<Control>,
    status: Arc<StatusCell>,
    thread: Option<JoinHandle<()>>,
}

impl NavigationRuntime {
    /// Starts provisioning and the navigation thread.
    ///
    /// The controller initialises itself once provisioning succeeds; engine
    /// events received before that are dropped.
    pub fn spawn<E, S, P>(
        mut controller: VoiceNavigationController<E, S>,
        events: EngineEventReceiver,
        provisioner: P,
    ) -> Self
    where
        E: RecognitionEngine + 'static,
        S: PresentationSink + 'static,
        P: AssetProvisioner,
    {
        let (control_tx, control_rx) = unbounded::<Control>();
        let status = Arc::new(StatusCell::default());
        status.publish(controller.status());

        let task = spawn_provisioning(provisioner);
        let thread_status = Arc::clone(&status);

        let thread = std::thread::spawn(move || {
            tracing::debug!("Navigation runtime started");
            let mut provisioned = task.receiver();
            let mut provisioning = Some(task);
            let mut engine_events = events;

            loop {
                let mut provisioning_done = false;
                let mut events_closed = false;

                select! {
                    recv(control_rx) -> msg => match msg {
                        Ok(Control::Shutdown) | Err(_) => break,
                    },
                    recv(provisioned) -> result => {
                        // Sender only disappears without a result if the worker died
                        let result = result.unwrap_or(Err(ProvisioningError::Cancelled));
                        let _ = controller.on_provisioned(result);
                        provisioning_done = true;
                    },
                    recv(engine_events) -> event => match event {
                        Ok(event) => {
                            let outcome = controller.handle_event(event);
                            tracing::trace!("Event outcome: {:?}", outcome);
                        }
                        Err(_) => {
                            tracing::debug!("Engine event channel closed");
                            events_closed = true;
                        }
                    },
                }

                if provisioning_done {
                    provisioned = never();
                    provisioning = None;
                }
                if events_closed {
                    engine_events = never();
                }
                thread_status.publish(controller.status());
            }

            // Cancels and joins a provisioning run that has not finished yet
            drop(provisioning);
            controller.shutdown();
            thread_status.publish(controller.status());
            tracing::debug!("Navigation runtime stopped");
        });

        Self {
            control: control_tx,
            status,
            thread: Some(thread),
        }
    }

    /// Latest published controller status
    pub fn status(&self) -> NavigationStatus {
        self.status.status.lock().clone()
    }

    /// Blocks until `condition` holds for the published status or `timeout`
    /// elapses; returns whether it held
    pub fn wait_until<F>(&self, timeout: Duration, condition: F) -> bool
    where
        F: Fn(&NavigationStatus) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut status = self.status.status.lock();
        loop {
            if condition(&status) {
                return true;
            }
            if self.status.changed.wait_until(&mut status, deadline).timed_out() {
                return condition(&status);
            }
        }
    }

    /// Stops the thread, tears the controller down and returns its final status
    pub fn shutdown(mut self) -> NavigationStatus {
        self.stop();
        self.status()
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.control.send(Control::Shutdown);
        if thread.join().is_err() {
            tracing::error!("Navigation thread panicked");
        }
    }
}

impl Drop for NavigationRuntime {
    fn drop(&mut self) {
        self.stop();
    }
}
