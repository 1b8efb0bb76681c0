//! Call session controller
//!
//! Owns the reactive state of one simulated phone and applies the call
//! lifecycle to it. The presentation layer reads state through
//! [`CellReader`]s and changes it only through the operations here.
//!
//! Operations are serialized by an internal lock. The lock only covers
//! validation, timer bookkeeping and the cell write; subscribers run after
//! it is released, so they may call back into the controller.

use crate::config::SessionConfig;
use crate::domain::call::{transition, CallOperation, CallState, CallType};
use crate::domain::observable::{CellReader, ObservableCell};
use crate::domain::shared::Result;
use crate::infrastructure::scheduler::{Scheduler, TaskHandle};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Auto-reset timer currently outstanding
#[derive(Debug, Clone, Copy)]
struct PendingReset {
    generation: u64,
    handle: TaskHandle,
}

#[derive(Debug, Default)]
struct Serialized {
    pending_reset: Option<PendingReset>,
    generation: u64,
}

struct SessionInner {
    call_state: ObservableCell<CallState>,
    microphone_muted: ObservableCell<bool>,
    front_camera_selected: ObservableCell<bool>,
    scheduler: Arc<dyn Scheduler>,
    auto_reset_delay: Duration,
    serialized: Mutex<Serialized>,
}

impl SessionInner {
    fn lock(&self) -> MutexGuard<'_, Serialized> {
        self.serialized
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel_pending(&self, guard: &mut Serialized) {
        if let Some(pending) = guard.pending_reset.take() {
            self.scheduler.cancel(&pending.handle);
            debug!("Cancelled auto-reset timer {}", pending.handle);
        }
    }

    /// Validate `operation` against the current state and commit the result
    fn apply(self: &Arc<Self>, operation: CallOperation) -> Result<()> {
        let mut guard = self.lock();
        let current = self.call_state.get();

        let next = transition(&current, &operation).map_err(|err| {
            warn!("Rejected {:?} in state {}: {}", operation, current, err);
            err
        })?;

        if matches!(
            operation,
            CallOperation::IncomingCall(_) | CallOperation::Reset
        ) {
            self.cancel_pending(&mut guard);
        }

        let notification = self.call_state.replace(next);
        info!("Call state {} -> {}", current, next);

        if matches!(operation, CallOperation::End) {
            self.schedule_auto_reset(&mut guard);
        }

        drop(guard);
        if let Some(notification) = notification {
            notification.notify();
        }
        Ok(())
    }

    fn schedule_auto_reset(self: &Arc<Self>, guard: &mut Serialized) {
        self.cancel_pending(guard);

        guard.generation += 1;
        let generation = guard.generation;
        let session: Weak<SessionInner> = Arc::downgrade(self);

        let handle = self.scheduler.schedule(
            self.auto_reset_delay,
            Box::new(move || {
                if let Some(session) = session.upgrade() {
                    session.auto_reset(generation);
                }
            }),
        );
        guard.pending_reset = Some(PendingReset { generation, handle });

        debug!(
            "Auto-reset timer {} scheduled in {:?}",
            handle, self.auto_reset_delay
        );
    }

    /// Timer callback: `Ended` -> `Idle`, unless the timer went stale
    fn auto_reset(&self, generation: u64) {
        let mut guard = self.lock();

        match guard.pending_reset {
            Some(pending) if pending.generation == generation => {
                guard.pending_reset = None;
            }
            _ => {
                debug!("Ignoring stale auto-reset timer (generation {})", generation);
                return;
            }
        }

        let current = self.call_state.get();
        let notification = match transition(&current, &CallOperation::AutoReset) {
            Ok(next) => {
                info!("Call state {} -> {} (auto-reset)", current, next);
                self.call_state.replace(next)
            }
            Err(err) => {
                debug!("Auto-reset skipped: {}", err);
                None
            }
        };

        drop(guard);
        if let Some(notification) = notification {
            notification.notify();
        }
    }

    fn toggle(&self, cell: &ObservableCell<bool>, name: &str) -> bool {
        let guard = self.lock();
        let value = !cell.get();
        let notification = cell.replace(value);
        debug!("{} -> {}", name, value);

        drop(guard);
        if let Some(notification) = notification {
            notification.notify();
        }
        value
    }
}

/// Controller for a single simulated call session
pub struct CallSessionController {
    inner: Arc<SessionInner>,
}

impl CallSessionController {
    /// Create a controller with the default auto-reset delay
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self::with_config(scheduler, &SessionConfig::default())
    }

    pub fn with_config(scheduler: Arc<dyn Scheduler>, config: &SessionConfig) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                call_state: ObservableCell::new(CallState::Idle),
                microphone_muted: ObservableCell::new(false),
                front_camera_selected: ObservableCell::new(false),
                scheduler,
                auto_reset_delay: config.auto_reset_delay(),
                serialized: Mutex::new(Serialized::default()),
            }),
        }
    }

    pub fn call_state(&self) -> CellReader<CallState> {
        self.inner.call_state.reader()
    }

    pub fn microphone_muted(&self) -> CellReader<bool> {
        self.inner.microphone_muted.reader()
    }

    pub fn front_camera_selected(&self) -> CellReader<bool> {
        self.inner.front_camera_selected.reader()
    }

    pub fn auto_reset_delay(&self) -> Duration {
        self.inner.auto_reset_delay
    }

    pub fn has_pending_auto_reset(&self) -> bool {
        self.inner.lock().pending_reset.is_some()
    }

    /// `Idle` -> `Ringing(call_type)`
    pub fn simulate_incoming_call(&self, call_type: CallType) -> Result<()> {
        self.inner.apply(CallOperation::IncomingCall(call_type))
    }

    /// `Ringing(t)` -> `InCall(t)`; `call_type` must equal `t`
    pub fn accept_call(&self, call_type: CallType) -> Result<()> {
        self.inner.apply(CallOperation::Accept(call_type))
    }

    /// `Ringing` -> `Idle`
    pub fn reject_call(&self) -> Result<()> {
        self.inner.apply(CallOperation::Reject)
    }

    /// `InCall` -> `Ended`, then back to `Idle` once the auto-reset delay elapses
    pub fn end_call(&self) -> Result<()> {
        self.inner.apply(CallOperation::End)
    }

    /// Any state -> `Idle`, cancelling a pending auto-reset
    pub fn reset_call_state(&self) -> Result<()> {
        self.inner.apply(CallOperation::Reset)
    }

    /// Flip the microphone mute flag and return the new value
    pub fn toggle_microphone_muted(&self) -> bool {
        self.inner
            .toggle(&self.inner.microphone_muted, "Microphone muted")
    }

    /// Flip the front-camera flag and return the new value
    pub fn toggle_front_camera_selected(&self) -> bool {
        self.inner
            .toggle(&self.inner.front_camera_selected, "Front camera selected")
    }
}

impl Drop for CallSessionController {
    fn drop(&mut self) {
        let mut guard = self.inner.lock();
        self.inner.cancel_pending(&mut guard);
    }
}

impl std::fmt::Debug for CallSessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSessionController")
            .field("call_state", &self.inner.call_state.get())
            .field("microphone_muted", &self.inner.microphone_muted.get())
            .field("front_camera_selected", &self.inner.front_camera_selected.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::CallError;
    use crate::infrastructure::scheduler::{ManualScheduler, MockScheduler, Task};
    use mockall::predicate::eq;

    fn manual_session() -> (Arc<ManualScheduler>, CallSessionController) {
        let scheduler = Arc::new(ManualScheduler::new());
        let controller = CallSessionController::new(scheduler.clone());
        (scheduler, controller)
    }

    fn in_call(controller: &CallSessionController, call_type: CallType) {
        controller.simulate_incoming_call(call_type).unwrap();
        controller.accept_call(call_type).unwrap();
    }

    #[test]
    fn test_initial_state() {
        let (_, controller) = manual_session();
        assert_eq!(controller.call_state().get(), CallState::Idle);
        assert!(!controller.microphone_muted().get());
        assert!(!controller.front_camera_selected().get());
        assert!(!controller.has_pending_auto_reset());
        assert_eq!(controller.auto_reset_delay(), Duration::from_millis(2000));
    }

    #[test]
    fn test_call_lifecycle() {
        let (scheduler, controller) = manual_session();
        let state = controller.call_state();

        controller.simulate_incoming_call(CallType::Video).unwrap();
        assert_eq!(
            state.get(),
            CallState::Ringing {
                call_type: CallType::Video
            }
        );

        controller.accept_call(CallType::Video).unwrap();
        assert_eq!(
            state.get(),
            CallState::InCall {
                call_type: CallType::Video
            }
        );

        controller.end_call().unwrap();
        assert_eq!(state.get(), CallState::Ended);
        assert!(controller.has_pending_auto_reset());

        scheduler.advance(Duration::from_millis(1999));
        assert_eq!(state.get(), CallState::Ended);

        scheduler.advance(Duration::from_millis(1));
        assert_eq!(state.get(), CallState::Idle);
        assert!(!controller.has_pending_auto_reset());
    }

    #[test]
    fn test_reject_call() {
        for call_type in [CallType::Audio, CallType::Video] {
            let (_, controller) = manual_session();
            controller.simulate_incoming_call(call_type).unwrap();
            controller.reject_call().unwrap();
            assert_eq!(controller.call_state().get(), CallState::Idle);
        }
    }

    #[test]
    fn test_accept_type_mismatch_keeps_ringing() {
        let (_, controller) = manual_session();
        controller.simulate_incoming_call(CallType::Audio).unwrap();

        let err = controller.accept_call(CallType::Video).unwrap_err();
        assert!(err.is_type_mismatch());
        assert_eq!(
            controller.call_state().get(),
            CallState::Ringing {
                call_type: CallType::Audio
            }
        );
    }

    #[test]
    fn test_invalid_transition_leaves_state_unchanged() {
        let (_, controller) = manual_session();
        let notified = Arc::new(Mutex::new(0));
        let counter = notified.clone();
        let _sub = controller
            .call_state()
            .subscribe(move |_| *counter.lock().unwrap() += 1);

        let err = controller.accept_call(CallType::Audio).unwrap_err();
        assert_eq!(
            err,
            CallError::InvalidTransition {
                from: CallState::Idle,
                operation: "accept",
            }
        );
        assert!(controller.reject_call().unwrap_err().is_invalid_transition());
        assert!(controller.end_call().unwrap_err().is_invalid_transition());

        assert_eq!(controller.call_state().get(), CallState::Idle);
        assert_eq!(*notified.lock().unwrap(), 0);
    }

    #[test]
    fn test_incoming_call_only_from_idle() {
        let (_, controller) = manual_session();
        in_call(&controller, CallType::Audio);

        let err = controller
            .simulate_incoming_call(CallType::Video)
            .unwrap_err();
        assert!(err.is_invalid_transition());

        controller.end_call().unwrap();
        assert!(controller
            .simulate_incoming_call(CallType::Video)
            .unwrap_err()
            .is_invalid_transition());
        assert!(controller.has_pending_auto_reset());
    }

    #[test]
    fn test_reset_cancels_auto_reset() {
        let (scheduler, controller) = manual_session();
        in_call(&controller, CallType::Audio);
        controller.end_call().unwrap();

        scheduler.advance(Duration::from_millis(500));
        controller.reset_call_state().unwrap();
        assert_eq!(controller.call_state().get(), CallState::Idle);
        assert!(!controller.has_pending_auto_reset());
        assert_eq!(scheduler.pending(), 0);

        // A new call must survive past the old deadline
        controller.simulate_incoming_call(CallType::Video).unwrap();
        assert_eq!(scheduler.advance(Duration::from_secs(5)), 0);
        assert_eq!(
            controller.call_state().get(),
            CallState::Ringing {
                call_type: CallType::Video
            }
        );
    }

    #[test]
    fn test_reset_from_every_state() {
        let setups: [fn(&CallSessionController); 4] = [
            |_| {},
            |c| c.simulate_incoming_call(CallType::Audio).unwrap(),
            |c| in_call(c, CallType::Video),
            |c| {
                in_call(c, CallType::Audio);
                c.end_call().unwrap();
            },
        ];

        for setup in setups {
            let (scheduler, controller) = manual_session();
            setup(&controller);
            controller.reset_call_state().unwrap();
            assert_eq!(controller.call_state().get(), CallState::Idle);
            assert_eq!(scheduler.pending(), 0);
        }
    }

    #[test]
    fn test_toggles_are_involutions() {
        let (_, controller) = manual_session();

        assert!(controller.toggle_microphone_muted());
        assert!(!controller.toggle_microphone_muted());
        assert!(!controller.microphone_muted().get());

        assert!(controller.toggle_front_camera_selected());
        assert!(!controller.toggle_front_camera_selected());
        assert!(!controller.front_camera_selected().get());
    }

    #[test]
    fn test_flags_persist_across_calls() {
        let (scheduler, controller) = manual_session();
        controller.toggle_microphone_muted();
        controller.toggle_front_camera_selected();

        in_call(&controller, CallType::Video);
        controller.end_call().unwrap();
        scheduler.advance(Duration::from_millis(2000));
        controller.simulate_incoming_call(CallType::Audio).unwrap();

        assert!(controller.microphone_muted().get());
        assert!(controller.front_camera_selected().get());
    }

    #[test]
    fn test_subscribers_see_each_transition() {
        let (scheduler, controller) = manual_session();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = controller
            .call_state()
            .subscribe(move |state: &CallState| sink.lock().unwrap().push(*state));

        in_call(&controller, CallType::Audio);
        controller.end_call().unwrap();
        scheduler.advance(Duration::from_millis(2000));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                CallState::Ringing {
                    call_type: CallType::Audio
                },
                CallState::InCall {
                    call_type: CallType::Audio
                },
                CallState::Ended,
                CallState::Idle,
            ]
        );
    }

    #[test]
    fn test_end_call_schedules_configured_delay() {
        let mut scheduler = MockScheduler::new();
        scheduler
            .expect_schedule()
            .withf(|delay, _| *delay == Duration::from_millis(750))
            .times(1)
            .returning(|_, _| TaskHandle::new(7));
        scheduler
            .expect_cancel()
            .with(eq(TaskHandle::new(7)))
            .times(1)
            .return_const(());

        let config = SessionConfig {
            auto_reset_delay_ms: 750,
        };
        let controller = CallSessionController::with_config(Arc::new(scheduler), &config);
        in_call(&controller, CallType::Audio);
        controller.end_call().unwrap();
        controller.reset_call_state().unwrap();
    }

    #[test]
    fn test_stale_timer_is_ignored() {
        let fired: Arc<Mutex<Vec<Task>>> = Arc::new(Mutex::new(Vec::new()));
        let captured = fired.clone();

        let mut scheduler = MockScheduler::new();
        let mut next_id = 0;
        scheduler.expect_schedule().times(2).returning(move |_, task| {
            captured.lock().unwrap().push(task);
            next_id += 1;
            TaskHandle::new(next_id)
        });
        // The scheduler "fails" to cancel: the stale task still runs below
        scheduler.expect_cancel().return_const(());

        let controller = CallSessionController::new(Arc::new(scheduler));
        in_call(&controller, CallType::Audio);
        controller.end_call().unwrap();
        controller.reset_call_state().unwrap();

        in_call(&controller, CallType::Video);
        controller.end_call().unwrap();

        let mut tasks = std::mem::take(&mut *fired.lock().unwrap());
        let current = tasks.pop().unwrap();
        let stale = tasks.pop().unwrap();

        stale();
        assert_eq!(controller.call_state().get(), CallState::Ended);
        assert!(controller.has_pending_auto_reset());

        current();
        assert_eq!(controller.call_state().get(), CallState::Idle);
        assert!(!controller.has_pending_auto_reset());
    }

    #[test]
    fn test_timer_after_drop_is_noop() {
        let (scheduler, controller) = manual_session();
        in_call(&controller, CallType::Audio);
        controller.end_call().unwrap();
        let state = controller.call_state();

        drop(controller);
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.advance(Duration::from_secs(3)), 0);
        assert_eq!(state.get(), CallState::Ended);
    }
}
