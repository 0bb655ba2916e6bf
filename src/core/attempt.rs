//! Association attempt driver
//!
//! Each attempt runs on its own task. The task owns the state machine, the
//! timeout timer, the platform request and the event subscription, so every
//! input reaches the machine through one `select!` loop.

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use tokio::{
    sync::{broadcast::error::RecvError, oneshot, watch},
    task::JoinHandle,
};

use crate::{
    backend::WifiBackend,
    core::{
        error::{AssociationError, AssociationResult, PlatformError},
        logging::LogConfig,
        request_builder::PlatformRequest,
        state_machine::{AssociationStateMachine, ValidationPolicy},
        types::{Association, AssociationState, AttemptId, FailureReason, PlatformEvent},
    },
};

/// Caller side of an attempt; resolves exactly once with the terminal result
#[derive(Debug)]
pub struct AttemptHandle {
    id: AttemptId,
    outcome: oneshot::Receiver<AssociationResult<Association>>,
}

impl AttemptHandle {
    pub fn id(&self) -> AttemptId {
        self.id
    }

    /// Wait for the terminal result
    pub async fn outcome(self) -> AssociationResult<Association> {
        self.await
    }
}

impl Future for AttemptHandle {
    type Output = AssociationResult<Association>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.outcome)
            .poll(cx)
            // Driver vanished without reporting (runtime shutting down)
            .map(|result| result.unwrap_or(Err(AssociationError::Cancelled)))
    }
}

/// Manager side of a running attempt
#[derive(Debug)]
pub(crate) struct LiveAttempt {
    id: AttemptId,
    cancel: Option<oneshot::Sender<FailureReason>>,
    state: watch::Receiver<AssociationState>,
    task: JoinHandle<()>,
}

impl LiveAttempt {
    pub(crate) fn id(&self) -> AttemptId {
        self.id
    }

    pub(crate) fn state(&self) -> AssociationState {
        *self.state.borrow()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the attempt and wait until its outcome has been delivered
    pub(crate) async fn cancel(mut self, reason: FailureReason) {
        if let Some(cancel) = self.cancel.take() {
            // Err means the driver already finished
            let _ = cancel.send(reason);
        }
        let _ = self.task.await;
    }
}

/// Everything the driver needs for one attempt
pub(crate) struct AttemptPlan {
    pub request: PlatformRequest,
    pub timeout: Duration,
    pub validation: ValidationPolicy,
    pub log: LogConfig,
}

/// Spawn the driver task for a new attempt
pub(crate) fn spawn<B: WifiBackend>(backend: Arc<B>, plan: AttemptPlan) -> (AttemptHandle, LiveAttempt) {
    let id = AttemptId::new();
    let (outcome_tx, outcome_rx) = oneshot::channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    let (state_tx, state_rx) = watch::channel(AssociationState::Idle);

    let machine = AssociationStateMachine::new(
        id,
        plan.request.target.as_str(),
        plan.request.is_open(),
        plan.validation,
        plan.log.clone(),
    );

    let task = tokio::spawn(drive(
        backend, plan, machine, cancel_rx, state_tx, outcome_tx,
    ));

    (
        AttemptHandle {
            id,
            outcome: outcome_rx,
        },
        LiveAttempt {
            id,
            cancel: Some(cancel_tx),
            state: state_rx,
            task,
        },
    )
}

async fn drive<B: WifiBackend>(
    backend: Arc<B>,
    plan: AttemptPlan,
    mut machine: AssociationStateMachine,
    mut cancel: oneshot::Receiver<FailureReason>,
    state: watch::Sender<AssociationState>,
    outcome: oneshot::Sender<AssociationResult<Association>>,
) {
    let log = plan.log;
    let id = machine.id();

    // Subscribe before issuing the request so no event is missed
    let mut events = backend.subscribe();

    if let Err(e) = machine.start(plan.timeout) {
        let _ = outcome.send(Err(e));
        return;
    }
    state.send_replace(machine.state());

    let Some(deadline) = machine.deadline() else {
        return;
    };
    let timer = tokio::time::sleep_until(deadline);
    tokio::pin!(timer);

    log.info(format_args!(
        "[{}] requesting association with {:?}",
        id, plan.request.target
    ));
    let request = backend.request_association(id, &plan.request);
    tokio::pin!(request);
    let mut request_pending = true;

    while !machine.state().is_terminal() {
        let changed = tokio::select! {
            biased;

            reason = &mut cancel => {
                machine.cancel(reason.unwrap_or(FailureReason::Cancelled))
            }
            event = events.recv() => match event {
                Ok(event) => machine.on_platform_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    log.warn(format_args!("[{}] missed {} platform events", id, skipped));
                    None
                }
                Err(RecvError::Closed) => machine.cancel(FailureReason::PlatformUnavailable),
            },
            result = &mut request, if request_pending => {
                request_pending = false;
                match result {
                    Ok(()) => machine.on_request_accepted(),
                    Err(PlatformError::Rejected(code)) => {
                        machine.on_platform_event(&PlatformEvent::RequestRejected { code })
                    }
                    Err(e) => {
                        log.warn(format_args!("[{}] association request failed: {}", id, e));
                        machine.cancel(FailureReason::PlatformUnavailable)
                    }
                }
            }
            _ = &mut timer => machine.on_timeout(),
        };

        if let Some(next) = changed {
            state.send_replace(next);
        }
    }

    // A superseding attempt reconfigures the platform itself
    let cleanup = !matches!(
        machine.state(),
        AssociationState::Connected | AssociationState::Failed(FailureReason::Superseded)
    );
    if cleanup {
        if let Err(e) = backend.abort_association(id).await {
            log.warn(format_args!("[{}] could not clean up attempt: {}", id, e));
        }
    }

    let result = machine
        .outcome()
        .unwrap_or(Err(AssociationError::PlatformUnavailable));
    match &result {
        Ok(association) => log.info(format_args!(
            "[{}] CONNECTED SUCCESSFULLY to {} after {:?}",
            id, association.ssid, association.elapsed
        )),
        Err(e) => log.info(format_args!("[{}] DIDN'T CONNECT TO WIFI: {}", id, e)),
    }

    // The handle may have been dropped; nobody to tell then
    let _ = outcome.send(result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::MockWifiBackend,
        core::{request_builder::AssociationRequestBuilder, types::NetworkDescriptor},
    };
    use pretty_assertions::assert_eq;
    use tokio::time::{Instant, sleep};
    use tokio_test::{assert_pending, assert_ready};

    const TIMEOUT: Duration = Duration::from_millis(15_000);

    fn plan(descriptor: &NetworkDescriptor, validation: ValidationPolicy) -> AttemptPlan {
        AttemptPlan {
            request: AssociationRequestBuilder::build(descriptor).unwrap(),
            timeout: TIMEOUT,
            validation,
            log: LogConfig::disabled(),
        }
    }

    fn home() -> NetworkDescriptor {
        NetworkDescriptor::wpa_psk("Home", "x")
    }

    fn link_up(ssid: &str) -> PlatformEvent {
        PlatformEvent::LinkUp {
            ssid: ssid.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_up_then_validated_connects() {
        let backend = Arc::new(MockWifiBackend::new());
        let started = Instant::now();
        let (handle, live) = spawn(backend.clone(), plan(&home(), ValidationPolicy::Always));

        let emitter = backend.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(200)).await;
            emitter.emit(link_up("Home"));
            sleep(Duration::from_millis(600)).await;
            emitter.emit(PlatformEvent::Validated);
        });

        let association = handle.outcome().await.unwrap();
        assert_eq!(association.ssid, "Home");
        assert_eq!(association.elapsed, Duration::from_millis(800));
        assert_eq!(started.elapsed(), Duration::from_millis(800));
        assert_eq!(live.state(), AssociationState::Connected);
        assert_eq!(backend.abort_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_times_out_at_deadline() {
        let backend = Arc::new(MockWifiBackend::new());
        let started = Instant::now();
        let (handle, live) = spawn(backend.clone(), plan(&home(), ValidationPolicy::Always));

        assert_eq!(handle.outcome().await, Err(AssociationError::TimedOut));
        assert_eq!(started.elapsed(), TIMEOUT);
        assert_eq!(live.state(), AssociationState::TimedOut);
        assert_eq!(backend.abort_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepted_request_waits_for_link_up() {
        let backend = Arc::new(MockWifiBackend::new());
        let (handle, live) = spawn(backend.clone(), plan(&home(), ValidationPolicy::Always));

        sleep(Duration::from_millis(10)).await;
        assert_eq!(live.state(), AssociationState::WaitingForLinkUp);

        backend.emit(PlatformEvent::LinkDown);
        assert_eq!(handle.outcome().await, Err(AssociationError::LinkLost));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_request() {
        let backend = Arc::new(MockWifiBackend::new());
        backend
            .set_association_failure(Some(PlatformError::Rejected(
                crate::core::types::RejectCode::NetworkNotFound,
            )))
            .await;

        let (handle, _live) = spawn(backend.clone(), plan(&home(), ValidationPolicy::Always));

        assert_eq!(
            handle.outcome().await,
            Err(AssociationError::Rejected(
                crate::core::types::RejectCode::NetworkNotFound
            ))
        );
        assert_eq!(backend.abort_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_failure_is_platform_unavailable() {
        let backend = Arc::new(MockWifiBackend::new());
        backend
            .set_association_failure(Some(PlatformError::BackendUnavailable("gone".into())))
            .await;

        let (handle, _live) = spawn(backend.clone(), plan(&home(), ValidationPolicy::Always));
        let id = handle.id();
        assert_eq!(
            handle.outcome().await,
            Err(AssociationError::PlatformUnavailable)
        );
        // Cleanup is scoped to the failed attempt
        assert_eq!(backend.aborts().await, vec![id]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_network_shortcut() {
        let backend = Arc::new(MockWifiBackend::new());
        backend.set_events_on_request(vec![link_up("Cafe")]).await;

        let (handle, _live) = spawn(
            backend,
            plan(&NetworkDescriptor::open("Cafe"), ValidationPolicy::SkipForOpen),
        );
        assert_eq!(handle.outcome().await.unwrap().ssid, "Cafe");
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefix_match_reports_linked_ssid() {
        let backend = Arc::new(MockWifiBackend::new());
        backend
            .set_events_on_request(vec![link_up("Cafe-5G"), PlatformEvent::Validated])
            .await;

        let (handle, _live) = spawn(
            backend,
            plan(
                &NetworkDescriptor::open("Cafe").with_prefix_match(),
                ValidationPolicy::Always,
            ),
        );
        assert_eq!(handle.outcome().await.unwrap().ssid, "Cafe-5G");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_any_event_is_superseded() {
        let backend = Arc::new(MockWifiBackend::new());
        let (mut handle, live) = spawn(backend.clone(), plan(&home(), ValidationPolicy::Always));

        assert_pending!(tokio_test::task::spawn(&mut handle).poll());

        live.cancel(FailureReason::Superseded).await;

        let mut task = tokio_test::task::spawn(handle);
        assert_eq!(assert_ready!(task.poll()), Err(AssociationError::Superseded));
        assert_eq!(backend.abort_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_after_terminal_state_are_dropped() {
        let backend = Arc::new(MockWifiBackend::new());
        backend
            .set_events_on_request(vec![link_up("Home"), PlatformEvent::Validated])
            .await;

        let (handle, live) = spawn(backend.clone(), plan(&home(), ValidationPolicy::Always));
        assert!(handle.outcome().await.is_ok());

        backend.emit(PlatformEvent::LinkDown);
        backend.emit(PlatformEvent::RequestRejected {
            code: crate::core::types::RejectCode::Denied,
        });
        sleep(TIMEOUT * 2).await;

        assert!(live.is_finished());
        assert_eq!(live.state(), AssociationState::Connected);
    }
}
