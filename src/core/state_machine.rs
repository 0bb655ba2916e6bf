//! Association state machine
//!
//! Pure transition logic for one association attempt. The machine never
//! performs I/O; the attempt driver feeds it platform events, the platform
//! call result, timer expiry and cancellation, one at a time.

use std::time::Duration;

use tokio::time::Instant;

use crate::core::{
    error::{AssociationError, AssociationResult},
    logging::LogConfig,
    types::{Association, AssociationState, AttemptId, FailureReason, PlatformEvent},
};

// Same horizon tokio uses for unbounded timeouts (about 30 years)
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Whether open networks must report `Validated` before `Connected`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValidationPolicy {
    /// Every network waits for validation
    #[default]
    Always,
    /// Open networks are considered connected on link up
    SkipForOpen,
}

/// State machine for a single association attempt
#[derive(Debug)]
pub struct AssociationStateMachine {
    id: AttemptId,
    state: AssociationState,
    target: String,
    linked_ssid: Option<String>,
    skip_validation: bool,
    started_at: Option<Instant>,
    deadline: Option<Instant>,
    finished_at: Option<Instant>,
    log: LogConfig,
}

impl AssociationStateMachine {
    /// Create an idle machine for `target`
    ///
    /// `open_network` together with `policy` decides whether `LinkUp` may
    /// complete the attempt without validation.
    pub fn new(
        id: AttemptId,
        target: impl Into<String>,
        open_network: bool,
        policy: ValidationPolicy,
        log: LogConfig,
    ) -> Self {
        Self {
            id,
            state: AssociationState::Idle,
            target: target.into(),
            linked_ssid: None,
            skip_validation: open_network && policy == ValidationPolicy::SkipForOpen,
            started_at: None,
            deadline: None,
            finished_at: None,
            log,
        }
    }

    /// Leave `Idle` and arm the timeout
    pub fn start(&mut self, timeout: Duration) -> AssociationResult<()> {
        if self.state != AssociationState::Idle || self.started_at.is_some() {
            return Err(AssociationError::AlreadyRunning);
        }

        let now = Instant::now();
        self.started_at = Some(now);
        self.deadline = Some(deadline_after(now, timeout));
        self.transition(AssociationState::Requesting);
        Ok(())
    }

    /// The platform acknowledged the association call
    pub fn on_request_accepted(&mut self) -> Option<AssociationState> {
        match self.state {
            AssociationState::Requesting => self.transition(AssociationState::WaitingForLinkUp),
            state => {
                self.log.debug(format_args!(
                    "[{}] request acknowledgement ignored in {:?}",
                    self.id, state
                ));
                None
            }
        }
    }

    /// Consume one platform event
    ///
    /// Returns the new state if the event caused a transition.
    pub fn on_platform_event(&mut self, event: &PlatformEvent) -> Option<AssociationState> {
        use AssociationState::*;

        let next = match (self.state, event) {
            (Requesting | WaitingForLinkUp, PlatformEvent::LinkUp { ssid }) => {
                self.linked_ssid = Some(ssid.clone());
                if self.skip_validation {
                    Some(Connected)
                } else {
                    Some(WaitingForValidation)
                }
            }
            (Requesting, PlatformEvent::RequestRejected { code }) => {
                Some(Failed(FailureReason::Rejected(*code)))
            }
            (WaitingForLinkUp | WaitingForValidation, PlatformEvent::LinkDown) => {
                Some(Failed(FailureReason::LinkLost))
            }
            (WaitingForValidation, PlatformEvent::Validated) => Some(Connected),
            _ => None,
        };

        match next {
            Some(next) => self.transition(next),
            None => {
                self.log.debug(format_args!(
                    "[{}] ignoring {:?} in {:?}",
                    self.id, event, self.state
                ));
                None
            }
        }
    }

    /// Timer expired
    pub fn on_timeout(&mut self) -> Option<AssociationState> {
        if self.state.is_terminal() {
            return None;
        }
        self.log
            .warn(format_args!("[{}] connection timed out...", self.id));
        self.transition(AssociationState::TimedOut)
    }

    /// Force the attempt into `Failed(reason)`
    pub fn cancel(&mut self, reason: FailureReason) -> Option<AssociationState> {
        if self.state.is_terminal() {
            self.log.debug(format_args!(
                "[{}] cancel({:?}) ignored in {:?}",
                self.id, reason, self.state
            ));
            return None;
        }
        self.transition(AssociationState::Failed(reason))
    }

    pub fn state(&self) -> AssociationState {
        self.state
    }

    pub fn id(&self) -> AttemptId {
        self.id
    }

    /// Timeout deadline while the timer is armed
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_timer_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Terminal result, once the machine has finished
    pub fn outcome(&self) -> Option<AssociationResult<Association>> {
        match self.state {
            AssociationState::Connected => {
                let elapsed = match (self.started_at, self.finished_at) {
                    (Some(start), Some(end)) => end.duration_since(start),
                    _ => Duration::ZERO,
                };
                Some(Ok(Association {
                    ssid: self
                        .linked_ssid
                        .clone()
                        .unwrap_or_else(|| self.target.clone()),
                    elapsed,
                }))
            }
            AssociationState::TimedOut => Some(Err(AssociationError::TimedOut)),
            AssociationState::Failed(reason) => Some(Err(reason.into())),
            _ => None,
        }
    }

    fn transition(&mut self, next: AssociationState) -> Option<AssociationState> {
        debug_assert!(rank(next) > rank(self.state), "state machine must not go back");

        self.log.debug(format_args!(
            "[{}] {:?} -> {:?} ({})",
            self.id, self.state, next, self.target
        ));
        self.state = next;

        if next.is_terminal() {
            self.deadline = None;
            self.finished_at = Some(Instant::now());
        }
        Some(next)
    }
}

/// `now + timeout`, saturating to a far future instant when the sum is not
/// representable
fn deadline_after(now: Instant, timeout: Duration) -> Instant {
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

fn rank(state: AssociationState) -> u8 {
    match state {
        AssociationState::Idle => 0,
        AssociationState::Requesting => 1,
        AssociationState::WaitingForLinkUp => 2,
        AssociationState::WaitingForValidation => 3,
        AssociationState::Connected | AssociationState::Failed(_) | AssociationState::TimedOut => 4,
    }
}
