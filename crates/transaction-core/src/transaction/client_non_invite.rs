//! Client non-INVITE transaction (RFC 3261 section 17.1.2).

use std::net::SocketAddr;
use std::time::Duration;

use rtext_sip_core::{Request, Response, SipMessage};
use tracing::trace;

use crate::key::TransactionKey;
use crate::timer::{TimerSettings, TimerType};
use crate::transaction::{Action, TerminationReason, TransactionCore, TransactionState};

/// State machine: `Trying -> Proceeding -> Completed -> Terminated`.
///
/// Timer E drives request retransmission on unreliable transports
/// (doubling, capped at T2), timer F bounds the wait for a final
/// response, timer K absorbs response retransmissions after completion.
#[derive(Debug)]
pub struct ClientNonInviteTransaction {
    pub(crate) core: TransactionCore,
    /// Current timer E interval
    retransmit_interval: Duration,
    /// Timer F override; the caller may shorten the default 64*T1 wait
    final_response_timeout: Duration,
}

impl ClientNonInviteTransaction {
    pub fn new(
        key: TransactionKey,
        request: Request,
        remote: SocketAddr,
        reliable: bool,
        settings: TimerSettings,
        final_response_timeout: Option<Duration>,
    ) -> Self {
        let retransmit_interval = settings.t1;
        let final_response_timeout =
            final_response_timeout.unwrap_or_else(|| settings.transaction_timeout());
        ClientNonInviteTransaction {
            core: TransactionCore::new(
                key,
                request,
                remote,
                reliable,
                settings,
                TransactionState::Trying,
            ),
            retransmit_interval,
            final_response_timeout,
        }
    }

    /// Send the request and arm timers E (unreliable only) and F.
    pub fn start(&mut self) -> Vec<Action> {
        let mut actions = vec![Action::SendMessage(SipMessage::Request(
            self.core.request.clone(),
        ))];
        if !self.core.reliable {
            actions.push(Action::Arm(TimerType::E, self.retransmit_interval));
        }
        actions.push(Action::Arm(TimerType::F, self.final_response_timeout));
        actions
    }

    pub fn on_response(&mut self, response: Response) -> Vec<Action> {
        match self.core.state {
            TransactionState::Trying | TransactionState::Proceeding => {
                if response.is_provisional() {
                    self.core.state = TransactionState::Proceeding;
                    vec![Action::Provisional(response)]
                } else {
                    self.core.last_response = Some(response);
                    self.core.state = TransactionState::Completed;
                    let mut actions = vec![Action::Cancel(TimerType::E), Action::Cancel(TimerType::F)];
                    if self.core.reliable {
                        // K = 0 on reliable transports
                        self.core.state = TransactionState::Terminated;
                        actions.push(Action::Terminate(TerminationReason::FinalResponseReceived));
                    } else {
                        actions.push(Action::Arm(TimerType::K, self.core.settings.t4));
                    }
                    actions
                }
            }
            // Response retransmissions in Completed are absorbed
            _ => {
                trace!(id = %self.core.key, state = %self.core.state, "response absorbed");
                Vec::new()
            }
        }
    }

    pub fn on_timer(&mut self, timer: TimerType) -> Vec<Action> {
        match (timer, self.core.state) {
            (TimerType::E, TransactionState::Trying)
            | (TimerType::E, TransactionState::Proceeding) => {
                self.retransmit_interval = self
                    .core
                    .settings
                    .next_retransmit_interval(self.retransmit_interval);
                vec![
                    Action::SendMessage(SipMessage::Request(self.core.request.clone())),
                    Action::Arm(TimerType::E, self.retransmit_interval),
                ]
            }
            (TimerType::F, TransactionState::Trying)
            | (TimerType::F, TransactionState::Proceeding) => {
                self.core.state = TransactionState::Terminated;
                vec![Action::Terminate(TerminationReason::NoResponseReceived)]
            }
            (TimerType::K, TransactionState::Completed) => {
                self.core.state = TransactionState::Terminated;
                vec![Action::Terminate(TerminationReason::FinalResponseReceived)]
            }
            // Stale timer for a state already left
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::test_support::{addr, options_request, response_to};

    fn transaction(reliable: bool, timeout: Option<Duration>) -> ClientNonInviteTransaction {
        let request = options_request("z9hG4bK-cni");
        let key = TransactionKey::client(&request).unwrap();
        ClientNonInviteTransaction::new(
            key,
            request,
            addr(5060),
            reliable,
            TimerSettings::default(),
            timeout,
        )
    }

    #[test]
    fn start_sends_and_arms_e_and_f() {
        let mut tx = transaction(false, None);
        let actions = tx.start();
        assert!(matches!(actions[0], Action::SendMessage(SipMessage::Request(_))));
        assert!(matches!(actions[1], Action::Arm(TimerType::E, d) if d == Duration::from_millis(500)));
        assert!(matches!(actions[2], Action::Arm(TimerType::F, d) if d == Duration::from_secs(32)));
    }

    #[test]
    fn reliable_start_skips_timer_e() {
        let mut tx = transaction(true, None);
        let actions = tx.start();
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[1], Action::Arm(TimerType::F, _)));
    }

    #[test]
    fn timeout_override_shortens_timer_f() {
        let mut tx = transaction(true, Some(Duration::from_millis(500)));
        let actions = tx.start();
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Arm(TimerType::F, d) if *d == Duration::from_millis(500))));
    }

    #[test]
    fn provisional_moves_to_proceeding() {
        let mut tx = transaction(false, None);
        tx.start();
        let actions = tx.on_response(response_to(&tx.core.request, 100, "Trying"));
        assert_eq!(tx.core.state, TransactionState::Proceeding);
        assert!(matches!(actions[0], Action::Provisional(_)));
    }

    #[test]
    fn final_response_completes_and_arms_k() {
        let mut tx = transaction(false, None);
        tx.start();
        let actions = tx.on_response(response_to(&tx.core.request, 200, "OK"));
        assert_eq!(tx.core.state, TransactionState::Completed);
        assert!(actions.iter().any(|a| matches!(a, Action::Cancel(TimerType::E))));
        assert!(actions.iter().any(|a| matches!(a, Action::Cancel(TimerType::F))));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Arm(TimerType::K, d) if *d == Duration::from_secs(5))));
        assert_eq!(tx.core.last_response.as_ref().unwrap().status, 200);
    }

    #[test]
    fn final_response_on_reliable_terminates_immediately() {
        let mut tx = transaction(true, None);
        tx.start();
        let actions = tx.on_response(response_to(&tx.core.request, 404, "Not Found"));
        assert_eq!(tx.core.state, TransactionState::Terminated);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Terminate(TerminationReason::FinalResponseReceived))));
    }

    #[test]
    fn timer_e_retransmits_with_doubling() {
        let mut tx = transaction(false, None);
        tx.start();

        let actions = tx.on_timer(TimerType::E);
        assert!(matches!(actions[0], Action::SendMessage(_)));
        assert!(matches!(actions[1], Action::Arm(TimerType::E, d) if d == Duration::from_millis(1000)));

        let actions = tx.on_timer(TimerType::E);
        assert!(matches!(actions[1], Action::Arm(TimerType::E, d) if d == Duration::from_millis(2000)));
    }

    #[test]
    fn timer_f_terminates_with_no_response() {
        let mut tx = transaction(false, None);
        tx.start();
        let actions = tx.on_timer(TimerType::F);
        assert_eq!(tx.core.state, TransactionState::Terminated);
        assert!(matches!(actions[0], Action::Terminate(TerminationReason::NoResponseReceived)));
    }

    #[test]
    fn timer_k_terminates_after_completion() {
        let mut tx = transaction(false, None);
        tx.start();
        tx.on_response(response_to(&tx.core.request, 200, "OK"));
        let actions = tx.on_timer(TimerType::K);
        assert_eq!(tx.core.state, TransactionState::Terminated);
        assert!(matches!(actions[0], Action::Terminate(TerminationReason::FinalResponseReceived)));
    }

    #[test]
    fn retransmitted_final_is_absorbed() {
        let mut tx = transaction(false, None);
        tx.start();
        tx.on_response(response_to(&tx.core.request, 200, "OK"));
        let actions = tx.on_response(response_to(&tx.core.request, 200, "OK"));
        assert!(actions.is_empty());
    }
}
