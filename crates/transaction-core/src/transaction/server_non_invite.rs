//! Server non-INVITE transaction (RFC 3261 section 17.2.2).

use std::net::SocketAddr;

use rtext_sip_core::{Request, Response, SipMessage};
use tracing::trace;

use crate::error::{Error, Result};
use crate::key::TransactionKey;
use crate::timer::{TimerSettings, TimerType};
use crate::transaction::{Action, TerminationReason, TransactionCore, TransactionState};

/// State machine: `Trying -> Proceeding -> Completed -> Terminated`.
///
/// Request retransmissions are answered with the most recent response;
/// timer J absorbs them after the final response on unreliable
/// transports.
#[derive(Debug)]
pub struct ServerNonInviteTransaction {
    pub(crate) core: TransactionCore,
    /// Response the dispatcher sends at start, if any
    initial_response: Option<Response>,
}

impl ServerNonInviteTransaction {
    pub fn new(
        key: TransactionKey,
        request: Request,
        remote: SocketAddr,
        reliable: bool,
        settings: TimerSettings,
        initial_response: Option<Response>,
    ) -> Self {
        ServerNonInviteTransaction {
            core: TransactionCore::new(
                key,
                request,
                remote,
                reliable,
                settings,
                TransactionState::Trying,
            ),
            initial_response,
        }
    }

    /// Send the initial response, if one was supplied.
    pub fn start(&mut self) -> Vec<Action> {
        match self.initial_response.take() {
            Some(response) => self.apply_response(response),
            None => Vec::new(),
        }
    }

    /// A retransmission of the original request.
    pub fn on_request(&mut self, _request: Request) -> Vec<Action> {
        match self.core.state {
            // Nothing sent yet, nothing to retransmit
            TransactionState::Trying => Vec::new(),
            TransactionState::Proceeding | TransactionState::Completed => {
                match &self.core.last_response {
                    Some(response) => {
                        trace!(id = %self.core.key, status = response.status,
                               "retransmitting response for repeated request");
                        vec![Action::SendMessage(SipMessage::Response(response.clone()))]
                    }
                    None => Vec::new(),
                }
            }
            _ => Vec::new(),
        }
    }

    /// TU-supplied response.
    pub fn on_send_response(&mut self, response: Response) -> Result<Vec<Action>> {
        match self.core.state {
            TransactionState::Trying | TransactionState::Proceeding => {
                Ok(self.apply_response(response))
            }
            state => Err(Error::InvalidStateForResponse {
                state,
                status: response.status,
            }),
        }
    }

    fn apply_response(&mut self, response: Response) -> Vec<Action> {
        let is_final = response.is_final();
        let mut actions = vec![Action::SendMessage(SipMessage::Response(response.clone()))];
        self.core.last_response = Some(response);
        if is_final {
            self.core.state = TransactionState::Completed;
            if self.core.reliable {
                // J = 0 on reliable transports
                self.core.state = TransactionState::Terminated;
                actions.push(Action::Terminate(TerminationReason::FinalResponseSent));
            } else {
                actions.push(Action::Arm(
                    TimerType::J,
                    self.core.settings.transaction_timeout(),
                ));
            }
        } else {
            self.core.state = TransactionState::Proceeding;
        }
        actions
    }

    pub fn on_timer(&mut self, timer: TimerType) -> Vec<Action> {
        match (timer, self.core.state) {
            (TimerType::J, TransactionState::Completed) => {
                self.core.state = TransactionState::Terminated;
                vec![Action::Terminate(TerminationReason::FinalResponseSent)]
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::transaction::test_support::{addr, options_request, response_to};

    fn transaction(reliable: bool, initial: Option<Response>) -> ServerNonInviteTransaction {
        let request = options_request("z9hG4bK-sni");
        let key = TransactionKey::server(&request).unwrap();
        ServerNonInviteTransaction::new(
            key,
            request,
            addr(5060),
            reliable,
            TimerSettings::default(),
            initial,
        )
    }

    #[test]
    fn starts_quiet_without_initial_response() {
        let mut tx = transaction(false, None);
        assert!(tx.start().is_empty());
        assert_eq!(tx.core.state, TransactionState::Trying);
    }

    #[test]
    fn initial_provisional_enters_proceeding() {
        let request = options_request("z9hG4bK-sni");
        let provisional = response_to(&request, 100, "Trying");
        let mut tx = transaction(false, Some(provisional));
        let actions = tx.start();
        assert!(matches!(actions[0], Action::SendMessage(SipMessage::Response(_))));
        assert_eq!(tx.core.state, TransactionState::Proceeding);
    }

    #[test]
    fn initial_final_completes_and_arms_j() {
        let request = options_request("z9hG4bK-sni");
        let ok = response_to(&request, 200, "OK");
        let mut tx = transaction(false, Some(ok));
        let actions = tx.start();
        assert_eq!(tx.core.state, TransactionState::Completed);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Arm(TimerType::J, d) if *d == Duration::from_secs(32))));
    }

    #[test]
    fn final_on_reliable_terminates_immediately() {
        let request = options_request("z9hG4bK-sni");
        let ok = response_to(&request, 200, "OK");
        let mut tx = transaction(true, Some(ok));
        let actions = tx.start();
        assert_eq!(tx.core.state, TransactionState::Terminated);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Terminate(TerminationReason::FinalResponseSent))));
    }

    #[test]
    fn repeated_request_gets_latest_response() {
        let request = options_request("z9hG4bK-sni");
        let provisional = response_to(&request, 100, "Trying");
        let mut tx = transaction(false, Some(provisional));
        tx.start();

        let actions = tx.on_request(options_request("z9hG4bK-sni"));
        assert!(matches!(
            &actions[0],
            Action::SendMessage(SipMessage::Response(resp)) if resp.status == 100
        ));

        tx.on_send_response(response_to(&request, 486, "Busy Here")).unwrap();
        let actions = tx.on_request(options_request("z9hG4bK-sni"));
        assert!(matches!(
            &actions[0],
            Action::SendMessage(SipMessage::Response(resp)) if resp.status == 486
        ));
    }

    #[test]
    fn response_after_completion_is_an_error() {
        let request = options_request("z9hG4bK-sni");
        let ok = response_to(&request, 200, "OK");
        let mut tx = transaction(false, Some(ok));
        tx.start();
        let result = tx.on_send_response(response_to(&request, 500, "Server Error"));
        assert!(matches!(result, Err(Error::InvalidStateForResponse { .. })));
    }

    #[test]
    fn timer_j_terminates() {
        let request = options_request("z9hG4bK-sni");
        let ok = response_to(&request, 200, "OK");
        let mut tx = transaction(false, Some(ok));
        tx.start();
        let actions = tx.on_timer(TimerType::J);
        assert_eq!(tx.core.state, TransactionState::Terminated);
        assert!(matches!(actions[0], Action::Terminate(TerminationReason::FinalResponseSent)));
    }
}
