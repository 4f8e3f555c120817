//! Server INVITE transaction (RFC 3261 section 17.2.1).

use std::net::SocketAddr;
use std::time::Duration;

use rtext_sip_core::{Method, Request, Response, SipMessage};
use tracing::trace;

use crate::error::{Error, Result};
use crate::key::TransactionKey;
use crate::timer::{TimerSettings, TimerType};
use crate::transaction::{Action, TerminationReason, TransactionCore, TransactionState};

/// State machine: `Proceeding -> Completed -> Confirmed -> Terminated`.
///
/// A 2xx final response terminates immediately (its ACK is end-to-end);
/// a 3xx-6xx is retransmitted by timer G until the ACK arrives or timer
/// H gives up. Timer I absorbs ACK retransmissions in Confirmed.
#[derive(Debug)]
pub struct ServerInviteTransaction {
    pub(crate) core: TransactionCore,
    /// Response the dispatcher sends at start (typically 100 Trying)
    initial_response: Option<Response>,
    /// Current timer G interval
    retransmit_interval: Duration,
}

impl ServerInviteTransaction {
    pub fn new(
        key: TransactionKey,
        request: Request,
        remote: SocketAddr,
        reliable: bool,
        settings: TimerSettings,
        initial_response: Option<Response>,
    ) -> Self {
        let retransmit_interval = settings.t1;
        ServerInviteTransaction {
            core: TransactionCore::new(
                key,
                request,
                remote,
                reliable,
                settings,
                TransactionState::Proceeding,
            ),
            initial_response,
            retransmit_interval,
        }
    }

    /// Send the initial response, if one was supplied.
    pub fn start(&mut self) -> Vec<Action> {
        match self.initial_response.take() {
            Some(response) => match self.apply_response(response) {
                Ok(actions) => actions,
                Err(_) => Vec::new(),
            },
            None => Vec::new(),
        }
    }

    /// An incoming request matched to this transaction: either a
    /// retransmitted INVITE or the ACK for a non-2xx final response.
    pub fn on_request(&mut self, request: Request) -> Vec<Action> {
        if request.method == Method::Ack {
            return self.on_ack();
        }
        match self.core.state {
            TransactionState::Proceeding | TransactionState::Completed => {
                match &self.core.last_response {
                    Some(response) => {
                        trace!(id = %self.core.key, status = response.status,
                               "retransmitting response for repeated INVITE");
                        vec![Action::SendMessage(SipMessage::Response(response.clone()))]
                    }
                    None => Vec::new(),
                }
            }
            _ => Vec::new(),
        }
    }

    fn on_ack(&mut self) -> Vec<Action> {
        match self.core.state {
            TransactionState::Completed => {
                let mut actions = vec![Action::Cancel(TimerType::G), Action::Cancel(TimerType::H)];
                if self.core.reliable {
                    // I = 0 on reliable transports
                    self.core.state = TransactionState::Terminated;
                    actions.push(Action::Terminate(TerminationReason::FinalResponseSent));
                } else {
                    self.core.state = TransactionState::Confirmed;
                    actions.push(Action::Arm(TimerType::I, self.core.settings.t4));
                }
                actions
            }
            // Duplicate ACKs in Confirmed are absorbed
            _ => Vec::new(),
        }
    }

    /// TU-supplied response (additional 1xx or the final response).
    pub fn on_send_response(&mut self, response: Response) -> Result<Vec<Action>> {
        match self.core.state {
            TransactionState::Proceeding => self.apply_response(response),
            state => Err(Error::InvalidStateForResponse {
                state,
                status: response.status,
            }),
        }
    }

    fn apply_response(&mut self, response: Response) -> Result<Vec<Action>> {
        let status = response.status;
        let mut actions = vec![Action::SendMessage(SipMessage::Response(response.clone()))];
        self.core.last_response = Some(response);

        if status < 200 {
            // Stay in Proceeding
        } else if (200..300).contains(&status) {
            // 2xx: the ACK is end-to-end, not absorbed here
            self.core.state = TransactionState::Terminated;
            actions.push(Action::Terminate(TerminationReason::FinalResponseSent));
        } else {
            self.core.state = TransactionState::Completed;
            if !self.core.reliable {
                actions.push(Action::Arm(TimerType::G, self.retransmit_interval));
            }
            actions.push(Action::Arm(
                TimerType::H,
                self.core.settings.transaction_timeout(),
            ));
        }
        Ok(actions)
    }

    pub fn on_timer(&mut self, timer: TimerType) -> Vec<Action> {
        match (timer, self.core.state) {
            (TimerType::G, TransactionState::Completed) => {
                self.retransmit_interval = self
                    .core
                    .settings
                    .next_retransmit_interval(self.retransmit_interval);
                match &self.core.last_response {
                    Some(response) => vec![
                        Action::SendMessage(SipMessage::Response(response.clone())),
                        Action::Arm(TimerType::G, self.retransmit_interval),
                    ],
                    None => Vec::new(),
                }
            }
            (TimerType::H, TransactionState::Completed) => {
                self.core.state = TransactionState::Terminated;
                vec![Action::Terminate(TerminationReason::AckNotReceived)]
            }
            (TimerType::I, TransactionState::Confirmed) => {
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
    use crate::transaction::test_support::{addr, invite_request, response_to};
    use crate::utils::ack_for_non_2xx;

    fn transaction(reliable: bool, initial: Option<Response>) -> ServerInviteTransaction {
        let request = invite_request("z9hG4bK-si");
        let key = TransactionKey::server(&request).unwrap();
        ServerInviteTransaction::new(
            key,
            request,
            addr(5060),
            reliable,
            TimerSettings::default(),
            initial,
        )
    }

    #[test]
    fn starts_in_proceeding_with_trying_sent() {
        let request = invite_request("z9hG4bK-si");
        let trying = response_to(&request, 100, "Trying");
        let mut tx = transaction(false, Some(trying));
        let actions = tx.start();
        assert_eq!(tx.core.state, TransactionState::Proceeding);
        assert!(matches!(
            &actions[0],
            Action::SendMessage(SipMessage::Response(resp)) if resp.status == 100
        ));
    }

    #[test]
    fn repeated_invite_gets_last_response() {
        let request = invite_request("z9hG4bK-si");
        let trying = response_to(&request, 100, "Trying");
        let mut tx = transaction(false, Some(trying));
        tx.start();

        let actions = tx.on_request(invite_request("z9hG4bK-si"));
        assert!(matches!(
            &actions[0],
            Action::SendMessage(SipMessage::Response(resp)) if resp.status == 100
        ));
    }

    #[test]
    fn ok_terminates_immediately() {
        let request = invite_request("z9hG4bK-si");
        let mut tx = transaction(false, Some(response_to(&request, 100, "Trying")));
        tx.start();

        let actions = tx.on_send_response(response_to(&request, 200, "OK")).unwrap();
        assert_eq!(tx.core.state, TransactionState::Terminated);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Terminate(TerminationReason::FinalResponseSent))));
    }

    #[test]
    fn rejection_arms_g_and_h() {
        let request = invite_request("z9hG4bK-si");
        let mut tx = transaction(false, Some(response_to(&request, 100, "Trying")));
        tx.start();

        let actions = tx
            .on_send_response(response_to(&request, 486, "Busy Here"))
            .unwrap();
        assert_eq!(tx.core.state, TransactionState::Completed);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Arm(TimerType::G, d) if *d == Duration::from_millis(500))));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Arm(TimerType::H, d) if *d == Duration::from_secs(32))));
    }

    #[test]
    fn timer_g_retransmits_final_with_doubling() {
        let request = invite_request("z9hG4bK-si");
        let mut tx = transaction(false, Some(response_to(&request, 100, "Trying")));
        tx.start();
        tx.on_send_response(response_to(&request, 486, "Busy Here")).unwrap();

        let actions = tx.on_timer(TimerType::G);
        assert!(matches!(
            &actions[0],
            Action::SendMessage(SipMessage::Response(resp)) if resp.status == 486
        ));
        assert!(matches!(actions[1], Action::Arm(TimerType::G, d) if d == Duration::from_millis(1000)));
    }

    #[test]
    fn ack_confirms_and_arms_i() {
        let request = invite_request("z9hG4bK-si");
        let mut tx = transaction(false, Some(response_to(&request, 100, "Trying")));
        tx.start();
        let rejection = response_to(&request, 486, "Busy Here");
        tx.on_send_response(rejection.clone()).unwrap();

        let ack = ack_for_non_2xx(&request, &rejection).unwrap();
        let actions = tx.on_request(ack);
        assert_eq!(tx.core.state, TransactionState::Confirmed);
        assert!(actions.iter().any(|a| matches!(a, Action::Cancel(TimerType::G))));
        assert!(actions.iter().any(|a| matches!(a, Action::Cancel(TimerType::H))));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Arm(TimerType::I, d) if *d == Duration::from_secs(5))));
    }

    #[test]
    fn ack_on_reliable_terminates() {
        let request = invite_request("z9hG4bK-si");
        let mut tx = transaction(true, Some(response_to(&request, 100, "Trying")));
        tx.start();
        let rejection = response_to(&request, 486, "Busy Here");
        tx.on_send_response(rejection.clone()).unwrap();

        let ack = ack_for_non_2xx(&request, &rejection).unwrap();
        let actions = tx.on_request(ack);
        assert_eq!(tx.core.state, TransactionState::Terminated);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Terminate(TerminationReason::FinalResponseSent))));
    }

    #[test]
    fn timer_h_gives_up_waiting_for_ack() {
        let request = invite_request("z9hG4bK-si");
        let mut tx = transaction(false, Some(response_to(&request, 100, "Trying")));
        tx.start();
        tx.on_send_response(response_to(&request, 486, "Busy Here")).unwrap();

        let actions = tx.on_timer(TimerType::H);
        assert_eq!(tx.core.state, TransactionState::Terminated);
        assert!(matches!(actions[0], Action::Terminate(TerminationReason::AckNotReceived)));
    }

    #[test]
    fn timer_i_ends_confirmed() {
        let request = invite_request("z9hG4bK-si");
        let mut tx = transaction(false, Some(response_to(&request, 100, "Trying")));
        tx.start();
        let rejection = response_to(&request, 486, "Busy Here");
        tx.on_send_response(rejection.clone()).unwrap();
        tx.on_request(ack_for_non_2xx(&request, &rejection).unwrap());

        let actions = tx.on_timer(TimerType::I);
        assert_eq!(tx.core.state, TransactionState::Terminated);
        assert!(matches!(actions[0], Action::Terminate(TerminationReason::FinalResponseSent)));
    }

    #[test]
    fn response_in_completed_is_rejected() {
        let request = invite_request("z9hG4bK-si");
        let mut tx = transaction(false, Some(response_to(&request, 100, "Trying")));
        tx.start();
        tx.on_send_response(response_to(&request, 486, "Busy Here")).unwrap();

        let result = tx.on_send_response(response_to(&request, 500, "Server Error"));
        assert!(matches!(result, Err(Error::InvalidStateForResponse { .. })));
    }
}
