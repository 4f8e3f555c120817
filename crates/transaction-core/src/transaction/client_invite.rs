//! Client INVITE transaction (RFC 3261 section 17.1.1).

use std::net::SocketAddr;
use std::time::Duration;

use rtext_sip_core::{Request, Response, SipMessage};
use tracing::{trace, warn};

use crate::key::TransactionKey;
use crate::timer::{TimerSettings, TimerType};
use crate::transaction::{Action, TerminationReason, TransactionCore, TransactionState};
use crate::utils::ack_for_non_2xx;

/// State machine: `Calling -> Proceeding -> Completed -> Terminated`.
///
/// A 2xx terminates the transaction immediately — its ACK is generated
/// end-to-end by the TU, outside the transaction (RFC 3261 section
/// 17.1.1.2). A 3xx-6xx is ACKed here and absorbed in Completed until
/// timer D fires.
#[derive(Debug)]
pub struct ClientInviteTransaction {
    pub(crate) core: TransactionCore,
    /// Current timer A interval; doubles without cap
    retransmit_interval: Duration,
}

impl ClientInviteTransaction {
    pub fn new(
        key: TransactionKey,
        request: Request,
        remote: SocketAddr,
        reliable: bool,
        settings: TimerSettings,
    ) -> Self {
        let retransmit_interval = settings.t1;
        ClientInviteTransaction {
            core: TransactionCore::new(
                key,
                request,
                remote,
                reliable,
                settings,
                TransactionState::Calling,
            ),
            retransmit_interval,
        }
    }

    /// Send the INVITE and arm timers A (unreliable only) and B.
    pub fn start(&mut self) -> Vec<Action> {
        let mut actions = vec![Action::SendMessage(SipMessage::Request(
            self.core.request.clone(),
        ))];
        if !self.core.reliable {
            actions.push(Action::Arm(TimerType::A, self.retransmit_interval));
        }
        actions.push(Action::Arm(
            TimerType::B,
            self.core.settings.transaction_timeout(),
        ));
        actions
    }

    pub fn on_response(&mut self, response: Response) -> Vec<Action> {
        match self.core.state {
            TransactionState::Calling | TransactionState::Proceeding => {
                if response.is_provisional() {
                    self.core.state = TransactionState::Proceeding;
                    vec![Action::Cancel(TimerType::A), Action::Provisional(response)]
                } else if response.is_success() {
                    // ACK for 2xx is end-to-end; the transaction just ends
                    self.core.last_response = Some(response);
                    self.core.state = TransactionState::Terminated;
                    vec![
                        Action::Cancel(TimerType::A),
                        Action::Cancel(TimerType::B),
                        Action::Terminate(TerminationReason::OkReceived),
                    ]
                } else {
                    self.non_2xx_final(response)
                }
            }
            TransactionState::Completed => {
                // Retransmitted final: re-ACK, stay put
                if response.is_final() && !response.is_success() {
                    self.ack_action(&response)
                } else {
                    Vec::new()
                }
            }
            _ => {
                trace!(id = %self.core.key, state = %self.core.state, "response absorbed");
                Vec::new()
            }
        }
    }

    fn non_2xx_final(&mut self, response: Response) -> Vec<Action> {
        let mut actions = vec![Action::Cancel(TimerType::A), Action::Cancel(TimerType::B)];
        actions.extend(self.ack_action(&response));
        self.core.last_response = Some(response);
        if self.core.reliable {
            // D = 0 on reliable transports
            self.core.state = TransactionState::Terminated;
            actions.push(Action::Terminate(TerminationReason::FinalResponseReceived));
        } else {
            self.core.state = TransactionState::Completed;
            actions.push(Action::Arm(TimerType::D, self.core.settings.wait_time_d));
        }
        actions
    }

    fn ack_action(&self, response: &Response) -> Vec<Action> {
        match ack_for_non_2xx(&self.core.request, response) {
            Ok(ack) => vec![Action::SendMessage(SipMessage::Request(ack))],
            Err(e) => {
                warn!(id = %self.core.key, error = %e, "could not build ACK");
                Vec::new()
            }
        }
    }

    pub fn on_timer(&mut self, timer: TimerType) -> Vec<Action> {
        match (timer, self.core.state) {
            (TimerType::A, TransactionState::Calling) => {
                self.retransmit_interval *= 2;
                vec![
                    Action::SendMessage(SipMessage::Request(self.core.request.clone())),
                    Action::Arm(TimerType::A, self.retransmit_interval),
                ]
            }
            (TimerType::B, TransactionState::Calling)
            | (TimerType::B, TransactionState::Proceeding) => {
                self.core.state = TransactionState::Terminated;
                vec![Action::Terminate(TerminationReason::NoResponseReceived)]
            }
            (TimerType::D, TransactionState::Completed) => {
                self.core.state = TransactionState::Terminated;
                vec![Action::Terminate(TerminationReason::FinalResponseReceived)]
            }
            _ => Vec::new(),
        }
    }
}
