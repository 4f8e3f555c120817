//! The transport dispatcher: owns the message channel, the transaction
//! index and the timer wheel, and runs the single dispatch loop.
//!
//! All transaction state lives inside the loop task; the public
//! [`TransactionManager`] API crosses into it over a command channel and
//! waits on reply oneshots. Inbound bytes are parsed, validated, matched
//! against the index per RFC 3261 section 17.2.3 and delivered to the
//! owning state machine; whatever matches nothing escalates to the TU as
//! a [`TransactionEvent`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use rtext_sip_core::{parse_message, Method, Request, Response, SipMessage};
use rtext_sip_transport::{ChannelEvent, MessageChannel};

use crate::error::{Error, Result};
use crate::events::{TransactionEvent, TransactionHandle, TransactionOutcome};
use crate::key::TransactionKey;
use crate::timer::{TimerSettings, TimerType, TimerWheel};
use crate::transaction::{
    Action, ClientInviteTransaction, ClientNonInviteTransaction, ServerInviteTransaction,
    ServerNonInviteTransaction, TerminationReason, Transaction, TransactionState,
};

// Dispatcher wakes up at least this often to service timers
const TICK: Duration = Duration::from_millis(100);

// Capacity of the TU event channel
const EVENT_CHANNEL_CAPACITY: usize = 100;

// Capacity of the API command channel
const COMMAND_CHANNEL_CAPACITY: usize = 32;

type TimerId = (TransactionKey, TimerType);

/// Handle to the dispatcher loop. Cheap to clone; all methods are safe
/// to call from any task.
#[derive(Clone, Debug)]
pub struct TransactionManager {
    cmd_tx: mpsc::Sender<Command>,
    local_endpoint: SocketAddr,
    reliable: bool,
}

enum Command {
    StartClientInvite {
        request: Request,
        remote: SocketAddr,
        reply: oneshot::Sender<Result<TransactionHandle>>,
    },
    StartClientNonInvite {
        request: Request,
        remote: SocketAddr,
        final_response_timeout: Option<Duration>,
        reply: oneshot::Sender<Result<TransactionHandle>>,
    },
    StartServerInvite {
        request: Request,
        remote: SocketAddr,
        initial_response: Option<Response>,
        reply: oneshot::Sender<Result<TransactionHandle>>,
    },
    StartServerNonInvite {
        request: Request,
        remote: SocketAddr,
        initial_response: Option<Response>,
        reply: oneshot::Sender<Result<TransactionHandle>>,
    },
    Respond {
        key: TransactionKey,
        response: Response,
        reply: oneshot::Sender<Result<()>>,
    },
    SendRequest {
        request: Request,
        remote: SocketAddr,
        reply: oneshot::Sender<Result<()>>,
    },
    SendResponse {
        response: Response,
        remote: SocketAddr,
        reply: oneshot::Sender<Result<()>>,
    },
    Terminate {
        key: TransactionKey,
    },
    Shutdown,
}

impl TransactionManager {
    /// Create a manager over a channel and spawn its dispatch loop.
    ///
    /// `channel_rx` is the event receiver handed out by the channel at
    /// construction. Returns the manager handle and the TU event stream.
    pub fn new(
        channel: Arc<dyn MessageChannel>,
        channel_rx: mpsc::Receiver<ChannelEvent>,
    ) -> (Self, mpsc::Receiver<TransactionEvent>) {
        Self::with_settings(channel, channel_rx, TimerSettings::default())
    }

    /// Like [`TransactionManager::new`] with explicit timer settings.
    pub fn with_settings(
        channel: Arc<dyn MessageChannel>,
        channel_rx: mpsc::Receiver<ChannelEvent>,
        settings: TimerSettings,
    ) -> (Self, mpsc::Receiver<TransactionEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let manager = TransactionManager {
            cmd_tx,
            local_endpoint: channel.local_endpoint(),
            reliable: channel.is_reliable(),
        };

        let dispatcher = Dispatcher {
            reliable: channel.is_reliable(),
            channel,
            settings,
            index: HashMap::new(),
            wheel: TimerWheel::new(),
            events_tx,
            cmd_rx,
            channel_rx,
        };
        tokio::spawn(dispatcher.run());

        (manager, events_rx)
    }

    pub fn local_endpoint(&self) -> SocketAddr {
        self.local_endpoint
    }

    pub fn is_reliable(&self) -> bool {
        self.reliable
    }

    /// Start a client INVITE transaction (RFC 3261 section 17.1.1).
    pub async fn start_client_invite(
        &self,
        request: Request,
        remote: SocketAddr,
    ) -> Result<TransactionHandle> {
        if request.method != Method::Invite {
            return Err(Error::InvalidMethod(request.method));
        }
        self.start(|reply| Command::StartClientInvite { request, remote, reply })
            .await
    }

    /// Start a client non-INVITE transaction (RFC 3261 section 17.1.2).
    ///
    /// `final_response_timeout` overrides timer F's default 64*T1 wait —
    /// internal probes typically pass something short.
    pub async fn start_client_non_invite(
        &self,
        request: Request,
        remote: SocketAddr,
        final_response_timeout: Option<Duration>,
    ) -> Result<TransactionHandle> {
        if request.method == Method::Invite || request.method == Method::Ack {
            return Err(Error::InvalidMethod(request.method));
        }
        self.start(|reply| Command::StartClientNonInvite {
            request,
            remote,
            final_response_timeout,
            reply,
        })
        .await
    }

    /// Start a server INVITE transaction for a received INVITE.
    pub async fn start_server_invite(
        &self,
        request: Request,
        remote: SocketAddr,
        initial_response: Option<Response>,
    ) -> Result<TransactionHandle> {
        if request.method != Method::Invite {
            return Err(Error::InvalidMethod(request.method));
        }
        self.start(|reply| Command::StartServerInvite {
            request,
            remote,
            initial_response,
            reply,
        })
        .await
    }

    /// Start a server non-INVITE transaction for a received request.
    pub async fn start_server_non_invite(
        &self,
        request: Request,
        remote: SocketAddr,
        initial_response: Option<Response>,
    ) -> Result<TransactionHandle> {
        if request.method == Method::Invite || request.method == Method::Ack {
            return Err(Error::InvalidMethod(request.method));
        }
        self.start(|reply| Command::StartServerNonInvite {
            request,
            remote,
            initial_response,
            reply,
        })
        .await
    }

    /// Send a response on a live server transaction.
    pub async fn respond(&self, key: &TransactionKey, response: Response) -> Result<()> {
        let (reply, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Respond {
                key: key.clone(),
                response,
                reply,
            })
            .await
            .map_err(|_| Error::ManagerShutdown)?;
        reply_rx.await.map_err(|_| Error::ManagerShutdown)?
    }

    /// Stateless convenience: serialize and send a request, no transaction.
    pub async fn send_request(&self, request: Request, remote: SocketAddr) -> Result<()> {
        let (reply, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::SendRequest { request, remote, reply })
            .await
            .map_err(|_| Error::ManagerShutdown)?;
        reply_rx.await.map_err(|_| Error::ManagerShutdown)?
    }

    /// Stateless convenience: serialize and send a response, no transaction.
    pub async fn send_response(&self, response: Response, remote: SocketAddr) -> Result<()> {
        let (reply, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::SendResponse { response, remote, reply })
            .await
            .map_err(|_| Error::ManagerShutdown)?;
        reply_rx.await.map_err(|_| Error::ManagerShutdown)?
    }

    /// Abort a live transaction; it terminates with `Cancelled`.
    pub async fn terminate(&self, key: &TransactionKey) -> Result<()> {
        self.cmd_tx
            .send(Command::Terminate { key: key.clone() })
            .await
            .map_err(|_| Error::ManagerShutdown)
    }

    /// Terminate every live transaction with `ConnectionFailure`, close
    /// the channel and stop the dispatch loop.
    pub async fn shutdown(&self) -> Result<()> {
        self.cmd_tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| Error::ManagerShutdown)
    }

    async fn start(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<TransactionHandle>>) -> Command,
    ) -> Result<TransactionHandle> {
        let (reply, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(build(reply))
            .await
            .map_err(|_| Error::ManagerShutdown)?;
        reply_rx.await.map_err(|_| Error::ManagerShutdown)?
    }
}

struct Entry {
    transaction: Transaction,
    completion: Option<oneshot::Sender<TransactionOutcome>>,
}

struct Dispatcher {
    channel: Arc<dyn MessageChannel>,
    reliable: bool,
    settings: TimerSettings,
    index: HashMap<TransactionKey, Entry>,
    wheel: TimerWheel<TimerId>,
    events_tx: mpsc::Sender<TransactionEvent>,
    cmd_rx: mpsc::Receiver<Command>,
    channel_rx: mpsc::Receiver<ChannelEvent>,
}

impl Dispatcher {
    async fn run(mut self) {
        debug!(local = %self.channel.local_endpoint(), reliable = self.reliable,
               "transaction dispatcher starting");
        loop {
            let now = Instant::now();
            let deadline = match self.wheel.next_deadline() {
                Some(d) => d.min(now + TICK),
                None => now + TICK,
            };

            let stop = tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    // All manager handles dropped
                    None => true,
                },
                event = self.channel_rx.recv() => match event {
                    Some(event) => self.handle_channel_event(event).await,
                    None => {
                        self.fail_all().await;
                        true
                    }
                },
                _ = tokio::time::sleep_until(deadline) => false,
            };

            self.drain_timers().await;

            if stop {
                break;
            }
        }
        debug!("transaction dispatcher stopped");
    }

    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::StartClientInvite { request, remote, reply } => {
                let result = self
                    .start_transaction(request.clone(), |key, settings, reliable| {
                        Transaction::ClientInvite(ClientInviteTransaction::new(
                            key, request, remote, reliable, settings,
                        ))
                    }, false)
                    .await;
                let _ = reply.send(result);
            }
            Command::StartClientNonInvite {
                request,
                remote,
                final_response_timeout,
                reply,
            } => {
                let result = self
                    .start_transaction(request.clone(), |key, settings, reliable| {
                        Transaction::ClientNonInvite(ClientNonInviteTransaction::new(
                            key,
                            request,
                            remote,
                            reliable,
                            settings,
                            final_response_timeout,
                        ))
                    }, false)
                    .await;
                let _ = reply.send(result);
            }
            Command::StartServerInvite {
                request,
                remote,
                initial_response,
                reply,
            } => {
                let result = self
                    .start_transaction(request.clone(), |key, settings, reliable| {
                        Transaction::ServerInvite(ServerInviteTransaction::new(
                            key,
                            request,
                            remote,
                            reliable,
                            settings,
                            initial_response,
                        ))
                    }, true)
                    .await;
                let _ = reply.send(result);
            }
            Command::StartServerNonInvite {
                request,
                remote,
                initial_response,
                reply,
            } => {
                let result = self
                    .start_transaction(request.clone(), |key, settings, reliable| {
                        Transaction::ServerNonInvite(ServerNonInviteTransaction::new(
                            key,
                            request,
                            remote,
                            reliable,
                            settings,
                            initial_response,
                        ))
                    }, true)
                    .await;
                let _ = reply.send(result);
            }
            Command::Respond { key, response, reply } => {
                let _ = reply.send(self.respond(&key, response).await);
            }
            Command::SendRequest { request, remote, reply } => {
                let result = self.send_raw(remote, request.to_bytes()).await;
                let _ = reply.send(result);
            }
            Command::SendResponse { response, remote, reply } => {
                let result = self.send_raw(remote, response.to_bytes()).await;
                let _ = reply.send(result);
            }
            Command::Terminate { key } => {
                if let Some(entry) = self.index.get_mut(&key) {
                    let actions = entry.transaction.on_abort();
                    self.execute_actions(&key, actions).await;
                }
            }
            Command::Shutdown => {
                self.fail_all().await;
                self.channel.close().await;
                return true;
            }
        }
        false
    }

    async fn start_transaction(
        &mut self,
        request: Request,
        build: impl FnOnce(TransactionKey, TimerSettings, bool) -> Transaction,
        server: bool,
    ) -> Result<TransactionHandle> {
        let key = if server {
            TransactionKey::server(&request)?
        } else {
            TransactionKey::client(&request)?
        };
        if self.index.contains_key(&key) {
            return Err(Error::DuplicateTransaction(key));
        }

        let mut transaction = build(key.clone(), self.settings.clone(), self.reliable);
        debug!(id = %key, kind = %transaction.kind(), "transaction created");
        let actions = transaction.start();

        let (completion_tx, completion_rx) = oneshot::channel();
        self.index.insert(
            key.clone(),
            Entry {
                transaction,
                completion: Some(completion_tx),
            },
        );
        self.execute_actions(&key, actions).await;

        Ok(TransactionHandle {
            key,
            completion: completion_rx,
        })
    }

    async fn respond(&mut self, key: &TransactionKey, response: Response) -> Result<()> {
        let entry = self
            .index
            .get_mut(key)
            .ok_or_else(|| Error::TransactionNotFound(key.clone()))?;
        let previous_state = entry.transaction.state();
        let actions = entry.transaction.on_send_response(response)?;
        let new_state = entry.transaction.state();
        self.emit_state_change(key, previous_state, new_state).await;
        self.execute_actions(key, actions).await;
        Ok(())
    }

    async fn handle_channel_event(&mut self, event: ChannelEvent) -> bool {
        match event {
            ChannelEvent::MessageReceived { source, bytes } => {
                self.handle_inbound(source, bytes).await;
                false
            }
            ChannelEvent::Closed => {
                debug!("channel closed; terminating all live transactions");
                self.fail_all().await;
                let _ = self.events_tx.send(TransactionEvent::ChannelClosed).await;
                true
            }
            ChannelEvent::Error(error) => {
                warn!(error = %error, "channel reported error");
                false
            }
        }
    }

    async fn handle_inbound(&mut self, source: SocketAddr, bytes: Bytes) {
        let message = match parse_message(&bytes) {
            Ok(message) => message,
            Err(error) => {
                warn!(%source, %error, "dropping malformed message");
                return;
            }
        };
        debug!(%source, message = %message, "received message");
        if !message.is_valid() {
            warn!(%source, message = %message, "dropping invalid message");
            return;
        }

        match message {
            SipMessage::Response(response) => self.route_response(response, source).await,
            SipMessage::Request(request) => self.route_request(request, source).await,
        }
    }

    async fn route_response(&mut self, response: Response, source: SocketAddr) {
        let key = match TransactionKey::for_response(&response) {
            Ok(key) => key,
            Err(error) => {
                warn!(%source, %error, "response without transaction key");
                return;
            }
        };
        if self.index.contains_key(&key) {
            self.deliver(&key, SipMessage::Response(response)).await;
        } else {
            trace!(id = %key, "no matching client transaction");
            let _ = self
                .events_tx
                .send(TransactionEvent::ResponseReceived { response, source })
                .await;
        }
    }

    async fn route_request(&mut self, request: Request, source: SocketAddr) {
        let key = match TransactionKey::server(&request) {
            Ok(key) => key,
            Err(error) => {
                warn!(%source, %error, "request without transaction key");
                return;
            }
        };

        match request.method {
            Method::Ack => {
                // ACK to a non-2xx matches the INVITE server transaction;
                // ACK to a 2xx is end-to-end and escalates to the TU
                let invite_key = key.with_method(Method::Invite);
                if self.index.contains_key(&invite_key) {
                    let _ = self
                        .events_tx
                        .send(TransactionEvent::AckReceived {
                            key: invite_key.clone(),
                            request: request.clone(),
                        })
                        .await;
                    self.deliver(&invite_key, SipMessage::Request(request)).await;
                } else {
                    let _ = self
                        .events_tx
                        .send(TransactionEvent::RequestReceived { request, source })
                        .await;
                }
            }
            Method::Cancel => {
                // A retransmitted CANCEL matches its own server transaction;
                // a first CANCEL matches the INVITE it cancels
                if self.index.contains_key(&key) {
                    self.deliver(&key, SipMessage::Request(request)).await;
                    return;
                }
                let invite_key = key.with_method(Method::Invite);
                if self.index.contains_key(&invite_key) {
                    let _ = self
                        .events_tx
                        .send(TransactionEvent::CancelReceived {
                            key: invite_key,
                            cancel: request,
                            source,
                        })
                        .await;
                } else {
                    let _ = self
                        .events_tx
                        .send(TransactionEvent::RequestReceived { request, source })
                        .await;
                }
            }
            _ => {
                if self.index.contains_key(&key) {
                    // Retransmission of the transaction-creating request
                    self.deliver(&key, SipMessage::Request(request)).await;
                } else {
                    let _ = self
                        .events_tx
                        .send(TransactionEvent::RequestReceived { request, source })
                        .await;
                }
            }
        }
    }

    async fn deliver(&mut self, key: &TransactionKey, message: SipMessage) {
        let Some(entry) = self.index.get_mut(key) else {
            return;
        };
        let previous_state = entry.transaction.state();
        let actions = entry.transaction.on_message(message);
        let new_state = entry.transaction.state();
        self.emit_state_change(key, previous_state, new_state).await;
        self.execute_actions(key, actions).await;
    }

    async fn drain_timers(&mut self) {
        let due = self.wheel.pop_due(Instant::now());
        for (key, timer) in due {
            let Some(entry) = self.index.get_mut(&key) else {
                continue;
            };
            trace!(id = %key, timer = %timer, "timer fired");
            let previous_state = entry.transaction.state();
            let actions = entry.transaction.on_timer(timer);
            let new_state = entry.transaction.state();
            self.emit_state_change(&key, previous_state, new_state).await;
            self.execute_actions(&key, actions).await;
        }
    }

    async fn execute_actions(&mut self, key: &TransactionKey, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::SendMessage(message) => {
                    let Some(entry) = self.index.get(key) else {
                        break;
                    };
                    let remote = entry.transaction.remote();
                    debug!(id = %key, %remote, message = %message, "sending message");
                    if let Err(error) = self.channel.send(remote, message.to_bytes()).await {
                        warn!(id = %key, %error, "send failed");
                        self.on_send_failure(key).await;
                        break;
                    }
                }
                Action::Arm(timer, delay) => {
                    self.wheel.arm((key.clone(), timer), delay);
                }
                Action::Cancel(timer) => {
                    self.wheel.cancel(&(key.clone(), timer));
                }
                Action::Provisional(response) => {
                    let _ = self
                        .events_tx
                        .send(TransactionEvent::ProvisionalReceived {
                            key: key.clone(),
                            response,
                        })
                        .await;
                }
                Action::Terminate(reason) => {
                    self.finish(key, reason).await;
                    break;
                }
            }
        }
    }

    /// A send on this transaction's behalf failed: client transactions
    /// terminate with `ConnectionFailure`, server transactions are torn
    /// down without escalation.
    async fn on_send_failure(&mut self, key: &TransactionKey) {
        let Some(entry) = self.index.get_mut(key) else {
            return;
        };
        let previous_state = entry.transaction.state();
        let actions = entry.transaction.on_transport_error();
        let new_state = entry.transaction.state();
        self.emit_state_change(key, previous_state, new_state).await;
        // The only action is Terminate(ConnectionFailure); execute it
        // directly to avoid re-entering the send path
        for action in actions {
            if let Action::Terminate(reason) = action {
                self.finish(key, reason).await;
            }
        }
    }

    /// Remove a terminated transaction from the index, cancel its timers
    /// and resolve its completion handle.
    async fn finish(&mut self, key: &TransactionKey, reason: TerminationReason) {
        self.wheel.cancel_where(|(k, _)| k == key);
        let Some(mut entry) = self.index.remove(key) else {
            return;
        };
        let final_response = entry.transaction.last_response().cloned();
        debug!(id = %key, %reason, "transaction terminated");
        if let Some(completion) = entry.completion.take() {
            let _ = completion.send(TransactionOutcome {
                reason,
                final_response: final_response.clone(),
            });
        }
        let _ = self
            .events_tx
            .send(TransactionEvent::TransactionTerminated {
                key: key.clone(),
                reason,
                final_response,
            })
            .await;
    }

    /// Terminate every live transaction with `ConnectionFailure`.
    async fn fail_all(&mut self) {
        let keys: Vec<TransactionKey> = self.index.keys().cloned().collect();
        for key in keys {
            if let Some(entry) = self.index.get_mut(&key) {
                let previous_state = entry.transaction.state();
                let actions = entry.transaction.on_transport_error();
                let new_state = entry.transaction.state();
                self.emit_state_change(&key, previous_state, new_state).await;
                for action in actions {
                    if let Action::Terminate(reason) = action {
                        self.finish(&key, reason).await;
                    }
                }
            }
        }
    }

    async fn emit_state_change(
        &mut self,
        key: &TransactionKey,
        previous_state: TransactionState,
        new_state: TransactionState,
    ) {
        if previous_state != new_state {
            trace!(id = %key, from = %previous_state, to = %new_state, "state changed");
            let _ = self
                .events_tx
                .send(TransactionEvent::StateChanged {
                    key: key.clone(),
                    previous_state,
                    new_state,
                })
                .await;
        }
    }

    async fn send_raw(&mut self, remote: SocketAddr, bytes: Bytes) -> Result<()> {
        debug!(%remote, len = bytes.len(), "stateless send");
        self.channel.send(remote, bytes).await?;
        Ok(())
    }
}
