//! In-memory backend doubles shared by unit and integration tests.
//!
//! [`FakeConnector`] hands out [`FakeClient`] sessions that record every call
//! in a shared journal. Failures and responses are scripted on the connector
//! and apply to every session it opens afterwards.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use timod_config::{NodeAddress, TlsSettings};
use timod_protocol::Proto;

use crate::backend::{BackendClient, BackendError, Connector, ResponseOutcome, Vars};
use crate::connection::ReconfigureError;
use crate::dispatch::RequestError;
use crate::health::HealthReporter;

/// MessagePack encoding of `nil`, the default fake response.
pub const NIL_RESPONSE: &[u8] = &[0xC0];

/// A call made on a fake session, tagged with the session number.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCall {
    /// Session created by the connector.
    Open {
        /// Primary node.
        node: NodeAddress,
        /// TLS options.
        tls: Option<TlsSettings>,
        /// Operation timeout.
        timeout: Duration,
    },
    /// Failover node registered.
    AddNode(NodeAddress),
    /// Dial attempted.
    Connect,
    /// Token authentication attempted.
    AuthToken(String),
    /// Password authentication attempted.
    AuthPassword {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// Session closed.
    Close,
    /// QUERY executed.
    Query {
        /// Scope.
        scope: String,
        /// Code.
        code: String,
        /// Variables.
        vars: Option<Vars>,
    },
    /// RUN executed.
    Run {
        /// Scope.
        scope: String,
        /// Procedure name.
        name: String,
        /// Arguments.
        args: Option<rmpv::Value>,
    },
}

type Responder = Arc<dyn Fn(&ClientCall) -> ResponseOutcome + Send + Sync>;

#[derive(Clone)]
struct Script {
    connect: Option<BackendError>,
    auth: Option<BackendError>,
    latency: Duration,
    responder: Responder,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            connect: None,
            auth: None,
            latency: Duration::ZERO,
            responder: Arc::new(|_| Ok(NIL_RESPONSE.to_vec())),
        }
    }
}

#[derive(Default)]
struct Shared {
    script: Mutex<Script>,
    journal: Mutex<Vec<(usize, ClientCall)>>,
    sessions: Mutex<usize>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Connector producing recording in-memory sessions.
#[derive(Clone, Default)]
pub struct FakeConnector {
    shared: Arc<Shared>,
}

impl FakeConnector {
    /// Creates a connector whose sessions succeed and answer `nil`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes future dials fail with `error`.
    pub fn fail_connect(&self, error: BackendError) {
        self.script().connect = Some(error);
    }

    /// Makes future authentications fail with `error`.
    pub fn fail_auth(&self, error: BackendError) {
        self.script().auth = Some(error);
    }

    /// Clears scripted failures.
    pub fn succeed(&self) {
        let mut script = self.script();
        script.connect = None;
        script.auth = None;
    }

    /// Delays every QUERY and RUN by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.script().latency = latency;
    }

    /// Answers QUERY and RUN calls with `responder`.
    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&ClientCall) -> ResponseOutcome + Send + Sync + 'static,
    {
        self.script().responder = Arc::new(responder);
    }

    /// Every recorded call with the number of the session that made it.
    #[must_use]
    pub fn journal(&self) -> Vec<(usize, ClientCall)> {
        self.shared
            .journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded calls of one session.
    #[must_use]
    pub fn calls_of(&self, session: usize) -> Vec<ClientCall> {
        self.journal()
            .into_iter()
            .filter(|(id, _)| *id == session)
            .map(|(_, call)| call)
            .collect()
    }

    /// Number of sessions opened so far.
    #[must_use]
    pub fn sessions(&self) -> usize {
        *self
            .shared
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of QUERY and RUN calls that reached any session.
    #[must_use]
    pub fn operations(&self) -> usize {
        self.journal()
            .iter()
            .filter(|(_, call)| matches!(call, ClientCall::Query { .. } | ClientCall::Run { .. }))
            .count()
    }

    /// Highest number of QUERY and RUN calls seen running at the same time.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.shared.peak_in_flight.load(Ordering::SeqCst)
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.shared
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connector for FakeConnector {
    fn open(
        &self,
        primary: &NodeAddress,
        tls: Option<TlsSettings>,
        timeout: Duration,
    ) -> Box<dyn BackendClient> {
        let id = {
            let mut sessions = self
                .shared
                .sessions
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *sessions += 1;
            *sessions
        };
        let client = FakeClient {
            id,
            shared: Arc::clone(&self.shared),
            closed: AtomicBool::new(false),
        };
        client.record(ClientCall::Open {
            node: primary.clone(),
            tls,
            timeout,
        });
        Box::new(client)
    }
}

/// Session handed out by [`FakeConnector`].
pub struct FakeClient {
    id: usize,
    shared: Arc<Shared>,
    closed: AtomicBool,
}

impl FakeClient {
    fn record(&self, call: ClientCall) {
        self.shared
            .journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((self.id, call));
    }

    fn script(&self) -> Script {
        self.shared
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn answer(&self, call: ClientCall) -> ResponseOutcome {
        let script = self.script();
        self.record(call.clone());
        let running = self.shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared
            .peak_in_flight
            .fetch_max(running, Ordering::SeqCst);
        if !script.latency.is_zero() {
            thread::sleep(script.latency);
        }
        self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            return Err(BackendError::transport("operation on a closed session"));
        }
        (script.responder)(&call)
    }
}

impl BackendClient for FakeClient {
    fn add_node(&mut self, node: &NodeAddress) {
        self.record(ClientCall::AddNode(node.clone()));
    }

    fn connect(&mut self) -> Result<(), BackendError> {
        self.record(ClientCall::Connect);
        self.script().connect.map_or(Ok(()), Err)
    }

    fn auth_token(&mut self, token: &str) -> Result<(), BackendError> {
        self.record(ClientCall::AuthToken(token.to_owned()));
        self.script().auth.map_or(Ok(()), Err)
    }

    fn auth_password(&mut self, username: &str, password: &str) -> Result<(), BackendError> {
        self.record(ClientCall::AuthPassword {
            username: username.to_owned(),
            password: password.to_owned(),
        });
        self.script().auth.map_or(Ok(()), Err)
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.record(ClientCall::Close);
    }

    fn query(&self, scope: &str, code: &str, vars: Option<&Vars>) -> ResponseOutcome {
        self.answer(ClientCall::Query {
            scope: scope.to_owned(),
            code: code.to_owned(),
            vars: vars.cloned(),
        })
    }

    fn run(&self, scope: &str, name: &str, args: Option<&rmpv::Value>) -> ResponseOutcome {
        self.answer(ClientCall::Run {
            scope: scope.to_owned(),
            name: name.to_owned(),
            args: args.cloned(),
        })
    }
}

/// Reporter that records event names.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<String>>,
}

impl RecordingReporter {
    /// Recorded events in order.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, event: impl Into<String>) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.into());
    }
}

impl HealthReporter for RecordingReporter {
    fn reconfigure_starting(&self) {
        self.push("reconfigure_starting");
    }

    fn connection_ready(&self, _plan: &timod_config::ConnectionPlan) {
        self.push("connection_ready");
    }

    fn reconfigure_failed(&self, error: &ReconfigureError) {
        self.push(format!("reconfigure_failed:{}", error.stage()));
    }

    fn request_rejected(&self, pid: u16, _error: &RequestError) {
        self.push(format!("request_rejected:{pid}"));
    }

    fn unexpected_package(&self, proto: Proto) {
        self.push(format!("unexpected_package:{}", proto.as_byte()));
    }

    fn transport_failed(&self, _error: &timod_protocol::ProtocolError) {
        self.push("transport_failed");
    }

    fn module_stopping(&self) {
        self.push("module_stopping");
    }
}
