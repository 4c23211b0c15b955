//! Unit tests for the connection manager.

use std::time::Duration;

use mockall::mock;
use rstest::{fixture, rstest};
use timod_config::{ConfigError, NodeConfig, Secret, TlsSettings};

use super::*;
use crate::backend::BackendError;
use crate::test_support::{ClientCall, FakeConnector, RecordingReporter};

mock! {
    Opener {}
    impl Connector for Opener {
        fn open(
            &self,
            primary: &timod_config::NodeAddress,
            tls: Option<TlsSettings>,
            timeout: Duration,
        ) -> Box<dyn BackendClient>;
    }
}

struct Harness {
    connector: FakeConnector,
    reporter: Arc<RecordingReporter>,
    manager: ConnectionManager,
}

#[fixture]
fn harness() -> Harness {
    let connector = FakeConnector::new();
    let reporter = Arc::new(RecordingReporter::default());
    let manager = ConnectionManager::new(Arc::new(connector.clone()), reporter.clone());
    Harness {
        connector,
        reporter,
        manager,
    }
}

fn password_config() -> ModuleConfig {
    ModuleConfig {
        host: Some(String::from("db")),
        username: Some(String::from("admin")),
        password: Some(Secret::new("x")),
        ..ModuleConfig::default()
    }
}

fn token_config() -> ModuleConfig {
    ModuleConfig {
        host: Some(String::from("db")),
        token: Some(Secret::new("tok")),
        ..ModuleConfig::default()
    }
}

#[rstest]
fn starts_unconfigured(harness: Harness) {
    assert!(!harness.manager.is_configured());
    assert!(harness.manager.with_connection(|_| ()).is_none());
}

#[rstest]
fn password_configuration_dials_and_authenticates(harness: Harness) {
    harness
        .manager
        .reconfigure(&password_config())
        .expect("reconfigure");

    assert!(harness.manager.is_configured());
    assert_eq!(
        harness.connector.calls_of(1),
        vec![
            ClientCall::Open {
                node: timod_config::NodeAddress::new("db", 9200),
                tls: None,
                timeout: Duration::from_secs(10),
            },
            ClientCall::Connect,
            ClientCall::AuthPassword {
                username: String::from("admin"),
                password: String::from("x"),
            },
        ]
    );
    assert_eq!(
        harness.reporter.events(),
        vec!["reconfigure_starting", "connection_ready"]
    );
}

#[rstest]
fn token_configuration_uses_token_auth(harness: Harness) {
    harness
        .manager
        .reconfigure(&token_config())
        .expect("reconfigure");

    assert!(
        harness
            .connector
            .calls_of(1)
            .contains(&ClientCall::AuthToken(String::from("tok")))
    );
}

#[rstest]
fn registers_extra_nodes_in_order_before_dialing(harness: Harness) {
    let config = ModuleConfig {
        use_tls: Some(true),
        skip_verify: Some(true),
        timeout: Some(2),
        nodes: Some(vec![
            NodeConfig {
                host: String::from("n1"),
                port: Some(9201),
            },
            NodeConfig {
                host: String::from("n2"),
                port: None,
            },
        ]),
        ..password_config()
    };
    harness.manager.reconfigure(&config).expect("reconfigure");

    let calls = harness.connector.calls_of(1);
    assert_eq!(
        calls.first(),
        Some(&ClientCall::Open {
            node: timod_config::NodeAddress::new("db", 9200),
            tls: Some(TlsSettings { skip_verify: true }),
            timeout: Duration::from_secs(2),
        })
    );
    assert_eq!(
        calls.get(1..4),
        Some(
            &[
                ClientCall::AddNode(timod_config::NodeAddress::new("n1", 9201)),
                ClientCall::AddNode(timod_config::NodeAddress::new("n2", 9200)),
                ClientCall::Connect,
            ][..]
        )
    );
}

#[rstest]
fn invalid_configuration_keeps_current_connection(harness: Harness) {
    harness
        .manager
        .reconfigure(&password_config())
        .expect("reconfigure");

    let both = ModuleConfig {
        token: Some(Secret::new("tok")),
        ..password_config()
    };
    let error = harness.manager.reconfigure(&both).expect_err("rejected");

    assert_eq!(
        error,
        ReconfigureError::Invalid(ConfigError::AmbiguousCredentials)
    );
    assert!(harness.manager.is_configured());
    assert_eq!(harness.connector.sessions(), 1);
    assert!(!harness.connector.calls_of(1).contains(&ClientCall::Close));
}

#[rstest]
fn username_without_password_is_rejected(harness: Harness) {
    let config = ModuleConfig {
        password: None,
        ..password_config()
    };
    let error = harness.manager.reconfigure(&config).expect_err("rejected");
    assert_eq!(error, ReconfigureError::Invalid(ConfigError::MissingPassword));
    assert!(!harness.manager.is_configured());
}

#[test]
fn invalid_configuration_never_opens_a_session() {
    let mut connector = MockOpener::new();
    connector.expect_open().never();
    let manager = ConnectionManager::new(
        Arc::new(connector),
        Arc::new(RecordingReporter::default()),
    );

    let result = manager.reconfigure(&ModuleConfig {
        host: Some(String::from("db")),
        ..ModuleConfig::default()
    });
    assert!(matches!(
        result,
        Err(ReconfigureError::Invalid(ConfigError::MissingCredentials))
    ));
}

#[test]
fn connector_receives_resolved_plan() {
    let fake = FakeConnector::new();
    let mut connector = MockOpener::new();
    connector
        .expect_open()
        .withf(|primary, tls, timeout| {
            primary.host() == "db"
                && primary.port() == 9300
                && tls.is_none()
                && *timeout == Duration::from_secs(10)
        })
        .times(1)
        .returning(move |primary, tls, timeout| fake.open(primary, tls, timeout));
    let manager = ConnectionManager::new(
        Arc::new(connector),
        Arc::new(RecordingReporter::default()),
    );

    manager
        .reconfigure(&ModuleConfig {
            port: Some(9300),
            ..token_config()
        })
        .expect("reconfigure");
}

#[rstest]
fn successful_reconfigure_closes_previous_connection_first(harness: Harness) {
    harness
        .manager
        .reconfigure(&password_config())
        .expect("first");
    harness.manager.reconfigure(&token_config()).expect("second");

    let journal = harness.connector.journal();
    let closed_first = journal
        .iter()
        .position(|entry| *entry == (1, ClientCall::Close))
        .expect("first session closed");
    let second_dial = journal
        .iter()
        .position(|entry| *entry == (2, ClientCall::Connect))
        .expect("second session dialled");
    assert!(closed_first < second_dial);
    assert!(harness.manager.is_configured());
}

#[rstest]
fn dial_failure_leaves_manager_unconfigured(harness: Harness) {
    harness
        .manager
        .reconfigure(&password_config())
        .expect("first");
    harness
        .connector
        .fail_connect(BackendError::transport("connection refused"));

    let error = harness
        .manager
        .reconfigure(&token_config())
        .expect_err("dial fails");

    assert!(matches!(error, ReconfigureError::Connect { ref host, port: 9200, .. } if host == "db"));
    assert!(!harness.manager.is_configured());
    assert!(harness.connector.calls_of(1).contains(&ClientCall::Close));
    assert!(harness.connector.calls_of(2).contains(&ClientCall::Close));
    assert_eq!(
        harness.reporter.events().last().map(String::as_str),
        Some("reconfigure_failed:connect")
    );
}

#[rstest]
fn auth_failure_closes_session_and_clears_slot(harness: Harness) {
    harness
        .connector
        .fail_auth(BackendError::thingsdb(-56, "invalid username or password"));

    let error = harness
        .manager
        .reconfigure(&password_config())
        .expect_err("auth fails");

    assert_eq!(
        error,
        ReconfigureError::Auth {
            source: BackendError::thingsdb(-56, "invalid username or password"),
        }
    );
    assert!(!harness.manager.is_configured());
    assert_eq!(
        harness.connector.calls_of(1).last(),
        Some(&ClientCall::Close)
    );
}

#[rstest]
fn recovers_after_failed_reconfigure(harness: Harness) {
    harness
        .connector
        .fail_connect(BackendError::transport("refused"));
    harness
        .manager
        .reconfigure(&password_config())
        .expect_err("dial fails");

    harness.connector.succeed();
    harness
        .manager
        .reconfigure(&password_config())
        .expect("retry succeeds");
    assert!(harness.manager.is_configured());
}

#[rstest]
fn connection_exposes_default_scope(harness: Harness) {
    let config = ModuleConfig {
        default_scope: Some(String::from("//stuff")),
        ..token_config()
    };
    harness.manager.reconfigure(&config).expect("reconfigure");

    let scope = harness
        .manager
        .with_connection(|connection| connection.default_scope().map(str::to_owned));
    assert_eq!(scope, Some(Some(String::from("//stuff"))));
}

#[rstest]
fn shutdown_closes_connection(harness: Harness) {
    harness
        .manager
        .reconfigure(&token_config())
        .expect("reconfigure");
    harness.manager.shutdown();

    assert!(!harness.manager.is_configured());
    assert_eq!(
        harness.connector.calls_of(1).last(),
        Some(&ClientCall::Close)
    );
}

#[rstest]
fn clones_share_the_slot(harness: Harness) {
    let clone = harness.manager.clone();
    harness
        .manager
        .reconfigure(&token_config())
        .expect("reconfigure");
    assert!(clone.is_configured());
}
