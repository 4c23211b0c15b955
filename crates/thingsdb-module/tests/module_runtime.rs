//! End-to-end tests driving the protocol loop over in-memory channels.

use std::io::{self, Cursor, Write};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rmpv::Value;
use rstest::{fixture, rstest};
use thingsdb_module::test_support::{ClientCall, FakeConnector, RecordingReporter};
use thingsdb_module::{BackendError, DEFAULT_WORKER_LIMIT, ModuleError, ModuleRuntime};
use timod_protocol::{
    ExceptionKind, Package, PackageWriter, Proto, ProtocolError, TransportEvent,
    TransportReceiver, spawn_reader,
};

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn packages(&self) -> Vec<Package> {
        let bytes = self.0.lock().expect("buffer lock").clone();
        let mut cursor = Cursor::new(bytes);
        let mut packages = Vec::new();
        while let Some(package) = Package::read_from(&mut cursor).expect("decode reply") {
            packages.push(package);
        }
        packages
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("buffer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Host {
    connector: FakeConnector,
    reporter: Arc<RecordingReporter>,
    output: SharedBuffer,
    events: Sender<TransportEvent>,
    module: JoinHandle<Result<(), ModuleError>>,
}

impl Host {
    fn send(&self, package: Package) {
        self.events
            .send(TransportEvent::Package(package))
            .expect("module loop alive");
    }

    fn fail(self, error: ProtocolError) -> (Result<(), ModuleError>, Finished) {
        self.events
            .send(TransportEvent::Failed(error))
            .expect("module loop alive");
        self.finish()
    }

    fn close(self) -> (Result<(), ModuleError>, Finished) {
        self.fail(ProtocolError::HostClosed)
    }

    fn finish(self) -> (Result<(), ModuleError>, Finished) {
        let result = self.module.join().expect("module thread");
        let finished = Finished {
            connector: self.connector,
            reporter: self.reporter,
            replies: self.output.packages(),
        };
        (result, finished)
    }
}

struct Finished {
    connector: FakeConnector,
    reporter: Arc<RecordingReporter>,
    replies: Vec<Package>,
}

impl Finished {
    fn reply_for(&self, pid: u16) -> &Package {
        self.replies
            .iter()
            .find(|package| package.pid() == pid && package.proto() != Proto::ModuleConfOk)
            .expect("reply for pid")
    }
}

#[fixture]
fn host() -> Host {
    start_host(DEFAULT_WORKER_LIMIT)
}

fn start_host(worker_limit: usize) -> Host {
    let connector = FakeConnector::new();
    let reporter = Arc::new(RecordingReporter::default());
    let output = SharedBuffer::default();
    let (events, receiver) = mpsc::channel();

    let runtime = ModuleRuntime::new(
        Arc::new(connector.clone()),
        reporter.clone(),
        PackageWriter::new(output.clone()),
    )
    .with_worker_limit(worker_limit);
    let module = thread::spawn(move || runtime.run(TransportReceiver::from_channel(receiver)));

    Host {
        connector,
        reporter,
        output,
        events,
        module,
    }
}

fn msgpack_map(entries: &[(&str, Value)]) -> Vec<u8> {
    let map = entries
        .iter()
        .map(|(key, value)| (Value::from(*key), value.clone()))
        .collect();
    rmp_serde::to_vec(&Value::Map(map)).expect("encode map")
}

fn password_config() -> Package {
    Package::new(
        0,
        Proto::ModuleConf,
        msgpack_map(&[
            ("host", Value::from("db")),
            ("username", Value::from("admin")),
            ("password", Value::from("x")),
        ]),
    )
}

fn request(pid: u16, entries: &[(&str, Value)]) -> Package {
    Package::new(pid, Proto::ModuleReq, msgpack_map(entries))
}

fn exception(package: &Package) -> (i8, String) {
    assert_eq!(package.proto(), Proto::ModuleErr);
    rmp_serde::from_slice(package.data()).expect("exception payload")
}

#[rstest]
fn configured_query_returns_backend_bytes(host: Host) {
    host.connector.respond_with(|_| Ok(vec![0xA2, b'o', b'k']));
    host.send(password_config());
    host.send(request(
        7,
        &[("scope", Value::from("//s")), ("code", Value::from(".id()"))],
    ));

    let (result, finished) = host.close();

    result.expect("clean shutdown");
    let first = finished.replies.first().expect("config reply");
    assert_eq!(first.proto(), Proto::ModuleConfOk);

    let reply = finished.reply_for(7);
    assert_eq!(reply.proto(), Proto::ModuleRes);
    assert_eq!(reply.data(), &[0xA2, b'o', b'k']);
}

#[rstest]
fn ambiguous_credentials_are_refused(host: Host) {
    host.send(Package::new(
        0,
        Proto::ModuleConf,
        msgpack_map(&[
            ("host", Value::from("db")),
            ("username", Value::from("admin")),
            ("token", Value::from("tok")),
        ]),
    ));

    let (result, finished) = host.close();

    result.expect("clean shutdown");
    assert_eq!(
        finished
            .replies
            .iter()
            .map(Package::proto)
            .collect::<Vec<_>>(),
        vec![Proto::ModuleConfErr]
    );
    assert_eq!(finished.connector.sessions(), 0);
}

#[rstest]
fn undecodable_configuration_is_refused(host: Host) {
    host.send(Package::new(0, Proto::ModuleConf, vec![0xC1]));

    let (result, finished) = host.close();

    result.expect("clean shutdown");
    assert_eq!(finished.replies.len(), 1);
    assert_eq!(
        finished.replies.first().map(Package::proto),
        Some(Proto::ModuleConfErr)
    );
    assert!(
        finished
            .reporter
            .events()
            .contains(&String::from("reconfigure_failed:validate"))
    );
}

#[rstest]
fn failed_authentication_is_refused(host: Host) {
    host.connector
        .fail_auth(BackendError::thingsdb(-56, "invalid username or password"));
    host.send(password_config());
    host.send(request(
        3,
        &[("scope", Value::from("//s")), ("code", Value::from(".id()"))],
    ));

    let (result, finished) = host.close();

    result.expect("clean shutdown");
    assert_eq!(
        finished.replies.first().map(Package::proto),
        Some(Proto::ModuleConfErr)
    );
    assert_eq!(
        exception(finished.reply_for(3)),
        (
            ExceptionKind::Cancelled.code(),
            String::from("no connection; reconfigure first")
        )
    );
}

#[rstest]
fn requests_before_configuration_are_cancelled(host: Host) {
    host.send(request(
        5,
        &[("scope", Value::from("//s")), ("code", Value::from(".id()"))],
    ));

    let (result, finished) = host.close();

    result.expect("clean shutdown");
    let (code, _) = exception(finished.reply_for(5));
    assert_eq!(code, ExceptionKind::Cancelled.code());
    assert!(
        finished
            .reporter
            .events()
            .contains(&String::from("request_rejected:5"))
    );
}

#[rstest]
fn invalid_request_reports_bad_data(host: Host) {
    host.send(password_config());
    host.send(request(
        9,
        &[
            ("scope", Value::from("//s")),
            ("name", Value::from("proc1")),
            ("vars", Value::Map(vec![(Value::from("a"), Value::from(1))])),
        ],
    ));

    let (result, finished) = host.close();

    result.expect("clean shutdown");
    assert_eq!(
        exception(finished.reply_for(9)),
        (
            ExceptionKind::BadData.code(),
            String::from("vars not valid with name; use args")
        )
    );
    assert_eq!(finished.connector.operations(), 0);
}

#[rstest]
fn backend_errors_keep_their_code(host: Host) {
    host.connector
        .respond_with(|_| Err(BackendError::thingsdb(-54, "procedure `nope` not found")));
    host.send(password_config());
    host.send(request(
        4,
        &[("scope", Value::from("//s")), ("name", Value::from("nope"))],
    ));

    let (result, finished) = host.close();

    result.expect("clean shutdown");
    assert_eq!(
        exception(finished.reply_for(4)),
        (-54, String::from("procedure `nope` not found"))
    );
}

#[rstest]
fn many_requests_each_get_one_reply(host: Host) {
    host.send(password_config());
    for pid in 1..=20 {
        host.send(request(
            pid,
            &[("scope", Value::from("//s")), ("code", Value::from(".id()"))],
        ));
    }

    let (result, finished) = host.close();

    result.expect("clean shutdown");
    let mut pids: Vec<u16> = finished
        .replies
        .iter()
        .filter(|package| package.proto() == Proto::ModuleRes)
        .map(Package::pid)
        .collect();
    pids.sort_unstable();
    assert_eq!(pids, (1..=20).collect::<Vec<_>>());
}

#[rstest]
#[case::single_worker(1)]
#[case::three_workers(3)]
fn worker_limit_bounds_concurrent_requests(#[case] limit: usize) {
    let host = start_host(limit);
    host.connector.set_latency(Duration::from_millis(5));
    host.send(password_config());
    for pid in 1..=12 {
        host.send(request(
            pid,
            &[("scope", Value::from("//s")), ("code", Value::from(".id()"))],
        ));
    }

    let (result, finished) = host.close();

    result.expect("clean shutdown");
    assert!(finished.connector.peak_in_flight() <= limit);
    let answered = finished
        .replies
        .iter()
        .filter(|package| package.proto() == Proto::ModuleRes)
        .count();
    assert_eq!(answered, 12);
}

#[rstest]
fn unknown_packages_get_no_reply(host: Host) {
    host.send(Package::new(12, Proto::from_byte(99), vec![0xC0]));

    let (result, finished) = host.close();

    result.expect("clean shutdown");
    assert!(finished.replies.is_empty());
    assert!(
        finished
            .reporter
            .events()
            .contains(&String::from("unexpected_package:99"))
    );
}

#[rstest]
fn transport_failure_stops_the_module(host: Host) {
    host.send(password_config());

    let (result, finished) = host.fail(ProtocolError::CorruptHeader {
        proto: 80,
        check: 0,
    });

    let error = result.expect_err("transport failure");
    assert!(matches!(
        error,
        ModuleError::Transport {
            source: ProtocolError::CorruptHeader { .. }
        }
    ));
    assert_eq!(finished.connector.calls_of(1).last(), Some(&ClientCall::Close));
    let events = finished.reporter.events();
    assert_eq!(
        events.iter().rev().take(2).collect::<Vec<_>>(),
        vec!["module_stopping", "transport_failed"]
    );
}

#[rstest]
fn shutdown_closes_the_connection(host: Host) {
    host.send(password_config());

    let (result, finished) = host.close();

    result.expect("clean shutdown");
    assert_eq!(finished.connector.calls_of(1).last(), Some(&ClientCall::Close));
    assert_eq!(
        finished.reporter.events().last().map(String::as_str),
        Some("module_stopping")
    );
}

#[test]
fn serves_a_framed_byte_stream() {
    let input: Vec<u8> = [
        password_config(),
        request(
            1,
            &[("scope", Value::from("//s")), ("code", Value::from(".id()"))],
        ),
    ]
    .iter()
    .flat_map(|package| package.encode().expect("encode"))
    .collect();
    let events = spawn_reader(Cursor::new(input)).expect("spawn reader");
    let output = SharedBuffer::default();
    let connector = FakeConnector::new();

    ModuleRuntime::new(
        Arc::new(connector.clone()),
        Arc::new(RecordingReporter::default()),
        PackageWriter::new(output.clone()),
    )
    .run(events)
    .expect("stream ends cleanly");

    let replies = output.packages();
    assert_eq!(
        replies.iter().map(Package::proto).collect::<Vec<_>>(),
        vec![Proto::ModuleConfOk, Proto::ModuleRes]
    );
    assert_eq!(connector.operations(), 1);
}
