//! Session bootstrap against a fake telnet operator

use bcilink_core::{ParameterSet, Remote, RemoteError, Session, SessionConfig, StateType};
use bcilink_operator::{OperatorConnection, OperatorSettings};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tempfile::TempDir;

struct FakeOperator {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl FakeOperator {
    /// Serve a single connection, answering like an idle operator
    fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = received.clone();

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let reader = BufReader::new(stream);
            writer.write_all(b"\r\n>").unwrap();

            let mut parameters: HashMap<String, String> = HashMap::new();
            for line in reader.lines() {
                let Ok(line) = line else { break };
                let command = line.trim().to_string();
                log.lock().unwrap().push(command.clone());
                if command == "Quit" {
                    break;
                }
                let response = respond(&command, &mut parameters);
                if writer
                    .write_all(format!("{}\r\n>", response).as_bytes())
                    .is_err()
                {
                    break;
                }
            }
        });

        Self {
            addr,
            received,
            handle,
        }
    }

    fn settings(&self) -> OperatorSettings {
        OperatorSettings {
            telnet_ip: self.addr.ip().to_string(),
            telnet_port: self.addr.port(),
            timeout_ms: 2000,
            startup_timeout_ms: 2000,
            ..OperatorSettings::default()
        }
    }

    fn finish(self) -> Vec<String> {
        self.handle.join().unwrap();
        let received = self.received.lock().unwrap();
        received.clone()
    }
}

fn respond(command: &str, parameters: &mut HashMap<String, String>) -> String {
    let words: Vec<&str> = command.split_whitespace().collect();
    match words.as_slice() {
        ["ADD", "PARAMETER", _, "float", name, value, ..] => {
            parameters.insert(name.trim_end_matches('=').to_string(), value.to_string());
            String::new()
        }
        ["Set", "parameter", name, value] => {
            parameters.insert(name.to_string(), value.to_string());
            String::new()
        }
        ["Get", "parameter", "Slow"] => {
            thread::sleep(Duration::from_millis(600));
            "slow-answer".to_string()
        }
        ["Get", "parameter", name] => parameters
            .get(*name)
            .cloned()
            .unwrap_or_else(|| format!("Error: no parameter {}", name)),
        ["Get", "state", "TargetCode"] => "7".to_string(),
        ["Get", "state", _] => "0".to_string(),
        ["Start", "executable", "Missing", ..] => "Error: executable not found".to_string(),
        _ => String::new(),
    }
}

fn operator_file(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("Operator.exe");
    std::fs::write(&path, b"").unwrap();
    path
}

#[test]
fn test_bootstrap_over_telnet() {
    let fake = FakeOperator::spawn();
    let temp_dir = TempDir::new().unwrap();
    let log_file = temp_dir.path().join("operator.log");

    let settings = OperatorSettings {
        log_file: Some(log_file.clone()),
        ..fake.settings()
    };
    let connection = OperatorConnection::new(settings).unwrap();
    let config = SessionConfig {
        operator_path: Some(operator_file(&temp_dir)),
        init_commands: vec!["Set parameter SamplingRate 256Hz".to_string()],
        ..SessionConfig::default()
    };
    let mut session = Session::new(Box::new(connection), config);

    let mut parameters = ParameterSet::default();
    parameters.declare("Game", "Speed", 2.5, 0.0, 10.0);
    let parameters = session.add_parameter_set(parameters).unwrap();
    let position = session
        .declare_state("CubeGlobalX", StateType::SignedInt32)
        .unwrap();
    let target = session
        .declare_state("TargetCode", StateType::UnsignedInt16)
        .unwrap();

    session.bootstrap().unwrap();
    assert!(session.is_ready());
    assert_eq!(session.parameters(parameters).unwrap().get("Speed").unwrap(), 2.5);

    assert!(session.set_state(position, -1500).unwrap());
    assert!(!session.set_state(position, -1500).unwrap());
    assert_eq!(session.get_state(target).unwrap(), 7);
    assert_eq!(session.get_parameter_string("SamplingRate").unwrap(), "256Hz");

    session.shutdown();
    let received = fake.finish();

    assert_eq!(
        received,
        vec![
            "Set parameter SamplingRate 256Hz",
            "ADD PARAMETER Unity:Game float Speed= 2.5 2.5 0 10",
            "Startup system localhost",
            "Start executable SignalGenerator --local",
            "Start executable DummySignalProcessing --local",
            "Start executable DummyApplication --local",
            "Wait for Connected",
            "Add state CubeGlobalX 32 0",
            "Add state CubeGlobalXSign 1 0",
            "Add state TargetCode 16 0",
            "Set config",
            "Start",
            "Get parameter Speed",
            "Set state CubeGlobalX 1500",
            "Set state CubeGlobalXSign 1",
            "Get state TargetCode",
            "Get parameter SamplingRate",
            "Stop",
        ]
    );

    // state traffic is left out of the transcript by default
    let transcript = std::fs::read_to_string(&log_file).unwrap();
    assert!(transcript.contains("> Set config"));
    assert!(transcript.contains("< 256Hz"));
    assert!(!transcript.contains("CubeGlobalX"));
}

#[test]
fn test_rejected_command_surfaces() {
    let fake = FakeOperator::spawn();
    let mut connection = OperatorConnection::new(fake.settings()).unwrap();
    connection.connect(&[]).unwrap();
    assert!(connection.is_connected());

    let response = connection.execute("Start executable Missing --local").unwrap();
    assert!(response.starts_with("Error"));

    let result = connection.get_parameter("Nothing");
    match result {
        Err(RemoteError::Rejected { command, .. }) => assert_eq!(command, "Get parameter Nothing"),
        other => panic!("Expected Rejected, got {:?}", other),
    }

    connection.quit().unwrap();
    assert!(!connection.is_connected());
    let received = fake.finish();
    assert_eq!(received.last().map(String::as_str), Some("Quit"));
}

#[test]
fn test_timeout_drops_connection() {
    let fake = FakeOperator::spawn();
    let settings = OperatorSettings {
        timeout_ms: 300,
        ..fake.settings()
    };
    let mut connection = OperatorConnection::new(settings).unwrap();
    connection.connect(&[]).unwrap();
    connection.set_parameter("Fast", "fast-answer").unwrap();

    let first = connection.get_parameter("Slow");
    assert!(matches!(first, Err(RemoteError::Transport(_))));
    assert!(!connection.is_connected());

    // the late reply to `Slow` is never taken as the answer to `Fast`
    let second = connection.get_parameter("Fast");
    assert!(matches!(second, Err(RemoteError::NotConnected)));

    drop(connection);
    let received = fake.finish();
    assert!(!received.iter().any(|c| c == "Get parameter Fast"));
}

#[test]
fn test_connect_fails_without_operator() {
    // grab a free port, then close it so nothing is listening
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let settings = OperatorSettings {
        telnet_ip: addr.ip().to_string(),
        telnet_port: addr.port(),
        timeout_ms: 500,
        ..OperatorSettings::default()
    };
    let mut connection = OperatorConnection::new(settings).unwrap();

    let result = connection.connect(&[]);
    assert!(matches!(result, Err(RemoteError::ConnectFailed(_))));
    assert!(!connection.launched_operator());
}
