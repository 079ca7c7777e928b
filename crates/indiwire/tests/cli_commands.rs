#![cfg(all(unix, feature = "cli"))]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Child, Command, Output, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;

fn indiwire() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_indiwire"));
    command.arg("--log-level").arg("error");
    command
}

fn run_sim(input: &str) -> Output {
    let mut child = indiwire()
        .arg("sim")
        .arg("--device")
        .arg("Sim")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("sim command should start");
    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(input.as_bytes())
        .expect("input should be writable");
    child.wait_with_output().expect("sim should exit")
}

/// Minimal server: a spawned simulator whose stdio is bridged to one TCP
/// client at a time.
struct Server {
    child: Child,
    port: u16,
}

impl Server {
    fn start() -> Self {
        let mut child = indiwire()
            .arg("sim")
            .arg("--device")
            .arg("Sim")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("sim command should start");
        let mut stdin = child.stdin.take().expect("stdin should be piped");
        let mut stdout = child.stdout.take().expect("stdout should be piped");

        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        let port = listener.local_addr().expect("listener has an address").port();
        let current: Arc<Mutex<Option<TcpStream>>> = Arc::new(Mutex::new(None));

        let sink = Arc::clone(&current);
        thread::spawn(move || {
            let mut chunk = [0u8; 4096];
            while let Ok(n) = stdout.read(&mut chunk) {
                if n == 0 {
                    break;
                }
                if let Some(client) = sink.lock().expect("bridge lock").as_mut() {
                    let _ = client.write_all(&chunk[..n]);
                }
            }
        });

        thread::spawn(move || {
            for client in listener.incoming() {
                let Ok(mut client) = client else { break };
                *current.lock().expect("bridge lock") = client.try_clone().ok();
                let _ = std::io::copy(&mut client, &mut stdin);
                *current.lock().expect("bridge lock") = None;
            }
        });

        Self { child, port }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn get_json(port: u16, target: &str) -> serde_json::Value {
    let output = indiwire()
        .arg("--format")
        .arg("json")
        .arg("get")
        .arg("--port")
        .arg(port.to_string())
        .arg("--timeout")
        .arg("500ms")
        .arg(target)
        .output()
        .expect("get command should run");
    assert!(
        output.status.success(),
        "get failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("get output should be JSON")
}

#[test]
fn sim_answers_get_properties_on_stdout() {
    let output = run_sim("<getProperties version='1.7'/>\n");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).expect("protocol output is UTF-8");
    assert!(stdout.contains("<defNumberVector device='Sim' name='TARGET'"));
    assert!(stdout.contains("<defLightVector device='Sim' name='STATUS'"));
    assert!(!stdout.contains("level="), "logs must stay off stdout");
}

#[test]
fn sim_rejects_newer_protocol() {
    let output = run_sim("<getProperties version='9.0'/>\n");
    assert_eq!(output.status.code(), Some(3));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("9.0"), "stderr: {stderr}");
}

#[test]
fn sim_reports_bad_commands_and_keeps_going() {
    let output = run_sim(
        "<getProperties version='1.7'/>\n\
         <newNumberVector device='Sim' name='TARGET'><oneNumber name='VALUE'>abc</oneNumber></newNumberVector>\n\
         <newNumberVector device='Sim' name='TARGET'><oneNumber name='VALUE'>20</oneNumber></newNumberVector>\n",
    );
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("protocol output is UTF-8");
    assert!(stdout.contains("TARGET: Bad format abc"), "stdout: {stdout}");
    assert!(stdout.contains("<setNumberVector device='Sim' name='TARGET'"));
}

#[test]
fn get_and_set_against_bridged_sim() {
    let server = Server::start();

    let before = get_json(server.port, "Sim.TARGET");
    let properties = before.as_array().expect("get prints an array");
    assert_eq!(properties.len(), 1);
    assert_eq!(properties[0]["name"], "TARGET");
    assert_eq!(properties[0]["elements"][0]["value"], 50.0);

    let status = indiwire()
        .arg("set")
        .arg("--port")
        .arg(server.port.to_string())
        .arg("Sim.TARGET.VALUE=75")
        .status()
        .expect("set command should run");
    assert!(status.success());

    let after = get_json(server.port, "Sim.TARGET");
    assert_eq!(after[0]["elements"][0]["value"], 75.0);
}

#[test]
fn set_without_server_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
    let port = listener.local_addr().expect("listener has an address").port();
    drop(listener);

    let output = indiwire()
        .arg("set")
        .arg("--port")
        .arg(port.to_string())
        .arg("Sim.TARGET.VALUE=75")
        .output()
        .expect("set command should run");
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn set_rejects_malformed_assignment() {
    let output = indiwire()
        .arg("set")
        .arg("Sim.TARGET=75")
        .output()
        .expect("set command should run");
    assert_eq!(output.status.code(), Some(64));
}
