#![cfg(unix)]

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use framemux::Mux;

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/framemux-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn wait_for_connect(path: &Path, timeout: Duration) -> io::Result<UnixStream> {
    let start = Instant::now();
    loop {
        match UnixStream::connect(path) {
            Ok(conn) => return Ok(conn),
            Err(err) => {
                if start.elapsed() >= timeout {
                    return Err(io::Error::other(format!("connect timeout: {err}")));
                }
                thread::sleep(Duration::from_millis(25));
            }
        }
    }
}

fn wait_for_exit(child: &mut std::process::Child, timeout: Duration) -> Option<i32> {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if let Some(status) = child.try_wait().expect("child status should be readable") {
            return status.code();
        }
        thread::sleep(Duration::from_millis(25));
    }
    let _ = child.kill();
    None
}

#[test]
fn echo_once_serves_streams_and_exits() {
    let dir = unique_temp_dir("echo");
    let sock_path = dir.join("echo.sock");

    let mut child = Command::new(env!("CARGO_BIN_EXE_framemux"))
        .arg("echo")
        .arg(format!("unix:{}", sock_path.display()))
        .arg("--once")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("echo server should start");

    let conn = wait_for_connect(&sock_path, Duration::from_secs(5)).expect("server should listen");
    let mux = Mux::new(conn).expect("mux should start");

    for (id, message) in [(1u8, &b"first"[..]), (200, &b"second stream"[..])] {
        let mut stream = mux.stream(id);
        stream.write_all(message).unwrap();
        let mut echoed = vec![0u8; message.len()];
        stream.read_exact(&mut echoed).unwrap();
        assert_eq!(echoed, message);
    }
    drop(mux);

    assert_eq!(wait_for_exit(&mut child, Duration::from_secs(5)), Some(0));
    assert!(!sock_path.exists(), "socket file should be removed on exit");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn cat_reports_connect_failure() {
    let dir = unique_temp_dir("cat");
    let output = Command::new(env!("CARGO_BIN_EXE_framemux"))
        .arg("cat")
        .arg(format!("unix:{}", dir.join("missing.sock").display()))
        .stdin(Stdio::null())
        .output()
        .expect("cat should run");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("connect to unix:"), "stderr: {stderr}");
    let _ = std::fs::remove_dir_all(&dir);
}
