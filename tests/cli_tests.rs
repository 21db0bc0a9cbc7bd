use std::process::{Command, Output};

fn portscan(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_portscan-rs"))
        .args(args)
        .output()
        .expect("run portscan-rs")
}

#[test]
fn bad_port_spec_exits_with_2() {
    let out = portscan(&["scan", "127.0.0.1", "-p", "80-22"]);
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Range start > end: '80-22'"), "stderr: {stderr}");
    // Rejected before any scanning output.
    assert!(!String::from_utf8_lossy(&out.stdout).contains("Summary:"));
}

#[test]
fn empty_port_spec_exits_with_2() {
    let out = portscan(&["scan", "127.0.0.1", "-p", " , "]);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn unknown_command_fails() {
    let out = portscan(&["sweep", "127.0.0.1"]);
    assert!(!out.status.success());
}

#[test]
fn missing_ports_argument_fails() {
    let out = portscan(&["scan", "127.0.0.1"]);
    assert!(!out.status.success());
}
