use std::process::Command;

fn port_scan() -> Command {
    Command::new(env!("CARGO_BIN_EXE_port-scan-rs"))
}

#[test]
fn inverted_range_exits_with_status_2_without_scanning() {
    let out = port_scan()
        .args(["127.0.0.1", "100", "50"])
        .output()
        .expect("binary runs");

    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Invalid scan request"), "stderr: {stderr}");
    assert!(out.stdout.is_empty());
}

#[test]
fn out_of_range_port_exits_with_status_2() {
    for args in [["127.0.0.1", "0", "10"], ["127.0.0.1", "1", "65536"]] {
        let out = port_scan().args(args).output().expect("binary runs");
        assert_eq!(out.status.code(), Some(2));
    }
}

#[test]
fn loopback_listener_is_printed() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port().to_string();

    let out = port_scan()
        .args(["127.0.0.1", &port, &port, "--timeout", "2"])
        .output()
        .expect("binary runs");

    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(stdout.trim(), format!("Open ports: {port}"));
}
