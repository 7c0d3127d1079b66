//! End-to-end runs of the `duplex` binary: real pipes, a real fork.

use std::process::{Command, Output, Stdio};

const PARENT_GOT_CHILD: &str = "Parent received: Hello from child";
const CHILD_GOT_PARENT: &str = "Child received: Hello from parent";

fn duplex() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_duplex"));
    cmd.env_remove("RUST_LOG")
        .env_remove("LOG_FORMAT")
        .env_remove("DUPLEX_LOG")
        .env_remove("DUPLEX_LINE_CAPACITY")
        .env_remove("DUPLEX_PARENT_GREETING")
        .env_remove("DUPLEX_CHILD_GREETING")
        .env("DUPLEX_TIMEOUT_SECS", "10")
        .stdin(Stdio::null());
    cmd
}

fn run(cmd: &mut Command) -> (Output, Vec<String>) {
    let output = cmd.output().expect("failed to run duplex");
    let lines = String::from_utf8_lossy(&output.stderr)
        .lines()
        .map(str::to_owned)
        .collect();
    (output, lines)
}

fn has_line(lines: &[String], expected: &str) -> bool {
    lines.iter().any(|l| l == expected)
}

#[test]
fn both_directions_deliver_the_greetings() {
    let (output, lines) = run(&mut duplex());

    assert!(output.status.success(), "{lines:#?}");
    assert!(has_line(&lines, PARENT_GOT_CHILD), "{lines:#?}");
    assert!(has_line(&lines, CHILD_GOT_PARENT), "{lines:#?}");
    // stdout was handed to the channel, nothing reaches the original stream.
    assert!(output.stdout.is_empty());
}

#[test]
fn sentinels_stay_in_their_direction() {
    let (output, lines) = run(duplex()
        .env("DUPLEX_PARENT_GREETING", "SENTINEL-A parent-to-child")
        .env("DUPLEX_CHILD_GREETING", "SENTINEL-B child-to-parent"));

    assert!(output.status.success(), "{lines:#?}");
    assert!(has_line(&lines, "Parent received: SENTINEL-B child-to-parent"), "{lines:#?}");
    assert!(has_line(&lines, "Child received: SENTINEL-A parent-to-child"), "{lines:#?}");
    assert!(!lines.iter().any(|l| l.starts_with("Parent") && l.contains("SENTINEL-A")));
    assert!(!lines.iter().any(|l| l.starts_with("Child") && l.contains("SENTINEL-B")));
}

#[test]
fn payload_of_capacity_minus_one_is_read_intact() {
    let payload = "c".repeat(99);
    let (output, lines) = run(duplex().env("DUPLEX_CHILD_GREETING", &payload));

    assert!(output.status.success(), "{lines:#?}");
    assert!(has_line(&lines, &format!("Parent received: {payload}")), "{lines:#?}");
}

#[test]
fn oversized_payload_is_rejected_cleanly() {
    let payload = "c".repeat(101);
    let (output, lines) = run(duplex().env("DUPLEX_CHILD_GREETING", &payload));

    assert_eq!(output.status.code(), Some(1), "{lines:#?}");
    assert!(
        has_line(&lines, "error: parent handshake failed: line exceeds 99 bytes"),
        "{lines:#?}"
    );
    assert!(!lines.iter().any(|l| l.starts_with("Parent received:")));
    // The other direction is unaffected.
    assert!(has_line(&lines, CHILD_GOT_PARENT), "{lines:#?}");
}

#[test]
fn payload_is_reported_byte_for_byte() {
    let (output, lines) = run(duplex().env("DUPLEX_CHILD_GREETING", "  tabs\tand cr\r"));

    assert!(output.status.success(), "{lines:#?}");
    // Leading blanks are skipped, everything else including the \r is kept.
    let expected = b"Parent received: tabs\tand cr\r\n";
    assert!(
        output.stderr.windows(expected.len()).any(|w| w == expected),
        "{lines:#?}"
    );
}

#[test]
fn silent_child_is_reported_as_channel_closed() {
    let (output, lines) = run(duplex().env("DUPLEX_CHILD_GREETING", ""));

    assert!(output.status.success(), "{lines:#?}");
    assert!(has_line(&lines, "Parent: channel closed by peer"), "{lines:#?}");
    assert!(has_line(&lines, CHILD_GOT_PARENT), "{lines:#?}");
}

#[test]
fn reaped_pid_is_the_forked_pid() {
    let (output, lines) = run(duplex().env("LOG_FORMAT", "json").env("DUPLEX_LOG", "info"));
    assert!(output.status.success(), "{lines:#?}");

    let events: Vec<serde_json::Value> = lines
        .iter()
        .filter(|l| l.starts_with('{'))
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let pid_of = |message: &str| {
        events
            .iter()
            .find(|e| e["fields"]["message"] == message)
            .and_then(|e| e["fields"]["child_pid"].as_i64())
            .unwrap_or_else(|| panic!("no {message:?} event in {lines:#?}"))
    };

    let forked = pid_of("Forked child");
    let reaped = pid_of("Reaped child");
    assert_eq!(forked, reaped);

    // Events logged by the child carry its own pid in the session span.
    let child_pid = events
        .iter()
        .find(|e| e["span"]["role"] == "child")
        .and_then(|e| e["span"]["pid"].as_i64())
        .unwrap_or_else(|| panic!("no child span in {lines:#?}"));
    assert_eq!(child_pid, forked);
}

#[test]
fn invalid_configuration_exits_with_usage_status() {
    let (output, lines) = run(duplex().env("DUPLEX_LINE_CAPACITY", "abc"));

    assert_eq!(output.status.code(), Some(2), "{lines:#?}");
    assert!(
        lines
            .iter()
            .any(|l| l.starts_with("error: invalid configuration: DUPLEX_LINE_CAPACITY")),
        "{lines:#?}"
    );
}

#[test]
fn non_utf8_override_is_a_configuration_error() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let (output, lines) =
        run(duplex().env("DUPLEX_CHILD_GREETING", OsStr::from_bytes(b"caf\xe9")));

    assert_eq!(output.status.code(), Some(2), "{lines:#?}");
    assert!(
        lines
            .iter()
            .any(|l| l.starts_with("error: invalid configuration: DUPLEX_CHILD_GREETING")),
        "{lines:#?}"
    );
}

#[cfg(target_os = "linux")]
#[test]
fn pipe_creation_failure_is_fatal_before_the_split() {
    use std::io;
    use std::os::unix::process::CommandExt;

    use nix::sys::resource::{Resource, setrlimit};

    let mut cmd = duplex();
    // fds 0-2 plus one spare for the dynamic loader; a pipe needs two more.
    unsafe {
        cmd.pre_exec(|| setrlimit(Resource::RLIMIT_NOFILE, 4, 4).map_err(io::Error::from));
    }
    let (output, lines) = run(&mut cmd);

    assert_eq!(output.status.code(), Some(1), "{lines:#?}");
    assert!(
        lines.iter().any(|l| l.starts_with("error: pipe: EMFILE")),
        "{lines:#?}"
    );
    // Nothing was forked, so no role reported anything.
    assert!(!lines.iter().any(|l| l.contains("received")));
}
