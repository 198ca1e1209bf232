//! System module: external command execution and toolchain PATH handling

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};

/// Build a PATH with the toolchain `bin` directory first.
///
/// Host entries that already point into the same toolchain are dropped so
/// the pinned compiler always wins.
pub fn toolchain_path(toolchain_bin: &Path, current_path: &str) -> String {
    let bin = toolchain_bin.to_string_lossy().to_string();
    let mut entries = vec![bin.clone()];
    entries.extend(
        current_path
            .split(':')
            .filter(|p| !p.is_empty() && *p != bin)
            .map(str::to_string),
    );
    entries.join(":")
}

/// Read a pipe to EOF, handing each line to `on_line`.
///
/// Bytes that are not UTF-8 are replaced rather than ending the read, so the
/// child never sees its pipe closed early.
fn for_each_line<R: Read>(reader: R, mut on_line: impl FnMut(String)) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                on_line(line.trim_end_matches(&['\n', '\r'][..]).to_string());
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::warn!("[System] Output stream read failed: {}", e);
                break;
            }
        }
    }
}

/// Run a command, streaming stdout and stderr line by line into the log.
///
/// Output is logged under the `build` target with the given tag so the run
/// log holds the full tool output. Returns the last stderr lines on failure.
pub fn run_streamed(command: &mut Command, tag: &str) -> Result<(), String> {
    log::debug!("[System] [{}] Spawning: {:?}", tag, command);

    let mut child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("failed to spawn {:?}: {}", command.get_program(), e))?;

    let stderr = child.stderr.take();
    let stderr_tag = tag.to_string();
    let stderr_reader = std::thread::spawn(move || {
        let mut tail: Vec<String> = Vec::new();
        if let Some(stderr) = stderr {
            for_each_line(stderr, |line| {
                log::info!(target: "build", "[{}] {}", stderr_tag, line);
                tail.push(line);
                if tail.len() > 20 {
                    tail.remove(0);
                }
            });
        }
        tail
    });

    if let Some(stdout) = child.stdout.take() {
        for_each_line(stdout, |line| log::info!(target: "build", "[{}] {}", tag, line));
    }

    let status = child
        .wait()
        .map_err(|e| format!("failed to wait for {:?}: {}", command.get_program(), e))?;
    let tail = stderr_reader.join().unwrap_or_default();

    if status.success() {
        Ok(())
    } else {
        let code = status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let mut message = format!("{:?} exited with status {}", command.get_program(), code);
        if !tail.is_empty() {
            message.push_str(": ");
            message.push_str(&tail.join(" | "));
        }
        Err(message)
    }
}

/// Run a command and return its trimmed stdout.
pub fn capture_stdout(command: &mut Command) -> Result<String, String> {
    let output = command
        .output()
        .map_err(|e| format!("failed to run {:?}: {}", command.get_program(), e))?;
    if !output.status.success() {
        return Err(format!(
            "{:?} failed: {}",
            command.get_program(),
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
