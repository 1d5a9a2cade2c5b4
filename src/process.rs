use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub enum ProcessOutcome {
    Exited { status: ExitStatus, output: String },
    TimedOut { output: String },
}

/// Run `argv` in `cwd`, killing it once `timeout` elapses. Combined
/// stdout/stderr is captured through a temp file so a chatty child can never
/// block on a full pipe.
pub fn run_with_timeout(
    argv: &[String],
    cwd: &Path,
    timeout: Duration,
) -> std::io::Result<ProcessOutcome> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"))?;

    let mut capture = tempfile::tempfile()?;
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(capture.try_clone()?)
        .stderr(capture.try_clone()?)
        .spawn()?;

    let start = Instant::now();
    let finished = loop {
        match child.try_wait()? {
            Some(status) => break Some(status),
            None => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    break None;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    };

    capture.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    capture.read_to_end(&mut bytes)?;
    let output = String::from_utf8_lossy(&bytes).into_owned();

    Ok(match finished {
        Some(status) => ProcessOutcome::Exited { status, output },
        None => ProcessOutcome::TimedOut { output },
    })
}
