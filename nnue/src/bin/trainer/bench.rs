use std::io::Read;
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use nnue_trainer::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

// How long a killed run may take to release its stdout
const KILL_GRACE: Duration = Duration::from_secs(5);

type Output = std::io::Result<String>;

/// External command that builds an engine with the freshly exported model
/// and prints its benchmark node count as the first token on stdout.
#[derive(Debug, Clone)]
pub struct Benchmark {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl Benchmark {
    pub fn new(program: String, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program,
            args,
            timeout,
        }
    }

    /// Splits a command line on whitespace. Returns `None` for an empty command.
    pub fn from_command_line(command: &str, timeout: Duration) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect(), timeout))
    }

    /// Runs the command to completion and returns the node count it reports.
    ///
    /// The command runs in its own process group. A run that fails or outlives
    /// the timeout has the whole group killed, so processes it started
    /// (e.g. the engine under `cargo run`) go with it.
    pub fn run(&self) -> Result<f64> {
        let deadline = Instant::now() + self.timeout;
        let mut child = self.spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Benchmark("failed to capture stdout".to_string()))?;
        let output = read_in_background(stdout);

        let result = self.finish(&mut child, &output, deadline);
        if result.is_err() {
            kill_group(&mut child);
            if let Err(RecvTimeoutError::Timeout) = output.recv_timeout(KILL_GRACE) {
                log::warn!("`{}` left a process holding its output open", self.program);
            }
        }
        result
    }

    fn spawn(&self) -> Result<Child> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        Ok(command.spawn()?)
    }

    fn finish(
        &self,
        child: &mut Child,
        output: &Receiver<Output>,
        deadline: Instant,
    ) -> Result<f64> {
        let status = self.wait(child, deadline)?;

        let output = output
            .recv_timeout(deadline.saturating_duration_since(Instant::now()))
            .map_err(|_| self.timed_out())??;

        if !status.success() {
            return Err(Error::Benchmark(format!(
                "`{}` exited with {}",
                self.program, status
            )));
        }

        parse_nodes(&output)
    }

    fn wait(&self, child: &mut Child, deadline: Instant) -> Result<ExitStatus> {
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                return Err(self.timed_out());
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn timed_out(&self) -> Error {
        Error::Benchmark(format!(
            "`{}` timed out after {:?}",
            self.program, self.timeout
        ))
    }
}

// Reads on a separate thread so a chatty child can't block on a full pipe
fn read_in_background(mut stdout: ChildStdout) -> Receiver<Output> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let mut output = String::new();
        let _ = sender.send(stdout.read_to_string(&mut output).map(|_| output));
    });
    receiver
}

fn kill_group(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: kill(2) with a negative pid only signals the process group
            // spawned for this child; it has no memory safety preconditions.
            unsafe {
                libc::kill(-pid, libc::SIGKILL);
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Parses the first whitespace-separated token of the benchmark output.
pub fn parse_nodes(output: &str) -> Result<f64> {
    let token = output
        .split_whitespace()
        .next()
        .ok_or_else(|| Error::Benchmark("empty benchmark output".to_string()))?;

    token
        .parse::<f64>()
        .map_err(|_| Error::Benchmark(format!("unexpected benchmark output {:?}", token)))
}
