//! Server process session management
//!
//! Owns one language-server subprocess for the duration of one probe:
//! exclusive write access to its stdin, background readers draining stdout
//! and stderr into capture buffers, and guaranteed termination on every exit
//! path. Readers run continuously so a server that logs heavily while the
//! harness is still writing input can never deadlock the pipes.

use std::io;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::probe::error::ProbeError;
use crate::protocol::FrameDecoder;

/// Output captured from the server's stdout and stderr streams
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

/// One live server subprocess with exclusive stream ownership
///
/// Sessions are never shared or pooled: every scenario spawns a fresh
/// process so no server state leaks between probes.
pub struct ServerSession {
    child: Child,
    stdin: Option<ChildStdin>,

    /// Raw stdout text, accumulated by the background reader
    stdout_buffer: Arc<Mutex<String>>,

    /// Raw stderr text, accumulated by the background reader
    stderr_buffer: Arc<Mutex<String>>,

    /// Decoded message bodies parsed out of the stdout stream
    server_messages: mpsc::UnboundedReceiver<String>,

    reader_tasks: Vec<JoinHandle<()>>,
}

impl ServerSession {
    /// Spawn the server process and start the background stream readers
    pub fn spawn(command: &str, args: &[String]) -> Result<Self, ProbeError> {
        info!("Spawning server process: {} {:?}", command, args);

        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProbeError::Spawn {
                command: command.to_string(),
                source,
            })?;

        debug!("Server process started with PID: {:?}", child.id());

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProbeError::Io(io::Error::other("server stdin not available")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProbeError::Io(io::Error::other("server stdout not available")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ProbeError::Io(io::Error::other("server stderr not available")))?;

        let stdout_buffer = Arc::new(Mutex::new(String::new()));
        let stderr_buffer = Arc::new(Mutex::new(String::new()));
        let (message_sender, server_messages) = mpsc::unbounded_channel();

        let stdout_task = tokio::spawn(Self::stdout_reader_task(
            stdout,
            Arc::clone(&stdout_buffer),
            message_sender,
        ));
        let stderr_task = tokio::spawn(Self::stderr_reader_task(
            stderr,
            Arc::clone(&stderr_buffer),
        ));

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout_buffer,
            stderr_buffer,
            server_messages,
            reader_tasks: vec![stdout_task, stderr_task],
        })
    }

    /// Background task draining stdout
    ///
    /// Captures raw bytes and feeds them through a frame decoder so the
    /// sequencer can observe individual server replies. Decoding degrades to
    /// capture-only if the server emits something that is not a valid frame.
    async fn stdout_reader_task(
        mut stdout: tokio::process::ChildStdout,
        buffer: Arc<Mutex<String>>,
        message_sender: mpsc::UnboundedSender<String>,
    ) {
        let mut decoder = FrameDecoder::new();
        let mut decoding = true;
        let mut chunk = [0u8; 4096];

        loop {
            match stdout.read(&mut chunk).await {
                Ok(0) => {
                    trace!("ServerSession: stdout EOF reached");
                    break;
                }
                Ok(n) => {
                    let bytes = &chunk[..n];
                    buffer
                        .lock()
                        .unwrap()
                        .push_str(&String::from_utf8_lossy(bytes));

                    if decoding {
                        decoder.push(bytes);
                        loop {
                            match decoder.next_frame() {
                                Ok(Some(body)) => {
                                    trace!("ServerSession: decoded server message: {}", body);
                                    if message_sender.send(body).is_err() {
                                        // Receiver dropped, keep capturing only
                                        decoding = false;
                                        break;
                                    }
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    warn!("Server stdout is not framed, capturing raw: {}", e);
                                    decoding = false;
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to read server stdout: {}", e);
                    break;
                }
            }
        }

        trace!("ServerSession: stdout reader finished");
    }

    /// Background task draining stderr line by line
    async fn stderr_reader_task(stderr: tokio::process::ChildStderr, buffer: Arc<Mutex<String>>) {
        let mut reader = BufReader::new(stderr);
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    trace!("ServerSession: stderr EOF reached");
                    break;
                }
                Ok(_) => {
                    trace!("ServerSession: stderr line: {}", line.trim_end());
                    buffer.lock().unwrap().push_str(&line);
                }
                Err(e) => {
                    warn!("Failed to read server stderr: {}", e);
                    break;
                }
            }
        }

        trace!("ServerSession: stderr reader finished");
    }

    /// Write a complete frame to the server's stdin and flush it
    pub async fn send(&mut self, frame: &[u8]) -> Result<(), ProbeError> {
        if self.child.try_wait().ok().flatten().is_some() {
            return Err(ProbeError::PipeClosed);
        }

        let stdin = self.stdin.as_mut().ok_or(ProbeError::PipeClosed)?;

        stdin.write_all(frame).await.map_err(map_pipe_error)?;
        stdin.flush().await.map_err(map_pipe_error)?;

        trace!("ServerSession: sent {} bytes", frame.len());
        Ok(())
    }

    /// Receive the next decoded server message, bounded by `wait`
    ///
    /// Returns `None` when the wait elapses or the stdout stream has ended.
    pub async fn next_server_message(&mut self, wait: Duration) -> Option<String> {
        tokio::time::timeout(wait, self.server_messages.recv())
            .await
            .ok()
            .flatten()
    }

    /// Half-close the server's input to signal no further messages; idempotent
    pub fn close_stdin(&mut self) {
        if self.stdin.take().is_some() {
            debug!("ServerSession: stdin closed");
        }
    }

    /// Wait for the server to exit and return everything it produced
    ///
    /// If the server is still alive when the timeout elapses it is forcibly
    /// terminated and `DrainTimeout` is returned; partial output stays
    /// available through [`captured`](Self::captured).
    pub async fn drain(&mut self, timeout: Duration) -> Result<CapturedOutput, ProbeError> {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(status) => {
                let status = status.map_err(ProbeError::Io)?;
                debug!("Server process exited with status: {}", status);

                // Let the readers consume everything up to EOF
                for task in self.reader_tasks.drain(..) {
                    let _ = task.await;
                }

                Ok(self.captured())
            }
            Err(_) => {
                warn!("Server did not exit within {:?}, terminating", timeout);
                self.terminate().await;
                Err(ProbeError::DrainTimeout { timeout })
            }
        }
    }

    /// Snapshot of everything captured so far
    pub fn captured(&self) -> CapturedOutput {
        CapturedOutput {
            stdout: self.stdout_buffer.lock().unwrap().clone(),
            stderr: self.stderr_buffer.lock().unwrap().clone(),
        }
    }

    /// Request server termination; idempotent, safe after exit
    ///
    /// Sends SIGTERM first and escalates to SIGKILL if the process does not
    /// exit within a short window.
    pub async fn terminate(&mut self) {
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }

        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            info!("Sending SIGTERM to server process {}", pid);
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }

        let grace = Duration::from_millis(200);
        if tokio::time::timeout(grace, self.child.wait()).await.is_err() {
            info!("Server ignored SIGTERM, force killing");
            let _ = self.child.start_kill();
            let _ = self.child.wait().await;
        }

        for task in self.reader_tasks.drain(..) {
            task.abort();
        }
    }

    /// Check whether the server process is still alive
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

/// Map stdin write failures: a broken pipe means the server went away
fn map_pipe_error(e: io::Error) -> ProbeError {
    if e.kind() == io::ErrorKind::BrokenPipe {
        ProbeError::PipeClosed
    } else {
        ProbeError::Io(e)
    }
}
