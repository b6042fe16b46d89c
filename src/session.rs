//! Agent sessions: one agent process and its connection.
//!
//! Each session owns a background reader thread that decodes inbound lines
//! into a per-round, per-phase buffer. The round loop only ever talks to a
//! session through [`AgentLink`], so tests can drive it with in-process
//! streams instead of real processes.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::coordinator::AbortHandle;
use crate::error::{ChannelError, ProcessError, ProtocolError};
use crate::game::{Action, Phase, PlayerId, WorldSnapshot};
use crate::protocol::{encode_line, parse_inbound, HostMessage, Inbound, MAX_LINE_BYTES};

/// Most actions buffered for one round and phase. Further actions are dropped.
pub const MAX_BUFFERED_ACTIONS: usize = 4096;

/// How often the accept loop polls for the agent's connection.
const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// Write timeout for sessions that were not given one.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// The round loop's view of one agent.
pub trait AgentLink: Send + Sync {
    /// Seat of this agent.
    fn player_id(&self) -> PlayerId;

    /// Write one message.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] if the connection is closed or the write fails.
    fn send(&self, message: &HostMessage) -> Result<(), ChannelError>;

    /// Announce a phase start with the world as it stands.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] if the connection is closed or the write fails.
    fn send_snapshot(
        &self,
        round: u32,
        phase: Phase,
        state: &WorldSnapshot,
    ) -> Result<(), ChannelError>;

    /// Block until the agent signals the end of `phase` in `round`, or until
    /// `timeout` elapses. Returns whether the signal arrived.
    fn await_phase_end(&self, round: u32, phase: Phase, timeout: Duration) -> bool;

    /// Take the buffered actions for `round` and `phase`, in arrival order.
    fn drain_actions(&self, round: u32, phase: Phase) -> Vec<Action>;

    /// Inbound messages dropped as malformed, out of phase or oversized.
    fn protocol_errors(&self) -> u64;

    /// Whether the connection is still usable.
    fn is_alive(&self) -> bool;

    /// Shut the connection down and stop the agent. Idempotent.
    fn close(&self);
}

/// Settings for starting agent processes.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Interpreter for `.py` agents.
    pub python: String,
    /// How long an agent may take to connect back.
    pub startup_timeout: Duration,
    /// How long one outbound message may block before the channel is
    /// declared dead.
    pub write_timeout: Duration,
    /// Stops waiting for the connection when fired.
    pub abort: Option<AbortHandle>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            startup_timeout: Duration::from_secs(10),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            abort: None,
        }
    }
}

/// Build the command that runs `artifact`, with `port` as its last argument.
///
/// # Errors
///
/// Returns [`ProcessError`] if the artifact is missing or of an unknown kind.
pub fn agent_command(artifact: &Path, port: u16, python: &str) -> Result<Command, ProcessError> {
    if !artifact.is_file() {
        return Err(ProcessError::MissingArtifact(artifact.to_path_buf()));
    }
    let extension = artifact
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let mut command = match extension.as_deref() {
        Some("py") => {
            let mut command = Command::new(python);
            command.arg(artifact);
            command
        }
        Some("jar") => {
            let mut command = Command::new("java");
            command.arg("-jar").arg(artifact);
            command
        }
        Some("sh") => {
            let mut command = Command::new("sh");
            command.arg(artifact);
            command
        }
        None | Some("out" | "exe") => Command::new(artifact),
        Some(_) => return Err(ProcessError::UnsupportedArtifact(artifact.to_path_buf())),
    };
    command.arg(port.to_string()).stdin(Stdio::null());
    Ok(command)
}

/// Buffered inbound state shared with the reader thread.
///
/// Only phases after the last drained one and no later than the round after
/// the announced one are open, so at most eight keys are ever buffered.
#[derive(Debug, Default)]
struct Inbox {
    actions: BTreeMap<(u32, Phase), Vec<Action>>,
    finished: BTreeSet<(u32, Phase)>,
    /// Latest phase announced to the agent.
    announced: Option<(u32, Phase)>,
    /// Latest phase whose actions were taken.
    drained: Option<(u32, Phase)>,
    closed: bool,
}

impl Inbox {
    fn is_open(&self, key: (u32, Phase)) -> bool {
        let round = self.announced.map_or(0, |(round, _)| round);
        key.0 <= round.saturating_add(1) && self.drained.is_none_or(|drained| key > drained)
    }

    /// Key an `end_<part>` refers to. Without a `turn` only the phase that
    /// is currently announced can be ended.
    fn phase_end_key(&self, turn: Option<u32>, phase: Phase) -> Option<(u32, Phase)> {
        match (turn, self.announced) {
            (Some(turn), _) => Some((turn, phase)),
            (None, Some((round, current))) if current == phase => Some((round, phase)),
            (None, _) => None,
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    inbox: Mutex<Inbox>,
    signal: Condvar,
    protocol_errors: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inbox> {
        self.inbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reject(&self, player: PlayerId, error: &ProtocolError) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
        warn!(player, %error, "dropped inbound message");
    }

    fn deliver(&self, player: PlayerId, inbound: Inbound) {
        let mut inbox = self.lock();
        match inbound {
            Inbound::Action(submission) => {
                let (turn, phase) = (submission.turn, submission.phase);
                if !inbox.is_open((turn, phase)) {
                    drop(inbox);
                    self.reject(player, &ProtocolError::NotOpen { turn, phase });
                    return;
                }
                let queue = inbox.actions.entry((turn, phase)).or_default();
                if queue.len() >= MAX_BUFFERED_ACTIONS {
                    drop(inbox);
                    self.protocol_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(player, turn, phase = %submission.phase, "action buffer full");
                    return;
                }
                debug!(player, turn, phase = %submission.phase, command = submission.action.command(), "buffered action");
                queue.push(submission.action);
            }
            Inbound::PhaseEnd { turn, phase } => {
                let key = inbox
                    .phase_end_key(turn, phase)
                    .filter(|&key| inbox.is_open(key));
                let Some(key) = key else {
                    let turn = turn.or(inbox.announced.map(|(round, _)| round)).unwrap_or(0);
                    drop(inbox);
                    self.reject(player, &ProtocolError::NotOpen { turn, phase });
                    return;
                };
                inbox.finished.insert(key);
                self.signal.notify_all();
            }
        }
    }

    fn mark_closed(&self) {
        self.lock().closed = true;
        self.signal.notify_all();
    }
}

/// Outcome of reading one bounded line.
enum LineRead {
    Line,
    TooLong,
    Eof,
}

/// Read up to the next newline, keeping at most `MAX_LINE_BYTES` of it.
fn read_bounded_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<LineRead> {
    buf.clear();
    let limit = u64::try_from(MAX_LINE_BYTES).unwrap_or(u64::MAX) + 1;
    let read = reader.by_ref().take(limit).read_until(b'\n', buf)?;
    if read == 0 {
        return Ok(LineRead::Eof);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        return Ok(LineRead::Line);
    }
    if buf.len() <= MAX_LINE_BYTES {
        // Final line without a terminator.
        return Ok(LineRead::Line);
    }

    // Skip the rest of the oversized line.
    let mut rest = Vec::new();
    loop {
        rest.clear();
        let read = reader.by_ref().take(limit).read_until(b'\n', &mut rest)?;
        if read == 0 || rest.last() == Some(&b'\n') {
            return Ok(LineRead::TooLong);
        }
    }
}

fn read_loop(player: PlayerId, stream: TcpStream, shared: &Shared) {
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    loop {
        match read_bounded_line(&mut reader, &mut line) {
            Ok(LineRead::Eof) => {
                info!(player, "agent closed its connection");
                break;
            }
            Ok(LineRead::TooLong) => shared.reject(
                player,
                &ProtocolError::TooLarge {
                    limit: MAX_LINE_BYTES,
                },
            ),
            Ok(LineRead::Line) => {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                match parse_inbound(&line) {
                    Ok(inbound) => shared.deliver(player, inbound),
                    Err(error) => shared.reject(player, &error),
                }
            }
            Err(error) => {
                debug!(player, %error, "read loop stopped");
                break;
            }
        }
    }
    shared.mark_closed();
}

/// A live agent: its process (if launched by us) and its connection.
#[derive(Debug)]
pub struct AgentSession {
    player: PlayerId,
    label: PathBuf,
    writer: Mutex<BufWriter<TcpStream>>,
    control: TcpStream,
    shared: Arc<Shared>,
    write_failed: AtomicBool,
    child: Mutex<Option<Child>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl AgentSession {
    /// Start `artifact` and wait for it to connect to `listener`.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError`] if the process cannot be started, exits
    /// early, or does not connect within the startup window.
    pub fn launch(
        player: PlayerId,
        artifact: &Path,
        listener: &TcpListener,
        options: &LaunchOptions,
    ) -> Result<Self, ProcessError> {
        let port = listener.local_addr()?.port();
        let mut command = agent_command(artifact, port, &options.python)?;
        info!(player, artifact = %artifact.display(), port, "starting agent");
        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            path: artifact.to_path_buf(),
            source,
        })?;

        let accepted = accept_from(
            listener,
            &mut child,
            artifact,
            options.startup_timeout,
            options.abort.as_ref(),
        );
        match accepted {
            Ok(stream) => {
                let session = Self::from_stream(player, stream, Some(child), artifact)?;
                session.set_write_timeout(options.write_timeout)?;
                Ok(session)
            }
            Err(error) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(error)
            }
        }
    }

    /// Wrap an already connected stream. `child`, if given, is killed on close.
    ///
    /// Writes block for at most [`DEFAULT_WRITE_TIMEOUT`] until changed with
    /// [`AgentSession::set_write_timeout`].
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::Socket`] if the stream cannot be set up.
    pub fn from_stream(
        player: PlayerId,
        stream: TcpStream,
        child: Option<Child>,
        label: &Path,
    ) -> Result<Self, ProcessError> {
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(DEFAULT_WRITE_TIMEOUT))?;
        let reader_stream = stream.try_clone()?;
        let control = stream.try_clone()?;
        let shared = Arc::new(Shared::default());

        let thread_shared = Arc::clone(&shared);
        let reader = thread::Builder::new()
            .name(format!("agent-{player}"))
            .spawn(move || read_loop(player, reader_stream, &thread_shared))?;

        Ok(Self {
            player,
            label: label.to_path_buf(),
            writer: Mutex::new(BufWriter::new(stream)),
            control,
            shared,
            write_failed: AtomicBool::new(false),
            child: Mutex::new(child),
            reader: Mutex::new(Some(reader)),
        })
    }

    /// Artifact path (or other label) this session was created for.
    #[must_use]
    pub fn label(&self) -> &Path {
        &self.label
    }

    /// Bound how long one outbound message may block. An agent that stops
    /// reading is declared dead once a write exceeds this.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket option cannot be set.
    pub fn set_write_timeout(&self, timeout: Duration) -> io::Result<()> {
        // A zero timeout means "block forever" to the socket layer.
        let timeout = timeout.max(Duration::from_millis(1));
        self.control.set_write_timeout(Some(timeout))
    }

    fn write_line(&self, line: &[u8]) -> Result<(), ChannelError> {
        if !self.is_alive() {
            return Err(ChannelError::Closed(self.player));
        }
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let result = writer.write_all(line).and_then(|()| writer.flush());
        result.map_err(|source| {
            self.write_failed.store(true, Ordering::Relaxed);
            if matches!(
                source.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ) {
                warn!(player = self.player, "agent stopped reading; channel dropped");
            } else {
                warn!(player = self.player, error = %source, "agent channel died");
            }
            ChannelError::Write {
                player: self.player,
                source,
            }
        })
    }
}

/// Poll `listener` until the agent connects or exits, the window closes,
/// or `abort` fires.
fn accept_from(
    listener: &TcpListener,
    child: &mut Child,
    artifact: &Path,
    timeout: Duration,
    abort: Option<&AbortHandle>,
) -> Result<TcpStream, ProcessError> {
    listener.set_nonblocking(true)?;
    let deadline = Instant::now() + timeout;
    let outcome = loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!(%peer, "agent connected");
                break Ok(stream);
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                if let Some(status) = child.try_wait()? {
                    break Err(ProcessError::Exited {
                        path: artifact.to_path_buf(),
                        status: status.to_string(),
                    });
                }
                if abort.is_some_and(AbortHandle::is_aborted) {
                    break Err(ProcessError::Interrupted(artifact.to_path_buf()));
                }
                if Instant::now() >= deadline {
                    break Err(ProcessError::ConnectTimeout {
                        path: artifact.to_path_buf(),
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    });
                }
                thread::sleep(ACCEPT_POLL);
            }
            Err(error) => break Err(ProcessError::Socket(error)),
        }
    };
    listener.set_nonblocking(false)?;
    outcome
}

impl AgentLink for AgentSession {
    fn player_id(&self) -> PlayerId {
        self.player
    }

    fn send(&self, message: &HostMessage) -> Result<(), ChannelError> {
        let line = encode_line(message)?;
        self.write_line(&line)
    }

    fn send_snapshot(
        &self,
        round: u32,
        phase: Phase,
        state: &WorldSnapshot,
    ) -> Result<(), ChannelError> {
        {
            let mut inbox = self.shared.lock();
            inbox.announced = inbox.announced.max(Some((round, phase)));
        }
        self.send(&HostMessage::PartStart {
            turn: round,
            part: phase,
            state: state.clone(),
        })
    }

    fn await_phase_end(&self, round: u32, phase: Phase, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inbox = self.shared.lock();
        loop {
            if inbox.finished.contains(&(round, phase)) {
                return true;
            }
            if inbox.closed {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .shared
                .signal
                .wait_timeout(inbox, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            inbox = guard;
        }
    }

    fn drain_actions(&self, round: u32, phase: Phase) -> Vec<Action> {
        let key = (round, phase);
        let mut inbox = self.shared.lock();
        let drained = inbox.actions.remove(&key).unwrap_or_default();
        // Anything at or before this phase can no longer be used.
        inbox.actions.retain(|k, _| *k > key);
        inbox.finished.retain(|k| *k > key);
        inbox.drained = inbox.drained.max(Some(key));
        drained
    }

    fn protocol_errors(&self) -> u64 {
        self.shared.protocol_errors.load(Ordering::Relaxed)
    }

    fn is_alive(&self) -> bool {
        !self.write_failed.load(Ordering::Relaxed) && !self.shared.lock().closed
    }

    fn close(&self) {
        let _ = self.control.shutdown(Shutdown::Both);
        let child = self
            .child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut child) = child {
            let _ = child.kill();
            let _ = child.wait();
        }
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(reader) = reader {
            let _ = reader.join();
        }
        self.shared.mark_closed();
    }
}

impl Drop for AgentSession {
    fn drop(&mut self) {
        self.close();
    }
}
