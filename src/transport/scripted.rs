//! In-memory shell for tests and offline runs.
//!
//! [`ScriptedTransport`] interprets a handful of commands (`pwd`, `cd`,
//! `echo`, `bytes N`, `true`, `exit`) and answers everything else with
//! "command not found". [`ScriptedDialer`] hands them out and lets a test
//! inject faults: failing dials, slow dials, a broken next read, a stalled
//! write, shells that are dead on arrival or die right after their first
//! `cd`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{ShellDialer, ShellTransport, SshTarget};
use crate::error::{ConnectError, TransportError};
use crate::session::DirResolver;

/// Output is split into chunks of this size, like a socket read.
const CHUNK: usize = 4096;

#[derive(Debug, Default)]
struct Flags {
    broken: AtomicBool,
    fault_next_read: AtomicBool,
    stall_next_write: AtomicBool,
    /// Arm `fault_next_read` on every write after the first.
    fault_after_setup: AtomicBool,
}

#[derive(Debug, Default)]
struct Shared {
    dials: usize,
    closed: usize,
    dial_failures: VecDeque<ConnectError>,
    dial_delay: Duration,
    doomed_dials: usize,
    dead_dials: usize,
    live: Vec<Arc<Flags>>,
    commands: Vec<String>,
}

/// Dialer producing [`ScriptedTransport`]s. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDialer {
    shared: Arc<Mutex<Shared>>,
}

impl ScriptedDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A target pointing nowhere, with the given working directory.
    pub fn target(working_dir: &str) -> SshTarget {
        SshTarget {
            host: "scripted".to_string(),
            port: 22,
            username: "tester".to_string(),
            password: None,
            key_path: None,
            working_dir: working_dir.to_string(),
        }
    }

    /// Make the next `count` dials fail with `error`.
    pub fn fail_next_dials(&self, count: usize, error: ConnectError) {
        let mut shared = self.lock();
        shared
            .dial_failures
            .extend(std::iter::repeat(error).take(count));
    }

    /// Delay every dial, to exercise connect timeouts.
    pub fn set_dial_delay(&self, delay: Duration) {
        self.lock().dial_delay = delay;
    }

    /// Make the next read on every live transport fail with `BrokenPipe`.
    pub fn fail_next_read(&self) {
        for flags in &self.lock().live {
            flags.fault_next_read.store(true, Ordering::SeqCst);
        }
    }

    /// The next `count` successful dials hand out shells that accept their
    /// first write (the initial `cd`) and fault on the read after any later
    /// one.
    pub fn fail_after_setup_on_next_dials(&self, count: usize) {
        self.lock().doomed_dials += count;
    }

    /// The next `count` successful dials hand out shells that are already
    /// broken, so even the initial `cd` fails.
    pub fn dead_on_next_dials(&self, count: usize) {
        self.lock().dead_dials += count;
    }

    /// Make the next write on every live transport hang forever.
    pub fn stall_next_write(&self) {
        for flags in &self.lock().live {
            flags.stall_next_write.store(true, Ordering::SeqCst);
        }
    }

    /// Mark every live transport broken, as if the host dropped the link.
    pub fn break_live_transports(&self) {
        for flags in &self.lock().live {
            flags.broken.store(true, Ordering::SeqCst);
        }
    }

    /// Dial attempts made so far, failed ones included.
    pub fn dial_count(&self) -> usize {
        self.lock().dials
    }

    /// Transports dialed and not yet closed.
    pub fn open_count(&self) -> usize {
        self.lock().live.len()
    }

    /// Transports closed through [`ShellTransport::close`].
    pub fn close_count(&self) -> usize {
        self.lock().closed
    }

    /// Every command line written to any transport, in order.
    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ShellDialer for ScriptedDialer {
    async fn dial(&self, _target: &SshTarget) -> Result<Box<dyn ShellTransport>, ConnectError> {
        let (delay, failure) = {
            let mut shared = self.lock();
            shared.dials += 1;
            (shared.dial_delay, shared.dial_failures.pop_front())
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = failure {
            return Err(error);
        }

        let flags = Arc::new(Flags::default());
        {
            let mut shared = self.lock();
            if shared.doomed_dials > 0 {
                shared.doomed_dials -= 1;
                flags.fault_after_setup.store(true, Ordering::SeqCst);
            }
            if shared.dead_dials > 0 {
                shared.dead_dials -= 1;
                flags.broken.store(true, Ordering::SeqCst);
            }
            shared.live.push(Arc::clone(&flags));
        }
        Ok(Box::new(ScriptedTransport {
            cwd: "/root".to_string(),
            pending: VecDeque::new(),
            writes: 0,
            flags,
            shared: Arc::clone(&self.shared),
            closed: false,
        }))
    }
}

/// A fake interactive shell.
#[derive(Debug)]
pub struct ScriptedTransport {
    cwd: String,
    pending: VecDeque<Vec<u8>>,
    writes: usize,
    flags: Arc<Flags>,
    shared: Arc<Mutex<Shared>>,
    closed: bool,
}

impl ScriptedTransport {
    fn interpret(&mut self, line: &str) {
        let line = line.trim();
        let (program, rest) = line.split_once(' ').unwrap_or((line, ""));
        let output = match program {
            "" | "true" => String::new(),
            "pwd" => format!("{}\n", self.cwd),
            "echo" => format!("{}\n", rest),
            "cd" => self.change_dir(rest.trim()),
            "bytes" => "x".repeat(rest.trim().parse().unwrap_or(0)),
            "exit" => {
                self.flags.broken.store(true, Ordering::SeqCst);
                "logout\n".to_string()
            }
            other => format!("bash: {}: command not found\n", other),
        };
        for chunk in output.as_bytes().chunks(CHUNK) {
            self.pending.push_back(chunk.to_vec());
        }
    }

    fn change_dir(&mut self, arg: &str) -> String {
        let arg = arg.trim_matches('\'');
        if arg.contains("missing") {
            return format!("bash: cd: {}: No such file or directory\n", arg);
        }
        if let Some(dir) = DirResolver::resolve(&self.cwd, arg) {
            self.cwd = dir;
        }
        String::new()
    }

    fn lock_shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ShellTransport for ScriptedTransport {
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.closed || self.flags.broken.load(Ordering::SeqCst) {
            return Err(TransportError::BrokenPipe);
        }
        if self.flags.stall_next_write.swap(false, Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.writes += 1;
        if self.writes > 1 && self.flags.fault_after_setup.load(Ordering::SeqCst) {
            self.flags.fault_next_read.store(true, Ordering::SeqCst);
        }
        let text = String::from_utf8_lossy(data).into_owned();
        for line in text.lines() {
            self.lock_shared().commands.push(line.to_string());
            self.interpret(line);
        }
        Ok(())
    }

    fn try_read(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        if self.flags.fault_next_read.swap(false, Ordering::SeqCst) {
            self.flags.broken.store(true, Ordering::SeqCst);
            self.pending.clear();
            return Err(TransportError::BrokenPipe);
        }
        match self.pending.pop_front() {
            Some(chunk) => Ok(Some(chunk)),
            None if self.is_broken() => Err(TransportError::BrokenPipe),
            None => Ok(None),
        }
    }

    fn is_broken(&self) -> bool {
        self.closed || self.flags.broken.load(Ordering::SeqCst)
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut shared = self.lock_shared();
        shared.closed += 1;
        shared.live.retain(|flags| !Arc::ptr_eq(flags, &self.flags));
    }
}
