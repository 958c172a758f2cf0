//! SSH transport built on russh.
//!
//! The russh channel is owned by a pump task. Writes reach it through a
//! bounded queue and are acknowledged; output chunks come back through an
//! unbounded queue that [`ShellTransport::try_read`] drains without waiting.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_keys::key;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::{ShellDialer, ShellTransport, SshTarget};
use crate::error::{ConnectError, TransportError};

/// Terminal size requested for the remote PTY.
const PTY_COLS: u32 = 200;
const PTY_ROWS: u32 = 50;

/// Pending writes before `write` waits for the pump.
const WRITE_QUEUE: usize = 16;

/// How long `close` waits for the pump to disconnect cleanly.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Opens interactive shells over SSH.
pub struct SshDialer {
    config: Arc<client::Config>,
}

impl SshDialer {
    pub fn new() -> Self {
        let config = client::Config {
            keepalive_interval: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        Self {
            config: Arc::new(config),
        }
    }
}

impl Default for SshDialer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ShellDialer for SshDialer {
    async fn dial(&self, target: &SshTarget) -> Result<Box<dyn ShellTransport>, ConnectError> {
        debug!(target = %target.address(), "dialing");
        let handler = HostKeyLogger {
            host: target.host.clone(),
        };
        let mut handle = client::connect(
            Arc::clone(&self.config),
            (target.host.as_str(), target.port),
            handler,
        )
        .await
        .map_err(network)?;

        authenticate(&mut handle, target).await?;

        let channel = handle.channel_open_session().await.map_err(network)?;
        channel
            .request_pty(false, "xterm", PTY_COLS, PTY_ROWS, 0, 0, &[])
            .await
            .map_err(network)?;
        channel.request_shell(false).await.map_err(network)?;

        let (input_tx, input_rx) = mpsc::channel(WRITE_QUEUE);
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let broken = Arc::new(AtomicBool::new(false));
        let pump = tokio::spawn(pump(
            handle,
            channel,
            input_rx,
            output_tx,
            Arc::clone(&broken),
        ));

        Ok(Box::new(SshTransport {
            input: Some(input_tx),
            output: output_rx,
            broken,
            pump: Some(pump),
        }))
    }
}

fn network(e: russh::Error) -> ConnectError {
    ConnectError::Network(e.to_string())
}

/// Accepts any host key and logs its fingerprint.
struct HostKeyLogger {
    host: String,
}

#[async_trait]
impl client::Handler for HostKeyLogger {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(
            host = %self.host,
            fingerprint = %server_public_key.fingerprint(),
            "accepting host key"
        );
        Ok(true)
    }
}

/// Password first, then a private key, then `none`.
async fn authenticate(
    handle: &mut client::Handle<HostKeyLogger>,
    target: &SshTarget,
) -> Result<(), ConnectError> {
    let user = target.username.as_str();
    let accepted = if let Some(password) = &target.password {
        handle.authenticate_password(user, password).await
    } else if let Some(path) = key_candidate(target) {
        let pair = russh_keys::load_secret_key(&path, None).map_err(|e| {
            warn!(path = %path.display(), error = %e, "cannot load private key");
            ConnectError::Auth {
                user: user.to_string(),
            }
        })?;
        handle.authenticate_publickey(user, Arc::new(pair)).await
    } else {
        handle.authenticate_none(user).await
    };

    match accepted {
        Ok(true) => Ok(()),
        Ok(false) => Err(ConnectError::Auth {
            user: user.to_string(),
        }),
        Err(e) => Err(network(e)),
    }
}

/// The configured key, else the first default key present in `~/.ssh`.
fn key_candidate(target: &SshTarget) -> Option<PathBuf> {
    if let Some(path) = &target.key_path {
        return Some(path.clone());
    }
    let home = std::env::var_os("HOME")?;
    ["id_ed25519", "id_rsa"]
        .iter()
        .map(|name| Path::new(&home).join(".ssh").join(name))
        .find(|path| path.is_file())
}

struct WriteRequest {
    data: Vec<u8>,
    ack: oneshot::Sender<Result<(), TransportError>>,
}

/// Own the channel until either side goes away, then disconnect.
async fn pump(
    handle: client::Handle<HostKeyLogger>,
    mut channel: Channel<Msg>,
    mut input: mpsc::Receiver<WriteRequest>,
    output: mpsc::UnboundedSender<Vec<u8>>,
    broken: Arc<AtomicBool>,
) {
    loop {
        tokio::select! {
            request = input.recv() => match request {
                Some(WriteRequest { data, ack }) => {
                    let result = channel.data(&data[..]).await.map_err(|e| {
                        debug!(error = %e, "channel write failed");
                        TransportError::BrokenPipe
                    });
                    let failed = result.is_err();
                    let _ = ack.send(result);
                    if failed {
                        break;
                    }
                }
                // owner closed the transport
                None => break,
            },
            message = channel.wait() => match message {
                Some(ChannelMsg::Data { data }) | Some(ChannelMsg::ExtendedData { data, .. }) => {
                    trace!(bytes = data.len(), "shell output");
                    let _ = output.send(data.to_vec());
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    debug!(exit_status, "remote shell exited");
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    debug!("shell channel closed by remote");
                    break;
                }
                Some(_) => {}
            },
        }
    }

    broken.store(true, Ordering::SeqCst);
    let _ = channel.close().await;
    if let Err(e) = handle
        .disconnect(Disconnect::ByApplication, "session closed", "en")
        .await
    {
        debug!(error = %e, "disconnect failed");
    }
}

/// Handle on a pumped SSH shell channel.
struct SshTransport {
    input: Option<mpsc::Sender<WriteRequest>>,
    output: mpsc::UnboundedReceiver<Vec<u8>>,
    broken: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
}

#[async_trait]
impl ShellTransport for SshTransport {
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let input = self.input.as_ref().ok_or(TransportError::BrokenPipe)?;
        let (ack, done) = oneshot::channel();
        let request = WriteRequest {
            data: data.to_vec(),
            ack,
        };
        if input.send(request).await.is_err() {
            self.broken.store(true, Ordering::SeqCst);
            return Err(TransportError::BrokenPipe);
        }
        done.await.unwrap_or(Err(TransportError::BrokenPipe))
    }

    fn try_read(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        match self.output.try_recv() {
            Ok(chunk) => Ok(Some(chunk)),
            Err(TryRecvError::Empty) if self.is_broken() => Err(TransportError::BrokenPipe),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::BrokenPipe),
        }
    }

    fn is_broken(&self) -> bool {
        self.input.is_none() || self.broken.load(Ordering::SeqCst)
    }

    async fn close(&mut self) {
        // dropping the sender ends the pump loop
        self.input = None;
        let Some(mut pump) = self.pump.take() else {
            return;
        };
        if tokio::time::timeout(CLOSE_GRACE, &mut pump).await.is_err() {
            warn!("ssh pump did not stop in time, aborting");
            pump.abort();
        }
    }
}

impl Drop for SshTransport {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}
