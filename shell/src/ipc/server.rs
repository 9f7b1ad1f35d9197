//! IPC server: Unix socket listener, per-client buffers and framing.
//!
//! Frames are a 4-byte big-endian length followed by a UTF-8
//! s-expression payload.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Instant;

use calloop::generic::Generic;
use calloop::{Interest, LoopHandle, Mode, PostAction};
use tracing::{debug, error, info, warn};

use super::dispatch;
use crate::state::ShellState;

/// Maximum message payload size (1 MiB).
const MAX_MESSAGE_SIZE: u32 = 1_048_576;

/// Write buffer size past which events are dropped (64 KiB).
const MAX_WRITE_BUFFER: usize = 65_536;

/// Messages per second per client.
const DEFAULT_RATE_LIMIT: u32 = 200;

/// Fixed-window per-client rate limiter.
pub struct RateLimiter {
    window_start: Instant,
    message_count: u32,
    pub max_per_second: u32,
}

impl RateLimiter {
    fn new(max_per_second: u32) -> Self {
        Self {
            window_start: Instant::now(),
            message_count: 0,
            max_per_second,
        }
    }

    /// Count one message; false once the window's quota is spent.
    fn check(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.window_start).as_secs() >= 1 {
            self.window_start = now;
            self.message_count = 0;
        }
        self.message_count += 1;
        self.message_count <= self.max_per_second
    }
}

/// Peer UID via SO_PEERCRED on Linux.
fn peer_uid(stream: &UnixStream) -> Option<u32> {
    #[cfg(target_os = "linux")]
    {
        let mut cred: libc::ucred = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockopt(
                stream.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                &mut cred as *mut _ as *mut libc::c_void,
                &mut len,
            )
        };
        (ret == 0).then_some(cred.uid)
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = stream.as_raw_fd();
        None
    }
}

/// One connected client.
pub struct IpcClient {
    pub id: u64,
    stream: Option<UnixStream>,
    pub read_buf: Vec<u8>,
    pub write_buf: Vec<u8>,
    pub authenticated: bool,
    pub peer_uid: Option<u32>,
    pub name: String,
    rate_limiter: RateLimiter,
}

impl IpcClient {
    fn new(stream: UnixStream, id: u64) -> Self {
        if let Err(e) = stream.set_nonblocking(true) {
            warn!(client_id = id, "set_nonblocking failed: {}", e);
        }
        let peer_uid = peer_uid(&stream);
        debug!(client_id = id, ?peer_uid, "peer credentials");
        let mut client = Self::detached(id);
        client.stream = Some(stream);
        client.peer_uid = peer_uid;
        client
    }

    /// A client with no socket, used by dispatch tests.
    pub fn detached(id: u64) -> Self {
        Self {
            id,
            stream: None,
            read_buf: Vec::with_capacity(4096),
            write_buf: Vec::new(),
            authenticated: false,
            peer_uid: None,
            name: String::new(),
            rate_limiter: RateLimiter::new(DEFAULT_RATE_LIMIT),
        }
    }

    /// Read whatever is available. `Err` means the peer is gone.
    fn fill_read_buf(&mut self) -> io::Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        let mut buf = [0u8; 4096];
        loop {
            match stream.read(&mut buf) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::ConnectionReset, "eof")),
                Ok(n) => self.read_buf.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn flush_writes(&mut self) -> io::Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        while !self.write_buf.is_empty() {
            match stream.write(&self.write_buf) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "write zero")),
                Ok(n) => {
                    self.write_buf.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Frame and queue a message.
    pub fn enqueue_message(&mut self, payload: &str) {
        let bytes = payload.as_bytes();
        self.write_buf
            .extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        self.write_buf.extend_from_slice(bytes);
    }

    /// Queue an event unless the client is too far behind.
    pub fn enqueue_event(&mut self, payload: &str) {
        if self.write_buf.len() > MAX_WRITE_BUFFER {
            warn!(client_id = self.id, "write buffer overflow, dropping event");
            return;
        }
        self.enqueue_message(payload);
    }

    /// Split complete frames off the read buffer. `Err` on an oversized
    /// frame, after which the client should be dropped.
    pub fn extract_messages(&mut self) -> Result<Vec<String>, u32> {
        let mut messages = Vec::new();
        while self.read_buf.len() >= 4 {
            let len = u32::from_be_bytes([
                self.read_buf[0],
                self.read_buf[1],
                self.read_buf[2],
                self.read_buf[3],
            ]);
            if len > MAX_MESSAGE_SIZE {
                self.read_buf.clear();
                return Err(len);
            }
            let total = 4 + len as usize;
            if self.read_buf.len() < total {
                break;
            }
            messages.push(String::from_utf8_lossy(&self.read_buf[4..total]).into_owned());
            self.read_buf.drain(..total);
        }
        Ok(messages)
    }
}

/// Listener socket plus every connected client.
pub struct IpcServer {
    pub socket_path: PathBuf,
    pub clients: HashMap<u64, IpcClient>,
    next_client_id: u64,
    pub ipc_trace: bool,
}

impl IpcServer {
    /// Does not bind; see `bind`.
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            clients: HashMap::new(),
            next_client_id: 1,
            ipc_trace: false,
        }
    }

    /// `$XDG_RUNTIME_DIR/ewwm-vr-shell.sock`, or a per-uid dir in /tmp.
    pub fn default_socket_path() -> PathBuf {
        let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
            .unwrap_or_else(|_| format!("/tmp/ewwm-{}", unsafe { libc::getuid() }));
        PathBuf::from(runtime_dir).join("ewwm-vr-shell.sock")
    }

    /// Bind the listener and register it with the event loop.
    pub fn bind(socket_path: &Path, loop_handle: &LoopHandle<'static, ShellState>) -> anyhow::Result<()> {
        if socket_path.exists() {
            std::fs::remove_file(socket_path)?;
        }
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(socket_path)?;
        listener.set_nonblocking(true)?;

        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o700))?;
        }

        info!(?socket_path, "IPC server listening");

        let source = Generic::new(listener, Interest::READ, Mode::Level);
        loop_handle
            .insert_source(source, |_event, listener, state| {
                loop {
                    match listener.accept() {
                        Ok((stream, _addr)) => state.ipc_server.accept(stream),
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(e) => {
                            error!("accept error: {}", e);
                            break;
                        }
                    }
                }
                Ok(PostAction::Continue)
            })
            .map_err(|e| anyhow::anyhow!("failed to register IPC listener: {}", e.error))?;

        Ok(())
    }

    fn accept(&mut self, stream: UnixStream) {
        let client_id = self.next_client_id;
        self.next_client_id += 1;
        info!(client_id, "IPC client connected");
        self.clients.insert(client_id, IpcClient::new(stream, client_id));
    }

    /// Read, dispatch and flush every client. Called once per loop
    /// iteration.
    pub fn poll_clients(state: &mut ShellState) {
        let client_ids: Vec<u64> = state.ipc_server.clients.keys().copied().collect();
        let mut disconnected = Vec::new();

        for client_id in client_ids {
            let messages = {
                let Some(client) = state.ipc_server.clients.get_mut(&client_id) else {
                    continue;
                };
                if let Err(e) = client.fill_read_buf() {
                    debug!(client_id, "client disconnected: {}", e);
                    disconnected.push(client_id);
                    continue;
                }
                match client.extract_messages() {
                    Ok(messages) => messages,
                    Err(len) => {
                        error!(client_id, len, "message exceeds maximum size");
                        disconnected.push(client_id);
                        continue;
                    }
                }
            };

            for msg in messages {
                Self::handle_one(state, client_id, &msg);
            }

            if let Some(client) = state.ipc_server.clients.get_mut(&client_id) {
                if let Err(e) = client.flush_writes() {
                    debug!(client_id, "write error: {}", e);
                    disconnected.push(client_id);
                }
            }
        }

        for id in disconnected {
            info!(client_id = id, "removing disconnected IPC client");
            state.ipc_server.clients.remove(&id);
        }
    }

    fn handle_one(state: &mut ShellState, client_id: u64, msg: &str) {
        let rate_ok = state
            .ipc_server
            .clients
            .get_mut(&client_id)
            .map(|c| c.rate_limiter.check())
            .unwrap_or(false);
        if !rate_ok {
            warn!(client_id, "rate limit exceeded, dropping message");
            if let Some(client) = state.ipc_server.clients.get_mut(&client_id) {
                client.enqueue_message(&crate::sexp::error_response(0, "rate limit exceeded"));
            }
            return;
        }

        if state.ipc_server.ipc_trace {
            info!(client_id, "<< {}", msg);
        }
        if let Some(resp) = dispatch::handle_message(state, client_id, msg) {
            if state.ipc_server.ipc_trace {
                info!(client_id, ">> {}", resp);
            }
            if let Some(client) = state.ipc_server.clients.get_mut(&client_id) {
                client.enqueue_message(&resp);
            }
        }
    }

    /// Queue an event for every authenticated client.
    pub fn broadcast_event(&mut self, event: &str) {
        if self.ipc_trace {
            info!("broadcast >> {}", event);
        }
        for client in self.clients.values_mut() {
            if client.authenticated {
                client.enqueue_event(event);
            }
        }
    }

    /// Push queued writes without waiting for the next poll.
    pub fn flush_all(&mut self) {
        for client in self.clients.values_mut() {
            if let Err(e) = client.flush_writes() {
                debug!(client_id = client.id, "write error: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payload: &str) -> Vec<u8> {
        let mut v = (payload.len() as u32).to_be_bytes().to_vec();
        v.extend_from_slice(payload.as_bytes());
        v
    }

    #[test]
    fn test_extract_complete_and_partial_frames() {
        let mut client = IpcClient::detached(1);
        client.read_buf.extend(frame("(:type :ping)"));
        let second = frame("(:type :workspace-next)");
        client.read_buf.extend_from_slice(&second[..6]);

        let msgs = client.extract_messages().unwrap();
        assert_eq!(msgs, vec!["(:type :ping)".to_string()]);
        assert_eq!(client.read_buf.len(), 6);

        client.read_buf.extend_from_slice(&second[6..]);
        let msgs = client.extract_messages().unwrap();
        assert_eq!(msgs, vec!["(:type :workspace-next)".to_string()]);
        assert!(client.read_buf.is_empty());
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut client = IpcClient::detached(1);
        client
            .read_buf
            .extend_from_slice(&(MAX_MESSAGE_SIZE + 1).to_be_bytes());
        assert_eq!(client.extract_messages(), Err(MAX_MESSAGE_SIZE + 1));
        assert!(client.read_buf.is_empty());
    }

    #[test]
    fn test_enqueue_message_framing() {
        let mut client = IpcClient::detached(1);
        client.enqueue_message("abc");
        assert_eq!(client.write_buf, vec![0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_event_backpressure() {
        let mut client = IpcClient::detached(1);
        client.write_buf = vec![0; MAX_WRITE_BUFFER + 1];
        client.enqueue_event("(:type :event)");
        assert_eq!(client.write_buf.len(), MAX_WRITE_BUFFER + 1);
    }

    #[test]
    fn test_broadcast_only_authenticated() {
        let mut server = IpcServer::new(PathBuf::from("/nonexistent.sock"));
        let mut authed = IpcClient::detached(1);
        authed.authenticated = true;
        server.clients.insert(1, authed);
        server.clients.insert(2, IpcClient::detached(2));

        server.broadcast_event("(:type :event :event :x)");
        assert!(!server.clients[&1].write_buf.is_empty());
        assert!(server.clients[&2].write_buf.is_empty());
    }

    #[test]
    fn test_rate_limiter_window() {
        let mut rl = RateLimiter::new(2);
        assert!(rl.check());
        assert!(rl.check());
        assert!(!rl.check());
    }

    #[test]
    fn test_bind_and_accept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ipc.sock");
        let mut event_loop = calloop::EventLoop::<ShellState>::try_new().unwrap();
        IpcServer::bind(&path, &event_loop.handle()).unwrap();

        let mut state = ShellState::new(
            &crate::config::ShellConfig::default(),
            Box::new(crate::settings::MemoryStore::new()),
        );
        let _peer = UnixStream::connect(&path).unwrap();
        event_loop
            .dispatch(Some(std::time::Duration::from_millis(100)), &mut state)
            .unwrap();
        assert_eq!(state.ipc_server.clients.len(), 1);
    }
}
