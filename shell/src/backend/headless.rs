//! Headless backend: drives the shell from a calloop frame timer.
//!
//! Frame ticks come from a repeating `Timer`; the IPC listener is a
//! `Generic` source. Client sockets are polled and component events
//! broadcast once per loop iteration. SIGTERM/SIGINT end the loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use calloop::timer::{TimeoutAction, Timer};
use calloop::EventLoop;
use tracing::info;

use super::IpcConfig;
use crate::config::ShellConfig;
use crate::ipc;
use crate::settings::SettingsStore;
use crate::state::ShellState;

/// Set by the SIGTERM/SIGINT handler.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Loop-level settings for the headless backend.
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    /// Exit after this long (CI).
    pub exit_after: Option<Duration>,
    /// How often to log a status line.
    pub status_interval: Duration,
    /// Install process-wide SIGTERM/SIGINT handlers.
    pub handle_signals: bool,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            exit_after: None,
            status_interval: Duration::from_secs(60),
            handle_signals: true,
        }
    }
}

fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, signal_handler as libc::sighandler_t);
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Send queued component events to every authenticated client.
fn broadcast_pending(state: &mut ShellState) {
    for event in state.drain_events() {
        state.ipc_server.broadcast_event(&event);
    }
    state.ipc_server.flush_all();
}

/// Run the shell until a signal, the exit timer, or `running` goes false.
pub fn run(
    shell_config: &ShellConfig,
    store: Box<dyn SettingsStore>,
    ipc_config: IpcConfig,
    config: HeadlessConfig,
) -> anyhow::Result<()> {
    let mut event_loop = EventLoop::<ShellState>::try_new()?;
    let mut state = ShellState::new(shell_config, store);

    state.ipc_server.ipc_trace = ipc_config.trace;
    let ipc_path = ipc_config
        .socket_path
        .unwrap_or_else(ipc::IpcServer::default_socket_path);
    state.ipc_server.socket_path = ipc_path.clone();
    ipc::IpcServer::bind(&ipc_path, &event_loop.handle())?;

    let frame_interval = shell_config.frame_interval();
    event_loop
        .handle()
        .insert_source(Timer::from_duration(frame_interval), move |_deadline, _, state| {
            state.tick_now();
            TimeoutAction::ToDuration(frame_interval)
        })
        .map_err(|e| anyhow::anyhow!("failed to insert frame timer: {}", e.error))?;

    if config.handle_signals {
        install_signal_handlers();
    }
    state.start();

    let start_time = Instant::now();
    let mut last_status_log = Instant::now();
    info!(
        "Headless shell running at {} Hz, IPC at {}",
        shell_config.frame_rate_hz,
        ipc_path.display()
    );

    while state.running {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            info!("Shutdown signal received, exiting");
            state.running = false;
            break;
        }

        if let Some(dur) = config.exit_after {
            if start_time.elapsed() >= dur {
                info!("Headless exit timer fired after {:.1}s", dur.as_secs_f64());
                state.running = false;
                break;
            }
        }

        if last_status_log.elapsed() >= config.status_interval {
            info!(
                "Headless status: workspace {}, {} frame(s), {} enter animation(s), {} gaze click(s), {} IPC client(s)",
                state.workspaces.current_workspace().as_str(),
                state.frame_count,
                state.scene.borrow().animations_played,
                state.gaze.analytics.clicks(),
                state.ipc_server.clients.len()
            );
            last_status_log = Instant::now();
        }

        ipc::IpcServer::poll_clients(&mut state);
        broadcast_pending(&mut state);

        event_loop.dispatch(Some(frame_interval), &mut state)?;
    }

    let _ = std::fs::remove_file(&state.ipc_server.socket_path);

    info!(
        "Headless shell shutting down ({} frame(s), workspace {})",
        state.frame_count,
        state.workspaces.current_workspace().as_str()
    );
    Ok(())
}
