//! IPC message dispatch: parse s-expressions and route to handlers.

use std::time::{SystemTime, UNIX_EPOCH};

use lexpr::Value;
use tracing::{debug, info, warn};

use crate::sexp::{bool_sexp, error_response, get_float, get_int, get_keyword, get_string, ok_response};
use crate::state::ShellState;
use crate::vr::fade::Easing;
use crate::vr::scene::{Pose, Vec3};
use crate::vr::workspace_switcher::WorkspaceKind;

pub const PROTOCOL_VERSION: i64 = 1;

/// Parse one message and dispatch it. Returns the response, if any.
pub fn handle_message(state: &mut ShellState, client_id: u64, raw: &str) -> Option<String> {
    let value = match lexpr::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(client_id, "malformed s-expression: {}", e);
            return Some(error_response(0, &format!("malformed s-expression: {e}")));
        }
    };

    let msg_type = get_keyword(&value, "type");
    let msg_id = get_int(&value, "id").unwrap_or(0);

    let is_authenticated = state
        .ipc_server
        .clients
        .get(&client_id)
        .map(|c| c.authenticated)
        .unwrap_or(false);

    match msg_type.as_deref() {
        Some("hello") => handle_hello(state, client_id, msg_id, &value),
        _ if !is_authenticated => Some(error_response(msg_id, "hello handshake required")),
        Some("ping") => handle_ping(msg_id, &value),
        Some("workspace-show") => handle_workspace_show(state, msg_id, &value),
        Some("workspace-next") => handle_workspace_step(state, msg_id, true),
        Some("workspace-previous") => handle_workspace_step(state, msg_id, false),
        Some("workspace-status") => handle_workspace_status(state, msg_id),
        Some("workspace-list") => handle_workspace_list(state, msg_id),
        Some("workspace-debug") => handle_workspace_debug(state, msg_id),
        Some("workspace-set-fade") => handle_workspace_set_fade(state, msg_id, &value),
        Some("workspace-configure") => handle_workspace_configure(state, msg_id, &value),
        Some("gaze-select-status") => handle_gaze_select_status(state, msg_id),
        Some("gaze-select-config") => handle_gaze_select_config(state, msg_id),
        Some("gaze-select-set-dwell") => handle_gaze_select_set_dwell(state, msg_id, &value),
        Some("gaze-select-set-cooldown") => handle_gaze_select_set_cooldown(state, msg_id, &value),
        Some("gaze-select-set-pose") => handle_gaze_select_set_pose(state, msg_id, &value),
        Some("gaze-select-set-distance") => handle_gaze_select_set_distance(state, msg_id, &value),
        Some("gaze-select-set-layer-mask") => handle_gaze_select_set_layer_mask(state, msg_id, &value),
        Some("frame-timing") => handle_frame_timing(state, msg_id),
        Some(other) => {
            debug!(client_id, msg_type = other, "unknown message type");
            Some(error_response(msg_id, &format!("unknown message type: {other}")))
        }
        None => Some(error_response(msg_id, "missing :type")),
    }
}

// ── Handlers ────────────────────────────────────────────────

fn handle_hello(
    state: &mut ShellState,
    client_id: u64,
    msg_id: i64,
    value: &Value,
) -> Option<String> {
    let version = get_int(value, "version").unwrap_or(0);
    if version != PROTOCOL_VERSION {
        return Some(error_response(
            msg_id,
            &format!("unsupported protocol version: {version}"),
        ));
    }

    let client = state.ipc_server.clients.get_mut(&client_id)?;
    if let Some(peer_uid) = client.peer_uid {
        let our_uid = unsafe { libc::getuid() };
        if peer_uid != our_uid {
            warn!(client_id, peer_uid, our_uid, "rejecting client: UID mismatch");
            return Some(error_response(msg_id, "authentication failed: UID mismatch"));
        }
    }

    client.name = get_string(value, "client").unwrap_or_default();
    client.authenticated = true;
    debug!(client_id, client_name = %client.name, "hello handshake (authenticated)");

    Some(format!(
        "(:type :hello :id {} :version {} :server \"ewwm-vr-shell\" :features (:workspaces t :gaze-select t))",
        msg_id, PROTOCOL_VERSION
    ))
}

fn handle_ping(msg_id: i64, value: &Value) -> Option<String> {
    let client_ts = get_int(value, "timestamp").unwrap_or(0);
    let server_ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    Some(format!(
        "(:type :response :id {} :status :ok :client-timestamp {} :server-timestamp {})",
        msg_id, client_ts, server_ts
    ))
}

/// Accepts `:workspace :work`, `"work"` or a numeric id.
fn parse_workspace(value: &Value) -> Option<WorkspaceKind> {
    let raw = get_keyword(value, "workspace")?;
    WorkspaceKind::from_str(&raw).or_else(|| raw.parse().ok().and_then(WorkspaceKind::from_id))
}

fn switch_response(state: &ShellState, msg_id: i64, started: bool) -> String {
    format!(
        "(:type :response :id {} :status :ok :started {} :active :{} :phase :{})",
        msg_id,
        bool_sexp(started),
        state.workspaces.current_workspace().as_str(),
        state.workspaces.phase().as_str()
    )
}

fn handle_workspace_show(state: &mut ShellState, msg_id: i64, value: &Value) -> Option<String> {
    let Some(target) = parse_workspace(value) else {
        return Some(error_response(msg_id, "missing or unknown :workspace"));
    };
    let started = state.workspaces.show_workspace(target);
    Some(switch_response(state, msg_id, started))
}

fn handle_workspace_step(state: &mut ShellState, msg_id: i64, forward: bool) -> Option<String> {
    let started = if forward {
        state.workspaces.next_workspace()
    } else {
        state.workspaces.previous_workspace()
    };
    Some(switch_response(state, msg_id, started))
}

fn handle_workspace_status(state: &mut ShellState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :workspace {})",
        msg_id,
        state.workspaces.status_sexp()
    ))
}

fn handle_workspace_list(state: &mut ShellState, msg_id: i64) -> Option<String> {
    let active = state.workspaces.current_workspace();
    let mut workspaces = String::from("(");
    for kind in WorkspaceKind::ALL {
        workspaces.push_str(&format!(
            "(:id {} :name :{} :loaded {} :active {})",
            kind.id(),
            kind.as_str(),
            bool_sexp(state.workspaces.instance(kind).is_some()),
            bool_sexp(kind == active)
        ));
    }
    workspaces.push(')');
    Some(format!(
        "(:type :response :id {} :status :ok :workspaces {})",
        msg_id, workspaces
    ))
}

fn handle_workspace_debug(state: &mut ShellState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :dump {})",
        msg_id,
        state.workspaces.debug_dump()
    ))
}

fn handle_gaze_select_status(state: &mut ShellState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :gaze-select {})",
        msg_id,
        state.gaze.status_sexp()
    ))
}

fn handle_gaze_select_config(state: &mut ShellState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :config {})",
        msg_id,
        state.gaze.config_sexp()
    ))
}

/// Read a non-negative millisecond field as seconds.
fn millis_field(value: &Value, key: &str) -> Result<f64, String> {
    match get_float(value, key) {
        Some(ms) if ms.is_finite() && ms >= 0.0 => Ok(ms / 1000.0),
        Some(_) => Err(format!(":{key} must be a non-negative number")),
        None => Err(format!("missing :{key}")),
    }
}

fn handle_workspace_set_fade(state: &mut ShellState, msg_id: i64, value: &Value) -> Option<String> {
    match millis_field(value, "fade-ms") {
        Ok(s) => {
            state.workspaces.set_fade_duration(s);
            Some(ok_response(msg_id))
        }
        Err(reason) => Some(error_response(msg_id, &reason)),
    }
}

/// `:workspace <kind> [:easing <curve>] [:transition-ms <ms>|nil]`.
fn handle_workspace_configure(state: &mut ShellState, msg_id: i64, value: &Value) -> Option<String> {
    let Some(kind) = parse_workspace(value) else {
        return Some(error_response(msg_id, "missing or unknown :workspace"));
    };

    let easing = match get_keyword(value, "easing") {
        None => None,
        Some(name) => match Easing::from_str(&name) {
            Some(e) => Some(e),
            None => return Some(error_response(msg_id, &format!("unknown easing: {name}"))),
        },
    };

    let transition = match get_keyword(value, "transition-ms").as_deref() {
        None => None,
        Some("nil") => Some(None),
        Some(_) => match millis_field(value, "transition-ms") {
            Ok(s) => Some(Some(s)),
            Err(reason) => return Some(error_response(msg_id, &reason)),
        },
    };

    if easing.is_none() && transition.is_none() {
        return Some(error_response(msg_id, "nothing to configure: give :easing or :transition-ms"));
    }
    state.workspaces.configure_workspace(kind, easing, transition);
    Some(ok_response(msg_id))
}

fn handle_gaze_select_set_dwell(state: &mut ShellState, msg_id: i64, value: &Value) -> Option<String> {
    match millis_field(value, "threshold-ms") {
        Ok(s) => {
            state.gaze.set_dwell_threshold(s);
            Some(ok_response(msg_id))
        }
        Err(reason) => Some(error_response(msg_id, &reason)),
    }
}

fn handle_gaze_select_set_cooldown(
    state: &mut ShellState,
    msg_id: i64,
    value: &Value,
) -> Option<String> {
    match millis_field(value, "cooldown-ms") {
        Ok(s) => {
            state.gaze.set_click_cooldown(s);
            Some(ok_response(msg_id))
        }
        Err(reason) => Some(error_response(msg_id, &reason)),
    }
}

fn handle_gaze_select_set_pose(state: &mut ShellState, msg_id: i64, value: &Value) -> Option<String> {
    let field = |key: &str| get_float(value, key).filter(|v| v.is_finite()).map(|v| v as f32);
    let (Some(x), Some(y), Some(z), Some(dx), Some(dy), Some(dz)) = (
        field("x"),
        field("y"),
        field("z"),
        field("dx"),
        field("dy"),
        field("dz"),
    ) else {
        return Some(error_response(msg_id, "pose requires :x :y :z :dx :dy :dz"));
    };
    let forward = Vec3::new(dx, dy, dz);
    if forward.normalized().is_none() {
        return Some(error_response(msg_id, "look direction must be non-zero"));
    }
    state.gaze.set_pose(Pose::new(Vec3::new(x, y, z), forward));
    info!(x, y, z, dx, dy, dz, "gaze pose set over IPC");
    Some(ok_response(msg_id))
}

fn handle_gaze_select_set_distance(
    state: &mut ShellState,
    msg_id: i64,
    value: &Value,
) -> Option<String> {
    match get_float(value, "distance") {
        Some(d) if d.is_finite() && d > 0.0 => {
            state.gaze.set_gaze_distance(d as f32);
            Some(ok_response(msg_id))
        }
        Some(_) => Some(error_response(msg_id, ":distance must be positive")),
        None => Some(error_response(msg_id, "missing :distance")),
    }
}

fn handle_gaze_select_set_layer_mask(
    state: &mut ShellState,
    msg_id: i64,
    value: &Value,
) -> Option<String> {
    match get_int(value, "mask").and_then(|m| u32::try_from(m).ok()) {
        Some(mask) => {
            state.gaze.set_layer_mask(mask);
            Some(ok_response(msg_id))
        }
        None => Some(error_response(msg_id, ":mask must be a 32-bit unsigned integer")),
    }
}

fn handle_frame_timing(state: &mut ShellState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :frames {} :timing {})",
        msg_id,
        state.frame_count,
        state.frame_timing.stats_sexp()
    ))
}
