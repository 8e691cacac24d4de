//! The bootstrap page served at `/`.
//!
//! The page embeds `assets/bootstrap.js` with three placeholders filled in:
//! the client id, the WebSocket path, and the build payload (script the
//! client runs before it opens the socket; empty in shadow mode).

const BOOTSTRAP_JS: &str = include_str!("../../assets/bootstrap.js");

pub const CLIENT_ID_PLACEHOLDER: &str = "__TETHER_CLIENT_ID__";
pub const WS_PATH_PLACEHOLDER: &str = "__TETHER_WS_PATH__";
pub const BUILD_PAYLOAD_PLACEHOLDER: &str = "/*__TETHER_BUILD_PAYLOAD__*/";

/// Renders the full HTML page for one client.
pub fn render_page(client_id: &str, ws_path: &str, build_payload: &str) -> String {
    let script = BOOTSTRAP_JS
        .replace(CLIENT_ID_PLACEHOLDER, &js_literal_body(client_id))
        .replace(WS_PATH_PLACEHOLDER, &js_literal_body(ws_path))
        .replace(BUILD_PAYLOAD_PLACEHOLDER, &escape_script_close(build_payload));
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<script>\n{script}\n</script>\n</head>\n<body onload=\"buildPage()\">\n</body>\n</html>\n"
    )
}

/// The inside of a double-quoted JS string literal for `s`.
fn js_literal_body(s: &str) -> String {
    let quoted = serde_json::Value::String(s.to_string()).to_string();
    escape_script_close(&quoted[1..quoted.len() - 1])
}

/// `</` would end the surrounding `<script>` element early.
fn escape_script_close(js: &str) -> String {
    js.replace("</", "<\\/")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
