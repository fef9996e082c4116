//! Browser viewer page.

use axum::{extract::Path, response::Html};

/// `GET /viewer/{key}`
pub async fn viewer_handler(Path(key): Path<String>) -> Html<String> {
    Html(render_viewer(&key))
}

/// Viewer page for `key`.
#[must_use]
pub fn render_viewer(key: &str) -> String {
    VIEWER_HTML.replace("{{KEY}}", &escape_html(key))
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            c => escaped.push(c),
        }
    }
    escaped
}

const VIEWER_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Log Relay - {{KEY}}</title>
    <style>
        body {
            margin: 0;
            padding: 20px;
            background: #1e1e1e;
            color: #d4d4d4;
            font-family: Menlo, Monaco, "Courier New", monospace;
        }
        h1 { color: #fff; font-family: system-ui, sans-serif; margin-bottom: 10px; }
        .toolbar { display: flex; gap: 12px; align-items: center; margin-bottom: 10px; }
        .status { color: #888; font-size: 14px; }
        .connected { color: #4a4; }
        .disconnected { color: #a44; }
        #logs { height: calc(100vh - 130px); overflow-y: auto; font-size: 13px; }
        .entry { padding: 2px 0; border-bottom: 1px solid #2a2a2a; white-space: pre-wrap; }
        .time { color: #777; margin-right: 8px; }
        .debug { color: #9cdcfe; }
        .info { color: #d4d4d4; }
        .warning { color: #dcdcaa; }
        .error { color: #f48771; }
    </style>
</head>
<body data-key="{{KEY}}">
    <h1>Log Relay: {{KEY}}</h1>
    <div class="toolbar">
        <span class="status" id="status">Connecting...</span>
        <button id="clear">Clear</button>
    </div>
    <div id="logs"></div>

    <script>
        const key = document.body.dataset.key;
        const logs = document.getElementById('logs');
        const status = document.getElementById('status');
        let ws;

        function append(log) {
            const entry = document.createElement('div');
            entry.className = 'entry ' + log.level;
            const time = document.createElement('span');
            time.className = 'time';
            time.textContent = new Date(log.timestamp * 1000).toLocaleTimeString();
            entry.appendChild(time);
            entry.appendChild(document.createTextNode('[' + log.level + '] ' + log.formatted));
            logs.appendChild(entry);
            logs.scrollTop = logs.scrollHeight;
        }

        function connect() {
            const protocol = window.location.protocol === 'https:' ? 'wss:' : 'ws:';
            ws = new WebSocket(`${protocol}//${window.location.host}/ws`);

            ws.onopen = () => {
                status.textContent = 'Connected';
                status.className = 'status connected';
                ws.send(JSON.stringify({ action: 'register', key }));
            };

            ws.onclose = () => {
                status.textContent = 'Disconnected - reconnecting...';
                status.className = 'status disconnected';
                setTimeout(connect, 2000);
            };

            ws.onmessage = (event) => {
                try {
                    const msg = JSON.parse(event.data);
                    if (msg.type === 'registered') {
                        logs.textContent = '';
                        msg.bufferedLogs.forEach(append);
                    } else if (msg.type === 'log') {
                        append(msg);
                    } else if (msg.type === 'cleared') {
                        logs.textContent = '';
                    } else if (msg.type === 'error') {
                        console.error('Relay error:', msg.error);
                    }
                } catch (e) {
                    console.error('Failed to parse message:', e);
                }
            };
        }

        document.getElementById('clear').addEventListener('click', () => {
            if (ws && ws.readyState === WebSocket.OPEN) {
                ws.send(JSON.stringify({ action: 'clear', key }));
            }
        });

        connect();
    </script>
</body>
</html>
"#;
