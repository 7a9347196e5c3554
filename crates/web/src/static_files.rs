//! Embedded viewer page

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

/// Serves the bundled viewer assets
pub struct StaticFiles {}

impl StaticFiles {
    pub fn new() -> Self {
        Self {}
    }

    /// Serve an embedded file
    pub fn serve(&self, path: &str) -> Response {
        let content_type = guess_content_type(path);

        match path {
            "index.html" => serve_embedded(INDEX_HTML, content_type),
            "viewer.js" => serve_embedded(VIEWER_JS, content_type),
            _ => (StatusCode::NOT_FOUND, "File not found").into_response(),
        }
    }
}

impl Default for StaticFiles {
    fn default() -> Self {
        Self::new()
    }
}

fn guess_content_type(path: &str) -> &'static str {
    if path.ends_with(".js") {
        "application/javascript"
    } else if path.ends_with(".html") {
        "text/html; charset=utf-8"
    } else if path.ends_with(".png") {
        "image/png"
    } else {
        "application/octet-stream"
    }
}

fn serve_embedded(content: &'static str, content_type: &'static str) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        content,
    )
        .into_response()
}

const INDEX_HTML: &str = r#"<!doctype html>
<html>
<head>
  <meta charset="utf-8">
  <title>shotdiff</title>
  <style>
    body { font-family: sans-serif; margin: 1em 2em; }
    .test { border-top: 1px solid #ddd; padding: .5em 0; }
    .test.fail h3 { color: #b00; }
    .test.pass h3 { color: #080; }
    .images img { max-width: 32%; margin-right: 1%; border: 1px solid #ccc; }
  </style>
</head>
<body>
  <h1>shotdiff</h1>
  <p>
    <button id="run-all">Run all</button>
    <button id="run-failed">Retry failed</button>
    <span id="status"></span>
  </p>
  <div id="results"></div>
  <script src="/viewer.js"></script>
</body>
</html>
"#;

const VIEWER_JS: &str = r#"
const results = document.getElementById('results');
const status = document.getElementById('status');
const failed = new Map();

const keyOf = (t) => JSON.stringify([t.suitePath, t.stateName, t.browserId]);
const descriptor = (t) => ({ suitePath: t.suitePath, stateName: t.stateName, browserId: t.browserId });

async function post(url, body) {
  const res = await fetch(url, {
    method: 'POST',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify(body),
  });
  const json = await res.json();
  if (!res.ok) throw new Error(json.error || res.statusText);
  return json;
}

function img(src) {
  const el = document.createElement('img');
  if (src) el.src = src;
  return el;
}

function render(data, kind) {
  const key = keyOf(data);
  let el = document.querySelector(`[data-key='${CSS.escape(key)}']`);
  if (!el) {
    el = document.createElement('div');
    el.dataset.key = key;
    results.appendChild(el);
  }
  const ok = kind === 'test-end' && data.equal;
  el.className = 'test ' + (ok ? 'pass' : 'fail');
  el.innerHTML = '';
  const title = document.createElement('h3');
  title.textContent = `${data.suitePath.join(' / ')} / ${data.stateName} [${data.browserId}]`
    + (kind === 'no-reference' ? ' (no reference)' : '');
  el.appendChild(title);
  if (ok) return;

  failed.set(key, descriptor(data));
  const images = document.createElement('div');
  images.className = 'images';
  const ref = img(data.referenceURL);
  const diff = img();
  images.append(ref, img(data.currentURL), diff);
  el.appendChild(images);

  if (kind === 'test-end') {
    post('/api/diff', descriptor(data)).then((r) => { diff.src = r.diffURL; }).catch(() => {});
  }

  const accept = document.createElement('button');
  accept.textContent = 'Accept';
  accept.onclick = async () => {
    try {
      const r = await post('/api/accept', descriptor(data));
      ref.src = r.referenceURL;
      accept.disabled = true;
      status.textContent = `accepted, compressed by ${r.compressionPercent}%`;
    } catch (e) {
      status.textContent = e.message;
    }
  };
  el.appendChild(accept);
}

function connect() {
  const ws = new WebSocket(`${location.protocol === 'https:' ? 'wss' : 'ws'}://${location.host}/events`);
  ws.onmessage = (msg) => {
    const { event, data } = JSON.parse(msg.data);
    switch (event) {
      case 'begin': results.innerHTML = ''; failed.clear(); status.textContent = `running ${data.total} tests`; break;
      case 'test-end':
      case 'no-reference': render(data, event); break;
      case 'error': status.textContent = `error: ${data.message}`; break;
      case 'end': status.textContent = 'done'; break;
    }
  };
  ws.onclose = () => setTimeout(connect, 1000);
}

document.getElementById('run-all').onclick = () => post('/api/run', {}).catch((e) => { status.textContent = e.message; });
document.getElementById('run-failed').onclick = () =>
  post('/api/run', { tests: [...failed.values()] }).catch((e) => { status.textContent = e.message; });

fetch('/api/tests').then((r) => r.json()).then((tree) => {
  connect();
  if (tree.autoRun) post('/api/run', {}).catch(() => {});
});
"#;
