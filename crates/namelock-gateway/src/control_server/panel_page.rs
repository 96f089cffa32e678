//! Operator control panel served at `/`.
use super::*;

pub(super) fn render_control_panel_page() -> String {
    format!(
        r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>Group Name Locker</title>
  <style>
    :root {{
      color-scheme: dark;
      font-family: "IBM Plex Sans", "Segoe UI", sans-serif;
    }}
    body {{
      margin: 0;
      background: linear-gradient(160deg, #071018 0%, #0d1f2b 100%);
      color: #d8f3ea;
    }}
    .container {{
      max-width: 1080px;
      margin: 0 auto;
      padding: 1.5rem;
      display: grid;
      grid-template-columns: 1fr 1fr;
      gap: 1rem;
    }}
    .card {{
      background: rgba(255, 255, 255, 0.04);
      border: 1px solid rgba(120, 220, 190, 0.25);
      border-radius: 12px;
      padding: 1rem;
    }}
    h1 {{
      margin: 0 0 0.5rem 0;
      font-size: 1.4rem;
    }}
    label {{
      display: block;
      margin-top: 0.75rem;
      font-weight: 600;
    }}
    input[type="text"], textarea {{
      width: 100%;
      box-sizing: border-box;
      margin-top: 0.25rem;
      padding: 0.5rem;
      border-radius: 8px;
      border: 1px solid #2d5a4f;
      background: #0a1922;
      color: inherit;
      font-family: inherit;
    }}
    .row {{
      display: flex;
      gap: 0.5rem;
      align-items: center;
      margin-top: 0.75rem;
    }}
    button {{
      padding: 0.5rem 0.9rem;
      border-radius: 8px;
      border: 1px solid #43c59e;
      background: #43c59e;
      color: #06201a;
      font-weight: 700;
      cursor: pointer;
    }}
    button.ghost {{
      background: transparent;
      color: #9fe8d0;
    }}
    .muted {{
      color: #8fb8ad;
      font-size: 0.85rem;
    }}
    #logBox {{
      margin-top: 1rem;
      height: 360px;
      overflow-y: auto;
      white-space: pre-wrap;
      font-family: "IBM Plex Mono", monospace;
      font-size: 0.8rem;
      background: #040b10;
      border-radius: 8px;
      padding: 0.75rem;
    }}
    @media (max-width: 800px) {{
      .container {{ grid-template-columns: 1fr; }}
    }}
  </style>
</head>
<body>
  <div class="container">
    <section class="card">
      <h1>Group Name Locker</h1>
      <div class="muted">Upload the session appstate, set the group thread id and the locked name, then start the locker.</div>
      <label for="fileInput">Upload appstate.json</label>
      <div class="row">
        <input id="fileInput" type="file" accept=".json" />
        <button id="uploadBtn" class="ghost">Upload File</button>
      </div>
      <label for="appstateText">Or paste appstate JSON</label>
      <textarea id="appstateText" rows="6" placeholder="Paste appstate.json content here"></textarea>
      <div class="row">
        <button id="saveTextBtn" class="ghost">Save From Text</button>
        <button id="clearAppstateBtn" class="ghost">Delete Saved appstate</button>
      </div>
      <ol class="muted">
        <li>Upload or paste your appstate.json.</li>
        <li>Enter the group thread id (the numeric id after /t/ in the messages URL).</li>
        <li>Enter the exact locked name; spaces and emoji must match.</li>
        <li>Click Start and watch the activity log.</li>
      </ol>
    </section>
    <section class="card">
      <label for="groupIdInput">Group Thread ID</label>
      <input id="groupIdInput" type="text" placeholder="e.g. 24196335160017473" />
      <label for="lockedNameInput">Locked Group Name</label>
      <input id="lockedNameInput" type="text" placeholder="Enter locked group name exactly" />
      <div class="row">
        <button id="startBtn">Start Locker</button>
        <button id="stopBtn" class="ghost">Stop Locker</button>
        <span class="muted" style="margin-left:auto">Status: <span id="srvStatus">idle</span></span>
      </div>
      <div id="logBox">[system] Ready.</div>
    </section>
  </div>
<script>
  const logBox = document.getElementById("logBox");
  const srvStatus = document.getElementById("srvStatus");
  const seen = new Set();

  function appendLine(line) {{
    logBox.textContent += "\n" + line;
    logBox.scrollTop = logBox.scrollHeight;
  }}

  function local(message) {{
    appendLine("[panel " + new Date().toLocaleTimeString() + "] " + message);
  }}

  function serverLine(line) {{
    if (seen.has(line)) {{
      return;
    }}
    seen.add(line);
    appendLine(line);
  }}

  async function postJson(path, body) {{
    const options = {{ method: "POST" }};
    if (body !== undefined) {{
      options.headers = {{ "Content-Type": "application/json" }};
      options.body = JSON.stringify(body);
    }}
    const response = await fetch(path, options);
    return response.json();
  }}

  async function run(label, action) {{
    try {{
      const result = await action();
      local(result.message || label + " done.");
      return result;
    }} catch (error) {{
      local(label + " failed: " + (error.message || error));
      return {{ ok: false }};
    }}
  }}

  document.getElementById("uploadBtn").addEventListener("click", async () => {{
    const input = document.getElementById("fileInput");
    if (!input.files || input.files.length === 0) {{
      local("No file selected.");
      return;
    }}
    const form = new FormData();
    form.append("appstate", input.files[0]);
    await run("Upload", async () => (await fetch("{upload}", {{ method: "POST", body: form }})).json());
  }});

  document.getElementById("saveTextBtn").addEventListener("click", async () => {{
    const text = document.getElementById("appstateText").value.trim();
    if (!text) {{
      local("No appstate text to save.");
      return;
    }}
    await run("Save", () => postJson("{save_text}", {{ appstate: text }}));
  }});

  document.getElementById("clearAppstateBtn").addEventListener("click", async () => {{
    await run("Delete", () => postJson("{delete_credential}"));
  }});

  document.getElementById("startBtn").addEventListener("click", async () => {{
    const groupID = document.getElementById("groupIdInput").value.trim();
    const lockedName = document.getElementById("lockedNameInput").value.trim();
    if (!groupID || !lockedName) {{
      local("Please provide both Group ID and Locked Name.");
      return;
    }}
    await run("Start", () => postJson("{start}", {{ groupID, lockedName }}));
  }});

  document.getElementById("stopBtn").addEventListener("click", async () => {{
    await run("Stop", () => postJson("{stop}"));
  }});

  function applyStatus(status) {{
    srvStatus.textContent = status.state + (status.credential_present === false ? " (no appstate)" : "");
    (status.logs || []).forEach(serverLine);
  }}

  async function pollStatus() {{
    try {{
      const response = await fetch("{status}");
      if (response.ok) {{
        applyStatus(await response.json());
      }}
    }} catch (error) {{
      // next poll retries
    }}
  }}

  let pollTimer = null;
  function startPolling() {{
    if (pollTimer === null) {{
      pollStatus();
      pollTimer = setInterval(pollStatus, 5000);
    }}
  }}

  if (window.EventSource) {{
    const events = new EventSource("{events}");
    events.addEventListener("snapshot", (event) => applyStatus(JSON.parse(event.data)));
    events.addEventListener("log", (event) => serverLine(JSON.parse(event.data).line));
    events.addEventListener("state", (event) => {{
      srvStatus.textContent = JSON.parse(event.data).state;
    }});
    events.onerror = () => {{
      events.close();
      startPolling();
    }};
  }} else {{
    startPolling();
  }}
</script>
</body>
</html>
"#,
        upload = UPLOAD_ENDPOINT,
        save_text = SAVE_TEXT_ENDPOINT,
        delete_credential = DELETE_CREDENTIAL_ENDPOINT,
        start = START_ENDPOINT,
        stop = STOP_ENDPOINT,
        status = STATUS_ENDPOINT,
        events = EVENTS_ENDPOINT,
    )
}
