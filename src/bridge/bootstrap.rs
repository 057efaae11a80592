//! Bootstrap script injected into every sandboxed game document.
//!
//! Gives game code a `window.vibelab` object:
//! - `saveState(value)`, `getState()`, `log(msg)`
//! - `reportScore(score, level?)`, `complete(score, time?)`
//! - `onRestore(cb)`, `onReset(cb)`, `onPause(cb)`, `onResume(cb)`
//!
//! and answers host commands (`LOAD_STATE`, `RESET_GAME`, `PAUSE_GAME`,
//! `RESUME_GAME`, `REQUEST_STATE`). A `LOAD_STATE` payload that fails to
//! parse is logged inside the frame and never reported to the host.

/// `id` attribute of the injected `<script>` element
pub const BOOTSTRAP_SCRIPT_ID: &str = "vibelab-bridge";

const VERSION_PLACEHOLDER: &str = "__VIBELAB_BRIDGE_VERSION__";

const BOOTSTRAP_JS: &str = r#"
(function () {
  var parentWindow = window.parent;
  var lastState = null;
  var callbacks = { restore: null, reset: null, pause: null, resume: null };

  function post(message) {
    message.timestamp = Date.now();
    try {
      parentWindow.postMessage(message, '*');
    } catch (err) {
      console.error('[vibelab] postMessage failed', err);
    }
  }

  var vibelab = {
    saveState: function (value) {
      lastState = JSON.stringify(value);
      post({ type: 'GAME_STATE', state: lastState });
    },
    getState: function () {
      return lastState === null ? null : JSON.parse(lastState);
    },
    reportScore: function (score, level) {
      var message = { type: 'GAME_SCORE', score: Number(score) };
      if (typeof level === 'number') message.level = level;
      post(message);
    },
    complete: function (score, time) {
      var message = { type: 'GAME_COMPLETE', score: Number(score) };
      if (typeof time === 'number') message.time = time;
      post(message);
    },
    log: function (msg) {
      post({ type: 'GAME_LOG', message: String(msg) });
    },
    onRestore: function (cb) { callbacks.restore = cb; },
    onReset: function (cb) { callbacks.reset = cb; },
    onPause: function (cb) { callbacks.pause = cb; },
    onResume: function (cb) { callbacks.resume = cb; }
  };

  function restore(payload) {
    var value;
    try {
      value = JSON.parse(payload);
    } catch (err) {
      console.warn('[vibelab] ignoring unreadable saved state', err);
      return;
    }
    lastState = payload;
    if (typeof callbacks.restore === 'function') {
      callbacks.restore(value);
    } else if (typeof window.onVibeLabStateLoaded === 'function') {
      window.onVibeLabStateLoaded(value);
    }
  }

  window.addEventListener('message', function (event) {
    if (event.source !== parentWindow) return;
    var data = event.data;
    if (!data || typeof data !== 'object' || typeof data.type !== 'string') return;

    switch (data.type) {
      case 'LOAD_STATE':
        if (typeof data.state === 'string') restore(data.state);
        break;
      case 'RESET_GAME':
        if (typeof callbacks.reset === 'function') callbacks.reset();
        break;
      case 'PAUSE_GAME':
        if (typeof callbacks.pause === 'function') callbacks.pause();
        break;
      case 'RESUME_GAME':
        if (typeof callbacks.resume === 'function') callbacks.resume();
        break;
      case 'REQUEST_STATE':
        post({ type: 'GAME_STATE', state: lastState, requestId: data.requestId });
        break;
    }
  });

  window.onerror = function (message, source, line, column, error) {
    var report = { type: 'GAME_ERROR', error: String(message) + ' at line ' + line };
    if (error && error.stack) report.stack = String(error.stack);
    post(report);
    return true;
  };

  window.vibelab = vibelab;

  function ready() {
    post({ type: 'GAME_READY', version: '__VIBELAB_BRIDGE_VERSION__' });
  }
  if (document.readyState === 'complete') {
    ready();
  } else {
    window.addEventListener('load', ready);
  }
})();
"#;

/// Bridge version reported in `GAME_READY`
pub fn bridge_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

fn bootstrap_source() -> String {
    BOOTSTRAP_JS.replace(VERSION_PLACEHOLDER, bridge_version())
}

/// The bootstrap as a complete `<script>` element
pub fn bootstrap_script_tag() -> String {
    format!(
        r#"<script id="{}">{}</script>"#,
        BOOTSTRAP_SCRIPT_ID,
        bootstrap_source()
    )
}
