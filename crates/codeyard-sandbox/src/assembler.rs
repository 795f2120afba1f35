//! Document assembly.
//!
//! Turns a [`SourceBundle`] into one standalone HTML document. The CSS
//! fragment goes into a `<style>` block, the HTML fragment into the body,
//! followed by two script blocks:
//!
//! 1. the instrumentation block, which wraps `console.{log,warn,error,info}`,
//!    hooks `error` and `unhandledrejection`, and arms the ready timer;
//! 2. the learner script inside a `try`/`catch` boundary.
//!
//! The instrumentation talks to the host only through
//! `window.parent.postMessage` using the [`GuestMessage`](codeyard_types::GuestMessage)
//! schema. Assembly is pure and never fails; broken fragments are embedded
//! verbatim and fail later, inside the isolated context.

use std::fmt::Write as _;
use std::time::Duration;

use codeyard_types::SourceBundle;

/// Default delay before the ready signal.
pub const DEFAULT_READY_DELAY: Duration = Duration::from_millis(100);

/// Title of every assembled document.
pub const DOCUMENT_TITLE: &str = "Code Sandbox";

/// Reset applied before learner CSS.
const BASE_STYLE: &str = r#"    * {
      margin: 0;
      padding: 0;
      box-sizing: border-box;
    }
    body {
      font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
      background: #fff;
    }"#;

/// Instrumentation installed before learner code. `__READY_DELAY__` is
/// replaced with the configured delay in milliseconds.
const INSTRUMENTATION: &str = r#"(function () {
  var post = function (message) {
    try {
      window.parent.postMessage(message, '*');
    } catch (e) {
      // host channel unavailable
    }
  };

  var text = function (arg) {
    try { return String(arg); } catch (e) { return '[unprintable]'; }
  };

  var stringify = function (arg) {
    if (typeof arg === 'object') {
      try {
        var json = JSON.stringify(arg);
        if (typeof json === 'string') return json;
      } catch (e) {
        try { return String(arg); } catch (e2) { return '[object]'; }
      }
    }
    return text(arg);
  };

  var describe = function (value) {
    if (value && typeof value === 'object' && value.message !== undefined) {
      return String(value.message);
    }
    return stringify(value);
  };

  var stackOf = function (value) {
    return value && value.stack ? String(value.stack) : undefined;
  };

  ['log', 'warn', 'error', 'info'].forEach(function (level) {
    var original = console[level];
    console[level] = function () {
      var args = Array.prototype.slice.call(arguments);
      try {
        if (typeof original === 'function') original.apply(console, args);
      } catch (e) {
        // keep reporting even if the native console fails
      }
      post({ type: 'console', level: level, args: args.map(stringify) });
    };
  });

  window.addEventListener('error', function (event) {
    post({
      type: 'error',
      message: String(event.message),
      stack: stackOf(event.error),
      lineNumber: event.lineno || undefined
    });
  });

  window.addEventListener('unhandledrejection', function (event) {
    post({
      type: 'error',
      message: 'Unhandled promise rejection: ' + describe(event.reason),
      stack: stackOf(event.reason)
    });
  });

  setTimeout(function () {
    post({ type: 'ready' });
  }, __READY_DELAY__);
})();"#;

/// Boundary placed after the learner script inside the second block.
const GUARD_TAIL: &str = r#"} catch (e) {
  var __read = function (key) {
    try {
      return e !== null && typeof e === 'object' ? e[key] : undefined;
    } catch (ignored) {
      return undefined;
    }
  };
  var __raw = __read('message');
  var __message;
  try {
    __message = __raw !== undefined ? String(__raw) : String(e);
  } catch (ignored) {
    __message = 'Script error';
  }
  var __stack = __read('stack');
  var __line = __read('lineNumber');
  try {
    console.error('Syntax or Runtime Error: ' + __message);
  } catch (ignored) {
    // a replaced console must not hide the error
  }
  try {
    window.parent.postMessage({
      type: 'error',
      message: __message,
      stack: typeof __stack === 'string' ? __stack : undefined,
      lineNumber: typeof __line === 'number' && __line >= 1 && __line % 1 === 0 ? __line : undefined
    }, '*');
  } catch (err) {
    // host channel unavailable
  }
}"#;

/// Options that shape the assembled document.
#[derive(Debug, Clone)]
pub struct AssemblyOptions {
    /// Delay before the ready signal.
    pub ready_delay: Duration,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            ready_delay: DEFAULT_READY_DELAY,
        }
    }
}

/// Assemble a bundle with default options.
pub fn assemble(bundle: &SourceBundle) -> String {
    assemble_with(bundle, &AssemblyOptions::default())
}

/// Assemble a bundle with explicit options.
pub fn assemble_with(bundle: &SourceBundle, options: &AssemblyOptions) -> String {
    DocumentBuilder::new()
        .style(&bundle.css)
        .body(&bundle.html)
        .script(&bundle.script)
        .ready_delay(options.ready_delay)
        .build()
}

/// The instrumentation block for a given ready delay.
pub fn instrumentation(ready_delay: Duration) -> String {
    INSTRUMENTATION.replace("__READY_DELAY__", &ready_delay.as_millis().to_string())
}

/// The learner script wrapped in its exception boundary.
pub fn guarded_script(script: &str) -> String {
    let mut out = String::with_capacity(script.len() + GUARD_TAIL.len() + 8);
    out.push_str("try {\n");
    out.push_str(script);
    out.push('\n');
    out.push_str(GUARD_TAIL);
    out
}

/// Composes the three document sections.
#[derive(Debug, Clone, Default)]
pub struct DocumentBuilder<'a> {
    style: &'a str,
    body: &'a str,
    script: &'a str,
    ready_delay: Option<Duration>,
}

impl<'a> DocumentBuilder<'a> {
    /// Start an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Learner CSS, appended after the base reset.
    pub fn style(mut self, css: &'a str) -> Self {
        self.style = css;
        self
    }

    /// Learner HTML, placed at the top of the body.
    pub fn body(mut self, html: &'a str) -> Self {
        self.body = html;
        self
    }

    /// Learner script, placed in the guarded block.
    pub fn script(mut self, script: &'a str) -> Self {
        self.script = script;
        self
    }

    /// Delay before the ready signal.
    pub fn ready_delay(mut self, delay: Duration) -> Self {
        self.ready_delay = Some(delay);
        self
    }

    /// Render the document.
    pub fn build(&self) -> String {
        let ready_delay = self.ready_delay.unwrap_or(DEFAULT_READY_DELAY);
        let mut doc = String::with_capacity(
            self.style.len() + self.body.len() + self.script.len() + 4096,
        );

        // Writing to a String cannot fail.
        let _ = write!(
            doc,
            "<!DOCTYPE html>\n\
             <html lang=\"en\">\n\
             <head>\n  \
             <meta charset=\"UTF-8\">\n  \
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n  \
             <title>{DOCUMENT_TITLE}</title>\n  \
             <style>\n{BASE_STYLE}\n{style}\n  </style>\n\
             </head>\n\
             <body>\n{body}\n  \
             <script>\n{instrumentation}\n  </script>\n  \
             <script>\n{guarded}\n  </script>\n\
             </body>\n\
             </html>\n",
            style = self.style,
            body = self.body,
            instrumentation = instrumentation(ready_delay),
            guarded = guarded_script(self.script),
        );

        doc
    }
}
