//! Browser-like globals inside the isolated context.
//!
//! QuickJS ships the language, not a browser. Learner snippets and the
//! instrumentation expect `window`, `parent.postMessage`, window events,
//! timers, `queueMicrotask` and a small `document`. Rust installs four
//! private bindings, then [`ENVIRONMENT_JS`] builds those globals on top of
//! them and removes the bindings again. The only private name left behind
//! is the frozen, non-enumerable `__codeyard_runtime`, which the guest loop
//! calls into.

use std::cell::RefCell;
use std::rc::Rc;

use rquickjs::{Ctx, Function, Object, Value};

use super::markup::Markup;
use super::timers::{TimerQueue, delay_from_js};
use crate::channel::MessageSink;

/// Name of the hook object the guest loop calls.
pub(crate) const RUNTIME_GLOBAL: &str = "__codeyard_runtime";

const POST_BINDING: &str = "__codeyard_post";
const SCHEDULE_BINDING: &str = "__codeyard_schedule";
const CANCEL_BINDING: &str = "__codeyard_cancel";
const MARKUP_BINDING: &str = "__codeyard_markup";

/// Script that builds the browser-like globals.
pub(crate) const ENVIRONMENT_JS: &str = r#"(function (global) {
  'use strict';

  var post = global.__codeyard_post;
  var schedule = global.__codeyard_schedule;
  var cancel = global.__codeyard_cancel;
  var markup = JSON.parse(global.__codeyard_markup || '{}');
  delete global.__codeyard_post;
  delete global.__codeyard_schedule;
  delete global.__codeyard_cancel;
  delete global.__codeyard_markup;

  var define = function (target, name, value) {
    Object.defineProperty(target, name, {
      value: value,
      writable: true,
      configurable: true,
      enumerable: false
    });
  };

  var safeString = function (value) {
    try {
      return String(value);
    } catch (e) {
      return 'Error';
    }
  };

  // Events

  class Event {
    constructor(type, init) {
      this.type = String(type);
      this.bubbles = !!(init && init.bubbles);
      this.cancelable = !!(init && init.cancelable);
      this.defaultPrevented = false;
      this.target = null;
      this.currentTarget = null;
      this.timeStamp = Date.now();
    }
    preventDefault() { this.defaultPrevented = true; }
    stopPropagation() {}
    stopImmediatePropagation() {}
  }

  class ErrorEvent extends Event {
    constructor(type, init) {
      super(type, init);
      init = init || {};
      this.message = init.message === undefined ? '' : String(init.message);
      this.filename = init.filename || '';
      this.lineno = init.lineno || 0;
      this.colno = init.colno || 0;
      this.error = init.error;
    }
  }

  class PromiseRejectionEvent extends Event {
    constructor(type, init) {
      super(type, init);
      init = init || {};
      this.promise = init.promise;
      this.reason = init.reason;
    }
  }

  class CustomEvent extends Event {
    constructor(type, init) {
      super(type, init);
      this.detail = init && init.detail !== undefined ? init.detail : null;
    }
  }

  var reportError;

  var makeEventTarget = function (target) {
    var listeners = Object.create(null);

    define(target, 'addEventListener', function (type, listener) {
      if (typeof listener !== 'function' &&
          !(listener && typeof listener.handleEvent === 'function')) {
        return;
      }
      var list = listeners[type] || (listeners[type] = []);
      if (list.indexOf(listener) === -1) list.push(listener);
    });

    define(target, 'removeEventListener', function (type, listener) {
      var list = listeners[type];
      if (!list) return;
      var index = list.indexOf(listener);
      if (index !== -1) list.splice(index, 1);
    });

    define(target, 'dispatchEvent', function (event) {
      if (!event.target) event.target = target;
      event.currentTarget = target;

      var invoke = function (fn) {
        try {
          fn();
        } catch (e) {
          // An error listener that throws must not feed itself.
          if (event.type !== 'error') reportError(e);
        }
      };

      var list = (listeners[event.type] || []).slice();
      list.forEach(function (listener) {
        invoke(function () {
          if (typeof listener === 'function') listener.call(target, event);
          else listener.handleEvent(event);
        });
      });

      var handler = target['on' + event.type];
      if (typeof handler === 'function') {
        invoke(function () {
          if (event.type === 'error' && target === global) {
            var handled = handler.call(global, event.message, event.filename,
              event.lineno, event.colno, event.error);
            if (handled === true) event.preventDefault();
          } else {
            handler.call(target, event);
          }
        });
      }

      return !event.defaultPrevented;
    });

    return target;
  };

  // Window

  global.window = global;
  global.self = global;
  makeEventTarget(global);

  var parentWindow = {
    postMessage: function (message) {
      var text = JSON.stringify(message);
      if (typeof text === 'string') post(text);
    }
  };
  global.parent = parentWindow;
  global.top = parentWindow;
  global.location = { href: 'about:srcdoc', protocol: 'about:', origin: 'null' };
  global.navigator = { userAgent: 'Codeyard Sandbox', language: 'en-US' };

  global.Event = Event;
  global.ErrorEvent = ErrorEvent;
  global.PromiseRejectionEvent = PromiseRejectionEvent;
  global.CustomEvent = CustomEvent;

  // Native console: silent until instrumentation wraps it.

  var noop = function () {};
  var console = global.console || {};
  ['log', 'warn', 'error', 'info', 'debug', 'trace', 'dir', 'table', 'group',
   'groupCollapsed', 'groupEnd', 'time', 'timeEnd', 'count', 'assert', 'clear']
    .forEach(function (name) {
      if (typeof console[name] !== 'function') console[name] = noop;
    });
  global.console = console;

  // Errors

  var lineOf = function (error) {
    try {
      var line = error ? error.lineNumber : undefined;
      if (typeof line === 'number' && line >= 1 && line % 1 === 0) return line;
      var stack = error && error.stack ? safeString(error.stack) : '';
      var match = /:(\d+)(?::\d+)?\)?\s*$/m.exec(stack);
      return match ? Number(match[1]) : 0;
    } catch (e) {
      return 0;
    }
  };

  reportError = function (error) {
    global.dispatchEvent(new ErrorEvent('error', {
      message: 'Uncaught ' + safeString(error),
      error: error,
      lineno: lineOf(error)
    }));
  };
  global.reportError = reportError;

  var pendingRejections = [];

  var trackRejection = function (promise, reason, handled) {
    if (!handled) {
      pendingRejections.push({ promise: promise, reason: reason });
      return;
    }
    for (var i = 0; i < pendingRejections.length; i++) {
      if (pendingRejections[i].promise === promise) {
        pendingRejections.splice(i, 1);
        return;
      }
    }
  };

  var flushRejections = function () {
    var batch = pendingRejections;
    pendingRejections = [];
    batch.forEach(function (entry) {
      global.dispatchEvent(new PromiseRejectionEvent('unhandledrejection', {
        promise: entry.promise,
        reason: entry.reason
      }));
    });
  };

  // Timers

  var timers = new Map();
  var nextTimerId = 1;

  var toDelay = function (delay) {
    var n = Number(delay);
    return n > 0 ? n : 0;
  };

  var addTimer = function (callback, delay, args, repeat) {
    var id = nextTimerId++;
    timers.set(id, { callback: callback, delay: toDelay(delay), args: args, repeat: repeat });
    schedule(id, toDelay(delay));
    return id;
  };

  var clearTimer = function (id) {
    id = Number(id);
    if (timers.delete(id)) cancel(id);
  };

  global.setTimeout = function (callback, delay) {
    return addTimer(callback, delay, Array.prototype.slice.call(arguments, 2), false);
  };
  global.setInterval = function (callback, delay) {
    return addTimer(callback, delay, Array.prototype.slice.call(arguments, 2), true);
  };
  global.clearTimeout = clearTimer;
  global.clearInterval = clearTimer;

  var fireTimer = function (id) {
    var timer = timers.get(id);
    if (!timer) return;
    if (timer.repeat) schedule(id, Math.max(timer.delay, 1));
    else timers.delete(id);
    try {
      if (typeof timer.callback === 'function') timer.callback.apply(global, timer.args);
      else (0, eval)(safeString(timer.callback));
    } catch (e) {
      reportError(e);
    }
  };

  global.queueMicrotask = function (callback) {
    if (typeof callback !== 'function') {
      throw new TypeError('queueMicrotask requires a function');
    }
    Promise.resolve().then(function () {
      try {
        callback();
      } catch (e) {
        reportError(e);
      }
    });
  };

  // Document

  var elements = [];

  var classesOf = function (element) {
    return safeString(element.className).split(/\s+/).filter(Boolean);
  };

  var matches = function (element, selector) {
    selector = safeString(selector).trim();
    if (selector.charAt(0) === '#') return element.id === selector.slice(1);
    if (selector.charAt(0) === '.') return classesOf(element).indexOf(selector.slice(1)) !== -1;
    return element.tagName.toLowerCase() === selector.toLowerCase();
  };

  var register = function (element) {
    if (element && element.tagName && elements.indexOf(element) === -1) elements.push(element);
    return element;
  };

  var createElement = function (record) {
    var attributes = Object.assign({}, record.attributes || {});
    var element = {
      nodeType: 1,
      tagName: safeString(record.tag || 'div').toUpperCase(),
      id: record.id || '',
      className: record.className || '',
      innerHTML: record.innerHtml || '',
      textContent: record.textContent || '',
      innerText: record.textContent || '',
      value: attributes.value !== undefined ? attributes.value : '',
      style: {},
      dataset: {},
      children: []
    };
    element.nodeName = element.tagName;

    element.getAttribute = function (name) {
      name = safeString(name).toLowerCase();
      if (name === 'id') return element.id || null;
      if (name === 'class') return element.className || null;
      return Object.prototype.hasOwnProperty.call(attributes, name) ? attributes[name] : null;
    };
    element.setAttribute = function (name, value) {
      name = safeString(name).toLowerCase();
      value = safeString(value);
      if (name === 'id') element.id = value;
      else if (name === 'class') element.className = value;
      else attributes[name] = value;
    };
    element.hasAttribute = function (name) {
      return element.getAttribute(name) !== null;
    };
    element.removeAttribute = function (name) {
      name = safeString(name).toLowerCase();
      if (name === 'id') element.id = '';
      else if (name === 'class') element.className = '';
      else delete attributes[name];
    };

    element.classList = {
      contains: function (name) {
        return classesOf(element).indexOf(safeString(name)) !== -1;
      },
      add: function () {
        var list = classesOf(element);
        Array.prototype.forEach.call(arguments, function (name) {
          if (list.indexOf(name) === -1) list.push(name);
        });
        element.className = list.join(' ');
      },
      remove: function () {
        var drop = Array.prototype.slice.call(arguments);
        element.className = classesOf(element).filter(function (name) {
          return drop.indexOf(name) === -1;
        }).join(' ');
      },
      toggle: function (name, force) {
        var has = element.classList.contains(name);
        var want = force === undefined ? !has : !!force;
        if (want && !has) element.classList.add(name);
        if (!want && has) element.classList.remove(name);
        return want;
      }
    };

    element.appendChild = function (child) {
      element.children.push(child);
      return register(child);
    };
    element.append = function () {
      Array.prototype.forEach.call(arguments, function (child) {
        if (child && typeof child === 'object') element.appendChild(child);
      });
    };
    element.remove = function () {
      var index = elements.indexOf(element);
      if (index !== -1) elements.splice(index, 1);
    };
    element.matches = function (selector) {
      return matches(element, selector);
    };
    element.focus = noop;
    element.blur = noop;
    element.click = function () {
      element.dispatchEvent(new Event('click'));
    };

    return makeEventTarget(element);
  };

  (markup.elements || []).forEach(function (record) {
    register(createElement(record));
  });

  var body = createElement({ tag: 'body', innerHtml: markup.bodyHtml || '' });
  var head = createElement({ tag: 'head' });

  var document = {
    nodeType: 9,
    title: markup.title || '',
    readyState: 'loading',
    body: body,
    head: head,
    documentElement: createElement({ tag: 'html' }),
    getElementById: function (id) {
      id = safeString(id);
      for (var i = 0; i < elements.length; i++) {
        if (elements[i].id === id) return elements[i];
      }
      return null;
    },
    querySelector: function (selector) {
      for (var i = 0; i < elements.length; i++) {
        if (matches(elements[i], selector)) return elements[i];
      }
      return null;
    },
    querySelectorAll: function (selector) {
      return elements.filter(function (element) {
        return matches(element, selector);
      });
    },
    getElementsByTagName: function (tag) {
      return document.querySelectorAll(safeString(tag));
    },
    getElementsByClassName: function (name) {
      return document.querySelectorAll('.' + safeString(name));
    },
    createElement: function (tag) {
      return createElement({ tag: safeString(tag).toLowerCase() });
    },
    createTextNode: function (text) {
      return { nodeType: 3, textContent: safeString(text) };
    }
  };
  makeEventTarget(document);
  global.document = document;

  var documentLoaded = function () {
    document.readyState = 'complete';
    document.dispatchEvent(new Event('DOMContentLoaded'));
    global.dispatchEvent(new Event('load'));
  };

  Object.defineProperty(global, '__codeyard_runtime', {
    value: Object.freeze({
      reportError: reportError,
      fireTimer: fireTimer,
      trackRejection: trackRejection,
      flushRejections: flushRejections,
      documentLoaded: documentLoaded
    }),
    writable: false,
    enumerable: false,
    configurable: false
  });
})(globalThis);
"#;

/// Install host bindings and build the browser-like globals.
pub(crate) fn install<'js>(
    ctx: &Ctx<'js>,
    sink: MessageSink,
    timers: Rc<RefCell<TimerQueue>>,
    markup: &Markup,
) -> rquickjs::Result<()> {
    let globals = ctx.globals();

    let post = Function::new(ctx.clone(), move |payload: String| {
        sink.post(payload);
    })?;
    globals.set(POST_BINDING, post)?;

    let scheduled = timers.clone();
    let schedule = Function::new(ctx.clone(), move |id: i32, delay: f64| {
        scheduled.borrow_mut().schedule(id, delay_from_js(delay));
    })?;
    globals.set(SCHEDULE_BINDING, schedule)?;

    let cancel = Function::new(ctx.clone(), move |id: i32| {
        timers.borrow_mut().cancel(id);
    })?;
    globals.set(CANCEL_BINDING, cancel)?;

    globals.set(MARKUP_BINDING, markup.to_json())?;

    ctx.eval::<(), _>(ENVIRONMENT_JS)
}

fn hook<'js>(ctx: &Ctx<'js>, name: &str) -> rquickjs::Result<Function<'js>> {
    let runtime: Object<'js> = ctx.globals().get(RUNTIME_GLOBAL)?;
    runtime.get(name)
}

/// Dispatch an `error` event for an uncaught value.
pub(crate) fn report_error<'js>(ctx: &Ctx<'js>, error: Value<'js>) -> rquickjs::Result<()> {
    hook(ctx, "reportError")?.call((error,))
}

/// Run the callback registered under timer `id`.
pub(crate) fn fire_timer(ctx: &Ctx<'_>, id: i32) -> rquickjs::Result<()> {
    hook(ctx, "fireTimer")?.call((id,))
}

/// Record a rejection, or forget it once a handler is attached.
pub(crate) fn track_rejection<'js>(
    ctx: &Ctx<'js>,
    promise: Value<'js>,
    reason: Value<'js>,
    handled: bool,
) -> rquickjs::Result<()> {
    hook(ctx, "trackRejection")?.call((promise, reason, handled))
}

/// Dispatch `unhandledrejection` for rejections still without a handler.
pub(crate) fn flush_rejections(ctx: &Ctx<'_>) -> rquickjs::Result<()> {
    hook(ctx, "flushRejections")?.call(())
}

/// Fire `DOMContentLoaded` and `load`.
pub(crate) fn document_loaded(ctx: &Ctx<'_>) -> rquickjs::Result<()> {
    hook(ctx, "documentLoaded")?.call(())
}
