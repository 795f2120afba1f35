//! The context thread: one QuickJS runtime per run.
//!
//! Evaluates each inline script of the document in order, drains the
//! microtask queue after every script and timer, then services timers
//! until the kill switch trips or nothing is left to do.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use codeyard_types::RunId;
use rquickjs::context::EvalOptions;
use rquickjs::{Context, Ctx, Runtime, Value};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use super::environment;
use super::markup::Markup;
use super::timers::TimerQueue;
use super::{ContextLimits, KillSwitch};
use crate::channel::MessageSink;

/// Everything the context thread needs to start.
pub(crate) struct GuestSetup {
    pub run_id: RunId,
    pub document: String,
    pub limits: ContextLimits,
    pub sink: MessageSink,
    pub kill: KillSwitch,
}

/// Entry point of the context thread.
///
/// Reports startup success or failure on `started`, then runs to
/// completion. Never panics on guest behaviour.
pub(crate) fn run_guest(setup: GuestSetup, started: oneshot::Sender<Result<(), String>>) {
    let GuestSetup {
        run_id,
        document,
        limits,
        sink,
        kill,
    } = setup;

    let markup = Markup::parse(&document);
    let timers = Rc::new(RefCell::new(TimerQueue::new()));

    let guest = match Guest::create(run_id, &limits, sink, kill, timers, &markup) {
        Ok(guest) => guest,
        Err(err) => {
            warn!(run_id = %run_id, error = %err, "Failed to create isolated context");
            let _ = started.send(Err(err.to_string()));
            return;
        }
    };
    if started.send(Ok(())).is_err() {
        debug!(run_id = %run_id, "Host abandoned run before start");
        return;
    }

    debug!(run_id = %run_id, scripts = markup.scripts.len(), "Isolated context started");
    guest.evaluate(&markup.scripts);
    guest.event_loop();
    debug!(run_id = %run_id, stopped = guest.stopped(), "Isolated context finished");
}

struct Guest {
    // Field order is drop order: context before runtime.
    context: Context,
    runtime: Runtime,
    run_id: RunId,
    sink: MessageSink,
    kill: KillSwitch,
    timers: Rc<RefCell<TimerQueue>>,
}

impl Guest {
    fn create(
        run_id: RunId,
        limits: &ContextLimits,
        sink: MessageSink,
        kill: KillSwitch,
        timers: Rc<RefCell<TimerQueue>>,
        markup: &Markup,
    ) -> rquickjs::Result<Self> {
        let runtime = Runtime::new()?;
        runtime.set_memory_limit(limits.memory_limit_bytes);
        runtime.set_max_stack_size(limits.max_stack_bytes);

        let interrupt = kill.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || interrupt.is_tripped())));

        runtime.set_host_promise_rejection_tracker(Some(Box::new(
            |ctx, promise, reason, is_handled| {
                if let Err(err) = environment::track_rejection(&ctx, promise, reason, is_handled) {
                    if matches!(err, rquickjs::Error::Exception) {
                        let _ = ctx.catch();
                    }
                    trace!(error = %err, "Rejection tracker unavailable");
                }
            },
        )));

        let context = Context::full(&runtime)?;
        let bindings = sink.clone();
        context.with(|ctx| environment::install(&ctx, bindings, timers.clone(), markup))?;

        Ok(Self {
            context,
            runtime,
            run_id,
            sink,
            kill,
            timers,
        })
    }

    fn stopped(&self) -> bool {
        self.kill.is_tripped()
    }

    /// Evaluate each script block in order. A failing block is reported
    /// and the next one still runs.
    fn evaluate(&self, scripts: &[String]) {
        for (index, source) in scripts.iter().enumerate() {
            if self.stopped() {
                return;
            }
            trace!(run_id = %self.run_id, block = index, "Evaluating script block");
            self.context.with(|ctx| {
                let mut options = EvalOptions::default();
                options.strict = false;
                if let Err(err) = ctx.eval_with_options::<(), _>(source.as_str(), options) {
                    self.report(&ctx, err);
                }
            });
            self.drain_jobs();
        }

        if self.stopped() {
            return;
        }
        self.context.with(|ctx| {
            if let Err(err) = environment::document_loaded(&ctx) {
                self.report(&ctx, err);
            }
        });
        self.drain_jobs();
    }

    /// Service timers until stopped or idle.
    fn event_loop(&self) {
        loop {
            if self.stopped() || self.sink.is_closed() {
                return;
            }

            let Some(deadline) = self.timers.borrow().next_deadline() else {
                trace!(run_id = %self.run_id, "No pending timers, context idle");
                return;
            };

            let now = Instant::now();
            if deadline > now && self.kill.wait_timeout(deadline - now) {
                return;
            }

            let due = self.timers.borrow_mut().pop_due(Instant::now());
            for id in due {
                if self.stopped() {
                    return;
                }
                self.context.with(|ctx| {
                    if let Err(err) = environment::fire_timer(&ctx, id) {
                        self.report(&ctx, err);
                    }
                });
                self.drain_jobs();
            }
        }
    }

    /// Run microtasks to exhaustion, then surface unhandled rejections.
    /// Repeats while rejection listeners queue more work.
    fn drain_jobs(&self) {
        loop {
            self.run_microtasks();
            if self.stopped() {
                return;
            }
            self.context.with(|ctx| {
                if let Err(err) = environment::flush_rejections(&ctx) {
                    self.report(&ctx, err);
                }
            });
            if !self.runtime.is_job_pending() {
                return;
            }
        }
    }

    fn run_microtasks(&self) {
        while !self.stopped() {
            match self.runtime.execute_pending_job() {
                Ok(true) => {}
                Ok(false) => return,
                Err(_) => self.context.with(|ctx| {
                    let caught = ctx.catch();
                    if !self.stopped() && !caught.is_undefined() {
                        self.report_value(&ctx, caught);
                    }
                }),
            }
        }
    }

    /// Route a failed engine call back into the guest as an error event.
    fn report(&self, ctx: &Ctx<'_>, err: rquickjs::Error) {
        if self.stopped() {
            let _ = ctx.catch();
            return;
        }
        match err {
            rquickjs::Error::Exception => {
                let caught = ctx.catch();
                self.report_value(ctx, caught);
            }
            other => {
                warn!(run_id = %self.run_id, error = %other, "Engine error in isolated context");
                let payload = serde_json::json!({
                    "type": "error",
                    "message": other.to_string(),
                });
                self.sink.post(payload.to_string());
            }
        }
    }

    fn report_value<'js>(&self, ctx: &Ctx<'js>, value: Value<'js>) {
        if let Err(err) = environment::report_error(ctx, value) {
            if matches!(err, rquickjs::Error::Exception) {
                let _ = ctx.catch();
            }
            debug!(run_id = %self.run_id, error = %err, "Failed to dispatch error event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel;
    use codeyard_types::GuestMessage;
    use std::time::Duration;

    fn run_document(document: &str) -> Vec<GuestMessage> {
        let run_id = RunId::new();
        let (sink, mut subscription) = channel::open(run_id, 64);
        let kill = KillSwitch::new();
        let (started_tx, _started_rx) = oneshot::channel();

        let setup = GuestSetup {
            run_id,
            document: document.to_string(),
            limits: ContextLimits::default(),
            sink,
            kill: kill.clone(),
        };
        let guest = std::thread::spawn(move || run_guest(setup, started_tx));
        guest.join().unwrap();

        let mut messages = Vec::new();
        while let Some(envelope) = subscription.try_recv() {
            if let Some(message) = GuestMessage::parse(&envelope.payload) {
                messages.push(message);
            }
        }
        messages
    }

    fn error_message(message: &GuestMessage) -> Option<&str> {
        match message {
            GuestMessage::Error { message, .. } => Some(message),
            _ => None,
        }
    }

    #[test]
    fn test_scripts_run_in_order() {
        let messages = run_document(
            "<script>parent.postMessage({type:'ready'}, '*')</script>\
             <script>parent.postMessage({type:'console', level:'log', args:['two']}, '*')</script>",
        );
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], GuestMessage::Ready);
    }

    #[test]
    fn test_failing_block_fires_error_event_and_continues() {
        let messages = run_document(
            "<script>window.addEventListener('error', function (e) {\
                parent.postMessage({type:'error', message: e.message}, '*');\
             });</script>\
             <script>null.x;</script>\
             <script>parent.postMessage({type:'ready'}, '*')</script>",
        );
        let error = error_message(&messages[0]).unwrap();
        assert!(error.starts_with("Uncaught TypeError"), "{error}");
        assert_eq!(messages[1], GuestMessage::Ready);
    }

    #[test]
    fn test_timers_and_microtasks() {
        let messages = run_document(
            "<script>\
               var order = [];\
               setTimeout(function () {\
                 order.push('timeout');\
                 parent.postMessage({type:'console', level:'log', args: order}, '*');\
               }, 5);\
               queueMicrotask(function () { order.push('micro'); });\
               Promise.resolve().then(function () { order.push('then'); });\
               order.push('sync');\
               var cleared = setTimeout(function () { order.push('never'); }, 1);\
               clearTimeout(cleared);\
             </script>",
        );
        assert_eq!(
            messages,
            vec![GuestMessage::Console {
                level: codeyard_types::ConsoleLevel::Log,
                args: vec!["sync".into(), "micro".into(), "then".into(), "timeout".into()],
            }]
        );
    }

    #[test]
    fn test_unhandled_rejection_event() {
        let messages = run_document(
            "<script>\
               window.addEventListener('unhandledrejection', function (e) {\
                 parent.postMessage({type:'error', message: 'rejected: ' + e.reason.message}, '*');\
               });\
               Promise.reject(new Error('nope'));\
               Promise.reject(new Error('handled')).catch(function () {});\
             </script>",
        );
        assert_eq!(messages.len(), 1);
        assert_eq!(error_message(&messages[0]), Some("rejected: nope"));
    }

    #[test]
    fn test_document_stub() {
        let messages = run_document(
            "<body><h1 id=\"title\" class=\"big\">Hi</h1>\
             <script>\
               var el = document.getElementById('title');\
               parent.postMessage({type:'console', level:'info', args: [\
                 el.textContent, document.querySelector('.big').id, document.querySelector('h1').tagName,\
                 String(document.getElementById('missing'))\
               ]}, '*');\
             </script></body>",
        );
        assert_eq!(
            messages,
            vec![GuestMessage::Console {
                level: codeyard_types::ConsoleLevel::Info,
                args: vec!["Hi".into(), "title".into(), "H1".into(), "null".into()],
            }]
        );
    }

    #[test]
    fn test_kill_switch_interrupts_loop() {
        let run_id = RunId::new();
        let (sink, _subscription) = channel::open(run_id, 8);
        let kill = KillSwitch::new();
        let (started_tx, _started_rx) = oneshot::channel();
        let setup = GuestSetup {
            run_id,
            document: "<script>while (true) {}</script>".to_string(),
            limits: ContextLimits::default(),
            sink,
            kill: kill.clone(),
        };

        let guest = std::thread::spawn(move || run_guest(setup, started_tx));
        std::thread::sleep(Duration::from_millis(50));
        kill.trip();
        guest.join().unwrap();
    }
}
