//! V8-backed [`Engine`].
//!
//! Each engine owns one context inside a snapshot-creator isolate, and both
//! loads and evaluations run there. Cloning serializes that context into a
//! startup snapshot and the clone restores from the blob, so loaded sources
//! never run again. Every engine keeps its isolate on its own worker thread:
//! V8 requires the isolates of a thread to be disposed in reverse creation
//! order, which one thread per engine keeps true however engines are cloned
//! and dropped.

use std::{
    fmt,
    sync::{Arc, Once},
    thread::{self, JoinHandle},
};

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, instrument, trace, warn};

use crate::engine::{Engine, EngineError, Result};

static START: Once = Once::new();

fn init_platform() {
    START.call_once(|| {
        let platform = v8::new_default_platform(0, false).make_shared();
        v8::V8::initialize_platform(platform);
        v8::V8::initialize();
    });
}

/// Serialized global scope of an engine.
#[derive(Clone)]
struct Snapshot(Arc<[u8]>);

impl Snapshot {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn blob(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Snapshot({} bytes)", self.len())
    }
}

/// An [`Engine`] running on V8.
///
/// A clone starts from a snapshot of the source engine at the time of the
/// clone and builds its own isolate from it the first time it is used.
#[derive(Default)]
pub struct V8Engine {
    /// State the worker starts from.
    seed: Option<Snapshot>,
    worker: Option<Worker>,
}

impl V8Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clones the engine, reporting VM failures instead of panicking.
    pub fn try_clone(&self) -> Result<Self> {
        // An engine that never ran anything is still in its seed state.
        let seed = match &self.worker {
            Some(worker) => worker.call(|reply| Request::Snapshot { reply })?,
            None => self.seed.clone(),
        };
        Ok(Self { seed, worker: None })
    }

    fn worker(&mut self) -> Result<&Worker> {
        if self.worker.is_none() {
            self.worker = Some(Worker::spawn(self.seed.clone())?);
        }
        self.worker.as_ref().ok_or(EngineError::WorkerGone)
    }
}

impl Clone for V8Engine {
    fn clone(&self) -> Self {
        self.try_clone()
            .unwrap_or_else(|e| panic!("failed to clone V8 engine: {e}"))
    }
}

impl fmt::Debug for V8Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("V8Engine")
            .field("seed", &self.seed)
            .field("running", &self.worker.is_some())
            .finish()
    }
}

impl Engine for V8Engine {
    fn clone_engine(&self) -> Box<dyn Engine> {
        Box::new(self.clone())
    }

    #[instrument(level = "debug", skip_all, fields(bytes = source.len()))]
    fn load(&mut self, source: &[u8]) -> Result<()> {
        let source = source.to_vec();
        self.worker()?
            .call(|reply| Request::Load { source, reply })?;
        debug!("source loaded");
        Ok(())
    }

    fn run_react(&mut self, source: &str) -> Result<String> {
        let source = source.to_owned();
        self.worker()?.call(|reply| Request::Run { source, reply })
    }
}

enum Request {
    Load {
        source: Vec<u8>,
        reply: Sender<Result<()>>,
    },
    Run {
        source: String,
        reply: Sender<Result<String>>,
    },
    Snapshot {
        reply: Sender<Result<Option<Snapshot>>>,
    },
}

/// Handle to the thread that owns an engine's isolate.
struct Worker {
    tx: Option<Sender<Request>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(seed: Option<Snapshot>) -> Result<Self> {
        let (tx, rx) = channel::unbounded();
        let handle = thread::Builder::new()
            .name("v8-engine".into())
            .spawn(move || serve(rx, seed))
            .map_err(EngineError::Spawn)?;
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    fn call<T>(&self, request: impl FnOnce(Sender<Result<T>>) -> Request) -> Result<T> {
        let tx = self.tx.as_ref().ok_or(EngineError::WorkerGone)?;
        let (reply, rx) = channel::bounded(1);
        tx.send(request(reply))
            .map_err(|_| EngineError::WorkerGone)?;
        rx.recv().map_err(|_| EngineError::WorkerGone)?
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop.
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("v8 engine worker panicked");
            }
        }
    }
}

fn serve(rx: Receiver<Request>, seed: Option<Snapshot>) {
    init_platform();

    let mut vm = Vm {
        seed,
        creator: None,
    };
    trace!("worker ready to receive requests");
    while let Ok(request) = rx.recv() {
        // A dropped reply channel means the caller is gone, nothing to report.
        match request {
            Request::Load { source, reply } => {
                let _ = reply.send(vm.creator().load(&source));
            }
            Request::Run { source, reply } => {
                let _ = reply.send(vm.creator().run_react(&source));
            }
            Request::Snapshot { reply } => {
                let _ = reply.send(vm.snapshot());
            }
        }
    }
    trace!("worker shutting down");
}

/// Worker-side state. Never leaves the worker thread.
struct Vm {
    /// State the creator was last restored from.
    seed: Option<Snapshot>,
    creator: Option<Creator>,
}

impl Vm {
    fn creator(&mut self) -> &mut Creator {
        let seed = self.seed.as_ref();
        self.creator.get_or_insert_with(|| Creator::new(seed))
    }

    /// Serializes the current context and restores it from the blob, so the
    /// engine carries on with the same state.
    fn snapshot(&mut self) -> Result<Option<Snapshot>> {
        let Some(creator) = self.creator.take() else {
            return Ok(self.seed.clone());
        };
        let snapshot = creator.into_snapshot()?;
        debug!(bytes = snapshot.len(), "context snapshotted");
        self.creator = Some(Creator::new(Some(&snapshot)));
        self.seed = Some(snapshot.clone());
        Ok(Some(snapshot))
    }
}

impl Drop for Vm {
    fn drop(&mut self) {
        // rusty_v8 panics when a snapshot creator is dropped without
        // producing its blob.
        if let Some(creator) = self.creator.take() {
            let _ = creator.into_snapshot();
        }
    }
}

/// The one context of an engine, in a snapshot-creator isolate.
struct Creator {
    // Declared first so the handle is released before the isolate goes away.
    context: v8::Global<v8::Context>,
    isolate: v8::OwnedIsolate,
}

impl Creator {
    fn new(seed: Option<&Snapshot>) -> Self {
        let mut isolate = match seed {
            Some(snapshot) => {
                v8::Isolate::snapshot_creator_from_existing_snapshot(snapshot.blob(), None)
            }
            None => v8::Isolate::snapshot_creator(None),
        };
        let context = {
            let scope = &mut v8::HandleScope::new(&mut isolate);
            let context = v8::Context::new(scope);
            v8::Global::new(scope, context)
        };
        trace!(restored = seed.is_some(), "context created");
        Self { context, isolate }
    }

    fn load(&mut self, source: &[u8]) -> Result<()> {
        let scope = &mut v8::HandleScope::new(&mut self.isolate);
        let context = v8::Local::new(scope, &self.context);
        let scope = &mut v8::ContextScope::new(scope, context);
        let scope = &mut v8::TryCatch::new(scope);

        compile_and_run(scope, source).map(drop)
    }

    fn run_react(&mut self, source: &str) -> Result<String> {
        let scope = &mut v8::HandleScope::new(&mut self.isolate);
        let context = v8::Local::new(scope, &self.context);
        let scope = &mut v8::ContextScope::new(scope, context);
        let scope = &mut v8::TryCatch::new(scope);

        let value = compile_and_run(scope, source.as_bytes())?;
        match v8::Local::<v8::String>::try_from(value) {
            Ok(rendered) => Ok(rendered.to_rust_string_lossy(scope)),
            Err(_) => Err(EngineError::UnexpectedResultType(class_of(scope, value))),
        }
    }

    fn into_snapshot(self) -> Result<Snapshot> {
        let Self {
            context,
            mut isolate,
        } = self;
        {
            let scope = &mut v8::HandleScope::new(&mut isolate);
            let context = v8::Local::new(scope, &context);
            scope.set_default_context(context);
        }
        // create_blob refuses to run while global handles are alive.
        drop(context);
        let blob = isolate
            .create_blob(v8::FunctionCodeHandling::Keep)
            .ok_or(EngineError::Snapshot)?;
        Ok(Snapshot(Arc::from(&*blob)))
    }
}

fn compile_and_run<'s>(
    scope: &mut v8::TryCatch<v8::HandleScope<'s>>,
    source: &[u8],
) -> Result<v8::Local<'s, v8::Value>> {
    let code = v8::String::new_from_utf8(scope, source, v8::NewStringType::Normal)
        .ok_or(EngineError::SourceTooLarge(source.len()))?;
    let Some(script) = v8::Script::compile(scope, code, None) else {
        return Err(failure(scope));
    };
    script.run(scope).ok_or_else(|| failure(scope))
}

/// Describes whatever the try-catch scope caught.
fn failure(scope: &mut v8::TryCatch<v8::HandleScope>) -> EngineError {
    let description = if let Some(message) = scope.message() {
        let text = message.get(scope).to_rust_string_lossy(scope);
        match message.get_line_number(scope) {
            Some(line) => format!("{text} (line {line})"),
            None => text,
        }
    } else if let Some(exception) = scope.exception() {
        exception
            .to_string(scope)
            .map(|s| s.to_rust_string_lossy(scope))
            .unwrap_or_default()
    } else {
        String::new()
    };

    if description.is_empty() {
        EngineError::ParseOrRuntime("script did not complete".into())
    } else {
        EngineError::ParseOrRuntime(description)
    }
}

/// Name of a value's runtime type: `typeof` for primitives, the constructor
/// name for objects.
fn class_of<'s>(scope: &mut v8::HandleScope<'s>, value: v8::Local<'s, v8::Value>) -> String {
    let primitive = if value.is_undefined() {
        "undefined"
    } else if value.is_null() {
        "null"
    } else if value.is_boolean() {
        "boolean"
    } else if value.is_number() {
        "number"
    } else if value.is_big_int() {
        "bigint"
    } else if value.is_symbol() {
        "symbol"
    } else {
        return match value.to_object(scope) {
            Some(object) => object.get_constructor_name().to_rust_string_lossy(scope),
            None => "unknown".into(),
        };
    };
    primitive.into()
}
