//! Extension mediator.
//!
//! Owns the per-URI lifecycle, the definition tables built from registration
//! schemas, and the live data objects. All proxy responses and pushes are
//! routed through the configured [`Executor`], so the mediator never blocks
//! a calling thread waiting for an extension.
//!
//! Locking rule: proxy and environment calls are never made while the state
//! lock is held. An inline executor may resolve a request on the calling
//! stack, which would re-enter the mediator and deadlock otherwise.

use crate::content::{DocumentContent, ExtensionRequest, SessionConfig};
use crate::definitions::{
    parse_schema, ExtensionCommandDefinition, ExtensionEventHandlerDefinition,
};
use crate::environment::{DocumentEnvironment, EventHandlerInvocation};
use crate::error::ExtensionHostError;
use crate::livedata::{LiveDataHandle, LiveDataObject};
use crate::reconcile::{apply_batch, compute_fires, parse_operations};
use folio_extension_sdk::executor::{Executor, InlineExecutor};
use folio_extension_sdk::protocol::{
    CommandError, CommandRequest, EventMessage, LiveDataUpdateMessage, RegistrationFailure,
    RegistrationRequest, RegistrationSuccess,
};
use folio_extension_sdk::proxy::ExtensionProxy;
use folio_extension_sdk::registrar::ExtensionRegistrar;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Lifecycle state of one extension URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionState {
    /// Known but untouched.
    Idle,
    /// Initialization in flight.
    Initializing,
    /// Initialization failed; the URI is skipped on load.
    InitializationFailed,
    /// Initialized, not yet registered.
    Initialized,
    /// Registration request in flight.
    Registering,
    /// Registration was refused or its schema was invalid.
    RegistrationFailed,
    /// Fully registered; commands and messages may flow.
    Registered,
}

/// Outcome of a validated command invocation.
pub enum CommandOutcome {
    /// The command does not require resolution; dispatch is the outcome.
    Resolved,
    /// The command stays pending until the extension resolves it.
    Pending(CommandTicket),
}

/// Pending resolution of a command that declared `requireResponse`.
pub struct CommandTicket {
    id: u64,
    receiver: oneshot::Receiver<Result<Option<Value>, CommandError>>,
}

impl CommandTicket {
    /// Id of the in-flight command.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the extension to resolve the command.
    pub async fn resolved(self) -> Result<Option<Value>, CommandError> {
        let id = self.id;
        match self.receiver.await {
            Ok(outcome) => outcome,
            Err(_) => Err(CommandError::new(id, 100, "command resolution dropped")),
        }
    }

    /// Non-blocking poll for an already-delivered resolution.
    pub fn try_resolved(&mut self) -> Option<Result<Option<Value>, CommandError>> {
        self.receiver.try_recv().ok()
    }
}

type LoadCompletion = Box<dyn FnOnce() + Send>;

/// One in-flight `load_extensions` call. Loads may overlap; each tracks its
/// own pending URIs so one load's registration never completes another.
struct LoadTracker {
    pending: HashSet<String>,
    on_complete: Option<LoadCompletion>,
}

/// State behind the mediator's lock.
#[derive(Default)]
struct MediatorCore {
    states: HashMap<String, ExtensionState>,
    proxies: HashMap<String, Arc<dyn ExtensionProxy>>,
    requests: HashMap<String, ExtensionRequest>,
    commands: Vec<Arc<ExtensionCommandDefinition>>,
    event_handlers: Vec<ExtensionEventHandlerDefinition>,
    live_objects: HashMap<String, Arc<Mutex<LiveDataObject>>>,
    environment: Option<Arc<dyn DocumentEnvironment>>,
    loads: Vec<LoadTracker>,
    next_command_id: u64,
    /// Proxies whose push callbacks are already wired, keyed by pointer.
    wired_proxies: HashSet<usize>,
}

impl MediatorCore {
    fn new() -> Self {
        Self {
            // Command ids are per-session and observable on the wire; id 0
            // is reserved so extensions can treat it as "no command".
            next_command_id: 1,
            ..Self::default()
        }
    }

    fn command(&self, uri: &str, name: &str) -> Option<Arc<ExtensionCommandDefinition>> {
        self.commands
            .iter()
            .find(|def| def.uri == uri && def.name == name)
            .cloned()
    }
}

/// Host-side mediator for document extensions.
pub struct ExtensionMediator {
    core: Arc<Mutex<MediatorCore>>,
    registrar: Arc<ExtensionRegistrar>,
    executor: Arc<dyn Executor>,
}

impl ExtensionMediator {
    /// Creates a mediator resolving everything inline on the calling stack.
    pub fn new(registrar: Arc<ExtensionRegistrar>) -> Self {
        Self::with_executor(registrar, Arc::new(InlineExecutor))
    }

    /// Creates a mediator deferring callback work through `executor`.
    pub fn with_executor(registrar: Arc<ExtensionRegistrar>, executor: Arc<dyn Executor>) -> Self {
        Self {
            core: Arc::new(Mutex::new(MediatorCore::new())),
            registrar,
            executor,
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Initializes the extensions a document requests, ahead of or as part
    /// of loading. URIs initialized here are not re-initialized on load.
    pub fn initialize_extensions(&self, content: &DocumentContent) {
        for request in content.requests() {
            let uri = request.uri.clone();
            let proxy = {
                let mut core = self.core.lock().expect("mediator lock");
                match core.states.get(&uri) {
                    None | Some(ExtensionState::Idle) => {}
                    _ => continue,
                }
                let Some(proxy) = self.registrar.get_proxy(&uri) else {
                    warn!(uri = %uri, "no extension proxy registered for requested uri");
                    core.states
                        .insert(uri.clone(), ExtensionState::InitializationFailed);
                    continue;
                };
                core.states.insert(uri.clone(), ExtensionState::Initializing);
                core.proxies.insert(uri.clone(), proxy.clone());
                proxy
            };

            let initialized = proxy.initialize_extension(&uri);
            let mut core = self.core.lock().expect("mediator lock");
            let state = if initialized {
                ExtensionState::Initialized
            } else {
                warn!(uri = %uri, "extension initialization failed");
                ExtensionState::InitializationFailed
            };
            core.states.insert(uri, state);
        }
    }

    /// Registers every requested extension and calls `on_complete` once all
    /// of them reach a terminal state. Completion is routed through the
    /// executor; with an inline executor it can fire on this stack.
    pub fn load_extensions(
        &self,
        config: &SessionConfig,
        content: &DocumentContent,
        environment: Arc<dyn DocumentEnvironment>,
        on_complete: impl FnOnce() + Send + 'static,
    ) {
        self.initialize_extensions(content);

        let mut work: Vec<(String, Arc<dyn ExtensionProxy>, RegistrationRequest)> = Vec::new();
        let mut rebinds: Vec<(String, String, Vec<(String, LiveDataHandle)>)> = Vec::new();
        {
            let mut core = self.core.lock().expect("mediator lock");
            core.environment = Some(environment.clone());

            let mut pending = HashSet::new();
            for request in content.requests() {
                let uri = request.uri.clone();
                core.requests.insert(uri.clone(), request.clone());
                match core.states.get(&uri) {
                    Some(ExtensionState::Initialized) => {}
                    Some(ExtensionState::Registered) => {
                        // Already registered: skip straight to binding the
                        // supplied environment, no new round trip.
                        let mut handles = Vec::new();
                        for (name, object) in &core.live_objects {
                            if object.lock().expect("live data lock").uri() == uri {
                                handles.push((name.clone(), LiveDataHandle::new(object.clone())));
                            }
                        }
                        rebinds.push((uri, request.display_name.clone(), handles));
                        continue;
                    }
                    Some(ExtensionState::Registering) => {
                        // A previous load's request is still in flight; this
                        // load completes when it settles.
                        pending.insert(uri);
                        continue;
                    }
                    Some(state) => {
                        warn!(uri = %uri, state = ?state, "skipping extension not ready to register");
                        continue;
                    }
                    None => continue,
                }
                let Some(proxy) = core.proxies.get(&uri).cloned() else {
                    continue;
                };
                core.states.insert(uri.clone(), ExtensionState::Registering);
                let message = RegistrationRequest::new()
                    .with_flags(config.flags_for(&uri))
                    .with_settings(content.settings_for(request));
                pending.insert(uri.clone());
                work.push((uri, proxy, message));
            }

            core.loads.push(LoadTracker {
                pending,
                on_complete: Some(Box::new(on_complete)),
            });
        }

        for (uri, display_name, handles) in rebinds {
            for (name, handle) in handles {
                environment.bind_live_data(&name, handle);
            }
            environment.extension_registered(&uri, &display_name);
        }

        for (uri, proxy, message) in work {
            let accepted = proxy.get_registration(
                &uri,
                message,
                registration_success_callback(&self.core, &self.executor),
                registration_failure_callback(&self.core, &self.executor),
            );
            if !accepted {
                warn!(uri = %uri, "registration request refused by proxy");
                let core = Arc::downgrade(&self.core);
                let executor = self.executor.clone();
                self.executor.enqueue_task(Box::new(move || {
                    handle_registration_failure(
                        &core,
                        &executor,
                        &uri,
                        RegistrationFailure::exception("registration request refused"),
                    );
                }));
            }
        }

        // Covers a load with nothing to register, and a deferred executor
        // whose responses all landed before this point.
        let core = Arc::downgrade(&self.core);
        if !self.executor.enqueue_task(Box::new(move || {
            finish_load_if_done(&core);
        })) {
            warn!("executor refused load-completion task");
        }
    }

    // ── Commands and messages ────────────────────────────────────────

    /// Validates and dispatches a declared command.
    ///
    /// Missing required properties without defaults fail before dispatch;
    /// declared defaults are filled in; undeclared properties pass through.
    pub fn invoke_extension_command(
        &self,
        uri: &str,
        name: &str,
        properties: Value,
    ) -> Result<CommandOutcome, ExtensionHostError> {
        let (definition, proxy, id) = {
            let mut core = self.core.lock().expect("mediator lock");
            if core.states.get(uri) != Some(&ExtensionState::Registered) {
                return Err(ExtensionHostError::ExtensionNotAvailable(uri.to_string()));
            }
            let definition =
                core.command(uri, name)
                    .ok_or_else(|| ExtensionHostError::UnknownCommand {
                        uri: uri.to_string(),
                        name: name.to_string(),
                    })?;
            let proxy = core
                .proxies
                .get(uri)
                .cloned()
                .ok_or_else(|| ExtensionHostError::ExtensionNotAvailable(uri.to_string()))?;
            let id = core.next_command_id;
            core.next_command_id += 1;
            (definition, proxy, id)
        };

        let mut payload = match properties {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        for (property, declared) in &definition.property_map {
            if payload.contains_key(property) {
                continue;
            }
            if let Some(default) = &declared.default_value {
                payload.insert(property.clone(), default.clone());
            } else if declared.required {
                return Err(ExtensionHostError::MissingRequiredProperty {
                    command: name.to_string(),
                    property: property.clone(),
                });
            }
        }

        let request = CommandRequest::new(id, uri, name, Value::Object(payload));

        if !definition.require_resolution {
            let accepted = proxy.invoke_command(
                uri,
                request,
                Box::new(move |uri, _result| {
                    debug!(uri = %uri, id, "command resolved");
                }),
                Box::new(move |uri, error| {
                    warn!(uri = %uri, id, code = error.error_code, "command failed: {}", error.error_message);
                }),
            );
            if !accepted {
                return Err(ExtensionHostError::DispatchRejected {
                    uri: uri.to_string(),
                    name: name.to_string(),
                });
            }
            return Ok(CommandOutcome::Resolved);
        }

        let (sender, receiver) = oneshot::channel();
        let slot = Arc::new(Mutex::new(Some(sender)));
        let on_success = {
            let slot = slot.clone();
            let executor = self.executor.clone();
            Box::new(move |_uri: &str, result: Option<Value>| {
                executor.enqueue_task(Box::new(move || {
                    if let Some(sender) = slot.lock().expect("command slot lock").take() {
                        let _ = sender.send(Ok(result));
                    }
                }));
            })
        };
        let on_failure = {
            let slot = slot.clone();
            let executor = self.executor.clone();
            Box::new(move |_uri: &str, error: CommandError| {
                executor.enqueue_task(Box::new(move || {
                    if let Some(sender) = slot.lock().expect("command slot lock").take() {
                        let _ = sender.send(Err(error));
                    }
                }));
            })
        };

        if !proxy.invoke_command(uri, request, on_success, on_failure) {
            return Err(ExtensionHostError::DispatchRejected {
                uri: uri.to_string(),
                name: name.to_string(),
            });
        }
        Ok(CommandOutcome::Pending(CommandTicket { id, receiver }))
    }

    /// Forwards an opaque message to a registered extension.
    pub fn send_extension_message(
        &self,
        uri: &str,
        message: Value,
    ) -> Result<(), ExtensionHostError> {
        let proxy = {
            let core = self.core.lock().expect("mediator lock");
            if core.states.get(uri) != Some(&ExtensionState::Registered) {
                return Err(ExtensionHostError::ExtensionNotAvailable(uri.to_string()));
            }
            core.proxies
                .get(uri)
                .cloned()
                .ok_or_else(|| ExtensionHostError::ExtensionNotAvailable(uri.to_string()))?
        };
        if !proxy.send_message(uri, message) {
            return Err(ExtensionHostError::DispatchRejected {
                uri: uri.to_string(),
                name: "message".to_string(),
            });
        }
        Ok(())
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn extension_state(&self, uri: &str) -> Option<ExtensionState> {
        self.core
            .lock()
            .expect("mediator lock")
            .states
            .get(uri)
            .copied()
    }

    /// URIs currently in the `Registered` state, sorted.
    pub fn registered_uris(&self) -> Vec<String> {
        let core = self.core.lock().expect("mediator lock");
        let mut uris: Vec<String> = core
            .states
            .iter()
            .filter(|(_, state)| **state == ExtensionState::Registered)
            .map(|(uri, _)| uri.clone())
            .collect();
        uris.sort();
        uris
    }

    pub fn command_definitions(&self) -> Vec<Arc<ExtensionCommandDefinition>> {
        self.core.lock().expect("mediator lock").commands.clone()
    }

    pub fn event_handler_definitions(&self) -> Vec<ExtensionEventHandlerDefinition> {
        self.core
            .lock()
            .expect("mediator lock")
            .event_handlers
            .clone()
    }

    /// Handle for a bound live data object, if one exists under `name`.
    pub fn live_data_object(&self, name: &str) -> Option<LiveDataHandle> {
        self.core
            .lock()
            .expect("mediator lock")
            .live_objects
            .get(name)
            .cloned()
            .map(LiveDataHandle::new)
    }

    /// Names of all bound live data objects, sorted.
    pub fn live_data_object_names(&self) -> Vec<String> {
        let core = self.core.lock().expect("mediator lock");
        let mut names: Vec<String> = core.live_objects.keys().cloned().collect();
        names.sort();
        names
    }
}

// ── Registration handling ────────────────────────────────────────────

fn registration_success_callback(
    core: &Arc<Mutex<MediatorCore>>,
    executor: &Arc<dyn Executor>,
) -> Box<dyn FnOnce(&str, RegistrationSuccess) + Send> {
    let core = Arc::downgrade(core);
    let executor = executor.clone();
    Box::new(move |uri, response| {
        let uri = uri.to_string();
        let task_core = core.clone();
        let task_executor = executor.clone();
        executor.enqueue_task(Box::new(move || {
            handle_registration_success(&task_core, &task_executor, &uri, response);
        }));
    })
}

fn registration_failure_callback(
    core: &Arc<Mutex<MediatorCore>>,
    executor: &Arc<dyn Executor>,
) -> Box<dyn FnOnce(&str, RegistrationFailure) + Send> {
    let core = Arc::downgrade(core);
    let executor = executor.clone();
    Box::new(move |uri, failure| {
        let uri = uri.to_string();
        let task_core = core.clone();
        let task_executor = executor.clone();
        executor.enqueue_task(Box::new(move || {
            handle_registration_failure(&task_core, &task_executor, &uri, failure);
        }));
    })
}

fn handle_registration_success(
    core: &Weak<Mutex<MediatorCore>>,
    executor: &Arc<dyn Executor>,
    uri: &str,
    response: RegistrationSuccess,
) {
    let Some(core) = core.upgrade() else {
        return;
    };

    let environment;
    let proxy;
    let display_name;
    let token = response.token.clone();
    let mut handles: Vec<(String, LiveDataHandle)> = Vec::new();
    let needs_wiring;
    let completions;
    {
        let mut guard = core.lock().expect("mediator lock");
        if guard.states.get(uri) != Some(&ExtensionState::Registering) {
            warn!(uri = %uri, "unexpected registration response dropped");
            return;
        }

        let parsed = match parse_schema(uri, &response.schema) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(uri = %uri, "invalid registration schema: {err}");
                guard
                    .states
                    .insert(uri.to_string(), ExtensionState::RegistrationFailed);
                let completions = settle_load(&mut guard, uri);
                drop(guard);
                run_completions(completions);
                return;
            }
        };

        for definition in parsed.commands {
            guard.commands.push(Arc::new(definition));
        }
        guard.event_handlers.extend(parsed.event_handlers);
        for definition in parsed.live_data {
            let name = definition.name.clone();
            if guard.live_objects.contains_key(&name) {
                warn!(uri = %uri, name = %name, "live data name already bound, keeping first");
                continue;
            }
            let object = Arc::new(Mutex::new(LiveDataObject::new(Arc::new(definition))));
            handles.push((name.clone(), LiveDataHandle::new(object.clone())));
            guard.live_objects.insert(name, object);
        }

        guard
            .states
            .insert(uri.to_string(), ExtensionState::Registered);
        environment = guard.environment.clone();
        proxy = guard.proxies.get(uri).cloned();
        display_name = guard
            .requests
            .get(uri)
            .map(|request| request.display_name.clone())
            .unwrap_or_else(|| uri.to_string());
        needs_wiring = match &proxy {
            Some(proxy) => guard
                .wired_proxies
                .insert(Arc::as_ptr(proxy) as *const () as usize),
            None => false,
        };
        completions = settle_load(&mut guard, uri);
    }

    if let Some(proxy) = &proxy {
        if needs_wiring {
            wire_push_callbacks(&core, executor, proxy.as_ref());
        }
        proxy.on_registered(uri, &token);
    }
    if let Some(environment) = &environment {
        for (name, handle) in handles {
            environment.bind_live_data(&name, handle);
        }
        environment.extension_registered(uri, &display_name);
    }
    debug!(uri = %uri, "extension registered");
    run_completions(completions);
}

fn handle_registration_failure(
    core: &Weak<Mutex<MediatorCore>>,
    _executor: &Arc<dyn Executor>,
    uri: &str,
    failure: RegistrationFailure,
) {
    let Some(core) = core.upgrade() else {
        return;
    };
    let completions = {
        let mut guard = core.lock().expect("mediator lock");
        if guard.states.get(uri) != Some(&ExtensionState::Registering) {
            warn!(uri = %uri, "unexpected registration failure dropped");
            return;
        }
        warn!(
            uri = %uri,
            code = failure.error_code,
            "extension registration failed: {}",
            failure.error_message
        );
        guard
            .states
            .insert(uri.to_string(), ExtensionState::RegistrationFailed);
        settle_load(&mut guard, uri)
    };
    run_completions(completions);
}

/// Marks `uri` terminal for every in-flight load, returning the completion
/// callbacks of loads with no registration left pending.
fn settle_load(core: &mut MediatorCore, uri: &str) -> Vec<LoadCompletion> {
    for tracker in core.loads.iter_mut() {
        tracker.pending.remove(uri);
    }
    drain_completed_loads(core)
}

fn drain_completed_loads(core: &mut MediatorCore) -> Vec<LoadCompletion> {
    let mut completions = Vec::new();
    for tracker in core.loads.iter_mut() {
        if tracker.pending.is_empty() {
            if let Some(complete) = tracker.on_complete.take() {
                completions.push(complete);
            }
        }
    }
    core.loads.retain(|tracker| tracker.on_complete.is_some());
    completions
}

/// Fires the completion of any load with nothing left in flight.
fn finish_load_if_done(core: &Weak<Mutex<MediatorCore>>) {
    let Some(core) = core.upgrade() else {
        return;
    };
    let completions = {
        let mut guard = core.lock().expect("mediator lock");
        drain_completed_loads(&mut guard)
    };
    run_completions(completions);
}

fn run_completions(completions: Vec<LoadCompletion>) {
    for complete in completions {
        complete();
    }
}

// ── Push delivery ────────────────────────────────────────────────────

fn wire_push_callbacks(
    core: &Arc<Mutex<MediatorCore>>,
    executor: &Arc<dyn Executor>,
    proxy: &dyn ExtensionProxy,
) {
    let event_core = Arc::downgrade(core);
    let event_executor = executor.clone();
    proxy.register_event_callback(Arc::new(move |uri, message| {
        let core = event_core.clone();
        let uri = uri.to_string();
        event_executor.enqueue_task(Box::new(move || {
            deliver_event(&core, &uri, message);
        }));
    }));

    let data_core = Arc::downgrade(core);
    let data_executor = executor.clone();
    proxy.register_live_data_callback(Arc::new(move |uri, message| {
        let core = data_core.clone();
        let uri = uri.to_string();
        data_executor.enqueue_task(Box::new(move || {
            deliver_live_data(&core, &uri, message);
        }));
    }));
}

fn deliver_event(core: &Weak<Mutex<MediatorCore>>, uri: &str, message: EventMessage) {
    let Some(core) = core.upgrade() else {
        return;
    };
    let (known, environment) = {
        let guard = core.lock().expect("mediator lock");
        let known = guard
            .event_handlers
            .iter()
            .any(|def| def.uri == uri && def.name == message.name);
        (known, guard.environment.clone())
    };
    if !known {
        warn!(uri = %uri, name = %message.name, "event does not match a declared handler, dropped");
        return;
    }
    if let Some(environment) = environment {
        environment.invoke_event_handler(EventHandlerInvocation {
            uri: uri.to_string(),
            handler: message.name,
            event: message.payload,
            sequencer: message.sequencer,
        });
    }
}

fn deliver_live_data(core: &Weak<Mutex<MediatorCore>>, uri: &str, message: LiveDataUpdateMessage) {
    let Some(core) = core.upgrade() else {
        return;
    };
    let (object, environment) = {
        let guard = core.lock().expect("mediator lock");
        (
            guard.live_objects.get(&message.name).cloned(),
            guard.environment.clone(),
        )
    };
    let Some(object) = object else {
        let err = ExtensionHostError::UnknownLiveDataObject(message.name.clone());
        warn!(uri = %uri, "live data update dropped: {err}");
        return;
    };

    let fires = {
        let mut object = object.lock().expect("live data lock");
        if object.uri() != message.target || object.uri() != uri {
            let err = ExtensionHostError::LiveDataTargetMismatch {
                object: message.name.clone(),
                uri: message.target.clone(),
            };
            warn!(uri = %uri, owner = %object.uri(), "live data update dropped: {err}");
            return;
        }
        let operations = match parse_operations(object.name(), &message.operations) {
            Ok(operations) => operations,
            Err(err) => {
                warn!(uri = %uri, "live data batch rejected: {err}");
                return;
            }
        };
        let records = match apply_batch(&mut object, &operations) {
            Ok(records) => records,
            Err(err) => {
                warn!(uri = %uri, "live data batch rejected: {err}");
                return;
            }
        };
        compute_fires(&object, &records)
    };

    if let Some(environment) = environment {
        environment.live_data_changed(&message.name);
        for fire in fires {
            environment.invoke_event_handler(EventHandlerInvocation {
                uri: uri.to_string(),
                handler: fire.handler,
                event: fire.event,
                sequencer: None,
            });
        }
    }
}
