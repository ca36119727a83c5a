//! Testing utilities for users of the casework library.
//!
//! - [`FakeRuntime`]: a container runtime that records calls instead of
//!   talking to a container engine
//! - [`RecordingHandler`]: an event handler that keeps every event
//! - [`ScriptedPlugin`]: a built-in plugin with scripted behaviour

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::core::arguments::Arguments;
use crate::core::filter::{Filter, Record};
use crate::events::{Event, EventHandler};
use crate::plugins::{Plugin, PluginError};
use crate::runtime::{ContainerError, ContainerRuntime, ContainerSpec, RegistryAuth};
use crate::store::StoreHandle;

/// A call received by [`FakeRuntime`].
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeCall {
    Login(RegistryAuth),
    Pull(String),
    Build { tag: String, context: Vec<u8> },
    Create(ContainerSpec),
    Start(String),
    Wait(String),
    Logs(String),
    Remove(String),
}

impl RuntimeCall {
    /// Operation name, as used by [`FakeRuntime::failing`].
    pub fn operation(&self) -> &'static str {
        match self {
            RuntimeCall::Login(_) => "login",
            RuntimeCall::Pull(_) => "pull",
            RuntimeCall::Build { .. } => "build",
            RuntimeCall::Create(_) => "create",
            RuntimeCall::Start(_) => "start",
            RuntimeCall::Wait(_) => "wait",
            RuntimeCall::Logs(_) => "logs",
            RuntimeCall::Remove(_) => "remove",
        }
    }
}

/// In-process container runtime.
///
/// Every container "runs" instantly, exits with the configured code, and
/// produces the configured logs.
///
/// # Example
///
/// ```
/// use casework::testing::FakeRuntime;
///
/// let runtime = FakeRuntime::new().with_exit_code(2).with_logs("parsed 0 files");
/// ```
#[derive(Debug, Default)]
pub struct FakeRuntime {
    calls: Mutex<Vec<RuntimeCall>>,
    exit_code: i64,
    logs: String,
    failing: Option<&'static str>,
    next_id: AtomicU32,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit code reported by `wait`.
    pub fn with_exit_code(mut self, code: i64) -> Self {
        self.exit_code = code;
        self
    }

    /// Output reported by `logs`.
    pub fn with_logs(mut self, logs: impl Into<String>) -> Self {
        self.logs = logs.into();
        self
    }

    /// Reject every call to `operation` (e.g. `"pull"`).
    pub fn failing(mut self, operation: &'static str) -> Self {
        self.failing = Some(operation);
        self
    }

    /// Every call received so far, in order.
    pub async fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.lock().await.clone()
    }

    /// Names of the operations received so far, in order.
    pub async fn operations(&self) -> Vec<&'static str> {
        self.calls.lock().await.iter().map(RuntimeCall::operation).collect()
    }

    /// Specs of every created container.
    pub async fn created(&self) -> Vec<ContainerSpec> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                RuntimeCall::Create(spec) => Some(spec.clone()),
                _ => None,
            })
            .collect()
    }

    async fn record(&self, call: RuntimeCall) -> Result<(), ContainerError> {
        let operation = call.operation();
        self.calls.lock().await.push(call);
        if self.failing == Some(operation) {
            return Err(ContainerError::Rejected {
                operation,
                message: "rejected by fake runtime".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn login(&self, auth: &RegistryAuth) -> Result<(), ContainerError> {
        self.record(RuntimeCall::Login(auth.clone())).await
    }

    async fn pull(&self, image: &str) -> Result<String, ContainerError> {
        self.record(RuntimeCall::Pull(image.to_string())).await?;
        Ok(format!("pulled {}", image))
    }

    async fn build(&self, context: Vec<u8>, tag: &str) -> Result<String, ContainerError> {
        self.record(RuntimeCall::Build {
            tag: tag.to_string(),
            context,
        })
        .await?;
        Ok(format!("built {}", tag))
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String, ContainerError> {
        self.record(RuntimeCall::Create(spec.clone())).await?;
        Ok(format!("fake-{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn start(&self, id: &str) -> Result<(), ContainerError> {
        self.record(RuntimeCall::Start(id.to_string())).await
    }

    async fn wait(&self, id: &str) -> Result<i64, ContainerError> {
        self.record(RuntimeCall::Wait(id.to_string())).await?;
        Ok(self.exit_code)
    }

    async fn logs(&self, id: &str) -> Result<String, ContainerError> {
        self.record(RuntimeCall::Logs(id.to_string())).await?;
        Ok(self.logs.clone())
    }

    async fn remove(&self, id: &str) -> Result<(), ContainerError> {
        self.record(RuntimeCall::Remove(id.to_string())).await
    }
}

/// Event handler that records every event it receives.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<Event>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event received so far.
    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    /// Number of received events matching `predicate`.
    pub async fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().await.iter().filter(|e| predicate(e)).count()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &Event) {
        self.events.lock().await.push(event.clone());
    }
}

/// What a [`ScriptedPlugin`] does when run.
#[derive(Debug, Clone)]
pub enum Script {
    /// Succeed without touching the store.
    Succeed,
    /// Insert these records, then succeed.
    Insert(Vec<Record>),
    /// Fail with this message.
    Fail(String),
    /// Panic with this message.
    Panic(String),
}

/// Built-in plugin with scripted behaviour that records its invocations.
#[derive(Debug)]
pub struct ScriptedPlugin {
    script: Script,
    delay: Option<Duration>,
    invocations: Mutex<Vec<(Arguments, Filter)>>,
    spans: Mutex<Vec<(Instant, Instant)>>,
}

impl ScriptedPlugin {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            delay: None,
            invocations: Mutex::new(Vec::new()),
            spans: Mutex::new(Vec::new()),
        }
    }

    /// Sleep for `delay` before acting.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Arguments and filter of every invocation so far.
    pub async fn invocations(&self) -> Vec<(Arguments, Filter)> {
        self.invocations.lock().await.clone()
    }

    /// Start and finish instants of every completed invocation.
    pub async fn spans(&self) -> Vec<(Instant, Instant)> {
        self.spans.lock().await.clone()
    }
}

#[async_trait]
impl Plugin for ScriptedPlugin {
    fn description(&self) -> &str {
        "Scripted test plugin"
    }

    async fn run(
        &self,
        store: &StoreHandle,
        arguments: &Arguments,
        filter: &Filter,
    ) -> Result<(), PluginError> {
        self.invocations
            .lock()
            .await
            .push((arguments.clone(), filter.clone()));

        let started = Instant::now();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = match &self.script {
            Script::Succeed => Ok(()),
            Script::Insert(records) => store
                .insert_all(records.clone())
                .await
                .map(|_| ())
                .map_err(PluginError::from),
            Script::Fail(message) => Err(PluginError::InvalidInput(message.clone())),
            Script::Panic(message) => panic!("{}", message),
        };

        self.spans.lock().await.push((started, Instant::now()));
        result
    }
}
