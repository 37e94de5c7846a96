//! Shared fakes for the integration suites: a scriptable statement
//! processor, a recording response sink, and a deterministic clock.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use graphwire::{
    Authenticator, Bookmark, Clock, ConnectionId, MachineContext, ProcessorError, ResponseSink,
    StatementOutcome, StatementProcessor, StreamMode, StreamSpec, TransactionOptions, Value,
    ValueMap,
};

/// Everything the engine pushed towards the client, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum SinkEvent {
    Metadata(String, Value),
    PullRecords(usize),
    DiscardRecords(u64),
    Success,
    Failure { code: String, auth_expired: bool },
    Ignored,
}

#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<SinkEvent>>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SinkEvent> { self.events.lock().expect("sink lock").clone() }

    pub fn contains(&self, event: &SinkEvent) -> bool { self.events().contains(event) }

    fn push(&self, event: SinkEvent) { self.events.lock().expect("sink lock").push(event); }
}

impl ResponseSink for RecordingSink {
    fn on_metadata(&mut self, key: &str, value: Value) {
        self.push(SinkEvent::Metadata(key.to_owned(), value));
    }

    fn on_pull_records(&mut self, records: Vec<Vec<Value>>) {
        self.push(SinkEvent::PullRecords(records.len()));
    }

    fn on_discard_records(&mut self, count: u64) {
        self.push(SinkEvent::DiscardRecords(count));
    }

    fn on_success(&mut self) { self.push(SinkEvent::Success); }

    fn on_failure(&mut self, code: &str, _message: &str, auth_expired: bool) {
        self.push(SinkEvent::Failure {
            code: code.to_owned(),
            auth_expired,
        });
    }

    fn on_ignored(&mut self) { self.push(SinkEvent::Ignored); }
}

/// Failure script for [`FakeProcessor`].
#[derive(Clone, Default)]
pub struct ProcessorScript {
    pub fail_run: Option<ProcessorError>,
    pub fail_stream: Option<ProcessorError>,
    pub fail_reset: Option<ProcessorError>,
    pub fail_rollback: Option<ProcessorError>,
    pub records: Vec<Vec<Value>>,
}

/// Statement processor that records its calls and follows a failure script.
pub struct FakeProcessor {
    script: ProcessorScript,
    calls: Arc<Mutex<Vec<&'static str>>>,
    in_transaction: bool,
    commits: u64,
}

impl FakeProcessor {
    pub fn new(script: ProcessorScript) -> Self {
        Self {
            script,
            calls: Arc::new(Mutex::new(Vec::new())),
            in_transaction: false,
            commits: 0,
        }
    }

    pub fn call_log(&self) -> Arc<Mutex<Vec<&'static str>>> { Arc::clone(&self.calls) }

    fn record(&self, call: &'static str) { self.calls.lock().expect("call lock").push(call); }
}

impl Default for FakeProcessor {
    fn default() -> Self { Self::new(ProcessorScript::default()) }
}

#[async_trait]
impl StatementProcessor for FakeProcessor {
    async fn run(
        &mut self,
        _statement: &str,
        _parameters: &ValueMap,
        _options: &TransactionOptions,
    ) -> Result<StatementOutcome, ProcessorError> {
        self.record("run");
        if let Some(error) = self.script.fail_run.clone() {
            return Err(error);
        }
        Ok(StatementOutcome {
            fields: vec!["n".to_owned()],
        })
    }

    async fn stream_result(
        &mut self,
        spec: StreamSpec,
        sink: &mut dyn ResponseSink,
    ) -> Result<Option<Bookmark>, ProcessorError> {
        self.record("stream");
        if let Some(error) = self.script.fail_stream.clone() {
            return Err(error);
        }
        match spec.mode {
            StreamMode::Pull => sink.on_pull_records(self.script.records.clone()),
            StreamMode::Discard => {
                sink.on_discard_records(self.script.records.len() as u64);
            }
        }
        if self.in_transaction {
            Ok(None)
        } else {
            Ok(Some(Bookmark::from("bm-auto-1")))
        }
    }

    async fn begin_transaction(
        &mut self,
        _options: &TransactionOptions,
    ) -> Result<(), ProcessorError> {
        self.record("begin");
        self.in_transaction = true;
        Ok(())
    }

    async fn commit_transaction(&mut self) -> Result<Bookmark, ProcessorError> {
        self.record("commit");
        self.in_transaction = false;
        self.commits += 1;
        Ok(Bookmark(format!("bm-tx-{}", self.commits)))
    }

    async fn rollback_transaction(&mut self) -> Result<(), ProcessorError> {
        self.record("rollback");
        if let Some(error) = self.script.fail_rollback.clone() {
            return Err(error);
        }
        self.in_transaction = false;
        Ok(())
    }

    async fn reset(&mut self) -> Result<(), ProcessorError> {
        self.record("reset");
        if let Some(error) = self.script.fail_reset.clone() {
            return Err(error);
        }
        self.in_transaction = false;
        Ok(())
    }

    fn has_transaction(&self) -> bool { self.in_transaction }
}

/// Accepts any token except those carrying `"reject": true`.
pub struct ScriptedAuthenticator;

impl Authenticator for ScriptedAuthenticator {
    fn authenticate(&mut self, _user_agent: &str, token: &ValueMap) -> Result<(), ProcessorError> {
        if token.get("reject") == Some(&Value::Bool(true)) {
            return Err(ProcessorError::Query {
                code: "Unauthorized".to_owned(),
                message: "credentials rejected".to_owned(),
            });
        }
        Ok(())
    }
}

/// Clock advancing by a fixed step on every read, so timing metadata is
/// deterministic.
pub struct SteppingClock {
    current: AtomicU64,
    step: u64,
}

impl SteppingClock {
    pub fn new(step: u64) -> Self {
        Self {
            current: AtomicU64::new(0),
            step,
        }
    }
}

impl Clock for SteppingClock {
    fn millis(&self) -> u64 { self.current.fetch_add(self.step, Ordering::Relaxed) }
}

/// Context over the fakes, returning the shared sink and processor call log.
pub fn test_context(script: ProcessorScript) -> (MachineContext, RecordingSink, Arc<Mutex<Vec<&'static str>>>) {
    let processor = FakeProcessor::new(script);
    let calls = processor.call_log();
    let sink = RecordingSink::default();
    let ctx = MachineContext::new(
        ConnectionId::new(7),
        Box::new(processor),
        Box::new(sink.clone()),
        Box::new(ScriptedAuthenticator),
        Arc::new(SteppingClock::new(10)),
    );
    (ctx, sink, calls)
}

/// A `Hello` accepted by [`ScriptedAuthenticator`].
pub fn hello() -> graphwire::RequestMessage {
    graphwire::RequestMessage::Hello {
        user_agent: "graphwire-test/1.0".to_owned(),
        auth_token: ValueMap::new(),
    }
}

/// A plain `Run` with no parameters.
pub fn run() -> graphwire::RequestMessage {
    graphwire::RequestMessage::Run {
        statement: "MATCH (n) RETURN n".to_owned(),
        parameters: ValueMap::new(),
        options: TransactionOptions::default(),
    }
}

/// A plain `Begin`.
pub fn begin() -> graphwire::RequestMessage {
    graphwire::RequestMessage::Begin {
        options: TransactionOptions::default(),
    }
}
