//! Scripted fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use capture_worker::adapters::{
    AudioServer, BusMessage, EngineError, PipelineEngine, PipelineHandle,
};
use capture_worker::core::ControllerTimings;
use capture_worker::domain::{AudioSource, SourceState};

/// Audio server returning a fixed listing
pub struct FakeAudioServer {
    pub sources: Vec<AudioSource>,
}

impl FakeAudioServer {
    pub fn new(sources: Vec<AudioSource>) -> Self {
        Self { sources }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl AudioServer for FakeAudioServer {
    fn name(&self) -> &str {
        "fake"
    }

    async fn list_sources(&self) -> Vec<AudioSource> {
        self.sources.clone()
    }
}

pub fn source(name: &str, state: &str) -> AudioSource {
    AudioSource::new(name, SourceState::parse(state))
}

/// Calls observed on the scripted pipeline
#[derive(Debug, Default, Clone)]
pub struct HandleCalls {
    pub play: usize,
    pub send_eos: usize,
    pub force_stop: usize,
    pub release: usize,
}

/// Pipeline that replays a fixed bus script, then stays silent
pub struct ScriptedPipeline {
    script: VecDeque<BusMessage>,
    eos_on_interrupt: bool,
    calls: Arc<Mutex<HandleCalls>>,
}

#[async_trait]
impl PipelineHandle for ScriptedPipeline {
    async fn play(&mut self) -> Result<(), EngineError> {
        self.calls.lock().unwrap().play += 1;
        Ok(())
    }

    async fn poll_bus(&mut self, timeout: Duration) -> Option<BusMessage> {
        match self.script.pop_front() {
            Some(message) => Some(message),
            None => {
                tokio::time::sleep(timeout).await;
                None
            }
        }
    }

    async fn send_eos(&mut self) -> Result<(), EngineError> {
        self.calls.lock().unwrap().send_eos += 1;
        if self.eos_on_interrupt {
            self.script.push_back(BusMessage::Eos);
        }
        Ok(())
    }

    async fn force_stop(&mut self) -> Result<(), EngineError> {
        self.calls.lock().unwrap().force_stop += 1;
        Ok(())
    }

    async fn release(&mut self) -> Result<(), EngineError> {
        self.calls.lock().unwrap().release += 1;
        Ok(())
    }
}

/// Engine that hands out one scripted pipeline and records what it was asked
pub struct FakeEngine {
    pub has_dsp: bool,
    pub fail_launch: bool,
    pub eos_on_interrupt: bool,
    script: Mutex<Vec<BusMessage>>,
    pub graphs: Arc<Mutex<Vec<String>>>,
    pub calls: Arc<Mutex<HandleCalls>>,
}

impl FakeEngine {
    pub fn new(script: Vec<BusMessage>) -> Self {
        Self {
            has_dsp: false,
            fail_launch: false,
            eos_on_interrupt: false,
            script: Mutex::new(script),
            graphs: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(HandleCalls::default())),
        }
    }

    /// Engine whose pipeline answers a stop with end-of-stream
    pub fn cooperative(script: Vec<BusMessage>) -> Self {
        Self {
            eos_on_interrupt: true,
            ..Self::new(script)
        }
    }

    pub fn calls(&self) -> HandleCalls {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_graph(&self) -> Option<String> {
        self.graphs.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PipelineEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn check_available(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn has_element(&self, _factory: &str) -> bool {
        self.has_dsp
    }

    async fn launch(&self, graph: &str) -> Result<Box<dyn PipelineHandle>, EngineError> {
        self.graphs.lock().unwrap().push(graph.to_string());
        if self.fail_launch {
            return Err(EngineError::Construction("no element \"bogus\"".to_string()));
        }
        let script = std::mem::take(&mut *self.script.lock().unwrap());
        Ok(Box::new(ScriptedPipeline {
            script: script.into(),
            eos_on_interrupt: self.eos_on_interrupt,
            calls: self.calls.clone(),
        }))
    }
}

/// Level message as posted by a metering element
pub fn level_message(element: &str, rms: f64) -> BusMessage {
    BusMessage::Element {
        source: element.to_string(),
        payload: json!({ "name": "level", "fields": { "rms": [rms], "peak": [rms + 3.0] } }),
    }
}

/// Short timings so deadline tests finish quickly
pub fn fast_timings() -> ControllerTimings {
    ControllerTimings {
        bus_poll: Duration::from_millis(5),
        hard_stop: Duration::from_millis(80),
    }
}
