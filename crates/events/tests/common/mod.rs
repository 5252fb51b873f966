#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tandem_core::notification::PushPayload;
use tandem_core::types::DbId;
use tandem_events::transport::{PushTransport, TransportError};
use tandem_events::{Engine, MemoryStore, RetryPolicy};

/// Which transport entry point a push went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Background,
    Alert,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Push {
    pub recipient_id: DbId,
    pub mode: Mode,
    pub payload: PushPayload,
}

/// Records every push instead of sending it.
#[derive(Default)]
pub struct RecordingTransport {
    pushes: Mutex<Vec<Push>>,
}

impl RecordingTransport {
    pub fn pushes(&self) -> Vec<Push> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn alerts(&self) -> Vec<Push> {
        self.pushes()
            .into_iter()
            .filter(|p| p.mode == Mode::Alert)
            .collect()
    }

    pub fn background(&self) -> Vec<Push> {
        self.pushes()
            .into_iter()
            .filter(|p| p.mode == Mode::Background)
            .collect()
    }

    fn record(&self, recipient_id: DbId, mode: Mode, payload: &PushPayload) {
        self.pushes.lock().unwrap().push(Push {
            recipient_id,
            mode,
            payload: payload.clone(),
        });
    }
}

#[async_trait]
impl PushTransport for RecordingTransport {
    async fn sync_in_background(
        &self,
        recipient_id: DbId,
        payload: &PushPayload,
    ) -> Result<(), TransportError> {
        self.record(recipient_id, Mode::Background, payload);
        Ok(())
    }

    async fn present_alert(
        &self,
        recipient_id: DbId,
        payload: &PushPayload,
    ) -> Result<(), TransportError> {
        self.record(recipient_id, Mode::Alert, payload);
        Ok(())
    }
}

pub struct TestEngine {
    pub store: MemoryStore,
    pub transport: Arc<RecordingTransport>,
    pub engine: Engine,
}

/// An engine over a fresh in-memory store with a recording transport.
pub fn test_engine() -> TestEngine {
    let store = MemoryStore::new();
    let transport = Arc::new(RecordingTransport::default());
    let engine = Engine::new(
        Arc::new(store.clone()),
        transport.clone(),
        RetryPolicy::no_retry(),
    );
    TestEngine {
        store,
        transport,
        engine,
    }
}
