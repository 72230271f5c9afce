//! Scripted speech-to-text provider shared by the stream and session tests.

use crate::generic_types::SttEvent;
use crate::transcription::{SpeechToText, SttError};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Default)]
struct Script {
    failing_opens: usize,
    silent: bool,
    fail_sends: bool,
    opens: usize,
    closes: usize,
    keep_alives: usize,
    sent: Vec<Bytes>,
    events: Option<mpsc::Sender<SttEvent>>,
}

#[derive(Clone, Default)]
pub struct FakeStt {
    script: Arc<Mutex<Script>>,
}

impl FakeStt {
    /// Opens succeed and announce themselves immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// The first `count` opens fail.
    pub fn failing_opens(count: usize) -> Self {
        let fake = Self::default();
        fake.script.lock().unwrap().failing_opens = count;
        fake
    }

    /// Opens succeed but the provider never reports being ready.
    pub fn silent() -> Self {
        let fake = Self::default();
        fake.script.lock().unwrap().silent = true;
        fake
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.script.lock().unwrap().fail_sends = fail;
    }

    /// Delivers `event` on the currently open stream.
    pub async fn emit(&self, event: SttEvent) {
        let events = self.script.lock().unwrap().events.clone();
        events
            .expect("stream is open")
            .send(event)
            .await
            .expect("stream receiver alive");
    }

    pub fn opens(&self) -> usize {
        self.script.lock().unwrap().opens
    }

    pub fn closes(&self) -> usize {
        self.script.lock().unwrap().closes
    }

    pub fn keep_alives(&self) -> usize {
        self.script.lock().unwrap().keep_alives
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.script.lock().unwrap().sent.clone()
    }
}

#[async_trait]
impl SpeechToText for FakeStt {
    async fn open(&mut self) -> Result<mpsc::Receiver<SttEvent>, SttError> {
        let mut script = self.script.lock().unwrap();
        script.opens += 1;
        if script.failing_opens > 0 {
            script.failing_opens -= 1;
            return Err(SttError::Connect("scripted failure".to_string()));
        }
        let (tx, rx) = mpsc::channel(16);
        if !script.silent {
            let _ = tx.try_send(SttEvent::Opened);
        }
        script.events = Some(tx);
        Ok(rx)
    }

    async fn send(&mut self, chunk: Bytes) -> Result<(), SttError> {
        let mut script = self.script.lock().unwrap();
        if script.events.is_none() {
            return Err(SttError::NotConnected);
        }
        if script.fail_sends {
            return Err(SttError::Send("scripted failure".to_string()));
        }
        script.sent.push(chunk);
        Ok(())
    }

    async fn keep_alive(&mut self) -> Result<(), SttError> {
        let mut script = self.script.lock().unwrap();
        if script.events.is_none() {
            return Err(SttError::NotConnected);
        }
        script.keep_alives += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SttError> {
        let mut script = self.script.lock().unwrap();
        script.closes += 1;
        script.events = None;
        Ok(())
    }
}
