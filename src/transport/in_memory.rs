//! In-memory [`FrameSink`] capturing the frames a coordinator sends, for
//! tests that drive the state machine without sockets.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::protocol::Message;
use crate::transport::FrameSink;

#[derive(Clone)]
pub struct InMemorySink {
    inner: Arc<Inner>,
}

struct Inner {
    commands: Mutex<VecDeque<String>>,
    signals: Mutex<VecDeque<String>>,
    connected: AtomicBool,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                commands: Mutex::new(VecDeque::new()),
                signals: Mutex::new(VecDeque::new()),
                connected: AtomicBool::new(true),
            }),
        }
    }

    /// Simulate channel loss: subsequent sends return false.
    pub fn set_connected(&self, connected: bool) {
        self.inner.connected.store(connected, Ordering::SeqCst);
    }

    /// Drain every reliable-channel frame sent so far, oldest first.
    pub fn take_commands(&self) -> Vec<String> {
        self.inner.commands.lock().unwrap().drain(..).collect()
    }

    /// Drain every unreliable-channel frame sent so far, oldest first.
    pub fn take_signals(&self) -> Vec<String> {
        self.inner.signals.lock().unwrap().drain(..).collect()
    }
}

impl Default for InMemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl FrameSink for InMemorySink {
    async fn send_command(&self, msg: &Message) -> bool {
        if !self.inner.connected.load(Ordering::SeqCst) {
            return false;
        }
        self.inner.commands.lock().unwrap().push_back(msg.encode());
        true
    }

    async fn send_signal(&self, msg: &Message) -> bool {
        if !self.inner.connected.load(Ordering::SeqCst) {
            return false;
        }
        self.inner.signals.lock().unwrap().push_back(msg.encode());
        true
    }
}
