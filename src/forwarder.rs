use log::info;

use crate::producer::Producer;

/// Thin pass-through relay built on a [`Producer`]: start/stop logging around
/// writes a supervisor drives without caring about the underlying broker.
pub struct Forwarder {
    producer: Producer,
}

impl Forwarder {
    pub fn new(producer: Producer) -> Self {
        Forwarder { producer }
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    pub fn runner(self) -> ForwarderRunner {
        ForwarderRunner { handle: self }
    }
}

/// Start/stop handle for a [`Forwarder`], suited to being driven by a
/// supervisor alongside other long-running components.
pub struct ForwarderRunner {
    handle: Forwarder,
}

impl ForwarderRunner {
    pub fn start(&self) {
        info!("forwarder started");
    }

    pub fn stop(&self) {
        info!("forwarder stopping");
        info!("forwarder stopped");
    }

    pub fn forwarder(&self) -> &Forwarder {
        &self.handle
    }
}
