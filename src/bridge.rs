//! Event bridge between a host message pump and the open source.
//!
//! While a source is enabled, every message the host pump pulls must first
//! be offered to the source. The source either claims it (and may report a
//! protocol event such as "transfer ready") or hands it back for normal
//! dispatch.
//!
//! The pump itself is abstracted by [`MessagePump`]; [`run_pump`] drives one
//! until the session signals the scan is over.

use crate::binding::Payload;
use crate::error::TwainResult;
use crate::protocol::{DataArgType, HostMessage, Message, ReturnCode, Triplet};
use crate::session::ScannerSession;
use std::collections::VecDeque;
use std::thread;
use std::time::Duration;
use tracing::{debug, trace};

const PROCESS_EVENT: Triplet = Triplet::control(DataArgType::Event, Message::ProcessEvent);

/// What the application should do after a message went through the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeSignal {
    /// Not a protocol event; dispatch the message normally.
    Unhandled,
    /// Consumed by the source; nothing to do.
    Nothing,
    /// Pages are ready; call [`ScannerSession::drain_transfers`].
    ReadyToTransfer,
    /// The source asked to close; the bridge already closed it.
    CloseRequested,
    /// The source acknowledged closing; stop forwarding messages.
    Closed,
    /// Opaque device event.
    DeviceEvent,
}

impl ScannerSession {
    /// Offer one host message to the open source.
    ///
    /// Returns `Unhandled` without a protocol call when no source is
    /// selected or open, and when the source reports the message is not one
    /// of its events. A failed forward is logged with the source's condition
    /// and the message is treated as consumed.
    pub fn process_message(&mut self, message: &HostMessage) -> TwainResult<BridgeSignal> {
        if self.current.is_none() || !self.state.is_source_open() {
            return Ok(BridgeSignal::Unhandled);
        }

        self.event.refill(message);
        let rc = self.dsm.entry(
            &mut self.app,
            self.active.as_ref(),
            PROCESS_EVENT,
            Payload::Event(&mut self.event),
        );
        trace!(code = ?rc, outcome = ?self.event.outcome, message = message.message, "event forwarded");

        match rc {
            ReturnCode::DsEvent => {}
            ReturnCode::NotDsEvent => return Ok(BridgeSignal::Unhandled),
            other => {
                let err = self.protocol_error("ProcessEvent", other);
                debug!(error = %err, "event dropped by source");
                return Ok(BridgeSignal::Nothing);
            }
        }

        let signal = match self.event.outcome {
            Message::XferReady => BridgeSignal::ReadyToTransfer,
            Message::CloseDsReq => {
                self.close_source()?;
                BridgeSignal::CloseRequested
            }
            Message::CloseDsOk => BridgeSignal::Closed,
            Message::DeviceEvent => BridgeSignal::DeviceEvent,
            _ => BridgeSignal::Nothing,
        };
        if signal != BridgeSignal::Nothing {
            debug!(?signal, "source event");
        }
        Ok(signal)
    }
}

/// Result of offering a message to a pre-dispatch filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOutcome {
    /// Dispatch the message normally.
    NotMine,
    /// Swallow the message.
    Handled,
    /// Swallow the message and act on the signal.
    Signal(BridgeSignal),
}

impl From<BridgeSignal> for FilterOutcome {
    fn from(signal: BridgeSignal) -> Self {
        match signal {
            BridgeSignal::Unhandled => FilterOutcome::NotMine,
            BridgeSignal::Nothing => FilterOutcome::Handled,
            other => FilterOutcome::Signal(other),
        }
    }
}

/// Hook called synchronously for every message a pump pulls, before it is
/// dispatched.
pub trait MessageFilter {
    /// Decide what happens to `message`.
    fn pre_dispatch(&mut self, message: &HostMessage) -> TwainResult<FilterOutcome>;
}

impl MessageFilter for ScannerSession {
    fn pre_dispatch(&mut self, message: &HostMessage) -> TwainResult<FilterOutcome> {
        self.process_message(message).map(FilterOutcome::from)
    }
}

/// Source of host messages.
pub trait MessagePump {
    /// Next message, or `None` when the pump has quit.
    fn next_message(&mut self) -> Option<HostMessage>;

    /// Normal dispatch for a message no filter claimed.
    fn dispatch(&mut self, _message: &HostMessage) {}
}

/// Pump `pump` through `filter` until a signal other than
/// [`BridgeSignal::DeviceEvent`] arrives or the pump runs dry.
///
/// Returns the stopping signal, or `None` if the pump quit first.
pub fn run_pump<P, F>(pump: &mut P, filter: &mut F) -> TwainResult<Option<BridgeSignal>>
where
    P: MessagePump + ?Sized,
    F: MessageFilter + ?Sized,
{
    while let Some(message) = pump.next_message() {
        match filter.pre_dispatch(&message)? {
            FilterOutcome::NotMine => pump.dispatch(&message),
            FilterOutcome::Handled => {}
            FilterOutcome::Signal(BridgeSignal::DeviceEvent) => {}
            FilterOutcome::Signal(signal) => return Ok(Some(signal)),
        }
    }
    Ok(None)
}

/// Pump replaying a fixed message list.
#[derive(Debug, Default)]
pub struct ScriptedPump {
    queue: VecDeque<HostMessage>,
    dispatched: Vec<HostMessage>,
}

impl ScriptedPump {
    /// Pump yielding `messages` in order.
    pub fn new(messages: impl IntoIterator<Item = HostMessage>) -> Self {
        Self {
            queue: messages.into_iter().collect(),
            dispatched: Vec::new(),
        }
    }

    /// Messages that fell through to normal dispatch.
    pub fn dispatched(&self) -> &[HostMessage] {
        &self.dispatched
    }
}

impl MessagePump for ScriptedPump {
    fn next_message(&mut self) -> Option<HostMessage> {
        self.queue.pop_front()
    }

    fn dispatch(&mut self, message: &HostMessage) {
        self.dispatched.push(*message);
    }
}

/// Pump for hosts without a window: yields an idle message every
/// `interval`, up to `limit` times.
#[derive(Debug)]
pub struct IdlePump {
    parent: usize,
    interval: Duration,
    remaining: u32,
    first: bool,
}

impl IdlePump {
    /// Idle messages for window `parent`.
    pub fn new(parent: usize, interval: Duration, limit: u32) -> Self {
        Self {
            parent,
            interval,
            remaining: limit,
            first: true,
        }
    }
}

impl MessagePump for IdlePump {
    fn next_message(&mut self) -> Option<HostMessage> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        if !self.first {
            thread::sleep(self.interval);
        }
        self.first = false;
        Some(HostMessage {
            hwnd: self.parent,
            ..HostMessage::default()
        })
    }
}
