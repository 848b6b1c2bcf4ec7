//! Typed forms of the fixed-layout records exchanged through dispatch.

use super::Message;

/// Status record filled by a status query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Status {
    /// Raw condition code.
    pub condition_code: u16,
}

/// Arguments of enable/disable source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserInterface {
    /// Show the source's own user interface.
    pub show_ui: bool,
    /// Run that interface modally.
    pub modal_ui: bool,
    /// Host parent window handle.
    pub parent: usize,
}

/// One host message, as intercepted from the message pump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostMessage {
    /// Target window.
    pub hwnd: usize,
    /// Message id.
    pub message: u32,
    /// First message parameter.
    pub wparam: usize,
    /// Second message parameter.
    pub lparam: isize,
}

/// The event record handed to a source for event processing.
///
/// One instance lives for the whole session and is refilled for every
/// intercepted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    /// Message offered to the source.
    pub message: HostMessage,
    /// Sub-message written back by the source.
    pub outcome: Message,
}

impl Default for EventRecord {
    fn default() -> Self {
        Self {
            message: HostMessage::default(),
            outcome: Message::Null,
        }
    }
}

impl EventRecord {
    /// Load a new host message and clear the previous outcome.
    pub fn refill(&mut self, message: &HostMessage) {
        self.message = *message;
        self.outcome = Message::Null;
    }
}

/// Pending transfer count reported after each transfer unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingXfers {
    /// Remaining units; `0xffff` means an unknown number of pages.
    pub count: u16,
}

/// Metadata describing the image about to be transferred.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImageInfo {
    /// Horizontal resolution in dots per inch.
    pub x_resolution: f32,
    /// Vertical resolution in dots per inch.
    pub y_resolution: f32,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels; -1 when unknown before transfer.
    pub length: i32,
    /// Samples per pixel.
    pub samples_per_pixel: i16,
    /// Bits of each sample.
    pub bits_per_sample: [i16; 8],
    /// Bits per pixel.
    pub bits_per_pixel: i16,
    /// Samples stored in separate planes.
    pub planar: bool,
    /// Color model code.
    pub pixel_type: i16,
    /// Compression code.
    pub compression: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_record_refill_clears_outcome() {
        let mut record = EventRecord {
            outcome: Message::XferReady,
            ..EventRecord::default()
        };
        let msg = HostMessage {
            hwnd: 0x10,
            message: 0x0200,
            wparam: 1,
            lparam: -1,
        };
        record.refill(&msg);
        assert_eq!(record.message, msg);
        assert_eq!(record.outcome, Message::Null);
    }
}
