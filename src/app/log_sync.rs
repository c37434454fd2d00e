// FlashBatch - app/log_sync.rs
//
// Rolling log buffer replicated across windows over the event bus.
//
// Sync protocol:
// - A newly opened window broadcasts `log-sync-request`.
// - Any window holding a non-empty buffer answers with `log-sync-data`
//   carrying its full buffer and flashing flag.
// - A receiver discards sync data when its own buffer is non-empty and
//   strictly longer than the incoming one, so a populated window is never
//   clobbered by an emptier peer. Only lengths are compared: after a clear
//   in one window, a stale longer buffer elsewhere still wins.
// - Replicated `log-message` lines are appended only if not already present
//   verbatim, which stops echo loops between windows.

use crate::core::progress::PortProgressEvent;
use crate::platform::bus::{BusMessage, EventBus, Subscription};
use crate::util::constants::READY_BANNER;
use crate::util::time::local_time_of_day;

const LOG_CLEARED: &str = "Log cleared";
const FLASHING_STARTED: &str = "Flashing session started";
const FLASHING_ENDED: &str = "Flashing session ended";

/// One window's copy of the log.
#[derive(Debug)]
pub struct LogBuffer {
    messages: Vec<String>,
    is_flashing: bool,
    max_messages: usize,
    ready_announced: bool,
    subscription: Subscription,
    time_of_day: fn() -> String,
}

impl LogBuffer {
    /// Create the buffer for the primary window. No sync is requested.
    pub fn new(bus: &EventBus, max_messages: usize) -> Self {
        Self {
            messages: Vec::new(),
            is_flashing: false,
            max_messages: max_messages.max(1),
            ready_announced: false,
            subscription: bus.subscribe(),
            time_of_day: local_time_of_day,
        }
    }

    /// Create the buffer for a secondary window and ask peers for their
    /// state. Replies arrive on the next `poll`.
    pub fn open_window(bus: &EventBus, max_messages: usize) -> Self {
        let buffer = Self::new(bus, max_messages);
        tracing::debug!(subscriber = buffer.subscription.id(), "Log window opened; requesting sync");
        buffer.subscription.publish(BusMessage::LogSyncRequest);
        buffer
    }

    /// Replace the timestamp source used for line prefixes.
    pub fn with_time_source(mut self, time_of_day: fn() -> String) -> Self {
        self.time_of_day = time_of_day;
        self
    }

    // -------------------------------------------------------------------------
    // Local writes (broadcast to peers)
    // -------------------------------------------------------------------------

    /// Write the ready banner. Only the first call per buffer does anything,
    /// so re-initialising a refreshed window does not duplicate it.
    pub fn initialize_log(&mut self) {
        if self.ready_announced {
            return;
        }
        self.ready_announced = true;
        self.messages.clear();
        self.add_message(READY_BANNER, false);
    }

    /// Append a timestamped line and broadcast it. Returns the stored line.
    pub fn add_message(&mut self, message: &str, important: bool) -> String {
        let formatted = format!("[{}] {message}", (self.time_of_day)());
        self.push(formatted.clone());
        if important {
            tracing::info!(message = %formatted, "Important log message");
        }
        self.subscription.publish(BusMessage::LogMessage {
            message: formatted.clone(),
            important,
        });
        formatted
    }

    /// Reset the buffer to a single "Log cleared" line and tell peers to clear.
    pub fn clear_logs(&mut self) {
        self.messages = vec![format!("[{}] {LOG_CLEARED}", (self.time_of_day)())];
        self.subscription.publish(BusMessage::LogClear);
    }

    /// Record the start or end of a flashing session and broadcast the flag.
    pub fn set_flashing(&mut self, flashing: bool) {
        self.is_flashing = flashing;
        self.add_message(
            if flashing {
                FLASHING_STARTED
            } else {
                FLASHING_ENDED
            },
            false,
        );
        self.subscription.publish(BusMessage::LogFlashing {
            is_flashing: flashing,
        });
    }

    /// Relay a progress event to the other windows.
    pub fn forward_progress(&self, event: PortProgressEvent) {
        self.subscription.publish(BusMessage::FlashProgress(event));
    }

    // -------------------------------------------------------------------------
    // Remote updates
    // -------------------------------------------------------------------------

    /// Drain and apply everything peers have sent since the last poll.
    ///
    /// Progress events are not log state; they are handed back to the
    /// caller in arrival order.
    pub fn poll(&mut self) -> Vec<PortProgressEvent> {
        let mut progress = Vec::new();
        for message in self.subscription.drain() {
            if let Some(event) = self.handle(message) {
                progress.push(event);
            }
        }
        progress
    }

    /// Apply one bus message. Returns the payload of `flash-progress`.
    pub fn handle(&mut self, message: BusMessage) -> Option<PortProgressEvent> {
        match message {
            BusMessage::FlashProgress(event) => return Some(event),
            BusMessage::LogMessage { message, .. } => {
                if !self.messages.contains(&message) {
                    self.push(message);
                }
            }
            BusMessage::LogClear => self.messages.clear(),
            BusMessage::LogFlashing { is_flashing } => self.is_flashing = is_flashing,
            BusMessage::LogSyncRequest => {
                if !self.messages.is_empty() {
                    self.subscription.publish(BusMessage::LogSyncData {
                        messages: self.messages.clone(),
                        is_flashing: self.is_flashing,
                    });
                }
            }
            BusMessage::LogSyncData {
                messages,
                is_flashing,
            } => self.merge_sync(messages, is_flashing),
        }
        None
    }

    fn merge_sync(&mut self, messages: Vec<String>, is_flashing: bool) {
        if !self.messages.is_empty() && self.messages.len() > messages.len() {
            tracing::debug!(
                local = self.messages.len(),
                incoming = messages.len(),
                "Discarding shorter log sync data"
            );
            return;
        }
        self.messages = messages;
        self.is_flashing = is_flashing;
        self.enforce_cap();
    }

    fn push(&mut self, line: String) {
        self.messages.push(line);
        self.enforce_cap();
    }

    fn enforce_cap(&mut self) {
        if self.messages.len() > self.max_messages {
            let excess = self.messages.len() - self.max_messages;
            self.messages.drain(..excess);
        }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn is_flashing(&self) -> bool {
        self.is_flashing
    }

    pub fn latest_message(&self) -> Option<&str> {
        self.messages.last().map(String::as_str)
    }

    /// Whether any line mentions an error or failure.
    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|m| {
            let lower = m.to_lowercase();
            lower.contains("error") || lower.contains("failed")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_time() -> String {
        "12:00:00".to_string()
    }

    fn buffer(bus: &EventBus) -> LogBuffer {
        LogBuffer::new(bus, 100).with_time_source(fixed_time)
    }

    #[test]
    fn test_banner_written_once() {
        let bus = EventBus::new();
        let mut log = buffer(&bus);
        log.initialize_log();
        log.add_message("connected", false);
        log.initialize_log();
        assert_eq!(
            log.messages(),
            &["[12:00:00] System ready".to_string(), "[12:00:00] connected".to_string()]
        );
    }

    #[test]
    fn test_new_window_adopts_populated_buffer() {
        let bus = EventBus::new();
        let mut main = buffer(&bus);
        main.initialize_log();
        for i in 0..4 {
            main.add_message(&format!("line {i}"), false);
        }
        main.set_flashing(true);

        // Subscribed after the lines were written, so only the sync reply
        // can populate it.
        let mut window = LogBuffer::open_window(&bus, 100).with_time_source(fixed_time);
        main.poll();
        window.poll();
        assert_eq!(window.messages(), main.messages());
        assert!(window.is_flashing());
    }

    #[test]
    fn test_shorter_sync_data_is_discarded() {
        let bus = EventBus::new();
        let mut log = buffer(&bus);
        for i in 0..5 {
            log.add_message(&format!("line {i}"), false);
        }
        log.handle(BusMessage::LogSyncData {
            messages: vec!["a".to_string(), "b".to_string()],
            is_flashing: true,
        });
        assert_eq!(log.messages().len(), 5);
        assert!(!log.is_flashing());
    }

    #[test]
    fn test_empty_buffer_adopts_sync_data() {
        let bus = EventBus::new();
        let mut log = buffer(&bus);
        let incoming: Vec<String> = (0..5).map(|i| format!("line {i}")).collect();
        log.handle(BusMessage::LogSyncData {
            messages: incoming.clone(),
            is_flashing: false,
        });
        assert_eq!(log.messages(), incoming.as_slice());
    }

    #[test]
    fn test_replicated_lines_are_deduplicated() {
        let bus = EventBus::new();
        let mut a = buffer(&bus);
        let mut b = buffer(&bus);
        a.add_message("erase done", false);
        b.poll();
        b.handle(BusMessage::LogMessage {
            message: "[12:00:00] erase done".to_string(),
            important: false,
        });
        assert_eq!(b.messages().len(), 1);
        assert!(a.poll().is_empty());
    }

    #[test]
    fn test_clear_and_flashing_replicate() {
        let bus = EventBus::new();
        let mut a = buffer(&bus);
        let mut b = buffer(&bus);
        a.add_message("one", false);
        a.set_flashing(true);
        b.poll();
        assert!(b.is_flashing());
        assert_eq!(b.messages().len(), 2);

        a.clear_logs();
        b.poll();
        assert_eq!(a.messages(), &["[12:00:00] Log cleared".to_string()]);
        assert!(b.messages().is_empty());
    }

    #[test]
    fn test_cap_drops_oldest() {
        let bus = EventBus::new();
        let mut log = LogBuffer::new(&bus, 3).with_time_source(fixed_time);
        for i in 0..5 {
            log.add_message(&format!("line {i}"), false);
        }
        assert_eq!(log.messages().len(), 3);
        assert_eq!(log.messages()[0], "[12:00:00] line 2");
        assert_eq!(log.latest_message(), Some("[12:00:00] line 4"));
    }

    #[test]
    fn test_has_errors_is_case_insensitive() {
        let bus = EventBus::new();
        let mut log = buffer(&bus);
        log.add_message("write ok", false);
        assert!(!log.has_errors());
        log.add_message("[COM3] Verify: FAILED: crc", true);
        assert!(log.has_errors());
    }

    #[test]
    fn test_progress_is_handed_back() {
        use crate::core::progress::{ProgressEvent, ProgressEventType, ProgressType};
        let bus = EventBus::new();
        let mut log = buffer(&bus);
        let event = PortProgressEvent {
            port_name: "COM3".to_string(),
            event: ProgressEvent {
                id: 1,
                event_type: ProgressEventType::Start,
                step: 0,
                progress_type: ProgressType::Spinner,
                operation: Default::default(),
                current: None,
                total: None,
                status: None,
            },
        };
        bus.publish(BusMessage::FlashProgress(event.clone()));
        assert_eq!(log.poll(), vec![event]);
        assert!(log.messages().is_empty());
    }
}
