mod classify;

pub use classify::{classify, keyword_color, LogColor, StyledLine, Verbosity, GAME_TAG_PREFIX};

/// Output channels of the spawned game process. System is the
/// launcher's own side channel; it bypasses classification entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Stdout,
    Stderr,
    System,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Stdout, Channel::Stderr, Channel::System];

    fn index(self) -> usize {
        match self {
            Channel::Stdout => 0,
            Channel::Stderr => 1,
            Channel::System => 2,
        }
    }
}

/// Fixed-size per-channel storage; the channel set is closed.
#[derive(Debug, Default)]
pub struct ChannelMap<T> {
    slots: [T; 3],
}

impl<T> ChannelMap<T> {
    pub fn get(&self, channel: Channel) -> &T {
        &self.slots[channel.index()]
    }

    pub fn get_mut(&mut self, channel: Channel) -> &mut T {
        &mut self.slots[channel.index()]
    }
}

/// Where classified lines go. The router never writes to a terminal or
/// file itself.
pub trait LogSink {
    fn write_line(&mut self, channel: Channel, color: LogColor, text: &str);
}

/// Per-launch line reassembly and classification state. Chunks arrive
/// unbounded and non-line-aligned; each channel keeps its partial line
/// buffered until the next newline or the final flush.
#[derive(Debug)]
pub struct LogRouter {
    verbosity: Verbosity,
    buffers: ChannelMap<String>,
}

impl LogRouter {
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            buffers: ChannelMap::default(),
        }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Appends a chunk and drains every complete line it produced.
    pub fn feed(&mut self, channel: Channel, chunk: &str, sink: &mut dyn LogSink) {
        self.buffers.get_mut(channel).push_str(chunk);
        loop {
            let line = {
                let buffer = self.buffers.get_mut(channel);
                match buffer.find('\n') {
                    Some(newline) => {
                        let line = buffer[..newline].trim().to_string();
                        buffer.drain(..=newline);
                        line
                    }
                    None => break,
                }
            };
            self.emit(channel, &line, sink);
        }
    }

    /// Called once on process termination: any unterminated fragment is
    /// treated as a final line, then all buffers are cleared.
    pub fn flush(&mut self, sink: &mut dyn LogSink) {
        for channel in Channel::ALL {
            let remainder = std::mem::take(self.buffers.get_mut(channel));
            let line = remainder.trim();
            if !line.is_empty() {
                self.emit(channel, line, sink);
            }
        }
    }

    fn emit(&self, channel: Channel, line: &str, sink: &mut dyn LogSink) {
        if channel == Channel::System {
            sink.write_line(channel, LogColor::Default, line);
            return;
        }
        let Some(styled) = classify(self.verbosity, line) else {
            return;
        };
        if styled.text.is_empty() {
            return;
        }
        sink.write_line(channel, styled.color, &styled.text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        lines: Vec<(Channel, LogColor, String)>,
    }

    impl LogSink for RecordingSink {
        fn write_line(&mut self, channel: Channel, color: LogColor, text: &str) {
            self.lines.push((channel, color, text.to_string()));
        }
    }

    fn game_line(body: &str) -> String {
        format!("[Python] [2024-01-01 00:00:00,000] {body}\n")
    }

    #[test]
    fn chunks_reassemble_into_exactly_n_lines_plus_flush() {
        let mut router = LogRouter::new(Verbosity::Verbose);
        let mut sink = RecordingSink::default();

        // Three newline-terminated lines plus one trailing fragment,
        // split at awkward boundaries.
        router.feed(Channel::Stdout, "first li", &mut sink);
        router.feed(Channel::Stdout, "ne\nsecond line\nthi", &mut sink);
        router.feed(Channel::Stdout, "rd line\ntail frag", &mut sink);
        assert_eq!(sink.lines.len(), 3);
        assert_eq!(sink.lines[0].2, "first line");
        assert_eq!(sink.lines[2].2, "third line");

        router.flush(&mut sink);
        assert_eq!(sink.lines.len(), 4);
        assert_eq!(sink.lines[3].2, "tail frag");

        // A second flush finds nothing.
        router.flush(&mut sink);
        assert_eq!(sink.lines.len(), 4);
    }

    #[test]
    fn flush_without_fragment_emits_nothing() {
        let mut router = LogRouter::new(Verbosity::Verbose);
        let mut sink = RecordingSink::default();
        router.feed(Channel::Stdout, "complete\n", &mut sink);
        router.flush(&mut sink);
        assert_eq!(sink.lines.len(), 1);
    }

    #[test]
    fn one_chunk_may_complete_many_lines() {
        let mut router = LogRouter::new(Verbosity::Verbose);
        let mut sink = RecordingSink::default();
        router.feed(Channel::Stderr, "a\nb\nc\nd\n", &mut sink);
        assert_eq!(sink.lines.len(), 4);
    }

    #[test]
    fn channels_buffer_independently() {
        let mut router = LogRouter::new(Verbosity::Verbose);
        let mut sink = RecordingSink::default();
        router.feed(Channel::Stdout, "out partial", &mut sink);
        router.feed(Channel::Stderr, "err full\n", &mut sink);
        assert_eq!(sink.lines.len(), 1);
        assert_eq!(sink.lines[0].0, Channel::Stderr);

        router.feed(Channel::Stdout, " now done\n", &mut sink);
        assert_eq!(sink.lines.len(), 2);
        assert_eq!(sink.lines[1].2, "out partial now done");
    }

    #[test]
    fn flush_applies_classification_to_the_fragment() {
        let mut router = LogRouter::new(Verbosity::Normal);
        let mut sink = RecordingSink::default();
        // Fragment is engine noise; it must stay suppressed at flush.
        router.feed(
            Channel::Stdout,
            "[Python] [2024-01-01 00:00:00,000] [INFO] [Engine] tick",
            &mut sink,
        );
        router.flush(&mut sink);
        assert!(sink.lines.is_empty());
    }

    #[test]
    fn normal_mode_filters_monitored_channels() {
        let mut router = LogRouter::new(Verbosity::Normal);
        let mut sink = RecordingSink::default();
        router.feed(Channel::Stdout, "raw engine chatter\n", &mut sink);
        router.feed(Channel::Stdout, &game_line("[INFO] [Gameplay] hi"), &mut sink);
        assert_eq!(sink.lines.len(), 1);
        assert_eq!(sink.lines[0].2, "[2024-01-01 00:00:00,000] [INFO] [Gameplay] hi");
    }

    #[test]
    fn system_channel_bypasses_classification_and_color() {
        let mut router = LogRouter::new(Verbosity::Normal);
        let mut sink = RecordingSink::default();
        // Raw text that Normal mode would suppress on stdout.
        router.feed(Channel::System, "process started pid=9\n", &mut sink);
        assert_eq!(
            sink.lines,
            vec![(
                Channel::System,
                LogColor::Default,
                "process started pid=9".to_string()
            )]
        );
    }
}
