use futures::{future::BoxFuture, io::Cursor};

use crate::{Code, CodeChannel, CodeFlags, CodeParserBuffer, CodeStream, CodeType, Error, Message};

/// Codes that skip the queue: emergency stop, cancel wait, diagnostics and reset.
const PRIORITY_MCODES: [i32; 4] = [108, 112, 122, 999];

/// The code has been cancelled before it completed.
#[derive(Debug, PartialEq, Eq, Clone, Copy, thiserror::Error)]
#[error("code has been cancelled")]
pub struct Cancelled;

/// Runs parsed codes on behalf of a [`SimpleCode`].
pub trait CodeExecutor {
    fn execute<'a>(&'a mut self, code: Code) -> BoxFuture<'a, Result<Message, Cancelled>>;
}

/// One or more lines of codes sent as plain text, e.g. from a console.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct SimpleCode {
    pub code: String,
    pub channel: CodeChannel,
}

impl SimpleCode {
    pub fn new(code: impl Into<String>, channel: CodeChannel) -> Self {
        Self {
            code: code.into(),
            channel,
        }
    }

    /// Parses every code of the text, stopping at the first malformed one.
    pub async fn parse(&self) -> Result<Vec<Code>, Error> {
        let reader = Cursor::new(self.code.as_bytes());
        let buffer = CodeParserBuffer::new(self.code.len().max(1), self.code.contains('\n'));
        let mut stream = CodeStream::new(reader, buffer).with_channel(self.channel);

        let mut codes = Vec::new();
        while let Some(code) = stream.next_code().await {
            codes.push(code?);
        }
        Ok(codes)
    }

    /// Parses the text and runs its codes, priority codes first, merging their results.
    ///
    /// A cancelled code contributes nothing and the remaining codes still run.
    pub async fn execute<E: CodeExecutor + ?Sized>(&self, executor: &mut E) -> Message {
        let codes = match self.parse().await {
            Ok(codes) => codes,
            Err(Error::Parse(e)) => {
                return Message::error(format!(
                    "Failed to parse code from line '{}': {}",
                    e.raw, e.message
                ))
            }
            Err(e) => return Message::error(e.to_string()),
        };

        let (priority, regular): (Vec<_>, Vec<_>) = codes.into_iter().partition(|code| {
            code.code_type == CodeType::MCode
                && code
                    .major_number
                    .is_some_and(|major| PRIORITY_MCODES.contains(&major))
        });

        let mut result = Message::default();
        let priority = priority.into_iter().map(|mut code| {
            code.flags |= CodeFlags::IS_PRIORITIZED;
            code
        });
        for code in priority.chain(regular) {
            let short = code.to_short_string();
            match executor.execute(code).await {
                Ok(message) => result.append(&message),
                Err(Cancelled) => {
                    tracing::warn!(code = %short, channel = ?self.channel, "code has been cancelled");
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod test {
    use futures::future::{BoxFuture, FutureExt};
    use futures_executor::block_on;

    use super::{Cancelled, CodeExecutor, SimpleCode};
    use crate::{Code, CodeChannel, CodeFlags, Message, MessageType};

    #[derive(Default)]
    struct Recorder {
        executed: Vec<Code>,
        cancel_on: Option<i32>,
    }

    impl CodeExecutor for Recorder {
        fn execute<'a>(&'a mut self, code: Code) -> BoxFuture<'a, Result<Message, Cancelled>> {
            async move {
                if code.major_number.is_some() && code.major_number == self.cancel_on {
                    return Err(Cancelled);
                }
                let reply = match code.major_number {
                    Some(115) => Message::success("FIRMWARE_NAME: test"),
                    Some(999) => Message::warning("resetting"),
                    _ => Message::default(),
                };
                self.executed.push(code);
                Ok(reply)
            }
            .boxed()
        }
    }

    #[test]
    fn parses_every_line() {
        let simple = SimpleCode::new("G28\nM115\n  G1 X10 G1 Y20\n", CodeChannel::HTTP);
        let codes = block_on(simple.parse()).unwrap();
        assert_eq!(codes.len(), 4);
        assert!(codes.iter().all(|code| code.channel == CodeChannel::HTTP));
        let lines: Vec<_> = codes.iter().map(|code| code.line_number).collect();
        assert_eq!(lines, [Some(1), Some(2), Some(3), Some(3)]);
        assert_eq!(codes[2].indent, 2);
        assert_eq!(codes[3].indent, 2);
        assert_eq!(codes[3].get_int('Y').unwrap(), 20);
    }

    #[test]
    fn priority_codes_run_first() {
        let simple = SimpleCode::new("M115\nM999", CodeChannel::Telnet);
        let mut executor = Recorder::default();
        let result = block_on(simple.execute(&mut executor));

        let order: Vec<_> = executor.executed.iter().map(|c| c.major_number).collect();
        assert_eq!(order, [Some(999), Some(115)]);
        assert!(executor.executed[0].flags.contains(CodeFlags::IS_PRIORITIZED));
        assert!(!executor.executed[1].flags.contains(CodeFlags::IS_PRIORITIZED));
        assert_eq!(result.kind, MessageType::Warning);
        assert_eq!(result.content, "resetting\nFIRMWARE_NAME: test");
    }

    #[test]
    fn parse_errors_are_reported() {
        let simple = SimpleCode::new("M115\nM32 \"unterminated", CodeChannel::HTTP);
        let mut executor = Recorder::default();
        let result = block_on(simple.execute(&mut executor));
        assert!(executor.executed.is_empty());
        assert_eq!(result.kind, MessageType::Error);
        assert_eq!(
            result.content,
            "Failed to parse code from line 'M32 \"unterminated': Unterminated string"
        );
    }

    #[test]
    fn cancelled_codes_are_skipped() {
        let simple = SimpleCode::new("M115\nG4 S1\nM999", CodeChannel::SBC);
        let mut executor = Recorder {
            cancel_on: Some(4),
            ..Recorder::default()
        };
        let result = block_on(simple.execute(&mut executor));
        let order: Vec<_> = executor.executed.iter().map(|c| c.major_number).collect();
        assert_eq!(order, [Some(999), Some(115)]);
        assert_eq!(result, Message::warning("resetting\nFIRMWARE_NAME: test"));
    }

    #[test]
    fn single_lines_have_no_line_number() {
        let codes = block_on(SimpleCode::new("G1 X1 G1 Y2", CodeChannel::HTTP).parse()).unwrap();
        assert_eq!(codes.len(), 2);
        assert!(codes.iter().all(|code| code.line_number.is_none()));
    }
}
