use futures::{
    io::AsyncRead,
    stream::{self, Stream},
};

use crate::{Code, CodeChannel, CodeParserBuffer, Error, ParseOptions};

/// Reads codes one after another from an asynchronous byte source.
///
/// Empty lines are skipped. A malformed code is reported and the stream picks up again at
/// the next line, while an I/O or encoding error ends it.
pub struct CodeStream<R>
where
    R: AsyncRead + Unpin,
{
    reader: R,
    buffer: CodeParserBuffer,
    options: ParseOptions,
    channel: CodeChannel,
    done: bool,
}

impl<R> CodeStream<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R, buffer: CodeParserBuffer) -> Self {
        Self {
            reader,
            buffer,
            options: ParseOptions::lenient(),
            channel: CodeChannel::default(),
            done: false,
        }
    }

    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }

    /// Channel assigned to every code read.
    pub fn with_channel(mut self, channel: CodeChannel) -> Self {
        self.channel = channel;
        self
    }

    pub fn buffer(&self) -> &CodeParserBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut CodeParserBuffer {
        &mut self.buffer
    }

    pub fn into_inner(self) -> (R, CodeParserBuffer) {
        (self.reader, self.buffer)
    }

    pub async fn next_code(&mut self) -> Option<Result<Code, Error>> {
        while !self.done {
            let mut code = Code::new(self.channel);
            let parsed =
                Code::parse_async_with(&mut self.reader, &mut code, &mut self.buffer, self.options)
                    .await;
            match parsed {
                Ok(true) => return Some(Ok(code)),
                Ok(false) => self.done = self.buffer.is_at_end(),
                Err(Error::Parse(e)) => {
                    tracing::warn!(error = %e, raw = %e.raw, "skipping malformed code");
                    return Some(Err(e.into()));
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }

    pub async fn next(mut self) -> Option<(Result<Code, Error>, Self)> {
        let res = self.next_code().await?;
        Some((res, self))
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Code, Error>> {
        stream::unfold(self, Self::next)
    }
}

#[cfg(test)]
mod test {
    use core::pin::Pin;
    use core::task::{Context, Poll};
    use std::io;

    use futures::io::{AsyncRead, AsyncReadExt, Cursor};
    use futures::stream::StreamExt;
    use futures_executor::block_on;

    use super::CodeStream;
    use crate::{CodeChannel, CodeParserBuffer, CodeType, Error, ParseOptions};

    fn stream(text: &str) -> CodeStream<Cursor<Vec<u8>>> {
        CodeStream::new(
            Cursor::new(text.as_bytes().to_vec()),
            CodeParserBuffer::new(16, true),
        )
    }

    #[test]
    fn yields_codes_in_order() {
        let codes: Vec<_> = block_on(
            stream("G28\n\n; home first\nG91 G1 X5\n\n\nM400")
                .into_stream()
                .collect(),
        );
        let summary: Vec<_> = codes
            .into_iter()
            .map(|code| {
                let code = code.unwrap();
                (code.code_type, code.major_number, code.line_number)
            })
            .collect();
        assert_eq!(
            summary,
            [
                (CodeType::GCode, Some(28), Some(1)),
                (CodeType::Comment, None, Some(3)),
                (CodeType::GCode, Some(91), Some(4)),
                (CodeType::GCode, Some(1), Some(4)),
                (CodeType::MCode, Some(400), Some(7)),
            ]
        );
    }

    #[test]
    fn by_value_iteration() {
        block_on(async {
            let (first, s) = stream("G1 X1\nG0 Y2").next().await.unwrap();
            assert_eq!(first.unwrap().major_number, Some(1));
            let (second, s) = s.next().await.unwrap();
            assert_eq!(second.unwrap().major_number, Some(0));
            assert!(s.next().await.is_none());
        });
    }

    #[test]
    fn resynchronizes_after_malformed_codes() {
        let mut s = stream("G1 X{1 + 2\nG1 Y1 (oops Y2\nM117 \"fine\"")
            .with_options(ParseOptions::strict())
            .with_channel(CodeChannel::File);
        block_on(async {
            match s.next_code().await {
                Some(Err(Error::Parse(e))) => {
                    assert_eq!(e.message, "Unterminated expression");
                    assert_eq!(e.raw, "G1 X{1 + 2");
                }
                other => panic!("unexpected {other:?}"),
            }
            assert!(matches!(s.next_code().await, Some(Err(Error::Parse(_)))));
            let code = s.next_code().await.unwrap().unwrap();
            assert_eq!(code.channel, CodeChannel::File);
            assert_eq!(code.line_number, Some(3));
            assert_eq!(code.get_string('@').unwrap(), "fine");
            assert!(s.next_code().await.is_none());
        });
        assert!(s.buffer().is_at_end());
    }

    struct Broken;

    impl AsyncRead for Broken {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut [u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")))
        }
    }

    #[test]
    fn io_errors_end_the_stream() {
        let reader = Cursor::new(b"G1 X1\nG1 X".to_vec()).chain(Broken);
        let results: Vec<_> = block_on(
            CodeStream::new(reader, CodeParserBuffer::new(4, false))
                .into_stream()
                .collect(),
        );
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::Io(_))));
    }

    #[test]
    fn unsupported_encodings_end_the_stream() {
        let reader = Cursor::new(b"\xFE\xFF\x00G".to_vec());
        let results: Vec<_> = block_on(
            CodeStream::new(reader, CodeParserBuffer::new(64, true))
                .into_stream()
                .collect(),
        );
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(Error::UnsupportedEncoding("UTF-16"))));
    }
}
