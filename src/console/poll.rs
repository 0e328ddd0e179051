//! Readiness-polled console reader for descriptors that support `poll(2)`.
use super::line::LineBuffer;
use super::{ConsoleError, ConsoleInput};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::fs::File;
use std::io::{self, BufReader};
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

/// Console input read directly from a pollable descriptor on the main thread.
///
/// Reads go through our own `BufReader` over a duplicate of the descriptor so
/// a second line that arrived in the same read is still visible to
/// [`ConsoleInput::input_waiting`] after the descriptor has been drained.
pub struct PolledConsole {
    reader: BufReader<File>,
    closed: bool,
}

impl PolledConsole {
    pub fn new(fd: OwnedFd) -> Self {
        Self {
            reader: BufReader::new(File::from(fd)),
            closed: false,
        }
    }

    pub fn stdin() -> Result<Self, ConsoleError> {
        let fd = io::stdin()
            .as_fd()
            .try_clone_to_owned()
            .map_err(|e| ConsoleError::Stdin { source: e })?;
        Ok(Self::new(fd))
    }

    /// Whether `fd` can be readiness-polled at all.
    pub fn probe(fd: BorrowedFd<'_>) -> bool {
        let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::ZERO) {
            Ok(_) => !fds[0]
                .revents()
                .is_some_and(|r| r.contains(PollFlags::POLLNVAL)),
            Err(_) => false,
        }
    }

    fn descriptor_ready(&self) -> bool {
        let mut fds = [PollFd::new(self.reader.get_ref().as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::ZERO) {
            Ok(n) if n > 0 => fds[0].revents().is_some_and(|r| !r.is_empty()),
            Ok(_) | Err(Errno::EINTR) => false,
            Err(e) => {
                tracing::warn!(error = %e, "polling console input failed");
                false
            }
        }
    }
}

impl ConsoleInput for PolledConsole {
    fn name(&self) -> &'static str {
        "poll"
    }

    fn input_waiting(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.reader.buffer().contains(&b'\n') || self.descriptor_ready()
    }

    /// Blocks until the line is complete if only part of it has arrived.
    fn read_line(&mut self, line: &mut LineBuffer) -> Result<bool, ConsoleError> {
        if self.closed {
            return Ok(false);
        }
        let got = line
            .read_from(&mut self.reader)
            .map_err(|e| ConsoleError::Read { source: e })?;
        if !got {
            tracing::info!("console input reached end of stream");
            self.closed = true;
        }
        Ok(got)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::pipe;
    use std::io::Write;

    fn piped() -> (PolledConsole, File) {
        let (read_end, write_end) = pipe().unwrap();
        (PolledConsole::new(read_end), File::from(write_end))
    }

    #[test]
    fn empty_pipe_is_not_waiting() {
        let (mut console, _writer) = piped();
        assert!(!console.input_waiting());
    }

    #[test]
    fn line_is_waiting_until_consumed() {
        let (mut console, mut writer) = piped();
        writer.write_all(b"help\r\n").unwrap();

        assert!(console.input_waiting());
        let mut line = LineBuffer::new();
        assert!(console.read_line(&mut line).unwrap());
        assert_eq!(line.sanitize(), b"help");
        assert!(!console.input_waiting());
    }

    #[test]
    fn buffered_second_line_is_still_reported() {
        let (mut console, mut writer) = piped();
        writer.write_all(b"status\nquit\n").unwrap();

        let mut line = LineBuffer::new();
        assert!(console.input_waiting());
        console.read_line(&mut line).unwrap();
        assert_eq!(line.sanitize(), b"status");

        assert!(console.input_waiting());
        console.read_line(&mut line).unwrap();
        assert_eq!(line.sanitize(), b"quit");
        assert!(!console.input_waiting());
    }

    #[test]
    fn closed_writer_marks_console_closed() {
        let (mut console, writer) = piped();
        drop(writer);

        assert!(console.input_waiting());
        let mut line = LineBuffer::new();
        assert!(!console.read_line(&mut line).unwrap());
        assert!(console.is_closed());
        assert!(!console.input_waiting());
    }

    #[test]
    fn pipes_are_pollable() {
        let (console, _writer) = piped();
        assert!(PolledConsole::probe(console.reader.get_ref().as_fd()));
    }
}
