//! Event sources and the multiplexed wait
//!
//! Every input provider (keyboard, child process, windowing backend)
//! exposes a pollable file descriptor; the main loop waits on all of them
//! with a single `poll(2)` and drains one event at a time. Draining is
//! round-robin over the ready sources so a chatty child process cannot
//! starve the keyboard.

use std::io::Read;
use std::os::fd::{BorrowedFd, RawFd};

use log::warn;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::termios::{self, LocalFlags, SetArg, Termios};

/// Modifier keys held during an input event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

/// Special (non-text) keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Tab,
    Backspace,
    Escape,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    F(u8),
}

/// An input or lifecycle event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A special key was pressed
    Key { key: Key, modifiers: Modifiers },
    /// UTF-8 text input
    Text { bytes: Vec<u8>, modifiers: Modifiers },
    /// Output bytes from the child process
    ChildOutput(Vec<u8>),
    /// The display geometry changed
    Resize,
    /// The application should exit
    Quit,
}

/// A pollable provider of events
pub trait EventSource {
    /// File descriptor to include in the poll set
    fn poll_fd(&self) -> RawFd;

    /// Events to poll the descriptor for
    fn poll_flags(&self) -> PollFlags;

    /// Fetch the next pending event, if any
    ///
    /// `revents` is the poll result for this source's descriptor. A source
    /// may be called with empty flags to drain internally queued events.
    fn event_get(&mut self, revents: PollFlags) -> Option<Event>;
}

/// Wait for one event from any source
///
/// `last` is the index of the source that produced the previous event;
/// draining resumes after it so all sources get served. Returns `None` on
/// timeout. A negative `timeout_ms` waits indefinitely.
pub fn wait(
    sources: &mut [&mut dyn EventSource],
    last: Option<usize>,
    timeout_ms: i32,
) -> Option<(usize, Event)> {
    if sources.is_empty() {
        return None;
    }

    let mut fds: Vec<PollFd> = sources
        .iter()
        .map(|s| {
            // The descriptor outlives the poll call; sources keep it open
            // for as long as they exist.
            let fd = unsafe { BorrowedFd::borrow_raw(s.poll_fd()) };
            PollFd::new(fd, s.poll_flags())
        })
        .collect();

    let timeout = if timeout_ms < 0 {
        PollTimeout::NONE
    } else {
        PollTimeout::try_from(timeout_ms).unwrap_or(PollTimeout::MAX)
    };
    let ready = match poll(&mut fds, timeout) {
        Ok(n) => n,
        Err(nix::errno::Errno::EINTR) => 0,
        Err(e) => {
            warn!("poll failed: {}", e);
            return None;
        }
    };
    if ready <= 0 {
        return None;
    }

    let revents: Vec<PollFlags> = fds
        .iter()
        .map(|fd| fd.revents().unwrap_or(PollFlags::empty()))
        .collect();

    // Serve sources round-robin starting after the last one served
    let start = last.map(|i| i + 1).unwrap_or(0);
    for offset in 0..sources.len() {
        let i = (start + offset) % sources.len();
        if revents[i].is_empty() {
            continue;
        }
        if let Some(event) = sources[i].event_get(revents[i]) {
            return Some((i, event));
        }
    }
    None
}

/// Keyboard input from a raw-mode terminal on stdin
///
/// Used when the process runs on a text console. The constructor switches
/// the controlling terminal into raw mode; drop restores it.
pub struct KbdStdin {
    fd: RawFd,
    saved: Option<Termios>,
}

impl KbdStdin {
    pub fn new() -> Self {
        let fd = 0;
        let saved = match termios::tcgetattr(unsafe { BorrowedFd::borrow_raw(fd) }) {
            Ok(saved) => {
                let mut raw = saved.clone();
                termios::cfmakeraw(&mut raw);
                // Keep signal generation so Ctrl-C still interrupts
                raw.local_flags |= LocalFlags::ISIG;
                let stdin = unsafe { BorrowedFd::borrow_raw(fd) };
                if let Err(e) = termios::tcsetattr(stdin, SetArg::TCSANOW, &raw) {
                    warn!("failed to enter raw mode: {}", e);
                }
                Some(saved)
            }
            Err(e) => {
                warn!("stdin is not a terminal: {}", e);
                None
            }
        };
        Self { fd, saved }
    }

    /// Translate an escape sequence to a key, if it is one we know
    fn escape_to_key(seq: &[u8]) -> Option<Key> {
        match seq {
            b"[A" => Some(Key::Up),
            b"[B" => Some(Key::Down),
            b"[C" => Some(Key::Right),
            b"[D" => Some(Key::Left),
            b"[H" => Some(Key::Home),
            b"[F" => Some(Key::End),
            b"[2~" => Some(Key::Insert),
            b"[3~" => Some(Key::Delete),
            b"[5~" => Some(Key::PageUp),
            b"[6~" => Some(Key::PageDown),
            _ => None,
        }
    }
}

impl Default for KbdStdin {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for KbdStdin {
    fn drop(&mut self) {
        if let Some(saved) = &self.saved {
            let stdin = unsafe { BorrowedFd::borrow_raw(self.fd) };
            let _ = termios::tcsetattr(stdin, SetArg::TCSANOW, saved);
        }
    }
}

impl EventSource for KbdStdin {
    fn poll_fd(&self) -> RawFd {
        self.fd
    }

    fn poll_flags(&self) -> PollFlags {
        PollFlags::POLLIN
    }

    fn event_get(&mut self, revents: PollFlags) -> Option<Event> {
        if !revents.contains(PollFlags::POLLIN) {
            if revents.intersects(PollFlags::POLLHUP | PollFlags::POLLERR) {
                return Some(Event::Quit);
            }
            return None;
        }

        let mut buf = [0u8; 1024];
        let n = std::io::stdin().read(&mut buf).ok()?;
        if n == 0 {
            return Some(Event::Quit);
        }
        let bytes = &buf[..n];

        match bytes[0] {
            // Ctrl-D on an empty line ends the session
            0x04 => Some(Event::Quit),
            b'\r' | b'\n' => Some(Event::Key {
                key: Key::Enter,
                modifiers: Modifiers::default(),
            }),
            b'\t' => Some(Event::Key {
                key: Key::Tab,
                modifiers: Modifiers::default(),
            }),
            0x7F | 0x08 => Some(Event::Key {
                key: Key::Backspace,
                modifiers: Modifiers::default(),
            }),
            0x1B if n > 1 => match Self::escape_to_key(&bytes[1..]) {
                Some(key) => Some(Event::Key {
                    key,
                    modifiers: Modifiers::default(),
                }),
                None => None,
            },
            0x1B => Some(Event::Key {
                key: Key::Escape,
                modifiers: Modifiers::default(),
            }),
            _ => Some(Event::Text {
                bytes: bytes.to_vec(),
                modifiers: Modifiers::default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::os::fd::AsRawFd;

    /// Source backed by a pipe; events are queued and matched to reads
    struct PipeSource {
        read: std::os::fd::OwnedFd,
        write: std::os::fd::OwnedFd,
        queue: VecDeque<Event>,
    }

    impl PipeSource {
        fn new() -> Self {
            let (read, write) = nix::unistd::pipe().unwrap();
            Self {
                read,
                write,
                queue: VecDeque::new(),
            }
        }

        fn push(&mut self, event: Event) {
            nix::unistd::write(&self.write, b"x").unwrap();
            self.queue.push_back(event);
        }
    }

    impl EventSource for PipeSource {
        fn poll_fd(&self) -> RawFd {
            self.read.as_raw_fd()
        }

        fn poll_flags(&self) -> PollFlags {
            PollFlags::POLLIN
        }

        fn event_get(&mut self, revents: PollFlags) -> Option<Event> {
            if revents.contains(PollFlags::POLLIN) {
                let mut buf = [0u8; 1];
                nix::unistd::read(self.read.as_raw_fd(), &mut buf).ok()?;
                return self.queue.pop_front();
            }
            None
        }
    }

    #[test]
    fn test_wait_times_out() {
        let mut a = PipeSource::new();
        let mut sources: Vec<&mut dyn EventSource> = vec![&mut a];
        assert_eq!(wait(&mut sources, None, 0), None);
    }

    #[test]
    fn test_wait_delivers_event() {
        let mut a = PipeSource::new();
        a.push(Event::Resize);
        let mut sources: Vec<&mut dyn EventSource> = vec![&mut a];
        let (idx, event) = wait(&mut sources, None, 100).unwrap();
        assert_eq!(idx, 0);
        assert_eq!(event, Event::Resize);
    }

    #[test]
    fn test_wait_round_robins_ready_sources() {
        let mut a = PipeSource::new();
        let mut b = PipeSource::new();
        a.push(Event::Resize);
        a.push(Event::Resize);
        b.push(Event::Quit);

        let mut sources: Vec<&mut dyn EventSource> = vec![&mut a, &mut b];
        let (first, _) = wait(&mut sources, None, 100).unwrap();
        let (second, _) = wait(&mut sources, Some(first), 100).unwrap();
        // With both sources ready the second wait serves the other one
        assert_ne!(first, second);
    }

    #[test]
    fn test_escape_sequences() {
        assert_eq!(KbdStdin::escape_to_key(b"[A"), Some(Key::Up));
        assert_eq!(KbdStdin::escape_to_key(b"[6~"), Some(Key::PageDown));
        assert_eq!(KbdStdin::escape_to_key(b"[Z"), None);
    }
}
