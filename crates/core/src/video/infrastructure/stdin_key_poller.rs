use std::io::BufRead;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::video::domain::display_surface::Key;

/// Turns lines typed on stdin into key presses.
///
/// A background thread blocks on stdin and forwards parsed keys over a
/// channel, so polling never blocks longer than its timeout.
pub struct StdinKeyPoller {
    keys: Receiver<Key>,
}

impl StdinKeyPoller {
    pub fn spawn() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        let spawned = std::thread::Builder::new()
            .name("key-poller".into())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    let Ok(line) = line else { break };
                    if let Some(key) = parse_line(&line) {
                        if tx.send(key).is_err() {
                            break;
                        }
                    }
                }
                log::debug!("stdin closed, key polling stopped");
            });
        if let Err(e) = spawned {
            log::warn!("Key polling unavailable: {e}");
        }
        Self { keys: rx }
    }

    pub fn from_receiver(keys: Receiver<Key>) -> Self {
        Self { keys }
    }

    /// Waits at most `timeout` for a key. With no key source left the wait
    /// still lasts `timeout`, keeping the caller's loop period stable.
    pub fn poll(&self, timeout: Duration) -> Option<Key> {
        match self.keys.recv_timeout(timeout) {
            Ok(key) => Some(key),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                std::thread::sleep(timeout);
                None
            }
        }
    }
}

/// `esc`/`escape` or a literal ESC byte map to [`Key::Escape`]; otherwise
/// the first character of the trimmed line is the key.
pub fn parse_line(line: &str) -> Option<Key> {
    let trimmed = line.trim();
    if trimmed.eq_ignore_ascii_case("esc") || trimmed.eq_ignore_ascii_case("escape") {
        return Some(Key::Escape);
    }
    trimmed
        .chars()
        .next()
        .and_then(|c| Key::from_code(c as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Instant;

    #[rstest]
    #[case("q\n", Some(Key::Char('q')))]
    #[case("  ESC ", Some(Key::Escape))]
    #[case("escape", Some(Key::Escape))]
    #[case("\u{1b}", Some(Key::Escape))]
    #[case("hello", Some(Key::Char('h')))]
    #[case("   ", None)]
    fn test_parse_line(#[case] line: &str, #[case] expected: Option<Key>) {
        assert_eq!(parse_line(line), expected);
    }

    #[test]
    fn test_poll_returns_queued_key() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let poller = StdinKeyPoller::from_receiver(rx);
        tx.send(Key::Escape).unwrap();
        assert_eq!(poller.poll(Duration::from_millis(5)), Some(Key::Escape));
        assert_eq!(poller.poll(Duration::from_millis(5)), None);
    }

    #[test]
    fn test_poll_waits_out_timeout_when_disconnected() {
        let (tx, rx) = crossbeam_channel::unbounded::<Key>();
        drop(tx);
        let poller = StdinKeyPoller::from_receiver(rx);

        let start = Instant::now();
        assert_eq!(poller.poll(Duration::from_millis(20)), None);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
