use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::encoding::TextEncoding;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Direction {
    /// Written by the CPU to the device.
    FromCpu,
    /// Read by the CPU from the device.
    ToCpu,
    /// Operator-facing message such as a reported condition.
    Notice,
}

#[derive(Debug, Clone)]
pub struct TrafficEntry {
    pub timestamp: u64,
    pub direction: Direction,
    pub data: Vec<u8>,
}

/// Bounded record of what went across the console's ports.
pub struct TrafficLog {
    entries: VecDeque<TrafficEntry>,
    max_entries: usize,
}

impl TrafficLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries,
        }
    }

    pub fn push(&mut self, direction: Direction, data: Vec<u8>) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        self.entries.push_back(TrafficEntry {
            timestamp,
            direction,
            data,
        });
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    pub fn notice(&mut self, message: impl Into<String>) {
        self.push(Direction::Notice, message.into().into_bytes());
    }

    pub fn entries(&self) -> impl Iterator<Item = &TrafficEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// One line per entry. Port traffic is shown as hex or decoded text;
    /// notices are always shown as text.
    pub fn to_text(&self, show_hex: bool, encoding: TextEncoding) -> String {
        let mut result = String::new();
        for entry in &self.entries {
            let prefix = match entry.direction {
                Direction::FromCpu => "OUT: ",
                Direction::ToCpu => "IN:  ",
                Direction::Notice => "---  ",
            };
            result.push_str(&format_time(entry.timestamp));
            result.push_str(prefix);

            if show_hex && entry.direction != Direction::Notice {
                let hex: Vec<String> = entry.data.iter().map(|b| format!("{b:02X}")).collect();
                result.push_str(&hex.join(" "));
            } else {
                result.push_str(encoding.decode(&entry.data).trim_end_matches(['\r', '\n']));
            }
            result.push('\n');
        }
        result
    }
}

fn format_time(timestamp: u64) -> String {
    let secs = timestamp / 1000;
    format!(
        "[{:02}:{:02}:{:02}.{:03}] ",
        (secs / 3600) % 24,
        (secs / 60) % 60,
        secs % 60,
        timestamp % 1000
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip_time(line: &str) -> &str {
        &line[line.find("] ").map(|i| i + 2).unwrap_or(0)..]
    }

    #[test]
    fn drops_oldest_past_capacity() {
        let mut log = TrafficLog::new(2);
        log.push(Direction::FromCpu, vec![1]);
        log.push(Direction::FromCpu, vec![2]);
        log.push(Direction::ToCpu, vec![3]);

        let kept: Vec<u8> = log.entries().map(|e| e.data[0]).collect();
        assert_eq!(kept, vec![2, 3]);
    }

    #[test]
    fn renders_hex_and_text() {
        let mut log = TrafficLog::new(10);
        log.push(Direction::FromCpu, b"AB".to_vec());
        log.notice("serial port COM2 is not opened");

        let hex = log.to_text(true, TextEncoding::Ascii);
        let lines: Vec<&str> = hex.lines().map(strip_time).collect();
        assert_eq!(lines, vec!["OUT: 41 42", "---  serial port COM2 is not opened"]);

        let text = log.to_text(false, TextEncoding::Ascii);
        assert_eq!(strip_time(text.lines().next().unwrap()), "OUT: AB");
    }

    #[test]
    fn clear_empties_the_log() {
        let mut log = TrafficLog::new(4);
        log.notice("x");
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.to_text(true, TextEncoding::Auto), "");
    }
}
