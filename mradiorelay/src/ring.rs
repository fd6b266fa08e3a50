//! Capped byte buffer used while the relay is down

use bytes::Bytes;
use std::collections::VecDeque;

/// FIFO of chunks whose total size never exceeds `capacity`
///
/// When full, the oldest chunks are dropped first. A single chunk larger
/// than the capacity keeps only its most recent `capacity` bytes.
#[derive(Debug)]
pub struct PendingBuffer {
    chunks: VecDeque<Bytes>,
    size: usize,
    capacity: usize,
    dropped: u64,
}

impl PendingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            chunks: VecDeque::new(),
            size: 0,
            capacity,
            dropped: 0,
        }
    }

    pub fn push(&mut self, mut chunk: Bytes) {
        if self.capacity == 0 {
            self.dropped += chunk.len() as u64;
            return;
        }
        if chunk.len() > self.capacity {
            let excess = chunk.len() - self.capacity;
            self.dropped += excess as u64;
            chunk = chunk.slice(excess..);
        }
        while self.size + chunk.len() > self.capacity {
            match self.chunks.pop_front() {
                Some(old) => {
                    self.size -= old.len();
                    self.dropped += old.len() as u64;
                }
                None => break,
            }
        }
        self.size += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Takes every buffered chunk, oldest first
    pub fn drain(&mut self) -> Vec<Bytes> {
        self.size = 0;
        self.chunks.drain(..).collect()
    }

    /// Puts chunks back at the front, keeping the cap
    pub fn restore(&mut self, chunks: Vec<Bytes>) {
        let newer = std::mem::take(&mut self.chunks);
        self.size = 0;
        for chunk in chunks.into_iter().chain(newer) {
            self.push(chunk);
        }
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.size = 0;
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Total bytes discarded since creation
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(tag: u8, len: usize) -> Bytes {
        Bytes::from(vec![tag; len])
    }

    #[test]
    fn test_oldest_dropped_first() {
        let mut ring = PendingBuffer::new(3 * 1024);
        for tag in 1..=5 {
            ring.push(chunk(tag, 1024));
        }
        assert_eq!(ring.len(), 3 * 1024);
        assert_eq!(ring.dropped(), 2 * 1024);

        let tags: Vec<u8> = ring.drain().iter().map(|c| c[0]).collect();
        assert_eq!(tags, vec![3, 4, 5]);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_oversized_chunk_keeps_tail() {
        let mut ring = PendingBuffer::new(4);
        ring.push(Bytes::from_static(b"abcdefgh"));
        assert_eq!(ring.drain(), vec![Bytes::from_static(b"efgh")]);
    }

    #[test]
    fn test_restore_goes_before_newer_chunks() {
        let mut ring = PendingBuffer::new(10);
        let taken = vec![chunk(1, 3)];
        ring.push(chunk(2, 3));
        ring.restore(taken);
        let tags: Vec<u8> = ring.drain().iter().map(|c| c[0]).collect();
        assert_eq!(tags, vec![1, 2]);
    }
}
