//! In-memory playback queue (the lookahead buffer)
//!
//! The head is the current (or next-up) track. Every mutation publishes the
//! new length on a `watch` channel so that the playback side can wait for
//! the queue to become non-empty without polling.

use crate::track::Track;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug)]
pub struct PlaybackQueue {
    tracks: Mutex<VecDeque<Track>>,
    len_tx: watch::Sender<usize>,
}

impl Default for PlaybackQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackQueue {
    pub fn new() -> Self {
        let (len_tx, _) = watch::channel(0);
        Self {
            tracks: Mutex::new(VecDeque::new()),
            len_tx,
        }
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut VecDeque<Track>) -> R) -> R {
        let mut tracks = self.tracks.lock().unwrap();
        let result = f(&mut tracks);
        self.len_tx.send_replace(tracks.len());
        result
    }

    pub fn len(&self) -> usize {
        self.tracks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn head(&self) -> Option<Track> {
        self.tracks.lock().unwrap().front().cloned()
    }

    pub fn get(&self, position: usize) -> Option<Track> {
        self.tracks.lock().unwrap().get(position).cloned()
    }

    pub fn snapshot(&self) -> Vec<Track> {
        self.tracks.lock().unwrap().iter().cloned().collect()
    }

    /// Queue without its head
    pub fn upcoming(&self) -> Vec<Track> {
        self.tracks.lock().unwrap().iter().skip(1).cloned().collect()
    }

    pub fn push_back(&self, track: Track) {
        self.mutate(|q| q.push_back(track));
    }

    pub fn push_front(&self, track: Track) {
        self.mutate(|q| q.push_front(track));
    }

    /// Inserts right after the current track (at the head if the queue is empty)
    pub fn insert_after_current(&self, track: Track) {
        self.mutate(|q| {
            let position = q.len().min(1);
            q.insert(position, track);
        });
    }

    /// Puts the previously played `track` back at the head
    ///
    /// If the same title already waits right behind the head (a second
    /// `previous` in a row), the two swap places instead of duplicating it.
    pub fn restore_previous(&self, track: Track) {
        self.mutate(|q| {
            if q.get(1).is_some_and(|next| next.title == track.title) {
                q.remove(1);
            }
            q.push_front(track);
        });
    }

    pub fn pop_front(&self) -> Option<Track> {
        self.mutate(|q| q.pop_front())
    }

    pub fn remove_at(&self, position: usize) -> Option<Track> {
        self.mutate(|q| q.remove(position))
    }

    /// Receives the queue length after each mutation
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.len_tx.subscribe()
    }

    /// Waits until the queue holds at least one track
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn wait_non_empty(&self, timeout: Duration) -> bool {
        let mut rx = self.subscribe();
        let waited = tokio::time::timeout(timeout, rx.wait_for(|len| *len > 0)).await;
        matches!(waited, Ok(Ok(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::SourceType;
    use std::sync::Arc;

    fn track(title: &str) -> Track {
        Track {
            title: title.to_string(),
            media_location: format!("/tmp/{}.mp3", title),
            source_type: SourceType::Local,
            duration_seconds: 60.0,
            requested_by: "test".to_string(),
            bitrate: 128_000,
        }
    }

    fn titles(queue: &PlaybackQueue) -> Vec<String> {
        queue.snapshot().into_iter().map(|t| t.title).collect()
    }

    #[test]
    fn test_restore_previous_swaps_instead_of_growing() {
        let queue = PlaybackQueue::new();
        queue.push_back(track("b"));

        queue.restore_previous(track("a"));
        assert_eq!(titles(&queue), vec!["a", "b"]);

        queue.restore_previous(track("b"));
        assert_eq!(titles(&queue), vec!["b", "a"]);

        queue.restore_previous(track("a"));
        assert_eq!(titles(&queue), vec!["a", "b"]);
    }

    #[test]
    fn test_insert_after_current() {
        let queue = PlaybackQueue::new();
        queue.insert_after_current(track("a"));
        queue.push_back(track("b"));
        queue.insert_after_current(track("top"));
        assert_eq!(titles(&queue), vec!["a", "top", "b"]);
        assert_eq!(queue.upcoming().len(), 2);
    }

    #[test]
    fn test_remove_and_pop() {
        let queue = PlaybackQueue::new();
        queue.push_back(track("a"));
        queue.push_back(track("b"));
        queue.push_front(track("z"));

        assert_eq!(queue.remove_at(1).unwrap().title, "a");
        assert!(queue.remove_at(9).is_none());
        assert_eq!(queue.pop_front().unwrap().title, "z");
        assert_eq!(*queue.subscribe().borrow(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_non_empty_times_out() {
        let queue = PlaybackQueue::new();
        assert!(!queue.wait_non_empty(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_wait_non_empty_wakes_on_push() {
        let queue = Arc::new(PlaybackQueue::new());
        let producer = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.push_back(track("late"));
        });
        assert!(queue.wait_non_empty(Duration::from_secs(5)).await);
        assert_eq!(queue.len(), 1);
    }
}
