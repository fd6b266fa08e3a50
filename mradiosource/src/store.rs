//! Ordered-list persistence
//!
//! The request queue, the default-playlist registry and the playlist
//! metadata are all plain ordered lists. [`OrderedStore`] is the only
//! interface the station relies on; [`MemoryStore`] keeps the list in memory
//! and [`JsonFileStore`] rewrites a pretty-printed JSON array on every
//! mutation.

use crate::error::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait OrderedStore<T>: Send + Sync {
    fn add(&self, item: T) -> Result<()>;

    fn add_to_front(&self, item: T) -> Result<()>;

    /// Appends every item in one mutation, returns how many were added
    fn add_many(&self, items: Vec<T>) -> Result<usize>;

    /// Inserts every item at the head in one mutation, keeping their order
    fn add_many_to_front(&self, items: Vec<T>) -> Result<usize>;

    /// Removes and returns the item at `position`
    fn remove_at(&self, position: usize) -> Result<T>;

    /// Removes the last item matching `predicate`, if any
    fn remove_last_where(&self, predicate: &dyn Fn(&T) -> bool) -> Result<Option<T>>;

    fn first(&self) -> Option<T>;

    fn pop_front(&self) -> Result<Option<T>>;

    fn get_all(&self) -> Vec<T>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn splice_front<T>(items: &mut Vec<T>, front: Vec<T>) -> usize {
    let count = front.len();
    items.splice(0..0, front);
    count
}

fn take_last_where<T>(items: &mut Vec<T>, predicate: &dyn Fn(&T) -> bool) -> Option<T> {
    let position = items.iter().rposition(predicate)?;
    Some(items.remove(position))
}

fn out_of_range(position: usize, len: usize) -> Error {
    Error::Store(format!(
        "position {} out of range (store holds {} items)",
        position, len
    ))
}

#[derive(Debug)]
pub struct MemoryStore<T> {
    items: Mutex<Vec<T>>,
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self::with_items(Vec::new())
    }

    pub fn with_items(items: Vec<T>) -> Self {
        Self {
            items: Mutex::new(items),
        }
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send> OrderedStore<T> for MemoryStore<T> {
    fn add(&self, item: T) -> Result<()> {
        self.items.lock().unwrap().push(item);
        Ok(())
    }

    fn add_to_front(&self, item: T) -> Result<()> {
        self.items.lock().unwrap().insert(0, item);
        Ok(())
    }

    fn add_many(&self, items: Vec<T>) -> Result<usize> {
        let count = items.len();
        self.items.lock().unwrap().extend(items);
        Ok(count)
    }

    fn add_many_to_front(&self, items: Vec<T>) -> Result<usize> {
        Ok(splice_front(&mut self.items.lock().unwrap(), items))
    }

    fn remove_at(&self, position: usize) -> Result<T> {
        let mut items = self.items.lock().unwrap();
        if position >= items.len() {
            return Err(out_of_range(position, items.len()));
        }
        Ok(items.remove(position))
    }

    fn remove_last_where(&self, predicate: &dyn Fn(&T) -> bool) -> Result<Option<T>> {
        Ok(take_last_where(&mut self.items.lock().unwrap(), predicate))
    }

    fn first(&self) -> Option<T> {
        self.items.lock().unwrap().first().cloned()
    }

    fn pop_front(&self) -> Result<Option<T>> {
        let mut items = self.items.lock().unwrap();
        if items.is_empty() {
            return Ok(None);
        }
        Ok(Some(items.remove(0)))
    }

    fn get_all(&self) -> Vec<T> {
        self.items.lock().unwrap().clone()
    }

    fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }
}

/// Ordered list persisted as a JSON array
///
/// A missing file is an empty list. The whole file is rewritten (through a
/// temporary file and a rename) after each mutation; the in-memory list is
/// only updated once the write succeeded.
#[derive(Debug)]
pub struct JsonFileStore<T> {
    path: PathBuf,
    items: Mutex<Vec<T>>,
}

impl<T: Serialize + DeserializeOwned + Clone + Send> JsonFileStore<T> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let items = match std::fs::read(&path) {
            Ok(data) if data.iter().all(u8::is_ascii_whitespace) => Vec::new(),
            Ok(data) => serde_json::from_slice(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), count = items.len(), "Opened JSON store");
        Ok(Self {
            path,
            items: Mutex::new(items),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, items: &[T]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(items)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Applies `mutate` to a copy of the list, writes it, then commits it
    fn update<R>(&self, mutate: impl FnOnce(&mut Vec<T>) -> Result<R>) -> Result<R> {
        let mut items = self.items.lock().unwrap();
        let mut next = items.clone();
        let result = mutate(&mut next)?;
        self.persist(&next)?;
        *items = next;
        Ok(result)
    }
}

impl<T: Serialize + DeserializeOwned + Clone + Send> OrderedStore<T> for JsonFileStore<T> {
    fn add(&self, item: T) -> Result<()> {
        self.update(|items| {
            items.push(item);
            Ok(())
        })
    }

    fn add_to_front(&self, item: T) -> Result<()> {
        self.update(|items| {
            items.insert(0, item);
            Ok(())
        })
    }

    fn add_many(&self, new_items: Vec<T>) -> Result<usize> {
        self.update(|items| {
            let count = new_items.len();
            items.extend(new_items);
            Ok(count)
        })
    }

    fn add_many_to_front(&self, new_items: Vec<T>) -> Result<usize> {
        self.update(|items| Ok(splice_front(items, new_items)))
    }

    fn remove_at(&self, position: usize) -> Result<T> {
        self.update(|items| {
            if position >= items.len() {
                return Err(out_of_range(position, items.len()));
            }
            Ok(items.remove(position))
        })
    }

    /// The file is only rewritten when an item was removed
    fn remove_last_where(&self, predicate: &dyn Fn(&T) -> bool) -> Result<Option<T>> {
        if !self.items.lock().unwrap().iter().any(predicate) {
            return Ok(None);
        }
        self.update(|items| Ok(take_last_where(items, predicate)))
    }

    fn first(&self) -> Option<T> {
        self.items.lock().unwrap().first().cloned()
    }

    fn pop_front(&self) -> Result<Option<T>> {
        if self.is_empty() {
            return Ok(None);
        }
        self.update(|items| Ok((!items.is_empty()).then(|| items.remove(0))))
    }

    fn get_all(&self) -> Vec<T> {
        self.items.lock().unwrap().clone()
    }

    fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }
}
