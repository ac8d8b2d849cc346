/*
 *  sequencer.rs
 *
 *  Vitrine - pictures while you're looking
 *  (c) 2024-26 the Vitrine authors
 *
 *  Rotating image sequence over a backing folder, sequential or shuffled
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use log::{debug, error, info, warn};
use rand::seq::SliceRandom;
use std::fs;
use std::path::{Path, PathBuf};

pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Stable lexicographic order over paths.
    Sequential,
    /// Pseudo-random permutation, re-randomized on every reload.
    Shuffled,
}

/// Produces the next image from a rotating collection with wraparound.
///
/// The collection is rebuilt from the backing folder by [`reload`], and the
/// cursor always satisfies `index < len` while the collection is non-empty.
///
/// [`reload`]: ImageSequencer::reload
pub struct ImageSequencer {
    folder: PathBuf,
    order: Order,
    images: Vec<PathBuf>,
    index: usize,
}

impl ImageSequencer {
    /// Create a sequencer and perform the initial scan.
    pub fn new(folder: impl Into<PathBuf>, order: Order) -> Self {
        let mut sequencer = Self {
            folder: folder.into(),
            order,
            images: Vec::new(),
            index: 0,
        };
        sequencer.reload();
        sequencer
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn order(&self) -> Order {
        self.order
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Cursor position, for "image i/n" status lines.
    pub fn position(&self) -> usize {
        self.index
    }

    /// Rescan the backing folder and rebuild the sequence.
    ///
    /// A missing folder is created (so operators can drop images in later);
    /// any filesystem trouble yields an empty sequence, never a failure.
    pub fn reload(&mut self) {
        let previous = self.images.len();
        self.images.clear();

        if !self.folder.exists() {
            warn!("image folder does not exist: {}", self.folder.display());
            if let Err(e) = fs::create_dir_all(&self.folder) {
                warn!("could not create image folder: {e}");
            }
            self.index = 0;
            return;
        }

        match fs::read_dir(&self.folder) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.is_file() && is_supported(&path) {
                        self.images.push(path);
                    }
                }
            }
            Err(e) => {
                error!("could not scan {}: {e}", self.folder.display());
                self.index = 0;
                return;
            }
        }

        match self.order {
            Order::Sequential => self.images.sort(),
            Order::Shuffled => self.images.shuffle(&mut rand::rng()),
        }

        // keep the cursor inside the (possibly smaller) new sequence
        if self.images.is_empty() {
            self.index = 0;
        } else {
            self.index %= self.images.len();
        }

        info!("images reloaded: {} -> {}", previous, self.images.len());
    }

    /// The image under the cursor, advancing with wraparound. `None` while
    /// the sequence is empty.
    pub fn next(&mut self) -> Option<PathBuf> {
        if self.images.is_empty() {
            debug!("no images available");
            return None;
        }
        let path = self.images[self.index].clone();
        self.index = (self.index + 1) % self.images.len();
        Some(path)
    }

    /// Step back one image (the one before the currently shown one).
    pub fn previous(&mut self) -> Option<PathBuf> {
        if self.images.is_empty() {
            return None;
        }
        let len = self.images.len();
        self.index = (self.index + len.saturating_sub(2)) % len;
        self.next()
    }

    /// Change ordering; an actual change re-sorts or re-shuffles immediately.
    pub fn set_order(&mut self, order: Order) {
        if self.order != order {
            self.order = order;
            self.reload();
        }
    }
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.iter().any(|s| *s == ext)
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn sequential_drain_visits_every_image_once_in_sorted_order() {
        let dir = tempdir().unwrap();
        for name in ["c.jpg", "a.png", "b.GIF"] {
            touch(dir.path(), name);
        }
        let mut seq = ImageSequencer::new(dir.path(), Order::Sequential);
        assert_eq!(seq.len(), 3);

        let drained: Vec<_> = (0..3).filter_map(|_| seq.next()).collect();
        let names: Vec<_> = drained
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["a.png", "b.GIF", "c.jpg"]);

        // wraparound: fourth pull is the first image again
        assert_eq!(seq.next().unwrap(), drained[0]);
    }

    #[test]
    fn shuffled_drain_is_the_same_set() {
        let dir = tempdir().unwrap();
        for i in 0..8 {
            touch(dir.path(), &format!("img{i}.jpg"));
        }
        let mut seq = ImageSequencer::new(dir.path(), Order::Shuffled);
        assert_eq!(seq.len(), 8);

        let drained: BTreeSet<_> = (0..8).filter_map(|_| seq.next()).collect();
        let expected: BTreeSet<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(drained, expected);
    }

    #[test]
    fn empty_sequence_yields_none_repeatedly() {
        let dir = tempdir().unwrap();
        let mut seq = ImageSequencer::new(dir.path(), Order::Sequential);
        assert!(seq.is_empty());
        for _ in 0..5 {
            assert_eq!(seq.next(), None);
        }
        assert_eq!(seq.previous(), None);
    }

    #[test]
    fn missing_folder_is_created_and_yields_empty() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("not/yet/here");
        let mut seq = ImageSequencer::new(&nested, Order::Sequential);
        assert!(seq.is_empty());
        assert_eq!(seq.next(), None);
        assert!(nested.exists());

        // a later reload picks up dropped-in images
        touch(&nested, "late.jpg");
        seq.reload();
        assert_eq!(seq.len(), 1);
        assert!(seq.next().is_some());
    }

    #[test]
    fn unsupported_files_are_ignored() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "readme.txt");
        touch(dir.path(), "movie.mp4");
        touch(dir.path(), "photo.jpeg");
        touch(dir.path(), "noext");
        let seq = ImageSequencer::new(dir.path(), Order::Sequential);
        assert_eq!(seq.len(), 1);
    }

    #[test]
    fn reload_clamps_the_cursor() {
        let dir = tempdir().unwrap();
        for i in 0..5 {
            touch(dir.path(), &format!("img{i}.jpg"));
        }
        let mut seq = ImageSequencer::new(dir.path(), Order::Sequential);
        for _ in 0..4 {
            seq.next();
        }
        assert_eq!(seq.position(), 4);

        for i in 2..5 {
            fs::remove_file(dir.path().join(format!("img{i}.jpg"))).unwrap();
        }
        seq.reload();
        assert_eq!(seq.len(), 2);
        assert!(seq.position() < 2);
        assert!(seq.next().is_some());
    }

    #[test]
    fn previous_steps_back_one_image() {
        let dir = tempdir().unwrap();
        for name in ["a.jpg", "b.jpg", "c.jpg"] {
            touch(dir.path(), name);
        }
        let mut seq = ImageSequencer::new(dir.path(), Order::Sequential);
        let a = seq.next().unwrap();
        let b = seq.next().unwrap();
        assert_ne!(a, b);

        // after showing b, previous re-shows a
        assert_eq!(seq.previous().unwrap(), a);
    }

    #[test]
    fn set_order_reshuffles_only_on_change() {
        let dir = tempdir().unwrap();
        for i in 0..4 {
            touch(dir.path(), &format!("img{i}.jpg"));
        }
        let mut seq = ImageSequencer::new(dir.path(), Order::Sequential);
        seq.next();
        let pos = seq.position();

        // same order: no implicit reload, cursor untouched
        seq.set_order(Order::Sequential);
        assert_eq!(seq.position(), pos);

        // real change: collection rebuilt with the same contents
        seq.set_order(Order::Shuffled);
        assert_eq!(seq.len(), 4);
    }
}
