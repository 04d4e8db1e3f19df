//! Word candidates offered to the drawer at the start of each round.
//!
//! A [`WordSource`] plays the role of the persistent word table. Whenever the
//! source fails or comes up short the provider draws from [`FALLBACK_WORDS`]
//! so a round can always start.

use log::warn;
use rand::seq::SliceRandom;
use std::path::Path;
use thiserror::Error;

pub const FALLBACK_WORDS: [&str; 25] = [
    "cat", "house", "pizza", "running", "sun", "dog", "car", "cake", "jumping", "moon",
    "elephant", "tree", "burger", "dancing", "star", "fish", "phone", "apple", "reading",
    "cloud", "bird", "chair", "ice cream", "swimming", "rain",
];

const ANIMALS: &[&str] = &[
    "cat", "dog", "elephant", "giraffe", "lion", "tiger", "bear", "rabbit", "horse", "cow",
    "pig", "sheep", "chicken", "duck", "fish", "shark", "whale", "dolphin", "octopus",
    "butterfly", "bee", "spider", "snake", "frog", "turtle", "penguin", "owl", "eagle",
    "parrot", "flamingo",
];

const OBJECTS: &[&str] = &[
    "car", "house", "tree", "flower", "book", "phone", "computer", "chair", "table", "lamp",
    "clock", "key", "door", "window", "mirror", "camera", "guitar", "piano", "bicycle",
    "airplane", "boat", "train", "bus", "umbrella", "hat", "shoes", "glasses", "watch", "ring",
    "necklace",
];

const FOOD: &[&str] = &[
    "pizza", "burger", "cake", "ice cream", "apple", "banana", "orange", "strawberry",
    "grape", "watermelon", "bread", "cheese", "milk", "coffee", "tea", "water", "juice",
    "sandwich", "pasta", "rice", "egg", "salad", "soup", "cookie", "chocolate", "candy",
    "donut", "pancake",
];

const ACTIONS: &[&str] = &[
    "running", "jumping", "dancing", "singing", "reading", "writing", "drawing", "painting",
    "cooking", "eating", "sleeping", "walking", "swimming", "flying", "driving", "climbing",
    "falling", "laughing", "crying", "smiling", "waving", "clapping", "pointing", "thinking",
    "dreaming", "playing", "working", "studying", "teaching", "learning",
];

const NATURE: &[&str] = &[
    "sun", "moon", "star", "cloud", "rain", "snow", "wind", "fire", "earth", "mountain",
    "river", "ocean", "forest", "desert", "island", "volcano", "rainbow", "lightning",
    "thunder", "beach", "cave", "valley", "hill", "lake", "pond", "stream", "waterfall",
    "rock", "stone",
];

#[derive(Debug, Error)]
pub enum WordError {
    #[error("word source unavailable: {0}")]
    Unavailable(String),
    #[error("failed to read word list: {0}")]
    Io(#[from] std::io::Error),
}

/// Supplies `count` distinct random words.
pub trait WordSource: Send {
    fn random_words(&mut self, count: usize) -> Result<Vec<String>, WordError>;
}

/// Samples from an in-memory list of words.
#[derive(Debug, Clone)]
pub struct WordList {
    words: Vec<String>,
}

impl WordList {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            words: words.into_iter().map(Into::into).collect(),
        }
    }

    /// The built-in category catalog.
    pub fn catalog() -> Self {
        let mut words: Vec<&str> = [ANIMALS, OBJECTS, FOOD, ACTIONS, NATURE].concat();
        words.sort_unstable();
        words.dedup();
        Self::new(words)
    }

    /// Loads one word per line, skipping blanks and `#` comments.
    pub fn from_file(path: &Path) -> Result<Self, WordError> {
        let contents = std::fs::read_to_string(path)?;
        let words: Vec<String> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();

        if words.is_empty() {
            return Err(WordError::Unavailable(format!(
                "{} contains no words",
                path.display()
            )));
        }
        Ok(Self::new(words))
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl WordSource for WordList {
    fn random_words(&mut self, count: usize) -> Result<Vec<String>, WordError> {
        if self.words.is_empty() {
            return Err(WordError::Unavailable("word list is empty".to_string()));
        }
        Ok(self
            .words
            .choose_multiple(&mut rand::thread_rng(), count)
            .cloned()
            .collect())
    }
}

/// Hands out word choices, falling back to [`FALLBACK_WORDS`] on failure.
pub struct WordProvider {
    source: Box<dyn WordSource>,
}

impl WordProvider {
    pub fn new(source: impl WordSource + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    pub fn catalog() -> Self {
        Self::new(WordList::catalog())
    }

    /// Returns exactly `count` candidates (fewer only if `count` exceeds the
    /// fallback list).
    pub fn choices(&mut self, count: usize) -> Vec<String> {
        match self.source.random_words(count) {
            Ok(words) if words.len() >= count => words.into_iter().take(count).collect(),
            Ok(words) => {
                warn!(
                    "Word source returned {} of {} words, using fallback list",
                    words.len(),
                    count
                );
                fallback_choices(count)
            }
            Err(e) => {
                warn!("Failed to get words from source, using fallback list: {}", e);
                fallback_choices(count)
            }
        }
    }
}

fn fallback_choices(count: usize) -> Vec<String> {
    FALLBACK_WORDS
        .choose_multiple(&mut rand::thread_rng(), count)
        .map(|w| w.to_string())
        .collect()
}
