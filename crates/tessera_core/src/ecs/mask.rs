//! # Component Bitmasks
//!
//! A growable bitset where bit *i* stands for the component type registered
//! at index *i*. 64 component types per `u64` word.
//!
//! ## Performance
//!
//! - Insert / remove / contains: O(1) amortized
//! - Superset / intersection tests: O(words)
//! - Iterate set bits: O(set bits), skipping clear words

/// Bitset of component type indices.
///
/// Trailing zero words are insignificant: two masks with the same set bits
/// compare equal regardless of how far either has grown.
#[derive(Clone, Debug, Default)]
pub struct ComponentMask {
    words: Vec<u64>,
}

impl ComponentMask {
    /// Creates an empty mask.
    #[must_use]
    pub const fn new() -> Self {
        Self { words: Vec::new() }
    }

    #[inline]
    const fn split(index: u32) -> (usize, u64) {
        ((index / 64) as usize, 1u64 << (index % 64))
    }

    /// Sets bit `index`.
    ///
    /// # Returns
    ///
    /// `true` if the bit was previously clear.
    #[inline]
    pub fn insert(&mut self, index: u32) -> bool {
        let (word, mask) = Self::split(index);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let was_clear = self.words[word] & mask == 0;
        self.words[word] |= mask;
        was_clear
    }

    /// Clears bit `index`.
    ///
    /// # Returns
    ///
    /// `true` if the bit was previously set.
    #[inline]
    pub fn remove(&mut self, index: u32) -> bool {
        let (word, mask) = Self::split(index);
        match self.words.get_mut(word) {
            Some(w) if *w & mask != 0 => {
                *w &= !mask;
                true
            }
            _ => false,
        }
    }

    /// Checks whether bit `index` is set.
    #[inline]
    #[must_use]
    pub fn contains(&self, index: u32) -> bool {
        let (word, mask) = Self::split(index);
        self.words.get(word).is_some_and(|w| w & mask != 0)
    }

    /// Checks whether every bit set in `other` is also set in `self`.
    #[must_use]
    pub fn is_superset(&self, other: &Self) -> bool {
        other.words.iter().enumerate().all(|(i, &theirs)| {
            let ours = self.words.get(i).copied().unwrap_or(0);
            theirs & !ours == 0
        })
    }

    /// Checks whether `self` and `other` share at least one set bit.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }

    /// Sets every bit that is set in `other`.
    pub fn union_with(&mut self, other: &Self) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (ours, theirs) in self.words.iter_mut().zip(other.words.iter()) {
            *ours |= theirs;
        }
    }

    /// Checks whether no bit is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Returns the number of set bits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Clears every bit, keeping the allocation.
    pub fn clear(&mut self) {
        for word in &mut self.words {
            *word = 0;
        }
    }

    /// Iterates over set bit indices in ascending order.
    pub fn iter(&self) -> MaskIter<'_> {
        MaskIter {
            words: &self.words,
            word_idx: 0,
            current_word: self.words.first().copied().unwrap_or(0),
        }
    }
}

impl PartialEq for ComponentMask {
    fn eq(&self, other: &Self) -> bool {
        let (short, long) = if self.words.len() <= other.words.len() {
            (&self.words, &other.words)
        } else {
            (&other.words, &self.words)
        };
        long.iter()
            .enumerate()
            .all(|(i, &w)| w == short.get(i).copied().unwrap_or(0))
    }
}

impl Eq for ComponentMask {}

impl FromIterator<u32> for ComponentMask {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut mask = Self::new();
        for index in iter {
            mask.insert(index);
        }
        mask
    }
}

/// Iterator over the set bits of a [`ComponentMask`].
pub struct MaskIter<'a> {
    words: &'a [u64],
    word_idx: usize,
    current_word: u64,
}

impl Iterator for MaskIter<'_> {
    type Item = u32;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current_word != 0 {
                // Find lowest set bit
                let bit = self.current_word.trailing_zeros();
                self.current_word &= self.current_word - 1;
                // Word counts stay far below u32::MAX / 64.
                #[allow(clippy::cast_possible_truncation)]
                return Some(self.word_idx as u32 * 64 + bit);
            }

            self.word_idx += 1;
            if self.word_idx >= self.words.len() {
                return None;
            }
            self.current_word = self.words[self.word_idx];
        }
    }
}
