use std::{fmt::Debug, hash::Hash};

/// A symbol is anything that can appear as an input or output of the system under test. Symbols
/// are compared for equality, hashed into the reuse tree and shipped across worker threads.
pub trait Symbol: Clone + Eq + Hash + Debug + Send + Sync {}

impl<T: Clone + Eq + Hash + Debug + Send + Sync> Symbol for T {}

/// Enumerates all words over `alphabet` whose length lies in `min_len..=max_len`. Words are
/// produced in ascending length and, within one length, in lexicographic order with respect to
/// the position of the symbols in `alphabet`.
///
/// For the alphabet `[0, 1]` and lengths `1..=2` this yields `0, 1, 00, 01, 10, 11`.
pub fn all_words<S: Clone>(alphabet: &[S], min_len: usize, max_len: usize) -> AllWords<S> {
    AllWords::new(alphabet.to_vec(), min_len, max_len)
}

/// Iterator returned by [`all_words`]. Internally this is an odometer over symbol positions,
/// where the last position changes fastest. Stacking `multi_cartesian_product` per length would
/// lose the empty word, itertools yields nothing for a product of zero iterators.
#[derive(Debug, Clone)]
pub struct AllWords<S> {
    alphabet: Vec<S>,
    positions: Vec<usize>,
    max_len: usize,
    exhausted: bool,
}

impl<S: Clone> AllWords<S> {
    fn new(alphabet: Vec<S>, min_len: usize, max_len: usize) -> Self {
        let exhausted = min_len > max_len || (alphabet.is_empty() && min_len > 0);
        Self {
            alphabet,
            positions: vec![0; min_len],
            max_len,
            exhausted,
        }
    }

    fn advance(&mut self) {
        for position in self.positions.iter_mut().rev() {
            *position += 1;
            if *position < self.alphabet.len() {
                return;
            }
            *position = 0;
        }
        // every position wrapped around, move on to the next length
        let next_len = self.positions.len() + 1;
        if next_len > self.max_len || self.alphabet.is_empty() {
            self.exhausted = true;
        } else {
            self.positions = vec![0; next_len];
        }
    }
}

impl<S: Clone> Iterator for AllWords<S> {
    type Item = Vec<S>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        let word = self
            .positions
            .iter()
            .map(|&i| self.alphabet[i].clone())
            .collect();
        self.advance();
        Some(word)
    }
}

#[cfg(test)]
mod tests {
    use super::all_words;

    #[test]
    fn ascending_length_then_lexicographic() {
        let words: Vec<_> = all_words(&[0, 1], 1, 2).collect();
        assert_eq!(
            words,
            vec![vec![0], vec![1], vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]
        );
    }

    #[test]
    fn empty_word_and_bounds() {
        assert_eq!(all_words(&['a', 'b'], 0, 0).collect::<Vec<_>>(), vec![vec![]]);
        assert_eq!(all_words(&['a', 'b'], 0, 1).count(), 3);
        assert_eq!(all_words(&['a', 'b', 'c'], 3, 3).count(), 27);
        assert_eq!(all_words(&['a'], 2, 1).count(), 0);
        assert_eq!(all_words::<char>(&[], 1, 3).count(), 0);
        assert_eq!(all_words::<char>(&[], 0, 3).count(), 1);
    }
}
