use indexmap::IndexMap;

use crate::base::{
    build_vocab, get_max_entry, get_stats, merge, Loadable, Saveable, Token, Tokenizer, Trainable,
};
use crate::error::TokenizerError;

/// Minimal (byte-level) Byte Pair Encoding tokenizer.
///
/// Algorithmically follows along the GPT tokenizer:
/// https://github.com/openai/gpt-2/blob/master/src/encoder.py
///
/// But:
/// - Does not handle the regular expression splitting pattern.
/// - Does not handle any special tokens.
///
/// A freshly constructed `BasicTokenizer` (no `train` call) degenerates to
/// one token id per UTF-8 byte, which is the byte-only fallback every
/// tokenizer in this crate must support.
///
/// # Examples
///
/// ```
/// use bpe_tokenizer::BasicTokenizer;
/// use bpe_tokenizer::Tokenizer;
/// use bpe_tokenizer::Trainable;
///
/// let mut tokenizer = BasicTokenizer::new();
/// let text = "Hello, world!";
/// let vocab_size = 256;
/// let verbose = true;
///
/// tokenizer.train(text, vocab_size, verbose).unwrap();
/// let encoded = tokenizer.encode(text).unwrap();
/// let decoded = tokenizer.decode(&encoded).unwrap();
///
/// assert_eq!(text, decoded);
/// ```
pub struct BasicTokenizer {
    special_tokens: IndexMap<String, Token>,
    merges: IndexMap<(Token, Token), Token>,
    vocab: IndexMap<Token, Vec<u8>>,
}

impl BasicTokenizer {
    pub fn new() -> Self {
        BasicTokenizer {
            special_tokens: IndexMap::new(),
            merges: IndexMap::new(),
            vocab: (0..256).map(|idx| (idx, vec![idx as u8])).collect(),
        }
    }
}

impl Default for BasicTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for BasicTokenizer {
    fn special_tokens(&self) -> &IndexMap<String, Token> {
        &self.special_tokens
    }

    fn merges(&self) -> &IndexMap<(Token, Token), Token> {
        &self.merges
    }

    fn vocab(&self) -> &IndexMap<Token, Vec<u8>> {
        &self.vocab
    }

    fn decode(&self, ids: &[Token]) -> Result<String, TokenizerError> {
        let mut text_bytes = Vec::new();
        for &idx in ids {
            let bytes = self
                .vocab
                .get(&idx)
                .ok_or(TokenizerError::UnknownId(idx))?;
            text_bytes.extend_from_slice(bytes);
        }
        Ok(String::from_utf8_lossy(&text_bytes).into_owned())
    }

    fn encode(&self, text: &str) -> Result<Vec<Token>, TokenizerError> {
        // Given a string text, return the token ids
        let text_bytes = text.as_bytes();
        let mut ids: Vec<Token> = text_bytes.iter().map(|&b| b as Token).collect();
        while ids.len() >= 2 {
            // Find the pair with the lowest merge index
            let stats = get_stats(&ids);

            let pair_opt = stats
                .keys()
                .filter_map(|&pair| self.merges.get(&pair).map(|_| pair))
                .min_by_key(|&pair| self.merges[&pair]);

            match pair_opt {
                None => break, // If there are no more merges available, break
                Some(pair) => {
                    // Otherwise, merge the best pair (lowest merge index)
                    let idx = self.merges[&pair];
                    ids = merge(&ids, pair, idx);
                }
            };
        }
        Ok(ids)
    }
}

impl Trainable for BasicTokenizer {
    fn train(&mut self, text: &str, vocab_size: Token, verbose: bool) -> Result<(), TokenizerError> {
        if vocab_size < 256 {
            return Err(TokenizerError::InvalidInput(
                "vocab_size must be at least 256".to_string(),
            ));
        }
        let num_merges = vocab_size - 256;

        // Input text preprocessing
        let text_bytes = text.as_bytes();
        let mut ids: Vec<Token> = text_bytes.iter().map(|&b| b as Token).collect();

        // Iteratively merge the most common pairs to create new tokens
        let mut merges: IndexMap<(Token, Token), Token> = IndexMap::new();
        let mut vocab: IndexMap<Token, Vec<u8>> =
            (0..256).map(|idx| (idx, vec![idx as u8])).collect();
        for i in 0..num_merges {
            // Count up the number of times every consecutive pair appears
            let stats = get_stats(&ids);
            // Find the pair with the highest count; stop early if the corpus
            // is exhausted (every chunk down to length <= 1).
            let pair = match get_max_entry(&stats) {
                Some((pair, _count)) => *pair,
                None => break,
            };
            // Mint a new token: assign it the next available id
            let idx = 256 + i;
            // Replace all occurrences of pair in ids with idx
            ids = merge(&ids, pair, idx);
            // Save the merge
            merges.insert(pair, idx);
            vocab.insert(
                idx,
                [vocab[&pair.0].clone(), vocab[&pair.1].clone()].concat(),
            );
            if verbose {
                log::debug!(
                    "merge {}/{}: {:?} -> {} ({:?}) had {} occurrences",
                    i + 1,
                    num_merges,
                    pair,
                    idx,
                    vocab[&idx],
                    stats[&pair]
                );
            }
        }

        // Save instance variables
        self.merges = merges;
        self.vocab = build_vocab(&self.special_tokens, &self.merges)?;
        Ok(())
    }
}

impl Saveable for BasicTokenizer {
    fn pattern(&self) -> &str {
        ""
    }
}

impl Loadable for BasicTokenizer {
    fn set_pattern(&mut self, pattern: &str) -> Result<(), TokenizerError> {
        if !pattern.trim().is_empty() {
            return Err(TokenizerError::InvalidInput(
                "BasicTokenizer cannot load a non-empty pattern".to_string(),
            ));
        }
        Ok(())
    }

    fn set_special_tokens(&mut self, special_tokens: IndexMap<String, Token>) {
        self.special_tokens = special_tokens;
    }

    fn set_merges(&mut self, merges: IndexMap<(Token, Token), Token>) {
        self.merges = merges;
    }

    fn set_vocab(&mut self, vocab: IndexMap<Token, Vec<u8>>) {
        self.vocab = vocab;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_tokenizer_is_byte_only() {
        let tokenizer = BasicTokenizer::new();
        assert_eq!(tokenizer.encode("").unwrap(), Vec::<Token>::new());
        assert_eq!(tokenizer.encode("A").unwrap(), vec![65]);
        assert_eq!(tokenizer.decode(&[65]).unwrap(), "A");
    }

    #[test]
    fn rejects_small_vocab_size() {
        let mut tokenizer = BasicTokenizer::new();
        let err = tokenizer.train("hello", 100, false).unwrap_err();
        assert!(matches!(err, TokenizerError::InvalidInput(_)));
    }

    #[test]
    fn decode_rejects_unknown_id() {
        let tokenizer = BasicTokenizer::new();
        let err = tokenizer.decode(&[99999]).unwrap_err();
        assert!(matches!(err, TokenizerError::UnknownId(99999)));
    }
}
