//! Contains the base Tokenizer traits and a few common helper functions.
//!
//! The common save/load machinery and the byte-pair primitives used by every
//! concrete tokenizer live here. It would be possible to be stricter about
//! isolating regex/pattern concerns to the regex-based tokenizer, but some
//! concessions are made for simplicity, matching the rest of this crate.

use std::io::Write;
use std::path::Path;
use std::{
    fs::File,
    io::{BufRead, BufReader},
};

use indexmap::IndexMap;

use crate::error::TokenizerError;

/// Token id. Signed so that callers are free to reserve negative ranges for
/// their own purposes; the tokenizer itself only ever mints non-negative ids.
pub type Token = i32;

/// Count of pair occurrences.
pub type Count = u64;

/// The exact first line of a model file written by `save`.
pub const MODEL_MAGIC: &str = "BPEtokenizer Tokenizer v1";

/// Base trait every tokenizer implements.
pub trait Tokenizer {
    fn special_tokens(&self) -> &IndexMap<String, Token>;

    fn merges(&self) -> &IndexMap<(Token, Token), Token>;

    fn vocab(&self) -> &IndexMap<Token, Vec<u8>>;

    /// Encodes a string into a list of token ids.
    ///
    /// Tokenizers that recognize special tokens (see
    /// [`crate::regex::RegexTokenizerTrait`]) fail with
    /// [`TokenizerError::InvalidInput`] when a registered special token
    /// appears in `text`, matching the `"none_raise"` convention described
    /// on [`crate::regex::AllowedSpecial`]. [`BasicTokenizer`](crate::BasicTokenizer)
    /// has no special tokens and never fails here.
    fn encode(&self, text: &str) -> Result<Vec<Token>, TokenizerError>;

    /// Decodes a list of token ids back into a string.
    ///
    /// Fails with [`TokenizerError::UnknownId`] if an id has neither a vocab
    /// entry nor a registered special token.
    fn decode(&self, ids: &[Token]) -> Result<String, TokenizerError>;
}

/// A Tokenizer that can be trained from raw text.
pub trait Trainable: Tokenizer {
    /// Trains a vocabulary of `vocab_size` total ids (including the 256 byte
    /// ids) from `text`. Fails with [`TokenizerError::InvalidInput`] if
    /// `vocab_size < 256`.
    fn train(&mut self, text: &str, vocab_size: Token, verbose: bool) -> Result<(), TokenizerError>;
}

pub trait Saveable: Tokenizer {
    fn pattern(&self) -> &str;

    /// Saves the tokenizer's model and vocabulary to two files:
    /// - `<prefix>.model`: the canonical file used by `load`.
    /// - `<prefix>.vocab`: a human-readable rendering, never read back.
    ///
    /// This is inspired by (but not equivalent to) SentencePiece's model
    /// saving.
    ///
    /// # Examples
    ///
    /// ```
    /// # use tempfile::tempdir;
    /// use bpe_tokenizer::Saveable;
    /// use bpe_tokenizer::BasicTokenizer;
    /// let tokenizer = BasicTokenizer::new();
    /// let dir = tempdir().unwrap();
    /// tokenizer.save(dir.path(), "prefix").unwrap();
    /// ```
    fn save(&self, dir: &Path, prefix: &str) -> Result<(), TokenizerError> {
        let model_file_path = dir.join(format!("{}.model", prefix));
        let mut model_file = File::create(model_file_path)?;

        writeln!(model_file, "{}", MODEL_MAGIC)?;
        writeln!(model_file, "{}", self.pattern())?;

        writeln!(model_file, "{}", self.special_tokens().len())?;
        for (special, idx) in self.special_tokens() {
            writeln!(model_file, "{} {}", special, idx)?;
        }

        let mut merges: Vec<(&(Token, Token), &Token)> = self.merges().iter().collect();
        merges.sort_by_key(|&(_, idx)| *idx);

        for (token_pair, _new_token) in merges {
            writeln!(model_file, "{} {}", token_pair.0, token_pair.1)?;
        }

        let vocab_file_path = dir.join(format!("{}.vocab", prefix));
        let mut vocab_file = File::create(vocab_file_path)?;

        let inverted_merges: IndexMap<Token, (Token, Token)> = self
            .merges()
            .iter()
            .map(|((idx1, idx2), idx)| (*idx, (*idx1, *idx2)))
            .collect();

        let vocab = self.vocab();

        for (idx, token) in vocab {
            let s = render_token(token);

            if let Some((idx0, idx1)) = inverted_merges.get(idx) {
                let s0 = render_token(&vocab[idx0]);
                let s1 = render_token(&vocab[idx1]);
                writeln!(vocab_file, "[{}][{}] -> [{}] {}", s0, s1, s, idx)?;
            } else {
                writeln!(vocab_file, "[{}] {}", s, idx)?;
            }
        }

        Ok(())
    }
}

pub trait Loadable: Tokenizer {
    fn set_pattern(&mut self, pattern: &str) -> Result<(), TokenizerError>;

    fn set_special_tokens(&mut self, special_tokens: IndexMap<String, Token>);

    fn set_merges(&mut self, merges: IndexMap<(Token, Token), Token>);

    fn set_vocab(&mut self, vocab: IndexMap<Token, Vec<u8>>);

    /// Loads the tokenizer's model from a file, replacing all instance state.
    ///
    /// This is the inverse of `save`, but for the model file only. Fails
    /// fast and leaves the instance untouched: the new merges/special
    /// tokens/vocab are built in locals and only swapped in once every line
    /// has parsed and the vocab has been rebuilt without conflict.
    ///
    /// # Errors
    ///
    /// [`TokenizerError::BadMagic`] if the file doesn't start with
    /// [`MODEL_MAGIC`]; the path must also end in `.model`, enforced via
    /// [`TokenizerError::InvalidInput`].
    fn load(&mut self, model_file: &Path) -> Result<(), TokenizerError> {
        if model_file.extension().map_or(true, |ext| ext != "model") {
            return Err(TokenizerError::InvalidInput(
                "model file must have a .model extension".to_string(),
            ));
        }

        let mut merges: IndexMap<(Token, Token), Token> = IndexMap::new();
        let mut special_tokens: IndexMap<String, Token> = IndexMap::new();
        let mut idx: Token = 256;

        let file = File::open(model_file)?;
        let reader = BufReader::new(file);

        let lines: Vec<String> = reader.lines().collect::<std::io::Result<_>>()?;
        let mut line_iter = lines.iter();

        match line_iter.next() {
            Some(version) if version == MODEL_MAGIC => {}
            Some(version) => {
                return Err(TokenizerError::BadMagic(format!(
                    "expected '{}', got '{}'",
                    MODEL_MAGIC, version
                )))
            }
            None => return Err(TokenizerError::BadFormat("missing version line".to_string())),
        }

        let pattern = line_iter
            .next()
            .ok_or_else(|| TokenizerError::BadFormat("missing pattern line".to_string()))?;

        let num_special: usize = line_iter
            .next()
            .ok_or_else(|| TokenizerError::BadFormat("missing special token count line".to_string()))?
            .parse()
            .map_err(|_| TokenizerError::BadFormat("invalid special token count".to_string()))?;

        for _ in 0..num_special {
            let special_line = line_iter
                .next()
                .ok_or_else(|| TokenizerError::BadFormat("truncated special token section".to_string()))?;
            let last_space = special_line.rfind(' ').ok_or_else(|| {
                TokenizerError::BadFormat(format!("malformed special token line: '{}'", special_line))
            })?;
            let special = special_line[..last_space].to_string();
            let special_idx: Token = special_line[last_space + 1..]
                .trim()
                .parse()
                .map_err(|_| TokenizerError::BadFormat(format!("invalid special token id: '{}'", special_line)))?;
            special_tokens.insert(special, special_idx);
        }

        for merge_line in line_iter {
            if merge_line.trim().is_empty() {
                continue;
            }
            let mut parts = merge_line.split_whitespace();
            let idx1: Token = parts
                .next()
                .ok_or_else(|| TokenizerError::BadFormat(format!("missing first index in '{}'", merge_line)))?
                .parse()
                .map_err(|_| TokenizerError::BadFormat(format!("invalid first index in '{}'", merge_line)))?;
            let idx2: Token = parts
                .next()
                .ok_or_else(|| TokenizerError::BadFormat(format!("missing second index in '{}'", merge_line)))?
                .parse()
                .map_err(|_| TokenizerError::BadFormat(format!("invalid second index in '{}'", merge_line)))?;
            merges.insert((idx1, idx2), idx);
            idx += 1;
        }

        let vocab = build_vocab(&special_tokens, &merges)?;

        self.set_pattern(pattern)?;
        self.set_special_tokens(special_tokens);
        self.set_merges(merges);
        self.set_vocab(vocab);

        Ok(())
    }
}

/// Increments, in `acc`, the count of every adjacent pair in `ids`.
///
/// Example:
/// ```
/// # use indexmap::IndexMap;
/// # use bpe_tokenizer::get_stats;
/// let ids = vec![1, 2, 3, 1, 2];
/// let counts = get_stats(&ids);
/// assert_eq!(counts, IndexMap::from([((1, 2), 2), ((2, 3), 1), ((3, 1), 1)]));
/// ```
pub fn get_stats(ids: &[Token]) -> IndexMap<(Token, Token), Count> {
    let mut counts = IndexMap::new();
    update_stats(ids, &mut counts);
    counts
}

/// Updates an existing pair-count map with the counts from `ids`.
///
/// Example:
/// ```
/// # use indexmap::IndexMap;
/// # use bpe_tokenizer::update_stats;
/// let ids = vec![1, 2, 3, 1, 2];
/// let mut existing_counts = IndexMap::from([((1, 2), 1), ((2, 3), 1)]);
/// update_stats(&ids, &mut existing_counts);
/// assert_eq!(existing_counts, IndexMap::from([((1, 2), 3), ((2, 3), 2), ((3, 1), 1)]));
/// ```
pub fn update_stats(ids: &[Token], counts: &mut IndexMap<(Token, Token), Count>) {
    for pair in ids.windows(2) {
        let pair = (pair[0], pair[1]);
        *counts.entry(pair).or_insert(0) += 1;
    }
}

/// Returns the pair with the highest count.
///
/// Ties are broken deterministically by picking the lexicographically
/// smallest `(left_id, right_id)` pair among those sharing the maximum
/// count, so output is portable across map implementations and independent
/// of insertion order.
pub fn get_max_entry(stats: &IndexMap<(Token, Token), Count>) -> Option<(&(Token, Token), &Count)> {
    stats.iter().fold(None, |best, entry| match best {
        None => Some(entry),
        Some((best_pair, best_count)) => {
            let (pair, count) = entry;
            if count > best_count || (count == best_count && pair < best_pair) {
                Some(entry)
            } else {
                best
            }
        }
    })
}

/// Replaces every non-overlapping occurrence of `pair` in `ids` with
/// `new_id`, scanning left-to-right and consuming both positions on a match.
///
/// Example:
/// ```
/// # use bpe_tokenizer::merge;
/// let ids = vec![1, 2, 3, 1, 2];
/// let merged = merge(&ids, (1, 2), 4);
/// assert_eq!(merged, vec![4, 3, 4]);
/// ```
pub fn merge(ids: &[Token], pair: (Token, Token), new_id: Token) -> Vec<Token> {
    let mut new_ids = Vec::with_capacity(ids.len());
    let mut i = 0;

    while i < ids.len() {
        if i < ids.len() - 1 && ids[i] == pair.0 && ids[i + 1] == pair.1 {
            new_ids.push(new_id);
            i += 2;
        } else {
            new_ids.push(ids[i]);
            i += 1;
        }
    }

    new_ids
}

/// Deterministically derives the id→bytes vocabulary from `merges` and
/// `special_tokens`.
///
/// Fails with [`TokenizerError::VocabConflict`] if a merge references a
/// parent id not yet present, or a special token's id collides with an
/// existing vocab entry.
pub fn build_vocab(
    special_tokens: &IndexMap<String, Token>,
    merges: &IndexMap<(Token, Token), Token>,
) -> Result<IndexMap<Token, Vec<u8>>, TokenizerError> {
    let mut vocab: IndexMap<Token, Vec<u8>> = (0..256).map(|idx| (idx, vec![idx as u8])).collect();

    for ((p0, p1), idx) in merges {
        let left = vocab.get(p0).cloned().ok_or_else(|| {
            TokenizerError::VocabConflict(format!("merge parent {} not yet present in vocab", p0))
        })?;
        let right = vocab.get(p1).cloned().ok_or_else(|| {
            TokenizerError::VocabConflict(format!("merge parent {} not yet present in vocab", p1))
        })?;
        let mut token = left;
        token.extend_from_slice(&right);
        vocab.insert(*idx, token);
    }

    for (special, idx) in special_tokens {
        if vocab.contains_key(idx) {
            return Err(TokenizerError::VocabConflict(format!(
                "special token {:?} id {} collides with an existing vocab entry",
                special, idx
            )));
        }
        vocab.insert(*idx, special.as_bytes().to_vec());
    }

    Ok(vocab)
}

/// Replaces Unicode "Other/Control" category characters with their
/// `\uXXXX` escape form.
///
/// References:
/// - https://www.unicode.org/reports/tr44/#GC_Values_Table
fn replace_control_characters(s: &str) -> String {
    let mut chars = String::with_capacity(s.len());

    for ch in s.chars() {
        if ch.is_control() {
            let escaped = format!("\\u{:04x}", ch as u32);
            chars.push_str(&escaped);
        } else {
            chars.push(ch);
        }
    }

    chars
}

/// Pretty-prints a token by decoding it as UTF-8 (lossy) and escaping
/// control characters, for the human-readable `.vocab` file.
fn render_token(token: &[u8]) -> String {
    let s = String::from_utf8_lossy(token);
    replace_control_characters(&s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_control_characters() {
        let s = "Hello\nWorld\u{7}!";
        let result = replace_control_characters(s);
        assert_eq!(result, "Hello\\u000aWorld\\u0007!");
    }

    #[test]
    fn test_render_token() {
        let token = b"Hello\nWorld\x07!";
        let result = render_token(token);
        assert_eq!(result, "Hello\\u000aWorld\\u0007!");
    }

    #[test]
    fn test_max_entry_tie_break_is_lexicographic() {
        let stats: IndexMap<(Token, Token), Count> =
            IndexMap::from([((5, 5), 3), ((2, 9), 3), ((2, 1), 3), ((9, 0), 1)]);

        let (&pair, _) = get_max_entry(&stats).expect("stats is not empty");
        assert_eq!(pair, (2, 1));
    }

    #[test]
    fn test_indexmap_order() {
        let input_data: Vec<((Token, Token), Count)> = vec![
            ((0, 0), 2),
            ((1, 1), 12),
            ((2, 2), 18),
            ((3, 3), 11),
            ((4, 4), 1),
            ((5, 5), 9),
            ((6, 6), 99),
            ((7, 7), 7),
            ((8, 8), 20),
            ((9, 9), 99),
            ((10, 10), 99),
            ((11, 11), 99),
            ((12, 12), 4),
            ((13, 13), 99),
            ((14, 14), 19),
            ((15, 15), 99),
            ((16, 16), 5),
            ((17, 17), 99),
            ((18, 18), 99),
            ((19, 19), 7),
        ];

        // Every tied pair shares count 99; (6, 6) is lexicographically
        // smallest among them, so it wins regardless of insertion order.
        let expected_max_key: (Token, Token) = (6, 6);

        let stats: IndexMap<(Token, Token), Count> = IndexMap::from_iter(input_data);

        let max_entry = get_max_entry(&stats);
        let pair = max_entry.expect("stats is not empty");

        assert_eq!(*pair.0, expected_max_key);
    }

    #[test]
    fn test_build_vocab_detects_conflicting_special_id() {
        let merges = IndexMap::new();
        let special_tokens = IndexMap::from([("<|x|>".to_string(), 65)]);
        let err = build_vocab(&special_tokens, &merges).unwrap_err();
        assert!(matches!(err, TokenizerError::VocabConflict(_)));
    }

    #[test]
    fn test_build_vocab_detects_missing_merge_parent() {
        let merges = IndexMap::from([((300, 301), 302)]);
        let special_tokens = IndexMap::new();
        let err = build_vocab(&special_tokens, &merges).unwrap_err();
        assert!(matches!(err, TokenizerError::VocabConflict(_)));
    }
}
