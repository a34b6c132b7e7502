use fancy_regex::Regex;
use indexmap::IndexMap;
use std::collections::HashSet;

use crate::base::{build_vocab, get_max_entry, merge, update_stats, Loadable, Saveable, Token, Tokenizer, Trainable};
use crate::error::TokenizerError;

/// The main GPT text split patterns, see
/// https://github.com/openai/tiktoken/blob/main/tiktoken_ext/openai_public.py
pub const GPT2_SPLIT_PATTERN: &str =
    r"'(?:[sdmt]|ll|ve|re)| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+";

/// The default pattern used by `RegexTokenizerStruct::default()`.
pub const GPT4_SPLIT_PATTERN: &str = r"'(?i:[sdmt]|ll|ve|re)|[^\r\n\p{L}\p{N}]?+\p{L}+|\p{N}{1,3}| ?[^\s\p{L}\p{N}]++[\r\n]*|\s*[\r\n]|\s+(?!\S)|\s+";

/// Specifies how to handle special tokens during encoding.
///
/// # Variants
///
/// - `All`: every registered special token may appear and is emitted as its id.
/// - `None`: special tokens are not recognized; they are encoded as ordinary text.
/// - `NoneRaise`: special tokens are not recognized; fails with
///   [`TokenizerError::InvalidInput`] if any registered special token string
///   appears as a substring of the input, regardless of any narrowing that
///   would otherwise apply. This is the default behavior of `encode`.
/// - `Set(HashSet<String>)`: only the named subset is recognized as atomic;
///   others are treated as ordinary text.
///
/// # Examples
///
/// ```
/// use bpe_tokenizer::AllowedSpecial;
/// use std::collections::HashSet;
///
/// let allowed_all = AllowedSpecial::All;
/// let allowed_none = AllowedSpecial::None;
/// let allowed_none_raise = AllowedSpecial::NoneRaise;
///
/// let custom_set = HashSet::from(["<|endoftext|>".to_string(), "<|startoftext|>".to_string()]);
/// let allowed_custom = AllowedSpecial::Set(custom_set);
/// ```
pub enum AllowedSpecial {
    All,
    None,
    NoneRaise,
    Set(HashSet<String>),
}

pub trait RegexTokenizerTrait: Tokenizer {
    fn encode_chunk_inner(&self, text_bytes: &[u8]) -> Vec<Token> {
        let merges = self.merges();
        let mut ids: Vec<Token> = text_bytes.iter().map(|&b| b as Token).collect();
        while ids.len() >= 2 {
            // Enumerate the distinct adjacent pairs and pick the one with
            // the lowest merge rank (earliest-learned applicable merge).
            let mut best: Option<(Token, Token)> = None;
            for pair in ids.windows(2) {
                let pair = (pair[0], pair[1]);
                if let Some(&rank) = merges.get(&pair) {
                    match best {
                        Some(best_pair) if merges[&best_pair] <= rank => {}
                        _ => best = Some(pair),
                    }
                }
            }

            match best {
                None => break, // No applicable merge remains.
                Some(pair) => {
                    let idx = merges[&pair];
                    ids = merge(&ids, pair, idx);
                }
            };
        }
        ids
    }

    fn encode_chunk(&self, text_bytes: &[u8]) -> Vec<Token> {
        self.encode_chunk_inner(text_bytes)
    }

    fn compiled_pattern(&self) -> &Regex;

    fn inverse_special_tokens(&self) -> &IndexMap<Token, String>;

    fn decode(&self, ids: &[Token]) -> Result<String, TokenizerError> {
        let mut part_bytes = Vec::new();
        for &idx in ids {
            if let Some(bytes) = self.vocab().get(&idx) {
                part_bytes.extend_from_slice(bytes);
            } else if let Some(special_token) = self.inverse_special_tokens().get(&idx) {
                part_bytes.extend_from_slice(special_token.as_bytes());
            } else {
                return Err(TokenizerError::UnknownId(idx));
            }
        }
        Ok(String::from_utf8_lossy(&part_bytes).into_owned())
    }

    fn encode(&self, text: &str) -> Result<Vec<Token>, TokenizerError> {
        self.encode_special(text, AllowedSpecial::NoneRaise)
    }

    /// Encoding that ignores any special tokens; pure function of `text`,
    /// the compiled pattern, and the merge table.
    fn encode_ordinary(&self, text: &str) -> Vec<Token> {
        let mut ids = Vec::new();
        for m in self.compiled_pattern().find_iter(text) {
            let matched = m.expect("pre-tokenization regex match failed");
            let chunk = &text[matched.start()..matched.end()];
            ids.extend(self.encode_chunk(chunk.as_bytes()));
        }
        ids
    }

    /// Encodes `text`, handling special tokens per `allowed_special`.
    ///
    /// Unlike `encode_ordinary`, this recognizes registered special tokens
    /// as atomic units when allowed.
    ///
    /// # Errors
    ///
    /// [`TokenizerError::InvalidInput`] under `AllowedSpecial::NoneRaise` if
    /// any registered special token string is found as a substring of
    /// `text` — this substring scan always covers *every* registered
    /// special token, not just ones a narrower `allowed_special` would
    /// select.
    fn encode_special(&self, text: &str, allowed_special: AllowedSpecial) -> Result<Vec<Token>, TokenizerError> {
        let special = match allowed_special {
            AllowedSpecial::All => self.special_tokens().clone(),
            AllowedSpecial::None => IndexMap::new(),
            AllowedSpecial::NoneRaise => {
                if let Some(found) = self
                    .special_tokens()
                    .keys()
                    .find(|token| text.contains(token.as_str()))
                {
                    return Err(TokenizerError::InvalidInput(format!(
                        "special token {:?} found in text under \"none_raise\"",
                        found
                    )));
                }
                IndexMap::new()
            }
            AllowedSpecial::Set(special_tokens) => {
                let mut special = IndexMap::new();
                for token in special_tokens {
                    if let Some(&idx) = self.special_tokens().get(&token) {
                        special.insert(token, idx);
                    }
                }
                special
            }
        };

        if special.is_empty() {
            return Ok(self.encode_ordinary(text));
        }

        let special_pattern = "(".to_string()
            + &special
                .keys()
                .map(|k| regex::escape(k))
                .collect::<Vec<String>>()
                .join("|")
            + ")";

        let re = fancy_regex::Regex::new(&special_pattern)
            .map_err(|e| TokenizerError::InvalidInput(format!("invalid special token pattern: {}", e)))?;

        let mut last_end = 0;
        let mut special_chunks = Vec::new();
        for m in re.find_iter(text) {
            let m = m.expect("special token regex match failed");
            special_chunks.push(&text[last_end..m.start()]);
            special_chunks.push(&text[m.start()..m.end()]);
            last_end = m.end();
        }
        let remaining = &text[last_end..];
        if !remaining.is_empty() {
            special_chunks.push(remaining);
        }

        let mut ids = Vec::new();
        for part in special_chunks {
            if let Some(&idx) = special.get(part) {
                ids.push(idx);
            } else {
                ids.extend(self.encode_ordinary(part));
            }
        }
        Ok(ids)
    }
}

/// Minimal (byte-level) Byte Pair Encoding tokenizer with a configurable
/// pre-tokenization pattern and special-token support.
///
/// Algorithmically follows along the GPT tokenizer:
/// https://github.com/openai/gpt-2/blob/master/src/encoder.py
///
/// Unlike `BasicTokenizer`:
/// - `RegexTokenizerStruct` splits on a regex pattern before BPE (merges
///   never cross chunk boundaries).
/// - `RegexTokenizerStruct` handles special tokens.
///
/// # Examples
///
/// ```
/// use bpe_tokenizer::base::Loadable;
/// use bpe_tokenizer::base::Tokenizer;
/// use bpe_tokenizer::base::Trainable;
/// use bpe_tokenizer::RegexTokenizerStruct;
/// use bpe_tokenizer::RegexTokenizerTrait;
/// use bpe_tokenizer::AllowedSpecial;
/// use indexmap::IndexMap;
///
/// let pattern = r"'(?:[sdmt]|ll|ve|re)| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+";
/// let mut tokenizer = RegexTokenizerStruct::new(Some(pattern)).unwrap();
/// tokenizer.register_special_tokens(IndexMap::from([("<|endoftext|>".to_string(), 100257)])).unwrap();
///
/// let text = "Hello, world! This is a test.";
/// let vocab_size = 256 + 10;
/// let verbose = true;
///
/// tokenizer.train(text, vocab_size, verbose).unwrap();
///
/// let encoded = tokenizer.encode_special(text, AllowedSpecial::NoneRaise).unwrap();
/// let decoded = RegexTokenizerTrait::decode(&tokenizer, &encoded).unwrap();
///
/// assert_eq!(text, decoded);
/// ```
pub struct RegexTokenizerStruct {
    pattern: String,
    compiled_pattern: Regex,
    special_tokens: IndexMap<String, Token>,
    inverse_special_tokens: IndexMap<Token, String>,
    merges: IndexMap<(Token, Token), Token>,
    vocab: IndexMap<Token, Vec<u8>>,
}

impl Default for RegexTokenizerStruct {
    fn default() -> Self {
        Self::new(None).expect("the default GPT-4 split pattern always compiles")
    }
}

impl RegexTokenizerStruct {
    /// Creates a new tokenizer with `pattern`, or the default GPT-4-style
    /// pattern if `None`. Fails with [`TokenizerError::InvalidInput`] if the
    /// pattern does not compile.
    pub fn new(pattern: Option<&str>) -> Result<Self, TokenizerError> {
        let pattern = pattern.unwrap_or(GPT4_SPLIT_PATTERN).to_string();
        let compiled_pattern = Regex::new(&pattern)
            .map_err(|e| TokenizerError::InvalidInput(format!("invalid pattern {:?}: {}", pattern, e)))?;

        Ok(RegexTokenizerStruct {
            pattern,
            compiled_pattern,
            special_tokens: IndexMap::new(),
            inverse_special_tokens: IndexMap::new(),
            merges: IndexMap::new(),
            vocab: (0..256).map(|idx| (idx, vec![idx as u8])).collect(),
        })
    }

    /// Replaces the special-token table and rebuilds `vocab` atomically, so
    /// decoding a freshly registered special token's id never depends on
    /// whether a `save`+`load` cycle has happened in between.
    ///
    /// Fails with [`TokenizerError::InvalidInput`] if a token string
    /// contains whitespace (the model file format cannot represent it), or
    /// [`TokenizerError::VocabConflict`] if an id collides with an existing
    /// vocab entry.
    pub fn register_special_tokens(&mut self, special_tokens: IndexMap<String, Token>) -> Result<(), TokenizerError> {
        for token in special_tokens.keys() {
            if token.chars().any(char::is_whitespace) {
                return Err(TokenizerError::InvalidInput(format!(
                    "special token {:?} contains whitespace, which the model file format cannot represent",
                    token
                )));
            }
        }

        let vocab = build_vocab(&special_tokens, &self.merges)?;

        self.inverse_special_tokens = special_tokens.iter().map(|(k, v)| (*v, k.clone())).collect();
        self.special_tokens = special_tokens;
        self.vocab = vocab;
        Ok(())
    }
}

impl Tokenizer for RegexTokenizerStruct {
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
        <Self as RegexTokenizerTrait>::decode(self, ids)
    }

    fn encode(&self, text: &str) -> Result<Vec<Token>, TokenizerError> {
        <Self as RegexTokenizerTrait>::encode(self, text)
    }
}

impl Trainable for RegexTokenizerStruct {
    fn train(&mut self, text: &str, vocab_size: Token, verbose: bool) -> Result<(), TokenizerError> {
        if vocab_size < 256 {
            return Err(TokenizerError::InvalidInput(
                "vocab_size must be at least 256".to_string(),
            ));
        }
        let num_merges = vocab_size - 256;

        // Split the text into chunks; merges never cross a chunk boundary.
        let mut ids: Vec<Vec<Token>> = Vec::new();
        for m in self.compiled_pattern.find_iter(text) {
            let matched = m.expect("pre-tokenization regex match failed");
            let chunk = &text[matched.start()..matched.end()];
            ids.push(chunk.as_bytes().iter().map(|&b| b as Token).collect());
        }

        let mut merges: IndexMap<(Token, Token), Token> = IndexMap::new();
        let mut vocab: IndexMap<Token, Vec<u8>> =
            (0..256).map(|idx| (idx, vec![idx as u8])).collect();

        for i in 0..num_merges {
            let mut stats = IndexMap::new();
            for chunk_ids in &ids {
                update_stats(chunk_ids, &mut stats);
            }

            // Stop early if the corpus is exhausted: every chunk has
            // collapsed to length <= 1 and no adjacent pairs remain.
            let pair = match get_max_entry(&stats) {
                Some((pair, _count)) => *pair,
                None => break,
            };

            let idx = 256 + i;

            ids = ids.iter().map(|chunk_ids| merge(chunk_ids, pair, idx)).collect();

            merges.insert(pair, idx);
            vocab.insert(idx, [vocab[&pair.0].clone(), vocab[&pair.1].clone()].concat());

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

        self.merges = merges;
        self.vocab = build_vocab(&self.special_tokens, &self.merges)?;
        Ok(())
    }
}

impl Saveable for RegexTokenizerStruct {
    fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl Loadable for RegexTokenizerStruct {
    fn set_pattern(&mut self, pattern: &str) -> Result<(), TokenizerError> {
        self.pattern = pattern.to_string();
        self.compiled_pattern = Regex::new(pattern)
            .map_err(|e| TokenizerError::BadFormat(format!("invalid pattern {:?} in model file: {}", pattern, e)))?;
        Ok(())
    }

    fn set_special_tokens(&mut self, special_tokens: IndexMap<String, Token>) {
        self.inverse_special_tokens = special_tokens.iter().map(|(k, v)| (*v, k.clone())).collect();
        self.special_tokens = special_tokens;
    }

    fn set_merges(&mut self, merges: IndexMap<(Token, Token), Token>) {
        self.merges = merges;
    }

    fn set_vocab(&mut self, vocab: IndexMap<Token, Vec<u8>>) {
        self.vocab = vocab;
    }
}

impl RegexTokenizerTrait for RegexTokenizerStruct {
    fn compiled_pattern(&self) -> &Regex {
        &self.compiled_pattern
    }

    fn inverse_special_tokens(&self) -> &IndexMap<Token, String> {
        &self.inverse_special_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use std::collections::HashSet;

    #[test]
    fn test_pattern_matching() {
        let text = "Hello, world! <|endoftext|>";

        let pattern = "(<\\|endoftext\\|>)";
        let re = fancy_regex::Regex::new(pattern).unwrap();

        let mut last_end = 0;
        let mut special_chunks = Vec::new();
        for m in re.find_iter(text) {
            let m = m.unwrap();
            special_chunks.push(&text[last_end..m.start()]);
            special_chunks.push(&text[m.start()..m.end()]);
            last_end = m.end();
        }
        let remaining = &text[last_end..];
        if !remaining.is_empty() {
            special_chunks.push(remaining);
        }
        assert!(special_chunks.contains(&"<|endoftext|>"));
    }

    #[test]
    fn test_encode_special() {
        let mut tokenizer = RegexTokenizerStruct::default();
        tokenizer
            .train("Hello, world! Goodbye, world!, So long...", 256 + 10, true)
            .unwrap();

        let text = "Hello, world! <|endoftext|>";

        tokenizer
            .register_special_tokens(IndexMap::from([("<|endoftext|>".to_string(), 100257)]))
            .unwrap();

        let encoded_all = tokenizer.encode_special(text, AllowedSpecial::All).unwrap();
        let encoded_none = tokenizer.encode_special(text, AllowedSpecial::None).unwrap();

        let custom_set = HashSet::from(["<|endoftext|>".to_string()]);
        let encoded_custom = tokenizer
            .encode_special(text, AllowedSpecial::Set(custom_set))
            .unwrap();

        assert!(encoded_all.contains(&100257));
        assert!(!encoded_none.contains(&100257));
        assert!(encoded_custom.contains(&100257));
    }

    #[test]
    fn test_encode_special_none_raise_errors() {
        let mut tokenizer = RegexTokenizerStruct::default();
        let text = "Hello, world! <|endoftext|>";

        tokenizer
            .register_special_tokens(IndexMap::from([("<|endoftext|>".to_string(), 100257)]))
            .unwrap();

        let err = tokenizer
            .encode_special(text, AllowedSpecial::NoneRaise)
            .unwrap_err();
        assert!(matches!(err, TokenizerError::InvalidInput(_)));
    }

    #[test]
    fn test_register_special_tokens_rejects_whitespace() {
        let mut tokenizer = RegexTokenizerStruct::default();
        let err = tokenizer
            .register_special_tokens(IndexMap::from([("has space".to_string(), 100257)]))
            .unwrap_err();
        assert!(matches!(err, TokenizerError::InvalidInput(_)));
    }

    #[test]
    fn test_register_special_tokens_updates_vocab_immediately() {
        let mut tokenizer = RegexTokenizerStruct::default();
        tokenizer
            .register_special_tokens(IndexMap::from([("<|endoftext|>".to_string(), 100257)]))
            .unwrap();

        // Decoding must work right after registration, with no save/load
        // cycle in between.
        assert_eq!(tokenizer.decode(&[100257]).unwrap(), "<|endoftext|>");
    }

    #[test]
    fn test_new_rejects_invalid_pattern() {
        let err = RegexTokenizerStruct::new(Some("(unclosed")).unwrap_err();
        assert!(matches!(err, TokenizerError::InvalidInput(_)));
    }
}
