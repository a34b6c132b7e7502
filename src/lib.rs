pub mod base;
#[cfg(feature = "basic")]
pub mod basic;
pub mod error;
#[cfg(feature = "regex")]
pub mod regex;

pub mod test_common;

pub use base::*;
pub use error::TokenizerError;

#[cfg(feature = "basic")]
pub use basic::BasicTokenizer;

#[cfg(feature = "regex")]
pub use regex::{AllowedSpecial, RegexTokenizerStruct, RegexTokenizerTrait, GPT2_SPLIT_PATTERN, GPT4_SPLIT_PATTERN};
