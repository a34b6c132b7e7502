#[cfg(test)]
mod tests {
    use bpe_tokenizer::test_common::{LLAMA_TEXT, SPECIAL_TOKENS};
    use bpe_tokenizer::AllowedSpecial;
    use bpe_tokenizer::BasicTokenizer;
    use bpe_tokenizer::Loadable;
    use bpe_tokenizer::RegexTokenizerStruct;
    use bpe_tokenizer::RegexTokenizerTrait;
    use bpe_tokenizer::Saveable;
    use bpe_tokenizer::Token;
    use bpe_tokenizer::Tokenizer;
    use bpe_tokenizer::Trainable;

    use indexmap::IndexMap;
    use tempfile::tempdir;

    // Quick unit test, following along the Wikipedia example:
    // https://en.wikipedia.org/wiki/Byte_pair_encoding
    //
    // According to Wikipedia, running bpe on the input string:
    // "aaabdaaabac"
    //
    // for 3 merges will result in string:
    // "XdXac"
    //
    // where:
    // X=ZY
    // Y=ab
    // Z=aa
    //
    // Keep in mind that for us a=97, b=98, c=99, d=100 (ASCII values)
    // so Z will be 256, Y will be 257, X will be 258.
    //
    // So we expect the output list of ids to be [258, 100, 258, 97, 99]
    fn test_wikipedia_example_inner(tokenizer: &mut dyn Trainable) {
        let text = "aaabdaaabac";
        tokenizer.train(text, 256 + 3, false).unwrap();
        let ids = tokenizer.encode(text).unwrap();
        assert_eq!(ids, [258, 100, 258, 97, 99]);
        let encoded = tokenizer.encode(text).unwrap();
        let decoded = tokenizer.decode(&encoded).unwrap();
        assert_eq!(decoded, text);
    }

    #[test]
    fn test_wikipedia_example() {
        let mut basic = BasicTokenizer::new();
        test_wikipedia_example_inner(&mut basic);

        let mut regex = RegexTokenizerStruct::default();
        test_wikipedia_example_inner(&mut regex);
    }

    fn test_save_load_inner(special_tokens: &IndexMap<String, Token>) {
        // take a bit more complex piece of text and train the tokenizer
        let text = LLAMA_TEXT;
        // create a Tokenizer and do 64 merges
        let mut tokenizer = RegexTokenizerStruct::default();
        tokenizer.train(text, 256 + 64, false).unwrap();
        tokenizer
            .register_special_tokens(special_tokens.clone())
            .unwrap();

        // verify that decode(encode(x)) == x
        let encoded = tokenizer.encode_special(text, AllowedSpecial::All).unwrap();
        let decoded = tokenizer.decode(&encoded).unwrap();
        assert_eq!(decoded, text);

        // verify that save/load work as expected; save the tokenizer
        let dir = tempdir().unwrap();
        tokenizer.save(dir.path(), "test_tokenizer_tmp").unwrap();

        // re-load the tokenizer
        let mut tokenizer = RegexTokenizerStruct::default();
        let model_file = dir.path().join("test_tokenizer_tmp.model");
        tokenizer.load(&model_file).unwrap();

        // verify that decode(encode(x)) == x
        assert_eq!(tokenizer.decode(&encoded).unwrap(), text);
        assert_eq!(
            tokenizer
                .decode(&tokenizer.encode_special(text, AllowedSpecial::All).unwrap())
                .unwrap(),
            text
        );
        assert_eq!(
            tokenizer.encode_special(text, AllowedSpecial::All).unwrap(),
            encoded
        );
    }

    #[test]
    fn test_save_load() {
        let special_tokens = IndexMap::new();
        test_save_load_inner(&special_tokens);
        let special_tokens = &SPECIAL_TOKENS;
        test_save_load_inner(special_tokens);
    }

    #[test]
    fn test_load_rejects_bad_magic() {
        let dir = tempdir().unwrap();
        let bad_path = dir.path().join("bogus.model");
        std::fs::write(&bad_path, "not a real model file\n").unwrap();

        let mut tokenizer = RegexTokenizerStruct::default();
        let err = tokenizer.load(&bad_path).unwrap_err();
        assert!(matches!(err, bpe_tokenizer::TokenizerError::BadMagic(_)));
    }

    #[test]
    fn test_load_rejects_non_model_extension() {
        let dir = tempdir().unwrap();
        let bad_path = dir.path().join("bogus.txt");
        std::fs::write(&bad_path, "").unwrap();

        let mut tokenizer = RegexTokenizerStruct::default();
        let err = tokenizer.load(&bad_path).unwrap_err();
        assert!(matches!(err, bpe_tokenizer::TokenizerError::InvalidInput(_)));
    }
}
