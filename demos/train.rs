use std::fs;
use std::path::Path;
use std::time::Instant;

use bpe_tokenizer::test_common::LLAMA_TEXT;
use bpe_tokenizer::BasicTokenizer;
use bpe_tokenizer::RegexTokenizerStruct;
use bpe_tokenizer::Saveable;
use bpe_tokenizer::Tokenizer;
use bpe_tokenizer::Trainable;

fn main() {
    env_logger::init();

    let text = LLAMA_TEXT;

    fs::create_dir_all("models").expect("unable to create models directory");

    let basic = BasicTokenizer::new();
    let regex = RegexTokenizerStruct::default();

    fn doit<T: Tokenizer + Trainable + Saveable>(tokenizer: T, name: &str, text: &str) {
        let mut tokenizer = tokenizer;
        tokenizer.train(text, 512, true).expect("training failed");

        let dir = Path::new("models").to_path_buf();
        tokenizer.save(&dir, name).expect("saving failed");
    }

    let t0 = Instant::now();
    doit(basic, "basic", text);
    doit(regex, "regex", text);
    let t1 = Instant::now();

    let duration = t1.duration_since(t0);
    println!("Training took {:.2} seconds", duration.as_secs_f64());
}
