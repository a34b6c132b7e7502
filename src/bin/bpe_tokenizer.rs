use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indexmap::IndexMap;

use bpe_tokenizer::base::{Loadable, Saveable, Tokenizer, Trainable};
use bpe_tokenizer::{AllowedSpecial, RegexTokenizerStruct, RegexTokenizerTrait};

#[derive(Parser)]
#[command(name = "bpe-tokenizer", about = "Train, encode, and decode with a byte-level BPE tokenizer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a new tokenizer on a text file and write it to `<out>.model`/`<out>.vocab`.
    Train {
        #[arg(long)]
        input: PathBuf,
        #[arg(long = "vocab-size")]
        vocab_size: i32,
        #[arg(long)]
        pattern: Option<String>,
        #[arg(long = "special-tokens")]
        special_tokens: Option<PathBuf>,
        #[arg(long)]
        out: String,
        #[arg(short, long)]
        verbose: bool,
    },
    /// Encode text using a saved model file.
    Encode {
        #[arg(long)]
        model: PathBuf,
        #[arg(long = "allowed-special", value_enum, default_value_t = AllowedSpecialArg::NoneRaise)]
        allowed_special: AllowedSpecialArg,
        text: String,
    },
    /// Decode a sequence of token ids using a saved model file.
    Decode {
        #[arg(long)]
        model: PathBuf,
        ids: Vec<i32>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum AllowedSpecialArg {
    All,
    None,
    NoneRaise,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Train {
            input,
            vocab_size,
            pattern,
            special_tokens,
            out,
            verbose,
        } => train(&input, vocab_size, pattern.as_deref(), special_tokens.as_deref(), &out, verbose),
        Command::Encode {
            model,
            allowed_special,
            text,
        } => encode(&model, allowed_special, &text),
        Command::Decode { model, ids } => decode(&model, &ids),
    }
}

fn train(
    input: &Path,
    vocab_size: i32,
    pattern: Option<&str>,
    special_tokens_path: Option<&Path>,
    out: &str,
    verbose: bool,
) -> Result<()> {
    let text = fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;

    let mut tokenizer = RegexTokenizerStruct::new(pattern).context("building tokenizer")?;

    if let Some(path) = special_tokens_path {
        let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let tokens: IndexMap<String, i32> =
            serde_json::from_str(&raw).with_context(|| format!("parsing {} as JSON", path.display()))?;
        tokenizer
            .register_special_tokens(tokens)
            .context("registering special tokens")?;
    }

    tokenizer
        .train(&text, vocab_size, verbose)
        .context("training tokenizer")?;

    let out_path = Path::new(out);
    let dir = out_path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let prefix = out_path
        .file_name()
        .context("--out must name a file prefix")?
        .to_string_lossy();

    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    tokenizer.save(dir, &prefix).context("saving tokenizer")?;

    println!("wrote {}/{}.model and {}/{}.vocab", dir.display(), prefix, dir.display(), prefix);
    Ok(())
}

fn encode(model: &Path, allowed_special: AllowedSpecialArg, text: &str) -> Result<()> {
    let mut tokenizer = RegexTokenizerStruct::default();
    tokenizer.load(model).with_context(|| format!("loading {}", model.display()))?;

    let allowed = match allowed_special {
        AllowedSpecialArg::All => AllowedSpecial::All,
        AllowedSpecialArg::None => AllowedSpecial::None,
        AllowedSpecialArg::NoneRaise => AllowedSpecial::NoneRaise,
    };

    let ids = tokenizer
        .encode_special(text, allowed)
        .context("encoding text")?;

    println!("{}", serde_json::to_string(&ids)?);
    Ok(())
}

fn decode(model: &Path, ids: &[i32]) -> Result<()> {
    let mut tokenizer = RegexTokenizerStruct::default();
    tokenizer.load(model).with_context(|| format!("loading {}", model.display()))?;

    let text = Tokenizer::decode(&tokenizer, ids).context("decoding ids")?;
    println!("{}", text);
    Ok(())
}
