use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ldainfer_core::{parse_documents, write_doc_topics, InferOptions, InferenceSession};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Directory holding word_id.dict and server_0_table_0.model
    #[arg(short = 'i', long = "input-dir")]
    input_dir: PathBuf,
    /// Documents, one per line, space-separated tokens
    #[arg(short = 'd', long = "docs", default_value = "-")]
    docs: String,
    #[arg(short = 'o', long = "output", default_value = "-")]
    output: String,
    #[arg(short = 'V', long = "num-vocabs")]
    num_vocabs: usize,
    #[arg(short = 'K', long = "num-topics", default_value_t = 100)]
    num_topics: usize,
    #[arg(short = 'n', long = "num-iterations", default_value_t = 100)]
    num_iterations: usize,
    #[arg(short = 'w', long = "num-local-workers", default_value_t = 1)]
    num_local_workers: usize,
    #[arg(short = 'b', long = "num-blocks", default_value_t = 1)]
    num_blocks: usize,
    #[arg(long = "max-doc-length", default_value_t = 8192)]
    max_doc_length: usize,
    #[arg(long = "mh-steps", default_value_t = 2)]
    mh_steps: usize,
    #[arg(long, default_value_t = 0.01)]
    alpha: f64,
    #[arg(long, default_value_t = 0.01)]
    beta: f64,
    #[arg(long = "slice-token-budget", default_value_t = 1 << 20)]
    slice_token_budget: usize,
    #[arg(long = "warm-start", default_value_t = false)]
    warm_start: bool,
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// Infer all documents in one call instead of line by line
    #[arg(long, default_value_t = false)]
    batch: bool,
    /// Also write the encoded corpus as block.N / vocab.N files
    #[arg(long = "dump-dir")]
    dump_dir: Option<PathBuf>,
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()?;
    Ok(())
}

fn read_all(path: &str) -> std::io::Result<String> {
    if path == "-" {
        use std::io::Read;
        let mut s = String::new();
        std::io::stdin().read_to_string(&mut s)?;
        Ok(s)
    } else {
        fs::read_to_string(path)
    }
}

fn write_all(path: &str, data: &str) -> std::io::Result<()> {
    if path == "-" {
        print!("{data}");
    } else {
        fs::write(path, data)?;
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let opts = InferOptions {
        num_vocabs: args.num_vocabs,
        num_topics: args.num_topics,
        num_iterations: args.num_iterations,
        num_local_workers: args.num_local_workers,
        num_blocks: args.num_blocks,
        max_doc_length: args.max_doc_length,
        mh_steps: args.mh_steps,
        alpha: args.alpha,
        beta: args.beta,
        slice_token_budget: args.slice_token_budget,
        warm_start: args.warm_start,
        seed: args.seed,
    };
    let mut session = InferenceSession::init(&args.input_dir, opts)?;

    let docs = parse_documents(&read_all(&args.docs)?);

    if let Some(dir) = &args.dump_dir {
        session.encode_batch(&docs)?.write_dir(dir)?;
    }

    let watch = Instant::now();
    let results = if args.batch {
        session.predict_batch(&docs)?
    } else {
        let mut results = Vec::with_capacity(docs.len());
        for doc in &docs {
            results.push(session.predict(doc)?);
        }
        results
    };
    info!(
        docs = docs.len(),
        seconds = watch.elapsed().as_secs_f64(),
        "inference finished"
    );

    write_all(&args.output, &write_doc_topics(&results))?;
    session.clear();
    Ok(())
}
