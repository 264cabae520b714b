use std::io;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use channelpack::config::PackConfig;
use channelpack::data::loader::{load_store, Header, LoadOptions};
use channelpack::{Category, ChannelId, ChannelStore, DurationRule, NameStyle, View};
use clap::Parser;
use log::debug;

/// Load channel data, mask it with conditions, and print parts or channels.
#[derive(Parser, Debug)]
#[command(name = "channelpack")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Data files; later files are appended after earlier ones
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// JSON config with channel names and conditions
    #[arg(long)]
    config: Option<PathBuf>,

    /// Generic condition, e.g. "%('pressure') > 2" (repeatable)
    #[arg(long)]
    cond: Vec<String>,

    /// Start trigger condition (repeatable)
    #[arg(long)]
    start: Vec<String>,

    /// Stop trigger condition (repeatable)
    #[arg(long)]
    stop: Vec<String>,

    /// Records kept after each matched stop
    #[arg(long)]
    stop_extend: Option<usize>,

    /// Part length rule, e.g. "min 3" or "strict 0.5"
    #[arg(long)]
    duration: Option<DurationRule>,

    /// Samples per duration unit
    #[arg(long)]
    samplerate: Option<f64>,

    /// How the mask shapes output: raw, nan or filter
    #[arg(long, default_value = "raw")]
    view: View,

    /// Print only this part
    #[arg(long)]
    part: Option<usize>,

    /// Channels to print, by key or name (default: all)
    #[arg(long)]
    channel: Vec<ChannelId>,

    /// Print the part table instead of channel data
    #[arg(long)]
    parts: bool,

    /// Field delimiter of text files (sniffed when omitted)
    #[arg(long)]
    delimiter: Option<char>,

    /// Text files use ',' as the decimal mark
    #[arg(long)]
    decimal_comma: bool,

    /// Text files have no header row
    #[arg(long)]
    no_header: bool,

    /// Source columns to load
    #[arg(long, value_delimiter = ',')]
    usecols: Option<Vec<usize>>,

    /// Write the effective names and conditions to this path
    #[arg(long)]
    save_config: Option<PathBuf>,
}

impl Cli {
    fn load_options(&self) -> Result<LoadOptions> {
        let delimiter = match self.delimiter {
            Some(c) if c.is_ascii() => Some(c as u8),
            Some(c) => bail!("delimiter '{c}' is not a single-byte character"),
            None => None,
        };
        Ok(LoadOptions {
            delimiter,
            header: if self.no_header { Header::Absent } else { Header::Auto },
            usecols: self.usecols.clone(),
            decimal_comma: self.decimal_comma,
        })
    }

    /// The config file merged with command line overrides.
    fn pack_config(&self) -> Result<PackConfig> {
        let mut config = match &self.config {
            Some(path) => PackConfig::load(path)?,
            None => PackConfig::default(),
        };
        let conditions = &mut config.conditions;
        for (category, exprs) in [
            (Category::Cond, &self.cond),
            (Category::Start, &self.start),
            (Category::Stop, &self.stop),
        ] {
            for expr in exprs {
                conditions
                    .add(category, expr)
                    .with_context(|| format!("--{category} {expr}"))?;
            }
        }
        if let Some(n) = self.stop_extend {
            conditions.stop_extend = n;
        }
        if let Some(rule) = self.duration {
            conditions.duration = Some(rule);
        }
        if let Some(rate) = self.samplerate {
            conditions.samplerate = rate;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let options = cli.load_options()?;
    let mut store = ChannelStore::new();
    for path in &cli.files {
        let next = load_store(path, &options)?;
        store
            .append(next)
            .with_context(|| format!("appending {}", path.display()))?;
    }

    let config = cli.pack_config()?;
    debug!("conditions:\n{}", config.conditions);
    config.apply(&mut store).context("applying conditions")?;
    store.set_view(cli.view);

    if let Some(path) = &cli.save_config {
        PackConfig::from_store(&store, &config.conditions).save(path)?;
    }

    if cli.parts {
        print_parts(&store)
    } else {
        print_channels(&store, &cli)
    }
}

fn print_parts(store: &ChannelStore) -> Result<()> {
    let mut out = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(io::stdout().lock());
    out.write_record(["part", "start", "stop", "records"])?;
    for (i, part) in store.slices().iter().enumerate() {
        out.write_record([
            i.to_string(),
            part.start.to_string(),
            part.stop.to_string(),
            part.len().to_string(),
        ])?;
    }
    out.flush()?;
    Ok(())
}

fn print_channels(store: &ChannelStore, cli: &Cli) -> Result<()> {
    let ids: Vec<ChannelId> = if cli.channel.is_empty() {
        store.keys().map(ChannelId::Key).collect()
    } else {
        cli.channel.clone()
    };

    let mut header = Vec::with_capacity(ids.len());
    let mut columns = Vec::with_capacity(ids.len());
    for id in &ids {
        let name = store
            .name(id, NameStyle::Full)
            .or_else(|_| store.name(id, NameStyle::Fallback))?;
        header.push(name);
        columns.push(store.get(id, cli.part, None)?);
    }

    let mut out = csv::Writer::from_writer(io::stdout().lock());
    out.write_record(&header)?;
    let rows = columns.first().map_or(0, |c| c.len());
    for row in 0..rows {
        out.write_record(
            columns
                .iter()
                .map(|c| c.value(row).map(|v| v.to_string()).unwrap_or_default()),
        )?;
    }
    out.flush()?;
    Ok(())
}
